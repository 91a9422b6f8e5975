use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;


/// Thumbnail shown when an entity carries no icon of its own
pub const DEFAULT_ICON_URL: &str = "https://assets.vrchat.com/system/defaultAvatarThumbnail.png";

/// Stable identifier of a tracked entity (unique across the store)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Server-side override of how a snapshot should be interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum StatusType {
    /// Raw presence fields are authoritative
    #[default]
    #[serde(rename = "OK")]
    Normal,
    /// The server failed to fetch this entity
    #[serde(rename = "ERROR")]
    Error,
    /// The server has a session but no data for this entity yet
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl<'de> Deserialize<'de> for StatusType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Anything other than the two overrides means "normal", including null
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref() {
            Some("ERROR") => StatusType::Error,
            Some("UNKNOWN") => StatusType::Unknown,
            _ => StatusType::Normal,
        })
    }
}

/// Nested presence record as reported by the upstream status API
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceInfo {
    /// Raw presence state ("online", "active", "offline", ...)
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    /// World/instance location; "offline" or absent when not in a world
    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub user_icon: Option<String>,

    #[serde(default)]
    pub current_avatar_thumbnail_image_url: Option<String>,
}

/// Immutable snapshot of one tracked entity.
///
/// A new update always produces a new snapshot; old snapshots are never
/// mutated. Both the generic field names (`id`, `label`) and the feed
/// server's names (`vrcUid`, `hrToken`) are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    #[serde(alias = "vrcUid")]
    pub id: EntityId,

    /// Human-readable label
    #[serde(alias = "hrToken", default)]
    pub label: String,

    #[serde(default)]
    pub user: Option<PresenceInfo>,

    #[serde(default)]
    pub status_type: StatusType,

    #[serde(default)]
    pub error_message: Option<String>,

    /// Per-entity announcement volume multiplier
    #[serde(default)]
    pub announce_volume_mult: Option<f64>,
}

impl EntityState {
    /// Icon to display: user icon, then avatar thumbnail, then the default
    pub fn icon_url(&self) -> &str {
        let Some(user) = &self.user else {
            return DEFAULT_ICON_URL;
        };

        [&user.user_icon, &user.current_avatar_thumbnail_image_url]
            .into_iter()
            .flatten()
            .map(|url| url.trim())
            .find(|url| !url.is_empty())
            .unwrap_or(DEFAULT_ICON_URL)
    }

    /// Short spoken name: the label up to the first '/'
    pub fn short_name(&self) -> &str {
        let name = self.label.split('/').next().unwrap_or_default().trim();
        if name.is_empty() {
            "User"
        } else {
            name
        }
    }
}
