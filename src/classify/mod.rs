use crate::entity::{EntityState, StatusType};
use serde::Serialize;
use std::fmt;

/// Display bucket derived from a raw entity snapshot.
///
/// Variants are declared in rendering priority order, so the derived `Ord`
/// is the sort order: ONLINE < ON_WEBSITE < ERROR < OTHER < OFFLINE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayCategory {
    Online,
    OnWebsite,
    Error,
    Other,
    Offline,
}

impl DisplayCategory {
    /// Sort rank (lower sorts first)
    pub fn rank(self) -> u8 {
        match self {
            DisplayCategory::Online => 0,
            DisplayCategory::OnWebsite => 1,
            DisplayCategory::Error => 2,
            DisplayCategory::Other => 3,
            DisplayCategory::Offline => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayCategory::Online => "ONLINE",
            DisplayCategory::OnWebsite => "ON_WEBSITE",
            DisplayCategory::Error => "ERROR",
            DisplayCategory::Other => "OTHER",
            DisplayCategory::Offline => "OFFLINE",
        }
    }

    /// Dark backgrounds need light text
    pub fn uses_light_text(self) -> bool {
        matches!(self, DisplayCategory::Offline | DisplayCategory::Error)
    }
}

impl fmt::Display for DisplayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a snapshot to its display category. Pure and total.
pub fn classify(state: Option<&EntityState>) -> DisplayCategory {
    let Some(state) = state else {
        return DisplayCategory::Error;
    };

    match state.status_type {
        StatusType::Error => return DisplayCategory::Error,
        StatusType::Unknown => return DisplayCategory::Other,
        StatusType::Normal => {}
    }

    let Some(user) = &state.user else {
        return DisplayCategory::Other;
    };
    let Some(raw_state) = &user.state else {
        return DisplayCategory::Other;
    };

    match raw_state.to_lowercase().as_str() {
        "online" => DisplayCategory::Online,
        "active" => {
            let in_world = user
                .location
                .as_deref()
                .map(|location| !location.is_empty() && !location.eq_ignore_ascii_case("offline"))
                .unwrap_or(false);
            if in_world {
                DisplayCategory::Online
            } else {
                DisplayCategory::OnWebsite
            }
        }
        "offline" => DisplayCategory::Offline,
        _ => DisplayCategory::Other,
    }
}
