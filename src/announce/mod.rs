use crate::classify::{classify, DisplayCategory};
use crate::entity::EntityState;
use serde::Serialize;

/// Spoken notice of a category change
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Announcement {
    pub text: String,
    /// 0.0..=1.0
    pub volume: f64,
}

fn base_volume(category: DisplayCategory) -> f64 {
    match category {
        DisplayCategory::Online => 1.0,
        DisplayCategory::Offline => 0.5,
        _ => 0.3,
    }
}

fn spoken_state(category: DisplayCategory) -> &'static str {
    match category {
        DisplayCategory::Online => "online",
        DisplayCategory::Offline => "offline",
        DisplayCategory::OnWebsite => "on website",
        DisplayCategory::Error => "in an error state",
        DisplayCategory::Other => "in an unknown state",
    }
}

/// Announcement for an update, if the entity changed category.
/// First sightings are not announced.
pub fn announce_change(previous: Option<&EntityState>, next: &EntityState) -> Option<Announcement> {
    let before = classify(Some(previous?));
    let after = classify(Some(next));
    if before == after {
        return None;
    }

    let multiplier = next.announce_volume_mult.unwrap_or(1.0);
    let volume = (base_volume(after) * multiplier).clamp(0.0, 1.0);
    let volume = if volume.is_nan() { 0.0 } else { volume };

    Some(Announcement {
        text: format!("{} is now {}.", next.short_name(), spoken_state(after)),
        volume,
    })
}
