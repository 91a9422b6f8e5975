use crate::classify::{classify, DisplayCategory};
use crate::entity::{EntityId, EntityState};
use crate::state::StateStore;
use serde::Serialize;

/// Visual attributes of one entity, independent of its position
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedAttributes {
    pub label: String,
    pub icon_url: String,
    pub category: DisplayCategory,
    /// OFFLINE and ERROR entries render light text on a dark background
    pub light_text: bool,
    pub error_message: Option<String>,
}

impl RenderedAttributes {
    pub fn from_state(state: &EntityState) -> Self {
        let category = classify(Some(state));
        Self {
            label: state.label.clone(),
            icon_url: state.icon_url().to_string(),
            category,
            light_text: category.uses_light_text(),
            error_message: state.error_message.clone(),
        }
    }
}

/// One row of the sorted display
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DisplayEntry {
    pub id: EntityId,
    /// Position in display order at the time of the sort
    pub order_index: usize,
    pub attributes: RenderedAttributes,
}

/// What the render sink has to do after an update
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileDecision {
    /// Category changed: every sorted surface must be rebuilt
    FullRedraw,
    /// Category unchanged: update this entry in place, positions stay
    Patch {
        id: EntityId,
        attributes: RenderedAttributes,
    },
}

/// Decide between a full redraw and an in-place patch.
///
/// Sorting is category-first, so only a category change can move an entry.
/// An entity with no previous snapshot has no prior category and always
/// needs placement.
pub fn reconcile(previous: Option<&EntityState>, next: &EntityState) -> ReconcileDecision {
    let before = previous.map(|state| classify(Some(state)));
    let after = classify(Some(next));

    if before == Some(after) {
        ReconcileDecision::Patch {
            id: next.id.clone(),
            attributes: RenderedAttributes::from_state(next),
        }
    } else {
        ReconcileDecision::FullRedraw
    }
}

/// Sort tracked entities by `(category rank, display order index)`.
pub fn sort_for_display(store: &StateStore) -> Vec<DisplayEntry> {
    let mut entries: Vec<DisplayEntry> = store
        .records()
        .enumerate()
        .map(|(order_index, record)| DisplayEntry {
            id: record.id.clone(),
            order_index,
            attributes: RenderedAttributes::from_state(&record.latest),
        })
        .collect();

    entries.sort_by_key(|entry| (entry.attributes.category.rank(), entry.order_index));
    entries
}

impl StateStore {
    /// Convenience wrapper around [`sort_for_display`]
    pub fn sorted(&self) -> Vec<DisplayEntry> {
        sort_for_display(self)
    }
}
