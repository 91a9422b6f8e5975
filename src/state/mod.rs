// Tracked entity store and render reconciliation

mod reconcile;
mod store;

pub use reconcile::{reconcile, sort_for_display, DisplayEntry, ReconcileDecision, RenderedAttributes};
pub use store::{StateStore, TrackedEntityRecord};

#[cfg(test)]
mod tests;
