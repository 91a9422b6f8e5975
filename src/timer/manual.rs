// Deterministic scheduler for unit tests: records armed timers, never fires

use super::{Scheduler, TimerHandle, TimerKind, TimerToken};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ArmedTimer {
    pub kind: TimerKind,
    pub token: TimerToken,
    pub delay: Duration,
    pub repeating: bool,
}

#[derive(Clone, Default)]
pub struct ManualScheduler {
    live: Arc<Mutex<BTreeMap<TimerToken, ArmedTimer>>>,
    next_token: u64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers of `kind` that are armed and not cancelled
    pub fn pending(&self, kind: TimerKind) -> Vec<ArmedTimer> {
        self.live
            .lock()
            .unwrap()
            .values()
            .filter(|timer| timer.kind == kind)
            .cloned()
            .collect()
    }

    /// The single armed timer of `kind`; panics if there is not exactly one
    pub fn only(&self, kind: TimerKind) -> ArmedTimer {
        let pending = self.pending(kind);
        assert_eq!(pending.len(), 1, "expected one {:?} timer, found {:?}", kind, pending);
        pending.into_iter().next().unwrap()
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration, repeating: bool) -> TimerHandle {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.live.lock().unwrap().insert(
            token,
            ArmedTimer {
                kind,
                token,
                delay,
                repeating,
            },
        );
        let live = Arc::clone(&self.live);
        TimerHandle::new(
            kind,
            token,
            Box::new(move || {
                live.lock().unwrap().remove(&token);
            }),
        )
    }
}

impl Scheduler for ManualScheduler {
    fn after(&mut self, kind: TimerKind, delay: Duration) -> TimerHandle {
        self.arm(kind, delay, false)
    }

    fn every(&mut self, kind: TimerKind, period: Duration) -> TimerHandle {
        self.arm(kind, period, true)
    }
}
