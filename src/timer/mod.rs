// Owned, cancellable timers delivered as loop events

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, MissedTickBehavior};

#[cfg(test)]
pub(crate) mod manual;

/// Purpose of a timer; one slot per purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Next connection attempt (direct retry or backoff)
    Reconnect,
    /// 1s tick of the "reconnecting in ..." countdown
    CountdownTick,
    /// Delay between a shutdown close and the unavailable banner
    ShutdownGrace,
    /// 1s tick of the disconnected-session elapsed clock
    SessionClock,
    /// Periodic coarse re-render
    UiRefresh,
}

/// Identity of one armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

/// Delivered to the event loop each time a timer elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub token: TimerToken,
}

/// Handle to an armed timer. Dropping it cancels the timer.
pub struct TimerHandle {
    kind: TimerKind,
    token: TimerToken,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(kind: TimerKind, token: TimerToken, on_cancel: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            kind,
            token,
            on_cancel: Some(on_cancel),
        }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn token(&self) -> TimerToken {
        self.token
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.on_cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("kind", &self.kind)
            .field("token", &self.token)
            .finish()
    }
}

/// Source of timers
pub trait Scheduler {
    /// Fire once after `delay`
    fn after(&mut self, kind: TimerKind, delay: Duration) -> TimerHandle;

    /// Fire every `period`, first firing one period from now
    fn every(&mut self, kind: TimerKind, period: Duration) -> TimerHandle;
}

/// Holds at most one armed timer; arming always cancels the previous one
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<TimerHandle>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, handle: TimerHandle) {
        self.cancel();
        self.handle = Some(handle);
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// True when `token` belongs to the currently armed timer
    pub fn is_current(&self, token: TimerToken) -> bool {
        self.handle.as_ref().map(TimerHandle::token) == Some(token)
    }

    /// Disarm a one-shot timer that just fired. Stale tokens return false.
    pub fn take_fired(&mut self, token: TimerToken) -> bool {
        if self.is_current(token) {
            // The task already finished; dropping the handle is a no-op abort
            self.handle = None;
            true
        } else {
            false
        }
    }
}

/// Monotonic and wall-clock time at the moment an event is handled
#[derive(Debug, Clone, Copy)]
pub struct Now {
    pub monotonic: Instant,
    pub wall: DateTime<Utc>,
}

impl Now {
    pub fn current() -> Self {
        Self {
            monotonic: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Scheduler backed by tokio tasks that post firings into the event loop
pub struct TokioScheduler<E> {
    events: mpsc::UnboundedSender<E>,
    next_token: u64,
}

impl<E> TokioScheduler<E>
where
    E: From<TimerFired> + Send + 'static,
{
    pub fn new(events: mpsc::UnboundedSender<E>) -> Self {
        Self {
            events,
            next_token: 0,
        }
    }

    fn next_token(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }
}

impl<E> Scheduler for TokioScheduler<E>
where
    E: From<TimerFired> + Send + 'static,
{
    fn after(&mut self, kind: TimerKind, delay: Duration) -> TimerHandle {
        let token = self.next_token();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(E::from(TimerFired { kind, token }));
        });
        let abort = task.abort_handle();
        TimerHandle::new(kind, token, Box::new(move || abort.abort()))
    }

    fn every(&mut self, kind: TimerKind, period: Duration) -> TimerHandle {
        let token = self.next_token();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if events.send(E::from(TimerFired { kind, token })).is_err() {
                    break;
                }
            }
        });
        let abort = task.abort_handle();
        TimerHandle::new(kind, token, Box::new(move || abort.abort()))
    }
}

#[cfg(test)]
mod tests {
    use super::manual::ManualScheduler;
    use super::*;

    #[test]
    fn test_slot_arm_cancels_previous() {
        let mut scheduler = ManualScheduler::new();
        let mut slot = TimerSlot::new();

        let first = scheduler.after(TimerKind::Reconnect, Duration::from_secs(5));
        let first_token = first.token();
        slot.arm(first);
        slot.arm(scheduler.after(TimerKind::Reconnect, Duration::from_secs(10)));

        assert_eq!(scheduler.pending(TimerKind::Reconnect).len(), 1);
        assert!(!slot.is_current(first_token));
        assert_eq!(
            scheduler.pending(TimerKind::Reconnect)[0].delay,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_take_fired_ignores_stale_tokens() {
        let mut scheduler = ManualScheduler::new();
        let mut slot = TimerSlot::new();

        let handle = scheduler.after(TimerKind::ShutdownGrace, Duration::from_secs(5));
        let token = handle.token();
        slot.arm(handle);

        assert!(!slot.take_fired(TimerToken(token.0 + 100)));
        assert!(slot.is_armed());
        assert!(slot.take_fired(token));
        assert!(!slot.is_armed());
        assert!(!slot.take_fired(token));
    }

    #[test]
    fn test_dropping_handle_cancels() {
        let mut scheduler = ManualScheduler::new();
        let handle = scheduler.every(TimerKind::UiRefresh, Duration::from_secs(5));
        assert_eq!(scheduler.pending(TimerKind::UiRefresh).len(), 1);
        drop(handle);
        assert!(scheduler.pending(TimerKind::UiRefresh).is_empty());
    }

    #[derive(Debug)]
    struct Fired(TimerFired);

    impl From<TimerFired> for Fired {
        fn from(fired: TimerFired) -> Self {
            Fired(fired)
        }
    }

    #[tokio::test]
    async fn test_tokio_scheduler_fires_and_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Fired>();
        let mut scheduler = TokioScheduler::new(tx);

        let kept = scheduler.after(TimerKind::Reconnect, Duration::from_millis(50));
        let cancelled = scheduler.after(TimerKind::ShutdownGrace, Duration::from_millis(10));
        cancelled.cancel();

        tokio::time::sleep(Duration::from_millis(150)).await;

        let Fired(fired) = rx.recv().await.unwrap();
        assert_eq!(fired.kind, TimerKind::Reconnect);
        assert_eq!(fired.token, kept.token());
        assert!(rx.try_recv().is_err());
    }
}
