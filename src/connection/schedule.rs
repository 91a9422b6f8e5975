use crate::config::ReconnectConfig;
use crate::timer::{Scheduler, TimerKind, TimerSlot, TimerToken};
use std::time::{Duration, Instant};

/// What kind of reconnect timer just expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectTrigger {
    /// Fixed delay after an ordinary drop; `attempts` untouched
    Retry,
    /// Backoff timer; `attempts` has been incremented
    Backoff { attempts: u32 },
}

/// Linear backoff with a single pending reconnect and an optional countdown
#[derive(Debug)]
pub struct ReconnectSchedule {
    attempts: u32,
    increment: Duration,
    max_delay: Duration,
    countdown_tick: Duration,
    pending: TimerSlot,
    pending_is_backoff: bool,
    countdown: TimerSlot,
    deadline: Option<Instant>,
}

impl ReconnectSchedule {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            attempts: 0,
            increment: config.increment(),
            max_delay: config.max_delay(),
            countdown_tick: config.countdown_tick(),
            pending: TimerSlot::new(),
            pending_is_backoff: false,
            countdown: TimerSlot::new(),
            deadline: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay of the next backoff attempt: `min(increment * (attempts + 1), max_delay)`
    pub fn next_delay(&self) -> Duration {
        self.increment
            .saturating_mul(self.attempts.saturating_add(1))
            .min(self.max_delay)
    }

    /// Arm the backoff timer and the countdown ticker. Replaces any pending timer.
    pub fn schedule_backoff(&mut self, timers: &mut dyn Scheduler, now: Instant) -> Duration {
        self.cancel();
        let delay = self.next_delay();
        self.pending.arm(timers.after(TimerKind::Reconnect, delay));
        self.pending_is_backoff = true;
        self.deadline = Some(now + delay);
        self.countdown
            .arm(timers.every(TimerKind::CountdownTick, self.countdown_tick));
        delay
    }

    /// Arm a fixed-delay retry without countdown. Replaces any pending timer.
    pub fn schedule_retry(&mut self, timers: &mut dyn Scheduler, delay: Duration) {
        self.cancel();
        self.pending.arm(timers.after(TimerKind::Reconnect, delay));
        self.pending_is_backoff = false;
    }

    /// Consume an expired reconnect timer. Stale tokens return `None`.
    pub fn take_expired(&mut self, token: TimerToken) -> Option<ReconnectTrigger> {
        if !self.pending.take_fired(token) {
            return None;
        }
        if self.pending_is_backoff {
            self.pending_is_backoff = false;
            self.attempts = self.attempts.saturating_add(1);
            Some(ReconnectTrigger::Backoff {
                attempts: self.attempts,
            })
        } else {
            Some(ReconnectTrigger::Retry)
        }
    }

    pub fn is_countdown_tick(&self, token: TimerToken) -> bool {
        self.countdown.is_current(token)
    }

    /// Time left until the backoff attempt, if a countdown is running
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn stop_countdown(&mut self) {
        self.countdown.cancel();
        self.deadline = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_armed()
    }

    pub fn has_countdown(&self) -> bool {
        self.countdown.is_armed()
    }

    /// Drop the pending timer and countdown; keeps `attempts`
    pub fn cancel(&mut self) {
        self.pending.cancel();
        self.pending_is_backoff = false;
        self.stop_countdown();
    }

    /// Successful open: forget previous failures
    pub fn reset(&mut self) {
        self.cancel();
        self.attempts = 0;
    }
}
