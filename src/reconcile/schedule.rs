// Poll timer for a reconciliation loop

use std::time::Duration;
use tokio::time::Instant;

use crate::config::{PollResetPolicy, MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS};

#[derive(Debug, Clone)]
pub struct PollSchedule {
    period: Duration,
    policy: PollResetPolicy,
    next_due: Option<Instant>,
    /// One-shot refresh independent of the regular countdown
    once_at: Option<Instant>,
}

impl PollSchedule {
    /// `period` is clamped to the accepted poll interval range
    pub fn new(period: Duration, policy: PollResetPolicy) -> Self {
        let period = period.clamp(
            Duration::from_millis(MIN_POLL_INTERVAL_MS),
            Duration::from_millis(MAX_POLL_INTERVAL_MS),
        );
        Self {
            period,
            policy,
            next_due: None,
            once_at: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Earliest instant the loop has to wake up for
    pub fn next_wake(&self) -> Option<Instant> {
        match (self.next_due, self.once_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Start or restart the countdown from `now`
    pub fn reset(&mut self, now: Instant) {
        self.next_due = now.checked_add(self.period);
        if self.next_due.is_none() {
            log::warn!("⚠️  Poll period {:?} overflows the clock, polling stopped", self.period);
        }
    }

    pub fn stop(&mut self) {
        self.next_due = None;
        self.once_at = None;
    }

    pub fn schedule_once(&mut self, at: Instant) {
        self.once_at = Some(at);
    }

    /// An applied push defers the next poll under the reset-on-event policy
    pub fn on_push(&mut self, now: Instant) {
        if self.policy == PollResetPolicy::ResetOnEvent && self.next_due.is_some() {
            self.reset(now);
        }
    }

    /// Consume whatever is due at `now`; true if a refresh should run
    pub fn take_due(&mut self, now: Instant) -> bool {
        let mut due = false;
        if self.once_at.map_or(false, |at| at <= now) {
            self.once_at = None;
            due = true;
        }
        if self.next_due.map_or(false, |at| at <= now) {
            self.reset(now);
            due = true;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(10_000);

    #[test]
    fn test_push_defers_funding_poll() {
        let start = Instant::now();
        let mut schedule = PollSchedule::new(INTERVAL * 5, PollResetPolicy::ResetOnEvent);
        schedule.reset(start);

        schedule.on_push(start + Duration::from_millis(3_000));
        let next = schedule.next_due().unwrap();
        assert!(next >= start + Duration::from_millis(53_000));
        assert!(!schedule.take_due(start + Duration::from_millis(50_000)));
        assert!(schedule.take_due(start + Duration::from_millis(53_000)));
    }

    #[test]
    fn test_fixed_policy_ignores_pushes() {
        let start = Instant::now();
        let mut schedule = PollSchedule::new(INTERVAL, PollResetPolicy::Fixed);
        schedule.reset(start);
        schedule.on_push(start + Duration::from_millis(3_000));
        assert_eq!(schedule.next_due(), Some(start + INTERVAL));
    }

    #[test]
    fn test_stopped_schedule_stays_stopped() {
        let start = Instant::now();
        let mut schedule = PollSchedule::new(INTERVAL, PollResetPolicy::ResetOnEvent);
        schedule.on_push(start);
        assert_eq!(schedule.next_wake(), None);
        assert!(!schedule.take_due(start + INTERVAL * 3));
    }

    #[test]
    fn test_period_is_clamped() {
        let start = Instant::now();
        let mut storm = PollSchedule::new(Duration::ZERO, PollResetPolicy::ResetOnEvent);
        assert_eq!(storm.period(), Duration::from_millis(MIN_POLL_INTERVAL_MS));
        storm.reset(start);
        assert!(!storm.take_due(start));

        let mut huge = PollSchedule::new(Duration::MAX, PollResetPolicy::ResetOnEvent);
        assert_eq!(huge.period(), Duration::from_millis(MAX_POLL_INTERVAL_MS));
        huge.reset(start);
        assert_eq!(
            huge.next_due(),
            Some(start + Duration::from_millis(MAX_POLL_INTERVAL_MS))
        );
    }

    #[test]
    fn test_one_shot_does_not_move_countdown() {
        let start = Instant::now();
        let mut schedule = PollSchedule::new(INTERVAL, PollResetPolicy::ResetOnEvent);
        schedule.reset(start);
        schedule.schedule_once(start + Duration::from_millis(300));

        assert_eq!(schedule.next_wake(), Some(start + Duration::from_millis(300)));
        assert!(schedule.take_due(start + Duration::from_millis(300)));
        assert_eq!(schedule.next_due(), Some(start + INTERVAL));
        assert_eq!(schedule.next_wake(), Some(start + INTERVAL));
    }
}
