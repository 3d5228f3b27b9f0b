use std::num::NonZeroU64;
use std::time::{Duration, Instant};

const SECS_PER_MINUTE: u64 = 60;

/// Wall-clock budget of a campaign, in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CampaignDeadline {
    minutes: Option<NonZeroU64>,
}

impl CampaignDeadline {
    /// Zero means the campaign is unbounded.
    pub fn from_minutes(minutes: u64) -> Self {
        Self {
            minutes: NonZeroU64::new(minutes),
        }
    }

    pub fn unbounded() -> Self {
        Self { minutes: None }
    }

    pub fn minutes(&self) -> Option<u64> {
        self.minutes.map(NonZeroU64::get)
    }

    pub fn is_bounded(&self) -> bool {
        self.minutes.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    Running,
    Expired { elapsed_minutes: u64 },
}

/// Monotonic start timestamp of the campaign.
#[derive(Debug, Clone, Copy)]
pub struct CampaignClock {
    started_at: Instant,
}

impl CampaignClock {
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started_at: Instant) -> Self {
        Self { started_at }
    }

    pub fn start_instant(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Elapsed time is truncated to whole minutes before it is compared.
    pub fn check(&self, deadline: CampaignDeadline, now: Instant) -> CampaignStatus {
        let Some(limit) = deadline.minutes() else {
            return CampaignStatus::Running;
        };
        let elapsed_minutes = self.elapsed_at(now).as_secs() / SECS_PER_MINUTE;
        if elapsed_minutes >= limit {
            CampaignStatus::Expired { elapsed_minutes }
        } else {
            CampaignStatus::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * SECS_PER_MINUTE)
    }

    #[test]
    fn unbounded_deadline_never_expires() {
        let clock = CampaignClock::start();
        let later = clock.start_instant() + minutes(10_000);
        assert_eq!(
            clock.check(CampaignDeadline::from_minutes(0), later),
            CampaignStatus::Running
        );
        assert!(!CampaignDeadline::unbounded().is_bounded());
    }

    #[test]
    fn expires_exactly_at_deadline() {
        let clock = CampaignClock::start();
        let deadline = CampaignDeadline::from_minutes(3);
        let t0 = clock.start_instant();

        assert_eq!(clock.check(deadline, t0), CampaignStatus::Running);
        assert_eq!(
            clock.check(deadline, t0 + minutes(3) - Duration::from_millis(1)),
            CampaignStatus::Running
        );
        assert_eq!(
            clock.check(deadline, t0 + minutes(3)),
            CampaignStatus::Expired { elapsed_minutes: 3 }
        );
        assert_eq!(
            clock.check(deadline, t0 + minutes(7) + Duration::from_secs(59)),
            CampaignStatus::Expired { elapsed_minutes: 7 }
        );
    }

    #[test]
    fn instants_before_start_count_as_zero_elapsed() {
        let clock = CampaignClock::start();
        let t0 = clock.start_instant();
        let shifted = CampaignClock::started_at(t0 + minutes(5));
        assert_eq!(shifted.elapsed_at(t0), Duration::ZERO);
        assert_eq!(
            shifted.check(CampaignDeadline::from_minutes(1), t0),
            CampaignStatus::Running
        );
    }
}
