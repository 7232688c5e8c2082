use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;
use vision_hud_detector::Clock;

/// Caller-level cooldown between vision requests triggered by detected
/// changes. Bounds API cost independently of detector sensitivity.
pub struct RequestThrottle {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    last: Option<Instant>,
}

impl RequestThrottle {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
            last: None,
        }
    }

    /// Claims the next slot if the cooldown has elapsed.
    pub fn try_acquire(&mut self) -> bool {
        let now = self.clock.now();
        if let Some(last) = self.last {
            let since = now.saturating_duration_since(last);
            if since < self.min_interval {
                debug!(
                    since_ms = since.as_millis() as u64,
                    min_interval_ms = self.min_interval.as_millis() as u64,
                    "request throttled"
                );
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vision_hud_detector::ManualClock;

    #[test]
    fn first_request_passes_then_cooldown_applies() {
        let clock = Arc::new(ManualClock::new());
        let mut throttle = RequestThrottle::new(Duration::from_secs(5), clock.clone());

        assert!(throttle.try_acquire());
        clock.advance(Duration::from_millis(4900));
        assert!(!throttle.try_acquire());
        clock.advance(Duration::from_millis(100));
        assert!(throttle.try_acquire());
    }

    #[test]
    fn refused_attempts_do_not_extend_cooldown() {
        let clock = Arc::new(ManualClock::new());
        let mut throttle = RequestThrottle::new(Duration::from_secs(2), clock.clone());

        assert!(throttle.try_acquire());
        clock.advance_secs(1.0);
        assert!(!throttle.try_acquire());
        clock.advance_secs(1.0);
        assert!(throttle.try_acquire());
    }
}
