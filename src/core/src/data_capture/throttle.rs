use std::time::Duration;

/// Fixed-interval gate collapsing bursts of high-frequency signals.
///
/// The first signal passes; after that, at most one signal passes per
/// `interval`, measured from the last one that passed.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    interval_ms: i64,
    last_fired: Option<i64>,
}

impl ThrottleGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
            last_fired: None,
        }
    }

    /// Returns true when the signal observed at `now` (epoch ms) may pass.
    pub fn try_fire(&mut self, now: i64) -> bool {
        match self.last_fired {
            Some(last) if now.saturating_sub(last) < self.interval_ms => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }

    pub fn last_fired(&self) -> Option<i64> {
        self.last_fired
    }
}
