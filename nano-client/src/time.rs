use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source for the session. Wall time feeds the on-wire reference
/// timestamps, the monotonic side drives reassembly expiry; replay tests
/// swap in a fixed clock.
pub trait Clock: Send + Sync + 'static {
    fn wall(&self) -> SystemTime;
    fn monotonic(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn wall(&self) -> SystemTime {
        SystemTime::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Wire form of a reference timestamp: milliseconds since the Unix epoch.
pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

pub fn from_epoch_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

/// Input timestamps count 10 microsecond ticks since the channel's
/// reference timestamp.
pub fn input_ticks(reference: SystemTime, time: SystemTime) -> u64 {
    time.duration_since(reference)
        .unwrap_or(Duration::ZERO)
        .as_micros() as u64
        / 10
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic clock: fixed start, manually advanced.
    pub struct MockClock {
        base_wall: SystemTime,
        base_monotonic: Instant,
        offset: Mutex<Duration>,
    }

    impl MockClock {
        pub fn new(epoch_ms: u64) -> Self {
            Self {
                base_wall: from_epoch_millis(epoch_ms),
                base_monotonic: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        pub fn advance(&self, duration: Duration) {
            *self.offset.lock().expect("clock offset") += duration;
        }
    }

    impl Clock for MockClock {
        fn wall(&self) -> SystemTime {
            self.base_wall + *self.offset.lock().expect("clock offset")
        }

        fn monotonic(&self) -> Instant {
            self.base_monotonic + *self.offset.lock().expect("clock offset")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_millis_round_trip() {
        let time = from_epoch_millis(1495315092424);
        assert_eq!(epoch_millis(time), 1495315092424);
    }

    #[test]
    fn test_input_ticks_resolution() {
        let reference = from_epoch_millis(1498690645999);
        // 583.706515 seconds later, in 10 microsecond ticks
        let now = reference + Duration::from_micros(583_706_515);
        assert_eq!(input_ticks(reference, now), 58_370_651);
    }

    #[test]
    fn test_input_ticks_before_reference_clamps_to_zero() {
        let reference = from_epoch_millis(1498690645999);
        let earlier = reference - Duration::from_secs(1);
        assert_eq!(input_ticks(reference, earlier), 0);
    }
}
