use aegis_core::Timestamp;
use aegis_ports::Clock;
use chrono::Utc;

/// Wall-clock time in UTC. The coordinator's default clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "system"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_utc_now() {
        let before = Utc::now();
        let now = SystemClock::new().now();
        let after = Utc::now();

        assert!(before <= now && now <= after);
        assert_eq!(SystemClock.name(), "system");
    }
}
