//! A clock abstraction.
//!
//! The timer gates in the session engine (§4.4) compare `now` against
//! stored timestamps. Hard-coding `Utc::now()` there would make the gates
//! impossible to test deterministically, so every caller goes through a
//! [`Clock`] instead.

use chrono::{DateTime, Utc};


//------------ Clock -----------------------------------------------------

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real, wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns a fixed point in time, for tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_is_fixed() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let clock = FixedClock(t);
        assert_eq!(clock.now(), t);
        assert_eq!(clock.now(), t);
    }
}
