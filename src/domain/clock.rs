use chrono::{DateTime, Utc};

/// Wall-clock seam. Business code asks the clock instead of `Utc::now()`
/// so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
