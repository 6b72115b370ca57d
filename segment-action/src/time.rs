use time::OffsetDateTime;

pub trait TimeSource {
    // Time stamped on outgoing batches
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Always returns the same instant, for tests.
#[derive(Clone)]
pub struct FixedTime {
    pub time: OffsetDateTime,
}

impl TimeSource for FixedTime {
    fn now(&self) -> OffsetDateTime {
        self.time
    }
}
