use std::sync::Arc;
use time::OffsetDateTime;

/// Source of "now" for period resolution. Production wires [`SystemClock`]
/// once at startup; tests pin a fixed instant.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock pinned to a single instant, for deterministic period tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.0
    }
}
