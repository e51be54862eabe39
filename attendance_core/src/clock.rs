use std::cell::Cell;

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Time source for the recorders: the current wall-clock time in the
/// timezone the kiosk reports in.
pub trait Clock {
    fn now(&self) -> DateTime<Tz>;

    /// The current local time, truncated to milliseconds so that it is
    /// stored in the workbook exactly as it is compared.
    fn local_now(&self) -> NaiveDateTime {
        let now = self.now().naive_local();
        now.with_nanosecond(now.nanosecond() / 1_000_000 * 1_000_000)
            .unwrap_or(now)
    }

    /// Short timezone name for messages, like `MDT`.
    fn zone_abbreviation(&self) -> String {
        self.now().format("%Z").to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Edmonton;

    pub fn new(tz: Tz) -> SystemClock {
        SystemClock { tz }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new(SystemClock::DEFAULT_TIMEZONE)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// A clock that stays where it is put.
#[derive(Debug, Clone)]
pub struct FixedClock {
    tz: Tz,
    local: Cell<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(tz: Tz, local: NaiveDateTime) -> FixedClock {
        FixedClock {
            tz,
            local: Cell::new(local),
        }
    }

    pub fn set(&self, local: NaiveDateTime) {
        self.local.set(local);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        let local = self.local.get();
        // Ambiguous or skipped local times fall back to reading them as UTC.
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .unwrap_or_else(|| self.tz.from_utc_datetime(&local))
    }
}
