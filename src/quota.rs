//! Local estimate of the daily API quota.
//!
//! The API bills fixed unit costs per call and resets at midnight Pacific
//! time. The tracker keeps an optimistic running total so a publish that
//! cannot fit is refused before any network traffic; a remote quota error is
//! still handled by the upload client.

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::QuotaConfig;
use crate::persist::write_atomic;

/// Billable API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    VideosInsert,
    VideosUpdate,
    VideosList,
    ThumbnailsSet,
    PlaylistItemsInsert,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::VideosInsert => "videos.insert",
            OperationKind::VideosUpdate => "videos.update",
            OperationKind::VideosList => "videos.list",
            OperationKind::ThumbnailsSet => "thumbnails.set",
            OperationKind::PlaylistItemsInsert => "playlistItems.insert",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Units charged for one call.
///
/// See: <https://developers.google.com/youtube/v3/determine_quota_cost>
pub fn estimate_cost(operation: OperationKind) -> u64 {
    match operation {
        OperationKind::VideosInsert => 1600,
        OperationKind::VideosUpdate => 50,
        OperationKind::VideosList => 1,
        OperationKind::ThumbnailsSet => 50,
        OperationKind::PlaylistItemsInsert => 50,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLedger {
    /// Quota day, in the reset time zone
    pub date: NaiveDate,
    pub units_consumed: u64,
    pub units_cap: u64,
}

impl QuotaLedger {
    pub fn remaining(&self) -> u64 {
        self.units_cap.saturating_sub(self.units_consumed)
    }
}

/// Outcome of a reservation. Rejection is an expected answer, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted { remaining: u64 },
    Rejected { requested: u64, remaining: u64 },
}

impl Reservation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Reservation::Granted { .. })
    }
}

pub struct QuotaTracker {
    ledger: Mutex<QuotaLedger>,
    clock: Arc<dyn Clock>,
    reset_offset: FixedOffset,
    ledger_path: Option<PathBuf>,
}

impl QuotaTracker {
    /// Tracker for `config`, resuming today's total from the ledger file if
    /// one is configured and readable.
    pub fn new(config: &QuotaConfig, clock: Arc<dyn Clock>) -> Self {
        let reset_offset = FixedOffset::east_opt(config.reset_utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        let today = clock.now().with_timezone(&reset_offset).date_naive();
        let fresh = QuotaLedger {
            date: today,
            units_consumed: 0,
            units_cap: config.daily_cap,
        };

        let ledger = match config.ledger_path.as_deref().map(std::fs::read_to_string) {
            Some(Ok(content)) => match serde_json::from_str::<QuotaLedger>(&content) {
                Ok(stored) if stored.date == today => {
                    debug!(consumed = stored.units_consumed, "resuming quota ledger");
                    QuotaLedger {
                        units_cap: config.daily_cap,
                        ..stored
                    }
                }
                Ok(_) => fresh,
                Err(e) => {
                    warn!("ignoring unreadable quota ledger: {}", e);
                    fresh
                }
            },
            _ => fresh,
        };

        Self {
            ledger: Mutex::new(ledger),
            clock,
            reset_offset,
            ledger_path: config.ledger_path.clone(),
        }
    }

    /// Tracker that never touches the filesystem.
    pub fn in_memory(daily_cap: u64, reset_utc_offset_hours: i32, clock: Arc<dyn Clock>) -> Self {
        let config = QuotaConfig {
            daily_cap,
            reset_utc_offset_hours,
            ledger_path: None,
        };
        Self::new(&config, clock)
    }

    pub fn estimate_cost(&self, operation: OperationKind) -> u64 {
        estimate_cost(operation)
    }

    /// Atomically check that `cost` fits today's remaining budget and, if
    /// so, consume it.
    pub fn reserve(&self, cost: u64) -> Reservation {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        self.roll_over(&mut ledger);

        let remaining = ledger.remaining();
        if cost > remaining {
            info!(requested = cost, remaining, "quota reservation rejected");
            return Reservation::Rejected {
                requested: cost,
                remaining,
            };
        }

        ledger.units_consumed += cost;
        let remaining = ledger.remaining();
        debug!(cost, remaining, "quota reserved");
        self.persist(&ledger);
        Reservation::Granted { remaining }
    }

    /// Copy of today's ledger.
    pub fn snapshot(&self) -> QuotaLedger {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        self.roll_over(&mut ledger);
        ledger.clone()
    }

    fn roll_over(&self, ledger: &mut QuotaLedger) {
        let today = self.clock.now().with_timezone(&self.reset_offset).date_naive();
        if ledger.date != today {
            debug!(from = %ledger.date, to = %today, "quota day rolled over");
            ledger.date = today;
            ledger.units_consumed = 0;
        }
    }

    /// The ledger is an estimate, so a failed write is logged, not fatal.
    fn persist(&self, ledger: &QuotaLedger) {
        let Some(path) = &self.ledger_path else {
            return;
        };
        let written = serde_json::to_vec_pretty(ledger)
            .map_err(std::io::Error::other)
            .and_then(|json| write_atomic(path, &json));
        if let Err(e) = written {
            warn!("failed to persist quota ledger to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, Duration, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_cost_table() {
        assert_eq!(estimate_cost(OperationKind::VideosInsert), 1600);
        assert_eq!(estimate_cost(OperationKind::VideosList), 1);
        assert_eq!(OperationKind::PlaylistItemsInsert.to_string(), "playlistItems.insert");
    }

    #[test]
    fn test_reservation_past_cap_is_rejected() {
        let tracker = QuotaTracker::in_memory(10_000, -8, Arc::new(ManualClock::new(at(12, 0))));
        assert_eq!(tracker.reserve(9_000), Reservation::Granted { remaining: 1_000 });
        assert_eq!(
            tracker.reserve(1_600),
            Reservation::Rejected {
                requested: 1_600,
                remaining: 1_000
            }
        );
        assert_eq!(tracker.snapshot().units_consumed, 9_000);
    }

    #[test]
    fn test_rollover_follows_reset_offset() {
        let clock = Arc::new(ManualClock::new(at(7, 59)));
        let tracker = QuotaTracker::in_memory(10_000, -8, clock.clone());
        tracker.reserve(8_000);
        assert_eq!(tracker.snapshot().date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        clock.set(at(8, 0));
        let ledger = tracker.snapshot();
        assert_eq!(ledger.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(ledger.units_consumed, 0);
        assert!(tracker.reserve(8_000).is_granted());
    }

    #[test]
    fn test_consumption_never_exceeds_cap() {
        let clock = Arc::new(ManualClock::new(at(0, 0)));
        let tracker = QuotaTracker::in_memory(10_000, -8, clock.clone());
        let costs = [1600, 50, 1, 1600, 50, 1600, 1600, 1, 1600, 50, 1600, 1600];

        for step in 0..500u64 {
            let cost = costs[(step as usize * 7) % costs.len()];
            let before = tracker.snapshot();
            let outcome = tracker.reserve(cost);
            let after = tracker.snapshot();

            assert!(after.units_consumed <= after.units_cap);
            if after.date == before.date {
                match outcome {
                    Reservation::Granted { remaining } => {
                        assert_eq!(after.units_consumed, before.units_consumed + cost);
                        assert_eq!(remaining, after.remaining());
                    }
                    Reservation::Rejected { remaining, .. } => {
                        assert!(cost > remaining);
                        assert_eq!(after.units_consumed, before.units_consumed);
                    }
                }
            }
            clock.advance(Duration::minutes(37));
        }
    }

    #[test]
    fn test_ledger_file_is_shared_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let config = QuotaConfig {
            daily_cap: 10_000,
            reset_utc_offset_hours: -8,
            ledger_path: Some(dir.path().join("quota.json")),
        };
        let clock = Arc::new(ManualClock::new(at(12, 0)));

        QuotaTracker::new(&config, clock.clone()).reserve(1_600);
        let second = QuotaTracker::new(&config, clock.clone());
        assert_eq!(second.snapshot().units_consumed, 1_600);

        clock.advance(Duration::days(1));
        let next_day = QuotaTracker::new(&config, clock);
        assert_eq!(next_day.snapshot().units_consumed, 0);
    }
}
