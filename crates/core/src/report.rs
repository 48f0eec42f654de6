//! Run report: per-entity created/updated counts and failed branches.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Season,
    Meeting,
    Session,
    Driver,
    SessionDriver,
    Stint,
    Lap,
    PitStop,
    SessionResult,
    StartGrid,
    PointsScored,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Season => write!(f, "season"),
            EntityKind::Meeting => write!(f, "meeting"),
            EntityKind::Session => write!(f, "session"),
            EntityKind::Driver => write!(f, "driver"),
            EntityKind::SessionDriver => write!(f, "session_driver"),
            EntityKind::Stint => write!(f, "stint"),
            EntityKind::Lap => write!(f, "lap"),
            EntityKind::PitStop => write!(f, "pit_stop"),
            EntityKind::SessionResult => write!(f, "session_result"),
            EntityKind::StartGrid => write!(f, "start_grid"),
            EntityKind::PointsScored => write!(f, "points_scored"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EntityCounts {
    pub created: u64,
    pub updated: u64,
}

/// Shared created/updated tally, safe to bump from concurrent tasks.
#[derive(Debug, Default)]
pub struct RunCounters {
    inner: Mutex<BTreeMap<EntityKind, EntityCounts>>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: EntityKind, created: bool) {
        let mut map = self.inner.lock().unwrap();
        let counts = map.entry(kind).or_default();
        if created {
            counts.created += 1;
        } else {
            counts.updated += 1;
        }
    }

    pub fn snapshot(&self) -> BTreeMap<EntityKind, EntityCounts> {
        self.inner.lock().unwrap().clone()
    }
}

/// A branch that exhausted its retry budget or otherwise failed terminally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchFailure {
    /// Logical branch label, e.g. `meetings/2024` or `laps/9158/44`.
    pub branch: String,
    pub error: String,
}

/// Outcome of one ingestion run. Partial failure is still a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: String,
    pub seasons: Vec<i32>,
    pub counts: BTreeMap<EntityKind, EntityCounts>,
    pub failures: Vec<BranchFailure>,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn total_created(&self) -> u64 {
        self.counts.values().map(|c| c.created).sum()
    }

    pub fn total_updated(&self) -> u64 {
        self.counts.values().map(|c| c.updated).sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} (source: {}, seasons: {:?}, {:.1}s)",
            self.run_id, self.source, self.seasons, self.duration_secs
        )?;
        for (kind, counts) in &self.counts {
            writeln!(
                f,
                "  {:<16} created={:<6} updated={}",
                kind.to_string(),
                counts.created,
                counts.updated
            )?;
        }
        if self.failures.is_empty() {
            writeln!(f, "  no failed branches")?;
        } else {
            writeln!(f, "  failed branches ({}):", self.failures.len())?;
            for failure in &self.failures {
                writeln!(f, "    {}: {}", failure.branch, failure.error)?;
            }
        }
        Ok(())
    }
}
