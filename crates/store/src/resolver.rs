//! Natural-key get-or-create logic for every entity type.
//!
//! The resolver is constructed per run, holds the in-run identity cache,
//! and is the only component that calls the [`EntityStore`] write path.
//! Dependent records whose owner cannot be resolved are skipped rather
//! than failed; upstream data legitimately omits some combinations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use pitwall_core::config::DriverNamePolicy;
use pitwall_core::points::{fastest_lap_bonus, points_for_position};
use pitwall_core::record::{
    DriverRecord, GridRecord, LapRecord, MeetingRecord, PitStopRecord, ResultRecord,
    SessionRecord, StintRecord,
};
use pitwall_core::{EntityKind, RunCounters};

use crate::error::StoreError;
use crate::store::{EntityStore, StintRange};

/// Session types whose results carry championship points.
const POINTS_SESSION_TYPES: &[&str] = &["Race", "Sprint"];

#[derive(Default)]
struct IdentityCache {
    seasons: HashMap<i32, i64>,
    meetings: HashMap<(i64, i32), i64>,
    sessions: HashMap<(i64, String), i64>,
    drivers: HashMap<i32, i64>,
    /// (session_id, driver_number) → session_driver id.
    session_drivers: HashMap<(i64, i32), i64>,
    /// session_driver id → known stints, for lap assignment.
    stints: HashMap<i64, Vec<StintRange>>,
}

pub struct EntityResolver {
    store: Arc<dyn EntityStore>,
    policy: DriverNamePolicy,
    counters: Arc<RunCounters>,
    cache: Mutex<IdentityCache>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn EntityStore>, policy: DriverNamePolicy) -> Self {
        Self {
            store,
            policy,
            counters: Arc::new(RunCounters::new()),
            cache: Mutex::new(IdentityCache::default()),
        }
    }

    pub fn counters(&self) -> Arc<RunCounters> {
        self.counters.clone()
    }

    // ── Top of the dependency graph ──────────────────────────────────

    pub async fn season(&self, year: i32) -> Result<i64, StoreError> {
        if let Some(&id) = self.cache.lock().unwrap().seasons.get(&year) {
            return Ok(id);
        }
        let resolved = self.store.upsert_season(year).await?;
        self.counters.record(EntityKind::Season, resolved.created);
        self.cache.lock().unwrap().seasons.insert(year, resolved.id);
        Ok(resolved.id)
    }

    pub async fn meeting(&self, season_id: i64, rec: &MeetingRecord) -> Result<i64, StoreError> {
        let key = (season_id, rec.meeting_key);
        if let Some(&id) = self.cache.lock().unwrap().meetings.get(&key) {
            return Ok(id);
        }
        let resolved = self.store.upsert_meeting(season_id, rec).await?;
        self.counters.record(EntityKind::Meeting, resolved.created);
        self.cache.lock().unwrap().meetings.insert(key, resolved.id);
        Ok(resolved.id)
    }

    pub async fn session(&self, meeting_id: i64, rec: &SessionRecord) -> Result<i64, StoreError> {
        let key = (meeting_id, rec.session_type.clone());
        if let Some(&id) = self.cache.lock().unwrap().sessions.get(&key) {
            return Ok(id);
        }
        let resolved = self.store.upsert_session(meeting_id, rec).await?;
        self.counters.record(EntityKind::Session, resolved.created);
        self.cache.lock().unwrap().sessions.insert(key, resolved.id);
        Ok(resolved.id)
    }

    pub async fn driver(&self, rec: &DriverRecord) -> Result<i64, StoreError> {
        // No cache short-circuit: a later record may carry descriptive
        // fields an earlier one lacked, and the policy decides the merge.
        let resolved = self.store.upsert_driver(rec, self.policy).await?;
        self.counters.record(EntityKind::Driver, resolved.created);
        self.cache
            .lock()
            .unwrap()
            .drivers
            .insert(rec.driver_number, resolved.id);
        Ok(resolved.id)
    }

    // ── The join point everything hangs off ──────────────────────────

    /// Resolve (or create) the SessionDriver for a driver number within a
    /// session. Returns `None` when the driver is unknown to this run and
    /// to storage; callers skip the dependent record in that case.
    pub async fn session_driver(
        &self,
        session_id: i64,
        driver_number: i32,
    ) -> Result<Option<i64>, StoreError> {
        let key = (session_id, driver_number);
        if let Some(&id) = self.cache.lock().unwrap().session_drivers.get(&key) {
            return Ok(Some(id));
        }

        let driver_id = {
            let cached = self.cache.lock().unwrap().drivers.get(&driver_number).copied();
            match cached {
                Some(id) => id,
                None => match self.store.find_driver(driver_number).await? {
                    Some(id) => {
                        self.cache.lock().unwrap().drivers.insert(driver_number, id);
                        id
                    }
                    None => {
                        debug!(driver_number, session_id, "unknown driver, skipping");
                        return Ok(None);
                    }
                },
            }
        };

        let resolved = self
            .store
            .get_or_create_session_driver(driver_id, session_id)
            .await?;
        self.counters
            .record(EntityKind::SessionDriver, resolved.created);
        self.cache
            .lock()
            .unwrap()
            .session_drivers
            .insert(key, resolved.id);
        Ok(Some(resolved.id))
    }

    // ── Dependent entities ───────────────────────────────────────────

    pub async fn stint(
        &self,
        session_id: i64,
        rec: &StintRecord,
    ) -> Result<Option<i64>, StoreError> {
        let Some(session_driver_id) = self.session_driver(session_id, rec.driver_number).await?
        else {
            return Ok(None);
        };
        let resolved = self.store.upsert_stint(session_driver_id, rec).await?;
        self.counters.record(EntityKind::Stint, resolved.created);

        let mut cache = self.cache.lock().unwrap();
        let ranges = cache.stints.entry(session_driver_id).or_default();
        if !ranges.iter().any(|r| r.stint_number == rec.stint_number) {
            ranges.push(StintRange {
                id: resolved.id,
                stint_number: rec.stint_number,
                lap_start: rec.lap_start,
                lap_end: rec.lap_end,
            });
            ranges.sort_by_key(|r| r.stint_number);
        }
        Ok(Some(resolved.id))
    }

    /// Persist a lap, assigning it to the owning stint. Returns false when
    /// the owner chain (driver → session driver → stint) cannot be
    /// resolved.
    pub async fn lap(&self, session_id: i64, rec: &LapRecord) -> Result<bool, StoreError> {
        let Some(session_driver_id) = self.session_driver(session_id, rec.driver_number).await?
        else {
            return Ok(false);
        };

        let stints = self.stints_for(session_driver_id).await?;
        let Some(stint_id) = assign_stint(&stints, rec) else {
            debug!(
                session_id,
                driver_number = rec.driver_number,
                lap_number = rec.lap_number,
                "no stint for lap, skipping"
            );
            return Ok(false);
        };

        let resolved = self.store.upsert_lap(stint_id, rec).await?;
        self.counters.record(EntityKind::Lap, resolved.created);
        Ok(true)
    }

    pub async fn pit_stop(
        &self,
        session_id: i64,
        rec: &PitStopRecord,
    ) -> Result<bool, StoreError> {
        let Some(session_driver_id) = self.session_driver(session_id, rec.driver_number).await?
        else {
            return Ok(false);
        };
        let resolved = self.store.upsert_pit_stop(session_driver_id, rec).await?;
        self.counters.record(EntityKind::PitStop, resolved.created);
        Ok(true)
    }

    /// Persist a session result; for points-scoring session types, also
    /// derive the PointsScored row.
    pub async fn result(
        &self,
        session_id: i64,
        session_type: &str,
        rec: &ResultRecord,
    ) -> Result<bool, StoreError> {
        let Some(session_driver_id) = self.session_driver(session_id, rec.driver_number).await?
        else {
            return Ok(false);
        };
        let resolved = self.store.upsert_result(session_driver_id, rec).await?;
        self.counters
            .record(EntityKind::SessionResult, resolved.created);

        if POINTS_SESSION_TYPES.contains(&session_type) {
            self.points(resolved.id, rec).await?;
        }
        Ok(true)
    }

    pub async fn start_grid(
        &self,
        session_id: i64,
        rec: &GridRecord,
    ) -> Result<bool, StoreError> {
        let Some(session_driver_id) = self.session_driver(session_id, rec.driver_number).await?
        else {
            return Ok(false);
        };
        let resolved = self.store.upsert_start_grid(session_driver_id, rec).await?;
        self.counters
            .record(EntityKind::StartGrid, resolved.created);
        Ok(true)
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn stints_for(&self, session_driver_id: i64) -> Result<Vec<StintRange>, StoreError> {
        if let Some(ranges) = self.cache.lock().unwrap().stints.get(&session_driver_id) {
            if !ranges.is_empty() {
                return Ok(ranges.clone());
            }
        }
        // Stints may predate this run (earlier import) or this branch
        // (stint fetch failed while laps succeeded).
        let ranges = self.store.stints_for(session_driver_id).await?;
        self.cache
            .lock()
            .unwrap()
            .stints
            .insert(session_driver_id, ranges.clone());
        Ok(ranges)
    }

    async fn points(&self, session_result_id: i64, rec: &ResultRecord) -> Result<(), StoreError> {
        let (earned, bonus) = match rec.points {
            // The source carries points: a surplus over the table value
            // for the finishing position is the fastest-lap bonus.
            Some(earned) => {
                let bonus = rec
                    .final_position
                    .map(|pos| fastest_lap_bonus(earned, pos))
                    .unwrap_or(false);
                (earned, bonus)
            }
            // No points column: fall back to the table.
            None => match rec.final_position.and_then(points_for_position) {
                Some(table) => (table, false),
                None => return Ok(()),
            },
        };
        let resolved = self
            .store
            .upsert_points(session_result_id, earned, rec.final_position, bonus)
            .await?;
        self.counters
            .record(EntityKind::PointsScored, resolved.created);
        Ok(())
    }
}

/// Pick the stint a lap belongs to: lap-range match first, then the
/// record's own stint number, then the first stint.
fn assign_stint(stints: &[StintRange], rec: &LapRecord) -> Option<i64> {
    if let Some(stint) = stints.iter().find(|s| {
        matches!((s.lap_start, s.lap_end), (Some(start), Some(end))
            if (start..=end).contains(&rec.lap_number))
    }) {
        return Some(stint.id);
    }
    if let Some(number) = rec.stint_number {
        if let Some(stint) = stints.iter().find(|s| s.stint_number == number) {
            return Some(stint.id);
        }
    }
    stints.first().map(|s| s.id)
}
