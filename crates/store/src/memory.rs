//! In-memory backend mirroring the PostgreSQL conditional-insert
//! semantics. Used by tests and `--dry-run` ingestion.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use pitwall_core::config::DriverNamePolicy;
use pitwall_core::record::{
    DriverRecord, GridRecord, LapRecord, MeetingRecord, PitStopRecord, ResultRecord,
    SessionRecord, StintRecord,
};
use pitwall_core::EntityKind;

use crate::error::StoreError;
use crate::store::{EntityStore, Resolved, StintRange};

#[derive(Default)]
struct Rows {
    next_id: i64,
    seasons: HashMap<i32, i64>,
    meetings: HashMap<(i64, i32), i64>,
    sessions: HashMap<(i64, String), i64>,
    drivers: HashMap<i32, i64>,
    driver_records: HashMap<i64, DriverRecord>,
    session_drivers: HashMap<(i64, i64), i64>,
    stints: HashMap<(i64, i32), i64>,
    stint_ranges: HashMap<i64, Vec<StintRange>>,
    laps: HashMap<(i64, i32), i64>,
    pit_stops: HashMap<(i64, i32), i64>,
    results: HashMap<i64, i64>,
    grids: HashMap<i64, i64>,
    points: HashMap<i64, PointsRow>,
}

#[derive(Debug, Clone)]
pub struct PointsRow {
    pub id: i64,
    pub points_earned: f64,
    pub position: Option<i32>,
    pub fastest_lap_point: bool,
}

impl Rows {
    fn alloc(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Rows>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row counts per entity, for idempotence assertions.
    pub fn row_counts(&self) -> BTreeMap<EntityKind, usize> {
        let rows = self.rows.lock().unwrap();
        let mut counts = BTreeMap::new();
        counts.insert(EntityKind::Season, rows.seasons.len());
        counts.insert(EntityKind::Meeting, rows.meetings.len());
        counts.insert(EntityKind::Session, rows.sessions.len());
        counts.insert(EntityKind::Driver, rows.drivers.len());
        counts.insert(EntityKind::SessionDriver, rows.session_drivers.len());
        counts.insert(EntityKind::Stint, rows.stints.len());
        counts.insert(EntityKind::Lap, rows.laps.len());
        counts.insert(EntityKind::PitStop, rows.pit_stops.len());
        counts.insert(EntityKind::SessionResult, rows.results.len());
        counts.insert(EntityKind::StartGrid, rows.grids.len());
        counts.insert(EntityKind::PointsScored, rows.points.len());
        counts
    }

    /// Stored points rows, for bonus-derivation assertions.
    pub fn points_rows(&self) -> Vec<PointsRow> {
        let rows = self.rows.lock().unwrap();
        rows.points.values().cloned().collect()
    }

    /// Stored descriptive fields for a driver, for policy assertions.
    pub fn driver_record(&self, driver_number: i32) -> Option<DriverRecord> {
        let rows = self.rows.lock().unwrap();
        let id = rows.drivers.get(&driver_number)?;
        rows.driver_records.get(id).cloned()
    }
}

fn get_or_insert(map: &mut HashMap<(i64, i32), i64>, key: (i64, i32), next: i64) -> Resolved {
    match map.get(&key) {
        Some(&id) => Resolved { id, created: false },
        None => {
            map.insert(key, next);
            Resolved {
                id: next,
                created: true,
            }
        }
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn upsert_season(&self, year: i32) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(&id) = rows.seasons.get(&year) {
            return Ok(Resolved { id, created: false });
        }
        let id = rows.alloc();
        rows.seasons.insert(year, id);
        Ok(Resolved { id, created: true })
    }

    async fn upsert_meeting(
        &self,
        season_id: i64,
        rec: &MeetingRecord,
    ) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let next = rows.alloc();
        Ok(get_or_insert(
            &mut rows.meetings,
            (season_id, rec.meeting_key),
            next,
        ))
    }

    async fn upsert_session(
        &self,
        meeting_id: i64,
        rec: &SessionRecord,
    ) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let key = (meeting_id, rec.session_type.clone());
        if let Some(&id) = rows.sessions.get(&key) {
            return Ok(Resolved { id, created: false });
        }
        let id = rows.alloc();
        rows.sessions.insert(key, id);
        Ok(Resolved { id, created: true })
    }

    async fn upsert_driver(
        &self,
        rec: &DriverRecord,
        policy: DriverNamePolicy,
    ) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(&id) = rows.drivers.get(&rec.driver_number) {
            let existing = rows.driver_records.entry(id).or_insert_with(|| rec.clone());
            match policy {
                DriverNamePolicy::PreferExisting => {
                    if existing.full_name.is_none() {
                        existing.full_name = rec.full_name.clone();
                    }
                    if existing.name_acronym.is_none() {
                        existing.name_acronym = rec.name_acronym.clone();
                    }
                    if existing.headshot_url.is_none() {
                        existing.headshot_url = rec.headshot_url.clone();
                    }
                }
                DriverNamePolicy::PreferLatest => {
                    if rec.full_name.is_some() {
                        existing.full_name = rec.full_name.clone();
                    }
                    if rec.name_acronym.is_some() {
                        existing.name_acronym = rec.name_acronym.clone();
                    }
                    if rec.headshot_url.is_some() {
                        existing.headshot_url = rec.headshot_url.clone();
                    }
                }
            }
            return Ok(Resolved { id, created: false });
        }
        let id = rows.alloc();
        rows.drivers.insert(rec.driver_number, id);
        rows.driver_records.insert(id, rec.clone());
        Ok(Resolved { id, created: true })
    }

    async fn find_driver(&self, driver_number: i32) -> Result<Option<i64>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.drivers.get(&driver_number).copied())
    }

    async fn get_or_create_session_driver(
        &self,
        driver_id: i64,
        session_id: i64,
    ) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let key = (driver_id, session_id);
        if let Some(&id) = rows.session_drivers.get(&key) {
            return Ok(Resolved { id, created: false });
        }
        let id = rows.alloc();
        rows.session_drivers.insert(key, id);
        Ok(Resolved { id, created: true })
    }

    async fn upsert_stint(
        &self,
        session_driver_id: i64,
        rec: &StintRecord,
    ) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let key = (session_driver_id, rec.stint_number);
        if let Some(&id) = rows.stints.get(&key) {
            return Ok(Resolved { id, created: false });
        }
        let id = rows.alloc();
        rows.stints.insert(key, id);
        rows.stint_ranges
            .entry(session_driver_id)
            .or_default()
            .push(StintRange {
                id,
                stint_number: rec.stint_number,
                lap_start: rec.lap_start,
                lap_end: rec.lap_end,
            });
        Ok(Resolved { id, created: true })
    }

    async fn stints_for(&self, session_driver_id: i64) -> Result<Vec<StintRange>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut ranges = rows
            .stint_ranges
            .get(&session_driver_id)
            .cloned()
            .unwrap_or_default();
        ranges.sort_by_key(|r| r.stint_number);
        Ok(ranges)
    }

    async fn upsert_lap(&self, stint_id: i64, rec: &LapRecord) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let next = rows.alloc();
        Ok(get_or_insert(
            &mut rows.laps,
            (stint_id, rec.lap_number),
            next,
        ))
    }

    async fn upsert_pit_stop(
        &self,
        session_driver_id: i64,
        rec: &PitStopRecord,
    ) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let next = rows.alloc();
        Ok(get_or_insert(
            &mut rows.pit_stops,
            (session_driver_id, rec.lap_number),
            next,
        ))
    }

    async fn upsert_result(
        &self,
        session_driver_id: i64,
        _rec: &ResultRecord,
    ) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(&id) = rows.results.get(&session_driver_id) {
            return Ok(Resolved { id, created: false });
        }
        let id = rows.alloc();
        rows.results.insert(session_driver_id, id);
        Ok(Resolved { id, created: true })
    }

    async fn upsert_start_grid(
        &self,
        session_driver_id: i64,
        _rec: &GridRecord,
    ) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(&id) = rows.grids.get(&session_driver_id) {
            return Ok(Resolved { id, created: false });
        }
        let id = rows.alloc();
        rows.grids.insert(session_driver_id, id);
        Ok(Resolved { id, created: true })
    }

    async fn upsert_points(
        &self,
        session_result_id: i64,
        points_earned: f64,
        position: Option<i32>,
        fastest_lap_point: bool,
    ) -> Result<Resolved, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.points.get_mut(&session_result_id) {
            row.points_earned = points_earned;
            row.position = position.or(row.position);
            row.fastest_lap_point = fastest_lap_point;
            let id = row.id;
            return Ok(Resolved { id, created: false });
        }
        let id = rows.alloc();
        rows.points.insert(
            session_result_id,
            PointsRow {
                id,
                points_earned,
                position,
                fastest_lap_point,
            },
        );
        Ok(Resolved { id, created: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(number: i32, name: Option<&str>) -> DriverRecord {
        DriverRecord {
            driver_number: number,
            full_name: name.map(String::from),
            name_acronym: None,
            headshot_url: None,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.upsert_season(2024).await.unwrap();
        let second = store.upsert_season(2024).await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.row_counts()[&EntityKind::Season], 1);
    }

    #[tokio::test]
    async fn prefer_existing_keeps_filled_name() {
        let store = MemoryStore::new();
        store
            .upsert_driver(&driver(44, Some("Lewis Hamilton")), DriverNamePolicy::PreferExisting)
            .await
            .unwrap();
        store
            .upsert_driver(&driver(44, None), DriverNamePolicy::PreferExisting)
            .await
            .unwrap();
        assert_eq!(
            store.driver_record(44).unwrap().full_name.as_deref(),
            Some("Lewis Hamilton")
        );
    }

    #[tokio::test]
    async fn prefer_latest_overwrites_when_value_present() {
        let store = MemoryStore::new();
        store
            .upsert_driver(&driver(1, Some("M Verstappen")), DriverNamePolicy::PreferLatest)
            .await
            .unwrap();
        // An emptier record must not erase the stored name either way.
        store
            .upsert_driver(&driver(1, None), DriverNamePolicy::PreferLatest)
            .await
            .unwrap();
        store
            .upsert_driver(&driver(1, Some("Max Verstappen")), DriverNamePolicy::PreferLatest)
            .await
            .unwrap();
        assert_eq!(
            store.driver_record(1).unwrap().full_name.as_deref(),
            Some("Max Verstappen")
        );
    }

    #[tokio::test]
    async fn concurrent_session_driver_creation_yields_one_row() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_create_session_driver(7, 9).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_create_session_driver(7, 9).await })
        };
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.row_counts()[&EntityKind::SessionDriver], 1);
    }
}
