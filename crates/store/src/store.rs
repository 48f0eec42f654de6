//! The persistence seam: every write into storage goes through
//! [`EntityStore`].
//!
//! Each `upsert_*` is an atomic conditional insert keyed on the entity's
//! natural key. Under concurrency the losing creator receives the existing
//! row (`created == false`) instead of an error, which is what makes
//! re-runs and concurrent waves duplicate-free.

use async_trait::async_trait;

use pitwall_core::config::DriverNamePolicy;
use pitwall_core::record::{
    DriverRecord, GridRecord, LapRecord, MeetingRecord, PitStopRecord, ResultRecord,
    SessionRecord, StintRecord,
};

use crate::error::StoreError;

/// Handle returned by every conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub id: i64,
    /// True when this call inserted the row, false when it found one.
    pub created: bool,
}

/// Enough of a stint to assign laps to it.
#[derive(Debug, Clone, Copy)]
pub struct StintRange {
    pub id: i64,
    pub stint_number: i32,
    pub lap_start: Option<i32>,
    pub lap_end: Option<i32>,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn upsert_season(&self, year: i32) -> Result<Resolved, StoreError>;

    async fn upsert_meeting(
        &self,
        season_id: i64,
        rec: &MeetingRecord,
    ) -> Result<Resolved, StoreError>;

    async fn upsert_session(
        &self,
        meeting_id: i64,
        rec: &SessionRecord,
    ) -> Result<Resolved, StoreError>;

    /// Upsert by driver number; descriptive fields refresh per `policy`.
    async fn upsert_driver(
        &self,
        rec: &DriverRecord,
        policy: DriverNamePolicy,
    ) -> Result<Resolved, StoreError>;

    /// Lookup for drivers referenced by number only (pit stops, stints for
    /// a driver absent from the session's driver list).
    async fn find_driver(&self, driver_number: i32) -> Result<Option<i64>, StoreError>;

    async fn get_or_create_session_driver(
        &self,
        driver_id: i64,
        session_id: i64,
    ) -> Result<Resolved, StoreError>;

    async fn upsert_stint(
        &self,
        session_driver_id: i64,
        rec: &StintRecord,
    ) -> Result<Resolved, StoreError>;

    async fn stints_for(&self, session_driver_id: i64) -> Result<Vec<StintRange>, StoreError>;

    async fn upsert_lap(&self, stint_id: i64, rec: &LapRecord) -> Result<Resolved, StoreError>;

    async fn upsert_pit_stop(
        &self,
        session_driver_id: i64,
        rec: &PitStopRecord,
    ) -> Result<Resolved, StoreError>;

    async fn upsert_result(
        &self,
        session_driver_id: i64,
        rec: &ResultRecord,
    ) -> Result<Resolved, StoreError>;

    async fn upsert_start_grid(
        &self,
        session_driver_id: i64,
        rec: &GridRecord,
    ) -> Result<Resolved, StoreError>;

    async fn upsert_points(
        &self,
        session_result_id: i64,
        points_earned: f64,
        position: Option<i32>,
        fastest_lap_point: bool,
    ) -> Result<Resolved, StoreError>;
}
