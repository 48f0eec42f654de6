//! PostgreSQL backend.
//!
//! Every upsert targets the natural-key unique constraint with
//! `ON CONFLICT ... DO UPDATE ... RETURNING id, (xmax = 0)`. The `xmax = 0`
//! test distinguishes a fresh insert from a conflict-update, and the
//! conflict path hands the existing row back to the losing concurrent
//! creator instead of raising a unique violation.

use async_trait::async_trait;
use sqlx::PgPool;

use pitwall_core::config::DriverNamePolicy;
use pitwall_core::record::{
    DriverRecord, GridRecord, LapRecord, MeetingRecord, PitStopRecord, ResultRecord,
    SessionRecord, StintRecord,
};

use crate::error::StoreError;
use crate::store::{EntityStore, Resolved, StintRange};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn resolved(row: (i64, bool)) -> Resolved {
    Resolved {
        id: row.0,
        created: row.1,
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn upsert_season(&self, year: i32) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO season (year) VALUES ($1)
             ON CONFLICT (year) DO UPDATE SET year = EXCLUDED.year
             RETURNING id, (xmax = 0)",
        )
        .bind(year)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }

    async fn upsert_meeting(
        &self,
        season_id: i64,
        rec: &MeetingRecord,
    ) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO meeting (season_id, meeting_key, country_name, country_code,
                                  location, date_start, meeting_official_name,
                                  meeting_standard_name)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (season_id, meeting_key) DO UPDATE SET
                country_name          = COALESCE(EXCLUDED.country_name, meeting.country_name),
                country_code          = COALESCE(EXCLUDED.country_code, meeting.country_code),
                location              = COALESCE(EXCLUDED.location, meeting.location),
                date_start            = COALESCE(EXCLUDED.date_start, meeting.date_start),
                meeting_official_name = EXCLUDED.meeting_official_name,
                meeting_standard_name = EXCLUDED.meeting_standard_name
             RETURNING id, (xmax = 0)",
        )
        .bind(season_id)
        .bind(rec.meeting_key)
        .bind(&rec.country_name)
        .bind(&rec.country_code)
        .bind(&rec.location)
        .bind(rec.date_start)
        .bind(&rec.official_name)
        .bind(&rec.standard_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }

    async fn upsert_session(
        &self,
        meeting_id: i64,
        rec: &SessionRecord,
    ) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO session (meeting_id, session_name, session_type, session_key)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (meeting_id, session_type) DO UPDATE SET
                session_name = EXCLUDED.session_name,
                session_key  = COALESCE(EXCLUDED.session_key, session.session_key)
             RETURNING id, (xmax = 0)",
        )
        .bind(meeting_id)
        .bind(&rec.session_name)
        .bind(&rec.session_type)
        .bind(rec.session_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }

    async fn upsert_driver(
        &self,
        rec: &DriverRecord,
        policy: DriverNamePolicy,
    ) -> Result<Resolved, StoreError> {
        // The two policies differ only in COALESCE argument order.
        let sql = match policy {
            DriverNamePolicy::PreferExisting => {
                "INSERT INTO driver (driver_number, full_name, name_acronym, headshot_url)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (driver_number) DO UPDATE SET
                    full_name    = COALESCE(driver.full_name, EXCLUDED.full_name),
                    name_acronym = COALESCE(driver.name_acronym, EXCLUDED.name_acronym),
                    headshot_url = COALESCE(driver.headshot_url, EXCLUDED.headshot_url)
                 RETURNING id, (xmax = 0)"
            }
            DriverNamePolicy::PreferLatest => {
                "INSERT INTO driver (driver_number, full_name, name_acronym, headshot_url)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (driver_number) DO UPDATE SET
                    full_name    = COALESCE(EXCLUDED.full_name, driver.full_name),
                    name_acronym = COALESCE(EXCLUDED.name_acronym, driver.name_acronym),
                    headshot_url = COALESCE(EXCLUDED.headshot_url, driver.headshot_url)
                 RETURNING id, (xmax = 0)"
            }
        };
        let row = sqlx::query_as::<_, (i64, bool)>(sql)
            .bind(rec.driver_number)
            .bind(&rec.full_name)
            .bind(&rec.name_acronym)
            .bind(&rec.headshot_url)
            .fetch_one(&self.pool)
            .await?;
        Ok(resolved(row))
    }

    async fn find_driver(&self, driver_number: i32) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM driver WHERE driver_number = $1")
            .bind(driver_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn get_or_create_session_driver(
        &self,
        driver_id: i64,
        session_id: i64,
    ) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO session_driver (driver_id, session_id)
             VALUES ($1, $2)
             ON CONFLICT (driver_id, session_id) DO UPDATE SET driver_id = EXCLUDED.driver_id
             RETURNING id, (xmax = 0)",
        )
        .bind(driver_id)
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }

    async fn upsert_stint(
        &self,
        session_driver_id: i64,
        rec: &StintRecord,
    ) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO stint (session_driver_id, stint_number, compound, lap_start,
                                lap_end, tyre_age_at_start)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (session_driver_id, stint_number) DO UPDATE SET
                compound          = COALESCE(EXCLUDED.compound, stint.compound),
                lap_start         = COALESCE(EXCLUDED.lap_start, stint.lap_start),
                lap_end           = COALESCE(EXCLUDED.lap_end, stint.lap_end),
                tyre_age_at_start = COALESCE(EXCLUDED.tyre_age_at_start, stint.tyre_age_at_start)
             RETURNING id, (xmax = 0)",
        )
        .bind(session_driver_id)
        .bind(rec.stint_number)
        .bind(&rec.compound)
        .bind(rec.lap_start)
        .bind(rec.lap_end)
        .bind(rec.tyre_age_at_start)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }

    async fn stints_for(&self, session_driver_id: i64) -> Result<Vec<StintRange>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, i32, Option<i32>, Option<i32>)>(
            "SELECT id, stint_number, lap_start, lap_end
             FROM stint
             WHERE session_driver_id = $1
             ORDER BY stint_number",
        )
        .bind(session_driver_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, stint_number, lap_start, lap_end)| StintRange {
                id,
                stint_number,
                lap_start,
                lap_end,
            })
            .collect())
    }

    async fn upsert_lap(&self, stint_id: i64, rec: &LapRecord) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO lap (stint_id, lap_number, duration_sector_1, duration_sector_2,
                              duration_sector_3, lap_duration, is_pit_out_lap, speed_trap)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (stint_id, lap_number) DO UPDATE SET
                duration_sector_1 = COALESCE(EXCLUDED.duration_sector_1, lap.duration_sector_1),
                duration_sector_2 = COALESCE(EXCLUDED.duration_sector_2, lap.duration_sector_2),
                duration_sector_3 = COALESCE(EXCLUDED.duration_sector_3, lap.duration_sector_3),
                lap_duration      = COALESCE(EXCLUDED.lap_duration, lap.lap_duration),
                is_pit_out_lap    = EXCLUDED.is_pit_out_lap,
                speed_trap        = COALESCE(EXCLUDED.speed_trap, lap.speed_trap)
             RETURNING id, (xmax = 0)",
        )
        .bind(stint_id)
        .bind(rec.lap_number)
        .bind(rec.duration_sector_1)
        .bind(rec.duration_sector_2)
        .bind(rec.duration_sector_3)
        .bind(rec.lap_duration)
        .bind(rec.is_pit_out_lap)
        .bind(rec.speed_trap)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }

    async fn upsert_pit_stop(
        &self,
        session_driver_id: i64,
        rec: &PitStopRecord,
    ) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO pit_stop (session_driver_id, lap_number, pit_duration)
             VALUES ($1, $2, $3)
             ON CONFLICT (session_driver_id, lap_number) DO UPDATE SET
                pit_duration = COALESCE(EXCLUDED.pit_duration, pit_stop.pit_duration)
             RETURNING id, (xmax = 0)",
        )
        .bind(session_driver_id)
        .bind(rec.lap_number)
        .bind(rec.pit_duration)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }

    async fn upsert_result(
        &self,
        session_driver_id: i64,
        rec: &ResultRecord,
    ) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO session_result (session_driver_id, number_of_laps_completed, dnf, dns,
                                         dsq, final_position, fastest_lap_time, total_race_time,
                                         status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (session_driver_id) DO UPDATE SET
                number_of_laps_completed = COALESCE(EXCLUDED.number_of_laps_completed, session_result.number_of_laps_completed),
                dnf              = EXCLUDED.dnf,
                dns              = EXCLUDED.dns,
                dsq              = EXCLUDED.dsq,
                final_position   = COALESCE(EXCLUDED.final_position, session_result.final_position),
                fastest_lap_time = COALESCE(EXCLUDED.fastest_lap_time, session_result.fastest_lap_time),
                total_race_time  = COALESCE(EXCLUDED.total_race_time, session_result.total_race_time),
                status           = COALESCE(EXCLUDED.status, session_result.status)
             RETURNING id, (xmax = 0)",
        )
        .bind(session_driver_id)
        .bind(rec.laps_completed)
        .bind(rec.dnf)
        .bind(rec.dns)
        .bind(rec.dsq)
        .bind(rec.final_position)
        .bind(rec.fastest_lap_time)
        .bind(rec.total_time)
        .bind(&rec.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }

    async fn upsert_start_grid(
        &self,
        session_driver_id: i64,
        rec: &GridRecord,
    ) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO start_grid (session_driver_id, grid_position, qualy_time)
             VALUES ($1, $2, $3)
             ON CONFLICT (session_driver_id) DO UPDATE SET
                grid_position = COALESCE(EXCLUDED.grid_position, start_grid.grid_position),
                qualy_time    = COALESCE(EXCLUDED.qualy_time, start_grid.qualy_time)
             RETURNING id, (xmax = 0)",
        )
        .bind(session_driver_id)
        .bind(rec.grid_position)
        .bind(rec.qualy_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }

    async fn upsert_points(
        &self,
        session_result_id: i64,
        points_earned: f64,
        position: Option<i32>,
        fastest_lap_point: bool,
    ) -> Result<Resolved, StoreError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "INSERT INTO points_scored (session_result_id, points_earned, position,
                                        fastest_lap_point)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (session_result_id) DO UPDATE SET
                points_earned     = EXCLUDED.points_earned,
                position          = COALESCE(EXCLUDED.position, points_scored.position),
                fastest_lap_point = EXCLUDED.fastest_lap_point
             RETURNING id, (xmax = 0)",
        )
        .bind(session_result_id)
        .bind(points_earned)
        .bind(position)
        .bind(fastest_lap_point)
        .fetch_one(&self.pool)
        .await?;
        Ok(resolved(row))
    }
}
