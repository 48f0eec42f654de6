//! Canonical record shapes produced by source adapters.
//!
//! Both upstream schemas normalize into these before anything touches
//! storage. Absent timing data is `None`, never zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A race weekend within a season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub meeting_key: i32,
    pub year: i32,
    pub country_name: Option<String>,
    pub country_code: Option<String>,
    pub location: Option<String>,
    pub date_start: Option<NaiveDate>,
    pub official_name: String,
    /// Sponsor-stripped name, see `normalize::standard_meeting_name`.
    pub standard_name: String,
}

/// A discrete on-track segment of a meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_key: i32,
    pub meeting_key: i32,
    pub session_name: String,
    pub session_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRecord {
    pub driver_number: i32,
    pub full_name: Option<String>,
    pub name_acronym: Option<String>,
    pub headshot_url: Option<String>,
}

/// A continuous run on one set of tyres.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StintRecord {
    pub driver_number: i32,
    pub stint_number: i32,
    pub compound: Option<String>,
    pub lap_start: Option<i32>,
    pub lap_end: Option<i32>,
    pub tyre_age_at_start: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapRecord {
    pub driver_number: i32,
    pub lap_number: i32,
    /// Stint number when the source carries it (archive does, live doesn't).
    pub stint_number: Option<i32>,
    pub duration_sector_1: Option<f64>,
    pub duration_sector_2: Option<f64>,
    pub duration_sector_3: Option<f64>,
    pub lap_duration: Option<f64>,
    pub is_pit_out_lap: bool,
    pub speed_trap: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitStopRecord {
    pub driver_number: i32,
    pub lap_number: i32,
    pub pit_duration: Option<f64>,
}

/// Final classification for one driver in one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub driver_number: i32,
    pub laps_completed: Option<i32>,
    pub dnf: bool,
    pub dns: bool,
    pub dsq: bool,
    pub final_position: Option<i32>,
    pub fastest_lap_time: Option<f64>,
    pub total_time: Option<f64>,
    pub status: Option<String>,
    /// Championship points when the source carries them; otherwise derived
    /// from the position table at persistence time.
    pub points: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridRecord {
    pub driver_number: i32,
    pub grid_position: Option<i32>,
    pub qualy_time: Option<f64>,
}
