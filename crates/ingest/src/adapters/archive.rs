//! Bulk-archive provider: PascalCase rows, clock-string durations,
//! free-text status, session-type codes, grid derived from the
//! classification rows.

use chrono::NaiveDate;
use serde_json::Value;

use pitwall_core::config::NormalizeConfig;
use pitwall_core::record::{
    DriverRecord, GridRecord, LapRecord, MeetingRecord, PitStopRecord, ResultRecord,
    SessionRecord, StintRecord,
};

use crate::adapter::{int_of, str_of, SourceAdapter};
use crate::fetch::ResourceKey;
use crate::normalize::{parse_duration, standard_meeting_name, status_flags, title_case};

#[derive(Debug)]
pub struct ArchiveAdapter {
    base_url: String,
    normalize: NormalizeConfig,
}

impl ArchiveAdapter {
    pub fn new(base_url: String, normalize: NormalizeConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            normalize,
        }
    }
}

/// Session-type codes used by the archive schedule.
fn session_type_name(code: &str) -> Option<&'static str> {
    match code {
        "R" => Some("Race"),
        "Q" => Some("Qualifying"),
        "S" => Some("Sprint"),
        "SQ" => Some("Sprint Qualifying"),
        "FP1" => Some("Practice 1"),
        "FP2" => Some("Practice 2"),
        "FP3" => Some("Practice 3"),
        _ => None,
    }
}

fn dur(row: &Value, field: &str) -> Option<f64> {
    row.get(field).and_then(parse_duration)
}

impl SourceAdapter for ArchiveAdapter {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn url_for(&self, key: &ResourceKey) -> String {
        let base = &self.base_url;
        match key {
            ResourceKey::Meetings { year } => format!("{base}/{year}/meetings.json"),
            ResourceKey::Sessions { meeting_key } => {
                format!("{base}/meetings/{meeting_key}/sessions.json")
            }
            ResourceKey::Drivers { session_key } => {
                format!("{base}/sessions/{session_key}/drivers.json")
            }
            ResourceKey::Stints { session_key } => {
                format!("{base}/sessions/{session_key}/stints.json")
            }
            ResourceKey::Laps {
                session_key,
                driver_number,
            } => format!("{base}/sessions/{session_key}/laps/{driver_number}.json"),
            ResourceKey::PitStops { session_key } => {
                format!("{base}/sessions/{session_key}/pit_stops.json")
            }
            // Results and grid are both views over the classification
            // file; they stay distinct logical resources.
            ResourceKey::Results { session_key } | ResourceKey::Grid { session_key } => {
                format!("{base}/sessions/{session_key}/classification.json")
            }
        }
    }

    fn parse_meetings(&self, year: i32, rows: &[Value]) -> Vec<MeetingRecord> {
        rows.iter()
            .filter_map(|row| {
                let official_name = str_of(row, "OfficialEventName")
                    .or_else(|| str_of(row, "EventName"))?
                    .to_string();
                Some(MeetingRecord {
                    meeting_key: int_of(row, "MeetingKey")
                        .or_else(|| int_of(row, "RoundNumber"))?,
                    year,
                    country_name: str_of(row, "Country").map(String::from),
                    country_code: str_of(row, "CountryCode").map(String::from),
                    location: str_of(row, "Location").map(String::from),
                    date_start: str_of(row, "EventDate").and_then(parse_date),
                    standard_name: standard_meeting_name(&official_name, &self.normalize),
                    official_name,
                })
            })
            .collect()
    }

    fn parse_sessions(&self, meeting_key: i32, rows: &[Value]) -> Vec<SessionRecord> {
        rows.iter()
            .filter_map(|row| {
                let code = str_of(row, "SessionType")?;
                let session_type = session_type_name(code)?.to_string();
                Some(SessionRecord {
                    session_key: int_of(row, "SessionKey")?,
                    meeting_key,
                    session_name: str_of(row, "SessionName")
                        .map(String::from)
                        .unwrap_or_else(|| session_type.clone()),
                    session_type,
                })
            })
            .collect()
    }

    fn parse_drivers(&self, rows: &[Value]) -> Vec<DriverRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(DriverRecord {
                    driver_number: int_of(row, "DriverNumber")?,
                    full_name: str_of(row, "FullName").map(title_case),
                    name_acronym: str_of(row, "Abbreviation").map(String::from),
                    headshot_url: str_of(row, "HeadshotUrl").map(String::from),
                })
            })
            .collect()
    }

    fn parse_stints(&self, rows: &[Value]) -> Vec<StintRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(StintRecord {
                    driver_number: int_of(row, "DriverNumber")?,
                    stint_number: int_of(row, "Stint")?,
                    compound: str_of(row, "Compound").map(String::from),
                    lap_start: int_of(row, "LapStart"),
                    lap_end: int_of(row, "LapEnd"),
                    tyre_age_at_start: int_of(row, "TyreAge"),
                })
            })
            .collect()
    }

    fn parse_laps(&self, driver_number: i32, rows: &[Value]) -> Vec<LapRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(LapRecord {
                    driver_number,
                    lap_number: int_of(row, "LapNumber")?,
                    stint_number: int_of(row, "Stint"),
                    duration_sector_1: dur(row, "Sector1Time"),
                    duration_sector_2: dur(row, "Sector2Time"),
                    duration_sector_3: dur(row, "Sector3Time"),
                    lap_duration: dur(row, "LapTime"),
                    is_pit_out_lap: row
                        .get("PitOutTime")
                        .is_some_and(|v| !v.is_null()),
                    speed_trap: dur(row, "SpeedST"),
                })
            })
            .collect()
    }

    fn parse_pit_stops(&self, rows: &[Value]) -> Vec<PitStopRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(PitStopRecord {
                    driver_number: int_of(row, "DriverNumber")?,
                    lap_number: int_of(row, "LapNumber")?,
                    pit_duration: dur(row, "PitDuration"),
                })
            })
            .collect()
    }

    fn parse_results(&self, rows: &[Value]) -> Vec<ResultRecord> {
        rows.iter()
            .filter_map(|row| {
                let status = str_of(row, "Status").map(String::from);
                let flags = status.as_deref().map(status_flags).unwrap_or_default();
                Some(ResultRecord {
                    driver_number: int_of(row, "DriverNumber")?,
                    laps_completed: int_of(row, "Laps"),
                    dnf: flags.dnf,
                    dns: flags.dns,
                    dsq: flags.dsq,
                    final_position: int_of(row, "Position"),
                    fastest_lap_time: dur(row, "FastestLapTime"),
                    total_time: dur(row, "Time"),
                    status,
                    points: row.get("Points").and_then(Value::as_f64),
                })
            })
            .collect()
    }

    fn parse_grid(&self, rows: &[Value]) -> Vec<GridRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(GridRecord {
                    driver_number: int_of(row, "DriverNumber")?,
                    grid_position: int_of(row, "GridPosition"),
                    // Best qualifying segment the driver reached.
                    qualy_time: dur(row, "Q3")
                        .or_else(|| dur(row, "Q2"))
                        .or_else(|| dur(row, "Q1")),
                })
            })
            .collect()
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> ArchiveAdapter {
        ArchiveAdapter::new("http://archive.local/f1".into(), NormalizeConfig::default())
    }

    #[test]
    fn results_and_grid_share_the_classification_url() {
        let adapter = adapter();
        let results = adapter.url_for(&ResourceKey::Results { session_key: 77 });
        let grid = adapter.url_for(&ResourceKey::Grid { session_key: 77 });
        assert_eq!(results, grid);
        assert_eq!(
            results,
            "http://archive.local/f1/sessions/77/classification.json"
        );
    }

    #[test]
    fn session_codes_map_to_canonical_names() {
        let rows = vec![
            json!({"SessionKey": 1, "SessionType": "R"}),
            json!({"SessionKey": 2, "SessionType": "Q"}),
            json!({"SessionKey": 3, "SessionType": "SQ"}),
            json!({"SessionKey": 4, "SessionType": "X"}),
        ];
        let sessions = adapter().parse_sessions(10, &rows);
        let types: Vec<&str> = sessions.iter().map(|s| s.session_type.as_str()).collect();
        assert_eq!(types, vec!["Race", "Qualifying", "Sprint Qualifying"]);
    }

    #[test]
    fn driver_numbers_arrive_quoted_and_names_need_casing() {
        let rows = vec![json!({
            "DriverNumber": "44",
            "FullName": "lewis HAMILTON",
            "Abbreviation": "HAM"
        })];
        let drivers = adapter().parse_drivers(&rows);
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].driver_number, 44);
        assert_eq!(drivers[0].full_name.as_deref(), Some("Lewis Hamilton"));
    }

    #[test]
    fn laps_parse_clock_strings_and_pit_out() {
        let rows = vec![json!({
            "LapNumber": 14,
            "Stint": 2,
            "Sector1Time": "0 days 00:00:28.566000",
            "Sector2Time": "0 days 00:00:38.224000",
            "Sector3Time": null,
            "LapTime": "1:34.123",
            "PitOutTime": "0 days 00:42:11.500000",
            "SpeedST": 308.0
        })];
        let laps = adapter().parse_laps(44, &rows);
        assert_eq!(laps.len(), 1);
        let lap = &laps[0];
        assert_eq!(lap.stint_number, Some(2));
        assert_eq!(lap.duration_sector_1, Some(28.566));
        assert_eq!(lap.duration_sector_3, None);
        assert_eq!(lap.lap_duration, Some(94.123));
        assert!(lap.is_pit_out_lap);
    }

    #[test]
    fn classification_yields_flags_points_and_grid() {
        let rows = vec![json!({
            "DriverNumber": "1",
            "Position": 1.0,
            "GridPosition": 2.0,
            "Laps": 57,
            "Status": "Finished",
            "Points": 26.0,
            "Time": "1:31:44.742",
            "Q1": "1:30.031", "Q2": "1:29.374", "Q3": "1:29.179"
        }), json!({
            "DriverNumber": "23",
            "Position": null,
            "GridPosition": 15.0,
            "Laps": 12,
            "Status": "Retired",
            "Points": 0.0,
            "Q1": "1:31.451", "Q2": null, "Q3": null
        })];
        let adapter = adapter();

        let results = adapter.parse_results(&rows);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].final_position, Some(1));
        assert_eq!(results[0].points, Some(26.0));
        assert!(!results[0].dnf);
        assert!(results[1].dnf);
        assert_eq!(results[1].final_position, None);

        let grid = adapter.parse_grid(&rows);
        assert_eq!(grid[0].grid_position, Some(2));
        assert_eq!(grid[0].qualy_time, Some(89.179));
        assert_eq!(grid[1].qualy_time, Some(91.451));
    }
}
