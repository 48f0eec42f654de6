//! Live-telemetry provider: snake_case rows, numeric durations in
//! seconds, a dedicated starting-grid resource, dnf/dns/dsq as booleans.

use chrono::NaiveDate;
use serde_json::Value;

use pitwall_core::config::NormalizeConfig;
use pitwall_core::record::{
    DriverRecord, GridRecord, LapRecord, MeetingRecord, PitStopRecord, ResultRecord,
    SessionRecord, StintRecord,
};

use crate::adapter::{bool_of, f64_of, int_of, str_of, SourceAdapter};
use crate::fetch::ResourceKey;
use crate::normalize::standard_meeting_name;

#[derive(Debug)]
pub struct LiveAdapter {
    base_url: String,
    normalize: NormalizeConfig,
}

impl LiveAdapter {
    pub fn new(base_url: String, normalize: NormalizeConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            normalize,
        }
    }
}

impl SourceAdapter for LiveAdapter {
    fn name(&self) -> &'static str {
        "live"
    }

    fn url_for(&self, key: &ResourceKey) -> String {
        let base = &self.base_url;
        match key {
            ResourceKey::Meetings { year } => format!("{base}/meetings?year={year}"),
            ResourceKey::Sessions { meeting_key } => {
                format!("{base}/sessions?meeting_key={meeting_key}")
            }
            ResourceKey::Drivers { session_key } => {
                format!("{base}/drivers?session_key={session_key}")
            }
            ResourceKey::Stints { session_key } => {
                format!("{base}/stints?session_key={session_key}")
            }
            ResourceKey::Laps {
                session_key,
                driver_number,
            } => format!("{base}/laps?session_key={session_key}&driver_number={driver_number}"),
            ResourceKey::PitStops { session_key } => {
                format!("{base}/pit?session_key={session_key}")
            }
            ResourceKey::Results { session_key } => {
                format!("{base}/session_result?session_key={session_key}")
            }
            ResourceKey::Grid { session_key } => {
                format!("{base}/starting_grid?session_key={session_key}")
            }
        }
    }

    fn parse_meetings(&self, year: i32, rows: &[Value]) -> Vec<MeetingRecord> {
        rows.iter()
            .filter_map(|row| {
                let official_name = str_of(row, "meeting_official_name")
                    .or_else(|| str_of(row, "meeting_name"))?
                    .to_string();
                Some(MeetingRecord {
                    meeting_key: int_of(row, "meeting_key")?,
                    year,
                    country_name: str_of(row, "country_name").map(String::from),
                    country_code: str_of(row, "country_code").map(String::from),
                    location: str_of(row, "location").map(String::from),
                    date_start: str_of(row, "date_start").and_then(parse_date),
                    standard_name: standard_meeting_name(&official_name, &self.normalize),
                    official_name,
                })
            })
            .collect()
    }

    fn parse_sessions(&self, meeting_key: i32, rows: &[Value]) -> Vec<SessionRecord> {
        rows.iter()
            .filter_map(|row| {
                let session_type = str_of(row, "session_type")?.to_string();
                Some(SessionRecord {
                    session_key: int_of(row, "session_key")?,
                    meeting_key,
                    session_name: str_of(row, "session_name")
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
                    driver_number: int_of(row, "driver_number")?,
                    full_name: str_of(row, "full_name").map(String::from),
                    name_acronym: str_of(row, "name_acronym").map(String::from),
                    headshot_url: str_of(row, "headshot_url").map(String::from),
                })
            })
            .collect()
    }

    fn parse_stints(&self, rows: &[Value]) -> Vec<StintRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(StintRecord {
                    driver_number: int_of(row, "driver_number")?,
                    stint_number: int_of(row, "stint_number")?,
                    compound: str_of(row, "compound").map(String::from),
                    lap_start: int_of(row, "lap_start"),
                    lap_end: int_of(row, "lap_end"),
                    tyre_age_at_start: int_of(row, "tyre_age_at_start"),
                })
            })
            .collect()
    }

    fn parse_laps(&self, driver_number: i32, rows: &[Value]) -> Vec<LapRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(LapRecord {
                    driver_number,
                    lap_number: int_of(row, "lap_number")?,
                    stint_number: None,
                    duration_sector_1: f64_of(row, "duration_sector_1"),
                    duration_sector_2: f64_of(row, "duration_sector_2"),
                    duration_sector_3: f64_of(row, "duration_sector_3"),
                    lap_duration: f64_of(row, "lap_duration"),
                    is_pit_out_lap: bool_of(row, "is_pit_out_lap").unwrap_or(false),
                    speed_trap: f64_of(row, "st_speed"),
                })
            })
            .collect()
    }

    fn parse_pit_stops(&self, rows: &[Value]) -> Vec<PitStopRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(PitStopRecord {
                    driver_number: int_of(row, "driver_number")?,
                    lap_number: int_of(row, "lap_number")?,
                    pit_duration: f64_of(row, "pit_duration"),
                })
            })
            .collect()
    }

    fn parse_results(&self, rows: &[Value]) -> Vec<ResultRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(ResultRecord {
                    driver_number: int_of(row, "driver_number")?,
                    laps_completed: int_of(row, "number_of_laps"),
                    dnf: bool_of(row, "dnf").unwrap_or(false),
                    dns: bool_of(row, "dns").unwrap_or(false),
                    dsq: bool_of(row, "dsq").unwrap_or(false),
                    final_position: int_of(row, "position"),
                    fastest_lap_time: None,
                    total_time: f64_of(row, "duration"),
                    status: None,
                    // Live results carry no points column; the store derives
                    // them from the position table.
                    points: None,
                })
            })
            .collect()
    }

    fn parse_grid(&self, rows: &[Value]) -> Vec<GridRecord> {
        rows.iter()
            .filter_map(|row| {
                Some(GridRecord {
                    driver_number: int_of(row, "driver_number")?,
                    grid_position: int_of(row, "position"),
                    qualy_time: f64_of(row, "lap_duration"),
                })
            })
            .collect()
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // Timestamps arrive as RFC 3339; only the date part is kept.
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> LiveAdapter {
        LiveAdapter::new(
            "https://api.openf1.org/v1/".into(),
            NormalizeConfig::default(),
        )
    }

    #[test]
    fn urls_follow_the_query_scheme() {
        let adapter = adapter();
        assert_eq!(
            adapter.url_for(&ResourceKey::Meetings { year: 2024 }),
            "https://api.openf1.org/v1/meetings?year=2024"
        );
        assert_eq!(
            adapter.url_for(&ResourceKey::Laps {
                session_key: 9472,
                driver_number: 1
            }),
            "https://api.openf1.org/v1/laps?session_key=9472&driver_number=1"
        );
        assert_eq!(
            adapter.url_for(&ResourceKey::Grid { session_key: 9472 }),
            "https://api.openf1.org/v1/starting_grid?session_key=9472"
        );
    }

    #[test]
    fn meetings_derive_standard_name_and_date() {
        let rows = vec![json!({
            "meeting_key": 1219,
            "country_name": "Bahrain",
            "country_code": "BRN",
            "location": "Sakhir",
            "date_start": "2024-03-02T15:00:00+00:00",
            "meeting_official_name": "FORMULA 1 GULF AIR BAHRAIN GRAND PRIX 2024",
            "meeting_name": "Bahrain Grand Prix"
        })];
        let meetings = adapter().parse_meetings(2024, &rows);
        assert_eq!(meetings.len(), 1);
        let m = &meetings[0];
        assert_eq!(m.meeting_key, 1219);
        assert_eq!(m.standard_name, "BAHRAIN GRAND PRIX");
        assert_eq!(
            m.date_start,
            NaiveDate::from_ymd_opt(2024, 3, 2)
        );
    }

    #[test]
    fn rows_without_keys_are_dropped() {
        let rows = vec![json!({"country_name": "Nowhere"})];
        assert!(adapter().parse_meetings(2024, &rows).is_empty());
        assert!(adapter().parse_drivers(&rows).is_empty());
    }

    #[test]
    fn laps_keep_absent_timing_as_none() {
        let rows = vec![json!({
            "lap_number": 1,
            "duration_sector_1": null,
            "duration_sector_2": 38.224,
            "duration_sector_3": 27.6,
            "lap_duration": null,
            "is_pit_out_lap": true,
            "st_speed": 311.0
        })];
        let laps = adapter().parse_laps(44, &rows);
        assert_eq!(laps.len(), 1);
        assert_eq!(laps[0].driver_number, 44);
        assert_eq!(laps[0].duration_sector_1, None);
        assert_eq!(laps[0].duration_sector_2, Some(38.224));
        assert_eq!(laps[0].lap_duration, None);
        assert!(laps[0].is_pit_out_lap);
    }

    #[test]
    fn results_carry_boolean_flags_and_no_points() {
        let rows = vec![json!({
            "driver_number": 11,
            "position": null,
            "number_of_laps": 43,
            "dnf": true,
            "dns": false,
            "dsq": false,
            "duration": null
        })];
        let results = adapter().parse_results(&rows);
        assert_eq!(results.len(), 1);
        assert!(results[0].dnf);
        assert_eq!(results[0].final_position, None);
        assert_eq!(results[0].points, None);
    }
}
