//! The seam between raw upstream JSON and canonical records.
//!
//! An adapter knows two things about its provider: how a [`ResourceKey`]
//! maps to a URL, and how that provider's row shape maps to the canonical
//! record types. Parsing is pure; all I/O lives in the fetch layer.

use serde_json::Value;

use pitwall_core::record::{
    DriverRecord, GridRecord, LapRecord, MeetingRecord, PitStopRecord, ResultRecord,
    SessionRecord, StintRecord,
};

use crate::fetch::ResourceKey;

pub trait SourceAdapter: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn url_for(&self, key: &ResourceKey) -> String;

    fn parse_meetings(&self, year: i32, rows: &[Value]) -> Vec<MeetingRecord>;

    fn parse_sessions(&self, meeting_key: i32, rows: &[Value]) -> Vec<SessionRecord>;

    fn parse_drivers(&self, rows: &[Value]) -> Vec<DriverRecord>;

    fn parse_stints(&self, rows: &[Value]) -> Vec<StintRecord>;

    fn parse_laps(&self, driver_number: i32, rows: &[Value]) -> Vec<LapRecord>;

    fn parse_pit_stops(&self, rows: &[Value]) -> Vec<PitStopRecord>;

    fn parse_results(&self, rows: &[Value]) -> Vec<ResultRecord>;

    fn parse_grid(&self, rows: &[Value]) -> Vec<GridRecord>;
}

// ── Row field helpers ─────────────────────────────────────────────

/// Integer field; tolerates numeric strings (some providers quote numbers).
pub(crate) fn int_of(row: &Value, field: &str) -> Option<i32> {
    match row.get(field)? {
        Value::Number(n) => n.as_i64().map(|v| v as i32).or_else(|| {
            n.as_f64()
                .filter(|v| v.is_finite() && v.fract() == 0.0)
                .map(|v| v as i32)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn f64_of(row: &Value, field: &str) -> Option<f64> {
    row.get(field)?.as_f64().filter(|v| v.is_finite())
}

pub(crate) fn str_of<'a>(row: &'a Value, field: &str) -> Option<&'a str> {
    row.get(field)?.as_str().filter(|s| !s.trim().is_empty())
}

pub(crate) fn bool_of(row: &Value, field: &str) -> Option<bool> {
    row.get(field)?.as_bool()
}
