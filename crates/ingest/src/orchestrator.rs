//! Staged ingestion: waves of concurrent branches walking the entity
//! dependency graph top-down.
//!
//! A wave only starts once the previous wave has fully completed, so
//! every branch can assume its owners already exist. A branch that fails
//! (fetch retry budget exhausted, storage error) is recorded in the run
//! report and never cancels its siblings.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use pitwall_core::config::IngestConfig;
use pitwall_core::{BranchFailure, RunReport};
use pitwall_store::EntityResolver;

use crate::adapter::SourceAdapter;
use crate::fetch::{RateLimitedFetcher, ResourceKey};

#[derive(Debug, Clone)]
struct MeetingCtx {
    meeting_id: i64,
    meeting_key: i32,
}

#[derive(Debug, Clone)]
struct SessionCtx {
    session_id: i64,
    session_key: i32,
    session_type: String,
}

/// One orchestrator per run: the fetcher cache, the resolver's identity
/// cache and the failure list are all run-scoped.
pub struct StagedOrchestrator {
    fetcher: Arc<RateLimitedFetcher>,
    adapter: Arc<dyn SourceAdapter>,
    resolver: Arc<EntityResolver>,
    session_types: Vec<String>,
    lap_concurrency: usize,
    failures: Mutex<Vec<BranchFailure>>,
}

impl StagedOrchestrator {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        adapter: Arc<dyn SourceAdapter>,
        resolver: Arc<EntityResolver>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            fetcher,
            adapter,
            resolver,
            session_types: config.session_types.clone(),
            lap_concurrency: config.lap_concurrency.max(1),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub async fn run(&self, seasons: &[i32]) -> RunReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            %run_id,
            source = self.adapter.name(),
            ?seasons,
            "ingestion run starting"
        );

        // Waves 1 + 2: seasons, then meetings per season.
        let meetings: Vec<MeetingCtx> = join_all(seasons.iter().map(|&y| self.ingest_season(y)))
            .await
            .into_iter()
            .flatten()
            .collect();
        info!(meetings = meetings.len(), "meeting wave complete");

        // Wave 3: sessions per meeting.
        let sessions: Vec<SessionCtx> =
            join_all(meetings.iter().map(|m| self.ingest_meeting(m)))
                .await
                .into_iter()
                .flatten()
                .collect();
        info!(sessions = sessions.len(), "session wave complete");

        // Wave 4: per-session resources.
        let rosters: Vec<(SessionCtx, Vec<i32>)> =
            join_all(sessions.iter().map(|s| self.ingest_session(s)))
                .await
                .into_iter()
                .zip(sessions.iter().cloned())
                .map(|(drivers, ctx)| (ctx, drivers))
                .collect();

        // Wave 5: laps for every (session, driver) pair, bounded fan-out.
        let pairs: Vec<(SessionCtx, i32)> = rosters
            .iter()
            .flat_map(|(ctx, drivers)| drivers.iter().map(|&d| (ctx.clone(), d)))
            .collect();
        stream::iter(
            pairs
                .into_iter()
                .map(|(ctx, driver)| self.ingest_laps(ctx, driver)),
        )
        .buffer_unordered(self.lap_concurrency)
        .collect::<Vec<()>>()
        .await;

        let failures = std::mem::take(&mut *self.failures.lock().unwrap());
        if !failures.is_empty() {
            warn!(failed = failures.len(), "run finished with failed branches");
        }
        RunReport {
            run_id,
            source: self.adapter.name().to_string(),
            seasons: seasons.to_vec(),
            counts: self.resolver.counters().snapshot(),
            failures,
            duration_secs: started.elapsed().as_secs_f64(),
        }
    }

    async fn ingest_season(&self, year: i32) -> Vec<MeetingCtx> {
        let season_id = match self.resolver.season(year).await {
            Ok(id) => id,
            Err(err) => {
                self.record_failure(format!("season/{year}"), &err);
                return Vec::new();
            }
        };

        let key = ResourceKey::Meetings { year };
        let Some(rows) = self.fetch_branch(&key).await else {
            return Vec::new();
        };

        let mut contexts = Vec::new();
        for rec in self.adapter.parse_meetings(year, &rows) {
            match self.resolver.meeting(season_id, &rec).await {
                Ok(meeting_id) => contexts.push(MeetingCtx {
                    meeting_id,
                    meeting_key: rec.meeting_key,
                }),
                Err(err) => {
                    self.record_failure(format!("meeting/{}/{}", year, rec.meeting_key), &err)
                }
            }
        }
        contexts
    }

    async fn ingest_meeting(&self, meeting: &MeetingCtx) -> Vec<SessionCtx> {
        let key = ResourceKey::Sessions {
            meeting_key: meeting.meeting_key,
        };
        let Some(rows) = self.fetch_branch(&key).await else {
            return Vec::new();
        };

        let mut contexts = Vec::new();
        for rec in self.adapter.parse_sessions(meeting.meeting_key, &rows) {
            if !self.session_types.contains(&rec.session_type) {
                continue;
            }
            match self.resolver.session(meeting.meeting_id, &rec).await {
                Ok(session_id) => contexts.push(SessionCtx {
                    session_id,
                    session_key: rec.session_key,
                    session_type: rec.session_type,
                }),
                Err(err) => {
                    self.record_failure(format!("session/{}", rec.session_key), &err)
                }
            }
        }
        contexts
    }

    /// Fetch the five per-session resources concurrently, then persist in
    /// dependency order. Returns the driver numbers seen, for the lap wave.
    async fn ingest_session(&self, ctx: &SessionCtx) -> Vec<i32> {
        let session_key = ctx.session_key;
        let drivers_key = ResourceKey::Drivers { session_key };
        let stints_key = ResourceKey::Stints { session_key };
        let pit_stops_key = ResourceKey::PitStops { session_key };
        let results_key = ResourceKey::Results { session_key };
        let grid_key = ResourceKey::Grid { session_key };
        let (drivers, stints, pit_stops, results, grid) = tokio::join!(
            self.fetch_branch(&drivers_key),
            self.fetch_branch(&stints_key),
            self.fetch_branch(&pit_stops_key),
            self.fetch_branch(&results_key),
            self.fetch_branch(&grid_key),
        );

        let mut driver_numbers = Vec::new();
        if let Some(rows) = drivers {
            for rec in self.adapter.parse_drivers(&rows) {
                match self.resolver.driver(&rec).await {
                    Ok(_) => driver_numbers.push(rec.driver_number),
                    Err(err) => self.record_failure(
                        format!("driver/{}/{}", session_key, rec.driver_number),
                        &err,
                    ),
                }
            }
            for &number in &driver_numbers {
                if let Err(err) = self.resolver.session_driver(ctx.session_id, number).await {
                    self.record_failure(
                        format!("session_driver/{session_key}/{number}"),
                        &err,
                    );
                }
            }
        }

        if let Some(rows) = stints {
            for rec in self.adapter.parse_stints(&rows) {
                if let Err(err) = self.resolver.stint(ctx.session_id, &rec).await {
                    self.record_failure(format!("stint/{session_key}"), &err);
                }
            }
        }
        if let Some(rows) = pit_stops {
            for rec in self.adapter.parse_pit_stops(&rows) {
                if let Err(err) = self.resolver.pit_stop(ctx.session_id, &rec).await {
                    self.record_failure(format!("pit_stop/{session_key}"), &err);
                }
            }
        }
        if let Some(rows) = results {
            for rec in self.adapter.parse_results(&rows) {
                if let Err(err) = self
                    .resolver
                    .result(ctx.session_id, &ctx.session_type, &rec)
                    .await
                {
                    self.record_failure(format!("result/{session_key}"), &err);
                }
            }
        }
        if let Some(rows) = grid {
            for rec in self.adapter.parse_grid(&rows) {
                if let Err(err) = self.resolver.start_grid(ctx.session_id, &rec).await {
                    self.record_failure(format!("grid/{session_key}"), &err);
                }
            }
        }

        driver_numbers
    }

    async fn ingest_laps(&self, ctx: SessionCtx, driver_number: i32) {
        let key = ResourceKey::Laps {
            session_key: ctx.session_key,
            driver_number,
        };
        let Some(rows) = self.fetch_branch(&key).await else {
            return;
        };
        for rec in self.adapter.parse_laps(driver_number, &rows) {
            if let Err(err) = self.resolver.lap(ctx.session_id, &rec).await {
                self.record_failure(key.to_string(), &err);
                return;
            }
        }
    }

    /// Fetch one resource; a terminal failure marks this branch failed and
    /// yields `None` so the caller moves on.
    async fn fetch_branch(&self, key: &ResourceKey) -> Option<Arc<Vec<Value>>> {
        let url = self.adapter.url_for(key);
        match self.fetcher.fetch(key, &url).await {
            Ok(rows) => Some(rows),
            Err(err) => {
                self.record_failure(key.to_string(), &err);
                None
            }
        }
    }

    fn record_failure(&self, branch: String, error: &dyn std::fmt::Display) {
        warn!(%branch, error = %error, "branch failed");
        self.failures.lock().unwrap().push(BranchFailure {
            branch,
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use serde_json::json;

    use pitwall_core::config::{DriverNamePolicy, NormalizeConfig};
    use pitwall_core::EntityKind;
    use pitwall_store::MemoryStore;

    use crate::adapters::LiveAdapter;
    use crate::error::FetchError;
    use crate::fetch::RemoteSource;

    /// Canned responses keyed by URL; listed URLs always return 500.
    struct CannedSource {
        responses: HashMap<String, Value>,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl RemoteSource for CannedSource {
        async fn fetch_rows(&self, url: &str) -> Result<Vec<Value>, FetchError> {
            if self.failing.contains(url) {
                return Err(FetchError::Status {
                    status: 500,
                    url: url.to_string(),
                });
            }
            match self.responses.get(url) {
                Some(Value::Array(rows)) => Ok(rows.clone()),
                _ => Err(FetchError::Status {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }

    fn test_config() -> IngestConfig {
        IngestConfig {
            rate_limit_rps: 1000.0,
            rate_limit_burst: 100,
            max_attempts: 2,
            backoff_base_secs: 0.0,
            jitter_max_secs: 0.0,
            lap_concurrency: 4,
            ..IngestConfig::default()
        }
    }

    fn adapter() -> Arc<LiveAdapter> {
        Arc::new(LiveAdapter::new(
            "http://t/v1".into(),
            NormalizeConfig::default(),
        ))
    }

    /// One season, two meetings. Meeting 1 has a Race with two drivers,
    /// full stints/laps/pits/results/grid; meeting 2 has a Qualifying
    /// with one driver and a grid.
    fn fixture() -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert(
            "http://t/v1/meetings?year=2024".to_string(),
            json!([
                {"meeting_key": 1, "country_name": "Bahrain",
                 "meeting_official_name": "FORMULA 1 GULF AIR BAHRAIN GRAND PRIX 2024"},
                {"meeting_key": 2, "country_name": "Saudi Arabia",
                 "meeting_official_name": "FORMULA 1 STC SAUDI ARABIAN GRAND PRIX 2024"}
            ]),
        );
        m.insert(
            "http://t/v1/sessions?meeting_key=1".to_string(),
            json!([
                {"session_key": 101, "session_name": "Race", "session_type": "Race"},
                {"session_key": 100, "session_name": "Practice 1", "session_type": "Practice"}
            ]),
        );
        m.insert(
            "http://t/v1/sessions?meeting_key=2".to_string(),
            json!([
                {"session_key": 201, "session_name": "Qualifying", "session_type": "Qualifying"}
            ]),
        );
        m.insert(
            "http://t/v1/drivers?session_key=101".to_string(),
            json!([
                {"driver_number": 1, "full_name": "Max Verstappen", "name_acronym": "VER"},
                {"driver_number": 16, "full_name": "Charles Leclerc", "name_acronym": "LEC"}
            ]),
        );
        m.insert(
            "http://t/v1/stints?session_key=101".to_string(),
            json!([
                {"driver_number": 1, "stint_number": 1, "compound": "SOFT",
                 "lap_start": 1, "lap_end": 2, "tyre_age_at_start": 0},
                {"driver_number": 16, "stint_number": 1, "compound": "MEDIUM",
                 "lap_start": 1, "lap_end": 2, "tyre_age_at_start": 2}
            ]),
        );
        for driver in [1, 16] {
            m.insert(
                format!("http://t/v1/laps?session_key=101&driver_number={driver}"),
                json!([
                    {"lap_number": 1, "lap_duration": 95.2, "is_pit_out_lap": false},
                    {"lap_number": 2, "lap_duration": 92.8, "is_pit_out_lap": false}
                ]),
            );
        }
        m.insert(
            "http://t/v1/pit?session_key=101".to_string(),
            json!([{"driver_number": 1, "lap_number": 2, "pit_duration": 22.3}]),
        );
        m.insert(
            "http://t/v1/session_result?session_key=101".to_string(),
            json!([
                {"driver_number": 1, "position": 1, "number_of_laps": 2,
                 "dnf": false, "dns": false, "dsq": false},
                {"driver_number": 16, "position": 2, "number_of_laps": 2,
                 "dnf": false, "dns": false, "dsq": false}
            ]),
        );
        m.insert(
            "http://t/v1/starting_grid?session_key=101".to_string(),
            json!([
                {"driver_number": 1, "position": 1, "lap_duration": 89.1},
                {"driver_number": 16, "position": 2, "lap_duration": 89.4}
            ]),
        );
        m.insert(
            "http://t/v1/drivers?session_key=201".to_string(),
            json!([{"driver_number": 1, "full_name": "Max Verstappen"}]),
        );
        m.insert(
            "http://t/v1/stints?session_key=201".to_string(),
            json!([{"driver_number": 1, "stint_number": 1, "compound": "SOFT",
                    "lap_start": 1, "lap_end": 1}]),
        );
        m.insert(
            "http://t/v1/laps?session_key=201&driver_number=1".to_string(),
            json!([{"lap_number": 1, "lap_duration": 89.1, "is_pit_out_lap": false}]),
        );
        m.insert(
            "http://t/v1/pit?session_key=201".to_string(),
            json!([]),
        );
        m.insert(
            "http://t/v1/session_result?session_key=201".to_string(),
            json!([{"driver_number": 1, "position": 1, "number_of_laps": 1,
                    "dnf": false, "dns": false, "dsq": false}]),
        );
        m.insert(
            "http://t/v1/starting_grid?session_key=201".to_string(),
            json!([{"driver_number": 1, "position": 1, "lap_duration": 89.1}]),
        );
        m
    }

    fn orchestrator(
        store: Arc<MemoryStore>,
        responses: HashMap<String, Value>,
        failing: &[&str],
    ) -> StagedOrchestrator {
        let config = test_config();
        let source = Arc::new(CannedSource {
            responses,
            failing: failing.iter().map(|s| s.to_string()).collect(),
        });
        let fetcher = Arc::new(RateLimitedFetcher::new(source, &config));
        let resolver = Arc::new(EntityResolver::new(
            store,
            DriverNamePolicy::PreferExisting,
        ));
        StagedOrchestrator::new(fetcher, adapter(), resolver, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_persists_the_whole_tree() {
        let store = Arc::new(MemoryStore::new());
        let report = orchestrator(store.clone(), fixture(), &[]).run(&[2024]).await;

        assert!(report.failures.is_empty(), "{:?}", report.failures);
        let counts = store.row_counts();
        assert_eq!(counts[&EntityKind::Season], 1);
        assert_eq!(counts[&EntityKind::Meeting], 2);
        // The Practice session is dropped by the recognized-type filter.
        assert_eq!(counts[&EntityKind::Session], 2);
        assert_eq!(counts[&EntityKind::Driver], 2);
        assert_eq!(counts[&EntityKind::SessionDriver], 3);
        assert_eq!(counts[&EntityKind::Stint], 3);
        assert_eq!(counts[&EntityKind::Lap], 5);
        assert_eq!(counts[&EntityKind::PitStop], 1);
        assert_eq!(counts[&EntityKind::SessionResult], 2);
        assert_eq!(counts[&EntityKind::StartGrid], 2);
        // Race results had no points column: derived from the table.
        assert_eq!(counts[&EntityKind::PointsScored], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rerun_creates_zero_duplicates() {
        let store = Arc::new(MemoryStore::new());
        orchestrator(store.clone(), fixture(), &[]).run(&[2024]).await;
        let first = store.row_counts();

        let second_report = orchestrator(store.clone(), fixture(), &[]).run(&[2024]).await;
        assert_eq!(store.row_counts(), first);
        assert_eq!(second_report.total_created(), 0);
        assert!(second_report.total_updated() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_meeting_branch_leaves_siblings_intact() {
        let store = Arc::new(MemoryStore::new());
        let report = orchestrator(
            store.clone(),
            fixture(),
            &["http://t/v1/sessions?meeting_key=2"],
        )
        .run(&[2024])
        .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].branch, "sessions/2");

        // Meeting 1's full tree survives.
        let counts = store.row_counts();
        assert_eq!(counts[&EntityKind::Meeting], 2);
        assert_eq!(counts[&EntityKind::Session], 1);
        assert_eq!(counts[&EntityKind::Lap], 4);
        assert_eq!(counts[&EntityKind::PointsScored], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resource_kind_skips_only_its_dependents() {
        let store = Arc::new(MemoryStore::new());
        let report = orchestrator(
            store.clone(),
            fixture(),
            &["http://t/v1/stints?session_key=101"],
        )
        .run(&[2024])
        .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].branch, "stints/101");

        let counts = store.row_counts();
        // Drivers, results, grid and pit stops for session 101 still land.
        assert_eq!(counts[&EntityKind::Driver], 2);
        assert_eq!(counts[&EntityKind::SessionResult], 2);
        assert_eq!(counts[&EntityKind::StartGrid], 2);
        assert_eq!(counts[&EntityKind::PitStop], 1);
        // Session 101 laps have no stints to attach to; session 201's lap
        // still lands.
        assert_eq!(counts[&EntityKind::Stint], 1);
        assert_eq!(counts[&EntityKind::Lap], 1);
    }
}
