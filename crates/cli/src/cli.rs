use clap::Parser;

/// Telemetry ingestion for pitwall.
///
/// Fetches seasons, meetings, sessions, drivers, stints, laps, pit stops,
/// results and starting grids from the configured source and upserts them
/// into PostgreSQL. Re-running against unchanged upstream data creates no
/// duplicate rows.
#[derive(Parser, Debug)]
#[command(name = "pitwall", about = "Motorsport telemetry ingestion")]
pub struct CliArgs {
    /// Season years to ingest, e.g. --seasons 2023 2024
    #[arg(long, num_args = 1.., required = true)]
    pub seasons: Vec<i32>,

    /// Source provider: live or archive
    #[arg(long, env = "SOURCE")]
    pub source: Option<String>,

    /// Persist to an in-memory store instead of PostgreSQL (no PG_* needed)
    #[arg(long)]
    pub dry_run: bool,

    /// Global request ceiling, requests per second
    #[arg(long, env = "RATE_LIMIT_RPS")]
    pub rate_limit_rps: Option<f64>,

    /// Concurrent in-flight lap fetches
    #[arg(long, env = "LAP_CONCURRENCY")]
    pub lap_concurrency: Option<usize>,
}
