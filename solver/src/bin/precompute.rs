use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use retrograde::env_config::{init_base_path, SolverConfig};
use retrograde::games::{ColumnRace, RaceRules};
use retrograde::store::{save_snapshot, CacheGeometry, CachedFileStore};
use retrograde::{solve, SolveError, TurnGame, ValueStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn env_path(name: &str, default: &str) -> PathBuf {
    std::env::var_os(name)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn run() -> Result<(), SolveError> {
    init_base_path()?;
    let cfg = SolverConfig::from_env()?;
    let rules = RaceRules::from_env()?;
    let game = ColumnRace::new(rules)?;

    let values_path = env_path("RETRO_VALUES_PATH", "data/values.bin");
    let snapshot_path = env_path("RETRO_SNAPSHOT_PATH", "data/values.snapshot.bin");
    let report_path = env_path("RETRO_REPORT_PATH", "data/solve_report.json");

    tracing::info!(
        ?rules,
        lengths = ?game.lengths(),
        num_states = game.num_states(),
        values = %values_path.display(),
        "column race precomputation"
    );

    let geometry = CacheGeometry {
        num_states: game.num_states(),
        line_length: cfg.line_length,
        num_lines: cfg.cache_lines,
    };
    let store = CachedFileStore::open_lru(&values_path, geometry, true)?;
    let report = solve(&game, &store, &cfg)?;

    let stats = store.stats();
    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        write_backs = stats.write_backs,
        "cache statistics"
    );

    let start_value = store.value_of(&game, &game.start())?;
    tracing::info!(
        expected_turns = format_args!("{start_value:.6}"),
        "value of the empty board"
    );

    save_snapshot(&store, &snapshot_path)?;
    report.save_json(&report_path)?;
    tracing::info!(report = %report_path.display(), "precomputation complete");
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "precomputation failed");
            ExitCode::FAILURE
        }
    }
}
