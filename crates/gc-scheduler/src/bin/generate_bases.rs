use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use gc_scheduler::{build_scheduler, RunConfig};
use gc_solver::{SolverSettings, TrialEvaluator, ZeroBinSolver};
use gc_store::JsonFileStore;
use gc_types::SchedulingMode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status for a run stopped by Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "generate-bases")]
#[command(about = "Generate random grid-code bases and their zero-bin rectangles")]
#[command(version)]
struct Cli {
    /// Output folder; trials go to <FOLDER>/in, rejected samples to <FOLDER>/failures
    folder: PathBuf,

    /// Module counts to evaluate
    #[arg(long = "m", num_args = 1.., required = true)]
    module_counts: Vec<usize>,

    /// Dimensions to evaluate
    #[arg(long = "k", num_args = 1.., required = true)]
    dimensions: Vec<f64>,

    /// Phase resolutions to evaluate
    #[arg(long = "phase-resolution", num_args = 1.., default_values_t = vec![0.2])]
    phase_resolutions: Vec<f64>,

    /// Number of trials to generate
    #[arg(long, default_value_t = 1)]
    num_trials: usize,

    /// Draw module bases from random orthogonal projections
    #[arg(long)]
    orthogonal: bool,

    /// Accepted for compatibility; oblique bases are the default
    #[arg(long, hide = true)]
    allow_oblique: bool,

    /// Rescale module scales to mean 1
    #[arg(long)]
    normalize_scales: bool,

    /// Only accept rectangles with every side below --max-bin-sidelength
    #[arg(long)]
    filtered: bool,

    /// Sample one basis per trial and slice it for every combination
    #[arg(long)]
    reuse_bases: bool,

    #[arg(long, default_value_t = 1.0)]
    max_bin_sidelength: f64,

    /// Worker threads (0 = one per CPU)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Solver timeout per basis, in seconds
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,

    /// Log verbosity when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        let mode = if self.reuse_bases {
            SchedulingMode::Reuse
        } else {
            SchedulingMode::Unique
        };
        RunConfig::new(
            &self.folder,
            self.module_counts.clone(),
            self.dimensions.clone(),
        )
        .with_phase_resolutions(self.phase_resolutions.clone())
        .with_num_trials(self.num_trials)
        .with_orthogonal(self.orthogonal)
        .with_normalize_scales(self.normalize_scales)
        .with_filter(self.filtered)
        .with_max_bin_sidelength(self.max_bin_sidelength)
        .with_mode(mode)
        .with_worker_threads(self.threads)
        .with_seed(self.seed)
        .with_solver(SolverSettings {
            timeout_seconds: self.timeout_secs,
            ..SolverSettings::default()
        })
    }
}

fn ensure_fresh_output(folder: &Path) -> anyhow::Result<()> {
    for sub in ["in", "failures"] {
        let dir = folder.join(sub);
        let occupied = std::fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if occupied {
            bail!("{} already contains results", dir.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if cli.allow_oblique {
        debug!("--allow-oblique has no effect; oblique bases are the default");
    }
    let config = cli.run_config();
    config.validate()?;
    ensure_fresh_output(&config.output_dir)?;
    let config_path = config
        .write_to(&config.output_dir)
        .context("writing run configuration")?;
    info!(path = %config_path.display(), run_id = %config.run_id, "run configured");

    let evaluator = TrialEvaluator::new(Arc::new(ZeroBinSolver::new()), config.solver.clone());
    let store = Box::new(JsonFileStore::new(&config.output_dir));
    let mut scheduler = build_scheduler(&config, evaluator, store)?;
    let interrupt = scheduler.interrupt_handle();

    let mut join = tokio::task::spawn_blocking(move || scheduler.join());
    let outcome = tokio::select! {
        joined = &mut join => joined?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            warn!("caught interrupt, terminating workers");
            interrupt.interrupt();
            join.await?
        }
    };

    match outcome {
        Ok(progress) => {
            info!(
                trials = progress.successes,
                failures = progress.failures,
                batches = progress.batches_submitted,
                "finished"
            );
            Ok(())
        }
        Err(err) if err.is_interrupt() => {
            warn!("interrupted before all trials were generated");
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(err) => Err(anyhow::Error::from(err)).with_context(|| {
            format!(
                "generating bases into {} ({} mode)",
                config.output_dir.display(),
                config.mode
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_types::{GcError, SchedulerError};

    #[test]
    fn cli_maps_onto_run_config() {
        let cli = Cli::parse_from([
            "generate-bases",
            "out",
            "--m",
            "2",
            "3",
            "--k",
            "2",
            "4.5",
            "--num-trials",
            "4",
            "--filtered",
            "--reuse-bases",
            "--allow-oblique",
            "--seed",
            "5",
        ]);
        let config = cli.run_config();

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.module_counts, vec![2, 3]);
        assert_eq!(config.dimensions, vec![2.0, 4.5]);
        assert_eq!(config.phase_resolutions, vec![0.2]);
        assert_eq!(config.num_trials, 4);
        assert_eq!(config.mode, SchedulingMode::Reuse);
        assert_eq!(config.size_filter(), Some(1.0));
        assert_eq!(config.seed, Some(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn occupied_output_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_fresh_output(dir.path()).is_ok());

        std::fs::create_dir_all(dir.path().join("in")).unwrap();
        assert!(ensure_fresh_output(dir.path()).is_ok());

        std::fs::write(dir.path().join("in").join("in_0.json"), b"{}").unwrap();
        assert!(ensure_fresh_output(dir.path()).is_err());
    }

    #[test]
    fn interrupt_is_recognised() {
        let err = GcError::from(SchedulerError::Interrupted);
        assert!(err.is_interrupt());
    }
}
