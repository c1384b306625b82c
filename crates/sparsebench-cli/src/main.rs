//! sparsebench: compare two sparse-embedding search targets under load.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sparsebench_core::{
    AppConfig, BenchmarkConfig, ConcurrentConfig, CoreError, LoadTestConfig, QueryPool, SessionId, StressConfig,
    TargetSlot,
};
use sparsebench_engine::{metrics, Comparator, RunController, RunRequest, SessionState};

mod progress;
mod report;
mod search_client;
mod telemetry;

use progress::ProgressSink;
use report::{ReportFormat, ReportWriter};
use search_client::HttpSearchExecutor;

#[derive(Parser, Debug)]
#[command(name = "sparsebench")]
#[command(about = "Latency and throughput comparison of two sparse-embedding search targets", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./sparsebench.toml when present)
    #[arg(long, global = true, env = "SPARSEBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to write the session report into
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Report file format
    #[arg(long, global = true, value_enum)]
    format: Option<ReportFormat>,

    /// Write Prometheus metrics to this file after the run
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one query against both targets and compare
    Compare {
        #[arg(short, long, default_value = "love")]
        query: String,
    },

    /// Run each query several times, sequentially, and average the latencies
    Benchmark {
        #[arg(short, long, default_value_t = BenchmarkConfig::DEFAULT_ITERATIONS)]
        iterations: usize,

        /// Queries to run (defaults to the built-in set)
        #[arg(short, long, num_args = 1..)]
        queries: Vec<String>,
    },

    /// Run a fixed batch of comparisons with bounded concurrency
    MultiThread {
        #[arg(short, long, default_value_t = LoadTestConfig::DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Number of comparisons to run
        #[arg(short = 'n', long, default_value_t = ConcurrentConfig::DEFAULT_TOTAL)]
        count: usize,

        #[arg(short, long, num_args = 1..)]
        queries: Vec<String>,
    },

    /// Sustain load for a fixed duration
    LoadTest {
        /// Duration in seconds
        #[arg(short, long, default_value_t = LoadTestConfig::DEFAULT_DURATION.as_secs())]
        duration: u64,

        #[arg(short, long, default_value_t = LoadTestConfig::DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Pace dispatches to this rate instead of running flat out
        #[arg(short, long)]
        target_qps: Option<f64>,

        #[arg(short, long, num_args = 1..)]
        queries: Vec<String>,
    },

    /// Step concurrency up until throughput saturates or failures climb
    StressTest {
        #[arg(short, long, default_value_t = StressConfig::DEFAULT_START)]
        start: usize,

        #[arg(short, long, default_value_t = StressConfig::DEFAULT_MAX)]
        max: usize,

        #[arg(short, long, default_value_t = StressConfig::DEFAULT_STEP)]
        increment: usize,

        /// Seconds per step
        #[arg(short, long, default_value_t = StressConfig::DEFAULT_STEP_DURATION.as_secs())]
        duration: u64,

        /// Pace every step to this rate
        #[arg(short, long)]
        target_qps: Option<f64>,

        #[arg(short, long, num_args = 1..)]
        queries: Vec<String>,
    },

    /// Show the resolved target configuration
    Targets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    telemetry::init_logging(&config.logging);

    let request = match cli.command {
        Commands::Targets => {
            print_targets(&config);
            return Ok(());
        }
        Commands::Compare { query } => RunRequest::Compare { query },
        Commands::Benchmark { iterations, queries } => {
            RunRequest::Benchmark(BenchmarkConfig::new(query_pool(queries)?, iterations)?)
        }
        Commands::MultiThread {
            concurrency,
            count,
            queries,
        } => RunRequest::MultiThread(ConcurrentConfig::new(query_pool(queries)?, count, concurrency)?),
        Commands::LoadTest {
            duration,
            concurrency,
            target_qps,
            queries,
        } => RunRequest::LoadTest(LoadTestConfig::new(
            query_pool(queries)?,
            Duration::from_secs(duration),
            concurrency,
            target_qps,
        )?),
        Commands::StressTest {
            start,
            max,
            increment,
            duration,
            target_qps,
            queries,
        } => {
            let mut stress =
                StressConfig::new(query_pool(queries)?, start, max, increment, Duration::from_secs(duration))?;
            if let Some(qps) = target_qps {
                stress = stress.with_target_qps(qps)?;
            }
            RunRequest::StressTest(stress)
        }
    };

    config.ensure_endpoints()?;

    let a = HttpSearchExecutor::new(&config.targets.a)?;
    let b = HttpSearchExecutor::new(&config.targets.b)?;
    let comparator = Arc::new(Comparator::new(Arc::new(a), Arc::new(b)));

    let kind = request.kind();
    let sink = Arc::new(ProgressSink::new(kind.as_str()));
    let controller = RunController::new(comparator, sink.clone());

    let mut handle = controller.start(request)?;
    let id = handle.id();

    let finished = tokio::select! {
        report = handle.wait_mut() => Some(report?),
        _ = tokio::signal::ctrl_c() => None,
    };
    let report = match finished {
        Some(report) => report,
        None => {
            tracing::warn!(session_id = %id, "Interrupted, draining in-flight comparisons");
            stop_session(&controller, id)?;
            handle.wait().await?
        }
    };
    sink.finish();

    let writer = ReportWriter::new(config.targets.a.descriptor(), config.targets.b.descriptor());
    println!("{}", writer.markdown(&report));

    let output_dir = cli.output.or_else(|| config.report.output_dir.clone());
    if let Some(dir) = output_dir {
        let format = match cli.format {
            Some(format) => format,
            None => ReportFormat::from_config(&config.report.format)?,
        };
        let path = writer.write(&dir, &report, format)?;
        tracing::info!(path = %path.display(), "Report written");
    }

    if let Some(path) = cli.metrics_out {
        std::fs::write(&path, metrics::export_prometheus())
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Metrics written");
    }

    if report.state == SessionState::Failed {
        anyhow::bail!(
            "{} session failed: {}",
            kind.as_str(),
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}

/// Stops `id`; a session that already finished is not an error.
fn stop_session(controller: &RunController, id: SessionId) -> anyhow::Result<()> {
    match controller.stop(id) {
        Ok(()) => Ok(()),
        Err(CoreError::NotFound { .. }) => {
            tracing::debug!(session_id = %id, "Session already finished");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// User-supplied queries, or the built-in set when none were given.
fn query_pool(queries: Vec<String>) -> anyhow::Result<QueryPool> {
    if queries.is_empty() {
        return Ok(QueryPool::default());
    }
    Ok(QueryPool::new(queries)?)
}

fn print_targets(config: &AppConfig) {
    for slot in TargetSlot::ALL {
        let target = config.targets.get(slot);
        let endpoint = if target.is_configured() {
            target.endpoint.as_str()
        } else {
            "(not configured)"
        };
        println!("{}: {}", slot.as_str().to_uppercase(), target.descriptor());
        println!("   endpoint:  {endpoint}");
        println!("   index:     {} (fallback {})", target.index, target.fallback_index);
        println!("   top_n:     {}", target.top_n);
        println!("   timeout:   {}s", target.timeout_secs);
        println!("   api key:   {}", if target.api_key.is_some() { "set" } else { "unset" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_load_test_defaults() {
        let cli = Cli::try_parse_from(["sparsebench", "load-test", "-t", "25"]).unwrap();
        match cli.command {
            Commands::LoadTest {
                duration,
                concurrency,
                target_qps,
                queries,
            } => {
                assert_eq!(duration, 30);
                assert_eq!(concurrency, 10);
                assert_eq!(target_qps, Some(25.0));
                assert!(queries.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_stress_flags_and_global_options() {
        let cli = Cli::try_parse_from([
            "sparsebench",
            "stress-test",
            "-s",
            "2",
            "-m",
            "20",
            "-i",
            "3",
            "-q",
            "king",
            "night",
            "--format",
            "markdown",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(ReportFormat::Markdown));
        match cli.command {
            Commands::StressTest {
                start,
                max,
                increment,
                duration,
                queries,
                ..
            } => {
                assert_eq!((start, max, increment, duration), (2, 20, 3, 10));
                assert_eq!(queries, vec!["king", "night"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_after_finish_is_not_an_error() {
        use sparsebench_engine::{MockQueryExecutor, NullSink};

        let comparator = Comparator::new(
            Arc::new(MockQueryExecutor::new("EIS", ".elser-2-elastic")),
            Arc::new(MockQueryExecutor::new("ML Node", ".elser-2-elasticsearch")),
        );
        let controller = RunController::new(Arc::new(comparator), Arc::new(NullSink));

        let handle = controller
            .start(RunRequest::Compare {
                query: "love".to_string(),
            })
            .unwrap();
        let id = handle.id();
        let report = handle.wait().await.unwrap();
        assert_eq!(report.state, SessionState::Completed);

        assert!(controller.stop(id).is_err());
        assert!(stop_session(&controller, id).is_ok());
    }

    #[test]
    fn test_query_pool_defaults() {
        assert_eq!(query_pool(Vec::new()).unwrap(), QueryPool::default());
        assert!(query_pool(vec!["  ".to_string()]).is_err());
    }
}
