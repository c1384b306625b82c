//! Session report rendering.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::ValueEnum;
use sparsebench_core::{
    BenchmarkSummary, ComparisonRecord, LatencySummary, LoadTestStats, QueryResult, StressReport, TargetDescriptor,
    TargetSlot,
};
use sparsebench_engine::{LoadRun, RunOutcome, SessionReport};

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Json,
    Markdown,
}

impl ReportFormat {
    /// Parse the `report.format` config value.
    pub fn from_config(value: &str) -> anyhow::Result<Self> {
        <Self as ValueEnum>::from_str(value, true).map_err(|e| anyhow::anyhow!("invalid report format {value:?}: {e}"))
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Renders finished sessions for the terminal and for report files.
pub struct ReportWriter {
    a: TargetDescriptor,
    b: TargetDescriptor,
}

impl ReportWriter {
    pub fn new(a: TargetDescriptor, b: TargetDescriptor) -> Self {
        Self { a, b }
    }

    fn name(&self, slot: TargetSlot) -> &str {
        match slot {
            TargetSlot::A => &self.a.name,
            TargetSlot::B => &self.b.name,
        }
    }

    pub fn render(&self, report: &SessionReport, format: ReportFormat) -> anyhow::Result<String> {
        match format {
            ReportFormat::Json => serde_json::to_string_pretty(report).context("failed to serialize report"),
            ReportFormat::Markdown => Ok(self.markdown(report)),
        }
    }

    /// Write the report into `dir` as `<kind>-<timestamp>.<ext>`.
    pub fn write(&self, dir: &Path, report: &SessionReport, format: ReportFormat) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let file_name = format!(
            "{}-{}.{}",
            report.kind.as_str(),
            report.started_at.format("%Y%m%dT%H%M%SZ"),
            format.extension()
        );
        let path = dir.join(file_name);

        let content = self.render(report, format)?;
        std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;

        Ok(path)
    }

    pub fn markdown(&self, report: &SessionReport) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# {} Report\n", title(report.kind.as_str()));
        let _ = writeln!(out, "- **Session**: {}", report.id);
        let _ = writeln!(out, "- **State**: {:?}", report.state);
        let _ = writeln!(out, "- **Started**: {}", report.started_at.to_rfc3339());
        let _ = writeln!(out, "- **Elapsed**: {:.1} ms", report.elapsed_ms);
        let _ = writeln!(out, "- **Target A**: {}", self.a);
        let _ = writeln!(out, "- **Target B**: {}", self.b);

        if let Some(error) = &report.error {
            let _ = writeln!(out, "\n**Error**: {error}");
        }

        match &report.outcome {
            Some(RunOutcome::Compare(record)) => self.compare_section(&mut out, record),
            Some(RunOutcome::Benchmark(summaries)) => self.benchmark_section(&mut out, summaries),
            Some(RunOutcome::MultiThread(run)) | Some(RunOutcome::LoadTest(run)) => self.load_section(&mut out, run),
            Some(RunOutcome::StressTest(stress)) => self.stress_section(&mut out, stress),
            None => {}
        }

        out
    }

    fn compare_section(&self, out: &mut String, record: &ComparisonRecord) {
        let _ = writeln!(out, "\n## Query: {}\n", record.query);
        let _ = writeln!(out, "| Target | Model | Time (ms) | Hits | Status |");
        let _ = writeln!(out, "|--------|-------|-----------|------|--------|");
        for slot in TargetSlot::ALL {
            let result = record.result(slot);
            let _ = writeln!(
                out,
                "| {} | {} | {:.2} | {} | {} |",
                result.target,
                result.model_id,
                result.duration_ms,
                result.hit_count,
                status(result)
            );
        }

        let _ = writeln!(out);
        match record.comparison.faster {
            Some(slot) => {
                let _ = write!(out, "**Faster**: {}", self.name(slot));
                if let Some(speedup) = record.comparison.speedup {
                    let _ = write!(
                        out,
                        " by {:.2} ms ({speedup:.2}x)",
                        record.comparison.time_difference_ms
                    );
                }
                let _ = writeln!(out);
            }
            None => {
                let _ = writeln!(out, "**Faster**: neither target succeeded");
            }
        }

        for slot in TargetSlot::ALL {
            let result = record.result(slot);
            if result.top_results.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n### Top results from {}\n", result.target);
            for (rank, hit) in result.top_results.iter().enumerate() {
                let score = hit.score.map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
                let _ = writeln!(
                    out,
                    "{}. [{}] {} / {}: {}",
                    rank + 1,
                    score,
                    hit.title.as_deref().unwrap_or("?"),
                    hit.speaker.as_deref().unwrap_or("?"),
                    hit.snippet
                );
            }
        }
    }

    fn benchmark_section(&self, out: &mut String, summaries: &[BenchmarkSummary]) {
        let _ = writeln!(out, "\n## Benchmark\n");
        let _ = writeln!(
            out,
            "| Query | Iterations | {} avg (ms) | {} avg (ms) | Faster | Speedup |",
            self.a.name, self.b.name
        );
        let _ = writeln!(out, "|-------|------------|------|------|--------|---------|");
        for summary in summaries {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                summary.query,
                summary.iterations,
                ms(summary.avg_a_ms),
                ms(summary.avg_b_ms),
                summary.faster.map_or("-", |slot| self.name(slot)),
                summary.speedup.map_or_else(|| "-".to_string(), |s| format!("{s:.2}x"))
            );
        }
    }

    fn load_section(&self, out: &mut String, run: &LoadRun) {
        let stats = &run.stats;
        let _ = writeln!(out, "\n## Load\n");
        summary_lines(out, stats);
        self.latency_table(out, stats);
    }

    fn latency_table(&self, out: &mut String, stats: &LoadTestStats) {
        let _ = writeln!(out, "\n| Target | Count | Avg | Min | Median | P95 | P99 | Max |");
        let _ = writeln!(out, "|--------|-------|-----|-----|--------|-----|-----|-----|");
        for slot in TargetSlot::ALL {
            match stats.summary(slot) {
                Some(summary) => latency_row(out, self.name(slot), summary),
                None => {
                    let _ = writeln!(out, "| {} | 0 | - | - | - | - | - | - |", self.name(slot));
                }
            }
        }
    }

    fn stress_section(&self, out: &mut String, stress: &StressReport) {
        let _ = writeln!(out, "\n## Stress Sweep\n");
        let _ = writeln!(
            out,
            "| Concurrency | QPS | Success | {} P95 (ms) | {} P95 (ms) | |",
            self.a.name, self.b.name
        );
        let _ = writeln!(out, "|-------------|-----|---------|------|------|---|");

        let best = stress.best.as_ref().map(|b| b.concurrency);
        for step in &stress.steps {
            let mut marks = Vec::new();
            if Some(step.concurrency) == best {
                marks.push("best");
            }
            if Some(step.concurrency) == stress.saturated_at {
                marks.push("saturated");
            }
            let _ = writeln!(
                out,
                "| {} | {:.1} | {:.1}% | {} | {} | {} |",
                step.concurrency,
                step.stats.achieved_qps,
                step.stats.success_rate() * 100.0,
                ms(step.stats.a.as_ref().map(|s| s.p95)),
                ms(step.stats.b.as_ref().map(|s| s.p95)),
                marks.join(", ")
            );
        }

        if let Some(best) = &stress.best {
            let _ = writeln!(
                out,
                "\n**Best**: {:.1} qps at concurrency {}",
                best.stats.achieved_qps, best.concurrency
            );
        }
    }
}

fn summary_lines(out: &mut String, stats: &LoadTestStats) {
    let _ = writeln!(out, "- **Concurrency**: {}", stats.concurrency);
    let _ = writeln!(out, "- **Wall clock**: {:.1} ms", stats.wall_clock_ms);
    let _ = writeln!(out, "- **Total comparisons**: {}", stats.total_queries);
    let _ = writeln!(out, "- **Successful**: {}", stats.successful_queries);
    let _ = writeln!(out, "- **Failed**: {}", stats.failed_queries);
    let _ = writeln!(out, "- **Success rate**: {:.1}%", stats.success_rate() * 100.0);
    let _ = writeln!(out, "- **Throughput**: {:.2} QPS", stats.achieved_qps);
}

fn latency_row(out: &mut String, name: &str, s: &LatencySummary) {
    let _ = writeln!(
        out,
        "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
        name, s.count, s.avg, s.min, s.median, s.p95, s.p99, s.max
    );
}

fn status(result: &QueryResult) -> String {
    match (&result.error, result.degraded) {
        (Some(error), _) => format!("error: {error}"),
        (None, true) => "ok (lexical fallback)".to_string(),
        (None, false) => "ok".to_string(),
    }
}

fn ms(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn title(kind: &str) -> String {
    kind.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
