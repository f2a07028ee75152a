//! Human-readable output

use colored::Colorize;
use sipconsole_load_tester::{LoadStats, LoadTestConfig, RunSummary, TeardownReport};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "")]
    name: &'static str,
    #[tabled(rename = "")]
    value: String,
}

fn row(name: &'static str, value: impl ToString) -> Row {
    Row {
        name,
        value: value.to_string(),
    }
}

fn table(rows: Vec<Row>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn progress_line(stats: &LoadStats) -> String {
    let c = stats.counters;
    format!(
        "[{:>3}%] attempts {}/{}  active {}  {} {}  {} {}",
        stats.progress,
        c.total_attempts,
        stats.concurrency,
        c.active,
        "ok".green(),
        c.succeeded,
        "failed".red(),
        c.failed,
    )
}

pub fn config_table(config: &LoadTestConfig) -> String {
    table(vec![
        row("identity", &config.credentials.uri),
        row("server", &config.credentials.ws_servers),
        row("auth user", &config.credentials.auth_user),
        row("target", &config.target),
        row("concurrency", config.concurrency),
        row("hold", format!("{}s", config.hold_secs)),
        row("auto hangup", config.auto_hangup),
        row(
            "answer timeout",
            config.answer_timeout_secs.map_or("none".to_string(), |s| format!("{}s", s)),
        ),
        row("connect timeout", format!("{}s", config.connect_timeout_secs)),
        row("teardown timeout", format!("{}ms", config.teardown_timeout_ms)),
    ])
}

pub fn teardown_line(report: &TeardownReport) -> String {
    format!(
        "Torn down {} in-flight attempts ({} calls, {} terminate failures, {} release failures)",
        report.handles, report.calls, report.terminate_failures, report.release_failures
    )
}

pub fn summary_table(summary: &RunSummary) -> String {
    let c = summary.counters;
    let status = if summary.stopped {
        "stopped".yellow().to_string()
    } else {
        "completed".green().to_string()
    };
    let mut rows = vec![
        row("run", summary.run_id),
        row("status", status),
        row("target", &summary.target),
        row("attempts", c.total_attempts),
        row("succeeded", c.succeeded.to_string().green()),
        row("failed", c.failed.to_string().red()),
        row("aborted", summary.aborted),
        row("elapsed", format!("{:.1}s", summary.elapsed.as_secs_f64())),
    ];
    if let (Some(mean), Some(max)) = (summary.mean_setup_ms, summary.max_setup_ms) {
        rows.push(row("setup time", format!("mean {:.0}ms, max {}ms", mean, max)));
    }

    let mut out = table(rows);
    if !summary.failure_causes.is_empty() {
        let causes = summary
            .failure_causes
            .iter()
            .map(|(cause, count)| Row {
                name: "",
                value: format!("{:>5}  {}", count, cause),
            })
            .collect();
        out.push_str("\nFailure causes\n");
        out.push_str(&table(causes));
    }
    out
}
