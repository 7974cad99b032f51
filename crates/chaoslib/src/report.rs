//! Human-readable console output.  This is the product of an experiment, so
//! it goes to stdout with `println!` rather than through `tracing`.

use std::io::{self, Write};
use std::time::Duration;

use crate::error::Error;
use crate::experiment::{Reporter, RoundReport, RunSummary, Verdict};
use crate::injector::ChaosEvent;
use crate::observer::{RecoveryTarget, Sample};
use crate::smoke::SmokeReport;

/// Width of banner lines.
pub static BANNER_WIDTH: usize = 60;

/// Prints round headers, live progress, and per-round verdicts.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    /// Whether a progress line is waiting to be terminated.
    in_progress: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_progress(&mut self) {
        if self.in_progress {
            println!();
            self.in_progress = false;
        }
    }
}

impl Reporter for ConsoleReporter {
    fn round_started(&mut self, round: u64) {
        println!();
        println!("{}", banner(&format!("Round {round}")));
    }

    fn injected(&mut self, event: &ChaosEvent, target: &RecoveryTarget) {
        for victim in &event.victims {
            println!("killed:   {victim}");
        }
        for failure in &event.failures {
            println!("survived: {failure}");
        }
        println!(
            "waiting for {desired} {predicate} instances matching '{selector}'...",
            desired = target.desired_count,
            predicate = target.predicate,
            selector = target.selector,
        );
    }

    fn sample(&mut self, sample: &Sample) {
        print!(
            "\r  healthy {healthy}/{desired}  elapsed {elapsed:.0}s ",
            healthy = sample.healthy,
            desired = sample.desired,
            elapsed = sample.elapsed.as_secs_f64(),
        );
        let _ = io::stdout().flush();
        self.in_progress = true;
    }

    fn round_finished(&mut self, report: &RoundReport) {
        self.end_progress();
        for line in round_lines(report) {
            println!("{line}");
        }
    }

    fn round_failed(&mut self, round: u64, error: &Error) {
        self.end_progress();
        println!("round {round} aborted: {error}");
    }
}

/// A `=== title ===` line.
pub fn banner(title: &str) -> String {
    let title = format!(" {title} ");
    let pad = BANNER_WIDTH.saturating_sub(title.len());
    let left = pad / 2;
    format!(
        "{l}{title}{r}",
        l = "=".repeat(left),
        r = "=".repeat(pad - left)
    )
}

/// The summary of one round: victims, elapsed time, and verdict.
pub fn round_lines(report: &RoundReport) -> Vec<String> {
    let victims = report
        .event
        .victims
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let verdict = match report.verdict() {
        Verdict::Pass => "PASS",
        Verdict::Fail => "FAIL",
    };
    let slo = report.slo.as_secs_f64();

    let mut lines = vec![format!("victims:  {victims}")];
    match &report.result {
        Ok(outcome) if outcome.recovered => {
            lines.push(format!(
                "recovered in {elapsed:.1}s ({healthy}/{desired} healthy)",
                elapsed = outcome.elapsed_seconds(),
                healthy = outcome.final_healthy_count,
                desired = outcome.desired_count,
            ));
        }
        Ok(outcome) => {
            lines.push(format!(
                "did not recover within {elapsed:.1}s ({healthy}/{desired} healthy)",
                elapsed = outcome.elapsed_seconds(),
                healthy = outcome.final_healthy_count,
                desired = outcome.desired_count,
            ));
        }
        Err(error) => lines.push(format!("could not observe recovery: {error}")),
    }
    lines.push(format!("{verdict} (SLO {slo:.0}s)"));

    lines
}

/// The aggregate over several rounds.
pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let seconds = |d: Duration| format!("{:.1}s", d.as_secs_f64());
    let mttr = summary
        .mean_recovery()
        .map_or_else(|| "n/a".to_owned(), seconds);

    vec![
        format!("rounds:      {}", summary.rounds),
        format!("recovered:   {}", summary.recovered),
        format!("timed out:   {}", summary.timed_out),
        format!("unreachable: {}", summary.unreachable),
        format!("aborted:     {}", summary.aborted),
        format!("MTTR:        {mttr} (max {})", seconds(summary.max_recovery)),
        format!("SLO:         {} passed, {} failed", summary.passed, summary.failed),
    ]
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", banner("Summary"));
    for line in summary_lines(summary) {
        println!("{line}");
    }
}

pub fn print_smoke_report(report: &SmokeReport) {
    println!("{}", banner("Smoke tests"));
    for check in &report.checks {
        let mark = if check.passed { "PASS" } else { "FAIL" };
        println!("[{mark}] {name}: {detail}", name = check.name, detail = check.detail);
    }
    println!(
        "{passed} passed, {failed} failed",
        passed = report.passed(),
        failed = report.failed()
    );
}
