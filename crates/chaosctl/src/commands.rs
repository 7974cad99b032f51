use chaoslib::clock::Clock;
use chaoslib::cluster::ClusterClient;
use chaoslib::experiment::{Experiment, InjectionMode, Reporter, RoundReport, RunSummary};
use chaoslib::report::{self, ConsoleReporter};
use chaoslib::smoke::{self, SmokeReport};
use chaoslib::{Error, EXIT_CODE_FAILED, EXIT_CODE_OK, EXIT_CODE_UNREACHABLE};

use crate::args::{BatchArgs, ContinuousArgs, SmokeArgs};
use crate::health;

/// Kill one pod and report on its recovery.  An SLO breach is still a
/// successful run.
pub async fn cmd_single<C, K>(experiment: &Experiment<'_, C, K>) -> i32
where
    C: ClusterClient + Sync,
    K: Clock + Sync,
{
    print_intro(experiment, "Single pod failure");

    let mut reporter = ConsoleReporter::new();
    let result = experiment
        .run_round(1, InjectionMode::Single, &mut rand::thread_rng(), &mut reporter)
        .await;
    if let Err(error) = &result {
        reporter.round_failed(1, error);
    }

    round_exit_code(&result)
}

/// Kill a pod every `interval` until interrupted.
pub async fn cmd_continuous<C, K>(experiment: &Experiment<'_, C, K>, args: ContinuousArgs) -> i32
where
    C: ClusterClient + Sync,
    K: Clock + Sync,
{
    print_intro(experiment, "Sustained chaos");
    println!(
        "one pod every {interval}s after recovery, interrupt to stop",
        interval = args.interval.as_secs()
    );

    let mut shutdown = chaoslib::shutdown_flag();
    let summary = experiment
        .run_continuous(
            args.interval,
            InjectionMode::Single,
            &mut rand::thread_rng(),
            &mut shutdown,
            &mut ConsoleReporter::new(),
        )
        .await;

    finish(&summary)
}

/// Kill `victims` pods at once, `rounds` times.
pub async fn cmd_batch<C, K>(experiment: &Experiment<'_, C, K>, args: BatchArgs) -> i32
where
    C: ClusterClient + Sync,
    K: Clock + Sync,
{
    print_intro(experiment, "Batch pod failure");
    println!(
        "{victims} pods per round, {rounds} rounds",
        victims = args.victims,
        rounds = args.rounds
    );

    let mut shutdown = chaoslib::shutdown_flag();
    let mode = InjectionMode::Batch {
        victims: args.victims,
        selection: args.selection(),
    };
    let summary = experiment
        .run_rounds(
            args.rounds,
            args.interval,
            mode,
            &mut rand::thread_rng(),
            &mut shutdown,
            &mut ConsoleReporter::new(),
        )
        .await;

    finish(&summary)
}

/// Check the deployment's health, and optionally its ability to heal.
pub async fn cmd_smoke<C, K>(experiment: &Experiment<'_, C, K>, args: SmokeArgs) -> i32
where
    C: ClusterClient + Sync,
    K: Clock + Sync,
{
    print_intro(experiment, "Smoke tests");

    let mut smoke_report = smoke::run(
        experiment,
        !args.skip_self_heal,
        &mut rand::thread_rng(),
        &mut ConsoleReporter::new(),
    )
    .await;

    if let Some(url) = args.health_url {
        match health::check(&url, experiment.config().observer.timeout).await {
            Ok(detail) => smoke_report.record("health endpoint", true, detail),
            Err(detail) => smoke_report.record("health endpoint", false, detail),
        }
    }

    println!();
    report::print_smoke_report(&smoke_report);

    smoke_exit_code(&smoke_report)
}

///////////////////////////////////////////////////////////////////////////////

fn print_intro<C, K>(experiment: &Experiment<'_, C, K>, title: &str)
where
    C: ClusterClient + Sync,
    K: Clock + Sync,
{
    let config = experiment.config();
    println!("{}", report::banner(title));
    println!(
        "deployment: {workload}  selector: {selector}  predicate: {predicate}",
        workload = config.workload,
        selector = config.selector,
        predicate = config.predicate,
    );
    println!(
        "timeout: {timeout}s  SLO: {slo}s",
        timeout = config.observer.timeout.as_secs(),
        slo = config.slo.as_secs(),
    );
}

fn finish(summary: &RunSummary) -> i32 {
    report::print_summary(summary);
    summary_exit_code(summary)
}

/// A single round which ran is a success whatever its verdict, unless the
/// recovery could not be observed.
fn round_exit_code(result: &Result<RoundReport, Error>) -> i32 {
    match result {
        Ok(report) if report.result.is_err() => EXIT_CODE_UNREACHABLE,
        Ok(_) => EXIT_CODE_OK,
        Err(error) => chaoslib::exit_code_for(error),
    }
}

/// Failed rounds are skipped over, but losing sight of the cluster is not.
fn summary_exit_code(summary: &RunSummary) -> i32 {
    if summary.unreachable > 0 {
        EXIT_CODE_UNREACHABLE
    } else {
        EXIT_CODE_OK
    }
}

fn smoke_exit_code(report: &SmokeReport) -> i32 {
    if report.is_success() {
        EXIT_CODE_OK
    } else {
        EXIT_CODE_FAILED
    }
}
