mod args;
mod commands;
mod health;

use clap::{Parser, Subcommand};
use std::process;

use chaoslib::clock::TokioClock;
use chaoslib::experiment::Experiment;
use chaoslib::k8s;

/// Chaos experiments against a Kubernetes deployment: kill pods, measure how
/// long the cluster takes to replace them.
#[derive(Debug, Parser)]
struct Args {
    #[command(flatten)]
    k8s: k8s::Config,

    #[command(flatten)]
    experiment: args::ExperimentArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Kill one random pod and time the recovery.
    Single,
    /// Kill one random pod per round, until interrupted.
    Continuous(args::ContinuousArgs),
    /// Kill several pods at once, for a fixed number of rounds.
    Batch(args::BatchArgs),
    /// Check that the deployment is healthy and heals itself.
    Smoke(args::SmokeArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .init();

    let Args {
        k8s,
        experiment,
        command,
    } = Args::parse();

    let config = experiment.into_config();
    if let Err(error) = config.validate() {
        tracing::error!(?error, "invalid configuration");
        eprintln!("error: {error}");
        process::exit(chaoslib::exit_code_for(&error));
    }

    let client = match k8s.connect().await {
        Ok(client) => client,
        Err(error) => {
            tracing::error!(?error, "could not connect to cluster");
            eprintln!("error: {error}");
            process::exit(chaoslib::exit_code_for(&error));
        }
    };

    let clock = TokioClock::new();
    let experiment = Experiment::new(&client, &clock, config);

    let code = match command {
        Command::Single => commands::cmd_single(&experiment).await,
        Command::Continuous(cmd_args) => commands::cmd_continuous(&experiment, cmd_args).await,
        Command::Batch(cmd_args) => commands::cmd_batch(&experiment, cmd_args).await,
        Command::Smoke(cmd_args) => commands::cmd_smoke(&experiment, cmd_args).await,
    };

    process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaoslib::cluster::HealthPredicate;
    use chaoslib::injector::VictimSelection;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("chaosctl").chain(args.iter().copied()))
    }

    #[test]
    fn single_with_defaults() {
        let args = parse(&["single"]).unwrap();
        assert!(matches!(args.command, Command::Single));

        let config = args.experiment.into_config();
        assert_eq!(config.predicate, HealthPredicate::ReadyForTraffic);
        assert_eq!(config.observer.retry_budget, 3);
        assert_eq!(config.replicas, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn predicate_names() {
        for (name, predicate) in [
            ("scheduled", HealthPredicate::Scheduled),
            ("running", HealthPredicate::Running),
            ("ready", HealthPredicate::ReadyForTraffic),
        ] {
            let args = parse(&["--predicate", name, "single"]).unwrap();
            assert_eq!(args.experiment.predicate, predicate);
        }

        assert!(parse(&["--predicate", "alive", "single"]).is_err());
    }

    #[test]
    fn retry_budget_must_be_positive() {
        assert!(parse(&["--retry-budget", "0", "single"]).is_err());
        let args = parse(&["--retry-budget", "5", "single"]).unwrap();
        assert_eq!(args.experiment.retry_budget, 5);
    }

    #[test]
    fn zero_poll_interval_is_invalid_configuration() {
        let args = parse(&["--poll-interval", "0", "single"]).unwrap();
        let error = args.experiment.into_config().validate().unwrap_err();
        assert_eq!(chaoslib::exit_code_for(&error), chaoslib::EXIT_CODE_FAILED);
    }

    #[test]
    fn zero_replicas_is_invalid_configuration() {
        let args = parse(&["--replicas", "0", "single"]).unwrap();
        let error = args.experiment.into_config().validate().unwrap_err();
        assert_eq!(chaoslib::exit_code_for(&error), chaoslib::EXIT_CODE_FAILED);
    }

    #[test]
    fn batch_options() {
        let args = parse(&["-l", "app=web", "batch", "-k", "4", "--rounds", "2", "--random"]).unwrap();
        assert_eq!(args.experiment.selector, "app=web");
        match args.command {
            Command::Batch(batch) => {
                assert_eq!(batch.victims, 4);
                assert_eq!(batch.rounds, 2);
                assert_eq!(batch.selection(), VictimSelection::Random);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn continuous_interval_in_seconds() {
        match parse(&["continuous", "--interval", "45"]).unwrap().command {
            Command::Continuous(continuous) => {
                assert_eq!(continuous.interval, Duration::from_secs(45));
            }
            other => panic!("expected continuous, got {other:?}"),
        }
    }

    #[test]
    fn smoke_url_must_parse() {
        assert!(parse(&["smoke", "--health-url", "not a url"]).is_err());
        match parse(&["smoke", "--health-url", "http://localhost:8080/health"]).unwrap().command {
            Command::Smoke(smoke) => {
                assert_eq!(smoke.health_url.unwrap().path(), "/health");
                assert!(!smoke.skip_self_heal);
            }
            other => panic!("expected smoke, got {other:?}"),
        }
    }

    #[test]
    fn recovery_timeout_falls_back_to_env() {
        // the only test which reads the timeout
        std::env::set_var("RECOVERY_TIMEOUT", "45");
        let from_env = parse(&["single"]).unwrap();
        let from_flag = parse(&["--timeout", "10", "single"]).unwrap();
        std::env::remove_var("RECOVERY_TIMEOUT");

        assert_eq!(from_env.experiment.timeout, Duration::from_secs(45));
        assert_eq!(from_flag.experiment.timeout, Duration::from_secs(10));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(parse(&[]).is_err());
    }
}
