#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod cluster;
pub mod error;
pub mod experiment;
pub mod injector;
pub mod k8s;
pub mod observer;
pub mod report;
pub mod smoke;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

// convenience re-export
pub use crate::error::Error;

/// Exit code for a normal run, including one which breached the SLO.
pub static EXIT_CODE_OK: i32 = 0;

/// Exit code in case the target does not exist, the configuration is
/// invalid, or smoke checks failed.
pub static EXIT_CODE_FAILED: i32 = 1;

/// Exit code in case the cluster could not be reached or observed.
pub static EXIT_CODE_UNREACHABLE: i32 = 2;

/// The exit code a failed run should terminate with.
pub fn exit_code_for(error: &Error) -> i32 {
    if error.is_unreachable() {
        EXIT_CODE_UNREACHABLE
    } else {
        EXIT_CODE_FAILED
    }
}

/// Wait for SIGTERM, SIGINT, or SIGQUIT.
pub async fn wait_for_signal() {
    let (Ok(mut sigterm), Ok(mut sigint), Ok(mut sigquit)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::quit()),
    ) else {
        tracing::error!("could not install signal handlers, ignoring signals");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = sigterm.recv() => (),
        _ = sigint.recv() => (),
        _ = sigquit.recv() => (),
    }

    tracing::info!("received shutdown signal");
}

/// Spawn a task which flips the returned flag to `true` when a shutdown
/// signal arrives.
pub fn shutdown_flag() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = tx.send(true);
    });

    rx
}
