pub mod capture;
pub mod db;
pub mod error;
pub mod settings;
pub mod utils;
pub mod web;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use capture::{CameraClient, ControlFlags, LoopExit, RecorderController, RecorderState};
use db::Database;
use settings::{Cli, RecorderConfig};
use utils::logging::FailureKind;
use web::AppState;

pub fn run() -> ExitCode {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match RecorderConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            crate::log_failure!(FailureKind::Configuration, "{err:#}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("camrecord starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            crate::log_failure!(FailureKind::Os, "failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(config)) {
        Ok(Some(LoopExit::SetupFailed)) => ExitCode::FAILURE,
        Ok(_) => {
            info!("camrecord stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            crate::log_failure!(FailureKind::Unexpected, "{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Opens storage, starts the recorder, and serves the control plane until a
/// shutdown signal arrives or the recorder ends on its own.
pub async fn serve(config: RecorderConfig) -> Result<Option<LoopExit>> {
    let db = Database::new(config.database_path()).context("failed to open image database")?;
    let camera = CameraClient::new(
        config.capture_url.clone(),
        config.status_url.clone(),
        config.capture_timeout(),
    )?;

    let flags = ControlFlags::default();
    let mut recorder =
        RecorderController::spawn(config.loop_settings(), camera, db.connection(), flags.clone());

    if config.dry_run {
        let exit = recorder.wait().await;
        db.close();
        return exit;
    }

    let listener = match tokio::net::TcpListener::bind(config.serve_addr()).await {
        Ok(listener) => listener,
        Err(err) => {
            finish(&mut recorder, &db).await?;
            return Err(err).with_context(|| format!("failed to bind {}", config.serve_addr()));
        }
    };
    info!("Control plane listening on {}", config.serve_addr());

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    tokio::spawn(shutdown_when_recorder_ends(recorder.subscribe(), shutdown.clone()));

    let app = web::create_router(AppState::new(flags, db.clone()));
    let server_token = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await;

    shutdown.cancel();
    let exit = finish(&mut recorder, &db).await;
    served.context("control plane server failed")?;
    exit
}

/// Terminates the recorder, waits for it, then closes the database.
async fn finish(recorder: &mut RecorderController, db: &Database) -> Result<Option<LoopExit>> {
    let exit = recorder.shutdown().await;
    db.close();
    exit
}

async fn shutdown_when_recorder_ends(
    mut state_rx: tokio::sync::watch::Receiver<RecorderState>,
    token: CancellationToken,
) {
    tokio::select! {
        _ = state_rx.wait_for(|state| *state == RecorderState::Terminated) => {
            info!("Recorder ended; stopping control plane");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(mut term), Ok(mut hangup)) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = hangup.recv() => {}
                }
            }
            (Err(err), _) | (_, Err(err)) => {
                crate::log_failure!(FailureKind::Os, "failed to install signal handlers: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = token.cancelled() => return,
    }

    info!("Shutdown signal received");
    token.cancel();
}
