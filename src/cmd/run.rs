//! `butler run` — start the agent.
//!
//! Builds the controller from CLI settings, binds the exporter HTTP
//! surface, and drives both until a shutdown signal or a fatal error.
//! The controller performs its startup config fetch before the first
//! scheduler tick; a failure there exits non-zero.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::RunArgs;
use crate::controller::{Controller, ControllerSettings};
use crate::error::ButlerError;
use crate::logging;
use crate::server::{self, ExporterState};
use crate::transport::TransportOptions;

pub async fn execute(args: RunArgs) -> Result<(), ButlerError> {
    logging::init(&args.log_level, args.pretty, args.json);

    let default_subs = parse_subs(&args.mustache_subs)?;

    let settings = ControllerSettings {
        config_url: args.config_url.clone(),
        self_interval: Duration::from_secs(args.scheduler_interval.max(1)),
        transport_opts: TransportOptions {
            timeout: Duration::from_secs(args.config_timeout.max(1)),
            insecure: args.config_insecure,
            s3_region: args.s3_region.clone(),
        },
        default_subs,
    };

    let controller = Controller::new(settings)?;

    let state = Arc::new(ExporterState {
        controller: Arc::clone(&controller),
        start_time: Instant::now(),
    });
    let router = server::build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.http_host, args.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        config_url = %args.config_url,
        self_interval = args.scheduler_interval,
        "butler started"
    );

    // Dropping shutdown_tx would also stop the controller; the graceful
    // path sends true explicitly on SIGTERM / Ctrl+C.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut controller_task = tokio::spawn(controller.run(shutdown_rx));

    let graceful = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    let result = tokio::select! {
        // The controller only returns on shutdown or a fatal error; in
        // the fatal case the exporter dies with the process anyway.
        outcome = &mut controller_task => join_outcome(outcome),
        served = axum::serve(listener, router).with_graceful_shutdown(graceful) => {
            served?;
            join_outcome((&mut controller_task).await)
        }
    };

    tracing::info!("butler stopped");
    result
}

fn join_outcome(
    outcome: Result<Result<(), ButlerError>, tokio::task::JoinError>,
) -> Result<(), ButlerError> {
    match outcome {
        Ok(result) => result,
        Err(e) => Err(ButlerError::Io(std::io::Error::other(format!(
            "controller task failed: {e}"
        )))),
    }
}

fn parse_subs(pairs: &[String]) -> Result<BTreeMap<String, String>, ButlerError> {
    let mut subs = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ButlerError::ConfigParse {
                path: "--mustache-subs".to_string(),
                source: format!("'{pair}' is not of the form key=value").into(),
            });
        };
        subs.insert(key.trim().to_string(), value.to_string());
    }
    Ok(subs)
}
