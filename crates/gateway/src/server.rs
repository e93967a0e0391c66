use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use {
    axum::{
        Router,
        routing::{get, post},
    },
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{Any, CorsLayer},
        services::ServeDir,
        trace::TraceLayer,
    },
    tracing::{info, warn},
    wabridge_channels::ProviderConnector,
    wabridge_config::WabridgeConfig,
};

use crate::{events::spawn_event_loops, handlers, state::GatewayState};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let media = ServeDir::new(state.media.dir());

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/sessions",
            post(handlers::start_session).get(handlers::list_sessions),
        )
        .route(
            "/sessions/{user_id}",
            get(handlers::session_status).delete(handlers::stop_session),
        )
        .route(
            "/sessions/{user_id}/challenge",
            get(handlers::session_challenge),
        )
        .route(
            "/sessions/{user_id}/connection",
            get(handlers::session_connection),
        )
        .route("/messages", post(handlers::send_message))
        .nest_service("/media", media)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Run the gateway until Ctrl-C or SIGTERM, then tear down every session.
pub async fn start_gateway(
    config: WabridgeConfig,
    connector: Arc<dyn ProviderConnector>,
) -> anyhow::Result<()> {
    let (state, channels) = GatewayState::new(&config, connector);
    state.media.ensure_dir().await?;

    let cancel = CancellationToken::new();
    let mut tasks = spawn_event_loops(&state, channels, cancel.clone());
    tasks.push(spawn_sweep_loop(
        Arc::clone(&state),
        config.sessions.sweep_interval(),
        cancel.clone(),
    ));

    let app = build_gateway_app(Arc::clone(&state));
    let ip: IpAddr = config.server.bind.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("wabridge gateway v{}", state.version),
        format!("listening on {addr}"),
        format!("public url: {}", config.server.public_url()),
        format!("status webhook: {}", config.webhooks.status_url),
        format!("inbound webhook: {}", config.webhooks.inbound_url),
        format!("media dir: {}", state.media.dir().display()),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("gateway stopping");
    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    let outcomes = state.sweeper.shutdown().await;
    state.tracker.shutdown();
    info!(sessions = outcomes.len(), "gateway stopped");
    Ok(())
}

/// Sweep sessions and prune delivery records every `interval`.
fn spawn_sweep_loop(
    state: Arc<GatewayState>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = state.sweeper.sweep().await;
                    let pruned = state.tracker.prune();
                    if !report.evicted.is_empty() || pruned > 0 {
                        info!(
                            checked = report.checked,
                            evicted = report.evicted.len(),
                            pruned,
                            "sweep finished"
                        );
                    }
                },
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
