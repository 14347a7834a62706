//! Agent query orchestration core — server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use agentcore_config::{load_settings, Settings};
use agentcore_core::{AgentRuntime, MemoryService};
use agentcore_memory::{HttpMemoryService, MemoryServiceConfig};
use agentcore_persistence::{PersistenceLayer, ScyllaConfig};
use agentcore_runtime::{DisabledAgentRuntime, HttpAgentRuntime, RuntimeConfig};
use agentcore_server::metrics::init_metrics;
use agentcore_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("AGENTCORE_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        }
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting agentcore-server");
    tracing::info!(environment = ?config.environment, "configuration loaded");

    let metrics_handle = init_metrics();
    tracing::info!("initialized Prometheus metrics at /metrics");

    let scylla_config = ScyllaConfig {
        hosts: config.persistence.scylla_hosts.clone(),
        keyspace: config.persistence.keyspace.clone(),
        connect_timeout: Duration::from_secs(10),
    };
    let persistence = PersistenceLayer::init(&scylla_config, &config.cache.redis_url).await?;
    tracing::info!(
        hosts = ?config.persistence.scylla_hosts,
        keyspace = %config.persistence.keyspace,
        "persistence layer initialized"
    );

    let memory: Arc<dyn MemoryService> = Arc::new(HttpMemoryService::new(MemoryServiceConfig {
        base_url: config.memory_service.base_url.clone(),
        request_timeout: Duration::from_millis(config.memory_service.timeout_ms),
    }));

    let runtime: Arc<dyn AgentRuntime> = if config.agent_runtime.base_url.is_empty() {
        tracing::warn!("no agent_runtime.base_url configured; every query will fail with RUNTIME_UNAVAILABLE");
        Arc::new(DisabledAgentRuntime)
    } else {
        Arc::new(HttpAgentRuntime::new(RuntimeConfig {
            base_url: config.agent_runtime.base_url.clone(),
            request_timeout: Duration::from_millis(config.agent_runtime.timeout_ms),
        }))
    };

    let state = AppState::new(
        config.clone(),
        Arc::new(persistence.durable),
        Arc::new(persistence.cache),
        memory,
        runtime,
    )
    .with_env(env)
    .with_metrics_handle(metrics_handle);

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("agentcore={level},tower_http=debug").into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
