use std::net::SocketAddr;
use std::sync::Arc;

use api_server::http::{self, AppState, SessionRegistry};
use shared::agent::{ReactSqlAgent, ReactSqlAgentConfig, SqlAgent};
use shared::config::{ApiConfig, load_dotenv};
use shared::database::SqlxConnector;
use shared::llm::{GroqGateway, GroqGatewayConfig, MISSING_API_KEY_MESSAGE, is_missing_api_key};
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = "api_server=debug,shared=info,axum=info";

#[tokio::main]
async fn main() {
    let dotenv_result = load_dotenv();
    init_tracing();

    if let Err(err) = dotenv_result {
        error!("failed to load .env: {err}");
        std::process::exit(1);
    }

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let agent: Option<Arc<dyn SqlAgent>> = match GroqGatewayConfig::from_env() {
        Ok(gateway_config) => {
            let primary_model = gateway_config.model_route.primary_model.clone();
            let gateway = match GroqGateway::new(gateway_config) {
                Ok(gateway) => gateway,
                Err(err) => {
                    error!("failed to build groq client: {err}");
                    std::process::exit(1);
                }
            };
            info!(model = %primary_model, "groq agent configured");
            let agent: Arc<dyn SqlAgent> = Arc::new(ReactSqlAgent::new(
                Arc::new(gateway),
                ReactSqlAgentConfig {
                    max_iterations: config.agent_max_iterations,
                    top_k: config.agent_top_k,
                    ..ReactSqlAgentConfig::default()
                },
            ));
            Some(agent)
        }
        Err(err) if is_missing_api_key(&err) => {
            warn!("{MISSING_API_KEY_MESSAGE} Queries will be refused until it is set.");
            None
        }
        Err(err) => {
            error!("failed to read groq config: {err}");
            std::process::exit(1);
        }
    };

    if !config.local_database_path.exists() {
        warn!(
            path = %config.local_database_path.display(),
            "local database file not found; run `cargo run --bin seed-student-db` to create it"
        );
    }

    let sessions = SessionRegistry::new(config.connection_ttl(), config.session_idle_ttl());
    sessions.spawn_pruner(config.session_prune_interval());

    let app = http::build_router(AppState {
        sessions,
        agent,
        connector: Arc::new(SqlxConnector::new(
            config.local_database_path.clone(),
            config.database_max_connections,
        )),
    });

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(bind_addr = %config.bind_addr, "invalid bind address: {err}");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!(
        "api server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
