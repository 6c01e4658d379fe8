use axum::{
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use beaglegaze::{
    AddressBookStore, Dashboard, DashboardConfig, JsonRpcClient, RpcGatewayFactory,
    RpcWalletProvider, WalletProvider,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use super::handlers;
use crate::usage::{LibraryUsageStore, USAGE_FILE};

/// Shared state behind every handler
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
    pub usage: Mutex<LibraryUsageStore>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(dashboard: Arc<Dashboard>, usage: LibraryUsageStore) -> Self {
        Self {
            dashboard,
            usage: Mutex::new(usage),
            started_at: Utc::now(),
        }
    }
}

/// Wire the dashboard to the configured JSON-RPC endpoints
pub fn build_dashboard(config: DashboardConfig) -> anyhow::Result<Arc<Dashboard>> {
    let rpc = JsonRpcClient::new(config.rpc_urls.clone())?;
    log::info!("Using RPC endpoints: {}", rpc.urls().join(", "));

    let factory = Arc::new(RpcGatewayFactory::new(rpc.clone(), config.gateway_options()));
    let provider: Arc<dyn WalletProvider> =
        Arc::new(RpcWalletProvider::new(rpc, config.event_poll_interval));
    let book = AddressBookStore::open(&config.address_book_path);

    Ok(Dashboard::start(config, Some(provider), factory, book))
}

fn cors_layer() -> CorsLayer {
    // ALLOWED_ORIGINS="https://app.example.com,https://preview.example.com" restricts origins
    // If not set, allows any origin (development mode)
    match std::env::var("ALLOWED_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            log::info!("CORS configured for origins: {}", origins);
            let origin_list: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| match s.trim().parse() {
                    Ok(origin) => Some(origin),
                    Err(_) => {
                        log::warn!("⚠️  Ignoring invalid CORS origin '{}'", s.trim());
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(origin_list)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => {
            log::warn!("CORS: Allowing all origins (development mode). Set ALLOWED_ORIGINS env var for production.");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_handler))
        .route("/api/info", get(handlers::info_handler))
        // Session routes
        .route("/api/session", get(handlers::session_handler))
        .route("/api/session/connect", post(handlers::connect_handler))
        .route("/api/session/disconnect", post(handlers::disconnect_handler))
        .route(
            "/api/session/switch-network",
            post(handlers::switch_network_handler),
        )
        // Address book routes
        .route(
            "/api/contracts",
            get(handlers::list_contracts_handler).post(handlers::add_contract_handler),
        )
        .route(
            "/api/contracts/:address",
            delete(handlers::remove_contract_handler),
        )
        .route(
            "/api/contracts/:address/select",
            post(handlers::select_contract_handler),
        )
        // Funding panel routes
        .route("/api/funding", get(handlers::funding_handler))
        .route("/api/funding/refresh", post(handlers::funding_refresh_handler))
        .route("/api/funding/fund", post(handlers::fund_handler))
        .route(
            "/api/funding/purchase-subscription",
            post(handlers::purchase_subscription_handler),
        )
        .route("/api/funding/payout", post(handlers::payout_handler))
        // Developer panel routes
        .route("/api/developer", get(handlers::developer_handler))
        .route(
            "/api/developer/refresh",
            post(handlers::developer_refresh_handler),
        )
        .route("/api/developer/register", post(handlers::register_handler))
        .route("/api/developer/withdraw", post(handlers::withdraw_handler))
        .route(
            "/api/developer/candidate/check",
            post(handlers::check_candidate_handler),
        )
        .route(
            "/api/developer/candidate/select",
            post(handlers::select_candidate_handler),
        )
        .route(
            "/api/developer/candidate/vote",
            post(handlers::vote_handler),
        )
        // Library usage log
        .route(
            "/api/library-usage",
            get(handlers::list_usages_handler).post(handlers::create_usage_handler),
        )
        .route("/api/library-usage/top-used", get(handlers::top_used_handler))
        .route("/api/library-usage/recent", get(handlers::recent_usages_handler))
        .route(
            "/api/library-usage/library/:library_name",
            get(handlers::usages_by_library_handler),
        )
        .route(
            "/api/library-usage/project/:project_name",
            get(handlers::usages_by_project_handler),
        )
        .route(
            "/api/library-usage/:id",
            get(handlers::get_usage_handler)
                .put(handlers::update_usage_handler)
                .delete(handlers::delete_usage_handler),
        )
        // Notifications
        .route("/api/toasts", get(handlers::list_toasts_handler))
        .route("/api/toasts/:id", delete(handlers::dismiss_toast_handler))
        .layer(cors_layer())
        .with_state(state)
}

pub async fn start_server(addr: &str) -> anyhow::Result<()> {
    let config = DashboardConfig::from_env();
    let dashboard = build_dashboard(config)?;
    // LIBRARY_USAGE_PATH=/var/lib/beaglegaze/library-usage.json to move the usage log
    let usage_path = std::env::var("LIBRARY_USAGE_PATH").unwrap_or_else(|_| USAGE_FILE.to_string());
    let usage = LibraryUsageStore::open(usage_path);
    let state = Arc::new(AppState::new(dashboard.clone(), usage));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the reconciliation loops once no request can reach them
    dashboard.shutdown();
    log::info!("Dashboard stopped");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            log::info!("Received SIGTERM signal");
        },
    }

    log::info!("Shutdown signal received, exiting gracefully...");
}
