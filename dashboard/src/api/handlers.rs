use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use beaglegaze::units::{address_hex, parse_address};
use beaglegaze::WriteKind;
use std::sync::Arc;
use tokio::time::Instant;

use super::server::AppState;
use super::types::*;
use crate::error::ApiError;
use crate::usage::{LibraryUsage, UsageError, UsageInput};

type Accepted = (StatusCode, Json<WriteAccepted>);

fn accepted(kind: WriteKind) -> Accepted {
    (StatusCode::ACCEPTED, Json(WriteAccepted::new(kind)))
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn info_handler(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let config = state.dashboard.config();
    Json(InfoResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_contract: address_hex(&config.default_contract),
        active_contract: address_hex(&state.dashboard.active_contract()),
        accepted_chain_ids: config.accepted_chain_ids.clone(),
        poll_interval_ms: config.poll_interval.as_millis() as u64,
        funding_poll_interval_ms: config.funding_poll_period().as_millis() as u64,
        poll_reset_policy: config.poll_reset_policy,
        started_at: state.started_at.to_rfc3339(),
    })
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub async fn session_handler(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let dashboard = &state.dashboard;
    Json(SessionResponse::new(
        &dashboard.session(),
        dashboard.has_provider(),
        dashboard.binding(),
    ))
}

pub async fn connect_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let account = state.dashboard.connect().await?;
    log::info!("Wallet connected: {}", account);
    Ok(Json(ConnectResponse {
        account: address_hex(&account),
    }))
}

pub async fn disconnect_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.dashboard.disconnect();
    Json(StatusResponse::ok())
}

pub async fn switch_network_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SwitchNetworkResponse>, ApiError> {
    let chain_id = state.dashboard.switch_network().await?;
    Ok(Json(SwitchNetworkResponse {
        chain_id,
        chain_name: beaglegaze::config::chain_name(chain_id),
    }))
}

// ---------------------------------------------------------------------------
// Address book
// ---------------------------------------------------------------------------

fn contracts_response(state: &AppState) -> ContractsResponse {
    let dashboard = &state.dashboard;
    ContractsResponse::new(&dashboard.contracts(), dashboard.active_contract())
}

pub async fn list_contracts_handler(State(state): State<Arc<AppState>>) -> Json<ContractsResponse> {
    Json(contracts_response(&state))
}

pub async fn add_contract_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddContractRequest>,
) -> Result<(StatusCode, Json<ContractsResponse>), ApiError> {
    let entry = state.dashboard.add_contract(&req.name, &req.address)?;
    log::info!("Added contract {} ({})", entry.name, entry.address);
    Ok((StatusCode::CREATED, Json(contracts_response(&state))))
}

pub async fn remove_contract_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<RemoveContractResponse>, ApiError> {
    if !state.dashboard.remove_contract(&address)? {
        return Err(ApiError::NotFound(format!("contract {}", address)));
    }
    Ok(Json(RemoveContractResponse {
        address,
        status: "deleted".to_string(),
    }))
}

pub async fn select_contract_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<ContractsResponse>, ApiError> {
    state.dashboard.select_contract(&address)?;
    Ok(Json(contracts_response(&state)))
}

// ---------------------------------------------------------------------------
// Funding panel
// ---------------------------------------------------------------------------

pub async fn funding_handler(State(state): State<Arc<AppState>>) -> Json<FundingResponse> {
    let funding = state.dashboard.funding().state();
    Json(FundingResponse::new(&funding, Instant::now()))
}

pub async fn funding_refresh_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.dashboard.funding().refresh();
    Json(StatusResponse::ok())
}

pub async fn fund_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AmountRequest>,
) -> Result<Accepted, ApiError> {
    state.dashboard.funding().fund(&req.amount).await?;
    Ok(accepted(WriteKind::Fund))
}

pub async fn purchase_subscription_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AmountRequest>,
) -> Result<Accepted, ApiError> {
    state
        .dashboard
        .funding()
        .purchase_subscription(&req.amount)
        .await?;
    Ok(accepted(WriteKind::PurchaseSubscription))
}

pub async fn payout_handler(State(state): State<Arc<AppState>>) -> Result<Accepted, ApiError> {
    state.dashboard.funding().request_payout().await?;
    Ok(accepted(WriteKind::RequestPayout))
}

// ---------------------------------------------------------------------------
// Developer panel
// ---------------------------------------------------------------------------

pub async fn developer_handler(State(state): State<Arc<AppState>>) -> Json<DeveloperResponse> {
    let developer = state.dashboard.developer().state();
    Json(DeveloperResponse::new(&developer, Instant::now()))
}

pub async fn developer_refresh_handler(
    State(state): State<Arc<AppState>>,
) -> Json<StatusResponse> {
    state.dashboard.developer().refresh();
    Json(StatusResponse::ok())
}

pub async fn register_handler(State(state): State<Arc<AppState>>) -> Result<Accepted, ApiError> {
    state.dashboard.developer().request_registration().await?;
    Ok(accepted(WriteKind::RequestDeveloperRegistration))
}

pub async fn withdraw_handler(State(state): State<Arc<AppState>>) -> Result<Accepted, ApiError> {
    state.dashboard.developer().withdraw_balance().await?;
    Ok(accepted(WriteKind::WithdrawBalance))
}

pub async fn check_candidate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CandidateRequest>,
) -> Result<(StatusCode, Json<DeveloperResponse>), ApiError> {
    state
        .dashboard
        .developer()
        .check_candidate(&req.candidate)
        .await?;
    let developer = state.dashboard.developer().state();
    Ok((
        StatusCode::ACCEPTED,
        Json(DeveloperResponse::new(&developer, Instant::now())),
    ))
}

pub async fn select_candidate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CandidateRequest>,
) -> Result<Json<DeveloperResponse>, ApiError> {
    let candidate = parse_address(&req.candidate)?;
    state.dashboard.developer().select_candidate(candidate).await?;
    let developer = state.dashboard.developer().state();
    Ok(Json(DeveloperResponse::new(&developer, Instant::now())))
}

pub async fn vote_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VoteRequest>,
) -> Result<Accepted, ApiError> {
    state.dashboard.developer().vote(req.approve).await?;
    Ok(accepted(WriteKind::VoteForDeveloper))
}

// ---------------------------------------------------------------------------
// Library usage log
// ---------------------------------------------------------------------------

pub async fn list_usages_handler(State(state): State<Arc<AppState>>) -> Json<Vec<LibraryUsage>> {
    Json(state.usage.lock().await.all())
}

pub async fn get_usage_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<LibraryUsage>, ApiError> {
    let usage = state.usage.lock().await.get(id);
    usage.map(Json).ok_or_else(|| UsageError::NotFound(id).into())
}

pub async fn usages_by_library_handler(
    State(state): State<Arc<AppState>>,
    Path(library_name): Path<String>,
) -> Json<Vec<LibraryUsage>> {
    Json(state.usage.lock().await.by_library(&library_name))
}

pub async fn usages_by_project_handler(
    State(state): State<Arc<AppState>>,
    Path(project_name): Path<String>,
) -> Json<Vec<LibraryUsage>> {
    Json(state.usage.lock().await.by_project(&project_name))
}

pub async fn top_used_handler(State(state): State<Arc<AppState>>) -> Json<Vec<LibraryUsage>> {
    Json(state.usage.lock().await.top_used())
}

pub async fn recent_usages_handler(State(state): State<Arc<AppState>>) -> Json<Vec<LibraryUsage>> {
    Json(state.usage.lock().await.recent())
}

pub async fn create_usage_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<UsageInput>,
) -> Result<(StatusCode, Json<LibraryUsage>), ApiError> {
    let usage = state.usage.lock().await.create(&input)?;
    log::info!(
        "Recorded {} {}::{} for {}",
        usage.library_name,
        usage.version,
        usage.method_name,
        usage.project_name
    );
    Ok((StatusCode::CREATED, Json(usage)))
}

pub async fn update_usage_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(input): Json<UsageInput>,
) -> Result<Json<LibraryUsage>, ApiError> {
    let usage = state.usage.lock().await.update(id, &input)?;
    Ok(Json(usage))
}

pub async fn delete_usage_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.usage.lock().await.delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub async fn list_toasts_handler(State(state): State<Arc<AppState>>) -> Json<Vec<ToastInfo>> {
    let now = Instant::now();
    let toasts = state
        .dashboard
        .toasts()
        .list()
        .iter()
        .map(|toast| ToastInfo::new(toast, now))
        .collect();
    Json(toasts)
}

pub async fn dismiss_toast_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !state.dashboard.toasts().dismiss(id) {
        return Err(ApiError::NotFound(format!("toast {}", id)));
    }
    Ok(Json(StatusResponse::ok()))
}
