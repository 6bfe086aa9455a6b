use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use shared::checkout::{CheckoutReceipt, Product};
use shared::constants::{
    SESSION_SIGNATURE_HEADER, WHEEL_CHECKOUT_ENDPOINT, WHEEL_CONFIG_ENDPOINT, WHEEL_RESULT_ENDPOINT,
    WHEEL_SESSION_ENDPOINT, WHEEL_SPIN_ENDPOINT,
};
use shared::shared_wheel_game::{SpinOutcome, SpinSession};
use shared::validation::EmailOrIndianMobile;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::TransactionRow;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

// Upper bound on how long a result request waits past the presentation delay
const REVEAL_GRACE: Duration = Duration::from_secs(5);

pub struct WheelSessionEntry {
    pub session: SpinSession,
    pub created_at: Instant,
    reveal: Option<watch::Receiver<Option<SpinOutcome>>>,
}

impl WheelSessionEntry {
    fn new(now: Instant) -> Self {
        Self {
            session: SpinSession::new(),
            created_at: now,
            reveal: None,
        }
    }
}

pub type SessionRegistry = Arc<Mutex<HashMap<String, WheelSessionEntry>>>;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(WHEEL_CONFIG_ENDPOINT, get(get_wheel_config))
        .route(WHEEL_SESSION_ENDPOINT, post(new_session))
        .route(WHEEL_SPIN_ENDPOINT, post(spin_wheel))
        .route(&format!("{}/:session_id", WHEEL_RESULT_ENDPOINT), get(get_spin_result))
        .route(WHEEL_CHECKOUT_ENDPOINT, post(checkout))
}

fn signer(secret: &str) -> Result<HmacSha256, AppError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Failed to sign session".to_string()))
}

fn compute_signature(secret: &str, session_id: &str) -> Result<String, AppError> {
    let mut mac = signer(secret)?;
    mac.update(format!("session:{}", session_id).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &str, session_id: &str, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = headers
        .get(SESSION_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    let provided = hex::decode(provided.trim()).map_err(|_| AppError::Forbidden)?;

    let mut mac = signer(secret)?;
    mac.update(format!("session:{}", session_id).as_bytes());
    mac.verify_slice(&provided).map_err(|_| AppError::Forbidden)
}

/// Removes sessions older than `ttl`, returning how many were dropped.
pub fn purge_expired(sessions: &mut HashMap<String, WheelSessionEntry>, ttl: Duration, now: Instant) -> usize {
    let before = sessions.len();
    sessions.retain(|_, entry| now.duration_since(entry.created_at) < ttl);
    before - sessions.len()
}

pub fn spawn_session_sweeper(sessions: SessionRegistry, ttl: Duration, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            let removed = purge_expired(&mut *sessions.lock().await, ttl, Instant::now());
            if removed > 0 {
                info!("Cleaned up {} expired wheel sessions", removed);
            }
        }
    });
}

/// Looks up a live session after checking its signature.
fn live_session<'a>(
    sessions: &'a mut HashMap<String, WheelSessionEntry>,
    state: &AppState,
    session_id: &str,
    headers: &HeaderMap,
) -> Result<&'a mut WheelSessionEntry, AppError> {
    let expired = match sessions.get(session_id) {
        Some(entry) => entry.created_at.elapsed() >= state.config.session_ttl,
        None => return Err(AppError::NotFound("Unknown wheel session".to_string())),
    };
    verify_signature(&state.config.session_secret, session_id, headers)?;
    if expired {
        sessions.remove(session_id);
        return Err(AppError::Gone);
    }
    sessions
        .get_mut(session_id)
        .ok_or_else(|| AppError::NotFound("Unknown wheel session".to_string()))
}

#[derive(Serialize, Deserialize)]
pub struct SegmentView {
    pub value: u32,
    pub label: String,
    pub color: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct WheelLayoutResponse {
    pub product: Product,
    pub segments: Vec<SegmentView>,
    pub presentation_delay_ms: u64,
}

/// Dial layout for the rendering layer. Weights stay on the server.
async fn get_wheel_config(State(state): State<AppState>) -> Json<WheelLayoutResponse> {
    let wheel = &state.config.wheel;
    Json(WheelLayoutResponse {
        product: state.config.storefront.product.clone(),
        segments: wheel
            .segments
            .iter()
            .map(|s| SegmentView {
                value: s.value,
                label: s.label.clone(),
                color: s.color.clone(),
            })
            .collect(),
        presentation_delay_ms: wheel.presentation_delay_ms,
    })
}

#[derive(Serialize, Deserialize)]
pub struct NewWheelSessionResponse {
    pub session_id: String,
    pub session_signature: String,
}

async fn new_session(State(state): State<AppState>) -> Result<Json<NewWheelSessionResponse>, AppError> {
    let session_id = Uuid::new_v4().to_string();
    let session_signature = compute_signature(&state.config.session_secret, &session_id)?;

    state
        .sessions
        .lock()
        .await
        .insert(session_id.clone(), WheelSessionEntry::new(Instant::now()));

    Ok(Json(NewWheelSessionResponse {
        session_id,
        session_signature,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct WheelSpinRequest {
    pub session_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct WheelSpinResponse {
    pub rotation_degrees: f64,
    pub presentation_delay_ms: u64,
}

async fn spin_wheel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<WheelSpinRequest>,
) -> Result<Json<WheelSpinResponse>, AppError> {
    let delay_ms = state.config.wheel.presentation_delay_ms;
    let (outcome, reveal_tx) = {
        let mut sessions = state.sessions.lock().await;
        let entry = live_session(&mut sessions, &state, &request.session_id, &headers)?;
        let outcome = entry.session.start_spin(&state.config.wheel, &mut OsRng)?;

        let (tx, rx) = watch::channel(None);
        entry.reveal = Some(rx);
        (outcome, tx)
    };

    info!(
        "🎡 WHEEL SPIN: session {} landed on {} ({:.1} degrees)",
        request.session_id, outcome.selected.label, outcome.rotation_degrees
    );

    // The outcome becomes available once the dial has finished turning
    let sessions = state.sessions.clone();
    let session_id = request.session_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let mut sessions = sessions.lock().await;
        let Some(entry) = sessions.get_mut(&session_id) else {
            return;
        };
        match entry.session.resolve() {
            Ok(outcome) => {
                let _ = reveal_tx.send(Some(outcome));
            }
            Err(e) => warn!("Could not resolve spin for {}: {}", session_id, e),
        }
    });

    Ok(Json(WheelSpinResponse {
        rotation_degrees: outcome.rotation_degrees,
        presentation_delay_ms: delay_ms,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct SpinResultResponse {
    pub discount: u32,
    pub label: String,
    pub original_price: u32,
    pub final_price: u32,
    pub currency_symbol: String,
}

async fn get_spin_result(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SpinResultResponse>, AppError> {
    let mut reveal = {
        let mut sessions = state.sessions.lock().await;
        let entry = live_session(&mut sessions, &state, &session_id, &headers)?;
        entry
            .reveal
            .clone()
            .ok_or_else(|| AppError::Conflict("The wheel has not been spun yet".to_string()))?
    };

    let wait = Duration::from_millis(state.config.wheel.presentation_delay_ms) + REVEAL_GRACE;
    let outcome = match tokio::time::timeout(wait, reveal.wait_for(Option::is_some)).await {
        Ok(Ok(revealed)) => (*revealed).clone(),
        Ok(Err(_)) => return Err(AppError::Gone),
        Err(_) => {
            error!("Spin result for {} was not revealed in time", session_id);
            return Err(AppError::Internal("Spin result unavailable".to_string()));
        }
    };
    let outcome = outcome.ok_or_else(|| AppError::Internal("Spin result unavailable".to_string()))?;

    let product = &state.config.storefront.product;
    Ok(Json(SpinResultResponse {
        discount: outcome.selected.value,
        label: outcome.selected.label,
        original_price: product.original_price,
        final_price: product.final_price(outcome.selected.value),
        currency_symbol: product.currency_symbol.clone(),
    }))
}

#[derive(Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub session_id: String,
    pub name: String,
    pub contact: String,
}

#[derive(Serialize, Deserialize)]
pub struct CheckoutResponse {
    #[serde(flatten)]
    pub receipt: CheckoutReceipt,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let receipt = {
        let mut sessions = state.sessions.lock().await;
        let entry = live_session(&mut sessions, &state, &request.session_id, &headers)?;
        entry.session.checkout(
            &state.config.storefront,
            &request.name,
            &request.contact,
            &EmailOrIndianMobile,
            &mut OsRng,
        )?
    };

    let (persisted, message) = match &state.storage {
        Some(storage) => match storage.insert_transaction(&TransactionRow::from(&receipt.record)).await {
            Ok(_) => (true, None),
            Err(e) => {
                error!("Failed to persist transaction {}: {}", receipt.record.transaction_id, e);
                (false, Some("Your order was created but could not be saved. Please keep your transaction ID.".to_string()))
            }
        },
        None => (false, None),
    };

    info!(
        "🧾 CHECKOUT: {} pays {} (persisted: {})",
        receipt.record.transaction_id,
        receipt.record.final_amount.unwrap_or_default(),
        persisted
    );

    Ok(Json(CheckoutResponse {
        receipt,
        persisted,
        message,
    }))
}
