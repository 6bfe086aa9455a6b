use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::error::AppError;
use crate::storage::TransactionRow;
use crate::AppState;

const LIST_LIMIT: usize = 100;

/// Transaction as posted by the landing page. Only the identity fields are required.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSubmission {
    pub transaction_id: Option<String>,
    pub user_name: Option<String>,
    pub user_contact: Option<String>,
    pub original_price: Option<Value>,
    pub discount: Option<Value>,
    pub final_amount: Option<Value>,
    pub filename: Option<String>,
}

#[derive(Serialize)]
pub struct InsertResponse {
    pub ok: bool,
    pub inserted: Vec<Value>,
}

/// Empty strings, zero, `false` and `null` are stored as missing.
fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

impl TransactionSubmission {
    fn into_row(self) -> Option<TransactionRow> {
        let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
        Some(TransactionRow {
            transaction_id: non_empty(self.transaction_id)?,
            user_name: non_empty(self.user_name)?,
            user_contact: non_empty(self.user_contact)?,
            original_price: present(self.original_price),
            discount: present(self.discount),
            final_amount: present(self.final_amount),
            filename: non_empty(self.filename),
        })
    }
}

pub async fn create_transaction(
    State(state): State<AppState>,
    payload: Option<Json<TransactionSubmission>>,
) -> Result<Json<InsertResponse>, AppError> {
    let row = payload
        .and_then(|Json(submission)| submission.into_row())
        .ok_or_else(|| {
            AppError::BadRequest(
                "Missing transaction fields (transactionId, userName, userContact)".to_string(),
            )
        })?;

    let storage = state.storage("Server misconfigured: missing Supabase environment variables")?;
    let inserted = storage.insert_transaction(&row).await.map_err(|e| {
        error!("Transaction insert error: {}", e);
        AppError::Internal("Error saving transaction".to_string())
    })?;

    info!("💾 Saved transaction {}", row.transaction_id);
    Ok(Json(InsertResponse { ok: true, inserted }))
}

pub async fn list_transactions(State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    let storage = state.storage("Server misconfigured")?;
    let rows = storage.list_transactions(LIST_LIMIT).await.map_err(|e| {
        error!("Transaction listing error: {}", e);
        AppError::Internal("Error fetching transactions".to_string())
    })?;
    Ok(Json(rows))
}
