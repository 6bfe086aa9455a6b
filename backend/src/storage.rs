use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::checkout::TransactionRecord;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{AppConfig, StorageMode, SupabaseConfig};

const TRANSACTIONS_TABLE: &str = "transactions";

#[derive(Debug)]
pub enum StorageError {
    NotFound,
    Rejected { status: u16, message: String },
    InvalidUrl(String),
    Http(reqwest::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Object not found"),
            Self::Rejected { status, message } => write!(f, "{} (status {})", message, status),
            Self::InvalidUrl(url) => write!(f, "Invalid storage URL: {}", url),
            Self::Http(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

/// Row layout of the `transactions` table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TransactionRow {
    pub transaction_id: String,
    pub user_name: String,
    pub user_contact: String,
    pub original_price: Option<Value>,
    pub discount: Option<Value>,
    pub final_amount: Option<Value>,
    pub filename: Option<String>,
}

impl From<&TransactionRecord> for TransactionRow {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            transaction_id: record.transaction_id.clone(),
            user_name: record.user_name.clone(),
            user_contact: record.user_contact.clone(),
            original_price: record.original_price.map(Value::from),
            discount: record.discount.map(Value::from),
            final_amount: record.final_amount.map(Value::from),
            filename: record.filename.clone(),
        }
    }
}

/// Managed file storage plus the transaction table.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stores `bytes` under `name`, replacing any existing object.
    async fn upload_object(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;
    async fn download_object(&self, name: &str) -> Result<Vec<u8>, StorageError>;
    async fn insert_transaction(&self, row: &TransactionRow) -> Result<Vec<Value>, StorageError>;
    /// Most recent rows first.
    async fn list_transactions(&self, limit: usize) -> Result<Vec<Value>, StorageError>;
}

/// Picks the backend for the configured mode. `None` means storage routes report misconfiguration.
pub fn connect(config: &AppConfig) -> Option<Arc<dyn StorageBackend>> {
    match config.storage_mode {
        StorageMode::Memory => {
            warn!("Using in-memory storage, nothing will be persisted");
            Some(Arc::new(MemoryStorage::default()))
        }
        StorageMode::Supabase => match &config.supabase {
            Some(supabase) => Some(Arc::new(SupabaseStorage::new(supabase.clone()))),
            None => {
                warn!("Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY environment variables");
                None
            }
        },
    }
}

pub struct SupabaseStorage {
    client: Client,
    config: SupabaseConfig,
}

#[derive(Deserialize)]
struct SupabaseErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl SupabaseStorage {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn object_url(&self, name: &str) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|_| StorageError::InvalidUrl(self.config.url.clone()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::InvalidUrl(self.config.url.clone()))?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "object", self.config.bucket.as_str()])
                .extend(name.split('/'));
        }
        Ok(url)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.url, TRANSACTIONS_TABLE)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key)
    }

    async fn rejection(response: Response) -> StorageError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return StorageError::NotFound;
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<SupabaseErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or(body);
        StorageError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl StorageBackend for SupabaseStorage {
    async fn upload_object(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let url = self.object_url(name)?;
        debug!("Uploading {} bytes to {}", bytes.len(), url);
        let response = self
            .authorized(self.client.post(url))
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }

    async fn download_object(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.object_url(name)?;
        let response = self.authorized(self.client.get(url)).send().await?;

        match response.status() {
            s if s.is_success() => Ok(response.bytes().await?.to_vec()),
            // Storage answers 400 with a not_found body for missing keys
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => Err(StorageError::NotFound),
            _ => Err(Self::rejection(response).await),
        }
    }

    async fn insert_transaction(&self, row: &TransactionRow) -> Result<Vec<Value>, StorageError> {
        let response = self
            .authorized(self.client.post(self.table_url()))
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json::<Vec<Value>>().await?)
    }

    async fn list_transactions(&self, limit: usize) -> Result<Vec<Value>, StorageError> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json::<Vec<Value>>().await?)
    }
}

/// Process-local storage for development runs and tests.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    transactions: Mutex<Vec<Value>>,
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn upload_object(&self, name: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StorageError> {
        self.objects.lock().await.insert(name.to_string(), bytes);
        Ok(())
    }

    async fn download_object(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn insert_transaction(&self, row: &TransactionRow) -> Result<Vec<Value>, StorageError> {
        let mut transactions = self.transactions.lock().await;
        let mut stored = serde_json::to_value(row).map_err(|e| StorageError::Rejected {
            status: 400,
            message: e.to_string(),
        })?;
        if let Value::Object(fields) = &mut stored {
            fields.insert("id".to_string(), Value::from(transactions.len() + 1));
            fields.insert("created_at".to_string(), Value::from(chrono::Utc::now().to_rfc3339()));
        }
        transactions.push(stored.clone());
        Ok(vec![stored])
    }

    async fn list_transactions(&self, limit: usize) -> Result<Vec<Value>, StorageError> {
        let transactions = self.transactions.lock().await;
        Ok(transactions.iter().rev().take(limit).cloned().collect())
    }
}
