use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shared::checkout::{PaymentConfig, Product, Storefront, TransactionIdScheme};
use shared::shared_wheel_game::{ConfigurationError, WheelConfig};
use tracing::warn;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BUCKET: &str = "csv-files";
const DEFAULT_SESSION_SECRET: &str = "default_wheel_secret";
const SESSION_EXPIRY_SECONDS: u64 = 1800;
const SESSION_SWEEP_SECONDS: u64 = 300;

#[derive(Debug)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
    Wheel(ConfigurationError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { key, value } => write!(f, "Invalid value for {}: {:?}", key, value),
            Self::Wheel(e) => write!(f, "Invalid wheel configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Wheel(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Supabase,
    Memory,
}

impl FromStr for StorageMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(Self::Supabase),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub storage_mode: StorageMode,
    pub supabase: Option<SupabaseConfig>,
    pub storefront: Storefront,
    pub wheel: WheelConfig,
    pub session_secret: String,
    pub session_ttl: Duration,
    pub session_sweep_interval: Duration,
    pub allowed_origins: Vec<String>,
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(default),
    }
}

fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port: u16 = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let host: IpAddr = parse_or(&lookup, "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?;

        let storage_mode = parse_or(&lookup, "STORAGE_BACKEND", StorageMode::Supabase)?;
        let supabase = match (lookup("SUPABASE_URL"), lookup("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Some(SupabaseConfig {
                    url: url.trim().trim_end_matches('/').to_string(),
                    service_role_key: key.trim().to_string(),
                    bucket: string_or(&lookup, "SUPABASE_BUCKET", DEFAULT_BUCKET),
                })
            }
            _ => None,
        };

        let defaults = Storefront::default();
        let storefront = Storefront {
            product: Product {
                name: string_or(&lookup, "PRODUCT_NAME", &defaults.product.name),
                original_price: parse_or(&lookup, "PRODUCT_PRICE", defaults.product.original_price)?,
                currency_symbol: string_or(&lookup, "CURRENCY_SYMBOL", &defaults.product.currency_symbol),
            },
            payment: PaymentConfig {
                payee_id: string_or(&lookup, "UPI_ID", &defaults.payment.payee_id),
                payee_name: string_or(&lookup, "MERCHANT_NAME", &defaults.payment.payee_name),
                currency_code: string_or(&lookup, "CURRENCY_CODE", &defaults.payment.currency_code),
            },
            id_scheme: parse_or(&lookup, "TRANSACTION_ID_STRATEGY", TransactionIdScheme::default())?,
        };

        let wheel_defaults = WheelConfig::default();
        let wheel = WheelConfig {
            presentation_delay_ms: parse_or(&lookup, "PRESENTATION_DELAY_MS", wheel_defaults.presentation_delay_ms)?,
            min_full_turns: parse_or(&lookup, "MIN_FULL_TURNS", wheel_defaults.min_full_turns)?,
            max_full_turns: parse_or(&lookup, "MAX_FULL_TURNS", wheel_defaults.max_full_turns)?,
            ..wheel_defaults
        };
        wheel.validate().map_err(ConfigError::Wheel)?;

        let session_secret = match lookup("WHEEL_SESSION_SECRET").filter(|v| !v.is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("WHEEL_SESSION_SECRET not set, using the development secret");
                DEFAULT_SESSION_SECRET.to_string()
            }
        };

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            static_dir: PathBuf::from(string_or(&lookup, "STATIC_DIR", "static")),
            storage_mode,
            supabase,
            storefront,
            wheel,
            session_secret,
            session_ttl: Duration::from_secs(parse_or(&lookup, "SESSION_TTL_SECONDS", SESSION_EXPIRY_SECONDS)?),
            session_sweep_interval: Duration::from_secs(parse_or(&lookup, "SESSION_SWEEP_SECONDS", SESSION_SWEEP_SECONDS)?),
            allowed_origins,
        })
    }
}
