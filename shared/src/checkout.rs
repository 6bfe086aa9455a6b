use std::fmt;
use std::str::FromStr;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use validator::ValidationError;

use crate::constants::{
    DEFAULT_CURRENCY_CODE, DEFAULT_CURRENCY_SYMBOL, SPIN_NOT_RESOLVED_ERROR, TRANSACTION_ID_PREFIX,
};
use crate::shared_wheel_game::SpinSession;
use crate::validation::{validate_full_name, ContactValidator};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Product {
    pub name: String,
    pub original_price: u32,
    pub currency_symbol: String,
}

impl Default for Product {
    fn default() -> Self {
        Self {
            name: "TuneCraft".to_string(),
            original_price: 269,
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
        }
    }
}

impl Product {
    pub fn final_price(&self, discount: u32) -> u32 {
        self.original_price.saturating_sub(discount)
    }
}

/// Payee details for the UPI deep-link handed to the buyer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentConfig {
    pub payee_id: String,
    pub payee_name: String,
    pub currency_code: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            payee_id: "9167514590@yescred".to_string(),
            payee_name: "TuneCrafters".to_string(),
            currency_code: DEFAULT_CURRENCY_CODE.to_string(),
        }
    }
}

impl PaymentConfig {
    pub fn payment_link(&self, amount: u32, transaction_id: &str) -> String {
        format!(
            "upi://pay?pa={}&pn={}&am={}&cu={}&tn={}",
            self.payee_id, self.payee_name, amount, self.currency_code, transaction_id
        )
    }
}

/// How transaction identifiers are minted. Neither scheme checks for collisions.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionIdScheme {
    /// `TC-` followed by a random number in 1000..=9999
    #[default]
    ShortNumeric,
    /// `TC-<epoch millis>-<000..999>`
    Timestamped,
}

impl TransactionIdScheme {
    pub fn generate(&self, rng: &mut dyn RngCore) -> String {
        match self {
            Self::ShortNumeric => {
                format!("{}{}", TRANSACTION_ID_PREFIX, rng.gen_range(1000..=9999u32))
            }
            Self::Timestamped => format!(
                "{}{}-{:03}",
                TRANSACTION_ID_PREFIX,
                chrono::Utc::now().timestamp_millis(),
                rng.gen_range(0..1000u32)
            ),
        }
    }
}

impl FromStr for TransactionIdScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" | "short_numeric" => Ok(Self::ShortNumeric),
            "timestamped" => Ok(Self::Timestamped),
            other => Err(format!("Unknown transaction id scheme: {}", other)),
        }
    }
}

/// A checkout as handed to the persistence collaborator.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub user_name: String,
    pub user_contact: String,
    #[serde(default)]
    pub original_price: Option<u32>,
    #[serde(default)]
    pub discount: Option<u32>,
    #[serde(default)]
    pub final_amount: Option<u32>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CheckoutReceipt {
    pub record: TransactionRecord,
    pub payment_link: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutError {
    Validation(ValidationError),
    SpinNotResolved,
}

impl fmt::Display for CheckoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => match &e.message {
                Some(message) => write!(f, "{}", message),
                None => write!(f, "Validation failed: {}", e.code),
            },
            Self::SpinNotResolved => write!(f, "{}", SPIN_NOT_RESOLVED_ERROR),
        }
    }
}

impl std::error::Error for CheckoutError {}

impl From<ValidationError> for CheckoutError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

/// Validates the contact form and issues a transaction record for `final_amount`.
pub fn submit_checkout(
    name: &str,
    contact: &str,
    final_amount: u32,
    validator: &dyn ContactValidator,
    ids: TransactionIdScheme,
    rng: &mut dyn RngCore,
) -> Result<TransactionRecord, CheckoutError> {
    let name = name.trim();
    let contact = contact.trim();

    validate_full_name(name)?;
    validator.validate_contact(contact)?;

    Ok(TransactionRecord {
        transaction_id: ids.generate(rng),
        user_name: name.to_string(),
        user_contact: contact.to_string(),
        original_price: None,
        discount: None,
        final_amount: Some(final_amount),
        filename: None,
    })
}

/// What is being sold, who gets paid and how transactions are numbered.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Storefront {
    pub product: Product,
    pub payment: PaymentConfig,
    pub id_scheme: TransactionIdScheme,
}

impl SpinSession {
    /// Checks out against the resolved discount and remembers the issued id.
    pub fn checkout(
        &mut self,
        store: &Storefront,
        name: &str,
        contact: &str,
        validator: &dyn ContactValidator,
        rng: &mut dyn RngCore,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let discount = self.selected_discount().ok_or(CheckoutError::SpinNotResolved)?;
        let final_amount = store.product.final_price(discount);

        let mut record = submit_checkout(name, contact, final_amount, validator, store.id_scheme, rng)?;
        record.original_price = Some(store.product.original_price);
        record.discount = Some(discount);

        let payment_link = store.payment.payment_link(final_amount, &record.transaction_id);
        self.transaction_id = Some(record.transaction_id.clone());
        log::info!("Issued transaction {} for {}", record.transaction_id, final_amount);

        Ok(CheckoutReceipt { record, payment_link })
    }
}
