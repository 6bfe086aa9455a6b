pub const API_PREFIX: &str = "/api";
pub const WHEEL_CONFIG_ENDPOINT: &str = "/wheel/config";
pub const WHEEL_SESSION_ENDPOINT: &str = "/wheel/session";
pub const WHEEL_SPIN_ENDPOINT: &str = "/wheel/spin";
pub const WHEEL_RESULT_ENDPOINT: &str = "/wheel/result";
pub const WHEEL_CHECKOUT_ENDPOINT: &str = "/wheel/checkout";
pub const SESSION_SIGNATURE_HEADER: &str = "x-session-signature";

pub const MISSING_NAME_ERROR: &str = "Please enter your full name";
pub const MISSING_CONTACT_ERROR: &str = "Please enter your phone number or email";
pub const INVALID_CONTACT_ERROR: &str = "Please enter a valid email address or 10-digit phone number";
pub const INVALID_FILENAME_ERROR: &str = "Invalid filename";
pub const SPIN_NOT_RESOLVED_ERROR: &str = "Spin the wheel and wait for your discount before checking out";

pub const TRANSACTION_ID_PREFIX: &str = "TC-";
pub const DEFAULT_CURRENCY_CODE: &str = "INR";
pub const DEFAULT_CURRENCY_SYMBOL: &str = "₹";
