pub mod csv_service;
pub mod transaction_service;
