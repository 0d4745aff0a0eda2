pub mod alerts;
pub mod catalog;
pub mod config;
pub mod db;
pub mod extractors;
pub mod ledger;
pub mod matching;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
