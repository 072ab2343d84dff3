use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

pub const DEFAULT_DB_URL: &str = "sqlite://prep.sqlite3";
pub const DEFAULT_QUESTION_BANK: &str = "data/questions.json";
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Settings resolved from `.env` and the process environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_url: String,
    pub question_bank: PathBuf,
    pub rust_log: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv().ok();

        let db_url = env::var("PREP_DB_URL").unwrap_or_else(|_| DEFAULT_DB_URL.to_string());
        let question_bank = env::var("PREP_QUESTION_BANK")
            .map_or_else(|_| PathBuf::from(DEFAULT_QUESTION_BANK), PathBuf::from);
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        Self {
            db_url,
            question_bank,
            rust_log,
        }
    }
}
