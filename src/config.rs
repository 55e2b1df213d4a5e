use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::Cycle;

/// Runtime configuration, one env var per knob with a hard default.
#[derive(Clone, Debug, Serialize)]
pub struct Config {
    pub proxy_base: String,
    pub http_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cycle: Cycle,
    pub user_email: Option<String>,
    pub establishment_id: Option<String>,
    pub rows_per_page: u32,
    pub qla_top_n: usize,
    pub theme_top_n: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            proxy_base: std::env::var("PROXY_BASE").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            cycle: std::env::var("CYCLE").ok().and_then(|v| v.parse::<u8>().ok()).and_then(Cycle::from_u8).unwrap_or(Cycle::One),
            user_email: std::env::var("USER_EMAIL").ok().filter(|v| !v.trim().is_empty()),
            establishment_id: std::env::var("ESTABLISHMENT_ID").ok().filter(|v| !v.trim().is_empty()),
            rows_per_page: std::env::var("ROWS_PER_PAGE").ok().and_then(|v| v.parse().ok()).unwrap_or(1000),
            qla_top_n: std::env::var("QLA_TOP_N").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
            theme_top_n: std::env::var("THEME_TOP_N").ok().and_then(|v| v.parse().ok()).unwrap_or(12),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Identifies a run's configuration in logs.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json().as_bytes());
        hex::encode(hasher.finalize())
    }
}
