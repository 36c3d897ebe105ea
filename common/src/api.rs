//! Tipos de request/response del API HTTP, compartidos entre server y client.

use serde::{Deserialize, Serialize};

use crate::job::Record;
use crate::selector::SelectorMap;
use crate::store::StoreStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_jobs: usize,
    pub total_jobs: usize,
}

/// Job en modo auto-detect a partir de una sola URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickCrawlRequest {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub follow_links: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub url: String,
    /// Selector ganador por campo
    pub selectors: SelectorMap,
    /// Registro que se obtendría con esos selectores
    pub preview: Record,
}

pub type StatsResponse = StoreStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
