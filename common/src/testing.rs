//! Fetcher en memoria para tests y demos sin red.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;

use crate::error::FetchError;
use crate::fetch::Fetcher;

/// Devuelve respuestas predefinidas por URL y registra las llamadas.
/// Una URL sin respuesta cargada se comporta como un 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: Arc<Mutex<HashMap<String, Result<String, FetchError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    latency: Option<Duration>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.set(url.into(), Ok(html.into()));
        self
    }

    pub fn with_error(self, url: impl Into<String>, err: FetchError) -> Self {
        self.set(url.into(), Err(err));
        self
    }

    /// Demora artificial en cada fetch, para probar polling concurrente.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// URLs pedidas hasta ahora, en orden.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, url: String, resp: Result<String, FetchError>) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url, resp);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        pages.get(url).cloned().unwrap_or_else(|| {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        })
    }
}
