// server/src/state.rs

use std::sync::Arc;

use common::{AutoDetector, Exporter, Fetcher, JobRunner, JobStore};

use crate::config::ServerConfig;

/// Estado compartido por todos los handlers. No hay nada global: el store
/// se crea en `main` y viaja acá adentro.
#[derive(Clone)]
pub struct AppState {
    pub store: JobStore,
    pub runner: JobRunner,
    pub fetcher: Arc<dyn Fetcher>,
    pub detector: Arc<AutoDetector>,
    pub exporter: Arc<Exporter>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, fetcher: Arc<dyn Fetcher>, detector: AutoDetector) -> Self {
        let store = JobStore::new();
        let detector = Arc::new(detector);
        let runner = JobRunner::new(
            store.clone(),
            fetcher.clone(),
            detector.clone(),
            config.politeness_delay,
        )
        .with_max_pages(config.max_pages_per_job);
        let exporter = Arc::new(Exporter::new(config.downloads_dir.clone()));

        Self {
            store,
            runner,
            fetcher,
            detector,
            exporter,
            config: Arc::new(config),
        }
    }
}
