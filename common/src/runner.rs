// common/src/runner.rs

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::sleep};
use tracing::{info, warn};

use crate::detect::AutoDetector;
use crate::error::StoreError;
use crate::extract::extract_record;
use crate::fetch::Fetcher;
use crate::job::{JobId, JobStatus};
use crate::links::same_site_links;
use crate::store::JobStore;

/// Pausa fija entre páginas de un mismo job.
pub const DEFAULT_POLITENESS_DELAY: Duration = Duration::from_millis(500);

/// Tope de páginas por job cuando se siguen links.
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Lleva un job de Pending a Done/Failed:
/// - pasa el job a Running
/// - por cada URL, en orden: fetch -> extracción -> append del registro
/// - con `follow_links`, la primera página suma sus links del mismo sitio
///   (hasta `max_pages` en total)
/// - el primer fetch fallido marca el job como Failed y corta ahí
/// - si todo salió bien, Done
#[derive(Clone)]
pub struct JobRunner {
    store: JobStore,
    fetcher: Arc<dyn Fetcher>,
    detector: Arc<AutoDetector>,
    delay: Duration,
    max_pages: usize,
}

impl JobRunner {
    pub fn new(
        store: JobStore,
        fetcher: Arc<dyn Fetcher>,
        detector: Arc<AutoDetector>,
        delay: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            detector,
            delay,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Lanza `run` como tarea de fondo.
    pub fn spawn(&self, job_id: JobId) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run(&job_id).await {
                warn!("runner del job {} terminó con error: {}", job_id, e);
            }
        })
    }

    /// Procesa el job completo. Debe llamarse una sola vez por job: si el job
    /// no está en Pending devuelve error sin tocarlo.
    ///
    /// Los errores de fetch no salen de acá: quedan guardados en el job.
    pub async fn run(&self, job_id: &str) -> Result<JobStatus, StoreError> {
        let (mut urls, selectors, follow_links) = self.store.update(job_id, |job| {
            job.start()?;
            job.log(format!("crawling iniciado: {} página(s)", job.urls.len()));
            Ok((job.urls.clone(), job.selectors.clone(), job.follow_links))
        })?;

        info!(
            "job {} en running ({} urls, modo {})",
            job_id,
            urls.len(),
            if selectors.is_some() { "selectores" } else { "auto-detect" }
        );

        let mut idx = 0;
        while idx < urls.len() {
            let url = urls[idx].clone();
            let total = urls.len();
            let html = match self.fetcher.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("job {} falló en {}: {}", job_id, url, e);
                    let cause = e.to_string();
                    self.store.update(job_id, |job| {
                        job.log(format!("fallo en página {}/{}: {}", idx + 1, total, cause));
                        job.fail(cause.clone())
                    })?;
                    return Ok(JobStatus::Failed);
                }
            };

            // El documento parseado no es Send: se arma y se descarta acá
            // adentro, sin cruzar ningún await.
            let record = match &selectors {
                Some(map) => extract_record(&html, map),
                None => self.detector.detect(&html),
            };
            let fields = record.len();

            // los links se buscan una sola vez, en la primera página
            let found = if follow_links && idx == 0 {
                same_site_links(&html, &url)
            } else {
                Vec::new()
            };

            self.store.update(job_id, |job| {
                job.push_record(record)?;
                job.log(format!(
                    "página {}/{} procesada ({} campos): {}",
                    idx + 1,
                    total,
                    fields,
                    url
                ));
                Ok(())
            })?;

            if !found.is_empty() {
                let max_pages = self.max_pages;
                urls = self.store.update(job_id, |job| {
                    let added = job.add_pages(found, max_pages)?;
                    job.log(format!("{} link(s) del mismo sitio agregados", added));
                    Ok(job.urls.clone())
                })?;
            }

            if idx + 1 < urls.len() {
                sleep(self.delay).await;
            }
            idx += 1;
        }

        self.store.update(job_id, |job| {
            let n = job.records.len();
            job.log(format!("crawling completado: {} registro(s)", n));
            job.finish()
        })?;

        info!("job {} completado ({} páginas)", job_id, urls.len());
        Ok(JobStatus::Done)
    }
}
