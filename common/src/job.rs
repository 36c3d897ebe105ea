use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::selector::SelectorMap;

pub type JobId = String;

/// Una fila extraída: campo -> valor, en el orden en que se extrajo.
pub type Record = IndexMap<String, String>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequest {
    /// Nombre para mostrar; si falta se arma con el host de la primera URL
    #[serde(default)]
    pub name: Option<String>,

    /// Forma corta para una sola URL
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub urls: Vec<String>,

    /// Sin mapa de selectores el job corre en modo auto-detect
    #[serde(default)]
    pub selectors: Option<SelectorMap>,

    /// Después de la primera página, agrega los links del mismo sitio
    #[serde(default)]
    pub follow_links: bool,
}

impl JobRequest {
    /// URLs a procesar, en orden: primero `url`, después `urls`.
    pub fn targets(&self) -> Vec<String> {
        self.url
            .iter()
            .chain(self.urls.iter())
            .map(|u| u.trim().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,

    pub urls: Vec<String>,
    pub selectors: Option<SelectorMap>,
    #[serde(default)]
    pub follow_links: bool,

    /// Un registro por página procesada, en orden de URL
    pub records: Vec<Record>,
    /// Presente sólo si status == Failed
    pub error: Option<String>,

    pub pages_done: usize,
    pub logs: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, req: JobRequest) -> Self {
        let urls = req.targets();
        let name = req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_name(urls.first().map(String::as_str)));

        Self {
            id,
            name,
            status: JobStatus::Pending,
            urls,
            selectors: req.selectors,
            follow_links: req.follow_links,
            records: Vec::new(),
            error: None,
            pages_done: 0,
            logs: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_auto_detect(&self) -> bool {
        self.selectors.is_none()
    }

    /// Porcentaje de páginas procesadas (0-100).
    pub fn progress(&self) -> u8 {
        if self.status == JobStatus::Done {
            return 100;
        }
        if self.urls.is_empty() {
            return 0;
        }
        ((self.pages_done * 100) / self.urls.len()).min(100) as u8
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            total_pages: self.urls.len(),
            pages_done: self.pages_done,
            records: self.records.len(),
            progress: self.progress(),
            auto_detect: self.is_auto_detect(),
            error: self.error.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }

    /* ---------- transiciones ---------- */

    pub fn start(&mut self) -> Result<(), StoreError> {
        self.transition(JobStatus::Pending, JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn push_record(&mut self, record: Record) -> Result<(), StoreError> {
        if self.status != JobStatus::Running {
            return Err(self.invalid(JobStatus::Running));
        }
        if self.records.len() >= self.urls.len() {
            return Err(StoreError::RecordLimit {
                id: self.id.clone(),
                limit: self.urls.len(),
            });
        }
        self.records.push(record);
        self.pages_done += 1;
        Ok(())
    }

    /// Agrega páginas descubiertas al final de la lista, sin repetir las que
    /// ya están y sin pasar de `max_pages` en total. Devuelve cuántas entraron.
    pub fn add_pages(
        &mut self,
        found: impl IntoIterator<Item = String>,
        max_pages: usize,
    ) -> Result<usize, StoreError> {
        if self.status != JobStatus::Running {
            return Err(self.invalid(JobStatus::Running));
        }

        let mut added = 0;
        for url in found {
            if self.urls.len() >= max_pages {
                break;
            }
            if !self.urls.contains(&url) {
                self.urls.push(url);
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn finish(&mut self) -> Result<(), StoreError> {
        self.transition(JobStatus::Running, JobStatus::Done)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Pasa a Failed desde cualquier estado no terminal y guarda la causa.
    pub fn fail(&mut self, cause: impl Into<String>) -> Result<(), StoreError> {
        if self.status.is_terminal() {
            return Err(self.invalid(JobStatus::Failed));
        }
        self.status = JobStatus::Failed;
        self.error = Some(cause.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Agrega una línea `[HH:MM:SS] mensaje` al log del job.
    pub fn log(&mut self, message: impl AsRef<str>) {
        let ts = Utc::now().format("%H:%M:%S");
        self.logs.push(format!("[{}] {}", ts, message.as_ref()));
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), StoreError> {
        if self.status != from {
            return Err(self.invalid(to));
        }
        self.status = to;
        Ok(())
    }

    fn invalid(&self, to: JobStatus) -> StoreError {
        StoreError::InvalidTransition {
            id: self.id.clone(),
            from: self.status,
            to,
        }
    }
}

/// Vista liviana de un job (sin registros ni logs) para listados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub total_pages: usize,
    pub pages_done: usize,
    pub records: usize,
    pub progress: u8,
    pub auto_detect: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_name(first_url: Option<&str>) -> String {
    first_url
        .and_then(|u| url::Url::parse(u).ok())
        .and_then(|u| u.host_str().map(|h| format!("crawl_{}", h)))
        .unwrap_or_else(|| "crawl".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(urls: &[&str]) -> JobRequest {
        JobRequest {
            name: None,
            url: None,
            urls: urls.iter().map(|u| u.to_string()).collect(),
            ..JobRequest::default()
        }
    }

    #[test]
    fn job_nuevo_arranca_pending_sin_error() {
        let job = Job::new("j1".into(), request(&["http://x/page1"]));

        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error.is_none());
        assert!(job.records.is_empty());
        assert!(job.is_auto_detect());
        assert_eq!(job.name, "crawl_x");
    }

    #[test]
    fn targets_pone_url_suelta_primero() {
        let req = JobRequest {
            name: Some("  ".into()),
            url: Some(" http://a/1 ".into()),
            urls: vec!["http://a/2".into()],
            ..JobRequest::default()
        };
        assert_eq!(req.targets(), vec!["http://a/1", "http://a/2"]);

        let job = Job::new("j".into(), req);
        assert_eq!(job.name, "crawl_a");
    }

    #[test]
    fn ciclo_completo_pending_running_done() {
        let mut job = Job::new("j1".into(), request(&["http://x/1", "http://x/2"]));

        job.start().unwrap();
        assert!(job.started_at.is_some());

        job.push_record(Record::from([("title".to_string(), "a".to_string())]))
            .unwrap();
        assert_eq!(job.progress(), 50);

        job.push_record(Record::new()).unwrap();
        job.finish().unwrap();

        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress(), 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn no_se_puede_empezar_dos_veces() {
        let mut job = Job::new("j1".into(), request(&[]));
        job.start().unwrap();

        let err = job.start().unwrap_err();
        assert_eq!(
            err,
            StoreError::InvalidTransition {
                id: "j1".into(),
                from: JobStatus::Running,
                to: JobStatus::Running,
            }
        );
    }

    #[test]
    fn registros_no_superan_cantidad_de_urls() {
        let mut job = Job::new("j1".into(), request(&["http://x/1"]));
        job.start().unwrap();
        job.push_record(Record::new()).unwrap();

        let err = job.push_record(Record::new()).unwrap_err();
        assert!(matches!(err, StoreError::RecordLimit { limit: 1, .. }));
        assert_eq!(job.records.len(), 1);
    }

    #[test]
    fn fail_setea_error_y_no_vuelve_atras() {
        let mut job = Job::new("j1".into(), request(&["http://x/1"]));
        job.start().unwrap();
        job.fail("HTTP 500").unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("HTTP 500"));
        assert!(job.fail("otra causa").is_err());
        assert!(job.finish().is_err());
        assert_eq!(job.error.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn add_pages_no_repite_ni_pasa_el_tope() {
        let mut job = Job::new("j1".into(), request(&["http://x/1"]));
        assert!(job.add_pages(vec!["http://x/2".to_string()], 10).is_err());

        job.start().unwrap();
        let added = job
            .add_pages(
                ["http://x/1", "http://x/2", "http://x/2", "http://x/3", "http://x/4"]
                    .map(String::from),
                3,
            )
            .unwrap();

        assert_eq!(added, 2);
        assert_eq!(job.urls, vec!["http://x/1", "http://x/2", "http://x/3"]);
    }

    #[test]
    fn follow_links_es_opcional_en_el_request() {
        let req: JobRequest = serde_json::from_str(r#"{"url": "http://x/1"}"#).unwrap();
        assert!(!req.follow_links);

        let req: JobRequest =
            serde_json::from_str(r#"{"url": "http://x/1", "follow_links": true}"#).unwrap();
        assert!(Job::new("j".into(), req).follow_links);
    }

    #[test]
    fn status_se_serializa_en_minusculas() {
        assert_eq!(serde_json::to_string(&JobStatus::Done).unwrap(), "\"done\"");
        let s: JobStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(s, JobStatus::Failed);
    }
}
