// common/src/store.rs

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::job::{Job, JobId, JobRequest, JobStatus, JobSummary};

/// Mapa compartido job_id -> Job. Vive sólo en memoria: se pierde al
/// reiniciar el proceso.
///
/// Cada job tiene un único runner que lo escribe; las lecturas (polling)
/// devuelven una copia y pueden ver un estado un poco atrasado.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<Mutex<HashMap<JobId, Job>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_jobs: usize,
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub total_records: usize,
}

impl StoreStats {
    pub fn active(&self) -> usize {
        self.pending + self.running
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crea un job en Pending y devuelve su id.
    pub fn create(&self, req: JobRequest) -> JobId {
        let mut jobs = self.lock();
        Self::insert_new(&mut jobs, req)
    }

    /// Igual que `create`, pero rechaza el job si ya hay `max_active` jobs
    /// sin terminar. El chequeo y la inserción se hacen bajo el mismo lock.
    pub fn create_bounded(&self, req: JobRequest, max_active: usize) -> Result<JobId, StoreError> {
        let mut jobs = self.lock();

        let active = jobs.values().filter(|j| !j.status.is_terminal()).count();
        if active >= max_active {
            return Err(StoreError::TooManyActive { limit: max_active });
        }

        Ok(Self::insert_new(&mut jobs, req))
    }

    pub fn get(&self, id: &str) -> Result<Job, StoreError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Aplica una mutación sobre un job no terminado.
    ///
    /// La mutación corre sobre una copia y sólo se guarda si devuelve Ok,
    /// así un error a mitad de camino no deja el job a medio escribir.
    pub fn update<T, F>(&self, id: &str, mutation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Job) -> Result<T, StoreError>,
    {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if job.status.is_terminal() {
            return Err(StoreError::Finished {
                id: job.id.clone(),
                status: job.status,
            });
        }

        let mut draft = job.clone();
        let out = mutation(&mut draft)?;
        *job = draft;
        Ok(out)
    }

    /// Resúmenes de todos los jobs, más nuevos primero.
    pub fn list(&self) -> Vec<JobSummary> {
        let jobs = self.lock();
        let mut out: Vec<JobSummary> = jobs.values().map(Job::summary).collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn stats(&self) -> StoreStats {
        let jobs = self.lock();
        let mut stats = StoreStats {
            total_jobs: jobs.len(),
            ..Default::default()
        };

        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            stats.total_records += job.records.len();
        }

        stats
    }

    fn insert_new(jobs: &mut HashMap<JobId, Job>, req: JobRequest) -> JobId {
        // uuid v4 ya es único en la práctica; el loop asegura que nunca se
        // reutilice un id dentro del proceso.
        let mut id = uuid::Uuid::new_v4().to_string();
        while jobs.contains_key(&id) {
            id = uuid::Uuid::new_v4().to_string();
        }

        jobs.insert(id.clone(), Job::new(id.clone(), req));
        id
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        // Un panic en otro handler no debe tumbar el store entero
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
