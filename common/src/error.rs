//! Errores tipados de la librería.
//!
//! Los binarios (server, client) usan `anyhow` en sus bordes; acá usamos
//! `thiserror` para que cada capa pueda decidir qué hacer con cada caso.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Falla al traer una página. Siempre es fatal para el job dueño.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("tiempo de espera agotado ({timeout:?}) al pedir {url}")]
    Timeout { url: String, timeout: Duration },

    #[error("HTTP {status} al pedir {url}")]
    Status { url: String, status: u16 },

    #[error("error de red al pedir {url}: {message}")]
    Transport { url: String, message: String },

    #[error("URL inválida '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("no se pudo construir el cliente HTTP: {0}")]
    Client(String),
}

/// Errores del Job Store y de las transiciones de estado de un job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("job {0} no encontrado")]
    NotFound(JobId),

    #[error("job {id} ya terminó ({status:?}), no se puede modificar")]
    Finished { id: JobId, status: JobStatus },

    #[error("transición inválida en job {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {id} ya tiene {limit} registros (uno por URL)")]
    RecordLimit { id: JobId, limit: usize },

    #[error("hay demasiados jobs activos (límite {limit})")]
    TooManyActive { limit: usize },
}

/// Errores al materializar los registros de un job en disco.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no hay registros para exportar")]
    Empty,

    #[error("el job {id} todavía no terminó ({status:?})")]
    NotFinished { id: JobId, status: JobStatus },

    #[error("formato de exportación desconocido: {0}")]
    UnknownFormat(String),

    #[error("no se pudo escribir {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error generando xlsx: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("error generando csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("error generando json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errores al leer un mapa de selectores escrito a mano.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("línea {line}: falta ':' entre campo y selector")]
    MissingColon { line: usize },

    #[error("línea {line}: campo o selector vacío")]
    EmptyPart { line: usize },

    #[error("línea {line}: campo '{field}' repetido")]
    DuplicateField { line: usize, field: String },
}
