pub mod api;
pub mod detect;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod job;
pub mod links;
pub mod runner;
pub mod selector;
pub mod store;
pub mod testing;

pub use api::*;
pub use detect::{AutoDetector, CandidateTable, DETECT_FIELDS};
pub use error::{ExportError, FetchError, SelectorError, StoreError};
pub use export::{ExportFormat, ExportSummary, Exporter};
pub use fetch::{FetchConfig, Fetcher, HttpFetcher};
pub use job::{Job, JobId, JobRequest, JobStatus, JobSummary, Record};
pub use runner::JobRunner;
pub use selector::{ExtractMode, FieldSelector, SelectorMap};
pub use store::{JobStore, StoreStats};
