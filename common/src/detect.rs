//! Auto-detección de campos cuando el job no trae selectores.
//!
//! Para cada campo semántico hay una lista fija y ordenada de selectores
//! candidatos; gana el primer candidato con al menos un elemento cuyo
//! valor no esté vacío. Los campos sin ningún match se omiten del registro.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::extract::first_non_empty;
use crate::job::Record;
use crate::selector::{FieldSelector, SelectorMap};

/// Campos que detecta la tabla por defecto.
pub const DETECT_FIELDS: [&str; 5] = ["title", "content", "author", "date", "image"];

/// Tabla campo -> candidatos en orden de prioridad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateTable(IndexMap<String, Vec<FieldSelector>>);

impl Default for CandidateTable {
    fn default() -> Self {
        let table = [
            (
                "title",
                vec![
                    "h1",
                    "h2",
                    ".title",
                    ".headline",
                    "[class*=\"title\"]",
                    "[class*=\"heading\"]",
                    "title",
                ],
            ),
            (
                "content",
                vec![
                    "article",
                    ".content",
                    ".body",
                    "main",
                    ".post-content",
                    "[class*=\"content\"]",
                ],
            ),
            (
                "author",
                vec![
                    "[rel=\"author\"]",
                    ".author",
                    ".byline",
                    "[class*=\"author\"]",
                    "meta[name=\"author\"]@content",
                ],
            ),
            (
                "date",
                vec![
                    "time@datetime",
                    "time",
                    ".date",
                    ".timestamp",
                    "[datetime]@datetime",
                    "[class*=\"date\"]",
                    "meta[property=\"article:published_time\"]@content",
                ],
            ),
            (
                "image",
                vec![
                    "meta[property=\"og:image\"]@content",
                    "article img@src",
                    "img@src",
                ],
            ),
        ];

        Self(
            table
                .into_iter()
                .map(|(field, cands)| {
                    (
                        field.to_string(),
                        cands.into_iter().map(FieldSelector::parse).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl CandidateTable {
    /// Carga una tabla desde un JSON `{"campo": ["sel1", "sel2@attr", ...]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("no se pudo leer la tabla de candidatos {}", path.display()))?;
        let table: CandidateTable = serde_json::from_str(&raw)
            .with_context(|| format!("tabla de candidatos inválida en {}", path.display()))?;
        Ok(table)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn candidates(&self, field: &str) -> &[FieldSelector] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Detector sin estado: misma página + misma tabla = mismo resultado.
#[derive(Debug, Clone, Default)]
pub struct AutoDetector {
    table: CandidateTable,
}

impl AutoDetector {
    pub fn new(table: CandidateTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CandidateTable {
        &self.table
    }

    /// Registro con los campos detectados; los que no matchean no aparecen.
    pub fn detect(&self, html: &str) -> Record {
        let document = Html::parse_document(html);
        self.hits(&document)
            .map(|(field, _, value)| (field.to_string(), value))
            .collect()
    }

    /// Selector ganador por campo (preview del modo "quick crawl").
    pub fn detect_selectors(&self, html: &str) -> SelectorMap {
        let document = Html::parse_document(html);
        self.hits(&document)
            .map(|(field, sel, _)| (field.to_string(), sel.clone()))
            .collect()
    }

    fn hits<'a>(
        &'a self,
        document: &'a Html,
    ) -> impl Iterator<Item = (&'a str, &'a FieldSelector, String)> + 'a {
        self.table.0.iter().filter_map(move |(field, candidates)| {
            let field = field.as_str();
            candidates.iter().find_map(move |cand| {
                first_non_empty(document, cand).map(|value| (field, cand, value))
            })
        })
    }
}
