//! Extracción con un mapa explícito campo -> selector.
//!
//! Un selector que no matchea (o que ni siquiera parsea) deja el campo
//! vacío; nunca hace fallar al job.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::job::Record;
use crate::selector::{ExtractMode, FieldSelector, SelectorMap};

/// Extrae un registro de una página. Todos los campos del mapa aparecen en
/// el registro, en el mismo orden.
pub fn extract_record(html: &str, selectors: &SelectorMap) -> Record {
    let document = Html::parse_document(html);
    extract_from_document(&document, selectors)
}

pub fn extract_from_document(document: &Html, selectors: &SelectorMap) -> Record {
    selectors
        .iter()
        .map(|(field, sel)| {
            let value = first_value(document, sel).unwrap_or_default();
            (field.to_string(), value)
        })
        .collect()
}

/// Valor del primer elemento que matchea (puede ser un string vacío).
/// `None` si no hay match o el selector es inválido.
pub(crate) fn first_value(document: &Html, sel: &FieldSelector) -> Option<String> {
    let selector = compile(&sel.selector)?;
    let el = document.select(&selector).next()?;
    Some(element_value(el, &sel.mode).unwrap_or_default())
}

/// Primer valor no vacío entre todos los elementos que matchean.
pub(crate) fn first_non_empty(document: &Html, sel: &FieldSelector) -> Option<String> {
    let selector = compile(&sel.selector)?;
    document
        .select(&selector)
        .filter_map(|el| element_value(el, &sel.mode))
        .find(|v| !v.is_empty())
}

pub(crate) fn element_value(el: ElementRef<'_>, mode: &ExtractMode) -> Option<String> {
    match mode {
        ExtractMode::Text => Some(el.text().collect::<String>().trim().to_string()),
        ExtractMode::Attr(name) => el.value().attr(name).map(|v| v.trim().to_string()),
    }
}

fn compile(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(s) => Some(s),
        Err(e) => {
            debug!("selector inválido '{}': {:?}", raw, e);
            None
        }
    }
}
