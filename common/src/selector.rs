use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SelectorError;

/// Qué sacar del primer elemento que matchea.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractMode {
    /// Texto del elemento, sin espacios alrededor.
    Text,
    /// Valor de un atributo (ej: `src`, `href`, `content`).
    Attr(String),
}

/// Selector CSS + modo de extracción para un campo.
///
/// En JSON acepta dos formas:
/// - string: `"h1"` (texto) o `"img@src"` (atributo)
/// - objeto: `{"selector": "img", "attr": "src"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FieldSelectorRepr", into = "FieldSelectorRepr")]
pub struct FieldSelector {
    pub selector: String,
    pub mode: ExtractMode,
}

impl FieldSelector {
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            mode: ExtractMode::Text,
        }
    }

    pub fn attr(selector: impl Into<String>, attr: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            mode: ExtractMode::Attr(attr.into()),
        }
    }

    /// Interpreta la forma corta `selector@atributo`.
    ///
    /// Sólo se corta en el último `@` si lo que sigue parece un nombre de
    /// atributo, así `[data-mail="a@b"]` queda como selector de texto.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some((sel, attr)) = raw.rsplit_once('@') {
            let sel = sel.trim();
            let attr = attr.trim();
            let attr_like = !attr.is_empty()
                && attr
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'));
            if attr_like && !sel.is_empty() {
                return Self::attr(sel, attr);
            }
        }
        Self::text(raw)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FieldSelectorRepr {
    Short(String),
    Full {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attr: Option<String>,
    },
}

impl From<FieldSelectorRepr> for FieldSelector {
    fn from(repr: FieldSelectorRepr) -> Self {
        match repr {
            FieldSelectorRepr::Short(raw) => FieldSelector::parse(&raw),
            FieldSelectorRepr::Full {
                selector,
                attr: Some(attr),
            } => FieldSelector::attr(selector, attr),
            FieldSelectorRepr::Full {
                selector,
                attr: None,
            } => FieldSelector::text(selector),
        }
    }
}

impl From<FieldSelector> for FieldSelectorRepr {
    fn from(fs: FieldSelector) -> Self {
        match fs.mode {
            ExtractMode::Text => FieldSelectorRepr::Full {
                selector: fs.selector,
                attr: None,
            },
            ExtractMode::Attr(attr) => FieldSelectorRepr::Full {
                selector: fs.selector,
                attr: Some(attr),
            },
        }
    }
}

/// Mapa campo -> selector. Conserva el orden en que se declararon los campos,
/// que después es el orden de las columnas exportadas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorMap(IndexMap<String, FieldSelector>);

impl SelectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, selector: FieldSelector) {
        self.0.insert(field.into(), selector);
    }

    pub fn get(&self, field: &str) -> Option<&FieldSelector> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSelector)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Lee el formato de texto del formulario web: una línea
    /// `campo: selector` por campo. Las líneas vacías se saltan.
    pub fn parse_lines(text: &str) -> Result<Self, SelectorError> {
        let mut map = Self::new();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (field, selector) = line
                .split_once(':')
                .ok_or(SelectorError::MissingColon { line: line_no })?;
            let field = field.trim();
            let selector = selector.trim();

            if field.is_empty() || selector.is_empty() {
                return Err(SelectorError::EmptyPart { line: line_no });
            }
            if map.0.contains_key(field) {
                return Err(SelectorError::DuplicateField {
                    line: line_no,
                    field: field.to_string(),
                });
            }

            map.insert(field, FieldSelector::parse(selector));
        }

        Ok(map)
    }
}

impl FromIterator<(String, FieldSelector)> for SelectorMap {
    fn from_iter<I: IntoIterator<Item = (String, FieldSelector)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
