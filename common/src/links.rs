//! Descubrimiento de links del mismo sitio a partir de una página.

use scraper::{Html, Selector};
use url::Url;

/// Links `<a href>` de la página que apuntan al mismo host (y puerto) que
/// `page_url`, resueltos a URL absoluta, sin fragmento y sin repetidos.
/// La propia página no se incluye. Conserva el orden del documento.
pub fn same_site_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut out: Vec<String> = Vec::new();

    for el in document.select(&anchors) {
        let Some(href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);

        if !matches!(resolved.scheme(), "http" | "https") || !same_site(&base, &resolved) {
            continue;
        }

        let resolved = resolved.to_string();
        if resolved != strip_fragment(&base) && !out.contains(&resolved) {
            out.push(resolved);
        }
    }

    out
}

fn same_site(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

fn strip_fragment(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}
