use crate::config::SiteConfig;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

fn pdf_href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)href\s*=\s*["']([^"']+\.pdf[^"']*)["']"#).expect("valid pdf href regex")
    })
}

/// Resolves a link href against the page it appeared on
///
/// Returns None for fragments and non-HTTP schemes.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let resolved = base_url.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Derives the PDF URL for a document page
///
/// Document pages live under the site's document marker and their PDF is
/// always `<pdf-path><DOCID>.pdf` with the id upper-cased. Anything else
/// falls back to the first `.pdf` link in the page body.
///
/// # Examples
///
/// ```
/// use readingroom_harvest::config::SiteConfig;
/// use readingroom_harvest::url::pdf_url_for_document;
///
/// let pdf = pdf_url_for_document(
///     "https://www.cia.gov/readingroom/document/cia-rdp96-00788r001700210016-5",
///     "",
///     &SiteConfig::default(),
/// );
/// assert_eq!(
///     pdf.as_deref(),
///     Some("https://www.cia.gov/readingroom/docs/CIA-RDP96-00788R001700210016-5.pdf")
/// );
/// ```
pub fn pdf_url_for_document(page_url: &str, html: &str, site: &SiteConfig) -> Option<String> {
    let base = Url::parse(page_url).ok()?;

    if base.path().contains(&site.document_marker) {
        let doc_id = base
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string);
        if let Some(doc_id) = doc_id {
            let path = format!("{}{}.pdf", site.pdf_path, doc_id.to_uppercase());
            return base.join(&path).ok().map(|u| u.to_string());
        }
    }

    let captures = pdf_href_regex().captures(html)?;
    resolve_link(&captures[1], &base)
}

/// File-system safe name for a document URL
///
/// Takes the last path segment, replaces anything outside `[A-Za-z0-9_.-]`
/// with `_` and caps the length at 120 characters.
pub fn slug_from_url(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or("").to_string());

    let name = path
        .trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string();

    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(120)
        .collect();

    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}
