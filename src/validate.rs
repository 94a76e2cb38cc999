use scraper::{ElementRef, Html, Selector};

use crate::domain::ValidationOutcome;

pub const NO_CONTENT: &str = "no content";
pub const MISSING_STRUCTURE: &str = "missing expected structure";
pub const INSUFFICIENT_RESEARCH: &str = "Insufficient published research for high-quality article";
pub const INSUFFICIENT_SOURCES: &str = "Insufficient scholarly sources found";

/// Classifies fetched content without mutating it. Pure; never performs I/O.
pub trait Validator: Send + Sync {
    fn validate(&self, raw: &[u8]) -> ValidationOutcome;
}

/// Validator for rendered encyclopedia pages.
///
/// Decision order: empty content, declared-insufficient markers, the
/// `Info` heading, otherwise missing structure.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageValidator;

impl Validator for PageValidator {
    fn validate(&self, raw: &[u8]) -> ValidationOutcome {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return ValidationOutcome::Invalid(NO_CONTENT.to_string());
        }
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(err) => {
                return ValidationOutcome::Invalid(format!("unparseable content: {err}"));
            }
        };
        let document = Html::parse_document(text);
        classify_page(&document)
    }
}

pub fn classify_page(document: &Html) -> ValidationOutcome {
    match page_warning(document) {
        Ok(Some(reason)) => return ValidationOutcome::Warning(reason.to_string()),
        Ok(None) => {}
        Err(err) => return ValidationOutcome::Invalid(format!("unparseable content: {err}")),
    }
    match find_heading(document, "Info") {
        Ok(Some(_)) => ValidationOutcome::Valid,
        Ok(None) => ValidationOutcome::Invalid(MISSING_STRUCTURE.to_string()),
        Err(err) => ValidationOutcome::Invalid(format!("unparseable content: {err}")),
    }
}

/// Source-declared "insufficient data" notice, if any.
pub fn page_warning(document: &Html) -> Result<Option<&'static str>, String> {
    let status = selector(r#"div[data-status="warning"]"#)?;
    if document.select(&status).next().is_some() {
        return Ok(Some(INSUFFICIENT_RESEARCH));
    }
    if find_heading(document, "Warning")?.is_some() {
        return Ok(Some(INSUFFICIENT_SOURCES));
    }
    Ok(None)
}

/// First `h2` whose text is exactly `label` (surrounding whitespace ignored).
pub fn find_heading<'a>(document: &'a Html, label: &str) -> Result<Option<ElementRef<'a>>, String> {
    let h2 = selector("h2")?;
    Ok(document
        .select(&h2)
        .find(|heading| heading.text().collect::<String>().trim() == label))
}

pub fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|err| format!("invalid selector `{css}`: {err}"))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_content_is_invalid() {
        assert_eq!(
            PageValidator.validate(b""),
            ValidationOutcome::Invalid(NO_CONTENT.to_string())
        );
        assert_eq!(
            PageValidator.validate(b"  \n"),
            ValidationOutcome::Invalid(NO_CONTENT.to_string())
        );
    }

    #[test]
    fn status_warning_wins_over_info() {
        let html = br#"<div data-status="warning">low</div><div><div><h2>Info</h2></div></div>"#;
        assert_eq!(
            PageValidator.validate(html),
            ValidationOutcome::Warning(INSUFFICIENT_RESEARCH.to_string())
        );
    }

    #[test]
    fn warning_heading_is_declared_reason() {
        let html = b"<div><h2>Warning</h2><p>Not enough sources</p></div>";
        assert_eq!(
            PageValidator.validate(html),
            ValidationOutcome::Warning(INSUFFICIENT_SOURCES.to_string())
        );
    }

    #[test]
    fn info_heading_is_valid() {
        let html = b"<div><div><h2> Info </h2></div><ul><li><p>gene names: X</p></li></ul></div>";
        assert_eq!(PageValidator.validate(html), ValidationOutcome::Valid);
    }

    #[test]
    fn page_without_markers_is_invalid() {
        let html = b"<html><body><h1>Loading...</h1></body></html>";
        assert_eq!(
            PageValidator.validate(html),
            ValidationOutcome::Invalid(MISSING_STRUCTURE.to_string())
        );
    }

    #[test]
    fn non_utf8_is_unparseable() {
        let outcome = PageValidator.validate(&[0x3c, 0x68, 0xff, 0xfe, 0x32]);
        assert_matches!(outcome, ValidationOutcome::Invalid(reason) if reason.starts_with("unparseable content"));
    }

    #[test]
    fn malformed_markup_does_not_panic() {
        let outcome = PageValidator.validate(b"<div><h2>Info</div></h2><<<>>");
        assert!(outcome.is_usable() || outcome.reason().is_some());
    }
}
