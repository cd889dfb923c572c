//! Ordered fallback chains of CSS selectors.
//!
//! Remote markup drifts; each chain lists the preferred structure first and
//! looser alternatives after it. Callers take the first strategy that yields
//! something.

use crate::utils::error::{EtlError, Result};
use scraper::{ElementRef, Html, Selector};

pub struct SelectorChain {
    selectors: Vec<(String, Selector)>,
}

impl SelectorChain {
    pub fn parse<S: AsRef<str>>(sources: &[S]) -> Result<Self> {
        let selectors = sources
            .iter()
            .map(|source| {
                let source = source.as_ref();
                parse_selector(source).map(|selector| (source.to_string(), selector))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { selectors })
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Runs `extract` with each selector in order and returns the first non-empty
    /// result, tagged with the selector that produced it.
    pub fn first_yielding<T>(
        &self,
        mut extract: impl FnMut(&Selector) -> Vec<T>,
    ) -> Option<(&str, Vec<T>)> {
        self.selectors.iter().find_map(|(source, selector)| {
            let found = extract(selector);
            (!found.is_empty()).then_some((source.as_str(), found))
        })
    }

    /// Text of the first descendant of `scope` matched by the earliest selector
    /// whose match carries more than one character of text.
    pub fn first_text(&self, scope: ElementRef<'_>) -> Option<String> {
        self.selectors.iter().find_map(|(_, selector)| {
            let element = scope.select(selector).next()?;
            let text = element_text(element);
            (text.chars().count() > 1).then_some(text)
        })
    }
}

pub fn parse_selector(source: &str) -> Result<Selector> {
    Selector::parse(source).map_err(|e| EtlError::SelectorError {
        selector: source.to_string(),
        message: format!("{:?}", e),
    })
}

/// Visible text of an element with whitespace runs collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Visible text of a whole document, line structure preserved.
pub fn document_text(document: &Html) -> String {
    document.root_element().text().collect::<String>()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <ul class="lista-resultados">
            <li><span class="nome-parlamentar">Ana Souza</span></li>
            <li><b>Beatriz Lima</b></li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn test_first_yielding_skips_selectors_without_matches() {
        let document = Html::parse_document(LISTING);
        let chain = SelectorChain::parse(&[".card-deputado", ".lista-resultados li"]).unwrap();

        let (used, items) = chain
            .first_yielding(|selector| document.select(selector).collect())
            .unwrap();

        assert_eq!(used, ".lista-resultados li");
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_first_yielding_returns_none_when_nothing_matches() {
        let document = Html::parse_document(LISTING);
        let chain = SelectorChain::parse(&[".card-deputado", "table tr"]).unwrap();

        assert!(chain
            .first_yielding(|selector| document.select(selector).collect::<Vec<_>>())
            .is_none());
    }

    #[test]
    fn test_first_text_falls_back_in_order() {
        let document = Html::parse_document(LISTING);
        let items = Selector::parse("li").unwrap();
        let names = SelectorChain::parse(&[".nome-parlamentar", "b"]).unwrap();

        let texts: Vec<Option<String>> = document
            .select(&items)
            .map(|li| names.first_text(li))
            .collect();

        assert_eq!(
            texts,
            vec![Some("Ana Souza".to_string()), Some("Beatriz Lima".to_string())]
        );
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let err = SelectorChain::parse(&["li", "a:nth-child("]).err().unwrap();
        match err {
            EtlError::SelectorError { selector, .. } => assert_eq!(selector, "a:nth-child("),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Maria \n\t da   Silva "), "Maria da Silva");
    }
}
