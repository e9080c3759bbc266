use tracing::warn;

use crate::{
    error::{Error, Result},
    text_util::truncate_chars,
};

pub const DEFAULT_MAX_QUERY_CHARS: usize = 500;

/// A cleaned user question, ready for retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    top_k: Option<usize>,
}

impl Query {
    /// Normalise `raw` with the default length bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use lexbert::Query;
    ///
    /// let q = Query::new("  ¿Qué dice\r\n\r\n el   artículo 52?\u{7}", None).unwrap();
    /// assert_eq!(q.text(), "¿Qué dice\nel artículo 52?");
    /// assert!(Query::new(" \n\t ", None).is_err());
    /// ```
    pub fn new(raw: &str, top_k: Option<usize>) -> Result<Self> {
        Self::with_max_chars(raw, top_k, DEFAULT_MAX_QUERY_CHARS)
    }

    /// Normalise `raw`: drop control characters (newlines survive), unify
    /// line endings, collapse runs of blanks and of blank lines, trim.
    /// Text longer than `max_chars` characters is cut.
    pub fn with_max_chars(
        raw: &str,
        top_k: Option<usize>,
        max_chars: usize,
    ) -> Result<Self> {
        let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
        let cleaned: String = unified
            .chars()
            .map(|c| if c == '\t' { ' ' } else { c })
            .filter(|c| *c == '\n' || !c.is_control())
            .collect();

        let lines: Vec<String> = cleaned
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect();
        let mut text = lines.join("\n");

        if text.is_empty() {
            return Err(Error::InvalidInput("query text is empty".into()));
        }

        let char_count = text.chars().count();
        if char_count > max_chars {
            warn!(
                chars = char_count,
                max = max_chars,
                "query too long, truncating"
            );
            text = truncate_chars(&text, max_chars).trim_end().to_string();
        }

        Ok(Self { text, top_k })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The caller's result-size override, if any.
    pub fn top_k(&self) -> Option<usize> {
        self.top_k
    }
}
