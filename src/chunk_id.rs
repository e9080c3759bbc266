use std::path::Path;

/// Source stem used when a record carries no `source`.
const FALLBACK_STEM: &str = "doc";

/// A stable chunk identifier derived from (source file, sequence index).
///
/// Re-ingesting the same span of the same file yields the same id, which
/// is what lets the store upsert instead of duplicating records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId(String);

impl ChunkId {
    /// Derive the id as `<file stem>_<index>`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lexbert::ChunkId;
    ///
    /// let id = ChunkId::derive(Some("uploads/MANUAL 2023.pdf"), 7);
    /// assert_eq!(id.as_str(), "MANUAL 2023_7");
    /// assert_eq!(ChunkId::derive(None, 0).as_str(), "doc_0");
    /// ```
    pub fn derive(source: Option<&str>, index: usize) -> Self {
        let stem = source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| Path::new(s).file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or(FALLBACK_STEM);
        Self(format!("{stem}_{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
