//! The text embedding contract.

use crate::error::{Error, Result};

/// Maps text to a fixed-dimension vector.
///
/// Implementations must be deterministic for a given model version, so the
/// same text always lands at the same point of the vector space, and must
/// be safe to call from many threads at once.
pub trait Encoder: Send + Sync {
    /// Embed `text`. Empty or whitespace-only text is `InvalidInput`.
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Name of the model behind this encoder, for logs and status output.
    fn model_id(&self) -> &str;

    /// Load whatever the encoder needs before its first `encode`.
    ///
    /// Callers run this outside their per-call timeout, since a first model
    /// download can take minutes. Must be cheap once it has succeeded.
    fn prepare(&self) -> Result<()> {
        Ok(())
    }
}

/// Reject text an encoder must not be called with.
pub fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::InvalidInput(
            "cannot encode empty text".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_rejected() {
        assert!(matches!(validate_text(""), Err(Error::InvalidInput(_))));
        assert!(matches!(
            validate_text(" \n\t "),
            Err(Error::InvalidInput(_))
        ));
        validate_text("artículo 52").unwrap();
    }
}
