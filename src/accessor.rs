//! Async access to the blocking store and encoder.
//!
//! Store queries and model inference block, so every call runs on tokio's
//! blocking pool under a timeout. Transient failures (unreachable store,
//! unavailable model, timeout) get exactly one retry after a short backoff;
//! contract violations surface immediately.

use std::{sync::Arc, time::Duration};

use tracing::warn;

use crate::{
    chunk::Chunk,
    encoder::Encoder,
    error::{Error, Result},
    resolver::StructuralReference,
    store::{ChunkStore, ScoredChunk},
};

const MAX_ATTEMPTS: u32 = 2;

/// Timeout per attempt and pause before the retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub backoff: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Backend {
    Store,
    Encoder,
}

impl Backend {
    fn name(self) -> &'static str {
        match self {
            Backend::Store => "chunk store",
            Backend::Encoder => "encoder",
        }
    }

    fn unavailable(self, message: String) -> Error {
        match self {
            Backend::Store => Error::StoreUnavailable(message),
            Backend::Encoder => Error::EncoderUnavailable(message),
        }
    }

    fn classify(self, err: Error) -> Error {
        match self {
            Backend::Store => err.into_store_failure(),
            Backend::Encoder => err.into_encoder_failure(),
        }
    }
}

async fn with_retry<T, F>(
    backend: Backend,
    policy: RetryPolicy,
    call: F,
) -> Result<T>
where
    F: Fn() -> Result<T> + Clone + Send + 'static,
    T: Send + 'static,
{
    let mut attempt = 1;
    loop {
        let task = call.clone();
        let outcome = match tokio::time::timeout(
            policy.timeout,
            tokio::task::spawn_blocking(task),
        )
        .await
        {
            Ok(Ok(result)) => result.map_err(|e| backend.classify(e)),
            Ok(Err(join)) => Err(backend.unavailable(format!(
                "{} call aborted: {join}",
                backend.name()
            ))),
            Err(_) => Err(backend.unavailable(format!(
                "{} did not answer within {:?}",
                backend.name(),
                policy.timeout
            ))),
        };

        match outcome {
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(
                    backend = backend.name(),
                    attempt,
                    error = %err,
                    "call failed, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Shared, retrying handle on a [`ChunkStore`].
#[derive(Clone)]
pub struct StoreAccessor {
    store: Arc<dyn ChunkStore>,
    policy: RetryPolicy,
}

impl StoreAccessor {
    pub fn new(store: Arc<dyn ChunkStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Chunks whose structural label matches `reference`, trying every
    /// spelling from [`StructuralReference::variants`].
    pub async fn find_by_reference(
        &self,
        reference: &StructuralReference,
    ) -> Result<Vec<Chunk>> {
        let store = Arc::clone(&self.store);
        let kind = reference.kind;
        let variants = Arc::new(reference.variants());
        with_retry(Backend::Store, self.policy, move || {
            store.find_by_metadata(kind, &variants)
        })
        .await
    }

    pub async fn find_by_vector(
        &self,
        vector: Vec<f32>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let store = Arc::clone(&self.store);
        let vector = Arc::new(vector);
        with_retry(Backend::Store, self.policy, move || {
            store.find_by_vector(&vector, k)
        })
        .await
    }
}

/// Shared, retrying handle on an [`Encoder`].
#[derive(Clone)]
pub struct EncoderHandle {
    encoder: Arc<dyn Encoder>,
    policy: RetryPolicy,
}

impl EncoderHandle {
    pub fn new(encoder: Arc<dyn Encoder>, policy: RetryPolicy) -> Self {
        Self { encoder, policy }
    }

    pub fn model_id(&self) -> &str {
        self.encoder.model_id()
    }

    /// Embed `text`. The encoder is prepared first, without a timeout, so
    /// only inference itself is bounded by the retry policy.
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.prepare().await?;

        let encoder = Arc::clone(&self.encoder);
        let text: Arc<str> = Arc::from(text);
        with_retry(Backend::Encoder, self.policy, move || {
            encoder.encode(&text)
        })
        .await
    }

    async fn prepare(&self) -> Result<()> {
        let encoder = Arc::clone(&self.encoder);
        match tokio::task::spawn_blocking(move || encoder.prepare()).await {
            Ok(result) => result.map_err(Error::into_encoder_failure),
            Err(join) => Err(Error::EncoderUnavailable(format!(
                "encoder preparation aborted: {join}"
            ))),
        }
    }
}
