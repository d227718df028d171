//! Single-owner execution of embedding requests.
//!
//! Embedding models are not assumed to be reentrant, so the embedder is moved
//! into one worker task and every caller submits jobs over a channel. Requests
//! from population and from queries share the same queue.
//!
//! Each inference runs as its own task awaited by the worker, so a panicking
//! embedder fails that one request and the worker keeps serving the queue.
//! The per-request timeout starts when the worker picks the job up; time spent
//! waiting in the queue does not count against it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{EmbeddingError, Result};
use crate::provider::{Embedder, TokenEmbedding};
use crate::timing::Timings;
use crate::vector::PoolingStrategy;
use crate::Embedding;

/// Pending requests allowed in the queue before submitters wait.
const JOB_QUEUE_CAPACITY: usize = 64;

/// Timer recording each inference on the worker.
pub const EMBED_TIMER: &str = "embed";

struct EmbedJob {
    text: String,
    timeout: Option<Duration>,
    reply: oneshot::Sender<Result<Vec<TokenEmbedding>>>,
}

/// Cloneable handle to the embedder worker.
///
/// The worker stops once every handle has been dropped.
#[derive(Clone)]
pub struct EmbedderHandle {
    sender: mpsc::Sender<EmbedJob>,
    name: Arc<str>,
    dimension: usize,
    request_timeout: Option<Duration>,
    timings: Arc<Timings>,
}

impl EmbedderHandle {
    /// Move `embedder` onto a new worker task.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`EmbeddingError::ModelUnavailable`] if the embedder cannot be used.
    pub fn spawn(embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::spawn_with_timings(embedder, Arc::new(Timings::new()))
    }

    /// Like [`EmbedderHandle::spawn`], recording into an existing registry.
    pub fn spawn_with_timings(embedder: Arc<dyn Embedder>, timings: Arc<Timings>) -> Result<Self> {
        if !embedder.is_available() {
            return Err(EmbeddingError::ModelUnavailable(format!(
                "{} embedder is not available",
                embedder.name()
            )));
        }

        let (sender, receiver) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let handle = Self {
            sender,
            name: Arc::from(embedder.name()),
            dimension: embedder.dimension(),
            request_timeout: None,
            timings: Arc::clone(&timings),
        };

        tokio::spawn(run_worker(embedder, receiver, timings));
        Ok(handle)
    }

    /// Fail requests whose inference takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Name of the underlying embedder.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimension of the vectors produced.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Timer registry shared with the worker.
    pub fn timings(&self) -> &Arc<Timings> {
        &self.timings
    }

    /// Requests waiting in the queue, not counting the one being served.
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Token vectors for `text`, computed on the worker.
    pub async fn embed_tokens(&self, text: &str) -> Result<Vec<TokenEmbedding>> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(EmbedJob {
                text: text.to_string(),
                timeout: self.request_timeout,
                reply,
            })
            .await
            .map_err(|_| EmbeddingError::WorkerStopped)?;
        response.await.map_err(|_| EmbeddingError::WorkerStopped)?
    }

    /// Mean-pooled vector for `text`.
    ///
    /// Fails with [`EmbeddingError::EmptyContent`] when the text has no tokens.
    pub async fn vector(&self, text: &str, pooling: PoolingStrategy) -> Result<Embedding> {
        let tokens = self.embed_tokens(text).await?;
        pooling.mean_pool(&tokens).ok_or(EmbeddingError::EmptyContent)
    }
}

async fn run_worker(
    embedder: Arc<dyn Embedder>,
    mut receiver: mpsc::Receiver<EmbedJob>,
    timings: Arc<Timings>,
) {
    info!(embedder = embedder.name(), "embedder worker started");

    while let Some(job) = receiver.recv().await {
        if job.reply.is_closed() {
            debug!("skipping abandoned embedding request");
            continue;
        }

        let result = timings
            .track_async(EMBED_TIMER, infer(&embedder, job.text, job.timeout))
            .await
            .and_then(|tokens| check_dimension(tokens, embedder.dimension()));

        // The requester may have gone away meanwhile.
        let _ = job.reply.send(result);
    }

    debug!(embedder = embedder.name(), "embedder worker stopped");
}

/// Run one inference on its own task and wait for it to finish.
///
/// An inference that overruns `timeout` is aborted and awaited before
/// returning, so it never overlaps the next one.
async fn infer(
    embedder: &Arc<dyn Embedder>,
    text: String,
    timeout: Option<Duration>,
) -> Result<Vec<TokenEmbedding>> {
    let embedder = Arc::clone(embedder);
    let mut inference = tokio::spawn(async move { embedder.embed(&text).await });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut inference).await {
            Ok(joined) => joined,
            Err(_) => {
                inference.abort();
                let _ = inference.await;
                warn!(timeout = ?limit, "embedding request timed out");
                return Err(EmbeddingError::Timeout(limit));
            }
        },
        None => inference.await,
    };

    joined.map_err(|err| {
        warn!("embedder task failed: {err}");
        EmbeddingError::ComputationFailed(format!("embedder task failed: {err}"))
    })?
}

fn check_dimension(tokens: Vec<TokenEmbedding>, expected: usize) -> Result<Vec<TokenEmbedding>> {
    if let Some(bad) = tokens.iter().find(|t| t.vector.len() != expected) {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: bad.vector.len(),
        });
    }
    Ok(tokens)
}
