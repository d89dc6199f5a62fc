//! Caller-supplied bounds on provider and store calls.

use docseek_core::config::TimeoutSettings;
use docseek_core::{AppError, AppResult};
use std::fmt;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub embed: Duration,
    pub store: Duration,
}

/// A bounded call that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Elapsed {
    pub call: &'static str,
    pub after: Duration,
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} call timed out after {:?}", self.call, self.after)
    }
}

async fn bounded<F: Future>(limit: Duration, call: &'static str, fut: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Elapsed { call, after: limit })
}

impl Timeouts {
    pub fn new(embed: Duration, store: Duration) -> Self {
        Self { embed, store }
    }

    pub fn from_settings(settings: &TimeoutSettings) -> Self {
        Self {
            embed: Duration::from_secs(settings.embed_secs),
            store: Duration::from_secs(settings.store_secs),
        }
    }

    /// Bound an embedding call, leaving the elapsed case to the caller.
    pub(crate) async fn bound_embed<F: Future>(&self, fut: F) -> Result<F::Output, Elapsed> {
        bounded(self.embed, "embedding", fut).await
    }

    /// Bound a store call, leaving the elapsed case to the caller.
    pub(crate) async fn bound_store<F: Future>(&self, fut: F) -> Result<F::Output, Elapsed> {
        bounded(self.store, "vector store", fut).await
    }

    /// Run an embedding call; elapsing maps to `Embedding`.
    pub(crate) async fn embed<T>(&self, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        self.bound_embed(fut)
            .await
            .unwrap_or_else(|elapsed| Err(AppError::Embedding(elapsed.to_string())))
    }

    /// Run a store call; elapsing maps to `StoreUnavailable`.
    pub(crate) async fn store<T>(&self, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        self.bound_store(fut)
            .await
            .unwrap_or_else(|elapsed| Err(AppError::StoreUnavailable(elapsed.to_string())))
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_settings(&TimeoutSettings::default())
    }
}
