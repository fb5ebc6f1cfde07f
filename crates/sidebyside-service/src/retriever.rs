//! Cache-aside retrieval of the code snippets of one task in two languages.
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::caching::{CacheKey, CacheProvider};
use crate::source::{ContentSource, SourceError};
use crate::types::{CodeFragment, Language, PairRequest, Task};

/// How long a snippet stays in the cache: 15 days.
pub const SNIPPET_TTL: Duration = Duration::from_secs(1_296_000);

#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The task has no snippet in at least one of the languages, or a language is unknown.
    #[error("code not found for these two languages")]
    NotFound,
    /// The content source could not be queried.
    #[error("failed to fetch code from the content source")]
    Fetch(#[from] SourceError),
}

/// Looks up rendered snippets in the cache and falls back to the content source.
///
/// Cache failures are logged and treated as misses, they never fail a request.
#[derive(Clone, Debug)]
pub struct SnippetRetriever {
    cache: CacheProvider,
    source: Arc<dyn ContentSource>,
    fetch_timeout: Duration,
}

impl SnippetRetriever {
    pub fn new(
        cache: CacheProvider,
        source: Arc<dyn ContentSource>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            fetch_timeout,
        }
    }

    /// Returns the code blocks of both languages, ready for embedding.
    ///
    /// If either language misses the cache, the page of the task is fetched once for both
    /// languages and only the missed slots are filled from it. Both fragments are written back to
    /// the cache only if both are non-empty.
    #[tracing::instrument(skip_all, fields(task = %request.task, lang1 = %request.lang1, lang2 = %request.lang2))]
    pub async fn retrieve(
        &self,
        request: &PairRequest,
    ) -> Result<(CodeFragment, CodeFragment), RetrieveError> {
        let PairRequest { task, lang1, lang2 } = request;
        let key1 = CacheKey::snippet(task, lang1);
        let key2 = CacheKey::snippet(task, lang2);

        let (mut code1, mut code2) = futures::join!(self.lookup(&key1), self.lookup(&key2));

        if code1.is_empty() || code2.is_empty() {
            let (body1, body2) = self.fetch(task, lang1, lang2).await?;
            if code1.is_empty() {
                code1 = CodeFragment::wrap(lang1, &body1);
            }
            if code2.is_empty() {
                code2 = CodeFragment::wrap(lang2, &body2);
            }
        }

        if code1.is_empty() || code2.is_empty() {
            tracing::debug!(
                found1 = !code1.is_empty(),
                found2 = !code2.is_empty(),
                "snippet not found"
            );
            return Err(RetrieveError::NotFound);
        }

        if self.cache.is_enabled() {
            futures::join!(self.store(&key1, &code1), self.store(&key2, &code2));
        }
        Ok((code1, code2))
    }

    /// Reads one fragment from the cache, an empty fragment means miss.
    async fn lookup(&self, key: &CacheKey) -> CodeFragment {
        let result = match self.cache.get(key).await {
            Ok(Some(value)) if !value.is_empty() => {
                metric!(counter("snippets.cache") += 1, "result" => "hit");
                return CodeFragment::from_cached(value);
            }
            Ok(_) => "miss",
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    %key,
                    "failed to read snippet from cache"
                );
                "error"
            }
        };
        metric!(counter("snippets.cache") += 1, "result" => result);
        CodeFragment::default()
    }

    async fn fetch(
        &self,
        task: &Task,
        lang1: &Language,
        lang2: &Language,
    ) -> Result<(String, String), SourceError> {
        let result = tokio::time::timeout(
            self.fetch_timeout,
            self.source.code_for_task(task, lang1, lang2),
        )
        .await
        .unwrap_or(Err(SourceError::Timeout(self.fetch_timeout)));

        let status = match &result {
            Ok((body1, body2)) if !body1.is_empty() && !body2.is_empty() => "found",
            Ok(_) => "incomplete",
            Err(e) if e.is_timeout() => "timeout",
            Err(_) => "error",
        };
        metric!(counter("snippets.fetch") += 1, "status" => status);

        if let Err(error) = &result {
            tracing::error!(
                error = error as &dyn std::error::Error,
                "failed to fetch code from content source"
            );
        }
        result
    }

    async fn store(&self, key: &CacheKey, fragment: &CodeFragment) {
        let result = self.cache.set(key, fragment.as_str(), SNIPPET_TTL).await;
        metric!(
            counter("snippets.store") += 1,
            "result" => if result.is_ok() { "ok" } else { "error" },
        );
        if let Err(error) = result {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                %key,
                "failed to write snippet to cache"
            );
        }
    }
}
