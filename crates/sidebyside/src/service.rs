//! The state shared by all request handlers.
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sidebyside_service::caching::CacheProvider;
use sidebyside_service::config::Config;
use sidebyside_service::retriever::SnippetRetriever;
use sidebyside_service::source::{ContentSource, RosettaSource};
use sidebyside_service::tasks::{TaskCatalog, TaskResolver};

use crate::templates;

#[derive(Debug)]
struct RequestServiceInner {
    retriever: SnippetRetriever,
    resolver: TaskResolver,
    languages: Vec<String>,
}

/// Cheaply clonable handle to the retriever, the task resolver and the bundled catalogs.
#[derive(Clone, Debug)]
pub struct RequestService {
    inner: Arc<RequestServiceInner>,
}

impl RequestService {
    /// Creates the service from the configuration.
    ///
    /// Connects to the cache backend, which degrades to no caching if it is unreachable.
    pub async fn create(config: &Config) -> Result<Self> {
        let cache = CacheProvider::from_config(&config.cache).await;
        let source = RosettaSource::from_config(&config.source)
            .context("failed to create the content source client")?;

        Self::from_parts(cache, Arc::new(source), config.source.timeout)
    }

    /// Creates the service from its collaborators.
    pub fn from_parts(
        cache: CacheProvider,
        source: Arc<dyn ContentSource>,
        source_timeout: Duration,
    ) -> Result<Self> {
        let catalog = TaskCatalog::bundled().context("failed to parse the bundled task catalog")?;
        let languages =
            templates::bundled_languages().context("failed to parse the bundled language list")?;

        let retriever = SnippetRetriever::new(cache, source.clone(), source_timeout);
        let resolver = TaskResolver::new(source, catalog, source_timeout);

        Ok(Self {
            inner: Arc::new(RequestServiceInner {
                retriever,
                resolver,
                languages,
            }),
        })
    }

    pub fn retriever(&self) -> &SnippetRetriever {
        &self.inner.retriever
    }

    pub fn resolver(&self) -> &TaskResolver {
        &self.inner.resolver
    }

    /// The languages offered on the home page.
    pub fn languages(&self) -> &[String] {
        &self.inner.languages
    }
}
