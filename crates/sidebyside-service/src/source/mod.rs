//! The external site that tasks and code snippets are read from.
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::types::{Language, Task};

mod rosetta;
mod wikitext;

pub use rosetta::RosettaSource;
pub use wikitext::extract_snippet;

/// The content source could not be queried.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to content source failed")]
    Request(#[from] reqwest::Error),
    #[error("content source responded with status {0}")]
    Status(StatusCode),
    #[error("malformed content: {0}")]
    Malformed(String),
    #[error("content source timed out after {0:?}")]
    Timeout(Duration),
}

impl SourceError {
    /// Whether the source did not answer in time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Request(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// The contract the retriever and the task resolver rely on.
///
/// Both operations may legitimately return empty results without an error.
#[async_trait]
pub trait ContentSource: Send + Sync + fmt::Debug {
    /// Lists the tasks that have solutions in both languages.
    async fn tasks_for_languages(
        &self,
        lang1: &Language,
        lang2: &Language,
    ) -> Result<Vec<Task>, SourceError>;

    /// Returns the HTML-escaped snippet bodies of `task` for both languages.
    ///
    /// An empty string means the task has no snippet in that language.
    async fn code_for_task(
        &self,
        task: &Task,
        lang1: &Language,
        lang2: &Language,
    ) -> Result<(String, String), SourceError>;
}
