//! Resolution of the tasks shared by a language pair.
use std::sync::Arc;
use std::time::Duration;

use crate::source::{ContentSource, SourceError};
use crate::types::{Language, Task};

static BUNDLED_TASKS: &str = include_str!("../static/tasks.json");

/// The static list of tasks shipped with the binary.
#[derive(Debug, Clone)]
pub struct TaskCatalog {
    tasks: Arc<[Task]>,
}

impl TaskCatalog {
    /// Parses the catalog embedded at build time.
    pub fn bundled() -> Result<Self, serde_json::Error> {
        Self::from_json(BUNDLED_TASKS)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let tasks: Vec<Task> = serde_json::from_str(json)?;
        Ok(Self {
            tasks: tasks.into(),
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}

/// Lists the tasks of a language pair, falling back to the [`TaskCatalog`].
///
/// An empty listing from the source is not shown as an empty page, the whole catalog is returned
/// instead. The same applies when the source fails.
#[derive(Debug, Clone)]
pub struct TaskResolver {
    source: Arc<dyn ContentSource>,
    catalog: TaskCatalog,
    timeout: Duration,
}

impl TaskResolver {
    pub fn new(source: Arc<dyn ContentSource>, catalog: TaskCatalog, timeout: Duration) -> Self {
        Self {
            source,
            catalog,
            timeout,
        }
    }

    #[tracing::instrument(skip_all, fields(%lang1, %lang2))]
    pub async fn resolve_tasks(&self, lang1: &Language, lang2: &Language) -> Vec<Task> {
        let result = tokio::time::timeout(
            self.timeout,
            self.source.tasks_for_languages(lang1, lang2),
        )
        .await
        .unwrap_or(Err(SourceError::Timeout(self.timeout)));

        match result {
            Ok(tasks) if !tasks.is_empty() => {
                metric!(counter("tasks.resolve") += 1, "result" => "source");
                tasks
            }
            Ok(_) => {
                tracing::debug!("no shared tasks found, using the bundled catalog");
                metric!(counter("tasks.resolve") += 1, "result" => "fallback");
                self.catalog.tasks().to_vec()
            }
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "failed to list tasks, using the bundled catalog"
                );
                metric!(counter("tasks.resolve") += 1, "result" => "error");
                self.catalog.tasks().to_vec()
            }
        }
    }
}
