use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::{ContentSource, SourceError, extract_snippet};
use crate::config::SourceConfig;
use crate::types::{Language, Task};
use crate::utils::html;
use crate::utils::http::{SourceTimeouts, create_client};

/// Upper bound on the continuation pages followed for one category.
const MAX_CATEGORY_PAGES: usize = 20;

#[derive(Debug, Deserialize)]
struct CategoryResponse {
    #[serde(default, rename = "continue")]
    continuation: Option<Continuation>,
    #[serde(default)]
    query: Option<CategoryQuery>,
}

#[derive(Debug, Deserialize)]
struct Continuation {
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryQuery {
    #[serde(default)]
    categorymembers: Vec<CategoryMember>,
}

#[derive(Debug, Deserialize)]
struct CategoryMember {
    title: String,
}

/// Reads tasks and solutions from a MediaWiki installation laid out like Rosetta Code.
///
/// Every language has a category listing the tasks solved in it, and every task page has one
/// section per language.
#[derive(Debug, Clone)]
pub struct RosettaSource {
    client: reqwest::Client,
    api_url: Url,
    index_url: Url,
}

impl RosettaSource {
    pub fn new(client: reqwest::Client, base_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            api_url: base_url.join("w/api.php")?,
            index_url: base_url.join("w/index.php")?,
        })
    }

    pub fn from_config(config: &SourceConfig) -> anyhow::Result<Self> {
        let timeouts = SourceTimeouts::from_config(config);
        let client = create_client(&timeouts, &config.user_agent)?;
        Ok(Self::new(client, &config.url)?)
    }

    /// Lists all task titles in the category of `language`, following continuations.
    async fn category_members(&self, language: &Language) -> Result<Vec<String>, SourceError> {
        // Wiki titles always start with an upper case letter.
        let mut name = language.name().chars();
        let category = match name.next() {
            Some(first) => format!("Category:{}{}", first.to_uppercase(), name.as_str()),
            None => "Category:".to_owned(),
        };
        let mut titles = Vec::new();
        let mut continuation: Option<String> = None;

        for _ in 0..MAX_CATEGORY_PAGES {
            let mut url = self.api_url.clone();
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("action", "query")
                    .append_pair("list", "categorymembers")
                    .append_pair("cmtitle", &category)
                    .append_pair("cmnamespace", "0")
                    .append_pair("cmlimit", "500")
                    .append_pair("format", "json");
                if let Some(continuation) = &continuation {
                    query.append_pair("cmcontinue", continuation);
                }
            }

            let response = self.send(url, "categorymembers").await?;
            if !response.status().is_success() {
                return Err(SourceError::Status(response.status()));
            }
            let body = response.bytes().await?;
            let page: CategoryResponse = serde_json::from_slice(&body)
                .map_err(|e| SourceError::Malformed(format!("category listing: {e}")))?;

            if let Some(query) = page.query {
                titles.extend(query.categorymembers.into_iter().map(|m| m.title));
            }
            continuation = page.continuation.and_then(|c| c.cmcontinue);
            if continuation.is_none() {
                return Ok(titles);
            }
        }

        tracing::warn!(%category, "category listing truncated");
        Ok(titles)
    }

    /// Fetches the raw wikitext of a task page. A missing page yields `None`.
    async fn raw_page(&self, task: &Task) -> Result<Option<String>, SourceError> {
        let mut url = self.index_url.clone();
        url.query_pairs_mut()
            .append_pair("title", &task.qualified_name())
            .append_pair("action", "raw");

        let response = self.send(url, "raw").await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.text().await?)),
            status => Err(SourceError::Status(status)),
        }
    }

    async fn send(&self, url: Url, endpoint: &str) -> Result<reqwest::Response, SourceError> {
        tracing::trace!(%url, "querying content source");
        let start = Instant::now();
        let result = self.client.get(url).send().await;
        let status = match &result {
            Ok(response) => response.status().as_str().to_owned(),
            Err(_) => "error".to_owned(),
        };
        metric!(
            timer("source.request.duration") = start.elapsed(),
            "endpoint" => endpoint,
            "status" => &status,
        );
        Ok(result?)
    }
}

#[async_trait]
impl ContentSource for RosettaSource {
    async fn tasks_for_languages(
        &self,
        lang1: &Language,
        lang2: &Language,
    ) -> Result<Vec<Task>, SourceError> {
        let (first, second) =
            futures::try_join!(self.category_members(lang1), self.category_members(lang2))?;

        let second: HashSet<&str> = second.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let tasks = first
            .iter()
            .filter(|title| second.contains(title.as_str()))
            .filter(|title| seen.insert(title.as_str()))
            .map(|title| Task::from_title(title))
            .collect();
        Ok(tasks)
    }

    async fn code_for_task(
        &self,
        task: &Task,
        lang1: &Language,
        lang2: &Language,
    ) -> Result<(String, String), SourceError> {
        let Some(page) = self.raw_page(task).await? else {
            tracing::debug!(%task, "task page does not exist");
            return Ok(Default::default());
        };

        let snippet = |language: &Language| {
            extract_snippet(&page, language.name())
                .map(|code| html::escape(code).into_owned())
                .unwrap_or_default()
        };
        Ok((snippet(lang1), snippet(lang2)))
    }
}
