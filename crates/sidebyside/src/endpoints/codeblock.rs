use axum::extract;
use axum::http::header::CACHE_CONTROL;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use sidebyside_service::types::{Language, PairRequest, Task};

use crate::service::RequestService;
use crate::templates;

use super::{PUBLIC_CACHE_CONTROL, ResponseError};

/// Path parameters of the code comparison.
///
/// Grouped tasks use two segments, `task` is then the group and `subtask` the name.
#[derive(Debug, Deserialize)]
pub struct CodeblockPath {
    pub lang1: String,
    pub lang2: String,
    pub task: String,
    #[serde(default)]
    pub subtask: Option<String>,
}

impl CodeblockPath {
    fn into_request(self) -> Result<PairRequest, ResponseError> {
        let task = match &self.subtask {
            Some(name) => Task::from_segments(Some(&self.task), name)?,
            None => Task::from_segments(None, &self.task)?,
        };
        let lang1 = Language::parse(&self.lang1)?;
        let lang2 = Language::parse(&self.lang2)?;

        Ok(PairRequest::new(task, lang1, lang2)?)
    }
}

pub async fn handle_codeblock_request(
    extract::State(service): extract::State<RequestService>,
    extract::Path(path): extract::Path<CodeblockPath>,
) -> Result<Response, ResponseError> {
    sentry::configure_scope(|scope| {
        scope.set_transaction(Some("GET /codeblock"));
        scope.set_tag("lang1", &path.lang1);
        scope.set_tag("lang2", &path.lang2);
    });

    let request = path.into_request()?;
    let (code1, code2) = service.retriever().retrieve(&request).await?;
    let page = templates::codeblock_page(&code1, &code2);

    Ok(([(CACHE_CONTROL, PUBLIC_CACHE_CONTROL)], Html(page)).into_response())
}
