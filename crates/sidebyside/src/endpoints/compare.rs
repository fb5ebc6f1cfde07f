use axum::extract;
use axum::http::header::CACHE_CONTROL;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use sidebyside_service::types::Language;

use crate::service::RequestService;
use crate::templates;

use super::{PUBLIC_CACHE_CONTROL, ResponseError};

/// Path parameters of the task listing.
#[derive(Debug, Deserialize)]
pub struct ComparePath {
    pub lang1: String,
    pub lang2: String,
}

pub async fn handle_compare_request(
    extract::State(service): extract::State<RequestService>,
    extract::Path(path): extract::Path<ComparePath>,
) -> Result<Response, ResponseError> {
    sentry::configure_scope(|scope| {
        scope.set_transaction(Some("GET /compare"));
        scope.set_tag("lang1", &path.lang1);
        scope.set_tag("lang2", &path.lang2);
    });

    let lang1 = Language::parse(&path.lang1)?;
    let lang2 = Language::parse(&path.lang2)?;

    let tasks = service.resolver().resolve_tasks(&lang1, &lang2).await;
    let page = templates::tasks_page(&lang1, &lang2, &tasks);

    Ok(([(CACHE_CONTROL, PUBLIC_CACHE_CONTROL)], Html(page)).into_response())
}
