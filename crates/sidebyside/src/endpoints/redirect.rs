use axum::extract::OriginalUri;
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};

/// Permanently redirects to the same path with a trailing slash, keeping the query.
pub async fn add_trailing_slash(OriginalUri(uri): OriginalUri) -> Response {
    let mut location = format!("{}/", uri.path());
    if let Some(query) = uri.query() {
        location.push('?');
        location.push_str(query);
    }

    (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response()
}

/// A comparison without languages has nothing to show, start over.
pub async fn redirect_home() -> Response {
    (StatusCode::FOUND, [(LOCATION, "/")]).into_response()
}
