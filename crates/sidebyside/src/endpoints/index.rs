use axum::extract;
use axum::response::Html;

use crate::service::RequestService;
use crate::templates;

pub async fn handle_index_request(
    extract::State(service): extract::State<RequestService>,
) -> Html<String> {
    sentry::configure_scope(|scope| {
        scope.set_transaction(Some("GET /"));
    });

    Html(templates::index_page(service.languages()))
}
