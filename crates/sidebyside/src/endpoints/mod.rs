use axum::Router;
use axum::routing::get;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tokio::sync::Semaphore;
use tower::ServiceBuilder;
use tower::limit::GlobalConcurrencyLimitLayer;

use crate::service::RequestService;

mod codeblock;
mod compare;
mod error;
mod index;
mod metrics;
mod redirect;

pub use error::ResponseError;
use metrics::MetricsLayer;

use codeblock::handle_codeblock_request as codeblock;
use compare::handle_compare_request as compare;
use index::handle_index_request as index;
use redirect::{add_trailing_slash, redirect_home};

/// Pages are stable for a long time, they may be cached by browsers and proxies for 60 days.
const PUBLIC_CACHE_CONTROL: &str = "public; max-age=5184000";

pub async fn healthcheck() -> &'static str {
    sidebyside_service::metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(service: RequestService, max_concurrent_requests: Option<usize>) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(MetricsLayer)
        .layer(GlobalConcurrencyLimitLayer::new(
            max_concurrent_requests.unwrap_or(Semaphore::MAX_PERMITS),
        ));

    Router::new()
        .route("/", get(index))
        .route("/compare", get(redirect_home))
        .route("/compare/", get(redirect_home))
        .route("/compare/{lang1}/{lang2}/", get(compare))
        .route("/compare/{lang1}/{lang2}", get(add_trailing_slash))
        .route("/codeblock/{lang1}/{lang2}/{task}/", get(codeblock))
        .route("/codeblock/{lang1}/{lang2}/{task}", get(add_trailing_slash))
        .route("/codeblock/{lang1}/{lang2}/{task}/{subtask}/", get(codeblock))
        .route(
            "/codeblock/{lang1}/{lang2}/{task}/{subtask}",
            get(add_trailing_slash),
        )
        .with_state(service)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use reqwest::StatusCode;
    use reqwest::redirect::Policy;
    use sidebyside_service::caching::{CacheKey, CacheProvider};
    use sidebyside_service::test::{FakeSource, memory_cache};
    use sidebyside_service::types::{Language, Task};
    use sidebyside_test::{self as test, Server};

    use super::*;

    fn serve(cache: CacheProvider, source: Arc<FakeSource>) -> Server {
        let service = RequestService::from_parts(cache, source, Duration::from_secs(5)).unwrap();
        Server::with_router(create_app(service, Some(10)))
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .unwrap()
    }

    fn loops_source() -> FakeSource {
        FakeSource::new()
            .with_tasks(vec![Task::new("Loops"), Task::grouped("Loops", "For")])
            .with_code("Loops", "go", "for {}")
            .with_code("Loops", "python", "while True: pass")
            .with_code("Loops/For", "go", "for i := 0; i &lt; 10; i++ {}")
            .with_code("Loops/For", "python", "for i in range(10): pass")
    }

    #[tokio::test]
    async fn test_healthcheck() {
        test::setup();
        let server = serve(memory_cache(), Arc::new(FakeSource::new()));

        let response = client().get(server.url("/healthcheck")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_index() {
        test::setup();
        let server = serve(memory_cache(), Arc::new(FakeSource::new()));

        let response = client().get(server.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains(r#"<option value="Go">Go</option>"#));
    }

    #[tokio::test]
    async fn test_redirects() {
        test::setup();
        let server = serve(memory_cache(), Arc::new(FakeSource::new()));
        let client = client();

        let cases = [
            ("/compare", StatusCode::FOUND, "/"),
            ("/compare/", StatusCode::FOUND, "/"),
            (
                "/compare/go/rust",
                StatusCode::MOVED_PERMANENTLY,
                "/compare/go/rust/",
            ),
            (
                "/codeblock/go/rust/Loops",
                StatusCode::MOVED_PERMANENTLY,
                "/codeblock/go/rust/Loops/",
            ),
            (
                "/codeblock/go/rust/Loops/For?x=1",
                StatusCode::MOVED_PERMANENTLY,
                "/codeblock/go/rust/Loops/For/?x=1",
            ),
        ];

        for (path, status, location) in cases {
            let response = client.get(server.url(path)).send().await.unwrap();
            assert_eq!(response.status(), status, "{path}");
            assert_eq!(
                response.headers()["location"].to_str().unwrap(),
                location,
                "{path}"
            );
        }
    }

    #[tokio::test]
    async fn test_compare_lists_tasks() {
        test::setup();
        let source = Arc::new(loops_source());
        let server = serve(memory_cache(), source.clone());

        let response = client()
            .get(server.url("/compare/go/python/"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["cache-control"],
            "public; max-age=5184000"
        );

        let body = response.text().await.unwrap();
        assert!(body.contains("<title>Go x Python side-by-side</title>"));
        assert!(body.contains(r#"data-src="/codeblock/go/python/Loops/""#));
        assert!(body.contains(r#"data-src="/codeblock/go/python/Loops/For/""#));
        assert_eq!(source.task_fetches(), 1);
    }

    #[tokio::test]
    async fn test_compare_falls_back_to_catalog() {
        test::setup();
        let server = serve(memory_cache(), Arc::new(FakeSource::new().failing()));

        let response = client()
            .get(server.url("/compare/go/python/"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains("<summary>Text/Hello world</summary>"));
    }

    #[tokio::test]
    async fn test_codeblock_populates_cache() {
        test::setup();
        let cache = memory_cache();
        let source = Arc::new(loops_source());
        let server = serve(cache.clone(), source.clone());
        let client = client();

        let response = client
            .get(server.url("/codeblock/go/python/Loops/"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["cache-control"],
            "public; max-age=5184000"
        );
        let body = response.text().await.unwrap();
        assert!(body.contains(r#"<pre><code class="language-go">for {}</code></pre>"#));
        assert!(body.contains(r#"<code class="language-python">while True: pass</code>"#));

        let key = CacheKey::snippet(&Task::new("Loops"), &Language::parse("go").unwrap());
        assert_eq!(key.as_str(), "Loops::go");
        assert_eq!(
            cache.get(&key).await.unwrap().as_deref(),
            Some(r#"<pre><code class="language-go">for {}</code></pre>"#)
        );

        // the second request is served from the cache
        let response = client
            .get(server.url("/codeblock/Go/Python/Loops/"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(source.code_fetches(), 1);
    }

    #[tokio::test]
    async fn test_codeblock_grouped_task() {
        test::setup();
        let server = serve(memory_cache(), Arc::new(loops_source()));

        let response = client()
            .get(server.url("/codeblock/go/python/Loops/For/"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains("for i := 0; i &lt; 10; i++ {}"));
        assert!(body.contains("for i in range(10): pass"));
    }

    #[tokio::test]
    async fn test_codeblock_not_found() {
        test::setup();
        let server = serve(memory_cache(), Arc::new(loops_source()));

        let response = client()
            .get(server.url("/codeblock/go/cobol/Loops/"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("cache-control").is_none());
    }

    #[tokio::test]
    async fn test_codeblock_source_failure() {
        test::setup();
        let server = serve(memory_cache(), Arc::new(FakeSource::new().failing()));

        let response = client()
            .get(server.url("/codeblock/go/python/Loops/"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
        assert_eq!(
            body["detail"],
            "failed to fetch code from the content source"
        );
    }

    #[tokio::test]
    async fn test_invalid_language() {
        test::setup();
        let source = Arc::new(loops_source());
        let server = serve(memory_cache(), source.clone());

        let response = client()
            .get(server.url("/codeblock/go/%7Bx%7D/Loops/"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(source.code_fetches(), 0);
    }
}
