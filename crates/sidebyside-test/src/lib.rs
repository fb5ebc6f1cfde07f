//! Helpers for testing the web server and service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using a [`Server`], make sure that the server is held until all requests to it have
//!    been made. The server stops serving as soon as it is dropped. To avoid this, assign it to a
//!    variable: `let server = Server::with_wiki(wiki);`.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{OriginalUri, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `sidebyside` crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("sidebyside=trace,sidebyside_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl Server {
    /// Serves the given router and counts the requests made to it.
    pub fn with_router(router: Router) -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |OriginalUri(uri): OriginalUri, req: Request, next: Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        *hits.entry(uri.path().to_owned()).or_default() += 1;
                    }
                    next.run(req).await
                }
            }
        };
        let router = router.layer(middleware::from_fn(hitcounter));

        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            hits,
        }
    }

    /// Serves a fake wiki with the given contents.
    pub fn with_wiki(wiki: FakeWiki) -> Self {
        Self::with_router(wiki.into_router())
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }

    /// Returns the number of requests since the last call and resets the counter.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Number of category members per listing page, like the real API limit.
const PAGE_SIZE: usize = 500;

/// The contents of a fake MediaWiki installation.
///
/// Serves the two endpoints the content source uses: the `categorymembers` listing of
/// `/w/api.php` and raw page text from `/w/index.php?action=raw`.
#[derive(Debug, Clone, Default)]
pub struct FakeWiki {
    categories: HashMap<String, Vec<String>>,
    pages: HashMap<String, String>,
    failures: HashMap<String, u16>,
}

impl FakeWiki {
    /// Adds a category, e.g. `Category:Go`, listing the given page titles.
    pub fn with_category(mut self, category: &str, titles: &[&str]) -> Self {
        self.categories.insert(
            category.to_owned(),
            titles.iter().map(|t| (*t).to_owned()).collect(),
        );
        self
    }

    /// Adds a page with the given wikitext.
    pub fn with_page(mut self, title: &str, text: &str) -> Self {
        self.pages.insert(title.to_owned(), text.to_owned());
        self
    }

    /// Makes an endpoint respond with `status`. Endpoints are `categorymembers` and `raw`.
    pub fn with_failure(mut self, endpoint: &str, status: u16) -> Self {
        self.failures.insert(endpoint.to_owned(), status);
        self
    }

    fn failure(&self, endpoint: &str) -> Option<StatusCode> {
        let status = *self.failures.get(endpoint)?;
        Some(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/w/api.php", get(api))
            .route("/w/index.php", get(index))
            .with_state(Arc::new(self))
    }
}

#[derive(Debug, Deserialize)]
struct ApiQuery {
    cmtitle: String,
    cmcontinue: Option<String>,
    cmlimit: Option<usize>,
}

async fn api(State(wiki): State<Arc<FakeWiki>>, Query(query): Query<ApiQuery>) -> Response {
    if let Some(status) = wiki.failure("categorymembers") {
        return status.into_response();
    }

    let titles = wiki
        .categories
        .get(&query.cmtitle)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let limit = query.cmlimit.unwrap_or(PAGE_SIZE).min(PAGE_SIZE);
    let offset = query
        .cmcontinue
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(0)
        .min(titles.len());
    let end = (offset + limit).min(titles.len());

    let members: Vec<_> = titles[offset..end]
        .iter()
        .map(|title| serde_json::json!({ "ns": 0, "title": title }))
        .collect();

    let mut body = serde_json::json!({
        "batchcomplete": "",
        "query": { "categorymembers": members },
    });
    if end < titles.len() {
        body["continue"] = serde_json::json!({
            "cmcontinue": end.to_string(),
            "continue": "-||",
        });
    }
    Json(body).into_response()
}

#[derive(Debug, Deserialize)]
struct IndexQuery {
    title: String,
    action: Option<String>,
}

async fn index(State(wiki): State<Arc<FakeWiki>>, Query(query): Query<IndexQuery>) -> Response {
    if let Some(status) = wiki.failure("raw") {
        return status.into_response();
    }
    if query.action.as_deref() != Some("raw") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match wiki.pages.get(&query.title) {
        Some(text) => text.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Default)]
struct MemcachedState {
    entries: HashMap<String, (Vec<u8>, i64)>,
    connections: usize,
    drop_next: bool,
}

/// An in-process server speaking the memcached text protocol (`get`, `gets`, `set`).
///
/// Counts accepted connections and can hang up on the next request to simulate a broken
/// connection. Like [`Server`], it stops serving when dropped.
#[derive(Debug)]
pub struct FakeMemcached {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: Arc<Mutex<MemcachedState>>,
}

impl FakeMemcached {
    pub fn start() -> Self {
        let state = Arc::new(Mutex::new(MemcachedState::default()));

        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn({
            let state = state.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    state.lock().unwrap().connections += 1;
                    tokio::spawn(serve_memcached(stream, state.clone()));
                }
            }
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// The address in the form the cache config expects, `tcp://127.0.0.1:<port>`.
    pub fn dsn(&self) -> String {
        format!("tcp://{}", self.socket)
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    /// The value and TTL stored under the literal wire `key`.
    pub fn entry(&self, key: &str) -> Option<(Vec<u8>, i64)> {
        self.state.lock().unwrap().entries.get(key).cloned()
    }

    /// Stores raw bytes under the literal wire `key`.
    pub fn insert(&self, key: &str, value: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.entries.insert(key.to_owned(), (value.to_vec(), 0));
    }

    /// Closes the connection that sends the next request without answering it.
    pub fn hang_up_next(&self) {
        self.state.lock().unwrap().drop_next = true;
    }
}

impl Drop for FakeMemcached {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_memcached(stream: tokio::net::TcpStream, state: Arc<Mutex<MemcachedState>>) {
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        if std::mem::take(&mut state.lock().unwrap().drop_next) {
            return;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let mut response = Vec::new();
        match parts.as_slice() {
            [cmd @ ("get" | "gets"), keys @ ..] => {
                let state = state.lock().unwrap();
                for key in keys {
                    if let Some((value, _)) = state.entries.get(*key) {
                        let header = match *cmd {
                            "gets" => format!("VALUE {key} 0 {} 1\r\n", value.len()),
                            _ => format!("VALUE {key} 0 {}\r\n", value.len()),
                        };
                        response.extend_from_slice(header.as_bytes());
                        response.extend_from_slice(value);
                        response.extend_from_slice(b"\r\n");
                    }
                }
                response.extend_from_slice(b"END\r\n");
            }
            ["set", key, _flags, ttl, len, rest @ ..] => {
                let Ok(len) = len.parse::<usize>() else {
                    return;
                };
                let mut data = vec![0; len + 2];
                if reader.read_exact(&mut data).await.is_err() {
                    return;
                }
                data.truncate(len);

                let ttl = ttl.parse().unwrap_or_default();
                state
                    .lock()
                    .unwrap()
                    .entries
                    .insert((*key).to_owned(), (data, ttl));
                if rest.first() != Some(&"noreply") {
                    response.extend_from_slice(b"STORED\r\n");
                }
            }
            ["version"] => response.extend_from_slice(b"VERSION 1.6.21\r\n"),
            _ => response.extend_from_slice(b"ERROR\r\n"),
        }

        if writer.write_all(&response).await.is_err() {
            return;
        }
    }
}
