use std::time::Duration;

use reqwest::redirect;

use crate::config::SourceConfig;

/// Timeouts applied to requests against the content source.
#[derive(Copy, Clone, Debug)]
pub struct SourceTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// Global timeout for one request.
    pub request: Duration,
}

impl SourceTimeouts {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            connect: config.connect_timeout,
            request: config.timeout,
        }
    }
}

/// Creates a [`reqwest::Client`] for talking to the content source.
///
/// The wiki redirects renamed pages, so a handful of redirects is followed.
pub fn create_client(
    timeouts: &SourceTimeouts,
    user_agent: &str,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .user_agent(user_agent)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .pool_idle_timeout(Duration::from_secs(30))
        .redirect(redirect::Policy::limited(5))
        .build()
}
