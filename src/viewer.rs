//! Viewer URL resolution for live sessions
//!
//! A viewer URL is a human-viewable https link for observing a running
//! session. Resolution is an ordered chain of best-effort producers, each
//! returning `Option` instead of erroring:
//!
//! 1. the provider's debug-view endpoint (fullscreen debugger link,
//!    augmented with a navbar flag),
//! 2. the instance's own page URL, if it is https and not `about:blank`,
//! 3. a fixed default URL and title.
//!
//! Step 3 always produces, so every created session gets a viewer URL.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::ProviderConfig;
use crate::browser::AutomationClient;
use crate::utils::constants::{
    BLANK_PAGE_URL, DEFAULT_PAGE_TITLE, DEFAULT_START_URL, VIEWER_NAVBAR_PARAM,
};

/// Resolved viewer link for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerInfo {
    /// Always an https URL after resolution
    pub url: String,
    /// Page title, if one could be read; the fallback step supplies a default
    pub title: Option<String>,
}

/// Looks up the provider-hosted debug view for a remote session.
///
/// Injected into the registry so tests can force each chain step to fail.
#[async_trait]
pub trait DebugViewResolver: Send + Sync {
    /// Best-effort lookup; `None` on any failure or non-https result.
    async fn debug_view(&self, remote_id: &str) -> Option<Url>;
}

/// Response body for `GET /v1/sessions/{id}/debug`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugViewResponse {
    debugger_fullscreen_url: String,
}

/// Production resolver backed by the provider debug endpoint.
#[derive(Clone)]
pub struct HostedDebugView {
    http: reqwest::Client,
}

impl HostedDebugView {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HostedDebugView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DebugViewResolver for HostedDebugView {
    async fn debug_view(&self, remote_id: &str) -> Option<Url> {
        let config = ProviderConfig::from_env().ok()?;

        let response = self
            .http
            .get(format!("{}/v1/sessions/{remote_id}/debug", config.api_base))
            .header("x-api-key", &config.api_key)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!(
                remote_id,
                status = %response.status(),
                "debug view endpoint returned non-success"
            );
            return None;
        }

        let body: DebugViewResponse = response.json().await.ok()?;
        let url = Url::parse(&body.debugger_fullscreen_url).ok()?;

        (url.scheme() == "https").then_some(url)
    }
}

/// Run the resolution chain for a live instance.
///
/// Never fails; a session whose debug endpoint and page introspection are
/// both unreachable still resolves to the default URL and title.
pub(crate) async fn resolve_viewer(
    resolver: &dyn DebugViewResolver,
    client: &dyn AutomationClient,
) -> ViewerInfo {
    // Step 1: provider debug view
    if let Some(remote_id) = client.remote_id() {
        let secure_view = resolver
            .debug_view(&remote_id)
            .await
            .filter(|u| u.scheme() == "https");
        if let Some(mut url) = secure_view {
            let (key, value) = VIEWER_NAVBAR_PARAM;
            url.query_pairs_mut().append_pair(key, value);

            let title = client.current_title().await.ok().filter(|t| !t.is_empty());
            return ViewerInfo {
                url: url.into(),
                title,
            };
        }
        debug!(remote_id, "no debug view available, trying page introspection");
    }

    // Step 2: the page's own URL, if it is something a human can open
    if let Ok(url) = client.current_url().await {
        if url.starts_with("https://") && url != BLANK_PAGE_URL {
            let title = client.current_title().await.ok().filter(|t| !t.is_empty());
            return ViewerInfo { url, title };
        }
        debug!(url, "page URL unusable as viewer, falling back to default");
    }

    // Step 3: fixed fallback
    ViewerInfo {
        url: DEFAULT_START_URL.to_string(),
        title: Some(DEFAULT_PAGE_TITLE.to_string()),
    }
}
