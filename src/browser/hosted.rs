//! Production [`AutomationClient`] backed by the hosted automation provider
//!
//! Creating a client is a two-step handshake: `POST /v1/sessions` against
//! the provider API reserves a remote browser and returns a CDP websocket
//! URL, then chromiumoxide connects to that URL. All credentials are read
//! from the environment at connect time, so misconfiguration surfaces as a
//! create failure rather than at construction.

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace};

use super::{AutomationClient, BrowserError, BrowserResult, ClientFactory};
use crate::ProviderConfig;
use crate::utils::constants::BLANK_PAGE_URL;

/// Request body for `POST /v1/sessions`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewSessionRequest<'a> {
    project_id: &'a str,
    model_name: &'a str,
    model_api_key: &'a str,
}

/// Response body for `POST /v1/sessions`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSessionResponse {
    id: String,
    connect_url: String,
}

/// Mutable half of a hosted browser connection.
///
/// `browser` is `None` after close; every operation checks for that so a
/// handle cloned out of the registry cannot revive a closed connection.
struct Connection {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
}

/// One remote browser instance driven over CDP.
pub struct HostedBrowser {
    remote_id: String,
    conn: Mutex<Connection>,
}

impl HostedBrowser {
    fn new(remote_id: String, browser: Browser, handler: JoinHandle<()>, page: Page) -> Self {
        Self {
            remote_id,
            conn: Mutex::new(Connection {
                browser: Some(browser),
                page: Some(page),
                handler: Some(handler),
            }),
        }
    }
}

#[async_trait]
impl AutomationClient for HostedBrowser {
    fn remote_id(&self) -> Option<String> {
        Some(self.remote_id.clone())
    }

    async fn goto(&self, url: &str) -> BrowserResult<()> {
        let conn = self.conn.lock().await;
        let page = conn.page.as_ref().ok_or(BrowserError::AlreadyClosed)?;

        page.goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

        // Redirect-heavy pages report a stale URL until the load settles
        page.wait_for_navigation()
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        let conn = self.conn.lock().await;
        let page = conn.page.as_ref().ok_or(BrowserError::AlreadyClosed)?;

        let url = page
            .url()
            .await
            .map_err(|e| BrowserError::Introspection(e.to_string()))?;

        Ok(url.unwrap_or_else(|| BLANK_PAGE_URL.to_string()))
    }

    async fn current_title(&self) -> BrowserResult<String> {
        let conn = self.conn.lock().await;
        let page = conn.page.as_ref().ok_or(BrowserError::AlreadyClosed)?;

        let title = page
            .get_title()
            .await
            .map_err(|e| BrowserError::Introspection(e.to_string()))?;

        Ok(title.unwrap_or_default())
    }

    async fn close(&self) -> BrowserResult<()> {
        let mut conn = self.conn.lock().await;

        let Some(mut browser) = conn.browser.take() else {
            debug!(remote_id = %self.remote_id, "close called on already-closed browser");
            return Ok(());
        };
        conn.page = None;

        info!(remote_id = %self.remote_id, "closing remote browser connection");

        // Best-effort: the provider tears the instance down when the CDP
        // connection drops, so a failed close command is not fatal.
        if let Err(e) = browser.close().await {
            tracing::warn!(remote_id = %self.remote_id, "failed to close browser cleanly: {}", e);
        }

        // The handler task ends once the websocket is gone; abort in case
        // the close command never reached the remote end.
        if let Some(handler) = conn.handler.take() {
            handler.abort();
        }

        Ok(())
    }
}

/// Builds [`HostedBrowser`] instances through the provider session API.
#[derive(Clone)]
pub struct HostedBrowserFactory {
    http: reqwest::Client,
}

impl HostedBrowserFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HostedBrowserFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientFactory for HostedBrowserFactory {
    async fn connect(&self, model_name: &str) -> BrowserResult<Arc<dyn AutomationClient>> {
        let config = ProviderConfig::from_env()?;

        let response = self
            .http
            .post(format!("{}/v1/sessions", config.api_base))
            .header("x-api-key", &config.api_key)
            .json(&NewSessionRequest {
                project_id: &config.project_id,
                model_name,
                model_api_key: &config.model_api_key,
            })
            .send()
            .await
            .map_err(|e| BrowserError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrowserError::Provider(format!(
                "session create returned {status}: {body}"
            )));
        }

        let session: NewSessionResponse = response
            .json()
            .await
            .map_err(|e| BrowserError::Provider(format!("malformed session response: {e}")))?;

        info!(remote_id = %session.id, "provider session created, connecting over CDP");

        let (browser, mut handler) = Browser::connect(&session.connect_url)
            .await
            .map_err(|e| BrowserError::ConnectFailed(e.to_string()))?;

        let handler_task = task::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    let error_msg = e.to_string();

                    // Filter out known non-fatal CDP serialization errors.
                    // Chrome sends CDP events chromiumoxide doesn't recognize.
                    // Reference: https://github.com/mattsse/chromiumoxide/issues/167
                    //            https://github.com/mattsse/chromiumoxide/issues/229
                    let is_benign_serialization_error = error_msg
                        .contains("data did not match any variant of untagged enum Message")
                        || error_msg.contains("Failed to deserialize WS response");

                    if !is_benign_serialization_error {
                        error!("Browser handler error: {:?}", e);
                    } else {
                        trace!("Suppressed benign CDP serialization error: {}", error_msg);
                    }
                }
            }
            debug!("Browser handler task completed");
        });

        // A blank page up front gives navigation and introspection a stable
        // target even if the first goto never happens.
        let page = match browser.new_page(BLANK_PAGE_URL).await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(BrowserError::PageCreationFailed(e.to_string()));
            }
        };

        Ok(Arc::new(HostedBrowser::new(
            session.id,
            browser,
            handler_task,
            page,
        )))
    }
}
