//! Automation client seam for externally-hosted browser instances
//!
//! The registry never talks to the provider or to chromiumoxide directly;
//! it goes through the [`AutomationClient`] and [`ClientFactory`] traits so
//! the whole lifecycle can be exercised in tests without a network.

mod hosted;

pub use hosted::{HostedBrowser, HostedBrowserFactory};

use async_trait::async_trait;
use std::sync::Arc;

/// One live externally-hosted browser automation instance.
///
/// The registry is the sole owner of a client once registered and is
/// responsible for calling [`AutomationClient::close`] exactly once via
/// `SessionRegistry::close`. Collaborating request handlers receive clones
/// of the `Arc` from `SessionRegistry::get` to issue commands against.
#[async_trait]
pub trait AutomationClient: Send + Sync {
    /// Provider-side session identifier, used by the debug-view endpoint.
    ///
    /// `None` for instances that have no provider-side identity (e.g. test
    /// doubles); the viewer resolution chain then skips the debug endpoint.
    fn remote_id(&self) -> Option<String>;

    /// Navigate the instance to `url`.
    async fn goto(&self, url: &str) -> BrowserResult<()>;

    /// Current page URL, `about:blank` if the page has not navigated yet.
    async fn current_url(&self) -> BrowserResult<String>;

    /// Current page title, empty string if none is set.
    async fn current_title(&self) -> BrowserResult<String>;

    /// Shut the instance down. Safe to call more than once; subsequent
    /// calls are no-ops.
    async fn close(&self) -> BrowserResult<()>;
}

/// Builds automation instances bound to provider credentials and a model.
///
/// Injected into the registry so tests can substitute an offline factory.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Create and initialize one instance configured for `model_name`.
    ///
    /// # Errors
    /// Fails hard on missing credentials, provider rejection, or CDP
    /// connection failure. Nothing is registered when this errors.
    async fn connect(&self, model_name: &str) -> BrowserResult<Arc<dyn AutomationClient>>;
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Missing configuration: {0} is not set")]
    MissingConfig(String),

    #[error("Provider API error: {0}")]
    Provider(String),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Failed to connect to remote browser: {0}")]
    ConnectFailed(String),

    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Page introspection failed: {0}")]
    Introspection(String),

    #[error("Browser already closed")]
    AlreadyClosed,
}

pub type BrowserResult<T> = Result<T, BrowserError>;
