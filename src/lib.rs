//! Lifecycle management for externally-hosted browser automation sessions
//!
//! Sessions are remote headless-browser instances reserved through a hosted
//! provider's HTTP API and driven over CDP via chromiumoxide. The
//! [`SessionRegistry`] owns every live instance, keyed by generated id, and
//! resolves a human-viewable URL for each one through a best-effort
//! fallback chain.
//!
//! ```no_run
//! use hosted_browser_sessions::{BrowserResult, CreateOptions, SessionRegistry};
//!
//! # async fn demo() -> BrowserResult<()> {
//! let registry = SessionRegistry::new();
//! let session = registry
//!     .create(CreateOptions {
//!         start_url: Some("https://example.com".into()),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! println!("watch it at {}", session.viewer_url);
//! registry.close(&session.id).await;
//! # Ok(())
//! # }
//! ```

mod browser;
mod registry;
mod utils;
mod viewer;

use serde::{Deserialize, Serialize};

use crate::utils::constants::{
    DEFAULT_API_BASE, ENV_API_BASE, ENV_API_KEY, ENV_MODEL_API_KEY, ENV_PROJECT_ID,
};

/// Credentials and endpoints for the hosted automation provider.
///
/// Read from the environment inside the create path, not up front, so a
/// misconfigured process fails on first use rather than at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API key (`AUTOMATION_API_KEY`)
    pub api_key: String,

    /// Provider project identifier (`AUTOMATION_PROJECT_ID`)
    pub project_id: String,

    /// API key for the model backing the provider-side agent runtime
    /// (`MODEL_API_KEY`)
    pub model_api_key: String,

    /// Session API base URL (`AUTOMATION_API_URL`)
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl ProviderConfig {
    /// Load provider configuration from the process environment.
    ///
    /// # Errors
    /// Returns [`BrowserError::MissingConfig`] naming the first unset
    /// required variable.
    pub fn from_env() -> BrowserResult<Self> {
        Ok(Self {
            api_key: require_env(ENV_API_KEY)?,
            project_id: require_env(ENV_PROJECT_ID)?,
            model_api_key: require_env(ENV_MODEL_API_KEY)?,
            api_base: std::env::var(ENV_API_BASE).unwrap_or_else(|_| default_api_base()),
        })
    }
}

fn require_env(name: &str) -> BrowserResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| BrowserError::MissingConfig(name.to_string()))
}

pub use browser::{
    AutomationClient, BrowserError, BrowserResult, ClientFactory, HostedBrowser,
    HostedBrowserFactory,
};
pub use registry::{CreateOptions, CreatedSession, SessionInfo, SessionRegistry};
pub use utils::constants::{DEFAULT_MODEL, DEFAULT_PAGE_TITLE, DEFAULT_START_URL};
pub use viewer::{DebugViewResolver, HostedDebugView, ViewerInfo};
