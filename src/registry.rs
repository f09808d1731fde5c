//! Session registry for hosted browser automation instances
//!
//! Process-wide mapping from generated session id to the owned automation
//! client. The registry is the single owner of every instance it holds:
//! `create` acquires, `close` releases, and the entry is removed from the
//! map before the external close is attempted so bookkeeping cleanup is
//! guaranteed on every exit path.
//!
//! Sessions live until closed; there is no TTL, heartbeat, or maximum
//! session count, and a process restart orphans whatever the provider still
//! has running.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::{
    AutomationClient, BrowserResult, ClientFactory, HostedBrowserFactory,
};
use crate::utils::constants::{DEFAULT_MODEL, DEFAULT_START_URL};
use crate::viewer::{self, DebugViewResolver, HostedDebugView};

/// Options accepted by [`SessionRegistry::create`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOptions {
    /// Model powering the provider-side agent runtime; defaults to
    /// [`DEFAULT_MODEL`]
    #[serde(default)]
    pub model_name: Option<String>,

    /// First navigation target; defaults to [`DEFAULT_START_URL`] when
    /// omitted or blank
    #[serde(default)]
    pub start_url: Option<String>,
}

/// Result of a successful [`SessionRegistry::create`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    /// Registry key for subsequent `get`/`close` calls
    pub id: String,

    /// Human-viewable https link; always populated via the fallback chain
    pub viewer_url: String,

    /// Page title, when one could be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The navigation target the session was pointed at (the default when
    /// the caller supplied none)
    pub start_url: String,
}

/// Summary of one live session, for [`SessionRegistry::list`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub start_url: String,
    pub age_seconds: u64,
}

/// One registered session: the owned client plus creation metadata.
struct Session {
    client: Arc<dyn AutomationClient>,
    start_url: String,
    created_at: Instant,
}

/// Registry for externally-hosted browser automation sessions.
///
/// All dependencies are constructor-injected (client factory, debug-view
/// resolver, id generator) so the full lifecycle is testable offline;
/// [`SessionRegistry::new`] wires the production implementations.
///
/// A session id moves `absent -> live -> absent`. There is no failed state:
/// a session whose navigation or viewer resolution failed is still live and
/// must be closed explicitly.
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    factory: Arc<dyn ClientFactory>,
    debug_view: Arc<dyn DebugViewResolver>,
    id_gen: Box<dyn Fn() -> String + Send + Sync>,
}

impl SessionRegistry {
    /// Registry wired to the hosted provider.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dependencies(
            Arc::new(HostedBrowserFactory::new()),
            Arc::new(HostedDebugView::new()),
        )
    }

    /// Registry with injected dependencies. Ids default to UUIDv4, which
    /// keeps them unique for the life of the process.
    pub fn with_dependencies(
        factory: Arc<dyn ClientFactory>,
        debug_view: Arc<dyn DebugViewResolver>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            factory,
            debug_view,
            id_gen: Box::new(|| Uuid::new_v4().to_string()),
        }
    }

    /// Replace the id generator. The generator must not repeat an id while
    /// a session under that id is live.
    #[must_use]
    pub fn with_id_generator<F>(mut self, id_gen: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_gen = Box::new(id_gen);
        self
    }

    /// Create, register, and return a new session.
    ///
    /// Client initialization failures propagate and leave the registry
    /// unchanged. Everything after initialization is best-effort: a failed
    /// first navigation or viewer resolution still yields a registered,
    /// closable session.
    ///
    /// # Errors
    /// Returns the factory's error when the instance cannot be built
    /// (missing credentials, provider rejection, CDP connect failure).
    pub async fn create(&self, options: CreateOptions) -> BrowserResult<CreatedSession> {
        let model_name = options
            .model_name
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let start_url = options
            .start_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_START_URL.to_string());

        let client = self.factory.connect(&model_name).await?;
        let id = (self.id_gen)();

        info!(id = %id, model = %model_name, "created browser session");

        if let Err(e) = client.goto(&start_url).await {
            warn!(id = %id, url = %start_url, "initial navigation failed: {}", e);
        }

        // Register before viewer enrichment so a partially-initialized
        // session is already reachable for cleanup.
        self.sessions.insert(
            id.clone(),
            Session {
                client: client.clone(),
                start_url: start_url.clone(),
                created_at: Instant::now(),
            },
        );

        let view = viewer::resolve_viewer(self.debug_view.as_ref(), client.as_ref()).await;

        Ok(CreatedSession {
            id,
            viewer_url: view.url,
            title: view.title,
            start_url,
        })
    }

    /// Look up a live session's client handle.
    pub fn get(&self, id: &str) -> Option<Arc<dyn AutomationClient>> {
        let client = self.sessions.get(id).map(|entry| entry.client.clone());
        if client.is_none() {
            debug!(id, "session not found");
        }
        client
    }

    /// Close a session and drop it from the registry.
    ///
    /// Returns `false` for unknown ids without touching anything. For known
    /// ids the entry is removed first (atomically, so a concurrent close of
    /// the same id degrades to the unknown-id path), then the instance is
    /// shut down; shutdown failures are logged and swallowed. Returns `true`
    /// whenever the id was known, whether or not shutdown succeeded.
    pub async fn close(&self, id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            debug!(id, "close requested for unknown session");
            return false;
        };

        info!(id, "closing browser session");

        if let Err(e) = session.client.close().await {
            warn!(id, "session shutdown failed: {}", e);
        }

        true
    }

    /// Snapshot of all live sessions, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| SessionInfo {
                id: entry.key().clone(),
                start_url: entry.value().start_url.clone(),
                age_seconds: entry.value().created_at.elapsed().as_secs(),
            })
            .collect();

        sessions.sort_by(|a, b| b.age_seconds.cmp(&a.age_seconds));
        sessions
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserError;
    use crate::utils::constants::{DEFAULT_PAGE_TITLE, DEFAULT_START_URL};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    #[derive(Default)]
    struct MockClient {
        navigated_to: Mutex<Option<String>>,
        fail_navigation: bool,
        fail_close: bool,
        fail_introspection: bool,
        close_calls: AtomicUsize,
    }

    #[async_trait]
    impl AutomationClient for MockClient {
        fn remote_id(&self) -> Option<String> {
            Some("remote-1".to_string())
        }

        async fn goto(&self, url: &str) -> BrowserResult<()> {
            if self.fail_navigation {
                return Err(BrowserError::NavigationFailed("net::ERR_FAILED".into()));
            }
            *self.navigated_to.lock().unwrap() = Some(url.to_string());
            Ok(())
        }

        async fn current_url(&self) -> BrowserResult<String> {
            if self.fail_introspection {
                return Err(BrowserError::Introspection("target detached".into()));
            }
            Ok(self
                .navigated_to
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "about:blank".to_string()))
        }

        async fn current_title(&self) -> BrowserResult<String> {
            if self.fail_introspection {
                return Err(BrowserError::Introspection("target detached".into()));
            }
            Ok(if self.navigated_to.lock().unwrap().is_some() {
                "Mock Page".to_string()
            } else {
                String::new()
            })
        }

        async fn close(&self) -> BrowserResult<()> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(BrowserError::ConnectFailed("socket already gone".into()));
            }
            Ok(())
        }
    }

    struct MockFactory {
        template: fn() -> MockClient,
        built: Mutex<Vec<Arc<MockClient>>>,
    }

    impl MockFactory {
        fn new(template: fn() -> MockClient) -> Self {
            Self {
                template,
                built: Mutex::new(Vec::new()),
            }
        }

        fn last_built(&self) -> Arc<MockClient> {
            self.built.lock().unwrap().last().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClientFactory for MockFactory {
        async fn connect(&self, _model_name: &str) -> BrowserResult<Arc<dyn AutomationClient>> {
            let client = Arc::new((self.template)());
            self.built.lock().unwrap().push(client.clone());
            Ok(client)
        }
    }

    struct FailingFactory;

    #[async_trait]
    impl ClientFactory for FailingFactory {
        async fn connect(&self, _model_name: &str) -> BrowserResult<Arc<dyn AutomationClient>> {
            Err(BrowserError::MissingConfig("AUTOMATION_API_KEY".into()))
        }
    }

    struct NoDebugView;

    #[async_trait]
    impl DebugViewResolver for NoDebugView {
        async fn debug_view(&self, _remote_id: &str) -> Option<Url> {
            None
        }
    }

    struct FixedDebugView(&'static str);

    #[async_trait]
    impl DebugViewResolver for FixedDebugView {
        async fn debug_view(&self, _remote_id: &str) -> Option<Url> {
            Url::parse(self.0).ok()
        }
    }

    fn registry_with(factory: Arc<MockFactory>) -> SessionRegistry {
        SessionRegistry::with_dependencies(factory, Arc::new(NoDebugView))
    }

    #[tokio::test]
    async fn created_session_resolvable_until_closed() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = registry_with(factory);

        let created = registry
            .create(CreateOptions {
                start_url: Some("https://example.org".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(registry.get(&created.id).is_some());
        assert!(registry.close(&created.id).await);
        assert!(registry.get(&created.id).is_none());
    }

    #[tokio::test]
    async fn close_unknown_id_is_noop() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = registry_with(factory);

        assert!(!registry.close("no-such-session").await);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn second_close_returns_false() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = registry_with(factory.clone());

        let created = registry.create(CreateOptions::default()).await.unwrap();
        assert!(registry.close(&created.id).await);
        assert!(!registry.close(&created.id).await);
        assert_eq!(factory.last_built().close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn viewer_url_is_https_even_when_everything_fails() {
        let factory = Arc::new(MockFactory::new(|| MockClient {
            fail_introspection: true,
            ..Default::default()
        }));
        let registry = registry_with(factory);

        let created = registry
            .create(CreateOptions {
                start_url: Some("https://example.org".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(created.viewer_url.starts_with("https://"));
        assert!(!created.viewer_url.is_empty());
    }

    #[tokio::test]
    async fn empty_options_use_documented_defaults() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = registry_with(factory.clone());

        let created = registry.create(CreateOptions::default()).await.unwrap();

        assert_eq!(created.start_url, DEFAULT_START_URL);
        assert_eq!(
            factory
                .last_built()
                .navigated_to
                .lock()
                .unwrap()
                .as_deref(),
            Some(DEFAULT_START_URL)
        );
    }

    #[tokio::test]
    async fn blank_start_url_treated_as_absent() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = registry_with(factory);

        let created = registry
            .create(CreateOptions {
                start_url: Some("   ".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.start_url, DEFAULT_START_URL);
    }

    #[tokio::test]
    async fn sequential_creates_yield_independent_sessions() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = registry_with(factory);

        let first = registry.create(CreateOptions::default()).await.unwrap();
        let second = registry.create(CreateOptions::default()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(registry.get(&first.id).is_some());
        assert!(registry.get(&second.id).is_some());

        assert!(registry.close(&first.id).await);
        assert!(registry.get(&second.id).is_some());
        assert!(registry.close(&second.id).await);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn navigation_failure_still_registers_session() {
        let factory = Arc::new(MockFactory::new(|| MockClient {
            fail_navigation: true,
            ..Default::default()
        }));
        let registry = registry_with(factory);

        let created = registry
            .create(CreateOptions {
                start_url: Some("https://unreachable.invalid".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(registry.get(&created.id).is_some());
        assert!(registry.close(&created.id).await);
    }

    #[tokio::test]
    async fn initialization_failure_registers_nothing() {
        let registry =
            SessionRegistry::with_dependencies(Arc::new(FailingFactory), Arc::new(NoDebugView));

        let result = registry.create(CreateOptions::default()).await;
        assert!(matches!(result, Err(BrowserError::MissingConfig(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn close_swallows_shutdown_failure() {
        let factory = Arc::new(MockFactory::new(|| MockClient {
            fail_close: true,
            ..Default::default()
        }));
        let registry = registry_with(factory);

        let created = registry.create(CreateOptions::default()).await.unwrap();
        assert!(registry.close(&created.id).await);
        assert!(registry.get(&created.id).is_none());
    }

    #[tokio::test]
    async fn concurrent_close_invokes_shutdown_once() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = Arc::new(registry_with(factory.clone()));

        let created = registry.create(CreateOptions::default()).await.unwrap();

        let (a, b) = tokio::join!(registry.close(&created.id), registry.close(&created.id));

        assert!(a ^ b, "exactly one close call should observe the session");
        assert_eq!(factory.last_built().close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn debug_view_failure_with_blank_page_yields_default_viewer() {
        // Provider debug endpoint down, page never left about:blank.
        let factory = Arc::new(MockFactory::new(|| MockClient {
            fail_navigation: true,
            ..Default::default()
        }));
        let registry = registry_with(factory);

        let created = registry
            .create(CreateOptions {
                start_url: Some("https://example.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.viewer_url, DEFAULT_START_URL);
        assert_eq!(created.title.as_deref(), Some(DEFAULT_PAGE_TITLE));
    }

    #[tokio::test]
    async fn debug_view_link_gets_display_flag() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = SessionRegistry::with_dependencies(
            factory,
            Arc::new(FixedDebugView("https://viewer.browsercloud.dev/remote-1")),
        );

        let created = registry
            .create(CreateOptions {
                start_url: Some("https://example.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            created.viewer_url,
            "https://viewer.browsercloud.dev/remote-1?navbar=true"
        );
    }

    #[tokio::test]
    async fn custom_id_generator_is_used() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = registry_with(factory).with_id_generator(|| "fixed-id".to_string());

        let created = registry.create(CreateOptions::default()).await.unwrap();
        assert_eq!(created.id, "fixed-id");
        assert!(registry.get("fixed-id").is_some());
    }

    #[test]
    fn created_session_serializes_camel_case() {
        let created = CreatedSession {
            id: "s-1".into(),
            viewer_url: "https://viewer.browsercloud.dev/s-1?navbar=true".into(),
            title: None,
            start_url: DEFAULT_START_URL.into(),
        };

        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["id"], "s-1");
        assert_eq!(json["viewerUrl"], "https://viewer.browsercloud.dev/s-1?navbar=true");
        assert_eq!(json["startUrl"], DEFAULT_START_URL);
        // An unreadable title is omitted from the wire form, not null
        assert!(json.get("title").is_none());
    }

    #[test]
    fn create_options_deserialize_camel_case() {
        let options: CreateOptions = serde_json::from_value(serde_json::json!({
            "modelName": "google/gemini-2.5-flash",
            "startUrl": "https://example.com"
        }))
        .unwrap();

        assert_eq!(options.model_name.as_deref(), Some("google/gemini-2.5-flash"));
        assert_eq!(options.start_url.as_deref(), Some("https://example.com"));

        let empty: CreateOptions = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.model_name.is_none());
        assert!(empty.start_url.is_none());
    }

    #[tokio::test]
    async fn list_reports_live_sessions() {
        let factory = Arc::new(MockFactory::new(MockClient::default));
        let registry = registry_with(factory);

        let first = registry.create(CreateOptions::default()).await.unwrap();
        let second = registry
            .create(CreateOptions {
                start_url: Some("https://example.org".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|s| s.id == first.id));
        assert!(
            listed
                .iter()
                .any(|s| s.id == second.id && s.start_url == "https://example.org")
        );

        registry.close(&first.id).await;
        assert_eq!(registry.list().len(), 1);
    }
}
