//! Shared configuration constants for hosted browser sessions
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

/// Default model identifier passed to the provider when the caller omits one
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Default navigation target for new sessions when no start URL is given.
///
/// Also serves as the final viewer-URL fallback when neither the provider
/// debug endpoint nor page introspection yield a usable link.
pub const DEFAULT_START_URL: &str = "https://www.google.com";

/// Title reported alongside the fallback viewer URL
pub const DEFAULT_PAGE_TITLE: &str = "New session";

/// Placeholder URL chromium reports before any real navigation
pub const BLANK_PAGE_URL: &str = "about:blank";

/// Base URL of the hosted automation provider's session API
pub const DEFAULT_API_BASE: &str = "https://api.browsercloud.dev";

/// Query parameter appended to provider debug links so the hosted viewer
/// renders its navigation bar
pub const VIEWER_NAVBAR_PARAM: (&str, &str) = ("navbar", "true");

/// Environment variable holding the provider API key
pub const ENV_API_KEY: &str = "AUTOMATION_API_KEY";

/// Environment variable holding the provider project identifier
pub const ENV_PROJECT_ID: &str = "AUTOMATION_PROJECT_ID";

/// Environment variable holding the API key for the model backing the
/// provider-side agent runtime
pub const ENV_MODEL_API_KEY: &str = "MODEL_API_KEY";

/// Environment variable overriding [`DEFAULT_API_BASE`]
pub const ENV_API_BASE: &str = "AUTOMATION_API_URL";
