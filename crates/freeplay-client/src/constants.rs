//! Freeplay upstream constants
//!
//! Endpoint paths, browser identity headers, and the fixed sampling parameters
//! attached to every completion call. None of these are secrets; the session
//! credentials live in the account store.

/// Production Freeplay web application origin
pub const FREEPLAY_BASE_URL: &str = "https://app.freeplay.ai";

/// Billing endpoint (relative to the base URL) used for balance probes
pub const BILLING_PATH: &str = "/app_data/settings/billing";

/// Feature-usage entry whose limit/value pair yields the remaining balance
pub const CREDITS_FEATURE_NAME: &str = "Freeplay credits";

/// Body marker the completion endpoint returns when the project is gone
pub const PATH_NOT_FOUND_MARKER: &str = "Path Not Found";

/// Browser user agent the web application expects
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";

/// Sampling temperature sent with every completion (not caller-configurable)
pub const TEMPERATURE: f64 = 0.08;

/// Nucleus sampling value sent with every completion
pub const TOP_P: f64 = 0.14;

/// Top-k value sent with every completion
pub const TOP_K: u64 = 1;

/// Multipart field carrying the serialized completion request
pub const JSON_DATA_FIELD: &str = "json_data";

/// Completion endpoint path for a project. The id is percent-encoded as a
/// single path segment.
pub fn completions_path(project_id: &str) -> String {
    format!(
        "/app_data/projects/{}/llm-completions",
        urlencoding::encode(project_id)
    )
}

/// Cookie header value authenticating a session.
pub fn session_cookie(session_id: &str) -> String {
    format!("session={session_id}")
}
