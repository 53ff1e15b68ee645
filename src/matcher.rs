use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::error::StoreError;
use crate::store::{Script, ScriptStore};

/// Decides which scripts apply to a navigated document.
///
/// Matching itself (glob semantics, enabled-only, de-duplication) lives in
/// the store's query; this layer owns URL normalization and is the seam
/// where future rules like exclude-patterns would go.
pub struct MatchEngine {
    store: Arc<ScriptStore>,
}

impl MatchEngine {
    pub fn new(store: Arc<ScriptStore>) -> Self {
        Self { store }
    }

    /// The enabled scripts whose patterns match `url`, in pattern
    /// declaration order, each script at most once.
    pub async fn scripts_for_navigation(&self, url: &str) -> Result<Vec<Script>, StoreError> {
        let normalized = normalize_url(url);
        let scripts = self.store.get_matching_enabled(&normalized).await?;
        debug!("{} script(s) match {}", scripts.len(), normalized);
        Ok(scripts)
    }
}

/// Normalize a navigation URL to its canonical string form.
///
/// Patterns are matched against this form, so `HTTPS://Example.COM` and
/// `https://example.com/` land on the same string. Unparsable input is
/// matched as-is rather than dropped.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => url.to_string(),
        Err(_) => raw.to_string(),
    }
}
