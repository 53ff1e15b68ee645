use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};
use url::Url;

use crate::error::HostError;
use crate::matcher::{self, MatchEngine};
use crate::store::{InstallOutcome, Script, ScriptStore};

/// Handle for one navigated document, assigned by the host integration.
pub type DocumentId = u64;

/// Handle for one isolated execution context, assigned by the host.
pub type ContextId = u64;

/// Path suffix marking a document whose content is itself a user script.
pub const INSTALLABLE_SUFFIX: &str = ".user.js";

/// Prompt shown before installing an installable document.
pub const INSTALL_PROMPT: &str = "Do you want to install this user script?";

const DOCUMENTS_POISONED: &str = "document table mutex poisoned";

/// Page data bound into every isolated context created for a document.
#[derive(Debug, Clone)]
pub struct PageBridge {
    pub url: String,
}

/// Capability handle for one navigated document.
///
/// Stands in for whatever isolation primitive the host environment has;
/// the engine only ever creates contexts, evaluates source in them, asks
/// the user a yes/no question, and reads the document text. Nothing here
/// lets an injected script reach back into the engine.
#[cfg_attr(test, mockall::automock)]
pub trait DocumentHost {
    /// Create a fresh isolated execution context with the bridge bound in.
    fn create_context(&mut self, bridge: &PageBridge) -> Result<ContextId, HostError>;

    /// Evaluate script source inside a previously created context.
    fn evaluate(&mut self, context: ContextId, source: &str) -> Result<(), HostError>;

    /// Ask the user a yes/no question.
    fn confirm(&mut self, message: &str) -> bool;

    /// The text content of the document.
    fn body_text(&self) -> String;
}

/// What `document_created` decided for a document.
#[derive(Debug, Clone, Copy)]
pub struct NavigationDecision {
    pub matched: usize,
    pub install_candidate: bool,
}

/// Outcome of one injection pass over a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectionReport {
    pub injected: usize,
    pub failed: usize,
}

/// Outcome of the install prompt path on document load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPromptOutcome {
    /// The document was no install candidate (or is gone).
    NotCandidate,
    /// The user said no.
    Declined,
    /// The user said yes but the text carries no user-script header.
    Rejected,
    /// The user said yes and the store could not persist the script.
    Failed,
    /// Installed, with the new script's id.
    Installed(i64),
}

enum InjectionPhase {
    Matched(Vec<Script>),
    NoMatch,
    Injected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallPhase {
    NotCandidate,
    Candidate,
    Installed,
    Declined,
}

struct DocumentState {
    url: String,
    host: Box<dyn DocumentHost>,
    injection: InjectionPhase,
    install: InstallPhase,
}

/// Per-navigation orchestrator.
///
/// Driven by the host integration's document signals: `document_created`,
/// `content_ready`, `document_loaded`, `document_destroyed`. Execution is
/// always deferred to `content_ready` so script bodies see a populated
/// document, and a document torn down before that point runs nothing.
pub struct InjectionEngine {
    matcher: MatchEngine,
    store: Arc<ScriptStore>,
    documents: Mutex<HashMap<DocumentId, DocumentState>>,
}

impl InjectionEngine {
    pub fn new(matcher: MatchEngine, store: Arc<ScriptStore>) -> Self {
        Self {
            matcher,
            store,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// A document was created. Decides which scripts will run at content
    /// ready and whether the document is an install candidate.
    ///
    /// Registry faults are logged and degrade to "no matches" - nothing in
    /// this path may abort the navigation.
    pub async fn document_created(
        &self,
        doc: DocumentId,
        url: &str,
        host: Box<dyn DocumentHost>,
    ) -> NavigationDecision {
        let normalized = matcher::normalize_url(url);

        let scripts = match self.matcher.scripts_for_navigation(&normalized).await {
            Ok(scripts) => scripts,
            Err(e) => {
                error!("Match query failed for {}: {}", normalized, e);
                Vec::new()
            }
        };

        let install_candidate = is_installable_url(&normalized)
            && !self.known_source(&normalized).await;

        let decision = NavigationDecision {
            matched: scripts.len(),
            install_candidate,
        };
        debug!(
            "Document {} created for {}: {} match(es), install candidate: {}",
            doc, normalized, decision.matched, decision.install_candidate
        );

        let state = DocumentState {
            url: normalized,
            host,
            injection: if scripts.is_empty() {
                InjectionPhase::NoMatch
            } else {
                InjectionPhase::Matched(scripts)
            },
            install: if install_candidate {
                InstallPhase::Candidate
            } else {
                InstallPhase::NotCandidate
            },
        };
        self.documents
            .lock()
            .expect(DOCUMENTS_POISONED)
            .insert(doc, state);

        decision
    }

    /// DOM parsing finished; run the matched scripts now.
    ///
    /// Each script gets its own fresh context and is evaluated wrapped so
    /// top-level `return` is legal. One script throwing is logged and never
    /// stops the scripts after it. The continuation is one-shot: a second
    /// content-ready signal for the same document does nothing.
    pub fn content_ready(&self, doc: DocumentId) -> InjectionReport {
        let mut documents = self.documents.lock().expect(DOCUMENTS_POISONED);
        let Some(state) = documents.get_mut(&doc) else {
            debug!("Content ready for unknown or destroyed document {}", doc);
            return InjectionReport::default();
        };

        let scripts = match std::mem::replace(&mut state.injection, InjectionPhase::Injected) {
            InjectionPhase::Matched(scripts) => scripts,
            phase => {
                state.injection = phase;
                return InjectionReport::default();
            }
        };

        let bridge = PageBridge {
            url: state.url.clone(),
        };
        let mut report = InjectionReport::default();
        for script in &scripts {
            debug!("Injecting '{}' into document {}", script.name, doc);
            match inject_one(state.host.as_mut(), &bridge, script) {
                Ok(()) => report.injected += 1,
                Err(e) => {
                    error!("Exception in injected script '{}': {}", script.name, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Document {}: injected {} script(s), {} failed",
            doc, report.injected, report.failed
        );
        report
    }

    /// The document's load event fired; drive the install prompt if the
    /// document is an install candidate.
    pub async fn document_loaded(&self, doc: DocumentId) -> InstallPromptOutcome {
        // prompt and text capture happen under the lock; the write does not
        let (url, text) = {
            let mut documents = self.documents.lock().expect(DOCUMENTS_POISONED);
            let Some(state) = documents.get_mut(&doc) else {
                return InstallPromptOutcome::NotCandidate;
            };
            if state.install != InstallPhase::Candidate {
                return InstallPromptOutcome::NotCandidate;
            }
            if !state.host.confirm(INSTALL_PROMPT) {
                state.install = InstallPhase::Declined;
                info!("Install declined for {}", state.url);
                return InstallPromptOutcome::Declined;
            }
            (state.url.clone(), state.host.body_text())
        };

        match self.store.install(&text, &url).await {
            Ok(InstallOutcome::Installed(script)) => {
                self.set_install_phase(doc, InstallPhase::Installed);
                info!("Installed '{}' from document {}", script.name, doc);
                InstallPromptOutcome::Installed(script.id)
            }
            Ok(InstallOutcome::Rejected) => {
                self.set_install_phase(doc, InstallPhase::Declined);
                debug!("Document {} was accepted for install but has no header", doc);
                InstallPromptOutcome::Rejected
            }
            Err(e) => {
                self.set_install_phase(doc, InstallPhase::Declined);
                error!("Install from {} failed: {}", url, e);
                InstallPromptOutcome::Failed
            }
        }
    }

    /// The document is gone. Any pending injection is discarded without
    /// executing; later signals for this id are ignored.
    pub fn document_destroyed(&self, doc: DocumentId) {
        let removed = self
            .documents
            .lock()
            .expect(DOCUMENTS_POISONED)
            .remove(&doc);
        if let Some(state) = removed {
            if matches!(state.injection, InjectionPhase::Matched(_)) {
                debug!(
                    "Discarding pending injection for destroyed document {} ({})",
                    doc, state.url
                );
            }
        }
    }

    async fn known_source(&self, url: &str) -> bool {
        match self.store.has_script_from_source(url).await {
            Ok(known) => known,
            Err(e) => {
                // a broken registry must not trigger install prompts
                error!("Source lookup failed for {}: {}", url, e);
                true
            }
        }
    }

    fn set_install_phase(&self, doc: DocumentId, phase: InstallPhase) {
        if let Some(state) = self
            .documents
            .lock()
            .expect(DOCUMENTS_POISONED)
            .get_mut(&doc)
        {
            state.install = phase;
        }
    }
}

fn inject_one(
    host: &mut dyn DocumentHost,
    bridge: &PageBridge,
    script: &Script,
) -> Result<(), HostError> {
    let context = host.create_context(bridge)?;
    host.evaluate(context, &wrap_body(&script.body))
}

/// Wrap a script body so top-level `return` is legal and the body shares
/// nothing with the engine's own scope.
pub(crate) fn wrap_body(body: &str) -> String {
    format!("(function(){{\n{body}\n}})();")
}

fn is_installable_url(normalized: &str) -> bool {
    match Url::parse(normalized) {
        Ok(url) => url.path().ends_with(INSTALLABLE_SUFFIX),
        Err(_) => normalized.ends_with(INSTALLABLE_SUFFIX),
    }
}
