use rquickjs::{Context, Function, Object, Runtime};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::HostError;
use crate::injector::{ContextId, DocumentHost, PageBridge};

/// Shared collector for `log()` calls made by injected scripts.
pub type LogSink = Arc<Mutex<Vec<String>>>;

/// Reference `DocumentHost` backed by QuickJS.
///
/// Every created context gets its own fresh runtime, so injected scripts
/// share no globals with each other or with the engine. The bridge is
/// bound as plain globals: a `location` object, a `document` object and a
/// `log()` host function. This host is meant for tests and the CLI; the
/// isolation it provides is QuickJS's, nothing stronger.
pub struct QuickJsHost {
    title: String,
    body_text: String,
    accept_install: bool,
    log_sink: Option<LogSink>,
    contexts: Vec<(Runtime, Context)>,
}

impl QuickJsHost {
    pub fn new() -> Self {
        Self {
            title: String::new(),
            body_text: String::new(),
            accept_install: false,
            log_sink: None,
            contexts: Vec::new(),
        }
    }

    /// Document title exposed to injected scripts.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Text content reported for this document (what an install reads).
    pub fn with_body_text(mut self, text: impl Into<String>) -> Self {
        self.body_text = text.into();
        self
    }

    /// Preset answer for install prompts; this host is non-interactive.
    pub fn accepting_installs(mut self, accept: bool) -> Self {
        self.accept_install = accept;
        self
    }

    /// Collect script `log()` output into `sink` as well as the trace log.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }
}

impl Default for QuickJsHost {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentHost for QuickJsHost {
    fn create_context(&mut self, bridge: &PageBridge) -> Result<ContextId, HostError> {
        let runtime = Runtime::new()
            .map_err(|e| HostError::ContextCreation(format!("runtime new: {}", e)))?;
        let context = Context::full(&runtime)
            .map_err(|e| HostError::ContextCreation(format!("context create: {}", e)))?;

        let url = bridge.url.clone();
        let title = self.title.clone();
        let sink = self.log_sink.clone();

        context
            .with(|ctx| -> Result<(), rquickjs::Error> {
                let global = ctx.globals();

                let location = Object::new(ctx.clone())?;
                location.set("href", url.clone())?;
                global.set("location", location)?;

                let document = Object::new(ctx.clone())?;
                document.set("URL", url.clone())?;
                document.set("title", title)?;
                global.set("document", document)?;

                let log_url = url.clone();
                let log = Function::new(
                    ctx.clone(),
                    move |_c: rquickjs::Ctx<'_>, msg: String| -> Result<(), rquickjs::Error> {
                        debug!("[{}] {}", log_url, msg);
                        if let Some(sink) = &sink {
                            if let Ok(mut messages) = sink.lock() {
                                messages.push(msg);
                            }
                        }
                        Ok(())
                    },
                )?;
                global.set("log", log)?;

                Ok(())
            })
            .map_err(|e| HostError::ContextCreation(format!("bridge binding: {}", e)))?;

        self.contexts.push((runtime, context));
        Ok((self.contexts.len() - 1) as ContextId)
    }

    fn evaluate(&mut self, context: ContextId, source: &str) -> Result<(), HostError> {
        let Some((_runtime, ctx)) = self.contexts.get(context as usize) else {
            return Err(HostError::Evaluation(format!("unknown context {}", context)));
        };
        ctx.with(|ctx| ctx.eval::<(), _>(source))
            .map_err(|e| HostError::Evaluation(format!("{}", e)))
    }

    fn confirm(&mut self, message: &str) -> bool {
        info!(
            "Install prompt: {} -> {}",
            message,
            if self.accept_install { "yes" } else { "no" }
        );
        self.accept_install
    }

    fn body_text(&self) -> String {
        self.body_text.clone()
    }
}
