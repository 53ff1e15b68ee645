pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod injector;
pub mod matcher;
pub mod metadata;
pub mod sandbox;
pub mod store;

pub use config::Config;
pub use database::{Database, init_database};
pub use error::{HostError, StoreError};
pub use events::{ScriptEvent, ScriptEventKind};
pub use injector::{
    DocumentHost, DocumentId, InjectionEngine, InjectionReport, InstallPromptOutcome, PageBridge,
};
pub use matcher::MatchEngine;
pub use metadata::{Header, parse_header};
pub use sandbox::QuickJsHost;
pub use store::{InstallOutcome, Script, ScriptStore};
