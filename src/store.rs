use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::events::{EventBus, ScriptEvent, ScriptEventKind};
use crate::metadata;

const SCRIPT_COLUMNS: &str = "id, name, version, author, description, source_uri, enabled, body";

/// One installed user script, as stored in the registry.
///
/// `id` is assigned by the store at install time and never changes or gets
/// reused. `patterns` is the ordered list of URL globs from the script's
/// `@include` tags; a script with no patterns is legal but can never match.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Script {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub source_uri: String,
    pub enabled: bool,
    pub body: String,
    #[sqlx(skip)]
    pub patterns: Vec<String>,
}

/// Result of an install attempt.
///
/// `Rejected` means the text carried no user-script header; that is the
/// common case for arbitrary documents and deliberately not an error.
#[derive(Debug)]
pub enum InstallOutcome {
    Installed(Script),
    Rejected,
}

impl InstallOutcome {
    /// The installed script, when there is one.
    pub fn installed(self) -> Option<Script> {
        match self {
            InstallOutcome::Installed(script) => Some(script),
            InstallOutcome::Rejected => None,
        }
    }
}

/// Durable registry of user scripts and their match patterns.
///
/// All writes are atomic per script (the row plus its pattern rows), and
/// every lifecycle mutation is announced on the event bus so listeners see
/// a consistent pre/post pair around each state change.
pub struct ScriptStore {
    pool: SqlitePool,
    events: EventBus,
}

impl ScriptStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            events: EventBus::new(),
        }
    }

    /// Register a lifecycle listener.
    pub fn subscribe(&self) -> broadcast::Receiver<ScriptEvent> {
        self.events.subscribe()
    }

    /// Lifecycle notifications as a `Stream`.
    pub fn event_stream(&self) -> BroadcastStream<ScriptEvent> {
        self.events.stream()
    }

    /// Fetch a script by id, patterns included.
    pub async fn get_by_id(&self, id: i64) -> Result<Script, StoreError> {
        let query = format!("SELECT {SCRIPT_COLUMNS} FROM script WHERE id = ?1");
        let mut script = sqlx::query_as::<_, Script>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { id })?;
        script.patterns = self.patterns_for(script.id).await?;
        Ok(script)
    }

    /// Fetch every script in the registry. Order is not significant.
    pub async fn get_all(&self) -> Result<Vec<Script>, StoreError> {
        let query = format!("SELECT {SCRIPT_COLUMNS} FROM script");
        let mut scripts = sqlx::query_as::<_, Script>(&query)
            .fetch_all(&self.pool)
            .await?;
        for script in &mut scripts {
            script.patterns = self.patterns_for(script.id).await?;
        }
        Ok(scripts)
    }

    /// Every enabled script with at least one pattern matching `url`.
    ///
    /// Glob evaluation is delegated to SQLite's `GLOB`: `*` matches any
    /// sequence, `?` exactly one character, case-sensitively, against the
    /// full URL string. Scripts are de-duplicated by id and ordered by
    /// their first matching pattern row, which is declaration order.
    pub async fn get_matching_enabled(&self, url: &str) -> Result<Vec<Script>, StoreError> {
        let query = format!(
            "SELECT s.{} FROM script s \
             JOIN include i ON i.script_id = s.id \
             WHERE ?1 GLOB i.pattern AND s.enabled = 1 \
             GROUP BY s.id \
             ORDER BY MIN(i.rowid)",
            SCRIPT_COLUMNS.replace(", ", ", s.")
        );
        let mut scripts = sqlx::query_as::<_, Script>(&query)
            .bind(url)
            .fetch_all(&self.pool)
            .await?;
        for script in &mut scripts {
            script.patterns = self.patterns_for(script.id).await?;
        }
        Ok(scripts)
    }

    /// Whether any installed script came from `url`. Used to suppress
    /// duplicate install prompts.
    pub async fn has_script_from_source(&self, url: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM script WHERE source_uri = ?1")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Parse `raw` and, when it is a user script, persist it.
    ///
    /// The script row and its pattern rows are written in one transaction:
    /// concurrent readers never observe a script without its patterns. The
    /// `Installed` event fires only after commit.
    pub async fn install(&self, raw: &str, source_url: &str) -> Result<InstallOutcome, StoreError> {
        let Some(header) = metadata::parse_header(raw) else {
            debug!("Install rejected, no user script header in text from {}", source_url);
            return Ok(InstallOutcome::Rejected);
        };

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO script (name, version, author, description, source_uri, enabled, body) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        )
        .bind(&header.name)
        .bind(&header.version)
        .bind(&header.author)
        .bind(&header.description)
        .bind(source_url)
        .bind(raw)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for pattern in &header.includes {
            sqlx::query("INSERT INTO include (script_id, pattern) VALUES (?1, ?2)")
                .bind(id)
                .bind(pattern)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let script = Script {
            id,
            name: header.name,
            version: header.version,
            author: header.author,
            description: header.description,
            source_uri: source_url.to_string(),
            enabled: true,
            body: raw.to_string(),
            patterns: header.includes,
        };

        info!(
            "Installed user script '{}' (id {}) from {} with {} patterns",
            script.name,
            script.id,
            source_url,
            script.patterns.len()
        );
        self.events.emit(ScriptEventKind::Installed, script.id, &script.name);

        Ok(InstallOutcome::Installed(script))
    }

    /// Enable or disable a script.
    ///
    /// A write that would not change the state is a no-op and emits no
    /// events; otherwise the pre event goes out before the update and the
    /// post event after it.
    pub async fn set_enabled(&self, id: i64, value: bool) -> Result<(), StoreError> {
        let (name, enabled): (String, bool) =
            sqlx::query_as("SELECT name, enabled FROM script WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound { id })?;

        if enabled == value {
            debug!("Script {} already {}, nothing to do", id, state_word(value));
            return Ok(());
        }

        let (pre, post) = if value {
            (ScriptEventKind::Enabling, ScriptEventKind::Enabled)
        } else {
            (ScriptEventKind::Disabling, ScriptEventKind::Disabled)
        };

        self.events.emit(pre, id, &name);
        sqlx::query("UPDATE script SET enabled = ?1 WHERE id = ?2")
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.events.emit(post, id, &name);

        info!("Script '{}' (id {}) {}", name, id, state_word(value));
        Ok(())
    }

    /// Remove a script and all of its patterns.
    ///
    /// The delete cascades to the pattern rows inside a single statement,
    /// so no reader ever sees a half-removed script. Irreversible.
    pub async fn uninstall(&self, id: i64) -> Result<(), StoreError> {
        let name: String = sqlx::query_scalar("SELECT name FROM script WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { id })?;

        self.events.emit(ScriptEventKind::Uninstalling, id, &name);
        sqlx::query("DELETE FROM script WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.events.emit(ScriptEventKind::Uninstalled, id, &name);

        info!("Uninstalled script '{}' (id {})", name, id);
        Ok(())
    }

    async fn patterns_for(&self, id: i64) -> Result<Vec<String>, StoreError> {
        let patterns =
            sqlx::query_scalar("SELECT pattern FROM include WHERE script_id = ?1 ORDER BY rowid")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(patterns)
    }
}

fn state_word(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}
