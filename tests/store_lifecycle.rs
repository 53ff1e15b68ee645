use graftmonkey::database::Database;
use graftmonkey::error::StoreError;
use graftmonkey::events::ScriptEventKind;
use graftmonkey::store::{InstallOutcome, ScriptStore};

const HIGHLIGHTER: &str = "// ==UserScript==\n\
// @name Highlighter\n\
// @version 1.2\n\
// @author Jane Doe\n\
// @description Marks interesting words\n\
// @include https://example.com/*\n\
// @include https://example.org/?\n\
// ==/UserScript==\n\
log('highlighting');\n";

async fn fresh_db() -> Database {
    let db = Database::in_memory().await.expect("in-memory database");
    db.migrate().await.expect("migrations");
    db
}

#[tokio::test]
async fn install_then_read_back_round_trips() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());

    let installed = store
        .install(HIGHLIGHTER, "https://scripts.test/highlighter.user.js")
        .await
        .unwrap()
        .installed()
        .expect("well-formed script installs");

    let read_back = store.get_by_id(installed.id).await.unwrap();
    assert_eq!(read_back.name, "Highlighter");
    assert_eq!(read_back.version, "1.2");
    assert_eq!(read_back.author, "Jane Doe");
    assert_eq!(read_back.description, "Marks interesting words");
    assert_eq!(
        read_back.patterns,
        vec!["https://example.com/*", "https://example.org/?"]
    );
    assert_eq!(read_back.body, HIGHLIGHTER);
    assert_eq!(read_back.source_uri, "https://scripts.test/highlighter.user.js");
    assert!(read_back.enabled);
}

#[tokio::test]
async fn headerless_text_is_rejected_and_writes_nothing() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());

    let outcome = store
        .install("function main() {}", "https://scripts.test/x")
        .await
        .unwrap();
    assert!(matches!(outcome, InstallOutcome::Rejected));

    assert!(store.get_all().await.unwrap().is_empty());
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM script")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn script_row_is_never_visible_without_its_patterns() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());

    store
        .install(HIGHLIGHTER, "https://scripts.test/h.user.js")
        .await
        .unwrap();

    // every committed script carries all of its pattern rows
    for script in store.get_all().await.unwrap() {
        let patterns: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM include WHERE script_id = ?1")
                .bind(script.id)
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(patterns as usize, script.patterns.len());
        assert_eq!(patterns, 2);
    }
}

#[tokio::test]
async fn disable_twice_emits_exactly_one_event_pair() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());
    let script = store
        .install(HIGHLIGHTER, "https://scripts.test/h.user.js")
        .await
        .unwrap()
        .installed()
        .unwrap();

    let mut events = store.subscribe();

    store.set_enabled(script.id, false).await.unwrap();
    store.set_enabled(script.id, false).await.unwrap();

    assert_eq!(events.try_recv().unwrap().kind, ScriptEventKind::Disabling);
    assert_eq!(events.try_recv().unwrap().kind, ScriptEventKind::Disabled);
    assert!(events.try_recv().is_err(), "second disable must be silent");
}

#[tokio::test]
async fn enable_and_disable_emit_their_pre_post_pairs() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());
    let script = store
        .install(HIGHLIGHTER, "https://scripts.test/h.user.js")
        .await
        .unwrap()
        .installed()
        .unwrap();

    let mut events = store.subscribe();

    store.set_enabled(script.id, false).await.unwrap();
    store.set_enabled(script.id, true).await.unwrap();

    let kinds: Vec<_> = (0..4).map(|_| events.try_recv().unwrap().kind).collect();
    assert_eq!(
        kinds,
        vec![
            ScriptEventKind::Disabling,
            ScriptEventKind::Disabled,
            ScriptEventKind::Enabling,
            ScriptEventKind::Enabled,
        ]
    );
    assert!(store.get_by_id(script.id).await.unwrap().enabled);
}

#[tokio::test]
async fn install_emits_installed_after_commit() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());
    let mut events = store.subscribe();

    let script = store
        .install(HIGHLIGHTER, "https://scripts.test/h.user.js")
        .await
        .unwrap()
        .installed()
        .unwrap();

    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, ScriptEventKind::Installed);
    assert_eq!(event.script_id, script.id);
    assert_eq!(event.name, "Highlighter");
}

#[tokio::test]
async fn event_stream_yields_lifecycle_events() {
    use tokio_stream::StreamExt;

    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());
    let mut stream = store.event_stream();

    let script = store
        .install(HIGHLIGHTER, "https://scripts.test/h.user.js")
        .await
        .unwrap()
        .installed()
        .unwrap();

    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(event.kind, ScriptEventKind::Installed);
    assert_eq!(event.script_id, script.id);
}

#[tokio::test]
async fn uninstall_cascades_to_patterns() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());
    let script = store
        .install(HIGHLIGHTER, "https://scripts.test/h.user.js")
        .await
        .unwrap()
        .installed()
        .unwrap();

    let mut events = store.subscribe();
    store.uninstall(script.id).await.unwrap();

    assert_eq!(events.try_recv().unwrap().kind, ScriptEventKind::Uninstalling);
    assert_eq!(events.try_recv().unwrap().kind, ScriptEventKind::Uninstalled);

    assert!(matches!(
        store.get_by_id(script.id).await,
        Err(StoreError::NotFound { .. })
    ));
    let leftover: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM include")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(leftover, 0);
    assert!(store
        .get_matching_enabled("https://example.com/a/b")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());

    assert!(matches!(
        store.get_by_id(99).await,
        Err(StoreError::NotFound { id: 99 })
    ));
    assert!(matches!(
        store.set_enabled(99, false).await,
        Err(StoreError::NotFound { id: 99 })
    ));
    assert!(matches!(
        store.uninstall(99).await,
        Err(StoreError::NotFound { id: 99 })
    ));
}

#[tokio::test]
async fn source_lookup_suppresses_duplicate_installs() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());

    assert!(!store
        .has_script_from_source("https://scripts.test/h.user.js")
        .await
        .unwrap());

    store
        .install(HIGHLIGHTER, "https://scripts.test/h.user.js")
        .await
        .unwrap();

    assert!(store
        .has_script_from_source("https://scripts.test/h.user.js")
        .await
        .unwrap());
    assert!(!store
        .has_script_from_source("https://scripts.test/other.user.js")
        .await
        .unwrap());
}

#[tokio::test]
async fn ids_are_not_reused_after_uninstall() {
    let db = fresh_db().await;
    let store = ScriptStore::new(db.pool().clone());

    let first = store
        .install(HIGHLIGHTER, "https://scripts.test/a.user.js")
        .await
        .unwrap()
        .installed()
        .unwrap();
    store.uninstall(first.id).await.unwrap();

    let second = store
        .install(HIGHLIGHTER, "https://scripts.test/b.user.js")
        .await
        .unwrap()
        .installed()
        .unwrap();
    assert!(second.id > first.id);
}
