mod common;

use coldquery::ColdQueryError;
use coldquery::session::BatchOperation;
use coldquery::session::transaction;
use common::{FakeExecutor, action_context, session_manager};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(1800);

fn op(sql: &str) -> BatchOperation {
    BatchOperation {
        sql: sql.to_string(),
        params: Vec::new(),
    }
}

#[tokio::test]
async fn test_invalid_isolation_level_touches_no_connection() {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let err = transaction::begin(&sessions, Some("SNAPSHOT")).await.unwrap_err();

    assert!(matches!(err, ColdQueryError::InvalidIsolationLevel(ref level) if level == "SNAPSHOT"));
    assert_eq!(fake.counters.acquired(), 0);
    assert!(sessions.is_empty());
    assert!(fake.session_statements().is_empty());
}

#[tokio::test]
async fn test_begin_with_isolation_level() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let id = transaction::begin(&sessions, Some("serializable")).await?;

    assert_eq!(sessions.len(), 1);
    assert!(sessions.lookup_metadata(&id).is_some());
    assert_eq!(fake.session_statements(), vec!["BEGIN ISOLATION LEVEL SERIALIZABLE"]);
    Ok(())
}

#[tokio::test]
async fn test_commit_and_rollback_close_the_session() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let committed = transaction::begin(&sessions, None).await?;
    transaction::commit(&sessions, &committed).await?;
    assert!(sessions.lookup_executor(&committed).is_none());

    let rolled_back = transaction::begin(&sessions, None).await?;
    transaction::rollback(&sessions, &rolled_back).await?;
    assert!(sessions.lookup_executor(&rolled_back).is_none());

    assert_eq!(fake.session_statements(), vec!["BEGIN", "COMMIT", "BEGIN", "ROLLBACK"]);
    assert_eq!(fake.counters.released(), 2);
    assert_eq!(fake.counters.double_release(), 0);

    let err = transaction::commit(&sessions, &committed).await.unwrap_err();
    assert!(matches!(err, ColdQueryError::InvalidSession(ref id) if *id == committed));
    Ok(())
}

#[tokio::test]
async fn test_failed_commit_still_closes_the_session() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::failing_on(&["COMMIT"]);
    let sessions = session_manager(&fake, 10, TTL);

    let id = transaction::begin(&sessions, None).await?;
    let err = transaction::commit(&sessions, &id).await.unwrap_err();

    assert_eq!(err.kind(), "engine_error");
    assert!(sessions.is_empty());
    assert_eq!(fake.counters.released(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_begin_releases_the_session() {
    let fake = FakeExecutor::failing_on(&["BEGIN"]);
    let sessions = session_manager(&fake, 10, TTL);

    let err = transaction::begin(&sessions, Some("REPEATABLE READ")).await.unwrap_err();

    assert_eq!(err.kind(), "engine_error");
    assert!(sessions.is_empty());
    assert_eq!(fake.counters.acquired(), 1);
    assert_eq!(fake.counters.released(), 1);
}

#[tokio::test]
async fn test_batch_failure_rolls_back_and_reports_index() {
    let fake = FakeExecutor::failing_on(&["THIS IS INVALID"]);
    let sessions = session_manager(&fake, 10, TTL);

    let operations = vec![op("INSERT INTO accounts (id) VALUES (1)"), op("THIS IS INVALID SQL")];
    let err = transaction::run_batch(&sessions, &operations, None).await.unwrap_err();

    match &err {
        ColdQueryError::BatchFailed { index, source } => {
            assert_eq!(*index, 1);
            assert_eq!(source.kind(), "engine_error");
        }
        other => panic!("expected a batch failure, got {other:?}"),
    }
    assert_eq!(err.code(), Some("42601"));

    assert_eq!(
        fake.session_statements(),
        vec!["BEGIN", "INSERT INTO accounts (id) VALUES (1)", "THIS IS INVALID SQL", "ROLLBACK"]
    );
    assert!(sessions.is_empty());
    assert_eq!(fake.counters.released(), 1);
    assert_eq!(fake.counters.destroyed(), 1);
}

#[tokio::test]
async fn test_batch_success_commits() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let operations = vec![op("INSERT INTO accounts (id) VALUES (1)"), op("SELECT count(*) FROM accounts")];
    let results = transaction::run_batch(&sessions, &operations, None).await?;

    assert_eq!(results.len(), 2);
    assert_eq!(results[1].row_count, 1);
    assert_eq!(fake.session_statements().last().map(String::as_str), Some("COMMIT"));
    assert!(sessions.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_empty_batch_is_rejected_before_acquiring() {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let err = transaction::run_batch(&sessions, &[], None).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_parameter");
    assert_eq!(fake.counters.acquired(), 0);
}

#[tokio::test]
async fn test_savepoint_names_are_sanitized() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);
    let id = transaction::begin(&sessions, None).await?;

    transaction::savepoint(&sessions, &id, "before_update").await?;
    transaction::rollback_to(&sessions, &id, "before_update").await?;
    transaction::release(&sessions, &id, "before_update").await?;

    let err = transaction::savepoint(&sessions, &id, "x; DROP TABLE accounts").await.unwrap_err();
    assert_eq!(err.kind(), "invalid_identifier");

    assert_eq!(
        fake.session_statements(),
        vec![
            "BEGIN",
            "SAVEPOINT \"before_update\"",
            "ROLLBACK TO SAVEPOINT \"before_update\"",
            "RELEASE SAVEPOINT \"before_update\"",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_resolve_executor_never_falls_back_to_pool() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let ctx = action_context(&fake, 10, TTL, Duration::from_secs(300));

    let err = ctx.resolve_executor(Some("no-such-session")).err().ok_or("expected an error")?;
    assert!(matches!(err, ColdQueryError::InvalidSession(ref id) if id == "no-such-session"));

    ctx.resolve_executor(None)?.execute("SELECT 1", &[json!(1)], None).await?;
    assert_eq!(fake.pool_statements(), vec!["SELECT 1"]);

    let id = transaction::begin(&ctx.sessions, None).await?;
    ctx.resolve_executor(Some(&id))?
        .execute("UPDATE accounts SET balance = 0", &[], None)
        .await?;
    assert_eq!(fake.pool_statements(), vec!["SELECT 1"]);
    assert_eq!(fake.session_statements(), vec!["BEGIN", "UPDATE accounts SET balance = 0"]);
    Ok(())
}
