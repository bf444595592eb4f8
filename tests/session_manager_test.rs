mod common;

use coldquery::ColdQueryError;
use common::{FakeExecutor, session_manager};
use futures::future::join_all;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_session_limit_and_slot_reuse() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let mut ids = Vec::new();
    for _ in 0..10 {
        ids.push(sessions.create().await?);
    }
    assert_eq!(sessions.len(), 10);

    let err = sessions.create().await.unwrap_err();
    assert!(matches!(err, ColdQueryError::ResourceExhausted { max: 10 }));
    // The rejected create never touched the pool
    assert_eq!(fake.counters.acquired(), 10);

    assert!(sessions.close(&ids[0]).await);
    let replacement = sessions.create().await?;
    assert!(!ids.contains(&replacement));
    assert_eq!(sessions.len(), 10);

    Ok(())
}

#[tokio::test]
async fn test_double_close_releases_once() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let id = sessions.create().await?;
    assert!(sessions.close(&id).await);
    assert!(!sessions.close(&id).await);

    assert_eq!(fake.counters.released(), 1);
    assert_eq!(fake.counters.destroyed(), 1);
    assert_eq!(fake.counters.double_release(), 0);
    assert!(sessions.lookup_executor(&id).is_none());
    assert!(sessions.lookup_metadata(&id).is_none());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_expiry_then_close_releases_once() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let id = sessions.create().await?;
    tokio::time::sleep(TTL + Duration::from_secs(1)).await;
    tokio::task::yield_now().await;

    assert!(sessions.is_empty());
    assert!(sessions.lookup_executor(&id).is_none());
    assert!(!sessions.close(&id).await);

    assert_eq!(fake.counters.released(), 1);
    assert_eq!(fake.counters.destroyed(), 1);
    assert_eq!(fake.counters.double_release(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_expiry() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let id = sessions.create().await?;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(sessions.close(&id).await);

    tokio::time::sleep(TTL * 2).await;
    tokio::task::yield_now().await;

    assert_eq!(fake.counters.released(), 1);
    assert_eq!(fake.counters.double_release(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lookup_executor_slides_ttl_but_metadata_does_not() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let id = sessions.create().await?;

    tokio::time::sleep(Duration::from_secs(40)).await;
    assert!(sessions.lookup_executor(&id).is_some());

    // 80s after creation, 40s after the last access
    tokio::time::sleep(Duration::from_secs(40)).await;
    tokio::task::yield_now().await;
    let info = sessions.lookup_metadata(&id).ok_or("session should still be alive")?;
    assert_eq!(info.idle.as_secs(), 40);
    assert!(info.expires_in <= Duration::from_secs(20) && info.expires_in > Duration::from_secs(19));

    // Metadata reads never extend the deadline
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(sessions.lookup_metadata(&id).is_some());
    }
    tokio::time::sleep(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;

    assert!(sessions.lookup_metadata(&id).is_none());
    assert_eq!(fake.counters.released(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_running_statement_holds_session_open() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::sleeping_on("pg_sleep", Duration::from_secs(90));
    let sessions = session_manager(&fake, 10, TTL);

    let id = sessions.create().await?;
    let executor = sessions.lookup_executor(&id).ok_or("session should exist")?;
    let running = tokio::spawn(async move { executor.execute("SELECT pg_sleep(90)", &[], None).await });

    // The original deadline passes while the statement is still running
    tokio::time::sleep(Duration::from_secs(70)).await;
    tokio::task::yield_now().await;
    assert!(sessions.lookup_metadata(&id).is_some());
    assert_eq!(fake.counters.released(), 0);

    // Finishes at 90s; the timer restarts from there
    running.await??;
    tokio::time::sleep(Duration::from_secs(50)).await;
    tokio::task::yield_now().await;
    let info = sessions.lookup_metadata(&id).ok_or("session should outlive the statement by the TTL")?;
    assert_eq!(info.idle.as_secs(), 50);

    tokio::time::sleep(Duration::from_secs(15)).await;
    tokio::task::yield_now().await;
    assert!(sessions.lookup_metadata(&id).is_none());
    assert_eq!(fake.counters.released(), 1);
    assert_eq!(fake.counters.double_release(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_statement_still_expires() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::sleeping_on("pg_sleep", Duration::from_secs(90));
    let sessions = session_manager(&fake, 10, TTL);

    let id = sessions.create().await?;
    let executor = sessions.lookup_executor(&id).ok_or("session should exist")?;
    let running = tokio::spawn(async move { executor.execute("SELECT pg_sleep(90)", &[], None).await });

    tokio::time::sleep(Duration::from_secs(10)).await;
    running.abort();
    assert!(running.await.is_err());

    tokio::time::sleep(Duration::from_secs(65)).await;
    tokio::task::yield_now().await;
    assert!(sessions.lookup_metadata(&id).is_none());
    assert_eq!(fake.counters.released(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_creates_never_exceed_limit() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::with_acquire_delay(Duration::from_millis(10));
    let sessions = session_manager(&fake, 10, TTL);

    let outcomes = join_all((0..15).map(|_| sessions.create())).await;
    let created = outcomes.iter().filter(|o| o.is_ok()).count();
    let exhausted = outcomes
        .iter()
        .filter(|o| matches!(o, Err(ColdQueryError::ResourceExhausted { .. })))
        .count();

    assert_eq!(created, 10);
    assert_eq!(exhausted, 5);
    assert_eq!(sessions.len(), 10);

    // Every create passed the first check, the late ones gave their connection back
    assert_eq!(fake.counters.acquired(), 15);
    assert_eq!(fake.counters.destroyed(), 5);
    assert_eq!(fake.counters.double_release(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_list_reports_idle_and_remaining_time() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let first = sessions.create().await?;
    tokio::time::sleep(Duration::from_secs(15)).await;
    let second = sessions.create().await?;

    let list = sessions.list();
    assert_eq!(list.len(), 2);

    let first_summary = list.iter().find(|s| s.id == first).ok_or("first session missing")?;
    assert_eq!(first_summary.idle_seconds, 15);
    assert!((44..=45).contains(&first_summary.expires_in_seconds));

    let second_summary = list.iter().find(|s| s.id == second).ok_or("second session missing")?;
    assert_eq!(second_summary.idle_seconds, 0);
    assert!((59..=60).contains(&second_summary.expires_in_seconds));

    // Listing is read-only
    assert_eq!(sessions.lookup_metadata(&first).map(|i| i.idle.as_secs()), Some(15));

    Ok(())
}

#[tokio::test]
async fn test_close_all_releases_everything() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    for _ in 0..3 {
        sessions.create().await?;
    }
    assert_eq!(sessions.close_all().await, 3);
    assert!(sessions.is_empty());
    assert_eq!(fake.counters.released(), 3);
    assert_eq!(sessions.close_all().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_session_executor_rejects_nested_sessions() -> Result<(), Box<dyn std::error::Error>> {
    let fake = FakeExecutor::new();
    let sessions = session_manager(&fake, 10, TTL);

    let id = sessions.create().await?;
    let executor = sessions.lookup_executor(&id).ok_or("session missing")?;
    let err = executor.create_session().await.err().ok_or("nested session should fail")?;
    assert_eq!(err.kind(), "not_supported");

    Ok(())
}
