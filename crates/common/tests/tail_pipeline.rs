//! End-to-end tests of the tail engine with the platform watcher and a real
//! `tail -F` follower.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use common::prelude::*;
use tempfile::TempDir;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);
const QUIET_PERIOD: Duration = Duration::from_millis(750);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

async fn start_engine() -> Result<(Engine, TempDir)> {
    init_tracing();
    let base = tempfile::tempdir()?;
    let mut config = EngineConfig::new(base.path());
    config.stop_timeout = Duration::from_secs(2);
    let engine = Engine::start(config).await?;
    Ok((engine, base))
}

fn append(path: &Path, line: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Wait until the supervisor follows `path`
async fn wait_tracked(engine: &Engine, path: &Path) -> Result<()> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while !engine.supervisor().is_tracked(path) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .with_context(|| format!("{} was never tailed", path.display()))
}

async fn next_line(sub: &mut Subscription) -> Result<String> {
    let event = tokio::time::timeout(EVENT_TIMEOUT, sub.recv())
        .await
        .context("timed out waiting for an event")?
        .context("broadcaster closed")?;
    Ok(event.line.clone())
}

/// Wait for an event carrying `line`, skipping anything else
async fn wait_for_line(sub: &mut Subscription, line: &str) -> Result<()> {
    loop {
        if next_line(sub).await? == line {
            return Ok(());
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lines_arrive_in_order() -> Result<()> {
    let (engine, _base) = start_engine().await?;
    let volume = engine.registry().create("logs").await?;
    let mut sub = engine.broadcaster().subscribe();

    let file = volume.path.join("app.log");
    std::fs::write(&file, b"")?;
    wait_tracked(&engine, &file).await?;

    for line in ["a", "b", "c"] {
        append(&file, line)?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let mut lines = Vec::new();
    for _ in 0..3 {
        lines.push(next_line(&mut sub).await?);
    }
    assert_eq!(lines, vec!["a", "b", "c"]);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_subscribers_see_the_same_event() -> Result<()> {
    let (engine, _base) = start_engine().await?;
    let volume = engine.registry().create("logs").await?;
    let mut first = engine.broadcaster().subscribe();
    let mut second = engine.broadcaster().subscribe();

    let file = volume.path.join("app.log");
    std::fs::write(&file, b"")?;
    wait_tracked(&engine, &file).await?;
    append(&file, "shared")?;

    let a = tokio::time::timeout(EVENT_TIMEOUT, first.recv()).await?.unwrap();
    let b = tokio::time::timeout(EVENT_TIMEOUT, second.recv()).await?.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.file, "app.log");
    assert_eq!(a.line, "shared");

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recreated_file_is_tailed_again() -> Result<()> {
    let (engine, _base) = start_engine().await?;
    let volume = engine.registry().create("logs").await?;
    let mut sub = engine.broadcaster().subscribe();

    let file = volume.path.join("app.log");
    std::fs::write(&file, b"")?;
    wait_tracked(&engine, &file).await?;
    append(&file, "before")?;
    wait_for_line(&mut sub, "before").await?;

    std::fs::remove_file(&file)?;
    std::fs::write(&file, b"")?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    wait_tracked(&engine, &file).await?;

    append(&file, "after")?;
    wait_for_line(&mut sub, "after").await?;

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rotated_file_is_not_replayed() -> Result<()> {
    let (engine, _base) = start_engine().await?;
    let volume = engine.registry().create("logs").await?;
    let mut sub = engine.broadcaster().subscribe();

    let file = volume.path.join("app.log");
    std::fs::write(&file, b"")?;
    wait_tracked(&engine, &file).await?;
    for i in 0..50 {
        append(&file, &format!("old{}", i))?;
    }
    wait_for_line(&mut sub, "old49").await?;

    let rotated = volume.path.join("app.log.1");
    std::fs::rename(&file, &rotated)?;
    wait_tracked(&engine, &rotated).await?;
    assert!(!engine.supervisor().is_tracked(&file));

    if let Ok(Some(event)) = tokio::time::timeout(QUIET_PERIOD, sub.recv()).await {
        panic!("rotation replayed {}: {}", event.file, event.line);
    }

    append(&rotated, "fresh")?;
    let event = tokio::time::timeout(EVENT_TIMEOUT, sub.recv())
        .await?
        .context("broadcaster closed")?;
    assert_eq!(event.file, "app.log.1");
    assert_eq!(event.line, "fresh");

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_volume_lifecycle_scenario() -> Result<()> {
    let (engine, base) = start_engine().await?;
    let volume = engine.registry().create("logs").await?;
    assert_eq!(
        volume.path,
        base.path().join("volumes").join("logs").join("_data")
    );
    let mut sub = engine.broadcaster().subscribe();

    let file = volume.path.join("app.log");
    append(&file, "hello")?;

    let event = tokio::time::timeout(EVENT_TIMEOUT, sub.recv())
        .await?
        .context("broadcaster closed")?;
    assert_eq!(event.file, "app.log");
    assert_eq!(event.line, "hello");
    let json: serde_json::Value = serde_json::from_str(&event.to_json()?)?;
    assert_eq!(json["file"], "app.log");
    assert_eq!(json["line"], "hello");

    // keep a handle so the old inode can still be written after removal
    let mut handle = std::fs::OpenOptions::new().append(true).open(&file)?;

    engine.registry().remove("logs").await?;
    assert!(!base.path().join("volumes").join("logs").exists());
    assert!(engine.supervisor().tracked().is_empty());

    writeln!(handle, "ghost")?;
    handle.flush()?;
    assert!(
        tokio::time::timeout(QUIET_PERIOD, sub.recv()).await.is_err(),
        "received an event after the volume was removed"
    );

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_rewatches_existing_volumes() -> Result<()> {
    init_tracing();
    let base = tempfile::tempdir()?;

    let engine = Engine::start(EngineConfig::new(base.path())).await?;
    engine.registry().create("logs").await?;
    engine.shutdown().await;
    drop(engine);

    let engine = Engine::start(EngineConfig::new(base.path())).await?;
    let volume = engine
        .registry()
        .lookup("logs")
        .await
        .context("volume was not rediscovered")?;
    assert!(engine.supervisor().tracked().is_empty());

    let mut sub = engine.broadcaster().subscribe();
    append(&volume.path.join("fresh.log"), "after restart")?;
    wait_for_line(&mut sub, "after restart").await?;

    engine.shutdown().await;
    Ok(())
}
