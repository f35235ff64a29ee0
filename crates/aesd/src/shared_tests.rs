// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;

fn ring(mode: LockMode) -> RingHandle {
    Arc::new(SharedRing::new(4, mode))
}

#[tokio::test]
async fn exclusive_exposes_ring_operations() {
    check_ring_operations(LockMode::Exclusive).await;
}

#[tokio::test]
async fn shared_exposes_ring_operations() {
    check_ring_operations(LockMode::SharedRead).await;
}

async fn check_ring_operations(mode: LockMode) {
    let ring = ring(mode);
    let cancel = CancellationToken::new();
    assert_eq!(ring.mode(), mode);

    for cmd in ["a\n", "bb\n", "ccc\n", "dddd\n"] {
        assert_eq!(ring.insert(Bytes::from(cmd), &cancel).await, Ok(None));
    }
    assert_eq!(ring.total_size(&cancel).await, Ok(14));

    let loc = ring.find_entry_for_offset(2, &cancel).await;
    assert!(matches!(loc, Ok(Some(EntryLocation { intra_offset: 0, size: 3, .. }))));
    assert_eq!(ring.find_entry_for_offset(1000, &cancel).await, Ok(None));

    let evicted = ring.insert(Bytes::from_static(b"e\n"), &cancel).await;
    assert_eq!(evicted, Ok(Some(Bytes::from_static(b"a\n"))));
    assert_eq!(ring.resolve_seek(3, 1, &cancel).await, Ok(13));
    assert!(ring.resolve_seek(10, 0, &cancel).await.is_err());
    assert_eq!(ring.iterate_live(&cancel).await.map(|ids| ids.len()), Ok(4));

    let tail = ring.read_from(10, &cancel).await;
    assert_eq!(tail, Ok(vec![Bytes::from_static(b"d\n"), Bytes::from_static(b"e\n")]));
}

#[tokio::test]
async fn cancelled_acquisition_leaves_ring_untouched() {
    let ring = ring(LockMode::SharedRead);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(ring.insert(Bytes::from_static(b"x\n"), &cancel).await, Err(RingError::Interrupted));
    assert_eq!(ring.total_size(&CancellationToken::new()).await, Ok(0));
}

#[tokio::test]
async fn waiting_writer_is_interrupted() -> anyhow::Result<()> {
    let ring = ring(LockMode::Exclusive);
    let held = ring.read().await;

    let cancel = CancellationToken::new();
    let waiter = {
        let ring = Arc::clone(&ring);
        let cancel = cancel.clone();
        tokio::spawn(async move { ring.insert(Bytes::from_static(b"x\n"), &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    assert_eq!(waiter.await?, Err(RingError::Interrupted));
    drop(held);
    assert_eq!(ring.total_size(&CancellationToken::new()).await, Ok(0));
    Ok(())
}

#[tokio::test]
async fn shared_mode_allows_overlapping_readers() -> anyhow::Result<()> {
    let ring = ring(LockMode::SharedRead);
    let first = ring.read().await;
    let second = tokio::time::timeout(Duration::from_millis(200), ring.read()).await;
    assert!(second.is_ok(), "second reader blocked");
    drop(first);
    Ok(())
}

#[tokio::test]
async fn exclusive_mode_serializes_readers() {
    let ring = ring(LockMode::Exclusive);
    let first = ring.read().await;
    let second = tokio::time::timeout(Duration::from_millis(50), ring.read()).await;
    assert!(second.is_err(), "second reader should wait");
    drop(first);
}

#[tokio::test]
async fn aborted_writer_releases_lock() -> anyhow::Result<()> {
    let ring = ring(LockMode::SharedRead);
    let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
    let task = {
        let ring = Arc::clone(&ring);
        tokio::spawn(async move {
            let _guard = ring.write().await;
            let _ = locked_tx.send(());
            std::future::pending::<()>().await;
        })
    };
    locked_rx.await?;
    task.abort();
    let _ = task.await;

    let acquired = tokio::time::timeout(Duration::from_secs(1), ring.write()).await;
    assert!(acquired.is_ok(), "lock still held after abort");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exclusive_concurrent_inserts_never_tear() {
    check_concurrent_inserts(LockMode::Exclusive).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_concurrent_inserts_never_tear() {
    check_concurrent_inserts(LockMode::SharedRead).await;
}

async fn check_concurrent_inserts(mode: LockMode) {
    let ring = Arc::new(SharedRing::new(8, mode));
    let mut writers = Vec::new();
    for w in 0..8u8 {
        let ring = Arc::clone(&ring);
        writers.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let mut evicted = 0usize;
            for i in 0..50u8 {
                let cmd = Bytes::from(vec![b'a' + w, i, b'\n']);
                if let Ok(Some(_)) = ring.insert(cmd, &cancel).await {
                    evicted += 1;
                }
            }
            evicted
        }));
    }

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let ring = Arc::clone(&ring);
            tokio::spawn(async move {
                for _ in 0..100 {
                    let guard = ring.read().await;
                    let sum: u64 = guard.iter_live().map(|(_, e)| e.size()).sum();
                    assert_eq!(sum, guard.total_size());
                    assert!(guard.iter_live().all(|(_, e)| e.size() == 3));
                    drop(guard);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let mut evicted = 0;
    for w in writers {
        evicted += w.await.unwrap_or(0);
    }
    for r in readers {
        assert!(r.await.is_ok());
    }

    // 400 inserts into 8 slots: everything but the last 8 was handed back once.
    assert_eq!(evicted, 400 - 8);
    assert_eq!(ring.total_size(&CancellationToken::new()).await, Ok(24));
    assert_eq!(ring.teardown().await, 8);
    assert_eq!(ring.total_size(&CancellationToken::new()).await, Ok(0));
}

#[test]
fn lock_mode_parses() -> anyhow::Result<()> {
    assert_eq!("shared".parse::<LockMode>()?, LockMode::SharedRead);
    assert_eq!("Exclusive".parse::<LockMode>()?, LockMode::Exclusive);
    crate::assert_err_contains!("spin".parse::<LockMode>(), "invalid lock mode");
    Ok(())
}
