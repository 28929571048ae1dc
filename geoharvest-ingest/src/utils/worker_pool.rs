//! Bounded fan-out over a batch of items
//!
//! Shared by the asset fetcher and the feature enricher. At most
//! `concurrency` items run at once, each in its own task. Results come back
//! through a channel sized to the batch so workers never block on send.
//!
//! Cancellation returns [`IngestError::Cancelled`] immediately. Tasks already
//! spawned run to completion; their results are dropped.

use crate::error::{IngestError, IngestResult};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// Run `worker` over every item with bounded concurrency
///
/// # Arguments
/// * `items` - Work items; ownership moves into the worker tasks
/// * `concurrency` - Maximum simultaneously running workers (0 is treated as 1)
/// * `cancel` - Checked before each dispatch and while awaiting results
/// * `worker` - Per-item async function
///
/// # Returns
/// One result per item, in input order. Per-item failures are returned as
/// values; the only error of the call itself is `Cancelled`.
pub async fn run_bounded<I, T, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    cancel: &CancellationToken,
    worker: F,
) -> IngestResult<Vec<IngestResult<T>>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = IngestResult<T>> + Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<(usize, IngestResult<T>)>(total);
    let worker = Arc::new(worker);

    for (index, item) in items.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            permit = semaphore.clone().acquire_owned() => permit
                .map_err(|e| IngestError::permanent("worker pool", e))?,
        };

        let tx = tx.clone();
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            let result = worker(item).await;
            drop(permit);
            // Receiver is gone after cancellation
            let _ = tx.send((index, result)).await;
        });
    }
    drop(tx);

    let mut slots: Vec<Option<IngestResult<T>>> = (0..total).map(|_| None).collect();
    let mut received = 0;

    while received < total {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            next = rx.recv() => match next {
                Some((index, result)) => {
                    slots[index] = Some(result);
                    received += 1;
                }
                None => break,
            },
        }
    }

    Ok(slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(IngestError::permanent("worker pool", "worker task ended without a result"))
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_results_in_input_order() {
        let cancel = CancellationToken::new();
        let results = run_bounded(vec![30u64, 10, 20], 3, &cancel, |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ms)
        })
        .await
        .unwrap();

        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (r, p) = (running.clone(), peak.clone());
        let results = run_bounded((0..12).collect(), 3, &cancel, move |i: i32| {
            let (r, p) = (r.clone(), p.clone());
            async move {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_item_failures_are_values() {
        let cancel = CancellationToken::new();
        let results = run_bounded(vec![1, 2, 3, 4], 2, &cancel, |i| async move {
            if i % 2 == 0 {
                Err(IngestError::permanent("test", "even"))
            } else {
                Ok(i)
            }
        })
        .await
        .unwrap();

        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_returns_promptly() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = run_bounded(vec![(); 8], 2, &cancel, |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(IngestError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let cancel = CancellationToken::new();
        let results = run_bounded(Vec::<u8>::new(), 4, &cancel, |i| async move { Ok(i) })
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
