//! Wait-for-all fan-out over a batch of images.
//!
//! One task per image, all joined before returning. A failing task never
//! cancels its siblings; the first failure to complete is reported once
//! every task has finished.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs `task` for every image and reports the first failure.
///
/// `limit` bounds how many tasks run at once; `None` runs them all
/// concurrently.
pub(crate) async fn for_each_image<F, Fut>(
    operation: &'static str,
    images: &[String],
    limit: Option<usize>,
    task: F,
) -> Result<()>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let permits = limit.map(|n| Arc::new(Semaphore::new(n.max(1))));
    let mut set = JoinSet::new();

    for image in images {
        let work = task(image.clone());
        let permits = permits.clone();
        set.spawn(async move {
            let _permit = match permits {
                Some(s) => Some(
                    s.acquire_owned()
                        .await
                        .map_err(|e| Error::Internal(e.to_string()))?,
                ),
                None => None,
            };
            work.await
        });
    }

    let mut first = None;
    while let Some(joined) = set.join_next().await {
        let result = joined
            .map_err(|e| Error::Internal(format!("task failed: {}", e)))
            .and_then(|r| r);
        if let Err(e) = result
            && first.is_none()
        {
            first = Some(e);
        }
    }

    match first {
        Some(e) => Err(Error::Batch {
            operation,
            source: Box::new(e),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn images(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("repo/img{}:1", i)).collect()
    }

    #[tokio::test]
    async fn every_task_runs_despite_failures() {
        let done = Arc::new(AtomicUsize::new(0));
        let result = for_each_image("testing", &images(5), None, |image| {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
                if image.contains("img0") {
                    return Err(Error::Internal("boom".to_string()));
                }
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Batch { operation: "testing", .. })));
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn first_completed_failure_is_reported() {
        let result = for_each_image("testing", &images(2), None, |image| async move {
            if image.contains("img0") {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(Error::Internal("slow".to_string()))
            } else {
                Err(Error::Internal("fast".to_string()))
            }
        })
        .await;

        match result {
            Err(Error::Batch { source, .. }) => {
                assert!(matches!(*source, Error::Internal(ref m) if m == "fast"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn limit_bounds_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for_each_image("testing", &images(8), Some(2), |_| {
            let (active, peak) = (active.clone(), peak.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
