//! Bounded Fetch Pool
//!
//! Runs one worker future per item with at most `concurrency` outstanding
//! at once. The output is index-aligned with the input whatever the
//! completion order. No item is skipped: workers capture their own
//! failures (typically by returning a `Result`).

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Fixed-width pool for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPool {
    concurrency: usize,
}

impl FetchPool {
    /// Create a pool. A concurrency of zero is treated as one.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Maximum number of in-flight workers.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `worker` over every item and collect outputs in input order.
    pub async fn run<I, T, F, Fut>(&self, items: I, worker: F) -> Vec<T>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        run_bounded(items, self.concurrency, worker).await
    }
}

impl Default for FetchPool {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Run `worker` over `items` with at most `concurrency` futures in flight.
///
/// Results come back in input order.
pub async fn run_bounded<I, T, F, Fut>(items: I, concurrency: usize, worker: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items)
        .map(worker)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlight {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn output_is_index_aligned_and_bounded() {
        let gauge = Arc::new(InFlight {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        let pool = FetchPool::new(2);
        let results = pool
            .run(1..=5_u64, |item| {
                let gauge = Arc::clone(&gauge);
                async move {
                    gauge.enter();
                    // Later items finish first.
                    tokio::time::sleep(Duration::from_millis(60 - item * 10)).await;
                    gauge.leave();
                    if item == 3 {
                        Err(format!("item {item} failed"))
                    } else {
                        Ok(item * 100)
                    }
                }
            })
            .await;

        assert_eq!(results.len(), 5);
        assert_eq!(results[0], Ok(100));
        assert_eq!(results[1], Ok(200));
        assert!(results[2].is_err());
        assert_eq!(results[3], Ok(400));
        assert_eq!(results[4], Ok(500));
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn zero_concurrency_still_runs_everything() {
        let results = run_bounded(vec!["a", "b", "c"], 0, |s| async move { s.to_uppercase() }).await;
        assert_eq!(results, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let results: Vec<u8> = FetchPool::default()
            .run(Vec::<u8>::new(), |x| async move { x })
            .await;
        assert!(results.is_empty());
        assert_eq!(FetchPool::default().concurrency(), 8);
    }
}
