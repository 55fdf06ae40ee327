//! Shared bounded-concurrency fan-out (§4.5/§4.6/§9): the semaphore policy
//! and per-slot completion bookkeeping are identical between INITIAL and
//! META; only the per-slot work (prompt, retry budget, backup logic)
//! differs, so each stage supplies its own worker closure and this routine
//! owns only the concurrency shape.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::response::Response;

/// Invoked once per slot as it completes, with the running completed-count
/// and that slot's elapsed seconds (§4.5: "invoked once per slot on
/// completion, with completed-count and per-slot elapsed seconds").
pub type ProgressCallback = Arc<dyn Fn(usize, f64) + Send + Sync>;

/// Runs `work` over every item in `items` under a semaphore of width
/// `concurrency`, returning one [`Response`] per item. Completion order is
/// not preserved relative to `items`' order (§4.5: "callers must not rely
/// on it for identity"). `work` must never panic — every per-slot failure
/// is expected to already be folded into an `error:true` [`Response`] by
/// the caller before this routine sees it.
pub async fn fan_out<T, F, Fut>(items: Vec<T>, concurrency: usize, work: F, on_progress: Option<ProgressCallback>) -> Vec<Response>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let work = Arc::new(work);
    let mut set = JoinSet::new();

    for item in items {
        let semaphore = semaphore.clone();
        let work = work.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("fan-out semaphore closed");
            let start = std::time::Instant::now();
            let response = work(item).await;
            (response, start.elapsed().as_secs_f64())
        });
    }

    let mut results = Vec::with_capacity(set.len());
    let mut completed = 0usize;
    while let Some(joined) = set.join_next().await {
        let (response, elapsed) = joined.expect("fan-out worker panicked");
        completed += 1;
        if let Some(cb) = &on_progress {
            cb(completed, elapsed);
        }
        results.push(response);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Round;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_all_items_and_reports_progress() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let callback: ProgressCallback = Arc::new(move |completed, _elapsed| {
            seen2.store(completed, Ordering::SeqCst);
        });

        let results = fan_out(
            vec!["a", "b", "c"],
            2,
            |item| async move { Response::success(Round::Initial, item, "ok", 1) },
            Some(callback),
        )
        .await;

        assert_eq!(results.len(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrency_of_one_still_completes_all() {
        let results = fan_out(
            vec![1, 2, 3, 4],
            1,
            |item| async move { Response::success(Round::Meta, format!("m{item}"), "x", 1) },
            None,
        )
        .await;
        assert_eq!(results.len(), 4);
    }
}
