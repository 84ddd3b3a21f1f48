use super::*;

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let callback_count = Arc::clone(&count);
    (count, move || {
        callback_count.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn starts_active() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());
    assert!(!token.is_inert());
}

#[test]
fn cancel_transitions_once_and_runs_callbacks_once() {
    let token = CancellationToken::new();
    let (first, first_callback) = counter();
    let (second, second_callback) = counter();
    token.on_cancel(first_callback);
    token.on_cancel(second_callback);

    assert!(token.cancel());
    assert!(!token.cancel());
    assert!(token.is_cancelled());
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn callback_registered_after_cancel_runs_immediately() {
    let token = CancellationToken::new();
    token.cancel();

    let (count, callback) = counter();
    token.on_cancel(callback);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn removed_callback_never_runs() {
    let token = CancellationToken::new();
    let (removed, removed_callback) = counter();
    let (kept, kept_callback) = counter();
    let key = token.on_cancel(removed_callback).expect("registered");
    token.on_cancel(kept_callback);

    assert!(token.remove_on_cancel(key));
    assert!(!token.remove_on_cancel(key));
    assert_eq!(token.registered_callbacks(), 1);

    token.cancel();
    assert_eq!(removed.load(Ordering::SeqCst), 0);
    assert_eq!(kept.load(Ordering::SeqCst), 1);
}

#[test]
fn callbacks_that_ran_or_were_dropped_have_no_key() {
    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let (_, callback) = counter();
    assert_eq!(cancelled.on_cancel(callback), None);

    let inert = CancellationToken::inert();
    let (_, callback) = counter();
    assert_eq!(inert.on_cancel(callback), None);
}

#[test]
fn clones_share_cancellation() {
    let token = CancellationToken::new();
    let clone = token.clone();
    let (count, callback) = counter();
    clone.on_cancel(callback);

    token.cancel();
    assert!(clone.is_cancelled());
    assert!(!clone.cancel());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn callback_may_inspect_the_token() {
    let token = CancellationToken::new();
    let observed = Arc::new(AtomicUsize::new(0));
    let inner_token = token.clone();
    let inner_observed = Arc::clone(&observed);
    token.on_cancel(move || {
        if inner_token.is_cancelled() {
            inner_observed.fetch_add(1, Ordering::SeqCst);
        }
    });

    token.cancel();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn inert_token_never_cancels() {
    let token = CancellationToken::for_support(TokenSupport::Inert);
    let (count, callback) = counter();
    token.on_cancel(callback);

    assert!(token.is_inert());
    assert!(!token.cancel());
    assert!(!token.is_cancelled());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn debug_output_shows_flags() {
    let token = CancellationToken::new();
    token.cancel();
    let rendered = format!("{token:?}");
    assert!(rendered.contains("cancelled: true"));
    assert!(rendered.contains("inert: false"));
}

#[tokio::test]
async fn cancelled_wakes_waiters() {
    let token = CancellationToken::new();
    let waiter_token = token.clone();
    let waiter = tokio::spawn(async move {
        waiter_token.cancelled().await;
        true
    });

    tokio::task::yield_now().await;
    token.cancel();

    assert!(waiter.await.expect("waiter task"));
}

#[tokio::test]
async fn cancelled_returns_immediately_when_already_cancelled() {
    let token = CancellationToken::new();
    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), token.cancelled())
        .await
        .expect("already cancelled");
}

#[tokio::test(start_paused = true)]
async fn run_until_cancelled_returns_output_when_future_wins() {
    let token = CancellationToken::new();
    let output = token
        .run_until_cancelled(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            42
        })
        .await;
    assert_eq!(output, Some(42));
}

#[tokio::test(start_paused = true)]
async fn run_until_cancelled_stops_when_token_is_cancelled() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let output = token
        .run_until_cancelled(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            42
        })
        .await;
    assert_eq!(output, None);
}

#[tokio::test(start_paused = true)]
async fn inert_token_never_interrupts_work() {
    let token = CancellationToken::inert();
    token.cancel();
    let output = token
        .run_until_cancelled(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "done"
        })
        .await;
    assert_eq!(output, Some("done"));
}
