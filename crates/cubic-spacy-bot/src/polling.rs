use std::future::Future;
use std::time::Duration;

use cubic_spacy_api::{BotApiError, GetUpdates, UpdateSource, ALLOWED_UPDATE_INLINE_QUERY};
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;

pub const STARTUP_RETRY_DELAY: Duration = Duration::from_secs(30);
const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

#[must_use]
pub fn allowed_updates() -> Vec<String> {
    vec![ALLOWED_UPDATE_INLINE_QUERY.to_string()]
}

/// Sleep for `delay`, returning `false` if `shutdown` fires first.
async fn pause(shutdown: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

/// Run `call` until it succeeds, waiting `delay` between attempts.
///
/// Returns `Ok(None)` when `shutdown` fires before a success.
///
/// # Errors
/// Returns the error as soon as the platform rejects the bot token.
pub async fn retry_until_ok<T, F, Fut>(
    shutdown: &CancellationToken,
    action: &str,
    delay: Duration,
    mut call: F,
) -> Result<Option<T>, BotApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BotApiError>>,
{
    loop {
        let result = tokio::select! {
            () = shutdown.cancelled() => return Ok(None),
            result = call() => result,
        };
        match result {
            Ok(value) => return Ok(Some(value)),
            Err(err) if err.is_invalid_token() => return Err(err),
            Err(err) => {
                tracing::error!(error = %err, "failed to {action}, retrying in {} seconds", delay.as_secs());
            }
        }
        if !pause(shutdown, delay).await {
            return Ok(None);
        }
    }
}

/// Offset that acknowledges every update up to and including `update_id`.
fn advance_offset(current: Option<i64>, update_id: i64) -> Option<i64> {
    let next = update_id + 1;
    Some(current.map_or(next, |current| current.max(next)))
}

/// Long-poll `getUpdates` and dispatch updates until `shutdown` fires.
pub async fn run(source: &dyn UpdateSource, dispatcher: &Dispatcher, shutdown: &CancellationToken) {
    let mut offset = None;
    tracing::info!("started long polling");

    loop {
        let params =
            GetUpdates { offset, timeout: POLL_TIMEOUT_SECS, allowed_updates: allowed_updates() };
        let result = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            result = source.get_updates(&params) => result,
        };

        match result {
            Ok(updates) => {
                for update in updates {
                    offset = advance_offset(offset, update.update_id);
                    dispatcher.dispatch(update);
                }
            }
            Err(err) => {
                let delay = err.retry_after().unwrap_or(POLL_ERROR_BACKOFF);
                tracing::warn!(error = %err, retry_in_secs = delay.as_secs(), "failed to get updates");
                if !pause(shutdown, delay).await {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cubic_spacy_api::Update;

    use super::*;
    use crate::dispatch::tests::{inline_update, recording_dispatcher};

    /// Replays canned `getUpdates` replies, then cancels `shutdown`.
    struct ScriptedSource {
        replies: Mutex<VecDeque<Result<Vec<Update>, BotApiError>>>,
        offsets: Mutex<Vec<Option<i64>>>,
        shutdown: CancellationToken,
    }

    impl ScriptedSource {
        fn new(
            replies: Vec<Result<Vec<Update>, BotApiError>>,
            shutdown: &CancellationToken,
        ) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                offsets: Mutex::new(Vec::new()),
                shutdown: shutdown.clone(),
            }
        }

        fn offsets(&self) -> Vec<Option<i64>> {
            match self.offsets.lock() {
                Ok(offsets) => offsets.clone(),
                Err(err) => panic!("offset log poisoned: {err}"),
            }
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn get_updates(&self, params: &GetUpdates) -> Result<Vec<Update>, BotApiError> {
            let reply = {
                match self.offsets.lock() {
                    Ok(mut offsets) => offsets.push(params.offset),
                    Err(err) => panic!("offset log poisoned: {err}"),
                }
                match self.replies.lock() {
                    Ok(mut replies) => replies.pop_front(),
                    Err(err) => panic!("reply script poisoned: {err}"),
                }
            };
            match reply {
                Some(reply) => reply,
                None => {
                    self.shutdown.cancel();
                    std::future::pending().await
                }
            }
        }
    }

    fn numbered_update(update_id: i64, query_id: &str, query: &str) -> Update {
        let mut update = inline_update(query_id, query);
        update.update_id = update_id;
        update
    }

    fn rejected_token() -> BotApiError {
        BotApiError::Api { code: 401, description: "Unauthorized".to_string(), retry_after: None }
    }

    #[test]
    fn offset_moves_past_the_newest_update() {
        assert_eq!(advance_offset(None, 41), Some(42));
        assert_eq!(advance_offset(Some(42), 50), Some(51));
        assert_eq!(advance_offset(Some(60), 50), Some(60));
    }

    #[tokio::test]
    async fn retry_until_ok_retries_transient_failures() {
        let shutdown = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let value = retry_until_ok(&shutdown, "get bot info", Duration::from_millis(1), || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(BotApiError::Api {
                        code: 502,
                        description: "Bad Gateway".to_string(),
                        retry_after: None,
                    })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert!(matches!(value, Ok(Some(2))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_until_ok_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let value: Result<Option<()>, BotApiError> =
            retry_until_ok(&shutdown, "set webhook", Duration::from_secs(30), || async {
                Err(BotApiError::MissingResult)
            })
            .await;
        assert!(matches!(value, Ok(None)));
    }

    #[tokio::test]
    async fn retry_until_ok_gives_up_on_a_rejected_token() {
        let shutdown = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let value: Result<Option<()>, BotApiError> =
            retry_until_ok(&shutdown, "get bot info", Duration::from_millis(1), || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(rejected_token()) }
            })
            .await;

        assert!(matches!(value, Err(ref err) if err.is_invalid_token()));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_advances_the_offset_and_dispatches_updates() {
        let shutdown = CancellationToken::new();
        let (dispatcher, mut rx) = recording_dispatcher();
        let source = ScriptedSource::new(
            vec![
                Ok(vec![
                    numbered_update(5, "q-5", "abc"),
                    Update { update_id: 6, inline_query: None },
                ]),
                Ok(Vec::new()),
            ],
            &shutdown,
        );

        run(&source, &dispatcher, &shutdown).await;
        dispatcher.drain().await;

        assert_eq!(source.offsets(), vec![None, Some(7), Some(7)]);
        let answer = rx.try_recv().unwrap_or_else(|err| panic!("no answer delivered: {err}"));
        assert_eq!(answer.inline_query_id, "q-5");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn run_waits_for_the_requested_retry_after() {
        let shutdown = CancellationToken::new();
        let (dispatcher, _rx) = recording_dispatcher();
        let source = ScriptedSource::new(
            vec![Err(BotApiError::Api {
                code: 429,
                description: "Too Many Requests: retry after 7".to_string(),
                retry_after: Some(7),
            })],
            &shutdown,
        );

        let started = tokio::time::Instant::now();
        run(&source, &dispatcher, &shutdown).await;

        assert!(started.elapsed() >= Duration::from_secs(7));
        assert_eq!(source.offsets(), vec![None, None]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_backs_off_after_transport_errors() {
        let shutdown = CancellationToken::new();
        let (dispatcher, _rx) = recording_dispatcher();
        let source = ScriptedSource::new(vec![Err(BotApiError::MissingResult)], &shutdown);

        let started = tokio::time::Instant::now();
        run(&source, &dispatcher, &shutdown).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= POLL_ERROR_BACKOFF);
        assert!(elapsed < STARTUP_RETRY_DELAY);
    }

    #[tokio::test]
    async fn run_returns_once_shutdown_fires() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let (dispatcher, mut rx) = recording_dispatcher();
        let source = ScriptedSource::new(vec![Ok(vec![numbered_update(1, "q-1", "hi")])], &shutdown);

        tokio::time::timeout(Duration::from_secs(5), run(&source, &dispatcher, &shutdown))
            .await
            .unwrap_or_else(|err| panic!("polling did not stop: {err}"));
        dispatcher.drain().await;
        assert!(source.offsets().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
