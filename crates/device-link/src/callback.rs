//! Callback-style completion for channel requests.

use std::future::Future;

use tokio::task::JoinHandle;

use crate::LinkError;

/// Drive `request` on the runtime and invoke exactly one of the callbacks
/// with its outcome.
///
/// Requests returned by [`CommandChannel`](crate::CommandChannel) are queued
/// when they are created, so spawning them here does not change their order.
pub fn on_complete<T, F, S, E>(request: F, on_success: S, on_failure: E) -> JoinHandle<()>
where
    F: Future<Output = Result<T, LinkError>> + Send + 'static,
    T: Send + 'static,
    S: FnOnce(T) + Send + 'static,
    E: FnOnce(LinkError) + Send + 'static,
{
    tokio::spawn(async move {
        match request.await {
            Ok(value) => on_success(value),
            Err(err) => on_failure(err),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[tokio::test]
    async fn success_calls_only_success() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ok = Arc::clone(&calls);
        let failed = Arc::clone(&calls);

        on_complete(
            async { Ok::<_, LinkError>(7) },
            move |v| ok.lock().unwrap().push(format!("ok {v}")),
            move |e| failed.lock().unwrap().push(format!("err {e}")),
        )
        .await
        .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["ok 7".to_string()]);
    }

    #[tokio::test]
    async fn failure_calls_only_failure() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ok = Arc::clone(&calls);
        let failed = Arc::clone(&calls);

        on_complete(
            async { Err::<u32, _>(LinkError::Cancelled) },
            move |v| ok.lock().unwrap().push(format!("ok {v}")),
            move |e| failed.lock().unwrap().push(format!("err {e}")),
        )
        .await
        .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("err "), "unexpected call: {}", calls[0]);
    }
}
