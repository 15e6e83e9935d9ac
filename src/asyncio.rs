//! Bounded sync adapter bridging Dana's synchronous call surface to
//! asynchronous host functions (spec section 5: "`safe_asyncio_run`
//! semantics").

use std::future::Future;
use std::time::Duration;

use crate::error::{DanaError, Traced};

/// Runs `future` to completion from synchronous code. If a Tokio runtime is
/// already entered (the embedding host is itself async), hands off via
/// `block_in_place` so the host's own runtime isn't blocked; otherwise spins
/// up a private current-thread runtime for the duration of the call.
pub fn block_on_host_call<F, T>(future: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .expect("failed to start private tokio runtime for host call");
            runtime.block_on(future)
        }
    }
}

/// Wraps `future` with a deadline, translating an expiry into `Timeout`
/// (spec section 7 / 5 "Cancellation").
pub async fn with_timeout<F, T>(millis: u64, future: F) -> Result<T, Traced>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_millis(millis), future)
        .await
        .map_err(|_| Traced::new(DanaError::Timeout { millis }))
}
