use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

/// Derive a token from `parent` that cancels itself once `after` has elapsed.
///
/// The timer task ends at the deadline or as soon as the returned token is
/// cancelled, whichever comes first. Must be called from within a tokio
/// runtime.
pub fn cancel_after(parent: &CancellationToken, after: Duration) -> CancellationToken {
    let token = parent.child_token();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(after) => timer.cancel(),
        }
    });
    token
}
