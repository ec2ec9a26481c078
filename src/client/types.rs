use tokio_util::sync::CancellationToken;

/// Handle to stop an in-flight stream.
///
/// The original frontend never aborted a request; a stream ran to completion
/// or network failure. The handle closes that gap: cancelling ends the event
/// stream at its next poll without changing the event contract. Dropping the
/// handle does not cancel.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub(crate) fn cancel_pair() -> (CancelHandle, CancellationToken) {
    let token = CancellationToken::new();
    (
        CancelHandle {
            token: token.clone(),
        },
        token,
    )
}
