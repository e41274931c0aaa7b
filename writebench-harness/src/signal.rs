//! The write-once stop signal broadcast to all workers.
//!
//! A [`StopSignal`] is owned by the harness, which hands out read-only [`StopListener`]s to its
//! workers. Once signaled, the signal stays signaled for the remainder of the run.

use tokio_util::sync::CancellationToken;

/// The sending half of the stop signal.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    /// Creates a new signal that has not fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal.
    ///
    /// Signaling more than once has no effect beyond the first call.
    pub fn signal(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the signal has fired.
    pub fn is_signaled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has fired.
    pub async fn signaled(&self) {
        self.token.cancelled().await
    }

    /// Returns a listener that observes this signal but cannot fire it.
    pub fn listener(&self) -> StopListener {
        StopListener {
            token: self.token.clone(),
        }
    }
}

/// The receiving half of the stop signal, see [`StopSignal::listener`].
#[derive(Clone, Debug)]
pub struct StopListener {
    token: CancellationToken,
}

impl StopListener {
    /// Returns `true` once the signal has fired.
    pub fn is_signaled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has fired.
    pub async fn signaled(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn stays_signaled() {
        let signal = StopSignal::new();
        let listener = signal.listener();
        assert!(!listener.is_signaled());

        signal.signal();
        assert!(signal.is_signaled());
        assert!(listener.is_signaled());

        // a second signal is a no-op
        signal.signal();
        assert!(listener.is_signaled());
    }

    #[tokio::test]
    async fn wakes_all_listeners() {
        let signal = StopSignal::new();
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let listener = signal.listener();
                tokio::spawn(async move { listener.signaled().await })
            })
            .collect();

        signal.signal();

        let all = futures::future::join_all(waiters);
        tokio::time::timeout(Duration::from_secs(1), all)
            .await
            .expect("listeners were not woken");
    }

    #[tokio::test]
    async fn late_listener_resolves_immediately() {
        let signal = StopSignal::new();
        signal.signal();
        signal.listener().signaled().await;
    }
}
