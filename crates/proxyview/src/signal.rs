//! Readiness signal shared by every source reader and awaited by the compositor.
//!
//! Each post adds one wake token. The waiter learns only that *something*
//! happened, never which source posted.

/// Posting side. Cheap to clone; posting never blocks.
#[derive(Clone)]
pub struct ReadyPoster {
    tx: flume::Sender<()>,
}

/// Waiting side. Not `Clone`: exactly one waiter.
pub struct ReadyWaiter {
    rx: flume::Receiver<()>,
    // Keeps the channel connected even if every poster is dropped, so
    // `wait` only ever returns after a post.
    _keepalive: flume::Sender<()>,
}

/// Create a connected poster/waiter pair.
pub fn ready_signal() -> (ReadyPoster, ReadyWaiter) {
    let (tx, rx) = flume::unbounded();
    let waiter = ReadyWaiter {
        rx,
        _keepalive: tx.clone(),
    };
    (ReadyPoster { tx }, waiter)
}

impl ReadyPoster {
    /// Add one wake token.
    pub fn post(&self) {
        // Unbounded and the waiter keeps the channel alive, so this cannot fail
        // while the waiter exists. After the waiter is gone nobody cares.
        let _ = self.tx.send(());
    }
}

impl ReadyWaiter {
    /// Block until a token is available, then consume it.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }

    /// Consume a token if one is pending.
    pub fn try_wait(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Tokens currently pending.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
