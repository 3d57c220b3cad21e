//! Named worker threads with a bounded join.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A background thread that can be joined with a timeout.
///
/// The thread owns the sending half of a channel; it is dropped when the
/// closure returns or unwinds, which is what [`join_within`](Self::join_within)
/// waits for.
#[derive(Debug)]
pub(crate) struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

impl Worker {
    pub fn spawn<F>(name: &'static str, f: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                f();
            })?;
        Ok(Self { name, handle, done })
    }

    /// Wait up to `timeout` for the thread to exit. A thread that does not
    /// exit in time is detached; returns `false` in that case.
    pub fn join_within(self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    log::error!("engine: {} worker panicked", self.name);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "engine: {} worker did not stop within {timeout:?}, detaching",
                    self.name
                );
                false
            }
        }
    }
}
