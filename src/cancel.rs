//! A shared cancellation signal that records the first cause.
//!
//! Cancelling a token drops its trigger, disconnecting every receiver
//! handed out by [`CancelToken::done`], so it can sit in a
//! `crossbeam_channel::select!` next to ordinary channel operations.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use parking_lot::Mutex;

use crate::bridge::BridgeError;

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    done:  Receiver<()>,
}

#[derive(Debug)]
struct State {
    cause:    Option<BridgeError>,
    trigger:  Option<Sender<()>>,
    children: Vec<Weak<Inner>>,
}

impl Inner {
    fn cancel(&self, cause: &BridgeError) -> bool {
        let children = {
            let mut state = self.state.lock();
            if state.cause.is_some() {
                return false;
            }
            state.cause = Some(cause.clone());
            state.trigger = None;
            std::mem::take(&mut state.children)
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(cause);
        }
        true
    }
}

/// Cloneable handle to one cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, done) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    cause:    None,
                    trigger:  Some(trigger),
                    children: Vec::new(),
                }),
                done,
            }),
        }
    }

    /// Fires the signal. Only the first cause is kept; returns whether this
    /// call was the one that fired it.
    pub fn cancel(&self, cause: BridgeError) -> bool {
        self.inner.cancel(&cause)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cause.is_some()
    }

    /// The recorded cause, once cancelled.
    pub fn cause(&self) -> Option<BridgeError> {
        self.inner.state.lock().cause.clone()
    }

    /// A receiver that disconnects when the token is cancelled. It never
    /// yields a value.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Blocks until the token is cancelled and returns the cause.
    pub fn wait(&self) -> BridgeError {
        let _ = self.inner.done.recv();
        self.cause().unwrap_or(BridgeError::Closed)
    }

    /// Derives a token that is cancelled along with this one (with the same
    /// cause) but can also be cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut state = self.inner.state.lock();
        match &state.cause {
            Some(cause) => {
                child.inner.cancel(cause);
            }
            None => {
                state.children.retain(|weak| weak.strong_count() > 0);
                state.children.push(Arc::downgrade(&child.inner));
            }
        }
        child
    }

    /// Cancels with [`BridgeError::TimedOut`] once `timeout` elapses, unless
    /// the token is cancelled first.
    ///
    /// # Errors
    /// Returns an error if the timer thread can't be spawned.
    pub fn cancel_after(&self, timeout: Duration) -> std::io::Result<()> {
        let token = self.clone();
        thread::Builder::new()
            .name("tsdate-deadline".to_owned())
            .spawn(move || {
                select! {
                    recv(token.done()) -> _ => {}
                    recv(after(timeout)) -> _ => {
                        if token.cancel(BridgeError::TimedOut(timeout)) {
                            tracing::warn!(?timeout, "deadline exceeded");
                        }
                    }
                }
            })
            .map(drop)
    }
}
