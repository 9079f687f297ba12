//! The single-use rendezvous between a blocking [`emit`](crate::SyncMoleculeEmitter::emit)
//! call and the reaction body that eventually consumes it.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::Error;

enum Slot<R> {
    Empty,
    Replied(R),
    NoReply,
    TimedOut,
}

struct ReplyState<R> {
    slot: Mutex<Slot<R>>,
    woken: Condvar,
}

/// Handle passed into a reaction body for each synchronous input it consumed,
/// in source order. `reply` transitions the channel exactly once; the runtime
/// sweeps any channel a body leaves untouched into [`Error::NoReply`].
pub struct ReplyChannel<R> {
    inner: Arc<ReplyState<R>>,
}

impl<R> Clone for ReplyChannel<R> {
    fn clone(&self) -> Self {
        ReplyChannel {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Send + 'static> ReplyChannel<R> {
    pub(crate) fn new() -> Self {
        ReplyChannel {
            inner: Arc::new(ReplyState {
                slot: Mutex::new(Slot::Empty),
                woken: Condvar::new(),
            }),
        }
    }

    /// Complete this channel with `v`. Returns `true` on the first call;
    /// a second call (or a call after the waiter already timed out) returns
    /// `false` and leaves the stored value untouched, the reply is discarded.
    pub fn reply(&self, v: R) -> bool {
        let mut slot = self.inner.slot.lock();
        if matches!(*slot, Slot::Empty) {
            *slot = Slot::Replied(v);
            drop(slot);
            self.inner.woken.notify_one();
            tracing::trace!("reply delivered");
            true
        } else {
            tracing::warn!("reply discarded, channel was already completed");
            false
        }
    }

    pub(crate) fn sink(&self) -> Arc<dyn AnyReply> {
        self.inner.clone()
    }

    pub(crate) fn await_reply(&self) -> Result<R, Error> {
        let mut slot = self.inner.slot.lock();
        loop {
            match &*slot {
                Slot::Empty => self.inner.woken.wait(&mut slot),
                Slot::Replied(_) => {
                    let Slot::Replied(v) = std::mem::replace(&mut *slot, Slot::NoReply) else {
                        unreachable!()
                    };
                    return Ok(v);
                }
                Slot::NoReply => return Err(Error::NoReply),
                Slot::TimedOut => return Err(Error::Timeout),
            }
        }
    }

    pub(crate) fn await_reply_deadline(&self, deadline: Instant) -> Result<R, Error> {
        let mut slot = self.inner.slot.lock();
        loop {
            match &*slot {
                Slot::Empty => {
                    let now = Instant::now();
                    if now >= deadline {
                        *slot = Slot::TimedOut;
                        return Err(Error::Timeout);
                    }
                    let timed_out = self.inner.woken.wait_for(&mut slot, deadline - now);
                    if timed_out.timed_out() && matches!(*slot, Slot::Empty) {
                        *slot = Slot::TimedOut;
                        return Err(Error::Timeout);
                    }
                }
                Slot::Replied(_) => {
                    let Slot::Replied(v) = std::mem::replace(&mut *slot, Slot::NoReply) else {
                        unreachable!()
                    };
                    return Ok(v);
                }
                Slot::NoReply => return Err(Error::NoReply),
                Slot::TimedOut => return Err(Error::Timeout),
            }
        }
    }
}

/// Type-erased half of a [`ReplyChannel`], used by the decision cycle to
/// sweep unreplied channels into `NO_REPLY` without knowing `R`.
pub(crate) trait AnyReply: Send + Sync {
    fn mark_no_reply(&self);
}

impl<R: Send + 'static> AnyReply for ReplyState<R> {
    fn mark_no_reply(&self) {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Empty) {
            *slot = Slot::NoReply;
            drop(slot);
            self.woken.notify_one();
            tracing::debug!("no-reply swept for unconsumed reply channel");
        }
    }
}

/// A pending synchronous instance's reply half, stored alongside its value
/// in the bag: the concrete, type-erased channel handed to the reaction
/// body, plus the erased sink used for the no-reply sweep.
pub(crate) struct ReplySlot {
    pub(crate) body_arg: Box<dyn Any + Send>,
    pub(crate) sink: Arc<dyn AnyReply>,
}

impl ReplySlot {
    pub(crate) fn new<R: Send + 'static>(channel: ReplyChannel<R>) -> Self {
        let sink = channel.sink();
        ReplySlot {
            body_arg: Box::new(channel),
            sink,
        }
    }
}

pub(crate) fn duration_deadline(d: Duration) -> Instant {
    Instant::now() + d
}
