//! Per-species handles: the user-facing injection operation.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::join_definition::JoinDefinitionInner;
use crate::pattern::InputSite;
use crate::reply::{duration_deadline, ReplyChannel, ReplySlot};
use crate::{Error, InputPattern};

/// Identifies a species: a unique, opaque handle minted once per
/// [`MoleculeEmitter`]/[`SyncMoleculeEmitter`] and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpeciesId(u64);

impl std::fmt::Debug for SpeciesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "species#{}", self.0)
    }
}

impl SpeciesId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        SpeciesId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum SpeciesKind {
    Async,
    Sync,
}

/// The species identity shared by a [`MoleculeEmitter`]/[`SyncMoleculeEmitter`]
/// and referenced from [`InputSite`]s. Binding is write-once: set at most
/// once, at the activation that claims this species as a reaction input.
pub(crate) struct EmitterInner {
    pub(crate) id: SpeciesId,
    pub(crate) name: Option<String>,
    pub(crate) kind: SpeciesKind,
    binding: Mutex<Option<Arc<JoinDefinitionInner>>>,
}

impl EmitterInner {
    fn new(name: Option<String>, kind: SpeciesKind) -> Arc<Self> {
        Arc::new(EmitterInner {
            id: SpeciesId::next(),
            name,
            kind,
            binding: Mutex::new(None),
        })
    }

    pub(crate) fn is_bound_elsewhere(&self) -> bool {
        self.binding.lock().is_some()
    }

    /// Commits the binding. Callers must have already verified (under the
    /// process-wide activation lock) that no other join definition owns this
    /// species; activation never calls this speculatively.
    pub(crate) fn bind(&self, jd: &Arc<JoinDefinitionInner>) {
        let mut binding = self.binding.lock();
        debug_assert!(binding.is_none(), "species rebound after activation");
        *binding = Some(jd.clone());
    }

    pub(crate) fn bound_jd(&self) -> Option<Arc<JoinDefinitionInner>> {
        self.binding.lock().clone()
    }
}

fn bound_or_unbound(inner: &EmitterInner) -> Result<Arc<JoinDefinitionInner>, Error> {
    inner.bound_jd().ok_or(Error::Unbound { species: inner.id })
}

/// A handle for an asynchronous (non-blocking) species of value type `V`.
///
/// Cheaply `Clone`-able: cloning shares the same underlying species identity
/// and binding, so many producer threads can hold copies of one emitter.
pub struct MoleculeEmitter<V> {
    pub(crate) inner: Arc<EmitterInner>,
    _value: PhantomData<fn(V)>,
}

impl<V> Clone for MoleculeEmitter<V> {
    fn clone(&self) -> Self {
        MoleculeEmitter {
            inner: self.inner.clone(),
            _value: PhantomData,
        }
    }
}

impl<V: Send + 'static> MoleculeEmitter<V> {
    /// Creates a new, as-yet-unbound async species handle.
    pub fn new(name: Option<&str>) -> Self {
        MoleculeEmitter {
            inner: EmitterInner::new(name.map(str::to_owned), SpeciesKind::Async),
            _value: PhantomData,
        }
    }

    pub fn species(&self) -> SpeciesId {
        self.inner.id
    }

    pub fn species_name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Injects `v` into the owning join definition's bag and triggers a
    /// match attempt. Returns immediately; never blocks beyond the brief
    /// acquisition of the decision lock.
    pub fn emit(&self, v: V) -> Result<(), Error> {
        let jd = bound_or_unbound(&self.inner)?;
        jd.decision_cycle(self.inner.id, Box::new(v), None)
    }

    /// A diagnostic snapshot of the owning join definition's bag and
    /// reaction set. Fails `UNBOUND` if this emitter was never activated.
    pub fn current_contents(&self) -> Result<String, Error> {
        let jd = bound_or_unbound(&self.inner)?;
        Ok(jd.current_contents())
    }

    /// Sets the verbosity of the owning join definition's tracing output.
    pub fn set_log_level(&self, n: u8) -> Result<(), Error> {
        let jd = bound_or_unbound(&self.inner)?;
        jd.set_log_level(n);
        Ok(())
    }

    /// Builds an input site for use in a [`ReactionInfo`](crate::ReactionInfo):
    /// "this reaction consumes a `V` from this species matching `pattern`".
    pub fn when(&self, pattern: InputPattern) -> InputSite {
        InputSite::new(self.inner.clone(), pattern)
    }
}

/// A handle for a synchronous (blocking) species of value type `V` whose
/// consuming reaction must reply with exactly one `R`.
pub struct SyncMoleculeEmitter<V, R> {
    pub(crate) inner: Arc<EmitterInner>,
    _value: PhantomData<fn(V) -> R>,
}

impl<V, R> Clone for SyncMoleculeEmitter<V, R> {
    fn clone(&self) -> Self {
        SyncMoleculeEmitter {
            inner: self.inner.clone(),
            _value: PhantomData,
        }
    }
}

impl<V: Send + 'static, R: Send + 'static> SyncMoleculeEmitter<V, R> {
    /// Creates a new, as-yet-unbound sync species handle.
    pub fn new(name: Option<&str>) -> Self {
        SyncMoleculeEmitter {
            inner: EmitterInner::new(name.map(str::to_owned), SpeciesKind::Sync),
            _value: PhantomData,
        }
    }

    pub fn species(&self) -> SpeciesId {
        self.inner.id
    }

    pub fn species_name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Injects `v`, triggers a match attempt, then blocks the calling
    /// thread until the consuming reaction replies.
    ///
    /// Fails `UNBOUND` if never activated, or `NO_REPLY` if the consuming
    /// reaction completes (normally or by panicking) without replying.
    pub fn emit(&self, v: V) -> Result<R, Error> {
        let (jd, reply) = self.submit(v)?;
        let _ = jd;
        reply.await_reply()
    }

    /// As [`emit`](Self::emit), but returns `TIMEOUT` if `deadline` elapses
    /// before a reply arrives. A timed-out reply that arrives later is
    /// silently discarded; the reaction that fired already consumed the
    /// molecule and cannot be undone.
    pub fn emit_timeout(&self, v: V, deadline: Duration) -> Result<R, Error> {
        let (jd, reply) = self.submit(v)?;
        let _ = jd;
        reply.await_reply_deadline(duration_deadline(deadline))
    }

    fn submit(&self, v: V) -> Result<(Arc<JoinDefinitionInner>, ReplyChannel<R>), Error> {
        let jd = bound_or_unbound(&self.inner)?;
        let reply = ReplyChannel::<R>::new();
        let slot = ReplySlot::new(reply.clone());
        jd.decision_cycle(self.inner.id, Box::new(v), Some(slot))?;
        Ok((jd, reply))
    }

    pub fn current_contents(&self) -> Result<String, Error> {
        let jd = bound_or_unbound(&self.inner)?;
        Ok(jd.current_contents())
    }

    pub fn set_log_level(&self, n: u8) -> Result<(), Error> {
        let jd = bound_or_unbound(&self.inner)?;
        jd.set_log_level(n);
        Ok(())
    }

    pub fn when(&self, pattern: InputPattern) -> InputSite {
        InputSite::new(self.inner.clone(), pattern)
    }
}
