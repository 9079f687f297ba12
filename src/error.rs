use crate::SpeciesId;

/// The runtime's single error type. Every fallible public operation returns
/// `Result<T, Error>`; there is no panic path for user-facing mistakes.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// Emission (or diagnostics call) on a species that was never registered
    /// as an input of any reaction at activation.
    #[error("emission on species {species:?} that is not bound to any join definition")]
    Unbound { species: SpeciesId },

    /// Activation attempted to claim a species that is already an input of
    /// a different, already-activated join definition.
    #[error("species {species:?} is already bound to another join definition")]
    AlreadyBound { species: SpeciesId },

    /// A reaction lists the same species twice as an input.
    #[error("reaction lists species {species:?} twice as an input")]
    Nonlinear { species: SpeciesId },

    /// A synchronous input site's reply metadata is inconsistent with its
    /// species' declared kind.
    #[error("sync input for species {species:?} is missing a reply-binder marker")]
    InvalidReply { species: SpeciesId },

    /// The reaction that consumed a synchronous emission completed (or
    /// panicked) without ever calling `reply` on its channel.
    #[error("reaction completed without replying to this synchronous emission")]
    NoReply,

    /// The caller's deadline elapsed before a reply arrived.
    #[error("synchronous emission timed out before a reply arrived")]
    Timeout,

    /// The executor declined to accept a submitted task (e.g. already shut down).
    #[error("executor rejected the task, it may already be shut down")]
    ExecutorRejected,
}
