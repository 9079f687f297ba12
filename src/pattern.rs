//! Static description of a reaction's input pattern and body.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::emitter::{EmitterInner, SpeciesKind};
use crate::SpeciesId;

type Predicate = Arc<dyn Fn(&(dyn Any + Send)) -> bool + Send + Sync>;
type Body = Arc<dyn Fn(Vec<Box<dyn Any + Send>>, Vec<Box<dyn Any + Send>>) + Send + Sync>;

/// A per-input-site match flag, as produced by the (out of scope) external
/// reaction-declaration lowering stage.
#[derive(Clone)]
pub enum InputPattern {
    /// Matches any value; the body does not receive it.
    Wildcard,
    /// Matches any value; the body receives it.
    Variable,
    /// Matches iff the value equals the captured constant by structural
    /// equality (use [`InputPattern::constant`] to build one for a `V: PartialEq`).
    Constant(Predicate),
    /// Matches iff the supplied predicate accepts the value, used for
    /// structural destructuring the core has no notion of.
    Other(Predicate),
}

impl fmt::Debug for InputPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputPattern::Wildcard => "Wildcard",
            InputPattern::Variable => "Variable",
            InputPattern::Constant(_) => "Constant(..)",
            InputPattern::Other(_) => "Other(..)",
        };
        f.write_str(name)
    }
}

impl InputPattern {
    /// Builds a `Constant` pattern from a concrete, `PartialEq` value.
    pub fn constant<V: PartialEq + Send + 'static>(c: V) -> Self {
        InputPattern::Constant(Arc::new(move |v: &(dyn Any + Send)| {
            v.downcast_ref::<V>().is_some_and(|v| v == &c)
        }))
    }

    /// Builds an `Other` pattern from an arbitrary predicate over the typed value.
    pub fn predicate<V: Send + 'static>(p: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
        InputPattern::Other(Arc::new(move |v: &(dyn Any + Send)| {
            v.downcast_ref::<V>().is_some_and(&p)
        }))
    }

    pub(crate) fn matches(&self, value: &(dyn Any + Send)) -> bool {
        match self {
            InputPattern::Wildcard | InputPattern::Variable => true,
            InputPattern::Constant(p) | InputPattern::Other(p) => p(value),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            InputPattern::Wildcard => 0,
            InputPattern::Variable => 1,
            InputPattern::Constant(_) => 2,
            InputPattern::Other(_) => 3,
        }
    }
}

/// One input position of a reaction: a species plus the pattern its
/// candidate instances must satisfy.
pub struct InputSite {
    pub(crate) species: Arc<EmitterInner>,
    pub(crate) pattern: InputPattern,
}

impl InputSite {
    pub(crate) fn new(species: Arc<EmitterInner>, pattern: InputPattern) -> Self {
        InputSite { species, pattern }
    }

    pub(crate) fn species_id(&self) -> SpeciesId {
        self.species.id
    }

    pub(crate) fn is_sync(&self) -> bool {
        self.species.kind == SpeciesKind::Sync
    }
}

/// The immutable, activated description of one reaction: its ordered input
/// sites, its body, and (for diagnostics only) the species it is known to
/// emit on completion.
pub struct ReactionInfo {
    pub(crate) inputs: Vec<InputSite>,
    pub(crate) body: Body,
    pub(crate) outputs: Vec<SpeciesId>,
    pub(crate) name: Option<String>,
}

impl fmt::Debug for ReactionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionInfo")
            .field("name", &self.name)
            .field(
                "inputs",
                &self
                    .inputs
                    .iter()
                    .map(|s| (s.species_id(), &s.pattern))
                    .collect::<Vec<_>>(),
            )
            .field("outputs", &self.outputs)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl ReactionInfo {
    pub fn builder() -> ReactionBuilder {
        ReactionBuilder::new()
    }

    /// A stable hash of this reaction's input shape (species identities, in
    /// order, and each site's pattern kind). Diagnostic only, never
    /// consulted by the matcher. Two reaction sets built the same way on
    /// fresh species produce equal fingerprints only if species identities
    /// also line up; in practice this is used to confirm a reaction set was
    /// declared identically across two activations of otherwise-unrelated
    /// species, by comparing fingerprints computed over freshly minted but
    /// structurally parallel species.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for site in &self.inputs {
            site.is_sync().hash(&mut hasher);
            site.pattern.tag().hash(&mut hasher);
        }
        self.outputs.len().hash(&mut hasher);
        hasher.finish()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Builds a [`ReactionInfo`] from input sites and a type-erased body.
///
/// The body receives two vectors, both in the reaction's declared input
/// order: the bound values of every input site (including `Wildcard` ones,
/// which the caller is free to ignore), and the [`ReplyChannel`](crate::ReplyChannel)
/// of every *sync* input site, restricted to just those, i.e. the second
/// vector is shorter than the first whenever the reaction mixes async and
/// sync inputs.
#[derive(Default)]
pub struct ReactionBuilder {
    inputs: Vec<InputSite>,
    outputs: Vec<SpeciesId>,
    name: Option<String>,
}

impl ReactionBuilder {
    pub fn new() -> Self {
        ReactionBuilder {
            inputs: Vec::new(),
            outputs: Vec::new(),
            name: None,
        }
    }

    pub fn input(mut self, site: InputSite) -> Self {
        self.inputs.push(site);
        self
    }

    /// Declares that this reaction may emit on `species`, for diagnostics only.
    pub fn output(mut self, species: SpeciesId) -> Self {
        self.outputs.push(species);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn body(
        self,
        f: impl Fn(Vec<Box<dyn Any + Send>>, Vec<Box<dyn Any + Send>>) + Send + Sync + 'static,
    ) -> ReactionInfo {
        ReactionInfo {
            inputs: self.inputs,
            body: Arc::new(f),
            outputs: self.outputs,
            name: self.name,
        }
    }
}

/// Downcasts a type-erased argument back to its concrete type. A small
/// ergonomic helper for reaction bodies written directly against this core
/// API (a real lowering stage would generate this downcast itself).
pub fn take<V: 'static>(v: Box<dyn Any + Send>) -> V {
    *v.downcast::<V>()
        .unwrap_or_else(|_| panic!("reaction body argument type mismatch"))
}
