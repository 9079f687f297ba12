//! The owning aggregate: bag, reaction set, species binding, decision lock,
//! and the hand-off to the executor.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Level;

use crate::bag::{MoleculeBag, MoleculeInstance};
use crate::emitter::{EmitterInner, SpeciesId};
use crate::executor::{Executor, RayonExecutor};
use crate::matcher::try_fire;
use crate::pattern::ReactionInfo;
use crate::reply::ReplySlot;
use crate::Error;

/// Serializes activation across every join definition in the process, so
/// that "is this species already bound elsewhere" checks and the binding
/// commits they gate happen as one atomic step. Without this, two threads
/// racing to activate could each observe every species as unbound and both
/// proceed to bind, double-binding a species between two join definitions.
static ACTIVATION_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    /// Set while a reaction body is executing on this thread, so a sync
    /// emission performed *from within* a body can be routed to the
    /// `reply_executor` instead of the primary one, reducing the chance
    /// that nested blocking emits starve the primary pool. See
    /// `JoinDefinitionInner::route_submit`.
    static IN_REACTION_BODY: Cell<bool> = Cell::new(false);
}

fn level_from_verbosity(n: u8) -> Level {
    match n {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

pub(crate) struct JoinDefinitionInner {
    reactions: Vec<ReactionInfo>,
    bag: Mutex<MoleculeBag>,
    names: HashMap<SpeciesId, Option<String>>,
    executor: Arc<dyn Executor>,
    reply_executor: Option<Arc<dyn Executor>>,
    log_level: AtomicU8,
}

impl JoinDefinitionInner {
    fn log_enabled(&self, level: Level) -> bool {
        level <= level_from_verbosity(self.log_level.load(Ordering::Relaxed))
    }

    fn route_submit(&self, task: Box<dyn FnOnce() + Send + 'static>) -> Result<(), Error> {
        let reentrant = IN_REACTION_BODY.with(Cell::get);
        let target = if reentrant {
            self.reply_executor.as_deref().unwrap_or(&*self.executor)
        } else {
            &*self.executor
        };
        target.submit(task)
    }

    /// Runs one decision cycle: insert `value` for `species`, attempt to
    /// fire a reaction, and if one fires, hand it to the executor.
    pub(crate) fn decision_cycle(
        self: &Arc<Self>,
        species: SpeciesId,
        value: Box<dyn Any + Send>,
        reply: Option<ReplySlot>,
    ) -> Result<(), Error> {
        if self.log_enabled(Level::TRACE) {
            tracing::trace!(?species, "emission received");
        }

        let fired = {
            let mut bag = self.bag.lock();
            bag.add(species, value, reply);
            try_fire(&mut bag, &self.reactions)
        };

        let Some((reaction_idx, consumed)) = fired else {
            return Ok(());
        };

        if self.log_enabled(Level::DEBUG) {
            let name = self.reactions[reaction_idx].name().unwrap_or("<unnamed>");
            tracing::debug!(reaction = name, "reaction matched and fired");
        }

        let jd = self.clone();
        self.route_submit(Box::new(move || jd.run_reaction(reaction_idx, consumed)))
    }

    /// Runs off the decision lock, on an executor thread: invokes the
    /// reaction body, then sweeps any sync input it left unreplied.
    fn run_reaction(self: Arc<Self>, reaction_idx: usize, consumed: Vec<MoleculeInstance>) {
        let reaction = &self.reactions[reaction_idx];
        let mut values = Vec::with_capacity(consumed.len());
        let mut reply_args = Vec::new();
        let mut sinks = Vec::new();
        for instance in consumed {
            if let Some(slot) = instance.reply {
                sinks.push(slot.sink);
                reply_args.push(slot.body_arg);
            }
            values.push(instance.value);
        }
        let body = reaction.body.clone();

        IN_REACTION_BODY.with(|flag| flag.set(true));
        let result = catch_unwind(AssertUnwindSafe(|| body(values, reply_args)));
        IN_REACTION_BODY.with(|flag| flag.set(false));

        if result.is_err() && self.log_enabled(Level::ERROR) {
            let name = reaction.name().unwrap_or("<unnamed>");
            tracing::error!(reaction = name, "reaction body panicked");
        }

        for sink in sinks {
            sink.mark_no_reply();
        }
    }

    pub(crate) fn current_contents(&self) -> String {
        let bag = self.bag.lock();
        bag.format_contents(&self.names, &self.reactions)
    }

    pub(crate) fn set_log_level(&self, n: u8) {
        self.log_level.store(n, Ordering::Relaxed);
    }

    pub fn reaction_count(&self) -> usize {
        self.reactions.len()
    }

    pub fn species_count(&self) -> usize {
        self.bag.lock().species_count()
    }
}

/// A live join definition: owns its molecule bag and reaction set, and
/// routes every bound emitter's emissions through its decision cycle.
///
/// Cloning an emitter shares the binding; the `JoinDefinition` value
/// returned by [`activate`] is mostly useful for diagnostics and for
/// keeping the join definition alive.
#[derive(Clone)]
pub struct JoinDefinition {
    pub(crate) inner: Arc<JoinDefinitionInner>,
}

impl JoinDefinition {
    pub fn current_contents(&self) -> String {
        self.inner.current_contents()
    }

    pub fn set_log_level(&self, n: u8) {
        self.inner.set_log_level(n)
    }

    pub fn reaction_count(&self) -> usize {
        self.inner.reaction_count()
    }

    pub fn species_count(&self) -> usize {
        self.inner.species_count()
    }
}

/// The distinct input species across `reactions`, deduplicated by
/// `SpeciesId`: the same species is routinely an input of more than one
/// reaction in a join definition (e.g. the tutorial `counter` species is an
/// input of both its `incr` and `decr` reactions), and each such species
/// must still be bound exactly once.
fn input_species(reactions: &[ReactionInfo]) -> Vec<Arc<EmitterInner>> {
    let mut seen = std::collections::HashSet::new();
    reactions
        .iter()
        .flat_map(|r| r.inputs.iter())
        .map(|site| site.species.clone())
        .filter(|species| seen.insert(species.id))
        .collect()
}

fn check_nonlinear(reactions: &[ReactionInfo]) -> Result<(), Error> {
    for reaction in reactions {
        let mut seen = std::collections::HashSet::new();
        for site in &reaction.inputs {
            if !seen.insert(site.species_id()) {
                return Err(Error::Nonlinear {
                    species: site.species_id(),
                });
            }
        }
    }
    Ok(())
}

/// Activates a join definition over `reactions`, using `executor` for
/// reaction bodies and, if supplied, `reply_executor` for bodies submitted
/// from within an already-running reaction body (see §4.7: this avoids
/// pool starvation when bodies themselves perform sync emissions).
///
/// Atomic: either every input species across `reactions` becomes bound to
/// the new join definition, or none does.
pub fn activate(
    executor: Arc<dyn Executor>,
    reply_executor: Option<Arc<dyn Executor>>,
    reactions: Vec<ReactionInfo>,
) -> Result<JoinDefinition, Error> {
    check_nonlinear(&reactions)?;

    let _guard = ACTIVATION_LOCK.lock();

    let species = input_species(&reactions);
    for s in &species {
        if s.is_bound_elsewhere() {
            return Err(Error::AlreadyBound { species: s.id });
        }
    }

    let mut names = HashMap::new();
    for s in &species {
        names.insert(s.id, s.name.clone());
    }

    let inner = Arc::new(JoinDefinitionInner {
        reactions,
        bag: Mutex::new(MoleculeBag::new()),
        names,
        executor,
        reply_executor,
        log_level: AtomicU8::new(0),
    });

    for s in &species {
        s.bind(&inner);
    }

    tracing::debug!(
        reactions = inner.reactions.len(),
        species = species.len(),
        "join definition activated"
    );

    Ok(JoinDefinition { inner })
}

/// As [`activate`], using a fresh default [`RayonExecutor`] for reaction
/// bodies and no separate reply executor.
pub fn activate_default(reactions: Vec<ReactionInfo>) -> Result<JoinDefinition, Error> {
    activate(Arc::new(RayonExecutor::default()), None, reactions)
}
