//! The multiset store: one per join definition, mutated only under its
//! decision lock.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;

use crate::pattern::ReactionInfo;
use crate::reply::ReplySlot;
use crate::SpeciesId;

pub(crate) struct MoleculeInstance {
    pub(crate) seq: u64,
    pub(crate) value: Box<dyn Any + Send>,
    pub(crate) reply: Option<ReplySlot>,
}

/// A logical multiset per species within one join definition.
pub(crate) struct MoleculeBag {
    store: HashMap<SpeciesId, VecDeque<MoleculeInstance>>,
    next_seq: u64,
}

impl MoleculeBag {
    pub(crate) fn new() -> Self {
        MoleculeBag {
            store: HashMap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn add(
        &mut self,
        species: SpeciesId,
        value: Box<dyn Any + Send>,
        reply: Option<ReplySlot>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.store
            .entry(species)
            .or_default()
            .push_back(MoleculeInstance { seq, value, reply });
    }

    /// Candidates for `species`, oldest first.
    pub(crate) fn candidates(
        &self,
        species: SpeciesId,
    ) -> impl Iterator<Item = (usize, &MoleculeInstance)> {
        self.store
            .get(&species)
            .into_iter()
            .flat_map(|q| q.iter().enumerate())
    }

    /// Removes and returns the instance at `idx` within `species`'s queue.
    /// `idx` must have been observed via `candidates` on this same bag
    /// state (no intervening mutation); the matcher upholds this by
    /// removing every winning instance within the same lock acquisition
    /// that produced the match.
    pub(crate) fn remove_at(&mut self, species: SpeciesId, idx: usize) -> MoleculeInstance {
        self.store
            .get_mut(&species)
            .and_then(|q| q.remove(idx))
            .expect("matcher selected an instance that is no longer present")
    }

    pub(crate) fn species_count(&self) -> usize {
        self.store.len()
    }

    pub(crate) fn pending_count(&self, species: SpeciesId) -> usize {
        self.store.get(&species).map_or(0, VecDeque::len)
    }

    /// A human-readable snapshot of every pending instance, grouped by
    /// species, plus the reaction set, for `current_contents()` only.
    pub(crate) fn format_contents(
        &self,
        names: &HashMap<SpeciesId, Option<String>>,
        reactions: &[ReactionInfo],
    ) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "bag:");
        let mut species: Vec<_> = self.store.keys().copied().collect();
        species.sort_by_key(|s| format!("{s:?}"));
        for species_id in species {
            let count = self.pending_count(species_id);
            if count == 0 {
                continue;
            }
            let label = names
                .get(&species_id)
                .and_then(|n| n.as_deref())
                .unwrap_or("<unnamed>");
            let _ = writeln!(out, "  {species_id:?} ({label}): {count} pending");
        }
        let _ = writeln!(out, "reactions:");
        for (i, reaction) in reactions.iter().enumerate() {
            let label = reaction.name().unwrap_or("<unnamed>");
            let _ = writeln!(
                out,
                "  [{i}] {label}: {} input site(s), fingerprint={:#x}",
                reaction.inputs.len(),
                reaction.fingerprint()
            );
        }
        out
    }
}
