//! Given the bag and the reaction set, finds a set of concrete molecule
//! instances that satisfies some reaction's input pattern.

use rand::seq::SliceRandom;

use crate::bag::{MoleculeBag, MoleculeInstance};
use crate::pattern::ReactionInfo;
use crate::SpeciesId;

/// Single-shot: attempts to fire at most one reaction. Called once per
/// decision cycle, with the new instance already inserted into `bag`.
///
/// Iterates reactions in a randomized order each call (favoring liveness
/// over any particular reaction's priority, see module docs), and for the
/// first reaction whose every input site finds a satisfying candidate,
/// removes those candidates from `bag` in the same call and returns them
/// alongside the reaction's index. Positions of the same species across
/// reactions are independent; within one reaction no two sites share a
/// species, so removing each site's winner cannot invalidate another site's
/// candidate search.
pub(crate) fn try_fire(
    bag: &mut MoleculeBag,
    reactions: &[ReactionInfo],
) -> Option<(usize, Vec<MoleculeInstance>)> {
    let mut order: Vec<usize> = (0..reactions.len()).collect();
    order.shuffle(&mut rand::thread_rng());

    for reaction_idx in order {
        if let Some(picks) = try_match(bag, &reactions[reaction_idx]) {
            let consumed = picks
                .into_iter()
                .map(|(species, idx)| bag.remove_at(species, idx))
                .collect();
            return Some((reaction_idx, consumed));
        }
    }
    None
}

fn try_match(bag: &MoleculeBag, reaction: &ReactionInfo) -> Option<Vec<(SpeciesId, usize)>> {
    let mut picks = Vec::with_capacity(reaction.inputs.len());
    for site in &reaction.inputs {
        let species = site.species_id();
        let found = bag
            .candidates(species)
            .find(|(_, instance)| site.pattern.matches(&*instance.value))?;
        picks.push((species, found.0));
    }
    Some(picks)
}
