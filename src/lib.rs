/*!
`joincalc` is a join-calculus concurrency runtime: reactions fire atomically
over typed multisets of "molecules". A reaction names a set of input
species and fires once every one of them has a pending, pattern-matching
instance; firing atomically removes those instances, then runs the
reaction's body on a thread pool. Blocking ("synchronous") species round
trip a reply value back to the thread that emitted them.

```
use std::sync::Arc;

use joincalc::{activate_default, take, InputPattern, MoleculeEmitter, ReactionInfo};

let counter = MoleculeEmitter::<i64>::new(Some("counter"));
let incr = MoleculeEmitter::<()>::new(Some("incr"));

let counter_body = counter.clone();
let jd = activate_default(vec![ReactionInfo::builder()
    .input(counter.when(InputPattern::Variable))
    .input(incr.when(InputPattern::Wildcard))
    .name("counter+incr")
    .body(move |mut values, _replies| {
        let n: i64 = take(values.remove(0));
        let _ = counter_body.emit(n + 1);
    })])
.unwrap();

counter.emit(100).unwrap();
incr.emit(()).unwrap();
# let _ = jd;
```

# Status

This crate implements the join-definition runtime only: molecule store,
matcher, executor hand-off, and the blocking-molecule reply protocol.
Source-level syntax for declaring reactions (translating pattern-match
syntax into [`InputPattern`]/[`ReactionInfo`] values) is out of scope and
left to a higher-level lowering stage built on top of this crate's API.
*/

mod bag;
mod emitter;
mod error;
mod executor;
mod join_definition;
mod matcher;
mod pattern;
mod reply;

#[cfg(test)]
mod tests;

pub use emitter::{MoleculeEmitter, SpeciesId, SyncMoleculeEmitter};
pub use error::Error;
pub use executor::{Executor, ExecutorConfig, RayonExecutor};
pub use join_definition::{activate, activate_default, JoinDefinition};
pub use pattern::{take, InputPattern, InputSite, ReactionBuilder, ReactionInfo};
pub use reply::ReplyChannel;
