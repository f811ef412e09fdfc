//! Thin helpers over the `log` facade for collection events. Kept
//! separate from `gc.rs` so call sites read as `logging::cycle_start`
//! rather than raw `log::debug!` with ad hoc formatting scattered
//! around the tracing loop.

use crate::gc::Generation;

pub fn cycle_start(generation: Generation) {
    log::debug!("gc: {:?} collection starting", generation);
}

pub fn cycle_end(generation: Generation, used_bytes: usize, capacity_bytes: usize) {
    log::debug!(
        "gc: {:?} collection finished, {}/{} bytes live",
        generation,
        used_bytes,
        capacity_bytes
    );
}

pub fn allocation_failure(requested: usize) {
    log::warn!("gc: allocation of {requested} bytes failed, requesting a collection");
}
