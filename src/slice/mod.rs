//! Slices: a named unit of state plus the update functions that change it.
//!
//! [`create_slice`] returns a builder; [`SliceBuilder::build`] yields a
//! [`SliceResult`] holding the registrable [`Slice`] and one [`UpdateFn`] per
//! declared update name.

mod builder;
mod slice;

pub use builder::{create_slice, SliceBuilder, SliceResult, UpdateFn};
pub use slice::{Instruction, Reducer, ReducerPayload, Slice};
