//! Value types shared by the vigil crates: label sets, sample series,
//! the composite query model and the duration codec.

pub mod duration;
pub mod query;
pub mod types;
