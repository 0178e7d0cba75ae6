//! `eventide-core`: pure building blocks of the projection engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod reducer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::DomainError;
pub use id::{EntityId, EventId, IdGenerator, UuidV7Ids};
pub use reducer::{FnReducer, Reducer, fold};
