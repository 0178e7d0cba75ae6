//! `eventide-events`: event mechanics shared by the engine and its adapters.
//!
//! - [`Event`]: the typed, current-revision sum type a reducer consumes
//! - [`RecordedEvent`]: the append-only record stored in the log
//! - [`Mapper`]: read-time revision mapping
//! - [`Plugin`]: commit lifecycle hooks

pub mod envelope;
pub mod event;
pub mod mapper;
pub mod plugin;

pub use envelope::RecordedEvent;
pub use event::{DecodeError, EncodeError, EncodedEvent, Event, decode, encode};
pub use mapper::{Mapper, RevisionMapper, map_event};
pub use plugin::{CommitContext, HookDecision, Plugin};
