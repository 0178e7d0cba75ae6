//! The event-sourcing engine for one aggregate type.
//!
//! ## Flow
//!
//! ```text
//! read:    store.find_* -> group by entity_id -> sort by eventCreatedAt
//!          -> mapper -> decode -> reducer fold -> Entity
//!
//! command: create/dispatch -> synthesize RecordedEvent -> mapper -> decode
//!          -> reduce against prior state -> Staged
//!
//! commit:  before_commit hooks -> append event -> upsert snapshot
//!          -> on_committed hooks
//! ```
//!
//! The engine holds no per-aggregate state. Every read replays the log, and
//! two concurrent commits against the same prior entity are both appended
//! (last-writer-wins is the only arbitration).

mod command;
mod commit;
mod error;
mod projection;

use std::sync::Arc;

use eventide_core::{Clock, IdGenerator, Reducer, SystemClock, UuidV7Ids};
use eventide_events::{Mapper, Plugin};

use crate::config::EngineConfig;

pub use command::Staged;
pub use commit::CommitOutcome;
pub use error::EngineError;

/// Event-sourcing engine bound to one reducer, one store, and one
/// `entity_name`.
///
/// Built with [`Engine::builder`]. Collaborators are fixed at construction;
/// there is no runtime registration.
pub struct Engine<R: Reducer, S> {
    store: S,
    reducer: R,
    config: EngineConfig,
    mapper: Option<Arc<dyn Mapper>>,
    plugins: Vec<Arc<dyn Plugin<R::State>>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<R: Reducer, S> Engine<R, S> {
    pub fn builder(store: S, reducer: R, config: EngineConfig) -> EngineBuilder<R, S> {
        EngineBuilder::new(store, reducer, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn entity_name(&self) -> &str {
        &self.config.entity_name
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn reducer(&self) -> &R {
        &self.reducer
    }

    fn mapper(&self) -> Option<&dyn Mapper> {
        self.mapper.as_deref()
    }
}

impl<R: Reducer, S> core::fmt::Debug for Engine<R, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("mapper", &self.mapper.is_some())
            .field("plugins", &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Assembles an [`Engine`].
///
/// Plugins run in the order they are added.
pub struct EngineBuilder<R: Reducer, S> {
    store: S,
    reducer: R,
    config: EngineConfig,
    mapper: Option<Arc<dyn Mapper>>,
    plugins: Vec<Arc<dyn Plugin<R::State>>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<R: Reducer, S> EngineBuilder<R, S> {
    pub fn new(store: S, reducer: R, config: EngineConfig) -> Self {
        Self {
            store,
            reducer,
            config,
            mapper: None,
            plugins: Vec::new(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Ids),
        }
    }

    pub fn mapper(mut self, mapper: impl Mapper + 'static) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    pub fn shared_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn plugin(mut self, plugin: impl Plugin<R::State> + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn shared_plugin(mut self, plugin: Arc<dyn Plugin<R::State>>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn build(self) -> Engine<R, S> {
        Engine {
            store: self.store,
            reducer: self.reducer,
            config: self.config,
            mapper: self.mapper,
            plugins: self.plugins,
            clock: self.clock,
            ids: self.ids,
        }
    }
}
