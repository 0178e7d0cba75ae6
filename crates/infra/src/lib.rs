//! Infrastructure layer: the engine, its storage adapters, and configuration.

pub mod config;
pub mod engine;
pub mod event_store;


pub use config::{ConfigError, EngineConfig, PostgresConfig};
pub use engine::{CommitOutcome, Engine, EngineBuilder, EngineError, Staged};
