//! High-level SDK for attribute-level record history.
//!
//! [`History`] is the entry point for host applications: it owns the
//! schema pool, the diff engine, and the version ledger, and exposes the
//! record / merge / lookup / reconstruction operations behind one API.
//! Behaviour is tuned through [`EngineConfig`].

pub mod config;
pub mod error;
pub mod history;

pub use config::EngineConfig;
pub use error::{SdkError, SdkResult};
pub use history::{History, HistoryBuilder, SaveOutcome};

// Re-export key types
pub use hist_diff::{
    AssociationDescriptor, AttributeChange, Customizations, Diff, DiffVariant, HostSchema,
    SchemaBuilder, StaticSchema, TypedValue,
};
pub use hist_ledger::{HistoricalValue, ValidationReport, Version};
pub use hist_merge::{ChangeSet, MergeOutcome};
pub use hist_store::{HistoryStore, InMemoryHistoryStore};
pub use hist_types::{AttributeType, Record, RecordKind, RecordRef, VersionNumber};
