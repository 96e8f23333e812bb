//! Foundation types for attribute-level record history.
//!
//! Every other crate in the workspace depends on `hist-types`. The types here
//! describe host-owned records only through their kind tag, identifier, and
//! attribute map; nothing in this crate knows how records are stored.
//!
//! # Key Types
//!
//! - [`RecordKind`] / [`RecordId`] / [`RecordRef`] — polymorphic record reference
//! - [`Record`] — a snapshot of one record's attributes
//! - [`AttributeType`] / [`AttributeDescriptor`] — declared attribute types
//! - [`VersionId`] / [`DiffId`] — UUID v7 identifiers for persisted history
//! - [`VersionNumber`] — per-target version sequence number

pub mod attribute;
pub mod error;
pub mod ids;
pub mod record;

pub use attribute::{AttributeDescriptor, AttributeType};
pub use error::TypeError;
pub use ids::{DiffId, VersionId, VersionNumber, CREATION_VERSION};
pub use record::{Record, RecordId, RecordKind, RecordRef};
