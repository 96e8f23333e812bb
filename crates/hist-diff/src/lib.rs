//! Diff engine for attribute-level record history.
//!
//! Compares two snapshots of a host record and produces a [`Diff`]: the set
//! of attributes whose value changed, each held as a [`TypedAttributeDiff`]
//! whose values are cast through the variant matching the attribute's
//! declared type.
//!
//! # Key Types
//!
//! - [`TypedValue`] / [`DiffVariant`] -- per-type value casting
//! - [`TypedAttributeDiff`] / [`AttributeChange`] -- one attribute's before/after pair
//! - [`DiffSchema`] / [`SchemaBuilder`] -- specialized schema for one record kind
//! - [`DiffSchemaPool`] / [`Customizations`] -- compute-once schema cache
//! - [`Diff`] -- attribute-unique collection of entries for one version
//! - [`DiffEngine`] -- `compute_diff` / `compute_creation_diff`
//! - [`HostSchema`] / [`StaticSchema`] -- the host's schema lookup

pub mod attribute_diff;
pub mod diff;
pub mod engine;
pub mod error;
pub mod host;
pub mod pool;
pub mod schema;
pub mod value;
pub mod variant;

pub use attribute_diff::{AttributeChange, TypedAttributeDiff};
pub use diff::Diff;
pub use engine::{DiffEngine, DEFAULT_IGNORED_ATTRIBUTES};
pub use error::{DiffError, DiffResult};
pub use hist_store::DiffType;
pub use host::{AssociationDescriptor, AssociationMacro, HostSchema, KindSchema, StaticSchema};
pub use pool::{Customization, Customizations, DiffSchemaPool};
pub use schema::{Accessor, BaseDiffKind, DiffHook, DiffSchema, SchemaBuilder};
pub use value::TypedValue;
pub use variant::DiffVariant;
