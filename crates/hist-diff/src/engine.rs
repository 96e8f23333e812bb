//! Snapshot comparison: `compute_diff` and `compute_creation_diff`.

use std::collections::BTreeSet;
use std::sync::Arc;

use hist_types::{Record, RecordKind};
use tracing::debug;

use crate::diff::Diff;
use crate::error::{DiffError, DiffResult};
use crate::host::HostSchema;
use crate::pool::{Customizations, DiffSchemaPool};
use crate::schema::{BaseDiffKind, DiffSchema};

/// Bookkeeping attributes excluded from every diff unless configured
/// otherwise.
pub const DEFAULT_IGNORED_ATTRIBUTES: [&str; 3] = ["id", "created_at", "updated_at"];

/// Builds diffs between record snapshots through a shared schema pool.
#[derive(Debug)]
pub struct DiffEngine {
    pool: Arc<DiffSchemaPool>,
    base: BaseDiffKind,
    ignored: BTreeSet<String>,
}

impl DiffEngine {
    pub fn new(host: Arc<dyn HostSchema>, customizations: Customizations) -> Self {
        Self::with_pool(Arc::new(DiffSchemaPool::new(host, customizations)))
    }

    pub fn with_pool(pool: Arc<DiffSchemaPool>) -> Self {
        Self {
            pool,
            base: BaseDiffKind::default(),
            ignored: DEFAULT_IGNORED_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the engine-wide ignored set.
    pub fn with_ignored_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_base(mut self, base: BaseDiffKind) -> Self {
        self.base = base;
        self
    }

    pub fn pool(&self) -> &Arc<DiffSchemaPool> {
        &self.pool
    }

    pub fn base(&self) -> &BaseDiffKind {
        &self.base
    }

    pub fn schema_for(&self, kind: &RecordKind) -> Arc<DiffSchema> {
        self.pool.resolve(kind, &self.base)
    }

    pub fn is_ignored(&self, schema: &DiffSchema, attribute: &str) -> bool {
        self.ignored.contains(attribute) || schema.is_ignored(attribute)
    }

    /// Whether changes to `attribute` belong in a diff: it is a declared
    /// attribute (not an association) and is not ignored.
    pub fn is_tracked(&self, schema: &DiffSchema, attribute: &str) -> bool {
        schema.attribute_type(attribute).is_some() && !self.is_ignored(schema, attribute)
    }

    /// A creation diff for `to`. It never carries attribute entries.
    pub fn compute_creation_diff(&self, to: &Record) -> Diff {
        Diff::creation(to.reference.clone())
    }

    /// The update diff from `from` to `to`, or a creation diff when there
    /// is no prior snapshot.
    ///
    /// One entry is produced per declared, non-ignored attribute whose value
    /// changed. Values that differ in raw form but cast to the same typed
    /// value (`"1"` and `1` on an integer) produce no entry.
    pub fn compute_diff(&self, from: Option<&Record>, to: &Record) -> DiffResult<Diff> {
        let Some(from) = from else {
            return Ok(self.compute_creation_diff(to));
        };
        if from.reference != to.reference {
            return Err(DiffError::TargetMismatch {
                from: from.reference.clone(),
                to: to.reference.clone(),
            });
        }

        let schema = self.schema_for(to.kind());
        let mut diff = Diff::update(to.reference.clone());
        for descriptor in schema.attributes() {
            let name = descriptor.name.as_str();
            if self.is_ignored(&schema, name) {
                continue;
            }
            let (old, new) = (from.get(name), to.get(name));
            if old == new {
                continue;
            }
            let entry = schema.typed_entry(name, old, new)?;
            if entry.is_noop() {
                continue;
            }
            diff.push(entry)?;
        }
        debug!(
            target_ref = %to.reference,
            entries = diff.len(),
            "diff computed"
        );
        Ok(diff)
    }

    /// Run the target schema's hooks, then validate. Called before a diff
    /// is persisted.
    pub fn prepare(&self, diff: &mut Diff) -> DiffResult<()> {
        let schema = self.schema_for(&diff.target().kind);
        schema.run_hooks(diff)?;
        diff.validate()
    }
}
