//! Compute-once cache of specialized diff schemas.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use hist_types::RecordKind;
use tracing::debug;

use crate::host::HostSchema;
use crate::schema::{BaseDiffKind, DiffSchema, SchemaBuilder};

/// A host-supplied schema extension.
pub type Customization = Arc<dyn Fn(&mut SchemaBuilder) + Send + Sync>;

/// Per-record-kind schema extensions, applied in registration order the
/// first time a kind's schema is resolved.
#[derive(Clone, Default)]
pub struct Customizations {
    by_kind: HashMap<RecordKind, Vec<Customization>>,
}

impl Customizations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: impl Into<RecordKind>,
        customization: impl Fn(&mut SchemaBuilder) + Send + Sync + 'static,
    ) -> &mut Self {
        self.by_kind
            .entry(kind.into())
            .or_default()
            .push(Arc::new(customization));
        self
    }

    pub fn for_kind(&self, kind: &RecordKind) -> &[Customization] {
        self.by_kind.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of registered customizations.
    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Customizations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Customizations")
            .field("kinds", &self.by_kind.len())
            .field("total", &self.len())
            .finish()
    }
}

type PoolKey = (RecordKind, BaseDiffKind);
type Slot = Arc<OnceLock<Arc<DiffSchema>>>;

/// Cache mapping `(record kind, base diff kind)` to its specialized schema.
///
/// Each key is built at most once, even when several threads resolve it
/// for the first time concurrently; all of them receive the same `Arc`.
/// Entries are never evicted.
pub struct DiffSchemaPool {
    host: Arc<dyn HostSchema>,
    customizations: Customizations,
    slots: RwLock<HashMap<PoolKey, Slot>>,
    builds: AtomicUsize,
}

impl DiffSchemaPool {
    pub fn new(host: Arc<dyn HostSchema>, customizations: Customizations) -> Self {
        Self {
            host,
            customizations,
            slots: RwLock::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn host(&self) -> &Arc<dyn HostSchema> {
        &self.host
    }

    /// The specialized schema for `kind` over `base`, built on first use.
    pub fn resolve(&self, kind: &RecordKind, base: &BaseDiffKind) -> Arc<DiffSchema> {
        let slot = self.slot(kind, base);
        Arc::clone(slot.get_or_init(|| Arc::new(self.build(kind, base))))
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many schemas have been built since the pool was created.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn slot(&self, kind: &RecordKind, base: &BaseDiffKind) -> Slot {
        let key = (kind.clone(), base.clone());
        {
            // The map only ever grows, so a poisoned guard is still consistent.
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = slots.get(&key) {
                return Arc::clone(slot);
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    fn build(&self, kind: &RecordKind, base: &BaseDiffKind) -> DiffSchema {
        let mut builder = SchemaBuilder::new(
            kind.clone(),
            base.clone(),
            self.host.attributes(kind),
            self.host.associations(kind),
        );
        let customizations = self.customizations.for_kind(kind);
        for customization in customizations {
            customization(&mut builder);
        }
        let schema = builder.build();
        self.builds.fetch_add(1, Ordering::SeqCst);
        debug!(
            kind = %kind,
            base = %base,
            attributes = schema.attributes().len(),
            customizations = customizations.len(),
            "diff schema built"
        );
        schema
    }
}

impl fmt::Debug for DiffSchemaPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffSchemaPool")
            .field("cached", &self.len())
            .field("builds", &self.build_count())
            .field("customizations", &self.customizations)
            .finish()
    }
}
