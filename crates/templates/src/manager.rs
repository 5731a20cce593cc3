//! The Template registry
//!
//! One `TemplateManager` is shared by every pipeline stage. Buckets are
//! created on first sight of a `(ODID, fingerprint)` pair and dropped when
//! their source closes; each bucket serializes its own mutations behind a
//! `parking_lot` mutex so unrelated sources never contend.
//!
//! Reclamation protocol: a superseded or withdrawn version is pruned only
//! while its slot lock is held, and `resolve` takes its in-flight reference
//! under the same lock. "check count, then free" and "increment count" are
//! therefore mutually exclusive per Template, which is what makes the
//! reference count trustworthy.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use flowcol_protocol::{Template, TemplateKind, MIN_DATA_SET_ID};

use crate::error::TemplateError;
use crate::key::TemplateKey;

/// Outcome of inserting a Template into the registry
#[derive(Debug, Clone)]
pub enum Insertion {
    /// First announcement under this Template ID
    Added(Arc<Template>),
    /// Byte-identical to the active version; the existing handle is returned
    /// unchanged
    Refreshed(Arc<Template>),
    /// Layout changed; the previous version is superseded but stays valid
    /// for Messages still holding it
    Superseded(Arc<Template>),
}

impl Insertion {
    /// The active Template after the insertion
    pub fn template(&self) -> &Arc<Template> {
        match self {
            Insertion::Added(t) | Insertion::Refreshed(t) | Insertion::Superseded(t) => t,
        }
    }
}

/// Active and superseded versions of one Template ID
struct Slot {
    current: Arc<Template>,
    /// Older versions still referenced by in-flight Messages, newest last
    superseded: Vec<Arc<Template>>,
}

impl Slot {
    fn new(current: Arc<Template>) -> Self {
        Self {
            current,
            superseded: Vec::new(),
        }
    }

    /// Drop superseded versions nobody references anymore
    fn prune(&mut self) {
        self.superseded.retain(|t| t.references() > 0);
    }

    fn supersede(&mut self, next: Arc<Template>) {
        let old = std::mem::replace(&mut self.current, next);
        old.withdraw();
        if old.references() > 0 {
            self.superseded.push(old);
        }
        self.prune();
    }
}

/// All templates of one `(ODID, fingerprint)` pair
struct Bucket {
    slots: Mutex<HashMap<u16, Slot>>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

/// Template ID allocator for one synthetic domain
///
/// Withdrawn IDs are reused LIFO before the counter grows, bounding ID-space
/// consumption under long-running template churn.
struct IdAllocator {
    next: u32,
    free: Vec<u16>,
}

impl IdAllocator {
    fn new() -> Self {
        Self {
            next: u32::from(MIN_DATA_SET_ID),
            free: Vec::new(),
        }
    }

    fn allocate(&mut self) -> Option<u16> {
        if let Some(id) = self.free.pop() {
            return Some(id);
        }
        if self.next > u32::from(u16::MAX) {
            return None;
        }
        let id = self.next as u16;
        self.next += 1;
        Some(id)
    }

    fn release(&mut self, id: u16) {
        self.free.push(id);
    }
}

/// Registry of active Templates across all sources and domains
///
/// The single structure mutated by more than one stage concurrently; see the
/// module docs for the locking protocol.
pub struct TemplateManager {
    buckets: RwLock<HashMap<TemplateKey, Arc<Bucket>>>,
    allocators: Mutex<HashMap<u32, IdAllocator>>,
}

impl TemplateManager {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            allocators: Mutex::new(HashMap::new()),
        }
    }

    /// Parse one (Options) Template Record without touching the registry
    ///
    /// Returns the Template and the octets consumed. Stages that build their
    /// own announcements use this before `add`.
    pub fn create(buf: &[u8], kind: TemplateKind) -> Result<(Template, usize), TemplateError> {
        Ok(Template::parse(buf, kind)?)
    }

    fn bucket(&self, key: &TemplateKey) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.read().get(key) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write();
        Arc::clone(buckets.entry(*key).or_insert_with(|| Arc::new(Bucket::new())))
    }

    /// Insert a Template, superseding any active version with the same ID
    ///
    /// Prefer `update` on the receive path: `add` replaces unconditionally,
    /// without the byte-identical refresh check.
    pub fn add(&self, key: &TemplateKey, template: Template) -> Insertion {
        let id = template.id();
        let next = Arc::new(template);
        let bucket = self.bucket(key);
        let mut slots = bucket.slots.lock();
        match slots.get_mut(&id) {
            Some(slot) => {
                slot.supersede(Arc::clone(&next));
                debug!(odid = key.odid, template_id = id, "template superseded");
                Insertion::Superseded(next)
            }
            None => {
                slots.insert(id, Slot::new(Arc::clone(&next)));
                debug!(odid = key.odid, template_id = id, "template added");
                Insertion::Added(next)
            }
        }
    }

    /// Insert a Template, returning the existing handle when the layout is
    /// byte-identical to the active version
    ///
    /// This is the receive-path operation: exporters retransmit unchanged
    /// Templates every refresh interval, and a refresh must not churn
    /// references or supersede anything.
    pub fn update(&self, key: &TemplateKey, template: Template) -> Insertion {
        let id = template.id();
        let bucket = self.bucket(key);
        let mut slots = bucket.slots.lock();
        match slots.get_mut(&id) {
            Some(slot) if slot.current.same_layout(&template) => {
                Insertion::Refreshed(Arc::clone(&slot.current))
            }
            Some(slot) => {
                let next = Arc::new(template);
                slot.supersede(Arc::clone(&next));
                debug!(odid = key.odid, template_id = id, "template superseded");
                Insertion::Superseded(next)
            }
            None => {
                let next = Arc::new(template);
                slots.insert(id, Slot::new(Arc::clone(&next)));
                debug!(odid = key.odid, template_id = id, "template added");
                Insertion::Added(next)
            }
        }
    }

    /// Look up the active Template for one ID
    ///
    /// Does not take an in-flight reference; callers that retain the handle
    /// across a queue boundary use `resolve` instead.
    pub fn get(&self, key: &TemplateKey, template_id: u16) -> Option<Arc<Template>> {
        let bucket = Arc::clone(self.buckets.read().get(key)?);
        let slots = bucket.slots.lock();
        slots.get(&template_id).map(|s| Arc::clone(&s.current))
    }

    /// Look up the active Template and take an in-flight reference on it
    ///
    /// The increment happens under the slot lock, so it cannot race a
    /// concurrent supersede-and-prune of the same Template.
    pub fn resolve(&self, key: &TemplateKey, template_id: u16) -> Option<Arc<Template>> {
        let bucket = Arc::clone(self.buckets.read().get(key)?);
        let slots = bucket.slots.lock();
        let slot = slots.get(&template_id)?;
        slot.current.reference_inc();
        Some(Arc::clone(&slot.current))
    }

    /// Withdraw one Template ID
    ///
    /// The version stays valid for Messages already holding it and is pruned
    /// once its reference count reaches zero.
    pub fn remove(&self, key: &TemplateKey, template_id: u16) -> Result<(), TemplateError> {
        let bucket = self
            .buckets
            .read()
            .get(key)
            .map(Arc::clone)
            .ok_or(TemplateError::NotFound {
                odid: key.odid,
                template_id,
            })?;
        let mut slots = bucket.slots.lock();
        let slot = slots.remove(&template_id).ok_or(TemplateError::NotFound {
            odid: key.odid,
            template_id,
        })?;
        slot.current.withdraw();
        debug!(odid = key.odid, template_id, "template withdrawn");
        Ok(())
    }

    /// Withdraw every Template of one kind announced by this source
    ///
    /// This is the "withdraw all" record (Template ID 2 or 3, field count 0).
    pub fn remove_all(&self, key: &TemplateKey, kind: TemplateKind) {
        let Some(bucket) = self.buckets.read().get(key).map(Arc::clone) else {
            return;
        };
        let mut slots = bucket.slots.lock();
        slots.retain(|_, slot| {
            if slot.current.kind() != kind {
                return true;
            }
            slot.current.withdraw();
            false
        });
        debug!(odid = key.odid, ?kind, "all templates withdrawn");
    }

    /// Drop every Template announced by this source (session close)
    pub fn remove_source(&self, key: &TemplateKey) {
        if let Some(bucket) = self.buckets.write().remove(key) {
            let mut slots = bucket.slots.lock();
            for slot in slots.values_mut() {
                slot.current.withdraw();
            }
            slots.clear();
            debug!(odid = key.odid, fingerprint = key.fingerprint, "source templates dropped");
        }
    }

    /// Drop every Template of one Observation Domain, across all sources
    pub fn remove_all_for_domain(&self, odid: u32) {
        let keys: Vec<TemplateKey> = self
            .buckets
            .read()
            .keys()
            .filter(|k| k.odid == odid)
            .copied()
            .collect();
        for key in keys {
            self.remove_source(&key);
        }
    }

    /// Prune superseded versions whose reference count reached zero
    ///
    /// Pruning also happens opportunistically on every mutation; this sweep
    /// exists for long idle periods.
    pub fn prune(&self) {
        let buckets: Vec<Arc<Bucket>> = self.buckets.read().values().map(Arc::clone).collect();
        for bucket in buckets {
            let mut slots = bucket.slots.lock();
            for slot in slots.values_mut() {
                slot.prune();
            }
        }
    }

    /// Number of active (non-withdrawn, non-superseded) Templates
    pub fn active_count(&self) -> usize {
        let buckets: Vec<Arc<Bucket>> = self.buckets.read().values().map(Arc::clone).collect();
        buckets.iter().map(|b| b.slots.lock().len()).sum()
    }

    /// Number of superseded versions still held for in-flight Messages
    pub fn superseded_count(&self) -> usize {
        let buckets: Vec<Arc<Bucket>> = self.buckets.read().values().map(Arc::clone).collect();
        buckets
            .iter()
            .map(|b| b.slots.lock().values().map(|s| s.superseded.len()).sum::<usize>())
            .sum()
    }

    // =========================================================================
    // Template ID allocation for synthesizing stages
    // =========================================================================

    /// Allocate a Template ID (>= 256) for a synthetic domain
    ///
    /// Recently released IDs are reused LIFO before new values are drawn.
    pub fn allocate_id(&self, odid: u32) -> Result<u16, TemplateError> {
        let mut allocators = self.allocators.lock();
        allocators
            .entry(odid)
            .or_insert_with(IdAllocator::new)
            .allocate()
            .ok_or(TemplateError::IdSpaceExhausted { odid })
    }

    /// Return a Template ID to the domain's free-list
    pub fn release_id(&self, odid: u32, id: u16) {
        let mut allocators = self.allocators.lock();
        allocators
            .entry(odid)
            .or_insert_with(IdAllocator::new)
            .release(id);
    }
}

impl Default for TemplateManager {
    fn default() -> Self {
        Self::new()
    }
}
