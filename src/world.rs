// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World: central entity and archetype storage

use std::cell::RefCell;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::apply::{self, ApplyFilter, ApplyState, Expr};
use crate::archetype::ArchetypeTable;
use crate::column::{ComponentData, Value};
use crate::command::{Command, CommandQueue};
use crate::entity::{EntityAllocator, EntityId};
use crate::error::Result;
use crate::hooks::{HookBus, HookHandle};
use crate::mask::BitMask;
use crate::query::{CachedQueryResult, QueryCacheStats, QuerySignature, TableView};
use crate::registry::{ComponentDef, ComponentId, ComponentRegistry, FieldRef};

/// Created/destroyed id sets returned by `flush_changes`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub created: Vec<EntityId>,
    pub destroyed: Vec<EntityId>,
}

/// Central ECS world
///
/// Owns the component registry, the entity directory, every archetype table,
/// the hook bus and the deferred command queue. All operations are
/// single-threaded by contract; re-entrancy exists only across `for_each`
/// callbacks, where structural mutation is deferred to the outermost exit.
pub struct World {
    registry: ComponentRegistry,

    /// Monotone id source; ids are never reused
    allocator: EntityAllocator,

    /// Currently-live ids, including entities with no components
    known: AHashSet<EntityId>,

    /// Entity id -> archetype index; absent for component-less entities
    placement: AHashMap<EntityId, usize>,

    /// All archetypes in the world, append-only
    archetypes: Vec<ArchetypeTable>,

    /// Maps mask keys to archetype indices
    archetype_index: AHashMap<String, usize>,

    /// Structural epoch, bumped on every archetype creation
    epoch: u64,

    /// Query result cache keyed by signature
    query_cache: RefCell<AHashMap<String, CachedQueryResult>>,

    /// Lifecycle observers, pending buffers and removal tombstones
    hooks: HookBus,

    /// Structural ops captured while iteration is active
    deferred: CommandQueue,

    /// Nesting depth of active `for_each` calls
    iter_depth: u32,

    /// Persisted random streams for the bulk apply engine
    apply_state: ApplyState,

    /// Change-tracking filter mask; empty = tracking disabled
    tracking: BitMask,
    created: AHashSet<EntityId>,
    destroyed: AHashSet<EntityId>,
}

/// Guaranteed-release depth counter for iteration
struct DepthGuard {
    depth: *mut u32,
}

impl DepthGuard {
    fn enter(depth: &mut u32) -> Self {
        *depth += 1;
        Self {
            depth: depth as *mut u32,
        }
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        // Safety: the world outlives every guard; single-threaded.
        unsafe {
            *self.depth -= 1;
        }
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            registry: ComponentRegistry::new(),
            allocator: EntityAllocator::new(),
            known: AHashSet::new(),
            placement: AHashMap::new(),

            // Start with reasonable defaults to avoid resize spikes
            archetypes: Vec::with_capacity(64),
            archetype_index: AHashMap::with_capacity(64),

            epoch: 0,
            // Pre-allocate query cache - most apps have few unique queries
            query_cache: RefCell::new(AHashMap::with_capacity(32)),
            hooks: HookBus::new(),
            deferred: CommandQueue::new(),
            iter_depth: 0,
            apply_state: ApplyState::new(),
            tracking: BitMask::new(),
            created: AHashSet::new(),
            destroyed: AHashSet::new(),
        }
    }

    // ========== Component definitions ==========

    /// Define a data-less marker component.
    pub fn define_tag(&mut self, name: &str) -> ComponentDef {
        self.registry.define_tag(name)
    }

    /// Define a component whose fields all share one type token.
    pub fn define_uniform(
        &mut self,
        name: &str,
        kind: &str,
        fields: &[&str],
    ) -> Result<ComponentDef> {
        self.registry.define_uniform(name, kind, fields)
    }

    /// Define a component with per-field type tokens.
    pub fn define_schema(&mut self, name: &str, fields: &[(&str, &str)]) -> Result<ComponentDef> {
        self.registry.define_schema(name, fields)
    }

    /// Resolve a field name to a pre-resolved accessor.
    pub fn field(&self, def: ComponentDef, name: &str) -> Option<FieldRef> {
        self.registry.field(def, name)
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // ========== Lifecycle ==========

    /// Create an entity with no components. Fires no hooks.
    pub fn create_entity(&mut self) -> EntityId {
        let id = self.allocator.allocate();
        self.known.insert(id);
        id
    }

    /// Create an entity and write its whole component set in one row.
    ///
    /// One add event is pended per distinct component; when a component
    /// appears twice the later data wins but only one event is produced.
    pub fn create_entity_with(
        &mut self,
        components: &[(ComponentDef, ComponentData)],
    ) -> EntityId {
        #[cfg(feature = "profiling")]
        let span = info_span!(
            "world.create_entity_with",
            components = components.len(),
            archetype_count = self.archetypes.len()
        );
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let id = self.allocator.allocate();
        self.known.insert(id);
        if components.is_empty() {
            return id;
        }

        // Later data wins for duplicate components
        let mut by_component: SmallVec<[(ComponentId, &ComponentData); 8]> = SmallVec::new();
        for (def, row_data) in components {
            match by_component.iter_mut().find(|(c, _)| *c == def.id()) {
                Some(slot) => slot.1 = row_data,
                None => by_component.push((def.id(), row_data)),
            }
        }

        let mask = BitMask::from_indices(by_component.iter().map(|(c, _)| c.index()));
        let arch_id = self.get_or_create_archetype(mask);
        let table = &mut self.archetypes[arch_id];
        let row = table.allocate_row(id);
        for (cid, set) in table.column_sets_mut() {
            let row_data = by_component
                .iter()
                .find(|(c, _)| c == cid)
                .map(|(_, d)| *d);
            set.write_row(row, row_data);
        }
        self.placement.insert(id, arch_id);

        for (cid, _) in &by_component {
            self.hooks.pend_add(*cid, id);
        }
        if !self.tracking.is_empty() && self.archetypes[arch_id].mask().overlaps(&self.tracking) {
            self.created.insert(id);
        }
        id
    }

    /// Destroy an entity. Deferred while iteration is active; silent for
    /// unknown ids.
    pub fn destroy_entity(&mut self, id: EntityId) {
        if self.iter_depth > 0 {
            self.deferred.push(Command::Destroy(id));
            return;
        }
        if !self.known.remove(&id) {
            return;
        }
        let Some(arch_id) = self.placement.remove(&id) else {
            return;
        };

        let mask = self.archetypes[arch_id].mask().clone();
        let row = self.archetypes[arch_id]
            .row_of(id)
            .expect("BUG: directory placement without a row mapping");

        for bit in mask.ones() {
            let cid = ComponentId(bit);
            if self.hooks.has_remove_observers(cid) {
                let row_data = self.archetypes[arch_id]
                    .read_component(row, cid)
                    .unwrap_or_default();
                self.hooks.store_tombstone(id, cid, row_data);
            }
            self.hooks.pend_remove(cid, id);
        }

        self.archetypes[arch_id].remove_row(row);

        if !self.tracking.is_empty() && mask.overlaps(&self.tracking) {
            self.destroyed.insert(id);
        }
    }

    // ========== Structure ==========

    /// Add a component to an entity.
    ///
    /// If the entity already has the component this is an in-place row
    /// overwrite: no migration, no hook, immediate even during iteration.
    /// A true add migrates the entity (deferred while iterating) and pends
    /// one add event.
    pub fn add_component(&mut self, id: EntityId, def: ComponentDef, data: Option<ComponentData>) {
        let cid = def.id();

        // In-place overwrite path
        if let Some(&arch_id) = self.placement.get(&id) {
            if self.archetypes[arch_id].mask().contains(cid.index()) {
                let table = &mut self.archetypes[arch_id];
                let row = table
                    .row_of(id)
                    .expect("BUG: directory placement without a row mapping");
                if let Some(set) = table.column_set_mut(cid) {
                    set.write_row(row, data.as_ref());
                }
                return;
            }
        }

        if self.iter_depth > 0 {
            self.deferred.push(Command::Add {
                entity: id,
                component: cid,
                data,
            });
            return;
        }
        if !self.known.contains(&id) {
            return;
        }

        match self.placement.get(&id).copied() {
            None => {
                // Singleton archetype {C}; a first-time add, so it does fire
                let arch_id =
                    self.get_or_create_archetype(BitMask::from_indices([cid.index()]));
                let table = &mut self.archetypes[arch_id];
                let row = table.allocate_row(id);
                for (c, set) in table.column_sets_mut() {
                    set.write_row(row, if *c == cid { data.as_ref() } else { None });
                }
                self.placement.insert(id, arch_id);
                self.hooks.pend_add(cid, id);
            }
            Some(old_arch) => {
                let mut mask = self.archetypes[old_arch].mask().clone();
                mask.set(cid.index());
                let target = self.get_or_create_archetype(mask);
                self.move_entity(id, old_arch, target, Some((cid, data.as_ref())));
                self.hooks.pend_add(cid, id);
            }
        }
    }

    /// Remove a component from an entity. Deferred while iteration is
    /// active; silent no-op if the entity lacks the component.
    pub fn remove_component(&mut self, id: EntityId, def: ComponentDef) {
        let cid = def.id();
        if self.iter_depth > 0 {
            self.deferred.push(Command::Remove {
                entity: id,
                component: cid,
            });
            return;
        }
        let Some(&arch_id) = self.placement.get(&id) else {
            return;
        };
        if !self.archetypes[arch_id].mask().contains(cid.index()) {
            return;
        }

        let row = self.archetypes[arch_id]
            .row_of(id)
            .expect("BUG: directory placement without a row mapping");
        if self.hooks.has_remove_observers(cid) {
            let row_data = self.archetypes[arch_id]
                .read_component(row, cid)
                .unwrap_or_default();
            self.hooks.store_tombstone(id, cid, row_data);
        }
        self.hooks.pend_remove(cid, id);

        let src_mask = self.archetypes[arch_id].mask().clone();
        if src_mask.count_ones() == 1 {
            self.archetypes[arch_id].remove_row(row);
            self.placement.remove(&id);
        } else {
            let mut mask = src_mask.clone();
            mask.unset(cid.index());
            let target = self.get_or_create_archetype(mask);
            self.move_entity(id, arch_id, target, None);
        }

        // Removal counts as destruction for tracking purposes, even though
        // the entity stays alive in the reduced archetype
        if !self.tracking.is_empty() && src_mask.overlaps(&self.tracking) {
            self.destroyed.insert(id);
        }
    }

    /// Check if entity has a specific component
    pub fn has_component(&self, id: EntityId, def: ComponentDef) -> bool {
        self.placement
            .get(&id)
            .is_some_and(|&arch_id| self.archetypes[arch_id].mask().contains(def.id().index()))
    }

    // ========== Access ==========

    /// Read an entity's component as a fresh record.
    ///
    /// Falls back to the removal tombstone for rows removed since the last
    /// `commit_removals`, so remove-observers can read the deceased state.
    /// Live tag membership reads as an empty record.
    pub fn get_component(&self, id: EntityId, def: ComponentDef) -> Option<ComponentData> {
        let cid = def.id();
        if let Some(&arch_id) = self.placement.get(&id) {
            let table = &self.archetypes[arch_id];
            if table.mask().contains(cid.index()) {
                let row = table
                    .row_of(id)
                    .expect("BUG: directory placement without a row mapping");
                return Some(table.read_component(row, cid).unwrap_or_default());
            }
        }
        self.hooks.tombstone(id, cid).cloned()
    }

    /// Read a single field without allocating the full record (fixed-array
    /// fields still allocate their length-N sequence). Same tombstone
    /// fallback as `get_component`.
    pub fn get(&self, id: EntityId, field_ref: FieldRef) -> Option<Value> {
        if let Some(&arch_id) = self.placement.get(&id) {
            let table = &self.archetypes[arch_id];
            if table.mask().contains(field_ref.component.index()) {
                let row = table
                    .row_of(id)
                    .expect("BUG: directory placement without a row mapping");
                return table.read_field(row, field_ref);
            }
        }
        let record = self.hooks.tombstone(id, field_ref.component)?;
        let name = &self
            .registry
            .schema(field_ref.component)?
            .fields()
            .get(field_ref.field as usize)?
            .name;
        record.get(name).cloned()
    }

    /// Write a single field. Only live rows are writable: tombstones and
    /// absent entities/fields are a silent no-op.
    pub fn set(&mut self, id: EntityId, field_ref: FieldRef, value: &Value) {
        if let Some(&arch_id) = self.placement.get(&id) {
            let table = &mut self.archetypes[arch_id];
            if table.mask().contains(field_ref.component.index()) {
                let row = table
                    .row_of(id)
                    .expect("BUG: directory placement without a row mapping");
                table.write_field(row, field_ref, value);
            }
        }
    }

    // ========== Query / iteration ==========

    fn signature_of(&self, include: &[ComponentDef], exclude: &[ComponentDef]) -> QuerySignature {
        QuerySignature::new(
            BitMask::from_indices(include.iter().map(|d| d.id().index())),
            BitMask::from_indices(exclude.iter().map(|d| d.id().index())),
        )
    }

    /// Matched archetype ids for a signature, cache-backed
    fn cached_matches(&self, signature: QuerySignature) -> Vec<usize> {
        let key = signature.key();
        let mut cache = self.query_cache.borrow_mut();
        if let Some(cached) = cache.get_mut(&key) {
            cached.update(&self.archetypes, self.epoch);
            return cached.matches.clone();
        }
        let cached = CachedQueryResult::new(signature, &self.archetypes, self.epoch);
        let matches = cached.matches.clone();
        cache.insert(key, cached);
        matches
    }

    /// All matching entity ids: matched tables concatenated in archetype
    /// insertion order, row order within each table. Allocates.
    pub fn query(&self, include: &[ComponentDef], exclude: &[ComponentDef]) -> Vec<EntityId> {
        let matched = self.cached_matches(self.signature_of(include, exclude));
        let mut out = Vec::new();
        for arch_id in matched {
            out.extend_from_slice(self.archetypes[arch_id].entities());
        }
        out
    }

    /// Number of matching entities, without materializing ids.
    pub fn count(&self, include: &[ComponentDef], exclude: &[ComponentDef]) -> usize {
        let signature = self.signature_of(include, exclude);
        let key = signature.key();
        let mut cache = self.query_cache.borrow_mut();
        let cached = cache
            .entry(key)
            .or_insert_with(|| CachedQueryResult::new(signature, &self.archetypes, self.epoch));
        cached.update(&self.archetypes, self.epoch);
        cached
            .matches
            .iter()
            .map(|&arch_id| self.archetypes[arch_id].len())
            .sum()
    }

    /// Iterate matched non-empty tables.
    ///
    /// The callback receives the world again so it can read other entities,
    /// write fields, run nested iterations or enqueue structural changes
    /// (which defer to the outermost exit). Column slices taken from the
    /// view are valid only inside the callback and are invalidated by any
    /// operation that grows the table.
    pub fn for_each<F>(&mut self, include: &[ComponentDef], exclude: &[ComponentDef], mut f: F)
    where
        F: FnMut(&mut World, &TableView<'_>),
    {
        let matched = self.cached_matches(self.signature_of(include, exclude));
        let world_ptr = self as *mut World;
        {
            let _guard = DepthGuard::enter(&mut self.iter_depth);
            for arch_id in matched {
                // Safety: while iteration depth > 0 every structural
                // mutation is deferred, so the archetype vector is never
                // reallocated and rows never move under the view. The
                // callback's world reborrow is the same single-threaded
                // world; this mirrors the observer dispatch pattern.
                unsafe {
                    let table = &mut (&mut (*world_ptr).archetypes)[arch_id];
                    if table.is_empty() {
                        continue;
                    }
                    let view = TableView::new(table, arch_id);
                    f(&mut *world_ptr, &view);
                }
            }
        }
        if self.iter_depth == 0 {
            self.drain_deferred();
        }
    }

    /// Replay deferred structural ops in arrival order.
    fn drain_deferred(&mut self) {
        loop {
            let commands = self.deferred.take();
            if commands.is_empty() {
                return;
            }
            for command in commands {
                match command {
                    Command::Add {
                        entity,
                        component,
                        data,
                    } => self.add_component(entity, ComponentDef { id: component }, data),
                    Command::Remove { entity, component } => {
                        self.remove_component(entity, ComponentDef { id: component })
                    }
                    Command::Destroy(entity) => self.destroy_entity(entity),
                }
            }
        }
    }

    // ========== Bulk apply ==========

    /// Evaluate an arithmetic expression into `target` across every
    /// matching archetype. Never changes membership and fires no hooks.
    pub fn apply(&mut self, target: FieldRef, expr: &Expr, filter: &ApplyFilter) -> Result<()> {
        #[cfg(feature = "profiling")]
        let span = info_span!("world.apply", archetype_count = self.archetypes.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        apply::validate(&self.registry, target, expr)?;

        let mut required: SmallVec<[ComponentId; 8]> = SmallVec::new();
        apply::required_components(target, expr, &mut required);
        let mut include = BitMask::from_indices(required.iter().map(|c| c.index()));
        for def in &filter.with {
            include.set(def.id().index());
        }
        let exclude = BitMask::from_indices(filter.without.iter().map(|d| d.id().index()));

        let matched = self.cached_matches(QuerySignature::new(include, exclude));
        for arch_id in matched {
            self.apply_state
                .run_table(&mut self.archetypes[arch_id], arch_id, target, expr);
        }
        Ok(())
    }

    // ========== Hooks ==========

    /// Observe entities entering archetypes that contain `def`.
    pub fn on_add<F>(&mut self, def: ComponentDef, hook: F) -> HookHandle
    where
        F: FnMut(EntityId, &mut World) + 'static,
    {
        self.hooks.on_add(def.id(), Box::new(hook))
    }

    /// Observe entities leaving archetypes that contain `def`.
    pub fn on_remove<F>(&mut self, def: ComponentDef, hook: F) -> HookHandle
    where
        F: FnMut(EntityId, &mut World) + 'static,
    {
        self.hooks.on_remove(def.id(), Box::new(hook))
    }

    pub fn unsubscribe(&mut self, handle: HookHandle) {
        self.hooks.unsubscribe(handle);
    }

    /// Fire buffered lifecycle events: pending adds first (components in
    /// subscription order), then pending removes; per id, observers run in
    /// registration order. Idempotent when nothing new is pending.
    pub fn flush_hooks(&mut self) {
        #[cfg(feature = "profiling")]
        let span = info_span!("world.flush_hooks");
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let world_ptr = self as *mut World;

        let add_order = self.hooks.add_order.clone();
        for cid in add_order {
            let pending = match self.hooks.add.get_mut(&cid) {
                Some(list) if !list.pending.is_empty() => std::mem::take(&mut list.pending),
                _ => continue,
            };
            for entity in pending {
                // Safety: observers may read and mutate the world while we
                // walk their list; the list itself must not be resubscribed
                // for this component during the flush. Single-threaded by
                // contract.
                unsafe {
                    if let Some(list) = (*world_ptr).hooks.add.get_mut(&cid) {
                        for (_, hook) in list.hooks.iter_mut() {
                            hook(entity, &mut *world_ptr);
                        }
                    }
                }
            }
        }

        let remove_order = self.hooks.remove_order.clone();
        for cid in remove_order {
            let pending = match self.hooks.remove.get_mut(&cid) {
                Some(list) if !list.pending.is_empty() => std::mem::take(&mut list.pending),
                _ => continue,
            };
            for entity in pending {
                // Safety: see above.
                unsafe {
                    if let Some(list) = (*world_ptr).hooks.remove.get_mut(&cid) {
                        for (_, hook) in list.hooks.iter_mut() {
                            hook(entity, &mut *world_ptr);
                        }
                    }
                }
            }
        }
    }

    /// Drop removal tombstones. Observers must read deceased rows before
    /// this boundary. Idempotent.
    pub fn commit_removals(&mut self) {
        self.hooks.commit_removals();
    }

    // ========== Change tracking / snapshots ==========

    /// Track archetypes whose mask overlaps `def`'s bit: created/destroyed
    /// ids are recorded and overlapping tables get snapshot mirrors,
    /// including a retroactive sweep over tables that already exist.
    pub fn enable_tracking(&mut self, def: ComponentDef) {
        self.tracking.set(def.id().index());
        for table in &mut self.archetypes {
            if table.mask().overlaps(&self.tracking) {
                table.enable_snapshot();
            }
        }
    }

    /// Return and reset the created/destroyed sets, sorted by id.
    pub fn flush_changes(&mut self) -> ChangeSet {
        let mut created: Vec<EntityId> = self.created.drain().collect();
        let mut destroyed: Vec<EntityId> = self.destroyed.drain().collect();
        created.sort_unstable();
        destroyed.sort_unstable();
        ChangeSet { created, destroyed }
    }

    /// Copy every tracked table's committed column prefix into its snapshot
    /// mirror. Allocates only on capacity growth.
    pub fn flush_snapshots(&mut self) {
        for table in &mut self.archetypes {
            if table.has_snapshot() {
                table.flush_snapshot();
            }
        }
    }

    // ========== Diagnostics / maintenance ==========

    /// Check if an entity is alive
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.known.contains(&id)
    }

    /// All live ids, including component-less entities, sorted by id.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.known.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn entity_count(&self) -> usize {
        self.known.len()
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Structural epoch: bumped whenever an archetype is created
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn archetypes(&self) -> &[ArchetypeTable] {
        &self.archetypes
    }

    pub(crate) fn placement_of(&self, id: EntityId) -> Option<usize> {
        self.placement.get(&id).copied()
    }

    pub(crate) fn allocator_mut(&mut self) -> &mut EntityAllocator {
        &mut self.allocator
    }

    pub(crate) fn next_entity_id(&self) -> u64 {
        self.allocator.next_id()
    }

    /// Clear all entities, archetypes and caches. Component definitions and
    /// hook subscriptions survive; pending events and tombstones do not.
    pub fn clear(&mut self) {
        self.known.clear();
        self.placement.clear();
        self.archetypes.clear();
        self.archetype_index.clear();
        self.query_cache.borrow_mut().clear();
        self.deferred.clear();
        self.apply_state.clear();
        self.created.clear();
        self.destroyed.clear();
        self.hooks.clear_transient();
        self.epoch += 1;
    }

    /// Get query cache statistics for diagnostics
    pub fn query_cache_stats(&self) -> QueryCacheStats {
        let cache = self.query_cache.borrow();
        let total_cached_archetypes: usize =
            cache.values().map(|cached| cached.matches.len()).sum();

        QueryCacheStats {
            num_cached_queries: cache.len(),
            total_cached_archetypes,
            total_archetypes: self.archetypes.len(),
        }
    }

    // ========== Internals ==========

    /// Get or create the archetype for `mask`, bumping the structural epoch
    /// and wiring the snapshot mirror when it overlaps the tracking filter.
    fn get_or_create_archetype(&mut self, mask: BitMask) -> usize {
        let key = mask.key();
        if let Some(&id) = self.archetype_index.get(&key) {
            return id;
        }

        let mut schemas = Vec::new();
        for bit in mask.ones() {
            let cid = ComponentId(bit);
            if let Some(schema) = self.registry.schema(cid) {
                schemas.push((cid, schema));
            }
        }
        let mut table = ArchetypeTable::new(mask, &schemas);
        if !self.tracking.is_empty() && table.mask().overlaps(&self.tracking) {
            table.enable_snapshot();
        }

        // Push first so the index never maps to a missing table
        self.archetypes.push(table);
        let id = self.archetypes.len() - 1;
        self.archetype_index.insert(key, id);
        self.epoch += 1;
        id
    }

    /// Rebuild one entity's row during deserialization: no allocator, no
    /// hooks, no tracking.
    pub(crate) fn restore_entity(
        &mut self,
        id: EntityId,
        components: &[(ComponentId, &ComponentData)],
    ) {
        self.known.insert(id);
        if components.is_empty() {
            return;
        }
        let mask = BitMask::from_indices(components.iter().map(|(c, _)| c.index()));
        let arch_id = self.get_or_create_archetype(mask);
        let table = &mut self.archetypes[arch_id];
        let row = table.allocate_row(id);
        for (cid, set) in table.column_sets_mut() {
            let row_data = components.iter().find(|(c, _)| c == cid).map(|(_, d)| *d);
            set.write_row(row, row_data);
        }
        self.placement.insert(id, arch_id);
    }

    /// Move an entity between archetypes, staging preserved columns and
    /// writing the added component's data (if any) into the new row.
    fn move_entity(
        &mut self,
        id: EntityId,
        old_arch_id: usize,
        new_arch_id: usize,
        added: Option<(ComponentId, Option<&ComponentData>)>,
    ) {
        if old_arch_id == new_arch_id {
            return;
        }
        let old_row = self.archetypes[old_arch_id]
            .row_of(id)
            .expect("BUG: directory placement without a row mapping");

        // Stage preserved rows; the target row is written after swap-remove
        // so the source table's borrow ends first
        let mut staged: SmallVec<[(ComponentId, ComponentData); 8]> = SmallVec::new();
        {
            let old_table = &self.archetypes[old_arch_id];
            let new_mask = self.archetypes[new_arch_id].mask();
            for (cid, set) in old_table.column_sets() {
                if new_mask.contains(cid.index()) {
                    staged.push((*cid, set.read_row(old_row)));
                }
            }
        }
        self.archetypes[old_arch_id].remove_row(old_row);

        let table = &mut self.archetypes[new_arch_id];
        let row = table.allocate_row(id);
        for (cid, set) in table.column_sets_mut() {
            let row_data = match added {
                Some((added_cid, data)) if added_cid == *cid => data,
                _ => staged.iter().find(|(c, _)| c == cid).map(|(_, d)| d),
            };
            set.write_row(row, row_data);
        }
        self.placement.insert(id, new_arch_id);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::data;

    #[test]
    fn test_create_destroy() {
        let mut world = World::new();
        let pos = world.define_uniform("Position", "f32", &["x", "y"]).unwrap();

        let entity = world.create_entity_with(&[(pos, data([("x", Value::num(1.0))]))]);
        assert!(world.is_alive(entity));
        assert_eq!(world.entity_count(), 1);

        world.destroy_entity(entity);
        assert!(!world.is_alive(entity));
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.count(&[pos], &[]), 0);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut world = World::new();
        let first = world.create_entity();
        world.destroy_entity(first);
        let second = world.create_entity();
        assert_ne!(first, second);
        assert!(second.raw() > first.raw());
    }

    #[test]
    fn test_archetype_segregation() {
        let mut world = World::new();
        let a = world.define_tag("A");
        let b = world.define_tag("B");
        let c = world.define_tag("C");

        world.create_entity_with(&[(a, ComponentData::new()), (b, ComponentData::new())]);
        world.create_entity_with(&[(a, ComponentData::new()), (c, ComponentData::new())]);
        world.create_entity_with(&[(b, ComponentData::new()), (c, ComponentData::new())]);

        assert_eq!(world.archetype_count(), 3);
        assert_eq!(world.count(&[a], &[]), 2);
        assert_eq!(world.count(&[a], &[c]), 1);
    }

    #[test]
    fn test_epoch_bumps_only_on_archetype_creation() {
        let mut world = World::new();
        let a = world.define_tag("A");
        let before = world.epoch();
        world.create_entity_with(&[(a, ComponentData::new())]);
        let after_first = world.epoch();
        assert!(after_first > before);

        // Same archetype: no new epoch
        world.create_entity_with(&[(a, ComponentData::new())]);
        assert_eq!(world.epoch(), after_first);
    }

    #[test]
    fn test_zero_component_entity_is_enumerable() {
        let mut world = World::new();
        let id = world.create_entity();
        assert_eq!(world.entity_ids(), vec![id]);
        let pos = world.define_uniform("Position", "f32", &["x"]).unwrap();
        assert!(!world.has_component(id, pos));

        // Can receive components later
        world.add_component(id, pos, Some(data([("x", Value::num(3.0))])));
        assert!(world.has_component(id, pos));
        let x = world.field(pos, "x").unwrap();
        assert_eq!(world.get(id, x), Some(Value::Num(3.0)));
    }
}
