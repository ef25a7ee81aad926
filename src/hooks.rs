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

//! Lifecycle hook bus: per-component add/remove observers.
//!
//! Events are buffered, not fired inline: the mutator enqueues pending ids
//! and `World::flush_hooks` dispatches them deterministically. Rows removed
//! while observed are kept as tombstones so remove-observers can still read
//! the deceased state until `commit_removals`.

use ahash::AHashMap;
use rustc_hash::FxHashMap;

use crate::column::ComponentData;
use crate::entity::EntityId;
use crate::registry::ComponentId;
use crate::world::World;

/// Observer callback. Receives the entity and the world, so it can read
/// live rows or tombstones and enqueue further structural changes.
pub type HookFn = Box<dyn FnMut(EntityId, &mut World)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookKind {
    Add,
    Remove,
}

/// Unsubscribe token returned by `on_add` / `on_remove`.
///
/// Removes the observer by identity, not by position.
#[derive(Debug, Clone, Copy)]
pub struct HookHandle {
    pub(crate) component: ComponentId,
    pub(crate) kind: HookKind,
    pub(crate) id: u64,
}

pub(crate) struct HookList {
    pub(crate) hooks: Vec<(u64, HookFn)>,
    pub(crate) pending: Vec<EntityId>,
}

/// Per-component observer lists, pending buffers and removal tombstones.
pub struct HookBus {
    pub(crate) add: FxHashMap<ComponentId, HookList>,
    pub(crate) add_order: Vec<ComponentId>,
    pub(crate) remove: FxHashMap<ComponentId, HookList>,
    pub(crate) remove_order: Vec<ComponentId>,
    tombstones: AHashMap<EntityId, FxHashMap<ComponentId, ComponentData>>,
    next_hook: u64,
}

impl HookBus {
    pub fn new() -> Self {
        Self {
            add: FxHashMap::default(),
            add_order: Vec::new(),
            remove: FxHashMap::default(),
            remove_order: Vec::new(),
            tombstones: AHashMap::new(),
            next_hook: 0,
        }
    }

    fn subscribe(
        map: &mut FxHashMap<ComponentId, HookList>,
        order: &mut Vec<ComponentId>,
        component: ComponentId,
        id: u64,
        hook: HookFn,
    ) {
        // First observer allocates the component's pending buffer and fixes
        // its flush position
        let list = map.entry(component).or_insert_with(|| {
            order.push(component);
            HookList {
                hooks: Vec::new(),
                pending: Vec::new(),
            }
        });
        list.hooks.push((id, hook));
    }

    pub fn on_add(&mut self, component: ComponentId, hook: HookFn) -> HookHandle {
        let id = self.next_hook;
        self.next_hook += 1;
        Self::subscribe(&mut self.add, &mut self.add_order, component, id, hook);
        HookHandle {
            component,
            kind: HookKind::Add,
            id,
        }
    }

    pub fn on_remove(&mut self, component: ComponentId, hook: HookFn) -> HookHandle {
        let id = self.next_hook;
        self.next_hook += 1;
        Self::subscribe(&mut self.remove, &mut self.remove_order, component, id, hook);
        HookHandle {
            component,
            kind: HookKind::Remove,
            id,
        }
    }

    /// Remove an observer. Dropping the last observer of a component frees
    /// its pending buffer (and any queued ids with it).
    pub fn unsubscribe(&mut self, handle: HookHandle) {
        let (map, order) = match handle.kind {
            HookKind::Add => (&mut self.add, &mut self.add_order),
            HookKind::Remove => (&mut self.remove, &mut self.remove_order),
        };
        if let Some(list) = map.get_mut(&handle.component) {
            list.hooks.retain(|(id, _)| *id != handle.id);
            if list.hooks.is_empty() {
                map.remove(&handle.component);
                order.retain(|c| *c != handle.component);
            }
        }
    }

    pub fn has_add_observers(&self, component: ComponentId) -> bool {
        self.add.contains_key(&component)
    }

    pub fn has_remove_observers(&self, component: ComponentId) -> bool {
        self.remove.contains_key(&component)
    }

    /// Enqueue an add event. No-op without observers (no buffer exists).
    pub fn pend_add(&mut self, component: ComponentId, entity: EntityId) {
        if let Some(list) = self.add.get_mut(&component) {
            list.pending.push(entity);
        }
    }

    /// Enqueue a remove event. No-op without observers.
    pub fn pend_remove(&mut self, component: ComponentId, entity: EntityId) {
        if let Some(list) = self.remove.get_mut(&component) {
            list.pending.push(entity);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.add.values().any(|l| !l.pending.is_empty())
            || self.remove.values().any(|l| !l.pending.is_empty())
    }

    /// Preserve a removed row so remove-observers can still read it.
    pub fn store_tombstone(&mut self, entity: EntityId, component: ComponentId, row: ComponentData) {
        self.tombstones
            .entry(entity)
            .or_default()
            .insert(component, row);
    }

    pub fn tombstone(&self, entity: EntityId, component: ComponentId) -> Option<&ComponentData> {
        self.tombstones.get(&entity)?.get(&component)
    }

    /// Drop all tombstones. Idempotent; observers must read deceased rows
    /// before this commit boundary.
    pub fn commit_removals(&mut self) {
        self.tombstones.clear();
    }

    /// Drop pending events and tombstones, keeping subscriptions. Used when
    /// the world's entity state is cleared wholesale.
    pub fn clear_transient(&mut self) {
        for list in self.add.values_mut() {
            list.pending.clear();
        }
        for list in self.remove.values_mut() {
            list.pending.clear();
        }
        self.tombstones.clear();
    }
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new()
    }
}
