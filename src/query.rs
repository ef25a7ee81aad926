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

//! Query system with archetype filtering
//!
//! Matches tables by include/exclude masks with a cache keyed on the
//! structural epoch, and hands per-table views to iteration callbacks.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::archetype::ArchetypeTable;
use crate::column::Column;
use crate::entity::EntityId;
use crate::mask::BitMask;
use crate::registry::FieldRef;

/// Component-mask signature for query caching
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySignature {
    /// Components that must be present
    pub include: BitMask,
    /// Components that must be absent
    pub exclude: BitMask,
}

impl QuerySignature {
    pub fn new(include: BitMask, exclude: BitMask) -> Self {
        Self { include, exclude }
    }

    /// Stable cache key (include key ":" exclude key)
    pub fn key(&self) -> String {
        let mut key = self.include.key();
        key.push(':');
        key.push_str(&self.exclude.key());
        key
    }

    /// Check if an archetype matches this signature
    pub fn matches(&self, table: &ArchetypeTable) -> bool {
        table.mask().is_superset(&self.include)
            && (self.exclude.is_empty() || table.mask().is_disjoint(&self.exclude))
    }
}

/// Cached result for a specific query signature.
///
/// `epoch` records the structural epoch the cache was last valid for; since
/// archetypes are append-only, refreshing only scans tables created since
/// `seen_archetypes`.
pub struct CachedQueryResult {
    pub matches: Vec<usize>,
    pub seen_archetypes: usize,
    pub epoch: u64,
    pub signature: QuerySignature,
}

impl CachedQueryResult {
    pub fn new(signature: QuerySignature, archetypes: &[ArchetypeTable], epoch: u64) -> Self {
        let matches = archetypes
            .iter()
            .enumerate()
            .filter_map(|(id, table)| signature.matches(table).then_some(id))
            .collect();

        Self {
            matches,
            seen_archetypes: archetypes.len(),
            epoch,
            signature,
        }
    }

    /// Bring the match list up to `epoch` by scanning only new archetypes.
    pub fn update(&mut self, archetypes: &[ArchetypeTable], epoch: u64) {
        if self.epoch == epoch {
            return;
        }
        for (id, table) in archetypes.iter().enumerate().skip(self.seen_archetypes) {
            if self.signature.matches(table) {
                self.matches.push(id);
            }
        }
        self.seen_archetypes = archetypes.len();
        self.epoch = epoch;
    }
}

/// Statistics about the query cache
#[derive(Debug, Clone, Copy)]
pub struct QueryCacheStats {
    /// Number of unique query signatures cached
    pub num_cached_queries: usize,
    /// Total number of archetype matches across all cached queries
    pub total_cached_archetypes: usize,
    /// Total number of archetypes in the world
    pub total_archetypes: usize,
}

/// Per-table view handed to `for_each` callbacks.
///
/// Column accessors return the whole backing storage (capacity × stride
/// elements); only the first `len() × stride` elements are live. Slices are
/// valid for the duration of the callback only: any operation that grows the
/// table invalidates them, and requesting the same field twice aliases.
pub struct TableView<'w> {
    table: NonNull<ArchetypeTable>,
    archetype_id: usize,
    len: usize,
    _marker: PhantomData<&'w ArchetypeTable>,
}

impl<'w> TableView<'w> {
    pub(crate) fn new(table: &mut ArchetypeTable, archetype_id: usize) -> Self {
        Self {
            len: table.len(),
            table: NonNull::from(table),
            archetype_id,
            _marker: PhantomData,
        }
    }

    /// Number of live rows at iteration entry
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn archetype_id(&self) -> usize {
        self.archetype_id
    }

    fn table(&self) -> &'w ArchetypeTable {
        // Safety: the table outlives 'w and structural mutation is deferred
        // while any iteration is active, so the pointee is never moved or
        // freed under the view.
        unsafe { self.table.as_ref() }
    }

    /// Dense row-index -> entity id prefix, length `len()`
    pub fn entities(&self) -> &'w [EntityId] {
        &self.table().entities()[..self.len]
    }

    /// Stride of a field (1 for scalars and strings)
    pub fn stride(&self, field_ref: FieldRef) -> Option<usize> {
        self.table().field_column(field_ref).map(|f| f.stride())
    }

    /// Mutable backing storage of a field column.
    ///
    /// # Safety contract
    /// Callers must not request the same field of the same table twice while
    /// a previous slice is still held (including from a nested iteration over
    /// this archetype); distinct fields never alias.
    pub fn column(&self, field_ref: FieldRef) -> Option<&'w mut Column> {
        // Safety: see above; single-threaded by contract.
        let table = unsafe { &mut *self.table.as_ptr() };
        table.field_column_mut(field_ref).map(|f| f.column_mut())
    }

    /// Snapshot backing storage of a field column, if this table is tracked.
    pub fn snapshot(&self, field_ref: FieldRef) -> Option<&'w Column> {
        self.table()
            .snapshot_field_column(field_ref)
            .map(|f| f.column())
    }

    /// Rows captured by the most recent snapshot flush
    pub fn snapshot_len(&self) -> usize {
        self.table().snapshot_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;

    fn table_for(mask: BitMask) -> ArchetypeTable {
        ArchetypeTable::new(mask, &[])
    }

    #[test]
    fn test_signature_matching() {
        let table = table_for(BitMask::from_indices([0, 1, 2]));

        let sig = QuerySignature::new(BitMask::from_indices([0, 2]), BitMask::new());
        assert!(sig.matches(&table));

        let sig = QuerySignature::new(BitMask::from_indices([0]), BitMask::from_indices([1]));
        assert!(!sig.matches(&table));

        let sig = QuerySignature::new(BitMask::from_indices([3]), BitMask::new());
        assert!(!sig.matches(&table));
    }

    #[test]
    fn test_cache_incremental_update() {
        let mut tables = vec![table_for(BitMask::from_indices([0]))];
        let sig = QuerySignature::new(BitMask::from_indices([0]), BitMask::new());

        let mut cached = CachedQueryResult::new(sig, &tables, 1);
        assert_eq!(cached.matches, vec![0]);

        tables.push(table_for(BitMask::from_indices([0, 1])));
        tables.push(table_for(BitMask::from_indices([1])));

        cached.update(&tables, 3);
        assert_eq!(cached.matches, vec![0, 1]);
        assert_eq!(cached.seen_archetypes, 3);

        // Same epoch: no rescan needed
        cached.update(&tables, 3);
        assert_eq!(cached.matches, vec![0, 1]);
    }

    #[test]
    fn test_view_exposes_live_prefix() {
        let mut registry = ComponentRegistry::new();
        let pos = registry.define_uniform("Position", "f32", &["x"]).unwrap();
        let mask = BitMask::from_indices([pos.id().index()]);
        let mut table =
            ArchetypeTable::new(mask, &[(pos.id(), registry.schema(pos.id()).unwrap())]);
        table.allocate_row(EntityId::from_raw(1));
        table.allocate_row(EntityId::from_raw(2));

        let x = registry.field(pos, "x").unwrap();
        let view = TableView::new(&mut table, 0);
        assert_eq!(view.len(), 2);
        assert_eq!(view.entities().len(), 2);
        assert_eq!(view.stride(x), Some(1));
        let column = view.column(x).unwrap();
        // Backing storage covers capacity, not just the live prefix
        assert!(column.as_f32().unwrap().len() >= view.len());
    }
}
