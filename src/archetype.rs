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

//! Archetype storage with row allocation and removal

use rustc_hash::FxHashMap;

use crate::column::{ColumnSet, ComponentData, FieldColumn, Value};
use crate::entity::EntityId;
use crate::mask::BitMask;
use crate::registry::{ComponentId, FieldRef, Schema};

/// Initial row capacity of a fresh table; doubles on growth, never shrinks.
pub const INITIAL_CAPACITY: usize = 64;

/// Snapshot mirror: a copy of the committed column prefix, refreshed by
/// `flush_snapshots`.
#[derive(Debug, Clone)]
struct SnapshotMirror {
    sets: Vec<ColumnSet>,
    entity_ids: Vec<EntityId>,
    len: usize,
}

/// Archetype: Structure of Arrays storage for one component-set mask.
///
/// Rows are dense: every column holds exactly `len` live rows followed by
/// unused capacity. Removal swaps the last row in, so row indices are stable
/// only between structural changes.
pub struct ArchetypeTable {
    mask: BitMask,
    mask_key: String,
    entity_ids: Vec<EntityId>,
    row_of: FxHashMap<EntityId, usize>,
    /// Column sets for schema'd components only, ordered by component id
    components: Vec<(ComponentId, ColumnSet)>,
    component_indices: FxHashMap<ComponentId, usize>,
    capacity: usize,
    snapshot: Option<SnapshotMirror>,
}

impl ArchetypeTable {
    /// Create an empty table for `mask`. `schemas` lists the schema'd
    /// components of the mask (tags carry no columns) in component-id order.
    pub fn new(mask: BitMask, schemas: &[(ComponentId, &Schema)]) -> Self {
        let mask_key = mask.key();
        let mut components = Vec::with_capacity(schemas.len());
        let mut component_indices = FxHashMap::default();
        for (id, schema) in schemas {
            component_indices.insert(*id, components.len());
            components.push((*id, ColumnSet::new(schema, INITIAL_CAPACITY)));
        }
        Self {
            mask,
            mask_key,
            entity_ids: Vec::new(),
            row_of: FxHashMap::default(),
            components,
            component_indices,
            capacity: INITIAL_CAPACITY,
            snapshot: None,
        }
    }

    pub fn mask(&self) -> &BitMask {
        &self.mask
    }

    pub fn mask_key(&self) -> &str {
        &self.mask_key
    }

    /// Number of live rows
    pub fn len(&self) -> usize {
        self.entity_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get all entities
    pub fn entities(&self) -> &[EntityId] {
        &self.entity_ids
    }

    pub fn row_of(&self, entity: EntityId) -> Option<usize> {
        self.row_of.get(&entity).copied()
    }

    /// Membership is decided by the mask; tags are members without columns.
    pub fn has_component(&self, id: ComponentId) -> bool {
        self.mask.contains(id.index())
    }

    pub fn column_set(&self, id: ComponentId) -> Option<&ColumnSet> {
        let idx = *self.component_indices.get(&id)?;
        self.components.get(idx).map(|(_, set)| set)
    }

    pub fn column_set_mut(&mut self, id: ComponentId) -> Option<&mut ColumnSet> {
        let idx = *self.component_indices.get(&id)?;
        self.components.get_mut(idx).map(|(_, set)| set)
    }

    /// Schema'd components and their column sets
    pub fn column_sets(&self) -> &[(ComponentId, ColumnSet)] {
        &self.components
    }

    pub(crate) fn column_sets_mut(&mut self) -> &mut [(ComponentId, ColumnSet)] {
        &mut self.components
    }

    pub fn field_column(&self, field_ref: FieldRef) -> Option<&FieldColumn> {
        self.column_set(field_ref.component)?.field(field_ref.field)
    }

    pub fn field_column_mut(&mut self, field_ref: FieldRef) -> Option<&mut FieldColumn> {
        self.column_set_mut(field_ref.component)?
            .field_mut(field_ref.field)
    }

    /// Allocate a row for `entity`, growing capacity if full.
    ///
    /// The caller writes every column set for the new row (absent data
    /// zeroes it); the columns may hold stale data from earlier swap-removes.
    pub fn allocate_row(&mut self, entity: EntityId) -> usize {
        if self.entity_ids.len() == self.capacity {
            self.grow(self.capacity * 2);
        }
        let row = self.entity_ids.len();
        self.entity_ids.push(entity);
        self.row_of.insert(entity, row);
        row
    }

    /// Remove a row (swap-remove) and return the entity that occupied it.
    ///
    /// If the removed row was not the last, the last row is moved in and its
    /// entity's row mapping is updated. Capacity never shrinks.
    pub fn remove_row(&mut self, row: usize) -> EntityId {
        let last = self.entity_ids.len() - 1;
        let removed = self.entity_ids[row];
        if row != last {
            for (_, set) in &mut self.components {
                set.swap_rows(row, last);
            }
            let moved = self.entity_ids[last];
            self.entity_ids[row] = moved;
            self.row_of.insert(moved, row);
        }
        self.entity_ids.pop();
        self.row_of.remove(&removed);
        removed
    }

    /// Read one component's row as a record.
    pub fn read_component(&self, row: usize, id: ComponentId) -> Option<ComponentData> {
        self.column_set(id).map(|set| set.read_row(row))
    }

    pub fn read_field(&self, row: usize, field_ref: FieldRef) -> Option<Value> {
        self.field_column(field_ref).map(|f| f.read(row))
    }

    /// Write one field of one row. Returns false if the field is absent.
    pub fn write_field(&mut self, row: usize, field_ref: FieldRef, value: &Value) -> bool {
        match self.field_column_mut(field_ref) {
            Some(field) => {
                field.write(row, Some(value));
                true
            }
            None => false,
        }
    }

    fn grow(&mut self, new_capacity: usize) {
        for (_, set) in &mut self.components {
            set.grow(new_capacity);
        }
        if let Some(snapshot) = &mut self.snapshot {
            for set in &mut snapshot.sets {
                set.grow(new_capacity);
            }
        }
        self.capacity = new_capacity;
    }

    // ---- Snapshot mirror ----

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Allocate the snapshot mirror if absent. Mirror data stays invisible
    /// (zero rows) until the first `flush_snapshot`.
    pub fn enable_snapshot(&mut self) {
        if self.snapshot.is_none() {
            self.snapshot = Some(SnapshotMirror {
                sets: self.components.iter().map(|(_, set)| set.clone()).collect(),
                entity_ids: Vec::new(),
                len: 0,
            });
        }
    }

    /// Copy the committed column prefix and entity ids into the mirror.
    pub fn flush_snapshot(&mut self) {
        let rows = self.entity_ids.len();
        if let Some(snapshot) = &mut self.snapshot {
            for ((_, live), mirror) in self.components.iter().zip(snapshot.sets.iter_mut()) {
                mirror.copy_rows_from(live, rows);
            }
            snapshot.entity_ids.clear();
            snapshot.entity_ids.extend_from_slice(&self.entity_ids);
            snapshot.len = rows;
        }
    }

    /// Rows captured by the most recent `flush_snapshot`
    pub fn snapshot_len(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.len)
    }

    pub fn snapshot_entities(&self) -> Option<&[EntityId]> {
        self.snapshot.as_ref().map(|s| s.entity_ids.as_slice())
    }

    pub fn snapshot_field_column(&self, field_ref: FieldRef) -> Option<&FieldColumn> {
        let snapshot = self.snapshot.as_ref()?;
        let idx = *self.component_indices.get(&field_ref.component)?;
        snapshot.sets.get(idx)?.fields().get(field_ref.field as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::data;
    use crate::registry::ComponentRegistry;

    fn position_table() -> (ArchetypeTable, ComponentRegistry, FieldRef) {
        let mut registry = ComponentRegistry::new();
        let pos = registry.define_uniform("Position", "f32", &["x", "y"]).unwrap();
        let mask = BitMask::from_indices([pos.id().index()]);
        let table = ArchetypeTable::new(mask, &[(pos.id(), registry.schema(pos.id()).unwrap())]);
        let x = registry.field(pos, "x").unwrap();
        (table, registry, x)
    }

    #[test]
    fn test_allocate_and_read() {
        let (mut table, _registry, x) = position_table();
        let entity = EntityId::from_raw(1);
        let row = table.allocate_row(entity);
        table
            .column_set_mut(x.component)
            .unwrap()
            .write_row(row, Some(&data([("x", Value::num(5.0))])));

        assert_eq!(table.len(), 1);
        assert_eq!(table.row_of(entity), Some(0));
        assert_eq!(table.read_field(0, x), Some(Value::Num(5.0)));
    }

    #[test]
    fn test_swap_remove_moves_last_row() {
        let (mut table, _registry, x) = position_table();
        for i in 1..=3 {
            let row = table.allocate_row(EntityId::from_raw(i));
            table
                .column_set_mut(x.component)
                .unwrap()
                .write_row(row, Some(&data([("x", Value::num(i as f64))])));
        }

        let removed = table.remove_row(0);
        assert_eq!(removed, EntityId::from_raw(1));
        assert_eq!(table.len(), 2);
        // Entity 3 moved into row 0
        assert_eq!(table.row_of(EntityId::from_raw(3)), Some(0));
        assert_eq!(table.read_field(0, x), Some(Value::Num(3.0)));
    }

    #[test]
    fn test_remove_last_row_is_no_swap() {
        let (mut table, _registry, _x) = position_table();
        table.allocate_row(EntityId::from_raw(1));
        table.allocate_row(EntityId::from_raw(2));
        let removed = table.remove_row(1);
        assert_eq!(removed, EntityId::from_raw(2));
        assert_eq!(table.row_of(EntityId::from_raw(1)), Some(0));
        assert_eq!(table.row_of(EntityId::from_raw(2)), None);
    }

    #[test]
    fn test_growth_preserves_rows_and_mapping() {
        let (mut table, _registry, x) = position_table();
        for i in 1..=(INITIAL_CAPACITY as u64 + 10) {
            let row = table.allocate_row(EntityId::from_raw(i));
            table
                .column_set_mut(x.component)
                .unwrap()
                .write_row(row, Some(&data([("x", Value::num(i as f64))])));
        }
        assert!(table.capacity() >= INITIAL_CAPACITY * 2);
        for i in 1..=(INITIAL_CAPACITY as u64 + 10) {
            let row = table.row_of(EntityId::from_raw(i)).unwrap();
            assert_eq!(table.read_field(row, x), Some(Value::Num(i as f64)));
        }
    }

    #[test]
    fn test_snapshot_flush_copies_prefix() {
        let (mut table, _registry, x) = position_table();
        table.enable_snapshot();
        assert_eq!(table.snapshot_len(), 0);

        let row = table.allocate_row(EntityId::from_raw(1));
        table
            .column_set_mut(x.component)
            .unwrap()
            .write_row(row, Some(&data([("x", Value::num(2.0))])));
        table.flush_snapshot();

        assert_eq!(table.snapshot_len(), 1);
        assert_eq!(table.snapshot_entities(), Some(&[EntityId::from_raw(1)][..]));
        let mirror = table.snapshot_field_column(x).unwrap();
        assert_eq!(mirror.column().as_f32().unwrap()[0], 2.0);

        // Mutating the live column does not touch the mirror until next flush
        table.write_field(0, x, &Value::num(99.0));
        let mirror = table.snapshot_field_column(x).unwrap();
        assert_eq!(mirror.column().as_f32().unwrap()[0], 2.0);
    }
}
