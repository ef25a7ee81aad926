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

//! World serialization.
//!
//! The persisted shape is stable: the id watermark, every live entity id
//! (component-less ones included), and per component name a map of
//! entity-id-string to row record. Tag components carry no data and are
//! absent from the document, so tag membership does not round-trip.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::column::ComponentData;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::registry::ComponentId;
use crate::world::World;

/// A serializable snapshot of world state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedWorld {
    /// Id allocator watermark (next id to issue)
    #[serde(rename = "nextId")]
    pub next_id: u64,
    /// Every live entity id
    pub entities: Vec<u64>,
    /// Component name -> entity-id-string -> row record
    pub components: HashMap<String, HashMap<String, ComponentData>>,
}

impl SerializedWorld {
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

/// Capture world state into a `SerializedWorld`.
pub fn save_world(world: &World) -> SerializedWorld {
    let mut components: HashMap<String, HashMap<String, ComponentData>> = HashMap::new();

    for table in world.archetypes() {
        for (cid, set) in table.column_sets() {
            let by_entity = components
                .entry(world.registry().name(*cid).to_string())
                .or_default();
            for (row, entity) in table.entities().iter().enumerate() {
                by_entity.insert(entity.to_string(), set.read_row(row));
            }
        }
    }

    SerializedWorld {
        next_id: world.next_entity_id(),
        entities: world.entity_ids().iter().map(|id| id.raw()).collect(),
        components,
    }
}

/// Replace world state with a `SerializedWorld`.
///
/// Clears all prior entities, archetypes and caches first; component
/// definitions and hook subscriptions survive. Component names with no
/// registered definition are ignored (their entities are still created),
/// and no hooks fire for restored rows.
pub fn load_world(world: &mut World, snapshot: &SerializedWorld) {
    world.clear();

    // Group records per entity so each row is written once in its final
    // archetype, with no intermediate migrations
    let mut per_entity: HashMap<u64, Vec<(ComponentId, &ComponentData)>> = HashMap::new();
    for (name, rows) in &snapshot.components {
        let Some(def) = world.registry().def_by_name(name) else {
            continue;
        };
        for (id_text, record) in rows {
            let Ok(raw) = id_text.parse::<u64>() else {
                continue;
            };
            per_entity.entry(raw).or_default().push((def.id(), record));
        }
    }

    let mut watermark = snapshot.next_id;
    for &raw in &snapshot.entities {
        watermark = watermark.max(raw + 1);
        let components = per_entity.remove(&raw).unwrap_or_default();
        world.restore_entity(EntityId::from_raw(raw), &components);
    }
    world.allocator_mut().reset_to(watermark);
}

/// Serialize to a JSON document.
pub fn to_json(snapshot: &SerializedWorld) -> Result<String> {
    serde_json::to_string(snapshot).map_err(|e| EcsError::SerializationError(e.to_string()))
}

/// Parse a JSON document.
pub fn from_json(text: &str) -> Result<SerializedWorld> {
    serde_json::from_str(text).map_err(|e| EcsError::DeserializationError(e.to_string()))
}
