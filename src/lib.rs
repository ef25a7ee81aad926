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

//! Swarm ECS - Archetype storage engine with runtime component schemas
//!
//! Entities carry arbitrary subsets of runtime-defined components; storage is
//! dense struct-of-arrays per archetype with swap-remove, and bulk numeric
//! updates dispatch to a lane-of-4 kernel.

pub mod apply;
pub mod archetype;
pub mod column;
pub mod command;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod mask;
pub mod query;
pub mod registry;
pub mod serialization;
pub mod world;

pub mod prelude;

// Re-exports for convenience
pub use apply::{ApplyFilter, Expr};
pub use column::{data, Column, ComponentData, Value};
pub use entity::EntityId;
pub use error::{EcsError, Result};
pub use hooks::HookHandle;
pub use mask::BitMask;
pub use query::{QueryCacheStats, TableView};
pub use registry::{ComponentDef, ComponentId, ComponentRegistry, ElemKind, FieldKind, FieldRef};
pub use serialization::{from_json, load_world, save_world, to_json, SerializedWorld};
pub use world::{ChangeSet, World};
