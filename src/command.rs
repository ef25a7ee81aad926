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

//! Deferred structural commands captured during iteration

use crate::column::ComponentData;
use crate::entity::EntityId;
use crate::registry::ComponentId;

/// Structural mutation deferred while iteration is active.
///
/// Component data is owned at enqueue time; the caller may reuse its buffer.
pub enum Command {
    /// Add a component (data may be absent: zeroed row)
    Add {
        entity: EntityId,
        component: ComponentId,
        data: Option<ComponentData>,
    },

    /// Remove a component
    Remove {
        entity: EntityId,
        component: ComponentId,
    },

    /// Destroy an entity
    Destroy(EntityId),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Add { entity, component, .. } => f
                .debug_struct("Add")
                .field("entity", entity)
                .field("component", component)
                .finish(),
            Command::Remove { entity, component } => f
                .debug_struct("Remove")
                .field("entity", entity)
                .field("component", component)
                .finish(),
            Command::Destroy(entity) => f.debug_tuple("Destroy").field(entity).finish(),
        }
    }
}

/// FIFO queue of deferred commands, drained at the outermost iteration exit.
#[derive(Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    /// Create new command queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Take all queued commands in arrival order
    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Get length
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Clear queue
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}
