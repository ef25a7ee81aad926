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

//! Entity identifiers and the monotone id allocator.

use serde::{Deserialize, Serialize};

/// Unique entity identifier.
///
/// Ids are issued monotonically starting at 1 and are never reused within a
/// session, so a stale handle can never alias a newer entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub(crate) u64);

impl EntityId {
    /// Raw id value
    pub fn raw(self) -> u64 {
        self.0
    }

    pub(crate) fn from_raw(raw: u64) -> Self {
        EntityId(raw)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotone id allocator. Ids start at 1; 0 is never issued.
#[derive(Debug, Clone)]
pub struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        // Panic on overflow - id reuse would break every stale handle
        self.next = self
            .next
            .checked_add(1)
            .expect("Entity ID space exhausted");
        id
    }

    pub fn next_id(&self) -> u64 {
        self.next
    }

    /// Restore the allocator watermark (used by deserialization).
    pub fn reset_to(&mut self, next: u64) {
        self.next = next.max(1);
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotone_from_one() {
        let mut alloc = EntityAllocator::new();
        assert_eq!(alloc.allocate().raw(), 1);
        assert_eq!(alloc.allocate().raw(), 2);
        assert_eq!(alloc.allocate().raw(), 3);
    }

    #[test]
    fn test_reset_floor_is_one() {
        let mut alloc = EntityAllocator::new();
        alloc.reset_to(0);
        assert_eq!(alloc.allocate().raw(), 1);
    }
}
