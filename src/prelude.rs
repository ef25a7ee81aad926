//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use swarm_ecs::prelude::*;
//! ```

pub use crate::apply::{ApplyFilter, Expr};
pub use crate::column::{data, ComponentData, Value};
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::hooks::HookHandle;
pub use crate::query::TableView;
pub use crate::registry::{ComponentDef, FieldRef};
pub use crate::serialization::{load_world, save_world, SerializedWorld};
pub use crate::world::{ChangeSet, World};
