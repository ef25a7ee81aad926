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

//! Component registry: runtime-defined component identities and schemas.
//!
//! Components are declared at runtime by name with an optional field schema.
//! Each definition gets a dense `ComponentId` that doubles as its bit index
//! in archetype masks, and field names resolve once at definition time so a
//! `FieldRef` access is an array index, not a string lookup.

use rustc_hash::FxHashMap;

use crate::error::{EcsError, Result};

/// Dense component index. Allocated at definition time; also the bit index
/// used by archetype masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Copy handle to a registered component.
///
/// Identity is the dense id, not the name: defining two components with the
/// same name yields two distinct defs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentDef {
    pub(crate) id: ComponentId,
}

impl ComponentDef {
    pub fn id(self) -> ComponentId {
        self.id
    }
}

/// Element kind of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemKind {
    F32,
    F64,
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    Str,
}

impl ElemKind {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ElemKind::Str)
    }

    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "f32" => ElemKind::F32,
            "f64" => ElemKind::F64,
            "i8" => ElemKind::I8,
            "i16" => ElemKind::I16,
            "i32" => ElemKind::I32,
            "u8" => ElemKind::U8,
            "u16" => ElemKind::U16,
            "u32" => ElemKind::U32,
            "string" => ElemKind::Str,
            _ => return None,
        })
    }
}

/// Field kind: element kind, fixed stride, and the array marker.
///
/// Stride is 1 for scalars and strings, N for fixed-length `kind[N]`
/// arrays. A `kind[1]` array keeps stride 1 but stays an array: it reads
/// back as a length-1 sequence, not a scalar, so `is_array` travels
/// alongside the stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKind {
    pub elem: ElemKind,
    pub stride: usize,
    pub is_array: bool,
}

impl FieldKind {
    pub fn scalar(elem: ElemKind) -> Self {
        Self {
            elem,
            stride: 1,
            is_array: false,
        }
    }

    /// Parse a type token: `f32`, `u16[4]`, `string`, ...
    ///
    /// Fails with `EcsError::UnknownType` for anything outside the token set
    /// or a stride below 1. Strings do not take a stride suffix.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        if let Some(open) = token.find('[') {
            let elem = ElemKind::parse(&token[..open])
                .ok_or_else(|| EcsError::UnknownType(token.to_string()))?;
            let rest = &token[open + 1..];
            let close = rest
                .find(']')
                .filter(|&i| i == rest.len() - 1)
                .ok_or_else(|| EcsError::UnknownType(token.to_string()))?;
            let stride: usize = rest[..close]
                .parse()
                .map_err(|_| EcsError::UnknownType(token.to_string()))?;
            if stride < 1 || elem == ElemKind::Str {
                return Err(EcsError::UnknownType(token.to_string()));
            }
            Ok(Self {
                elem,
                stride,
                is_array: true,
            })
        } else {
            let elem =
                ElemKind::parse(token).ok_or_else(|| EcsError::UnknownType(token.to_string()))?;
            Ok(Self::scalar(elem))
        }
    }
}

/// One schema field
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered component schema with a name -> index side table.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldDef>,
    index: FxHashMap<String, u16>,
}

impl Schema {
    fn push(&mut self, name: &str, kind: FieldKind) {
        // First definition wins; a duplicate field name is ignored
        if !self.index.contains_key(name) {
            self.index.insert(name.to_string(), self.fields.len() as u16);
            self.fields.push(FieldDef {
                name: name.to_string(),
                kind,
            });
        }
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_index(&self, name: &str) -> Option<u16> {
        self.index.get(name).copied()
    }

    pub fn kind(&self, field: u16) -> Option<FieldKind> {
        self.fields.get(field as usize).map(|f| f.kind)
    }
}

/// Pre-resolved accessor for one field of one component.
///
/// Valid only for entities whose archetype mask contains the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub component: ComponentId,
    pub field: u16,
}

struct ComponentInfo {
    name: String,
    schema: Option<Schema>,
}

/// Interns component definitions and holds their schemas.
pub struct ComponentRegistry {
    components: Vec<ComponentInfo>,
    by_name: FxHashMap<String, ComponentId>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    fn intern(&mut self, name: &str, schema: Option<Schema>) -> ComponentDef {
        let id = ComponentId(self.components.len() as u32);
        self.components.push(ComponentInfo {
            name: name.to_string(),
            schema,
        });
        // First definition under a name wins the name lookup
        self.by_name.entry(name.to_string()).or_insert(id);
        ComponentDef { id }
    }

    /// Define a data-less marker component.
    pub fn define_tag(&mut self, name: &str) -> ComponentDef {
        self.intern(name, None)
    }

    /// Define a component whose fields all share one kind.
    pub fn define_uniform(&mut self, name: &str, kind: &str, fields: &[&str]) -> Result<ComponentDef> {
        let kind = FieldKind::parse(kind)?;
        let mut schema = Schema::default();
        for field in fields {
            schema.push(field, kind);
        }
        Ok(self.intern(name, Some(schema)))
    }

    /// Define a component with per-field kinds.
    pub fn define_schema(&mut self, name: &str, fields: &[(&str, &str)]) -> Result<ComponentDef> {
        let mut schema = Schema::default();
        for (field, token) in fields {
            schema.push(field, FieldKind::parse(token)?);
        }
        Ok(self.intern(name, Some(schema)))
    }

    /// Bit index of a component in archetype masks. Idempotent: the index is
    /// the dense id assigned at definition time.
    pub fn bit_index_of(&self, def: ComponentDef) -> u32 {
        def.id.0
    }

    pub fn name(&self, id: ComponentId) -> &str {
        &self.components[id.0 as usize].name
    }

    pub fn schema(&self, id: ComponentId) -> Option<&Schema> {
        self.components[id.0 as usize].schema.as_ref()
    }

    /// True for components with no schema (membership only, no row data).
    pub fn is_tag(&self, id: ComponentId) -> bool {
        self.schema(id).is_none()
    }

    /// Resolve a field name to a `FieldRef`. None for tags and unknown names.
    pub fn field(&self, def: ComponentDef, name: &str) -> Option<FieldRef> {
        let schema = self.schema(def.id)?;
        Some(FieldRef {
            component: def.id,
            field: schema.field_index(name)?,
        })
    }

    pub fn field_kind(&self, field_ref: FieldRef) -> Option<FieldKind> {
        self.schema(field_ref.component)?.kind(field_ref.field)
    }

    /// First component registered under `name`, if any.
    pub fn def_by_name(&self, name: &str) -> Option<ComponentDef> {
        self.by_name.get(name).map(|&id| ComponentDef { id })
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_tokens() {
        for token in ["f32", "f64", "i8", "i16", "i32", "u8", "u16", "u32", "string"] {
            let kind = FieldKind::parse(token).unwrap();
            assert_eq!(kind.stride, 1, "{token}");
            assert!(!kind.is_array, "{token}");
        }
    }

    #[test]
    fn test_parse_fixed_array() {
        let kind = FieldKind::parse("f32[4]").unwrap();
        assert_eq!(kind.elem, ElemKind::F32);
        assert_eq!(kind.stride, 4);
        assert!(kind.is_array);

        // Length-1 arrays stay arrays, not scalars
        let kind = FieldKind::parse("i16[1]").unwrap();
        assert_eq!(kind.stride, 1);
        assert!(kind.is_array);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            FieldKind::parse("f128"),
            Err(EcsError::UnknownType(_))
        ));
        assert!(FieldKind::parse("f32[0]").is_err());
        assert!(FieldKind::parse("f32[").is_err());
        assert!(FieldKind::parse("f32[2]x").is_err());
        assert!(FieldKind::parse("string[3]").is_err());
    }

    #[test]
    fn test_dense_ids_double_as_bit_indices() {
        let mut registry = ComponentRegistry::new();
        let a = registry.define_tag("A");
        let b = registry.define_tag("B");
        assert_eq!(registry.bit_index_of(a), 0);
        assert_eq!(registry.bit_index_of(b), 1);
        assert_eq!(registry.bit_index_of(a), 0); // idempotent
    }

    #[test]
    fn test_identity_is_per_definition_not_per_name() {
        let mut registry = ComponentRegistry::new();
        let first = registry.define_tag("Twin");
        let second = registry.define_tag("Twin");
        assert_ne!(first, second);
        assert_eq!(registry.def_by_name("Twin"), Some(first));
    }

    #[test]
    fn test_field_resolution() {
        let mut registry = ComponentRegistry::new();
        let pos = registry.define_uniform("Position", "f32", &["x", "y"]).unwrap();
        let x = registry.field(pos, "x").unwrap();
        let y = registry.field(pos, "y").unwrap();
        assert_eq!(x.field, 0);
        assert_eq!(y.field, 1);
        assert!(registry.field(pos, "z").is_none());

        let tag = registry.define_tag("Frozen");
        assert!(registry.field(tag, "x").is_none());
        assert!(registry.is_tag(tag.id()));
    }
}
