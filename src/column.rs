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

//! Struct-of-arrays column storage.
//!
//! Each archetype keeps one dense typed column per schema field, sized by
//! capacity times the field's stride. Numeric values cross the dynamic
//! boundary as f64, strings as owned values; the typed backing arrays are
//! what iteration and the apply engine read directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::registry::{ElemKind, FieldKind, Schema};

/// Dynamic field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Scalar numeric (all numeric kinds round-trip through f64)
    Num(f64),
    /// Fixed-stride numeric array
    Seq(Vec<f64>),
    /// String
    Str(String),
}

impl Value {
    pub fn num(v: f64) -> Self {
        Value::Num(v)
    }

    pub fn seq<I: IntoIterator<Item = f64>>(v: I) -> Self {
        Value::Seq(v.into_iter().collect())
    }

    pub fn str(v: impl Into<String>) -> Self {
        Value::Str(v.into())
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[f64]> {
        match self {
            Value::Seq(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Num(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

/// One component's row data as a field-name record.
pub type ComponentData = HashMap<String, Value>;

/// Build a `ComponentData` record from field literals.
pub fn data<const N: usize>(entries: [(&str, Value); N]) -> ComponentData {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Typed dense storage for one field, length = capacity * stride.
#[derive(Debug, Clone)]
pub enum Column {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    Str(Vec<String>),
}

macro_rules! column_dispatch {
    ($self:expr, $buf:ident => $body:expr) => {
        match $self {
            Column::F32($buf) => $body,
            Column::F64($buf) => $body,
            Column::I8($buf) => $body,
            Column::I16($buf) => $body,
            Column::I32($buf) => $body,
            Column::U8($buf) => $body,
            Column::U16($buf) => $body,
            Column::U32($buf) => $body,
            Column::Str($buf) => $body,
        }
    };
}

impl Column {
    /// Allocate a zeroed column of `elems` elements.
    pub fn new(elem: ElemKind, elems: usize) -> Self {
        match elem {
            ElemKind::F32 => Column::F32(vec![0.0; elems]),
            ElemKind::F64 => Column::F64(vec![0.0; elems]),
            ElemKind::I8 => Column::I8(vec![0; elems]),
            ElemKind::I16 => Column::I16(vec![0; elems]),
            ElemKind::I32 => Column::I32(vec![0; elems]),
            ElemKind::U8 => Column::U8(vec![0; elems]),
            ElemKind::U16 => Column::U16(vec![0; elems]),
            ElemKind::U32 => Column::U32(vec![0; elems]),
            ElemKind::Str => Column::Str(vec![String::new(); elems]),
        }
    }

    pub fn elem_kind(&self) -> ElemKind {
        match self {
            Column::F32(_) => ElemKind::F32,
            Column::F64(_) => ElemKind::F64,
            Column::I8(_) => ElemKind::I8,
            Column::I16(_) => ElemKind::I16,
            Column::I32(_) => ElemKind::I32,
            Column::U8(_) => ElemKind::U8,
            Column::U16(_) => ElemKind::U16,
            Column::U32(_) => ElemKind::U32,
            Column::Str(_) => ElemKind::Str,
        }
    }

    /// Total element count (capacity * stride).
    pub fn len(&self) -> usize {
        column_dispatch!(self, buf => buf.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reallocate to `elems` elements; preserves the existing prefix.
    pub fn grow(&mut self, elems: usize) {
        column_dispatch!(self, buf => buf.resize(elems, Default::default()))
    }

    /// Element-wise swap.
    pub fn swap(&mut self, a: usize, b: usize) {
        column_dispatch!(self, buf => buf.swap(a, b))
    }

    /// Numeric element as f64. None for string columns.
    pub fn get_num(&self, idx: usize) -> Option<f64> {
        match self {
            Column::F32(buf) => Some(buf[idx] as f64),
            Column::F64(buf) => Some(buf[idx]),
            Column::I8(buf) => Some(buf[idx] as f64),
            Column::I16(buf) => Some(buf[idx] as f64),
            Column::I32(buf) => Some(buf[idx] as f64),
            Column::U8(buf) => Some(buf[idx] as f64),
            Column::U16(buf) => Some(buf[idx] as f64),
            Column::U32(buf) => Some(buf[idx] as f64),
            Column::Str(_) => None,
        }
    }

    /// Write a numeric element, converting from f64. No-op for strings.
    pub fn set_num(&mut self, idx: usize, value: f64) {
        match self {
            Column::F32(buf) => buf[idx] = value as f32,
            Column::F64(buf) => buf[idx] = value,
            Column::I8(buf) => buf[idx] = value as i8,
            Column::I16(buf) => buf[idx] = value as i16,
            Column::I32(buf) => buf[idx] = value as i32,
            Column::U8(buf) => buf[idx] = value as u8,
            Column::U16(buf) => buf[idx] = value as u16,
            Column::U32(buf) => buf[idx] = value as u32,
            Column::Str(_) => {}
        }
    }

    pub fn get_str(&self, idx: usize) -> Option<&str> {
        match self {
            Column::Str(buf) => Some(&buf[idx]),
            _ => None,
        }
    }

    pub fn set_str(&mut self, idx: usize, value: &str) {
        if let Column::Str(buf) = self {
            buf[idx].clear();
            buf[idx].push_str(value);
        }
    }

    fn zero(&mut self, idx: usize) {
        match self {
            Column::Str(buf) => buf[idx].clear(),
            _ => self.set_num(idx, 0.0),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Column::F32(buf) => Some(buf),
            _ => None,
        }
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            Column::F32(buf) => Some(buf),
            _ => None,
        }
    }

    /// Copy the first `elems` elements of `src` into self.
    ///
    /// Both columns must share an element kind; mismatches indicate storage
    /// corruption and panic.
    pub fn copy_prefix_from(&mut self, src: &Column, elems: usize) {
        match (self, src) {
            (Column::F32(dst), Column::F32(src)) => dst[..elems].copy_from_slice(&src[..elems]),
            (Column::F64(dst), Column::F64(src)) => dst[..elems].copy_from_slice(&src[..elems]),
            (Column::I8(dst), Column::I8(src)) => dst[..elems].copy_from_slice(&src[..elems]),
            (Column::I16(dst), Column::I16(src)) => dst[..elems].copy_from_slice(&src[..elems]),
            (Column::I32(dst), Column::I32(src)) => dst[..elems].copy_from_slice(&src[..elems]),
            (Column::U8(dst), Column::U8(src)) => dst[..elems].copy_from_slice(&src[..elems]),
            (Column::U16(dst), Column::U16(src)) => dst[..elems].copy_from_slice(&src[..elems]),
            (Column::U32(dst), Column::U32(src)) => dst[..elems].copy_from_slice(&src[..elems]),
            (Column::Str(dst), Column::Str(src)) => dst[..elems].clone_from_slice(&src[..elems]),
            _ => panic!("BUG: snapshot column kind mismatch"),
        }
    }
}

/// One schema field's column: name, stride and the array marker travel with
/// the storage so the archetype stays self-contained.
#[derive(Debug, Clone)]
pub struct FieldColumn {
    name: String,
    stride: usize,
    is_array: bool,
    column: Column,
}

impl FieldColumn {
    fn new(name: &str, kind: FieldKind, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            stride: kind.stride,
            is_array: kind.is_array,
            column: Column::new(kind.elem, capacity * kind.stride),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn column_mut(&mut self) -> &mut Column {
        &mut self.column
    }

    /// Write one row from a dynamic value. `None` or a kind mismatch zeroes
    /// the row; for fixed arrays, source elements beyond the value's length
    /// are zero.
    pub fn write(&mut self, row: usize, value: Option<&Value>) {
        let base = row * self.stride;
        if matches!(self.column, Column::Str(_)) {
            match value {
                Some(Value::Str(s)) => self.column.set_str(base, s),
                _ => self.column.zero(base),
            }
            return;
        }
        match value {
            Some(Value::Num(v)) => {
                // Scalar into an array field fills lane 0
                self.column.set_num(base, *v);
                for k in 1..self.stride {
                    self.column.zero(base + k);
                }
            }
            Some(Value::Seq(vs)) => {
                for k in 0..self.stride {
                    match vs.get(k) {
                        Some(v) => self.column.set_num(base + k, *v),
                        None => self.column.zero(base + k),
                    }
                }
            }
            _ => {
                for k in 0..self.stride {
                    self.column.zero(base + k);
                }
            }
        }
    }

    /// Read one row as a fresh dynamic value.
    ///
    /// Fixed-array fields always come back as a freshly-allocated length-N
    /// sequence, even at N = 1.
    pub fn read(&self, row: usize) -> Value {
        let base = row * self.stride;
        match &self.column {
            Column::Str(_) => Value::Str(self.column.get_str(base).unwrap_or_default().to_string()),
            _ if self.is_array => Value::Seq(
                (0..self.stride)
                    .map(|k| self.column.get_num(base + k).unwrap_or(0.0))
                    .collect(),
            ),
            _ => Value::Num(self.column.get_num(base).unwrap_or(0.0)),
        }
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        for k in 0..self.stride {
            self.column.swap(a * self.stride + k, b * self.stride + k);
        }
    }

    fn grow(&mut self, capacity: usize) {
        self.column.grow(capacity * self.stride);
    }
}

/// All field columns of one component within one archetype.
#[derive(Debug, Clone)]
pub struct ColumnSet {
    fields: Vec<FieldColumn>,
}

impl ColumnSet {
    pub fn new(schema: &Schema, capacity: usize) -> Self {
        Self {
            fields: schema
                .fields()
                .iter()
                .map(|f| FieldColumn::new(&f.name, f.kind, capacity))
                .collect(),
        }
    }

    pub fn fields(&self) -> &[FieldColumn] {
        &self.fields
    }

    pub fn field(&self, index: u16) -> Option<&FieldColumn> {
        self.fields.get(index as usize)
    }

    pub fn field_mut(&mut self, index: u16) -> Option<&mut FieldColumn> {
        self.fields.get_mut(index as usize)
    }

    /// Write a full row. Absent data zeroes every field; unknown fields in
    /// `data` are ignored, missing fields are zero/empty.
    pub fn write_row(&mut self, row: usize, row_data: Option<&ComponentData>) {
        for field in &mut self.fields {
            field.write(row, row_data.and_then(|d| d.get(&field.name)));
        }
    }

    /// Read a full row as a fresh record. Allocating by design.
    pub fn read_row(&self, row: usize) -> ComponentData {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.read(row)))
            .collect()
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        for field in &mut self.fields {
            field.swap_rows(a, b);
        }
    }

    pub fn grow(&mut self, capacity: usize) {
        for field in &mut self.fields {
            field.grow(capacity);
        }
    }

    /// Copy the first `rows` rows of every field from `src` (same schema).
    pub fn copy_rows_from(&mut self, src: &ColumnSet, rows: usize) {
        for (dst, src) in self.fields.iter_mut().zip(src.fields.iter()) {
            dst.column.copy_prefix_from(&src.column, rows * src.stride);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;

    fn schema() -> Schema {
        let mut registry = ComponentRegistry::new();
        let def = registry
            .define_schema("T", &[("x", "f32"), ("tags", "u8[3]"), ("label", "string")])
            .unwrap();
        registry.schema(def.id()).unwrap().clone()
    }

    #[test]
    fn test_write_read_row() {
        let mut set = ColumnSet::new(&schema(), 4);
        set.write_row(
            0,
            Some(&data([
                ("x", Value::num(1.5)),
                ("tags", Value::seq([1.0, 2.0])),
                ("label", Value::str("hero")),
            ])),
        );

        let row = set.read_row(0);
        assert_eq!(row["x"], Value::Num(1.5));
        // Elements beyond the source length are zero
        assert_eq!(row["tags"], Value::Seq(vec![1.0, 2.0, 0.0]));
        assert_eq!(row["label"], Value::Str("hero".to_string()));
    }

    #[test]
    fn test_absent_data_zeroes_row() {
        let mut set = ColumnSet::new(&schema(), 4);
        set.write_row(1, Some(&data([("x", Value::num(9.0))])));
        set.write_row(1, None);
        let row = set.read_row(1);
        assert_eq!(row["x"], Value::Num(0.0));
        assert_eq!(row["label"], Value::Str(String::new()));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let mut set = ColumnSet::new(&schema(), 4);
        set.write_row(0, Some(&data([("bogus", Value::num(3.0))])));
        assert_eq!(set.read_row(0)["x"], Value::Num(0.0));
    }

    #[test]
    fn test_swap_honors_stride() {
        let mut set = ColumnSet::new(&schema(), 4);
        set.write_row(0, Some(&data([("tags", Value::seq([1.0, 2.0, 3.0]))])));
        set.write_row(1, Some(&data([("tags", Value::seq([7.0, 8.0, 9.0]))])));
        set.swap_rows(0, 1);
        assert_eq!(set.read_row(0)["tags"], Value::Seq(vec![7.0, 8.0, 9.0]));
        assert_eq!(set.read_row(1)["tags"], Value::Seq(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_length_one_array_reads_as_seq() {
        let mut registry = ComponentRegistry::new();
        let def = registry
            .define_schema("Slots", &[("slot", "f32[1]"), ("plain", "f32")])
            .unwrap();
        let mut set = ColumnSet::new(registry.schema(def.id()).unwrap(), 2);
        set.write_row(
            0,
            Some(&data([
                ("slot", Value::seq([5.0])),
                ("plain", Value::num(5.0)),
            ])),
        );

        let row = set.read_row(0);
        assert_eq!(row["slot"], Value::Seq(vec![5.0]));
        assert_eq!(row["plain"], Value::Num(5.0));
    }

    #[test]
    fn test_grow_preserves_prefix() {
        let mut set = ColumnSet::new(&schema(), 2);
        set.write_row(1, Some(&data([("x", Value::num(4.0))])));
        set.grow(8);
        assert_eq!(set.read_row(1)["x"], Value::Num(4.0));
        assert_eq!(set.fields()[0].column().len(), 8);
        assert_eq!(set.fields()[1].column().len(), 24); // stride 3
    }
}
