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

//! Bulk column apply: a small arithmetic expression tree evaluated across
//! every matching archetype's rows.
//!
//! When every involved column is f32 and the platform has 128-bit SIMD, the
//! kernel runs in lanes of 4 with a scalar remainder; otherwise a scalar
//! loop computes the same single-precision result, so both paths are
//! bit-identical for `add/sub/mul/scale`. Random streams come from a fixed
//! LCG persisted per (archetype, target field), reproducible but not
//! cryptographically sound.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::archetype::ArchetypeTable;
use crate::column::Column;
use crate::error::{EcsError, Result};
use crate::registry::{ComponentDef, ComponentId, ComponentRegistry, FieldRef};

/// Lane width of the bulk kernel on platforms with 128-bit SIMD
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub fn lane_width() -> usize {
    4 // SSE2 / NEON: 128-bit / 32-bit = 4 elements
}

/// Lane width of the bulk kernel, single-element on fallback platforms
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub fn lane_width() -> usize {
    1 // Fallback: scalar
}

const LANES: usize = 4;
const LCG_MUL: u32 = 1664525;
const LCG_INC: u32 = 1013904223;
const INV_2P24: f32 = 1.0 / 16_777_216.0; // 2^-24

/// Four-lane LCG state, persisted per (archetype, target field) so
/// successive frames do not repeat.
#[derive(Debug, Clone)]
pub(crate) struct LaneRng {
    state: [u32; LANES],
}

impl LaneRng {
    fn new() -> Self {
        // Lanes decorrelate via golden-ratio seeds; the stream itself is
        // fixed by the LCG parameters
        let mut state = [0u32; LANES];
        for (j, lane) in state.iter_mut().enumerate() {
            *lane = 0x9E37_79B9u32.wrapping_mul(j as u32 + 1);
        }
        Self { state }
    }

    fn next4(&mut self, min: f32, max: f32) -> [f32; LANES] {
        let span = max - min;
        let mut out = [0.0f32; LANES];
        for j in 0..LANES {
            self.state[j] = self.state[j].wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
            out[j] = min + ((self.state[j] >> 8) as f32 * INV_2P24) * span;
        }
        out
    }

    /// Scalar step: advances lane 0 only
    fn next1(&mut self, min: f32, max: f32) -> f32 {
        self.state[0] = self.state[0].wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
        min + ((self.state[0] >> 8) as f32 * INV_2P24) * (max - min)
    }
}

/// Apply expression tree
#[derive(Debug, Clone)]
pub enum Expr {
    /// Read a column
    Field(FieldRef),
    /// Uniform values in `[min, max)`
    Random { min: f32, max: f32 },
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    /// Scalar multiply
    Scale(Box<Expr>, f32),
}

impl Expr {
    pub fn field(field_ref: FieldRef) -> Self {
        Expr::Field(field_ref)
    }

    pub fn random(min: f32, max: f32) -> Self {
        Expr::Random { min, max }
    }

    pub fn add(a: Expr, b: Expr) -> Self {
        Expr::Add(Box::new(a), Box::new(b))
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Expr::Sub(Box::new(a), Box::new(b))
    }

    pub fn mul(a: Expr, b: Expr) -> Self {
        Expr::Mul(Box::new(a), Box::new(b))
    }

    pub fn scale(a: Expr, s: f32) -> Self {
        Expr::Scale(Box::new(a), s)
    }

    /// Collect every `Field` leaf
    pub(crate) fn collect_fields(&self, out: &mut SmallVec<[FieldRef; 8]>) {
        match self {
            Expr::Field(field_ref) => out.push(*field_ref),
            Expr::Random { .. } => {}
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            Expr::Scale(a, _) => a.collect_fields(out),
        }
    }

    fn contains_random(&self) -> bool {
        match self {
            Expr::Field(_) => false,
            Expr::Random { .. } => true,
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => {
                a.contains_random() || b.contains_random()
            }
            Expr::Scale(a, _) => a.contains_random(),
        }
    }
}

/// Optional archetype constraints for `apply`
#[derive(Debug, Clone, Default)]
pub struct ApplyFilter {
    /// Components required beyond those the expression mentions
    pub with: Vec<ComponentDef>,
    /// Components that must be absent
    pub without: Vec<ComponentDef>,
}

impl ApplyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, defs: &[ComponentDef]) -> Self {
        self.with.extend_from_slice(defs);
        self
    }

    pub fn without(mut self, defs: &[ComponentDef]) -> Self {
        self.without.extend_from_slice(defs);
        self
    }
}

/// Check the target and every operand up front: each must resolve to a
/// scalar numeric column. Tags, string fields, fixed arrays and unknown
/// fields are invalid operands.
pub(crate) fn validate(
    registry: &ComponentRegistry,
    target: FieldRef,
    expr: &Expr,
) -> Result<()> {
    let mut fields: SmallVec<[FieldRef; 8]> = SmallVec::new();
    fields.push(target);
    expr.collect_fields(&mut fields);

    for field_ref in fields {
        let kind = registry.field_kind(field_ref).ok_or_else(|| {
            EcsError::InvalidOperand(format!(
                "component '{}' has no such data field",
                registry.name(field_ref.component)
            ))
        })?;
        if !kind.elem.is_numeric() || kind.is_array {
            return Err(EcsError::InvalidOperand(format!(
                "field {} of '{}' is not a scalar numeric column",
                field_ref.field,
                registry.name(field_ref.component)
            )));
        }
    }
    Ok(())
}

/// Component set an expression requires on matched archetypes
pub(crate) fn required_components(
    target: FieldRef,
    expr: &Expr,
    out: &mut SmallVec<[ComponentId; 8]>,
) {
    out.push(target.component);
    let mut fields: SmallVec<[FieldRef; 8]> = SmallVec::new();
    expr.collect_fields(&mut fields);
    for field_ref in fields {
        if !out.contains(&field_ref.component) {
            out.push(field_ref.component);
        }
    }
}

/// Read-only typed column pointer for operand loads
#[derive(Clone, Copy)]
enum ColPtr {
    F32(*const f32),
    F64(*const f64),
    I8(*const i8),
    I16(*const i16),
    I32(*const i32),
    U8(*const u8),
    U16(*const u16),
    U32(*const u32),
}

impl ColPtr {
    fn of(column: &Column) -> Option<Self> {
        Some(match column {
            Column::F32(buf) => ColPtr::F32(buf.as_ptr()),
            Column::F64(buf) => ColPtr::F64(buf.as_ptr()),
            Column::I8(buf) => ColPtr::I8(buf.as_ptr()),
            Column::I16(buf) => ColPtr::I16(buf.as_ptr()),
            Column::I32(buf) => ColPtr::I32(buf.as_ptr()),
            Column::U8(buf) => ColPtr::U8(buf.as_ptr()),
            Column::U16(buf) => ColPtr::U16(buf.as_ptr()),
            Column::U32(buf) => ColPtr::U32(buf.as_ptr()),
            Column::Str(_) => return None,
        })
    }

    fn is_f32(self) -> bool {
        matches!(self, ColPtr::F32(_))
    }

    /// # Safety
    /// `idx` must be within the column's live prefix.
    unsafe fn load(self, idx: usize) -> f32 {
        match self {
            ColPtr::F32(p) => *p.add(idx),
            ColPtr::F64(p) => *p.add(idx) as f32,
            ColPtr::I8(p) => *p.add(idx) as f32,
            ColPtr::I16(p) => *p.add(idx) as f32,
            ColPtr::I32(p) => *p.add(idx) as f32,
            ColPtr::U8(p) => *p.add(idx) as f32,
            ColPtr::U16(p) => *p.add(idx) as f32,
            ColPtr::U32(p) => *p.add(idx) as f32,
        }
    }
}

/// Mutable typed column pointer for target stores
#[derive(Clone, Copy)]
enum ColPtrMut {
    F32(*mut f32),
    F64(*mut f64),
    I8(*mut i8),
    I16(*mut i16),
    I32(*mut i32),
    U8(*mut u8),
    U16(*mut u16),
    U32(*mut u32),
}

impl ColPtrMut {
    fn of(column: &mut Column) -> Option<Self> {
        Some(match column {
            Column::F32(buf) => ColPtrMut::F32(buf.as_mut_ptr()),
            Column::F64(buf) => ColPtrMut::F64(buf.as_mut_ptr()),
            Column::I8(buf) => ColPtrMut::I8(buf.as_mut_ptr()),
            Column::I16(buf) => ColPtrMut::I16(buf.as_mut_ptr()),
            Column::I32(buf) => ColPtrMut::I32(buf.as_mut_ptr()),
            Column::U8(buf) => ColPtrMut::U8(buf.as_mut_ptr()),
            Column::U16(buf) => ColPtrMut::U16(buf.as_mut_ptr()),
            Column::U32(buf) => ColPtrMut::U32(buf.as_mut_ptr()),
            Column::Str(_) => return None,
        })
    }

    fn is_f32(self) -> bool {
        matches!(self, ColPtrMut::F32(_))
    }

    /// # Safety
    /// `idx` must be within the column's live prefix.
    unsafe fn store(self, idx: usize, value: f32) {
        match self {
            ColPtrMut::F32(p) => *p.add(idx) = value,
            ColPtrMut::F64(p) => *p.add(idx) = value as f64,
            ColPtrMut::I8(p) => *p.add(idx) = value as i8,
            ColPtrMut::I16(p) => *p.add(idx) = value as i16,
            ColPtrMut::I32(p) => *p.add(idx) = value as i32,
            ColPtrMut::U8(p) => *p.add(idx) = value as u8,
            ColPtrMut::U16(p) => *p.add(idx) = value as u16,
            ColPtrMut::U32(p) => *p.add(idx) = value as u32,
        }
    }
}

type Operands = SmallVec<[(FieldRef, ColPtr); 8]>;

/// # Safety
/// Every operand pointer must cover `[base, base + 4)`.
unsafe fn eval4(expr: &Expr, operands: &Operands, base: usize, rng: &mut LaneRng) -> [f32; LANES] {
    match expr {
        Expr::Field(field_ref) => {
            let ptr = operands
                .iter()
                .find(|(f, _)| f == field_ref)
                .map(|(_, p)| *p)
                .expect("BUG: unresolved apply operand");
            [
                ptr.load(base),
                ptr.load(base + 1),
                ptr.load(base + 2),
                ptr.load(base + 3),
            ]
        }
        Expr::Random { min, max } => rng.next4(*min, *max),
        Expr::Add(a, b) => {
            let (a, b) = (eval4(a, operands, base, rng), eval4(b, operands, base, rng));
            [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
        }
        Expr::Sub(a, b) => {
            let (a, b) = (eval4(a, operands, base, rng), eval4(b, operands, base, rng));
            [a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3] - b[3]]
        }
        Expr::Mul(a, b) => {
            let (a, b) = (eval4(a, operands, base, rng), eval4(b, operands, base, rng));
            [a[0] * b[0], a[1] * b[1], a[2] * b[2], a[3] * b[3]]
        }
        Expr::Scale(a, s) => {
            let a = eval4(a, operands, base, rng);
            [a[0] * s, a[1] * s, a[2] * s, a[3] * s]
        }
    }
}

/// # Safety
/// Every operand pointer must cover `idx`.
unsafe fn eval1(expr: &Expr, operands: &Operands, idx: usize, rng: &mut LaneRng) -> f32 {
    match expr {
        Expr::Field(field_ref) => operands
            .iter()
            .find(|(f, _)| f == field_ref)
            .map(|(_, p)| *p)
            .expect("BUG: unresolved apply operand")
            .load(idx),
        Expr::Random { min, max } => rng.next1(*min, *max),
        Expr::Add(a, b) => eval1(a, operands, idx, rng) + eval1(b, operands, idx, rng),
        Expr::Sub(a, b) => eval1(a, operands, idx, rng) - eval1(b, operands, idx, rng),
        Expr::Mul(a, b) => eval1(a, operands, idx, rng) * eval1(b, operands, idx, rng),
        Expr::Scale(a, s) => eval1(a, operands, idx, rng) * s,
    }
}

/// Persisted per-(archetype, target field) random streams.
pub(crate) struct ApplyState {
    rng: AHashMap<(usize, FieldRef), LaneRng>,
}

impl ApplyState {
    pub fn new() -> Self {
        Self {
            rng: AHashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.rng.clear();
    }

    /// Evaluate `expr` into `target` across all live rows of one table.
    ///
    /// The caller has validated the expression; a table without the target
    /// column is skipped silently. Never touches membership or row count.
    pub(crate) fn run_table(
        &mut self,
        table: &mut ArchetypeTable,
        archetype_id: usize,
        target: FieldRef,
        expr: &Expr,
    ) {
        let rows = table.len();
        if rows == 0 {
            return;
        }
        let target_ptr = match table
            .field_column_mut(target)
            .and_then(|f| ColPtrMut::of(f.column_mut()))
        {
            Some(ptr) => ptr,
            None => return,
        };

        let mut leaf_refs: SmallVec<[FieldRef; 8]> = SmallVec::new();
        expr.collect_fields(&mut leaf_refs);
        let mut operands: Operands = SmallVec::new();
        for field_ref in leaf_refs {
            if operands.iter().any(|(f, _)| *f == field_ref) {
                continue;
            }
            match table.field_column(field_ref).and_then(|f| ColPtr::of(f.column())) {
                Some(ptr) => operands.push((field_ref, ptr)),
                // Matched tables carry every required component; a miss here
                // means the caller matched by hand, skip rather than corrupt
                None => return,
            }
        }

        let mut scratch = LaneRng::new();
        let rng = if expr.contains_random() {
            self.rng
                .entry((archetype_id, target))
                .or_insert_with(LaneRng::new)
        } else {
            &mut scratch
        };

        let all_f32 = target_ptr.is_f32() && operands.iter().all(|(_, p)| p.is_f32());

        // Safety: all pointers cover `rows` elements (capacity >= rows) and
        // within a chunk operand loads complete before the target store, so
        // a target column used as its own operand reads pre-update values.
        unsafe {
            if all_f32 && lane_width() == LANES {
                let chunks = rows / LANES;
                for c in 0..chunks {
                    let base = c * LANES;
                    let values = eval4(expr, &operands, base, rng);
                    for (j, value) in values.into_iter().enumerate() {
                        target_ptr.store(base + j, value);
                    }
                }
                for idx in (chunks * LANES)..rows {
                    let value = eval1(expr, &operands, idx, rng);
                    target_ptr.store(idx, value);
                }
            } else {
                for idx in 0..rows {
                    let value = eval1(expr, &operands, idx, rng);
                    target_ptr.store(idx, value);
                }
            }
        }
    }
}

impl Default for ApplyState {
    fn default() -> Self {
        Self::new()
    }
}
