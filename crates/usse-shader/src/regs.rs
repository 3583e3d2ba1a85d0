//! Register file load/store primitives
//!
//! Every bank is a run of 32-bit components grouped into vec4 slots
//! (component `c` lives in slot `c / 4`, lane `c % 4`). Each bank has two
//! windows: the primary one that plain operands address and an alternate
//! one reached through `window = 1`. Slots are materialised lazily as
//! `Private` variables.

use crate::convert;
use crate::ir::{Id, Op, SpirVBuilder, StorageClass};
use crate::types::*;
use std::collections::BTreeMap;

/// Primary operand window
pub const PRIMARY_WINDOW: u8 = 0;
/// Alternate operand window
pub const ALTERNATE_WINDOW: u8 = 1;

/// Register storage of one shader
#[derive(Debug, Clone)]
pub struct RegisterFile {
    slots_per_bank: u32,
    slots: BTreeMap<(RegisterBank, u8, u32), Id>,
}

impl RegisterFile {
    pub fn new(slots_per_bank: u32) -> Self {
        Self {
            slots_per_bank,
            slots: BTreeMap::new(),
        }
    }

    /// Number of addressable components per bank window
    pub fn components_per_bank(&self) -> u32 {
        self.slots_per_bank * 4
    }

    /// Variable backing a slot, if it has been touched
    pub fn slot_variable(&self, bank: RegisterBank, window: u8, slot: u32) -> Option<Id> {
        self.slots.get(&(bank, window, slot)).copied()
    }

    /// Variable backing a slot, declaring it on first use
    pub fn declare_slot(&mut self, b: &mut SpirVBuilder, bank: RegisterBank, window: u8, slot: u32) -> Id {
        *self.slots.entry((bank, window, slot)).or_insert_with(|| {
            let f32_t = b.make_float_type(32);
            let vec4 = b.make_vector_type(f32_t, 4);
            b.add_variable(StorageClass::Private, vec4)
        })
    }

    fn in_range(&self, bank: RegisterBank, component: u32) -> bool {
        bank.is_addressable() && component < self.components_per_bank()
    }

    /// Raw 32 bits of one component, typed as f32
    fn load_component(&mut self, b: &mut SpirVBuilder, bank: RegisterBank, window: u8, component: u32) -> Id {
        let var = self.declare_slot(b, bank, window, component / 4);
        let slot = b.create_load(var);
        b.create_composite_extract(slot, component % 4)
    }

    fn store_component(&mut self, b: &mut SpirVBuilder, bank: RegisterBank, window: u8, component: u32, value: Id) {
        let var = self.declare_slot(b, bank, window, component / 4);
        let slot = b.create_load(var);
        let updated = b.create_composite_insert(value, slot, component % 4);
        b.create_store(var, updated);
    }

    /// Whether `load` would succeed for `op` under `mask`. Emits nothing.
    pub fn can_load(&self, op: &Operand, mask: ChannelMask) -> bool {
        if mask.is_empty() {
            return false;
        }
        if op.bank == RegisterBank::Immediate {
            return true;
        }

        let per_component = op.ty.lanes_per_component();
        mask.lanes().all(|lane| match op.swizzle.0[lane as usize].offset() {
            Some(element) => self.in_range(op.bank, op.num + element / per_component),
            None => true,
        })
    }

    /// Load the lanes selected by `mask` from the primary window
    pub fn load(&mut self, b: &mut SpirVBuilder, op: &Operand, mask: ChannelMask) -> Option<Id> {
        self.load_window(b, op, mask, PRIMARY_WINDOW)
    }

    /// Load the lanes selected by `mask` as floats.
    ///
    /// The result has one lane per set mask bit (a scalar for a single bit).
    /// Returns `None` when the operand cannot be addressed.
    pub fn load_window(&mut self, b: &mut SpirVBuilder, op: &Operand, mask: ChannelMask, window: u8) -> Option<Id> {
        if mask.is_empty() {
            return None;
        }

        let mut lanes = Vec::with_capacity(mask.count() as usize);
        for lane in mask.lanes() {
            let channel = op.swizzle.0[lane as usize];
            let Some(element) = channel.offset() else {
                let literal = if channel == SwizzleChannel::One { 1.0 } else { 0.0 };
                lanes.push(b.make_float_constant(literal));
                continue;
            };

            if op.bank == RegisterBank::Immediate {
                lanes.push(b.make_float_constant(op.num as f32));
                continue;
            }

            let per_component = op.ty.lanes_per_component();
            let component = op.num + element / per_component;
            if !self.in_range(op.bank, component) {
                tracing::debug!("Operand {}{} is not addressable", op.bank, component);
                return None;
            }

            let raw = self.load_component(b, op.bank, window, component);
            lanes.push(convert::unpack_lane(b, raw, op.ty, element % per_component));
        }

        if lanes.len() == 1 {
            return Some(lanes[0]);
        }
        let f32_t = b.make_float_type(32);
        let vec_t = b.make_vector_type(f32_t, lanes.len() as u32);
        Some(b.create_composite_construct(vec_t, &lanes))
    }

    /// Store the lanes of `value` selected by `mask`, encoded as `op.ty`.
    ///
    /// Lane `i` of the value goes to element `i` of the destination. Float
    /// values headed for integer destinations are converted with saturation.
    pub fn store(&mut self, b: &mut SpirVBuilder, op: &Operand, value: Id, mask: ChannelMask) {
        if mask.is_empty() {
            return;
        }

        let value_lanes = b.num_components(value);
        let encoded = if op.ty.is_integer() && b.is_float_value(value) {
            convert::convert_to_int(b, value, op.ty)
        } else if op.ty == DataType::C10 {
            convert::convert_to_fixed10(b, value)
        } else {
            value
        };

        let u32_t = b.make_uint_type(32);
        let f32_t = b.make_float_type(32);
        let per_component = op.ty.lanes_per_component();
        let width = op.ty.bits();

        for lane in mask.lanes() {
            let component = op.num + lane / per_component;
            if !self.in_range(op.bank, component) {
                tracing::warn!("Store to {}{} dropped: not addressable", op.bank, component);
                continue;
            }

            let lane_value = if value_lanes > 1 {
                b.create_composite_extract(encoded, lane.min(value_lanes - 1))
            } else {
                encoded
            };

            if per_component == 1 {
                let as_float = if b.is_float_value(lane_value) {
                    lane_value
                } else {
                    b.create_op(Op::Bitcast, f32_t, vec![lane_value.word()])
                };
                self.store_component(b, op.bank, PRIMARY_WINDOW, component, as_float);
                continue;
            }

            let bits = if op.ty == DataType::F16 {
                let zero = b.make_float_constant(0.0);
                let vec2 = b.make_vector_type(f32_t, 2);
                let pair = b.create_composite_construct(vec2, &[lane_value, zero]);
                b.create_ext_inst(u32_t, crate::ir::GlslStd450::PackHalf2x16, &[pair])
            } else {
                b.create_op(Op::Bitcast, u32_t, vec![lane_value.word()])
            };

            let raw = self.load_component(b, op.bank, PRIMARY_WINDOW, component);
            let old = b.create_op(Op::Bitcast, u32_t, vec![raw.word()]);
            let offset = b.make_uint_constant((lane % per_component) * width);
            let count = b.make_uint_constant(width);
            let merged = b.create_op(
                Op::BitFieldInsert,
                u32_t,
                vec![old.word(), bits.word(), offset.word(), count.word()],
            );
            let as_float = b.create_op(Op::Bitcast, f32_t, vec![merged.word()]);
            self.store_component(b, op.bank, PRIMARY_WINDOW, component, as_float);
        }
    }
}
