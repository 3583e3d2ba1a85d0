//! Numeric unpack/convert helpers
//!
//! Registers hold raw 32-bit components typed as `f32` in the IR. These
//! helpers turn packed encodings into float vectors and float vectors into
//! saturated integers.

use crate::ir::{GlslStd450, Id, Op, SpirVBuilder};
use crate::types::DataType;

/// C10 fixed point scale (8 fractional bits)
pub const C10_SCALE: f32 = 255.0;

fn bitcast(b: &mut SpirVBuilder, ty: Id, value: Id) -> Id {
    b.create_op(Op::Bitcast, ty, vec![value.word()])
}

/// Extract lane `sub` of a packed component as a float
///
/// `raw` is a scalar holding the 32 raw bits of one register component.
pub fn unpack_lane(b: &mut SpirVBuilder, raw: Id, ty: DataType, sub: u32) -> Id {
    let f32_t = b.make_float_type(32);
    match ty {
        DataType::F32 => raw,
        DataType::F16 => {
            let u32_t = b.make_uint_type(32);
            let vec2 = b.make_vector_type(f32_t, 2);
            let bits = bitcast(b, u32_t, raw);
            let pair = b.create_ext_inst(vec2, GlslStd450::UnpackHalf2x16, &[bits]);
            b.create_composite_extract(pair, sub)
        }
        DataType::U32 => {
            let u32_t = b.make_uint_type(32);
            let bits = bitcast(b, u32_t, raw);
            b.create_op(Op::ConvertUToF, f32_t, vec![bits.word()])
        }
        DataType::S32 => {
            let i32_t = b.make_int_type(32);
            let bits = bitcast(b, i32_t, raw);
            b.create_op(Op::ConvertSToF, f32_t, vec![bits.word()])
        }
        DataType::C10 | DataType::U8 | DataType::S8 | DataType::U16 | DataType::S16 => {
            let width = ty.bits();
            let offset = b.make_uint_constant(sub * width);
            let count = b.make_uint_constant(width);

            let converted = if ty.is_signed() {
                let i32_t = b.make_int_type(32);
                let bits = bitcast(b, i32_t, raw);
                let field = b.create_op(
                    Op::BitFieldSExtract,
                    i32_t,
                    vec![bits.word(), offset.word(), count.word()],
                );
                b.create_op(Op::ConvertSToF, f32_t, vec![field.word()])
            } else {
                let u32_t = b.make_uint_type(32);
                let bits = bitcast(b, u32_t, raw);
                let field = b.create_op(
                    Op::BitFieldUExtract,
                    u32_t,
                    vec![bits.word(), offset.word(), count.word()],
                );
                b.create_op(Op::ConvertUToF, f32_t, vec![field.word()])
            };

            if ty == DataType::C10 {
                let scale = b.make_float_constant(1.0 / C10_SCALE);
                b.create_op(Op::FMul, f32_t, vec![converted.word(), scale.word()])
            } else {
                converted
            }
        }
    }
}

/// Unpack every lane held by one raw component into a float vector
pub fn unpack_one(b: &mut SpirVBuilder, raw: Id, ty: DataType) -> Id {
    if ty == DataType::F32 {
        return raw;
    }

    let f32_t = b.make_float_type(32);
    let lanes = ty.lanes_per_component();

    if ty == DataType::F16 {
        let u32_t = b.make_uint_type(32);
        let vec2 = b.make_vector_type(f32_t, 2);
        let bits = bitcast(b, u32_t, raw);
        return b.create_ext_inst(vec2, GlslStd450::UnpackHalf2x16, &[bits]);
    }

    let parts: Vec<Id> = (0..lanes).map(|sub| unpack_lane(b, raw, ty, sub)).collect();
    if parts.len() == 1 {
        return parts[0];
    }
    let vec_t = b.make_vector_type(f32_t, lanes);
    b.create_composite_construct(vec_t, &parts)
}

/// Splat a float constant to `count` lanes
fn splat(b: &mut SpirVBuilder, value: f32, count: u32) -> Id {
    let c = b.make_float_constant(value);
    if count == 1 {
        return c;
    }
    let f32_t = b.make_float_type(32);
    let vec_t = b.make_vector_type(f32_t, count);
    b.create_composite_construct(vec_t, &vec![c; count as usize])
}

/// Round to nearest, clamp to `[min, max]` and convert to a 32-bit integer
/// vector of the same width
pub fn convert_to_int_range(b: &mut SpirVBuilder, value: Id, min: f32, max: f32, signed: bool) -> Id {
    let count = b.num_components(value);
    let f32_t = b.make_float_type(32);
    let float_t = b.make_vector_type(f32_t, count);

    let rounded = b.create_ext_inst(float_t, GlslStd450::Round, &[value]);
    let lo = splat(b, min, count);
    let hi = splat(b, max, count);
    let clamped = b.create_ext_inst(float_t, GlslStd450::FClamp, &[rounded, lo, hi]);

    let (scalar, op) = if signed {
        (b.make_int_type(32), Op::ConvertFToS)
    } else {
        (b.make_uint_type(32), Op::ConvertFToU)
    };
    let int_t = b.make_vector_type(scalar, count);
    b.create_op(op, int_t, vec![clamped.word()])
}

/// Saturating float-to-integer conversion for an integer destination type
pub fn convert_to_int(b: &mut SpirVBuilder, value: Id, ty: DataType) -> Id {
    debug_assert!(ty.is_integer(), "{ty} is not an integer type");
    let (min, max) = ty.int_range().unwrap_or((0.0, 0.0));
    convert_to_int_range(b, value, min, max, ty.is_signed())
}

/// Float to C10 fixed point, as signed integers in the 10-bit range
pub fn convert_to_fixed10(b: &mut SpirVBuilder, value: Id) -> Id {
    let count = b.num_components(value);
    let f32_t = b.make_float_type(32);
    let float_t = b.make_vector_type(f32_t, count);
    let scale = splat(b, C10_SCALE, count);
    let scaled = b.create_op(Op::FMul, float_t, vec![value.word(), scale.word()]);
    convert_to_int_range(b, scaled, -512.0, 511.0, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::interp::{Interpreter, Value};
    use crate::ir::StorageClass;

    fn run_unpack(ty: DataType, raw: u32) -> Value {
        let mut b = SpirVBuilder::new();
        let f32_t = b.make_float_type(32);
        let input = b.add_variable(StorageClass::Input, f32_t);
        b.begin_function();
        let loaded = b.create_load(input);
        let out = unpack_one(&mut b, loaded, ty);
        b.end_function();

        let mut interp = Interpreter::new(&b);
        interp.set_variable(input, Value::F32(vec![f32::from_bits(raw)]));
        interp.run(|_| [0.0; 4]).unwrap();
        interp.value(out).cloned().unwrap()
    }

    #[test]
    fn test_unpack_f16() {
        assert_eq!(run_unpack(DataType::F16, 0x4000_3C00), Value::F32(vec![1.0, 2.0]));
    }

    #[test]
    fn test_unpack_u8_and_s8() {
        assert_eq!(
            run_unpack(DataType::U8, 0xFF80_0102),
            Value::F32(vec![2.0, 1.0, 128.0, 255.0])
        );
        assert_eq!(
            run_unpack(DataType::S8, 0xFF80_0102),
            Value::F32(vec![2.0, 1.0, -128.0, -1.0])
        );
    }

    #[test]
    fn test_unpack_c10() {
        // lanes: 255 (1.0), -255 (-1.0), 0
        let raw = 255 | ((-255i32 as u32 & 0x3FF) << 10);
        match run_unpack(DataType::C10, raw) {
            Value::F32(v) => {
                assert_eq!(v.len(), 3);
                assert!((v[0] - 1.0).abs() < 1e-6);
                assert!((v[1] + 1.0).abs() < 1e-6);
                assert_eq!(v[2], 0.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_convert_to_u8_saturates() {
        let mut b = SpirVBuilder::new();
        let f32_t = b.make_float_type(32);
        let vec4 = b.make_vector_type(f32_t, 4);
        let input = b.add_variable(StorageClass::Input, vec4);
        b.begin_function();
        let loaded = b.create_load(input);
        let out = convert_to_int(&mut b, loaded, DataType::U8);
        b.end_function();

        let mut interp = Interpreter::new(&b);
        interp.set_variable(input, Value::F32(vec![255.6, -1.0, 128.4, 0.49]));
        interp.run(|_| [0.0; 4]).unwrap();
        assert_eq!(interp.value(out), Some(&Value::U32(vec![255, 0, 128, 0])));
    }

    #[test]
    fn test_convert_to_s16_saturates() {
        let mut b = SpirVBuilder::new();
        let f32_t = b.make_float_type(32);
        let vec2 = b.make_vector_type(f32_t, 2);
        let input = b.add_variable(StorageClass::Input, vec2);
        b.begin_function();
        let loaded = b.create_load(input);
        let out = convert_to_int(&mut b, loaded, DataType::S16);
        b.end_function();

        let mut interp = Interpreter::new(&b);
        interp.set_variable(input, Value::F32(vec![-40000.0, 12.5]));
        interp.run(|_| [0.0; 4]).unwrap();
        assert_eq!(interp.value(out), Some(&Value::I32(vec![-32768, 13])));
    }

    #[test]
    fn test_convert_to_32bit_clamps_below_overflow() {
        let (_, s32_max) = DataType::S32.int_range().unwrap();
        let (_, u32_max) = DataType::U32.int_range().unwrap();
        assert_eq!(s32_max.to_bits(), 0x4eff_ffff);
        assert_eq!(u32_max.to_bits(), 0x4f7f_ffff);
        assert!((s32_max as f64) <= i32::MAX as f64);
        assert!((u32_max as f64) <= u32::MAX as f64);

        let mut b = SpirVBuilder::new();
        let f32_t = b.make_float_type(32);
        let vec2 = b.make_vector_type(f32_t, 2);
        let input = b.add_variable(StorageClass::Input, vec2);
        b.begin_function();
        let loaded = b.create_load(input);
        let signed = convert_to_int(&mut b, loaded, DataType::S32);
        let unsigned = convert_to_int(&mut b, loaded, DataType::U32);
        b.end_function();

        let mut interp = Interpreter::new(&b);
        interp.set_variable(input, Value::F32(vec![3.0e9, -3.0e9]));
        interp.run(|_| [0.0; 4]).unwrap();
        assert_eq!(
            interp.value(signed),
            Some(&Value::I32(vec![2_147_483_520, i32::MIN]))
        );
        assert_eq!(interp.value(unsigned), Some(&Value::U32(vec![3_000_000_000, 0])));
    }
}
