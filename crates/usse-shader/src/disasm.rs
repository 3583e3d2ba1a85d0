//! SMP disassembly strings for trace output

use crate::decode::ExtPredicate;
use crate::types::*;

/// Operand as `<bank><index>.<swizzle>`; an empty mask prints no swizzle
pub fn operand_to_str(op: &Operand, mask: ChannelMask) -> String {
    if op.bank == RegisterBank::Immediate {
        return format!("#{}", op.num);
    }

    let mut s = format!("{}{}", op.bank.prefix(), op.num);
    if !mask.is_empty() {
        s.push('.');
        for lane in mask.lanes() {
            s.push(op.swizzle.0[lane as usize].as_char());
        }
    }
    s
}

/// One SMP line: `SMP2d.f32.f16 pa0.xyzw r2.xy pa6 [r4.x]`
#[allow(clippy::too_many_arguments)]
pub fn smp_to_str(
    pred: ExtPredicate,
    dim: u8,
    dest: &Operand,
    dest_mask: ChannelMask,
    src0: &Operand,
    coord_mask: ChannelMask,
    sampler: &Operand,
    src2: Option<(&Operand, ChannelMask)>,
) -> String {
    let mut line = format!(
        "{}SMP{}d.{}.{} {} {} {}",
        pred,
        dim,
        dest.ty,
        src0.ty,
        operand_to_str(dest, dest_mask),
        operand_to_str(src0, coord_mask),
        operand_to_str(sampler, ChannelMask::empty()),
    );
    if let Some((op, mask)) = src2 {
        line.push(' ');
        line.push_str(&operand_to_str(op, mask));
    }
    line
}
