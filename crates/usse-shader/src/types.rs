//! USSE operand model
//!
//! Register banks, numeric encodings, swizzles and channel masks shared by
//! the decoder, the register file and the sampling translator.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Per-lane channel mask (bit 0 = X)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelMask: u8 {
        const X = 0x01;
        const Y = 0x02;
        const Z = 0x04;
        const W = 0x08;
    }
}

impl ChannelMask {
    /// Mask with the first `count` lanes set, starting at bit 0
    pub fn first(count: u8) -> Self {
        Self::from_bits_truncate(((1u16 << count.min(4)) - 1) as u8)
    }

    /// Number of set lanes
    pub fn count(self) -> u32 {
        self.bits().count_ones()
    }

    /// Indices of the set lanes in ascending order
    pub fn lanes(self) -> impl Iterator<Item = u32> {
        (0..4u32).filter(move |i| self.bits() & (1 << i) != 0)
    }
}

//=============================================================================
// NUMERIC ENCODINGS
//=============================================================================

/// Numeric encoding of a register operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    F32,
    F16,
    /// 10-bit signed fixed point, 8 fractional bits
    C10,
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
}

impl DataType {
    /// Coordinate/source type from the 2-bit SMP selector
    pub fn from_src_type(sel: u8) -> Self {
        match sel & 0x3 {
            0 => DataType::F32,
            1 => DataType::F16,
            _ => DataType::C10,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F16)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::U8
                | DataType::S8
                | DataType::U16
                | DataType::S16
                | DataType::U32
                | DataType::S32
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::C10 | DataType::S8 | DataType::S16 | DataType::S32
        )
    }

    /// Width of one lane in bits
    pub fn bits(self) -> u32 {
        match self {
            DataType::F32 | DataType::U32 | DataType::S32 => 32,
            DataType::F16 | DataType::U16 | DataType::S16 => 16,
            DataType::C10 => 10,
            DataType::U8 | DataType::S8 => 8,
        }
    }

    /// How many lanes share one 32-bit register component
    pub fn lanes_per_component(self) -> u32 {
        32 / self.bits()
    }

    /// Representable range of an integer destination, as floats for clamping.
    ///
    /// 32-bit upper bounds are the largest f32 below the integer maximum;
    /// the maximum itself rounds up out of range.
    pub fn int_range(self) -> Option<(f32, f32)> {
        match self {
            DataType::U8 => Some((0.0, 255.0)),
            DataType::S8 => Some((-128.0, 127.0)),
            DataType::U16 => Some((0.0, 65535.0)),
            DataType::S16 => Some((-32768.0, 32767.0)),
            DataType::U32 => Some((0.0, 4_294_967_040.0)),
            DataType::S32 => Some((-2_147_483_648.0, 2_147_483_520.0)),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::F32 => "f32",
            DataType::F16 => "f16",
            DataType::C10 => "c10",
            DataType::U8 => "u8",
            DataType::S8 => "i8",
            DataType::U16 => "u16",
            DataType::S16 => "i16",
            DataType::U32 => "u32",
            DataType::S32 => "i32",
        };
        f.write_str(name)
    }
}

/// Destination format selected by the SMP `fconv_type` field.
///
/// Selector 1 carries no type of its own: the sampler's declared component
/// type has to be substituted through [`DestFormat::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestFormat {
    Fixed(DataType),
    FromSampler,
}

impl DestFormat {
    pub fn from_fconv(sel: u8) -> Self {
        match sel & 0x3 {
            0 => DestFormat::Fixed(DataType::F32),
            1 => DestFormat::FromSampler,
            2 => DestFormat::Fixed(DataType::F16),
            _ => DestFormat::Fixed(DataType::F32),
        }
    }

    pub fn resolve(self, sampler_type: DataType) -> DataType {
        match self {
            DestFormat::Fixed(ty) => ty,
            DestFormat::FromSampler => sampler_type,
        }
    }
}

//=============================================================================
// REGISTERS
//=============================================================================

/// USSE register bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterBank {
    Temp,
    PrimAttr,
    SecAttr,
    Output,
    FpInternal,
    Special,
    Indexed1,
    Indexed2,
    Immediate,
}

impl RegisterBank {
    /// Banks backed by register storage that `load`/`store` can address
    pub fn is_addressable(self) -> bool {
        matches!(
            self,
            RegisterBank::Temp
                | RegisterBank::PrimAttr
                | RegisterBank::SecAttr
                | RegisterBank::Output
                | RegisterBank::FpInternal
        )
    }

    /// Disassembly prefix
    pub fn prefix(self) -> &'static str {
        match self {
            RegisterBank::Temp => "r",
            RegisterBank::PrimAttr => "pa",
            RegisterBank::SecAttr => "sa",
            RegisterBank::Output => "o",
            RegisterBank::FpInternal => "i",
            RegisterBank::Special => "s",
            RegisterBank::Indexed1 => "idx1.",
            RegisterBank::Indexed2 => "idx2.",
            RegisterBank::Immediate => "#",
        }
    }
}

impl fmt::Display for RegisterBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One slot of a swizzle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwizzleChannel {
    X,
    Y,
    Z,
    W,
    Zero,
    One,
}

impl SwizzleChannel {
    /// Component offset selected by this slot, if it reads the register
    pub fn offset(self) -> Option<u32> {
        match self {
            SwizzleChannel::X => Some(0),
            SwizzleChannel::Y => Some(1),
            SwizzleChannel::Z => Some(2),
            SwizzleChannel::W => Some(3),
            SwizzleChannel::Zero | SwizzleChannel::One => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            SwizzleChannel::X => 'x',
            SwizzleChannel::Y => 'y',
            SwizzleChannel::Z => 'z',
            SwizzleChannel::W => 'w',
            SwizzleChannel::Zero => '0',
            SwizzleChannel::One => '1',
        }
    }
}

/// Four-slot channel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swizzle4(pub [SwizzleChannel; 4]);

impl Swizzle4 {
    pub const DEFAULT: Swizzle4 = Swizzle4([
        SwizzleChannel::X,
        SwizzleChannel::Y,
        SwizzleChannel::Z,
        SwizzleChannel::W,
    ]);
}

impl Default for Swizzle4 {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Decoded register operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    pub bank: RegisterBank,
    /// Index of the first 32-bit component
    pub num: u32,
    pub ty: DataType,
    pub swizzle: Swizzle4,
    /// Extended (bank_ext) addressing was used
    pub ext: bool,
}

impl Operand {
    pub fn new(bank: RegisterBank, num: u32, ty: DataType) -> Self {
        Self {
            bank,
            num,
            ty,
            swizzle: Swizzle4::DEFAULT,
            ext: false,
        }
    }
}

impl Default for Operand {
    fn default() -> Self {
        Self::new(RegisterBank::Temp, 0, DataType::F32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_mask_first() {
        assert_eq!(ChannelMask::first(1), ChannelMask::X);
        assert_eq!(ChannelMask::first(2), ChannelMask::X | ChannelMask::Y);
        assert_eq!(ChannelMask::first(4), ChannelMask::all());
        assert_eq!(ChannelMask::first(0), ChannelMask::empty());
        let lanes: Vec<u32> = (ChannelMask::Z | ChannelMask::W).lanes().collect();
        assert_eq!(lanes, vec![2, 3]);
    }

    #[test]
    fn test_dest_format_selector() {
        assert_eq!(DestFormat::from_fconv(0), DestFormat::Fixed(DataType::F32));
        assert_eq!(DestFormat::from_fconv(1), DestFormat::FromSampler);
        assert_eq!(DestFormat::from_fconv(2), DestFormat::Fixed(DataType::F16));
        assert_eq!(DestFormat::from_fconv(3), DestFormat::Fixed(DataType::F32));
        assert_eq!(DestFormat::FromSampler.resolve(DataType::U8), DataType::U8);
        assert_eq!(
            DestFormat::Fixed(DataType::F16).resolve(DataType::U8),
            DataType::F16
        );
    }

    #[test]
    fn test_data_type_packing() {
        assert_eq!(DataType::F16.lanes_per_component(), 2);
        assert_eq!(DataType::C10.lanes_per_component(), 3);
        assert_eq!(DataType::U8.lanes_per_component(), 4);
        assert!(DataType::S16.is_integer());
        assert!(!DataType::C10.is_integer());
        assert_eq!(DataType::from_src_type(2), DataType::C10);
    }
}
