//! SPIR-V intermediate representation
//!
//! A typed instruction list with SPIR-V opcode numbering. Modules are built
//! through [`SpirVBuilder`] and serialised to SPIR-V words with
//! [`SpirVBuilder::build`].

pub mod builder;
pub mod interp;

pub use builder::*;

use std::fmt;

/// SPIR-V result id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub u32);

impl Id {
    pub fn word(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// SPIR-V opcodes used by the translator
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ExtInstImport = 11,
    ExtInst = 12,
    MemoryModel = 14,
    EntryPoint = 15,
    ExecutionMode = 16,
    Capability = 17,
    TypeVoid = 19,
    TypeBool = 20,
    TypeInt = 21,
    TypeFloat = 22,
    TypeVector = 23,
    TypeImage = 25,
    TypeSampledImage = 27,
    TypePointer = 32,
    TypeFunction = 33,
    Constant = 43,
    Function = 54,
    FunctionEnd = 56,
    Variable = 59,
    Load = 61,
    Store = 62,
    Decorate = 71,
    VectorExtractDynamic = 77,
    VectorShuffle = 79,
    CompositeConstruct = 80,
    CompositeExtract = 81,
    CompositeInsert = 82,
    ImageSampleImplicitLod = 87,
    ImageSampleExplicitLod = 88,
    ImageSampleProjImplicitLod = 91,
    ConvertFToU = 109,
    ConvertFToS = 110,
    ConvertSToF = 111,
    ConvertUToF = 112,
    Bitcast = 124,
    FMul = 133,
    BitFieldInsert = 201,
    BitFieldSExtract = 202,
    BitFieldUExtract = 203,
    Label = 248,
    Return = 253,
}

impl Op {
    pub fn is_image_sample(self) -> bool {
        matches!(
            self,
            Op::ImageSampleImplicitLod | Op::ImageSampleExplicitLod | Op::ImageSampleProjImplicitLod
        )
    }
}

/// GLSL.std.450 extended instructions
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlslStd450 {
    Round = 1,
    FClamp = 43,
    PackHalf2x16 = 58,
    UnpackHalf2x16 = 62,
}

impl GlslStd450 {
    pub fn from_word(word: u32) -> Option<Self> {
        match word {
            1 => Some(Self::Round),
            43 => Some(Self::FClamp),
            58 => Some(Self::PackHalf2x16),
            62 => Some(Self::UnpackHalf2x16),
            _ => None,
        }
    }
}

/// Image operand mask bits
pub mod image_operands {
    pub const LOD: u32 = 0x2;
    pub const GRAD: u32 = 0x4;
}

/// Decoration values
pub mod decoration {
    pub const LOCATION: u32 = 30;
    pub const BINDING: u32 = 33;
    pub const DESCRIPTOR_SET: u32 = 34;
}

/// Storage class
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    UniformConstant = 0,
    Input = 1,
    Output = 3,
    Private = 6,
    Function = 7,
}

/// Image dimensionality
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Dim1D = 0,
    Dim2D = 1,
    Dim3D = 2,
}

/// Type declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Id, count: u32 },
    Pointer { storage: StorageClass, pointee: Id },
    Image { sampled: Id, dim: Dim },
    SampledImage { image: Id },
    Function { ret: Id },
}

/// One SPIR-V instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub result_type: Option<Id>,
    pub result: Option<Id>,
    /// Remaining operand words (ids and literals)
    pub operands: Vec<u32>,
}

impl Instruction {
    pub fn new(op: Op, result_type: Option<Id>, result: Option<Id>, operands: Vec<u32>) -> Self {
        Self {
            op,
            result_type,
            result,
            operands,
        }
    }

    pub fn word_count(&self) -> usize {
        1 + self.result_type.is_some() as usize + self.result.is_some() as usize + self.operands.len()
    }

    /// Operand word `i` interpreted as an id
    pub fn id_operand(&self, i: usize) -> Option<Id> {
        self.operands.get(i).map(|w| Id(*w))
    }

    /// Append the binary encoding to `out`
    pub fn encode(&self, out: &mut Vec<u32>) {
        out.push(((self.word_count() as u32) << 16) | self.op as u32);
        if let Some(ty) = self.result_type {
            out.push(ty.word());
        }
        if let Some(id) = self.result {
            out.push(id.word());
        }
        out.extend_from_slice(&self.operands);
    }
}

/// Encode a literal string as nul-terminated little-endian words
pub fn encode_string(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
