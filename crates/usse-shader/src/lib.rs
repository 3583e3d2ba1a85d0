//! USSE texture sampling translation for usse-spirv
//!
//! Lifts the SMP instruction family of the USSE shader ISA into a SPIR-V
//! module, together with the batch of non-dependent texture queries that is
//! replayed ahead of the instruction stream.

pub mod convert;
pub mod decode;
pub mod disasm;
pub mod ir;
pub mod regs;
pub mod sampler;
pub mod texture;
pub mod translator;
pub mod types;

pub use decode::SmpInstruction;
pub use sampler::{SamplerDesc, SamplerInfo, SamplerTable};
pub use texture::{Coord, FetchLod, TextureQuery};
pub use translator::{
    Outcome, ProgramStats, QueryDesc, ShaderProgram, ShaderTranslator, SkipReason, SpirVModule,
    TranslationContext,
};
