//! SMP translation
//!
//! [`TranslationContext`] owns everything one shader translation mutates:
//! the module builder, the register file and the sampler table. Nothing is
//! shared between contexts, so independent shaders translate in parallel
//! through [`ShaderTranslator`].

use crate::decode::{decode_src0, decode_src12, SmpInstruction, SmpLodMode};
use crate::disasm;
use crate::ir::builder::{CAP_SHADER, EXEC_MODEL_FRAGMENT, EXEC_MODE_ORIGIN_UPPER_LEFT};
use crate::ir::{decoration, Id, SpirVBuilder, StorageClass};
use crate::regs::{RegisterFile, ALTERNATE_WINDOW};
use crate::sampler::{SamplerDesc, SamplerTable};
use crate::texture::{Coord, FetchLod, TextureQuery};
use crate::types::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use usse_core::config::TranslatorConfig;
use usse_core::ShaderError;

/// Result of translating one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// IR was emitted
    Emitted,
    /// Nothing was emitted; translation continues with the next instruction
    Skipped(SkipReason),
}

/// Why an instruction was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// LOD replace mode is not supported
    LodReplace,
    /// No sampler is declared at this register index
    MissingSampler(u32),
    /// Raw dimensionality field outside 0..=2
    UnsupportedDimension(u8),
    /// Store-bank mode other than 0, 1 or 3
    UnsupportedStoreMode(u8),
    /// Word is not an SMP instruction
    UnknownInstruction(u64),
}

/// Per-program counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramStats {
    pub emitted: usize,
    pub skipped: usize,
    /// Instructions dropped after a hard failure
    pub failed: usize,
    /// Non-dependent queries replayed
    pub queries: usize,
}

/// Translated SPIR-V module
#[derive(Debug, Clone, Default)]
pub struct SpirVModule {
    pub bytecode: Vec<u32>,
    pub stats: ProgramStats,
    /// One line per SMP instruction reached
    pub disasm: Vec<String>,
}

impl SpirVModule {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.bytecode)
    }
}

/// Per-shader translation state
pub struct TranslationContext {
    pub(crate) builder: SpirVBuilder,
    pub(crate) regs: RegisterFile,
    pub(crate) samplers: SamplerTable,
    inputs: BTreeMap<u32, Id>,
    main: Id,
    abort_on_hard_failure: bool,
    stats: ProgramStats,
    disasm: Vec<String>,
}

impl TranslationContext {
    /// Start a fragment shader module and declare its samplers
    pub fn new(config: &TranslatorConfig, samplers: &[SamplerDesc]) -> Self {
        let mut builder = SpirVBuilder::new();
        builder.add_capability(CAP_SHADER);
        builder.import_glsl();
        builder.set_memory_model();

        let samplers = SamplerTable::declare(&mut builder, samplers);
        let main = builder.begin_function();

        Self {
            builder,
            regs: RegisterFile::new(config.register_slots),
            samplers,
            inputs: BTreeMap::new(),
            main,
            abort_on_hard_failure: config.abort_shader_on_hard_failure,
            stats: ProgramStats::default(),
            disasm: Vec::new(),
        }
    }

    pub fn builder(&self) -> &SpirVBuilder {
        &self.builder
    }

    pub fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn samplers(&self) -> &SamplerTable {
        &self.samplers
    }

    pub fn stats(&self) -> ProgramStats {
        self.stats
    }

    pub fn disasm(&self) -> &[String] {
        &self.disasm
    }

    /// `vec4` input variable at `location`, declared once
    pub fn declare_input(&mut self, location: u32) -> Id {
        if let Some(var) = self.inputs.get(&location) {
            return *var;
        }
        let b = &mut self.builder;
        let f32_t = b.make_float_type(32);
        let vec4 = b.make_vector_type(f32_t, 4);
        let var = b.add_variable(StorageClass::Input, vec4);
        b.decorate(var, decoration::LOCATION, location);
        self.inputs.insert(location, var);
        var
    }

    fn operand_load_error(op: &Operand) -> ShaderError {
        tracing::error!("Failed to load operand {}{}", op.bank, op.num);
        ShaderError::OperandLoad {
            bank: op.bank.to_string(),
            index: op.num,
        }
    }

    /// Translate one SMP instruction.
    ///
    /// Unsupported modes and missing samplers are soft skips. A coordinate
    /// or LOD operand that cannot be loaded is a hard failure.
    pub fn smp(&mut self, inst: &SmpInstruction) -> Result<Outcome, ShaderError> {
        let lod_mode = inst.lod();
        if lod_mode == SmpLodMode::Replace {
            tracing::error!("Sampler LOD replace not implemented");
            return Ok(Outcome::Skipped(SkipReason::LodReplace));
        }

        let mut src0 = decode_src0(inst.src0_n, inst.src0_bank, inst.src0_ext, true);
        src0.ty = DataType::from_src_type(inst.src0_type);
        let src1 = decode_src12(inst.src1_n, inst.src1_bank, inst.src1_ext, true);

        let Some(sampler) = self.samplers.get(src1.num).copied() else {
            tracing::error!("Can't get sampler {} (sampler doesn't exist)", src1.num);
            return Ok(Outcome::Skipped(SkipReason::MissingSampler(src1.num)));
        };

        let dest_bank = if inst.dest_use_pa {
            RegisterBank::PrimAttr
        } else {
            RegisterBank::Temp
        };
        let dest_type = DestFormat::from_fconv(inst.fconv_type).resolve(sampler.component_type);
        let dest = Operand::new(dest_bank, inst.dest_n as u32, dest_type);

        let mut dim = inst.dim + 1;
        // Unknown dimensionality addresses two lanes
        let coord_mask = match dim {
            1 | 3 => ChannelMask::first(dim),
            _ => ChannelMask::first(2),
        };

        // Operand failures outrank the soft skips below, which emit nothing
        if !self.regs.can_load(&src0, coord_mask) {
            return Err(Self::operand_load_error(&src0));
        }
        if inst.dim > 2 {
            tracing::warn!("Unsupported SMP dimensionality {}", inst.dim);
            return Ok(Outcome::Skipped(SkipReason::UnsupportedDimension(inst.dim)));
        }

        let src2 = (lod_mode != SmpLodMode::None).then(|| {
            let mut op = decode_src12(inst.src2_n, inst.src2_bank, inst.src2_ext, true);
            op.ty = src0.ty;
            op
        });
        let src2_mask = match lod_mode {
            SmpLodMode::Bias => ChannelMask::X,
            _ if dim == 3 => ChannelMask::first(3),
            _ => ChannelMask::first(4),
        };
        if let Some(src2) = &src2 {
            if !self.regs.can_load(src2, src2_mask) {
                return Err(Self::operand_load_error(src2));
            }
        }

        // Mode 3 has no behaviour of its own yet and stores like 0/1
        if !matches!(inst.sb_mode, 0 | 1 | 3) {
            tracing::error!("Unsupported sb_mode: {}", inst.sb_mode);
            return Ok(Outcome::Skipped(SkipReason::UnsupportedStoreMode(inst.sb_mode)));
        }

        let dest_mask = ChannelMask::first(sampler.component_count);
        let line = disasm::smp_to_str(
            inst.predicate(),
            dim,
            &dest,
            dest_mask,
            &src0,
            coord_mask,
            &src1,
            src2.as_ref().map(|op| (op, src2_mask)),
        );
        tracing::trace!("{}", line);
        self.disasm.push(line);

        let mut coord = self
            .regs
            .load(&mut self.builder, &src0, coord_mask)
            .ok_or_else(|| Self::operand_load_error(&src0))?;

        // No 1D images downstream: sample row 0 of a 2D image
        if dim == 1 {
            let b = &mut self.builder;
            let f32_t = b.make_float_type(32);
            let vec2 = b.make_vector_type(f32_t, 2);
            let zero = b.make_float_constant(0.0);
            coord = b.create_composite_construct(vec2, &[coord, zero]);
            dim = 2;
        }

        let lod = match (lod_mode, src2) {
            (SmpLodMode::Bias, Some(src2)) => {
                let lod = self
                    .regs
                    .load(&mut self.builder, &src2, ChannelMask::X)
                    .ok_or_else(|| Self::operand_load_error(&src2))?;
                FetchLod::Bias(lod)
            }
            (SmpLodMode::Gradient, Some(src2)) => {
                let (dpdx, dpdy) = if dim == 2 {
                    (
                        self.regs.load(&mut self.builder, &src2, ChannelMask::X | ChannelMask::Y),
                        self.regs.load(&mut self.builder, &src2, ChannelMask::Z | ChannelMask::W),
                    )
                } else {
                    // dPdy comes from the alternate window of the same operand
                    (
                        self.regs.load(&mut self.builder, &src2, ChannelMask::first(3)),
                        self.regs.load_window(
                            &mut self.builder,
                            &src2,
                            ChannelMask::first(3),
                            ALTERNATE_WINDOW,
                        ),
                    )
                };
                match (dpdx, dpdy) {
                    (Some(dpdx), Some(dpdy)) => FetchLod::Gradient { dpdx, dpdy },
                    _ => return Err(Self::operand_load_error(&src2)),
                }
            }
            _ => FetchLod::Implicit,
        };

        let result = self.fetch_texture(sampler.id, Coord::float(coord), DataType::F32, lod);
        self.regs.store(&mut self.builder, &dest, result, dest_mask);

        Ok(Outcome::Emitted)
    }

    /// Build the batch entry for a query description
    pub fn resolve_query(&mut self, desc: &QueryDesc) -> TextureQuery {
        let coord = self.declare_input(desc.coord_location);
        let (component_type, component_count) = self
            .samplers
            .get(desc.sampler)
            .map(|s| (s.component_type, s.component_count))
            .unwrap_or((DataType::F32, 4));

        TextureQuery {
            sampler: desc.sampler,
            coord: Coord::new(coord, desc.coord_type),
            store_type: desc.store_type,
            component_type,
            dest_offset: desc.dest_offset,
            component_count,
            proj_pos: desc.proj_pos,
        }
    }

    /// Translate a stream of instruction words in order.
    ///
    /// Hard failures drop the failing instruction unless the context was
    /// configured to abort, in which case the first one is returned.
    pub fn translate_program(&mut self, words: &[u64]) -> Result<ProgramStats, ShaderError> {
        for (pc, word) in words.iter().enumerate() {
            let outcome = match SmpInstruction::decode(*word) {
                Some(inst) => self.smp(&inst),
                None => {
                    tracing::warn!("Unknown instruction {:#018x} at {}", word, pc);
                    Ok(Outcome::Skipped(SkipReason::UnknownInstruction(*word)))
                }
            };

            match outcome {
                Ok(Outcome::Emitted) => self.stats.emitted += 1,
                Ok(Outcome::Skipped(reason)) => {
                    tracing::debug!("Instruction {} skipped: {:?}", pc, reason);
                    self.stats.skipped += 1;
                }
                Err(err) => {
                    if self.abort_on_hard_failure {
                        return Err(ShaderError::InstructionFailed {
                            pc,
                            source: Box::new(err),
                        });
                    }
                    tracing::error!("Instruction {} dropped: {}", pc, err);
                    self.stats.failed += 1;
                }
            }
        }

        Ok(self.stats)
    }

    /// Close the entry point and serialise the module
    pub fn finish(mut self) -> SpirVModule {
        self.builder.end_function();
        let interface: Vec<Id> = self.inputs.values().copied().collect();
        self.builder
            .add_entry_point(EXEC_MODEL_FRAGMENT, self.main, "main", &interface);
        self.builder
            .add_execution_mode(self.main, EXEC_MODE_ORIGIN_UPPER_LEFT);

        SpirVModule {
            bytecode: self.builder.build(),
            stats: self.stats,
            disasm: self.disasm,
        }
    }
}

fn default_coord_type() -> DataType {
    DataType::F32
}

/// Non-dependent query as described by program metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryDesc {
    pub sampler: u32,
    /// Input location holding the coordinate
    pub coord_location: u32,
    #[serde(default = "default_coord_type")]
    pub coord_type: DataType,
    #[serde(default)]
    pub store_type: Option<DataType>,
    pub dest_offset: u32,
    #[serde(default)]
    pub proj_pos: Option<u8>,
}

/// A shader to translate
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderProgram {
    pub instructions: Vec<u64>,
    pub samplers: Vec<SamplerDesc>,
    pub queries: Vec<QueryDesc>,
}

/// Translates whole programs, each in its own context
pub struct ShaderTranslator {
    config: TranslatorConfig,
    cache: Mutex<HashMap<u64, SpirVModule>>,
}

impl ShaderTranslator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Compute hash for a program
    fn hash_program(program: &ShaderProgram) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        program.hash(&mut hasher);
        hasher.finish()
    }

    fn validate(program: &ShaderProgram) -> Result<(), ShaderError> {
        for desc in &program.samplers {
            if !(1..=3).contains(&desc.dim) {
                return Err(ShaderError::InvalidProgram(format!(
                    "sampler {} has dimensionality {}",
                    desc.index, desc.dim
                )));
            }
            if !(1..=4).contains(&desc.component_count) {
                return Err(ShaderError::InvalidProgram(format!(
                    "sampler {} has {} components",
                    desc.index, desc.component_count
                )));
            }
        }
        for (i, query) in program.queries.iter().enumerate() {
            if let Some(pos) = query.proj_pos.filter(|pos| *pos > 3) {
                return Err(ShaderError::InvalidProgram(format!(
                    "query {i} projects from lane {pos}"
                )));
            }
        }
        Ok(())
    }

    /// Translate a program: queries first, then the instruction stream
    pub fn translate(&self, program: &ShaderProgram) -> Result<SpirVModule, ShaderError> {
        Self::validate(program)?;
        let hash = Self::hash_program(program);

        if self.config.shader_cache {
            if let Some(module) = self.cache.lock().get(&hash) {
                tracing::debug!("Shader {:016x} served from cache", hash);
                return Ok(module.clone());
            }
        }

        let mut ctx = TranslationContext::new(&self.config, &program.samplers);

        let queries: Vec<TextureQuery> = program
            .queries
            .iter()
            .map(|desc| ctx.resolve_query(desc))
            .collect();
        ctx.stats.queries = ctx.texture_queries(&queries);

        let stats = ctx.translate_program(&program.instructions)?;
        tracing::debug!(
            "Shader {:016x}: {} emitted, {} skipped, {} failed, {} queries",
            hash,
            stats.emitted,
            stats.skipped,
            stats.failed,
            stats.queries
        );

        let module = ctx.finish();
        if self.config.shader_cache {
            self.cache.lock().insert(hash, module.clone());
        }
        Ok(module)
    }

    /// Number of cached modules
    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

impl Default for ShaderTranslator {
    fn default() -> Self {
        Self::new(TranslatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::SPIRV_MAGIC;
    use crate::ir::interp::{Interpreter, Value};
    use crate::ir::Op;
    use crate::regs::PRIMARY_WINDOW;

    /// Sampler at index 6: SMP src1 = sa3 (double-register addressed)
    fn sampler(component_type: DataType, component_count: u8) -> SamplerDesc {
        SamplerDesc {
            index: 6,
            component_count,
            component_type,
            dim: 2,
        }
    }

    /// 2D SMP reading pa0 with the sampler at index 6, writing r0
    fn smp_2d() -> SmpInstruction {
        SmpInstruction {
            dim: 1,
            src0_bank: 1,
            src0_n: 0,
            src1_bank: 3,
            src1_n: 3,
            ..Default::default()
        }
    }

    fn sample_count(ctx: &TranslationContext) -> usize {
        ctx.builder()
            .function_body()
            .iter()
            .filter(|inst| inst.op.is_image_sample())
            .count()
    }

    #[test]
    fn test_lod_replace_is_soft_skip() {
        let mut ctx = TranslationContext::new(&TranslatorConfig::default(), &[sampler(DataType::F32, 4)]);
        let inst = SmpInstruction {
            lod_mode: 1,
            ..smp_2d()
        };
        assert_eq!(ctx.smp(&inst), Ok(Outcome::Skipped(SkipReason::LodReplace)));
        assert_eq!(sample_count(&ctx), 0);
    }

    #[test]
    fn test_unsupported_store_mode_emits_nothing() {
        let mut ctx = TranslationContext::new(&TranslatorConfig::default(), &[sampler(DataType::F32, 4)]);
        let inst = SmpInstruction {
            sb_mode: 2,
            ..smp_2d()
        };
        assert_eq!(
            ctx.smp(&inst),
            Ok(Outcome::Skipped(SkipReason::UnsupportedStoreMode(2)))
        );
        assert_eq!(sample_count(&ctx), 0);
    }

    #[test]
    fn test_unloadable_operand_outranks_store_mode_skip() {
        let config = TranslatorConfig {
            register_slots: 2,
            ..Default::default()
        };
        let mut ctx = TranslationContext::new(&config, &[sampler(DataType::F32, 4)]);

        let bad_coord = SmpInstruction {
            sb_mode: 2,
            src0_n: 10,
            ..smp_2d()
        };
        assert_eq!(
            ctx.smp(&bad_coord),
            Err(ShaderError::OperandLoad {
                bank: "pa".to_string(),
                index: 20,
            })
        );

        let bad_lod = SmpInstruction {
            sb_mode: 2,
            lod_mode: 2,
            src2_n: 9,
            ..smp_2d()
        };
        assert_eq!(
            ctx.smp(&bad_lod),
            Err(ShaderError::OperandLoad {
                bank: "r".to_string(),
                index: 18,
            })
        );

        let bad_dim = SmpInstruction {
            dim: 3,
            src0_n: 10,
            ..smp_2d()
        };
        assert!(ctx.smp(&bad_dim).is_err());
        assert_eq!(sample_count(&ctx), 0);
        assert!(ctx.builder().function_body().len() <= 2);
    }

    #[test]
    fn test_store_mode_three_stores() {
        let mut ctx = TranslationContext::new(&TranslatorConfig::default(), &[sampler(DataType::F32, 4)]);
        let inst = SmpInstruction {
            sb_mode: 3,
            ..smp_2d()
        };
        assert_eq!(ctx.smp(&inst), Ok(Outcome::Emitted));
        assert!(ctx
            .regs()
            .slot_variable(RegisterBank::Temp, PRIMARY_WINDOW, 0)
            .is_some());
    }

    #[test]
    fn test_dest_mask_follows_component_count() {
        let mut ctx = TranslationContext::new(&TranslatorConfig::default(), &[sampler(DataType::F32, 2)]);
        let inst = SmpInstruction {
            dest_use_pa: true,
            dest_n: 4,
            ..smp_2d()
        };
        assert_eq!(ctx.smp(&inst), Ok(Outcome::Emitted));

        let mut interp = Interpreter::new(ctx.builder());
        interp.run(|_| [1.0, 2.0, 3.0, 4.0]).unwrap();
        let slot = ctx
            .regs()
            .slot_variable(RegisterBank::PrimAttr, PRIMARY_WINDOW, 1)
            .unwrap();
        assert_eq!(
            interp.variable(slot),
            Some(&Value::F32(vec![1.0, 2.0, 0.0, 0.0]))
        );
    }

    #[test]
    fn test_bias_uses_src2_lane_zero() {
        let mut ctx = TranslationContext::new(&TranslatorConfig::default(), &[sampler(DataType::F32, 4)]);
        let inst = SmpInstruction {
            lod_mode: 2,
            src2_bank: 0,
            src2_n: 4,
            ..smp_2d()
        };
        assert_eq!(ctx.smp(&inst), Ok(Outcome::Emitted));

        let lod_slot = ctx
            .regs()
            .slot_variable(RegisterBank::Temp, PRIMARY_WINDOW, 2)
            .unwrap();
        let mut interp = Interpreter::new(ctx.builder());
        interp.set_variable(lod_slot, Value::F32(vec![3.5, 9.0, 9.0, 9.0]));
        interp.run(|_| [0.0; 4]).unwrap();

        let call = &interp.samples()[0];
        assert_eq!(call.op, Op::ImageSampleExplicitLod);
        assert_eq!(call.lod, Some(3.5));
    }

    #[test]
    fn test_unknown_word_is_skipped() {
        let mut ctx = TranslationContext::new(&TranslatorConfig::default(), &[sampler(DataType::F32, 4)]);
        let stats = ctx.translate_program(&[0, smp_2d().encode()]).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.emitted, 1);
    }

    #[test]
    fn test_disasm_line_recorded() {
        let mut ctx = TranslationContext::new(&TranslatorConfig::default(), &[sampler(DataType::F32, 4)]);
        ctx.smp(&smp_2d()).unwrap();
        assert_eq!(ctx.disasm(), ["SMP2d.f32.f32 r0.xyzw pa0.xy sa6"]);
    }

    #[test]
    fn test_finish_produces_module() {
        let ctx = TranslationContext::new(&TranslatorConfig::default(), &[sampler(DataType::F32, 4)]);
        let module = ctx.finish();
        assert_eq!(module.bytecode[0], SPIRV_MAGIC);
        assert_eq!(module.as_bytes().len(), module.bytecode.len() * 4);
    }

    #[test]
    fn test_translator_cache() {
        let translator = ShaderTranslator::default();
        let program = ShaderProgram {
            instructions: vec![smp_2d().encode()],
            samplers: vec![sampler(DataType::U8, 4)],
            queries: Vec::new(),
        };

        let first = translator.translate(&program).unwrap();
        let second = translator.translate(&program).unwrap();
        assert_eq!(first.bytecode, second.bytecode);
        assert_eq!(translator.cached_count(), 1);

        translator.clear_cache();
        assert_eq!(translator.cached_count(), 0);
    }

    #[test]
    fn test_invalid_sampler_rejected() {
        let translator = ShaderTranslator::default();
        let program = ShaderProgram {
            samplers: vec![SamplerDesc {
                dim: 0,
                ..sampler(DataType::F32, 4)
            }],
            ..Default::default()
        };
        assert!(matches!(
            translator.translate(&program),
            Err(ShaderError::InvalidProgram(_))
        ));
    }

    #[test]
    fn test_projection_lane_out_of_range_rejected() {
        let translator = ShaderTranslator::default();
        let query = QueryDesc {
            sampler: 6,
            coord_location: 0,
            coord_type: DataType::F32,
            store_type: None,
            dest_offset: 0,
            proj_pos: Some(9),
        };
        let mut program = ShaderProgram {
            samplers: vec![sampler(DataType::F32, 4)],
            queries: vec![query],
            ..Default::default()
        };
        assert!(matches!(
            translator.translate(&program),
            Err(ShaderError::InvalidProgram(_))
        ));

        program.queries[0].proj_pos = Some(3);
        assert!(translator.translate(&program).is_ok());
    }
}
