//! End-to-end SMP translation tests

use usse_core::config::TranslatorConfig;
use usse_core::ShaderError;
use usse_shader::ir::interp::{Interpreter, Value};
use usse_shader::ir::Op;
use usse_shader::regs::{ALTERNATE_WINDOW, PRIMARY_WINDOW};
use usse_shader::types::{DataType, RegisterBank};
use usse_shader::{Outcome, SamplerDesc, SkipReason, SmpInstruction, TranslationContext};

const SAMPLER_INDEX: u32 = 6;

fn sampler(index: u32, component_type: DataType) -> SamplerDesc {
    SamplerDesc {
        index,
        component_count: 4,
        component_type,
        dim: 2,
    }
}

fn context(samplers: &[SamplerDesc]) -> TranslationContext {
    TranslationContext::new(&TranslatorConfig::default(), samplers)
}

/// SMP with coordinate in pa0, sampler sa3 (index 6), result in r0
fn smp(dim: u8) -> SmpInstruction {
    SmpInstruction {
        dim,
        src0_bank: 1,
        src1_bank: 3,
        src1_n: 3,
        ..Default::default()
    }
}

fn image_samples(ctx: &TranslationContext) -> Vec<Op> {
    ctx.builder()
        .function_body()
        .iter()
        .filter(|inst| inst.op.is_image_sample())
        .map(|inst| inst.op)
        .collect()
}

#[test]
fn test_every_lod_mode() {
    for lod_mode in 0..4u8 {
        let mut ctx = context(&[sampler(SAMPLER_INDEX, DataType::F32)]);
        let inst = SmpInstruction {
            lod_mode,
            src2_n: 4,
            ..smp(1)
        };
        let outcome = ctx.smp(&inst).unwrap();

        match lod_mode {
            1 => {
                assert_eq!(outcome, Outcome::Skipped(SkipReason::LodReplace));
                assert!(image_samples(&ctx).is_empty());
            }
            0 => assert_eq!(image_samples(&ctx), vec![Op::ImageSampleImplicitLod]),
            _ => assert_eq!(image_samples(&ctx), vec![Op::ImageSampleExplicitLod]),
        }
    }
}

#[test]
fn test_dimensionality_sets_coordinate_lanes() {
    let expected: [&[f32]; 3] = [&[0.25, 0.0], &[0.25, 0.5], &[0.25, 0.5, 0.75]];

    for (raw_dim, coord) in expected.iter().enumerate() {
        let mut ctx = context(&[sampler(SAMPLER_INDEX, DataType::F32)]);
        assert_eq!(ctx.smp(&smp(raw_dim as u8)), Ok(Outcome::Emitted));

        let pa0 = ctx
            .regs()
            .slot_variable(RegisterBank::PrimAttr, PRIMARY_WINDOW, 0)
            .unwrap();
        let mut interp = Interpreter::new(ctx.builder());
        interp.set_variable(pa0, Value::F32(vec![0.25, 0.5, 0.75, 1.0]));
        interp.run(|_| [0.0; 4]).unwrap();

        assert_eq!(interp.samples().len(), 1);
        assert_eq!(interp.samples()[0].coord.as_slice(), *coord);
    }
}

#[test]
fn test_raw_dim_three_is_skipped() {
    let mut ctx = context(&[sampler(SAMPLER_INDEX, DataType::F32)]);
    assert_eq!(
        ctx.smp(&smp(3)),
        Ok(Outcome::Skipped(SkipReason::UnsupportedDimension(3)))
    );
    assert!(image_samples(&ctx).is_empty());
}

#[test]
fn test_f16_coordinate() {
    let mut ctx = context(&[sampler(SAMPLER_INDEX, DataType::F32)]);
    let inst = SmpInstruction {
        src0_type: 1,
        ..smp(1)
    };
    ctx.smp(&inst).unwrap();

    let pa0 = ctx
        .regs()
        .slot_variable(RegisterBank::PrimAttr, PRIMARY_WINDOW, 0)
        .unwrap();
    let mut interp = Interpreter::new(ctx.builder());
    interp.set_variable(pa0, Value::U32(vec![0x3800_3C00, 0, 0, 0]));
    interp.run(|_| [0.0; 4]).unwrap();
    assert_eq!(interp.samples()[0].coord, vec![1.0, 0.5]);
}

#[test]
fn test_sampler_type_selector_resolves_per_sampler() {
    let types = [
        DataType::F32,
        DataType::F16,
        DataType::U8,
        DataType::S8,
        DataType::U16,
        DataType::S16,
        DataType::U32,
        DataType::S32,
    ];
    let samplers: Vec<SamplerDesc> = types
        .iter()
        .enumerate()
        .map(|(i, ty)| sampler(i as u32 * 2, *ty))
        .collect();

    let mut ctx = context(&samplers);
    for (i, _) in types.iter().enumerate() {
        let inst = SmpInstruction {
            fconv_type: 1,
            src1_n: i as u8,
            ..smp(1)
        };
        assert_eq!(ctx.smp(&inst), Ok(Outcome::Emitted));
    }

    for (line, ty) in ctx.disasm().iter().zip(types) {
        assert!(
            line.starts_with(&format!("SMP2d.{ty}.")),
            "{line} does not store {ty}"
        );
    }
}

#[test]
fn test_u8_destination_saturates() {
    let mut ctx = context(&[sampler(SAMPLER_INDEX, DataType::U8)]);
    let inst = SmpInstruction {
        fconv_type: 1,
        ..smp(1)
    };
    ctx.smp(&inst).unwrap();

    let mut interp = Interpreter::new(ctx.builder());
    interp.run(|_| [255.6, -1.0, 128.4, 0.49]).unwrap();

    let r0 = ctx
        .regs()
        .slot_variable(RegisterBank::Temp, PRIMARY_WINDOW, 0)
        .unwrap();
    let packed = interp.variable(r0).unwrap().bits()[0];
    assert_eq!(packed.to_le_bytes(), [255, 0, 128, 0]);
}

#[test]
fn test_gradient_2d_splits_src2() {
    let mut ctx = context(&[sampler(SAMPLER_INDEX, DataType::F32)]);
    let inst = SmpInstruction {
        lod_mode: 3,
        src2_n: 4,
        ..smp(1)
    };
    ctx.smp(&inst).unwrap();

    let r8 = ctx
        .regs()
        .slot_variable(RegisterBank::Temp, PRIMARY_WINDOW, 2)
        .unwrap();
    let mut interp = Interpreter::new(ctx.builder());
    interp.set_variable(r8, Value::F32(vec![1.0, 2.0, 3.0, 4.0]));
    interp.run(|_| [0.0; 4]).unwrap();

    let grad = interp.samples()[0].grad.clone().unwrap();
    assert_eq!(grad, (vec![1.0, 2.0], vec![3.0, 4.0]));
}

#[test]
fn test_gradient_3d_reads_dpdy_from_alternate_window() {
    let mut ctx = context(&[sampler(SAMPLER_INDEX, DataType::F32)]);
    let inst = SmpInstruction {
        lod_mode: 3,
        src2_n: 4,
        ..smp(2)
    };
    ctx.smp(&inst).unwrap();

    let primary = ctx
        .regs()
        .slot_variable(RegisterBank::Temp, PRIMARY_WINDOW, 2)
        .unwrap();
    let alternate = ctx
        .regs()
        .slot_variable(RegisterBank::Temp, ALTERNATE_WINDOW, 2)
        .unwrap();
    assert_ne!(primary, alternate);

    let run = |alt: Vec<f32>| {
        let mut interp = Interpreter::new(ctx.builder());
        interp.set_variable(primary, Value::F32(vec![1.0, 2.0, 3.0, 0.0]));
        interp.set_variable(alternate, Value::F32(alt));
        interp.run(|_| [0.0; 4]).unwrap();
        interp.samples()[0].grad.clone().unwrap()
    };

    let (dpdx_a, dpdy_a) = run(vec![4.0, 5.0, 6.0, 0.0]);
    let (dpdx_b, dpdy_b) = run(vec![7.0, 8.0, 9.0, 0.0]);

    assert_eq!(dpdx_a, vec![1.0, 2.0, 3.0]);
    assert_eq!(dpdx_a, dpdx_b);
    assert_eq!(dpdy_a, vec![4.0, 5.0, 6.0]);
    assert_eq!(dpdy_b, vec![7.0, 8.0, 9.0]);
}

#[test]
fn test_missing_sampler_skips_one_instruction() {
    let mut ctx = context(&[sampler(SAMPLER_INDEX, DataType::F32)]);
    let missing = SmpInstruction {
        src1_n: 5,
        ..smp(1)
    };
    let words = [missing.encode(), smp(1).encode()];

    let stats = ctx.translate_program(&words).unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.emitted, 1);
    assert_eq!(image_samples(&ctx), vec![Op::ImageSampleImplicitLod]);

    let mut interp = Interpreter::new(ctx.builder());
    interp.run(|_| [0.0; 4]).unwrap();
    let tex = ctx.samplers().get(SAMPLER_INDEX).unwrap().id;
    assert_eq!(interp.samples()[0].image, tex);
}

#[test]
fn test_unloadable_coordinate_is_hard_failure() {
    let config = TranslatorConfig {
        register_slots: 2,
        ..Default::default()
    };
    // pa20 is past the end of an 8-component bank
    let bad = SmpInstruction {
        src0_n: 10,
        ..smp(1)
    };

    let mut ctx = TranslationContext::new(&config, &[sampler(SAMPLER_INDEX, DataType::F32)]);
    assert_eq!(
        ctx.smp(&bad),
        Err(ShaderError::OperandLoad {
            bank: "pa".to_string(),
            index: 20,
        })
    );

    let stats = ctx.translate_program(&[bad.encode(), smp(1).encode()]).unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.emitted, 1);

    let aborting = TranslatorConfig {
        abort_shader_on_hard_failure: true,
        ..config
    };
    let mut ctx = TranslationContext::new(&aborting, &[sampler(SAMPLER_INDEX, DataType::F32)]);
    match ctx.translate_program(&[smp(1).encode(), bad.encode()]) {
        Err(ShaderError::InstructionFailed { pc, .. }) => assert_eq!(pc, 1),
        other => panic!("unexpected {other:?}"),
    }
}
