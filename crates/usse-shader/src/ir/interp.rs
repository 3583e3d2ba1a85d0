//! Reference interpreter for built modules
//!
//! Executes the straight-line function body produced by the translator so
//! numeric behaviour (unpacking, saturation, register packing) can be checked
//! without a driver. Image samples are resolved through a caller-supplied
//! callback.

use super::*;
use half::f16;
use std::collections::HashMap;
use thiserror::Error;

/// Interpreter errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Unsupported opcode: {0:?}")]
    Unsupported(Op),

    #[error("Value {0} is not defined")]
    MissingValue(Id),

    #[error("Malformed {0:?} instruction")]
    Malformed(Op),
}

/// Scalar kind of a runtime value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    F32,
    U32,
    I32,
}

/// Runtime value: one or more lanes of a single scalar kind
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    F32(Vec<f32>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    /// Loaded combined image sampler, identified by its variable
    SampledImage(Id),
}

impl Value {
    pub fn len(&self) -> usize {
        match self {
            Value::F32(v) => v.len(),
            Value::U32(v) => v.len(),
            Value::I32(v) => v.len(),
            Value::SampledImage(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bits(&self) -> Vec<u32> {
        match self {
            Value::F32(v) => v.iter().map(|x| x.to_bits()).collect(),
            Value::U32(v) => v.clone(),
            Value::I32(v) => v.iter().map(|x| *x as u32).collect(),
            Value::SampledImage(id) => vec![id.word()],
        }
    }

    pub fn from_bits(kind: ScalarKind, bits: Vec<u32>) -> Self {
        match kind {
            ScalarKind::F32 => Value::F32(bits.into_iter().map(f32::from_bits).collect()),
            ScalarKind::U32 => Value::U32(bits),
            ScalarKind::I32 => Value::I32(bits.into_iter().map(|b| b as i32).collect()),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Value::F32(v) => Some(v),
            _ => None,
        }
    }
}

/// An image sample the interpreter needs resolved
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCall {
    /// Sampler variable the image was loaded from
    pub image: Id,
    pub op: Op,
    pub coord: Vec<f32>,
    pub lod: Option<f32>,
    pub grad: Option<(Vec<f32>, Vec<f32>)>,
}

/// Straight-line interpreter over a builder's function body
pub struct Interpreter<'a> {
    builder: &'a SpirVBuilder,
    values: HashMap<Id, Value>,
    memory: HashMap<Id, Value>,
    samples: Vec<SampleCall>,
}

impl<'a> Interpreter<'a> {
    pub fn new(builder: &'a SpirVBuilder) -> Self {
        let mut interp = Self {
            builder,
            values: HashMap::new(),
            memory: HashMap::new(),
            samples: Vec::new(),
        };

        for inst in builder.globals() {
            if inst.op != Op::Constant {
                continue;
            }
            if let (Some(ty), Some(id), Some(bits)) =
                (inst.result_type, inst.result, inst.operands.first())
            {
                if let Some(kind) = interp.scalar_kind(ty) {
                    interp.values.insert(id, Value::from_bits(kind, vec![*bits]));
                }
            }
        }

        interp
    }

    /// Set the contents of a variable before running
    pub fn set_variable(&mut self, var: Id, value: Value) {
        self.memory.insert(var, value);
    }

    pub fn variable(&self, var: Id) -> Option<&Value> {
        self.memory.get(&var)
    }

    pub fn value(&self, id: Id) -> Option<&Value> {
        self.values.get(&id)
    }

    /// Samples issued by the last run, in program order
    pub fn samples(&self) -> &[SampleCall] {
        &self.samples
    }

    fn scalar_kind(&self, ty: Id) -> Option<ScalarKind> {
        let scalar = self.builder.contained_type(ty);
        match self.builder.type_def(scalar)? {
            Type::Float { .. } => Some(ScalarKind::F32),
            Type::Int { signed: true, .. } => Some(ScalarKind::I32),
            Type::Int { signed: false, .. } => Some(ScalarKind::U32),
            _ => None,
        }
    }

    fn get(&self, id: Id) -> Result<&Value, InterpError> {
        self.values.get(&id).ok_or(InterpError::MissingValue(id))
    }

    fn operand(&self, inst: &Instruction, i: usize) -> Result<&Value, InterpError> {
        let id = inst.id_operand(i).ok_or(InterpError::Malformed(inst.op))?;
        self.get(id)
    }

    fn literal(inst: &Instruction, i: usize) -> Result<u32, InterpError> {
        inst.operands.get(i).copied().ok_or(InterpError::Malformed(inst.op))
    }

    fn floats(&self, inst: &Instruction, i: usize) -> Result<Vec<f32>, InterpError> {
        match self.operand(inst, i)? {
            Value::F32(v) => Ok(v.clone()),
            _ => Err(InterpError::Malformed(inst.op)),
        }
    }

    fn scalar_bits(&self, inst: &Instruction, i: usize) -> Result<u32, InterpError> {
        self.operand(inst, i)?
            .bits()
            .first()
            .copied()
            .ok_or(InterpError::Malformed(inst.op))
    }

    fn result_kind(&self, inst: &Instruction) -> Result<ScalarKind, InterpError> {
        inst.result_type
            .and_then(|ty| self.scalar_kind(ty))
            .ok_or(InterpError::Malformed(inst.op))
    }

    /// Zero value of a variable's pointee type
    fn default_for(&self, var: Id) -> Value {
        let ptr_type = self.builder.type_of(var).unwrap_or(Id(0));
        if let Some(Type::Pointer {
            storage: StorageClass::UniformConstant,
            ..
        }) = self.builder.type_def(ptr_type)
        {
            return Value::SampledImage(var);
        }
        let pointee = self.builder.contained_type(ptr_type);
        let count = self.builder.type_components(pointee) as usize;
        let kind = self.scalar_kind(pointee).unwrap_or(ScalarKind::F32);
        Value::from_bits(kind, vec![0; count])
    }

    /// Execute every function body instruction in order
    pub fn run<F>(&mut self, mut sample: F) -> Result<(), InterpError>
    where
        F: FnMut(&SampleCall) -> [f32; 4],
    {
        self.samples.clear();
        let builder = self.builder;

        for inst in builder.function_body() {
            let result = match inst.op {
                Op::Function | Op::FunctionEnd | Op::Label | Op::Return => None,
                Op::Load => {
                    let ptr = inst.id_operand(0).ok_or(InterpError::Malformed(inst.op))?;
                    Some(
                        self.memory
                            .get(&ptr)
                            .cloned()
                            .unwrap_or_else(|| self.default_for(ptr)),
                    )
                }
                Op::Store => {
                    let ptr = inst.id_operand(0).ok_or(InterpError::Malformed(inst.op))?;
                    let value = self.operand(inst, 1)?.clone();
                    self.memory.insert(ptr, value);
                    None
                }
                Op::CompositeConstruct => {
                    let mut bits = Vec::new();
                    for i in 0..inst.operands.len() {
                        bits.extend(self.operand(inst, i)?.bits());
                    }
                    Some(Value::from_bits(self.result_kind(inst)?, bits))
                }
                Op::CompositeExtract => {
                    let bits = self.operand(inst, 0)?.bits();
                    let index = Self::literal(inst, 1)? as usize;
                    let lane = *bits.get(index).ok_or(InterpError::Malformed(inst.op))?;
                    Some(Value::from_bits(self.result_kind(inst)?, vec![lane]))
                }
                Op::CompositeInsert => {
                    let object = self.scalar_bits(inst, 0)?;
                    let mut bits = self.operand(inst, 1)?.bits();
                    let index = Self::literal(inst, 2)? as usize;
                    *bits.get_mut(index).ok_or(InterpError::Malformed(inst.op))? = object;
                    Some(Value::from_bits(self.result_kind(inst)?, bits))
                }
                Op::VectorShuffle => {
                    let mut pool = self.operand(inst, 0)?.bits();
                    pool.extend(self.operand(inst, 1)?.bits());
                    let mut bits = Vec::new();
                    for &lane in &inst.operands[2..] {
                        bits.push(*pool.get(lane as usize).ok_or(InterpError::Malformed(inst.op))?);
                    }
                    Some(Value::from_bits(self.result_kind(inst)?, bits))
                }
                Op::VectorExtractDynamic => {
                    let bits = self.operand(inst, 0)?.bits();
                    let index = self.scalar_bits(inst, 1)? as usize;
                    let lane = *bits.get(index).ok_or(InterpError::Malformed(inst.op))?;
                    Some(Value::from_bits(self.result_kind(inst)?, vec![lane]))
                }
                Op::ImageSampleImplicitLod
                | Op::ImageSampleProjImplicitLod
                | Op::ImageSampleExplicitLod => {
                    let image = match self.operand(inst, 0)? {
                        Value::SampledImage(var) => *var,
                        _ => return Err(InterpError::Malformed(inst.op)),
                    };
                    let coord = self.floats(inst, 1)?;
                    let mut call = SampleCall {
                        image,
                        op: inst.op,
                        coord,
                        lod: None,
                        grad: None,
                    };
                    if inst.op == Op::ImageSampleExplicitLod {
                        let mask = Self::literal(inst, 2)?;
                        if mask & image_operands::LOD != 0 {
                            call.lod = self.floats(inst, 3)?.first().copied();
                        } else if mask & image_operands::GRAD != 0 {
                            call.grad = Some((self.floats(inst, 3)?, self.floats(inst, 4)?));
                        }
                    }
                    let texel = sample(&call);
                    self.samples.push(call);
                    Some(Value::F32(texel.to_vec()))
                }
                Op::ConvertFToU => Some(Value::U32(
                    self.floats(inst, 0)?.iter().map(|x| *x as u32).collect(),
                )),
                Op::ConvertFToS => Some(Value::I32(
                    self.floats(inst, 0)?.iter().map(|x| *x as i32).collect(),
                )),
                Op::ConvertUToF => Some(Value::F32(
                    self.operand(inst, 0)?.bits().iter().map(|x| *x as f32).collect(),
                )),
                Op::ConvertSToF => Some(Value::F32(
                    self.operand(inst, 0)?
                        .bits()
                        .iter()
                        .map(|x| *x as i32 as f32)
                        .collect(),
                )),
                Op::Bitcast => {
                    let bits = self.operand(inst, 0)?.bits();
                    Some(Value::from_bits(self.result_kind(inst)?, bits))
                }
                Op::FMul => {
                    let a = self.floats(inst, 0)?;
                    let b = self.floats(inst, 1)?;
                    if a.len() != b.len() {
                        return Err(InterpError::Malformed(inst.op));
                    }
                    Some(Value::F32(a.iter().zip(&b).map(|(x, y)| x * y).collect()))
                }
                Op::BitFieldInsert => {
                    let base = self.scalar_bits(inst, 0)?;
                    let insert = self.scalar_bits(inst, 1)?;
                    let offset = self.scalar_bits(inst, 2)?;
                    let count = self.scalar_bits(inst, 3)?;
                    let mask = field_mask(count) << offset;
                    let bits = (base & !mask) | ((insert << offset) & mask);
                    Some(Value::from_bits(self.result_kind(inst)?, vec![bits]))
                }
                Op::BitFieldUExtract | Op::BitFieldSExtract => {
                    let base = self.scalar_bits(inst, 0)?;
                    let offset = self.scalar_bits(inst, 1)?;
                    let count = self.scalar_bits(inst, 2)?;
                    let mut bits = (base >> offset) & field_mask(count);
                    if inst.op == Op::BitFieldSExtract && count > 0 && count < 32 {
                        let shift = 32 - count;
                        bits = (((bits << shift) as i32) >> shift) as u32;
                    }
                    Some(Value::from_bits(self.result_kind(inst)?, vec![bits]))
                }
                Op::ExtInst => Some(self.ext_inst(inst)?),
                other => return Err(InterpError::Unsupported(other)),
            };

            if let (Some(id), Some(value)) = (inst.result, result) {
                self.values.insert(id, value);
            }
        }

        Ok(())
    }

    fn ext_inst(&self, inst: &Instruction) -> Result<Value, InterpError> {
        let which = Self::literal(inst, 1)?;
        match GlslStd450::from_word(which) {
            Some(GlslStd450::Round) => Ok(Value::F32(
                self.floats(inst, 2)?.iter().map(|x| x.round()).collect(),
            )),
            Some(GlslStd450::FClamp) => {
                let x = self.floats(inst, 2)?;
                let lo = self.floats(inst, 3)?;
                let hi = self.floats(inst, 4)?;
                Ok(Value::F32(
                    x.iter()
                        .enumerate()
                        .map(|(i, v)| {
                            let lo = lo.get(i).or(lo.first()).copied().unwrap_or(f32::MIN);
                            let hi = hi.get(i).or(hi.first()).copied().unwrap_or(f32::MAX);
                            v.max(lo).min(hi)
                        })
                        .collect(),
                ))
            }
            Some(GlslStd450::PackHalf2x16) => {
                let v = self.floats(inst, 2)?;
                if v.len() != 2 {
                    return Err(InterpError::Malformed(inst.op));
                }
                let lo = f16::from_f32(v[0]).to_bits() as u32;
                let hi = f16::from_f32(v[1]).to_bits() as u32;
                Ok(Value::U32(vec![lo | (hi << 16)]))
            }
            Some(GlslStd450::UnpackHalf2x16) => {
                let bits = self.scalar_bits(inst, 2)?;
                Ok(Value::F32(vec![
                    f16::from_bits(bits as u16).to_f32(),
                    f16::from_bits((bits >> 16) as u16).to_f32(),
                ]))
            }
            None => Err(InterpError::Unsupported(inst.op)),
        }
    }
}

fn field_mask(count: u32) -> u32 {
    if count >= 32 {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}
