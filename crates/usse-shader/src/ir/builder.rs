//! SPIR-V module builder
//!
//! Keeps each logical section of the module in its own instruction list and
//! tracks the type of every value it creates, so callers can query component
//! counts and pointer-ness of the ids they hold.

use super::*;
use std::collections::HashMap;

/// SPIR-V magic number
pub const SPIRV_MAGIC: u32 = 0x07230203;

/// SPIR-V version (1.0)
pub const SPIRV_VERSION: u32 = 0x00010000;

/// SPIR-V generator ID (our tool)
pub const SPIRV_GENERATOR: u32 = 0x00080001;

// Capability values
pub const CAP_SHADER: u32 = 1;

// Execution model values
pub const EXEC_MODEL_FRAGMENT: u32 = 4;

// Execution mode values
pub const EXEC_MODE_ORIGIN_UPPER_LEFT: u32 = 7;

/// SPIR-V code builder
#[derive(Debug, Clone, Default)]
pub struct SpirVBuilder {
    /// Current ID bound
    id_bound: u32,
    capabilities: Vec<Instruction>,
    ext_inst_imports: Vec<Instruction>,
    memory_model: Vec<Instruction>,
    entry_points: Vec<Instruction>,
    execution_modes: Vec<Instruction>,
    /// Annotations (decorations)
    annotations: Vec<Instruction>,
    /// Types, constants, global variables
    types_constants: Vec<Instruction>,
    /// Function definitions
    functions: Vec<Instruction>,
    /// GLSL.std.450 import ID
    glsl_ext_id: Option<Id>,
    types: HashMap<Type, Id>,
    type_defs: HashMap<Id, Type>,
    /// Result type of every typed value
    value_types: HashMap<Id, Id>,
    /// (type, bits) -> constant
    constants: HashMap<(Id, u32), Id>,
}

impl SpirVBuilder {
    pub fn new() -> Self {
        Self {
            id_bound: 1,
            ..Default::default()
        }
    }

    /// Allocate a new ID
    pub fn alloc_id(&mut self) -> Id {
        let id = Id(self.id_bound);
        self.id_bound += 1;
        id
    }

    pub fn id_bound(&self) -> u32 {
        self.id_bound
    }

    pub fn add_capability(&mut self, cap: u32) {
        self.capabilities
            .push(Instruction::new(Op::Capability, None, None, vec![cap]));
    }

    /// Import GLSL.std.450, once
    pub fn import_glsl(&mut self) -> Id {
        if let Some(id) = self.glsl_ext_id {
            return id;
        }
        let id = self.alloc_id();
        self.ext_inst_imports.push(Instruction::new(
            Op::ExtInstImport,
            None,
            Some(id),
            encode_string("GLSL.std.450"),
        ));
        self.glsl_ext_id = Some(id);
        id
    }

    /// Logical addressing, GLSL450 memory model
    pub fn set_memory_model(&mut self) {
        self.memory_model.clear();
        self.memory_model
            .push(Instruction::new(Op::MemoryModel, None, None, vec![0, 1]));
    }

    //-------------------------------------------------------------------------
    // Types
    //-------------------------------------------------------------------------

    /// Declare a type, reusing an identical earlier declaration
    pub fn make_type(&mut self, ty: Type) -> Id {
        if let Some(id) = self.types.get(&ty) {
            return *id;
        }

        let id = self.alloc_id();
        let (op, operands) = match &ty {
            Type::Void => (Op::TypeVoid, vec![]),
            Type::Bool => (Op::TypeBool, vec![]),
            Type::Int { width, signed } => (Op::TypeInt, vec![*width, *signed as u32]),
            Type::Float { width } => (Op::TypeFloat, vec![*width]),
            Type::Vector { component, count } => (Op::TypeVector, vec![component.word(), *count]),
            Type::Pointer { storage, pointee } => {
                (Op::TypePointer, vec![*storage as u32, pointee.word()])
            }
            // Depth, Arrayed, MS = 0; Sampled = 1; Format = Unknown
            Type::Image { sampled, dim } => {
                (Op::TypeImage, vec![sampled.word(), *dim as u32, 0, 0, 0, 1, 0])
            }
            Type::SampledImage { image } => (Op::TypeSampledImage, vec![image.word()]),
            Type::Function { ret } => (Op::TypeFunction, vec![ret.word()]),
        };

        self.types_constants
            .push(Instruction::new(op, None, Some(id), operands));
        self.types.insert(ty.clone(), id);
        self.type_defs.insert(id, ty);
        id
    }

    pub fn make_void_type(&mut self) -> Id {
        self.make_type(Type::Void)
    }

    pub fn make_float_type(&mut self, width: u32) -> Id {
        self.make_type(Type::Float { width })
    }

    pub fn make_int_type(&mut self, width: u32) -> Id {
        self.make_type(Type::Int {
            width,
            signed: true,
        })
    }

    pub fn make_uint_type(&mut self, width: u32) -> Id {
        self.make_type(Type::Int {
            width,
            signed: false,
        })
    }

    /// Vector of `count` components; a count of 1 yields the component type
    pub fn make_vector_type(&mut self, component: Id, count: u32) -> Id {
        if count == 1 {
            return component;
        }
        self.make_type(Type::Vector { component, count })
    }

    pub fn make_pointer(&mut self, storage: StorageClass, pointee: Id) -> Id {
        self.make_type(Type::Pointer { storage, pointee })
    }

    pub fn make_image_type(&mut self, sampled: Id, dim: Dim) -> Id {
        self.make_type(Type::Image { sampled, dim })
    }

    pub fn make_sampled_image_type(&mut self, image: Id) -> Id {
        self.make_type(Type::SampledImage { image })
    }

    pub fn type_def(&self, ty: Id) -> Option<&Type> {
        self.type_defs.get(&ty)
    }

    /// Type of a value created by this builder
    pub fn type_of(&self, value: Id) -> Option<Id> {
        self.value_types.get(&value).copied()
    }

    /// Component type of a vector, pointee of a pointer, else the type itself
    pub fn contained_type(&self, ty: Id) -> Id {
        match self.type_def(ty) {
            Some(Type::Vector { component, .. }) => *component,
            Some(Type::Pointer { pointee, .. }) => *pointee,
            _ => ty,
        }
    }

    pub fn type_components(&self, ty: Id) -> u32 {
        match self.type_def(ty) {
            Some(Type::Vector { count, .. }) => *count,
            _ => 1,
        }
    }

    pub fn num_components(&self, value: Id) -> u32 {
        self.type_of(value)
            .map(|ty| self.type_components(ty))
            .unwrap_or(0)
    }

    pub fn is_pointer(&self, value: Id) -> bool {
        matches!(
            self.type_of(value).and_then(|ty| self.type_def(ty)),
            Some(Type::Pointer { .. })
        )
    }

    /// Scalar or vector of floats
    pub fn is_float_type(&self, ty: Id) -> bool {
        let scalar = match self.type_def(ty) {
            Some(Type::Vector { component, .. }) => *component,
            _ => ty,
        };
        matches!(self.type_def(scalar), Some(Type::Float { .. }))
    }

    pub fn is_float_value(&self, value: Id) -> bool {
        self.type_of(value).is_some_and(|ty| self.is_float_type(ty))
    }

    //-------------------------------------------------------------------------
    // Constants and globals
    //-------------------------------------------------------------------------

    fn make_constant(&mut self, ty: Id, bits: u32) -> Id {
        if let Some(id) = self.constants.get(&(ty, bits)) {
            return *id;
        }
        let id = self.alloc_id();
        self.types_constants
            .push(Instruction::new(Op::Constant, Some(ty), Some(id), vec![bits]));
        self.constants.insert((ty, bits), id);
        self.value_types.insert(id, ty);
        id
    }

    pub fn make_float_constant(&mut self, value: f32) -> Id {
        let ty = self.make_float_type(32);
        self.make_constant(ty, value.to_bits())
    }

    pub fn make_uint_constant(&mut self, value: u32) -> Id {
        let ty = self.make_uint_type(32);
        self.make_constant(ty, value)
    }

    pub fn make_int_constant(&mut self, value: i32) -> Id {
        let ty = self.make_int_type(32);
        self.make_constant(ty, value as u32)
    }

    /// `(type, bits)` of a constant created by this builder
    pub fn constant_value(&self, id: Id) -> Option<(Id, u32)> {
        self.constants
            .iter()
            .find(|(_, v)| **v == id)
            .map(|((ty, bits), _)| (*ty, *bits))
    }

    /// Declare a module-scope variable
    pub fn add_variable(&mut self, storage: StorageClass, pointee: Id) -> Id {
        let ptr_type = self.make_pointer(storage, pointee);
        let id = self.alloc_id();
        self.types_constants.push(Instruction::new(
            Op::Variable,
            Some(ptr_type),
            Some(id),
            vec![storage as u32],
        ));
        self.value_types.insert(id, ptr_type);
        id
    }

    pub fn decorate(&mut self, target: Id, decoration: u32, value: u32) {
        self.annotations.push(Instruction::new(
            Op::Decorate,
            None,
            None,
            vec![target.word(), decoration, value],
        ));
    }

    //-------------------------------------------------------------------------
    // Function body
    //-------------------------------------------------------------------------

    /// Emit an instruction with a result into the function body
    pub fn create_op(&mut self, op: Op, result_type: Id, operands: Vec<u32>) -> Id {
        let id = self.alloc_id();
        self.functions
            .push(Instruction::new(op, Some(result_type), Some(id), operands));
        self.value_types.insert(id, result_type);
        id
    }

    pub fn create_load(&mut self, pointer: Id) -> Id {
        let ptr_type = self.type_of(pointer).unwrap_or(Id(0));
        let pointee = self.contained_type(ptr_type);
        self.create_op(Op::Load, pointee, vec![pointer.word()])
    }

    pub fn create_store(&mut self, pointer: Id, value: Id) {
        self.functions.push(Instruction::new(
            Op::Store,
            None,
            None,
            vec![pointer.word(), value.word()],
        ));
    }

    pub fn create_composite_construct(&mut self, ty: Id, parts: &[Id]) -> Id {
        self.create_op(
            Op::CompositeConstruct,
            ty,
            parts.iter().map(|p| p.word()).collect(),
        )
    }

    pub fn create_composite_extract(&mut self, composite: Id, index: u32) -> Id {
        let ty = self.type_of(composite).unwrap_or(Id(0));
        let component = self.contained_type(ty);
        self.create_op(Op::CompositeExtract, component, vec![composite.word(), index])
    }

    pub fn create_composite_insert(&mut self, object: Id, composite: Id, index: u32) -> Id {
        let ty = self.type_of(composite).unwrap_or(Id(0));
        self.create_op(
            Op::CompositeInsert,
            ty,
            vec![object.word(), composite.word(), index],
        )
    }

    pub fn create_vector_shuffle(&mut self, ty: Id, a: Id, b: Id, lanes: &[u32]) -> Id {
        let mut operands = vec![a.word(), b.word()];
        operands.extend_from_slice(lanes);
        self.create_op(Op::VectorShuffle, ty, operands)
    }

    pub fn create_ext_inst(&mut self, result_type: Id, inst: GlslStd450, args: &[Id]) -> Id {
        let set = self.import_glsl();
        let mut operands = vec![set.word(), inst as u32];
        operands.extend(args.iter().map(|a| a.word()));
        self.create_op(Op::ExtInst, result_type, operands)
    }

    /// Open a `void()` function and its entry block
    pub fn begin_function(&mut self) -> Id {
        let void = self.make_void_type();
        let fn_type = self.make_type(Type::Function { ret: void });
        let func = self.alloc_id();
        self.functions.push(Instruction::new(
            Op::Function,
            Some(void),
            Some(func),
            vec![0, fn_type.word()],
        ));
        let label = self.alloc_id();
        self.functions
            .push(Instruction::new(Op::Label, None, Some(label), vec![]));
        func
    }

    pub fn end_function(&mut self) {
        self.functions
            .push(Instruction::new(Op::Return, None, None, vec![]));
        self.functions
            .push(Instruction::new(Op::FunctionEnd, None, None, vec![]));
    }

    pub fn add_entry_point(&mut self, model: u32, func: Id, name: &str, interface: &[Id]) {
        let mut operands = vec![model, func.word()];
        operands.extend(encode_string(name));
        operands.extend(interface.iter().map(|v| v.word()));
        self.entry_points
            .push(Instruction::new(Op::EntryPoint, None, None, operands));
    }

    pub fn add_execution_mode(&mut self, func: Id, mode: u32) {
        self.execution_modes.push(Instruction::new(
            Op::ExecutionMode,
            None,
            None,
            vec![func.word(), mode],
        ));
    }

    /// Instructions emitted into function bodies so far
    pub fn function_body(&self) -> &[Instruction] {
        &self.functions
    }

    /// Types, constants and global variables
    pub fn globals(&self) -> &[Instruction] {
        &self.types_constants
    }

    pub fn annotations(&self) -> &[Instruction] {
        &self.annotations
    }

    /// Defining instruction of an id
    pub fn find_def(&self, id: Id) -> Option<&Instruction> {
        self.types_constants
            .iter()
            .chain(self.functions.iter())
            .find(|inst| inst.result == Some(id))
    }

    /// Build final SPIR-V bytecode
    pub fn build(&self) -> Vec<u32> {
        let mut spirv = vec![
            SPIRV_MAGIC,
            SPIRV_VERSION,
            SPIRV_GENERATOR,
            self.id_bound,
            0, // Reserved
        ];

        // Sections in order
        for section in [
            &self.capabilities,
            &self.ext_inst_imports,
            &self.memory_model,
            &self.entry_points,
            &self.execution_modes,
            &self.annotations,
            &self.types_constants,
            &self.functions,
        ] {
            for inst in section {
                inst.encode(&mut spirv);
            }
        }

        spirv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirv_header() {
        let builder = SpirVBuilder::new();
        let spirv = builder.build();
        assert_eq!(spirv[0], SPIRV_MAGIC);
        assert_eq!(spirv[3], 1);
    }

    #[test]
    fn test_types_are_deduplicated() {
        let mut b = SpirVBuilder::new();
        let f32_a = b.make_float_type(32);
        let f32_b = b.make_float_type(32);
        assert_eq!(f32_a, f32_b);

        let vec2 = b.make_vector_type(f32_a, 2);
        assert_eq!(b.make_vector_type(f32_a, 2), vec2);
        assert_eq!(b.make_vector_type(f32_a, 1), f32_a);
        assert_eq!(b.type_components(vec2), 2);
        assert!(b.is_float_type(vec2));
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let mut b = SpirVBuilder::new();
        let zero = b.make_float_constant(0.0);
        assert_eq!(b.make_float_constant(0.0), zero);
        assert_ne!(b.make_uint_constant(0), zero);
        let (ty, bits) = b.constant_value(zero).unwrap();
        assert!(b.is_float_type(ty));
        assert_eq!(bits, 0);
    }

    #[test]
    fn test_load_tracks_pointee_type() {
        let mut b = SpirVBuilder::new();
        let f32_t = b.make_float_type(32);
        let vec4 = b.make_vector_type(f32_t, 4);
        let var = b.add_variable(StorageClass::Private, vec4);
        assert!(b.is_pointer(var));

        b.begin_function();
        let loaded = b.create_load(var);
        assert!(!b.is_pointer(loaded));
        assert_eq!(b.num_components(loaded), 4);

        let x = b.create_composite_extract(loaded, 0);
        assert_eq!(b.type_of(x), Some(f32_t));
        b.end_function();

        let spirv = b.build();
        assert_eq!(spirv[3], b.id_bound());
    }
}
