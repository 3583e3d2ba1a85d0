//! Texture fetch emission
//!
//! Coordinate normalisation, the image-sample emitter shared by `SMP` and
//! the non-dependent query batch, and the batch itself.

use crate::convert;
use crate::ir::{image_operands, Id, Op, SpirVBuilder};
use crate::translator::TranslationContext;
use crate::types::*;

/// A loaded coordinate that may still be in its packed register encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    pub value: Id,
    pub source_type: DataType,
}

impl Coord {
    pub fn new(value: Id, source_type: DataType) -> Self {
        Self { value, source_type }
    }

    /// Coordinate that is already a float vector
    pub fn float(value: Id) -> Self {
        Self::new(value, DataType::F32)
    }
}

/// Level-of-detail selection for one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchLod {
    Implicit,
    /// Implicit LOD with the last coordinate lane as the divisor
    ProjectiveImplicit,
    /// Explicit LOD taken from a scalar
    Bias(Id),
    Gradient { dpdx: Id, dpdy: Id },
}

/// Fetch hoisted ahead of instruction translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureQuery {
    /// Sampler register index
    pub sampler: u32,
    pub coord: Coord,
    /// Declared store type; `None` falls back to `component_type`
    pub store_type: Option<DataType>,
    pub component_type: DataType,
    /// First PRIMATTR component written
    pub dest_offset: u32,
    pub component_count: u8,
    /// Coordinate lane used as the projective divisor
    pub proj_pos: Option<u8>,
}

impl TextureQuery {
    pub fn effective_store_type(&self) -> DataType {
        self.store_type.unwrap_or(self.component_type)
    }
}

impl TranslationContext {
    /// Turn a coordinate into a float value ready to be sampled with.
    ///
    /// Packed encodings are unpacked from lane 0 of the loaded value and
    /// clipped to two lanes.
    pub fn normalize_coord(&mut self, coord: Coord) -> Id {
        let b = &mut self.builder;
        let mut value = coord.value;

        if coord.source_type != DataType::F32 {
            if b.is_pointer(value) {
                value = b.create_load(value);
            }
            if b.num_components(value) > 1 {
                let f32_t = b.make_float_type(32);
                let zero = b.make_int_constant(0);
                value = b.create_op(Op::VectorExtractDynamic, f32_t, vec![value.word(), zero.word()]);
            }
            value = convert::unpack_one(b, value, coord.source_type);

            if b.num_components(value) > 2 {
                let f32_t = b.make_float_type(32);
                let vec2 = b.make_vector_type(f32_t, 2);
                value = b.create_vector_shuffle(vec2, value, value, &[0, 1]);
            }
        }

        if b.is_pointer(value) {
            value = b.create_load(value);
        }

        assert!(
            b.is_float_value(value),
            "coordinate {value} is not float-typed after normalisation"
        );
        value
    }

    /// Emit one image sample and convert the vec4 result to `dest_type`.
    ///
    /// Integer destinations get a rounded, saturated integer vector. Float
    /// destinations get the raw vec4.
    pub fn fetch_texture(&mut self, texture: Id, coord: Coord, dest_type: DataType, lod: FetchLod) -> Id {
        let coord = self.normalize_coord(coord);
        let b = &mut self.builder;

        let f32_t = b.make_float_type(32);
        let vec4 = b.make_vector_type(f32_t, 4);
        let image = b.create_load(texture);

        let sample = match lod {
            FetchLod::Implicit => {
                b.create_op(Op::ImageSampleImplicitLod, vec4, vec![image.word(), coord.word()])
            }
            FetchLod::ProjectiveImplicit => {
                b.create_op(Op::ImageSampleProjImplicitLod, vec4, vec![image.word(), coord.word()])
            }
            FetchLod::Bias(lod) => b.create_op(
                Op::ImageSampleExplicitLod,
                vec4,
                vec![image.word(), coord.word(), image_operands::LOD, lod.word()],
            ),
            FetchLod::Gradient { dpdx, dpdy } => b.create_op(
                Op::ImageSampleExplicitLod,
                vec4,
                vec![
                    image.word(),
                    coord.word(),
                    image_operands::GRAD,
                    dpdx.word(),
                    dpdy.word(),
                ],
            ),
        };

        if dest_type.is_integer() {
            convert::convert_to_int(b, sample, dest_type)
        } else {
            sample
        }
    }

    /// `{x, y, lane[pos]}` as floats, with `lane[pos]` as the divisor.
    ///
    /// Packed coordinates are unpacked lane by lane first, so the divisor is
    /// selected among unpacked lanes rather than raw register words.
    fn projected_coord(&mut self, coord: Coord, pos: u8) -> Id {
        let b = &mut self.builder;
        let base = if b.is_pointer(coord.value) {
            b.create_load(coord.value)
        } else {
            coord.value
        };
        let f32_t = b.make_float_type(32);
        let vec3 = b.make_vector_type(f32_t, 3);

        if coord.source_type == DataType::F32 {
            return b.create_vector_shuffle(vec3, base, base, &[0, 1, pos as u32]);
        }

        let per_component = coord.source_type.lanes_per_component();
        let raw_components = b.num_components(base);
        let lane = |b: &mut SpirVBuilder, element: u32| {
            let component = element / per_component;
            if component >= raw_components {
                return b.make_float_constant(0.0);
            }
            let raw = if raw_components > 1 {
                b.create_composite_extract(base, component)
            } else {
                base
            };
            convert::unpack_lane(b, raw, coord.source_type, element % per_component)
        };

        let x = lane(b, 0);
        let y = lane(b, 1);
        let q = lane(b, pos as u32);
        b.create_composite_construct(vec3, &[x, y, q])
    }

    /// Replay non-dependent queries in list order.
    ///
    /// Returns the number of fetches emitted. Queries naming an unknown
    /// sampler are skipped.
    pub fn texture_queries(&mut self, queries: &[TextureQuery]) -> usize {
        let mut emitted = 0;

        for query in queries {
            let Some(sampler) = self.samplers.get(query.sampler).copied() else {
                tracing::warn!("Non-dependent query on missing sampler {}", query.sampler);
                continue;
            };

            let store_type = query.effective_store_type();
            let mut coord = query.coord;
            let lod = match query.proj_pos {
                Some(pos) => {
                    coord = Coord::float(self.projected_coord(coord, pos));
                    FetchLod::ProjectiveImplicit
                }
                None => FetchLod::Implicit,
            };

            let fetched = self.fetch_texture(sampler.id, coord, store_type, lod);
            let dest = Operand::new(RegisterBank::PrimAttr, query.dest_offset, store_type);
            let mask = ChannelMask::first(query.component_count);
            self.regs.store(&mut self.builder, &dest, fetched, mask);
            emitted += 1;
        }

        emitted
    }
}
