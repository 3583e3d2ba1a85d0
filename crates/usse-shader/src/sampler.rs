//! Sampler table
//!
//! Built once per shader before any instruction is translated and read-only
//! afterwards.

use crate::ir::{decoration, Dim, Id, SpirVBuilder, StorageClass};
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_dim() -> u8 {
    2
}

/// Sampler as declared by the shader's resource metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamplerDesc {
    /// Register index the SMP src1 operand resolves to
    pub index: u32,
    pub component_count: u8,
    pub component_type: DataType,
    #[serde(default = "default_dim")]
    pub dim: u8,
}

/// Declared sampler resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerInfo {
    /// `UniformConstant` combined image sampler variable
    pub id: Id,
    /// Number of result components, 1..=4
    pub component_count: u8,
    pub component_type: DataType,
    pub dim: u8,
}

/// Sampler register index to sampler resource
#[derive(Debug, Clone, Default)]
pub struct SamplerTable {
    entries: BTreeMap<u32, SamplerInfo>,
}

impl SamplerTable {
    /// Declare one combined image sampler per descriptor
    pub fn declare(b: &mut SpirVBuilder, descs: &[SamplerDesc]) -> Self {
        let mut entries = BTreeMap::new();
        let f32_t = b.make_float_type(32);

        for desc in descs {
            // No 1D images downstream: 1D samplers are sampled as 2D
            let dim = if desc.dim >= 3 { Dim::Dim3D } else { Dim::Dim2D };
            let image = b.make_image_type(f32_t, dim);
            let sampled_image = b.make_sampled_image_type(image);
            let var = b.add_variable(StorageClass::UniformConstant, sampled_image);
            b.decorate(var, decoration::BINDING, desc.index);
            b.decorate(var, decoration::DESCRIPTOR_SET, 0);

            let component_count = desc.component_count.clamp(1, 4);
            if component_count != desc.component_count {
                tracing::warn!(
                    "Sampler {} declares {} components, clamped to {}",
                    desc.index,
                    desc.component_count,
                    component_count
                );
            }

            let previous = entries.insert(
                desc.index,
                SamplerInfo {
                    id: var,
                    component_count,
                    component_type: desc.component_type,
                    dim: desc.dim,
                },
            );
            if previous.is_some() {
                tracing::warn!("Sampler {} declared twice, keeping the last", desc.index);
            }
        }

        Self { entries }
    }

    pub fn get(&self, index: u32) -> Option<&SamplerInfo> {
        self.entries.get(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &SamplerInfo)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}
