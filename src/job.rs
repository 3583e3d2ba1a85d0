//! Translation job files
//!
//! A job is a TOML document describing one shader:
//!
//! ```toml
//! output = "fragment.spv"
//! instructions = ["0xe000000000000306"]
//!
//! [[samplers]]
//! index = 6
//! component_count = 4
//! component_type = "U8"
//!
//! [[queries]]
//! sampler = 6
//! coord_location = 0
//! dest_offset = 0
//! ```
//!
//! Instruction words are hex strings since TOML integers are signed.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use usse_core::{Result, TranslatorError};
use usse_shader::{QueryDesc, SamplerDesc, ShaderProgram};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobFile {
    /// Output path; defaults to the job path with a `.spv` extension
    pub output: Option<PathBuf>,
    pub instructions: Vec<String>,
    pub samplers: Vec<SamplerDesc>,
    pub queries: Vec<QueryDesc>,
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse the instruction words and assemble the program
    pub fn to_program(&self) -> Result<ShaderProgram> {
        let instructions = self
            .instructions
            .iter()
            .enumerate()
            .map(|(i, word)| parse_word(word).ok_or_else(|| {
                TranslatorError::InvalidJob(format!("instruction {i}: bad word {word:?}"))
            }))
            .collect::<Result<Vec<u64>>>()?;

        Ok(ShaderProgram {
            instructions,
            samplers: self.samplers.clone(),
            queries: self.queries.clone(),
        })
    }
}

fn parse_word(word: &str) -> Option<u64> {
    let digits = word.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    u64::from_str_radix(&digits.replace('_', ""), 16).ok()
}
