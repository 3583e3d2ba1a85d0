//! Error types for the USSE translator

use thiserror::Error;

/// Main error type for the translator
#[derive(Error, Debug)]
pub enum TranslatorError {
    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

/// Hard failures raised while translating a shader.
///
/// Soft conditions (unsupported LOD mode, missing sampler, unsupported
/// store-bank mode) are not errors; they are reported as skipped
/// instructions by the translator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderError {
    #[error("Failed to load operand {bank}{index}")]
    OperandLoad { bank: String, index: u32 },

    #[error("Instruction {pc} failed: {source}")]
    InstructionFailed {
        pc: usize,
        #[source]
        source: Box<ShaderError>,
    },

    #[error("Invalid program: {0}")]
    InvalidProgram(String),
}

impl From<toml::de::Error> for TranslatorError {
    fn from(err: toml::de::Error) -> Self {
        TranslatorError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TranslatorError {
    fn from(err: toml::ser::Error) -> Self {
        TranslatorError::Config(err.to_string())
    }
}

/// Result type alias for translator operations
pub type Result<T> = std::result::Result<T, TranslatorError>;
