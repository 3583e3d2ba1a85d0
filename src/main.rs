//! usse-spirv
//!
//! Translates a USSE texture-sampling job into a SPIR-V fragment module.

mod job;

use anyhow::{Context, Result};
use clap::Parser;
use job::JobFile;
use std::path::PathBuf;
use usse_core::Config;
use usse_shader::{ShaderTranslator, SpirVModule};

const DEFAULT_CONFIG: &str = "usse-spirv.toml";

#[derive(Parser, Debug)]
#[command(
    name = "usse-spirv",
    about = "Translate a USSE texture-sampling job into a SPIR-V fragment module."
)]
struct Args {
    /// Job file (TOML: instruction words, samplers, queries)
    job: PathBuf,

    /// Output module path (defaults to the job's `output`, then "<job stem>.spv")
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Translator config; a missing file means defaults
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG)]
    config: PathBuf,
}

fn dump(config: &Config, stem: &str, module: &SpirVModule) -> Result<()> {
    let dir = &config.debug.dump_path;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating dump directory {}", dir.display()))?;

    if config.debug.dump_shaders {
        std::fs::write(dir.join(format!("{stem}.spv")), module.as_bytes())?;
    }
    if config.debug.dump_disasm {
        std::fs::write(dir.join(format!("{stem}.disasm")), module.disasm.join("\n"))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    usse_core::logging::init(config.debug.log_level);

    tracing::info!("Translating {}", args.job.display());

    let job = JobFile::load(&args.job)
        .with_context(|| format!("loading job {}", args.job.display()))?;
    let program = job.to_program()?;

    let translator = ShaderTranslator::new(config.translator.clone());
    let module = translator
        .translate(&program)
        .with_context(|| format!("translating {}", args.job.display()))?;

    let output = args
        .output
        .or(job.output)
        .unwrap_or_else(|| args.job.with_extension("spv"));
    std::fs::write(&output, module.as_bytes())
        .with_context(|| format!("writing {}", output.display()))?;

    if config.debug.dump_shaders || config.debug.dump_disasm {
        let stem = args
            .job
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("shader");
        dump(&config, stem, &module)?;
    }

    let stats = module.stats;
    tracing::info!(
        "Wrote {} ({} words): {} emitted, {} skipped, {} failed, {} queries",
        output.display(),
        module.bytecode.len(),
        stats.emitted,
        stats.skipped,
        stats.failed,
        stats.queries
    );

    Ok(())
}
