use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::LevelFilter;

use ref86::harness::{self, Config, Summary};
use ref86::vm::CpuType;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Cpu {
    #[value(name = "8086")]
    I8086,
    #[value(name = "80186")]
    I80186,
}

impl From<Cpu> for CpuType {
    fn from(cpu: Cpu) -> Self {
        match cpu {
            Cpu::I8086 => CpuType::Intel8086,
            Cpu::I80186 => CpuType::Intel80186,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ref86", about = "8086/80186 reference model test-vector runner")]
struct CLI {
    /// Vector files (*.json, *.json.gz) or directories holding them
    #[arg(required = true)]
    vectors: Vec<PathBuf>,
    /// Processor model to emulate
    #[arg(long, value_enum, default_value = "80186")]
    cpu: Cpu,
    /// Only run cases whose name contains this text
    #[arg(long)]
    filter: Option<String>,
    /// Stop at the first failing case
    #[arg(long)]
    stop_on_fail: bool,
    /// Log every decoded instruction (same as RUST_LOG=trace)
    #[arg(short, long)]
    verbose: bool,
}

fn is_vector_file(path: &Path) -> bool {
    let name = path.file_name().map(|name| name.to_string_lossy().to_lowercase());
    name.is_some_and(|name| name.ends_with(".json") || name.ends_with(".json.gz"))
}

/// Expands directories into their vector files, sorted by name.
fn collect_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let entries = std::fs::read_dir(input)
                .with_context(|| format!("failed to list {}", input.display()))?;
            let mut found: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| is_vector_file(path))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn run(args: &CLI) -> Result<Summary> {
    let config = Config {
        cpu: args.cpu.into(),
        filter: args.filter.clone(),
        stop_on_fail: args.stop_on_fail,
    };

    let mut total = Summary::default();
    for path in collect_files(&args.vectors)? {
        let summary = harness::run_file(&path, &config)?;
        println!("{}: {}", path.display(), summary);
        let failed = !summary.is_success();
        total.merge(summary);
        if failed && config.stop_on_fail {
            break;
        }
    }
    Ok(total)
}

fn main() -> Result<ExitCode> {
    let args = CLI::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(LevelFilter::Trace);
    }
    logger.init();

    let summary = run(&args)?;
    for failure in &summary.failures {
        eprintln!("  {}", failure);
    }
    println!("total: {}", summary);

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
