use clap::{Parser, ValueEnum};
use kakehashi::prelude::*;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// CLI spelling of the platforms.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlatformCli {
    Iflytek,
    Dify,
    Coze,
    Unified,
}

impl From<PlatformCli> for Platform {
    fn from(value: PlatformCli) -> Self {
        match value {
            PlatformCli::Iflytek => Platform::IFlytek,
            PlatformCli::Dify => Platform::Dify,
            PlatformCli::Coze => Platform::Coze,
            PlatformCli::Unified => Platform::Unified,
        }
    }
}

/// Converts agent workflows between iFlytek Spark, Dify and Coze
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// A workflow file, or a directory of workflow files
    input: PathBuf,

    /// Target platform
    #[arg(short, long, value_enum)]
    to: PlatformCli,

    /// Source platform; detected from each file when omitted
    #[arg(short, long, value_enum)]
    from: Option<PlatformCli>,

    /// Output file, or output directory in batch mode
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for generated ids
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// First counter id for counter-based platforms
    #[arg(long)]
    counter_base: Option<u64>,

    /// Millisecond base for timestamp ids instead of the clock
    #[arg(long)]
    timestamp_base: Option<u64>,

    /// Random id attempts before the nanosecond fallback
    #[arg(long, default_value_t = 100)]
    max_attempts: u32,

    /// Write a ZIP archive where the target platform exports one
    #[arg(long)]
    archive: bool,

    /// Also write the unified IR next to each output
    #[arg(long)]
    emit_ir: bool,
}

struct Job {
    input: PathBuf,
    output: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let to: Platform = cli.to.into();
    let mut builder = Converter::builder(cli.from.map(Platform::from), to)
        .with_seed(cli.seed)
        .with_max_attempts(cli.max_attempts)
        .with_archive(cli.archive);
    if let Some(base) = cli.counter_base {
        builder = builder.with_counter_base(base);
    }
    if let Some(base) = cli.timestamp_base {
        builder = builder.with_timestamp_base(base);
    }
    let converter = builder.build();

    let total_start = Instant::now();
    let jobs = plan_jobs(&cli, to);
    if jobs.is_empty() {
        exit_with_error(&format!("No workflow files found in '{}'", cli.input.display()));
    }

    let failures: Vec<(PathBuf, String)> = jobs
        .par_iter()
        .filter_map(|job| {
            run_job(&converter, job, cli.emit_ir)
                .err()
                .map(|e| (job.input.clone(), e))
        })
        .collect();

    println!("\n--- Conversion Summary ---");
    println!("Target Platform:  {}", to);
    println!("Files:            {}", jobs.len());
    println!("Converted:        {}", jobs.len() - failures.len());
    println!("Failed:           {}", failures.len());
    println!("Total Time:       {:?}", total_start.elapsed());
    for (path, error) in &failures {
        eprintln!("  {}: {}", path.display(), error);
    }
    if !failures.is_empty() {
        std::process::exit(1);
    }
}

/// One job per input file. Directories convert every regular file inside.
fn plan_jobs(cli: &Cli, to: Platform) -> Vec<Job> {
    if !cli.input.is_dir() {
        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| output_name(&cli.input, to, cli.archive));
        return vec![Job {
            input: cli.input.clone(),
            output,
        }];
    }

    let out_dir = cli.output.clone().unwrap_or_else(|| cli.input.join(to.name()));
    if let Err(e) = fs::create_dir_all(&out_dir) {
        exit_with_error(&format!("Failed to create '{}': {}", out_dir.display(), e));
    }
    let entries = fs::read_dir(&cli.input).unwrap_or_else(|e| {
        exit_with_error(&format!("Failed to read directory '{}': {}", cli.input.display(), e))
    });
    let mut jobs: Vec<Job> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .map(|input| {
            let file = output_name(&input, to, cli.archive);
            let output = out_dir.join(file.file_name().unwrap_or(file.as_os_str()));
            Job { input, output }
        })
        .collect();
    jobs.sort_by(|a, b| a.input.cmp(&b.input));
    jobs
}

fn output_name(input: &Path, to: Platform, archive: bool) -> PathBuf {
    let extension = if archive && to == Platform::Coze {
        "zip"
    } else {
        "yaml"
    };
    input.with_extension(format!("{}.{}", to.name(), extension))
}

fn run_job(converter: &Converter, job: &Job, emit_ir: bool) -> Result<(), String> {
    let start = Instant::now();
    let bytes = fs::read(&job.input).map_err(|e| format!("read failed: {}", e))?;
    let dsl = converter.parse(&bytes).map_err(|e| e.to_string())?;

    if emit_ir {
        let ir = dsl.to_yaml().map_err(|e| format!("IR dump failed: {}", e))?;
        let ir_path = job.output.with_extension("ir.yaml");
        fs::write(&ir_path, ir).map_err(|e| format!("write failed: {}", e))?;
    }

    let output = converter.generate(&dsl).map_err(|e| e.to_string())?;
    fs::write(&job.output, output).map_err(|e| format!("write failed: {}", e))?;
    tracing::info!(
        input = %job.input.display(),
        output = %job.output.display(),
        elapsed = ?start.elapsed(),
        "converted"
    );
    Ok(())
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
