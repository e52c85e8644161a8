use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use amplicon_pipeline::classifier::{ClassifierTrainer, TrainRequest};
use amplicon_pipeline::config::{ConfigLoader, ResolvedConfig};
use amplicon_pipeline::domain::Mode;
use amplicon_pipeline::engine::QiimeCli;
use amplicon_pipeline::error::PipelineError;
use amplicon_pipeline::naming::NamingScheme;
use amplicon_pipeline::output::{JsonOutput, LogOutput, OutputMode};
use amplicon_pipeline::pipeline::{Pipeline, RunReport, RunRequest};

#[derive(Parser)]
#[command(name = "ampliconpipeline")]
#[command(about = "16S rRNA amplicon analysis pipeline driving QIIME 2")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Stage paired-end reads and run the analysis")]
    Run(RunArgs),
    #[command(about = "Train a naive Bayes classifier for one primer pair")]
    TrainClassifier(TrainArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, help = "Directory containing paired *.fastq.gz read files")]
    inputdir: Utf8PathBuf,

    #[arg(long, help = "Output directory (must not exist)")]
    outdir: Utf8PathBuf,

    #[arg(long, help = "Sample metadata TSV")]
    metadata: Utf8PathBuf,

    #[arg(long, help = "Trained classifier artifact (.qza)")]
    classifier: Option<Utf8PathBuf>,

    #[arg(long, conflicts_with = "filter_only", help = "Stop after the demultiplex summary")]
    qc_only: bool,

    #[arg(long, help = "Stop after denoising and its summaries")]
    filter_only: bool,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    naming: Option<NamingScheme>,

    #[arg(long)]
    trim_left_f: Option<u32>,

    #[arg(long)]
    trim_left_r: Option<u32>,

    #[arg(long)]
    trunc_len_f: Option<u32>,

    #[arg(long)]
    trunc_len_r: Option<u32>,

    #[arg(long)]
    sampling_depth: Option<u32>,

    #[arg(long)]
    max_depth: Option<u32>,

    #[arg(long)]
    beta_group_column: Option<String>,

    #[arg(long, value_parser = parse_threads)]
    threads: Option<usize>,

    #[arg(long, help = "Print the run report as JSON")]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
struct TrainArgs {
    #[arg(short = 'i', long, help = "Reference sequences (FASTA)")]
    inputfasta: Utf8PathBuf,

    #[arg(short = 't', long, help = "Headerless reference taxonomy TSV")]
    taxonomytext: Utf8PathBuf,

    #[arg(short = 'o', long, help = "Output directory (must not exist)")]
    outdir: Utf8PathBuf,

    #[arg(short = 'f', long)]
    forward_primer: String,

    #[arg(short = 'r', long)]
    reverse_primer: String,

    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::OutputDirExists(_)
        | PipelineError::Setup(_)
        | PipelineError::MissingInput(_)
        | PipelineError::MissingClassifier
        | PipelineError::NoSamples(_) => 2,
        PipelineError::MissingTool(_)
        | PipelineError::EngineInvocation(_)
        | PipelineError::StageFailed { .. }
        | PipelineError::InvalidArtifact { .. } => 3,
        _ => 1,
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => {
            init_logging(args.verbose);
            run_pipeline(args)
        }
        Commands::TrainClassifier(args) => {
            init_logging(args.verbose);
            run_training(args)
        }
    }
}

fn run_pipeline(args: RunArgs) -> miette::Result<()> {
    let mut config = ConfigLoader::resolve(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    let engine = engine_for(&config);

    let mode = if args.qc_only {
        Mode::QualityControl
    } else if args.filter_only {
        Mode::FilteringOnly
    } else {
        Mode::Full
    };
    let request = RunRequest {
        input_dir: args.inputdir,
        output_dir: args.outdir,
        metadata: args.metadata,
        classifier: args.classifier,
        mode,
    };
    let output_mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let pipeline = Pipeline::new(engine, config);
    let report = pipeline.run(&request, &LogOutput)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&report).into_diagnostic()?,
        OutputMode::Human => print_run_summary(&report),
    }
    Ok(())
}

fn run_training(args: TrainArgs) -> miette::Result<()> {
    let config = ConfigLoader::resolve(None)?;
    let trainer = ClassifierTrainer::new(engine_for(&config));
    let request = TrainRequest {
        reference_fasta: args.inputfasta,
        reference_taxonomy: args.taxonomytext,
        outdir: args.outdir,
        forward_primer: args.forward_primer,
        reverse_primer: args.reverse_primer,
    };
    let report = trainer.train(&request, &LogOutput)?;
    if args.json {
        JsonOutput::print_training(&report).into_diagnostic()?;
    } else {
        println!("classifier: {}", report.classifier.path());
    }
    Ok(())
}

fn engine_for(config: &ResolvedConfig) -> QiimeCli {
    match &config.qiime {
        Some(program) => QiimeCli::with_program(program.clone()),
        None => QiimeCli::new(),
    }
}

fn apply_overrides(config: &mut ResolvedConfig, args: &RunArgs) {
    if let Some(naming) = args.naming {
        config.naming = naming;
    }
    if let Some(value) = args.trim_left_f {
        config.denoise.trim_left_f = value;
    }
    if let Some(value) = args.trim_left_r {
        config.denoise.trim_left_r = value;
    }
    if let Some(value) = args.trunc_len_f {
        config.denoise.trunc_len_f = value;
    }
    if let Some(value) = args.trunc_len_r {
        config.denoise.trunc_len_r = value;
    }
    if let Some(value) = args.sampling_depth {
        config.diversity.sampling_depth = value;
    }
    if let Some(value) = args.max_depth {
        config.diversity.max_depth = value;
    }
    if let Some(column) = &args.beta_group_column {
        config.diversity.beta_group_column = column.clone();
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
}

fn parse_threads(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("threads must be at least 1".to_string()),
        Ok(threads) => Ok(threads),
        Err(err) => Err(err.to_string()),
    }
}

fn print_run_summary(report: &RunReport) {
    println!("ampliconpipeline summary ({})", report.mode);
    println!("samples staged: {}", report.samples.len());
    if !report.pairing_issues.is_empty() {
        println!("pairing issues: {}", report.pairing_issues.len());
        for issue in &report.pairing_issues {
            println!("  - {issue}");
        }
    }
    for record in &report.stages {
        println!(
            "{:<14} {:>8} ms  {} file(s)",
            record.stage.as_str(),
            record.elapsed_ms,
            record.artifacts.len()
        );
    }
    println!("output: {}", report.output_dir);
}
