use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use loci_metrics::{FillStatesTracer, Metric, Modality, NiftiSource, RoiDefinition};
use loci_normalize::NormalizationMode;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod batch;
mod runner;
mod settings;

use batch::{run_batch, BatchRequest};
use runner::{Backend, DecouplingReport, Job, Runner};
use settings::Settings;

#[derive(Parser)]
#[command(name = "loci", version)]
#[command(about = "PET spatial normalization and amyloid/tau quantification")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Input volume, or directory with --batch
    #[arg(long)]
    input: PathBuf,

    /// Output volume, or directory with --batch
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose logging and intermediate volumes
    #[arg(long)]
    debug: bool,

    /// Process every .nii/.nii.gz in the input directory
    #[arg(long)]
    batch: bool,

    /// Repeat rigid alignment until the origin settles
    #[arg(short = 'i', long)]
    iterative: bool,

    /// Skip rigid alignment; the input already covers the template field of view
    #[arg(short = 'm', long)]
    manual_fov: bool,
}

#[derive(Args, Debug, Clone)]
struct MetricArgs {
    /// Print the underlying SUVr
    #[arg(long)]
    suvr: bool,

    /// Input is already in template space
    #[arg(long)]
    skip_normalization: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Spatially normalize to the template
    Normalize {
        #[command(flatten)]
        common: CommonArgs,
        /// Write the rigid volume on the ADNI PET core grid, scaled by cerebral gray
        #[arg(long = "adni-pet-core")]
        adni_pet_core: bool,
    },
    Centiloid {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        metric: MetricArgs,
    },
    Centaur {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        metric: MetricArgs,
    },
    Centaurz {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        metric: MetricArgs,
    },
    /// SUVr of a custom target/reference pair (mask keys or paths)
    Suvr {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        voi_mask: String,
        #[arg(long)]
        ref_mask: String,
        #[arg(long)]
        skip_normalization: bool,
    },
    /// Voxelwise abnormality proportion against a normative template
    #[command(name = "fillstates")]
    FillStates {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        metric: MetricArgs,
        /// fbp, fdg or ftp
        #[arg(long)]
        tracer: FillStatesTracer,
    },
    /// Separate the AD-related component with the decomposition ensemble
    Decouple {
        #[command(flatten)]
        common: CommonArgs,
        /// abeta or tau
        #[arg(long)]
        modality: Modality,
        #[arg(long)]
        skip_normalization: bool,
    },
}

/// What a subcommand asks of the runner.
#[derive(Debug, Default)]
struct Plan {
    metrics: Vec<Metric>,
    skip_normalization: bool,
    print_suvr: bool,
    adni_style: bool,
    decouple: Option<Modality>,
}

impl Plan {
    fn metric(metric: Metric, args: &MetricArgs) -> Self {
        Self {
            metrics: vec![metric],
            skip_normalization: args.skip_normalization,
            print_suvr: args.suvr,
            ..Self::default()
        }
    }
}

impl Command {
    fn common(&self) -> &CommonArgs {
        match self {
            Command::Normalize { common, .. }
            | Command::Decouple { common, .. }
            | Command::Centiloid { common, .. }
            | Command::Centaur { common, .. }
            | Command::Centaurz { common, .. }
            | Command::Suvr { common, .. }
            | Command::FillStates { common, .. } => common,
        }
    }

    fn plan(&self) -> Plan {
        match self {
            Command::Normalize { adni_pet_core, .. } => Plan {
                adni_style: *adni_pet_core,
                ..Plan::default()
            },
            Command::Decouple {
                modality,
                skip_normalization,
                ..
            } => Plan {
                skip_normalization: *skip_normalization,
                decouple: Some(*modality),
                ..Plan::default()
            },
            Command::Centiloid { metric, .. } => Plan::metric(Metric::Centiloid, metric),
            Command::Centaur { metric, .. } => Plan::metric(Metric::CenTauR, metric),
            Command::Centaurz { metric, .. } => Plan::metric(Metric::CenTauRz, metric),
            Command::Suvr {
                voi_mask,
                ref_mask,
                skip_normalization,
                ..
            } => Plan {
                metrics: vec![Metric::CustomSuvr(RoiDefinition::new("CustomSUVr", voi_mask, ref_mask))],
                skip_normalization: *skip_normalization,
                print_suvr: true,
                ..Plan::default()
            },
            Command::FillStates { metric, tracer, .. } => Plan::metric(Metric::FillStates(*tracer), metric),
        }
    }

    /// Subcommands whose result is a volume need somewhere to put it.
    fn requires_output(&self) -> bool {
        matches!(self, Command::Normalize { .. } | Command::Decouple { .. })
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let common = cli.command.common().clone();
    init_logging(common.debug);

    let settings = Settings::load(&common.config)?;
    let plan = cli.command.plan();
    let job = Job {
        metrics: plan.metrics,
        mode: NormalizationMode::from_flags(
            common.iterative,
            common.manual_fov,
            settings.normalization.max_iterations,
            settings.normalization.convergence_threshold_mm,
        ),
        skip_normalization: plan.skip_normalization,
        debug: common.debug,
        adni_style: plan.adni_style,
        decouple: plan.decouple,
    };
    let source = Arc::new(NiftiSource::<Backend>::new(Default::default()));

    if common.batch {
        let Some(output_dir) = common.output.as_deref() else {
            bail!("--output is required with --batch");
        };
        let request = BatchRequest {
            input_dir: &common.input,
            output_dir,
            config_path: &common.config,
            command_line: std::env::args().collect::<Vec<_>>().join(" "),
        };
        let summary = run_batch(&request, &settings, &job, source)?;
        println!("Success: {}, Failed: {}", summary.processed, summary.failed);
        return Ok(if summary.failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    if cli.command.requires_output() && common.output.is_none() {
        bail!("--output is required for this command");
    }
    run_single(&settings, job, source, &common.input, common.output.as_deref(), plan.print_suvr)
}

fn run_single(
    settings: &Settings,
    job: Job,
    source: Arc<NiftiSource<Backend>>,
    input: &Path,
    output: Option<&Path>,
    print_suvr: bool,
) -> Result<ExitCode> {
    let runner = Runner::new(settings, job, source)?;
    info!(input = %input.display(), "processing");
    let report = runner.process(input, output)?;

    for result in &report.results {
        println!("\n=== {} Results ===", result.metric_name);
        for (label, value) in &result.values {
            println!("{}: {}", label, value);
        }
        if let (true, Some(ratio)) = (print_suvr, result.ratio) {
            println!("SUVr: {}", ratio);
        }
    }
    if let Some(decoupled) = &report.decoupled {
        print_decoupling(decoupled);
    }
    if report.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        for failure in &report.failures {
            eprintln!("error: {}", failure);
        }
        Ok(ExitCode::FAILURE)
    }
}

fn print_decoupling(report: &DecouplingReport) {
    println!("\n=== Decoupling Results ({}) ===", report.modality);
    println!("AI can make mistakes, please double check the results.");
    println!("AD probability: {}%", report.ad_probability * 100.0);
    if report.adad_values.is_empty() {
        println!("ADAD score: {}", report.adad_score);
    } else {
        for (tracer, value) in &report.adad_values {
            println!("{}: {}", tracer, value);
        }
    }
}
