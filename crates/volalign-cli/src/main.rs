use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{anyhow, Context, Result};
use burn::backend::Autodiff;
use burn::config::Config;
use burn_ndarray::NdArray;
use clap::{Args, Parser, Subcommand};
use nalgebra::Matrix4;
use tracing::info;
use tracing_subscriber::EnvFilter;
use volalign_core::transform::decompose_affine;
use volalign_io::{load_volume, write_nifti_volume, VolumeInput};
use volalign_registration::{AffineRegistration, RegistrationConfig, StageKind};

mod affine_text;

use affine_text::{format_affine, read_affine, write_affine};

type Backend = Autodiff<NdArray<f32>>;

#[derive(Parser)]
#[command(name = "volalign")]
#[command(about = "Staged multi-resolution affine registration of 3-D volumes")]
struct Cli {
    /// Log filter (e.g. warn, info, volalign_registration=debug)
    #[arg(long, global = true, env = "VOLALIGN_LOG", default_value = "warn")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a moving volume to a fixed volume
    Register(RegisterArgs),

    /// Print the rotations and translation stored in an affine text file
    Decompose {
        #[arg(long)]
        affine: PathBuf,
    },

    /// Print the default configuration as JSON
    DefaultConfig,
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long)]
    moving: PathBuf,

    #[arg(long)]
    fixed: PathBuf,

    /// Resampled moving volume, written with the fixed affine
    #[arg(long)]
    output: PathBuf,

    /// Where to store the 4×4 fixed-to-moving matrix
    #[arg(long)]
    affine_out: Option<PathBuf>,

    /// JSON configuration; the options below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated stages (center_of_mass, translation, rigid, affine)
    #[arg(long, value_delimiter = ',')]
    stages: Option<Vec<StageKind>>,

    #[arg(long, value_delimiter = ',')]
    level_iters: Option<Vec<usize>>,

    /// Smoothing per level, in voxels
    #[arg(long, value_delimiter = ',')]
    sigmas: Option<Vec<f64>>,

    #[arg(long, value_delimiter = ',')]
    factors: Option<Vec<usize>>,

    /// Histogram bins
    #[arg(long)]
    bins: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Register(args) => run_register(args),
        Commands::Decompose { affine } => run_decompose(&affine),
        Commands::DefaultConfig => {
            println!("{}", RegistrationConfig::new());
            Ok(())
        }
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level).with_context(|| format!("Invalid log level '{level}'"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn build_config(args: &RegisterArgs) -> Result<RegistrationConfig> {
    let mut config = match &args.config {
        Some(path) => RegistrationConfig::load(path)
            .map_err(|e| anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => RegistrationConfig::new(),
    };
    if let Some(stages) = &args.stages {
        config.stages = stages.clone();
    }
    if let Some(level_iters) = &args.level_iters {
        config.schedule.level_iters = level_iters.clone();
    }
    if let Some(sigmas) = &args.sigmas {
        config.schedule.sigmas = sigmas.clone();
    }
    if let Some(factors) = &args.factors {
        config.schedule.factors = factors.clone();
    }
    if let Some(bins) = args.bins {
        config.metric.num_bins = bins;
    }
    config.validate()?;
    Ok(config)
}

fn run_register(args: RegisterArgs) -> Result<()> {
    let config = build_config(&args)?;
    let device = Default::default();

    let fixed = load_volume(VolumeInput::<Backend>::Path(args.fixed.clone()), &device)?;
    let fixed_affine = fixed.affine();
    info!("Fixed volume {} with shape {:?}", args.fixed.display(), fixed.size());

    let output = AffineRegistration::new(config).execute::<Backend>(
        VolumeInput::Path(args.moving.clone()),
        VolumeInput::Image(fixed),
        &device,
    )?;

    write_nifti_volume(&args.output, &output.transformed, &fixed_affine)?;
    info!("Wrote {}", args.output.display());
    if let Some(path) = &args.affine_out {
        write_affine(path, &output.affine)?;
        info!("Wrote {}", path.display());
    }

    for report in &output.stages {
        info!(
            "{}: MI {:?} -> {:?}{}",
            report.stage,
            report.similarity_before,
            report.similarity_after,
            if report.reverted { " (reverted)" } else { "" }
        );
    }
    print_matrix(&output.affine)
}

fn run_decompose(path: &Path) -> Result<()> {
    let matrix = read_affine(path)?;
    print_matrix(&matrix)
}

fn print_matrix(matrix: &Matrix4<f64>) -> Result<()> {
    let parts = decompose_affine(matrix).ok_or_else(|| anyhow!("Matrix has a singular linear part"))?;
    let [rx, ry, rz] = parts.rotation;
    let [dx, dy, dz] = parts.rotation_degrees();
    let [tx, ty, tz] = parts.translation;

    print!("{}", format_affine(matrix));
    println!("rotation (rad): {rx:.6} {ry:.6} {rz:.6}");
    println!("rotation (deg): {dx:.3} {dy:.3} {dz:.3}");
    println!("translation:    {tx:.4} {ty:.4} {tz:.4}");
    println!("scale:          {:.4} {:.4} {:.4}", parts.scale[0], parts.scale[1], parts.scale[2]);
    println!("shear:          {:.4} {:.4} {:.4}", parts.shear[0], parts.shear[1], parts.shear[2]);
    info!(rotation = ?parts.rotation, translation = ?parts.translation, "decomposed affine");
    Ok(())
}
