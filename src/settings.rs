use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::geometry::DofOrdering;


/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub gauss_order: usize,
    #[serde(default)]
    pub adaptive: bool,
    #[serde(default)]
    pub dof_ordering: DofOrdering,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub progress: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Settings {
    /// Resolves a relative output path against `output_dir`.
    pub fn output_path(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("Error loading configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads `config/local.toml` (or `config/default.toml`), then `MEEGBEM_*` environment
/// variables, then the command-line overrides in `args`.
pub fn load_config(args: &CliArgs) -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    let config_file = if local_config.exists() {
        log::info!("Using local configuration: {:?}", local_config);
        local_config
    } else {
        log::info!("Using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let settings = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(Environment::with_prefix("MEEGBEM"))
        .build()
        .context("Error loading configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    apply_overrides(&mut config, args);
    validate_config(&config)?;

    log::debug!("{:#?}", config);

    Ok(config)
}

fn apply_overrides(config: &mut Settings, args: &CliArgs) {
    if let Some(order) = args.order {
        config.gauss_order = order;
    }
    if args.adaptive {
        config.adaptive = true;
    }
    if args.legacy {
        config.dof_ordering = DofOrdering::Legacy;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if args.progress {
        config.progress = true;
    }
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the MEEGBEM_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("MEEGBEM_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("Failed to get current executable path")?;
    let mut current_dir = exe_path
        .parent()
        .ok_or_else(|| anyhow!("Failed to get executable directory"))?;
    loop {
        if current_dir.join("config").is_dir() {
            return Ok(current_dir.to_path_buf());
        }
        match current_dir.parent() {
            Some(parent) => current_dir = parent,
            None => bail!("Could not find project root directory"),
        }
    }
}

fn validate_config(config: &Settings) -> Result<()> {
    if config.gauss_order == 0 {
        bail!("Gauss order must be at least 1");
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "MEEGBEM - symmetric BEM operators for EEG, MEG and EIT")]
pub struct CliArgs {
    /// Order of the Gauss rule on triangles (1 to 5; higher orders use the 5th).
    #[arg(short, long, global = true)]
    order: Option<usize>,

    /// Refine dipole source integrals adaptively.
    #[arg(long, global = true)]
    adaptive: bool,

    /// Number unknowns mesh by mesh instead of all vertices first.
    #[arg(long, global = true)]
    legacy: bool,

    /// Directory receiving relative output paths.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Show progress bars.
    #[arg(short, long, global = true)]
    progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Symmetric head matrix over all unknowns.
    HeadMat {
        /// Geometry description (TOML).
        geometry: PathBuf,
        /// Output matrix (`.bin` for binary, text otherwise).
        output: PathBuf,
    },

    /// Source matrix of a distributed surface source.
    SurfSourceMat {
        geometry: PathBuf,
        /// Source surface mesh.
        source: PathBuf,
        output: PathBuf,
    },

    /// Source matrix of current dipoles.
    DipSourceMat {
        geometry: PathBuf,
        /// Dipole file with rows `x y z qx qy qz`.
        dipoles: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        domain: DomainArg,
    },

    /// Current injection matrix of EIT electrodes.
    EitSourceMat {
        geometry: PathBuf,
        /// Electrode positions, rows `x y z`.
        electrodes: PathBuf,
        output: PathBuf,
        /// Electrode radius; point-like electrodes when omitted.
        #[arg(long)]
        radius: Option<f64>,
    },

    /// Interpolation of the unknowns at EEG electrodes on the outermost interface.
    #[command(name = "head2-eeg-mat")]
    Head2EegMat {
        geometry: PathBuf,
        /// Electrode positions, rows `x y z`.
        electrodes: PathBuf,
        output: PathBuf,
    },

    /// Potentials at internal points from the unknowns.
    #[command(name = "head2-internal-pot-mat")]
    Head2InternalPotMat {
        geometry: PathBuf,
        /// Internal points, rows `x y z`.
        points: PathBuf,
        output: PathBuf,
    },

    /// Infinite-medium dipole potentials at internal points.
    DipSourceInternalPot {
        geometry: PathBuf,
        dipoles: PathBuf,
        /// Internal points, rows `x y z`.
        points: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        domain: DomainArg,
    },

    /// Ferguson matrix mapping surface potentials to magnetic fields.
    Ferguson {
        geometry: PathBuf,
        /// Magnetometer positions, rows `x y z`.
        sensors: PathBuf,
        output: PathBuf,
    },

    /// Print a summary of a geometry and check its meshes.
    MeshInfo { geometry: PathBuf },
}

#[derive(Args, Debug, Clone)]
pub struct DomainArg {
    /// Attribute every dipole to this domain instead of locating it.
    #[arg(long)]
    pub domain: Option<String>,
}
