use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use meegbem::assemble::{
    dip_source_mat, dip_source_to_internal_pot_mat, eit_source_mat, ferguson_mat, head_mat,
    head_to_eeg_mat, head_to_internal_pot_mat, surf_source_mat, Assembled, Options,
};
use meegbem::description::load_geometry;
use meegbem::geometry::Geometry;
use meegbem::io::load_source_mesh;
use meegbem::output::{load_matrix, save_matrix};
use meegbem::sensors::{dipoles_from_matrix, points_from_matrix, Electrodes};
use meegbem::settings::{self, CliArgs, Command, Settings};

fn main() -> Result<ExitCode> {
    env_logger::init();
    let args = CliArgs::parse();
    let settings = settings::load_config(&args)?;

    let clean = run(&args.command, &settings)?;
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Runs one subcommand. `Ok(false)` flags a recoverable failure.
fn run(command: &Command, settings: &Settings) -> Result<bool> {
    let options = Options::from(settings);
    let ordering = settings.dof_ordering;

    match command {
        Command::MeshInfo { geometry } => {
            let geometry = load_geometry(geometry, ordering)?;
            println!(
                "{} unknowns ({} parameters), {} meshes, {} domains",
                geometry.dof_count(),
                geometry.nb_parameters(),
                geometry.meshes().count(),
                geometry.domains().len()
            );
            Ok(checked(&geometry))
        }
        Command::HeadMat { geometry, output } => {
            let geometry = load_geometry(geometry, ordering)?;
            if !checked(&geometry) {
                return Ok(false);
            }
            finish(settings, output, head_mat(&geometry, &options)?)
        }
        Command::SurfSourceMat {
            geometry,
            source,
            output,
        } => {
            let geometry = load_geometry(geometry, ordering)?;
            if !checked(&geometry) {
                return Ok(false);
            }
            let source = load_source_mesh(source, "source")?;
            finish(settings, output, surf_source_mat(&geometry, &source, &options)?)
        }
        Command::DipSourceMat {
            geometry,
            dipoles,
            output,
            domain,
        } => {
            let geometry = load_geometry(geometry, ordering)?;
            if !checked(&geometry) {
                return Ok(false);
            }
            let dipoles = dipoles_from_matrix(&read_table(dipoles)?)?;
            let result = dip_source_mat(&geometry, &dipoles, domain.domain.as_deref(), &options)?;
            finish(settings, output, result)
        }
        Command::EitSourceMat {
            geometry,
            electrodes,
            output,
            radius,
        } => {
            let geometry = load_geometry(geometry, ordering)?;
            if !checked(&geometry) {
                return Ok(false);
            }
            let positions = points_from_matrix(&read_table(electrodes)?)?;
            let electrodes = Electrodes::on_outermost_interface(&geometry, &positions, *radius)?;
            finish(settings, output, eit_source_mat(&geometry, &electrodes, &options)?)
        }
        Command::Head2EegMat {
            geometry,
            electrodes,
            output,
        } => {
            let geometry = load_geometry(geometry, ordering)?;
            let positions = points_from_matrix(&read_table(electrodes)?)?;
            finish(settings, output, head_to_eeg_mat(&geometry, &positions)?)
        }
        Command::Head2InternalPotMat {
            geometry,
            points,
            output,
        } => {
            let geometry = load_geometry(geometry, ordering)?;
            let points = points_from_matrix(&read_table(points)?)?;
            finish(settings, output, head_to_internal_pot_mat(&geometry, &points, &options)?)
        }
        Command::DipSourceInternalPot {
            geometry,
            dipoles,
            points,
            output,
            domain,
        } => {
            let geometry = load_geometry(geometry, ordering)?;
            let dipoles = dipoles_from_matrix(&read_table(dipoles)?)?;
            let points = points_from_matrix(&read_table(points)?)?;
            let result = dip_source_to_internal_pot_mat(
                &geometry,
                &dipoles,
                &points,
                domain.domain.as_deref(),
            )?;
            finish(settings, output, result)
        }
        Command::Ferguson {
            geometry,
            sensors,
            output,
        } => {
            let geometry = load_geometry(geometry, ordering)?;
            let points = points_from_matrix(&read_table(sensors)?)?;
            finish(settings, output, ferguson_mat(&geometry, &points, &options)?)
        }
    }
}

fn read_table(path: &Path) -> Result<ndarray::Array2<f64>> {
    load_matrix(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Logs the problems found by [`Geometry::self_check`].
fn checked(geometry: &Geometry) -> bool {
    let problems = geometry.self_check();
    for problem in &problems {
        log::error!("{}", problem);
        eprintln!("Error: {}", problem);
    }
    problems.is_empty()
}

/// Saves the matrix, and the report next to it when something was dropped.
fn finish(settings: &Settings, output: &Path, assembled: Assembled) -> Result<bool> {
    let path = settings.output_path(output);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    save_matrix(&path, &assembled.matrix)?;
    log::info!(
        "wrote {}x{} matrix to {}",
        assembled.matrix.nrows(),
        assembled.matrix.ncols(),
        path.display()
    );

    let clean = assembled.report.is_clean();
    if !clean {
        let report = path.with_extension("report.json");
        assembled.report.write_json(&report)?;
        eprintln!("Some sources or points were skipped, see {}", report.display());
    }
    Ok(clean)
}
