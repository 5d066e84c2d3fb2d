use std::path::PathBuf;

use chladni::{
    config::{load_config, Config},
    datatypes::ElementOrder,
    pipeline::{self, Pipeline},
    ChladniError,
};
use clap::Parser;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "chladni")]
#[command(about = "Computes the vibration modes of a 2D plate")]
struct Args {
    /// Plate geometry in Triangle's .poly format
    geometry: String,

    /// JSON input file with a metadata object
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum triangle area, 0 disables the limit
    #[arg(long)]
    max_area: Option<f64>,

    /// Minimum triangle angle in degrees, 0 disables quality refinement
    #[arg(long)]
    min_angle: Option<f64>,

    /// Use 3 node linear elements instead of 6 node quadratic ones
    #[arg(long, overrides_with = "quadratic")]
    linear: bool,

    /// Use 6 node quadratic elements
    #[arg(long, overrides_with = "linear")]
    quadratic: bool,

    /// Ask for a conforming Delaunay mesh
    #[arg(long, overrides_with = "no_delaunay")]
    delaunay: bool,

    #[arg(long, overrides_with = "delaunay")]
    no_delaunay: bool,

    /// Triangulate the convex hull of the points
    #[arg(long, overrides_with = "no_convex_hull")]
    convex_hull: bool,

    #[arg(long, overrides_with = "convex_hull")]
    no_convex_hull: bool,

    /// Elastically support ordinary boundary edges
    #[arg(long, overrides_with = "no_elastic_support")]
    elastic_support: bool,

    #[arg(long, overrides_with = "elastic_support")]
    no_elastic_support: bool,

    /// Eigensolver backend, cholesky or spectral
    #[arg(long)]
    backend: Option<String>,

    /// Triangulator, delaunay or triangle
    #[arg(long)]
    triangulator: Option<String>,

    /// Directory for nodes.csv, elements.csv and eigenvalues.csv
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Number of modes to write, all by default
    #[arg(short, long)]
    modes: Option<usize>,

    /// Also dump the reduced stiffness and mass matrices to this file
    #[arg(long)]
    export_matrices: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

/// `Some` when one of a `--flag` / `--no-flag` pair was given
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl Args {
    /// Command line flags take precedence over the input file
    fn apply(&self, mut config: Config) -> Config {
        if let Some(max_area) = self.max_area {
            config.mesh.max_area = max_area;
        }
        if let Some(min_angle) = self.min_angle {
            config.mesh.min_angle = min_angle;
        }
        if let Some(linear) = switch(self.linear, self.quadratic) {
            config.mesh.order = if linear {
                ElementOrder::Linear
            } else {
                ElementOrder::Quadratic
            };
        }
        if let Some(delaunay) = switch(self.delaunay, self.no_delaunay) {
            config.mesh.delaunay = delaunay;
        }
        if let Some(convex_hull) = switch(self.convex_hull, self.no_convex_hull) {
            config.mesh.convex_hull = convex_hull;
        }
        if let Some(elastic_support) = switch(self.elastic_support, self.no_elastic_support) {
            config.elastic_support = elastic_support;
        }
        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        if let Some(triangulator) = &self.triangulator {
            config.triangulator = triangulator.clone();
        }
        config
    }
}

fn execute(args: &Args) -> Result<(), ChladniError> {
    let config = match &args.input {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let pipeline = Pipeline::new(args.apply(config))?
        .with_max_modes(args.modes)
        .with_matrix_export(args.export_matrices.clone());

    let solution = pipeline::run(&args.geometry, &pipeline, &args.output_dir)?;

    for k in 0..solution.buffer.num_modes.min(10) {
        if let Some(frequency) = solution.buffer.frequency(k) {
            info!(
                "mode {k}: eigenvalue {:.6}, frequency {:.6}",
                solution.buffer.eigenvalues[k], frequency
            );
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(err) = execute(&args) {
        error!("{err}");
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chladni::config::parse_config;

    fn file_config() -> Config {
        parse_config(
            r#"{ "metadata": { "quadratic": false, "delaunay": true,
                 "convex_hull": true, "elastic_support": true } }"#,
        )
        .unwrap()
    }

    #[test]
    fn no_flags_keep_the_file_values() {
        let args = Args::parse_from(["chladni", "plate.poly"]);
        assert_eq!(args.apply(file_config()), file_config());
    }

    #[test]
    fn negated_flags_switch_file_values_off() {
        let args = Args::parse_from([
            "chladni",
            "plate.poly",
            "--quadratic",
            "--no-delaunay",
            "--no-convex-hull",
            "--no-elastic-support",
        ]);
        let config = args.apply(file_config());

        assert_eq!(config.mesh.order, ElementOrder::Quadratic);
        assert!(!config.mesh.delaunay);
        assert!(!config.mesh.convex_hull);
        assert!(!config.elastic_support);
    }

    #[test]
    fn last_of_a_flag_pair_wins() {
        let args = Args::parse_from(["chladni", "plate.poly", "--no-delaunay", "--delaunay"]);
        assert!(args.apply(Config::default()).mesh.delaunay);

        let args = Args::parse_from(["chladni", "plate.poly", "--linear", "--max-area", "0.5"]);
        let config = args.apply(Config::default());
        assert_eq!(config.mesh.order, ElementOrder::Linear);
        assert_eq!(config.mesh.max_area, 0.5);
    }
}
