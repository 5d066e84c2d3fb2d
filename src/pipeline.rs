use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use tracing::{info, warn};

use crate::{
    assembler::assemble,
    basis::ElementBasis,
    config::Config,
    datatypes::{Mesh, Pslg},
    error::ChladniError,
    geometry::load_poly,
    mesher::{triangulate, triangulator_from_name, Triangulator},
    post_processor::{csv_output, export_matrices, ResultBuffer, ResultSlot},
    reducer::reduce,
    solver::{solve, Backend, SymmetricGeneralizedEigensolver},
};

/// The mesh of a recompute together with the buffer it published
#[derive(Debug, Clone)]
pub struct Solution {
    pub mesh: Mesh,
    pub buffer: Arc<ResultBuffer>,
}

/// Geometry to eigenmodes. Every recompute starts from scratch; a failed
/// recompute leaves the last published buffer in the slot.
pub struct Pipeline {
    config: Config,
    backend: Backend,
    solver: Box<dyn SymmetricGeneralizedEigensolver>,
    triangulator: Box<dyn Triangulator>,
    max_modes: Option<usize>,
    export_path: Option<PathBuf>,
    slot: ResultSlot,
}

impl Pipeline {
    /// Resolves the backend and triangulator named by the config
    pub fn new(config: Config) -> Result<Pipeline, ChladniError> {
        config.mesh.validate()?;
        let backend = Backend::from_name(&config.backend)?;
        let triangulator = triangulator_from_name(
            &config.triangulator,
            &config.triangle_program,
            config.max_steiner_points,
        )?;

        Ok(Pipeline {
            solver: backend.solver(),
            backend,
            triangulator,
            config,
            max_modes: None,
            export_path: None,
            slot: ResultSlot::new(),
        })
    }

    /// Publish at most `max_modes` of the lowest modes
    pub fn with_max_modes(mut self, max_modes: Option<usize>) -> Pipeline {
        self.max_modes = max_modes;
        self
    }

    /// Dump the reduced matrices to `path` on every recompute
    pub fn with_matrix_export(mut self, path: Option<PathBuf>) -> Pipeline {
        self.export_path = path;
        self
    }

    pub fn with_triangulator(mut self, triangulator: Box<dyn Triangulator>) -> Pipeline {
        self.triangulator = triangulator;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Runs every stage on `pslg` and publishes the result
    ///
    /// # Arguments
    /// * `pslg` - The plate geometry
    ///
    /// # Returns
    /// The mesh and the newly published buffer
    pub fn recompute(&self, pslg: &Pslg) -> Result<Solution, ChladniError> {
        let start = Instant::now();

        let mesh = triangulate(pslg, &self.config.mesh, self.triangulator.as_ref())?;
        let basis = ElementBasis::cached(mesh.order);
        let system = assemble(&mesh, basis, self.config.elastic_support)?;
        let reduced = reduce(system, &mesh);

        if let Some(path) = &self.export_path {
            export_matrices(&reduced.stiffness, &reduced.mass, path)?;
        }

        let result = solve(&reduced, self.solver.as_ref())?;
        let buffer = self
            .slot
            .publish(ResultBuffer::from_result(&mesh, &result, self.max_modes));

        info!(
            "published {} modes over {} vertices in {:.3} seconds",
            buffer.num_modes,
            buffer.num_vertices,
            start.elapsed().as_secs_f32()
        );

        Ok(Solution { mesh, buffer })
    }

    /// The most recently published buffer, if any recompute has succeeded
    pub fn latest(&self) -> Option<Arc<ResultBuffer>> {
        self.slot.latest()
    }
}

/// Loads a `.poly` file, computes its eigenmodes and writes the CSV output
///
/// # Arguments
/// * `geometry_path` - Path to the `.poly` geometry
/// * `pipeline` - The configured pipeline
/// * `output_dir` - Directory for the CSV files
pub fn run(
    geometry_path: &str,
    pipeline: &Pipeline,
    output_dir: &Path,
) -> Result<Solution, ChladniError> {
    let pslg = load_poly(geometry_path)?;

    let solution = match pipeline.recompute(&pslg) {
        Ok(s) => s,
        Err(err) => {
            if err.is_recoverable() {
                warn!("recompute failed, fix the geometry or mesh parameters and retry");
            }
            return Err(err);
        }
    };

    csv_output(&solution.buffer, &solution.mesh, output_dir)?;
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datatypes::{ElementOrder, Vertex},
        mesher::MeshOptions,
    };

    fn linear_config() -> Config {
        Config {
            mesh: MeshOptions {
                max_area: 0.1,
                order: ElementOrder::Linear,
                ..MeshOptions::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn unknown_backend_fails_at_configuration() {
        let config = Config {
            backend: "lapack-gpu".to_owned(),
            ..Config::default()
        };
        assert!(matches!(
            Pipeline::new(config),
            Err(ChladniError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn unknown_triangulator_is_an_input_error() {
        let config = Config {
            triangulator: "voronoi".to_owned(),
            ..Config::default()
        };
        assert!(matches!(Pipeline::new(config), Err(ChladniError::Input(_))));
    }

    #[test]
    fn nothing_is_published_before_a_recompute() {
        let pipeline = Pipeline::new(linear_config()).unwrap();
        assert!(pipeline.latest().is_none());
        assert_eq!(pipeline.backend(), Backend::Cholesky);
    }

    #[test]
    fn recompute_publishes_the_buffer() {
        let mut pslg = Pslg::new();
        pslg.add_polygon(&[
            Vertex::new(0.0, 0.0),
            Vertex::new(1.0, 0.0),
            Vertex::new(1.0, 1.0),
            Vertex::new(0.0, 1.0),
        ])
        .unwrap();

        let pipeline = Pipeline::new(linear_config())
            .unwrap()
            .with_max_modes(Some(3));
        let solution = pipeline.recompute(&pslg).unwrap();

        assert_eq!(solution.buffer.num_modes, 3);
        assert_eq!(solution.buffer.num_vertices, solution.mesh.vertices.len());
        let latest = pipeline.latest().unwrap();
        assert!(Arc::ptr_eq(&latest, &solution.buffer));
    }
}
