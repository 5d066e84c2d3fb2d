use nalgebra::{linalg::SymmetricEigen, DMatrix, DVector};
use tracing::{debug, info};

use crate::{error::ChladniError, reducer::ReducedSystem};

/// Eigenvector value written at eliminated (fixed) nodes
pub const FIXED_NODE_VALUE: f64 = 0.0;

/// Relative threshold below which a mass eigenvalue counts as zero
const MASS_SINGULARITY_TOL: f64 = 1e-12;

/// Dense solver for `S v = λ M v` with `S` symmetric and `M` symmetric
/// positive definite.
///
/// Implementations return the eigenvalues in any order together with the
/// matching eigenvectors as columns, normalized so that `Vᵀ M V = I`.
pub trait SymmetricGeneralizedEigensolver {
    fn name(&self) -> &'static str;

    fn eigenpairs(
        &self,
        stiffness: &DMatrix<f64>,
        mass: &DMatrix<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>), ChladniError>;
}

fn symmetrize(matrix: DMatrix<f64>) -> DMatrix<f64> {
    (&matrix + matrix.transpose()) * 0.5
}

/// Reduces to a standard problem with the Cholesky factor of the mass matrix
#[derive(Debug, Clone, Copy, Default)]
pub struct CholeskySolver;

impl SymmetricGeneralizedEigensolver for CholeskySolver {
    fn name(&self) -> &'static str {
        "cholesky"
    }

    fn eigenpairs(
        &self,
        stiffness: &DMatrix<f64>,
        mass: &DMatrix<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>), ChladniError> {
        let chol = match mass.clone().cholesky() {
            Some(c) => c,
            None => {
                return Err(ChladniError::Solver(
                    "Mass matrix is not positive definite".to_owned(),
                ))
            }
        };
        let l = chol.l();

        // C = L⁻¹ S L⁻ᵀ, built from two triangular solves
        let half = match l.solve_lower_triangular(stiffness) {
            Some(x) => x,
            None => {
                return Err(ChladniError::Solver(
                    "Singular Cholesky factor of the mass matrix".to_owned(),
                ))
            }
        };
        let reduced = match l.solve_lower_triangular(&half.transpose()) {
            Some(x) => x,
            None => {
                return Err(ChladniError::Solver(
                    "Singular Cholesky factor of the mass matrix".to_owned(),
                ))
            }
        };

        let eig = SymmetricEigen::new(symmetrize(reduced));

        // v = L⁻ᵀ y
        let vectors = match l.transpose().solve_upper_triangular(&eig.eigenvectors) {
            Some(v) => v,
            None => {
                return Err(ChladniError::Solver(
                    "Failed to back-substitute eigenvectors".to_owned(),
                ))
            }
        };

        Ok((eig.eigenvalues, vectors))
    }
}

/// Whitens the problem with the inverse square root of the mass matrix
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralSolver;

impl SymmetricGeneralizedEigensolver for SpectralSolver {
    fn name(&self) -> &'static str {
        "spectral"
    }

    fn eigenpairs(
        &self,
        stiffness: &DMatrix<f64>,
        mass: &DMatrix<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>), ChladniError> {
        let mass_eig = SymmetricEigen::new(symmetrize(mass.clone()));
        let largest = mass_eig.eigenvalues.max();
        let smallest = mass_eig.eigenvalues.min();

        if !(largest > 0.0) || smallest <= MASS_SINGULARITY_TOL * largest {
            return Err(ChladniError::Solver(format!(
                "Mass matrix is not positive definite (eigenvalues in [{smallest:e}, {largest:e}])"
            )));
        }

        // W = Q D^-1/2 Qᵀ
        let q = &mass_eig.eigenvectors;
        let inv_sqrt = DMatrix::from_diagonal(&mass_eig.eigenvalues.map(|d| 1.0 / d.sqrt()));
        let w = q * inv_sqrt * q.transpose();

        let eig = SymmetricEigen::new(symmetrize(&w * stiffness * &w));
        let vectors = &w * eig.eigenvectors;

        Ok((eig.eigenvalues, vectors))
    }
}

/// Eigensolver backends that can be selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Cholesky,
    Spectral,
}

impl Backend {
    pub const NAMES: [&'static str; 2] = ["cholesky", "spectral"];

    /// Looks up a backend by its configuration name
    pub fn from_name(name: &str) -> Result<Backend, ChladniError> {
        match name.to_lowercase().as_str() {
            "cholesky" => Ok(Backend::Cholesky),
            "spectral" => Ok(Backend::Spectral),
            _ => Err(ChladniError::BackendUnavailable(format!(
                "no eigensolver named '{name}' (available: {})",
                Backend::NAMES.join(", ")
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Cholesky => "cholesky",
            Backend::Spectral => "spectral",
        }
    }

    pub fn solver(&self) -> Box<dyn SymmetricGeneralizedEigensolver> {
        match self {
            Backend::Cholesky => Box::new(CholeskySolver),
            Backend::Spectral => Box::new(SpectralSolver),
        }
    }
}

/// One eigenvalue and its eigenvector over every mesh vertex
#[derive(Debug, Clone, PartialEq)]
pub struct EigenPair {
    pub eigenvalue: f64,
    pub eigenvector: Vec<f64>,
}

/// Eigenpairs sorted ascending by absolute eigenvalue
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EigenResult {
    pub pairs: Vec<EigenPair>,
}

impl EigenResult {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn eigenvalues(&self) -> Vec<f64> {
        self.pairs.iter().map(|p| p.eigenvalue).collect()
    }
}

fn column_values(matrix: &DMatrix<f64>, k: usize) -> Vec<f64> {
    matrix.column(k).iter().copied().collect()
}

/// Solves the reduced generalized eigenproblem and expands the eigenvectors
/// back onto the full mesh
///
/// # Arguments
/// * `reduced` - The reduced stiffness and mass matrices
/// * `solver` - The backend doing the dense solve
///
/// # Returns
/// One eigenpair per free degree of freedom, with `FIXED_NODE_VALUE` at every
/// eliminated vertex
pub fn solve(
    reduced: &ReducedSystem,
    solver: &dyn SymmetricGeneralizedEigensolver,
) -> Result<EigenResult, ChladniError> {
    let n = reduced.size();
    if n == 0 {
        return Err(ChladniError::Solver(
            "No free nodes remain after eliminating the fixed ones".to_owned(),
        ));
    }
    if reduced.mass.nrows() != n || reduced.index_map.reduced_len() != n {
        return Err(ChladniError::Solver(format!(
            "Inconsistent reduced system: stiffness {n}, mass {}, index map {}",
            reduced.mass.nrows(),
            reduced.index_map.reduced_len()
        )));
    }

    info!("solving {n} x {n} eigenproblem with the {} backend...", solver.name());
    let start = std::time::Instant::now();

    let (eigenvalues, eigenvectors) = solver.eigenpairs(&reduced.stiffness, &reduced.mass)?;

    let elapsed = (std::time::Instant::now() - start).as_secs_f32();
    info!("solved eigenproblem in {:.3} seconds", elapsed);

    if eigenvalues.iter().any(|l| !l.is_finite()) || eigenvectors.iter().any(|v| !v.is_finite())
    {
        return Err(ChladniError::Solver(
            "Backend produced non-finite eigenpairs".to_owned(),
        ));
    }

    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eigenvalues[a].abs().total_cmp(&eigenvalues[b].abs()));

    let pairs: Vec<EigenPair> = order
        .into_iter()
        .map(|k| EigenPair {
            eigenvalue: eigenvalues[k],
            eigenvector: reduced
                .index_map
                .expand(&column_values(&eigenvectors, k), FIXED_NODE_VALUE),
        })
        .collect();

    debug!(
        "eigenvalues: {:?}",
        pairs.iter().map(|p| p.eigenvalue).collect::<Vec<f64>>()
    );

    Ok(EigenResult { pairs })
}
