use indicatif::ProgressBar;
use nalgebra::DMatrix;
use tracing::{debug, info};

use crate::{
    basis::ElementBasis,
    datatypes::{Element, Mesh, Vertex, BOUNDARY_MARKER},
    error::ChladniError,
};

/// Parameters of the affine map from a triangle onto the reference element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMap {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Twice the signed area, `(p2-p1) × (p3-p1)`
    pub jacobian: f64,
}

impl AffineMap {
    /// Computes the map parameters of a triangle
    ///
    /// # Arguments
    /// * `p1`, `p2`, `p3` - The corner positions
    /// * `triangle` - The corner vertex indices, used to report degenerate elements
    ///
    /// # Returns
    /// The coefficients `a`, `b`, `c` of the inverse metric, each divided by
    /// the Jacobian, and the Jacobian itself
    pub fn from_corners(
        p1: &Vertex,
        p2: &Vertex,
        p3: &Vertex,
        triangle: [usize; 3],
    ) -> Result<AffineMap, ChladniError> {
        let (e1x, e1y) = (p2.x - p1.x, p2.y - p1.y);
        let (e2x, e2y) = (p3.x - p1.x, p3.y - p1.y);

        let jacobian = e1x * e2y - e2x * e1y;
        let scale = (e1x * e1x + e1y * e1y) + (e2x * e2x + e2y * e2y);

        if !jacobian.is_finite() || jacobian.abs() <= f64::EPSILON * scale {
            return Err(ChladniError::DegenerateGeometry {
                triangle,
                reason: format!("has zero area (jacobian {jacobian:e})"),
            });
        }

        // orientation only flips the sign; the element matrices use |J|
        let inv_j = 1.0 / jacobian.abs();

        Ok(AffineMap {
            a: (e2x * e2x + e2y * e2y) * inv_j,
            b: -(e2x * e1x + e2y * e1y) * inv_j,
            c: (e1x * e1x + e1y * e1y) * inv_j,
            jacobian,
        })
    }
}

/// Dense global matrices of the whole plate
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSystem {
    pub stiffness: DMatrix<f64>,
    pub mass: DMatrix<f64>,
    /// Plate area integrated over all elements
    pub area: f64,
}

impl GlobalSystem {
    pub fn size(&self) -> usize {
        self.stiffness.nrows()
    }
}

/// Builds the stiffness and mass matrices of one element
///
/// # Arguments
/// * `map` - The element's affine map
/// * `basis` - The reference element tables
///
/// # Returns
/// The element stiffness and mass matrices, in that order
pub fn compute_element_matrices(
    map: &AffineMap,
    basis: &ElementBasis,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let stiffness = &basis.s1 * map.a + &basis.s2 * map.b + &basis.s3 * map.c;
    let mass = &basis.s4 * map.jacobian.abs();
    (stiffness, mass)
}

fn element_map(element: &Element, mesh: &Mesh) -> Result<AffineMap, ChladniError> {
    let [i0, i1, i2] = element.corners;
    AffineMap::from_corners(
        &mesh.vertices[i0].position,
        &mesh.vertices[i1].position,
        &mesh.vertices[i2].position,
        element.corners,
    )
}

/// Adds `factor * block` into `target` at the given global indices
fn scatter_add(target: &mut DMatrix<f64>, block: &DMatrix<f64>, nodes: &[usize], factor: f64) {
    for (local_row, &global_row) in nodes.iter().enumerate() {
        for (local_col, &global_col) in nodes.iter().enumerate() {
            target[(global_row, global_col)] += factor * block[(local_row, local_col)];
        }
    }
}

/// Adds the elastic support integral of every element edge that lies on an
/// ordinary boundary
///
/// # Arguments
/// * `stiffness` - The global stiffness matrix
/// * `element` - The element to target
/// * `mesh` - The mesh the element belongs to
/// * `basis` - The reference element tables
///
/// # Returns
/// The number of edges that received a contribution
fn add_boundary_contribution(
    stiffness: &mut DMatrix<f64>,
    element: &Element,
    mesh: &Mesh,
    basis: &ElementBasis,
) -> usize {
    let nodes = element.local_nodes();
    let s5 = basis.s5();
    let mut supported = 0;

    for edge in Element::edge_local_nodes(mesh.order) {
        let edge_nodes: Vec<usize> = edge.iter().map(|&local| nodes[local]).collect();
        let on_boundary = edge_nodes
            .iter()
            .all(|&n| mesh.vertices[n].boundary_marker == BOUNDARY_MARKER);
        if !on_boundary {
            continue;
        }

        // corners are the first and last node of the edge
        let start = &mesh.vertices[edge_nodes[0]].position;
        let end = &mesh.vertices[edge_nodes[edge_nodes.len() - 1]].position;
        scatter_add(stiffness, &s5, &edge_nodes, start.distance(end));
        supported += 1;
    }

    supported
}

/// Compiles element matrices into the global stiffness and mass matrices
///
/// # Arguments
/// * `mesh` - The triangulated plate
/// * `basis` - The reference element tables for the mesh's element order
/// * `elastic_support` - Whether ordinary boundary edges are elastically supported
///
/// # Returns
/// The global system, or a degenerate geometry error naming the first
/// zero-area triangle
pub fn assemble(
    mesh: &Mesh,
    basis: &ElementBasis,
    elastic_support: bool,
) -> Result<GlobalSystem, ChladniError> {
    if basis.order != mesh.order {
        return Err(ChladniError::Mesher(format!(
            "Mesh uses {:?} elements but the basis is {:?}",
            mesh.order, basis.order
        )));
    }

    let n = mesh.vertices.len();
    info!("compiling {n} x {n} stiffness and mass matrices...");

    let mut stiffness: DMatrix<f64> = DMatrix::zeros(n, n);
    let mut mass: DMatrix<f64> = DMatrix::zeros(n, n);
    let mut area = 0.0;
    let mut supported_edges = 0;

    let bar = ProgressBar::new(mesh.elements.len() as u64);
    for element in &mesh.elements {
        bar.inc(1);

        let map = element_map(element, mesh)?;
        let (element_stiffness, element_mass) = compute_element_matrices(&map, basis);

        let nodes = element.local_nodes();
        scatter_add(&mut stiffness, &element_stiffness, &nodes, 1.0);
        scatter_add(&mut mass, &element_mass, &nodes, 1.0);
        area += map.jacobian.abs() * basis.s1_vec.sum();

        if elastic_support {
            supported_edges += add_boundary_contribution(&mut stiffness, element, mesh, basis);
        }
    }
    bar.finish_and_clear();

    if elastic_support {
        debug!("added elastic support on {supported_edges} boundary edges");
    }
    info!(
        "compiled matrices from {} elements, plate area {:.6}",
        mesh.elements.len(),
        area
    );

    Ok(GlobalSystem {
        stiffness,
        mass,
        area,
    })
}
