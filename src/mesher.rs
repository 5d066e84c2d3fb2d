pub mod delaunay;
pub mod external;

use tracing::{debug, info, warn};

use crate::{
    datatypes::{Element, ElementOrder, Mesh, MeshVertex, Pslg, Vertex},
    error::ChladniError,
};

pub use delaunay::DelaunayMesher;
pub use external::ExternalTriangle;

/// Relative distance a mid-edge node may sit away from its edge midpoint
const MIDPOINT_TOL: f64 = 1e-6;

/// Triangulation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct MeshOptions {
    /// Largest allowed triangle area; zero or less disables the bound
    pub max_area: f64,
    /// Smallest allowed triangle angle in degrees; zero disables quality meshing
    pub min_angle: f64,
    /// Mesh the whole convex hull instead of the segment bounded region
    pub convex_hull: bool,
    /// Force a conforming Delaunay triangulation
    pub delaunay: bool,
    pub order: ElementOrder,
}

impl Default for MeshOptions {
    fn default() -> Self {
        MeshOptions {
            max_area: 0.1,
            min_angle: 0.0,
            convex_hull: false,
            delaunay: false,
            order: ElementOrder::Quadratic,
        }
    }
}

impl MeshOptions {
    /// Renders the options as Triangle command line switches
    pub fn switches(&self) -> String {
        let mut switches = String::from("p");
        if self.convex_hull {
            switches.push('c');
        }
        if self.max_area > 0.0 {
            switches.push_str(&format!("a{}", self.max_area));
        }
        if self.min_angle > 0.0 {
            switches.push_str(&format!("q{}", self.min_angle));
        }
        if self.delaunay {
            switches.push('D');
        }
        if self.order == ElementOrder::Quadratic {
            switches.push_str("o2");
        }
        switches
    }

    pub fn has_area_limit(&self) -> bool {
        self.max_area > 0.0
    }

    pub fn validate(&self) -> Result<(), ChladniError> {
        if !self.max_area.is_finite() {
            return Err(ChladniError::Input(format!(
                "Maximum triangle area must be finite, got {}",
                self.max_area
            )));
        }
        if !(0.0..60.0).contains(&self.min_angle) {
            return Err(ChladniError::Input(format!(
                "Minimum angle must be in [0, 60) degrees, got {}",
                self.min_angle
            )));
        }
        Ok(())
    }
}

/// A node as reported by a triangulator
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub position: Vertex,
    pub marker: i32,
}

/// Triangulator output in its own conventions. Node `i` carries the id
/// `index_base + i`; triangles list corners first, then (for 6-node
/// triangles) the mid-edge node opposite each corner.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMesh {
    pub index_base: usize,
    pub nodes_per_triangle: usize,
    pub nodes: Vec<RawNode>,
    pub triangles: Vec<Vec<usize>>,
}

/// Turns a planar straight-line graph into triangles
pub trait Triangulator {
    fn name(&self) -> &'static str;

    fn triangulate(&self, pslg: &Pslg, options: &MeshOptions) -> Result<RawMesh, ChladniError>;
}

/// Signed doubled area of the triangle `a, b, c`
fn orientation(a: &Vertex, b: &Vertex, c: &Vertex) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

fn check_midpoint(
    mid: usize,
    ends: (usize, usize),
    vertices: &[MeshVertex],
) -> Result<(), ChladniError> {
    let start = &vertices[ends.0].position;
    let end = &vertices[ends.1].position;
    let offset = vertices[mid].position.distance(&start.midpoint(end));

    if offset > MIDPOINT_TOL * start.distance(end) {
        return Err(ChladniError::Mesher(format!(
            "Node {mid} is not the midpoint of edge {}-{} (off by {offset:e})",
            ends.0, ends.1
        )));
    }
    Ok(())
}

/// Converts triangulator output into a 0-based, counter-clockwise mesh
///
/// # Arguments
/// * `raw` - The triangulator output
///
/// # Returns
/// The normalized mesh, or an error if the connectivity is inconsistent
pub fn normalize(raw: RawMesh) -> Result<Mesh, ChladniError> {
    let order = match ElementOrder::from_nodes_per_element(raw.nodes_per_triangle) {
        Some(o) => o,
        None => {
            return Err(ChladniError::Mesher(format!(
                "Unsupported element with {} nodes",
                raw.nodes_per_triangle
            )))
        }
    };

    if raw.triangles.is_empty() {
        return Err(ChladniError::DegenerateMesh(
            "Triangulation produced no triangles. Perhaps you should use convex hull or segments connecting the points".to_owned(),
        ));
    }

    let vertices: Vec<MeshVertex> = raw
        .nodes
        .into_iter()
        .enumerate()
        .map(|(index, node)| MeshVertex {
            index,
            position: node.position,
            boundary_marker: node.marker,
        })
        .collect();
    let num_vertices = vertices.len();

    let mut referenced = vec![false; num_vertices];
    let mut elements: Vec<Element> = Vec::with_capacity(raw.triangles.len());
    let mut flipped = 0;

    for (t, triangle) in raw.triangles.iter().enumerate() {
        if triangle.len() != raw.nodes_per_triangle {
            return Err(ChladniError::Mesher(format!(
                "Triangle {t} has {} nodes, expected {}",
                triangle.len(),
                raw.nodes_per_triangle
            )));
        }

        let mut nodes: Vec<usize> = Vec::with_capacity(triangle.len());
        for &id in triangle {
            match id.checked_sub(raw.index_base) {
                Some(i) if i < num_vertices => {
                    referenced[i] = true;
                    nodes.push(i);
                }
                _ => {
                    return Err(ChladniError::Mesher(format!(
                        "Triangle {t} references node {id}, outside {}..{}",
                        raw.index_base,
                        raw.index_base + num_vertices
                    )))
                }
            }
        }

        let mut corners = [nodes[0], nodes[1], nodes[2]];
        let mut mid_edges = match order {
            ElementOrder::Linear => None,
            ElementOrder::Quadratic => Some([nodes[3], nodes[4], nodes[5]]),
        };

        let signed = orientation(
            &vertices[corners[0]].position,
            &vertices[corners[1]].position,
            &vertices[corners[2]].position,
        );
        if signed < 0.0 {
            corners.swap(1, 2);
            if let Some(mid) = mid_edges.as_mut() {
                mid.swap(1, 2);
            }
            flipped += 1;
        }

        if let Some(mid) = mid_edges {
            for k in 0..3 {
                check_midpoint(mid[k], (corners[(k + 1) % 3], corners[(k + 2) % 3]), &vertices)?;
            }
        }

        elements.push(Element { corners, mid_edges });
    }

    if flipped > 0 {
        debug!("reoriented {flipped} clockwise triangles");
    }
    let unreferenced = referenced.iter().filter(|r| !**r).count();
    if unreferenced > 0 {
        warn!("{unreferenced} mesh nodes belong to no triangle");
    }

    Ok(Mesh {
        vertices,
        elements,
        order,
        source_index_base: raw.index_base,
    })
}

/// Triangulates the plate geometry
///
/// # Arguments
/// * `pslg` - The plate geometry
/// * `options` - The meshing parameters
/// * `triangulator` - The triangulator backend
///
/// # Returns
/// A 0-based mesh with counter-clockwise elements
pub fn triangulate(
    pslg: &Pslg,
    options: &MeshOptions,
    triangulator: &dyn Triangulator,
) -> Result<Mesh, ChladniError> {
    if pslg.points.len() < 3 {
        return Err(ChladniError::Input(format!(
            "At least 3 points are needed to triangulate, found {}",
            pslg.points.len()
        )));
    }
    pslg.validate()?;
    options.validate()?;

    info!(
        "triangulating {} points and {} segments with {} (switches {})",
        pslg.points.len(),
        pslg.segments.len(),
        triangulator.name(),
        options.switches()
    );

    let raw = triangulator.triangulate(pslg, options)?;
    let mesh = normalize(raw)?;

    info!(
        "mesh has {} nodes and {} elements ({} nodes per element, {} fixed)",
        mesh.vertices.len(),
        mesh.elements.len(),
        mesh.order.nodes_per_element(),
        mesh.num_fixed()
    );

    Ok(mesh)
}

/// Looks up a triangulator by its configuration name
///
/// # Arguments
/// * `name` - `delaunay` for the built-in mesher, `triangle` for the external program
/// * `program` - Path of the external Triangle executable
/// * `max_steiner_points` - Refinement budget of the built-in mesher
pub fn triangulator_from_name(
    name: &str,
    program: &str,
    max_steiner_points: usize,
) -> Result<Box<dyn Triangulator>, ChladniError> {
    match name.to_lowercase().as_str() {
        "delaunay" | "builtin" => Ok(Box::new(DelaunayMesher { max_steiner_points })),
        "triangle" | "external" => Ok(Box::new(ExternalTriangle::new(program))),
        _ => Err(ChladniError::Input(format!(
            "Unknown triangulator '{name}' (available: delaunay, triangle)"
        ))),
    }
}
