use crate::error::ChladniError;

/// Boundary marker of a point whose displacement is held at zero
pub const FIXED_MARKER: i32 = 99;
/// Boundary marker of an ordinary (free or elastically supported) boundary
pub const BOUNDARY_MARKER: i32 = 1;
/// Marker of nodes that do not lie on any segment
pub const INTERIOR_MARKER: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Vertex {
        Vertex { x, y }
    }

    pub fn distance(&self, other: &Vertex) -> f64 {
        f64::sqrt(f64::powi(self.x - other.x, 2) + f64::powi(self.y - other.y, 2))
    }

    pub fn midpoint(&self, other: &Vertex) -> Vertex {
        Vertex {
            x: 0.5 * (self.x + other.x),
            y: 0.5 * (self.y + other.y),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: usize,
    pub position: Vertex,
    pub boundary_marker: i32,
    pub is_fixed: bool,
}

impl Point {
    pub fn new(id: usize, position: Vertex, boundary_marker: i32) -> Point {
        Point {
            id,
            position,
            boundary_marker,
            is_fixed: boundary_marker == FIXED_MARKER,
        }
    }
}

/// A boundary segment between two points. `p1` and `p2` are 0-based indices
/// into [`Pslg::points`].
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: usize,
    pub p1: usize,
    pub p2: usize,
    pub marker: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hole {
    pub id: usize,
    pub position: Vertex,
}

/// Planar straight-line graph describing the plate: boundary points,
/// segments connecting them and seeds of regions to leave out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pslg {
    pub points: Vec<Point>,
    pub segments: Vec<Segment>,
    pub holes: Vec<Hole>,
}

impl Pslg {
    pub fn new() -> Pslg {
        Pslg::default()
    }

    /// Appends an ordinary boundary point and returns its index
    pub fn add_point(&mut self, x: f64, y: f64) -> usize {
        let index = self.points.len();
        self.points
            .push(Point::new(index + 1, Vertex::new(x, y), BOUNDARY_MARKER));
        index
    }

    /// Marks a point as fixed (or releases it)
    pub fn set_fixed(&mut self, point: usize, fixed: bool) -> Result<(), ChladniError> {
        let count = self.points.len();
        let point = match self.points.get_mut(point) {
            Some(p) => p,
            None => {
                return Err(ChladniError::Input(format!(
                    "Cannot fix point {point}; geometry has {count} points"
                )))
            }
        };
        point.is_fixed = fixed;
        point.boundary_marker = if fixed { FIXED_MARKER } else { BOUNDARY_MARKER };
        Ok(())
    }

    pub fn add_segment(&mut self, p1: usize, p2: usize) -> Result<usize, ChladniError> {
        for p in [p1, p2] {
            if p >= self.points.len() {
                return Err(ChladniError::Input(format!(
                    "Segment references point {p}; geometry has {} points",
                    self.points.len()
                )));
            }
        }
        if p1 == p2 {
            return Err(ChladniError::Input(format!(
                "Segment from point {p1} to itself"
            )));
        }

        let index = self.segments.len();
        self.segments.push(Segment {
            id: index + 1,
            p1,
            p2,
            marker: BOUNDARY_MARKER,
        });
        Ok(index)
    }

    pub fn add_hole(&mut self, x: f64, y: f64) -> usize {
        let index = self.holes.len();
        self.holes.push(Hole {
            id: index + 1,
            position: Vertex::new(x, y),
        });
        index
    }

    /// Appends a closed polygon: one point per vertex and a segment between
    /// each consecutive pair. Returns the indices of the new points.
    pub fn add_polygon(&mut self, vertices: &[Vertex]) -> Result<Vec<usize>, ChladniError> {
        let indices: Vec<usize> = vertices.iter().map(|v| self.add_point(v.x, v.y)).collect();
        for i in 0..indices.len() {
            self.add_segment(indices[i], indices[(i + 1) % indices.len()])?;
        }
        Ok(indices)
    }

    /// Marker handed to the triangulator for a segment. Segments between two
    /// fixed points are fixed along their whole length.
    pub fn segment_marker(&self, segment: &Segment) -> i32 {
        let fixed = |p: usize| self.points.get(p).is_some_and(|point| point.is_fixed);
        if fixed(segment.p1) && fixed(segment.p2) {
            FIXED_MARKER
        } else {
            BOUNDARY_MARKER
        }
    }

    /// Checks the invariants the triangulator relies on
    pub fn validate(&self) -> Result<(), ChladniError> {
        if self.points.len() < 3 {
            return Err(ChladniError::Input(format!(
                "Geometry needs at least 3 points, found {}",
                self.points.len()
            )));
        }

        for point in &self.points {
            if !point.position.x.is_finite() || !point.position.y.is_finite() {
                return Err(ChladniError::Input(format!(
                    "Point {} has a non-finite coordinate",
                    point.id
                )));
            }
        }

        self.check_segments()
    }

    /// Checks that every segment joins two distinct existing points
    pub fn check_segments(&self) -> Result<(), ChladniError> {
        for segment in &self.segments {
            if segment.p1 >= self.points.len() || segment.p2 >= self.points.len() {
                return Err(ChladniError::Input(format!(
                    "Segment {} references a missing point ({} -> {})",
                    segment.id, segment.p1, segment.p2
                )));
            }
            if segment.p1 == segment.p2 {
                return Err(ChladniError::Input(format!(
                    "Segment {} connects point {} to itself",
                    segment.id, segment.p1
                )));
            }
        }

        Ok(())
    }
}

/// Polynomial order of the triangular elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementOrder {
    Linear,
    Quadratic,
}

impl ElementOrder {
    pub fn nodes_per_element(&self) -> usize {
        match self {
            ElementOrder::Linear => 3,
            ElementOrder::Quadratic => 6,
        }
    }

    pub fn from_nodes_per_element(nodes: usize) -> Option<ElementOrder> {
        match nodes {
            3 => Some(ElementOrder::Linear),
            6 => Some(ElementOrder::Quadratic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshVertex {
    pub index: usize,
    pub position: Vertex,
    pub boundary_marker: i32,
}

impl MeshVertex {
    pub fn is_fixed(&self) -> bool {
        self.boundary_marker == FIXED_MARKER
    }
}

/// A triangle of the mesh. `mid_edges[k]` is the mid-edge node opposite
/// `corners[k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub corners: [usize; 3],
    pub mid_edges: Option<[usize; 3]>,
}

impl Element {
    /// Node indices in the order of the reference element tables:
    /// corners, then the midpoints of edges 0-1, 1-2 and 2-0.
    pub fn local_nodes(&self) -> Vec<usize> {
        let mut nodes = self.corners.to_vec();
        if let Some(mid) = self.mid_edges {
            nodes.extend_from_slice(&[mid[2], mid[0], mid[1]]);
        }
        nodes
    }

    /// Local node positions of the three element edges (corner, [mid], corner)
    pub fn edge_local_nodes(order: ElementOrder) -> [&'static [usize]; 3] {
        match order {
            ElementOrder::Linear => [&[0, 1], &[1, 2], &[2, 0]],
            ElementOrder::Quadratic => [&[0, 3, 1], &[1, 4, 2], &[2, 5, 0]],
        }
    }
}

/// Triangulated plate with 0-based connectivity
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub elements: Vec<Element>,
    pub order: ElementOrder,
    /// Index base the triangulator reported its connectivity in
    pub source_index_base: usize,
}

impl Mesh {
    pub fn num_fixed(&self) -> usize {
        self.vertices.iter().filter(|v| v.is_fixed()).count()
    }
}
