//! In-process constrained Delaunay triangulation backed by `spade`.

use std::collections::{HashMap, HashSet, VecDeque};

use spade::{
    handles::{FixedFaceHandle, FixedVertexHandle, InnerTag},
    AngleLimit, ConstrainedDelaunayTriangulation, Point2, PositionInTriangulation,
    RefinementParameters, Triangulation,
};
use tracing::{debug, warn};

use crate::{
    datatypes::{ElementOrder, Pslg, Vertex, BOUNDARY_MARKER, INTERIOR_MARKER},
    error::ChladniError,
    mesher::{MeshOptions, RawMesh, RawNode, Triangulator},
};

type Cdt = ConstrainedDelaunayTriangulation<Point2<f64>>;

/// Undirected edge keyed by its sorted vertex indices
type EdgeKey = (usize, usize);

/// Relative distance below which a node counts as lying on a segment
const ON_SEGMENT_TOL: f64 = 1e-9;

pub const DEFAULT_MAX_STEINER_POINTS: usize = 100_000;

/// Constrained Delaunay mesher with Ruppert style refinement
#[derive(Debug, Clone, PartialEq)]
pub struct DelaunayMesher {
    /// Upper bound on vertices inserted during refinement
    pub max_steiner_points: usize,
}

impl Default for DelaunayMesher {
    fn default() -> Self {
        DelaunayMesher {
            max_steiner_points: DEFAULT_MAX_STEINER_POINTS,
        }
    }
}

fn to_vertex(point: Point2<f64>) -> Vertex {
    Vertex::new(point.x, point.y)
}

/// True if `p` lies on the closed segment `a`-`b`
fn on_segment(p: &Vertex, a: &Vertex, b: &Vertex) -> bool {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return false;
    }

    let cross = dx * (p.y - a.y) - dy * (p.x - a.x);
    if cross.abs() > ON_SEGMENT_TOL * length_sq {
        return false;
    }
    let t = (dx * (p.x - a.x) + dy * (p.y - a.y)) / length_sq;
    (-ON_SEGMENT_TOL..=1.0 + ON_SEGMENT_TOL).contains(&t)
}

/// Marker of the first segment `p` lies on
fn segment_marker_at(pslg: &Pslg, p: &Vertex) -> Option<i32> {
    pslg.segments
        .iter()
        .find(|s| on_segment(p, &pslg.points[s.p1].position, &pslg.points[s.p2].position))
        .map(|s| pslg.segment_marker(s))
}

fn insert_geometry(pslg: &Pslg) -> Result<(Cdt, Vec<FixedVertexHandle>), ChladniError> {
    let mut cdt = Cdt::new();
    let mut handles = Vec::with_capacity(pslg.points.len());

    for point in &pslg.points {
        let handle = match cdt.insert(Point2::new(point.position.x, point.position.y)) {
            Ok(h) => h,
            Err(err) => {
                return Err(ChladniError::Input(format!(
                    "Cannot insert point {} at ({}, {}): {err:?}",
                    point.id, point.position.x, point.position.y
                )))
            }
        };
        handles.push(handle);
    }

    for segment in &pslg.segments {
        let (from, to) = (handles[segment.p1], handles[segment.p2]);
        if from == to {
            warn!("segment {} connects two coincident points, skipping", segment.id);
            continue;
        }
        if !cdt.can_add_constraint(from, to) {
            return Err(ChladniError::Input(format!(
                "Segment {} ({} -> {}) intersects another segment",
                segment.id, segment.p1, segment.p2
            )));
        }
        cdt.add_constraint(from, to);
    }

    Ok((cdt, handles))
}

fn refine(cdt: &mut Cdt, options: &MeshOptions, outer_excluded: bool, budget: usize) {
    // zero disables angle driven splitting
    let angle_limit = AngleLimit::from_deg(options.min_angle.max(0.0));

    let mut parameters = RefinementParameters::<f64>::new()
        .with_angle_limit(angle_limit)
        .exclude_outer_faces(outer_excluded)
        .with_max_additional_vertices(budget);
    if options.has_area_limit() {
        parameters = parameters.with_max_allowed_area(options.max_area);
    }

    let before = cdt.num_vertices();
    let result = cdt.refine(parameters);
    debug!("refinement inserted {} vertices", cdt.num_vertices() - before);

    if !result.refinement_complete {
        warn!(
            "refinement stopped after {budget} additional vertices; \
             some triangles may exceed the area or angle limit"
        );
    }
}

/// Spreads exclusion from the seed faces without crossing segments
fn flood_exclude(
    cdt: &Cdt,
    seeds: Vec<FixedFaceHandle<InnerTag>>,
) -> HashSet<FixedFaceHandle<InnerTag>> {
    let mut excluded: HashSet<FixedFaceHandle<InnerTag>> = HashSet::new();
    let mut queue: VecDeque<FixedFaceHandle<InnerTag>> = seeds.into_iter().collect();

    while let Some(fixed) = queue.pop_front() {
        if !excluded.insert(fixed) {
            continue;
        }
        for edge in cdt.face(fixed).adjacent_edges() {
            if cdt.is_constraint_edge(edge.as_undirected().fix()) {
                continue;
            }
            if let Some(neighbor) = edge.rev().face().as_inner() {
                if !excluded.contains(&neighbor.fix()) {
                    queue.push_back(neighbor.fix());
                }
            }
        }
    }

    excluded
}

/// Faces that are outside the segment bounded region or inside a hole
fn excluded_faces(
    cdt: &Cdt,
    pslg: &Pslg,
    keep_hull: bool,
) -> HashSet<FixedFaceHandle<InnerTag>> {
    let mut seeds = Vec::new();

    if !keep_hull {
        for edge in cdt.convex_hull() {
            if cdt.is_constraint_edge(edge.as_undirected().fix()) {
                continue;
            }
            for face in [edge.face(), edge.rev().face()] {
                if let Some(inner) = face.as_inner() {
                    seeds.push(inner.fix());
                }
            }
        }
    }

    for hole in &pslg.holes {
        match cdt.locate(Point2::new(hole.position.x, hole.position.y)) {
            PositionInTriangulation::OnFace(face) => seeds.push(face),
            PositionInTriangulation::OnVertex(vertex) => {
                for edge in cdt.vertex(vertex).out_edges() {
                    if let Some(inner) = edge.face().as_inner() {
                        seeds.push(inner.fix());
                    }
                }
            }
            PositionInTriangulation::OnEdge(edge) => {
                let edge = cdt.directed_edge(edge);
                for face in [edge.face(), edge.rev().face()] {
                    if let Some(inner) = face.as_inner() {
                        seeds.push(inner.fix());
                    }
                }
            }
            _ => warn!(
                "hole {} at ({}, {}) is not inside the triangulation",
                hole.id, hole.position.x, hole.position.y
            ),
        }
    }

    flood_exclude(cdt, seeds)
}

/// Boundary edges and vertices of the convex hull
fn hull_sets(cdt: &Cdt) -> (HashSet<EdgeKey>, HashSet<FixedVertexHandle>) {
    let mut edges = HashSet::new();
    let mut vertices = HashSet::new();
    for edge in cdt.convex_hull() {
        let (from, to) = (edge.from().fix(), edge.to().fix());
        edges.insert(edge_key(from.index(), to.index()));
        vertices.insert(from);
        vertices.insert(to);
    }
    (edges, vertices)
}

fn edge_key(a: usize, b: usize) -> EdgeKey {
    (a.min(b), a.max(b))
}

impl Triangulator for DelaunayMesher {
    fn name(&self) -> &'static str {
        "delaunay"
    }

    fn triangulate(&self, pslg: &Pslg, options: &MeshOptions) -> Result<RawMesh, ChladniError> {
        let (mut cdt, input_handles) = insert_geometry(pslg)?;

        // without segments there is no region to carve out
        let keep_hull = options.convex_hull || pslg.segments.is_empty();

        let wants_refinement =
            options.has_area_limit() || options.min_angle > 0.0 || options.delaunay;
        if wants_refinement && cdt.num_inner_faces() > 0 {
            refine(&mut cdt, options, !keep_hull, self.max_steiner_points);
        }

        let excluded = excluded_faces(&cdt, pslg, keep_hull);
        let kept_faces: Vec<_> = cdt
            .inner_faces()
            .filter(|f| !excluded.contains(&f.fix()))
            .collect();
        debug!(
            "kept {} of {} triangles",
            kept_faces.len(),
            cdt.num_inner_faces()
        );

        // markers of the input points, first occurrence wins on duplicates
        let mut input_markers: HashMap<FixedVertexHandle, i32> = HashMap::new();
        for (handle, point) in input_handles.iter().zip(pslg.points.iter()) {
            input_markers.entry(*handle).or_insert(point.boundary_marker);
        }

        let (hull_edges, hull_vertices) = if keep_hull && options.convex_hull {
            hull_sets(&cdt)
        } else {
            (HashSet::new(), HashSet::new())
        };

        let boundary_marker = |position: &Vertex, on_hull: bool| -> i32 {
            match segment_marker_at(pslg, position) {
                Some(marker) => marker,
                None if on_hull => BOUNDARY_MARKER,
                None => INTERIOR_MARKER,
            }
        };

        // input points are always kept, Steiner points only when used
        let mut used = vec![false; cdt.num_vertices()];
        for handle in &input_handles {
            used[handle.index()] = true;
        }
        for face in &kept_faces {
            for vertex in face.vertices() {
                used[vertex.fix().index()] = true;
            }
        }

        let mut node_ids: Vec<Option<usize>> = vec![None; cdt.num_vertices()];
        let mut nodes: Vec<RawNode> = Vec::new();
        for vertex in cdt.vertices() {
            let index = vertex.fix().index();
            if !used[index] {
                continue;
            }
            let position = to_vertex(vertex.position());
            let marker = match input_markers.get(&vertex.fix()) {
                Some(&marker) if marker != INTERIOR_MARKER => marker,
                _ => boundary_marker(&position, hull_vertices.contains(&vertex.fix())),
            };
            node_ids[index] = Some(nodes.len());
            nodes.push(RawNode { position, marker });
        }

        let mut mid_edge_ids: HashMap<EdgeKey, usize> = HashMap::new();
        let mut triangles: Vec<Vec<usize>> = Vec::with_capacity(kept_faces.len());

        for face in &kept_faces {
            let corners = face.vertices();
            let mut triangle = Vec::with_capacity(options.order.nodes_per_element());
            for vertex in &corners {
                match node_ids[vertex.fix().index()] {
                    Some(id) => triangle.push(id),
                    None => {
                        return Err(ChladniError::Mesher(
                            "Triangle references a dropped vertex".to_owned(),
                        ))
                    }
                }
            }

            if options.order == ElementOrder::Quadratic {
                // node k sits on the edge opposite corner k
                for k in 0..3 {
                    let start = corners[(k + 1) % 3];
                    let end = corners[(k + 2) % 3];
                    let key = edge_key(start.fix().index(), end.fix().index());
                    let id = match mid_edge_ids.get(&key) {
                        Some(&id) => id,
                        None => {
                            let position =
                                to_vertex(start.position()).midpoint(&to_vertex(end.position()));
                            let marker = boundary_marker(&position, hull_edges.contains(&key));

                            let id = nodes.len();
                            nodes.push(RawNode { position, marker });
                            mid_edge_ids.insert(key, id);
                            id
                        }
                    };
                    triangle.push(id);
                }
            }

            triangles.push(triangle);
        }

        Ok(RawMesh {
            index_base: 0,
            nodes_per_triangle: options.order.nodes_per_element(),
            nodes,
            triangles,
        })
    }
}
