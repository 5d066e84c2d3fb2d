//! Runs Jonathan Shewchuk's `triangle` program as a child process and reads
//! back its `.node` and `.ele` files.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use tracing::{debug, info, warn};

use crate::{
    datatypes::{Pslg, Vertex, INTERIOR_MARKER},
    error::ChladniError,
    geometry::{parse_field, write_poly, DataLines},
    mesher::{MeshOptions, RawMesh, RawNode, Triangulator},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTriangle {
    /// Executable name or path
    pub program: String,
    /// Directory for the temporary `.poly`, `.node` and `.ele` files
    pub work_dir: PathBuf,
}

impl ExternalTriangle {
    pub fn new(program: &str) -> ExternalTriangle {
        ExternalTriangle {
            program: program.to_owned(),
            work_dir: std::env::temp_dir(),
        }
    }
}

/// Distinguishes concurrent runs within one process
static RUN_COUNTER: AtomicUsize = AtomicUsize::new(0);

impl Default for ExternalTriangle {
    fn default() -> Self {
        ExternalTriangle::new("triangle")
    }
}

fn read_output(path: &Path) -> Result<String, ChladniError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(err) => Err(ChladniError::Mesher(format!(
            "Unable to read triangle output {}: {err}",
            path.display()
        ))),
    }
}

fn next_line<'a>(
    lines: &mut DataLines<'a>,
    what: &str,
) -> Result<(usize, Vec<&'a str>), ChladniError> {
    match lines.next() {
        Some(line) => Ok(line),
        None => Err(ChladniError::Mesher(format!(
            "Triangle output ends before {what}"
        ))),
    }
}

/// Triangle output problems are mesher errors, not input errors
fn mesher_field<T: std::str::FromStr>(
    fields: &[&str],
    position: usize,
    line: usize,
    what: &str,
) -> Result<T, ChladniError> {
    parse_field(fields, position, line, what).map_err(|err| match err {
        ChladniError::Input(message) => ChladniError::Mesher(message),
        other => other,
    })
}

/// Parses a Triangle `.node` file
///
/// # Arguments
/// * `contents` - The text of the file
///
/// # Returns
/// The index base of the node ids and the nodes in file order
pub fn parse_node(contents: &str) -> Result<(usize, Vec<RawNode>), ChladniError> {
    let mut lines = DataLines::new(contents);

    let (line, header) = next_line(&mut lines, "the node header")?;
    let count: usize = mesher_field(&header, 0, line, "node count")?;
    let num_attribs: usize = mesher_field(&header, 2, line, "node attribute count")?;
    let num_markers: usize = mesher_field(&header, 3, line, "node marker count")?;

    let mut index_base = 0;
    let mut nodes = Vec::with_capacity(count);
    for i in 0..count {
        let (line, fields) = next_line(&mut lines, &format!("node {i} of {count}"))?;
        let id: usize = mesher_field(&fields, 0, line, "node index")?;
        if i == 0 {
            index_base = id;
        } else if id != index_base + i {
            return Err(ChladniError::Mesher(format!(
                "Line {line}: node {id} is out of sequence"
            )));
        }

        let x: f64 = mesher_field(&fields, 1, line, "node x")?;
        let y: f64 = mesher_field(&fields, 2, line, "node y")?;
        let marker: i32 = if num_markers > 0 {
            mesher_field(&fields, 3 + num_attribs, line, "node marker")?
        } else {
            INTERIOR_MARKER
        };
        nodes.push(RawNode {
            position: Vertex::new(x, y),
            marker,
        });
    }

    Ok((index_base, nodes))
}

/// Parses a Triangle `.ele` file
///
/// # Arguments
/// * `contents` - The text of the file
///
/// # Returns
/// The number of nodes per triangle and the node ids of each triangle
pub fn parse_ele(contents: &str) -> Result<(usize, Vec<Vec<usize>>), ChladniError> {
    let mut lines = DataLines::new(contents);

    let (line, header) = next_line(&mut lines, "the element header")?;
    let count: usize = mesher_field(&header, 0, line, "triangle count")?;
    let nodes_per_triangle: usize = mesher_field(&header, 1, line, "nodes per triangle")?;

    let mut triangles = Vec::with_capacity(count);
    for i in 0..count {
        let (line, fields) = next_line(&mut lines, &format!("triangle {i} of {count}"))?;
        let mut triangle = Vec::with_capacity(nodes_per_triangle);
        for k in 0..nodes_per_triangle {
            triangle.push(mesher_field(&fields, 1 + k, line, "triangle node")?);
        }
        triangles.push(triangle);
    }

    Ok((nodes_per_triangle, triangles))
}

fn remove_temporary(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to delete {}: {err}", path.display());
        }
    }
}

impl ExternalTriangle {
    /// Path stem of the temporary files for one run
    fn temp_stem(&self) -> PathBuf {
        let run = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.work_dir
            .join(format!("chladni-{}-{run}", std::process::id()))
    }

    fn run(&self, poly_path: &Path, options: &MeshOptions) -> Result<(), ChladniError> {
        let switches = format!("-Q{}", options.switches());
        info!("running {} {switches}...", self.program);

        let output = match std::process::Command::new(&self.program)
            .arg(&switches)
            .arg(poly_path)
            .output()
        {
            Ok(out) => out,
            Err(err) => {
                return Err(ChladniError::Mesher(format!(
                    "Failed to start {}: {err}",
                    self.program
                )))
            }
        };

        if !output.status.success() {
            return Err(ChladniError::Mesher(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Triangulator for ExternalTriangle {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn triangulate(&self, pslg: &Pslg, options: &MeshOptions) -> Result<RawMesh, ChladniError> {
        let stem = self.temp_stem();
        let poly_path = stem.with_extension("poly");
        let outputs = ["1.node", "1.ele", "1.poly"].map(|ext| stem.with_extension(ext));

        if let Err(err) = std::fs::write(&poly_path, write_poly(pslg)) {
            return Err(ChladniError::Mesher(format!(
                "Cannot write {}: {err}",
                poly_path.display()
            )));
        }
        debug!("wrote geometry to {}", poly_path.display());

        let result = self.run(&poly_path, options).and_then(|_| {
            let (index_base, nodes) = parse_node(&read_output(&outputs[0])?)?;
            let (nodes_per_triangle, triangles) = parse_ele(&read_output(&outputs[1])?)?;
            Ok(RawMesh {
                index_base,
                nodes_per_triangle,
                nodes,
                triangles,
            })
        });

        remove_temporary(&poly_path);
        for path in &outputs {
            remove_temporary(path);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datatypes::{ElementOrder, BOUNDARY_MARKER, FIXED_MARKER},
        mesher::normalize,
    };

    const NODES: &str = "\
5  2  0  1
   1    0  0    99
   2    1  0    1
   3    1  1    1
   4    0  1    1
   5    0.5  0.5    0
# Generated by triangle -pa0.5 square.poly
";

    const ELEMENTS: &str = "\
4  3  0
   1       1     2     5
   2       2     3     5
   3       5     3     4
   4       1     5     4
";

    #[test]
    fn parses_node_file() {
        let (base, nodes) = parse_node(NODES).unwrap();
        assert_eq!(base, 1);
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[0].marker, FIXED_MARKER);
        assert_eq!(nodes[2].position, Vertex::new(1.0, 1.0));
        assert_eq!(nodes[4].marker, INTERIOR_MARKER);
    }

    #[test]
    fn parses_ele_file() {
        let (per_triangle, triangles) = parse_ele(ELEMENTS).unwrap();
        assert_eq!(per_triangle, 3);
        assert_eq!(triangles[2], vec![5, 3, 4]);
    }

    #[test]
    fn output_normalizes_to_zero_based_mesh() {
        let (index_base, nodes) = parse_node(NODES).unwrap();
        let (nodes_per_triangle, triangles) = parse_ele(ELEMENTS).unwrap();
        let mesh = normalize(RawMesh {
            index_base,
            nodes_per_triangle,
            nodes,
            triangles,
        })
        .unwrap();

        assert_eq!(mesh.order, ElementOrder::Linear);
        assert_eq!(mesh.elements[3].corners, [0, 4, 3]);
        assert_eq!(mesh.vertices[1].boundary_marker, BOUNDARY_MARKER);
        assert_eq!(mesh.num_fixed(), 1);
    }

    #[test]
    fn out_of_sequence_nodes_are_rejected() {
        let contents = "2 2 0 0\n1 0 0\n3 1 0\n";
        assert!(matches!(parse_node(contents), Err(ChladniError::Mesher(_))));
    }

    #[test]
    fn truncated_ele_is_rejected() {
        let contents = "2 6 0\n1 1 2 3 4 5 6\n";
        assert!(matches!(parse_ele(contents), Err(ChladniError::Mesher(_))));
    }

    #[test]
    fn each_run_gets_its_own_files() {
        let triangulator = ExternalTriangle::default();
        let first = triangulator.temp_stem();
        let second = triangulator.temp_stem();
        assert_ne!(first, second);
        assert_eq!(first.parent(), second.parent());
    }

    #[test]
    fn missing_program_is_a_mesher_error() {
        let mut pslg = Pslg::new();
        pslg.add_polygon(&[
            Vertex::new(0.0, 0.0),
            Vertex::new(1.0, 0.0),
            Vertex::new(0.0, 1.0),
        ])
        .unwrap();

        let triangulator = ExternalTriangle::new("chladni-no-such-triangle-binary");
        let result = triangulator.triangulate(&pslg, &MeshOptions::default());
        assert!(matches!(result, Err(ChladniError::Mesher(_))));
    }
}
