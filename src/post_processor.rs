use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
    sync::{Arc, RwLock},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::DMatrix;
use tracing::info;

use crate::{datatypes::Mesh, error::ChladniError, solver::EigenResult};

/// Third vertex component of a fixed vertex in [`ResultBuffer::vertices`]
pub const FIXED_VERTEX_TAG: f64 = -10.0;

/// Flat per-mode, per-vertex field ready for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBuffer {
    pub num_modes: usize,
    pub num_vertices: usize,
    /// Mode-major: entry `k * num_vertices + i` is vertex `i` of mode `k`
    pub values: Vec<f64>,
    pub eigenvalues: Vec<f64>,
    /// `[x, y, tag]` per vertex; the tag is the vertex index, or
    /// `FIXED_VERTEX_TAG` for fixed vertices
    pub vertices: Vec<[f64; 3]>,
    pub min: f64,
    pub max: f64,
}

impl ResultBuffer {
    /// Flattens an eigen solution over its mesh
    ///
    /// # Arguments
    /// * `mesh` - The mesh the system was assembled from
    /// * `result` - The sorted eigenpairs
    /// * `max_modes` - Keep at most this many of the lowest modes
    pub fn from_result(
        mesh: &Mesh,
        result: &EigenResult,
        max_modes: Option<usize>,
    ) -> ResultBuffer {
        let num_vertices = mesh.vertices.len();
        let num_modes = match max_modes {
            Some(m) => m.min(result.len()),
            None => result.len(),
        };

        let mut values = Vec::with_capacity(num_modes * num_vertices);
        let mut eigenvalues = Vec::with_capacity(num_modes);
        for pair in result.pairs.iter().take(num_modes) {
            values.extend_from_slice(&pair.eigenvector);
            eigenvalues.push(pair.eigenvalue);
        }

        let vertices = mesh
            .vertices
            .iter()
            .map(|v| {
                let tag = if v.is_fixed() {
                    FIXED_VERTEX_TAG
                } else {
                    v.index as f64
                };
                [v.position.x, v.position.y, tag]
            })
            .collect();

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        info!("eigenvector values range from {min:.6} to {max:.6}");

        ResultBuffer {
            num_modes,
            num_vertices,
            values,
            eigenvalues,
            vertices,
            min,
            max,
        }
    }

    /// Values of mode `k` over every vertex
    pub fn mode(&self, k: usize) -> Option<&[f64]> {
        if k >= self.num_modes {
            return None;
        }
        Some(&self.values[k * self.num_vertices..(k + 1) * self.num_vertices])
    }

    /// Angular frequency of mode `k`, the square root of `|λ|`
    pub fn frequency(&self, k: usize) -> Option<f64> {
        self.eigenvalues.get(k).map(|l| l.abs().sqrt())
    }

    pub fn is_fixed(&self, vertex: usize) -> bool {
        self.vertices
            .get(vertex)
            .map_or(false, |v| v[2] == FIXED_VERTEX_TAG)
    }
}

/// Holds the most recently published result. Publishing swaps in a new
/// buffer; readers holding the previous one keep it alive until they drop it.
#[derive(Debug, Default)]
pub struct ResultSlot {
    current: RwLock<Option<Arc<ResultBuffer>>>,
}

impl ResultSlot {
    pub fn new() -> ResultSlot {
        ResultSlot::default()
    }

    pub fn publish(&self, buffer: ResultBuffer) -> Arc<ResultBuffer> {
        let buffer = Arc::new(buffer);
        let mut current = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = Some(Arc::clone(&buffer));
        buffer
    }

    pub fn latest(&self) -> Option<Arc<ResultBuffer>> {
        let current = match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        current.clone()
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, ChladniError> {
    match File::create(path) {
        Ok(f) => Ok(BufWriter::new(f)),
        Err(err) => Err(ChladniError::PostProcessor(format!(
            "Failed to create {}: {err}",
            path.display()
        ))),
    }
}

fn write_error(path: &Path, err: std::io::Error) -> ChladniError {
    ChladniError::PostProcessor(format!("Failed to write {}: {err}", path.display()))
}

fn write_nodes(buffer: &ResultBuffer, file: &mut impl Write) -> std::io::Result<()> {
    write!(file, "x,y,fixed")?;
    for k in 0..buffer.num_modes {
        write!(file, ",mode_{k}")?;
    }
    writeln!(file)?;

    for (i, vertex) in buffer.vertices.iter().enumerate() {
        write!(
            file,
            "{x},{y},{fixed}",
            x = vertex[0],
            y = vertex[1],
            fixed = u8::from(buffer.is_fixed(i))
        )?;
        for k in 0..buffer.num_modes {
            write!(file, ",{}", buffer.values[k * buffer.num_vertices + i])?;
        }
        writeln!(file)?;
    }
    file.flush()
}

fn write_eigenvalues(buffer: &ResultBuffer, file: &mut impl Write) -> std::io::Result<()> {
    writeln!(file, "mode,eigenvalue,frequency")?;
    for (k, eigenvalue) in buffer.eigenvalues.iter().enumerate() {
        writeln!(file, "{k},{eigenvalue},{}", eigenvalue.abs().sqrt())?;
    }
    file.flush()
}

/// One row per element: the corners, then for quadratic elements the
/// midpoints of edges 0-1, 1-2 and 2-0
fn write_elements(mesh: &Mesh, file: &mut impl Write) -> std::io::Result<()> {
    let header: Vec<String> = (0..mesh.order.nodes_per_element())
        .map(|k| format!("n{k}"))
        .collect();
    writeln!(file, "{}", header.join(","))?;

    for element in &mesh.elements {
        let row: Vec<String> = element.local_nodes().iter().map(|n| n.to_string()).collect();
        writeln!(file, "{}", row.join(","))?;
    }
    file.flush()
}

/// Writes the results to three CSV files in `output_dir`
///
/// # Arguments
/// * `buffer` - The published result
/// * `mesh` - The mesh the result belongs to
/// * `output_dir` - Directory receiving `nodes.csv`, `elements.csv` and `eigenvalues.csv`
pub fn csv_output(
    buffer: &ResultBuffer,
    mesh: &Mesh,
    output_dir: &Path,
) -> Result<(), ChladniError> {
    if let Err(err) = std::fs::create_dir_all(output_dir) {
        return Err(ChladniError::PostProcessor(format!(
            "Failed to create output directory {}: {err}",
            output_dir.display()
        )));
    }

    let nodes_output = output_dir.join("nodes.csv");
    let elements_output = output_dir.join("elements.csv");
    let eigenvalues_output = output_dir.join("eigenvalues.csv");

    write_nodes(buffer, &mut create(&nodes_output)?)
        .map_err(|e| write_error(&nodes_output, e))?;
    write_elements(mesh, &mut create(&elements_output)?)
        .map_err(|e| write_error(&elements_output, e))?;
    write_eigenvalues(buffer, &mut create(&eigenvalues_output)?)
        .map_err(|e| write_error(&eigenvalues_output, e))?;

    info!(
        "wrote output to {}, {} and {}",
        nodes_output.display(),
        elements_output.display(),
        eigenvalues_output.display()
    );

    Ok(())
}

fn write_matrices(
    stiffness: &DMatrix<f64>,
    mass: &DMatrix<f64>,
    file: &mut impl Write,
) -> std::io::Result<()> {
    file.write_i32::<LittleEndian>(stiffness.nrows() as i32)?;
    for matrix in [stiffness, mass] {
        for row in 0..matrix.nrows() {
            for col in 0..matrix.ncols() {
                file.write_f64::<LittleEndian>(matrix[(row, col)])?;
            }
        }
    }
    file.flush()
}

/// Dumps the stiffness and mass matrices as a little-endian `i32` size
/// followed by both matrices in row-major `f64`
pub fn export_matrices(
    stiffness: &DMatrix<f64>,
    mass: &DMatrix<f64>,
    path: &Path,
) -> Result<(), ChladniError> {
    if stiffness.shape() != mass.shape() || !stiffness.is_square() {
        return Err(ChladniError::PostProcessor(format!(
            "Cannot export matrices of shapes {:?} and {:?}",
            stiffness.shape(),
            mass.shape()
        )));
    }

    write_matrices(stiffness, mass, &mut create(path)?).map_err(|e| write_error(path, e))?;
    info!(
        "exported {n} x {n} stiffness and mass matrices to {}",
        path.display(),
        n = stiffness.nrows()
    );
    Ok(())
}

/// Reads back a file written by [`export_matrices`]
pub fn import_matrices(path: &Path) -> Result<(DMatrix<f64>, DMatrix<f64>), ChladniError> {
    let read_error = |err: std::io::Error| {
        ChladniError::PostProcessor(format!("Failed to read {}: {err}", path.display()))
    };

    let file = File::open(path).map_err(read_error)?;
    let file_len = file.metadata().map_err(read_error)?.len();
    let mut reader = BufReader::new(file);

    let n = reader.read_i32::<LittleEndian>().map_err(read_error)?;
    if n < 0 {
        return Err(ChladniError::PostProcessor(format!(
            "Negative matrix size {n} in {}",
            path.display()
        )));
    }
    let n = n as usize;

    // i32 header, then two n x n blocks of f64
    let expected_len = n
        .checked_mul(n)
        .and_then(|entries| entries.checked_mul(16))
        .and_then(|bytes| bytes.checked_add(4))
        .and_then(|bytes| u64::try_from(bytes).ok());
    if expected_len != Some(file_len) {
        return Err(ChladniError::PostProcessor(format!(
            "{} holds {file_len} bytes, which does not match two {n} x {n} matrices",
            path.display()
        )));
    }

    let mut matrices = [DMatrix::zeros(n, n), DMatrix::zeros(n, n)];
    for matrix in matrices.iter_mut() {
        for row in 0..n {
            for col in 0..n {
                matrix[(row, col)] = reader.read_f64::<LittleEndian>().map_err(read_error)?;
            }
        }
    }

    let [stiffness, mass] = matrices;
    Ok((stiffness, mass))
}
