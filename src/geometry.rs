//! Reading and writing the plate geometry in the Triangle `.poly` format.
//!
//! A file has three sections, each introduced by a count header: vertices
//! (`count dim attribs markers`, then `index x y [attribs..] [marker]`),
//! segments (`count markers`, then `index p1 p2 [marker]`) and holes
//! (`count`, then `index x y`). Lines starting with `#` are comments.

use std::io::Write;

use tracing::{debug, info};

use crate::{
    datatypes::{Hole, Point, Pslg, Segment, Vertex, INTERIOR_MARKER},
    error::ChladniError,
};

/// Digits after the decimal point when writing coordinates
pub const FLOAT_PREC: usize = 6;

/// Non-comment, non-empty lines split into whitespace-delimited fields
pub(crate) struct DataLines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> DataLines<'a> {
    pub(crate) fn new(contents: &'a str) -> DataLines<'a> {
        DataLines {
            lines: contents.lines().enumerate(),
        }
    }
}

impl<'a> Iterator for DataLines<'a> {
    type Item = (usize, Vec<&'a str>);

    fn next(&mut self) -> Option<Self::Item> {
        for (number, line) in self.lines.by_ref() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // trailing comments are allowed as well
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line,
            };
            return Some((number + 1, line.split_whitespace().collect()));
        }
        None
    }
}

pub(crate) fn parse_field<T: std::str::FromStr>(
    fields: &[&str],
    position: usize,
    line: usize,
    what: &str,
) -> Result<T, ChladniError> {
    let raw = match fields.get(position) {
        Some(raw) => raw,
        None => {
            return Err(ChladniError::Input(format!(
                "Line {line}: missing {what}"
            )))
        }
    };
    match raw.parse() {
        Ok(value) => Ok(value),
        Err(_) => Err(ChladniError::Input(format!(
            "Line {line}: bad value '{raw}' for {what}"
        ))),
    }
}

/// Converts a persisted point reference into a 0-based index
fn to_zero_based(index: usize, base: usize, line: usize) -> Result<usize, ChladniError> {
    match index.checked_sub(base) {
        Some(i) => Ok(i),
        None => Err(ChladniError::Input(format!(
            "Line {line}: point index {index} is below the file's index base {base}"
        ))),
    }
}

/// Parses the contents of a `.poly` file
///
/// # Arguments
/// * `contents` - The text of the file
///
/// # Returns
/// The geometry with 0-based segment indices
pub fn parse_poly(contents: &str) -> Result<Pslg, ChladniError> {
    let mut lines = DataLines::new(contents);
    let mut pslg = Pslg::new();

    // Vertex section
    let (line, header) = match lines.next() {
        Some(l) => l,
        None => return Err(ChladniError::Input("Empty poly file".to_owned())),
    };
    let num_vertices: usize = parse_field(&header, 0, line, "vertex count")?;
    let num_attribs: usize = match header.get(2) {
        Some(_) => parse_field(&header, 2, line, "attribute count")?,
        None => 0,
    };
    let num_markers: usize = match header.get(3) {
        Some(_) => parse_field(&header, 3, line, "boundary marker count")?,
        None => 0,
    };
    if num_vertices == 0 {
        return Err(ChladniError::Input(
            "Poly file lists no vertices".to_owned(),
        ));
    }

    let mut index_base: usize = 0;
    for i in 0..num_vertices {
        let (line, fields) = match lines.next() {
            Some(l) => l,
            None => {
                return Err(ChladniError::Input(format!(
                    "Poly file ends after {i} of {num_vertices} vertices"
                )))
            }
        };
        let id: usize = parse_field(&fields, 0, line, "vertex index")?;
        if i == 0 {
            index_base = id.min(1);
        }
        let x: f64 = parse_field(&fields, 1, line, "x coordinate")?;
        let y: f64 = parse_field(&fields, 2, line, "y coordinate")?;
        let marker: i32 = if num_markers > 0 && fields.len() > 3 + num_attribs {
            parse_field(&fields, 3 + num_attribs, line, "boundary marker")?
        } else {
            INTERIOR_MARKER
        };
        pslg.points.push(Point::new(id, Vertex::new(x, y), marker));
    }

    // Segment section
    if let Some((line, header)) = lines.next() {
        let num_segments: usize = parse_field(&header, 0, line, "segment count")?;
        for i in 0..num_segments {
            let (line, fields) = match lines.next() {
                Some(l) => l,
                None => {
                    return Err(ChladniError::Input(format!(
                        "Poly file ends after {i} of {num_segments} segments"
                    )))
                }
            };
            let id: usize = parse_field(&fields, 0, line, "segment index")?;
            let p1: usize = parse_field(&fields, 1, line, "segment start")?;
            let p2: usize = parse_field(&fields, 2, line, "segment end")?;
            let marker: i32 = match fields.get(3) {
                Some(_) => parse_field(&fields, 3, line, "segment marker")?,
                None => INTERIOR_MARKER,
            };
            let p1 = to_zero_based(p1, index_base, line)?;
            let p2 = to_zero_based(p2, index_base, line)?;
            pslg.segments.push(Segment { id, p1, p2, marker });
        }
    }

    // Hole section
    if let Some((line, header)) = lines.next() {
        let num_holes: usize = parse_field(&header, 0, line, "hole count")?;
        for i in 0..num_holes {
            let (line, fields) = match lines.next() {
                Some(l) => l,
                None => {
                    return Err(ChladniError::Input(format!(
                        "Poly file ends after {i} of {num_holes} holes"
                    )))
                }
            };
            let id: usize = parse_field(&fields, 0, line, "hole index")?;
            let x: f64 = parse_field(&fields, 1, line, "hole x coordinate")?;
            let y: f64 = parse_field(&fields, 2, line, "hole y coordinate")?;
            pslg.holes.push(Hole {
                id,
                position: Vertex::new(x, y),
            });
        }
    }

    pslg.validate()?;

    debug!(
        "parsed poly with {} points, {} segments, {} holes (index base {})",
        pslg.points.len(),
        pslg.segments.len(),
        pslg.holes.len(),
        index_base
    );

    Ok(pslg)
}

/// Renders the geometry as a 1-based `.poly` file
pub fn write_poly(pslg: &Pslg) -> String {
    let mut out = String::new();

    out.push_str("# vertices\n");
    out.push_str(&format!("{} 2 0 1\n", pslg.points.len()));
    for (i, point) in pslg.points.iter().enumerate() {
        out.push_str(&format!(
            "{:5} {:>12.prec$} {:>12.prec$} {:5}\n",
            i + 1,
            point.position.x,
            point.position.y,
            point.boundary_marker,
            prec = FLOAT_PREC
        ));
    }

    out.push_str("# segments\n");
    out.push_str(&format!("{} 1\n", pslg.segments.len()));
    for (i, segment) in pslg.segments.iter().enumerate() {
        out.push_str(&format!(
            "{:5} {:4} {:4} {:5}\n",
            i + 1,
            segment.p1 + 1,
            segment.p2 + 1,
            pslg.segment_marker(segment)
        ));
    }

    out.push_str("# holes\n");
    out.push_str(&format!("{}\n", pslg.holes.len()));
    for (i, hole) in pslg.holes.iter().enumerate() {
        out.push_str(&format!(
            "{:5} {:>12.prec$} {:>12.prec$}\n",
            i + 1,
            hole.position.x,
            hole.position.y,
            prec = FLOAT_PREC
        ));
    }

    out
}

/// Loads a `.poly` file from disk
pub fn load_poly(path: &str) -> Result<Pslg, ChladniError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            return Err(ChladniError::Input(format!(
                "Unable to open poly file {path}: {err}"
            )))
        }
    };

    let pslg = parse_poly(&contents)?;
    info!(
        "loaded {} points, {} segments and {} holes from {}",
        pslg.points.len(),
        pslg.segments.len(),
        pslg.holes.len(),
        path
    );
    Ok(pslg)
}

/// Saves the geometry as a `.poly` file
pub fn save_poly(pslg: &Pslg, path: &str) -> Result<(), ChladniError> {
    pslg.check_segments()?;
    let mut file = match std::fs::File::create(path) {
        Ok(f) => f,
        Err(err) => {
            return Err(ChladniError::Input(format!(
                "Cannot open file {path} for writing: {err}"
            )))
        }
    };
    if let Err(err) = file.write_all(write_poly(pslg).as_bytes()) {
        return Err(ChladniError::Input(format!(
            "Failed to write poly file {path}: {err}"
        )));
    }
    Ok(())
}
