use json::JsonValue;
use tracing::debug;

use crate::{
    datatypes::ElementOrder,
    error::ChladniError,
    mesher::{delaunay::DEFAULT_MAX_STEINER_POINTS, MeshOptions},
};

/// Everything needed to run the pipeline besides the geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub mesh: MeshOptions,
    /// Add the elastic support integral on ordinary boundary edges
    pub elastic_support: bool,
    /// Eigensolver backend name
    pub backend: String,
    /// Triangulator name, `delaunay` or `triangle`
    pub triangulator: String,
    /// Executable used by the `triangle` triangulator
    pub triangle_program: String,
    pub max_steiner_points: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mesh: MeshOptions::default(),
            elastic_support: false,
            backend: "cholesky".to_owned(),
            triangulator: "delaunay".to_owned(),
            triangle_program: "triangle".to_owned(),
            max_steiner_points: DEFAULT_MAX_STEINER_POINTS,
        }
    }
}

fn wrong_type(key: &str, expected: &str) -> ChladniError {
    ChladniError::Input(format!(
        "Input json field metadata.{key} must be {expected}"
    ))
}

fn read_f64(metadata: &JsonValue, key: &str, default: f64) -> Result<f64, ChladniError> {
    let value = &metadata[key];
    if value.is_null() {
        return Ok(default);
    }
    match value.as_f64() {
        Some(v) => Ok(v),
        None => Err(wrong_type(key, "a number")),
    }
}

fn read_bool(metadata: &JsonValue, key: &str, default: bool) -> Result<bool, ChladniError> {
    let value = &metadata[key];
    if value.is_null() {
        return Ok(default);
    }
    match value.as_bool() {
        Some(v) => Ok(v),
        None => Err(wrong_type(key, "true or false")),
    }
}

fn read_string(metadata: &JsonValue, key: &str, default: &str) -> Result<String, ChladniError> {
    let value = &metadata[key];
    if value.is_null() {
        return Ok(default.to_owned());
    }
    match value.as_str() {
        Some(v) => Ok(v.to_owned()),
        None => Err(wrong_type(key, "a string")),
    }
}

fn read_usize(metadata: &JsonValue, key: &str, default: usize) -> Result<usize, ChladniError> {
    let value = &metadata[key];
    if value.is_null() {
        return Ok(default);
    }
    match value.as_usize() {
        Some(v) => Ok(v),
        None => Err(wrong_type(key, "a non-negative integer")),
    }
}

/// Parses the input json
///
/// # Arguments
/// * `contents` - The text of the input file
///
/// # Returns
/// A Config with defaults for every field the file leaves out
pub fn parse_config(contents: &str) -> Result<Config, ChladniError> {
    let input_json = match json::parse(contents) {
        Ok(j) => j,
        Err(err) => {
            return Err(ChladniError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    if !input_json.has_key("metadata") {
        return Err(ChladniError::Input(
            "Input json missing metadata field".to_owned(),
        ));
    }
    let metadata = &input_json["metadata"];
    if !metadata.is_object() {
        return Err(ChladniError::Input(
            "Input json metadata field must be an object".to_owned(),
        ));
    }

    let defaults = Config::default();
    let quadratic = read_bool(
        metadata,
        "quadratic",
        defaults.mesh.order == ElementOrder::Quadratic,
    )?;

    let config = Config {
        mesh: MeshOptions {
            max_area: read_f64(metadata, "max_area", defaults.mesh.max_area)?,
            min_angle: read_f64(metadata, "min_angle", defaults.mesh.min_angle)?,
            convex_hull: read_bool(metadata, "convex_hull", defaults.mesh.convex_hull)?,
            delaunay: read_bool(metadata, "delaunay", defaults.mesh.delaunay)?,
            order: if quadratic {
                ElementOrder::Quadratic
            } else {
                ElementOrder::Linear
            },
        },
        elastic_support: read_bool(metadata, "elastic_support", defaults.elastic_support)?,
        backend: read_string(metadata, "backend", &defaults.backend)?,
        triangulator: read_string(metadata, "triangulator", &defaults.triangulator)?,
        triangle_program: read_string(metadata, "triangle_program", &defaults.triangle_program)?,
        max_steiner_points: read_usize(
            metadata,
            "max_steiner_points",
            defaults.max_steiner_points,
        )?,
    };
    config.mesh.validate()?;

    debug!("parsed config {config:?}");
    Ok(config)
}

/// Loads the input json from disk
pub fn load_config(input_file: &str) -> Result<Config, ChladniError> {
    let contents = match std::fs::read_to_string(input_file) {
        Ok(c) => c,
        Err(err) => {
            return Err(ChladniError::Input(format!(
                "Unable to open input file {input_file}: {err}"
            )))
        }
    };
    parse_config(&contents)
}
