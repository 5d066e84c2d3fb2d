use std::{f64::consts::PI, path::PathBuf, sync::Arc};

use approx::assert_relative_eq;
use chladni::{
    assembler::assemble,
    basis::ElementBasis,
    config::{load_config, Config},
    datatypes::{ElementOrder, Pslg, Vertex},
    error::ChladniError,
    geometry::{load_poly, save_poly},
    mesher::{triangulate, DelaunayMesher, MeshOptions},
    pipeline::{self, Pipeline},
    post_processor::{import_matrices, FIXED_VERTEX_TAG},
    reducer::reduce,
    solver::FIXED_NODE_VALUE,
};

fn unit_square() -> Pslg {
    let mut pslg = Pslg::new();
    pslg.add_polygon(&[
        Vertex::new(0.0, 0.0),
        Vertex::new(1.0, 0.0),
        Vertex::new(1.0, 1.0),
        Vertex::new(0.0, 1.0),
    ])
    .unwrap();
    pslg
}

fn clamped_square() -> Pslg {
    let mut pslg = unit_square();
    for point in 0..4 {
        pslg.set_fixed(point, true).unwrap();
    }
    pslg
}

fn config(max_area: f64, min_angle: f64, order: ElementOrder) -> Config {
    Config {
        mesh: MeshOptions {
            max_area,
            min_angle,
            order,
            ..MeshOptions::default()
        },
        ..Config::default()
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("chladni-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn fixed_nodes_are_eliminated() {
    let pipeline = Pipeline::new(config(0.1, 0.0, ElementOrder::Linear)).unwrap();
    let solution = pipeline.recompute(&clamped_square()).unwrap();

    let n = solution.mesh.vertices.len();
    let fixed = solution.mesh.num_fixed();
    assert!(fixed >= 4);
    assert_eq!(solution.buffer.num_vertices, n);
    assert_eq!(solution.buffer.num_modes, n - fixed);

    for k in 0..solution.buffer.num_modes {
        assert!(solution.buffer.eigenvalues[k] > -1e-8);
        let mode = solution.buffer.mode(k).unwrap();
        for vertex in &solution.mesh.vertices {
            if vertex.is_fixed() {
                assert_eq!(mode[vertex.index], FIXED_NODE_VALUE);
                assert_eq!(solution.buffer.vertices[vertex.index][2], FIXED_VERTEX_TAG);
            }
        }
    }
}

#[test]
fn assembled_matrices_are_symmetric() {
    let options = MeshOptions {
        max_area: 0.05,
        ..MeshOptions::default()
    };
    let mesh = triangulate(&clamped_square(), &options, &DelaunayMesher::default()).unwrap();
    let system = assemble(&mesh, ElementBasis::cached(mesh.order), false).unwrap();
    assert_relative_eq!(system.area, 1.0, epsilon = 1e-10);

    let reduced = reduce(system, &mesh);
    assert_eq!(reduced.size(), mesh.vertices.len() - mesh.num_fixed());
    assert_relative_eq!(
        reduced.stiffness,
        reduced.stiffness.transpose(),
        epsilon = 1e-12
    );
    assert_relative_eq!(reduced.mass, reduced.mass.transpose(), epsilon = 1e-12);
}

#[test]
fn free_plate_has_a_rigid_mode() {
    let pipeline = Pipeline::new(config(0.1, 0.0, ElementOrder::Linear)).unwrap();
    let solution = pipeline.recompute(&unit_square()).unwrap();

    assert_eq!(solution.mesh.num_fixed(), 0);
    assert_eq!(solution.buffer.num_modes, solution.mesh.vertices.len());
    assert!(solution.buffer.eigenvalues[0].abs() < 1e-8);

    // the rigid mode is constant over the plate
    let mode = solution.buffer.mode(0).unwrap();
    for value in mode {
        assert_relative_eq!(*value, mode[0], epsilon = 1e-6);
    }
}

#[test]
fn clamped_square_fundamental_mode() {
    let pipeline = Pipeline::new(config(0.01, 25.0, ElementOrder::Quadratic))
        .unwrap()
        .with_max_modes(Some(6));
    let solution = pipeline.recompute(&clamped_square()).unwrap();

    let lambda = solution.buffer.eigenvalues[0];
    assert_relative_eq!(lambda, 2.0 * PI * PI, max_relative = 0.05);
    assert_relative_eq!(
        solution.buffer.frequency(0).unwrap(),
        lambda.sqrt(),
        epsilon = 1e-12
    );
}

#[test]
fn free_square_first_bending_mode() {
    let pipeline = Pipeline::new(config(0.01, 25.0, ElementOrder::Quadratic))
        .unwrap()
        .with_max_modes(Some(4));
    let solution = pipeline.recompute(&unit_square()).unwrap();

    let eigenvalues = &solution.buffer.eigenvalues;
    assert!(eigenvalues[0].abs() < 1e-6);
    assert_relative_eq!(eigenvalues[1], PI * PI, max_relative = 0.03);
    assert_relative_eq!(eigenvalues[2], PI * PI, max_relative = 0.03);
}

#[test]
fn backends_agree_on_the_spectrum() {
    let cholesky = Pipeline::new(config(0.05, 20.0, ElementOrder::Quadratic)).unwrap();
    let spectral = Pipeline::new(Config {
        backend: "spectral".to_owned(),
        ..config(0.05, 20.0, ElementOrder::Quadratic)
    })
    .unwrap();

    let pslg = clamped_square();
    let a = cholesky.recompute(&pslg).unwrap();
    let b = spectral.recompute(&pslg).unwrap();

    assert_eq!(a.buffer.num_modes, b.buffer.num_modes);
    for k in 0..5 {
        assert_relative_eq!(
            a.buffer.eigenvalues[k],
            b.buffer.eigenvalues[k],
            max_relative = 1e-6
        );
    }
}

#[test]
fn too_few_points_are_rejected() {
    let pipeline = Pipeline::new(config(0.1, 0.0, ElementOrder::Linear)).unwrap();

    let mut pslg = Pslg::new();
    pslg.add_point(0.0, 0.0);
    pslg.add_point(1.0, 0.0);
    pslg.add_segment(0, 1).unwrap();
    assert!(matches!(
        pipeline.recompute(&pslg),
        Err(ChladniError::Input(_))
    ));
}

#[test]
fn collinear_points_do_not_mesh() {
    let pipeline = Pipeline::new(config(0.1, 0.0, ElementOrder::Linear)).unwrap();

    let mut pslg = Pslg::new();
    pslg.add_polygon(&[
        Vertex::new(0.0, 0.0),
        Vertex::new(1.0, 0.0),
        Vertex::new(2.0, 0.0),
    ])
    .unwrap();
    let err = pipeline.recompute(&pslg).unwrap_err();
    assert!(err.is_recoverable());
}

#[test]
fn failed_recompute_keeps_the_previous_buffer() {
    let pipeline = Pipeline::new(config(0.1, 0.0, ElementOrder::Linear)).unwrap();
    let first = pipeline.recompute(&clamped_square()).unwrap();

    let mut broken = Pslg::new();
    broken.add_point(0.0, 0.0);
    broken.add_point(1.0, 0.0);
    assert!(pipeline.recompute(&broken).is_err());

    let latest = pipeline.latest().unwrap();
    assert!(Arc::ptr_eq(&latest, &first.buffer));
}

#[test]
fn run_writes_csv_and_matrices() {
    let dir = scratch_dir("run");
    let geometry = dir.join("square.poly");
    let matrices = dir.join("matrices.bin");
    save_poly(&clamped_square(), geometry.to_str().unwrap()).unwrap();

    let pipeline = Pipeline::new(config(0.1, 0.0, ElementOrder::Linear))
        .unwrap()
        .with_max_modes(Some(2))
        .with_matrix_export(Some(matrices.clone()));
    let solution = pipeline::run(geometry.to_str().unwrap(), &pipeline, &dir).unwrap();

    let nodes = std::fs::read_to_string(dir.join("nodes.csv")).unwrap();
    let mut lines = nodes.lines();
    assert_eq!(lines.next(), Some("x,y,fixed,mode_0,mode_1"));
    assert_eq!(lines.count(), solution.mesh.vertices.len());

    let elements = std::fs::read_to_string(dir.join("elements.csv")).unwrap();
    assert_eq!(elements.lines().count(), solution.mesh.elements.len() + 1);

    let eigenvalues = std::fs::read_to_string(dir.join("eigenvalues.csv")).unwrap();
    assert_eq!(eigenvalues.lines().count(), 3);

    let (stiffness, mass) = import_matrices(&matrices).unwrap();
    let free = solution.mesh.vertices.len() - solution.mesh.num_fixed();
    assert_eq!(stiffness.shape(), (free, free));
    assert_eq!(mass.shape(), (free, free));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn bundled_models_solve() {
    let models = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models");
    let mut config = load_config(models.join("input.json").to_str().unwrap()).unwrap();
    config.mesh.max_area = 0.05;
    let pipeline = Pipeline::new(config).unwrap().with_max_modes(Some(3));

    for model in ["square.poly", "ring.poly"] {
        let pslg = load_poly(models.join(model).to_str().unwrap()).unwrap();
        let solution = pipeline.recompute(&pslg).unwrap();
        assert!(solution.mesh.num_fixed() > 0);
        assert_eq!(solution.buffer.num_modes, 3);
        assert!(solution.buffer.eigenvalues.iter().all(|l| *l > 0.0));
    }
}
