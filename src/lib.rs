//! Vibration eigenmodes of 2D plates.
//!
//! A plate is described by a planar straight-line graph. It is triangulated,
//! a finite element stiffness and mass matrix are assembled, fixed nodes are
//! eliminated and the generalized eigenproblem `S v = λ M v` is solved.

pub mod assembler;
pub mod basis;
pub mod config;
pub mod datatypes;
pub mod error;
pub mod geometry;
pub mod mesher;
pub mod pipeline;
pub mod post_processor;
pub mod reducer;
pub mod solver;

pub use config::Config;
pub use datatypes::{ElementOrder, Mesh, Pslg, Vertex};
pub use error::ChladniError;
pub use pipeline::{Pipeline, Solution};
pub use post_processor::{ResultBuffer, ResultSlot};
pub use solver::Backend;
