//! Reference element matrices for 3-node and 6-node Lagrange triangles.
//!
//! With the reference triangle `(0,0), (1,0), (0,1)` and shape functions
//! `φ`, the tables hold
//! * `S1 = ∫ ∂ξφi ∂ξφj`,
//! * `S2 = ∫ ∂ξφi ∂ηφj + ∂ηφi ∂ξφj`,
//! * `S3 = ∫ ∂ηφi ∂ηφj`,
//! * `S4 = ∫ φi φj`,
//! * `s1 = ∫ φi`,
//!
//! and the edge mass matrices `S5` integrate `φi φj` along a unit-length edge.
//! Quadratic node order is corners, then midpoints of edges 0-1, 1-2, 2-0.

use std::sync::OnceLock;

use nalgebra::{matrix, DMatrix, DVector, SMatrix};

use crate::datatypes::ElementOrder;

const FAC_LIN: [f64; 5] = [0.5, 0.5, 0.5, 1.0 / 24.0, 1.0 / 6.0];

#[rustfmt::skip]
const MS1_LIN: [f64; 9] = [
    1.0, -1.0, 0.0,
    -1.0, 1.0, 0.0,
    0.0, 0.0, 0.0,
];
#[rustfmt::skip]
const MS2_LIN: [f64; 9] = [
    2.0, -1.0, -1.0,
    -1.0, 0.0, 1.0,
    -1.0, 1.0, 0.0,
];
#[rustfmt::skip]
const MS3_LIN: [f64; 9] = [
    1.0, 0.0, -1.0,
    0.0, 0.0, 0.0,
    -1.0, 0.0, 1.0,
];
#[rustfmt::skip]
const MS4_LIN: [f64; 9] = [
    2.0, 1.0, 1.0,
    1.0, 2.0, 1.0,
    1.0, 1.0, 2.0,
];
const VS1_LIN: [f64; 3] = [1.0, 1.0, 1.0];

const FAC_QUAD: [f64; 5] = [1.0 / 6.0, 1.0 / 6.0, 1.0 / 6.0, 1.0 / 360.0, 1.0 / 6.0];

#[rustfmt::skip]
const MS1_QUAD: [f64; 36] = [
    3.0, 1.0, 0.0, -4.0, 0.0, 0.0,
    1.0, 3.0, 0.0, -4.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    -4.0, -4.0, 0.0, 8.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 8.0, -8.0,
    0.0, 0.0, 0.0, 0.0, -8.0, 8.0,
];
#[rustfmt::skip]
const MS2_QUAD: [f64; 36] = [
    6.0, 1.0, 1.0, -4.0, 0.0, -4.0,
    1.0, 0.0, -1.0, -4.0, 4.0, 0.0,
    1.0, -1.0, 0.0, 0.0, 4.0, -4.0,
    -4.0, -4.0, 0.0, 8.0, -8.0, 8.0,
    0.0, 4.0, 4.0, -8.0, 8.0, -8.0,
    -4.0, 0.0, -4.0, 8.0, -8.0, 8.0,
];
#[rustfmt::skip]
const MS3_QUAD: [f64; 36] = [
    3.0, 0.0, 1.0, 0.0, 0.0, -4.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    1.0, 0.0, 3.0, 0.0, 0.0, -4.0,
    0.0, 0.0, 0.0, 8.0, -8.0, 0.0,
    0.0, 0.0, 0.0, -8.0, 8.0, 0.0,
    -4.0, 0.0, -4.0, 0.0, 0.0, 8.0,
];
#[rustfmt::skip]
const MS4_QUAD: [f64; 36] = [
    6.0, -1.0, -1.0, 0.0, -4.0, 0.0,
    -1.0, 6.0, -1.0, 0.0, 0.0, -4.0,
    -1.0, -1.0, 6.0, -4.0, 0.0, 0.0,
    0.0, 0.0, -4.0, 32.0, 16.0, 16.0,
    -4.0, 0.0, 0.0, 16.0, 32.0, 16.0,
    0.0, -4.0, 0.0, 16.0, 16.0, 32.0,
];
const VS1_QUAD: [f64; 6] = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

/// Canonical matrices of one element order
#[derive(Debug, Clone, PartialEq)]
pub struct ElementBasis {
    pub order: ElementOrder,
    pub s1: DMatrix<f64>,
    pub s2: DMatrix<f64>,
    pub s3: DMatrix<f64>,
    pub s4: DMatrix<f64>,
    pub s1_vec: DVector<f64>,
    pub s5_linear: SMatrix<f64, 2, 2>,
    pub s5_quadratic: SMatrix<f64, 3, 3>,
}

impl ElementBasis {
    pub fn new(order: ElementOrder) -> ElementBasis {
        let k = order.nodes_per_element();
        let (ms1, ms2, ms3, ms4, vs1, fac): (&[f64], &[f64], &[f64], &[f64], &[f64], [f64; 5]) =
            match order {
                ElementOrder::Linear => (
                    &MS1_LIN[..],
                    &MS2_LIN[..],
                    &MS3_LIN[..],
                    &MS4_LIN[..],
                    &VS1_LIN[..],
                    FAC_LIN,
                ),
                ElementOrder::Quadratic => (
                    &MS1_QUAD[..],
                    &MS2_QUAD[..],
                    &MS3_QUAD[..],
                    &MS4_QUAD[..],
                    &VS1_QUAD[..],
                    FAC_QUAD,
                ),
            };

        let s5_linear = matrix![
            1.0 / 3.0, 1.0 / 6.0;
            1.0 / 6.0, 1.0 / 3.0;
        ];
        let s5_quadratic = matrix![
            2.0, 1.0, -0.5;
            1.0, 8.0, 1.0;
            -0.5, 1.0, 2.0;
        ] / 15.0;

        ElementBasis {
            order,
            s1: DMatrix::from_row_slice(k, k, ms1) * fac[0],
            s2: DMatrix::from_row_slice(k, k, ms2) * fac[1],
            s3: DMatrix::from_row_slice(k, k, ms3) * fac[2],
            s4: DMatrix::from_row_slice(k, k, ms4) * fac[3],
            s1_vec: DVector::from_row_slice(vs1) * fac[4],
            s5_linear,
            s5_quadratic,
        }
    }

    /// Shared instance per element order, built on first use
    pub fn cached(order: ElementOrder) -> &'static ElementBasis {
        static LINEAR: OnceLock<ElementBasis> = OnceLock::new();
        static QUADRATIC: OnceLock<ElementBasis> = OnceLock::new();

        match order {
            ElementOrder::Linear => LINEAR.get_or_init(|| ElementBasis::new(order)),
            ElementOrder::Quadratic => QUADRATIC.get_or_init(|| ElementBasis::new(order)),
        }
    }

    pub fn nodes(&self) -> usize {
        self.order.nodes_per_element()
    }

    /// Edge matrix matching the element order, as a dynamically sized matrix
    pub fn s5(&self) -> DMatrix<f64> {
        match self.order {
            ElementOrder::Linear => DMatrix::from_iterator(2, 2, self.s5_linear.iter().copied()),
            ElementOrder::Quadratic => {
                DMatrix::from_iterator(3, 3, self.s5_quadratic.iter().copied())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ORDERS: [ElementOrder; 2] = [ElementOrder::Linear, ElementOrder::Quadratic];

    #[test]
    fn tables_are_symmetric() {
        for order in ORDERS {
            let basis = ElementBasis::new(order);
            for m in [&basis.s1, &basis.s2, &basis.s3, &basis.s4] {
                assert_relative_eq!(m.clone(), m.transpose());
            }
        }
    }

    #[test]
    fn constants_are_in_the_stiffness_kernel() {
        for order in ORDERS {
            let basis = ElementBasis::new(order);
            let ones = DVector::from_element(basis.nodes(), 1.0);
            for m in [&basis.s1, &basis.s2, &basis.s3] {
                assert_relative_eq!((m * &ones).norm(), 0.0, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn mass_integrates_to_reference_area() {
        for order in ORDERS {
            let basis = ElementBasis::new(order);
            assert_relative_eq!(basis.s4.sum(), 0.5, epsilon = 1e-14);
            assert_relative_eq!(basis.s1_vec.sum(), 0.5, epsilon = 1e-14);
        }
    }

    #[test]
    fn linear_values() {
        let basis = ElementBasis::new(ElementOrder::Linear);
        assert_relative_eq!(basis.s1[(0, 0)], 0.5);
        assert_relative_eq!(basis.s2[(0, 0)], 1.0);
        assert_relative_eq!(basis.s2[(1, 2)], 0.5);
        assert_relative_eq!(basis.s4[(0, 0)], 1.0 / 12.0);
        assert_relative_eq!(basis.s4[(0, 1)], 1.0 / 24.0);
        assert_relative_eq!(basis.s1_vec[2], 1.0 / 6.0);
    }

    #[test]
    fn quadratic_reproduces_gradient_energy_of_x_squared() {
        // u = ξ² sampled at c0, c1, c2, m01, m12, m20
        let basis = ElementBasis::new(ElementOrder::Quadratic);
        let u = DVector::from_row_slice(&[0.0, 1.0, 0.0, 0.25, 0.25, 0.0]);

        // ∫ (∂ξ u)² = ∫ 4ξ² = 1/3, ∂η u = 0
        assert_relative_eq!(u.dot(&(&basis.s1 * &u)), 1.0 / 3.0, epsilon = 1e-14);
        assert_relative_eq!(u.dot(&(&basis.s3 * &u)), 0.0, epsilon = 1e-14);
        assert_relative_eq!(u.dot(&(&basis.s2 * &u)), 0.0, epsilon = 1e-14);

        // ∫ ξ⁴ over the reference triangle is 1/30
        assert_relative_eq!(u.dot(&(&basis.s4 * &u)), 1.0 / 30.0, epsilon = 1e-14);
    }

    #[test]
    fn quadratic_mixed_term_of_xy() {
        // u = ξη: ∂ξu = η, ∂ηu = ξ, so S2 gives 2∫ξη = 1/12
        let basis = ElementBasis::new(ElementOrder::Quadratic);
        let u = DVector::from_row_slice(&[0.0, 0.0, 0.0, 0.0, 0.25, 0.0]);
        assert_relative_eq!(u.dot(&(&basis.s2 * &u)), 1.0 / 12.0, epsilon = 1e-14);
    }

    #[test]
    fn edge_matrices() {
        let basis = ElementBasis::cached(ElementOrder::Quadratic);
        assert_relative_eq!(basis.s5_linear.sum(), 1.0, epsilon = 1e-14);
        assert_relative_eq!(basis.s5_quadratic.sum(), 1.0, epsilon = 1e-14);
        assert_relative_eq!(basis.s5_quadratic[(1, 1)], 8.0 / 15.0);
        assert_relative_eq!(basis.s5_quadratic[(0, 2)], -1.0 / 30.0);
        assert_eq!(basis.s5().nrows(), 3);
        assert_eq!(ElementBasis::cached(ElementOrder::Linear).s5().nrows(), 2);
    }
}
