//! Property-based checks of mask algebra, advection and the Laplacian stencil.

use gridfluid::{
    advect_scalar, advect_velocity, masked_laplace, mask_union, Domain, Field, Grid,
    MacVelocity,
};
use proptest::prelude::*;

const WIDTH: usize = 6;
const HEIGHT: usize = 5;

fn grid() -> Grid {
    Grid::new(&[WIDTH, HEIGHT], 0.5)
}

fn bits() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), WIDTH * HEIGHT)
}

fn values() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-5.0..5.0f64, WIDTH * HEIGHT)
}

fn mask(grid: &Grid, bits: &[bool]) -> Field {
    let data = bits.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect();
    Field::from_data(grid, data).unwrap()
}

fn velocity(grid: &Grid, u: f64, v: f64, wobble: f64) -> MacVelocity {
    MacVelocity::from_fn(grid, |axis, pos| {
        let base = if axis == 0 { u } else { v };
        base + wobble * (pos[0] - pos[1]).sin()
    })
}

#[test]
fn mask_union_matches_logical_or() {
    let g = Grid::new(&[4], 1.0);
    let a = Field::from_data(&g, vec![0.0, 0.0, 1.0, 1.0]).unwrap();
    let b = Field::from_data(&g, vec![0.0, 1.0, 0.0, 1.0]).unwrap();
    assert_eq!(mask_union(&a, &b).data(), &[0.0, 1.0, 1.0, 1.0]);
}

proptest! {
    #[test]
    fn union_is_elementwise_or(a in bits(), b in bits()) {
        let g = grid();
        let union = mask_union(&mask(&g, &a), &mask(&g, &b));
        for i in 0..a.len() {
            let expected = if a[i] || b[i] { 1.0 } else { 0.0 };
            prop_assert_eq!(union.at(i), expected);
        }
    }

    #[test]
    fn zero_dt_advection_is_identity(data in values(), u in -3.0..3.0f64, v in -3.0..3.0f64) {
        let g = grid();
        let field = Field::from_data(&g, data).unwrap();
        let flow = velocity(&g, u, v, 0.5);
        prop_assert_eq!(advect_scalar(&field, &flow, 0.0).unwrap(), field);
        prop_assert_eq!(advect_velocity(&flow, &flow, 0.0).unwrap(), flow);
    }

    #[test]
    fn uniform_field_stays_uniform(
        level in -10.0..10.0f64,
        u in -3.0..3.0f64,
        v in -3.0..3.0f64,
        dt in 0.0..2.0f64,
    ) {
        let domain = Domain::closed(grid());
        let field = Field::new(domain.grid(), level)
            .with_extrapolation(&domain.scalar_extrapolation());
        let flow = velocity(domain.grid(), u, v, 1.0);
        let advected = advect_scalar(&field, &flow, dt).unwrap();
        for i in 0..advected.len() {
            prop_assert!((advected.at(i) - level).abs() <= 1e-12 * (1.0 + level.abs()));
        }
    }

    #[test]
    fn advected_values_stay_within_bounds(data in values(), u in -3.0..3.0f64, v in -3.0..3.0f64) {
        let domain = Domain::closed(grid());
        let field = Field::from_data(domain.grid(), data)
            .unwrap()
            .with_extrapolation(&domain.scalar_extrapolation());
        let (lo, hi) = field.min_max();
        let advected = advect_scalar(&field, &velocity(domain.grid(), u, v, 0.7), 0.4).unwrap();
        let (out_lo, out_hi) = advected.min_max();
        prop_assert!(out_lo >= lo - 1e-12);
        prop_assert!(out_hi <= hi + 1e-12);
    }

    #[test]
    fn laplacian_is_self_adjoint_on_nested_masks(
        accessible_bits in bits(),
        active_bits in bits(),
        p in values(),
        q in values(),
    ) {
        let domain = Domain::closed(grid());
        let g = domain.grid();
        let accessible = mask(g, &accessible_bits)
            .with_extrapolation(&domain.accessible_extrapolation());
        let nested: Vec<bool> = active_bits
            .iter()
            .zip(accessible_bits.iter())
            .map(|(a, m)| *a && *m)
            .collect();
        let active = mask(g, &nested).with_extrapolation(&domain.active_extrapolation());
        let p = Field::from_data(g, p).unwrap().with_extrapolation(&domain.pressure_extrapolation());
        let q = Field::from_data(g, q).unwrap().with_extrapolation(&domain.pressure_extrapolation());
        let lp = masked_laplace(&p, &active, &accessible).unwrap();
        let lq = masked_laplace(&q, &active, &accessible).unwrap();
        let left = lp.dot(&q);
        let right = p.dot(&lq);
        prop_assert!((left - right).abs() <= 1e-9 * (1.0 + left.abs()));
    }
}
