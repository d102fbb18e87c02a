// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

//! The tensor-sketch estimate must converge toward exact bilinear pooling as
//! the sketch dimensionality grows.

use cbp_core::CompactBilinearPool;
use ndarray::{Array1, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const INPUT_DIM: usize = 4;
const DRAWS: u64 = 200;

fn random_vector(rng: &mut StdRng) -> Array1<f32> {
    Array1::from_shape_fn(INPUT_DIM, |_| rng.gen_range(-1.0..1.0))
}

fn as_feature_map(vector: &Array1<f32>) -> Array4<f32> {
    vector
        .clone()
        .into_shape((1, INPUT_DIM, 1, 1))
        .expect("vector reshapes to a 1x1 feature map")
}

fn dot(a: &Array1<f32>, b: &Array1<f32>) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| f64::from(x) * f64::from(y)).sum()
}

/// Mean squared error, over independent sketch draws, of the pooled-output
/// inner product against the exact outer-product pooling inner product
/// `<x_a, x_b>·<y_a, y_b>`.
fn sketch_mse(
    output_dim: usize,
    xa: &Array1<f32>,
    ya: &Array1<f32>,
    xb: &Array1<f32>,
    yb: &Array1<f32>,
) -> f64 {
    let exact = dot(xa, xb) * dot(ya, yb);
    let (map_xa, map_ya) = (as_feature_map(xa), as_feature_map(ya));
    let (map_xb, map_yb) = (as_feature_map(xb), as_feature_map(yb));
    let mut squared_error = 0.0f64;
    for draw in 0..DRAWS {
        let base = 10_000 + draw * 4;
        let pool = CompactBilinearPool::seeded(
            INPUT_DIM,
            INPUT_DIM,
            output_dim,
            true,
            (base, base + 1),
            (base + 2, base + 3),
        )
        .expect("pool builds");
        let a = pool
            .forward(&map_xa.view(), &map_ya.view())
            .expect("forward succeeds");
        let b = pool
            .forward(&map_xb.view(), &map_yb.view())
            .expect("forward succeeds");
        let estimate: f64 = a
            .as_pooled()
            .unwrap()
            .row(0)
            .iter()
            .zip(b.as_pooled().unwrap().row(0))
            .map(|(&x, &y)| f64::from(x) * f64::from(y))
            .sum();
        squared_error += (estimate - exact).powi(2);
    }
    squared_error / DRAWS as f64
}

#[test]
fn mse_against_exact_pooling_decreases_with_output_dim() {
    let mut rng = StdRng::seed_from_u64(2024);
    let xa = random_vector(&mut rng);
    let ya = random_vector(&mut rng);
    let xb = random_vector(&mut rng);
    let yb = random_vector(&mut rng);

    let mse: Vec<f64> = [16usize, 64, 256]
        .iter()
        .map(|&output_dim| sketch_mse(output_dim, &xa, &ya, &xb, &yb))
        .collect();

    assert!(
        mse[1] < mse[0],
        "mse did not drop from 16 to 64 buckets: {mse:?}"
    );
    assert!(
        mse[2] < mse[1],
        "mse did not drop from 64 to 256 buckets: {mse:?}"
    );
}
