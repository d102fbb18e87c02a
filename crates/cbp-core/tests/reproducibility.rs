// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

//! Reproducibility of construction and safety of concurrent forward calls.

use cbp_core::{CompactBilinearPool, ProjectionSpec, SketchMatrix};
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_map(shape: (usize, usize, usize, usize), seed: u64) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array4::from_shape_fn(shape, |_| rng.gen_range(-1.0..1.0))
}

#[test]
fn identical_seeds_build_identical_matrices() {
    let first = SketchMatrix::from_spec(&ProjectionSpec::draw(32, 64, 9, 11).unwrap());
    let second = SketchMatrix::from_spec(&ProjectionSpec::draw(32, 64, 9, 11).unwrap());
    assert_eq!(first.as_array(), second.as_array());
}

#[test]
fn shared_spec_reuses_one_sketch_across_instances() {
    let spec = ProjectionSpec::draw(8, 16, 301, 303).unwrap();
    let first =
        CompactBilinearPool::with_specs(8, 8, 16, true, Some(spec.clone()), None).unwrap();
    let second = CompactBilinearPool::with_specs(8, 8, 16, true, Some(spec), None).unwrap();
    assert_eq!(
        first.sketches().0.as_array(),
        second.sketches().0.as_array()
    );
}

#[test]
fn concurrent_forward_calls_agree_with_sequential_ones() {
    let pool = CompactBilinearPool::new(8, 8, 32).unwrap();
    let bottom1 = random_map((2, 8, 3, 3), 401);
    let bottom2 = random_map((2, 8, 3, 3), 409);
    let sequential = pool.forward(&bottom1.view(), &bottom2.view()).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = &pool;
                let bottom1 = &bottom1;
                let bottom2 = &bottom2;
                scope.spawn(move || pool.forward(&bottom1.view(), &bottom2.view()).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), sequential);
        }
    });
}
