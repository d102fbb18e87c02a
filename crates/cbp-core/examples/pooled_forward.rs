// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

//! Pools two random feature maps into one joint embedding and prints a few
//! summary figures.

use cbp_core::{CompactBilinearPool, PoolOutput};
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_map(
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
    rng: &mut StdRng,
) -> Array4<f32> {
    Array4::from_shape_fn((batch, channels, height, width), |_| {
        rng.gen_range(-1.0..1.0)
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    cbp_config::tracing::init_tracing()?;

    let pool = CompactBilinearPool::new(64, 64, 512)?;
    let mut rng = StdRng::seed_from_u64(7);
    let bottom1 = random_map(2, 64, 7, 7, &mut rng);
    let bottom2 = random_map(2, 64, 7, 7, &mut rng);

    match pool.forward(&bottom1.view(), &bottom2.view())? {
        PoolOutput::Pooled(embedding) => {
            let norm = embedding
                .iter()
                .map(|v| f64::from(*v) * f64::from(*v))
                .sum::<f64>()
                .sqrt();
            println!(
                "pooled embedding: {:?} entries per example, l2 norm {norm:.3}",
                embedding.dim().1
            );
        }
        PoolOutput::Spatial(map) => {
            println!("spatial embedding: {:?}", map.dim());
        }
    }

    Ok(())
}
