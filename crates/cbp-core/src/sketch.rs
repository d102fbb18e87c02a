// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

//! Count-sketch projection structure: reproducible bucket/sign draws and
//! their dense matrix form.

use crate::error::{PoolError, PoolResult};
use cbp_config::determinism;
use ndarray::Array2;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Bucket and sign assignment for one input stream.
///
/// Each input channel `i` is hashed to bucket `buckets[i]` in
/// `[0, output_dim)` with weight `signs[i] ∈ {+1, -1}`. Immutable after
/// construction; the same seeds always reproduce the same assignment, so a
/// model can be re-loaded without persisting the matrix itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    buckets: Vec<usize>,
    signs: Vec<f32>,
    output_dim: usize,
}

impl ProjectionSpec {
    /// Validates and wraps caller-supplied bucket/sign sequences.
    pub fn from_parts(
        buckets: Vec<usize>,
        signs: Vec<f32>,
        output_dim: usize,
    ) -> PoolResult<Self> {
        if output_dim == 0 {
            return Err(PoolError::invalid("output_dim", "must be positive"));
        }
        if buckets.is_empty() {
            return Err(PoolError::invalid("buckets", "must be non-empty"));
        }
        if buckets.len() != signs.len() {
            return Err(PoolError::invalid(
                "signs",
                format!(
                    "length {} does not match {} bucket indices",
                    signs.len(),
                    buckets.len()
                ),
            ));
        }
        if let Some((row, &bucket)) = buckets
            .iter()
            .enumerate()
            .find(|&(_, &bucket)| bucket >= output_dim)
        {
            return Err(PoolError::invalid(
                "buckets",
                format!("bucket {bucket} at row {row} is outside [0, {output_dim})"),
            ));
        }
        if let Some((row, &sign)) = signs
            .iter()
            .enumerate()
            .find(|&(_, &sign)| sign != 1.0 && sign != -1.0)
        {
            return Err(PoolError::invalid(
                "signs",
                format!("sign {sign} at row {row} must be +1 or -1"),
            ));
        }
        Ok(Self {
            buckets,
            signs,
            output_dim,
        })
    }

    /// Draws a spec from two explicit seeds, one for the bucket stream and
    /// one for the sign stream. Advances no state other than the two local
    /// generators.
    pub fn draw(
        input_dim: usize,
        output_dim: usize,
        bucket_seed: u64,
        sign_seed: u64,
    ) -> PoolResult<Self> {
        Self::check_dims(input_dim, output_dim)?;
        let mut bucket_rng = StdRng::seed_from_u64(bucket_seed);
        let mut sign_rng = StdRng::seed_from_u64(sign_seed);
        Ok(Self::sample(
            input_dim,
            output_dim,
            &mut bucket_rng,
            &mut sign_rng,
        ))
    }

    /// Draws a spec with seeds derived from the deterministic runtime
    /// configuration, so independently labelled layers in one model stay
    /// reproducible from a single base seed. When determinism is disabled
    /// in the environment this draws a fresh random sketch.
    pub fn draw_labeled(input_dim: usize, output_dim: usize, label: &str) -> PoolResult<Self> {
        Self::check_dims(input_dim, output_dim)?;
        let mut bucket_rng = determinism::rng_from_label(&format!("{label}/buckets"));
        let mut sign_rng = determinism::rng_from_label(&format!("{label}/signs"));
        Ok(Self::sample(
            input_dim,
            output_dim,
            &mut bucket_rng,
            &mut sign_rng,
        ))
    }

    fn check_dims(input_dim: usize, output_dim: usize) -> PoolResult<()> {
        if input_dim == 0 {
            return Err(PoolError::invalid("input_dim", "must be positive"));
        }
        if output_dim == 0 {
            return Err(PoolError::invalid("output_dim", "must be positive"));
        }
        Ok(())
    }

    fn sample(
        input_dim: usize,
        output_dim: usize,
        bucket_rng: &mut StdRng,
        sign_rng: &mut StdRng,
    ) -> Self {
        let bucket_dist = Uniform::from(0..output_dim);
        let buckets = (0..input_dim)
            .map(|_| bucket_dist.sample(bucket_rng))
            .collect();
        let signs = (0..input_dim)
            .map(|_| if sign_rng.gen::<bool>() { 1.0 } else { -1.0 })
            .collect();
        Self {
            buckets,
            signs,
            output_dim,
        }
    }

    /// Number of input channels this spec hashes.
    pub fn input_dim(&self) -> usize {
        self.buckets.len()
    }

    /// Number of sketch buckets.
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Bucket index per input channel.
    pub fn buckets(&self) -> &[usize] {
        &self.buckets
    }

    /// Sign per input channel.
    pub fn signs(&self) -> &[f32] {
        &self.signs
    }
}

/// Dense count-sketch matrix with exactly one `±1` entry per row.
#[derive(Clone, Debug, PartialEq)]
pub struct SketchMatrix {
    matrix: Array2<f32>,
}

impl SketchMatrix {
    /// Densifies a projection spec into its `[input_dim, output_dim]` form.
    /// The dense layout is built directly; no sparse intermediate is kept
    /// since the matrix participates in ordinary matmuls afterwards.
    pub fn from_spec(spec: &ProjectionSpec) -> Self {
        let mut matrix = Array2::zeros((spec.input_dim(), spec.output_dim()));
        for (row, (&bucket, &sign)) in spec.buckets().iter().zip(spec.signs()).enumerate() {
            matrix[[row, bucket]] = sign;
        }
        Self { matrix }
    }

    pub fn input_dim(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.matrix.ncols()
    }

    /// The dense matrix, rows indexed by input channel.
    pub fn as_array(&self) -> &Array2<f32> {
        &self.matrix
    }
}
