// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

//! Compact bilinear pooling layer: count-sketch projection of both inputs,
//! circular convolution realised in the frequency domain, and optional
//! spatial sum pooling.

use crate::error::{PoolError, PoolResult};
use crate::sketch::{ProjectionSpec, SketchMatrix};
use crate::spectrum;
use ndarray::{Array2, Array4, ArrayView4, Axis};
use tracing::debug;

/// Default per-stream `(bucket, sign)` seed pairs, kept from the reference
/// implementation so default-constructed layers stay deterministic across
/// builds without persisting their matrices.
const DEFAULT_SEEDS: [(u64, u64); 2] = [(1, 3), (5, 7)];

/// Result of one forward call.
///
/// The same enum carries the upstream gradient into
/// [`CompactBilinearPool::backward`], since a gradient always has the
/// output's shape.
#[derive(Clone, Debug, PartialEq)]
pub enum PoolOutput {
    /// `[batch, output_dim]`, spatial positions collapsed by summation.
    Pooled(Array2<f32>),
    /// `[batch, height, width, output_dim]`, one embedding per position.
    Spatial(Array4<f32>),
}

impl PoolOutput {
    pub fn as_pooled(&self) -> Option<&Array2<f32>> {
        match self {
            PoolOutput::Pooled(values) => Some(values),
            PoolOutput::Spatial(_) => None,
        }
    }

    pub fn as_spatial(&self) -> Option<&Array4<f32>> {
        match self {
            PoolOutput::Pooled(_) => None,
            PoolOutput::Spatial(values) => Some(values),
        }
    }
}

/// Joint embedding of two feature maps by compact bilinear pooling.
///
/// Holds one fixed sketch matrix per input stream, drawn independently so
/// the tensor-sketch estimate stays unbiased. The output is a randomized
/// approximation of the full outer-product pooling; its variance decreases
/// as `output_dim` grows, and a very small `output_dim` relative to the
/// channel counts is a quality issue rather than an error.
#[derive(Clone, Debug)]
pub struct CompactBilinearPool {
    input_dim1: usize,
    input_dim2: usize,
    output_dim: usize,
    sum_pool: bool,
    sketch1: SketchMatrix,
    sketch2: SketchMatrix,
}

impl CompactBilinearPool {
    /// Builds a sum-pooling layer with the default per-stream seeds.
    pub fn new(input_dim1: usize, input_dim2: usize, output_dim: usize) -> PoolResult<Self> {
        Self::with_specs(input_dim1, input_dim2, output_dim, true, None, None)
    }

    /// Builds a layer with explicit `(bucket_seed, sign_seed)` pairs per
    /// stream, for callers embedding several independent instances.
    pub fn seeded(
        input_dim1: usize,
        input_dim2: usize,
        output_dim: usize,
        sum_pool: bool,
        seeds1: (u64, u64),
        seeds2: (u64, u64),
    ) -> PoolResult<Self> {
        let spec1 = ProjectionSpec::draw(input_dim1, output_dim, seeds1.0, seeds1.1)?;
        let spec2 = ProjectionSpec::draw(input_dim2, output_dim, seeds2.0, seeds2.1)?;
        Self::with_specs(
            input_dim1,
            input_dim2,
            output_dim,
            sum_pool,
            Some(spec1),
            Some(spec2),
        )
    }

    /// Builds a layer from optional externally supplied projection specs;
    /// `None` falls back to the default seeds for that stream. Supplying a
    /// spec allows sharing one sketch across several layer instances.
    pub fn with_specs(
        input_dim1: usize,
        input_dim2: usize,
        output_dim: usize,
        sum_pool: bool,
        spec1: Option<ProjectionSpec>,
        spec2: Option<ProjectionSpec>,
    ) -> PoolResult<Self> {
        if input_dim1 == 0 {
            return Err(PoolError::invalid("input_dim1", "must be positive"));
        }
        if input_dim2 == 0 {
            return Err(PoolError::invalid("input_dim2", "must be positive"));
        }
        if output_dim == 0 {
            return Err(PoolError::invalid("output_dim", "must be positive"));
        }
        let spec1 = match spec1 {
            Some(spec) => spec,
            None => ProjectionSpec::draw(
                input_dim1,
                output_dim,
                DEFAULT_SEEDS[0].0,
                DEFAULT_SEEDS[0].1,
            )?,
        };
        let spec2 = match spec2 {
            Some(spec) => spec,
            None => ProjectionSpec::draw(
                input_dim2,
                output_dim,
                DEFAULT_SEEDS[1].0,
                DEFAULT_SEEDS[1].1,
            )?,
        };
        check_spec("spec1", &spec1, input_dim1, output_dim)?;
        check_spec("spec2", &spec2, input_dim2, output_dim)?;
        debug!(
            input_dim1,
            input_dim2, output_dim, sum_pool, "built compact bilinear pool"
        );
        Ok(Self {
            input_dim1,
            input_dim2,
            output_dim,
            sum_pool,
            sketch1: SketchMatrix::from_spec(&spec1),
            sketch2: SketchMatrix::from_spec(&spec2),
        })
    }

    pub fn input_dims(&self) -> (usize, usize) {
        (self.input_dim1, self.input_dim2)
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn sum_pool(&self) -> bool {
        self.sum_pool
    }

    /// Sketch matrices for the two streams, in order.
    pub fn sketches(&self) -> (&SketchMatrix, &SketchMatrix) {
        (&self.sketch1, &self.sketch2)
    }

    /// Runs the transform on two `[B, C, H, W]` feature maps.
    ///
    /// Every spatial location is pooled independently: the leading batch and
    /// spatial axes are flattened into one row axis, each row's channel
    /// vector is count-sketched, and the two sketches are circularly
    /// convolved via the frequency domain. With sum pooling enabled the
    /// per-position embeddings are then summed over height and width.
    pub fn forward(
        &self,
        bottom1: &ArrayView4<f32>,
        bottom2: &ArrayView4<f32>,
    ) -> PoolResult<PoolOutput> {
        let (batch, height, width) = self.check_inputs(bottom1, bottom2)?;
        let flat1 = flatten_positions(bottom1, self.input_dim1)?;
        let flat2 = flatten_positions(bottom2, self.input_dim2)?;
        let sketched1 = flat1.dot(self.sketch1.as_array());
        let sketched2 = flat2.dot(self.sketch2.as_array());
        let spectrum1 = spectrum::forward_rows(&sketched1);
        let spectrum2 = spectrum::forward_rows(&sketched2);
        let product = spectrum::convolve_spectra(&spectrum1, &spectrum2);
        let convolved = spectrum::inverse_rows_real(&product);
        let spatial = convolved
            .into_shape((batch, height, width, self.output_dim))
            .map_err(|err| PoolError::invalid("output", err.to_string()))?;
        if self.sum_pool {
            Ok(PoolOutput::Pooled(
                spatial.sum_axis(Axis(1)).sum_axis(Axis(1)),
            ))
        } else {
            Ok(PoolOutput::Spatial(spatial))
        }
    }

    /// Reverse-mode rule: pushes an upstream gradient back to both inputs.
    ///
    /// `grad_output` must match the layer's pooling mode and the shape the
    /// forward call produced for these inputs. The gradient of a circular
    /// convolution with respect to one sketch is the circular correlation of
    /// the upstream gradient with the other sketch; from there the sketch
    /// matrices are applied transposed. Returns `(grad_bottom1,
    /// grad_bottom2)` in `[B, C, H, W]` layout.
    pub fn backward(
        &self,
        bottom1: &ArrayView4<f32>,
        bottom2: &ArrayView4<f32>,
        grad_output: &PoolOutput,
    ) -> PoolResult<(Array4<f32>, Array4<f32>)> {
        let (batch, height, width) = self.check_inputs(bottom1, bottom2)?;
        let positions = batch * height * width;
        let grad_flat: Array2<f32> = match (self.sum_pool, grad_output) {
            (true, PoolOutput::Pooled(grad)) => {
                if grad.dim() != (batch, self.output_dim) {
                    return Err(PoolError::ShapeMismatch {
                        label: "grad_output",
                        expected: vec![batch, self.output_dim],
                        got: grad.shape().to_vec(),
                    });
                }
                // Sum pooling: every position of a batch entry receives the
                // same pooled gradient row.
                let mut flat = Array2::zeros((positions, self.output_dim));
                for (row, mut dst) in flat.rows_mut().into_iter().enumerate() {
                    dst.assign(&grad.row(row / (height * width)));
                }
                flat
            }
            (false, PoolOutput::Spatial(grad)) => {
                if grad.dim() != (batch, height, width, self.output_dim) {
                    return Err(PoolError::ShapeMismatch {
                        label: "grad_output",
                        expected: vec![batch, height, width, self.output_dim],
                        got: grad.shape().to_vec(),
                    });
                }
                grad.clone()
                    .into_shape((positions, self.output_dim))
                    .map_err(|err| PoolError::invalid("grad_output", err.to_string()))?
            }
            (true, PoolOutput::Spatial(_)) => {
                return Err(PoolError::invalid(
                    "grad_output",
                    "expected a pooled gradient for a sum-pooling layer",
                ));
            }
            (false, PoolOutput::Pooled(_)) => {
                return Err(PoolError::invalid(
                    "grad_output",
                    "expected a spatial gradient for a non-pooling layer",
                ));
            }
        };

        let flat1 = flatten_positions(bottom1, self.input_dim1)?;
        let flat2 = flatten_positions(bottom2, self.input_dim2)?;
        let spectrum1 = spectrum::forward_rows(&flat1.dot(self.sketch1.as_array()));
        let spectrum2 = spectrum::forward_rows(&flat2.dot(self.sketch2.as_array()));
        let grad_spectrum = spectrum::forward_rows(&grad_flat);

        let grad_sketch1 =
            spectrum::inverse_rows_real(&spectrum::correlate_spectra(&grad_spectrum, &spectrum2));
        let grad_sketch2 =
            spectrum::inverse_rows_real(&spectrum::correlate_spectra(&grad_spectrum, &spectrum1));

        let grad_flat1 = grad_sketch1.dot(&self.sketch1.as_array().t());
        let grad_flat2 = grad_sketch2.dot(&self.sketch2.as_array().t());

        Ok((
            unflatten_positions(grad_flat1, batch, height, width)?,
            unflatten_positions(grad_flat2, batch, height, width)?,
        ))
    }

    /// Validates the channel contract and the shared batch/spatial extents.
    /// Runs before any computation so a mismatch never produces partial
    /// output.
    fn check_inputs(
        &self,
        bottom1: &ArrayView4<f32>,
        bottom2: &ArrayView4<f32>,
    ) -> PoolResult<(usize, usize, usize)> {
        let (b1, c1, h1, w1) = bottom1.dim();
        let (b2, c2, h2, w2) = bottom2.dim();
        if c1 != self.input_dim1 {
            return Err(PoolError::ShapeMismatch {
                label: "bottom1",
                expected: vec![b1, self.input_dim1, h1, w1],
                got: vec![b1, c1, h1, w1],
            });
        }
        if c2 != self.input_dim2 {
            return Err(PoolError::ShapeMismatch {
                label: "bottom2",
                expected: vec![b2, self.input_dim2, h2, w2],
                got: vec![b2, c2, h2, w2],
            });
        }
        if (b1, h1, w1) != (b2, h2, w2) {
            return Err(PoolError::ShapeMismatch {
                label: "bottom2",
                expected: vec![b1, self.input_dim2, h1, w1],
                got: vec![b2, c2, h2, w2],
            });
        }
        Ok((b1, h1, w1))
    }
}

fn check_spec(
    label: &'static str,
    spec: &ProjectionSpec,
    input_dim: usize,
    output_dim: usize,
) -> PoolResult<()> {
    if spec.input_dim() != input_dim {
        return Err(PoolError::invalid(
            label,
            format!(
                "spec hashes {} channels but the stream has {input_dim}",
                spec.input_dim()
            ),
        ));
    }
    if spec.output_dim() != output_dim {
        return Err(PoolError::invalid(
            label,
            format!(
                "spec targets {} buckets but the layer produces {output_dim}",
                spec.output_dim()
            ),
        ));
    }
    Ok(())
}

/// `[B, C, H, W]` → `[B·H·W, C]`, one row per spatial location.
fn flatten_positions(input: &ArrayView4<f32>, channels: usize) -> PoolResult<Array2<f32>> {
    let (batch, _, height, width) = input.dim();
    let positions = batch * height * width;
    let relocated = input.view().permuted_axes([0, 2, 3, 1]);
    relocated
        .as_standard_layout()
        .into_owned()
        .into_shape((positions, channels))
        .map_err(|err| PoolError::invalid("feature_map", err.to_string()))
}

/// `[B·H·W, C]` → `[B, C, H, W]`.
fn unflatten_positions(
    flat: Array2<f32>,
    batch: usize,
    height: usize,
    width: usize,
) -> PoolResult<Array4<f32>> {
    let channels = flat.ncols();
    let spatial = flat
        .into_shape((batch, height, width, channels))
        .map_err(|err| PoolError::invalid("gradient", err.to_string()))?;
    Ok(spatial
        .permuted_axes([0, 3, 1, 2])
        .as_standard_layout()
        .into_owned())
}
