// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

//! Row-wise Fourier plumbing for the sketch domain.
//!
//! Each row of an `[N, output_dim]` matrix is one spatial location's count
//! sketch, and the circular-convolution trick only ever transforms along the
//! sketch axis, so everything here is a batched 1-D transform. Rows are
//! independent and processed in parallel; the per-row result does not depend
//! on scheduling.

use ndarray::{Array2, Zip};
use num_complex::Complex32;
use rustfft::FftPlanner;

/// Forward DFT of every row of a real matrix.
pub fn forward_rows(input: &Array2<f32>) -> Array2<Complex32> {
    let (rows, cols) = input.dim();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(cols);
    let mut out = Array2::zeros((rows, cols));
    Zip::from(out.rows_mut())
        .and(input.rows())
        .par_for_each(|mut dst, src| {
            let mut buf: Vec<Complex32> = src.iter().map(|&re| Complex32::new(re, 0.0)).collect();
            fft.process(&mut buf);
            for (slot, value) in dst.iter_mut().zip(buf) {
                *slot = value;
            }
        });
    out
}

/// Inverse DFT of every row with backward `1/n` normalisation, keeping the
/// real part. For spectra of real circular convolutions the imaginary part
/// vanishes up to rounding.
pub fn inverse_rows_real(input: &Array2<Complex32>) -> Array2<f32> {
    let (rows, cols) = input.dim();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_inverse(cols);
    let scale = 1.0 / cols as f32;
    let mut out = Array2::zeros((rows, cols));
    Zip::from(out.rows_mut())
        .and(input.rows())
        .par_for_each(|mut dst, src| {
            let mut buf: Vec<Complex32> = src.to_vec();
            fft.process(&mut buf);
            for (slot, value) in dst.iter_mut().zip(buf) {
                *slot = value.re * scale;
            }
        });
    out
}

/// Element-wise spectrum product: circular convolution in the sketch domain.
pub fn convolve_spectra(lhs: &Array2<Complex32>, rhs: &Array2<Complex32>) -> Array2<Complex32> {
    Zip::from(lhs).and(rhs).map_collect(|&l, &r| l * r)
}

/// Element-wise conjugate product: circular correlation, the adjoint of
/// [`convolve_spectra`] used by the backward pass.
pub fn correlate_spectra(lhs: &Array2<Complex32>, rhs: &Array2<Complex32>) -> Array2<Complex32> {
    Zip::from(lhs).and(rhs).map_collect(|&l, &r| l * r.conj())
}
