// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

//! Compact bilinear pooling: a fixed-size joint embedding of two
//! multi-channel feature maps.
//!
//! The full bilinear (outer-product) pooling of two `[B, C, H, W]` feature
//! maps grows quadratically in the channel counts. This crate computes the
//! tensor-sketch approximation instead: each channel vector is hashed into
//! `output_dim` buckets with random signs (a count sketch), and the outer
//! product collapses into a circular convolution of the two sketches,
//! evaluated as an element-wise product in the frequency domain. The result
//! is an unbiased randomized estimate whose variance shrinks as `output_dim`
//! grows.
//!
//! The layer is a pure function once constructed: the two sketch matrices are
//! fixed at build time (reproducible from seeds, or supplied explicitly) and
//! every forward call allocates a fresh output, so one instance can serve
//! concurrent callers. An explicit [`CompactBilinearPool::backward`] exposes
//! the reverse-mode rule so the transform composes inside a larger trainable
//! model.
//!
//! ```
//! use cbp_core::{CompactBilinearPool, PoolOutput};
//! use ndarray::Array4;
//!
//! let pool = CompactBilinearPool::new(16, 16, 64)?;
//! let bottom1 = Array4::<f32>::ones((2, 16, 4, 4));
//! let bottom2 = Array4::<f32>::ones((2, 16, 4, 4));
//! let embedding = pool.forward(&bottom1.view(), &bottom2.view())?;
//! match embedding {
//!     PoolOutput::Pooled(joint) => assert_eq!(joint.dim(), (2, 64)),
//!     PoolOutput::Spatial(_) => unreachable!("sum pooling is the default"),
//! }
//! # Ok::<(), cbp_core::PoolError>(())
//! ```

pub mod error;
pub mod pool;
pub mod sketch;
pub mod spectrum;

pub use error::{PoolError, PoolResult};
pub use pool::{CompactBilinearPool, PoolOutput};
pub use sketch::{ProjectionSpec, SketchMatrix};
