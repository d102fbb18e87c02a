// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of CompactBilinear — Licensed under AGPL-3.0-or-later.

//! Runtime configuration shared by the CompactBilinear crates: a
//! deterministic seeding switch and the tracing bootstrap.

pub mod determinism;
pub mod tracing;
