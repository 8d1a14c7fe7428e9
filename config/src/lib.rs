// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Workload manifest model, decoding, and validation.
//!
//! This crate is pure data: it never contacts the host.  Everything the
//! reconciler needs from a submitted manifest is normalized and checked
//! here first.

mod decode;
mod model;
mod validate;

pub use decode::{DecodeError, decode_workload};
pub use model::{Metadata, NetworkType, Port, TrexWorkload, WorkloadSpec};
pub use validate::{ValidationError, validate};
