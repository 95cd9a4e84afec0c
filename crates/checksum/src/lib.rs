//! Checksum sidecars for depot repositories.
//!
//! Every artifact file and metadata document gets one sidecar per configured
//! digest algorithm, stored beside it with the algorithm as suffix
//! (`widget-1.0.jar.sha256`) and containing the lowercase hex digest with no
//! trailing newline.

mod algorithm;
mod engine;
pub mod error;
mod summary;

pub use crate::algorithm::{DigestAlgorithm, Digests, compute_digests, digest_bytes};
pub use crate::engine::{ChecksumEngine, ChecksumStatus};
pub use crate::summary::{ChecksumFailure, ChecksumSummary};
