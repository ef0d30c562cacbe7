//! Primal Digest - Tiled Multiplex PCR Primer Scheme Design
//!
//! Tiles overlapping amplicons across one or more reference genomes and
//! splits them into multiplex pools whose primers do not interact.

pub mod design;

pub use design::*;
