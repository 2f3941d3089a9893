//! Remote archive installation

pub mod archive;
pub mod installer;
