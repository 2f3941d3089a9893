//! Template rendering and deployment

pub mod deployer;
pub mod render;
