//! Remote host access

pub mod command;
pub mod executor;
pub mod fs;
