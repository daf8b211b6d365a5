//! CLI utility modules.

pub mod input;
