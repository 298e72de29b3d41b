//! Built-in tools.

pub mod archive;
