//! Agentic archive — files classified business documents into a
//! date-organised folder tree.

pub mod archive;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod storage;
pub mod tools;
