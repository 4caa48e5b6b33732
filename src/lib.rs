//! seqtrace: Mermaid sequence diagrams from the call structure of Java sources.
//!
//! Sources are lowered to a syntax tree, each file is reduced to a
//! [`core::FileModel`] of interactions and control-flow fragments, and a
//! [`core::SequenceTracer`] expands an entry point over those models into
//! render instructions.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
