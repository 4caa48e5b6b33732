// src/core/sequence/mod.rs
//! Sequence-diagram generation
//!
//! The tracer expands an entry point into an ordered stream of render
//! instructions by walking extracted models through a `ModelIndex`; a
//! renderer turns that stream into diagram text.

mod filter;
mod index;
mod render;
mod signature;
mod tracer;

pub use filter::{DefaultTraceFilter, TraceFilter};
pub use index::{DirectoryIndex, MemoryIndex, ModelIndex, INDEX_MANIFEST};
pub use render::{create_renderer, DiagramRenderer, FragmentStyle, JsonRenderer, MermaidRenderer, RenderInstruction};
pub use signature::{display_name, escape_label, format_argument, EntryPoint};
pub use tracer::{Degradation, SequenceTracer, Trace, TraceOptions};
