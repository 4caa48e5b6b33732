// src/core/mod.rs
pub mod engine;
pub mod extractor;
pub mod model;
pub mod parser;
pub mod syntax;

// Sequence tracing and rendering
pub mod sequence;

// Language-specific front ends
pub mod languages;

pub use extractor::extract;
pub use model::{
    AnnotationInfo, BodyItem, ControlFlowFragment, FieldDescriptor, FileModel, FragmentKind, InteractionKind,
    InteractionRecord, MethodGroup,
};
pub use parser::{calculate_hash, extract_source, extract_sources, SourceCollector, SourceFile};
pub use sequence::{
    DefaultTraceFilter, DiagramRenderer, DirectoryIndex, EntryPoint, MemoryIndex, MermaidRenderer, ModelIndex,
    RenderInstruction, SequenceTracer, Trace, TraceFilter, TraceOptions,
};

// Export the main engine
pub use engine::{Engine, ExtractionSummary};
