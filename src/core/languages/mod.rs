//! Language front ends.
//!
//! A front end turns source text into the language-neutral `SyntaxNode`
//! tree the extractor walks. Java is the only language supported; the
//! catalog gives its binder a view of declarations across the whole project.

pub mod catalog;
mod java;

pub use catalog::{ImportContext, TypeCatalog, TypeDeclaration};
pub use java::JavaFrontEnd;

use crate::core::syntax::SyntaxNode;
use crate::error::Result;

/// Trait that all language front ends implement
pub trait LanguageFrontEnd {
    /// Lower source code into a syntax tree, binding against `catalog`
    fn lower(&mut self, content: &str, catalog: &TypeCatalog) -> Result<SyntaxNode>;

    /// Get the file extensions this front end handles
    fn file_extensions(&self) -> &[&str];

    /// Get the language name
    fn language_name(&self) -> &str;
}

impl LanguageFrontEnd for JavaFrontEnd {
    fn lower(&mut self, content: &str, catalog: &TypeCatalog) -> Result<SyntaxNode> {
        JavaFrontEnd::lower(self, content, catalog)
    }

    fn file_extensions(&self) -> &[&str] {
        &["java"]
    }

    fn language_name(&self) -> &str {
        "java"
    }
}
