// src/core/syntax.rs
//! Language-neutral syntax tree consumed by the interaction extractor.
//!
//! A front end (see `languages`) lowers a concrete parse tree into these
//! nodes and fills in whatever type bindings it can resolve. The extractor
//! never looks at source text except through `SyntaxNode::text`.

use serde::{Deserialize, Serialize};

/// Inclusive, 1-based line range of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
}

impl Span {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self { start_line, end_line }
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start_line <= other.start_line && other.end_line <= self.end_line
    }
}

/// Declared kind of a type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    #[default]
    Class,
    AbstractClass,
    Interface,
    Enum,
    Record,
}

/// Node kinds the extractor understands. Everything else is `Other` and is
/// only descended into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    CompilationUnit,
    /// `name` holds the package name.
    PackageDecl,
    /// `name` holds the imported name, `*` suffix for wildcard imports.
    ImportDecl,
    /// `name` is the simple name, `resolved_type` the FQN.
    TypeDecl { type_kind: TypeKind },
    /// `resolved_type` is the supertype FQN.
    Superclass,
    /// `resolved_type` is an implemented (or, for interfaces, extended) FQN.
    InterfaceRef,
    /// `name` is the field name, `resolved_type` its declared type,
    /// `text` its initialiser (if any).
    FieldDecl,
    /// `name` is the keyword, e.g. `public`.
    Modifier,
    /// `name` is the annotation's name as written.
    Annotation,
    /// `name` is the element name (absent for single-value form), `text` the value.
    AnnotationArg,
    /// `name` is the method name.
    MethodDecl { return_type: Option<String> },
    /// `name` is the simple type name.
    ConstructorDecl,
    /// `name` is the parameter name, `resolved_type` its type.
    Parameter,
    /// `resolved_type` is a declared thrown type.
    ThrowsType,
    Block,
    /// `name` is the declared variable, `resolved_type` its type.
    LocalVarDecl,
    /// `name` is the assigned target as written.
    Assignment,
    /// Children: `Condition`, `Then`, optional `Else`.
    If,
    /// Children: optional `Init`, optional `Condition`, optional `Update`, `Body`.
    /// `name` holds the normalised loop header.
    For,
    /// `name` is the loop variable. Children: `Condition` (iterable), `Body`.
    ForEach,
    /// Children: `Condition`, `Body`.
    While,
    /// Children: `Body`, `Condition`.
    DoWhile,
    Condition,
    Then,
    Else,
    Body,
    Init,
    Update,
    /// `name` is the invoked method, `resolved_type` the receiver's type.
    /// Children: optional `Receiver`, `Arguments`.
    MethodCall { return_type: Option<String> },
    /// `this(..)` or `super(..)`; `name` is the keyword, `resolved_type` the target type.
    ConstructorCall,
    /// `name` is the simple type name, `resolved_type` the instantiated FQN.
    ObjectCreation,
    Receiver,
    Arguments,
    /// `name` is the identifier.
    Identifier,
    /// `name` is the accessed field.
    FieldAccess,
    This,
    Super,
    Other,
}

/// One node of the lowered syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Resolved type binding; `None` when the front end could not resolve it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_type: Option<String>,
    /// Whitespace-normalised source text of the node.
    #[serde(default)]
    pub text: String,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            name: None,
            resolved_type: None,
            text: String::new(),
            span,
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, resolved_type: Option<String>) -> Self {
        self.resolved_type = resolved_type;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
        self.children = children;
        self
    }

    pub fn push(&mut self, child: SyntaxNode) {
        self.children.push(child);
    }

    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// First direct child of the given kind.
    pub fn child(&self, kind: &NodeKind) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| &c.kind == kind)
    }

    /// All direct children of the given kind.
    pub fn children_of<'a>(&'a self, kind: &'a NodeKind) -> impl Iterator<Item = &'a SyntaxNode> + 'a {
        self.children.iter().filter(move |c| &c.kind == kind)
    }

    /// The single expression wrapped by a role node such as `Condition` or `Receiver`.
    pub fn inner(&self) -> Option<&SyntaxNode> {
        self.children.first()
    }

    pub fn is_invocation(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::MethodCall { .. } | NodeKind::ConstructorCall | NodeKind::ObjectCreation
        )
    }

    /// Depth-first check that every child span lies inside its parent's span.
    pub fn spans_nested(&self) -> bool {
        self.children
            .iter()
            .all(|c| self.span.contains(&c.span) && c.spans_nested())
    }

    /// Parse a serialised tree. Anything that does not deserialise is a hard error.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  x   >=\n\t0 "), "x >= 0");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_span_nesting() {
        let leaf = SyntaxNode::new(NodeKind::Identifier, Span::new(3, 3)).with_name("x");
        let parent = SyntaxNode::new(NodeKind::Block, Span::new(2, 4)).with_children(vec![leaf.clone()]);
        assert!(parent.spans_nested());

        let bad = SyntaxNode::new(NodeKind::Block, Span::new(4, 5)).with_children(vec![leaf]);
        assert!(!bad.spans_nested());
    }

    #[test]
    fn test_json_round_trip_and_malformed_input() {
        let node = SyntaxNode::new(NodeKind::MethodCall { return_type: Some("int".into()) }, Span::new(1, 1))
            .with_name("size")
            .with_type(Some("java.util.List".into()));
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(SyntaxNode::from_json(&json).unwrap(), node);

        assert!(SyntaxNode::from_json("{\"kind\": 42}").is_err());
    }
}
