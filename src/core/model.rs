// src/core/model.rs
//! Interaction model produced by the extractor and consumed by the tracer.

use serde::{Deserialize, Serialize};

use super::syntax::{Span, TypeKind};

/// What kind of invocation an interaction record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    MethodCall,
    /// `this(..)` / `super(..)`
    ConstructorCall,
    /// `new T(..)`
    Instantiation,
}

/// One modeled call, constructor invocation or instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Unique within a file, increasing in creation order.
    pub sequence_id: u32,
    pub kind: InteractionKind,
    pub caller: String,
    pub callee: String,
    /// Invoked method, or the constructed type's simple name.
    pub method_name: String,
    /// Receiver variable as written, `this` when there is none.
    pub receiver: String,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_chained_call: Option<Box<InteractionRecord>>,
}

impl InteractionRecord {
    /// This record followed by every record linked through `next_chained_call`.
    pub fn chain(&self) -> Vec<&InteractionRecord> {
        let mut links = vec![self];
        let mut current = self;
        while let Some(next) = current.next_chained_call.as_deref() {
            links.push(next);
            current = next;
        }
        links
    }

    pub fn chain_len(&self) -> usize {
        self.chain().len()
    }
}

/// Kind of a control-flow fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    If,
    ElseIf,
    Else,
    For,
    ForEach,
    While,
    DoWhile,
}

impl FragmentKind {
    pub fn is_loop(&self) -> bool {
        matches!(self, Self::For | Self::ForEach | Self::While | Self::DoWhile)
    }
}

/// A conditional or loop block inside a method body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlowFragment {
    /// Assigned on entry, before any interaction inside the fragment.
    pub sequence_id: u32,
    pub kind: FragmentKind,
    pub condition: String,
    pub span: Span,
    /// Calls made while evaluating the condition (or a loop header).
    #[serde(default)]
    pub condition_interactions: Vec<InteractionRecord>,
    #[serde(default)]
    pub interactions: Vec<InteractionRecord>,
    #[serde(default)]
    pub fragments: Vec<ControlFlowFragment>,
    /// `else if` / `else` branches of an `if`, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<ControlFlowFragment>,
}

impl ControlFlowFragment {
    pub fn new(sequence_id: u32, kind: FragmentKind, condition: impl Into<String>, span: Span) -> Self {
        Self {
            sequence_id,
            kind,
            condition: condition.into(),
            span,
            condition_interactions: Vec::new(),
            interactions: Vec::new(),
            fragments: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Body interactions and nested fragments interleaved in source order.
    pub fn body(&self) -> Vec<BodyItem<'_>> {
        merge_body(&self.interactions, &self.fragments)
    }
}

/// A parameter of a declared method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// `name = value` pair of an annotation; `name` is absent for the single-value form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationInfo {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<AnnotationParameter>,
}

impl AnnotationInfo {
    /// `@Name(key=value, ...)`
    pub fn display(&self) -> String {
        if self.parameters.is_empty() {
            return format!("@{}", self.name);
        }
        let params = self
            .parameters
            .iter()
            .map(|p| match &p.name {
                Some(name) => format!("{}={}", name, p.value),
                None => p.value.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("@{}({})", self.name, params)
    }
}

/// A field declared on the primary type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
    pub line: usize,
}

/// One declared method or constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodGroup {
    pub name: String,
    pub owner: String,
    /// Parameter types joined with `", "`.
    pub signature: String,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub is_constructor: bool,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub interactions: Vec<InteractionRecord>,
    #[serde(default)]
    pub fragments: Vec<ControlFlowFragment>,
    #[serde(default)]
    pub thrown_exceptions: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
}

impl MethodGroup {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, start_line: usize) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            signature: String::new(),
            parameters: Vec::new(),
            return_type: None,
            is_constructor: false,
            start_line,
            end_line: start_line,
            interactions: Vec::new(),
            fragments: Vec::new(),
            thrown_exceptions: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty() && self.fragments.is_empty()
    }

    pub fn is_varargs(&self) -> bool {
        self.parameters
            .last()
            .map(|p| p.type_name.ends_with("..."))
            .unwrap_or(false)
    }

    /// Whether a call with `arity` arguments can bind to this method.
    pub fn accepts_arity(&self, arity: usize) -> bool {
        let declared = self.parameters.len();
        if self.is_varargs() {
            arity + 1 >= declared
        } else {
            arity == declared
        }
    }

    pub fn body(&self) -> Vec<BodyItem<'_>> {
        merge_body(&self.interactions, &self.fragments)
    }
}

/// An entry of a method or fragment body in source order.
#[derive(Debug, Clone, Copy)]
pub enum BodyItem<'a> {
    Interaction(&'a InteractionRecord),
    Fragment(&'a ControlFlowFragment),
}

impl BodyItem<'_> {
    /// Position in source order. A chain takes the id of its last link, which
    /// is recorded after every call nested in the chain's arguments.
    pub fn sequence_id(&self) -> u32 {
        match self {
            BodyItem::Interaction(i) => i.chain().last().map_or(i.sequence_id, |link| link.sequence_id),
            BodyItem::Fragment(f) => f.sequence_id,
        }
    }
}

fn merge_body<'a>(
    interactions: &'a [InteractionRecord],
    fragments: &'a [ControlFlowFragment],
) -> Vec<BodyItem<'a>> {
    let mut items: Vec<BodyItem<'a>> = interactions
        .iter()
        .map(BodyItem::Interaction)
        .chain(fragments.iter().map(BodyItem::Fragment))
        .collect();
    items.sort_by_key(|item| item.sequence_id());
    items
}

/// Everything extracted from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileModel {
    pub package: String,
    /// FQN of the first top-level type; empty for a file without types.
    pub primary_type: String,
    pub type_kind: TypeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superclass: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub method_groups: Vec<MethodGroup>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Every type declared in the file, nested ones included.
    #[serde(default)]
    pub declared_types: Vec<String>,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    /// Call sites whose target type could not be resolved.
    #[serde(default)]
    pub unresolved_references: usize,
}

impl FileModel {
    /// Methods (not constructors) of `owner` named `name`, in declaration order.
    pub fn methods_named<'a>(&'a self, owner: &'a str, name: &'a str) -> impl Iterator<Item = &'a MethodGroup> + 'a {
        self.method_groups
            .iter()
            .filter(move |g| g.owner == owner && g.name == name && !g.is_constructor)
    }

    pub fn constructors_of<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a MethodGroup> + 'a {
        self.method_groups
            .iter()
            .filter(move |g| g.owner == owner && g.is_constructor)
    }

    /// Supertype of `owner`. Only the primary type's supertype is recorded.
    pub fn superclass_of(&self, owner: &str) -> Option<&str> {
        if owner == self.primary_type {
            self.superclass.as_deref()
        } else {
            None
        }
    }

    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, method: &str) -> InteractionRecord {
        InteractionRecord {
            sequence_id: id,
            kind: InteractionKind::MethodCall,
            caller: "a.A".to_string(),
            callee: "a.B".to_string(),
            method_name: method.to_string(),
            receiver: "b".to_string(),
            instance_id: "b2".to_string(),
            return_type: None,
            arguments: vec![],
            assigned_to: None,
            line: 1,
            next_chained_call: None,
        }
    }

    #[test]
    fn test_chain_walks_links_in_order() {
        let mut head = record(1, "f");
        let mut middle = record(2, "g");
        middle.next_chained_call = Some(Box::new(record(3, "h")));
        head.next_chained_call = Some(Box::new(middle));

        let names: Vec<_> = head.chain().iter().map(|r| r.method_name.as_str()).collect();
        assert_eq!(names, vec!["f", "g", "h"]);
        assert_eq!(head.chain_len(), 3);
    }

    #[test]
    fn test_body_is_ordered_by_sequence_id() {
        let mut group = MethodGroup::new("run", "a.A", 1);
        group.interactions.push(record(1, "first"));
        group.interactions.push(record(4, "last"));
        group
            .fragments
            .push(ControlFlowFragment::new(2, FragmentKind::If, "x", Span::new(2, 3)));

        let ids: Vec<_> = group.body().iter().map(|i| i.sequence_id()).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn test_accepts_arity() {
        let mut group = MethodGroup::new("log", "a.A", 1);
        group.parameters.push(ParameterInfo { name: "fmt".into(), type_name: "java.lang.String".into() });
        assert!(group.accepts_arity(1));
        assert!(!group.accepts_arity(2));

        group.parameters.push(ParameterInfo { name: "args".into(), type_name: "java.lang.Object...".into() });
        assert!(group.accepts_arity(1));
        assert!(group.accepts_arity(4));
        assert!(!group.accepts_arity(0));
    }

    #[test]
    fn test_annotation_display() {
        let annotation = AnnotationInfo {
            name: "RequestMapping".into(),
            parameters: vec![
                AnnotationParameter { name: None, value: "\"/users\"".into() },
                AnnotationParameter { name: Some("method".into()), value: "GET".into() },
            ],
        };
        assert_eq!(annotation.display(), "@RequestMapping(\"/users\", method=GET)");
        assert_eq!(AnnotationInfo { name: "Override".into(), parameters: vec![] }.display(), "@Override");
    }
}
