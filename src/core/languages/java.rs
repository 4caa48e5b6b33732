// src/core/languages/java.rs - tree-sitter front end with a best-effort binder
use std::collections::HashMap;

use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

use super::catalog::{erase, ImportContext, MethodShape, TypeCatalog, TypeDeclaration};
use crate::core::syntax::{normalize_whitespace, NodeKind, Span, SyntaxNode, TypeKind};
use crate::error::{Result, SeqTraceError};

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

/// Java front end: parses with tree-sitter and lowers the concrete tree into
/// `SyntaxNode`s carrying resolved type names.
pub struct JavaFrontEnd {
    parser: Parser,
}

impl JavaFrontEnd {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let java_language = tree_sitter_java::language();
        parser
            .set_language(&java_language)
            .map_err(|e| SeqTraceError::Parser(format!("Failed to set Java language: {}", e)))?;

        Ok(Self { parser })
    }

    fn parse_tree(&mut self, source: &str) -> Result<Tree> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| SeqTraceError::Parser("Failed to parse Java code".to_string()))
    }

    /// Declarations of every type in `source`, nested types included.
    pub fn declarations(&mut self, source: &str) -> Result<Vec<TypeDeclaration>> {
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();
        let context = file_context(root, source);

        let mut declarations = Vec::new();
        for node in named_children(root) {
            if TYPE_DECLARATIONS.contains(&node.kind()) {
                collect_declaration(node, source, &context, None, &mut declarations);
            }
        }
        Ok(declarations)
    }

    /// Lower `source`, binding names against `catalog`.
    pub fn lower(&mut self, source: &str, catalog: &TypeCatalog) -> Result<SyntaxNode> {
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();
        if root.has_error() {
            debug!("Source contains syntax errors, lowering the recoverable parts");
        }

        let mut lowerer = Lowerer::new(source, catalog, file_context(root, source));
        Ok(lowerer.lower_program(root))
    }

    /// Lower a file on its own, with a catalog built from its declarations only.
    pub fn lower_standalone(&mut self, source: &str) -> Result<SyntaxNode> {
        let catalog = TypeCatalog::new();
        for declaration in self.declarations(source)? {
            catalog.insert(declaration);
        }
        self.lower(source, &catalog)
    }
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    let children = node
        .named_children(&mut cursor)
        .filter(|c| !is_comment(c))
        .collect();
    children
}

fn all_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    let children = node.children(&mut cursor).collect();
    children
}

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let children = node.children_by_field_name(field, &mut cursor).collect();
    children
}

fn find_child_by_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    all_children(node).into_iter().find(|c| c.kind() == kind)
}

fn is_comment(node: &Node) -> bool {
    matches!(node.kind(), "line_comment" | "block_comment")
}

fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

fn span_of(node: Node) -> Span {
    Span::new(node.start_position().row + 1, node.end_position().row + 1)
}

fn simple_name(type_name: &str) -> &str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

fn is_capitalised(name: &str) -> bool {
    name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

/// Package, imports and declared type names of a compilation unit.
fn file_context(root: Node, source: &str) -> ImportContext {
    let mut context = ImportContext::default();

    for node in named_children(root) {
        match node.kind() {
            "package_declaration" => {
                if let Some(name) = named_children(node)
                    .into_iter()
                    .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
                {
                    context.package = node_text(name, source).to_string();
                }
            }
            "import_declaration" => {
                let children = all_children(node);
                let is_static = children.iter().any(|c| c.kind() == "static");
                let is_wildcard = children.iter().any(|c| c.kind() == "asterisk");
                let Some(name) = children
                    .iter()
                    .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
                else {
                    continue;
                };
                let name = node_text(*name, source).to_string();
                match (is_static, is_wildcard) {
                    (false, false) => {
                        context.single.insert(simple_name(&name).to_string(), name);
                    }
                    (false, true) => context.wildcards.push(name),
                    (true, false) => {
                        if let Some((owner, member)) = name.rsplit_once('.') {
                            context.static_members.insert(member.to_string(), owner.to_string());
                        }
                    }
                    (true, true) => {}
                }
            }
            _ => {}
        }
    }

    let package = context.package.clone();
    for node in named_children(root) {
        if TYPE_DECLARATIONS.contains(&node.kind()) {
            register_local_types(node, source, &package, None, &mut context.local_types);
        }
    }
    context
}

fn register_local_types(
    node: Node,
    source: &str,
    package: &str,
    outer: Option<(&str, &str)>,
    local_types: &mut HashMap<String, String>,
) {
    let Some(name) = node.child_by_field_name("name").map(|n| node_text(n, source)) else {
        return;
    };
    let (fqn, dotted) = match outer {
        Some((outer_fqn, outer_dotted)) => (format!("{}.{}", outer_fqn, name), format!("{}.{}", outer_dotted, name)),
        None if package.is_empty() => (name.to_string(), name.to_string()),
        None => (format!("{}.{}", package, name), name.to_string()),
    };
    local_types.entry(name.to_string()).or_insert_with(|| fqn.clone());
    local_types.insert(dotted.clone(), fqn.clone());

    for member in body_members(node) {
        if TYPE_DECLARATIONS.contains(&member.kind()) {
            register_local_types(member, source, package, Some((&fqn, &dotted)), local_types);
        }
    }
}

/// Members of a type body; enum bodies keep theirs under `enum_body_declarations`.
fn body_members(node: Node) -> Vec<Node> {
    let Some(body) = node.child_by_field_name("body") else {
        return Vec::new();
    };
    let mut members = Vec::new();
    for child in named_children(body) {
        if child.kind() == "enum_body_declarations" {
            members.extend(named_children(child));
        } else {
            members.push(child);
        }
    }
    members
}

fn modifier_keywords(node: Node) -> Vec<String> {
    find_child_by_kind(node, "modifiers")
        .map(|modifiers| {
            all_children(modifiers)
                .into_iter()
                .filter(|c| !c.is_named())
                .map(|c| c.kind().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn type_kind_of(node: Node) -> TypeKind {
    match node.kind() {
        "interface_declaration" | "annotation_type_declaration" => TypeKind::Interface,
        "enum_declaration" => TypeKind::Enum,
        "record_declaration" => TypeKind::Record,
        _ if modifier_keywords(node).iter().any(|m| m == "abstract") => TypeKind::AbstractClass,
        _ => TypeKind::Class,
    }
}

fn type_parameter_names(node: Node, source: &str) -> Vec<String> {
    let Some(parameters) = node.child_by_field_name("type_parameters") else {
        return Vec::new();
    };
    named_children(parameters)
        .into_iter()
        .filter(|p| p.kind() == "type_parameter")
        .filter_map(|p| {
            named_children(p)
                .into_iter()
                .find(|c| matches!(c.kind(), "type_identifier" | "identifier"))
                .map(|c| node_text(c, source).to_string())
        })
        .collect()
}

/// Supertype as written plus interfaces as written.
fn supertypes(node: Node, source: &str) -> (Option<String>, Vec<String>) {
    let superclass = node
        .child_by_field_name("superclass")
        .and_then(|s| named_children(s).into_iter().next())
        .map(|t| node_text(t, source).to_string());

    let type_list = node
        .child_by_field_name("interfaces")
        .or_else(|| find_child_by_kind(node, "extends_interfaces"))
        .and_then(|i| find_child_by_kind(i, "type_list"));
    let interfaces = type_list
        .map(|list| {
            named_children(list)
                .into_iter()
                .map(|t| node_text(t, source).to_string())
                .collect()
        })
        .unwrap_or_default();

    (superclass, interfaces)
}

/// `(name, type-as-written)` for each declarator of a field or local declaration.
fn declarators<'t>(node: Node<'t>, source: &str) -> Vec<(String, String, Node<'t>)> {
    let base_type = node
        .child_by_field_name("type")
        .map(|t| node_text(t, source).to_string())
        .unwrap_or_default();
    field_children(node, "declarator")
        .into_iter()
        .filter_map(|declarator| {
            let name = node_text(declarator.child_by_field_name("name")?, source).to_string();
            let type_name = match declarator.child_by_field_name("dimensions") {
                Some(dims) => format!("{}{}", base_type, node_text(dims, source).replace(' ', "")),
                None => base_type.clone(),
            };
            Some((name, type_name, declarator))
        })
        .collect()
}

/// `(name, type-as-written)` for each formal parameter; varargs end in `...`.
fn formal_parameters(node: Node, source: &str) -> Vec<(String, String)> {
    let Some(parameters) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    named_children(parameters)
        .into_iter()
        .filter_map(|p| match p.kind() {
            "formal_parameter" => {
                let name = node_text(p.child_by_field_name("name")?, source).to_string();
                let mut type_name = node_text(p.child_by_field_name("type")?, source).to_string();
                if let Some(dims) = p.child_by_field_name("dimensions") {
                    type_name.push_str(&node_text(dims, source).replace(' ', ""));
                }
                Some((name, type_name))
            }
            "spread_parameter" => {
                let children = named_children(p);
                let type_node = children
                    .iter()
                    .find(|c| !matches!(c.kind(), "modifiers" | "variable_declarator"))?;
                let name = children
                    .iter()
                    .find(|c| c.kind() == "variable_declarator")
                    .and_then(|d| d.child_by_field_name("name"))
                    .map(|n| node_text(n, source).to_string())?;
                Some((name, format!("{}...", node_text(*type_node, source))))
            }
            _ => None,
        })
        .collect()
}

fn collect_declaration(
    node: Node,
    source: &str,
    file_context: &ImportContext,
    outer: Option<&str>,
    out: &mut Vec<TypeDeclaration>,
) {
    let Some(name) = node.child_by_field_name("name").map(|n| node_text(n, source)) else {
        return;
    };
    let fqn = match outer {
        Some(outer) => format!("{}.{}", outer, name),
        None => file_context.qualify(name),
    };
    let mut context = file_context.clone();
    context.type_vars.extend(type_parameter_names(node, source));

    let (superclass, interfaces) = supertypes(node, source);
    let mut fields = HashMap::new();
    let mut methods = Vec::new();

    if node.kind() == "record_declaration" {
        for (component, type_name) in formal_parameters(node, source) {
            methods.push(MethodShape { name: component.clone(), return_type: type_name.clone(), arity: 0, varargs: false });
            fields.insert(component, type_name);
        }
    }
    if let Some(body) = node.child_by_field_name("body") {
        for constant in named_children(body).into_iter().filter(|c| c.kind() == "enum_constant") {
            if let Some(constant_name) = constant.child_by_field_name("name") {
                fields.insert(node_text(constant_name, source).to_string(), name.to_string());
            }
        }
    }

    let mut nested = Vec::new();
    for member in body_members(node) {
        match member.kind() {
            "field_declaration" | "constant_declaration" => {
                for (field, type_name, _) in declarators(member, source) {
                    fields.insert(field, type_name);
                }
            }
            "method_declaration" => {
                let Some(method_name) = member.child_by_field_name("name") else {
                    continue;
                };
                let parameters = formal_parameters(member, source);
                methods.push(MethodShape {
                    name: node_text(method_name, source).to_string(),
                    return_type: member
                        .child_by_field_name("type")
                        .map(|t| node_text(t, source).to_string())
                        .unwrap_or_else(|| "void".to_string()),
                    arity: parameters.len(),
                    varargs: parameters.last().map(|(_, t)| t.ends_with("...")).unwrap_or(false),
                });
            }
            kind if TYPE_DECLARATIONS.contains(&kind) => nested.push(member),
            _ => {}
        }
    }

    out.push(TypeDeclaration {
        fqn: fqn.clone(),
        kind: type_kind_of(node),
        superclass,
        interfaces,
        fields,
        methods,
        context,
    });

    for member in nested {
        collect_declaration(member, source, file_context, Some(&fqn), out);
    }
}

/// Lowers one compilation unit. Scopes track local variable types.
struct Lowerer<'a> {
    source: &'a str,
    catalog: &'a TypeCatalog,
    context: ImportContext,
    /// Enclosing type FQNs, innermost last.
    types: Vec<String>,
    /// Variable -> resolved type; `None` for lambda parameters of unknown type.
    scopes: Vec<HashMap<String, Option<String>>>,
}

impl<'a> Lowerer<'a> {
    fn new(source: &'a str, catalog: &'a TypeCatalog, context: ImportContext) -> Self {
        Self {
            source,
            catalog,
            context,
            types: Vec::new(),
            scopes: Vec::new(),
        }
    }

    fn text(&self, node: Node) -> &'a str {
        node_text(node, self.source)
    }

    fn normalized(&self, node: Node) -> String {
        normalize_whitespace(self.text(node))
    }

    fn resolve(&self, raw: &str) -> String {
        self.context.resolve(raw, self.catalog)
    }

    fn current_type(&self) -> Option<&str> {
        self.types.last().map(String::as_str)
    }

    fn declare(&mut self, name: impl Into<String>, type_name: Option<String>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), type_name);
        }
    }

    fn lower_program(&mut self, root: Node) -> SyntaxNode {
        let mut unit = SyntaxNode::new(NodeKind::CompilationUnit, span_of(root));
        for node in named_children(root) {
            match node.kind() {
                "package_declaration" => {
                    unit.push(SyntaxNode::new(NodeKind::PackageDecl, span_of(node)).with_name(self.context.package.clone()));
                }
                "import_declaration" => {
                    let text = self.normalized(node);
                    let name = text
                        .trim_start_matches("import")
                        .trim()
                        .trim_start_matches("static ")
                        .trim_end_matches(';')
                        .replace(' ', "");
                    unit.push(SyntaxNode::new(NodeKind::ImportDecl, span_of(node)).with_name(name));
                }
                kind if TYPE_DECLARATIONS.contains(&kind) => {
                    if let Some(lowered) = self.lower_type(node) {
                        unit.push(lowered);
                    }
                }
                _ => {}
            }
        }
        unit
    }

    fn lower_type(&mut self, node: Node) -> Option<SyntaxNode> {
        let name = self.text(node.child_by_field_name("name")?);
        let fqn = match self.current_type() {
            Some(outer) => format!("{}.{}", outer, name),
            None => self.context.qualify(name),
        };

        let saved_vars = self.context.type_vars.clone();
        self.context.type_vars.extend(type_parameter_names(node, self.source));
        self.types.push(fqn.clone());

        let mut lowered = SyntaxNode::new(NodeKind::TypeDecl { type_kind: type_kind_of(node) }, span_of(node))
            .with_name(name)
            .with_type(Some(fqn));
        let mut children = self.lower_modifiers(node);

        let (superclass, interfaces) = supertypes(node, self.source);
        if let Some(raw) = superclass {
            children.push(
                SyntaxNode::new(NodeKind::Superclass, span_of(node)).with_type(Some(erase(&self.resolve(&raw)))),
            );
        }
        for raw in interfaces {
            children.push(
                SyntaxNode::new(NodeKind::InterfaceRef, span_of(node)).with_type(Some(erase(&self.resolve(&raw)))),
            );
        }

        for member in body_members(node) {
            match member.kind() {
                "field_declaration" | "constant_declaration" => children.extend(self.lower_fields(member)),
                "method_declaration" => children.extend(self.lower_method(member)),
                "constructor_declaration" | "compact_constructor_declaration" => {
                    children.extend(self.lower_constructor(member))
                }
                kind if TYPE_DECLARATIONS.contains(&kind) => children.extend(self.lower_type(member)),
                _ => {}
            }
        }

        self.types.pop();
        self.context.type_vars = saved_vars;
        lowered.children = children;
        Some(lowered)
    }

    fn lower_modifiers(&self, node: Node) -> Vec<SyntaxNode> {
        let Some(modifiers) = find_child_by_kind(node, "modifiers") else {
            return Vec::new();
        };
        all_children(modifiers)
            .into_iter()
            .filter(|c| !is_comment(c))
            .map(|c| match c.kind() {
                "annotation" | "marker_annotation" => self.lower_annotation(c),
                keyword => SyntaxNode::new(NodeKind::Modifier, span_of(c)).with_name(keyword),
            })
            .collect()
    }

    fn lower_annotation(&self, node: Node) -> SyntaxNode {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let mut annotation = SyntaxNode::new(NodeKind::Annotation, span_of(node))
            .with_name(name)
            .with_text(self.normalized(node));

        if let Some(arguments) = node.child_by_field_name("arguments") {
            for argument in named_children(arguments) {
                let lowered = if argument.kind() == "element_value_pair" {
                    let key = argument.child_by_field_name("key").map(|k| self.text(k).to_string());
                    let value = argument
                        .child_by_field_name("value")
                        .map(|v| self.normalized(v))
                        .unwrap_or_default();
                    let arg = SyntaxNode::new(NodeKind::AnnotationArg, span_of(argument)).with_text(value);
                    match key {
                        Some(key) => arg.with_name(key),
                        None => arg,
                    }
                } else {
                    SyntaxNode::new(NodeKind::AnnotationArg, span_of(argument)).with_text(self.normalized(argument))
                };
                annotation.push(lowered);
            }
        }
        annotation
    }

    fn lower_fields(&self, node: Node) -> Vec<SyntaxNode> {
        let modifiers = self.lower_modifiers(node);
        declarators(node, self.source)
            .into_iter()
            .map(|(name, type_name, declarator)| {
                let initialiser = declarator
                    .child_by_field_name("value")
                    .map(|v| self.normalized(v))
                    .unwrap_or_default();
                SyntaxNode::new(NodeKind::FieldDecl, span_of(node))
                    .with_name(name)
                    .with_type(Some(self.resolve(&type_name)))
                    .with_text(initialiser)
                    .with_children(modifiers.clone())
            })
            .collect()
    }

    fn lower_parameters(&mut self, node: Node) -> Vec<SyntaxNode> {
        let parameters_span = node
            .child_by_field_name("parameters")
            .map(span_of)
            .unwrap_or_else(|| span_of(node));
        formal_parameters(node, self.source)
            .into_iter()
            .map(|(name, raw)| {
                let resolved = self.resolve(&raw);
                let local_type = match resolved.strip_suffix("...") {
                    Some(element) => format!("{}[]", element),
                    None => resolved.clone(),
                };
                self.declare(name.clone(), Some(local_type));
                SyntaxNode::new(NodeKind::Parameter, parameters_span)
                    .with_name(name)
                    .with_type(Some(resolved))
            })
            .collect()
    }

    fn lower_throws(&self, node: Node) -> Vec<SyntaxNode> {
        find_child_by_kind(node, "throws")
            .map(|throws| {
                named_children(throws)
                    .into_iter()
                    .map(|t| SyntaxNode::new(NodeKind::ThrowsType, span_of(t)).with_type(Some(self.resolve(self.text(t)))))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lower_method(&mut self, node: Node) -> Option<SyntaxNode> {
        let name = self.text(node.child_by_field_name("name")?);
        let saved_vars = self.context.type_vars.clone();
        self.context.type_vars.extend(type_parameter_names(node, self.source));

        let return_type = node.child_by_field_name("type").map(|t| self.resolve(self.text(t)));
        self.scopes.push(HashMap::new());
        let mut children = self.lower_modifiers(node);
        children.extend(self.lower_parameters(node));
        children.extend(self.lower_throws(node));
        if let Some(body) = node.child_by_field_name("body") {
            self.lower_node(body, &mut children);
        }
        self.scopes.pop();
        self.context.type_vars = saved_vars;

        Some(
            SyntaxNode::new(NodeKind::MethodDecl { return_type }, span_of(node))
                .with_name(name)
                .with_children(children),
        )
    }

    fn lower_constructor(&mut self, node: Node) -> Option<SyntaxNode> {
        let name = self.text(node.child_by_field_name("name")?);
        self.scopes.push(HashMap::new());
        let mut children = self.lower_modifiers(node);
        children.extend(self.lower_parameters(node));
        children.extend(self.lower_throws(node));
        if let Some(body) = node.child_by_field_name("body") {
            self.lower_node(body, &mut children);
        }
        self.scopes.pop();

        Some(
            SyntaxNode::new(NodeKind::ConstructorDecl, span_of(node))
                .with_name(name)
                .with_children(children),
        )
    }

    /// Lower a statement or expression, appending the result to `out`.
    /// Nodes that cannot contain invocations lower to nothing.
    fn lower_node(&mut self, node: Node, out: &mut Vec<SyntaxNode>) {
        match node.kind() {
            "line_comment" | "block_comment" => {}
            "block" | "constructor_body" => {
                self.scopes.push(HashMap::new());
                let mut children = Vec::new();
                for child in named_children(node) {
                    self.lower_node(child, &mut children);
                }
                self.scopes.pop();
                out.push(SyntaxNode::new(NodeKind::Block, span_of(node)).with_children(children));
            }
            "local_variable_declaration" => self.lower_local(node, out),
            "resource" if node.child_by_field_name("type").is_some() => self.lower_resource(node, out),
            "assignment_expression" => self.lower_assignment(node, out),
            "if_statement" => out.push(self.lower_if(node)),
            "for_statement" => out.push(self.lower_for(node)),
            "enhanced_for_statement" => out.push(self.lower_foreach(node)),
            "while_statement" => out.push(self.lower_while(node)),
            "do_statement" => out.push(self.lower_do(node)),
            "method_invocation" => out.push(self.lower_invocation(node)),
            "object_creation_expression" => self.lower_creation(node, out),
            "explicit_constructor_invocation" => out.push(self.lower_constructor_call(node)),
            "lambda_expression" => self.lower_lambda(node, out),
            "catch_clause" => self.lower_catch(node, out),
            "try_with_resources_statement" => {
                self.scopes.push(HashMap::new());
                self.lower_generic(node, out);
                self.scopes.pop();
            }
            // Local and anonymous class bodies are not modelled.
            "class_body" => {}
            kind if TYPE_DECLARATIONS.contains(&kind) => {}
            _ => self.lower_generic(node, out),
        }
    }

    fn lower_generic(&mut self, node: Node, out: &mut Vec<SyntaxNode>) {
        let mut children = Vec::new();
        for child in named_children(node) {
            self.lower_node(child, &mut children);
        }
        if !children.is_empty() {
            out.push(SyntaxNode::new(NodeKind::Other, span_of(node)).with_children(children));
        }
    }

    fn lower_local(&mut self, node: Node, out: &mut Vec<SyntaxNode>) {
        for (name, raw, declarator) in declarators(node, self.source) {
            let value = declarator.child_by_field_name("value");
            let declared = if raw == "var" {
                value.and_then(|v| self.type_of(v))
            } else {
                Some(self.resolve(&raw))
            };
            let mut children = Vec::new();
            if let Some(value) = value {
                self.lower_node(value, &mut children);
            }
            self.declare(name.clone(), declared.clone());
            out.push(
                SyntaxNode::new(NodeKind::LocalVarDecl, span_of(declarator))
                    .with_name(name)
                    .with_type(declared)
                    .with_text(normalize_whitespace(self.text(declarator)))
                    .with_children(children),
            );
        }
    }

    fn lower_resource(&mut self, node: Node, out: &mut Vec<SyntaxNode>) {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n).to_string()) else {
            return;
        };
        let raw = node.child_by_field_name("type").map(|t| self.text(t)).unwrap_or("var");
        let value = node.child_by_field_name("value");
        let declared = if raw == "var" {
            value.and_then(|v| self.type_of(v))
        } else {
            Some(self.resolve(raw))
        };
        let mut children = Vec::new();
        if let Some(value) = value {
            self.lower_node(value, &mut children);
        }
        self.declare(name.clone(), declared.clone());
        out.push(
            SyntaxNode::new(NodeKind::LocalVarDecl, span_of(node))
                .with_name(name)
                .with_type(declared)
                .with_text(self.normalized(node))
                .with_children(children),
        );
    }

    fn lower_assignment(&mut self, node: Node, out: &mut Vec<SyntaxNode>) {
        let Some(left) = node.child_by_field_name("left") else {
            return self.lower_generic(node, out);
        };
        // Calls inside the target are evaluated first and are not assigned.
        if left.kind() != "identifier" {
            for child in named_children(left) {
                self.lower_node(child, out);
            }
        }
        let mut children = Vec::new();
        if let Some(right) = node.child_by_field_name("right") {
            self.lower_node(right, &mut children);
        }
        out.push(
            SyntaxNode::new(NodeKind::Assignment, span_of(node))
                .with_name(self.normalized(left))
                .with_text(self.normalized(node))
                .with_children(children),
        );
    }

    /// `Condition` role node; parentheses around the expression are dropped.
    fn lower_condition(&mut self, node: Node) -> SyntaxNode {
        let expression = if node.kind() == "parenthesized_expression" {
            named_children(node).into_iter().next().unwrap_or(node)
        } else {
            node
        };
        let mut children = Vec::new();
        self.lower_node(expression, &mut children);
        SyntaxNode::new(NodeKind::Condition, span_of(node))
            .with_text(self.normalized(expression))
            .with_children(children)
    }

    fn lower_role(&mut self, kind: NodeKind, node: Node) -> SyntaxNode {
        let mut children = Vec::new();
        self.lower_node(node, &mut children);
        SyntaxNode::new(kind, span_of(node)).with_children(children)
    }

    fn lower_if(&mut self, node: Node) -> SyntaxNode {
        let mut children = Vec::new();
        if let Some(condition) = node.child_by_field_name("condition") {
            children.push(self.lower_condition(condition));
        }
        if let Some(consequence) = node.child_by_field_name("consequence") {
            children.push(self.lower_role(NodeKind::Then, consequence));
        }
        if let Some(alternative) = node.child_by_field_name("alternative") {
            children.push(self.lower_role(NodeKind::Else, alternative));
        }
        SyntaxNode::new(NodeKind::If, span_of(node))
            .with_text(children.first().map(|c| c.text.clone()).unwrap_or_default())
            .with_children(children)
    }

    fn lower_for(&mut self, node: Node) -> SyntaxNode {
        self.scopes.push(HashMap::new());
        let inits = field_children(node, "init");
        let condition = node.child_by_field_name("condition");
        let updates = field_children(node, "update");

        let header_parts = [
            self.joined_text(&inits),
            condition.map(|c| self.normalized(c)).unwrap_or_default(),
            self.joined_text(&updates),
        ];
        let header = if header_parts.iter().all(|p| p.is_empty()) {
            String::new()
        } else {
            header_parts.join("; ")
        };

        let mut children = Vec::new();
        if !inits.is_empty() {
            let mut init_children = Vec::new();
            for init in &inits {
                self.lower_node(*init, &mut init_children);
            }
            children.push(SyntaxNode::new(NodeKind::Init, span_of(inits[0])).with_children(init_children));
        }
        if let Some(condition) = condition {
            children.push(self.lower_condition(condition));
        }
        if !updates.is_empty() {
            let mut update_children = Vec::new();
            for update in &updates {
                self.lower_node(*update, &mut update_children);
            }
            children.push(SyntaxNode::new(NodeKind::Update, span_of(updates[0])).with_children(update_children));
        }
        if let Some(body) = node.child_by_field_name("body") {
            children.push(self.lower_role(NodeKind::Body, body));
        }
        self.scopes.pop();

        SyntaxNode::new(NodeKind::For, span_of(node))
            .with_name(header)
            .with_children(children)
    }

    fn joined_text(&self, nodes: &[Node]) -> String {
        nodes
            .iter()
            .map(|n| self.normalized(*n).trim_end_matches(';').to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn lower_foreach(&mut self, node: Node) -> SyntaxNode {
        self.scopes.push(HashMap::new());
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let iterable = node.child_by_field_name("value");
        let declared = match node.child_by_field_name("type").map(|t| self.text(t)) {
            Some("var") | None => iterable.and_then(|v| self.type_of(v)).and_then(|t| element_type(&t)),
            Some(raw) => Some(self.resolve(raw)),
        };

        let mut children = Vec::new();
        if let Some(iterable) = iterable {
            children.push(self.lower_condition(iterable));
        }
        self.declare(name.clone(), declared.clone());
        if let Some(body) = node.child_by_field_name("body") {
            children.push(self.lower_role(NodeKind::Body, body));
        }
        self.scopes.pop();

        SyntaxNode::new(NodeKind::ForEach, span_of(node))
            .with_name(name)
            .with_type(declared)
            .with_children(children)
    }

    fn lower_while(&mut self, node: Node) -> SyntaxNode {
        let mut children = Vec::new();
        if let Some(condition) = node.child_by_field_name("condition") {
            children.push(self.lower_condition(condition));
        }
        if let Some(body) = node.child_by_field_name("body") {
            children.push(self.lower_role(NodeKind::Body, body));
        }
        SyntaxNode::new(NodeKind::While, span_of(node)).with_children(children)
    }

    fn lower_do(&mut self, node: Node) -> SyntaxNode {
        let mut children = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            children.push(self.lower_role(NodeKind::Body, body));
        }
        if let Some(condition) = node.child_by_field_name("condition") {
            children.push(self.lower_condition(condition));
        }
        SyntaxNode::new(NodeKind::DoWhile, span_of(node)).with_children(children)
    }

    fn lower_lambda(&mut self, node: Node, out: &mut Vec<SyntaxNode>) {
        self.scopes.push(HashMap::new());
        if let Some(parameters) = node.child_by_field_name("parameters") {
            match parameters.kind() {
                "identifier" => self.declare(self.text(parameters), None),
                "formal_parameters" => {
                    for (name, raw) in formal_parameters(node, self.source) {
                        let resolved = self.resolve(&raw);
                        self.declare(name, Some(resolved));
                    }
                }
                _ => {
                    for parameter in named_children(parameters) {
                        self.declare(self.text(parameter), None);
                    }
                }
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.lower_node(body, out);
        }
        self.scopes.pop();
    }

    fn lower_catch(&mut self, node: Node, out: &mut Vec<SyntaxNode>) {
        self.scopes.push(HashMap::new());
        if let Some(parameter) = find_child_by_kind(node, "catch_formal_parameter") {
            let caught = find_child_by_kind(parameter, "catch_type")
                .and_then(|t| named_children(t).into_iter().next())
                .map(|t| self.resolve(self.text(t)));
            if let Some(name) = parameter.child_by_field_name("name") {
                self.declare(self.text(name), caught);
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.lower_node(body, out);
        }
        self.scopes.pop();
    }

    fn lower_arguments(&mut self, node: Node) -> SyntaxNode {
        let Some(arguments) = node.child_by_field_name("arguments") else {
            return SyntaxNode::new(NodeKind::Arguments, span_of(node));
        };
        let mut children = Vec::new();
        for argument in named_children(arguments) {
            let lowered = match argument.kind() {
                "method_invocation" => self.lower_invocation(argument),
                _ => {
                    let mut nested = Vec::new();
                    self.lower_node(argument, &mut nested);
                    SyntaxNode::new(NodeKind::Other, span_of(argument))
                        .with_type(self.type_of(argument))
                        .with_children(nested)
                }
            };
            children.push(lowered.with_text(self.normalized(argument)));
        }
        SyntaxNode::new(NodeKind::Arguments, span_of(arguments)).with_children(children)
    }

    fn lower_receiver(&mut self, node: Node) -> SyntaxNode {
        let lowered = match node.kind() {
            "method_invocation" => self.lower_invocation(node),
            "object_creation_expression" => {
                let mut created = Vec::new();
                self.lower_creation(node, &mut created);
                if created.len() == 1 {
                    created.remove(0)
                } else {
                    SyntaxNode::new(NodeKind::Other, span_of(node))
                        .with_type(self.type_of(node))
                        .with_children(created)
                }
            }
            "identifier" => SyntaxNode::new(NodeKind::Identifier, span_of(node))
                .with_name(self.text(node))
                .with_type(self.type_of(node)),
            "field_access" => {
                let field = node
                    .child_by_field_name("field")
                    .map(|f| self.text(f).to_string())
                    .unwrap_or_default();
                let mut access = SyntaxNode::new(NodeKind::FieldAccess, span_of(node))
                    .with_name(field)
                    .with_type(self.type_of(node));
                if let Some(object) = node.child_by_field_name("object") {
                    access.push(self.lower_receiver(object));
                }
                access
            }
            "this" => SyntaxNode::new(NodeKind::This, span_of(node)).with_type(self.type_of(node)),
            "super" => SyntaxNode::new(NodeKind::Super, span_of(node)).with_type(self.type_of(node)),
            _ => {
                let mut nested = Vec::new();
                for child in named_children(node) {
                    self.lower_node(child, &mut nested);
                }
                SyntaxNode::new(NodeKind::Other, span_of(node))
                    .with_type(self.type_of(node))
                    .with_children(nested)
            }
        };
        lowered.with_text(self.normalized(node))
    }

    fn lower_invocation(&mut self, node: Node) -> SyntaxNode {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let arity = argument_count(node);
        let object = node.child_by_field_name("object");

        let receiver_type = match object {
            Some(object) => self.type_of(object),
            None => Some(self.implicit_receiver(&name, arity)),
        }
        .map(|t| erase(&t));
        let return_type = receiver_type
            .as_deref()
            .and_then(|t| self.catalog.method_return_type(t, &name, arity));

        let mut children = Vec::new();
        if let Some(object) = object {
            let receiver = self.lower_receiver(object);
            children.push(SyntaxNode::new(NodeKind::Receiver, span_of(object)).with_children(vec![receiver]));
        }
        children.push(self.lower_arguments(node));

        SyntaxNode::new(NodeKind::MethodCall { return_type }, span_of(node))
            .with_name(name)
            .with_type(receiver_type)
            .with_text(self.normalized(node))
            .with_children(children)
    }

    fn lower_creation(&mut self, node: Node, out: &mut Vec<SyntaxNode>) {
        // `outer.new Inner()`: the outer expression is evaluated first.
        if let Some(outer) = named_children(node).first().filter(|c| c.kind() != "type_arguments") {
            if node.child_by_field_name("type").map(|t| t.id()) != Some(outer.id()) {
                self.lower_node(*outer, out);
            }
        }
        let raw = node
            .child_by_field_name("type")
            .map(|t| self.text(t).to_string())
            .unwrap_or_default();
        let resolved = erase(&self.resolve(&raw));
        let name = simple_name(&erase(&raw)).to_string();
        let arguments = self.lower_arguments(node);

        out.push(
            SyntaxNode::new(NodeKind::ObjectCreation, span_of(node))
                .with_name(name)
                .with_type(Some(resolved))
                .with_text(self.normalized(node))
                .with_children(vec![arguments]),
        );
    }

    fn lower_constructor_call(&mut self, node: Node) -> SyntaxNode {
        let keyword = node
            .child_by_field_name("constructor")
            .map(|c| self.text(c).to_string())
            .unwrap_or_else(|| "this".to_string());
        let target = match keyword.as_str() {
            "super" => self.current_type().and_then(|t| self.catalog.superclass_of(t)),
            _ => self.current_type().map(String::from),
        };
        let arguments = self.lower_arguments(node);
        SyntaxNode::new(NodeKind::ConstructorCall, span_of(node))
            .with_name(keyword)
            .with_type(target)
            .with_text(self.normalized(node))
            .with_children(vec![arguments])
    }

    /// Declaring type of an unqualified call: the innermost enclosing type
    /// that declares it, a static import, or the current type.
    fn implicit_receiver(&self, name: &str, arity: usize) -> String {
        for owner in self.types.iter().rev() {
            if self.catalog.method_return_type(owner, name, arity).is_some() {
                return owner.clone();
            }
        }
        if let Some(owner) = self.context.static_members.get(name) {
            return self.resolve(owner);
        }
        self.current_type().unwrap_or_default().to_string()
    }

    fn lookup_variable(&self, name: &str) -> Option<Option<String>> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).cloned())
    }

    /// Static type of an expression, when the binder can tell.
    fn type_of(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                if let Some(declared) = self.lookup_variable(name) {
                    return declared;
                }
                for owner in self.types.iter().rev() {
                    if let Some(field) = self.catalog.field_type(owner, name) {
                        return Some(field);
                    }
                }
                if let Some(owner) = self.context.static_members.get(name) {
                    let owner = self.resolve(owner);
                    return self.catalog.field_type(&owner, name);
                }
                if is_capitalised(name) {
                    return Some(self.resolve(name));
                }
                None
            }
            "this" => self.current_type().map(String::from),
            "super" => self.current_type().and_then(|t| self.catalog.superclass_of(t)),
            "field_access" => {
                let field = self.text(node.child_by_field_name("field")?);
                let object = node.child_by_field_name("object")?;
                match self.type_of(object) {
                    Some(owner) if owner.ends_with("[]") && field == "length" => Some("int".to_string()),
                    Some(owner) => self.catalog.field_type(&erase(&owner), field),
                    None if is_capitalised(field) => Some(self.resolve(&normalize_whitespace(self.text(node)))),
                    None => None,
                }
            }
            "method_invocation" => {
                let name = self.text(node.child_by_field_name("name")?);
                let arity = argument_count(node);
                let owner = match node.child_by_field_name("object") {
                    Some(object) => self.type_of(object)?,
                    None => self.implicit_receiver(name, arity),
                };
                self.catalog.method_return_type(&erase(&owner), name, arity)
            }
            "object_creation_expression" => node.child_by_field_name("type").map(|t| self.resolve(self.text(t))),
            "cast_expression" => node.child_by_field_name("type").map(|t| self.resolve(self.text(t))),
            "parenthesized_expression" => named_children(node).into_iter().next().and_then(|e| self.type_of(e)),
            "array_access" => {
                let array = self.type_of(node.child_by_field_name("array")?)?;
                array.strip_suffix("[]").map(String::from)
            }
            "ternary_expression" => self.type_of(node.child_by_field_name("consequence")?),
            "string_literal" | "text_block" => Some("java.lang.String".to_string()),
            "class_literal" => Some("java.lang.Class".to_string()),
            _ => None,
        }
    }
}

fn argument_count(node: Node) -> usize {
    node.child_by_field_name("arguments")
        .map(|arguments| named_children(arguments).len())
        .unwrap_or(0)
}

/// Element type of an iterable or array type, if it is written out.
fn element_type(type_name: &str) -> Option<String> {
    if let Some(element) = type_name.strip_suffix("[]") {
        return Some(element.to_string());
    }
    let open = type_name.find('<')?;
    let inner = type_name[open + 1..].strip_suffix('>')?;
    if inner.contains(',') {
        return None;
    }
    Some(inner.trim_start_matches("? extends ").to_string())
}
