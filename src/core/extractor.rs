// src/core/extractor.rs
//! Interaction extractor: walks one syntax tree and builds its `FileModel`.
//!
//! The walk is a single recursive function over `NodeKind`. The owning type
//! travels down as an immutable `Scope`, and the method group or fragment
//! currently collecting interactions travels down as `&mut dyn InteractionSink`,
//! so nesting is a property of the call stack rather than of manually
//! restored fields.
//!
//! Chains are resolved bottom-up within one expression: visiting a call first
//! visits its receiver, and when that receiver is itself an invocation the
//! receiver's chain is returned to the caller, which appends itself. The chain
//! is emitted as one nested record only once it reaches a position that is not
//! a receiver, so a chain never spans two statements.

use std::collections::HashMap;

use tracing::debug;

use super::model::{
    AnnotationInfo, AnnotationParameter, ControlFlowFragment, FieldDescriptor, FileModel, FragmentKind,
    InteractionKind, InteractionRecord, MethodGroup, ParameterInfo,
};
use super::syntax::{NodeKind, SyntaxNode};

/// Where an interaction was found relative to the enclosing fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// While evaluating the fragment's condition or loop header
    Condition,
    /// Inside the fragment's statements
    Body,
}

/// Receives interactions and nested fragments during the walk.
pub trait InteractionSink {
    fn add_interaction(&mut self, route: Route, record: InteractionRecord);
    fn add_fragment(&mut self, fragment: ControlFlowFragment);
}

impl InteractionSink for MethodGroup {
    fn add_interaction(&mut self, _route: Route, record: InteractionRecord) {
        self.interactions.push(record);
    }

    fn add_fragment(&mut self, fragment: ControlFlowFragment) {
        self.fragments.push(fragment);
    }
}

impl InteractionSink for ControlFlowFragment {
    fn add_interaction(&mut self, route: Route, record: InteractionRecord) {
        match route {
            Route::Condition => self.condition_interactions.push(record),
            Route::Body => self.interactions.push(record),
        }
    }

    fn add_fragment(&mut self, fragment: ControlFlowFragment) {
        self.fragments.push(fragment);
    }
}

/// Immutable per-type context.
#[derive(Debug, Clone, Copy)]
struct Scope<'a> {
    owner: &'a str,
}

/// Counters scoped to one extraction call.
struct Extraction {
    next_sequence: u32,
    instances: HashMap<String, u32>,
    next_instance: u32,
    unresolved: usize,
}

/// Extract the interaction model of one file. Pure and deterministic.
pub fn extract(tree: &SyntaxNode) -> FileModel {
    let mut extraction = Extraction {
        next_sequence: 1,
        instances: HashMap::new(),
        next_instance: 2,
        unresolved: 0,
    };
    let mut model = FileModel::default();

    for child in &tree.children {
        match child.kind {
            NodeKind::PackageDecl => model.package = child.name_or_empty().to_string(),
            NodeKind::TypeDecl { .. } => extraction.visit_type(child, &mut model, true),
            _ => {}
        }
    }

    model.unresolved_references = extraction.unresolved;
    if extraction.unresolved > 0 {
        debug!(
            "{}: {} call sites fell back to textual targets",
            model.primary_type, extraction.unresolved
        );
    }
    model
}

impl Extraction {
    fn next_id(&mut self) -> u32 {
        let id = self.next_sequence;
        self.next_sequence += 1;
        id
    }

    /// `this` is always instance 1; other names are numbered on first sight.
    fn instance_id(&mut self, variable: &str) -> String {
        if variable == "this" {
            return "this1".to_string();
        }
        let next = &mut self.next_instance;
        let number = *self.instances.entry(variable.to_string()).or_insert_with(|| {
            let n = *next;
            *next += 1;
            n
        });
        format!("{}{}", variable, number)
    }

    fn visit_type(&mut self, node: &SyntaxNode, model: &mut FileModel, top_level: bool) {
        let fqn = node.resolved_type.clone().unwrap_or_else(|| {
            let name = node.name_or_empty();
            if model.package.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", model.package, name)
            }
        });
        let primary = top_level && model.primary_type.is_empty();
        if primary {
            model.primary_type = fqn.clone();
            if let NodeKind::TypeDecl { type_kind } = node.kind {
                model.type_kind = type_kind;
            }
        }
        model.declared_types.push(fqn.clone());

        let scope = Scope { owner: &fqn };
        for child in &node.children {
            match &child.kind {
                NodeKind::Superclass if primary => model.superclass = child.resolved_type.clone(),
                NodeKind::InterfaceRef if primary => model.interfaces.extend(child.resolved_type.clone()),
                NodeKind::Annotation if primary => model.annotations.push(annotation_info(child)),
                NodeKind::FieldDecl if primary => model.fields.push(field_descriptor(child)),
                NodeKind::MethodDecl { .. } | NodeKind::ConstructorDecl => {
                    let group = self.visit_method(child, scope);
                    model.method_groups.push(group);
                }
                NodeKind::TypeDecl { .. } => self.visit_type(child, model, false),
                _ => {}
            }
        }
    }

    fn visit_method(&mut self, node: &SyntaxNode, scope: Scope) -> MethodGroup {
        let mut group = MethodGroup::new(node.name_or_empty(), scope.owner, node.span.start_line);
        if let NodeKind::MethodDecl { return_type } = &node.kind {
            group.return_type = return_type.clone();
        } else {
            group.is_constructor = true;
        }

        for child in &node.children {
            match child.kind {
                NodeKind::Parameter => group.parameters.push(ParameterInfo {
                    name: child.name_or_empty().to_string(),
                    type_name: child.resolved_type.clone().unwrap_or_default(),
                }),
                NodeKind::ThrowsType => group.thrown_exceptions.extend(child.resolved_type.clone()),
                NodeKind::Annotation => group.annotations.push(annotation_info(child)),
                NodeKind::Block => self.visit_children(child, &mut group, Route::Body, scope),
                _ => {}
            }
        }
        group.signature = group
            .parameters
            .iter()
            .map(|p| p.type_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        group.end_line = node.span.end_line;
        group
    }

    fn visit_children(&mut self, node: &SyntaxNode, sink: &mut dyn InteractionSink, route: Route, scope: Scope) {
        for child in &node.children {
            self.visit(child, sink, route, scope);
        }
    }

    fn visit(&mut self, node: &SyntaxNode, sink: &mut dyn InteractionSink, route: Route, scope: Scope) {
        match &node.kind {
            NodeKind::MethodCall { .. } | NodeKind::ConstructorCall | NodeKind::ObjectCreation => {
                let chain = self.visit_invocation(node, sink, route, scope);
                emit(chain, None, sink, route);
            }
            NodeKind::LocalVarDecl | NodeKind::Assignment => {
                for child in &node.children {
                    if child.is_invocation() {
                        let chain = self.visit_invocation(child, sink, route, scope);
                        emit(chain, node.name.clone(), sink, route);
                    } else {
                        self.visit(child, sink, route, scope);
                    }
                }
            }
            NodeKind::If => {
                let fragment = self.visit_if(node, scope);
                sink.add_fragment(fragment);
            }
            NodeKind::For | NodeKind::ForEach | NodeKind::While | NodeKind::DoWhile => {
                let fragment = self.visit_loop(node, scope);
                sink.add_fragment(fragment);
            }
            // Nested type bodies belong to their own type.
            NodeKind::TypeDecl { .. } => {}
            _ => self.visit_children(node, sink, route, scope),
        }
    }

    /// Visit an invocation and return its chain, head first. Calls inside the
    /// receiver (when it is not an invocation) and inside the arguments are
    /// emitted to `sink` as interactions of their own.
    fn visit_invocation(
        &mut self,
        node: &SyntaxNode,
        sink: &mut dyn InteractionSink,
        route: Route,
        scope: Scope,
    ) -> Vec<InteractionRecord> {
        let mut chain = Vec::new();
        let receiver = node.child(&NodeKind::Receiver).and_then(SyntaxNode::inner);
        if let Some(receiver) = receiver {
            if receiver.is_invocation() {
                chain = self.visit_invocation(receiver, sink, route, scope);
            } else {
                self.visit(receiver, sink, route, scope);
            }
        }

        let mut arguments = Vec::new();
        if let Some(argument_list) = node.child(&NodeKind::Arguments) {
            for argument in &argument_list.children {
                arguments.push(argument.text.clone());
                self.visit(argument, sink, route, scope);
            }
        }

        let record = self.record(node, receiver, arguments, scope);
        chain.push(record);
        chain
    }

    fn record(
        &mut self,
        node: &SyntaxNode,
        receiver: Option<&SyntaxNode>,
        arguments: Vec<String>,
        scope: Scope,
    ) -> InteractionRecord {
        let (kind, return_type) = match &node.kind {
            NodeKind::MethodCall { return_type } => (InteractionKind::MethodCall, return_type.clone()),
            NodeKind::ConstructorCall => (InteractionKind::ConstructorCall, None),
            _ => (InteractionKind::Instantiation, node.resolved_type.clone()),
        };

        let callee = match &node.resolved_type {
            Some(resolved) if !resolved.is_empty() => resolved.clone(),
            _ => {
                self.unresolved += 1;
                debug!("Unresolved call target at line {}: {}", node.span.start_line, node.text);
                match (kind, receiver) {
                    (InteractionKind::Instantiation, _) => node.name_or_empty().to_string(),
                    (_, Some(receiver)) if !receiver.text.is_empty() => receiver.text.clone(),
                    _ => scope.owner.to_string(),
                }
            }
        };

        let method_name = match kind {
            InteractionKind::MethodCall => node.name_or_empty().to_string(),
            InteractionKind::ConstructorCall => simple_type_name(&callee).to_string(),
            InteractionKind::Instantiation => {
                let name = node.name_or_empty();
                if name.is_empty() {
                    simple_type_name(&callee).to_string()
                } else {
                    name.to_string()
                }
            }
        };

        let receiver_name = receiver.map(receiver_variable).unwrap_or_else(|| "this".to_string());
        let instance_id = self.instance_id(&receiver_name);

        InteractionRecord {
            sequence_id: self.next_id(),
            kind,
            caller: scope.owner.to_string(),
            callee,
            method_name,
            receiver: receiver_name,
            instance_id,
            return_type,
            arguments,
            assigned_to: None,
            line: node.span.start_line,
            next_chained_call: None,
        }
    }

    fn visit_if(&mut self, node: &SyntaxNode, scope: Scope) -> ControlFlowFragment {
        let mut fragment = self.branch(node, FragmentKind::If, scope);

        // `else if` chains are flattened into the alternatives of the first `if`.
        let mut else_branch = node.child(&NodeKind::Else);
        while let Some(branch) = else_branch {
            match branch.inner() {
                Some(nested) if nested.kind == NodeKind::If => {
                    let alternative = self.branch(nested, FragmentKind::ElseIf, scope);
                    fragment.alternatives.push(alternative);
                    else_branch = nested.child(&NodeKind::Else);
                }
                _ => {
                    let mut alternative =
                        ControlFlowFragment::new(self.next_id(), FragmentKind::Else, "", branch.span);
                    self.visit_children(branch, &mut alternative, Route::Body, scope);
                    fragment.alternatives.push(alternative);
                    else_branch = None;
                }
            }
        }
        fragment
    }

    /// Condition and `then` part of an `if` / `else if`.
    fn branch(&mut self, node: &SyntaxNode, kind: FragmentKind, scope: Scope) -> ControlFlowFragment {
        let condition = node.child(&NodeKind::Condition);
        let label = condition.map(|c| c.text.clone()).unwrap_or_default();
        let mut fragment = ControlFlowFragment::new(self.next_id(), kind, label, node.span);

        if let Some(condition) = condition {
            self.visit_children(condition, &mut fragment, Route::Condition, scope);
        }
        if let Some(then) = node.child(&NodeKind::Then) {
            self.visit_children(then, &mut fragment, Route::Body, scope);
        }
        fragment
    }

    fn visit_loop(&mut self, node: &SyntaxNode, scope: Scope) -> ControlFlowFragment {
        let condition_text = node
            .child(&NodeKind::Condition)
            .map(|c| c.text.clone())
            .unwrap_or_default();
        let (kind, label) = match node.kind {
            NodeKind::ForEach => (
                FragmentKind::ForEach,
                format!("{} : {}", node.name_or_empty(), condition_text),
            ),
            NodeKind::While => (FragmentKind::While, format!("while ({})", condition_text)),
            NodeKind::DoWhile => (FragmentKind::DoWhile, format!("do while ({})", condition_text)),
            _ => {
                let header = node.name_or_empty();
                let label = if header.is_empty() { "for loop" } else { header };
                (FragmentKind::For, label.to_string())
            }
        };

        let mut fragment = ControlFlowFragment::new(self.next_id(), kind, label, node.span);
        for child in &node.children {
            let route = match child.kind {
                NodeKind::Init | NodeKind::Condition | NodeKind::Update => Route::Condition,
                _ => Route::Body,
            };
            self.visit_children(child, &mut fragment, route, scope);
        }
        fragment
    }
}

/// Fold a chain into nested records, attach the assignment target to its
/// last link and hand it to the sink.
fn emit(chain: Vec<InteractionRecord>, assigned_to: Option<String>, sink: &mut dyn InteractionSink, route: Route) {
    let mut chain = chain;
    if let Some(last) = chain.last_mut() {
        last.assigned_to = assigned_to;
    }
    let head = chain.into_iter().rev().fold(None, |next: Option<InteractionRecord>, mut record| {
        record.next_chained_call = next.map(Box::new);
        Some(record)
    });
    if let Some(head) = head {
        sink.add_interaction(route, head);
    }
}

/// Variable a receiver expression ultimately refers to.
fn receiver_variable(receiver: &SyntaxNode) -> String {
    match &receiver.kind {
        NodeKind::Identifier | NodeKind::FieldAccess => receiver.name_or_empty().to_string(),
        NodeKind::This => "this".to_string(),
        NodeKind::Super => "super".to_string(),
        NodeKind::MethodCall { .. } => receiver
            .child(&NodeKind::Receiver)
            .and_then(SyntaxNode::inner)
            .map(receiver_variable)
            .unwrap_or_else(|| "this".to_string()),
        _ => receiver.text.clone(),
    }
}

fn simple_type_name(type_name: &str) -> &str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

fn annotation_info(node: &SyntaxNode) -> AnnotationInfo {
    AnnotationInfo {
        name: node.name_or_empty().to_string(),
        parameters: node
            .children
            .iter()
            .filter(|c| c.kind == NodeKind::AnnotationArg)
            .map(|c| AnnotationParameter {
                name: c.name.clone(),
                value: c.text.clone(),
            })
            .collect(),
    }
}

fn field_descriptor(node: &SyntaxNode) -> FieldDescriptor {
    FieldDescriptor {
        name: node.name_or_empty().to_string(),
        type_name: node.resolved_type.clone().unwrap_or_default(),
        modifiers: node
            .children_of(&NodeKind::Modifier)
            .map(|m| m.name_or_empty().to_string())
            .collect(),
        default_value: if node.text.is_empty() { None } else { Some(node.text.clone()) },
        annotations: node.children_of(&NodeKind::Annotation).map(annotation_info).collect(),
        line: node.span.start_line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::languages::JavaFrontEnd;
    use crate::core::model::BodyItem;
    use crate::core::syntax::Span;

    fn extract_java(source: &str) -> FileModel {
        let mut front_end = JavaFrontEnd::new().unwrap();
        let tree = front_end.lower_standalone(source).unwrap();
        extract(&tree)
    }

    fn method<'a>(model: &'a FileModel, name: &str) -> &'a MethodGroup {
        model.method_groups.iter().find(|g| g.name == name).unwrap()
    }

    const ACCOUNTS: &str = r#"
package com.bank;

import java.util.List;

@Service
public class Accounts extends BaseAccounts {
    private static final int LIMIT = 10;
    private Ledger ledger;
    private Mailer mailer;

    public Accounts(Ledger ledger) {
        super(ledger);
        this.ledger = ledger;
    }

    public void transfer(Account from, Account to, long amount) {
        if (ledger.balance(from) >= amount) {
            ledger.debit(from, amount);
            ledger.credit(to, amount);
        } else if (ledger.isFrozen(from)) {
            mailer.alert(from.owner().email());
        } else {
            reject(from);
        }
        String summary = ledger.summary(from).trim().toUpperCase();
        for (Account each : ledger.related(from)) {
            mailer.notify(each);
        }
    }

    void reject(Account account) {
        Audit audit = new Audit(account.id());
        audit.record();
    }
}
"#;

    #[test]
    fn test_type_level_facts() {
        let model = extract_java(ACCOUNTS);
        assert_eq!(model.package, "com.bank");
        assert_eq!(model.primary_type, "com.bank.Accounts");
        assert_eq!(model.superclass.as_deref(), Some("com.bank.BaseAccounts"));
        assert_eq!(model.annotations[0].name, "Service");
        assert_eq!(model.fields.len(), 3);
        assert_eq!(model.fields[0].modifiers, vec!["private", "static", "final"]);
        assert_eq!(model.fields[0].default_value.as_deref(), Some("10"));
        assert_eq!(model.fields[1].type_name, "com.bank.Ledger");
        assert_eq!(model.declared_types, vec!["com.bank.Accounts"]);
    }

    #[test]
    fn test_method_groups_and_signatures() {
        let model = extract_java(ACCOUNTS);
        let transfer = method(&model, "transfer");
        assert_eq!(transfer.owner, "com.bank.Accounts");
        assert_eq!(transfer.signature, "com.bank.Account, com.bank.Account, long");
        assert!(transfer.start_line < transfer.end_line);

        let constructor = model.method_groups.iter().find(|g| g.is_constructor).unwrap();
        assert_eq!(constructor.name, "Accounts");
        assert_eq!(constructor.interactions[0].kind, InteractionKind::ConstructorCall);
        assert_eq!(constructor.interactions[0].arguments, vec!["ledger"]);
    }

    #[test]
    fn test_condition_calls_are_kept_apart_from_body_calls() {
        let model = extract_java(ACCOUNTS);
        let transfer = method(&model, "transfer");
        let guard = &transfer.fragments[0];

        assert_eq!(guard.kind, FragmentKind::If);
        assert_eq!(guard.condition, "ledger.balance(from) >= amount");
        let condition: Vec<_> = guard.condition_interactions.iter().map(|i| i.method_name.as_str()).collect();
        assert_eq!(condition, vec!["balance"]);
        let body: Vec<_> = guard.interactions.iter().map(|i| i.method_name.as_str()).collect();
        assert_eq!(body, vec!["debit", "credit"]);

        assert_eq!(guard.alternatives.len(), 2);
        let else_if = &guard.alternatives[0];
        assert_eq!(else_if.kind, FragmentKind::ElseIf);
        assert_eq!(else_if.condition_interactions[0].method_name, "isFrozen");
        assert_eq!(else_if.interactions.len(), 2);
        let plain_else = &guard.alternatives[1];
        assert_eq!(plain_else.kind, FragmentKind::Else);
        assert_eq!(plain_else.condition, "");
        assert_eq!(plain_else.interactions[0].method_name, "reject");
    }

    #[test]
    fn test_chains_nest_and_take_the_assignment() {
        let model = extract_java(ACCOUNTS);
        let transfer = method(&model, "transfer");
        let summary = transfer
            .interactions
            .iter()
            .find(|i| i.method_name == "summary")
            .unwrap();

        let names: Vec<_> = summary.chain().iter().map(|r| r.method_name.as_str()).collect();
        assert_eq!(names, vec!["summary", "trim", "toUpperCase"]);
        assert_eq!(summary.assigned_to, None);
        assert_eq!(summary.chain()[2].assigned_to.as_deref(), Some("summary"));
        assert_eq!(summary.callee, "com.bank.Ledger");
        // `Ledger` is not declared anywhere, so `summary` has no known return
        // type and the next link falls back to the receiver text.
        assert_eq!(summary.chain()[1].callee, "ledger.summary(from)");
        assert!(model.unresolved_references >= 2);
        // Every link is drawn from the method's owner.
        assert!(summary.chain().iter().all(|r| r.caller == "com.bank.Accounts"));
    }

    #[test]
    fn test_argument_calls_are_separate_interactions() {
        let model = extract_java(ACCOUNTS);
        let transfer = method(&model, "transfer");
        let else_if = &transfer.fragments[0].alternatives[0];

        // `from.owner().email()` is evaluated before `alert` and is its own chain.
        assert_eq!(else_if.interactions[0].method_name, "owner");
        assert_eq!(else_if.interactions[0].chain_len(), 2);
        assert_eq!(else_if.interactions[1].method_name, "alert");
        assert_eq!(else_if.interactions[1].arguments, vec!["from.owner().email()"]);
        assert!(else_if.interactions[0].sequence_id < else_if.interactions[1].sequence_id);
    }

    #[test]
    fn test_calls_in_a_later_link_precede_the_chain() {
        let model = extract_java(
            "package p; class T { private X x; void run() { x.f().g(h()); } int h() { return 0; } }",
        );
        let run = method(&model, "run");
        let body = run.body();

        let order: Vec<_> = body
            .iter()
            .map(|item| match item {
                BodyItem::Interaction(i) => i.method_name.as_str(),
                BodyItem::Fragment(_) => "fragment",
            })
            .collect();
        assert_eq!(order, vec!["h", "f"]);

        let chain = run.interactions.iter().find(|i| i.method_name == "f").unwrap();
        assert_eq!(chain.chain()[1].method_name, "g");
        assert_eq!(chain.chain()[1].arguments, vec!["h()"]);
    }

    #[test]
    fn test_loop_fragment_routes_header_calls_to_condition() {
        let model = extract_java(ACCOUNTS);
        let transfer = method(&model, "transfer");
        let each = transfer.fragments.iter().find(|f| f.kind == FragmentKind::ForEach).unwrap();

        assert_eq!(each.condition, "each : ledger.related(from)");
        assert_eq!(each.condition_interactions[0].method_name, "related");
        assert_eq!(each.interactions[0].method_name, "notify");
        // The loop follows the `summary` chain in source order.
        let summary_id = transfer.interactions.iter().find(|i| i.method_name == "summary").unwrap().sequence_id;
        assert!(each.sequence_id > summary_id);
    }

    #[test]
    fn test_instantiation_records() {
        let model = extract_java(ACCOUNTS);
        let reject = method(&model, "reject");

        let id_call = &reject.interactions[0];
        assert_eq!(id_call.method_name, "id");
        let creation = &reject.interactions[1];
        assert_eq!(creation.kind, InteractionKind::Instantiation);
        assert_eq!(creation.method_name, "Audit");
        assert_eq!(creation.callee, "com.bank.Audit");
        assert_eq!(creation.return_type.as_deref(), Some("com.bank.Audit"));
        assert_eq!(creation.assigned_to.as_deref(), Some("audit"));
        assert_eq!(reject.interactions[2].receiver, "audit");
    }

    #[test]
    fn test_instance_ids_are_stable_per_variable() {
        let model = extract_java(ACCOUNTS);
        let transfer = method(&model, "transfer");
        let guard = &transfer.fragments[0];

        let ledger_ids: Vec<_> = guard
            .condition_interactions
            .iter()
            .chain(guard.interactions.iter())
            .map(|i| i.instance_id.as_str())
            .collect();
        assert!(ledger_ids.iter().all(|id| *id == ledger_ids[0]));
        assert!(ledger_ids[0].starts_with("ledger"));
        assert_ne!(ledger_ids[0], "ledger1");

        let reject_call = &guard.alternatives[1].interactions[0];
        assert_eq!(reject_call.receiver, "this");
        assert_eq!(reject_call.instance_id, "this1");
    }

    #[test]
    fn test_sequence_ids_are_unique() {
        fn collect(fragment: &ControlFlowFragment, ids: &mut Vec<u32>) {
            ids.push(fragment.sequence_id);
            for record in fragment.condition_interactions.iter().chain(fragment.interactions.iter()) {
                ids.extend(record.chain().iter().map(|r| r.sequence_id));
            }
            for nested in fragment.fragments.iter().chain(fragment.alternatives.iter()) {
                collect(nested, ids);
            }
        }

        let model = extract_java(ACCOUNTS);
        let mut ids = Vec::new();
        for group in &model.method_groups {
            for record in &group.interactions {
                ids.extend(record.chain().iter().map(|r| r.sequence_id));
            }
            for fragment in &group.fragments {
                collect(fragment, &mut ids);
            }
        }
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_re_extraction_is_deterministic() {
        assert_eq!(extract_java(ACCOUNTS), extract_java(ACCOUNTS));
    }

    #[test]
    fn test_unresolved_receiver_falls_back_to_text() {
        let call = SyntaxNode::new(NodeKind::MethodCall { return_type: None }, Span::new(3, 3))
            .with_name("run")
            .with_text("helper.run()")
            .with_children(vec![
                SyntaxNode::new(NodeKind::Receiver, Span::new(3, 3)).with_children(vec![
                    SyntaxNode::new(NodeKind::Identifier, Span::new(3, 3))
                        .with_name("helper")
                        .with_text("helper"),
                ]),
                SyntaxNode::new(NodeKind::Arguments, Span::new(3, 3)),
            ]);
        let method = SyntaxNode::new(NodeKind::MethodDecl { return_type: None }, Span::new(2, 4))
            .with_name("go")
            .with_children(vec![SyntaxNode::new(NodeKind::Block, Span::new(2, 4)).with_children(vec![call])]);
        let class = SyntaxNode::new(NodeKind::TypeDecl { type_kind: Default::default() }, Span::new(1, 5))
            .with_name("T")
            .with_children(vec![method]);
        let unit = SyntaxNode::new(NodeKind::CompilationUnit, Span::new(1, 5)).with_children(vec![class]);

        let model = extract(&unit);
        assert_eq!(model.primary_type, "T");
        assert_eq!(model.unresolved_references, 1);
        let record = &model.method_groups[0].interactions[0];
        assert_eq!(record.callee, "helper");
        assert_eq!(record.instance_id, "helper2");
    }
}
