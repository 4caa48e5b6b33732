// src/core/sequence/tracer.rs
//! Sequence tracer: expands an entry point into render instructions.
//!
//! Depth counts method-body expansions. The entry method's body is depth 1;
//! a call made at depth `d` is expanded only while `d < max_depth`, so the
//! activation nesting of a trace never exceeds `max_depth`.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::filter::TraceFilter;
use super::index::ModelIndex;
use super::render::{FragmentStyle, RenderInstruction};
use super::signature::{display_name, format_argument, EntryPoint};
use crate::config::TraceConfig;
use crate::core::languages::catalog::erase;
use crate::core::model::{
    BodyItem, ControlFlowFragment, FileModel, FragmentKind, InteractionKind, InteractionRecord, MethodGroup,
};

/// Tracing knobs, usually taken from `[trace]` in the config.
#[derive(Debug, Clone)]
pub struct TraceOptions {
    pub max_depth: usize,
    /// Only callees under these prefixes are expanded; empty expands all.
    pub base_packages: Vec<String>,
    pub hide_details_in_conditionals: bool,
    pub hide_details_in_chain_expression: bool,
    pub prune_empty_fragments: bool,
    pub opt_for_single_branch: bool,
    pub show_annotations: bool,
    pub show_returns: bool,
    pub actor: String,
    pub max_argument_length: usize,
}

impl From<&TraceConfig> for TraceOptions {
    fn from(config: &TraceConfig) -> Self {
        Self {
            max_depth: config.depth,
            base_packages: config.base_packages.clone(),
            hide_details_in_conditionals: config.hide_details_in_conditionals,
            hide_details_in_chain_expression: config.hide_details_in_chain_expression,
            prune_empty_fragments: config.prune_empty_fragments,
            opt_for_single_branch: config.opt_for_single_branch,
            show_annotations: config.show_annotations,
            show_returns: config.show_returns,
            actor: config.actor.clone(),
            max_argument_length: config.max_argument_length,
        }
    }
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self::from(&TraceConfig::default())
    }
}

/// A call site whose detail was reduced. None of these stop a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// The extractor could not bind the target and kept its source text.
    UnresolvedBinding { target: String, line: usize },
    TypeNotInIndex { type_fqn: String },
    /// Several overloads fit; the first declared one was used.
    AmbiguousMethodMatch { type_fqn: String, method: String, candidates: usize },
    CyclicCall { type_fqn: String, method: String },
    DepthExceeded { type_fqn: String, method: String, depth: usize },
}

/// Result of one trace.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub entry: String,
    pub instructions: Vec<RenderInstruction>,
    pub degradations: Vec<Degradation>,
}

impl Trace {
    pub fn call_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| matches!(i, RenderInstruction::Call { .. }))
            .count()
    }
}

/// `(owner, name, signature)` of a method on the current expansion path.
type MethodKey = (String, String, String);

fn method_key(group: &MethodGroup) -> MethodKey {
    (group.owner.clone(), group.name.clone(), group.signature.clone())
}

/// Output and bookkeeping of one trace.
#[derive(Default)]
struct Walk {
    instructions: Vec<RenderInstruction>,
    degradations: Vec<Degradation>,
    path: Vec<MethodKey>,
}

impl Walk {
    fn push(&mut self, instruction: RenderInstruction) {
        self.instructions.push(instruction);
    }

    fn degrade(&mut self, degradation: Degradation) {
        debug!("Trace degraded: {:?}", degradation);
        self.degradations.push(degradation);
    }

    fn has_call_since(&self, mark: usize) -> bool {
        self.instructions[mark..]
            .iter()
            .any(|i| matches!(i, RenderInstruction::Call { .. }))
    }
}

/// How a method is picked inside one type.
enum MethodQuery<'q> {
    Method { name: &'q str, accepts: &'q dyn Fn(&MethodGroup) -> bool },
    Constructor { arity: usize },
}

pub struct SequenceTracer<'a> {
    index: &'a dyn ModelIndex,
    filter: &'a dyn TraceFilter,
    options: TraceOptions,
}

impl<'a> SequenceTracer<'a> {
    pub fn new(index: &'a dyn ModelIndex, filter: &'a dyn TraceFilter, options: TraceOptions) -> Self {
        Self { index, filter, options }
    }

    pub fn trace(&self, entry: &EntryPoint) -> Trace {
        let mut walk = Walk::default();
        let participant = entry.type_fqn.as_str();

        walk.push(RenderInstruction::Call {
            caller: self.options.actor.clone(),
            callee: participant.to_string(),
            signature: format!("{}()", entry.method_name),
        });
        walk.push(RenderInstruction::Activate { participant: participant.to_string() });

        if self.options.show_annotations {
            if let Some(model) = self.index.lookup(participant) {
                for annotation in &model.annotations {
                    walk.push(RenderInstruction::Note {
                        participant: participant.to_string(),
                        text: annotation.display(),
                    });
                }
            }
        }

        let accepts = |group: &MethodGroup| {
            let types: Vec<String> = group.parameters.iter().map(|p| p.type_name.clone()).collect();
            entry.matches_parameters(&types)
        };
        let query = MethodQuery::Method { name: &entry.method_name, accepts: &accepts };
        match self.find_method(participant, &query, &mut walk) {
            Some((model, position)) => self.expand_group(&model.method_groups[position], participant, 1, &mut walk),
            None => debug!("Entry method {} not found", entry),
        }

        walk.push(RenderInstruction::Deactivate { participant: participant.to_string() });
        Trace {
            entry: entry.to_string(),
            instructions: walk.instructions,
            degradations: walk.degradations,
        }
    }

    /// Walk a method body on behalf of `participant`, keeping the method on
    /// the expansion path meanwhile.
    fn expand_group(&self, group: &MethodGroup, participant: &str, depth: usize, walk: &mut Walk) {
        walk.path.push(method_key(group));
        if self.options.show_annotations {
            for annotation in &group.annotations {
                walk.push(RenderInstruction::Note {
                    participant: participant.to_string(),
                    text: annotation.display(),
                });
            }
        }
        self.walk_body(&group.body(), participant, depth, walk);
        walk.path.pop();
    }

    fn walk_body(&self, items: &[BodyItem<'_>], participant: &str, depth: usize, walk: &mut Walk) {
        for item in items {
            match item {
                BodyItem::Interaction(record) => self.walk_interaction(record, participant, depth, false, walk),
                BodyItem::Fragment(fragment) => self.walk_fragment(fragment, participant, depth, walk),
            }
        }
    }

    /// Draw every link of a chain from `participant`; expand the links the
    /// options allow.
    fn walk_interaction(
        &self,
        record: &InteractionRecord,
        participant: &str,
        depth: usize,
        in_condition: bool,
        walk: &mut Walk,
    ) {
        let links = record.chain();
        let last = links.len() - 1;
        for (position, link) in links.into_iter().enumerate() {
            if self.filter.should_exclude(&link.callee, &link.method_name) {
                continue;
            }
            if !looks_resolved(&link.callee) {
                walk.degrade(Degradation::UnresolvedBinding {
                    target: link.callee.clone(),
                    line: link.line,
                });
            }
            walk.push(RenderInstruction::Call {
                caller: participant.to_string(),
                callee: link.callee.clone(),
                signature: self.call_label(link),
            });

            let hidden = (in_condition && self.options.hide_details_in_conditionals)
                || (position < last && self.options.hide_details_in_chain_expression);
            if !hidden {
                self.expand_call(link, participant, depth, walk);
            }
        }
    }

    fn expand_call(&self, link: &InteractionRecord, caller: &str, depth: usize, walk: &mut Walk) {
        let callee = link.callee.as_str();
        if !self.in_base_packages(callee) {
            return;
        }
        if depth >= self.options.max_depth {
            walk.degrade(Degradation::DepthExceeded {
                type_fqn: callee.to_string(),
                method: link.method_name.clone(),
                depth,
            });
            return;
        }

        let arity = link.arguments.len();
        let accepts = |group: &MethodGroup| group.accepts_arity(arity);
        let query = match link.kind {
            InteractionKind::MethodCall => MethodQuery::Method { name: &link.method_name, accepts: &accepts },
            InteractionKind::ConstructorCall | InteractionKind::Instantiation => MethodQuery::Constructor { arity },
        };
        let Some((model, position)) = self.find_method(callee, &query, walk) else {
            return;
        };
        let group = &model.method_groups[position];

        if walk.path.contains(&method_key(group)) {
            walk.degrade(Degradation::CyclicCall {
                type_fqn: callee.to_string(),
                method: group.name.clone(),
            });
            return;
        }

        let mark = walk.instructions.len();
        walk.push(RenderInstruction::Activate { participant: callee.to_string() });
        self.expand_group(group, callee, depth + 1, walk);

        // Nothing drawn inside: keep the bare arrow.
        if !walk.has_call_since(mark) {
            walk.instructions.truncate(mark);
            return;
        }
        walk.push(RenderInstruction::Deactivate { participant: callee.to_string() });

        if self.options.show_returns {
            if let Some(label) = return_label(link) {
                walk.push(RenderInstruction::Return {
                    from: callee.to_string(),
                    to: caller.to_string(),
                    label,
                });
            }
        }
    }

    /// Locate a method of `type_fqn`, searching supertypes for inherited
    /// methods. Constructors are never inherited.
    fn find_method(&self, type_fqn: &str, query: &MethodQuery<'_>, walk: &mut Walk) -> Option<(Arc<FileModel>, usize)> {
        let mut current = type_fqn.to_string();
        let mut seen = HashSet::new();

        while seen.insert(current.clone()) {
            let Some(model) = self.index.lookup(&current) else {
                if current == type_fqn {
                    walk.degrade(Degradation::TypeNotInIndex { type_fqn: current });
                }
                return None;
            };

            let (method, candidates) = match query {
                MethodQuery::Method { name, accepts } => {
                    let named: Vec<usize> = positions(&model, |g| g.owner == current && g.name == *name && !g.is_constructor);
                    let fitting: Vec<usize> = named.iter().copied().filter(|&i| accepts(&model.method_groups[i])).collect();
                    (name.to_string(), if fitting.is_empty() { named } else { fitting })
                }
                MethodQuery::Constructor { arity } => {
                    let all: Vec<usize> = positions(&model, |g| g.owner == current && g.is_constructor);
                    let fitting: Vec<usize> = all
                        .iter()
                        .copied()
                        .filter(|&i| model.method_groups[i].accepts_arity(*arity))
                        .collect();
                    (display_name(&current), fitting)
                }
            };

            if let Some(&first) = candidates.first() {
                if candidates.len() > 1 {
                    walk.degrade(Degradation::AmbiguousMethodMatch {
                        type_fqn: current.clone(),
                        method,
                        candidates: candidates.len(),
                    });
                }
                return Some((model, first));
            }
            if matches!(query, MethodQuery::Constructor { .. }) {
                return None;
            }
            match model.superclass_of(&current) {
                Some(parent) => current = erase(parent),
                None => break,
            }
        }

        debug!("No method on {} or its supertypes matched", type_fqn);
        None
    }

    fn walk_fragment(&self, fragment: &ControlFlowFragment, participant: &str, depth: usize, walk: &mut Walk) {
        let mark = walk.instructions.len();
        let kind = if fragment.kind.is_loop() {
            FragmentStyle::Loop
        } else if fragment.alternatives.is_empty() && self.options.opt_for_single_branch {
            FragmentStyle::Opt
        } else {
            FragmentStyle::Alt
        };

        walk.push(RenderInstruction::FragmentBegin {
            kind,
            condition: fragment.condition.clone(),
        });
        self.walk_branch(fragment, participant, depth, walk);
        for alternative in &fragment.alternatives {
            walk.push(RenderInstruction::FragmentElse {
                condition: alternative.condition.clone(),
            });
            self.walk_branch(alternative, participant, depth, walk);
        }
        walk.push(RenderInstruction::FragmentEnd);

        if self.options.prune_empty_fragments && !walk.has_call_since(mark) {
            walk.instructions.truncate(mark);
        }
    }

    /// Condition calls come first, except for `do ... while` where the
    /// condition is evaluated after the body.
    fn walk_branch(&self, branch: &ControlFlowFragment, participant: &str, depth: usize, walk: &mut Walk) {
        let condition_last = branch.kind == FragmentKind::DoWhile;
        if !condition_last {
            self.walk_condition(branch, participant, depth, walk);
        }
        self.walk_body(&branch.body(), participant, depth, walk);
        if condition_last {
            self.walk_condition(branch, participant, depth, walk);
        }
    }

    fn walk_condition(&self, branch: &ControlFlowFragment, participant: &str, depth: usize, walk: &mut Walk) {
        for record in &branch.condition_interactions {
            self.walk_interaction(record, participant, depth, true, walk);
        }
    }

    fn in_base_packages(&self, type_fqn: &str) -> bool {
        self.options.base_packages.is_empty()
            || self
                .options
                .base_packages
                .iter()
                .any(|prefix| type_fqn.starts_with(prefix.as_str()))
    }

    fn call_label(&self, link: &InteractionRecord) -> String {
        let arguments = link
            .arguments
            .iter()
            .map(|a| format_argument(a, self.options.max_argument_length))
            .collect::<Vec<_>>()
            .join(", ");
        match link.kind {
            InteractionKind::Instantiation => format!("new {}({})", link.method_name, arguments),
            _ => format!("{}({})", link.method_name, arguments),
        }
    }
}

fn positions(model: &FileModel, predicate: impl Fn(&MethodGroup) -> bool) -> Vec<usize> {
    model
        .method_groups
        .iter()
        .enumerate()
        .filter(|(_, g)| predicate(g))
        .map(|(i, _)| i)
        .collect()
}

/// A bound callee is a (possibly qualified) type name; fallbacks keep
/// expression text such as `items.get(0)`.
fn looks_resolved(callee: &str) -> bool {
    !callee.is_empty()
        && callee
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']'))
}

fn return_label(link: &InteractionRecord) -> Option<String> {
    if let Some(variable) = &link.assigned_to {
        return Some(variable.clone());
    }
    link.return_type
        .as_deref()
        .filter(|t| *t != "void")
        .map(display_name)
}
