// src/core/sequence/render.rs
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::languages::catalog::erase;
use super::signature::{display_name, escape_label};
use crate::error::{Result, SeqTraceError};

/// Keyword that opens a control-flow block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentStyle {
    Alt,
    Opt,
    Loop,
}

impl FragmentStyle {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Alt => "alt",
            Self::Opt => "opt",
            Self::Loop => "loop",
        }
    }
}

/// One step of a diagram, in top-to-bottom order. Participants are type FQNs
/// (or the actor name); renderers derive identifiers and labels from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RenderInstruction {
    Call { caller: String, callee: String, signature: String },
    Activate { participant: String },
    Deactivate { participant: String },
    FragmentBegin { kind: FragmentStyle, condition: String },
    FragmentElse { condition: String },
    FragmentEnd,
    Note { participant: String, text: String },
    Return { from: String, to: String, label: String },
}

/// Turns an instruction stream into diagram text.
pub trait DiagramRenderer: Send + Sync {
    fn render(&self, instructions: &[RenderInstruction]) -> Result<String>;

    fn format_name(&self) -> &str;
}

/// Renderer for a configured output format name.
pub fn create_renderer(format: &str, actor: &str, indent_width: usize) -> Result<Box<dyn DiagramRenderer>> {
    match format {
        "mermaid" => Ok(Box::new(MermaidRenderer::new(actor, indent_width)?)),
        "json" => Ok(Box::new(JsonRenderer)),
        other => Err(SeqTraceError::Config(format!("Unknown output format: {}", other))),
    }
}

/// Mermaid `sequenceDiagram` text.
///
/// The caller of the first `Call` is the actor; every other participant is
/// a type, declared on first use.
pub struct MermaidRenderer {
    actor: String,
    indent_width: usize,
    unsafe_characters: Regex,
}

/// Participant registry and activation counters for one render call.
struct MermaidState {
    out: String,
    declared: HashSet<String>,
    activations: HashMap<String, usize>,
    depth: usize,
}

impl MermaidRenderer {
    pub fn new(actor: impl Into<String>, indent_width: usize) -> Result<Self> {
        Ok(Self {
            actor: actor.into(),
            indent_width,
            unsafe_characters: Regex::new(r"[^A-Za-z0-9_]").map_err(|e| SeqTraceError::Config(e.to_string()))?,
        })
    }

    /// Diagram-safe identifier: `com.shop.Box<T>` becomes `com_shop_Box`.
    pub fn participant_id(&self, type_name: &str) -> String {
        self.unsafe_characters.replace_all(&erase(type_name), "_").into_owned()
    }

    fn line_at(&self, state: &mut MermaidState, depth: usize, text: &str) {
        let _ = writeln!(state.out, "{:indent$}{}", "", text.trim_end(), indent = depth * self.indent_width);
    }

    /// Write `text` at the current fragment depth.
    fn line(&self, state: &mut MermaidState, text: &str) {
        let depth = state.depth;
        self.line_at(state, depth, text);
    }

    /// Identifier for `participant`, declaring it at the current indentation
    /// the first time it appears.
    fn participant(&self, state: &mut MermaidState, participant: &str) -> String {
        let id = self.participant_id(participant);
        if state.declared.insert(id.clone()) {
            let declaration = format!("participant {} as {}", id, display_name(participant));
            self.line(state, &declaration);
        }
        id
    }
}

impl DiagramRenderer for MermaidRenderer {
    fn render(&self, instructions: &[RenderInstruction]) -> Result<String> {
        let mut state = MermaidState {
            out: String::new(),
            declared: HashSet::new(),
            activations: HashMap::new(),
            depth: 0,
        };
        self.line_at(&mut state, 0, "sequenceDiagram");
        self.line_at(&mut state, 0, &format!("actor {}", self.actor));

        let initiating_call = instructions
            .iter()
            .position(|i| matches!(i, RenderInstruction::Call { .. }));

        for (position, instruction) in instructions.iter().enumerate() {
            match instruction {
                RenderInstruction::Call { caller, callee, signature } => {
                    let from = if Some(position) == initiating_call {
                        self.actor.clone()
                    } else {
                        self.participant(&mut state, caller)
                    };
                    let to = self.participant(&mut state, callee);
                    let arrow = format!("{}->>{}: {}", from, to, escape_label(signature));
                    self.line(&mut state, &arrow);
                }
                RenderInstruction::Activate { participant } => {
                    let id = self.participant(&mut state, participant);
                    *state.activations.entry(id.clone()).or_insert(0) += 1;
                    self.line(&mut state, &format!("activate {}", id));
                }
                RenderInstruction::Deactivate { participant } => {
                    let id = self.participant_id(participant);
                    match state.activations.get_mut(&id) {
                        Some(count) if *count > 0 => {
                            *count -= 1;
                            self.line(&mut state, &format!("deactivate {}", id));
                        }
                        _ => debug!("Skipping deactivate of inactive participant {}", participant),
                    }
                }
                RenderInstruction::FragmentBegin { kind, condition } => {
                    let opening = format!("{} {}", kind.keyword(), escape_label(condition));
                    self.line(&mut state, &opening);
                    state.depth += 1;
                }
                RenderInstruction::FragmentElse { condition } => {
                    let depth = state.depth.saturating_sub(1);
                    self.line_at(&mut state, depth, &format!("else {}", escape_label(condition)));
                }
                RenderInstruction::FragmentEnd => {
                    state.depth = state.depth.saturating_sub(1);
                    self.line(&mut state, "end");
                }
                RenderInstruction::Note { participant, text } => {
                    let id = self.participant(&mut state, participant);
                    let note = format!("Note over {}: {}", id, escape_label(text));
                    self.line(&mut state, &note);
                }
                RenderInstruction::Return { from, to, label } => {
                    let from = self.participant(&mut state, from);
                    let to = self.participant(&mut state, to);
                    let arrow = format!("{}-->>{}: {}", from, to, escape_label(label));
                    self.line(&mut state, &arrow);
                }
            }
        }

        Ok(state.out)
    }

    fn format_name(&self) -> &str {
        "mermaid"
    }
}

/// The instruction stream itself, as pretty-printed JSON.
pub struct JsonRenderer;

impl DiagramRenderer for JsonRenderer {
    fn render(&self, instructions: &[RenderInstruction]) -> Result<String> {
        Ok(serde_json::to_string_pretty(instructions)?)
    }

    fn format_name(&self) -> &str {
        "json"
    }
}
