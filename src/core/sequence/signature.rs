// src/core/sequence/signature.rs
use std::fmt;

use crate::core::languages::catalog::erase;
use crate::core::syntax::normalize_whitespace;
use crate::error::{Result, SeqTraceError};

/// A parsed entry point: `com.shop.OrderService.find(java.lang.String,int)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub type_fqn: String,
    pub method_name: String,
    /// `None` when the signature has no parameter list or an empty one;
    /// the method is then matched by name alone.
    pub parameter_types: Option<Vec<String>>,
}

impl EntryPoint {
    pub fn parse(signature: &str) -> Result<Self> {
        let signature = signature.trim();
        let invalid = |reason: &str| SeqTraceError::InvalidEntryPoint(format!("'{}': {}", signature, reason));

        let (head, parameters) = match signature.find('(') {
            Some(open) => {
                let list = signature[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("unterminated parameter list"))?;
                (&signature[..open], Some(list))
            }
            None => (signature, None),
        };

        let (type_fqn, method_name) = head
            .rsplit_once('.')
            .ok_or_else(|| invalid("expected <type>.<method>"))?;
        if type_fqn.is_empty() || !is_identifier(method_name) {
            return Err(invalid("expected <type>.<method>"));
        }
        if !type_fqn.split('.').all(is_identifier) {
            return Err(invalid("type name is not a qualified identifier"));
        }

        let parameter_types = parameters
            .map(|list| {
                list.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|types| !types.is_empty());

        Ok(Self {
            type_fqn: type_fqn.to_string(),
            method_name: method_name.to_string(),
            parameter_types,
        })
    }

    /// Whether a declared parameter list matches the one given here.
    /// Simple names match their qualified counterparts.
    pub fn matches_parameters(&self, declared: &[String]) -> bool {
        let Some(wanted) = &self.parameter_types else {
            return true;
        };
        wanted.len() == declared.len()
            && wanted.iter().zip(declared).all(|(wanted, declared)| {
                let wanted = erase(wanted);
                let declared = erase(declared);
                wanted == declared || declared.ends_with(&format!(".{}", wanted))
            })
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self.parameter_types.as_deref().unwrap_or_default().join(",");
        write!(f, "{}.{}({})", self.type_fqn, self.method_name, parameters)
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Human-readable participant label: the simple type name.
pub fn display_name(type_name: &str) -> String {
    let erased = erase(type_name);
    erased.rsplit('.').next().unwrap_or(&erased).to_string()
}

/// Argument text as shown inside a call label.
pub fn format_argument(text: &str, max_length: usize) -> String {
    let text = normalize_whitespace(text);
    if text.chars().count() <= max_length {
        return text;
    }
    let truncated: String = text.chars().take(max_length).collect();
    format!("{}...", truncated)
}

/// Escape characters Mermaid treats as statement separators.
pub fn escape_label(text: &str) -> String {
    text.replace(';', "#59;").replace(['\r', '\n'], " ")
}
