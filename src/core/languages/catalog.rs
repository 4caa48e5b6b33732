// src/core/languages/catalog.rs
//! Project-wide declaration catalog.
//!
//! The binder in `java.rs` only sees one file at a time. To type receivers
//! declared elsewhere (fields of a supertype, return values of methods on
//! other classes) it consults this catalog, which holds the declarations of
//! every source file in the project with their types still unresolved and the
//! import context needed to resolve them on demand.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::java::JavaFrontEnd;
use crate::core::syntax::TypeKind;

const PRIMITIVES: &[&str] = &[
    "void", "boolean", "byte", "char", "short", "int", "long", "float", "double", "var",
];

const JAVA_LANG: &[&str] = &[
    "Boolean", "Byte", "CharSequence", "Character", "Class", "ClassCastException", "Cloneable",
    "Comparable", "Deprecated", "Double", "Enum", "Error", "Exception", "Float",
    "FunctionalInterface", "IllegalArgumentException", "IllegalStateException",
    "IndexOutOfBoundsException", "Integer", "InterruptedException", "Iterable", "Long", "Math",
    "NullPointerException", "Number", "NumberFormatException", "Object", "Override",
    "Runnable", "RuntimeException", "SafeVarargs", "Short", "String", "StringBuffer",
    "StringBuilder", "SuppressWarnings", "System", "Thread", "ThreadLocal", "Throwable",
    "UnsupportedOperationException", "Void",
];

/// Name-resolution context of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportContext {
    pub package: String,
    /// Simple name -> FQN for single-type imports.
    pub single: HashMap<String, String>,
    /// Packages (or types) imported with `.*`.
    pub wildcards: Vec<String>,
    /// Types declared in the file: simple name and `Outer.Inner` -> FQN.
    pub local_types: HashMap<String, String>,
    /// Type variables in scope; they erase to `java.lang.Object`.
    pub type_vars: HashSet<String>,
    /// Statically imported member -> declaring type FQN.
    #[serde(default)]
    pub static_members: HashMap<String, String>,
}

impl ImportContext {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Default::default()
        }
    }

    pub fn qualify(&self, simple: &str) -> String {
        if self.package.is_empty() {
            simple.to_string()
        } else {
            format!("{}.{}", self.package, simple)
        }
    }

    /// Resolve a type as written in source to a fully-qualified name.
    ///
    /// Never fails: a name that cannot be resolved is guessed to live in the
    /// current package (capitalised) or returned unchanged.
    pub fn resolve(&self, raw: &str, catalog: &TypeCatalog) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return String::new();
        }
        if let Some(element) = raw.strip_suffix("[]") {
            return format!("{}[]", self.resolve(element, catalog));
        }
        if let Some(element) = raw.strip_suffix("...") {
            return format!("{}...", self.resolve(element, catalog));
        }
        if let Some(open) = raw.find('<') {
            let base = self.resolve(&raw[..open], catalog);
            let rest = &raw[open + 1..];
            let inner = rest.strip_suffix('>').unwrap_or(rest);
            let args = split_type_arguments(inner)
                .into_iter()
                .map(|arg| self.resolve_type_argument(arg, catalog))
                .collect::<Vec<_>>();
            if args.is_empty() {
                return base;
            }
            return format!("{}<{}>", base, args.join(", "));
        }
        // Annotations on a type use are not part of its name.
        let raw = raw.rsplit(' ').next().unwrap_or(raw);

        if PRIMITIVES.contains(&raw) {
            return raw.to_string();
        }
        if self.type_vars.contains(raw) {
            return "java.lang.Object".to_string();
        }
        if let Some((first, rest)) = raw.split_once('.') {
            if let Some(fqn) = self.lookup_simple(first, catalog) {
                return format!("{}.{}", fqn, rest);
            }
            return raw.to_string();
        }
        if let Some(fqn) = self.lookup_simple(raw, catalog) {
            return fqn;
        }
        if raw.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
            return self.qualify(raw);
        }
        raw.to_string()
    }

    fn resolve_type_argument(&self, arg: &str, catalog: &TypeCatalog) -> String {
        let arg = arg.trim();
        if arg == "?" {
            return arg.to_string();
        }
        for bound in ["? extends ", "? super "] {
            if let Some(rest) = arg.strip_prefix(bound) {
                return format!("{}{}", bound, self.resolve(rest, catalog));
            }
        }
        self.resolve(arg, catalog)
    }

    /// Simple name lookup without the same-package guess.
    fn lookup_simple(&self, simple: &str, catalog: &TypeCatalog) -> Option<String> {
        if let Some(fqn) = self.single.get(simple) {
            return Some(fqn.clone());
        }
        if let Some(fqn) = self.local_types.get(simple) {
            return Some(fqn.clone());
        }
        let same_package = self.qualify(simple);
        if catalog.contains(&same_package) {
            return Some(same_package);
        }
        for wildcard in &self.wildcards {
            let candidate = format!("{}.{}", wildcard, simple);
            if catalog.contains(&candidate) {
                return Some(candidate);
            }
        }
        if JAVA_LANG.contains(&simple) {
            return Some(format!("java.lang.{}", simple));
        }
        None
    }

    /// Whether `simple` names a type visible in this file (used to tell a
    /// static call receiver apart from a variable).
    pub fn knows_type(&self, simple: &str, catalog: &TypeCatalog) -> bool {
        self.lookup_simple(simple, catalog).is_some()
    }
}

/// Split `A, Map<B, C>, D` on top-level commas.
fn split_type_arguments(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

/// Declared shape of a method, as far as the binder needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodShape {
    pub name: String,
    /// Unresolved return type as written.
    pub return_type: String,
    pub arity: usize,
    pub varargs: bool,
}

impl MethodShape {
    fn accepts(&self, arity: usize) -> bool {
        if self.varargs {
            arity + 1 >= self.arity
        } else {
            arity == self.arity
        }
    }
}

/// A type declaration with its members' types as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    pub fqn: String,
    pub kind: TypeKind,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: HashMap<String, String>,
    pub methods: Vec<MethodShape>,
    pub context: ImportContext,
}

/// Thread-safe catalog of every declared type in the project.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: DashMap<String, Arc<TypeDeclaration>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from `(path, source)` pairs in parallel. Each rayon
    /// worker owns one front end, since a tree-sitter parser is not `Sync`.
    pub fn build(sources: &[(PathBuf, String)]) -> Self {
        let catalog = TypeCatalog::new();

        sources
            .par_iter()
            .for_each_init(JavaFrontEnd::new, |front_end, (path, source)| {
                let front_end = match front_end {
                    Ok(front_end) => front_end,
                    Err(e) => {
                        warn!("Java front end unavailable: {}", e);
                        return;
                    }
                };
                match front_end.declarations(source) {
                    Ok(declarations) => {
                        for declaration in declarations {
                            catalog.insert(declaration);
                        }
                    }
                    Err(e) => warn!("Failed to scan declarations in {}: {}", path.display(), e),
                }
            });

        debug!("Catalogued {} types", catalog.len());
        catalog
    }

    pub fn insert(&self, declaration: TypeDeclaration) {
        self.types.insert(declaration.fqn.clone(), Arc::new(declaration));
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.types.contains_key(fqn)
    }

    pub fn get(&self, fqn: &str) -> Option<Arc<TypeDeclaration>> {
        self.types.get(fqn).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Resolved superclass of a catalogued type.
    pub fn superclass_of(&self, fqn: &str) -> Option<String> {
        let declaration = self.get(fqn)?;
        let raw = declaration.superclass.as_deref()?;
        Some(erase(&declaration.context.resolve(raw, self)))
    }

    /// Resolved superclass followed by resolved interfaces.
    fn supertypes_of(&self, declaration: &TypeDeclaration) -> Vec<String> {
        declaration
            .superclass
            .iter()
            .chain(declaration.interfaces.iter())
            .map(|raw| erase(&declaration.context.resolve(raw, self)))
            .collect()
    }

    /// Declared type of field `name` on `fqn` or any catalogued supertype.
    pub fn field_type(&self, fqn: &str, name: &str) -> Option<String> {
        self.walk_supertypes(fqn, |declaration| {
            declaration
                .fields
                .get(name)
                .map(|raw| declaration.context.resolve(raw, self))
        })
    }

    /// Return type of the first method `name` on `fqn` (or a supertype)
    /// accepting `arity` arguments; falls back to any overload by name.
    pub fn method_return_type(&self, fqn: &str, name: &str, arity: usize) -> Option<String> {
        self.walk_supertypes(fqn, |declaration| {
            let overloads: Vec<&MethodShape> = declaration.methods.iter().filter(|m| m.name == name).collect();
            let chosen = overloads
                .iter()
                .find(|m| m.accepts(arity))
                .or_else(|| overloads.first())?;
            Some(declaration.context.resolve(&chosen.return_type, self))
        })
    }

    fn walk_supertypes<T>(&self, fqn: &str, mut probe: impl FnMut(&TypeDeclaration) -> Option<T>) -> Option<T> {
        let mut visited = HashSet::new();
        let mut pending = vec![erase(fqn)];
        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(declaration) = self.get(&current) else {
                continue;
            };
            if let Some(found) = probe(&declaration) {
                return Some(found);
            }
            let mut supertypes = self.supertypes_of(&declaration);
            supertypes.reverse();
            pending.extend(supertypes);
        }
        None
    }
}

/// Drop generic arguments: `java.util.List<a.B>` -> `java.util.List`.
pub fn erase(type_name: &str) -> String {
    match type_name.find('<') {
        Some(open) => {
            let suffix = &type_name[type_name.rfind('>').map(|i| i + 1).unwrap_or(type_name.len())..];
            format!("{}{}", &type_name[..open], suffix)
        }
        None => type_name.to_string(),
    }
}
