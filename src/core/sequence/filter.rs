// src/core/sequence/filter.rs
use std::collections::HashSet;

use crate::config::TraceConfig;

/// Decides whether a call target is left out of a trace entirely.
pub trait TraceFilter: Send + Sync {
    fn should_exclude(&self, type_fqn: &str, method_name: &str) -> bool;
}

/// Excludes by type-name prefix or by simple method name.
#[derive(Debug, Clone, Default)]
pub struct DefaultTraceFilter {
    excluded_class_prefixes: Vec<String>,
    excluded_method_names: HashSet<String>,
}

impl DefaultTraceFilter {
    pub fn new<P, M>(prefixes: P, method_names: M) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            excluded_class_prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .map(|p: String| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            excluded_method_names: method_names
                .into_iter()
                .map(Into::into)
                .map(|m: String| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &TraceConfig) -> Self {
        Self::new(
            config.excluded_class_prefixes.iter().cloned(),
            config.excluded_method_names.iter().cloned(),
        )
    }
}

impl TraceFilter for DefaultTraceFilter {
    fn should_exclude(&self, type_fqn: &str, method_name: &str) -> bool {
        self.excluded_class_prefixes
            .iter()
            .any(|prefix| type_fqn.starts_with(prefix.as_str()))
            || self.excluded_method_names.contains(method_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_and_method_rules() {
        let filter = DefaultTraceFilter::new(["java.lang", "org.slf4j"], ["toString"]);
        assert!(filter.should_exclude("java.lang.String", "trim"));
        assert!(filter.should_exclude("org.slf4j.Logger", "info"));
        assert!(filter.should_exclude("com.shop.Order", "toString"));
        assert!(!filter.should_exclude("com.shop.Order", "close"));
        assert!(!filter.should_exclude("java.util.List", "add"));
    }

    #[test]
    fn test_blank_entries_are_ignored() {
        let filter = DefaultTraceFilter::new(["java.lang", " ", "java.util "], [""]);
        assert!(filter.should_exclude("java.util.ArrayList", "add"));
        // A blank entry would otherwise match every type.
        assert!(!filter.should_exclude("com.shop.Order", "close"));
    }

    #[test]
    fn test_default_filter_excludes_nothing() {
        let filter = DefaultTraceFilter::default();
        assert!(!filter.should_exclude("java.lang.String", "trim"));
    }
}
