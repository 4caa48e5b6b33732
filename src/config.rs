use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SeqTraceError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Source code parsing configuration
    pub parsing: ParsingConfig,

    /// Sequence tracing settings
    pub trace: TraceConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Source directories to analyze
    pub source_dirs: Vec<PathBuf>,

    /// Directories to ignore
    pub ignore_patterns: Vec<String>,

    /// Where extracted models are written and read back from
    pub model_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// File extensions to parse
    pub file_extensions: Vec<String>,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Maximum number of nested method-body expansions
    pub depth: usize,

    /// Only types under these prefixes are expanded; empty means all
    pub base_packages: Vec<String>,

    /// Calls to types starting with any of these prefixes are dropped
    pub excluded_class_prefixes: Vec<String>,

    /// Calls to methods with these simple names are dropped
    pub excluded_method_names: Vec<String>,

    /// Draw calls made while evaluating a condition without expanding them
    pub hide_details_in_conditionals: bool,

    /// Never expand the intermediate links of a call chain
    pub hide_details_in_chain_expression: bool,

    /// Drop control-flow blocks that end up without any call
    pub prune_empty_fragments: bool,

    /// Render an `if` without `else` as `opt` instead of `alt`
    pub opt_for_single_branch: bool,

    /// Emit class and method annotations as notes
    pub show_annotations: bool,

    /// Emit a dashed return arrow after each expanded call
    pub show_returns: bool,

    /// Name of the external initiator
    pub actor: String,

    /// Longest argument text kept in a call label
    pub max_argument_length: usize,

    /// Abort a trace that runs longer than this
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format (mermaid, json)
    pub format: String,

    /// Spaces per fragment nesting level
    pub indent_width: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "Unnamed Project".to_string(),
            source_dirs: vec![PathBuf::from("src/main/java")],
            ignore_patterns: vec![
                "target/".to_string(),
                "build/".to_string(),
                ".git/".to_string(),
                "*.tmp".to_string(),
            ],
            model_dir: PathBuf::from("build/seqtrace-models"),
        }
    }
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            file_extensions: vec!["java".to_string()],
            max_file_size: 1024 * 1024, // 1MB
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            depth: 4,
            base_packages: Vec::new(),
            excluded_class_prefixes: vec!["java.lang".to_string()],
            excluded_method_names: Vec::new(),
            hide_details_in_conditionals: true,
            hide_details_in_chain_expression: true,
            prune_empty_fragments: true,
            opt_for_single_branch: false,
            show_annotations: false,
            show_returns: false,
            actor: "User".to_string(),
            max_argument_length: 40,
            timeout_secs: 30,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "mermaid".to_string(),
            indent_width: 2,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| SeqTraceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SeqTraceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = ["seqtrace.toml", ".seqtrace.toml"];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    /// Reject values no command can run with.
    pub fn validate(&self) -> Result<()> {
        if self.trace.depth == 0 {
            return Err(SeqTraceError::Config("trace.depth must be at least 1".to_string()));
        }
        if !matches!(self.output.format.as_str(), "mermaid" | "json") {
            return Err(SeqTraceError::Config(format!(
                "Unknown output format '{}', expected mermaid or json",
                self.output.format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.trace.depth, 4);
        assert_eq!(config.trace.excluded_class_prefixes, vec!["java.lang"]);
        assert!(config.trace.hide_details_in_conditionals);
        assert_eq!(config.trace.actor, "User");
        assert_eq!(config.output.indent_width, 2);
        assert_eq!(config.parsing.file_extensions, vec!["java"]);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seqtrace.toml");

        let mut config = Config::default();
        config.trace.base_packages = vec!["com.example".to_string()];
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.trace.base_packages, vec!["com.example"]);
        assert_eq!(loaded.trace.timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seqtrace.toml");
        std::fs::write(&path, "[trace]\ndepth = 2\nexcluded_method_names = [\"toString\"]\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.trace.depth, 2);
        assert_eq!(config.trace.excluded_method_names, vec!["toString"]);
        assert_eq!(config.trace.actor, "User");
        assert_eq!(config.output.format, "mermaid");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seqtrace.toml");

        std::fs::write(&path, "[trace]\ndepth = 0\n").unwrap();
        assert!(matches!(Config::load(&path), Err(SeqTraceError::Config(_))));

        std::fs::write(&path, "[output]\nformat = \"plantuml\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(SeqTraceError::Config(_))));

        std::fs::write(&path, "[trace\n").unwrap();
        assert!(matches!(Config::load(&path), Err(SeqTraceError::Config(_))));
    }

    #[test]
    fn test_missing_explicit_path_falls_back_to_defaults() {
        let config = Config::load_or_default(Some("/nonexistent/seqtrace.toml")).unwrap();
        assert_eq!(config.trace.depth, 4);
    }
}
