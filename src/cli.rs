use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::core::Engine;

#[derive(Parser)]
#[command(name = "seqtrace")]
#[command(about = "Sequence diagrams from the call structure of Java sources")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default seqtrace.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Extract interaction models from a source tree
    Extract {
        /// Source directories to analyze
        #[arg(short, long)]
        source: Vec<PathBuf>,

        /// Directory the models are written to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the model of a single source file as JSON
    Model {
        /// Source file to extract
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Trace an entry point and render a sequence diagram
    Trace {
        /// Entry point, e.g. com.shop.OrderService.place(java.lang.String)
        #[arg(short, long)]
        entry: String,

        /// Directory holding extracted models
        #[arg(short, long)]
        models: Option<PathBuf>,

        /// Maximum expansion depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Only expand types under this package (repeatable)
        #[arg(long = "base-package")]
        base_packages: Vec<String>,

        /// Drop calls to types with this prefix (repeatable)
        #[arg(long = "exclude-prefix")]
        exclude_prefixes: Vec<String>,

        /// Drop calls to methods with this name (repeatable)
        #[arg(long = "exclude-method")]
        exclude_methods: Vec<String>,

        /// Output format (mermaid, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Write the diagram here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List every type known to the model directory
    Types {
        /// Directory holding extracted models
        #[arg(short, long)]
        models: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path } => {
                engine.init(path).await?;
                Ok(())
            }
            Commands::Extract { source, output } => {
                engine.extract(source, output).await?;
                Ok(())
            }
            Commands::Model { file } => {
                let model = engine.model_for_file(&file)?;
                println!("{}", serde_json::to_string_pretty(&model)?);
                Ok(())
            }
            Commands::Trace {
                entry,
                models,
                depth,
                base_packages,
                exclude_prefixes,
                exclude_methods,
                format,
                output,
            } => {
                let overrides = TraceOverrides {
                    depth,
                    base_packages,
                    exclude_prefixes,
                    exclude_methods,
                };
                overrides.apply(engine.config_mut())?;

                let diagram = engine.trace(&entry, models, format).await?;
                write_output(&diagram, output.as_deref())
            }
            Commands::Types { models } => {
                for fqn in engine.list_types(models).await? {
                    println!("{}", fqn);
                }
                Ok(())
            }
        }
    }
}

/// `trace` flags that replace `[trace]` keys for one run.
struct TraceOverrides {
    depth: Option<usize>,
    base_packages: Vec<String>,
    exclude_prefixes: Vec<String>,
    exclude_methods: Vec<String>,
}

impl TraceOverrides {
    fn apply(self, config: &mut Config) -> Result<()> {
        let trace = &mut config.trace;
        if let Some(depth) = self.depth {
            trace.depth = depth;
        }
        if !self.base_packages.is_empty() {
            trace.base_packages = self.base_packages;
        }
        if !self.exclude_prefixes.is_empty() {
            trace.excluded_class_prefixes = self.exclude_prefixes;
        }
        if !self.exclude_methods.is_empty() {
            trace.excluded_method_names = self.exclude_methods;
        }
        config.validate()?;
        Ok(())
    }
}

fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("📝 Diagram written to {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeqTraceError;

    #[test]
    fn test_trace_arguments() {
        let cli = Cli::parse_from([
            "seqtrace",
            "--verbose",
            "trace",
            "--entry",
            "a.B.run()",
            "--depth",
            "2",
            "--base-package",
            "a",
            "--base-package",
            "b",
            "--exclude-prefix",
            "java.util",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Trace { entry, depth, base_packages, exclude_prefixes, exclude_methods, .. } => {
                assert_eq!(entry, "a.B.run()");
                assert_eq!(depth, Some(2));
                assert_eq!(base_packages, vec!["a", "b"]);
                assert_eq!(exclude_prefixes, vec!["java.util"]);
                assert!(exclude_methods.is_empty());
            }
            _ => panic!("expected the trace command"),
        }
    }

    fn overrides(depth: Option<usize>) -> TraceOverrides {
        TraceOverrides {
            depth,
            base_packages: vec!["com.shop".to_string()],
            exclude_prefixes: Vec::new(),
            exclude_methods: vec!["toString".to_string()],
        }
    }

    #[test]
    fn test_overrides_replace_config_keys() {
        let mut config = Config::default();
        overrides(Some(2)).apply(&mut config).unwrap();
        assert_eq!(config.trace.depth, 2);
        assert_eq!(config.trace.base_packages, vec!["com.shop"]);
        assert_eq!(config.trace.excluded_class_prefixes, vec!["java.lang"]);
        assert_eq!(config.trace.excluded_method_names, vec!["toString"]);
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let mut config = Config::default();
        let error = overrides(Some(0)).apply(&mut config).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SeqTraceError>(),
            Some(SeqTraceError::Config(message)) if message.contains("depth")
        ));
    }

    #[test]
    fn test_extract_accepts_several_sources() {
        let cli = Cli::parse_from(["seqtrace", "extract", "-s", "a", "-s", "b", "-o", "models"]);
        match cli.command {
            Commands::Extract { source, output } => {
                assert_eq!(source, vec![PathBuf::from("a"), PathBuf::from("b")]);
                assert_eq!(output, Some(PathBuf::from("models")));
            }
            _ => panic!("expected the extract command"),
        }
    }
}
