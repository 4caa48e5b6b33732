// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::SeqTraceError;
use super::languages::{JavaFrontEnd, LanguageFrontEnd, TypeCatalog};
use super::model::FileModel;
use super::parser::{extract_source, extract_sources, SourceCollector};
use super::sequence::{
    create_renderer, DefaultTraceFilter, DirectoryIndex, EntryPoint, ModelIndex, SequenceTracer, TraceOptions,
};

/// Counts reported by a directory extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub models: usize,
    pub failed: usize,
    pub unresolved: usize,
}

/// Main orchestration engine for seqtrace
pub struct Engine {
    config: Config,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Ok(Self { config })
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Command-line overrides are applied here before a command runs.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Write a default `seqtrace.toml` into `path` (or the working directory).
    pub async fn init(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        let target_dir = path.unwrap_or_else(|| PathBuf::from("."));
        info!("Initializing seqtrace in: {}", target_dir.display());

        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("Failed to create {}", target_dir.display()))?;
        let config_path = target_dir.join("seqtrace.toml");
        if config_path.exists() {
            warn!("⚠️ {} already exists, leaving it untouched", config_path.display());
            return Ok(config_path);
        }

        Config::default().save(&config_path)?;
        info!("✅ Wrote {}", config_path.display());
        Ok(config_path)
    }

    /// Extract every source file under `sources` and write the models to `output`.
    pub async fn extract(&self, sources: Vec<PathBuf>, output: Option<PathBuf>) -> Result<ExtractionSummary> {
        let source_dirs = if sources.is_empty() {
            self.config.project.source_dirs.clone()
        } else {
            sources
        };
        let output_dir = output.unwrap_or_else(|| self.config.project.model_dir.clone());

        info!("🔍 Extracting interactions...");
        for dir in &source_dirs {
            info!("Source: {}", dir.display());
        }
        info!("Output: {}", output_dir.display());

        let collector = SourceCollector::new(&self.config.parsing, &self.config.project.ignore_patterns);
        let summary = tokio::task::spawn_blocking(move || -> Result<ExtractionSummary> {
            let mut files = Vec::new();
            for dir in &source_dirs {
                files.extend(collector.collect_directory(dir)?);
            }
            info!("📁 Found {} source files", files.len());

            let mut summary = ExtractionSummary {
                files: files.len(),
                ..Default::default()
            };
            let mut models = Vec::with_capacity(files.len());
            for (path, result) in extract_sources(&files) {
                match result {
                    Ok(model) => {
                        summary.unresolved += model.unresolved_references;
                        models.push(model);
                    }
                    Err(e) => {
                        warn!("Failed to extract {}: {}", path.display(), e);
                        summary.failed += 1;
                    }
                }
            }

            summary.models = DirectoryIndex::write(&output_dir, &models)?;
            Ok(summary)
        })
        .await
        .map_err(|e| SeqTraceError::Join(e.to_string()))??;

        info!("📊 Extraction complete:");
        info!("  - {} files parsed", summary.files);
        info!("  - {} models written", summary.models);
        if summary.failed > 0 {
            info!("  - {} files failed", summary.failed);
        }
        if summary.unresolved > 0 {
            info!("  - {} call targets left unresolved", summary.unresolved);
        }
        Ok(summary)
    }

    /// Extract a single file. Cross-file bindings are limited to what the file
    /// itself declares.
    pub fn model_for_file(&self, path: &Path) -> Result<FileModel> {
        let mut front_end = JavaFrontEnd::new()?;
        let handled = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| front_end.file_extensions().contains(&ext));
        if !handled {
            return Err(SeqTraceError::Parser(format!(
                "{} is not a {} source file",
                path.display(),
                front_end.language_name()
            ))
            .into());
        }

        let collector = SourceCollector::new(&self.config.parsing, &[]);
        let source = collector.read_file(path)?;
        let catalog = TypeCatalog::build(&[(source.path.clone(), source.content.clone())]);
        let model = extract_source(&mut front_end, &source, &catalog)
            .with_context(|| format!("Failed to extract {}", path.display()))?;
        Ok(model)
    }

    /// Trace `entry` against the models in `models` and render it as
    /// `format` (both default to the configuration).
    pub async fn trace(&self, entry: &str, models: Option<PathBuf>, format: Option<String>) -> Result<String> {
        let entry = EntryPoint::parse(entry)?;
        let models_dir = models.unwrap_or_else(|| self.config.project.model_dir.clone());
        let format = format.unwrap_or_else(|| self.config.output.format.clone());
        let renderer = create_renderer(&format, &self.config.trace.actor, self.config.output.indent_width)?;

        info!("🔗 Tracing {}", entry);
        let options = TraceOptions::from(&self.config.trace);
        let filter = DefaultTraceFilter::from_config(&self.config.trace);
        let seconds = self.config.trace.timeout_secs;

        // A detached thread, so a trace that overruns its timeout does not
        // hold up runtime shutdown.
        let (sender, receiver) = oneshot::channel();
        std::thread::Builder::new()
            .name("seqtrace-trace".to_string())
            .spawn(move || {
                let result = DirectoryIndex::open(&models_dir)
                    .map(|index| SequenceTracer::new(&index, &filter, options).trace(&entry));
                // Nobody is listening once the caller has timed out.
                let _ = sender.send(result);
            })
            .map_err(SeqTraceError::Io)?;

        let trace = tokio::time::timeout(Duration::from_secs(seconds), receiver)
            .await
            .map_err(|_| SeqTraceError::Timeout { seconds })?
            .map_err(|_| SeqTraceError::Join("trace thread stopped without a result".to_string()))??;

        if !trace.degradations.is_empty() {
            debug!("{} call sites were drawn with reduced detail", trace.degradations.len());
        }
        info!(
            "🎉 Trace finished with {} instructions ({} calls)",
            trace.instructions.len(),
            trace.call_count()
        );

        let text = renderer.render(&trace.instructions)?;
        Ok(text)
    }

    /// Every type FQN in the model directory.
    pub async fn list_types(&self, models: Option<PathBuf>) -> Result<Vec<String>> {
        let models_dir = models.unwrap_or_else(|| self.config.project.model_dir.clone());
        let types = tokio::task::spawn_blocking(move || {
            DirectoryIndex::open(&models_dir).map(|index| index.all_type_fqns())
        })
        .await
        .map_err(|e| SeqTraceError::Join(e.to_string()))??;
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use predicates::prelude::*;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        temp.child("src/shop/OrderService.java")
            .write_str(
                "package shop;
                public class OrderService {
                    private OrderRepository repository;
                    public void place(String id) {
                        if (id != null) {
                            repository.save(id);
                        }
                    }
                }",
            )
            .unwrap();
        temp.child("src/shop/OrderRepository.java")
            .write_str("package shop; public class OrderRepository { public void save(String id) { } }")
            .unwrap();
        temp.child("src/shop/Broken.java").write_str(&"x".repeat(64)).unwrap();
        temp
    }

    fn engine(temp: &TempDir) -> Engine {
        let mut config = Config::default();
        config.project.source_dirs = vec![temp.path().join("src")];
        config.project.model_dir = temp.path().join("models");
        Engine::with_config(config)
    }

    #[tokio::test]
    async fn test_extract_then_trace() {
        let temp = project();
        let engine = engine(&temp);

        let summary = engine.extract(Vec::new(), None).await.unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.models, 2);
        temp.child("models/shop.OrderService.json").assert(predicate::path::exists());

        let text = engine.trace("shop.OrderService.place(String)", None, None).await.unwrap();
        assert!(text.starts_with("sequenceDiagram\nactor User\n"));
        assert!(text.contains("alt id != null\n"));
        assert!(text.contains("  shop_OrderService->>shop_OrderRepository: save(id)\n"));

        let types = engine.list_types(None).await.unwrap();
        assert_eq!(types, vec!["shop.OrderRepository", "shop.OrderService"]);
    }

    #[tokio::test]
    async fn test_json_format_and_bad_entry() {
        let temp = project();
        let engine = engine(&temp);
        engine.extract(Vec::new(), None).await.unwrap();

        let json = engine
            .trace("shop.OrderService.place()", None, Some("json".to_string()))
            .await
            .unwrap();
        assert!(json.contains("\"op\": \"fragment_begin\""));

        let error = engine.trace("place()", None, None).await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SeqTraceError>(),
            Some(SeqTraceError::InvalidEntryPoint(_))
        ));
    }

    #[tokio::test]
    async fn test_trace_times_out() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(&temp);
        let models: Vec<FileModel> = (0..300)
            .map(|i| FileModel {
                primary_type: format!("bulk.Type{}", i),
                declared_types: vec![format!("bulk.Type{}", i)],
                ..Default::default()
            })
            .collect();
        DirectoryIndex::write(temp.path().join("models"), &models).unwrap();
        engine.config_mut().trace.timeout_secs = 0;

        let error = engine.trace("bulk.Type0.run()", None, None).await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SeqTraceError>(),
            Some(SeqTraceError::Timeout { seconds: 0 })
        ));
    }

    #[tokio::test]
    async fn test_trace_without_models_fails() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let error = engine.trace("a.B.run()", None, None).await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SeqTraceError>(),
            Some(SeqTraceError::FileSystem(_))
        ));
    }

    #[tokio::test]
    async fn test_init_writes_default_config_once() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::with_config(Config::default());

        let path = engine.init(Some(temp.path().to_path_buf())).await.unwrap();
        temp.child("seqtrace.toml").assert(predicate::str::contains("[trace]"));

        std::fs::write(&path, "[trace]\ndepth = 2\n").unwrap();
        engine.init(Some(temp.path().to_path_buf())).await.unwrap();
        temp.child("seqtrace.toml").assert("[trace]\ndepth = 2\n");
    }

    #[test]
    fn test_model_for_single_file() {
        let temp = project();
        let engine = engine(&temp);
        let model = engine
            .model_for_file(&temp.path().join("src/shop/OrderService.java"))
            .unwrap();
        assert_eq!(model.primary_type, "shop.OrderService");
        assert_eq!(model.method_groups[0].fragments.len(), 1);

        assert!(engine.model_for_file(&temp.path().join("src/shop/Missing.java")).is_err());

        temp.child("notes.txt").write_str("class A {}").unwrap();
        let error = engine.model_for_file(&temp.path().join("notes.txt")).unwrap_err();
        assert!(matches!(error.downcast_ref::<SeqTraceError>(), Some(SeqTraceError::Parser(_))));
    }
}
