use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::ParsingConfig;
use crate::error::{Result, SeqTraceError};
use super::extractor::extract;
use super::languages::{JavaFrontEnd, LanguageFrontEnd, TypeCatalog};
use super::model::FileModel;

/// A source file read from disk
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// File path as discovered
    pub path: PathBuf,

    /// Content hash for change detection
    pub content_hash: String,

    /// Raw source content
    pub content: String,
}

/// Finds and reads the source files of a project
pub struct SourceCollector {
    config: ParsingConfig,
    ignore_patterns: Vec<String>,
}

impl SourceCollector {
    pub fn new(config: &ParsingConfig, ignore_patterns: &[String]) -> Self {
        Self {
            config: config.clone(),
            ignore_patterns: ignore_patterns.to_vec(),
        }
    }

    /// Read every matching file under `dir`. Unreadable or oversize files
    /// are skipped with a warning.
    pub fn collect_directory<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<SourceFile>> {
        let dir = dir.as_ref();
        let mut overrides = OverrideBuilder::new(dir);
        for pattern in &self.ignore_patterns {
            overrides
                .add(&format!("!{}", pattern))
                .map_err(|e| SeqTraceError::FileSystem(e.to_string()))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| SeqTraceError::FileSystem(e.to_string()))?;

        // Use ignore crate to respect .gitignore and custom patterns
        let walker = WalkBuilder::new(dir)
            .hidden(false)
            .git_ignore(true)
            .overrides(overrides)
            .build();

        let mut sources = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| SeqTraceError::FileSystem(e.to_string()))?;
            let path = entry.path();

            if path.is_file() && self.should_parse_file(path) {
                match self.read_file(path) {
                    Ok(source) => sources.push(source),
                    Err(e) => warn!("Skipping {}: {}", path.display(), e),
                }
            }
        }

        // Walk order depends on the file system.
        sources.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("Collected {} source files under {}", sources.len(), dir.display());
        Ok(sources)
    }

    /// Read a single source file
    pub fn read_file<P: AsRef<Path>>(&self, file_path: P) -> Result<SourceFile> {
        let path = file_path.as_ref();

        // Check file size before reading it
        let metadata = std::fs::metadata(path)?;
        if metadata.len() as usize > self.config.max_file_size {
            return Err(SeqTraceError::Parser(format!(
                "File {} exceeds maximum size limit",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let content_hash = calculate_hash(&content);

        Ok(SourceFile {
            path: path.to_path_buf(),
            content_hash,
            content,
        })
    }

    /// Determine if a file should be parsed based on configuration
    fn should_parse_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.config.file_extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

/// Catalog every source, then lower and extract each file in parallel.
/// Each rayon worker owns its own front end.
pub fn extract_sources(sources: &[SourceFile]) -> Vec<(PathBuf, Result<FileModel>)> {
    let pairs: Vec<(PathBuf, String)> = sources
        .iter()
        .map(|s| (s.path.clone(), s.content.clone()))
        .collect();
    let catalog = TypeCatalog::build(&pairs);

    sources
        .par_iter()
        .map_init(JavaFrontEnd::new, |front_end, source| {
            let model = match front_end {
                Ok(front_end) => extract_source(front_end, source, &catalog),
                Err(e) => Err(SeqTraceError::Parser(e.to_string())),
            };
            (source.path.clone(), model)
        })
        .collect()
}

/// Lower and extract one source against an existing catalog.
pub fn extract_source(
    front_end: &mut dyn LanguageFrontEnd,
    source: &SourceFile,
    catalog: &TypeCatalog,
) -> Result<FileModel> {
    let tree = front_end.lower(&source.content, catalog)?;
    let mut model = extract(&tree);
    model.source_path = Some(source.path.display().to_string());
    model.content_hash = Some(source.content_hash.clone());
    Ok(model)
}

/// Calculate SHA256 hash of content
pub fn calculate_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    fn collector(max_file_size: usize) -> SourceCollector {
        let config = ParsingConfig {
            file_extensions: vec!["java".to_string()],
            max_file_size,
        };
        SourceCollector::new(&config, &["generated/".to_string()])
    }

    #[test]
    fn test_collects_only_matching_files() {
        let temp = TempDir::new().unwrap();
        temp.child("src/a/A.java").write_str("package a; class A {}").unwrap();
        temp.child("src/a/notes.txt").write_str("not java").unwrap();
        temp.child("generated/G.java").write_str("class G {}").unwrap();

        let sources = collector(1024).collect_directory(temp.path()).unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].path.ends_with("src/a/A.java"));
        assert_eq!(sources[0].content_hash, calculate_hash("package a; class A {}"));
    }

    #[test]
    fn test_oversize_file_is_an_error_for_single_reads() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("Big.java");
        file.write_str(&"x".repeat(64)).unwrap();

        assert!(collector(16).read_file(file.path()).is_err());
        // ... and skipped during directory collection.
        assert!(collector(16).collect_directory(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_extract_sources_binds_across_files() {
        let temp = TempDir::new().unwrap();
        temp.child("a/Service.java")
            .write_str("package a; public class Service { private Repo repo; void run() { repo.load(); } }")
            .unwrap();
        temp.child("a/Repo.java")
            .write_str("package a; public class Repo { public String load() { return null; } }")
            .unwrap();

        let sources = collector(4096).collect_directory(temp.path()).unwrap();
        let models: Vec<FileModel> = extract_sources(&sources)
            .into_iter()
            .map(|(_, model)| model.unwrap())
            .collect();

        let service = models.iter().find(|m| m.primary_type == "a.Service").unwrap();
        let run = &service.method_groups[0];
        assert_eq!(run.interactions[0].callee, "a.Repo");
        assert_eq!(run.interactions[0].return_type.as_deref(), Some("java.lang.String"));
        assert!(service.content_hash.is_some());
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(calculate_hash("abc"), calculate_hash("abc"));
        assert_ne!(calculate_hash("abc"), calculate_hash("abd"));
    }
}
