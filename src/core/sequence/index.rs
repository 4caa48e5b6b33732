// src/core/sequence/index.rs
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::model::FileModel;
use crate::error::{Result, SeqTraceError};

/// File name of the manifest written next to the models.
pub const INDEX_MANIFEST: &str = "index.json";

/// Resolves a type's FQN to the model of the file that declares it.
/// Implementations are read-only while a trace runs.
pub trait ModelIndex: Send + Sync {
    fn lookup(&self, type_fqn: &str) -> Option<Arc<FileModel>>;

    fn exists_type(&self, type_fqn: &str) -> bool;

    /// Every known FQN, sorted.
    fn all_type_fqns(&self) -> Vec<String>;
}

/// Types a model answers for: everything it declares, or its primary type
/// for models written before nested types were recorded.
fn indexed_types(model: &FileModel) -> Vec<String> {
    if model.declared_types.is_empty() && !model.primary_type.is_empty() {
        vec![model.primary_type.clone()]
    } else {
        model.declared_types.clone()
    }
}

/// Index over models already in memory.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    models: HashMap<String, Arc<FileModel>>,
}

impl MemoryIndex {
    pub fn new(models: impl IntoIterator<Item = FileModel>) -> Self {
        let mut index = Self::default();
        for model in models {
            index.insert(model);
        }
        index
    }

    /// Add a model; a type declared twice keeps the first model seen.
    pub fn insert(&mut self, model: FileModel) {
        let model = Arc::new(model);
        for fqn in indexed_types(&model) {
            self.models.entry(fqn).or_insert_with(|| Arc::clone(&model));
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl ModelIndex for MemoryIndex {
    fn lookup(&self, type_fqn: &str) -> Option<Arc<FileModel>> {
        self.models.get(type_fqn).cloned()
    }

    fn exists_type(&self, type_fqn: &str) -> bool {
        self.models.contains_key(type_fqn)
    }

    fn all_type_fqns(&self) -> Vec<String> {
        let mut fqns: Vec<String> = self.models.keys().cloned().collect();
        fqns.sort();
        fqns
    }
}

/// `index.json`: type FQN -> model file name relative to the model directory.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexManifest {
    version: u32,
    types: BTreeMap<String, String>,
}

const MANIFEST_VERSION: u32 = 1;

/// Index over a directory of model JSON files.
///
/// When `index.json` is newer than every model file it is trusted and only the
/// files it lists are read; otherwise the directory is scanned. Either way
/// every model is parsed at open, and any file that does not deserialise
/// fails the open.
pub struct DirectoryIndex {
    dir: PathBuf,
    entries: BTreeMap<String, PathBuf>,
    cache: DashMap<PathBuf, Arc<FileModel>>,
}

impl DirectoryIndex {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(SeqTraceError::FileSystem(format!(
                "Model directory {} does not exist",
                dir.display()
            )));
        }

        let model_files = model_files(dir)?;
        let manifest_path = dir.join(INDEX_MANIFEST);
        let index = Self {
            dir: dir.to_path_buf(),
            entries: BTreeMap::new(),
            cache: DashMap::new(),
        };

        if manifest_is_fresh(&manifest_path, &model_files) {
            match read_manifest(&manifest_path) {
                Ok(manifest) => {
                    let entries = manifest
                        .types
                        .into_iter()
                        .map(|(fqn, file)| (fqn, dir.join(file)))
                        .collect();
                    debug!("Using index manifest {}", manifest_path.display());
                    return Self { entries, ..index }.load_listed();
                }
                Err(e) => warn!("Ignoring unreadable manifest {}: {}", manifest_path.display(), e),
            }
        }

        index.scan(model_files)
    }

    /// Parse every model the manifest points at. A listed file that is gone
    /// stays a miss; one that does not deserialise fails the open.
    fn load_listed(self) -> Result<Self> {
        let paths: BTreeSet<&PathBuf> = self.entries.values().collect();
        paths.into_par_iter().try_for_each(|path| {
            if !path.is_file() {
                warn!("Model {} listed in the manifest is missing", path.display());
                return Ok(());
            }
            let model = load_model(path)?;
            self.cache.insert(path.clone(), Arc::new(model));
            Ok::<(), SeqTraceError>(())
        })?;
        info!("📚 Loaded {} models from {}", self.cache.len(), self.dir.display());
        Ok(self)
    }

    fn scan(mut self, model_files: Vec<PathBuf>) -> Result<Self> {
        for path in model_files {
            let model = load_model(&path)?;
            for fqn in indexed_types(&model) {
                self.entries.entry(fqn).or_insert_with(|| path.clone());
            }
            self.cache.insert(path, Arc::new(model));
        }
        info!("📚 Indexed {} types from {}", self.entries.len(), self.dir.display());
        Ok(self)
    }

    /// Write one `<primaryType>.json` per model plus the manifest.
    /// Returns the number of model files written.
    pub fn write<P: AsRef<Path>>(dir: P, models: &[FileModel]) -> Result<usize> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut manifest = IndexManifest {
            version: MANIFEST_VERSION,
            types: BTreeMap::new(),
        };
        let mut written = 0;
        for model in models {
            if model.primary_type.is_empty() {
                debug!("Skipping model without a type: {:?}", model.source_path);
                continue;
            }
            let file_name = format!("{}.json", model.primary_type);
            std::fs::write(dir.join(&file_name), serde_json::to_string_pretty(model)?)?;
            for fqn in indexed_types(model) {
                manifest.types.entry(fqn).or_insert_with(|| file_name.clone());
            }
            written += 1;
        }

        // Written last so it is at least as new as every model.
        std::fs::write(dir.join(INDEX_MANIFEST), serde_json::to_string_pretty(&manifest)?)?;
        Ok(written)
    }
}

impl ModelIndex for DirectoryIndex {
    fn lookup(&self, type_fqn: &str) -> Option<Arc<FileModel>> {
        let path = self.entries.get(type_fqn)?;
        self.cache.get(path).map(|model| Arc::clone(model.value()))
    }

    fn exists_type(&self, type_fqn: &str) -> bool {
        self.entries.contains_key(type_fqn)
    }

    fn all_type_fqns(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

fn model_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| SeqTraceError::FileSystem(e.to_string()))?;
        let path = entry.path();
        let is_model = entry.file_type().is_file()
            && path.extension().and_then(|e| e.to_str()) == Some("json")
            && path.file_name().and_then(|n| n.to_str()) != Some(INDEX_MANIFEST);
        if is_model {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn manifest_is_fresh(manifest: &Path, model_files: &[PathBuf]) -> bool {
    let Some(manifest_time) = modified(manifest) else {
        return false;
    };
    model_files
        .iter()
        .all(|file| modified(file).map(|t| t <= manifest_time).unwrap_or(false))
}

fn read_manifest(path: &Path) -> Result<IndexManifest> {
    let manifest: IndexManifest = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    if manifest.version != MANIFEST_VERSION {
        return Err(SeqTraceError::Config(format!(
            "Unsupported manifest version {}",
            manifest.version
        )));
    }
    Ok(manifest)
}

fn load_model(path: &Path) -> Result<FileModel> {
    let content = std::fs::read_to_string(path)?;
    FileModel::from_json(&content).map_err(|e| SeqTraceError::MalformedModel {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::MethodGroup;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use predicates::prelude::*;

    fn model(primary: &str, nested: &[&str]) -> FileModel {
        let mut model = FileModel {
            primary_type: primary.to_string(),
            ..Default::default()
        };
        model.declared_types.push(primary.to_string());
        model.declared_types.extend(nested.iter().map(|n| n.to_string()));
        model.method_groups.push(MethodGroup::new("run", primary, 3));
        model
    }

    #[test]
    fn test_memory_index_answers_for_nested_types() {
        let index = MemoryIndex::new(vec![model("a.Outer", &["a.Outer.Inner"]), model("b.Other", &[])]);
        assert!(index.exists_type("a.Outer.Inner"));
        assert_eq!(index.lookup("a.Outer.Inner").unwrap().primary_type, "a.Outer");
        assert!(index.lookup("c.Missing").is_none());
        assert_eq!(index.all_type_fqns(), vec!["a.Outer", "a.Outer.Inner", "b.Other"]);
    }

    #[test]
    fn test_write_then_open_uses_the_manifest() {
        let temp = TempDir::new().unwrap();
        let written = DirectoryIndex::write(temp.path(), &[model("a.Outer", &["a.Outer.Inner"]), model("b.Other", &[])])
            .unwrap();
        assert_eq!(written, 2);
        temp.child("a.Outer.json").assert(predicate::path::exists());
        temp.child(INDEX_MANIFEST)
            .assert(predicate::str::contains("\"a.Outer.Inner\": \"a.Outer.json\""));

        let index = DirectoryIndex::open(temp.path()).unwrap();
        assert_eq!(index.all_type_fqns(), vec!["a.Outer", "a.Outer.Inner", "b.Other"]);
        // One model per file, shared by the types it declares.
        assert_eq!(index.cache.len(), 2);
        let outer = index.lookup("a.Outer.Inner").unwrap();
        assert_eq!(outer.method_groups[0].name, "run");
        assert!(Arc::ptr_eq(&outer, &index.lookup("a.Outer").unwrap()));
    }

    #[test]
    fn test_missing_model_behind_manifest_is_a_miss() {
        let temp = TempDir::new().unwrap();
        DirectoryIndex::write(temp.path(), &[model("a.A", &[]), model("b.B", &[])]).unwrap();
        std::fs::remove_file(temp.path().join("b.B.json")).unwrap();

        let index = DirectoryIndex::open(temp.path()).unwrap();
        assert!(index.exists_type("b.B"));
        assert!(index.lookup("b.B").is_none());
        assert!(index.lookup("a.A").is_some());
    }

    #[test]
    fn test_scan_without_manifest() {
        let temp = TempDir::new().unwrap();
        let json = serde_json::to_string(&model("a.A", &[])).unwrap();
        temp.child("nested/a.A.json").write_str(&json).unwrap();
        temp.child("notes.txt").write_str("ignored").unwrap();

        let index = DirectoryIndex::open(temp.path()).unwrap();
        assert_eq!(index.all_type_fqns(), vec!["a.A"]);
        assert!(index.lookup("a.A").is_some());
    }

    #[test]
    fn test_malformed_model_fails_the_open() {
        let temp = TempDir::new().unwrap();
        temp.child("broken.json").write_str("{\"package\": 7").unwrap();

        match DirectoryIndex::open(temp.path()) {
            Err(SeqTraceError::MalformedModel { path, .. }) => assert!(path.ends_with("broken.json")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("malformed model was accepted"),
        }
    }

    #[test]
    fn test_malformed_model_behind_fresh_manifest_fails_the_open() {
        let temp = TempDir::new().unwrap();
        DirectoryIndex::write(temp.path(), &[model("a.A", &[]), model("b.B", &[])]).unwrap();
        temp.child("a.A.json").write_str("{\"package\": 7").unwrap();
        // Rewrite the manifest so it is newer than the corrupted model.
        let manifest = std::fs::read_to_string(temp.path().join(INDEX_MANIFEST)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        temp.child(INDEX_MANIFEST).write_str(&manifest).unwrap();
        assert!(manifest_is_fresh(&temp.path().join(INDEX_MANIFEST), &model_files(temp.path()).unwrap()));

        match DirectoryIndex::open(temp.path()) {
            Err(SeqTraceError::MalformedModel { path, .. }) => assert!(path.ends_with("a.A.json")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("malformed model was accepted"),
        }
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(matches!(
            DirectoryIndex::open("/nonexistent/seqtrace-models"),
            Err(SeqTraceError::FileSystem(_))
        ));
    }
}
