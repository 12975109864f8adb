//! Discovery of classifier models on disk.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info, warn};

use crate::{
    classifier::{Classifier, ClassifierLoader},
    error::LivenessError,
    lazy::LazyHandle,
    model_name::ModelSpec,
};

/// One registered classifier.
#[derive(Debug)]
pub struct RegisteredModel {
    spec: ModelSpec,
    handle: LazyHandle<dyn Classifier>,
}

impl RegisteredModel {
    /// The decoded model name.
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// The classifier handle, loaded on first use.
    pub fn handle(&self) -> &LazyHandle<dyn Classifier> {
        &self.handle
    }
}

/// The ordered set of classifiers the ensemble runs.
///
/// Models are kept in file-name order. Each classifier is loaded the first
/// time it is needed and reused by every later request.
#[derive(Debug)]
pub struct ModelRegistry {
    dir: PathBuf,
    entries: Vec<RegisteredModel>,
}

impl ModelRegistry {
    /// Scan `dir` for model files and register those with a valid name.
    ///
    /// Files with another extension are skipped quietly; model files whose
    /// stem does not follow the naming convention are skipped with a warning.
    /// Nothing is loaded until the first request needs it.
    pub fn discover<P: AsRef<Path>>(
        dir: P,
        loader: Arc<dyn ClassifierLoader>,
    ) -> Result<Self, LivenessError> {
        let dir = dir.as_ref().to_path_buf();
        let read_dir = fs::read_dir(&dir).map_err(|source| LivenessError::ModelDirectory {
            dir: dir.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| LivenessError::ModelDirectory {
                dir: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut entries = Vec::with_capacity(files.len());
        for path in files {
            let spec = match ModelSpec::from_file_name(&path) {
                Ok(Some(spec)) => spec,
                Ok(None) => {
                    debug!("skipping non-model file {}", path.display());
                    continue;
                }
                Err(err) => {
                    warn!("skipping {}: {err}", path.display());
                    continue;
                }
            };
            debug!(
                "registered {} ({}x{}, scale {:?})",
                spec.identifier, spec.height, spec.width, spec.scale
            );
            let handle = {
                let loader = Arc::clone(&loader);
                let spec = spec.clone();
                let path = path.clone();
                LazyHandle::new(spec.identifier.clone(), move || loader.load(&path, &spec))
            };
            entries.push(RegisteredModel { spec, handle });
        }

        info!(
            "found {} anti-spoofing model(s) in {}",
            entries.len(),
            dir.display()
        );
        Ok(Self { dir, entries })
    }

    /// A registry over already constructed classifiers, in the given order.
    pub fn from_entries<P: Into<PathBuf>>(
        dir: P,
        entries: Vec<(ModelSpec, Arc<dyn Classifier>)>,
    ) -> Self {
        let entries = entries
            .into_iter()
            .map(|(spec, classifier)| RegisteredModel {
                handle: LazyHandle::ready(spec.identifier.clone(), classifier),
                spec,
            })
            .collect();
        Self {
            dir: dir.into(),
            entries,
        }
    }

    /// Registered models in evaluation order.
    pub fn entries(&self) -> &[RegisteredModel] {
        &self.entries
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no model is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Directory the models were discovered in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationVector;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct Constant;

    impl Classifier for Constant {
        fn classify(&self, _patch: &RgbImage) -> anyhow::Result<ClassificationVector> {
            Ok(ClassificationVector::new([0.0, 1.0, 0.0]))
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl ClassifierLoader for CountingLoader {
        fn load(&self, _path: &Path, _spec: &ModelSpec) -> anyhow::Result<Arc<dyn Classifier>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Constant))
        }
    }

    #[test]
    fn discovers_sorted_valid_models_only() {
        let dir = tempdir().unwrap();
        for name in [
            "4_0_0_80x80_MiniFASNetV1SE.onnx",
            "2.7_80x80_MiniFASNetV2.onnx",
            "README.md",
            "weights.onnx",
            "1_80x80_MiniFASNetV2.pth",
        ] {
            fs::write(dir.path().join(name), b"stub").unwrap();
        }
        fs::create_dir(dir.path().join("1_80x80_MiniFASNetV2.onnx")).unwrap();

        let loader = Arc::new(CountingLoader::default());
        let registry = ModelRegistry::discover(dir.path(), loader.clone()).unwrap();

        let names: Vec<&str> = registry
            .entries()
            .iter()
            .map(|entry| entry.spec().identifier.as_str())
            .collect();
        assert_eq!(names, ["2.7_80x80_MiniFASNetV2", "4_0_0_80x80_MiniFASNetV1SE"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.dir(), dir.path());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handles_load_once() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("2.7_80x80_MiniFASNetV2.onnx"), b"stub").unwrap();
        let loader = Arc::new(CountingLoader::default());
        let registry = ModelRegistry::discover(dir.path(), loader.clone()).unwrap();

        let entry = &registry.entries()[0];
        for _ in 0..3 {
            entry.handle().get().unwrap();
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_directory_gives_empty_registry() {
        let dir = tempdir().unwrap();
        let registry = ModelRegistry::discover(dir.path(), Arc::new(CountingLoader::default())).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let err = ModelRegistry::discover(dir.path().join("absent"), Arc::new(CountingLoader::default()))
            .unwrap_err();
        assert!(matches!(err, LivenessError::ModelDirectory { .. }));
    }

    #[test]
    fn from_entries_preserves_order() {
        let registry = ModelRegistry::from_entries(
            "memory",
            vec![
                (
                    crate::model_name::parse_model_name("80x80_MiniFASNetV1").unwrap(),
                    Arc::new(Constant) as Arc<dyn Classifier>,
                ),
                (
                    crate::model_name::parse_model_name("2.7_80x80_MiniFASNetV2").unwrap(),
                    Arc::new(Constant) as Arc<dyn Classifier>,
                ),
            ],
        );
        assert_eq!(registry.entries()[0].spec().identifier, "80x80_MiniFASNetV1");
        assert!(registry.entries()[1].handle().is_loaded());
    }
}
