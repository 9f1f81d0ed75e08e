//! `require`, `require_relative`, `load` and native extensions.

use std::path::Path;

use crate::{
    exception::{ExcType, RunError, RunResult},
    intern::StaticSymbols,
    loader::LoadFailure,
    value::Value,
    vm::Vm,
};

impl Vm {
    /// `require feature`: runs the file once and returns whether it ran now.
    ///
    /// A feature with no file behind it may be a registered native extension, initialized on
    /// its first require.
    pub(crate) fn require_feature(&mut self, feature: &str) -> RunResult<bool> {
        let load_path = self.load_path();
        let Some(resolved) = self.loader.resolve(feature, &load_path) else {
            return self.require_extension(feature);
        };
        if self.loading.contains(&resolved) || self.feature_loaded(&resolved) {
            return Ok(false);
        }
        self.loading.insert(resolved.clone());
        let result = self.run_file(&resolved);
        self.loading.remove(&resolved);
        result?;
        let entry = self.new_string(&resolved)?;
        let features = self.global_get(StaticSymbols::LoadedFeatures.into());
        self.array_mut(features)?.push(entry);
        Ok(true)
    }

    /// `require_relative`: `feature` is taken relative to the file of the calling code.
    pub(crate) fn require_relative(&mut self, feature: &str) -> RunResult<bool> {
        let base = self
            .frames
            .last()
            .map(|frame| frame.iseq.path.clone())
            .unwrap_or_default();
        let dir = Path::new(&base).parent().map(Path::to_path_buf).unwrap_or_default();
        let joined = dir.join(feature).to_string_lossy().into_owned();
        let explicit = Path::new(&joined).is_absolute() || joined.starts_with("./") || joined.starts_with("../");
        let joined = if explicit { joined } else { format!("./{joined}") };
        self.require_feature(&joined)
    }

    /// `load path`: runs the file every time.
    pub(crate) fn load_file(&mut self, path: &str) -> RunResult<bool> {
        let load_path = self.load_path();
        let Some(resolved) = self.loader.resolve(path, &load_path) else {
            return Err(RunError::load_error(path));
        };
        self.run_file(&resolved)?;
        Ok(true)
    }

    fn require_extension(&mut self, feature: &str) -> RunResult<bool> {
        let Some(slot) = self.extensions.get_mut(feature) else {
            return Err(RunError::load_error(feature));
        };
        let Some(init) = slot.take() else {
            return Ok(false);
        };
        init(self)?;
        let entry = self.new_string(feature)?;
        let features = self.global_get(StaticSymbols::LoadedFeatures.into());
        self.array_mut(features)?.push(entry);
        Ok(true)
    }

    fn run_file(&mut self, resolved: &str) -> RunResult<Value> {
        let artifact = self.loader.load(resolved).map_err(|failure| match failure {
            LoadFailure::NotFound(path) => RunError::load_error(&path),
            LoadFailure::Compile { path, message } => {
                ExcType::ScriptError.error(format!("{path}: {message}"))
            }
            other => ExcType::LoadError.error(other.to_string()),
        })?;
        let iseq = self.link(&artifact)?;
        self.run_top(&iseq)
    }

    /// Current contents of `$:` as strings.
    fn load_path(&self) -> Vec<String> {
        let paths = self.global_get(StaticSymbols::LoadPath.into());
        self.array_of(paths)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|&item| self.string_of(item).map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn feature_loaded(&self, resolved: &str) -> bool {
        let features = self.global_get(StaticSymbols::LoadedFeatures.into());
        self.array_of(features)
            .is_some_and(|items| items.iter().any(|&item| self.string_of(item) == Some(resolved)))
    }
}
