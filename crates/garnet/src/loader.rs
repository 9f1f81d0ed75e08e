//! Resolving and reading the files behind `require` and `load`.
//!
//! The VM never touches the file system itself: it asks its [`Loader`] to resolve a feature
//! name against `$:` and to produce an [`InstructionSequence`] for the resolved path. Source
//! files need a [`Compiler`], which the host supplies; precompiled `.iseq` artifacts (postcard
//! blobs written by [`InstructionSequence::to_bytes`]) load without one.

use std::{fmt, fs, path::Path};

use ahash::AHashMap;

use crate::iseq::InstructionSequence;

/// Why a resolved feature could not be turned into an instruction sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    NotFound(String),
    Io { path: String, message: String },
    Decode { path: String, message: String },
    Compile { path: String, message: String },
    /// A source file was found but no compiler is configured.
    NoCompiler(String),
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "cannot load such file -- {path}"),
            Self::Io { path, message } => write!(f, "{path}: {message}"),
            Self::Decode { path, message } => write!(f, "{path}: invalid instruction sequence ({message})"),
            Self::Compile { path, message } => write!(f, "{path}: {message}"),
            Self::NoCompiler(path) => write!(f, "{path}: no compiler available for source files"),
        }
    }
}

impl std::error::Error for LoadFailure {}

/// Turns source text into an instruction sequence.
pub trait Compiler: fmt::Debug {
    fn compile(&mut self, source: &str, path: &str) -> Result<InstructionSequence, String>;
}

/// Source of the code behind `require`, `require_relative` and `load`.
pub trait Loader: fmt::Debug {
    /// The canonical path `feature` refers to.
    ///
    /// Explicit paths (absolute, or starting with `./` or `../`) are taken as they are; other
    /// names are searched for in each directory of `load_path`.
    fn resolve(&self, feature: &str, load_path: &[String]) -> Option<String>;

    /// Reads (and if needed compiles) a path returned by [`Loader::resolve`].
    fn load(&mut self, resolved: &str) -> Result<InstructionSequence, LoadFailure>;
}

/// Loads `.rb` sources (through a [`Compiler`]) and `.iseq` artifacts from disk.
#[derive(Debug, Default)]
pub struct FsLoader {
    compiler: Option<Box<dyn Compiler>>,
}

impl FsLoader {
    /// A loader for precompiled artifacts only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_compiler(compiler: impl Compiler + 'static) -> Self {
        Self {
            compiler: Some(Box::new(compiler)),
        }
    }

    fn candidates(&self, feature: &str) -> Vec<String> {
        if has_extension(feature) {
            return vec![feature.to_owned()];
        }
        let mut names = Vec::with_capacity(2);
        if self.compiler.is_some() {
            names.push(format!("{feature}.rb"));
        }
        names.push(format!("{feature}.iseq"));
        names
    }
}

impl Loader for FsLoader {
    fn resolve(&self, feature: &str, load_path: &[String]) -> Option<String> {
        let candidates = self.candidates(feature);
        if Path::new(feature).is_absolute() || feature.starts_with("./") || feature.starts_with("../") {
            return candidates.into_iter().find(|c| Path::new(c).is_file());
        }
        load_path.iter().find_map(|dir| {
            candidates
                .iter()
                .map(|c| Path::new(dir).join(c))
                .find(|p| p.is_file())
                .map(|p| p.to_string_lossy().into_owned())
        })
    }

    fn load(&mut self, resolved: &str) -> Result<InstructionSequence, LoadFailure> {
        let io_failure = |err: std::io::Error| LoadFailure::Io {
            path: resolved.to_owned(),
            message: err.to_string(),
        };
        if resolved.ends_with(".iseq") {
            let bytes = fs::read(resolved).map_err(io_failure)?;
            return InstructionSequence::from_bytes(&bytes).map_err(|err| LoadFailure::Decode {
                path: resolved.to_owned(),
                message: err.to_string(),
            });
        }
        let Some(compiler) = self.compiler.as_mut() else {
            return Err(LoadFailure::NoCompiler(resolved.to_owned()));
        };
        let source = fs::read_to_string(resolved).map_err(io_failure)?;
        compiler.compile(&source, resolved).map_err(|message| LoadFailure::Compile {
            path: resolved.to_owned(),
            message,
        })
    }
}

/// Serves prebuilt instruction sequences from memory, keyed by path.
///
/// A feature resolves when its name (with or without `.rb`) or its join with an entry of
/// `$:` is a key.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    files: AHashMap<String, InstructionSequence>,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, iseq: InstructionSequence) {
        self.files.insert(path.into(), iseq);
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, iseq: InstructionSequence) -> Self {
        self.insert(path, iseq);
        self
    }

    fn lookup(&self, name: &str) -> Option<String> {
        let name = name.trim_start_matches("./");
        if self.files.contains_key(name) {
            return Some(name.to_owned());
        }
        let with_ext = format!("{name}.rb");
        self.files.contains_key(&with_ext).then_some(with_ext)
    }
}

impl Loader for MemoryLoader {
    fn resolve(&self, feature: &str, load_path: &[String]) -> Option<String> {
        self.lookup(feature).or_else(|| {
            load_path
                .iter()
                .find_map(|dir| self.lookup(&format!("{}/{feature}", dir.trim_end_matches('/'))))
        })
    }

    fn load(&mut self, resolved: &str) -> Result<InstructionSequence, LoadFailure> {
        self.files
            .get(resolved)
            .cloned()
            .ok_or_else(|| LoadFailure::NotFound(resolved.to_owned()))
    }
}

fn has_extension(feature: &str) -> bool {
    Path::new(feature)
        .extension()
        .is_some_and(|ext| ext == "rb" || ext == "iseq")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iseq::IseqBuilder;

    fn empty_unit(path: &str) -> InstructionSequence {
        let mut builder = IseqBuilder::top(path);
        builder.put_nil();
        builder.leave();
        builder.finish().unwrap()
    }

    #[test]
    fn memory_loader_resolves_through_load_path() {
        let loader = MemoryLoader::new().with_file("lib/util.rb", empty_unit("lib/util.rb"));
        let load_path = vec!["lib".to_owned()];
        assert_eq!(loader.resolve("util", &load_path).as_deref(), Some("lib/util.rb"));
        assert_eq!(loader.resolve("lib/util", &[]).as_deref(), Some("lib/util.rb"));
        assert_eq!(loader.resolve("missing", &load_path), None);
    }

    #[test]
    fn fs_loader_without_compiler_only_looks_for_artifacts() {
        let loader = FsLoader::new();
        assert_eq!(loader.candidates("a/b"), vec!["a/b.iseq".to_owned()]);
        assert_eq!(loader.candidates("a/b.rb"), vec!["a/b.rb".to_owned()]);
    }
}
