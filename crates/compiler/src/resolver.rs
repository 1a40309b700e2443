//! Module resolution for `import` statements.
//!
//! Given a module name (dot- or slash-separated, extension stripped), the
//! project resolver tries each import root in order: `<root>/<name>.ss`
//! first, then `<root>/<name>/index.ss`. Both path resolution and source
//! text are cached, so compiling the same module twice reads the file
//! once.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The compiler's view of module loading: a name in, a resolved path and
/// its source text out.
pub trait ModuleResolver {
    fn resolve_and_load(&mut self, module: &str) -> Result<(PathBuf, String), String>;
}

pub struct ProjectResolver {
    roots: Vec<PathBuf>,
    resolve_cache: HashMap<String, PathBuf>,
    source_cache: HashMap<PathBuf, String>,
}

impl ProjectResolver {
    pub fn new(roots: Vec<PathBuf>) -> ProjectResolver {
        ProjectResolver {
            roots,
            resolve_cache: HashMap::new(),
            source_cache: HashMap::new(),
        }
    }

    fn read_text(path: &Path) -> Result<String, String> {
        fs::read_to_string(path).map_err(|e| format!("cannot open file {}: {e}", path.display()))
    }

    fn load_cached(&mut self, path: PathBuf) -> Result<(PathBuf, String), String> {
        if let Some(source) = self.source_cache.get(&path) {
            return Ok((path, source.clone()));
        }
        let source = Self::read_text(&path)?;
        self.source_cache.insert(path.clone(), source.clone());
        Ok((path, source))
    }
}

impl ModuleResolver for ProjectResolver {
    fn resolve_and_load(&mut self, module: &str) -> Result<(PathBuf, String), String> {
        if let Some(path) = self.resolve_cache.get(module).cloned() {
            return self.load_cached(path);
        }

        let relative: PathBuf = module.split('.').collect();
        for root in &self.roots {
            let direct = root.join(&relative).with_extension("ss");
            if direct.exists() {
                self.resolve_cache.insert(module.to_string(), direct.clone());
                return self.load_cached(direct);
            }
            let index = root.join(&relative).join("index.ss");
            if index.exists() {
                self.resolve_cache.insert(module.to_string(), index.clone());
                return self.load_cached(index);
            }
        }

        Err(format!("module not found in ImportRoots: `{module}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_direct_file_then_index_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("math.ss"), "let tau = 6.28318").unwrap();
        fs::create_dir(dir.path().join("util")).unwrap();
        fs::write(dir.path().join("util/index.ss"), "let zero = 0").unwrap();

        let mut resolver = ProjectResolver::new(vec![dir.path().to_path_buf()]);
        let (path, source) = resolver.resolve_and_load("math").unwrap();
        assert!(path.ends_with("math.ss"));
        assert!(source.contains("tau"));

        let (path, source) = resolver.resolve_and_load("util").unwrap();
        assert!(path.ends_with("index.ss"));
        assert!(source.contains("zero"));
    }

    #[test]
    fn dotted_names_map_to_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/inner.ss"), "let v = 1").unwrap();

        let mut resolver = ProjectResolver::new(vec![dir.path().to_path_buf()]);
        let (path, _) = resolver.resolve_and_load("pkg.inner").unwrap();
        assert!(path.ends_with("pkg/inner.ss") || path.ends_with("pkg\\inner.ss"));
    }

    #[test]
    fn missing_module_reports_import_roots() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = ProjectResolver::new(vec![dir.path().to_path_buf()]);
        let err = resolver.resolve_and_load("nope").unwrap_err();
        assert!(err.contains("module not found in ImportRoots"));
        assert!(err.contains("nope"));
    }

    #[test]
    fn resolution_and_text_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("once.ss");
        fs::write(&file, "let a = 1").unwrap();

        let mut resolver = ProjectResolver::new(vec![dir.path().to_path_buf()]);
        resolver.resolve_and_load("once").unwrap();
        // deleting the file does not invalidate the cache
        fs::remove_file(&file).unwrap();
        let (_, source) = resolver.resolve_and_load("once").unwrap();
        assert_eq!(source, "let a = 1");
    }
}
