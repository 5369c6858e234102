//! Maps logical shader names to files under a list of search roots, so
//! programs and `#include` directives can name `lighting` or `lit.frag`
//! without knowing where a shader library lives on disk.
//!
//! Types:
//!
//! - `DirectoryLoader` stores the search roots and the implied file extension
//!   and implements `shaderprog::SourceLoader`.
//!
//! Functions:
//!
//! - `DirectoryLoader::resolve` returns the first existing candidate path,
//!   logging each candidate it considers.
use std::fs;
use std::io;
use std::path::{Component, PathBuf};

use shaderprog::SourceLoader;
use tracing::debug;

pub const DEFAULT_EXTENSION: &str = "glsl";

#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    roots: Vec<PathBuf>,
    extension: String,
}

impl DirectoryLoader {
    pub fn new(roots: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            roots,
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Adds a root searched after the existing ones.
    pub fn push_root(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    /// File name for `name`: the implied extension is appended unless the
    /// name already carries it.
    fn file_name(&self, name: &str) -> String {
        let suffix = format!(".{}", self.extension);
        if self.extension.is_empty() || name.ends_with(&suffix) {
            name.to_string()
        } else {
            format!("{name}{suffix}")
        }
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = PathBuf::from(self.file_name(name));
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            debug!(name, "rejecting shader name outside the search roots");
            return None;
        }

        debug!(requested = %name, roots = ?self.roots, "resolving shader source");
        self.roots.iter().map(|root| root.join(&relative)).find(|candidate| {
            debug!(candidate = %candidate.display(), "checking shader source candidate");
            candidate.is_file()
        })
    }

    /// Reports names that resolve to no file.
    pub fn missing<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        names
            .into_iter()
            .filter(|name| self.resolve(name).is_none())
            .map(str::to_string)
            .collect()
    }
}

impl SourceLoader for DirectoryLoader {
    fn load_source(&self, name: &str) -> io::Result<String> {
        let path = self.resolve(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "'{}' not found in any of {}",
                    self.file_name(name),
                    display_roots(&self.roots)
                ),
            )
        })?;
        fs::read_to_string(&path)
    }
}

fn display_roots(roots: &[PathBuf]) -> String {
    if roots.is_empty() {
        return "(no search roots)".to_string();
    }
    roots
        .iter()
        .map(|root| root.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(path, contents).expect("write shader");
    }

    #[test]
    fn first_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(second.path(), "common.glsl", "second");
        let loader = DirectoryLoader::new(
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            "glsl",
        );
        assert_eq!(loader.load_source("common").unwrap(), "second");

        write(first.path(), "common.glsl", "first");
        assert_eq!(loader.load_source("common").unwrap(), "first");
    }

    #[test]
    fn explicit_extension_is_not_doubled() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "lib/noise.glsl", "float noise;");
        let loader = DirectoryLoader::new(vec![root.path().to_path_buf()], ".glsl");
        assert_eq!(loader.extension(), "glsl");
        assert!(loader.resolve("lib/noise").is_some());
        assert!(loader.resolve("lib/noise.glsl").is_some());
    }

    #[test]
    fn missing_source_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let loader = DirectoryLoader::new(vec![root.path().to_path_buf()], "glsl");
        let err = loader.load_source("absent").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("absent.glsl"));
        assert_eq!(loader.missing(["absent"]), vec!["absent".to_string()]);
    }

    #[test]
    fn names_cannot_escape_roots() {
        let outer = tempfile::tempdir().unwrap();
        write(outer.path(), "secret.glsl", "nope");
        let inner = outer.path().join("shaders");
        fs::create_dir_all(&inner).unwrap();
        let loader = DirectoryLoader::new(vec![inner], "glsl");
        assert!(loader.resolve("../secret").is_none());
    }

    #[test]
    fn includes_resolve_through_directory() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "lighting.glsl", "vec3 light;\n");
        write(root.path(), "lit.frag.glsl", "#include lighting\nvoid main(){}\n");
        let loader = DirectoryLoader::new(vec![root.path().to_path_buf()], "glsl");
        let source = shaderprog::load_and_inflate(&loader, "lit.frag").unwrap();
        assert_eq!(source, "vec3 light;\nvoid main(){}\n");
    }
}
