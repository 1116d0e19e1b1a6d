//! Search-path resolution for externally referenced bitmap files.

use std::path::{Path, PathBuf};

/// Maps relative file names recorded in a scene file onto real files.
///
/// Resolution order: absolute paths pass through, then the temp folder, then
/// every added search path in registration order.
pub struct PathManager {
    temp_folder: PathBuf,
    search_paths: Vec<PathBuf>,
}

impl PathManager {
    pub fn new() -> Self {
        PathManager {
            temp_folder: std::env::temp_dir(),
            search_paths: Vec::new(),
        }
    }

    pub fn set_temp_folder(&mut self, folder: impl AsRef<Path>) -> bool {
        let folder = folder.as_ref();
        if folder.is_dir() {
            self.temp_folder = folder.to_path_buf();
            true
        } else {
            false
        }
    }

    pub fn temp_folder(&self) -> &Path {
        &self.temp_folder
    }

    pub fn add_search_path(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if path.is_dir() {
            self.search_paths.push(path.to_path_buf());
            true
        } else {
            false
        }
    }

    pub fn clear_search_paths(&mut self) {
        self.search_paths.clear();
    }

    /// Resolve `file_name` in place. Returns false when no candidate exists.
    pub fn resolve_file_name(&self, file_name: &mut String) -> bool {
        let path = PathBuf::from(&*file_name);
        if path.is_absolute() {
            return true;
        }

        let in_temp = self.temp_folder.join(&path);
        if in_temp.is_file() {
            *file_name = in_temp.to_string_lossy().into_owned();
            return true;
        }

        for search in &self.search_paths {
            let candidate = search.join(&path);
            if candidate.is_file() {
                *file_name = candidate.to_string_lossy().into_owned();
                return true;
            }
        }

        false
    }

    /// Strip `path` down to its final component.
    pub fn file_name(path: &str) -> String {
        Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Extension of `path` without the leading dot, lowercased.
    pub fn extension(path: &str) -> String {
        Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

impl Default for PathManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_without_dot() {
        assert_eq!(PathManager::extension("Textures/Wall.BMP"), "bmp");
        assert_eq!(PathManager::extension("no_extension"), "");
    }

    #[test]
    fn unresolvable_name_reports_failure() {
        let manager = PathManager::new();
        let mut name = String::from("definitely/not/a/real/file.png");
        assert!(!manager.resolve_file_name(&mut name));
        assert_eq!(name, "definitely/not/a/real/file.png");
    }
}
