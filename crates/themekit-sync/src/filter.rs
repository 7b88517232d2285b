//! Path exclusion shared by the watcher and the initial full sync.
//!
//! Patterns use gitignore syntax and are matched against paths relative to
//! the theme root.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Always excluded: dotfiles and dot-directories, dependency trees, build
/// output, log files and the project's own `themekit.toml`.
pub const DEFAULT_IGNORES: &[&str] = &[
    ".*",
    "node_modules/",
    "dist/",
    "*.log",
    "/themekit.toml",
];

#[derive(Debug, Clone)]
pub struct WatchFilter {
    matcher: Gitignore,
    patterns: Vec<String>,
}

impl WatchFilter {
    /// Build a filter from the defaults plus `extra` patterns.
    ///
    /// # Errors
    ///
    /// Returns an error for a pattern that is not valid glob syntax.
    pub fn new<S: AsRef<str>>(extra: &[S]) -> Result<Self, ignore::Error> {
        // Matching is always done on root-relative paths.
        let mut builder = GitignoreBuilder::new(".");
        let mut patterns = Vec::new();

        for pattern in DEFAULT_IGNORES
            .iter()
            .copied()
            .chain(extra.iter().map(AsRef::as_ref))
        {
            let pattern = pattern.trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            builder.add_line(None, pattern)?;
            patterns.push(pattern.to_string());
        }

        Ok(Self {
            matcher: builder.build()?,
            patterns,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a root-relative path, or any directory above it, is excluded.
    pub fn is_ignored(&self, relative: impl AsRef<Path>, is_dir: bool) -> bool {
        let relative = relative.as_ref();
        if relative.as_os_str().is_empty() || relative.has_root() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }
}

impl Default for WatchFilter {
    fn default() -> Self {
        let no_extra: &[&str] = &[];
        // Defaults are static and known to parse.
        Self::new(no_extra).unwrap_or_else(|_| Self {
            matcher: Gitignore::empty(),
            patterns: Vec::new(),
        })
    }
}

/// Slash-separated path of `path` relative to `root`, or `None` when
/// `path` lies outside it.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Every non-ignored regular file under `root`, as sorted relative paths.
///
/// # Errors
///
/// Fails when the root or a directory inside it cannot be read.
pub fn collect_files(root: &Path, filter: &WatchFilter) -> io::Result<Vec<String>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_entry(root, filter, e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(relative) = relative_slash_path(root, entry.path()) {
            files.push(relative);
        }
    }

    files.sort();
    Ok(files)
}

/// Every non-ignored directory under `root`, including `root` itself.
pub fn collect_dirs(root: &Path, filter: &WatchFilter) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_entry(root, filter, e))
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }

    Ok(dirs)
}

fn is_ignored_entry(root: &Path, filter: &WatchFilter, entry: &walkdir::DirEntry) -> bool {
    match entry.path().strip_prefix(root) {
        Ok(relative) => filter.is_ignored(relative, entry.file_type().is_dir()),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_ignores() {
        let filter = WatchFilter::default();

        assert!(filter.is_ignored(".git", true));
        assert!(filter.is_ignored(".git/config", false));
        assert!(filter.is_ignored(".DS_Store", false));
        assert!(filter.is_ignored("assets/.hidden/file.css", false));
        assert!(filter.is_ignored("node_modules", true));
        assert!(filter.is_ignored("node_modules/pkg/index.js", false));
        assert!(filter.is_ignored("dist", true));
        assert!(filter.is_ignored("dist/theme.zip", false));
        assert!(filter.is_ignored("debug.log", false));
        assert!(filter.is_ignored("logs/sync.log", false));
        assert!(filter.is_ignored("themekit.toml", false));

        assert!(!filter.is_ignored("manifest.json", false));
        assert!(!filter.is_ignored("assets/logo.png", false));
        assert!(!filter.is_ignored("sections", true));
        assert!(!filter.is_ignored("snippets/themekit.toml", false));
    }

    #[test]
    fn extra_patterns_extend_defaults() {
        let filter = WatchFilter::new(&["*.psd", "drafts/"]).unwrap();

        assert!(filter.is_ignored("mockups/home.psd", false));
        assert!(filter.is_ignored("drafts/new.liquid", false));
        assert!(filter.is_ignored("node_modules/x.js", false));
        assert!(!filter.is_ignored("templates/index.liquid", false));
        assert!(filter.patterns().contains(&"drafts/".to_string()));
    }

    #[test]
    fn relative_slash_path_normalizes() {
        let root = Path::new("/themes/dawn");
        assert_eq!(
            relative_slash_path(root, Path::new("/themes/dawn/assets/logo.png")).as_deref(),
            Some("assets/logo.png")
        );
        assert_eq!(relative_slash_path(root, Path::new("/themes/dawn")), None);
        assert_eq!(relative_slash_path(root, Path::new("/other/file.css")), None);
    }

    #[test]
    fn collect_files_skips_ignored_trees() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("manifest.json"), "{}").unwrap();
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::write(root.join("assets/logo.png"), [0u8, 1, 2]).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        fs::write(root.join("sync.log"), "").unwrap();
        fs::write(root.join("themekit.toml"), "host = \"http://localhost\"").unwrap();

        let files = collect_files(root, &WatchFilter::default()).unwrap();
        assert_eq!(files, vec!["assets/logo.png", "manifest.json"]);

        let dirs = collect_dirs(root, &WatchFilter::default()).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs.contains(&root.join("assets")));
    }
}
