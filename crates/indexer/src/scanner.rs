use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};

const MAX_FILE_SIZE_BYTES: u64 = 1_048_576; // 1 MB

/// Directory names never descended into
const IGNORED_SCOPES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    ".venv",
    "venv",
    "node_modules",
    ".eggs",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".codeweave",
];

/// Glob patterns ignored on top of the scopes above
const DEFAULT_IGNORE_GLOBS: &[&str] = &["**/*.pyc", "**/*.egg-info", "**/*.egg-info/**"];

/// Scanner for finding parseable files in a project
pub struct FileScanner {
    root: PathBuf,
    extensions: Vec<String>,
    ignore: GlobSet,
}

impl FileScanner {
    /// Scanner accepting files whose lower-cased extension is in `extensions`
    pub fn new(root: impl AsRef<Path>, extensions: &[&str]) -> Result<Self> {
        Self::with_ignores(root, extensions, &[])
    }

    /// Scanner with extra glob ignores, matched against root-relative paths
    pub fn with_ignores(
        root: impl AsRef<Path>,
        extensions: &[&str],
        extra_ignores: &[String],
    ) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_IGNORE_GLOBS {
            builder.add(Glob::new(pattern)?);
        }
        for pattern in extra_ignores {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            root: root.as_ref().to_path_buf(),
            extensions: extensions.iter().map(|ext| ext.to_lowercase()).collect(),
            ignore: builder.build()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parseable files under the root in walk order (.gitignore aware)
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .sort_by_file_name(|a, b| a.cmp(b));
        builder.filter_entry(move |entry| !is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if !self.accepts(path) {
                        continue;
                    }

                    if let Ok(meta) = entry.metadata() {
                        if meta.len() > MAX_FILE_SIZE_BYTES {
                            log::debug!(
                                "Skipping large file {} ({} bytes > {})",
                                path.display(),
                                meta.len(),
                                MAX_FILE_SIZE_BYTES
                            );
                            continue;
                        }
                    }

                    files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        log::info!("Found {} source files", files.len());
        files
    }

    /// Extension, ignored-scope and glob checks without touching the disk
    pub fn accepts(&self, path: &Path) -> bool {
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|c| c.eq_ignore_ascii_case(ext)));
        if !supported || is_ignored_scope(path, &self.root) {
            return false;
        }

        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        !self.ignore.is_match(relative)
    }
}

pub(crate) fn is_ignored_scope(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative.components().any(|component| match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            IGNORED_SCOPES.iter().any(|ignored| name.eq_ignore_ascii_case(ignored))
                || name.to_lowercase().ends_with(".egg-info")
        }
        _ => false,
    })
}
