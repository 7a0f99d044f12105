//! Built-in [`SourceParser`](crate::SourceParser) implementations

mod markdown;
mod python;
mod yaml;

pub use markdown::MarkdownParser;
pub use python::PythonParser;
pub use yaml::YamlParser;

use std::path::Path;

/// File stem used as the module/document name
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
