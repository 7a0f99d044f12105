use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User intent driving context prioritization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Explain,
    Debug,
    Extend,
    Review,
    Locate,
    #[default]
    General,
}

/// Optional part of a context bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSection {
    Docstring,
    Signature,
    Source,
    Parent,
    Callers,
    Callees,
    Children,
}

use self::ContextSection::{Callees, Callers, Children, Docstring, Parent, Signature, Source};

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        Self::Explain,
        Self::Debug,
        Self::Extend,
        Self::Review,
        Self::Locate,
        Self::General,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explain => "explain",
            Self::Debug => "debug",
            Self::Extend => "extend",
            Self::Review => "review",
            Self::Locate => "locate",
            Self::General => "general",
        }
    }

    /// Sections in priority order (high to low) with their budget boost
    pub const fn profile(self) -> &'static [(ContextSection, f64)] {
        match self {
            Self::Debug => &[(Source, 2.0), (Callers, 1.5), (Callees, 1.0), (Signature, 1.0), (Docstring, 1.0)],
            Self::Extend => &[(Signature, 1.5), (Docstring, 1.0), (Children, 1.3), (Parent, 1.0), (Source, 1.0)],
            Self::Review => &[(Source, 1.0), (Callers, 1.5), (Callees, 1.5), (Signature, 1.0)],
            Self::Explain => &[(Docstring, 1.5), (Signature, 1.0), (Source, 1.0), (Callees, 1.3), (Parent, 1.0)],
            Self::Locate => &[(Signature, 1.0), (Docstring, 1.0), (Parent, 1.0)],
            Self::General => &[
                (Docstring, 1.0),
                (Signature, 1.0),
                (Source, 1.0),
                (Parent, 1.0),
                (Callers, 1.0),
                (Callees, 1.0),
            ],
        }
    }

    /// Instruction text for the model that answers with this context
    pub const fn system_prompt(self) -> &'static str {
        match self {
            Self::Explain => concat!(
                "You are an expert software engineering assistant explaining code behavior. ",
                "Provide a clear, step-by-step explanation of how the code works. ",
                "Include relevant code snippets with file paths and line numbers. ",
                "Use numbered steps for sequential processes. ",
                "Focus on the 'how' and connect components together."
            ),
            Self::Debug => concat!(
                "You are an expert software engineer debugging an issue. ",
                "Focus on: error paths, exception handlers, edge cases, and state mutations. ",
                "Identify potential root causes based on the code structure. ",
                "Suggest concrete debugging steps or fixes. ",
                "Reference specific lines where issues might occur."
            ),
            Self::Extend => concat!(
                "You are an expert software engineer helping to extend codebase functionality. ",
                "Focus on: existing patterns, architectural constraints, related code, and test requirements. ",
                "Identify the best location for new code. ",
                "Show relevant existing patterns to follow. ",
                "Warn about any deprecated patterns to avoid."
            ),
            Self::Review => concat!(
                "You are an expert code reviewer analyzing code changes. ",
                "Focus on: what changed, test coverage, potential impact, and security concerns. ",
                "Identify any breaking changes or regressions. ",
                "Note areas that may need additional testing. ",
                "Be concise but thorough."
            ),
            Self::Locate => concat!(
                "You are an expert at navigating codebases. ",
                "Provide precise locations: file paths, line numbers, and qualified names. ",
                "List all relevant occurrences. ",
                "Group by type (definition, usage, test). ",
                "Be direct and factual."
            ),
            Self::General => concat!(
                "You are an expert software engineering assistant. ",
                "You have access to context from the user's codebase. ",
                "Analyze the context and answer the user's question based on your interpretation. ",
                "Include code snippets where helpful."
            ),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|task| task.as_str() == wanted)
            .ok_or_else(|| ContextError::UnknownTask(s.to_string()))
    }
}
