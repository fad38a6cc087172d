/*!
# Error System for the Preprocessor

Typed error taxonomy shared by every layer. Configuration errors are raised
before any unit is touched, lookup errors are fatal to the rule that raised
them, export conflicts are collected per file and never abort a batch.
*/

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, PreprocessError>;

#[derive(Debug, Error)]
pub enum PreprocessError {
    // configuration
    #[error("File {} does not exist", .0.display())]
    MissingPath(PathBuf),

    #[error("{} is not a .{extension} file", .path.display())]
    NotSourceFile { path: PathBuf, extension: String },

    #[error("Directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Method {class}::{member} does not exist")]
    InvalidTarget { class: String, member: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    // lookup
    #[error("Declaration {class}::{member} not found")]
    DeclarationNotFound { class: String, member: String },

    #[error("Declaration {class}::{member} is ambiguous ({count} matches)")]
    AmbiguousDeclaration {
        class: String,
        member: String,
        count: usize,
    },

    #[error("Cannot inline {class}::{member}: {reason}")]
    NotInlinable {
        class: String,
        member: String,
        reason: String,
    },

    // input
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lexical error at line {line}, column {column}: unexpected '{text}'")]
    Lex {
        line: usize,
        column: usize,
        text: String,
    },

    #[error("Syntax error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{}: {source}", .path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: Box<PreprocessError>,
    },

    // engine
    #[error("Cannot render node: {0}")]
    Render(String),

    #[error("A rule attempted to remove the root of a tree")]
    RootRemoved,

    // export
    #[error("Failed to write {} to {}, file already exists", .source_path.display(), .target.display())]
    TargetExists { source_path: PathBuf, target: PathBuf },
}

impl PreprocessError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        Self::ParseFile { path: path.into(), source: Box::new(self) }
    }

    /// Configuration errors are reported before any unit is touched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingPath(_)
                | Self::NotSourceFile { .. }
                | Self::MissingDirectory(_)
                | Self::InvalidTarget { .. }
                | Self::Config(_)
        )
    }

    /// Lookup errors are fatal to the invoking rule only.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Self::DeclarationNotFound { .. } | Self::AmbiguousDeclaration { .. } | Self::NotInlinable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_cli_wording() {
        let err = PreprocessError::InvalidTarget { class: "Logger".into(), member: "debg".into() };
        assert_eq!(err.to_string(), "Method Logger::debg does not exist");
        assert!(err.is_configuration());

        let err = PreprocessError::NotSourceFile { path: "a.txt".into(), extension: "php".into() };
        assert_eq!(err.to_string(), "a.txt is not a .php file");
    }

    #[test]
    fn test_classification() {
        let err = PreprocessError::DeclarationNotFound { class: "A".into(), member: "b".into() };
        assert!(err.is_lookup());
        assert!(!err.is_configuration());
        let wrapped = PreprocessError::Parse { line: 1, column: 2, message: "x".into() }.in_file("f.php");
        assert!(wrapped.to_string().starts_with("f.php: Syntax error at line 1"));
    }
}
