/*!
# Pipeline Configuration

TOML description of a preprocessing run: which files to read, how semantic
contexts are populated, where results go, and the rewrite steps to apply in
order.

```toml
[input]
paths = ["src"]
stubs = ["stubs/pocketmine.php"]

[analysis]
mode = "lazy"

[output]
directory = "out"
overwrite = true

[[steps]]
rule = "comment-out"
class = "pocketmine\\plugin\\PluginLogger"
method = "debug"

[[steps]]
rule = "strip-parameter-types"
types = ["int", "string"]
```
*/

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::errors::{PreprocessError, Result};
use crate::engine::ContextMode;

/// Root of a configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    pub input: InputConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Rewrite steps, applied in order
    #[serde(default)]
    pub steps: Vec<RewriteStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Files or directories
    pub paths: Vec<PathBuf>,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Declaration-only files: they feed the class universe and are never exported
    #[serde(default)]
    pub stubs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub mode: ContextMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    #[serde(default)]
    pub overwrite: bool,

    /// Exported paths are made relative to this directory
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

/// One entry of `[[steps]]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum RewriteStep {
    CommentOut { class: String, method: String },
    QualifyFunctionCalls,
    InlineMethodCall { class: String, method: String },
    NarrowArrayIsset,
    StripParameterTypes { types: Vec<String> },
    InlineTrivialAccessors,
}

impl RewriteStep {
    /// Rule name as written in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            RewriteStep::CommentOut { .. } => "comment-out",
            RewriteStep::QualifyFunctionCalls => "qualify-function-calls",
            RewriteStep::InlineMethodCall { .. } => "inline-method-call",
            RewriteStep::NarrowArrayIsset => "narrow-array-isset",
            RewriteStep::StripParameterTypes { .. } => "strip-parameter-types",
            RewriteStep::InlineTrivialAccessors => "inline-trivial-accessors",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    vec!["php".to_string()]
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("out")
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            extensions: default_extensions(),
            recursive: true,
            stubs: Vec::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            overwrite: false,
            base_dir: default_base_dir(),
        }
    }
}

impl PreprocessorConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PreprocessError::io(path, e))?;
        let mut config = Self::from_toml(&content).map_err(|e| match e {
            PreprocessError::Config(message) => PreprocessError::Config(format!("{}: {}", path.display(), message)),
            other => other,
        })?;

        // relative paths in the file are relative to the file itself
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            config.rebase(dir);
        }
        Ok(config)
    }

    /// Parses and validates TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PreprocessError::Config(format!("Failed to parse TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes back to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PreprocessError::Config(format!("Failed to serialize config to TOML: {}", e)))
    }

    /// Problems that would make a run fail, as one configuration error
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.input.paths.is_empty() {
            problems.push("input.paths is empty".to_string());
        }
        if self.input.extensions.is_empty() {
            problems.push("input.extensions is empty".to_string());
        }

        for (index, step) in self.steps.iter().enumerate() {
            let missing = match step {
                RewriteStep::CommentOut { class, method } | RewriteStep::InlineMethodCall { class, method } => {
                    class.trim().is_empty() || method.trim().is_empty()
                }
                RewriteStep::StripParameterTypes { types } => types.is_empty(),
                _ => false,
            };
            if missing {
                problems.push(format!("step {} ({}) is missing arguments", index + 1, step.name()));
            }
        }

        match problems.is_empty() {
            true => Ok(()),
            false => Err(PreprocessError::Config(problems.join("; "))),
        }
    }

    fn rebase(&mut self, dir: &Path) {
        let paths = self.input.paths.iter_mut().chain(self.input.stubs.iter_mut());
        for path in paths.chain([&mut self.output.directory, &mut self.output.base_dir]) {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_config_defaults() {
        let config = PreprocessorConfig::from_toml("[input]\npaths = [\"src\"]\n").unwrap();
        assert_eq!(config.input.extensions, vec!["php".to_string()]);
        assert!(config.input.recursive);
        assert_eq!(config.analysis.mode, ContextMode::Eager);
        assert_eq!(config.output.directory, PathBuf::from("out"));
        assert!(!config.output.overwrite);
        assert!(config.steps.is_empty());
    }

    #[test]
    fn test_steps_are_tagged_by_rule() {
        let config = PreprocessorConfig::from_toml(
            r#"
[input]
paths = ["a.php"]

[analysis]
mode = "lazy"

[[steps]]
rule = "comment-out"
class = "Logger"
method = "debug"

[[steps]]
rule = "qualify-function-calls"

[[steps]]
rule = "strip-parameter-types"
types = ["int"]
"#,
        )
        .unwrap();
        assert_eq!(config.analysis.mode, ContextMode::Lazy);
        assert_eq!(
            config.steps,
            vec![
                RewriteStep::CommentOut {
                    class: "Logger".to_string(),
                    method: "debug".to_string()
                },
                RewriteStep::QualifyFunctionCalls,
                RewriteStep::StripParameterTypes {
                    types: vec!["int".to_string()]
                },
            ]
        );
    }

    #[test]
    fn test_validation_errors() {
        let err = PreprocessorConfig::from_toml(
            "[input]\npaths = []\n[[steps]]\nrule = \"strip-parameter-types\"\ntypes = []\n",
        )
        .unwrap_err();
        assert!(err.is_configuration());
        let message = err.to_string();
        assert!(message.contains("input.paths is empty"));
        assert!(message.contains("step 1 (strip-parameter-types)"));

        assert!(PreprocessorConfig::from_toml("[input]\npaths = [\"a\"]\n[[steps]]\nrule = \"explode\"\n").is_err());
    }

    #[test]
    fn test_load_rebases_relative_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("preprocess.toml");
        std::fs::write(&path, "[input]\npaths = [\"src\"]\n[output]\ndirectory = \"/abs/out\"\n").unwrap();
        let config = PreprocessorConfig::load_from_file(&path).unwrap();
        assert_eq!(config.input.paths, vec![dir.path().join("src")]);
        assert_eq!(config.output.directory, PathBuf::from("/abs/out"));
        assert_eq!(config.output.base_dir, dir.path().join("."));
    }
}
