/*!
# Batch Preprocessor

Owns every source unit of a run. Construction reads and parses all inputs,
builds the class universe from every reference tree (stubs included) and, in
eager mode, runs the semantic analyzer once per unit. Rewrites are chainable
batch operations; `export` writes the regenerated files.

## Usage

```rust,ignore
use php_preprocessor::preprocessor::{PreProcessor, SourceOptions};

let mut preprocessor = PreProcessor::from_directory("src".as_ref(), &SourceOptions::default())?;
preprocessor
    .comment_out("pocketmine\\plugin\\PluginLogger", "debug")?
    .qualify_function_calls()?;
let report = preprocessor.export("out".as_ref(), false)?;
```
*/

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analyzer::{Analyzer, ClassIndex, SemanticAnalyzer};
use crate::config::{PreprocessorConfig, RewriteStep};
use crate::core::errors::{PreprocessError, Result};
use crate::core::fs_utils::{discover_sources, has_source_extension, read_source_file};
use crate::engine::{ContextMode, SourceUnit};
use crate::parser::{ParsedSource, PhpParser, SourceParser};
use crate::rules::{
    CommentOut, InlineMethodCall, InlineTrivialAccessors, NarrowArrayIsset, QualifyFunctionCalls, RewriteRule,
    RuleStats, StripParameterTypes,
};

/// How inputs are read and analyzed
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Accepted file extensions, without the dot
    pub extensions: Vec<String>,
    /// Descend into subdirectories when scanning a directory
    pub recursive: bool,
    pub mode: ContextMode,
    /// Declaration-only files, never exported
    pub stubs: Vec<PathBuf>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["php".to_string()],
            recursive: true,
            mode: ContextMode::Eager,
            stubs: Vec::new(),
        }
    }
}

impl SourceOptions {
    pub fn from_config(config: &PreprocessorConfig) -> Self {
        Self {
            extensions: config.input.extensions.clone(),
            recursive: config.input.recursive,
            mode: config.analysis.mode,
            stubs: config.input.stubs.clone(),
        }
    }
}

/// A file written by `export`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFile {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Outcome of `export`
#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<ExportedFile>,
    /// `TargetExists` for every file left alone
    pub conflicts: Vec<PreprocessError>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.conflicts.is_empty()
    }
}

pub struct PreProcessor {
    units: Vec<SourceUnit>,
    universe: Rc<ClassIndex>,
    stats: BTreeMap<String, RuleStats>,
    base_dir: PathBuf,
}

impl PreProcessor {
    /// Explicit list of files; every path must exist and carry an accepted extension.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P], options: &SourceOptions) -> Result<Self> {
        for path in paths.iter().map(AsRef::as_ref) {
            if !path.exists() {
                return Err(PreprocessError::MissingPath(path.to_path_buf()));
            }
            if !has_source_extension(path, &options.extensions) {
                return Err(PreprocessError::NotSourceFile {
                    path: path.to_path_buf(),
                    extension: options.extensions.join("|"),
                });
            }
        }
        let sources = paths
            .iter()
            .map(|p| read_source_file(p.as_ref()).map(|text| (p.as_ref().to_path_buf(), text)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_sources(sources, options)
    }

    /// Every matching file below `directory`, in sorted order.
    pub fn from_directory(directory: &Path, options: &SourceOptions) -> Result<Self> {
        let files = discover_sources(directory, &options.extensions, options.recursive)?;
        Self::from_paths(&files, options)
    }

    /// Inputs, stubs, mode and export base from a configuration file.
    pub fn from_config(config: &PreprocessorConfig) -> Result<Self> {
        config.validate()?;
        let options = SourceOptions::from_config(config);
        let mut files = Vec::new();
        for path in &config.input.paths {
            if path.is_dir() {
                files.extend(discover_sources(path, &options.extensions, options.recursive)?);
            } else {
                files.push(path.clone());
            }
        }
        let mut preprocessor = Self::from_paths(&files, &options)?;
        preprocessor.set_base_dir(&config.output.base_dir);
        Ok(preprocessor)
    }

    /// In-memory sources; stubs named in `options` are still read from disk.
    pub fn from_sources(sources: Vec<(PathBuf, String)>, options: &SourceOptions) -> Result<Self> {
        let mut stubs = Vec::with_capacity(options.stubs.len());
        for path in &options.stubs {
            if !path.exists() {
                return Err(PreprocessError::MissingPath(path.clone()));
            }
            stubs.push((path.clone(), read_source_file(path)?));
        }
        Self::build(sources, stubs, options.mode)
    }

    fn build(sources: Vec<(PathBuf, String)>, stubs: Vec<(PathBuf, String)>, mode: ContextMode) -> Result<Self> {
        let parser = PhpParser::new();
        let total = sources.len();

        let mut parsed: Vec<(PathBuf, ParsedSource)> = Vec::with_capacity(total);
        for (done, (path, text)) in sources.into_iter().enumerate() {
            info!("[{} / {}] analyzer >> Reading {}", done + 1, total, path.display());
            let source = parser.parse(&text).map_err(|e| e.in_file(&path))?;
            parsed.push((path, source));
        }
        let mut stub_trees = Vec::with_capacity(stubs.len());
        for (path, text) in stubs {
            debug!("Reading stub {}", path.display());
            let source = parser.parse(&text).map_err(|e| e.in_file(&path))?;
            stub_trees.push((path, source.tree));
        }

        let universe = Rc::new(ClassIndex::from_trees(
            stub_trees
                .iter()
                .map(|(path, tree)| (path.as_path(), tree.as_ref()))
                .chain(parsed.iter().map(|(path, source)| (path.as_path(), source.tree.as_ref()))),
        ));
        debug!("Universe holds {} classes", universe.class_count());

        let analyzer: Rc<dyn Analyzer> = Rc::new(SemanticAnalyzer::new(universe.clone()));
        let units = parsed
            .into_iter()
            .map(|(path, source)| SourceUnit::new(&path, source, analyzer.clone(), universe.clone(), mode))
            .collect();

        Ok(Self {
            units,
            universe,
            stats: BTreeMap::new(),
            base_dir: PathBuf::from("."),
        })
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    pub fn universe(&self) -> &ClassIndex {
        &self.universe
    }

    /// Exported paths are made relative to `dir` (default: the working directory).
    pub fn set_base_dir(&mut self, dir: &Path) -> &mut Self {
        self.base_dir = dir.to_path_buf();
        self
    }

    /// Applies one rule to the whole batch and records its statistics.
    pub fn run(&mut self, rule: &mut dyn RewriteRule) -> Result<usize> {
        let start = Instant::now();
        let rewrites = rule.apply(&mut self.units)?;
        let elapsed = start.elapsed().as_micros() as u64;
        self.stats
            .entry(rule.name().to_string())
            .or_default()
            .update(rewrites as u64, elapsed);
        info!("{} finished with {} rewrites", rule.name(), rewrites);
        Ok(rewrites)
    }

    pub fn comment_out(&mut self, class: &str, method: &str) -> Result<&mut Self> {
        self.run(&mut CommentOut::new(class, method))?;
        Ok(self)
    }

    pub fn qualify_function_calls(&mut self) -> Result<&mut Self> {
        self.run(&mut QualifyFunctionCalls::new())?;
        Ok(self)
    }

    pub fn inline_method_call(&mut self, class: &str, method: &str) -> Result<&mut Self> {
        self.run(&mut InlineMethodCall::new(class, method))?;
        Ok(self)
    }

    pub fn narrow_array_isset(&mut self) -> Result<&mut Self> {
        self.run(&mut NarrowArrayIsset::new())?;
        Ok(self)
    }

    pub fn strip_parameter_types<S: AsRef<str>>(&mut self, types: &[S]) -> Result<&mut Self> {
        self.run(&mut StripParameterTypes::new(types.iter().map(|t| t.as_ref().to_string())))?;
        Ok(self)
    }

    pub fn inline_trivial_accessors(&mut self) -> Result<&mut Self> {
        self.run(&mut InlineTrivialAccessors::new())?;
        Ok(self)
    }

    pub fn apply_step(&mut self, step: &RewriteStep) -> Result<&mut Self> {
        match step {
            RewriteStep::CommentOut { class, method } => self.comment_out(class, method),
            RewriteStep::QualifyFunctionCalls => self.qualify_function_calls(),
            RewriteStep::InlineMethodCall { class, method } => self.inline_method_call(class, method),
            RewriteStep::NarrowArrayIsset => self.narrow_array_isset(),
            RewriteStep::StripParameterTypes { types } => self.strip_parameter_types(types),
            RewriteStep::InlineTrivialAccessors => self.inline_trivial_accessors(),
        }
    }

    /// `(path, text)` for every unit, in input order
    pub fn regenerated(&self) -> Result<Vec<(PathBuf, String)>> {
        self.units
            .iter()
            .map(|unit| unit.regenerate().map(|text| (unit.path().to_path_buf(), text)))
            .collect()
    }

    /// Writes every unit below `output_dir`. Existing files are kept unless
    /// `overwrite` is set and reported as conflicts.
    pub fn export(&self, output_dir: &Path, overwrite: bool) -> Result<ExportReport> {
        if !output_dir.is_dir() {
            return Err(PreprocessError::MissingDirectory(output_dir.to_path_buf()));
        }

        let mut report = ExportReport::default();
        for unit in &self.units {
            let source = unit.path();
            let target = self.export_target(output_dir, source);
            if !overwrite && target.exists() {
                warn!(
                    "Failed to write {} to {}, file already exists",
                    source.display(),
                    target.display()
                );
                report.conflicts.push(PreprocessError::TargetExists {
                    source_path: source.to_path_buf(),
                    target,
                });
                continue;
            }

            let text = unit.regenerate()?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PreprocessError::io(parent, e))?;
            }
            std::fs::write(&target, text).map_err(|e| PreprocessError::io(&target, e))?;
            info!("Wrote modified {} to {}", source.display(), target.display());
            report.written.push(ExportedFile {
                source: source.to_path_buf(),
                target,
            });
        }
        Ok(report)
    }

    fn export_target(&self, output_dir: &Path, source: &Path) -> PathBuf {
        let source = absolute(source);
        let relative = match source.strip_prefix(absolute(&self.base_dir)) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => source
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect(),
        };
        output_dir.join(relative)
    }

    pub fn stats(&self) -> &BTreeMap<String, RuleStats> {
        &self.stats
    }

    /// Rule statistics as pretty JSON
    pub fn export_stats(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.stats)
            .map_err(|e| PreprocessError::io(path, std::io::Error::other(e)))?;
        std::fs::write(path, json).map_err(|e| PreprocessError::io(path, e))
    }
}

/// Absolute form of `path` without `.` components; the file need not exist.
fn absolute(path: &Path) -> PathBuf {
    let joined = match path.is_relative() {
        true => std::env::current_dir().map(|cwd| cwd.join(path)).unwrap_or_else(|_| path.to_path_buf()),
        false => path.to_path_buf(),
    };
    joined.components().filter(|c| *c != Component::CurDir).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sources(files: &[(&str, &str)]) -> Vec<(PathBuf, String)> {
        files.iter().map(|(p, c)| (PathBuf::from(p), c.to_string())).collect()
    }

    #[test]
    fn test_chained_rules_and_stats() {
        let mut preprocessor = PreProcessor::from_sources(
            sources(&[(
                "a.php",
                "<?php\nclass Log { public function debug($m) {} }\nfunction f(Log $l) { $l->debug(strlen('x')); return time(); }\n",
            )]),
            &SourceOptions::default(),
        )
        .unwrap();
        preprocessor.comment_out("Log", "debug").unwrap().qualify_function_calls().unwrap();

        let (_, text) = &preprocessor.regenerated().unwrap()[0];
        assert!(text.contains("{ /* $l->debug(\\strlen('x')) */; return \\time(); }"), "{}", text);
        assert_eq!(preprocessor.stats()["comment-out"].rewrites, 1);
        assert_eq!(preprocessor.stats()["qualify-function-calls"].applications, 1);
    }

    #[test]
    fn test_invalid_target_leaves_units_untouched() {
        let mut preprocessor =
            PreProcessor::from_sources(sources(&[("a.php", "<?php $x->debug();\n")]), &SourceOptions::default()).unwrap();
        let err = preprocessor.comment_out("Nope", "debug").err().unwrap();
        assert!(matches!(err, PreprocessError::InvalidTarget { .. }));
        assert!(!preprocessor.units()[0].is_modified());
        assert!(preprocessor.stats().is_empty());
    }

    #[test]
    fn test_from_paths_checks_inputs() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hi").unwrap();

        let missing = PreProcessor::from_paths(&[dir.path().join("gone.php")], &SourceOptions::default());
        assert!(matches!(missing.err().unwrap(), PreprocessError::MissingPath(_)));
        let wrong = PreProcessor::from_paths(&[text], &SourceOptions::default());
        assert!(matches!(wrong.err().unwrap(), PreprocessError::NotSourceFile { .. }));
        let no_dir = PreProcessor::from_directory(&dir.path().join("nowhere"), &SourceOptions::default());
        assert!(matches!(no_dir.err().unwrap(), PreprocessError::MissingDirectory(_)));
    }

    #[test]
    fn test_export_relative_to_base_dir() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        std::fs::create_dir_all(input.path().join("src/sub")).unwrap();
        std::fs::write(input.path().join("src/sub/a.php"), "<?php echo 1;\n").unwrap();

        let mut preprocessor = PreProcessor::from_directory(input.path(), &SourceOptions::default()).unwrap();
        preprocessor.set_base_dir(input.path());
        let report = preprocessor.export(output.path(), false).unwrap();

        let target = output.path().join("src/sub/a.php");
        assert_eq!(report.written.len(), 1);
        assert_eq!(report.written[0].target, target);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "<?php echo 1;\n");

        let again = preprocessor.export(output.path(), false).unwrap();
        assert!(again.written.is_empty());
        assert!(matches!(again.conflicts[0], PreprocessError::TargetExists { .. }));
        assert!(!again.is_complete());

        assert!(preprocessor.export(&output.path().join("missing"), true).is_err());
    }
}
