/*!
# PHP Preprocessor

Scope-aware, format-preserving source-to-source rewriter for PHP. A batch of
files is parsed, analyzed once for semantic facts (enclosing class, expression
types, resolved names), rewritten by a sequence of rules, and printed back
with the original formatting everywhere nothing changed.

## Rewrites

- **comment-out** - replace calls to a method with an inert `/* call */` placeholder
- **qualify-function-calls** - `strlen()` to `\strlen()` where the target is certain
- **inline-method-call** - splice a one-expression method body into its call sites
- **narrow-array-isset** - `isset($a[$k])` to `array_key_exists($k, $a)` for typed arrays
- **strip-parameter-types** - drop allow-listed parameter types from non-overridable methods
- **inline-trivial-accessors** - `$o->getX()` to `$o->x` for final/private getters

## Architecture

```text
php-preprocessor
├── Parser        - lossless lexer, grammar, AST with node ids
├── Analyzer      - class universe, name resolution, type inference
├── Engine        - fingerprints, context store, traversal, source units
├── Printer       - canonical renderer, format-preserving regeneration
├── Rules         - rewrite rule catalog
├── Preprocessor  - batch orchestration and export
└── Config        - TOML pipelines
```

## Usage

### CLI
```bash
# Ad-hoc pipeline
php-preprocessor rewrite src --output out --comment-out 'pocketmine\plugin\PluginLogger::debug' --qualify-calls

# Configured pipeline
php-preprocessor run --config preprocess.toml --stats stats.json

# Verify the printer reproduces files byte for byte
php-preprocessor check src
```

### Library
```rust,ignore
use php_preprocessor::{PreProcessor, SourceOptions};

let mut preprocessor = PreProcessor::from_directory("src".as_ref(), &SourceOptions::default())?;
preprocessor.comment_out("Logger", "debug")?.qualify_function_calls()?;
for (path, text) in preprocessor.regenerated()? {
    println!("{}:\n{}", path.display(), text);
}
```
*/

pub mod analyzer;
pub mod cli_common;
pub mod config;
pub mod core;
pub mod engine;
pub mod parser;
pub mod preprocessor;
pub mod printer;
pub mod rules;

// Re-export main types for convenience
pub use analyzer::{ClassIndex, Scope, SemanticAnalyzer, Type};
pub use config::{PreprocessorConfig, RewriteStep};
pub use core::{PreprocessError, Result};
pub use engine::{Action, ContextMode, SourceUnit};
pub use parser::{PhpParser, SourceParser};
pub use preprocessor::{ExportReport, ExportedFile, PreProcessor, SourceOptions};
pub use rules::{RewriteRule, RuleStats};

use std::path::Path;

/// Runs a configured pipeline: reads the inputs, applies every step in order
/// and exports into the configured directory.
pub fn run_pipeline(config: &PreprocessorConfig) -> Result<(PreProcessor, ExportReport)> {
    let mut preprocessor = PreProcessor::from_config(config)?;
    for step in &config.steps {
        preprocessor.apply_step(step)?;
    }
    let report = preprocessor.export(&config.output.directory, config.output.overwrite)?;
    Ok((preprocessor, report))
}

/// Whether an untouched parse of `path` prints back to exactly the file's text.
pub fn check_round_trip<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    let content = core::read_source_file(path)?;
    let parsed = PhpParser::new().parse(&content).map_err(|e| e.in_file(path))?;
    let working = parsed.tree.deep_clone();
    let printed = printer::regenerate(&working, &parsed.tree, &parsed.tokens)?;
    Ok(printed == content)
}
