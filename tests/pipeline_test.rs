/*!
End-to-end pipeline tests: configuration, inlining across files, export.
*/

use php_preprocessor::{
    check_round_trip, run_pipeline, ContextMode, PreProcessor, PreprocessError, PreprocessorConfig, SourceOptions,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn samples_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/samples")
}

fn in_memory(files: &[(&str, &str)], mode: ContextMode) -> PreProcessor {
    let sources = files.iter().map(|(p, c)| (PathBuf::from(p), c.to_string())).collect();
    let options = SourceOptions {
        mode,
        ..SourceOptions::default()
    };
    PreProcessor::from_sources(sources, &options).unwrap()
}

const CLAMP: &str = "<?php
namespace Util;

final class MathUtil {
    public static function clamp(int $v, int $lo = 0, int $hi = 100) : int {
        return max($lo, min($hi, $v));
    }

    public function twice(int $v) : int {
        return $v + $v;
    }
}
";

const CALLER: &str = "<?php
namespace App;

use Util\\MathUtil;

function scale($x, MathUtil $m) {
    $a = MathUtil::clamp($x * 2, 1);
    $b = $m->twice(next_id());
    return $a + $b;
}
";

#[test]
fn test_inline_across_files_and_namespaces() {
    for mode in [ContextMode::Eager, ContextMode::Lazy] {
        let mut preprocessor = in_memory(&[("util.php", CLAMP), ("app.php", CALLER)], mode);
        preprocessor
            .inline_method_call("Util\\MathUtil", "clamp")
            .unwrap()
            .inline_method_call("Util\\MathUtil", "twice")
            .unwrap();

        let regenerated = preprocessor.regenerated().unwrap();
        assert_eq!(regenerated[0].1, CLAMP);
        assert_eq!(
            regenerated[1].1,
            CALLER
                .replace("MathUtil::clamp($x * 2, 1)", "\\max(1, \\min(100, $x * 2))")
                .replace("$m->twice(next_id())", "next_id() + next_id()")
        );
    }
}

#[test]
fn test_inline_lookup_errors() {
    let mut preprocessor = in_memory(&[("util.php", CLAMP), ("app.php", CALLER)], ContextMode::Eager);
    let missing = preprocessor.inline_method_call("Util\\MathUtil", "nope").err().unwrap();
    assert!(matches!(missing, PreprocessError::InvalidTarget { .. }));

    let mut duplicated = in_memory(
        &[
            ("a.php", "<?php class Base { public function id($x) { return $x; } }"),
            ("b.php", "<?php class Child extends Base { public function id($x) { return -$x; } }"),
        ],
        ContextMode::Eager,
    );
    let ambiguous = duplicated.inline_method_call("Base", "id").err().unwrap();
    assert!(matches!(ambiguous, PreprocessError::AmbiguousDeclaration { count: 2, .. }));
    assert!(ambiguous.is_lookup());
    assert!(duplicated.units().iter().all(|u| !u.is_modified()));
}

#[test]
fn test_samples_round_trip() {
    for entry in fs::read_dir(samples_dir()).unwrap() {
        let path = entry.unwrap().path();
        assert!(check_round_trip(&path).unwrap(), "{} does not round-trip", path.display());
    }
}

fn write_config(dir: &Path, input: &Path, output: &Path, overwrite: bool) -> PathBuf {
    let config = format!(
        r#"
[input]
paths = ["{input}"]
stubs = ["{stubs}"]

[analysis]
mode = "lazy"

[output]
directory = "{output}"
overwrite = {overwrite}
base_dir = "{input}"

[[steps]]
rule = "comment-out"
class = "Logger"
method = "debug"

[[steps]]
rule = "qualify-function-calls"
"#,
        input = input.display(),
        stubs = samples_dir().join("stubs.php").display(),
        output = output.display(),
        overwrite = overwrite,
    );
    let path = dir.join("preprocess.toml");
    fs::write(&path, config).unwrap();
    path
}

#[test]
fn test_configured_pipeline_exports_and_reports_conflicts() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fs::create_dir_all(input.path().join("plugin")).unwrap();
    fs::copy(
        samples_dir().join("logger-debug-method-call.php"),
        input.path().join("plugin/Main.php"),
    )
    .unwrap();

    let config_path = write_config(input.path(), input.path(), output.path(), false);
    let config = PreprocessorConfig::load_from_file(&config_path).unwrap();
    let (preprocessor, report) = run_pipeline(&config).unwrap();

    assert!(report.is_complete());
    let target = output.path().join("plugin/Main.php");
    assert_eq!(report.written[0].target, target);
    let written = fs::read_to_string(&target).unwrap();
    assert!(written.contains("\t\t/* $this->l2->debug(\"test native typed property\") */;"));
    assert!(written.contains("$logger->notice(\"This isn't a debug message\");"));
    assert_eq!(preprocessor.stats()["comment-out"].rewrites, 5);

    // a second run leaves the existing file alone
    fs::write(&target, "keep").unwrap();
    let (_, second) = run_pipeline(&config).unwrap();
    assert!(second.written.is_empty());
    assert!(matches!(&second.conflicts[0], PreprocessError::TargetExists { target: t, .. } if *t == target));
    assert_eq!(fs::read_to_string(&target).unwrap(), "keep");

    let overwrite = PreprocessorConfig::load_from_file(write_config(input.path(), input.path(), output.path(), true)).unwrap();
    let (_, third) = run_pipeline(&overwrite).unwrap();
    assert_eq!(third.written.len(), 1);
    assert_eq!(fs::read_to_string(&target).unwrap(), written);
}

#[test]
fn test_stats_export_as_json() {
    let dir = TempDir::new().unwrap();
    let mut preprocessor = in_memory(&[("util.php", CLAMP), ("app.php", CALLER)], ContextMode::Eager);
    preprocessor.qualify_function_calls().unwrap();

    let path = dir.path().join("stats.json");
    preprocessor.export_stats(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["qualify-function-calls"]["applications"], 1);
    assert_eq!(json["qualify-function-calls"]["rewrites"], 2);
}
