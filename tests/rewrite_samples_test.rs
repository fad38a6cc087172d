/*!
Rewrite rules applied to the PHP samples under `tests/samples`.
*/

use php_preprocessor::{ContextMode, PreProcessor, SourceOptions};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

fn sample(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/samples").join(name)
}

fn options(mode: ContextMode) -> SourceOptions {
    SourceOptions {
        mode,
        stubs: vec![sample("stubs.php")],
        ..SourceOptions::default()
    }
}

fn load(name: &str, mode: ContextMode) -> (PreProcessor, String) {
    let path = sample(name);
    let original = std::fs::read_to_string(&path).unwrap();
    (PreProcessor::from_paths(&[path], &options(mode)).unwrap(), original)
}

fn output(preprocessor: &PreProcessor) -> String {
    preprocessor.regenerated().unwrap().remove(0).1
}

/// `original` with the given 1-based lines replaced
fn with_lines(original: &str, replacements: &[(usize, &str)]) -> String {
    let mut lines: Vec<&str> = original.split('\n').collect();
    for (line, replacement) in replacements {
        assert_ne!(lines[line - 1], *replacement);
        lines[line - 1] = replacement;
    }
    lines.join("\n")
}

#[test]
fn test_comment_out_logger_debug_calls() {
    for mode in [ContextMode::Eager, ContextMode::Lazy] {
        let (mut preprocessor, original) = load("logger-debug-method-call.php", mode);
        preprocessor.comment_out("Logger", "debug").unwrap();

        let expected = with_lines(
            &original,
            &[
                (15, "\t\t/* $this->getLogger()->debug(\"Plugin enabled timestamp: \" . \\time()) */;"),
                (18, "\t\t/* $logger->debug(\"Logging from {$this->getName()}\") */;"),
                (23, "\t\t/* $child->debug(\"Hello world\") */;"),
                (25, "\t\t/* $this->l1->debug(\"test phpdoc typed property\") */;"),
                (26, "\t\t/* $this->l2->debug(\"test native typed property\") */;"),
            ],
        );
        assert_eq!(output(&preprocessor), expected);
        assert_eq!(preprocessor.stats()["comment-out"].rewrites, 5);
    }
}

#[test]
fn test_comment_out_twice_changes_nothing_more() {
    for mode in [ContextMode::Eager, ContextMode::Lazy] {
        let (mut preprocessor, _) = load("logger-debug-method-call.php", mode);
        preprocessor.comment_out("Logger", "debug").unwrap();
        let once = output(&preprocessor);
        preprocessor.comment_out("Logger", "debug").unwrap();
        assert_eq!(output(&preprocessor), once);
        assert_eq!(preprocessor.stats()["comment-out"].rewrites, 5);
        assert_eq!(preprocessor.stats()["comment-out"].applications, 2);
    }
}

#[test]
fn test_comment_out_through_implementing_class_only() {
    let (mut preprocessor, original) = load("logger-debug-method-call.php", ContextMode::Eager);
    preprocessor.comment_out("PrefixedLogger", "debug").unwrap();
    let expected = with_lines(&original, &[(23, "\t\t/* $child->debug(\"Hello world\") */;")]);
    assert_eq!(output(&preprocessor), expected);
}

#[test]
fn test_unknown_member_is_rejected_up_front() {
    let (mut preprocessor, _) = load("logger-debug-method-call.php", ContextMode::Eager);
    let err = preprocessor.comment_out("Logger", "debugg").err().unwrap();
    assert!(err.is_configuration());
    assert!(!preprocessor.units()[0].is_modified());
}

#[test]
fn test_qualify_unqualified_function_calls() {
    let (mut preprocessor, original) = load("unqualified-calls.php", ContextMode::Eager);
    preprocessor.qualify_function_calls().unwrap();

    let expected = original
        .replace("deg2rad(", "\\deg2rad(")
        .replace("cos(", "\\cos(")
        .replace("sin(", "\\sin(")
        .replace("assert(", "\\assert(")
        .replace("abs(", "\\abs(");
    assert_eq!(output(&preprocessor), expected);
    assert_eq!(preprocessor.stats()["qualify-function-calls"].rewrites, 9);
}

#[test]
fn test_inline_trivial_accessors() {
    for mode in [ContextMode::Eager, ContextMode::Lazy] {
        let (mut preprocessor, original) = load("accessors.php", mode);
        preprocessor.inline_trivial_accessors().unwrap();

        let expected = original
            .replace("\tprivate string $name;", "\tpublic string $name;")
            .replace("\tprotected $price;", "\tpublic $price;")
            .replace("private int $stock = 0", "public int $stock = 0")
            .replace("$this->getName() . \" (\" . $this->getPrice()", "$this->name . \" (\" . $this->price")
            .replace("$product->getStock()", "$product->stock")
            .replace("$product->getName()", "$product->name");
        assert_eq!(output(&preprocessor), expected);
        assert!(expected.contains("$category->getName()"));
        assert_eq!(preprocessor.stats()["inline-trivial-accessors"].rewrites, 7);
    }
}

#[test]
fn test_narrow_isset_then_strip_types() {
    let code = "<?php

final class Inventory{

\t/** @var array<string, int> */
\tprivate array $counts = [];

\tpublic function has(string $item, int $minimum) : bool{
\t\treturn isset($this->counts[$item]) && $this->counts[$item] >= $minimum;
\t}

\tpublic function hasAny($items, string $item) : bool{
\t\treturn isset($items[$item]) || isset($this->counts[$items]);
\t}
}
";
    let mut preprocessor =
        PreProcessor::from_sources(vec![(PathBuf::from("inventory.php"), code.to_string())], &SourceOptions::default())
            .unwrap();
    preprocessor.narrow_array_isset().unwrap().strip_parameter_types(&["string", "int"]).unwrap();

    let expected = code
        .replace("has(string $item, int $minimum)", "has($item, $minimum)")
        .replace("hasAny($items, string $item)", "hasAny($items, $item)")
        .replace("isset($this->counts[$item]) &&", "array_key_exists($item, $this->counts) &&");
    assert_eq!(output(&preprocessor), expected);
    assert_eq!(preprocessor.stats()["narrow-array-isset"].rewrites, 1);
}

#[test]
fn test_rewrite_around_other_statement_forms() {
    for mode in [ContextMode::Eager, ContextMode::Lazy] {
        let (mut preprocessor, original) = load("control-flow.php", mode);
        preprocessor.strip_parameter_types(&["int"]).unwrap();
        let expected = original.replace("classify(int $code", "classify($code");
        assert_eq!(output(&preprocessor), expected);
    }
}
