//! `isset($array[$key])` to `array_key_exists($key, $array)` where both types are certain.
//!
//! Unlike `isset`, `array_key_exists` is true for a key holding `null`.

use std::rc::Rc;

use tracing::info;

use super::{log_progress, RewriteRule};
use crate::analyzer::Scope;
use crate::core::errors::Result;
use crate::engine::{Action, SourceUnit};
use crate::parser::ast::{AstNode, AstNodeType};

#[derive(Debug, Clone, Default)]
pub struct NarrowArrayIsset;

impl NarrowArrayIsset {
    pub fn new() -> Self {
        Self
    }
}

impl RewriteRule for NarrowArrayIsset {
    fn name(&self) -> &'static str {
        "narrow-array-isset"
    }

    fn apply(&mut self, units: &mut [SourceUnit]) -> Result<usize> {
        let total = units.len();
        let mut rewrites = 0;
        for (done, unit) in units.iter_mut().enumerate() {
            log_progress(done + 1, total, unit, "Searching for array isset checks");
            let mut narrow = |node: &Rc<AstNode>, scope: &Rc<Scope>| match key_exists_call(node, scope) {
                Some(call) => {
                    info!("Replaced isset with array_key_exists at {}", scope.location(node.line()));
                    Action::Replace(call)
                }
                None => Action::Keep,
            };
            rewrites += unit.visit_with_scope(&mut [&mut narrow])?.replaced;
        }
        Ok(rewrites)
    }
}

fn key_exists_call(node: &AstNode, scope: &Scope) -> Option<Rc<AstNode>> {
    if !node.is(AstNodeType::Isset) || node.children.len() != 1 {
        return None;
    }
    let fetch = node.child(0).filter(|c| c.is(AstNodeType::ArrayDimFetch))?;
    let (base, key) = (fetch.child(0)?, fetch.slot(1)?);
    if !scope.type_of(base).is_array() || !scope.type_of(key).is_valid_key() {
        return None;
    }
    let name = AstNode::synthetic(AstNodeType::Name, Some("array_key_exists".to_string()), Vec::new());
    let arguments = AstNode::synthetic(AstNodeType::ArgumentList, None, vec![key.clone(), base.clone()]);
    Some(Rc::new(AstNode::synthetic(
        AstNodeType::FuncCall,
        None,
        vec![Rc::new(name), Rc::new(arguments)],
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ContextMode;
    use crate::rules::test_support::{unit, units_in};
    use crate::rules::InlineMethodCall;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_narrows_only_typed_subscripts() {
        let code = "<?php
class Registry {
    /** @var string[] */
    private $names = [];

    public function has(array $items, int $id, string $key, float $f, $unknown) : bool {
        return isset($items[$id])
            || isset($this->names[$key])
            || isset($unknown[$id])
            || isset($items[$f])
            || isset($items[$id], $items[$key]);
    }
}
";
        let mut units = unit(code);
        let count = NarrowArrayIsset::new().apply(&mut units).unwrap();
        assert_eq!(count, 2);
        let expected = code
            .replace("isset($items[$id])\n", "array_key_exists($id, $items)\n")
            .replace("isset($this->names[$key])", "array_key_exists($key, $this->names)");
        assert_eq!(units[0].regenerate().unwrap(), expected);
    }

    #[test]
    fn test_inlined_checks_keep_their_call_site_types() {
        let code = "<?php
class W {
    /** @var int[] */
    private $map = [];

    public function has($k) { return isset($this->map[$k]); }
}
function a(W $w, int $k) { return $w->has($k); }
function b(W $w, $k) { return $w->has($k); }
";
        let mut units = units_in(ContextMode::Lazy, &[("w.php", code)]);
        assert_eq!(InlineMethodCall::new("W", "has").apply(&mut units).unwrap(), 2);
        assert_eq!(NarrowArrayIsset::new().apply(&mut units).unwrap(), 1);
        let output = units[0].regenerate().unwrap();
        assert!(output.contains("function a(W $w, int $k) { return array_key_exists($k, $w->map); }"), "{}", output);
        assert!(output.contains("function b(W $w, $k) { return isset($w->map[$k]); }"), "{}", output);
    }
}
