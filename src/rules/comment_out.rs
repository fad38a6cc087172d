//! Replaces calls to one method with an inert comment holding the call text.
//! Names in that text are fully qualified against the call site.

use std::rc::Rc;

use tracing::{info, warn};

use super::{ensure_method, log_progress, qualify_names, RewriteRule};
use crate::analyzer::Scope;
use crate::core::errors::Result;
use crate::engine::{Action, SourceUnit};
use crate::parser::ast::AstNode;
use crate::printer::render_inline;

#[derive(Debug, Clone)]
pub struct CommentOut {
    class: String,
    method: String,
}

impl CommentOut {
    pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }
}

impl RewriteRule for CommentOut {
    fn name(&self) -> &'static str {
        "comment-out"
    }

    fn apply(&mut self, units: &mut [SourceUnit]) -> Result<usize> {
        ensure_method(units, &self.class, &self.method)?;
        let total = units.len();
        let mut rewrites = 0;
        for (done, unit) in units.iter_mut().enumerate() {
            let activity = format!("Searching for {}::{} references", self.class, self.method);
            log_progress(done + 1, total, unit, &activity);
            let mut elide = |call: &Rc<AstNode>, scope: &Rc<Scope>| match qualify_names(call, scope)
                .and_then(|resolved| render_inline(&resolved))
            {
                Ok(text) => {
                    info!("[{}] Commented out {}", scope.location(call.line()), text);
                    Action::Replace(Rc::new(AstNode::placeholder(text)))
                }
                Err(e) => {
                    warn!("[{}] Cannot comment out call: {}", scope.location(call.line()), e);
                    Action::Keep
                }
            };
            rewrites += unit.visit_calls(&self.class, &self.method, &mut [&mut elide])?.replaced;
        }
        Ok(rewrites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::unit;
    use pretty_assertions::assert_eq;

    const CODE: &str = "<?php
class Logger {
    public function debug(string $m) : void {}
    public function info(string $m) : void {}
}
final class Plugin {
    private Logger $logger;

    public function run() : void {
        // keep this comment
        $this->logger->debug(\"x\" . time() . Util::tag());
        $this->logger->info('y');
    }
}
final class Util {
    public static function tag() : string { return ''; }
}
";

    #[test]
    fn test_comment_out_replaces_only_matching_calls() {
        let mut units = unit(CODE);
        let count = CommentOut::new("Logger", "debug").apply(&mut units).unwrap();
        assert_eq!(count, 1);
        let expected = CODE.replace(
            "$this->logger->debug(\"x\" . time() . Util::tag());",
            "/* $this->logger->debug(\"x\" . \\time() . \\Util::tag()) */;",
        );
        assert_eq!(units[0].regenerate().unwrap(), expected);
    }

    #[test]
    fn test_comment_out_is_idempotent() {
        let mut units = unit(CODE);
        let mut rule = CommentOut::new("Logger", "debug");
        rule.apply(&mut units).unwrap();
        let once = units[0].regenerate().unwrap();
        assert_eq!(rule.apply(&mut units).unwrap(), 0);
        assert_eq!(units[0].regenerate().unwrap(), once);
    }

    #[test]
    fn test_same_text_in_other_class_is_kept() {
        let code = "<?php class L { function debug($m) {} } class O { function debug($m) {} }\nfunction a(L $x) { $x->debug(1); } function b(O $x) { $x->debug(1); }\n";
        let mut units = unit(code);
        assert_eq!(CommentOut::new("L", "debug").apply(&mut units).unwrap(), 1);
        let expected = code.replacen("$x->debug(1);", "/* $x->debug(1) */;", 1);
        assert_eq!(units[0].regenerate().unwrap(), expected);
    }

    #[test]
    fn test_unknown_target_fails_before_any_rewrite() {
        let mut units = unit(CODE);
        let err = CommentOut::new("Logger", "trace").apply(&mut units).unwrap_err();
        assert!(err.is_configuration());
        assert!(!units[0].is_modified());
    }
}
