//! Replaces calls to trivial getters with direct property access.
//!
//! Runs in three passes over the whole batch:
//! 1. find final or private methods whose body is exactly `return $this->field;`
//! 2. make each such field public at its declaration (property or promoted parameter)
//! 3. rewrite `$obj->getField()` to `$obj->field` at every call site

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::{debug, info};

use super::{log_progress, RewriteRule};
use crate::analyzer::{Scope, Visibility};
use crate::core::errors::Result;
use crate::engine::{Action, SourceUnit};
use crate::parser::ast::{AstNode, AstNodeType};

#[derive(Debug, Clone, Default)]
pub struct InlineTrivialAccessors;

/// A getter found in the first pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Accessor {
    class: String,
    method: String,
    field: String,
}

impl InlineTrivialAccessors {
    pub fn new() -> Self {
        Self
    }
}

impl RewriteRule for InlineTrivialAccessors {
    fn name(&self) -> &'static str {
        "inline-trivial-accessors"
    }

    fn apply(&mut self, units: &mut [SourceUnit]) -> Result<usize> {
        let accessors = discover(units)?;
        if accessors.is_empty() {
            debug!("No trivial accessors found");
            return Ok(0);
        }

        // field owner (declaring class) -> fields to widen
        let mut widen: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(universe) = units.first().map(|u| u.universe().clone()) {
            for accessor in &accessors {
                match universe.find_property(&accessor.class, &accessor.field) {
                    Some(property) if property.visibility != Visibility::Public => {
                        let fields = widen.entry(property.class.clone()).or_default();
                        if !fields.contains(&property.name) {
                            fields.push(property.name.clone());
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut rewrites = 0;
        let total = units.len();
        for (done, unit) in units.iter_mut().enumerate() {
            log_progress(done + 1, total, unit, "Widening accessed properties");
            let mut widening = |node: &Rc<AstNode>, scope: &Rc<Scope>| widened(node, scope, &widen);
            rewrites += unit.visit_with_scope(&mut [&mut widening])?.replaced;
        }

        for accessor in &accessors {
            let label = format!("{}::{}", accessor.class, accessor.method);
            for (done, unit) in units.iter_mut().enumerate() {
                log_progress(done + 1, total, unit, &format!("Searching for {} references", label));
                let mut inline = |call: &Rc<AstNode>, scope: &Rc<Scope>| {
                    if !call.is(AstNodeType::MethodCall) {
                        return Action::Keep;
                    }
                    let Some(receiver) = call.child(0) else {
                        return Action::Keep;
                    };
                    info!("[{}] Inlined accessor {}", scope.location(call.line()), label);
                    let field = AstNode::synthetic(AstNodeType::Identifier, Some(accessor.field.clone()), Vec::new());
                    let mut fetch = AstNode::synthetic(AstNodeType::PropertyFetch, None, vec![receiver.clone(), Rc::new(field)]);
                    if call.has_flag("nullsafe") {
                        fetch.set_flag("nullsafe");
                    }
                    Action::Replace(Rc::new(fetch))
                };
                rewrites += unit.visit_calls(&accessor.class, &accessor.method, &mut [&mut inline])?.replaced;
            }
        }
        Ok(rewrites)
    }
}

/// First pass: every trivial getter that cannot be overridden.
fn discover(units: &mut [SourceUnit]) -> Result<Vec<Accessor>> {
    let mut found = Vec::new();
    for unit in units.iter_mut() {
        let mut collect = |node: &Rc<AstNode>, scope: &Rc<Scope>, class: &str, member: &str| {
            if let Some(field) = trivial_getter(node, scope) {
                debug!("{}::{} returns $this->{}", class, member, field);
                found.push(Accessor {
                    class: class.to_string(),
                    method: member.to_string(),
                    field,
                });
            }
            Action::Keep
        };
        unit.visit_declarations(&mut [&mut collect])?;
    }
    found.sort();
    found.dedup();
    Ok(found)
}

/// Field returned by a non-overridable `return $this->field;` method.
fn trivial_getter(method: &AstNode, scope: &Scope) -> Option<String> {
    if !method.is(AstNodeType::ClassMethod) || method.has_flag("by_ref") || method.has_modifier("static") {
        return None;
    }
    let final_class = scope.class_info().is_some_and(|c| c.is_final);
    if !(method.has_modifier("private") || method.has_modifier("final") || final_class) {
        return None;
    }
    if !method.parameters().is_empty() {
        return None;
    }
    let statement = match method.slot(3)?.children.as_slice() {
        [single] if single.is(AstNodeType::Return) => single,
        _ => return None,
    };
    let fetch = statement.slot(0).filter(|e| e.is(AstNodeType::PropertyFetch) && !e.has_flag("nullsafe"))?;
    let this = fetch.child(0).filter(|r| r.is(AstNodeType::Variable) && r.text() == "this");
    let field = fetch.child(1).filter(|m| m.is(AstNodeType::Identifier))?;
    let class = scope.class.as_deref()?;
    let property = scope.universe().find_property(class, field.text())?;
    match this.is_some() && !property.is_static {
        true => Some(field.text().to_string()),
        false => None,
    }
}

/// Second pass callback: property or promoted parameter made public.
fn widened(node: &Rc<AstNode>, scope: &Scope, widen: &BTreeMap<String, Vec<String>>) -> Action {
    let promoted = node.is(AstNodeType::Parameter) && node.child(0).is_some_and(|m| !m.text().is_empty());
    if !(node.is(AstNodeType::Property) || promoted) {
        return Action::Keep;
    }
    let Some(class) = scope.class.as_deref() else {
        return Action::Keep;
    };
    if !widen.get(class).is_some_and(|fields| fields.iter().any(|f| f == node.text())) {
        return Action::Keep;
    }
    let Some(modifiers) = node.child(0) else {
        return Action::Keep;
    };
    let mut keywords: Vec<&str> = modifiers
        .text()
        .split_whitespace()
        .filter(|k| !matches!(*k, "private" | "protected" | "public"))
        .collect();
    keywords.insert(0, "public");
    let mut public = (**modifiers).clone();
    public.value = Some(keywords.join(" "));

    info!("Widened {}::${} to public", class, node.text());
    Action::Replace(Rc::new(node.with_child(0, Rc::new(public))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{unit, units};
    use pretty_assertions::assert_eq;

    const PEOPLE: &str = "<?php
final class Person {
    private string $name;

    public function __construct(protected readonly int $age, string $name) {
        $this->name = $name;
    }

    public function getName() : string {
        return $this->name;
    }

    public function getAge() : int {
        return $this->age;
    }

    public function greet() : string {
        return 'Hi ' . $this->getName();
    }
}

class Robot {
    public function getName() : string {
        return $this->serial;
    }
}

function show(Person $p, Robot $r) {
    echo $p->getName(), $p->getAge(), $r->getName();
}
";

    #[test]
    fn test_getters_become_property_fetches() {
        let mut units = unit(PEOPLE);
        let count = InlineTrivialAccessors::new().apply(&mut units).unwrap();
        // two widenings and three call sites
        assert_eq!(count, 5);
        let expected = PEOPLE
            .replace("private string $name;", "public string $name;")
            .replace("protected readonly int $age", "public readonly int $age")
            .replace("'Hi ' . $this->getName()", "'Hi ' . $this->name")
            .replace("echo $p->getName(), $p->getAge(),", "echo $p->name, $p->age,");
        assert_eq!(units[0].regenerate().unwrap(), expected);
    }

    #[test]
    fn test_overridable_getter_is_kept() {
        let code = "<?php
class Box {
    protected $item;
    public function getItem() { return $this->item; }
}
function open(Box $b) { return $b->getItem(); }
";
        let mut units = unit(code);
        assert_eq!(InlineTrivialAccessors::new().apply(&mut units).unwrap(), 0);
        assert!(!units[0].is_modified());
    }

    #[test]
    fn test_call_sites_in_other_units() {
        let mut units = units(&[
            ("id.php", "<?php final class Id { private int $v = 1; public function v() { return $this->v; } }"),
            ("use.php", "<?php function f(Id $id) { return $id->v() + 1; }"),
        ]);
        assert_eq!(InlineTrivialAccessors::new().apply(&mut units).unwrap(), 2);
        assert_eq!(
            units[0].regenerate().unwrap(),
            "<?php final class Id { public int $v = 1; public function v() { return $this->v; } }"
        );
        assert_eq!(units[1].regenerate().unwrap(), "<?php function f(Id $id) { return $id->v + 1; }");
    }
}
