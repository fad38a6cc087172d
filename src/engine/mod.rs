/*!
# Rewrite Engine

Correlates semantic facts with working-tree nodes and drives rule traversals.

- `fingerprint`: node identity that survives cloning
- `context`: per-unit fingerprint to scope store
- `traverse`: first-match-wins rule chain over a persistent tree
- `unit`: one source file with its rule adapters
*/

pub mod context;
pub mod fingerprint;
pub mod traverse;
pub mod unit;

pub use context::{collect_contexts, ContextMap, ContextMode, ContextStore};
pub use fingerprint::Fingerprint;
pub use traverse::{traverse, Action, NodeRule, Outcome};
pub use unit::{Declaration, DeclarationRule, ScopedRule, SourceUnit};
