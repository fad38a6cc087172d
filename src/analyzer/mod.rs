/*!
# Analyzer Module

Reference inference engine: the declaration universe shared by a batch, the
per-node semantic context and the walker that computes it.
*/

pub mod index;
pub mod names;
pub mod scope;
pub mod semantic;
pub mod types;

pub use index::{ClassIndex, ClassInfo, MethodInfo, PropertyInfo, Visibility};
pub use names::{FunctionName, NameContext};
pub use scope::Scope;
pub use semantic::{Analyzer, SemanticAnalyzer};
pub use types::Type;
