/*!
# Core Module

Core functionality shared by every layer of the preprocessor: error taxonomy,
source positions and file helpers.
*/

pub mod errors;
pub mod fs_utils;
pub mod position;

pub use errors::{PreprocessError, Result};
pub use fs_utils::{discover_sources, has_source_extension, read_source_file};
pub use position::{LineIndex, Position, Span, TokenRange};
