/*!
# Printer

Text regeneration for rewritten trees.

- `render` prints any subtree canonically (used for new nodes, placeholder
  text and fingerprints)
- `preserving` regenerates a whole working tree, copying the original tokens
  for everything a rewrite did not touch
*/

pub mod preserving;
pub mod render;

pub use preserving::{regenerate, FormatPreservingPrinter};
pub use render::{render_inline, Renderer};
