//! Markup handling: legacy-link normalization and the renderer contract
//!
//! Content passes through the `LinkNormalizer` before it is stored, then a
//! `Renderer` turns it into HTML and reports the references it found.

mod normalize;
mod renderer;
mod wiki;

pub use normalize::{LinkNormalizer, DEFAULT_LEGACY_PREFIX};
pub use renderer::{LinkResolver, MarkupEngine, RenderError, RenderRequest, Rendered, Renderer};
pub use wiki::{MarkdownEngine, WikiRenderer};
