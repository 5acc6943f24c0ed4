//! Note frontmatter: extraction from Markdown and transport normalization.

mod dates;
mod normalize;
mod parser;

pub use dates::{classify, StringKind};
pub use normalize::{normalize, normalize_value, FrontmatterMap, FrontmatterValue};
pub use parser::{extract_frontmatter, FrontmatterError};
