//! Hierarchy parser: textbook markup → typed node tree

mod segment;
mod text;
mod textbook;
mod tree;

pub use segment::{RuleSegmenter, Segmenter, Span};
pub use text::{clean_text, collapse_whitespace, slugify};
pub use textbook::{
    collection_name, list_collections, MalformedSourceError, ParseOutcome, SourceError,
    TextbookParser,
};
pub use tree::{BookTree, TreeNode, Visit};
