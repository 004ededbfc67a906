pub mod extract;
pub mod fetch;
pub mod parse;
pub mod types;

pub use fetch::{Extractor, FetchOptions, ForwardedHeaders};
pub use types::{FetchError, PageMetadata};
