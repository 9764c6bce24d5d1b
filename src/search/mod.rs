//! Query answering: lemma intersection with relaxation, relevance ranking
//! and snippet assembly.

mod engine;
mod snippet;

pub use engine::{SearchEngine, SearchOutcome, SearchResult};
