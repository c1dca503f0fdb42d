pub mod criterion;
pub mod document;

pub use criterion::DeleteCriterion;
pub use document::{build_documents, Document};
