//! Category and question storage.
//!
//! [`QuestionSource`] is the read side the game core depends on; [`CatalogStore`]
//! implements it in memory together with the admin operations.

mod export;
mod store;

use async_trait::async_trait;

use crate::llm::LlmError;
use crate::types::{Category, Question};

pub use export::{CatalogSnapshot, CategorySnapshot, QuestionSnapshot, CATALOG_SCHEMA_VERSION};
pub use store::CatalogStore;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("question generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Data source for the question pool. Categories are looked up by name.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn fetch_categories(&self) -> CatalogResult<Vec<Category>>;

    async fn fetch_questions(&self, category_name: &str) -> CatalogResult<Vec<Question>>;

    /// Clean the stored text of every question in the category and return the
    /// remaining set. Questions left empty are deleted.
    async fn sanitize_category(&self, category_name: &str) -> CatalogResult<Vec<Question>>;
}
