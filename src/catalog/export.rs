//! Catalog export/import for seeding and backups.
//!
//! A snapshot is a plain JSON document listing categories with their questions
//! inline. IDs are optional on import so hand-written seed files can omit them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::{CatalogError, CatalogResult, CatalogStore};
use crate::sanitize::sanitize_text;
use crate::types::*;

/// Schema version for snapshot compatibility
pub const CATALOG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Schema version for forward compatibility
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    #[serde(default)]
    pub exported_at: Option<String>,
    pub categories: Vec<CategorySnapshot>,
}

fn default_schema_version() -> u32 {
    CATALOG_SCHEMA_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySnapshot {
    #[serde(default)]
    pub id: Option<CategoryId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub questions: Vec<QuestionSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSnapshot {
    #[serde(default)]
    pub id: Option<QuestionId>,
    pub text: String,
}

impl CatalogSnapshot {
    /// Validate the snapshot before import
    pub fn validate(&self) -> CatalogResult<()> {
        if self.schema_version > CATALOG_SCHEMA_VERSION {
            return Err(CatalogError::Invalid(format!(
                "Snapshot schema version {} is newer than supported version {}",
                self.schema_version, CATALOG_SCHEMA_VERSION
            )));
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();

        for category in &self.categories {
            let name = category.name.trim();
            if name.is_empty() {
                return Err(CatalogError::Invalid(
                    "Snapshot contains a category without a name".to_string(),
                ));
            }
            if name == RANDOM_CATEGORY {
                return Err(CatalogError::Invalid(format!(
                    "\"{}\" is reserved for the mixed category",
                    RANDOM_CATEGORY
                )));
            }
            if !names.insert(name) {
                return Err(CatalogError::Invalid(format!(
                    "Duplicate category name \"{}\" in snapshot",
                    name
                )));
            }

            let question_ids = category.questions.iter().filter_map(|q| q.id.as_deref());
            for id in category.id.as_deref().into_iter().chain(question_ids) {
                if !ids.insert(id) {
                    return Err(CatalogError::Invalid(format!(
                        "Duplicate id \"{}\" in snapshot",
                        id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Read and validate a snapshot file
    pub async fn load(path: &Path) -> CatalogResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CatalogError::Unavailable(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let snapshot: Self = serde_json::from_str(&content).map_err(|e| {
            CatalogError::Invalid(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

impl CatalogStore {
    /// Export every category with its questions
    pub async fn export_snapshot(&self) -> CatalogSnapshot {
        let categories = self.categories.read().await;
        let questions = self.questions.read().await;

        let categories = categories
            .iter()
            .map(|category| CategorySnapshot {
                id: Some(category.id.clone()),
                name: category.name.clone(),
                description: category.description.clone(),
                questions: category
                    .questions
                    .iter()
                    .filter_map(|id| questions.get(id))
                    .map(|q| QuestionSnapshot {
                        id: Some(q.id.clone()),
                        text: q.text.clone(),
                    })
                    .collect(),
            })
            .collect();

        CatalogSnapshot {
            schema_version: CATALOG_SCHEMA_VERSION,
            exported_at: Some(chrono::Utc::now().to_rfc3339()),
            categories,
        }
    }

    /// Replace the whole catalog with a snapshot.
    /// Question text is sanitized; questions left empty are skipped.
    pub async fn import_snapshot(&self, snapshot: CatalogSnapshot) -> CatalogResult<()> {
        snapshot.validate()?;

        let mut new_categories = Vec::with_capacity(snapshot.categories.len());
        let mut new_questions = HashMap::new();
        let mut skipped = 0;

        for category_snapshot in snapshot.categories {
            let category_id = category_snapshot
                .id
                .unwrap_or_else(|| ulid::Ulid::new().to_string());
            let mut question_ids = Vec::with_capacity(category_snapshot.questions.len());

            for question_snapshot in category_snapshot.questions {
                let Some(text) = sanitize_text(&question_snapshot.text) else {
                    skipped += 1;
                    continue;
                };
                let question = Question {
                    id: question_snapshot
                        .id
                        .unwrap_or_else(|| ulid::Ulid::new().to_string()),
                    text,
                    category_id: category_id.clone(),
                };
                question_ids.push(question.id.clone());
                new_questions.insert(question.id.clone(), question);
            }

            new_categories.push(Category {
                id: category_id,
                name: category_snapshot.name.trim().to_string(),
                description: category_snapshot.description,
                questions: question_ids,
            });
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} empty questions during import", skipped);
        }

        let mut categories = self.categories.write().await;
        let mut questions = self.questions.write().await;
        tracing::info!(
            "Imported {} categories with {} questions",
            new_categories.len(),
            new_questions.len()
        );
        *categories = new_categories;
        *questions = new_questions;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QuestionSource;

    fn seed() -> CatalogSnapshot {
        serde_json::from_str(
            r#"{
                "categories": [
                    {
                        "name": "Would you rather",
                        "description": "Pick one",
                        "questions": [
                            { "text": "Would you rather fly or be invisible?" },
                            { "text": "- Would you rather sing or dance?" },
                            { "text": "" }
                        ]
                    },
                    { "name": "Deep questions", "questions": [{ "id": "q1", "text": "What do you fear?" }] }
                ]
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_import_seed() {
        let store = CatalogStore::new();
        store.import_snapshot(seed()).await.unwrap();

        let categories = store.fetch_categories().await.unwrap();
        assert_eq!(categories.len(), 2);

        let questions = store.fetch_questions("Would you rather").await.unwrap();
        let texts: Vec<_> = questions.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Would you rather fly or be invisible?",
                "Would you rather sing or dance?"
            ]
        );

        let deep = store.fetch_questions("Deep questions").await.unwrap();
        assert_eq!(deep[0].id, "q1");
    }

    #[tokio::test]
    async fn test_export_then_import_preserves_catalog() {
        let store = CatalogStore::new();
        store.import_snapshot(seed()).await.unwrap();
        let exported = store.export_snapshot().await;
        assert!(exported.exported_at.is_some());

        let restored = CatalogStore::new();
        restored.import_snapshot(exported).await.unwrap();
        assert_eq!(
            restored.fetch_categories().await.unwrap(),
            store.fetch_categories().await.unwrap()
        );
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut snapshot = seed();
        snapshot.categories[1].name = "Would you rather".to_string();
        let err = snapshot.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate category name"));

        let mut snapshot = seed();
        snapshot.categories[0].id = Some("q1".to_string());
        let err = snapshot.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate id"));
    }

    #[test]
    fn test_validate_rejects_newer_schema() {
        let mut snapshot = seed();
        snapshot.schema_version = CATALOG_SCHEMA_VERSION + 1;
        assert!(snapshot.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, serde_json::to_string(&seed()).unwrap()).unwrap();

        let snapshot = CatalogSnapshot::load(&path).await.unwrap();
        assert_eq!(snapshot.categories.len(), 2);

        let missing = CatalogSnapshot::load(&dir.path().join("missing.json")).await;
        assert!(matches!(missing, Err(CatalogError::Unavailable(_))));
    }
}
