use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CatalogError, CatalogResult, QuestionSource};
use crate::llm::{parse_generated_questions, LlmConfig, LlmError, LlmManager};
use crate::sanitize::sanitize_text;
use crate::types::*;

/// Number of existing questions shown to the model as style examples
const GENERATION_EXAMPLES: usize = 5;

/// In-memory category and question storage
#[derive(Clone)]
pub struct CatalogStore {
    pub(super) categories: Arc<RwLock<Vec<Category>>>,
    pub(super) questions: Arc<RwLock<HashMap<QuestionId, Question>>>,
    llm: Option<Arc<LlmManager>>,
    llm_config: LlmConfig,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            categories: Arc::new(RwLock::new(Vec::new())),
            questions: Arc::new(RwLock::new(HashMap::new())),
            llm: None,
            llm_config: LlmConfig::default(),
        }
    }

    /// Enable AI-assisted question generation
    pub fn with_llm(mut self, manager: Arc<LlmManager>, config: LlmConfig) -> Self {
        self.llm = Some(manager);
        self.llm_config = config;
        self
    }

    pub fn can_generate(&self) -> bool {
        self.llm.is_some()
    }

    fn check_name(name: &str) -> CatalogResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::Invalid("Category name cannot be empty".to_string()));
        }
        if name == RANDOM_CATEGORY {
            return Err(CatalogError::Invalid(format!(
                "\"{}\" is reserved for the mixed category",
                RANDOM_CATEGORY
            )));
        }
        Ok(name.to_string())
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn create_category(&self, name: &str, description: &str) -> CatalogResult<Category> {
        let name = Self::check_name(name)?;
        let mut categories = self.categories.write().await;

        if categories.iter().any(|c| c.name == name) {
            return Err(CatalogError::Conflict(format!(
                "Category \"{}\" already exists",
                name
            )));
        }

        let category = Category {
            id: ulid::Ulid::new().to_string(),
            name,
            description: description.trim().to_string(),
            questions: Vec::new(),
        };
        categories.push(category.clone());

        tracing::info!("Created category {} ({})", category.name, category.id);
        Ok(category)
    }

    pub async fn get_category(&self, id: &str) -> CatalogResult<Category> {
        self.categories
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("Category {}", id)))
    }

    pub async fn update_category(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> CatalogResult<Category> {
        let name = name.map(Self::check_name).transpose()?;
        let mut categories = self.categories.write().await;

        if let Some(ref name) = name {
            if categories.iter().any(|c| c.id != id && &c.name == name) {
                return Err(CatalogError::Conflict(format!(
                    "Category \"{}\" already exists",
                    name
                )));
            }
        }

        let category = categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| CatalogError::NotFound(format!("Category {}", id)))?;

        if let Some(name) = name {
            category.name = name;
        }
        if let Some(description) = description {
            category.description = description.trim().to_string();
        }

        tracing::info!("Updated category {}", id);
        Ok(category.clone())
    }

    /// Delete a category together with its questions
    pub async fn delete_category(&self, id: &str) -> CatalogResult<Category> {
        let mut categories = self.categories.write().await;
        let pos = categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| CatalogError::NotFound(format!("Category {}", id)))?;
        let category = categories.remove(pos);

        let mut questions = self.questions.write().await;
        for question_id in &category.questions {
            questions.remove(question_id);
        }

        tracing::info!(
            "Deleted category {} with {} questions",
            category.name,
            category.questions.len()
        );
        Ok(category)
    }

    // =========================================================================
    // Questions
    // =========================================================================

    pub async fn create_question(&self, category_id: &str, text: &str) -> CatalogResult<Question> {
        let text = sanitize_text(text)
            .ok_or_else(|| CatalogError::Invalid("Question text cannot be empty".to_string()))?;

        let mut categories = self.categories.write().await;
        let category = categories
            .iter_mut()
            .find(|c| c.id == category_id)
            .ok_or_else(|| CatalogError::NotFound(format!("Category {}", category_id)))?;

        let question = Question {
            id: ulid::Ulid::new().to_string(),
            text,
            category_id: category.id.clone(),
        };
        category.questions.push(question.id.clone());
        self.questions
            .write()
            .await
            .insert(question.id.clone(), question.clone());

        tracing::debug!("Created question {} in {}", question.id, category.name);
        Ok(question)
    }

    pub async fn get_question(&self, id: &str) -> CatalogResult<Question> {
        self.questions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("Question {}", id)))
    }

    /// Delete a question and unlink it from its category
    pub async fn delete_question(&self, id: &str) -> CatalogResult<Question> {
        let mut categories = self.categories.write().await;
        let question = self
            .questions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| CatalogError::NotFound(format!("Question {}", id)))?;

        if let Some(category) = categories.iter_mut().find(|c| c.id == question.category_id) {
            category.questions.retain(|q| q != id);
        }

        tracing::info!("Deleted question {}", id);
        Ok(question)
    }

    pub async fn update_question_text(&self, id: &str, text: &str) -> CatalogResult<Question> {
        let text = sanitize_text(text)
            .ok_or_else(|| CatalogError::Invalid("Question text cannot be empty".to_string()))?;

        let mut questions = self.questions.write().await;
        let question = questions
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound(format!("Question {}", id)))?;
        question.text = text;

        tracing::info!("Updated question {}", id);
        Ok(question.clone())
    }

    /// Questions of a category in display order
    async fn questions_of(&self, category: &Category) -> Vec<Question> {
        let questions = self.questions.read().await;
        category
            .questions
            .iter()
            .filter_map(|id| questions.get(id).cloned())
            .collect()
    }

    async fn find_by_name(&self, name: &str) -> CatalogResult<Category> {
        self.categories
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("Category \"{}\"", name)))
    }

    // =========================================================================
    // AI-assisted generation
    // =========================================================================

    /// Ask the text-generation service for `count` new questions in the style of
    /// a few existing ones and append them to the category.
    pub async fn generate_questions(
        &self,
        category_id: &str,
        count: u32,
    ) -> CatalogResult<Vec<Question>> {
        if count == 0 {
            return Err(CatalogError::Invalid(
                "Number of new questions must be at least 1".to_string(),
            ));
        }
        let manager = self.llm.clone().ok_or_else(|| {
            LlmError::ConfigError("No LLM providers configured".to_string())
        })?;

        let category = self.get_category(category_id).await?;
        let existing: Vec<String> = self
            .questions_of(&category)
            .await
            .into_iter()
            .map(|q| q.text)
            .collect();

        let examples: Vec<String> = {
            let mut rng = rand::rng();
            existing
                .choose_multiple(&mut rng, GENERATION_EXAMPLES)
                .cloned()
                .collect()
        };

        tracing::info!(
            "Generating {} questions for {} from {} examples",
            count,
            category.name,
            examples.len()
        );

        let request = self
            .llm_config
            .question_request(&category.name, &examples, count);
        let response = manager.generate_first(request).await?;

        let texts = parse_generated_questions(&response.text);
        if texts.is_empty() {
            return Err(LlmError::ParseError("No questions in generated text".to_string()).into());
        }

        let mut created = Vec::new();
        for text in texts.into_iter().take(count as usize) {
            created.push(self.create_question(category_id, &text).await?);
        }

        tracing::info!("Saved {} generated questions in {}", created.len(), category.name);
        Ok(created)
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuestionSource for CatalogStore {
    async fn fetch_categories(&self) -> CatalogResult<Vec<Category>> {
        Ok(self.categories.read().await.clone())
    }

    async fn fetch_questions(&self, category_name: &str) -> CatalogResult<Vec<Question>> {
        let category = self.find_by_name(category_name).await?;
        Ok(self.questions_of(&category).await)
    }

    async fn sanitize_category(&self, category_name: &str) -> CatalogResult<Vec<Question>> {
        let mut categories = self.categories.write().await;
        let category = categories
            .iter_mut()
            .find(|c| c.name == category_name)
            .ok_or_else(|| CatalogError::NotFound(format!("Category \"{}\"", category_name)))?;

        let mut questions = self.questions.write().await;
        let mut kept = Vec::new();
        let mut removed = 0;
        let mut cleaned = 0;

        for id in &category.questions {
            let Some(question) = questions.get_mut(id) else {
                continue;
            };
            match sanitize_text(&question.text) {
                Some(text) => {
                    if text != question.text {
                        question.text = text;
                        cleaned += 1;
                    }
                    kept.push(question.clone());
                }
                None => {
                    questions.remove(id);
                    removed += 1;
                }
            }
        }
        category.questions = kept.iter().map(|q| q.id.clone()).collect();

        tracing::info!(
            "Sanitized {}: {} cleaned, {} removed, {} remaining",
            category_name,
            cleaned,
            removed,
            kept.len()
        );
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateRequest, GenerateResponse, LlmProvider, LlmResult, ResponseMetadata};
    use std::sync::Mutex;

    struct ScriptedProvider {
        reply: String,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
            self.prompts.lock().unwrap().push(request.prompt);
            Ok(GenerateResponse {
                text: self.reply.clone(),
                metadata: ResponseMetadata {
                    provider: "scripted".to_string(),
                    model: "test".to_string(),
                    tokens_used: None,
                    latency_ms: 0,
                },
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Insert a question bypassing sanitization, like legacy data would
    async fn insert_raw(store: &CatalogStore, category_id: &str, text: &str) -> QuestionId {
        let question = Question {
            id: ulid::Ulid::new().to_string(),
            text: text.to_string(),
            category_id: category_id.to_string(),
        };
        let mut categories = store.categories.write().await;
        let category = categories.iter_mut().find(|c| c.id == category_id).unwrap();
        category.questions.push(question.id.clone());
        store
            .questions
            .write()
            .await
            .insert(question.id.clone(), question.clone());
        question.id
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let store = CatalogStore::new();
        let category = store
            .create_category("Would you rather", "Pick one")
            .await
            .unwrap();
        store.create_question(&category.id, "A").await.unwrap();
        store.create_question(&category.id, "B").await.unwrap();

        let categories = store.fetch_categories().await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].questions.len(), 2);

        let questions = store.fetch_questions("Would you rather").await.unwrap();
        let texts: Vec<_> = questions.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B"]);
        assert!(questions.iter().all(|q| q.category_id == category.id));
    }

    #[tokio::test]
    async fn test_fetch_unknown_category() {
        let store = CatalogStore::new();
        let result = store.fetch_questions("Nope").await;
        assert!(matches!(result, Err(CatalogError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_category_names_unique_and_valid() {
        let store = CatalogStore::new();
        store.create_category("Fun", "").await.unwrap();

        assert!(matches!(
            store.create_category("Fun", "again").await,
            Err(CatalogError::Conflict(_))
        ));
        assert!(matches!(
            store.create_category("  ", "").await,
            Err(CatalogError::Invalid(_))
        ));
        assert!(matches!(
            store.create_category("Random", "").await,
            Err(CatalogError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_update_category() {
        let store = CatalogStore::new();
        let fun = store.create_category("Fun", "").await.unwrap();
        store.create_category("Deep", "").await.unwrap();

        let updated = store
            .update_category(&fun.id, Some("Silly"), Some("Lighthearted"))
            .await
            .unwrap();
        assert_eq!(updated.name, "Silly");
        assert_eq!(updated.description, "Lighthearted");

        // Renaming onto another category's name conflicts
        assert!(matches!(
            store.update_category(&fun.id, Some("Deep"), None).await,
            Err(CatalogError::Conflict(_))
        ));
        // Keeping its own name is fine
        assert!(store
            .update_category(&fun.id, Some("Silly"), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_delete_category_removes_questions() {
        let store = CatalogStore::new();
        let category = store.create_category("Fun", "").await.unwrap();
        let question = store.create_question(&category.id, "Hi?").await.unwrap();

        store.delete_category(&category.id).await.unwrap();
        assert!(store.fetch_categories().await.unwrap().is_empty());
        assert!(matches!(
            store.get_question(&question.id).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_question_crud() {
        let store = CatalogStore::new();
        let category = store.create_category("Fun", "").await.unwrap();

        // Text is cleaned on the way in
        let question = store
            .create_question(&category.id, "- Question 1: Tea or coffee?")
            .await
            .unwrap();
        assert_eq!(question.text, "Tea or coffee?");

        assert!(matches!(
            store.create_question(&category.id, "   ").await,
            Err(CatalogError::Invalid(_))
        ));
        assert!(matches!(
            store.create_question("missing", "Hi?").await,
            Err(CatalogError::NotFound(_))
        ));

        let updated = store
            .update_question_text(&question.id, "Cats or dogs?")
            .await
            .unwrap();
        assert_eq!(updated.text, "Cats or dogs?");
        assert!(store.update_question_text(&question.id, "").await.is_err());

        store.delete_question(&question.id).await.unwrap();
        assert!(store.fetch_questions("Fun").await.unwrap().is_empty());
        assert!(store.get_category(&category.id).await.unwrap().questions.is_empty());
    }

    #[tokio::test]
    async fn test_sanitize_category() {
        let store = CatalogStore::new();
        let category = store.create_category("Fun questions", "").await.unwrap();
        insert_raw(&store, &category.id, "- What is your favorite song?").await;
        insert_raw(&store, &category.id, "Question 3: What is your best trait?").await;
        let empty_id = insert_raw(&store, &category.id, "").await;
        insert_raw(&store, &category.id, "Already clean?").await;

        let sanitized = store.sanitize_category("Fun questions").await.unwrap();
        let texts: Vec<_> = sanitized.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "What is your favorite song?",
                "What is your best trait?",
                "Already clean?"
            ]
        );

        // The empty question is gone for good
        assert!(store.get_question(&empty_id).await.is_err());
        assert_eq!(store.fetch_questions("Fun questions").await.unwrap(), sanitized);
    }

    #[tokio::test]
    async fn test_generate_questions() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let manager = LlmManager::new(vec![Box::new(ScriptedProvider {
            reply: "- Would you rather ski or surf?\n- Question 2: Would you rather read or write?\n\n- Would you rather run or walk?".to_string(),
            prompts: prompts.clone(),
        })]);
        let store = CatalogStore::new().with_llm(Arc::new(manager), LlmConfig::default());

        let category = store.create_category("Would you rather", "").await.unwrap();
        store
            .create_question(&category.id, "Would you rather be rich or famous?")
            .await
            .unwrap();

        let created = store.generate_questions(&category.id, 2).await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].text, "Would you rather ski or surf?");
        assert_eq!(created[1].text, "Would you rather read or write?");

        let all = store.fetch_questions("Would you rather").await.unwrap();
        assert_eq!(all.len(), 3);

        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains("- Would you rather be rich or famous?"));
    }

    #[tokio::test]
    async fn test_generate_without_llm() {
        let store = CatalogStore::new();
        let category = store.create_category("Fun", "").await.unwrap();
        let result = store.generate_questions(&category.id, 3).await;
        assert!(matches!(
            result,
            Err(CatalogError::Generation(LlmError::ConfigError(_)))
        ));
    }

    #[tokio::test]
    async fn test_generate_zero_rejected() {
        let store = CatalogStore::new();
        let category = store.create_category("Fun", "").await.unwrap();
        assert!(matches!(
            store.generate_questions(&category.id, 0).await,
            Err(CatalogError::Invalid(_))
        ));
    }
}
