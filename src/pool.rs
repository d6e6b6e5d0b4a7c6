//! Question pool construction: load a category's questions (cache first),
//! shuffle, and cut down to the requested size.

use chrono::Duration;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use std::sync::Arc;

use crate::cache::{questions_key, LocalCache, CATEGORIES_KEY};
use crate::catalog::{CatalogError, CatalogResult, QuestionSource};
use crate::types::*;

/// Questions drawn from each category for an unlimited "Random" game
pub const RANDOM_SAMPLE_PER_CATEGORY: usize = 15;

/// Builds the ordered question queue for a game
#[derive(Clone)]
pub struct PoolBuilder {
    source: Arc<dyn QuestionSource>,
    cache: LocalCache,
    category_ttl: Duration,
}

impl PoolBuilder {
    pub fn new(source: Arc<dyn QuestionSource>, cache: LocalCache, category_ttl: Duration) -> Self {
        Self {
            source,
            cache,
            category_ttl,
        }
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// All categories, served from cache until the TTL runs out
    pub async fn categories(&self, force_refresh: bool) -> CatalogResult<Vec<Category>> {
        if !force_refresh {
            if let Some(categories) = self.cache.get::<Vec<Category>>(CATEGORIES_KEY) {
                if !categories.is_empty() {
                    return Ok(categories);
                }
            }
        }

        let categories = self.source.fetch_categories().await?;
        tracing::debug!("Fetched {} categories", categories.len());
        self.cache
            .put(CATEGORIES_KEY, &categories, Some(self.category_ttl));
        Ok(categories)
    }

    /// Look up a real category by name, refetching once if the cached list
    /// doesn't know it yet
    pub async fn find_category(&self, name: &str) -> CatalogResult<Category> {
        if let Some(category) = self
            .categories(false)
            .await?
            .into_iter()
            .find(|c| c.name == name)
        {
            return Ok(category);
        }

        self.categories(true)
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CatalogError::NotFound(format!("Category \"{}\"", name)))
    }

    /// Playable questions of one category. Cached lists stay valid until a
    /// forced refresh; an empty cached list counts as a miss.
    pub async fn questions_for(
        &self,
        category: &Category,
        force_refresh: bool,
    ) -> CatalogResult<Vec<Question>> {
        let key = questions_key(&category.id);

        if !force_refresh {
            if let Some(questions) = self.cache.get::<Vec<Question>>(&key) {
                if !questions.is_empty() {
                    return Ok(questions);
                }
            }
        }

        let fetched = self.source.fetch_questions(&category.name).await?;
        let total = fetched.len();
        let questions: Vec<Question> = fetched.into_iter().filter(Question::is_playable).collect();
        if questions.len() < total {
            tracing::warn!(
                "Dropped {} unplayable questions from {}",
                total - questions.len(),
                category.name
            );
        }

        self.cache.put(&key, &questions, None);
        Ok(questions)
    }

    /// Produce the ordered pool for a selection. `limit` is the preset count,
    /// `None` for an unlimited game.
    pub async fn build(
        &self,
        selection: &CategorySelection,
        limit: Option<usize>,
    ) -> CatalogResult<Vec<Question>> {
        match selection {
            CategorySelection::Named(category) => {
                let questions = self.questions_for(category, false).await?;
                let pool = draw_pool(questions, limit, &mut rand::rng());
                tracing::debug!("Built pool of {} from {}", pool.len(), category.name);
                Ok(pool)
            }
            CategorySelection::Random => {
                let categories: Vec<Category> = self
                    .categories(false)
                    .await?
                    .into_iter()
                    .filter(|c| !c.is_random())
                    .collect();

                let mut per_category = Vec::with_capacity(categories.len());
                for category in &categories {
                    per_category.push(self.questions_for(category, false).await?);
                }

                let pool = draw_random_pool(per_category, limit, &mut rand::rng());
                tracing::debug!(
                    "Built random pool of {} from {} categories",
                    pool.len(),
                    categories.len()
                );
                Ok(pool)
            }
        }
    }

    /// Sanitize a category at the source and replace the cached copy
    pub async fn sanitize_category(&self, category: &Category) -> CatalogResult<Vec<Question>> {
        let cleaned = self.source.sanitize_category(&category.name).await?;
        self.cache.put(&questions_key(&category.id), &cleaned, None);
        Ok(cleaned)
    }

    pub fn invalidate_categories(&self) {
        self.cache.remove(CATEGORIES_KEY);
    }

    pub fn invalidate_questions(&self, category_id: &str) {
        self.cache.remove(&questions_key(category_id));
    }
}

/// Shuffle one category's questions and keep at most `limit`
pub fn draw_pool<R: Rng + ?Sized>(
    mut questions: Vec<Question>,
    limit: Option<usize>,
    rng: &mut R,
) -> Vec<Question> {
    questions.shuffle(rng);
    if let Some(limit) = limit {
        questions.truncate(limit);
    }
    questions
}

/// Per-category draw size for a "Random" game
pub fn random_quota(limit: Option<usize>, category_count: usize) -> usize {
    match limit {
        Some(limit) if category_count > 0 => (limit / category_count).max(1),
        Some(_) => 0,
        None => RANDOM_SAMPLE_PER_CATEGORY,
    }
}

/// Draw a quota from every category without replacement, mix, and keep at most `limit`
pub fn draw_random_pool<R: Rng + ?Sized>(
    per_category: Vec<Vec<Question>>,
    limit: Option<usize>,
    rng: &mut R,
) -> Vec<Question> {
    let quota = random_quota(limit, per_category.len());

    let mut pool: Vec<Question> = Vec::new();
    for questions in &per_category {
        pool.extend(questions.choose_multiple(rng, quota).cloned());
    }

    pool.shuffle(rng);
    if let Some(limit) = limit {
        pool.truncate(limit);
    }
    pool
}
