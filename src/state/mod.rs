use crate::auth::AuthConfig;
use crate::cache::LocalCache;
use crate::catalog::CatalogStore;
use crate::pool::PoolBuilder;
use crate::session::GameController;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogStore,
    pub game: GameController,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(
        catalog: CatalogStore,
        cache: LocalCache,
        category_ttl: chrono::Duration,
        auth: AuthConfig,
    ) -> Self {
        let builder = PoolBuilder::new(Arc::new(catalog.clone()), cache, category_ttl);
        Self {
            catalog,
            game: GameController::new(builder),
            auth: Arc::new(auth),
        }
    }

    /// In-memory everything, auth disabled
    pub fn in_memory(catalog: CatalogStore) -> Self {
        Self::new(
            catalog,
            LocalCache::in_memory(),
            chrono::Duration::hours(24),
            AuthConfig::default(),
        )
    }

    pub fn pool(&self) -> &PoolBuilder {
        self.game.builder()
    }

    /// Drop cached data touched by an admin change to a category
    pub fn invalidate_category(&self, category_id: &str) {
        let pool = self.pool();
        pool.invalidate_categories();
        pool.invalidate_questions(category_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admin_change_visible_after_invalidation() {
        let state = AppState::in_memory(CatalogStore::new());
        let category = state.catalog.create_category("Fun", "").await.unwrap();
        state.catalog.create_question(&category.id, "First?").await.unwrap();

        let cached = state.pool().questions_for(&category, false).await.unwrap();
        assert_eq!(cached.len(), 1);

        state.catalog.create_question(&category.id, "Second?").await.unwrap();
        assert_eq!(
            state.pool().questions_for(&category, false).await.unwrap().len(),
            1
        );

        state.invalidate_category(&category.id);
        assert_eq!(
            state.pool().questions_for(&category, false).await.unwrap().len(),
            2
        );
    }
}
