//! Abstract catalog store trait.
//!
//! Catalog backends implement [`CatalogStore`] with manually desugared
//! async methods (pinned boxed futures) so the store can sit behind an
//! `Arc<dyn CatalogStore>` in the application state.

use std::future::Future;
use std::pin::Pin;

use super::model::{Drink, Food, FoodFilter};

/// Boxed future returned by catalog operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

pub trait CatalogStore: Send + Sync + 'static {
    // ── Foods ───────────────────────────────────────────────────────

    /// Foods matching `filter`, newest first.
    fn list_foods(&self, filter: FoodFilter) -> StoreFuture<'_, Vec<Food>>;

    fn get_food(&self, id: &str) -> StoreFuture<'_, Option<Food>>;

    /// Insert or replace a food by id.
    fn put_food(&self, food: Food) -> StoreFuture<'_, ()>;

    /// Remove a food, returning the removed record.
    fn delete_food(&self, id: &str) -> StoreFuture<'_, Option<Food>>;

    // ── Drinks ──────────────────────────────────────────────────────

    /// All drinks, newest first.
    fn list_drinks(&self) -> StoreFuture<'_, Vec<Drink>>;

    fn get_drink(&self, id: &str) -> StoreFuture<'_, Option<Drink>>;

    fn put_drink(&self, drink: Drink) -> StoreFuture<'_, ()>;

    fn delete_drink(&self, id: &str) -> StoreFuture<'_, Option<Drink>>;
}
