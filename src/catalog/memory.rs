//! In-memory catalog store.
//!
//! Holds every record in a `tokio::sync::RwLock<HashMap>`; nothing survives
//! a restart.

use std::collections::HashMap;
use tokio::sync::RwLock;

use super::model::{Drink, Food, FoodFilter};
use super::store::{CatalogStore, StoreFuture};

#[derive(Debug, Default)]
struct Inner {
    foods: HashMap<String, Food>,
    drinks: HashMap<String, Drink>,
}

#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    inner: RwLock<Inner>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn list_foods(&self, filter: FoodFilter) -> StoreFuture<'_, Vec<Food>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let mut foods: Vec<Food> = inner
                .foods
                .values()
                .filter(|f| filter.matches(f))
                .cloned()
                .collect();
            foods.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(foods)
        })
    }

    fn get_food(&self, id: &str) -> StoreFuture<'_, Option<Food>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.inner.read().await.foods.get(&id).cloned()) })
    }

    fn put_food(&self, food: Food) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.inner.write().await.foods.insert(food.id.clone(), food);
            Ok(())
        })
    }

    fn delete_food(&self, id: &str) -> StoreFuture<'_, Option<Food>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.inner.write().await.foods.remove(&id)) })
    }

    fn list_drinks(&self) -> StoreFuture<'_, Vec<Drink>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let mut drinks: Vec<Drink> = inner.drinks.values().cloned().collect();
            drinks.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(drinks)
        })
    }

    fn get_drink(&self, id: &str) -> StoreFuture<'_, Option<Drink>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.inner.read().await.drinks.get(&id).cloned()) })
    }

    fn put_drink(&self, drink: Drink) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.inner
                .write()
                .await
                .drinks
                .insert(drink.id.clone(), drink);
            Ok(())
        })
    }

    fn delete_drink(&self, id: &str) -> StoreFuture<'_, Option<Drink>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.inner.write().await.drinks.remove(&id)) })
    }
}
