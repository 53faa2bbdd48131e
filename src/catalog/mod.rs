//! Food and drink catalog.
//!
//! Records reference their images by public path (`/uploads/{key}`); the
//! catalog never owns the stored bytes.

pub mod memory;
pub mod model;
pub mod store;

pub use memory::MemoryCatalogStore;
pub use model::{Drink, DrinkPatch, Food, FoodFilter, FoodPatch};
pub use store::CatalogStore;
