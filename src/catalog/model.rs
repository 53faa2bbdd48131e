//! Catalog records and their update payloads.

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Category applied when none is given.
pub const DEFAULT_CATEGORY: &str = "Main";

/// Default portion count for bulk items.
pub const DEFAULT_BULK_QTY: u32 = 25;

/// Generate a record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A food item on the menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Food {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    pub category: String,
    pub is_available: bool,
    pub is_popular: bool,
    /// `/uploads/{key}` reference to the stored image.
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub lgas: Vec<String>,
    pub is_bulk: bool,
    pub bulk_initial_qty: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial food fields from a create or update form.
#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct FoodPatch {
    #[garde(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[garde(skip)]
    pub description: Option<String>,
    #[garde(range(min = 0.0))]
    pub price: Option<f64>,
    #[garde(skip)]
    pub category: Option<String>,
    #[garde(skip)]
    pub is_available: Option<bool>,
    #[garde(skip)]
    pub is_popular: Option<bool>,
    #[garde(skip)]
    pub image: Option<String>,
    #[garde(skip)]
    pub state: Option<String>,
    #[garde(skip)]
    pub lgas: Option<Vec<String>>,
    #[garde(skip)]
    pub is_bulk: Option<bool>,
    #[garde(range(min = 1))]
    pub bulk_initial_qty: Option<u32>,
}

impl Food {
    /// Build a new record.  `name` and `price` must be present.
    pub fn create(patch: FoodPatch, now: DateTime<Utc>) -> Result<Self, String> {
        let name = patch.name.ok_or("name is required")?;
        let price = patch.price.ok_or("price is required")?;
        Ok(Self {
            id: new_id(),
            name,
            description: patch.description,
            price,
            category: patch
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            is_available: patch.is_available.unwrap_or(true),
            is_popular: patch.is_popular.unwrap_or(false),
            image: patch.image,
            state: patch.state,
            lgas: patch.lgas.unwrap_or_default(),
            is_bulk: patch.is_bulk.unwrap_or(false),
            bulk_initial_qty: patch.bulk_initial_qty.unwrap_or(DEFAULT_BULK_QTY),
            created_at: now,
            updated_at: now,
        })
    }

    /// Overwrite every field present in `patch`.
    pub fn apply(&mut self, patch: FoodPatch, now: DateTime<Utc>) {
        if let Some(v) = patch.name {
            self.name = v;
        }
        if let Some(v) = patch.description {
            self.description = Some(v);
        }
        if let Some(v) = patch.price {
            self.price = v;
        }
        if let Some(v) = patch.category {
            self.category = v;
        }
        if let Some(v) = patch.is_available {
            self.is_available = v;
        }
        if let Some(v) = patch.is_popular {
            self.is_popular = v;
        }
        if let Some(v) = patch.image {
            self.image = Some(v);
        }
        if let Some(v) = patch.state {
            self.state = Some(v);
        }
        if let Some(v) = patch.lgas {
            self.lgas = v;
        }
        if let Some(v) = patch.is_bulk {
            self.is_bulk = v;
        }
        if let Some(v) = patch.bulk_initial_qty {
            self.bulk_initial_qty = v;
        }
        self.updated_at = now;
    }
}

/// A drink on the menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drink {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial drink fields.
#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct DrinkPatch {
    #[garde(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[garde(range(min = 0.0))]
    pub price: Option<f64>,
    #[garde(skip)]
    pub image: Option<String>,
}

impl Drink {
    pub fn create(patch: DrinkPatch, now: DateTime<Utc>) -> Result<Self, String> {
        let name = patch.name.ok_or("name is required")?;
        let price = patch.price.ok_or("price is required")?;
        Ok(Self {
            id: new_id(),
            name,
            price,
            image: patch.image,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, patch: DrinkPatch, now: DateTime<Utc>) {
        if let Some(v) = patch.name {
            self.name = v;
        }
        if let Some(v) = patch.price {
            self.price = v;
        }
        if let Some(v) = patch.image {
            self.image = Some(v);
        }
        self.updated_at = now;
    }
}

/// Query filter for food listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoodFilter {
    pub state: Option<String>,
    /// Only honoured together with `state`.
    pub lga: Option<String>,
    /// Any-of match; empty means every category.
    pub categories: Vec<String>,
    pub popular_only: bool,
}

impl FoodFilter {
    pub fn matches(&self, food: &Food) -> bool {
        if self.popular_only && !food.is_popular {
            return false;
        }
        if let Some(ref state) = self.state {
            if food.state.as_deref() != Some(state.as_str()) {
                return false;
            }
            if let Some(ref lga) = self.lga {
                if !food.lgas.iter().any(|l| l == lga) {
                    return false;
                }
            }
        }
        if !self.categories.is_empty() && !self.categories.iter().any(|c| *c == food.category) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(name: &str, price: f64) -> FoodPatch {
        FoodPatch {
            name: Some(name.to_string()),
            price: Some(price),
            ..FoodPatch::default()
        }
    }

    #[test]
    fn test_food_defaults() {
        let food = Food::create(patch("Jollof", 2500.0), Utc::now()).unwrap();
        assert_eq!(food.category, DEFAULT_CATEGORY);
        assert!(food.is_available);
        assert!(!food.is_popular);
        assert!(!food.is_bulk);
        assert_eq!(food.bulk_initial_qty, DEFAULT_BULK_QTY);
        assert!(food.lgas.is_empty());
        assert_eq!(food.created_at, food.updated_at);
        assert_eq!(food.id.len(), 32);
    }

    #[test]
    fn test_food_requires_name_and_price() {
        let missing_price = FoodPatch {
            name: Some("Rice".into()),
            ..FoodPatch::default()
        };
        assert_eq!(
            Food::create(missing_price, Utc::now()).unwrap_err(),
            "price is required"
        );
        assert!(Food::create(FoodPatch::default(), Utc::now()).is_err());
    }

    #[test]
    fn test_patch_validation() {
        assert!(patch("Rice", 10.0).validate().is_ok());
        assert!(patch("", 10.0).validate().is_err());
        assert!(patch("Rice", -1.0).validate().is_err());
        let zero_qty = FoodPatch {
            bulk_initial_qty: Some(0),
            ..FoodPatch::default()
        };
        assert!(zero_qty.validate().is_err());
        assert!(FoodPatch::default().validate().is_ok());
    }

    #[test]
    fn test_apply_only_present_fields() {
        let mut food = Food::create(patch("Rice", 10.0), Utc::now()).unwrap();
        let created = food.created_at;
        food.apply(
            FoodPatch {
                price: Some(12.5),
                is_popular: Some(true),
                ..FoodPatch::default()
            },
            Utc::now(),
        );
        assert_eq!(food.name, "Rice");
        assert_eq!(food.price, 12.5);
        assert!(food.is_popular);
        assert_eq!(food.created_at, created);
    }

    #[test]
    fn test_food_serializes_camel_case() {
        let food = Food::create(patch("Rice", 10.0), Utc::now()).unwrap();
        let json = serde_json::to_value(&food).unwrap();
        assert_eq!(json["isAvailable"], true);
        assert_eq!(json["bulkInitialQty"], 25);
        assert!(json.get("createdAt").is_some());
        assert!(json["image"].is_null());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_filter() {
        let mut food = Food::create(patch("Rice", 10.0), Utc::now()).unwrap();
        food.state = Some("Lagos".into());
        food.lgas = vec!["Ikeja".into(), "Surulere".into()];

        assert!(FoodFilter::default().matches(&food));
        let by_state = FoodFilter {
            state: Some("Lagos".into()),
            ..FoodFilter::default()
        };
        assert!(by_state.matches(&food));
        let by_lga = FoodFilter {
            state: Some("Lagos".into()),
            lga: Some("Ikeja".into()),
            ..FoodFilter::default()
        };
        assert!(by_lga.matches(&food));
        let wrong_lga = FoodFilter {
            lga: Some("Yaba".into()),
            ..by_lga.clone()
        };
        assert!(!wrong_lga.matches(&food));
        // lga alone is ignored
        let lga_only = FoodFilter {
            lga: Some("Yaba".into()),
            ..FoodFilter::default()
        };
        assert!(lga_only.matches(&food));
        let by_category = FoodFilter {
            categories: vec!["Soup".into(), "Main".into()],
            ..FoodFilter::default()
        };
        assert!(by_category.matches(&food));
        let popular = FoodFilter {
            popular_only: true,
            ..FoodFilter::default()
        };
        assert!(!popular.matches(&food));
    }

    #[test]
    fn test_drink_lifecycle() {
        let mut drink = Drink::create(
            DrinkPatch {
                name: Some("Zobo".into()),
                price: Some(500.0),
                image: None,
            },
            Utc::now(),
        )
        .unwrap();
        drink.apply(
            DrinkPatch {
                image: Some("/uploads/drinks/1-zobo.png".into()),
                ..DrinkPatch::default()
            },
            Utc::now(),
        );
        assert_eq!(drink.name, "Zobo");
        assert_eq!(drink.image.as_deref(), Some("/uploads/drinks/1-zobo.png"));
    }
}
