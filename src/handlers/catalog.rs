//! Food and drink CRUD routes.
//!
//! Create and update take multipart forms; an image part (`imageFile`) is
//! stored through the media layer and referenced by its public path.
//! Replacing or deleting a record removes its previous image best-effort.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use garde::Validate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::form::MultipartForm;
use crate::catalog::{Drink, DrinkPatch, Food, FoodFilter, FoodPatch};
use crate::errors::ApiError;
use crate::media::{delete_image_ref, save_object};
use crate::AppState;

/// Multipart part carrying a catalog image.
const IMAGE_FIELD: &str = "imageFile";

/// `GET /api/foods` filters.
#[derive(Debug, Default, Deserialize)]
pub struct FoodQuery {
    pub state: Option<String>,
    pub lga: Option<String>,
    /// Comma-separated category names.
    pub category: Option<String>,
}

impl FoodQuery {
    fn into_filter(self) -> FoodFilter {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        FoodFilter {
            state: non_empty(self.state),
            lga: non_empty(self.lga),
            categories: self
                .category
                .map(|c| {
                    c.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            popular_only: false,
        }
    }
}

fn validation_error(report: garde::Report) -> ApiError {
    ApiError::bad_request(report.to_string().trim().to_string())
}

fn food_patch(form: &MultipartForm) -> Result<FoodPatch, ApiError> {
    let bulk_initial_qty = match form.number("bulkInitialQty")? {
        Some(n) if n < 1.0 => {
            return Err(ApiError::bad_request("bulkInitialQty must be at least 1"));
        }
        Some(n) => Some(n.min(f64::from(u32::MAX)) as u32),
        None => None,
    };
    Ok(FoodPatch {
        name: form.text("name"),
        description: form.text("description"),
        price: form.number("price")?,
        category: form.text("category"),
        is_available: form.bool("isAvailable"),
        is_popular: form.bool("isPopular"),
        image: None,
        state: form.text("state"),
        lgas: form.list("lgas"),
        is_bulk: form.bool("isBulk"),
        bulk_initial_qty,
    })
}

fn drink_patch(form: &MultipartForm) -> Result<DrinkPatch, ApiError> {
    Ok(DrinkPatch {
        name: form.text("name"),
        price: form.number("price")?,
        image: None,
    })
}

/// Store the form's image part, if any, and return its public path.
async fn store_image(
    state: &AppState,
    form: &mut MultipartForm,
    prefix: &str,
) -> Result<Option<String>, ApiError> {
    let Some(file) = form.take_file(IMAGE_FIELD) else {
        return Ok(None);
    };
    let saved = save_object(
        &state.storage,
        file.data,
        file.filename.as_deref(),
        file.content_type.as_deref(),
        prefix,
    )
    .await?;
    Ok(Some(saved.public_path))
}

// -- Foods -------------------------------------------------------------------

/// `GET /api/foods` -- list foods, newest first.
#[utoipa::path(
    get,
    path = "/api/foods",
    tag = "Foods",
    operation_id = "ListFoods",
    params(
        ("state" = Option<String>, Query, description = "Only foods sold in this state"),
        ("lga" = Option<String>, Query, description = "Only foods sold in this LGA (needs state)"),
        ("category" = Option<String>, Query, description = "Comma-separated categories"),
    ),
    responses((status = 200, description = "Foods"))
)]
pub async fn list_foods(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FoodQuery>,
) -> Result<Json<Vec<Food>>, ApiError> {
    Ok(Json(state.catalog.list_foods(query.into_filter()).await?))
}

/// `GET /api/foods/popular`
#[utoipa::path(
    get,
    path = "/api/foods/popular",
    tag = "Foods",
    operation_id = "ListPopularFoods",
    responses((status = 200, description = "Popular foods"))
)]
pub async fn list_popular_foods(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Food>>, ApiError> {
    let filter = FoodFilter {
        popular_only: true,
        ..FoodFilter::default()
    };
    Ok(Json(state.catalog.list_foods(filter).await?))
}

/// `GET /api/foods/all`
#[utoipa::path(
    get,
    path = "/api/foods/all",
    tag = "Foods",
    operation_id = "ListAllFoods",
    responses((status = 200, description = "Every food"))
)]
pub async fn list_all_foods(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Food>>, ApiError> {
    Ok(Json(state.catalog.list_foods(FoodFilter::default()).await?))
}

/// `GET /api/foods/{id}`
#[utoipa::path(
    get,
    path = "/api/foods/{id}",
    tag = "Foods",
    operation_id = "GetFood",
    params(("id" = String, Path, description = "Food id")),
    responses(
        (status = 200, description = "Food"),
        (status = 404, description = "Food not found")
    )
)]
pub async fn get_food(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Food>, ApiError> {
    state
        .catalog
        .get_food(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Food not found"))
}

/// `POST /api/foods` -- multipart create.
#[utoipa::path(
    post,
    path = "/api/foods",
    tag = "Foods",
    operation_id = "CreateFood",
    responses(
        (status = 201, description = "Food created"),
        (status = 400, description = "Invalid form")
    )
)]
pub async fn create_food(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut form = MultipartForm::read(multipart, state.config.server.max_upload_bytes).await?;
    let patch = food_patch(&form)?;
    patch.validate().map_err(validation_error)?;
    let mut food = Food::create(patch, Utc::now()).map_err(ApiError::bad_request)?;
    food.image = store_image(&state, &mut form, "foods").await?;

    state.catalog.put_food(food.clone()).await?;
    info!("food created: id={} name={}", food.id, food.name);
    Ok((StatusCode::CREATED, Json(food)).into_response())
}

/// `PUT /api/foods/{id}` -- multipart update of the fields present.
#[utoipa::path(
    put,
    path = "/api/foods/{id}",
    tag = "Foods",
    operation_id = "UpdateFood",
    params(("id" = String, Path, description = "Food id")),
    responses(
        (status = 200, description = "Food updated"),
        (status = 400, description = "Invalid form"),
        (status = 404, description = "Food not found")
    )
)]
pub async fn update_food(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Food>, ApiError> {
    let mut form = MultipartForm::read(multipart, state.config.server.max_upload_bytes).await?;
    let mut patch = food_patch(&form)?;
    patch.validate().map_err(validation_error)?;
    let mut food = state
        .catalog
        .get_food(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Food not found"))?;

    patch.image = store_image(&state, &mut form, "foods").await?;
    let replaced = patch.image.as_ref().and(food.image.clone());
    food.apply(patch, Utc::now());
    state.catalog.put_food(food.clone()).await?;
    delete_image_ref(&state.storage, replaced.as_deref()).await;
    Ok(Json(food))
}

/// `DELETE /api/foods/{id}` -- the image is removed best-effort.
#[utoipa::path(
    delete,
    path = "/api/foods/{id}",
    tag = "Foods",
    operation_id = "DeleteFood",
    params(("id" = String, Path, description = "Food id")),
    responses(
        (status = 200, description = "Food deleted"),
        (status = 404, description = "Food not found")
    )
)]
pub async fn delete_food(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let food = state
        .catalog
        .delete_food(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Food not found"))?;
    delete_image_ref(&state.storage, food.image.as_deref()).await;
    info!("food deleted: id={}", food.id);
    Ok(Json(serde_json::json!({ "message": "Food deleted successfully" })))
}

// -- Drinks ------------------------------------------------------------------

/// `GET /api/drinks`
#[utoipa::path(
    get,
    path = "/api/drinks",
    tag = "Drinks",
    operation_id = "ListDrinks",
    responses((status = 200, description = "Drinks"))
)]
pub async fn list_drinks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Drink>>, ApiError> {
    Ok(Json(state.catalog.list_drinks().await?))
}

/// `GET /api/drinks/{id}`
#[utoipa::path(
    get,
    path = "/api/drinks/{id}",
    tag = "Drinks",
    operation_id = "GetDrink",
    params(("id" = String, Path, description = "Drink id")),
    responses(
        (status = 200, description = "Drink"),
        (status = 404, description = "Drink not found")
    )
)]
pub async fn get_drink(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Drink>, ApiError> {
    state
        .catalog
        .get_drink(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Drink not found"))
}

/// `POST /api/drinks`
#[utoipa::path(
    post,
    path = "/api/drinks",
    tag = "Drinks",
    operation_id = "CreateDrink",
    responses(
        (status = 201, description = "Drink created"),
        (status = 400, description = "Invalid form")
    )
)]
pub async fn create_drink(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut form = MultipartForm::read(multipart, state.config.server.max_upload_bytes).await?;
    let patch = drink_patch(&form)?;
    patch.validate().map_err(validation_error)?;
    let mut drink = Drink::create(patch, Utc::now()).map_err(ApiError::bad_request)?;
    drink.image = store_image(&state, &mut form, "drinks").await?;

    state.catalog.put_drink(drink.clone()).await?;
    info!("drink created: id={} name={}", drink.id, drink.name);
    Ok((StatusCode::CREATED, Json(drink)).into_response())
}

/// `PUT /api/drinks/{id}`
#[utoipa::path(
    put,
    path = "/api/drinks/{id}",
    tag = "Drinks",
    operation_id = "UpdateDrink",
    params(("id" = String, Path, description = "Drink id")),
    responses(
        (status = 200, description = "Drink updated"),
        (status = 400, description = "Invalid form"),
        (status = 404, description = "Drink not found")
    )
)]
pub async fn update_drink(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Drink>, ApiError> {
    let mut form = MultipartForm::read(multipart, state.config.server.max_upload_bytes).await?;
    let mut patch = drink_patch(&form)?;
    patch.validate().map_err(validation_error)?;
    let mut drink = state
        .catalog
        .get_drink(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Drink not found"))?;

    patch.image = store_image(&state, &mut form, "drinks").await?;
    let replaced = patch.image.as_ref().and(drink.image.clone());
    drink.apply(patch, Utc::now());
    state.catalog.put_drink(drink.clone()).await?;
    delete_image_ref(&state.storage, replaced.as_deref()).await;
    Ok(Json(drink))
}

/// `DELETE /api/drinks/{id}`
#[utoipa::path(
    delete,
    path = "/api/drinks/{id}",
    tag = "Drinks",
    operation_id = "DeleteDrink",
    params(("id" = String, Path, description = "Drink id")),
    responses(
        (status = 200, description = "Drink deleted"),
        (status = 404, description = "Drink not found")
    )
)]
pub async fn delete_drink(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let drink = state
        .catalog
        .delete_drink(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Drink not found"))?;
    delete_image_ref(&state.storage, drink.image.as_deref()).await;
    info!("drink deleted: id={}", drink.id);
    Ok(Json(serde_json::json!({ "message": "Drink deleted" })))
}
