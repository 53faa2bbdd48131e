//! Axum router construction.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].  Storage must already be initialized
//! when the router starts taking traffic; the readiness guard only exists
//! so a mis-wired startup answers 503 instead of failing deep inside a
//! handler.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, ApiError};
use crate::handlers::{catalog, diag, images, uploads};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Extra body allowance on top of the file limit for multipart framing and
/// text fields.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

// -- OpenAPI document ---------------------------------------------------------

/// OpenAPI documentation for the ricebox HTTP API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ricebox API",
        version = "0.1.0",
        description = "Food catalog backend with object storage and an image proxy"
    ),
    paths(
        // Health and diagnostics
        crate::handlers::diag::healthz,
        crate::handlers::diag::head_object,
        // Uploads and images
        crate::handlers::uploads::upload_file,
        crate::handlers::uploads::get_upload,
        crate::handlers::images::get_image,
        // Foods
        crate::handlers::catalog::list_foods,
        crate::handlers::catalog::list_popular_foods,
        crate::handlers::catalog::list_all_foods,
        crate::handlers::catalog::get_food,
        crate::handlers::catalog::create_food,
        crate::handlers::catalog::update_food,
        crate::handlers::catalog::delete_food,
        // Drinks
        crate::handlers::catalog::list_drinks,
        crate::handlers::catalog::get_drink,
        crate::handlers::catalog::create_drink,
        crate::handlers::catalog::update_drink,
        crate::handlers::catalog::delete_drink,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Diagnostics", description = "Storage diagnostics"),
        (name = "Uploads", description = "File uploads and raw object reads"),
        (name = "Images", description = "On-demand image transforms"),
        (name = "Foods", description = "Food catalog"),
        (name = "Drinks", description = "Drink catalog"),
    )
)]
struct ApiDoc;

/// `GET /openapi.json`
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state
        .config
        .server
        .max_upload_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    let mut router = Router::new()
        .route("/", get(diag::welcome))
        .route("/healthz", get(diag::healthz))
        .route("/openapi.json", get(openapi_json))
        // Diagnostics
        .route("/__diag/ping", get(diag::ping))
        .route("/__diag/time", get(diag::time))
        .route("/__diag/version", get(diag::version))
        .route("/__diag/gcs/head", get(diag::head_object))
        .route("/__diag/upload", axum::routing::post(diag::diag_upload))
        .route("/__diag/multipart", axum::routing::post(diag::echo_multipart))
        // Uploads and the read paths (wildcard key captures slashes)
        .route("/api/upload", axum::routing::post(uploads::upload_file))
        .route("/uploads/*key", get(uploads::get_upload))
        .route("/img/", get(images::missing_image_key))
        .route("/img/*key", get(images::get_image))
        // Foods
        .route(
            "/api/foods",
            get(catalog::list_foods).post(catalog::create_food),
        )
        .route("/api/foods/popular", get(catalog::list_popular_foods))
        .route("/api/foods/all", get(catalog::list_all_foods))
        .route(
            "/api/foods/:id",
            get(catalog::get_food)
                .put(catalog::update_food)
                .delete(catalog::delete_food),
        )
        // Drinks
        .route(
            "/api/drinks",
            get(catalog::list_drinks).post(catalog::create_drink),
        )
        .route(
            "/api/drinks/:id",
            get(catalog::get_drink)
                .put(catalog::update_drink)
                .delete(catalog::delete_drink),
        );

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Application state shared across all handlers.
        .with_state(state.clone())
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn_with_state(state, readiness_guard))
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
}

// -- Common headers middleware -----------------------------------------------

/// Adds to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `ricebox`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("ricebox"));

    response
}

// -- Readiness guard ---------------------------------------------------------

/// Paths answered even when storage is not ready.
const READINESS_SKIP_PATHS: &[&str] = &[
    "/",
    "/healthz",
    "/metrics",
    "/openapi.json",
    "/__diag/ping",
    "/__diag/time",
];

async fn readiness_guard(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if state.storage.is_initialized() || READINESS_SKIP_PATHS.contains(&path) {
        return next.run(req).await;
    }
    ApiError::StorageNotReady.into_response()
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalogStore;
    use crate::config::{Config, StorageConfig};
    use crate::storage::{MemoryBackend, StorageContext, DEFAULT_CACHE_CONTROL};
    use axum::body::Body;
    use axum::http::{header, Method, StatusCode};
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ricebox-test-boundary";

    struct Harness {
        state: Arc<AppState>,
        backend: Arc<MemoryBackend>,
    }

    impl Harness {
        async fn new() -> Self {
            let backend = Arc::new(MemoryBackend::new());
            let storage = StorageContext::with_backend(backend.clone(), "test-bucket")
                .await
                .unwrap();
            let state = Arc::new(AppState {
                config: Config::default(),
                storage: Arc::new(storage),
                catalog: Arc::new(MemoryCatalogStore::new()),
            });
            Self { state, backend }
        }

        async fn send(&self, req: Request<Body>) -> Response {
            app(self.state.clone()).oneshot(req).await.unwrap()
        }

        async fn get(&self, uri: &str) -> Response {
            self.send(Request::get(uri).body(Body::empty()).unwrap())
                .await
        }

        async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) {
            self.state
                .storage
                .put(key, Bytes::from(data), Some(content_type), None)
                .await
                .unwrap();
        }
    }

    async fn body_bytes(resp: Response) -> Vec<u8> {
        resp.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(resp).await).unwrap()
    }

    fn header_str<'a>(resp: &'a Response, name: &str) -> &'a str {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    /// (field name, optional (filename, content type), value)
    type Part<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

    fn multipart_request(method: Method, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, file, value) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file {
                Some((filename, ct)) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {ct}\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(value);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    // -- Health, headers, docs -------------------------------------------------

    #[tokio::test]
    async fn test_healthz_reports_bucket() {
        let h = Harness::new().await;
        let resp = h.get("/healthz").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "server"), "ricebox");
        assert_eq!(header_str(&resp, "x-request-id").len(), 16);
        let json = body_json(resp).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["bucket"], "test-bucket");
    }

    #[tokio::test]
    async fn test_welcome_and_openapi() {
        let h = Harness::new().await;
        let json = body_json(h.get("/").await).await;
        assert_eq!(json["message"], diag::WELCOME);

        let resp = h.get("/openapi.json").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let doc = body_json(resp).await;
        assert!(doc["paths"].get("/img/{key}").is_some());
        assert!(doc["paths"].get("/api/foods/{id}").is_some());
    }

    #[tokio::test]
    async fn test_uninitialized_storage_returns_503() {
        let state = Arc::new(AppState {
            config: Config::default(),
            storage: Arc::new(StorageContext::new(StorageConfig::default())),
            catalog: Arc::new(MemoryCatalogStore::new()),
        });
        let resp = app(state.clone())
            .oneshot(Request::get("/api/foods").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(resp).await["error"], "storage not ready");

        let resp = app(state)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["ok"], false);
        assert!(json["bucket"].is_null());
    }

    // -- Upload and /uploads ---------------------------------------------------

    #[tokio::test]
    async fn test_upload_then_read_back() {
        let h = Harness::new().await;
        let req = multipart_request(
            Method::POST,
            "/api/upload?prefix=/foods/",
            &[("file", Some(("Jollof Rice.PNG", "image/png")), b"fake-png")],
        );
        let resp = h.send(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["contentType"], "image/png");
        assert_eq!(json["size"], 8);
        let key = json["filename"].as_str().unwrap();
        assert!(key.starts_with("foods/"));
        assert!(key.ends_with("-jollof-rice.png"));
        let path = json["path"].as_str().unwrap();
        assert_eq!(path, format!("/uploads/{key}"));
        assert_eq!(json["url"], format!("http://localhost:5000{path}"));

        let resp = h.get(path).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "content-type"), "image/png");
        assert_eq!(header_str(&resp, "cache-control"), DEFAULT_CACHE_CONTROL);
        assert_eq!(body_bytes(resp).await, b"fake-png");
    }

    #[tokio::test]
    async fn test_upload_prefix_from_form_is_sanitized() {
        let h = Harness::new().await;
        let req = multipart_request(
            Method::POST,
            "/api/upload",
            &[
                ("prefix", None, b"../../secret dir"),
                ("file", Some(("a.txt", "text/plain")), b"hello"),
            ],
        );
        let json = body_json(h.send(req).await).await;
        let key = json["filename"].as_str().unwrap();
        assert!(key.starts_with("secretdir/"), "{key}");
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected() {
        let h = Harness::new().await;
        let req = multipart_request(Method::POST, "/api/upload", &[("note", None, b"x")]);
        let resp = h.send(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "no file");
        assert!(h.backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_uploads_missing_is_404() {
        let h = Harness::new().await;
        let resp = h.get("/uploads/foods/never.jpg").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "not found");
    }

    // -- /img ------------------------------------------------------------------

    #[tokio::test]
    async fn test_img_passthrough_for_non_images() {
        let h = Harness::new().await;
        h.put_object("docs/menu.pdf", b"%PDF-1.4 menu".to_vec(), "application/pdf")
            .await;
        let resp = h.get("/img/docs/menu.pdf?w=100&fmt=webp").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "content-type"), "application/pdf");
        assert_eq!(header_str(&resp, "vary"), "Accept");
        assert_eq!(header_str(&resp, "cache-control"), DEFAULT_CACHE_CONTROL);
        assert_eq!(body_bytes(resp).await, b"%PDF-1.4 menu");
    }

    #[tokio::test]
    async fn test_img_resizes_to_requested_width() {
        let h = Harness::new().await;
        h.put_object("foods/big.png", png_bytes(1000, 500), "image/png")
            .await;
        let resp = h.get("/img/foods/big.png?w=100&fmt=png").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "content-type"), "image/png");
        assert_eq!(header_str(&resp, "vary"), "Accept");
        let out = image::load_from_memory(&body_bytes(resp).await).unwrap();
        assert!(out.width() <= 100);
        assert_eq!(out.dimensions(), (100, 50));
    }

    #[tokio::test]
    async fn test_img_never_upscales() {
        let h = Harness::new().await;
        h.put_object("foods/small.png", png_bytes(40, 20), "image/png")
            .await;
        let resp = h.get("/img/foods/small.png?w=5000&fmt=jpeg&q=80").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "content-type"), "image/jpeg");
        let out = image::load_from_memory(&body_bytes(resp).await).unwrap();
        assert_eq!(out.dimensions(), (40, 20));
    }

    #[tokio::test]
    async fn test_img_negotiates_from_accept() {
        let h = Harness::new().await;
        h.put_object("drinks/zobo.png", png_bytes(20, 20), "image/png")
            .await;
        let req = Request::get("/img/drinks/zobo.png")
            .header(header::ACCEPT, "image/webp,image/*;q=0.8")
            .body(Body::empty())
            .unwrap();
        let resp = h.send(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "content-type"), "image/webp");
        let bytes = body_bytes(resp).await;
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::WebP);
    }

    #[tokio::test]
    async fn test_img_keeps_stored_cache_control() {
        let h = Harness::new().await;
        h.state
            .storage
            .put(
                "foods/fresh.png",
                Bytes::from(png_bytes(8, 8)),
                Some("image/png"),
                Some("public, max-age=60"),
            )
            .await
            .unwrap();
        let resp = h.get("/img/foods/fresh.png?fmt=png").await;
        assert_eq!(header_str(&resp, "cache-control"), "public, max-age=60");
    }

    #[tokio::test]
    async fn test_img_corrupt_source_is_transform_failure() {
        let h = Harness::new().await;
        h.put_object("foods/broken.png", b"not really a png".to_vec(), "image/png")
            .await;
        let resp = h.get("/img/foods/broken.png?w=10").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "transform failed");
    }

    #[tokio::test]
    async fn test_img_missing_and_empty_keys() {
        let h = Harness::new().await;
        assert_eq!(h.get("/img/nope.png").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(h.get("/img/").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.get("/img/..").await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_img_percent_encoded_key() {
        let h = Harness::new().await;
        h.put_object("foods/a b.txt", b"spaced".to_vec(), "text/plain")
            .await;
        let resp = h.get("/img/foods/a%20b.txt").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_bytes(resp).await, b"spaced");
    }

    // -- Diagnostics -----------------------------------------------------------

    #[tokio::test]
    async fn test_diag_head() {
        let h = Harness::new().await;
        h.put_object("foods/x.jpg", b"jpeg".to_vec(), "image/jpeg")
            .await;

        let json = body_json(h.get("/__diag/gcs/head?key=foods/x.jpg").await).await;
        assert_eq!(json["exists"], true);
        assert_eq!(json["meta"]["contentType"], "image/jpeg");
        assert_eq!(json["meta"]["size"], 4);

        let resp = h.get("/__diag/gcs/head?key=foods/y.jpg").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["exists"], false);

        let resp = h.get("/__diag/gcs/head").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_diag_ping_and_upload() {
        let h = Harness::new().await;
        let json = body_json(h.get("/__diag/ping").await).await;
        assert_eq!(json["bucket"], "test-bucket");

        let req = multipart_request(
            Method::POST,
            "/__diag/upload",
            &[("file", Some(("probe.bin", "application/octet-stream")), b"x")],
        );
        let json = body_json(h.send(req).await).await;
        assert_eq!(json["saved"], true);
        assert!(json["filename"].as_str().unwrap().starts_with("diagnostics/"));
    }

    #[tokio::test]
    async fn test_diag_time_reports_clock() {
        let h = Harness::new().await;
        let json = body_json(h.get("/__diag/time").await).await;
        assert!(json["tz"].is_string());
        let now = json["nowISO"].as_str().unwrap();
        let start = json["startOfTodayISO"].as_str().unwrap();
        assert!(now.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(now).is_ok());
        assert!(start <= now, "{start} > {now}");
    }

    #[tokio::test]
    async fn test_diag_multipart_echoes_form() {
        let h = Harness::new().await;
        let req = multipart_request(
            Method::POST,
            "/__diag/multipart",
            &[
                ("name", None, b"Zobo"),
                ("imageFile", Some(("zobo.png", "image/png")), b"1234"),
            ],
        );
        let json = body_json(h.send(req).await).await;
        assert_eq!(json["fields"]["name"], "Zobo");
        assert_eq!(json["file"]["fieldname"], "imageFile");
        assert_eq!(json["file"]["originalname"], "zobo.png");
        assert_eq!(json["file"]["mimetype"], "image/png");
        assert_eq!(json["file"]["size"], 4);
        assert_eq!(json["file"]["hasBuffer"], true);
        assert!(h.backend.is_empty().await);

        let req = multipart_request(Method::POST, "/__diag/multipart", &[("a", None, b"1")]);
        let json = body_json(h.send(req).await).await;
        assert!(json["file"].is_null());
    }

    // -- Catalog ---------------------------------------------------------------

    #[tokio::test]
    async fn test_food_lifecycle_with_image() {
        let h = Harness::new().await;
        let req = multipart_request(
            Method::POST,
            "/api/foods",
            &[
                ("name", None, b"Jollof Rice"),
                ("price", None, b" 2500 "),
                ("isPopular", None, b"true"),
                ("state", None, b"Lagos"),
                ("lgas", None, br#"["Ikeja","Surulere"]"#),
                ("imageFile", Some(("Jollof.JPG", "image/jpeg")), b"jpeg-bytes"),
            ],
        );
        let resp = h.send(req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let food = body_json(resp).await;
        assert_eq!(food["name"], "Jollof Rice");
        assert_eq!(food["price"], 2500.0);
        assert_eq!(food["category"], "Main");
        assert_eq!(food["isPopular"], true);
        assert_eq!(food["lgas"][1], "Surulere");
        let image = food["image"].as_str().unwrap().to_string();
        assert!(image.starts_with("/uploads/foods/"));
        assert!(image.ends_with("-jollof.jpg"));
        let id = food["id"].as_str().unwrap().to_string();

        // Image is served back through /uploads.
        let resp = h.get(&image).await;
        assert_eq!(body_bytes(resp).await, b"jpeg-bytes");

        // Filters.
        let list = body_json(h.get("/api/foods?state=Lagos&lga=Ikeja").await).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        let list = body_json(h.get("/api/foods?state=Abuja").await).await;
        assert!(list.as_array().unwrap().is_empty());
        let list = body_json(h.get("/api/foods/popular").await).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        // Replacing the image removes the old object.
        let req = multipart_request(
            Method::PUT,
            &format!("/api/foods/{id}"),
            &[
                ("price", None, b"3000"),
                ("imageFile", Some(("new.png", "image/png")), b"png-bytes"),
            ],
        );
        let resp = h.send(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let updated = body_json(resp).await;
        assert_eq!(updated["name"], "Jollof Rice");
        assert_eq!(updated["price"], 3000.0);
        assert_ne!(updated["image"], image.as_str());
        assert_eq!(h.get(&image).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(h.backend.len().await, 1);

        // Delete removes the record and its image.
        let req = Request::delete(format!("/api/foods/{id}"))
            .body(Body::empty())
            .unwrap();
        let resp = h.send(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(h.backend.is_empty().await);
        assert_eq!(
            h.get(&format!("/api/foods/{id}")).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_food_validation() {
        let h = Harness::new().await;
        let req = multipart_request(
            Method::POST,
            "/api/foods",
            &[("name", None, b"Rice"), ("price", None, b"-5")],
        );
        assert_eq!(h.send(req).await.status(), StatusCode::BAD_REQUEST);

        let req = multipart_request(Method::POST, "/api/foods", &[("price", None, b"5")]);
        let resp = h.send(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "name is required");

        let req = multipart_request(
            Method::POST,
            "/api/foods",
            &[("name", None, b"Rice"), ("price", None, b"cheap")],
        );
        assert_eq!(h.send(req).await.status(), StatusCode::BAD_REQUEST);
        assert!(h.state.catalog.list_foods(Default::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_food_delete_survives_missing_image() {
        let h = Harness::new().await;
        let mut food = crate::catalog::Food::create(
            crate::catalog::FoodPatch {
                name: Some("Moi Moi".into()),
                price: Some(700.0),
                ..Default::default()
            },
            chrono::Utc::now(),
        )
        .unwrap();
        food.image = Some("/uploads/foods/gone.jpg".into());
        let id = food.id.clone();
        h.state.catalog.put_food(food).await.unwrap();

        let resp = h
            .send(
                Request::delete(format!("/api/foods/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await["message"],
            "Food deleted successfully"
        );
    }

    #[tokio::test]
    async fn test_drink_crud() {
        let h = Harness::new().await;
        let req = multipart_request(
            Method::POST,
            "/api/drinks",
            &[("name", None, b"Zobo"), ("price", None, b"500")],
        );
        let resp = h.send(req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let drink = body_json(resp).await;
        assert!(drink["image"].is_null());
        let id = drink["id"].as_str().unwrap().to_string();

        let req = multipart_request(
            Method::PUT,
            &format!("/api/drinks/{id}"),
            &[("imageFile", Some(("zobo.webp", "image/webp")), b"webp")],
        );
        let updated = body_json(h.send(req).await).await;
        assert_eq!(updated["name"], "Zobo");
        assert!(updated["image"]
            .as_str()
            .unwrap()
            .starts_with("/uploads/drinks/"));

        let list = body_json(h.get("/api/drinks").await).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let resp = h
            .send(
                Request::delete(format!("/api/drinks/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(body_json(resp).await["message"], "Drink deleted");
        assert!(h.backend.is_empty().await);
        assert_eq!(
            h.get("/api/drinks/unknown").await.status(),
            StatusCode::NOT_FOUND
        );
    }
}
