#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use catalog_api::{
    config::AppConfig,
    db,
    entities::{product, product_image, product_variant, product_variant_price, variant},
    AppState,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use tower::ServiceExt;

/// Helper harness for spinning up the full router backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_policy("best-effort").await
    }

    /// Same as [`TestApp::new`] with an explicit cascade policy.
    pub async fn with_policy(policy: &str) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        cfg.cascade_policy = policy.to_string();
        // A single connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = catalog_api::app(state.clone()).expect("router builds");

        Self { router, state }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    /// Send a request against the router, with an optional JSON body.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None).await
    }

    /// POST an url-encoded form body.
    pub async fn post_form(&self, uri: &str, form: &str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .expect("failed to build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_variant(&self, title: &str) -> variant::Model {
        variant::ActiveModel {
            title: Set(title.to_string()),
            active: Set(true),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed variant")
    }

    pub async fn seed_inactive_variant(&self, title: &str) -> variant::Model {
        variant::ActiveModel {
            title: Set(title.to_string()),
            active: Set(false),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed inactive variant")
    }

    pub async fn seed_product(&self, title: &str, sku: &str) -> product::Model {
        product::ActiveModel {
            title: Set(title.to_string()),
            sku: Set(sku.to_string()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    pub async fn seed_product_created_at(
        &self,
        title: &str,
        sku: &str,
        created_at: DateTime<Utc>,
    ) -> product::Model {
        product::ActiveModel {
            title: Set(title.to_string()),
            sku: Set(sku.to_string()),
            created_at: Set(created_at),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed dated product")
    }

    pub async fn seed_product_variant(
        &self,
        product_id: i32,
        variant_id: i32,
        title: &str,
    ) -> product_variant::Model {
        product_variant::ActiveModel {
            title: Set(title.to_string()),
            active: Set(true),
            variant_id: Set(variant_id),
            product_id: Set(product_id),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed product variant")
    }

    pub async fn seed_price(
        &self,
        product_variant: &product_variant::Model,
        price: Decimal,
        stock: i32,
    ) -> product_variant_price::Model {
        product_variant_price::ActiveModel {
            price: Set(price),
            stock: Set(stock),
            product_variant_id: Set(product_variant.id),
            product_id: Set(product_variant.product_id),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed price")
    }

    pub async fn seed_image(&self, product_id: i32, file_path: &str) -> product_image::Model {
        product_image::ActiveModel {
            product_id: Set(product_id),
            file_path: Set(file_path.to_string()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed image")
    }

    /// Product with one priced ProductVariant of `variant_id`.
    pub async fn seed_priced_product(
        &self,
        title: &str,
        sku: &str,
        variant_id: i32,
        variant_title: &str,
        price: Decimal,
    ) -> product::Model {
        let product = self.seed_product(title, sku).await;
        let pv = self
            .seed_product_variant(product.id, variant_id, variant_title)
            .await;
        self.seed_price(&pv, price, 10).await;
        product
    }
}

/// Reads a response body as JSON.
pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Titles of the products in a listing response.
pub fn listed_titles(listing: &Value) -> Vec<String> {
    listing["products"]
        .as_array()
        .expect("products array")
        .iter()
        .map(|p| p["title"].as_str().unwrap_or_default().to_string())
        .collect()
}
