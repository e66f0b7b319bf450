use std::collections::BTreeMap;

use axum::{
    extract::{Form, Json, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::entities::{
    product_image, product_variant, product_variant_price, variant, ProductModel,
};
use crate::handlers::common::{created_response, map_service_error, success_response};
use crate::services::catalog::{
    CascadeInput, CascadeReport, CascadeResult, ListedProduct, PageInfo, ProductDetail,
    ProductFilter, ProductListParams, ProductListing, VariantPriceRow, VariantSelection,
};
use crate::{errors::ApiError, AppState};

/// Where an empty variant selection is sent back to
pub const PRODUCT_LISTING_PATH: &str = "/api/v1/products";

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(select_variants))
        .route("/create", get(product_form).post(create_product))
        .route(
            "/:id",
            get(get_product).put(update_product).patch(update_product),
        )
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: i32,
    pub title: String,
    pub sku: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductModel> for ProductResponse {
    fn from(model: ProductModel) -> Self {
        Self {
            id: model.id,
            title: model.title,
            sku: model.sku,
            description: model.description,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// A product's value along one Variant, e.g. "Red" for "Color"
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductVariantResponse {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub active: bool,
    pub variant_id: i32,
    pub product_id: i32,
}

impl From<product_variant::Model> for ProductVariantResponse {
    fn from(model: product_variant::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            active: model.active,
            variant_id: model.variant_id,
            product_id: model.product_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PriceResponse {
    pub id: i32,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    pub stock: i32,
    pub product_variant_id: i32,
    pub product_id: i32,
}

impl From<product_variant_price::Model> for PriceResponse {
    fn from(model: product_variant_price::Model) -> Self {
        Self {
            id: model.id,
            price: model.price,
            stock: model.stock,
            product_variant_id: model.product_variant_id,
            product_id: model.product_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImageResponse {
    pub id: i32,
    pub product_id: i32,
    pub file_path: String,
    pub thumbnail: Option<String>,
}

impl From<product_image::Model> for ImageResponse {
    fn from(model: product_image::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            file_path: model.file_path,
            thumbnail: model.thumbnail,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VariantPriceResponse {
    pub price: PriceResponse,
    pub product_variant: Option<ProductVariantResponse>,
}

impl From<VariantPriceRow> for VariantPriceResponse {
    fn from(row: VariantPriceRow) -> Self {
        Self {
            price: row.price.into(),
            product_variant: row.product_variant.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListedProductResponse {
    #[serde(flatten)]
    pub product: ProductResponse,
    pub prices: Vec<VariantPriceResponse>,
}

impl From<ListedProduct> for ListedProductResponse {
    fn from(listed: ListedProduct) -> Self {
        Self {
            product: listed.product.into(),
            prices: listed.prices.into_iter().map(Into::into).collect(),
        }
    }
}

/// One page of products plus the context a listing page renders with
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ListedProductResponse>,
    pub page: PageInfo,
    /// ProductVariants keyed by Variant id
    pub grouped_variants: BTreeMap<i32, Vec<ProductVariantResponse>>,
    pub filter: ProductFilter,
}

impl From<ProductListing> for ProductListResponse {
    fn from(listing: ProductListing) -> Self {
        Self {
            products: listing.products.into_iter().map(Into::into).collect(),
            page: listing.page,
            grouped_variants: listing
                .grouped_variants
                .into_iter()
                .map(|(variant_id, records)| {
                    (variant_id, records.into_iter().map(Into::into).collect())
                })
                .collect(),
            filter: listing.filter,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductDetailResponse {
    pub product: ProductResponse,
    pub product_variant: Option<ProductVariantResponse>,
    pub price: Option<PriceResponse>,
    pub image: Option<ImageResponse>,
}

impl From<ProductDetail> for ProductDetailResponse {
    fn from(detail: ProductDetail) -> Self {
        Self {
            product: detail.product.into(),
            product_variant: detail.product_variant.map(Into::into),
            price: detail.price.map(Into::into),
            image: detail.image.map(Into::into),
        }
    }
}

/// Outcome of a create or update: what each step did and the resulting product
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CascadeResponse {
    pub report: CascadeReport,
    pub product: ProductDetailResponse,
}

impl From<CascadeResult> for CascadeResponse {
    fn from(result: CascadeResult) -> Self {
        Self {
            report: result.report,
            product: result.detail.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VariantOption {
    pub id: i32,
    pub title: String,
}

impl From<variant::Model> for VariantOption {
    fn from(model: variant::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
        }
    }
}

/// Context for the product creation form
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductFormResponse {
    pub variants: Vec<VariantOption>,
}

/// List products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductListParams),
    responses(
        (status = 200, description = "Products retrieved", body = ProductListResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = ProductFilter::from(&params);
    let listing = state
        .catalog
        .list_products(filter, params.page.as_deref())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductListResponse::from(listing)))
}

/// List products owning any of the submitted variants
///
/// Takes a form of `variant_group_<n>=<variant id>` fields. When no field
/// carries a value the client is redirected to the unfiltered listing.
#[utoipa::path(
    post,
    path = "/api/v1/products",
    params(ProductListParams),
    request_body(
        content = String,
        content_type = "application/x-www-form-urlencoded",
        description = "variant_group_<n>=<variant id> fields"
    ),
    responses(
        (status = 200, description = "Products retrieved", body = ProductListResponse),
        (status = 303, description = "No variant selected")
    ),
    tag = "Products"
)]
pub async fn select_variants(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let selection =
        VariantSelection::from_form(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    if !selection.rejected.is_empty() {
        debug!(rejected = ?selection.rejected, "Ignoring non-numeric variant selections");
    }
    if selection.is_empty() {
        return Ok(Redirect::to(PRODUCT_LISTING_PATH).into_response());
    }

    let listing = state
        .catalog
        .list_by_variant_selection(&selection, params.page.as_deref())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductListResponse::from(listing)))
}

/// Get a product with its variant, price and image
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product retrieved", body = ProductDetailResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .catalog
        .get_product_detail(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductDetailResponse::from(detail)))
}

/// Update a product and upsert its variant, price and image
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    request_body = CascadeInput,
    responses(
        (status = 200, description = "Product updated; see the report for each step", body = CascadeResponse),
        (status = 400, description = "Atomic update rejected", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CascadeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .catalog
        .update_product(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CascadeResponse::from(result)))
}

/// Variants offered when creating a product
#[utoipa::path(
    get,
    path = "/api/v1/products/create",
    responses(
        (status = 200, description = "Active variants", body = ProductFormResponse)
    ),
    tag = "Products"
)]
pub async fn product_form(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let variants = state
        .catalog
        .list_active_variants()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductFormResponse {
        variants: variants.into_iter().map(VariantOption::from).collect(),
    }))
}

/// Create a product along with any supplied variant, price and image
#[utoipa::path(
    post,
    path = "/api/v1/products/create",
    request_body = CascadeInput,
    responses(
        (status = 201, description = "Product created", body = CascadeResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CascadeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .catalog
        .create_product(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(CascadeResponse::from(result)))
}
