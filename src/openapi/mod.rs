use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Catalog API",
        version = "1.0.0",
        description = r#"
# Product Catalog API

Browse and maintain a catalog of products, their variants, prices and images.

## Listing

`GET /api/v1/products` accepts `title`, `variant`, `price_from`, `price_to`,
`date` (YYYY-MM-DD) and `page`. Unparsable filter values are ignored and the
page number is clamped into range; `page.resolution` tells which clamp applied.

## Updating

`PUT`/`PATCH /api/v1/products/{id}` updates the product and creates or updates
its variant, price and image in one request. The response carries a report
with one entry per step.

## Error Handling

```json
{
  "error": "Not Found",
  "message": "Not found: Product 42 not found",
  "request_id": "9b7c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::select_variants,
        crate::handlers::products::get_product,
        crate::handlers::products::update_product,
        crate::handlers::products::product_form,
        crate::handlers::products::create_product,

        // Health
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            // Product types
            crate::handlers::products::ProductResponse,
            crate::handlers::products::ProductVariantResponse,
            crate::handlers::products::PriceResponse,
            crate::handlers::products::ImageResponse,
            crate::handlers::products::VariantPriceResponse,
            crate::handlers::products::ListedProductResponse,
            crate::handlers::products::ProductListResponse,
            crate::handlers::products::ProductDetailResponse,
            crate::handlers::products::CascadeResponse,
            crate::handlers::products::VariantOption,
            crate::handlers::products::ProductFormResponse,

            // Catalog types
            crate::services::catalog::CascadeInput,
            crate::services::catalog::CascadeReport,
            crate::services::catalog::CascadePolicy,
            crate::services::catalog::CascadeOutcome,
            crate::services::catalog::CascadeStep,
            crate::services::catalog::StepStatus,
            crate::services::catalog::StepReport,
            crate::services::catalog::PageInfo,
            crate::services::catalog::PageResolution,
            crate::services::catalog::ProductFilter,

            // Health types
            crate::handlers::health::HealthResponse,
            crate::handlers::health::ComponentHealth,
            crate::handlers::health::ComponentStatus,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
