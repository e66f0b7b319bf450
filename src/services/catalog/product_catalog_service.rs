use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use validator::Validate;

use super::cascade::{
    self, describe_invalid, CascadeInput, CascadePolicy, CascadeReport, CascadeStep, StepReport,
};
use super::filtering::{self, ProductFilter, VariantSelection};
use super::grouping::{self, VariantGroups};
use super::pagination::PageInfo;
use crate::{
    config::AppConfig,
    db::observe,
    entities::{
        product, product_image, product_variant, product_variant_price, variant, Product,
        ProductImage, ProductModel, ProductVariant, ProductVariantPrice,
    },
    errors::ServiceError,
};

/// A price row of a listed product together with its ProductVariant
#[derive(Debug, Clone, PartialEq)]
pub struct VariantPriceRow {
    pub price: product_variant_price::Model,
    pub product_variant: Option<product_variant::Model>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListedProduct {
    pub product: ProductModel,
    pub prices: Vec<VariantPriceRow>,
}

/// One page of a catalog listing
#[derive(Debug, Clone)]
pub struct ProductListing {
    pub products: Vec<ListedProduct>,
    pub page: PageInfo,
    /// Every ProductVariant grouped by Variant; empty for selection listings
    pub grouped_variants: VariantGroups,
    pub filter: ProductFilter,
}

/// A product with the dependent records the cascade maintains
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDetail {
    pub product: ProductModel,
    pub product_variant: Option<product_variant::Model>,
    pub price: Option<product_variant_price::Model>,
    pub image: Option<product_image::Model>,
}

#[derive(Debug, Clone)]
pub struct CascadeResult {
    pub report: CascadeReport,
    pub detail: ProductDetail,
}

enum CascadeTarget {
    Existing(i32),
    New,
}

/// Product catalog service: listings, variant selection and cascading updates
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
    page_size: u64,
    cascade_policy: CascadePolicy,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>, page_size: u64, cascade_policy: CascadePolicy) -> Self {
        Self {
            db,
            page_size: page_size.max(1),
            cascade_policy,
        }
    }

    pub fn from_config(db: Arc<DatabaseConnection>, config: &AppConfig) -> Self {
        Self::new(db, config.catalog_page_size, config.cascade_policy())
    }

    pub fn cascade_policy(&self) -> CascadePolicy {
        self.cascade_policy
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Filtered, paginated listing with every ProductVariant grouped by Variant
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: ProductFilter,
        raw_page: Option<&str>,
    ) -> Result<ProductListing, ServiceError> {
        let query = filter.apply(self.db.get_database_backend(), Product::find());
        let (products, page) = self.paginate(query, raw_page).await?;

        let all_variants = observe(
            "catalog.product_variants",
            ProductVariant::find()
                .order_by_asc(product_variant::Column::Id)
                .all(&*self.db),
        )
        .await?;
        let grouped_variants = grouping::group_by_variant(all_variants);

        let products = self.attach_prices(products).await?;

        info!(
            count = products.len(),
            page = page.page,
            total = page.total,
            "Listed products"
        );
        Ok(ProductListing {
            products,
            page,
            grouped_variants,
            filter,
        })
    }

    /// Products owning a ProductVariant of any selected Variant
    #[instrument(skip(self))]
    pub async fn list_by_variant_selection(
        &self,
        selection: &VariantSelection,
        raw_page: Option<&str>,
    ) -> Result<ProductListing, ServiceError> {
        if selection.is_empty() {
            return Err(ServiceError::InvalidInput(
                "No variant was selected".to_string(),
            ));
        }

        let query = filtering::owners_of_variants(&selection.variant_ids);
        let (products, page) = self.paginate(query, raw_page).await?;
        let products = self.attach_prices(products).await?;

        info!(
            count = products.len(),
            variants = ?selection.variant_ids,
            "Listed products for variant selection"
        );
        Ok(ProductListing {
            products,
            page,
            grouped_variants: BTreeMap::new(),
            filter: ProductFilter::default(),
        })
    }

    async fn paginate(
        &self,
        query: Select<product::Entity>,
        raw_page: Option<&str>,
    ) -> Result<(Vec<ProductModel>, PageInfo), ServiceError> {
        let total = observe("catalog.count_products", query.clone().count(&*self.db)).await?;
        let page = PageInfo::resolve(raw_page, total, self.page_size);

        let products = observe(
            "catalog.page_products",
            query
                .order_by_asc(product::Column::Id)
                .offset(page.offset())
                .limit(page.per_page)
                .all(&*self.db),
        )
        .await?;

        Ok((products, page))
    }

    async fn attach_prices(
        &self,
        products: Vec<ProductModel>,
    ) -> Result<Vec<ListedProduct>, ServiceError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = products.iter().map(|p| p.id).collect();
        let rows = observe(
            "catalog.product_prices",
            ProductVariantPrice::find()
                .filter(product_variant_price::Column::ProductId.is_in(ids))
                .order_by_asc(product_variant_price::Column::Id)
                .find_also_related(ProductVariant)
                .all(&*self.db),
        )
        .await?;

        let mut by_product: HashMap<i32, Vec<VariantPriceRow>> = HashMap::new();
        for (price, product_variant) in rows {
            by_product
                .entry(price.product_id)
                .or_default()
                .push(VariantPriceRow {
                    price,
                    product_variant,
                });
        }

        Ok(products
            .into_iter()
            .map(|product| ListedProduct {
                prices: by_product.remove(&product.id).unwrap_or_default(),
                product,
            })
            .collect())
    }

    /// Product with its first ProductVariant, that variant's price, and its image
    #[instrument(skip(self))]
    pub async fn get_product_detail(&self, product_id: i32) -> Result<ProductDetail, ServiceError> {
        let db = &*self.db;
        let product = find_product(db, product_id).await?;

        let product_variant = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::Id)
            .one(db)
            .await?;

        let price = match &product_variant {
            Some(pv) => {
                ProductVariantPrice::find()
                    .filter(product_variant_price::Column::ProductVariantId.eq(pv.id))
                    .order_by_asc(product_variant_price::Column::Id)
                    .one(db)
                    .await?
            }
            None => None,
        };

        let image = ProductImage::find()
            .filter(product_image::Column::ProductId.eq(product_id))
            .order_by_asc(product_image::Column::Id)
            .one(db)
            .await?;

        Ok(ProductDetail {
            product,
            product_variant,
            price,
            image,
        })
    }

    /// Active variants to offer on the product creation form
    #[instrument(skip(self))]
    pub async fn list_active_variants(&self) -> Result<Vec<variant::Model>, ServiceError> {
        cascade::active_variants(&*self.db).await
    }

    /// Updates a product and upserts its ProductVariant, price and image.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: i32,
        input: CascadeInput,
    ) -> Result<CascadeResult, ServiceError> {
        let input = input.normalized();
        let report = self
            .execute_cascade(CascadeTarget::Existing(product_id), &input)
            .await?;
        let detail = self.get_product_detail(report.product_id).await?;

        info!(
            product_id,
            outcome = ?report.outcome,
            "Updated product"
        );
        Ok(CascadeResult { report, detail })
    }

    /// Creates a product, then upserts any supplied dependent records.
    #[instrument(skip(self, input))]
    pub async fn create_product(&self, input: CascadeInput) -> Result<CascadeResult, ServiceError> {
        let input = input.normalized();
        let report = self.execute_cascade(CascadeTarget::New, &input).await?;
        let detail = self.get_product_detail(report.product_id).await?;

        info!(product_id = report.product_id, outcome = ?report.outcome, "Created product");
        Ok(CascadeResult { report, detail })
    }

    async fn execute_cascade(
        &self,
        target: CascadeTarget,
        input: &CascadeInput,
    ) -> Result<CascadeReport, ServiceError> {
        let policy = self.cascade_policy;

        let (product_id, steps) = match policy {
            CascadePolicy::BestEffort => run_cascade(&*self.db, target, input).await?,
            CascadePolicy::Atomic => {
                let txn = self.db.begin().await?;
                let (product_id, steps) = run_cascade(&txn, target, input).await?;

                if steps.iter().any(StepReport::is_invalid) {
                    txn.rollback().await?;
                    counter!("catalog.cascade.rolled_back", 1);
                    let summary = describe_invalid(&steps);
                    warn!(product_id, %summary, "Rolled back atomic cascade");
                    return Err(ServiceError::CascadeAborted(summary));
                }
                txn.commit().await?;
                (product_id, steps)
            }
        };

        let invalid = steps.iter().filter(|s| s.is_invalid()).count() as u64;
        if invalid > 0 {
            counter!("catalog.cascade.invalid_steps", invalid);
            warn!(
                product_id,
                summary = %describe_invalid(&steps),
                "Cascade finished with rejected steps"
            );
        }

        Ok(CascadeReport::new(product_id, policy, steps))
    }
}

async fn find_product<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
) -> Result<ProductModel, ServiceError> {
    Product::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
}

/// Inserts the product row for a new product. Title and SKU are mandatory and
/// the SKU must be unused.
async fn insert_product<C: ConnectionTrait>(
    conn: &C,
    input: &CascadeInput,
) -> Result<ProductModel, ServiceError> {
    let fields = input.product_fields();
    fields.validate()?;

    let (Some(title), Some(sku)) = (fields.title, fields.sku) else {
        return Err(ServiceError::ValidationError(
            "title and sku are required to create a product".to_string(),
        ));
    };

    if cascade::sku_taken(conn, &sku, None).await? {
        return Err(ServiceError::ValidationError(format!(
            "SKU {} already exists",
            sku
        )));
    }

    let product = product::ActiveModel {
        title: Set(title),
        sku: Set(sku),
        description: Set(fields.description),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    Ok(product)
}

async fn run_cascade<C: ConnectionTrait>(
    conn: &C,
    target: CascadeTarget,
    input: &CascadeInput,
) -> Result<(i32, Vec<StepReport>), ServiceError> {
    let (product_report, product) = match target {
        CascadeTarget::Existing(product_id) => {
            let product = find_product(conn, product_id).await?;
            cascade::update_product(conn, product, &input.product_fields()).await?
        }
        CascadeTarget::New => {
            let product = insert_product(conn, input).await?;
            (StepReport::created(CascadeStep::Product, product.id), product)
        }
    };

    let mut steps = vec![product_report];
    steps.extend(cascade::apply_dependents(conn, product.id, input).await?);
    Ok((product.id, steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::cascade::{CascadeOutcome, StepStatus};
    use crate::services::catalog::pagination::PageResolution;
    use rust_decimal_macros::dec;
    use sea_orm::{ConnectOptions, Database};

    async fn setup(policy: CascadePolicy) -> ProductCatalogService {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        ProductCatalogService::new(Arc::new(db), 5, policy)
    }

    async fn insert_variant(service: &ProductCatalogService, title: &str) -> variant::Model {
        variant::ActiveModel {
            title: Set(title.to_string()),
            ..Default::default()
        }
        .insert(&*service.db)
        .await
        .unwrap()
    }

    async fn insert_product(service: &ProductCatalogService, n: usize) -> ProductModel {
        product::ActiveModel {
            title: Set(format!("Product {n}")),
            sku: Set(format!("SKU-{n}")),
            ..Default::default()
        }
        .insert(&*service.db)
        .await
        .unwrap()
    }

    fn full_input(variant_id: i32) -> CascadeInput {
        CascadeInput {
            title: Some("Renamed".into()),
            variant_id: Some(variant_id),
            variant_title: Some("red".into()),
            price: Some(dec!(10.5)),
            stock: Some(4),
            image_file_path: Some("images/red.png".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn second_page_of_seven_products() {
        let service = setup(CascadePolicy::BestEffort).await;
        for n in 0..7 {
            insert_product(&service, n).await;
        }

        let listing = service
            .list_products(ProductFilter::default(), Some("2"))
            .await
            .unwrap();

        assert_eq!(listing.products.len(), 2);
        assert_eq!(listing.page.start_index, 6);
        assert_eq!(listing.page.end_index, 7);
        assert_eq!(listing.page.total, 7);
        assert_eq!(listing.page.resolution, PageResolution::ValidPage);
    }

    #[tokio::test]
    async fn update_creates_missing_dependents_once() {
        let service = setup(CascadePolicy::BestEffort).await;
        let color = insert_variant(&service, "Color").await;
        let product = insert_product(&service, 1).await;

        let first = service
            .update_product(product.id, full_input(color.id))
            .await
            .unwrap();
        let statuses: Vec<StepStatus> = first.report.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Updated,
                StepStatus::Created,
                StepStatus::Created,
                StepStatus::Created
            ]
        );

        let second = service
            .update_product(product.id, full_input(color.id))
            .await
            .unwrap();
        assert!(second
            .report
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Updated));
        assert_eq!(second.detail.product.title, "Renamed");
        assert_eq!(ProductVariant::find().count(&*service.db).await.unwrap(), 1);
        assert_eq!(
            ProductVariantPrice::find().count(&*service.db).await.unwrap(),
            1
        );
        assert_eq!(ProductImage::find().count(&*service.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn atomic_policy_rolls_back_every_step() {
        let service = setup(CascadePolicy::Atomic).await;
        let color = insert_variant(&service, "Color").await;
        let product = insert_product(&service, 1).await;

        let mut input = full_input(color.id);
        input.price = Some(dec!(-3));

        let err = service.update_product(product.id, input).await.unwrap_err();
        assert!(matches!(err, ServiceError::CascadeAborted(_)));

        let stored = service.get_product_detail(product.id).await.unwrap();
        assert_eq!(stored.product.title, "Product 1");
        assert!(stored.product_variant.is_none());
        assert!(stored.image.is_none());
    }

    #[tokio::test]
    async fn best_effort_policy_keeps_valid_steps() {
        let service = setup(CascadePolicy::BestEffort).await;
        let color = insert_variant(&service, "Color").await;
        let product = insert_product(&service, 1).await;

        let mut input = full_input(color.id);
        input.price = Some(dec!(-3));

        let result = service.update_product(product.id, input).await.unwrap();
        assert_eq!(result.report.outcome, CascadeOutcome::Partial);
        assert!(result.report.step(CascadeStep::Price).unwrap().is_invalid());
        assert!(result.detail.product_variant.is_some());
        assert!(result.detail.price.is_none());
        assert!(result.detail.image.is_some());
    }

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let service = setup(CascadePolicy::BestEffort).await;
        let err = service
            .update_product(99, CascadeInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_sku() {
        let service = setup(CascadePolicy::BestEffort).await;
        insert_product(&service, 1).await;

        let err = service
            .create_product(CascadeInput {
                title: Some("Another".into()),
                sku: Some("SKU-1".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn empty_selection_is_rejected_without_querying() {
        let service = setup(CascadePolicy::BestEffort).await;
        let err = service
            .list_by_variant_selection(&VariantSelection::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
