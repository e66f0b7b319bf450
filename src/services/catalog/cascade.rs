//! Cascading update of a product and the records hanging off it.
//!
//! A cascade runs four steps in a fixed order: the product itself, its
//! ProductVariant, that variant's price, and the product image. Every step
//! validates its own slice of the input before writing and reports one
//! [`StepStatus`]. Whether an invalid step aborts the whole cascade is decided
//! by the caller through [`CascadePolicy`].

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::entities::{
    product, product_image, product_variant, product_variant_price, variant, Product,
    ProductImage, ProductVariant, ProductVariantPrice, Variant,
};
use crate::errors::ServiceError;

/// Whether an invalid step rolls back the steps around it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CascadePolicy {
    /// Each step commits on its own; invalid steps are reported and skipped
    #[default]
    BestEffort,
    /// All steps share one transaction that is rolled back if any step is invalid
    Atomic,
}

impl FromStr for CascadePolicy {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            "atomic" => Ok(Self::Atomic),
            other => Err(ServiceError::InvalidInput(format!(
                "unknown cascade policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CascadePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BestEffort => f.write_str("best-effort"),
            Self::Atomic => f.write_str("atomic"),
        }
    }
}

fn validate_non_negative_price(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("price_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Flat field set covering a product and its dependents. Absent fields are
/// left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CascadeInput {
    pub title: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    /// Variant (dimension) the product variant belongs to
    pub variant_id: Option<i32>,
    pub variant_title: Option<String>,
    pub variant_description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub image_file_path: Option<String>,
    pub thumbnail: Option<String>,
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CascadeInput {
    /// Trims text fields and treats blank ones as absent.
    pub fn normalized(self) -> Self {
        Self {
            title: normalize_optional_string(self.title),
            sku: normalize_optional_string(self.sku),
            description: normalize_optional_string(self.description),
            variant_title: normalize_optional_string(self.variant_title),
            variant_description: normalize_optional_string(self.variant_description),
            image_file_path: normalize_optional_string(self.image_file_path),
            thumbnail: normalize_optional_string(self.thumbnail),
            ..self
        }
    }

    pub fn product_fields(&self) -> ProductFields {
        ProductFields {
            title: self.title.clone(),
            sku: self.sku.clone(),
            description: self.description.clone(),
        }
    }

    pub fn variant_fields(&self) -> VariantFields {
        VariantFields {
            variant_id: self.variant_id,
            title: self.variant_title.clone(),
            description: self.variant_description.clone(),
        }
    }

    pub fn price_fields(&self) -> PriceFields {
        PriceFields {
            price: self.price,
            stock: self.stock,
        }
    }

    pub fn image_fields(&self) -> ImageFields {
        ImageFields {
            file_path: self.image_file_path.clone(),
            thumbnail: self.thumbnail.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct ProductFields {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub sku: Option<String>,
    pub description: Option<String>,
}

impl ProductFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.sku.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct VariantFields {
    #[validate(range(min = 1))]
    pub variant_id: Option<i32>,
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
}

impl VariantFields {
    pub fn is_empty(&self) -> bool {
        self.variant_id.is_none() && self.title.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct PriceFields {
    #[validate(custom = "validate_non_negative_price")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
}

impl PriceFields {
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.stock.is_none()
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct ImageFields {
    #[validate(length(min = 1, max = 500))]
    pub file_path: Option<String>,
    #[validate(length(max = 500))]
    pub thumbnail: Option<String>,
}

impl ImageFields {
    pub fn is_empty(&self) -> bool {
        self.file_path.is_none() && self.thumbnail.is_none()
    }
}

/// Flattens validation errors into `field: problem` lines, sorted by field.
pub fn validation_reasons(errors: &ValidationErrors) -> Vec<String> {
    let mut reasons: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| {
                let detail = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                format!("{}: {}", field, detail)
            })
        })
        .collect();
    reasons.sort();
    reasons
}

fn reasons_of<T: Validate>(fields: &T) -> Vec<String> {
    fields
        .validate()
        .err()
        .map(|errors| validation_reasons(&errors))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    Product,
    ProductVariant,
    Price,
    Image,
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Product => "product",
            Self::ProductVariant => "product_variant",
            Self::Price => "price",
            Self::Image => "image",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum StepStatus {
    Created,
    Updated,
    Skipped,
    Invalid,
}

/// Result of one cascade step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StepReport {
    pub step: CascadeStep,
    pub status: StepStatus,
    /// Id of the record created or updated by this step
    pub record_id: Option<i32>,
    /// Why the step was rejected; empty unless `status` is `Invalid`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl StepReport {
    fn new(step: CascadeStep, status: StepStatus, record_id: Option<i32>) -> Self {
        Self {
            step,
            status,
            record_id,
            reasons: Vec::new(),
        }
    }

    pub fn created(step: CascadeStep, record_id: i32) -> Self {
        Self::new(step, StepStatus::Created, Some(record_id))
    }

    pub fn updated(step: CascadeStep, record_id: i32) -> Self {
        Self::new(step, StepStatus::Updated, Some(record_id))
    }

    pub fn skipped(step: CascadeStep) -> Self {
        Self::new(step, StepStatus::Skipped, None)
    }

    pub fn invalid(step: CascadeStep, reasons: Vec<String>) -> Self {
        Self {
            reasons,
            ..Self::new(step, StepStatus::Invalid, None)
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.status == StepStatus::Invalid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum CascadeOutcome {
    /// Every step was applied or had nothing to do
    Complete,
    /// At least one step was rejected
    Partial,
}

/// Aggregated result of a cascade, one entry per step in execution order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CascadeReport {
    pub product_id: i32,
    pub policy: CascadePolicy,
    pub outcome: CascadeOutcome,
    pub steps: Vec<StepReport>,
}

impl CascadeReport {
    pub fn new(product_id: i32, policy: CascadePolicy, steps: Vec<StepReport>) -> Self {
        let outcome = if steps.iter().any(StepReport::is_invalid) {
            CascadeOutcome::Partial
        } else {
            CascadeOutcome::Complete
        };
        Self {
            product_id,
            policy,
            outcome,
            steps,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == CascadeOutcome::Complete
    }

    pub fn step(&self, step: CascadeStep) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }
}

/// One line per invalid step, e.g. `price: price: must not be negative`
pub fn describe_invalid(steps: &[StepReport]) -> String {
    steps
        .iter()
        .filter(|s| s.is_invalid())
        .map(|s| format!("{}: {}", s.step, s.reasons.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) async fn sku_taken<C: ConnectionTrait>(
    conn: &C,
    sku: &str,
    exclude_id: Option<i32>,
) -> Result<bool, ServiceError> {
    let mut query = Product::find().filter(product::Column::Sku.eq(sku));
    if let Some(id) = exclude_id {
        query = query.filter(product::Column::Id.ne(id));
    }
    Ok(query.one(conn).await?.is_some())
}

/// Step 1: partial update of the product row.
pub(crate) async fn update_product<C: ConnectionTrait>(
    conn: &C,
    product: product::Model,
    fields: &ProductFields,
) -> Result<(StepReport, product::Model), ServiceError> {
    if fields.is_empty() {
        return Ok((StepReport::skipped(CascadeStep::Product), product));
    }

    let mut reasons = reasons_of(fields);
    if let Some(sku) = &fields.sku {
        if sku_taken(conn, sku, Some(product.id)).await? {
            reasons.push(format!("sku: {} is already in use", sku));
        }
    }
    if !reasons.is_empty() {
        return Ok((StepReport::invalid(CascadeStep::Product, reasons), product));
    }

    let product_id = product.id;
    let mut active: product::ActiveModel = product.into();
    if let Some(title) = &fields.title {
        active.title = Set(title.clone());
    }
    if let Some(sku) = &fields.sku {
        active.sku = Set(sku.clone());
    }
    if let Some(description) = &fields.description {
        active.description = Set(Some(description.clone()));
    }

    let product = active.update(conn).await?;
    Ok((StepReport::updated(CascadeStep::Product, product_id), product))
}

/// Step 2: update the product's ProductVariant or create one.
///
/// Also returns the ProductVariant the price step should attach to, which is
/// the pre-existing one when this step is skipped or rejected.
pub(crate) async fn upsert_product_variant<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    fields: &VariantFields,
) -> Result<(StepReport, Option<product_variant::Model>), ServiceError> {
    let existing = ProductVariant::find()
        .filter(product_variant::Column::ProductId.eq(product_id))
        .order_by_asc(product_variant::Column::Id)
        .one(conn)
        .await?;

    if fields.is_empty() {
        return Ok((StepReport::skipped(CascadeStep::ProductVariant), existing));
    }

    let mut reasons = reasons_of(fields);
    if let Some(variant_id) = fields.variant_id {
        if Variant::find_by_id(variant_id).one(conn).await?.is_none() {
            reasons.push(format!("variant_id: variant {} does not exist", variant_id));
        }
    }
    if existing.is_none() {
        if fields.title.is_none() {
            reasons.push("variant_title: required to create a product variant".to_string());
        }
        if fields.variant_id.is_none() {
            reasons.push("variant_id: required to create a product variant".to_string());
        }
    }
    if !reasons.is_empty() {
        return Ok((
            StepReport::invalid(CascadeStep::ProductVariant, reasons),
            existing,
        ));
    }

    match (existing, fields.title.clone(), fields.variant_id) {
        (Some(record), title, variant_id) => {
            let record_id = record.id;
            let mut active: product_variant::ActiveModel = record.into();
            if let Some(title) = title {
                active.title = Set(title);
            }
            if let Some(description) = &fields.description {
                active.description = Set(Some(description.clone()));
            }
            if let Some(variant_id) = variant_id {
                active.variant_id = Set(variant_id);
            }
            active.active = Set(true);

            let updated = active.update(conn).await?;
            Ok((
                StepReport::updated(CascadeStep::ProductVariant, record_id),
                Some(updated),
            ))
        }
        (None, Some(title), Some(variant_id)) => {
            let created = product_variant::ActiveModel {
                title: Set(title),
                description: Set(fields.description.clone()),
                active: Set(true),
                variant_id: Set(variant_id),
                product_id: Set(product_id),
                ..Default::default()
            }
            .insert(conn)
            .await?;
            Ok((
                StepReport::created(CascadeStep::ProductVariant, created.id),
                Some(created),
            ))
        }
        (None, _, _) => Ok((
            StepReport::invalid(
                CascadeStep::ProductVariant,
                vec!["variant_title: required to create a product variant".to_string()],
            ),
            None,
        )),
    }
}

/// Step 3: update the price of `product_variant` or create it.
pub(crate) async fn upsert_price<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    product_variant: Option<&product_variant::Model>,
    fields: &PriceFields,
) -> Result<StepReport, ServiceError> {
    if fields.is_empty() {
        return Ok(StepReport::skipped(CascadeStep::Price));
    }

    let mut reasons = reasons_of(fields);
    let Some(product_variant) = product_variant else {
        reasons.push("product_variant: no product variant to attach the price to".to_string());
        return Ok(StepReport::invalid(CascadeStep::Price, reasons));
    };

    let existing = ProductVariantPrice::find()
        .filter(product_variant_price::Column::ProductVariantId.eq(product_variant.id))
        .order_by_asc(product_variant_price::Column::Id)
        .one(conn)
        .await?;

    if existing.is_none() && fields.price.is_none() {
        reasons.push("price: required to create a price".to_string());
    }
    if !reasons.is_empty() {
        return Ok(StepReport::invalid(CascadeStep::Price, reasons));
    }

    match existing {
        Some(record) => {
            let record_id = record.id;
            let mut active: product_variant_price::ActiveModel = record.into();
            if let Some(price) = fields.price {
                active.price = Set(price);
            }
            if let Some(stock) = fields.stock {
                active.stock = Set(stock);
            }
            active.update(conn).await?;
            Ok(StepReport::updated(CascadeStep::Price, record_id))
        }
        None => {
            let created = product_variant_price::ActiveModel {
                price: Set(fields.price.unwrap_or_default()),
                stock: Set(fields.stock.unwrap_or(0)),
                product_variant_id: Set(product_variant.id),
                product_id: Set(product_id),
                ..Default::default()
            }
            .insert(conn)
            .await?;
            Ok(StepReport::created(CascadeStep::Price, created.id))
        }
    }
}

/// Step 4: update the product image or create it.
pub(crate) async fn upsert_image<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    fields: &ImageFields,
) -> Result<StepReport, ServiceError> {
    if fields.is_empty() {
        return Ok(StepReport::skipped(CascadeStep::Image));
    }

    let mut reasons = reasons_of(fields);
    let existing = ProductImage::find()
        .filter(product_image::Column::ProductId.eq(product_id))
        .order_by_asc(product_image::Column::Id)
        .one(conn)
        .await?;

    if existing.is_none() && fields.file_path.is_none() {
        reasons.push("image_file_path: required to create an image".to_string());
    }
    if !reasons.is_empty() {
        return Ok(StepReport::invalid(CascadeStep::Image, reasons));
    }

    match (existing, fields.file_path.clone()) {
        (Some(record), file_path) => {
            let record_id = record.id;
            let mut active: product_image::ActiveModel = record.into();
            if let Some(file_path) = file_path {
                active.file_path = Set(file_path);
            }
            if let Some(thumbnail) = &fields.thumbnail {
                active.thumbnail = Set(Some(thumbnail.clone()));
            }
            active.update(conn).await?;
            Ok(StepReport::updated(CascadeStep::Image, record_id))
        }
        (None, Some(file_path)) => {
            let created = product_image::ActiveModel {
                product_id: Set(product_id),
                file_path: Set(file_path),
                thumbnail: Set(fields.thumbnail.clone()),
                ..Default::default()
            }
            .insert(conn)
            .await?;
            Ok(StepReport::created(CascadeStep::Image, created.id))
        }
        (None, None) => Ok(StepReport::invalid(
            CascadeStep::Image,
            vec!["image_file_path: required to create an image".to_string()],
        )),
    }
}

/// Steps 2 to 4 for an existing product.
pub(crate) async fn apply_dependents<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    input: &CascadeInput,
) -> Result<Vec<StepReport>, ServiceError> {
    let (variant_report, product_variant) =
        upsert_product_variant(conn, product_id, &input.variant_fields()).await?;
    let price_report = upsert_price(
        conn,
        product_id,
        product_variant.as_ref(),
        &input.price_fields(),
    )
    .await?;
    let image_report = upsert_image(conn, product_id, &input.image_fields()).await?;

    Ok(vec![variant_report, price_report, image_report])
}

/// Active variants offered when creating a product, as `(id, title)` pairs
pub(crate) async fn active_variants<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<variant::Model>, ServiceError> {
    Ok(Variant::find()
        .filter(variant::Column::Active.eq(true))
        .order_by_asc(variant::Column::Id)
        .all(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn policy_parses_both_spellings() {
        assert_eq!(
            "best-effort".parse::<CascadePolicy>().unwrap(),
            CascadePolicy::BestEffort
        );
        assert_eq!(
            "Best_Effort".parse::<CascadePolicy>().unwrap(),
            CascadePolicy::BestEffort
        );
        assert_eq!(
            " atomic ".parse::<CascadePolicy>().unwrap(),
            CascadePolicy::Atomic
        );
        assert!("eventually".parse::<CascadePolicy>().is_err());
        assert_eq!(CascadePolicy::Atomic.to_string(), "atomic");
    }

    #[test]
    fn normalization_drops_blank_text() {
        let input = CascadeInput {
            title: Some("  Mug ".into()),
            sku: Some("   ".into()),
            thumbnail: Some(String::new()),
            price: Some(dec!(4.5)),
            ..Default::default()
        }
        .normalized();

        assert_eq!(input.title.as_deref(), Some("Mug"));
        assert!(input.sku.is_none());
        assert!(input.thumbnail.is_none());
        assert_eq!(input.price, Some(dec!(4.5)));
    }

    #[test]
    fn field_groups_report_emptiness() {
        let input = CascadeInput {
            stock: Some(3),
            ..Default::default()
        };
        assert!(input.product_fields().is_empty());
        assert!(input.variant_fields().is_empty());
        assert!(!input.price_fields().is_empty());
        assert!(input.image_fields().is_empty());
    }

    #[test]
    fn negative_price_and_stock_are_rejected() {
        let reasons = reasons_of(&PriceFields {
            price: Some(dec!(-1)),
            stock: Some(-2),
        });
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].starts_with("price:"));
        assert!(reasons[1].starts_with("stock:"));

        assert!(reasons_of(&PriceFields {
            price: Some(Decimal::ZERO),
            stock: Some(0),
        })
        .is_empty());
    }

    #[test]
    fn overlong_image_path_is_rejected() {
        let reasons = reasons_of(&ImageFields {
            file_path: Some("x".repeat(501)),
            thumbnail: None,
        });
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("file_path:"));
    }

    #[test]
    fn report_outcome_reflects_invalid_steps() {
        let complete = CascadeReport::new(
            1,
            CascadePolicy::BestEffort,
            vec![
                StepReport::updated(CascadeStep::Product, 1),
                StepReport::skipped(CascadeStep::ProductVariant),
                StepReport::skipped(CascadeStep::Price),
                StepReport::created(CascadeStep::Image, 4),
            ],
        );
        assert!(complete.is_complete());

        let steps = vec![
            StepReport::updated(CascadeStep::Product, 1),
            StepReport::invalid(CascadeStep::Price, vec!["price: must not be negative".into()]),
        ];
        let partial = CascadeReport::new(1, CascadePolicy::BestEffort, steps.clone());
        assert_eq!(partial.outcome, CascadeOutcome::Partial);
        assert_eq!(
            describe_invalid(&steps),
            "price: price: must not be negative"
        );
    }

    #[test]
    fn step_reports_serialize_without_empty_reasons() {
        let json = serde_json::to_value(StepReport::skipped(CascadeStep::ProductVariant)).unwrap();
        assert_eq!(json["step"], "product_variant");
        assert_eq!(json["status"], "Skipped");
        assert!(json.get("reasons").is_none());
    }
}
