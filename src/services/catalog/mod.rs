//! Product catalog: listing, variant selection and cascading updates.

pub mod cascade;
pub mod filtering;
pub mod grouping;
pub mod pagination;
pub mod product_catalog_service;

pub use cascade::{
    CascadeInput, CascadeOutcome, CascadePolicy, CascadeReport, CascadeStep, StepReport,
    StepStatus,
};
pub use filtering::{ProductFilter, ProductListParams, VariantSelection, VARIANT_GROUP_PREFIX};
pub use grouping::VariantGroups;
pub use pagination::{PageInfo, PageResolution};
pub use product_catalog_service::{
    CascadeResult, ListedProduct, ProductCatalogService, ProductDetail, ProductListing,
    VariantPriceRow,
};
