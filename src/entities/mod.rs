//! Persistent catalog entities.

pub mod product;
pub mod product_image;
pub mod product_variant;
pub mod product_variant_price;
pub mod variant;

pub use product::{Entity as Product, Model as ProductModel};
pub use product_image::{Entity as ProductImage, Model as ProductImageModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use product_variant_price::{Entity as ProductVariantPrice, Model as ProductVariantPriceModel};
pub use variant::{Entity as Variant, Model as VariantModel};
