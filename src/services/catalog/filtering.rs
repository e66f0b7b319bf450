use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{
    Expr, Func, IntoIden, LikeExpr, Query, SelectStatement, SimpleExpr,
};
use sea_orm::{ColumnTrait, DbBackend, EntityTrait, QueryFilter, Select};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::entities::{product, product_variant, product_variant_price};

/// Form fields whose name starts with this prefix carry a selected Variant id
pub const VARIANT_GROUP_PREFIX: &str = "variant_group_";

/// Raw listing query string. Every value stays a string so that bad input
/// degrades to "not supplied" instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductListParams {
    /// Case-insensitive substring of the product title
    pub title: Option<String>,
    /// Case-insensitive substring of a product variant title
    pub variant: Option<String>,
    /// Minimum variant price (inclusive)
    pub price_from: Option<String>,
    /// Maximum variant price (inclusive)
    pub price_to: Option<String>,
    /// Creation date, YYYY-MM-DD (UTC)
    pub date: Option<String>,
    /// 1-based page number
    pub page: Option<String>,
}

/// Parsed listing predicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProductFilter {
    pub title: Option<String>,
    pub variant: Option<String>,
    pub price_from: Option<Decimal>,
    pub price_to: Option<Decimal>,
    pub date: Option<NaiveDate>,
}

fn non_blank(raw: Option<&String>) -> Option<String> {
    raw.map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_field<T: FromStr>(field: &'static str, raw: Option<&String>) -> Option<T> {
    let value = non_blank(raw)?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            debug!(field, value = %value, "ignoring unparsable filter value");
            None
        }
    }
}

/// Lower-cased `%needle%` with LIKE wildcards escaped
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// `*needle*` GLOB pattern where every cased character becomes a class of its
/// case forms, e.g. `Éc` -> `[Éé][cC]`. SQLite's `LOWER()` and `LIKE` only
/// fold ASCII.
fn case_folded_glob(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() * 4 + 2);
    pattern.push('*');
    for c in needle.chars() {
        let mut forms = vec![c];
        for folded in [single_char(c.to_lowercase()), single_char(c.to_uppercase())]
            .into_iter()
            .flatten()
        {
            if !forms.contains(&folded) {
                forms.push(folded);
            }
        }

        match forms.as_slice() {
            ['*' | '?' | '['] => {
                pattern.push('[');
                pattern.push(c);
                pattern.push(']');
            }
            [only] => pattern.push(*only),
            _ => {
                pattern.push('[');
                pattern.extend(forms.iter());
                pattern.push(']');
            }
        }
    }
    pattern.push('*');
    pattern
}

fn single_char(mut chars: impl Iterator<Item = char>) -> Option<char> {
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Case-insensitive substring match of `column` against `needle`
fn contains_ignore_case<T, C>(backend: DbBackend, table: T, column: C, needle: &str) -> SimpleExpr
where
    T: IntoIden + 'static,
    C: IntoIden + 'static,
{
    match backend {
        DbBackend::Sqlite => Expr::cust_with_exprs(
            "$1 GLOB $2",
            [
                Expr::col((table, column)).into(),
                Expr::val(case_folded_glob(needle)).into(),
            ],
        ),
        _ => {
            Expr::expr(Func::lower(Expr::col((table, column))))
                .like(LikeExpr::new(contains_pattern(needle)).escape('\\'))
        }
    }
}

impl From<&ProductListParams> for ProductFilter {
    fn from(params: &ProductListParams) -> Self {
        Self {
            title: non_blank(params.title.as_ref()),
            variant: non_blank(params.variant.as_ref()),
            price_from: parse_field("price_from", params.price_from.as_ref()),
            price_to: parse_field("price_to", params.price_to.as_ref()),
            date: non_blank(params.date.as_ref()).and_then(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|_| debug!(value = %raw, "ignoring unparsable date filter"))
                    .ok()
            }),
        }
    }
}

impl ProductFilter {
    /// True when the listing must join through variant prices
    pub fn has_price_predicates(&self) -> bool {
        self.variant.is_some() || self.price_from.is_some() || self.price_to.is_some()
    }

    /// Ids of products owning a price row that matches the variant and price
    /// predicates. Price bounds default to `[0, +inf)`.
    fn matching_price_owners(&self, backend: DbBackend) -> SelectStatement {
        let mut sub = Query::select();
        sub.column((
            product_variant_price::Entity,
            product_variant_price::Column::ProductId,
        ))
        .from(product_variant_price::Entity)
        .inner_join(
            product_variant::Entity,
            Expr::col((product_variant::Entity, product_variant::Column::Id)).equals((
                product_variant_price::Entity,
                product_variant_price::Column::ProductVariantId,
            )),
        )
        .and_where(
            Expr::col((
                product_variant_price::Entity,
                product_variant_price::Column::Price,
            ))
            .gte(self.price_from.unwrap_or(Decimal::ZERO)),
        );

        if let Some(max) = self.price_to {
            sub.and_where(
                Expr::col((
                    product_variant_price::Entity,
                    product_variant_price::Column::Price,
                ))
                .lte(max),
            );
        }
        if let Some(variant) = &self.variant {
            sub.and_where(contains_ignore_case(
                backend,
                product_variant::Entity,
                product_variant::Column::Title,
                variant,
            ));
        }

        sub
    }

    /// Narrows a product query to the rows matching every supplied predicate.
    /// Each product appears at most once.
    pub fn apply(
        &self,
        backend: DbBackend,
        mut query: Select<product::Entity>,
    ) -> Select<product::Entity> {
        if let Some(title) = &self.title {
            query = query.filter(contains_ignore_case(
                backend,
                product::Entity,
                product::Column::Title,
                title,
            ));
        }

        if let Some(date) = self.date {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                query = query.filter(product::Column::CreatedAt.gte(Utc.from_utc_datetime(&midnight)));
            }
            if let Some(next_midnight) = date.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
                query = query
                    .filter(product::Column::CreatedAt.lt(Utc.from_utc_datetime(&next_midnight)));
            }
        }

        if self.has_price_predicates() {
            query = query.filter(product::Column::Id.in_subquery(self.matching_price_owners(backend)));
        }

        query
    }
}

/// Products owning at least one ProductVariant of the given Variants
pub fn owners_of_variants(variant_ids: &BTreeSet<i32>) -> Select<product::Entity> {
    let sub = Query::select()
        .column((product_variant::Entity, product_variant::Column::ProductId))
        .from(product_variant::Entity)
        .and_where(
            Expr::col((product_variant::Entity, product_variant::Column::VariantId))
                .is_in(variant_ids.iter().copied()),
        )
        .to_owned();

    product::Entity::find().filter(product::Column::Id.in_subquery(sub))
}

/// Variant ids picked in a listing form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantSelection {
    pub variant_ids: BTreeSet<i32>,
    /// `(field, value)` pairs whose value was not an integer
    pub rejected: Vec<(String, String)>,
}

impl VariantSelection {
    /// Collects the non-empty `variant_group_*` fields of a submitted form.
    pub fn from_form<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut selection = Self::default();
        for (name, value) in fields {
            if !name.starts_with(VARIANT_GROUP_PREFIX) {
                continue;
            }
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match value.parse::<i32>() {
                Ok(id) => {
                    selection.variant_ids.insert(id);
                }
                Err(_) => selection
                    .rejected
                    .push((name.to_string(), value.to_string())),
            }
        }
        selection
    }

    pub fn is_empty(&self) -> bool {
        self.variant_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sea_orm::QueryTrait;

    fn params(pairs: &[(&str, &str)]) -> ProductListParams {
        let mut params = ProductListParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "title" => params.title = v,
                "variant" => params.variant = v,
                "price_from" => params.price_from = v,
                "price_to" => params.price_to = v,
                "date" => params.date = v,
                "page" => params.page = v,
                _ => unreachable!(),
            }
        }
        params
    }

    #[test]
    fn blank_and_unparsable_values_are_ignored() {
        let filter = ProductFilter::from(&params(&[
            ("title", "  "),
            ("variant", ""),
            ("price_from", "cheap"),
            ("price_to", "12.5"),
            ("date", "2024-13-40"),
        ]));

        assert_eq!(
            filter,
            ProductFilter {
                price_to: Some(dec!(12.5)),
                ..Default::default()
            }
        );
    }

    #[test]
    fn values_are_trimmed_and_parsed() {
        let filter = ProductFilter::from(&params(&[
            ("title", " Shirt "),
            ("variant", "Red"),
            ("price_from", "5"),
            ("date", "2024-03-01"),
        ]));

        assert_eq!(filter.title.as_deref(), Some("Shirt"));
        assert_eq!(filter.variant.as_deref(), Some("Red"));
        assert_eq!(filter.price_from, Some(dec!(5)));
        assert_eq!(filter.date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(filter.has_price_predicates());
    }

    #[test]
    fn title_only_filter_skips_the_price_join() {
        let filter = ProductFilter {
            title: Some("mug".into()),
            ..Default::default()
        };
        assert!(!filter.has_price_predicates());

        let sql = filter
            .apply(DbBackend::Postgres, product::Entity::find())
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains("LOWER"));
        assert!(!sql.contains("product_variant_prices"));
    }

    #[test]
    fn sqlite_matches_titles_with_a_case_folded_glob() {
        let filter = ProductFilter {
            title: Some("éclair".into()),
            variant: Some("Rouge".into()),
            ..Default::default()
        };

        let sql = filter
            .apply(DbBackend::Sqlite, product::Entity::find())
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(sql.contains("GLOB '*[éÉ][cC][lL][aA][iI][rR]*'"));
        assert!(sql.contains("GLOB '*[Rr][oO][uU][gG][eE]*'"));
    }

    #[test]
    fn glob_metacharacters_in_needles_are_bracketed() {
        assert_eq!(case_folded_glob("50%*?[1]"), "*50%[*][?][[]1]*");
        assert_eq!(case_folded_glob("Éc"), "*[Éé][cC]*");
    }

    #[test]
    fn like_wildcards_in_needles_are_escaped() {
        assert_eq!(contains_pattern("50%_OFF"), "%50\\%\\_off%");
    }

    #[test]
    fn selection_keeps_only_non_empty_integer_group_fields() {
        let selection = VariantSelection::from_form([
            ("variant_group_1", "3"),
            ("variant_group_2", ""),
            ("variant_group_3", "abc"),
            ("csrfmiddlewaretoken", "42"),
            ("variant_group_4", " 3 "),
        ]);

        assert_eq!(selection.variant_ids, BTreeSet::from([3]));
        assert_eq!(
            selection.rejected,
            vec![("variant_group_3".to_string(), "abc".to_string())]
        );
        assert!(!selection.is_empty());
    }

    #[test]
    fn selection_without_values_is_empty() {
        let selection = VariantSelection::from_form([("variant_group_1", ""), ("other", "1")]);
        assert!(selection.is_empty());
    }
}
