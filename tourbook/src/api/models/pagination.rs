//! Shared list query parameters.
//!
//! List endpoints accept the raw query pairs and parse them against the resource's schema (see
//! [`crate::db::handlers::listing`]), so filters on arbitrary whitelisted fields work without a
//! per-resource struct. This type documents the reserved controls for the OpenAPI document.

use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use utoipa::IntoParams;

/// Reserved list controls. Any other key filters on a field: `price[lt]=1500`, `difficulty=easy`.
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// 1-based page number (default: 1)
    #[param(default = 1, minimum = 1)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page: Option<i64>,

    /// Page size (default: 100)
    #[param(default = 100, minimum = 1)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub limit: Option<i64>,

    /// Comma-separated sort keys, `-` prefix for descending: `-ratingsAverage,price`
    pub sort: Option<String>,

    /// Comma-separated fields to include, or `-`-prefixed fields to exclude
    pub fields: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_numbers() {
        let query: ListQuery = serde_urlencoded::from_str("page=2&limit=10&sort=-price&fields=name,price").unwrap();
        assert_eq!(query.page, Some(2));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.sort.as_deref(), Some("-price"));
        assert_eq!(query.fields.as_deref(), Some("name,price"));
    }
}
