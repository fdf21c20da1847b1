//! Common types used across the platform

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declares a closed set of values stored as text in the database and on
/// the wire. Generates `as_str`, `ALL`, `Display`, `FromStr` and
/// `TryFrom<String>` so rows can be decoded with `#[sqlx(try_from = "String")]`.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::types::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err($crate::types::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ::std::convert::TryFrom<String> for $name {
            type Error = $crate::types::UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

/// A text value that is not part of a closed set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// List screens show twenty rows per page
pub const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1),
            per_page: per_page.unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }

    /// Page number, never below 1
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    /// SQL `LIMIT`, clamped to 1..=100
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.clamp(1, MAX_PAGE_SIZE))
    }

    /// SQL `OFFSET`
    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * self.limit()
    }

    pub fn meta(&self, total_items: i64) -> PaginationMeta {
        let per_page = self.limit() as u32;
        let total_items = total_items.max(0) as u64;
        let total_pages = ((total_items + u64::from(per_page) - 1) / u64::from(per_page)) as u32;
        PaginationMeta {
            page: self.page(),
            per_page,
            total_items,
            total_pages,
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: &Pagination, total_items: i64) -> Self {
        Self {
            data,
            pagination: pagination.meta(total_items),
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

/// Date range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

impl DateRange {
    /// The `days` days ending today, inclusive
    pub fn last_days(today: chrono::NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: today - chrono::Duration::days(span),
            end: today,
        }
    }

    /// Every calendar day in the range, in order
    pub fn days(&self) -> Vec<chrono::NaiveDate> {
        self.start
            .iter_days()
            .take_while(|d| *d <= self.end)
            .collect()
    }
}

/// First day of the month `months_back` months before `today`'s month
pub fn month_start(today: chrono::NaiveDate, months_back: u32) -> chrono::NaiveDate {
    use chrono::Datelike;

    let index = today.year() * 12 + today.month0() as i32 - months_back as i32;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    chrono::NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn pagination_offsets() {
        let p = Pagination::new(Some(3), None);
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 40);

        let p = Pagination::new(Some(0), Some(500));
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 100);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn pagination_meta_rounds_pages_up() {
        let meta = Pagination::default().meta(41);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(Pagination::default().meta(0).total_pages, 0);
    }

    #[test]
    fn last_days_is_inclusive() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let range = DateRange::last_days(today, 7);
        let days = range.days();
        assert_eq!(days.len(), 7);
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2024, 2, 25).unwrap());
        assert_eq!(*days.last().unwrap(), today);
    }

    #[test]
    fn month_start_crosses_years() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        assert_eq!(month_start(today, 0), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(month_start(today, 5), NaiveDate::from_ymd_opt(2023, 9, 1).unwrap());
    }
}
