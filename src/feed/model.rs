use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::MatchError;
use crate::models::{BorrowerId, LenderId};

/// Longest accepted search term, in characters
pub const MAX_SEARCH_LEN: usize = 100;

pub const DEFAULT_FEED_LIMIT: u32 = 20;
pub const MAX_FEED_LIMIT: u32 = 100;

/// Columns the feed may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    Value,
    #[default]
    CreatedAt,
    Description,
    Industry,
    State,
    CreditScore,
}

impl SortField {
    pub const ALL: [SortField; 7] = [
        SortField::Title,
        SortField::Value,
        SortField::CreatedAt,
        SortField::Description,
        SortField::Industry,
        SortField::State,
        SortField::CreditScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Value => "value",
            SortField::CreatedAt => "created_at",
            SortField::Description => "description",
            SortField::Industry => "industry",
            SortField::State => "state",
            SortField::CreditScore => "credit_score",
        }
    }

    /// Fixed SQL column for this field in the feed query
    pub fn as_column(&self) -> &'static str {
        match self {
            SortField::Title => "r.title",
            SortField::Value => "r.value",
            SortField::CreatedAt => "r.created_at",
            SortField::Description => "r.description",
            SortField::Industry => "b.industry",
            SortField::State => "b.state",
            SortField::CreditScore => "c.score",
        }
    }
}

impl FromStr for SortField {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s.trim())
            .ok_or_else(|| {
                let valid: Vec<&str> = SortField::ALL.iter().map(|f| f.as_str()).collect();
                MatchError::Validation(format!(
                    "Invalid sort field '{}'. Valid values: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(MatchError::Validation(format!(
                "Invalid sort order '{}'. Valid values: asc, desc",
                s
            ))),
        }
    }
}

/// Caller-facing feed parameters, as received
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub search: Option<String>,
    pub hide: Option<bool>,
}

/// Validated feed parameters handed to storage
#[derive(Debug, Clone, PartialEq)]
pub struct FeedFilter {
    pub sort: SortField,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
    /// Trimmed, non-empty search term
    pub search: Option<String>,
    /// Exclude rows the lender has hidden
    pub hide: bool,
}

impl FeedQuery {
    /// Validate and normalise, applying `default_limit` when none is given
    pub fn into_filter(self, default_limit: u32) -> Result<FeedFilter, MatchError> {
        let sort = match self.sort.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => SortField::default(),
        };
        let order = match self.order.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => SortOrder::default(),
        };

        let search = match self.search {
            Some(term) if !term.trim().is_empty() => {
                let term = term.trim().to_string();
                if term.chars().count() > MAX_SEARCH_LEN {
                    return Err(MatchError::Validation(format!(
                        "Search term must be at most {} characters",
                        MAX_SEARCH_LEN
                    )));
                }
                Some(term)
            }
            _ => None,
        };

        let limit = self.limit.unwrap_or(default_limit).clamp(1, MAX_FEED_LIMIT);

        Ok(FeedFilter {
            sort,
            order,
            limit: i64::from(limit),
            offset: i64::from(self.offset.unwrap_or(0)),
            search,
            hide: self.hide.unwrap_or(true),
        })
    }
}

/// Escape LIKE metacharacters and wrap for a substring match.
///
/// The result is used with `ESCAPE '\'`.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// A lender's hide/favorite marks on one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LenderRequestOverlay {
    pub lender_id: LenderId,
    pub loan_request_id: Uuid,
    pub hide: Option<bool>,
    pub favorite: Option<bool>,
}

impl LenderRequestOverlay {
    pub fn empty(lender_id: LenderId, loan_request_id: Uuid) -> Self {
        Self {
            lender_id,
            loan_request_id,
            hide: None,
            favorite: None,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.hide == Some(true)
    }
}

/// One row of the lender feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedItem {
    pub id: Uuid,
    pub borrower_id: BorrowerId,
    pub title: String,
    pub description: String,
    pub value: Decimal,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub business_name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub industry: Option<String>,
    pub credit_score: Option<i32>,
    pub favorite: Option<bool>,
    pub hide: Option<bool>,
}

/// Count and value of every open request, regardless of lender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, sqlx::FromRow)]
pub struct OpenTotals {
    pub total: i64,
    pub aggregate_value: Decimal,
}

/// A page of the lender feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub total: i64,
    pub aggregate_value: Decimal,
    pub items_count: usize,
    pub items: Vec<FeedItem>,
}

impl FeedPage {
    pub fn new(totals: OpenTotals, items: Vec<FeedItem>) -> Self {
        Self {
            total: totals.total,
            aggregate_value: totals.aggregate_value,
            items_count: items.len(),
            items,
        }
    }
}
