//! Structured query and aggregation requests handed to a [`crate::ProductStore`].
//!
//! These types describe *what* to ask the document store; each store
//! implementation translates them into its own query language.

use domain::FieldValue;
use rust_decimal::Decimal;

/// A single query clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every document.
    MatchAll,
    /// Exact-value match, no analysis of the operand.
    Term { field: String, value: FieldValue },
    /// Analyzed, relevance-scored full-text match (any term).
    Match { field: String, text: String },
    /// Numeric range on a decimal field.
    Range { field: String, bounds: RangeBounds },
    /// Pattern match supporting `*` and `?`.
    Wildcard { field: String, pattern: String },
    /// Full-text match tolerating up to `max_edits` edits per term; the first
    /// `prefix_length` characters must match exactly.
    Fuzzy {
        field: String,
        text: String,
        max_edits: u8,
        prefix_length: usize,
    },
    /// Full-text match over several fields, best field wins.
    MultiMatch { text: String, fields: Vec<String> },
    /// Compound query.
    Bool(BoolQuery),
}

impl Query {
    pub fn term(field: &str, value: impl Into<FieldValue>) -> Self {
        Query::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn matching(field: &str, text: &str) -> Self {
        Query::Match {
            field: field.to_string(),
            text: text.to_string(),
        }
    }

    pub fn range(field: &str, bounds: RangeBounds) -> Self {
        Query::Range {
            field: field.to_string(),
            bounds,
        }
    }

    pub fn wildcard(field: &str, pattern: &str) -> Self {
        Query::Wildcard {
            field: field.to_string(),
            pattern: pattern.to_string(),
        }
    }

    /// Wildcard with an implicit trailing `*`.
    pub fn prefix(field: &str, prefix: &str) -> Self {
        Self::wildcard(field, &format!("{}*", prefix))
    }

    pub fn fuzzy(field: &str, text: &str, max_edits: u8, prefix_length: usize) -> Self {
        Query::Fuzzy {
            field: field.to_string(),
            text: text.to_string(),
            max_edits,
            prefix_length,
        }
    }

    pub fn multi_match(text: &str, fields: &[&str]) -> Self {
        Query::MultiMatch {
            text: text.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl From<BoolQuery> for Query {
    fn from(query: BoolQuery) -> Self {
        Query::Bool(query)
    }
}

/// Bounds of a range query. Unset bounds are open.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeBounds {
    pub gt: Option<Decimal>,
    pub gte: Option<Decimal>,
    pub lt: Option<Decimal>,
    pub lte: Option<Decimal>,
}

impl RangeBounds {
    /// Inclusive on both ends.
    pub fn between(low: Decimal, high: Decimal) -> Self {
        Self {
            gte: Some(low),
            lte: Some(high),
            ..Self::default()
        }
    }

    /// Strictly below `limit`.
    pub fn below(limit: Decimal) -> Self {
        Self {
            lt: Some(limit),
            ..Self::default()
        }
    }

    pub fn contains(&self, value: Decimal) -> bool {
        self.gt.is_none_or(|b| value > b)
            && self.gte.is_none_or(|b| value >= b)
            && self.lt.is_none_or(|b| value < b)
            && self.lte.is_none_or(|b| value <= b)
    }
}

/// Required (`must`) and optional (`should`) sub-clauses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn minimum_should_match(mut self, count: u32) -> Self {
        self.minimum_should_match = Some(count);
        self
    }

    /// Number of should-clauses that have to match. Without an explicit value
    /// should-clauses are optional as soon as a must-clause exists.
    pub fn effective_minimum_should_match(&self) -> u32 {
        self.minimum_should_match.unwrap_or({
            if self.must.is_empty() && !self.should.is_empty() {
                1
            } else {
                0
            }
        })
    }
}

/// A query plus an optional page window.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: Query,
    /// Maximum number of hits. `None` leaves the store's default window.
    pub size: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: Query) -> Self {
        Self { query, size: None }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

/// Metric computed per bucket of a terms aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Avg { field: String },
    Count,
}

/// Groups all documents by the distinct values of `group_field`.
#[derive(Debug, Clone, PartialEq)]
pub struct TermsAggregation {
    pub name: String,
    pub group_field: String,
    pub metric: Metric,
    /// Maximum number of buckets returned.
    pub size: usize,
}

impl TermsAggregation {
    pub fn new(name: &str, group_field: &str, metric: Metric, size: usize) -> Self {
        Self {
            name: name.to_string(),
            group_field: group_field.to_string(),
            metric,
            size,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationBucket {
    pub key: String,
    pub doc_count: u64,
    /// Metric value; `None` for `Metric::Count` or when the bucket had no values.
    pub value: Option<f64>,
}
