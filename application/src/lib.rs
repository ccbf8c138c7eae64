use async_trait::async_trait;
use domain::{DomainError, Product, ProductId, fields};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub mod query;

pub use query::{
    AggregationBucket, BoolQuery, Metric, Query, RangeBounds, SearchRequest, TermsAggregation,
};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Product not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
    /// The document store could not be reached (connection refused, timeout).
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),
    /// The document store answered with a failure.
    #[error("Document store failed during {operation}: {message}")]
    StoreError { operation: String, message: String },
    #[error("Failed to save product '{name}': {source}")]
    SaveFailed {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    pub fn store(operation: &str, message: impl Into<String>) -> Self {
        ApplicationError::StoreError {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

// --- Infrastructure Interface (Trait) ---

/// Client of the external document store holding the product index.
///
/// Implementations translate the structured requests of [`query`] into the
/// store's own query language. Relevance ordering of search results is the
/// store's.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Creates the index with its field mapping if it does not exist yet.
    async fn ensure_index(&self) -> Result<(), ApplicationError>;
    /// Inserts, or fully overwrites by id. Returns the stored product with its id.
    async fn save(&self, product: &Product) -> Result<Product, ApplicationError>;
    async fn get(&self, id: &ProductId) -> Result<Option<Product>, ApplicationError>;
    /// Every product in the index. Unbounded.
    async fn list_all(&self) -> Result<Vec<Product>, ApplicationError>;
    /// Returns false if there was nothing to delete.
    async fn delete(&self, id: &ProductId) -> Result<bool, ApplicationError>;
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Product>, ApplicationError>;
    /// Runs a search and returns only the given text field of each hit.
    async fn search_field_values(
        &self,
        request: &SearchRequest,
        field: &str,
    ) -> Result<Vec<String>, ApplicationError>;
    async fn aggregate(
        &self,
        aggregation: &TermsAggregation,
    ) -> Result<Vec<AggregationBucket>, ApplicationError>;
}

// --- Application Service (Use Cases) ---

/// Suggestions are capped to one page of this size.
pub const SUGGESTION_LIMIT: usize = 5;
/// Edit distance tolerated by the fuzzy name search.
pub const FUZZY_MAX_EDITS: u8 = 1;
/// Leading characters that must match exactly in the fuzzy name search.
pub const FUZZY_PREFIX_LENGTH: usize = 3;
/// Maximum number of category buckets returned by the aggregations.
pub const CATEGORY_BUCKET_LIMIT: usize = 100;

/// One method per exposed capability; each issues a single store call.
pub struct ProductService {
    store: Arc<dyn ProductStore>,
}

impl ProductService {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, product), fields(product_id = ?product.id(), name = %product.name))]
    pub async fn save(&self, mut product: Product) -> Result<Product, ApplicationError> {
        info!("Attempting to save product");
        if let Some(id) = product.id.take() {
            product.id = Some(ProductId::parse(id.as_str())?);
        }
        match self.store.save(&product).await {
            Ok(saved) => {
                info!(product_id = ?saved.id(), "Product saved successfully");
                Ok(saved)
            }
            Err(e) => {
                error!("Failed to save product to store: {}", e);
                Err(ApplicationError::SaveFailed {
                    name: product.name,
                    source: Box::new(e),
                })
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Product>, ApplicationError> {
        let id = ProductId::parse(id)?;
        let product = self.store.get(&id).await?;
        if product.is_none() {
            debug!(product_id = %id, "Product not found");
        }
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Product>, ApplicationError> {
        self.store.list_all().await
    }

    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: &str) -> Result<bool, ApplicationError> {
        let id = ProductId::parse(id)?;
        let deleted = self.store.delete(&id).await?;
        if deleted {
            info!(product_id = %id, "Product deleted");
        } else {
            warn!(product_id = %id, "Nothing to delete");
        }
        Ok(deleted)
    }

    #[instrument(skip(self, product), fields(product_id = ?product.id()))]
    pub async fn delete(&self, product: &Product) -> Result<bool, ApplicationError> {
        let id = product.id().ok_or_else(|| {
            ApplicationError::InvalidInput("Cannot delete a product without an id".to_string())
        })?;
        self.store.delete(id).await
    }

    /// Full-text, relevance-ranked search on the product name.
    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<Product>, ApplicationError> {
        let request = SearchRequest::new(Query::matching(fields::NAME, name));
        self.store.search(&request).await
    }

    #[instrument(skip(self))]
    pub async fn find_by_in_stock(&self, in_stock: bool) -> Result<Vec<Product>, ApplicationError> {
        let request = SearchRequest::new(Query::term(fields::IN_STOCK, in_stock));
        self.store.search(&request).await
    }

    /// Products priced within `[min_price, max_price]`.
    #[instrument(skip(self))]
    pub async fn find_by_price_between(
        &self,
        min_price: Decimal,
        max_price: Decimal,
    ) -> Result<Vec<Product>, ApplicationError> {
        let request = SearchRequest::new(Query::range(
            fields::PRICE,
            RangeBounds::between(min_price, max_price),
        ));
        self.store.search(&request).await
    }

    /// Names of up to [`SUGGESTION_LIMIT`] products whose name starts with `prefix`.
    #[instrument(skip(self))]
    pub async fn fetch_suggestions(&self, prefix: &str) -> Result<Vec<String>, ApplicationError> {
        let request = SearchRequest::new(Query::prefix(fields::NAME, &prefix.to_lowercase()))
            .with_size(SUGGESTION_LIMIT);
        self.store.search_field_values(&request, fields::NAME).await
    }

    #[instrument(skip(self))]
    pub async fn fuzzy_search(&self, name: &str) -> Result<Vec<Product>, ApplicationError> {
        let request = SearchRequest::new(Query::fuzzy(
            fields::NAME,
            name,
            FUZZY_MAX_EDITS,
            FUZZY_PREFIX_LENGTH,
        ));
        self.store.search(&request).await
    }

    /// Full-text search over both category and name.
    #[instrument(skip(self))]
    pub async fn multi_match(&self, text: &str) -> Result<Vec<Product>, ApplicationError> {
        let request = SearchRequest::new(Query::multi_match(
            text,
            &[fields::CATEGORY, fields::NAME],
        ));
        self.store.search(&request).await
    }

    /// Products in exactly `category` that are either cheaper than `price` or
    /// have the given stock status.
    #[instrument(skip(self))]
    pub async fn find_by_bool_query(
        &self,
        category: &str,
        price: Decimal,
        in_stock: bool,
    ) -> Result<Vec<Product>, ApplicationError> {
        let query = BoolQuery::new()
            .must(Query::term(fields::CATEGORY, category))
            .should(Query::range(fields::PRICE, RangeBounds::below(price)))
            .should(Query::term(fields::IN_STOCK, in_stock))
            .minimum_should_match(1);
        let request = SearchRequest::new(query.into());
        self.store.search(&request).await
    }

    #[instrument(skip(self))]
    pub async fn average_price_per_category(
        &self,
    ) -> Result<HashMap<String, f64>, ApplicationError> {
        let aggregation = TermsAggregation::new(
            "by_category",
            fields::CATEGORY,
            Metric::Avg {
                field: fields::PRICE.to_string(),
            },
            CATEGORY_BUCKET_LIMIT,
        );
        let buckets = self.store.aggregate(&aggregation).await?;
        Ok(buckets
            .into_iter()
            .filter_map(|bucket| bucket.value.map(|avg| (bucket.key, avg)))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn count_per_category(&self) -> Result<HashMap<String, u64>, ApplicationError> {
        let aggregation = TermsAggregation::new(
            "by_category",
            fields::CATEGORY,
            Metric::Count,
            CATEGORY_BUCKET_LIMIT,
        );
        let buckets = self.store.aggregate(&aggregation).await?;
        Ok(buckets
            .into_iter()
            .map(|bucket| (bucket.key, bucket.doc_count))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::FieldValue;
    use mockall::predicate::eq;

    fn widget() -> Product {
        Product::new("Widget", "tools", Decimal::new(1999, 2), true)
    }

    fn service(store: MockProductStore) -> ProductService {
        ProductService::new(Arc::new(store))
    }

    #[tokio::test]
    async fn save_returns_store_assigned_id() {
        let mut store = MockProductStore::new();
        store
            .expect_save()
            .returning(|p| Ok(p.clone().with_id(ProductId::new("generated".to_string()))));

        let saved = service(store).save(widget()).await.unwrap();
        assert_eq!(saved.id().map(|id| id.as_str()), Some("generated"));
        assert_eq!(saved.name, "Widget");
    }

    #[tokio::test]
    async fn save_failure_is_a_typed_error() {
        let mut store = MockProductStore::new();
        store
            .expect_save()
            .returning(|_| Err(ApplicationError::StoreUnavailable("connection refused".to_string())));

        let result = service(store).save(widget()).await;
        match result {
            Err(ApplicationError::SaveFailed { name, source }) => {
                assert_eq!(name, "Widget");
                assert!(source.to_string().contains("connection refused"));
            }
            other => panic!("expected SaveFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn save_normalizes_caller_supplied_id() {
        let mut store = MockProductStore::new();
        store
            .expect_save()
            .withf(|p| p.id().map(|id| id.as_str()) == Some("p1"))
            .times(1)
            .returning(|p| Ok(p.clone()));

        let product = widget().with_id(ProductId::new(" p1 ".to_string()));
        let saved = service(store).save(product).await.unwrap();
        assert_eq!(saved.id().map(|id| id.as_str()), Some("p1"));
    }

    #[tokio::test]
    async fn save_rejects_blank_id_without_store_call() {
        let store = MockProductStore::new();
        let product = widget().with_id(ProductId::new(String::new()));
        let result = service(store).save(product).await;
        assert!(matches!(
            result,
            Err(ApplicationError::DomainError(DomainError::InvalidId(_)))
        ));
    }

    #[tokio::test]
    async fn find_by_id_absent_is_not_an_error() {
        let mut store = MockProductStore::new();
        store
            .expect_get()
            .with(eq(ProductId::new("missing".to_string())))
            .returning(|_| Ok(None));

        let found = service(store).find_by_id("missing").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn find_by_id_rejects_blank_id_without_store_call() {
        let store = MockProductStore::new();
        let result = service(store).find_by_id("  ").await;
        assert!(matches!(
            result,
            Err(ApplicationError::DomainError(DomainError::InvalidId(_)))
        ));
    }

    #[tokio::test]
    async fn delete_requires_an_id() {
        let store = MockProductStore::new();
        let result = service(store).delete(&widget()).await;
        assert!(matches!(result, Err(ApplicationError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn delete_by_id_reports_store_result() {
        let mut store = MockProductStore::new();
        store
            .expect_delete()
            .with(eq(ProductId::new("p1".to_string())))
            .returning(|_| Ok(true));

        assert!(service(store).delete_by_id("p1").await.unwrap());
    }

    #[tokio::test]
    async fn find_by_name_issues_match_query() {
        let mut store = MockProductStore::new();
        store
            .expect_search()
            .withf(|request| {
                request.query == Query::matching("name", "widget") && request.size.is_none()
            })
            .times(1)
            .returning(|_| Ok(vec![]));

        let result = service(store).find_by_name("widget").await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn find_by_in_stock_issues_boolean_term_query() {
        let mut store = MockProductStore::new();
        store
            .expect_search()
            .withf(|request| request.query == Query::term("inStock", FieldValue::Boolean(false)))
            .times(1)
            .returning(|_| Ok(vec![]));

        service(store).find_by_in_stock(false).await.unwrap();
    }

    #[tokio::test]
    async fn price_between_is_inclusive_range() {
        let mut store = MockProductStore::new();
        store
            .expect_search()
            .withf(|request| {
                request.query
                    == Query::range(
                        "price",
                        RangeBounds::between(Decimal::new(10, 0), Decimal::new(20, 0)),
                    )
            })
            .times(1)
            .returning(|_| Ok(vec![]));

        service(store)
            .find_by_price_between(Decimal::new(10, 0), Decimal::new(20, 0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn suggestions_lowercase_prefix_and_cap_window() {
        let mut store = MockProductStore::new();
        store
            .expect_search_field_values()
            .withf(|request, field| {
                request.query == Query::wildcard("name", "wid*")
                    && request.size == Some(SUGGESTION_LIMIT)
                    && field == "name"
            })
            .times(1)
            .returning(|_, _| Ok(vec!["Widget".to_string()]));

        let names = service(store).fetch_suggestions("WiD").await.unwrap();
        assert_eq!(names, vec!["Widget".to_string()]);
    }

    #[tokio::test]
    async fn fuzzy_search_uses_one_edit_and_prefix_three() {
        let mut store = MockProductStore::new();
        store
            .expect_search()
            .withf(|request| request.query == Query::fuzzy("name", "widgte", 1, 3))
            .times(1)
            .returning(|_| Ok(vec![]));

        service(store).fuzzy_search("widgte").await.unwrap();
    }

    #[tokio::test]
    async fn multi_match_targets_category_and_name() {
        let mut store = MockProductStore::new();
        store
            .expect_search()
            .withf(|request| request.query == Query::multi_match("tools", &["category", "name"]))
            .times(1)
            .returning(|_| Ok(vec![]));

        service(store).multi_match("tools").await.unwrap();
    }

    #[tokio::test]
    async fn bool_query_composes_must_and_should_clauses() {
        let mut store = MockProductStore::new();
        store
            .expect_search()
            .withf(|request| match &request.query {
                Query::Bool(bool_query) => {
                    bool_query.must == vec![Query::term("category", "electronics")]
                        && bool_query.should
                            == vec![
                                Query::range("price", RangeBounds::below(Decimal::new(100, 0))),
                                Query::term("inStock", true),
                            ]
                        && bool_query.effective_minimum_should_match() == 1
                }
                _ => false,
            })
            .times(1)
            .returning(|_| Ok(vec![]));

        service(store)
            .find_by_bool_query("electronics", Decimal::new(100, 0), true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn average_price_maps_buckets_to_categories() {
        let mut store = MockProductStore::new();
        store
            .expect_aggregate()
            .withf(|agg| {
                agg.group_field == "category"
                    && agg.metric
                        == Metric::Avg {
                            field: "price".to_string(),
                        }
            })
            .returning(|_| {
                Ok(vec![
                    AggregationBucket {
                        key: "A".to_string(),
                        doc_count: 2,
                        value: Some(15.0),
                    },
                    AggregationBucket {
                        key: "B".to_string(),
                        doc_count: 1,
                        value: Some(5.0),
                    },
                ])
            });

        let averages = service(store).average_price_per_category().await.unwrap();
        assert_eq!(averages.len(), 2);
        assert_eq!(averages["A"], 15.0);
        assert_eq!(averages["B"], 5.0);
    }

    #[tokio::test]
    async fn count_per_category_uses_doc_counts() {
        let mut store = MockProductStore::new();
        store
            .expect_aggregate()
            .withf(|agg| agg.metric == Metric::Count)
            .returning(|_| {
                Ok(vec![AggregationBucket {
                    key: "A".to_string(),
                    doc_count: 2,
                    value: None,
                }])
            });

        let counts = service(store).count_per_category().await.unwrap();
        assert_eq!(counts.get("A"), Some(&2));
    }

    #[tokio::test]
    async fn read_errors_propagate_unchanged() {
        let mut store = MockProductStore::new();
        store
            .expect_list_all()
            .returning(|| Err(ApplicationError::store("list_all", "index_not_found_exception")));

        let result = service(store).find_all().await;
        assert!(matches!(result, Err(ApplicationError::StoreError { .. })));
    }
}
