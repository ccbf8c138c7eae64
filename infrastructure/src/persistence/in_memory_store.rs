use crate::search::in_memory_index;
use application::{
    AggregationBucket, ApplicationError, Metric, ProductStore, SearchRequest, TermsAggregation,
};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{IndexSchema, Product, ProductId};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Process-local product store evaluating queries the way the search engine
/// would for the product mapping. Writes are visible immediately.
#[derive(Debug, Clone)]
pub struct InMemoryProductStore {
    products: Arc<DashMap<ProductId, Arc<Product>>>,
    schema: Arc<IndexSchema>,
}

impl InMemoryProductStore {
    pub fn new(schema: IndexSchema) -> Self {
        Self {
            products: Arc::new(DashMap::new()),
            schema: Arc::new(schema),
        }
    }

    /// Matching products, best score first. Ties keep a stable id order.
    fn matching(&self, request: &SearchRequest) -> Vec<Product> {
        let mut scored: Vec<(f64, Arc<Product>)> = self
            .products
            .iter()
            .filter_map(|entry| {
                in_memory_index::score(&request.query, entry.value(), &self.schema)
                    .map(|score| (score, Arc::clone(entry.value())))
            })
            .collect();
        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id().cmp(&b.id()))
        });
        if let Some(size) = request.size {
            scored.truncate(size);
        }
        scored
            .into_iter()
            .map(|(_, product)| (*product).clone())
            .collect()
    }
}

#[derive(Default)]
struct BucketAccumulator {
    doc_count: u64,
    sum: Decimal,
    values: u64,
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn ensure_index(&self) -> Result<(), ApplicationError> {
        debug!(index = %self.schema.name, "In-memory index needs no setup");
        Ok(())
    }

    #[instrument(skip(self, product), fields(name = %product.name))]
    async fn save(&self, product: &Product) -> Result<Product, ApplicationError> {
        let id = product
            .id()
            .cloned()
            .unwrap_or_else(|| ProductId::new(Uuid::new_v4().to_string()));
        debug!(product_id = %id, "Saving product to in-memory store");
        let stored = product.clone().with_id(id.clone());
        self.products.insert(id, Arc::new(stored.clone()));
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &ProductId) -> Result<Option<Product>, ApplicationError> {
        debug!("Getting product from in-memory store");
        Ok(self.products.get(id).map(|entry| (**entry).clone()))
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Product>, ApplicationError> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .map(|entry| (**entry.value()).clone())
            .collect();
        products.sort_by(|a, b| a.id().cmp(&b.id()));
        debug!(count = products.len(), "Listed products from in-memory store");
        Ok(products)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &ProductId) -> Result<bool, ApplicationError> {
        debug!("Deleting product from in-memory store");
        Ok(self.products.remove(id).is_some())
    }

    #[instrument(skip(self, request))]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Product>, ApplicationError> {
        let hits = self.matching(request);
        debug!(hits = hits.len(), "In-memory search finished");
        Ok(hits)
    }

    #[instrument(skip(self, request))]
    async fn search_field_values(
        &self,
        request: &SearchRequest,
        field: &str,
    ) -> Result<Vec<String>, ApplicationError> {
        self.schema.kind_of(field)?;
        Ok(self
            .matching(request)
            .iter()
            .filter_map(|product| product.field_value(field))
            .map(|value| value.to_string())
            .collect())
    }

    #[instrument(skip(self, aggregation), fields(aggregation = %aggregation.name))]
    async fn aggregate(
        &self,
        aggregation: &TermsAggregation,
    ) -> Result<Vec<AggregationBucket>, ApplicationError> {
        self.schema.kind_of(&aggregation.group_field)?;
        if let Metric::Avg { field } = &aggregation.metric {
            self.schema.kind_of(field)?;
        }

        let mut groups: HashMap<String, BucketAccumulator> = HashMap::new();
        for entry in self.products.iter() {
            let product = entry.value();
            let Some(key) = product.field_value(&aggregation.group_field) else {
                continue;
            };
            let bucket = groups.entry(key.to_string()).or_default();
            bucket.doc_count += 1;
            if let Metric::Avg { field } = &aggregation.metric {
                if let Some(value) = product.field_value(field).and_then(|v| v.as_decimal()) {
                    bucket.sum = bucket.sum.checked_add(value).ok_or_else(|| {
                        ApplicationError::store(
                            "aggregate",
                            format!("sum of '{}' overflowed in bucket '{}'", field, key),
                        )
                    })?;
                    bucket.values += 1;
                }
            }
        }

        let mut buckets: Vec<AggregationBucket> = groups
            .into_iter()
            .map(|(key, acc)| {
                let value = match aggregation.metric {
                    Metric::Avg { .. } if acc.values > 0 => {
                        (acc.sum / Decimal::from(acc.values)).to_f64()
                    }
                    _ => None,
                };
                AggregationBucket {
                    key,
                    doc_count: acc.doc_count,
                    value,
                }
            })
            .collect();
        buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
        buckets.truncate(aggregation.size);
        debug!(buckets = buckets.len(), "In-memory aggregation finished");
        Ok(buckets)
    }
}
