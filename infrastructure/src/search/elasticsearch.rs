//! Document store client speaking the Elasticsearch REST API.

use crate::search::query_dsl::{self, METRIC_AGGREGATION};
use application::{
    AggregationBucket, ApplicationError, ProductStore, SearchRequest, TermsAggregation,
};
use async_trait::async_trait;
use domain::{IndexSchema, Product, ProductId};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Page size used while scrolling through the whole index.
const SCROLL_PAGE_SIZE: usize = 500;
/// How long the engine keeps a scroll context alive between pages.
const SCROLL_KEEP_ALIVE: &str = "1m";

/// Connection settings for the external engine.
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub endpoint: String,
    pub index_name: String,
    pub request_timeout: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Wait for a refresh after writes so they are visible to the next search.
    pub refresh_on_write: bool,
}

pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    config: ElasticsearchConfig,
    schema: IndexSchema,
}

// --- Engine response shapes ---

#[derive(Deserialize, Debug)]
struct WriteResponse {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize, Debug)]
struct DeleteResponse {
    result: String,
}

#[derive(Deserialize, Debug)]
struct GetResponse {
    #[serde(rename = "_id")]
    id: String,
    found: bool,
    #[serde(rename = "_source")]
    source: Option<Product>,
}

#[derive(Deserialize, Debug)]
struct SearchResponse<T> {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits<T>,
    #[serde(default)]
    aggregations: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct Hits<T> {
    hits: Vec<Hit<T>>,
}

#[derive(Deserialize, Debug)]
struct Hit<T> {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: T,
}

impl SearchResponse<Product> {
    fn into_products(self) -> Vec<Product> {
        self.hits
            .hits
            .into_iter()
            .map(|hit| hit.source.with_id(ProductId::new(hit.id)))
            .collect()
    }
}

impl ElasticsearchStore {
    pub fn new(config: ElasticsearchConfig, schema: IndexSchema) -> Result<Self, ApplicationError> {
        let base_url = Url::parse(&config.endpoint).map_err(|e| {
            ApplicationError::InvalidInput(format!(
                "Invalid store endpoint '{}': {}",
                config.endpoint, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApplicationError::InvalidInput(format!(
                "Store endpoint '{}' cannot be used as a base URL",
                config.endpoint
            )));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApplicationError::store("client setup", e.to_string()))?;
        info!(endpoint = %base_url, index = %config.index_name, timeout_ms = config.request_timeout.as_millis() as u64, "Elasticsearch store client created");
        Ok(Self {
            client,
            base_url,
            config,
            schema,
        })
    }

    fn index(&self) -> &str {
        &self.config.index_name
    }

    /// Appends percent-encoded path segments to the endpoint.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(username) => builder.basic_auth(username, self.config.password.as_ref()),
            None => builder,
        }
    }

    fn with_refresh(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.config.refresh_on_write {
            builder.query(&[("refresh", "wait_for")])
        } else {
            builder
        }
    }

    async fn send(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<Response, ApplicationError> {
        self.authorize(builder)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<T, ApplicationError> {
        let response = self.send(operation, builder).await?;
        decode(operation, response).await
    }

    async fn search_raw<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &Value,
    ) -> Result<SearchResponse<T>, ApplicationError> {
        let url = self.url(&[self.index(), "_search"]);
        debug!(operation, body = %body, "Sending search request");
        self.execute(operation, self.client.post(url).json(body)).await
    }

    async fn clear_scroll(&self, scroll_id: &str) {
        let url = self.url(&["_search", "scroll"]);
        let body = json!({ "scroll_id": [scroll_id] });
        if let Err(e) = self
            .send("clear_scroll", self.client.delete(url).json(&body))
            .await
        {
            warn!("Failed to clear scroll context: {}", e);
        }
    }
}

#[async_trait]
impl ProductStore for ElasticsearchStore {
    #[instrument(skip(self), fields(index = %self.index()))]
    async fn ensure_index(&self) -> Result<(), ApplicationError> {
        let url = self.url(&[self.index()]);
        let response = self.send("ensure_index", self.client.head(url.clone())).await?;
        let status = response.status();
        if status.is_success() {
            debug!("Index already exists");
            return Ok(());
        }
        if status != StatusCode::NOT_FOUND {
            let text = error_body(response).await;
            return Err(engine_error("ensure_index", status, &text));
        }

        info!("Creating index with explicit mapping");
        let body = query_dsl::index_mapping(&self.schema);
        let response = self
            .send("create_index", self.client.put(url).json(&body))
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = error_body(response).await;
        // Another instance may have created it in the meantime
        if text.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(engine_error("create_index", status, &text))
    }

    #[instrument(skip(self, product), fields(index = %self.index(), product_id = ?product.id()))]
    async fn save(&self, product: &Product) -> Result<Product, ApplicationError> {
        // The id travels as document metadata, not inside the source
        let mut source = product.clone();
        source.id = None;
        let builder = match product.id() {
            Some(id) => self.client.put(self.url(&[self.index(), "_doc", id.as_str()])),
            None => self.client.post(self.url(&[self.index(), "_doc"])),
        };
        let builder = self.with_refresh(builder.json(&source));
        let written: WriteResponse = self.execute("save", builder).await?;
        debug!(product_id = %written.id, "Document written");
        Ok(source.with_id(ProductId::new(written.id)))
    }

    #[instrument(skip(self), fields(index = %self.index()))]
    async fn get(&self, id: &ProductId) -> Result<Option<Product>, ApplicationError> {
        let url = self.url(&[self.index(), "_doc", id.as_str()]);
        let response = self.send("get", self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let found: GetResponse = decode("get", response).await?;
        if !found.found {
            return Ok(None);
        }
        Ok(found
            .source
            .map(|product| product.with_id(ProductId::new(found.id))))
    }

    #[instrument(skip(self), fields(index = %self.index()))]
    async fn list_all(&self) -> Result<Vec<Product>, ApplicationError> {
        let url = self.url(&[self.index(), "_search"]);
        let body = json!({ "query": { "match_all": {} }, "size": SCROLL_PAGE_SIZE });
        let builder = self
            .client
            .post(url)
            .query(&[("scroll", SCROLL_KEEP_ALIVE)])
            .json(&body);
        let mut page: SearchResponse<Product> = self.execute("list_all", builder).await?;

        let mut products = Vec::new();
        loop {
            let scroll_id = page.scroll_id.take();
            let batch = page.into_products();
            let exhausted = batch.len() < SCROLL_PAGE_SIZE;
            products.extend(batch);

            let Some(scroll_id) = scroll_id else { break };
            if exhausted {
                self.clear_scroll(&scroll_id).await;
                break;
            }
            let url = self.url(&["_search", "scroll"]);
            let body = json!({ "scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id });
            page = match self
                .execute("list_all", self.client.post(url).json(&body))
                .await
            {
                Ok(next) => next,
                Err(e) => {
                    self.clear_scroll(&scroll_id).await;
                    return Err(e);
                }
            };
        }
        debug!(count = products.len(), "Scanned whole index");
        Ok(products)
    }

    #[instrument(skip(self), fields(index = %self.index()))]
    async fn delete(&self, id: &ProductId) -> Result<bool, ApplicationError> {
        let url = self.url(&[self.index(), "_doc", id.as_str()]);
        let builder = self.with_refresh(self.client.delete(url));
        let response = self.send("delete", builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let deleted: DeleteResponse = decode("delete", response).await?;
        Ok(deleted.result == "deleted")
    }

    #[instrument(skip(self, request), fields(index = %self.index(), size = ?request.size))]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Product>, ApplicationError> {
        let body = query_dsl::search_body(request, None);
        let response: SearchResponse<Product> = self.search_raw("search", &body).await?;
        let products = response.into_products();
        debug!(hits = products.len(), "Search finished");
        Ok(products)
    }

    #[instrument(skip(self, request), fields(index = %self.index(), size = ?request.size))]
    async fn search_field_values(
        &self,
        request: &SearchRequest,
        field: &str,
    ) -> Result<Vec<String>, ApplicationError> {
        let body = query_dsl::search_body(request, Some(&[field][..]));
        let response: SearchResponse<Map<String, Value>> =
            self.search_raw("search_field_values", &body).await?;
        Ok(response
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                hit.source
                    .get(field)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect())
    }

    #[instrument(skip(self, aggregation), fields(index = %self.index(), aggregation = %aggregation.name))]
    async fn aggregate(
        &self,
        aggregation: &TermsAggregation,
    ) -> Result<Vec<AggregationBucket>, ApplicationError> {
        let body = query_dsl::aggregation_body(aggregation);
        let response: SearchResponse<Value> = self.search_raw("aggregate", &body).await?;
        let aggregations = response
            .aggregations
            .ok_or_else(|| ApplicationError::store("aggregate", "response carried no aggregations"))?;
        parse_buckets(&aggregations, &aggregation.name)
    }
}

// --- Error and response helpers ---

fn transport_error(operation: &str, err: reqwest::Error) -> ApplicationError {
    if err.is_timeout() || err.is_connect() {
        ApplicationError::StoreUnavailable(format!("{}: {}", operation, err))
    } else {
        ApplicationError::store(operation, err.to_string())
    }
}

fn engine_error(operation: &str, status: StatusCode, body: &str) -> ApplicationError {
    let reason = error_reason(body).unwrap_or_else(|| body.to_string());
    if status == StatusCode::SERVICE_UNAVAILABLE {
        ApplicationError::StoreUnavailable(format!("{}: {}", operation, reason))
    } else {
        ApplicationError::store(operation, format!("{}: {}", status, reason))
    }
}

async fn decode<T: DeserializeOwned>(
    operation: &str,
    response: Response,
) -> Result<T, ApplicationError> {
    let status = response.status();
    if !status.is_success() {
        let body = error_body(response).await;
        return Err(engine_error(operation, status, &body));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ApplicationError::store(operation, format!("undecodable response: {}", e)))
}

/// Body of a failed response, or why it could not be read.
async fn error_body(response: Response) -> String {
    match response.text().await {
        Ok(text) => text,
        Err(e) => format!("<unreadable body: {}>", e),
    }
}

/// Extracts the human readable reason from an engine error body.
fn error_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("reason")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// Reads the buckets of a terms aggregation named `name`.
fn parse_buckets(aggregations: &Value, name: &str) -> Result<Vec<AggregationBucket>, ApplicationError> {
    let buckets = aggregations
        .get(name)
        .and_then(|agg| agg.get("buckets"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ApplicationError::store("aggregate", format!("aggregation '{}' missing buckets", name))
        })?;

    buckets
        .iter()
        .map(|bucket| {
            // Boolean and numeric keys carry their display form in key_as_string
            let key = match bucket.get("key_as_string").or_else(|| bucket.get("key")) {
                Some(Value::String(key)) => key.clone(),
                Some(other) => other.to_string(),
                None => {
                    return Err(ApplicationError::store("aggregate", "bucket without key"));
                }
            };
            let doc_count = bucket
                .get("doc_count")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let value = bucket
                .get(METRIC_AGGREGATION)
                .and_then(|metric| metric.get("value"))
                .and_then(Value::as_f64);
            Ok(AggregationBucket {
                key,
                doc_count,
                value,
            })
        })
        .collect()
}
