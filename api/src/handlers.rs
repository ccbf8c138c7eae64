use crate::AppState;
use application::ApplicationError;
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json as JsonResponse, Response},
};
use domain::Product;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Body of every error response.
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BoolQueryParams {
    pub category: Option<String>,
    pub price: Option<String>,
    pub in_stock: Option<String>,
}

pub async fn health_check() -> impl IntoResponse {
    info!("Health check endpoint called");
    (StatusCode::OK, "OK")
}

// --- CRUD Handlers ---

/// POST /api/products
pub async fn create_product_handler(
    State(state): State<AppState>,
    payload: Result<Json<Product>, JsonRejection>,
) -> Response {
    let Json(product) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected product payload: {}", rejection);
            return map_application_error_to_response(ApplicationError::InvalidInput(
                rejection.body_text(),
            ));
        }
    };
    info!(name = %product.name, "Received request to create product");
    match state.product_service.save(product).await {
        Ok(saved) => (StatusCode::CREATED, JsonResponse(saved)).into_response(),
        Err(e) => {
            error!("Failed to create product via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// GET /api/products/:id
pub async fn get_product_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    info!(product_id = %id, "Received request to get product");
    match state.product_service.find_by_id(&id).await {
        Ok(Some(product)) => (StatusCode::OK, JsonResponse(product)).into_response(),
        Ok(None) => map_application_error_to_response(ApplicationError::NotFound(id)),
        Err(e) => {
            error!(product_id = %id, "Failed to get product via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// GET /api/products
pub async fn list_products_handler(State(state): State<AppState>) -> Response {
    info!("Received request to list products");
    products_response(state.product_service.find_all().await, "list products")
}

/// DELETE /api/products/:id. Looks the product up first so a missing id is a 404.
pub async fn delete_product_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    info!(product_id = %id, "Received request to delete product");
    let product = match state.product_service.find_by_id(&id).await {
        Ok(Some(product)) => product,
        Ok(None) => return map_application_error_to_response(ApplicationError::NotFound(id)),
        Err(e) => {
            error!(product_id = %id, "Failed to look up product for deletion: {}", e);
            return map_application_error_to_response(e);
        }
    };
    match state.product_service.delete(&product).await {
        Ok(true) => {
            info!(product_id = %id, "Product deleted successfully via handler");
            StatusCode::NO_CONTENT.into_response()
        }
        // Removed concurrently between lookup and delete
        Ok(false) => map_application_error_to_response(ApplicationError::NotFound(id)),
        Err(e) => {
            error!(product_id = %id, "Failed to delete product via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

// --- Search Handlers ---

/// GET /api/products/productByName/:name
pub async fn find_by_name_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    info!(name = %name, "Received search by name");
    products_response(
        state.product_service.find_by_name(&name).await,
        "search by name",
    )
}

/// GET /api/products/findByInStock/:inStock
pub async fn find_by_in_stock_handler(
    State(state): State<AppState>,
    Path(in_stock): Path<String>,
) -> Response {
    info!(in_stock = %in_stock, "Received search by stock status");
    let in_stock = match parse_bool("inStock", &in_stock) {
        Ok(value) => value,
        Err(e) => return map_application_error_to_response(e),
    };
    products_response(
        state.product_service.find_by_in_stock(in_stock).await,
        "search by stock status",
    )
}

/// GET /api/products/findPrice/findByPriceBetween/:minPrice/:maxPrice
pub async fn find_by_price_between_handler(
    State(state): State<AppState>,
    Path((min_price, max_price)): Path<(String, String)>,
) -> Response {
    info!(min_price = %min_price, max_price = %max_price, "Received search by price range");
    let bounds = parse_decimal("minPrice", &min_price)
        .and_then(|min| Ok((min, parse_decimal("maxPrice", &max_price)?)));
    let (min_price, max_price) = match bounds {
        Ok(bounds) => bounds,
        Err(e) => return map_application_error_to_response(e),
    };
    products_response(
        state
            .product_service
            .find_by_price_between(min_price, max_price)
            .await,
        "search by price range",
    )
}

/// GET /api/products/fetchSuggestionsByName/:name
pub async fn fetch_suggestions_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    info!(prefix = %name, "Received suggestion request");
    match state.product_service.fetch_suggestions(&name).await {
        Ok(names) => (StatusCode::OK, JsonResponse(names)).into_response(),
        Err(e) => {
            error!("Failed to fetch suggestions via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// GET /api/products/fuzzySearch/:name
pub async fn fuzzy_search_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    info!(name = %name, "Received fuzzy search");
    products_response(
        state.product_service.fuzzy_search(&name).await,
        "fuzzy search",
    )
}

/// GET /api/products/multiMatchQuery/:name
pub async fn multi_match_handler(
    State(state): State<AppState>,
    Path(text): Path<String>,
) -> Response {
    info!(text = %text, "Received multi-field search");
    products_response(
        state.product_service.multi_match(&text).await,
        "multi-field search",
    )
}

/// GET /api/products/productByBoolQuery?category=&price=&inStock=
pub async fn bool_query_handler(
    State(state): State<AppState>,
    Query(params): Query<BoolQueryParams>,
) -> Response {
    info!(?params, "Received bool query search");
    let parsed = required("category", params.category).and_then(|category| {
        let price = parse_decimal("price", &required("price", params.price)?)?;
        let in_stock = parse_bool("inStock", &required("inStock", params.in_stock)?)?;
        Ok((category, price, in_stock))
    });
    let (category, price, in_stock) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return map_application_error_to_response(e),
    };
    products_response(
        state
            .product_service
            .find_by_bool_query(&category, price, in_stock)
            .await,
        "bool query search",
    )
}

// --- Aggregation Handlers ---

/// GET /api/products/aggregations
pub async fn average_price_handler(State(state): State<AppState>) -> Response {
    info!("Received request for average price per category");
    match state.product_service.average_price_per_category().await {
        Ok(averages) => (StatusCode::OK, JsonResponse(averages)).into_response(),
        Err(e) => {
            error!("Failed to aggregate average prices via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// GET /api/products/aggregations/count
pub async fn count_per_category_handler(State(state): State<AppState>) -> Response {
    info!("Received request for product count per category");
    match state.product_service.count_per_category().await {
        Ok(counts) => (StatusCode::OK, JsonResponse(counts)).into_response(),
        Err(e) => {
            error!("Failed to aggregate category counts via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

// --- Helpers ---

fn products_response(result: Result<Vec<Product>, ApplicationError>, action: &str) -> Response {
    match result {
        Ok(products) => {
            info!(hits = products.len(), "Completed {} via handler", action);
            (StatusCode::OK, JsonResponse(products)).into_response()
        }
        Err(e) => {
            error!("Failed to {} via handler: {}", action, e);
            map_application_error_to_response(e)
        }
    }
}

fn required(name: &str, value: Option<String>) -> Result<String, ApplicationError> {
    value.ok_or_else(|| {
        ApplicationError::InvalidInput(format!("Missing query parameter '{}'", name))
    })
}

fn parse_decimal(name: &str, raw: &str) -> Result<Decimal, ApplicationError> {
    raw.trim().parse().map_err(|_| {
        ApplicationError::InvalidInput(format!("'{}' is not a valid {}", raw, name))
    })
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ApplicationError> {
    raw.trim().to_ascii_lowercase().parse().map_err(|_| {
        ApplicationError::InvalidInput(format!("'{}' is not a valid {}, expected true or false", raw, name))
    })
}

/// Maps ApplicationError to an HTTP status and a `{code, message}` body.
pub fn map_application_error_to_response(err: ApplicationError) -> Response {
    let (status, code, message) = match err {
        ApplicationError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Product '{}' not found", id),
        ),
        ApplicationError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg),
        ApplicationError::DomainError(domain_err) => {
            warn!("Domain validation failed: {}", domain_err);
            (
                StatusCode::BAD_REQUEST,
                "invalid_input",
                domain_err.to_string(),
            )
        }
        ApplicationError::StoreUnavailable(msg) => {
            error!("Document store unavailable: {}", msg);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "The document store is unavailable".to_string(),
            )
        }
        e @ ApplicationError::StoreError { .. } => {
            error!("Document store error: {}", e);
            (StatusCode::BAD_GATEWAY, "store_error", e.to_string())
        }
        e @ ApplicationError::SaveFailed { .. } => {
            error!("Save failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "save_failed",
                e.to_string(),
            )
        }
    };
    let body = ErrorResponse {
        code: code.to_string(),
        message,
    };
    (status, JsonResponse(body)).into_response()
}
