use application::ProductService;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

pub mod config;
pub mod handlers;

use handlers::*;

#[derive(Clone)]
pub struct AppState {
    pub product_service: Arc<ProductService>,
}

impl AppState {
    pub fn new(product_service: Arc<ProductService>) -> Self {
        Self { product_service }
    }
}

/// All product routes live under `/api/products`; static segments win over `:id`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // CRUD
        .route(
            "/api/products",
            post(create_product_handler).get(list_products_handler),
        )
        .route(
            "/api/products/:id",
            get(get_product_handler).delete(delete_product_handler),
        )
        // Search
        .route(
            "/api/products/productByName/:name",
            get(find_by_name_handler),
        )
        .route(
            "/api/products/findByInStock/:inStock",
            get(find_by_in_stock_handler),
        )
        .route(
            "/api/products/findPrice/findByPriceBetween/:minPrice/:maxPrice",
            get(find_by_price_between_handler),
        )
        .route(
            "/api/products/fetchSuggestionsByName/:name",
            get(fetch_suggestions_handler),
        )
        .route("/api/products/fuzzySearch/:name", get(fuzzy_search_handler))
        .route(
            "/api/products/multiMatchQuery/:name",
            get(multi_match_handler),
        )
        .route(
            "/api/products/productByBoolQuery",
            get(bool_query_handler),
        )
        // Aggregations
        .route("/api/products/aggregations", get(average_price_handler))
        .route(
            "/api/products/aggregations/count",
            get(count_per_category_handler),
        )
        .with_state(state)
}
