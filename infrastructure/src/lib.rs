pub mod persistence;
pub mod search;

pub use persistence::InMemoryProductStore;
pub use search::elasticsearch::{ElasticsearchConfig, ElasticsearchStore};
