pub mod elasticsearch;
pub(crate) mod in_memory_index;
pub mod query_dsl;
