//! Translation of the application query model into Elasticsearch Query DSL bodies.

use application::{BoolQuery, Metric, Query, RangeBounds, SearchRequest, TermsAggregation};
use domain::{FieldKind, FieldValue, IndexSchema};
use serde_json::{Map, Value, json};

/// Name of the nested metric aggregation inside each terms bucket.
pub(crate) const METRIC_AGGREGATION: &str = "metric";

pub fn query_to_dsl(query: &Query) -> Value {
    match query {
        Query::MatchAll => json!({ "match_all": {} }),
        Query::Term { field, value } => json!({
            "term": { field: { "value": field_value_to_json(value) } }
        }),
        Query::Match { field, text } => json!({
            "match": { field: { "query": text } }
        }),
        Query::Range { field, bounds } => json!({
            "range": { field: range_to_dsl(bounds) }
        }),
        Query::Wildcard { field, pattern } => json!({
            "wildcard": { field: { "value": pattern } }
        }),
        Query::Fuzzy {
            field,
            text,
            max_edits,
            prefix_length,
        } => json!({
            "match": {
                field: {
                    "query": text,
                    "fuzziness": max_edits.to_string(),
                    "prefix_length": prefix_length,
                }
            }
        }),
        Query::MultiMatch { text, fields } => json!({
            "multi_match": { "query": text, "fields": fields }
        }),
        Query::Bool(bool_query) => bool_to_dsl(bool_query),
    }
}

fn bool_to_dsl(query: &BoolQuery) -> Value {
    let mut clauses = Map::new();
    if !query.must.is_empty() {
        clauses.insert(
            "must".to_string(),
            Value::Array(query.must.iter().map(query_to_dsl).collect()),
        );
    }
    if !query.should.is_empty() {
        clauses.insert(
            "should".to_string(),
            Value::Array(query.should.iter().map(query_to_dsl).collect()),
        );
    }
    if let Some(minimum) = query.minimum_should_match {
        clauses.insert("minimum_should_match".to_string(), json!(minimum));
    }
    json!({ "bool": clauses })
}

fn range_to_dsl(bounds: &RangeBounds) -> Value {
    let mut range = Map::new();
    let operators = [
        ("gt", bounds.gt),
        ("gte", bounds.gte),
        ("lt", bounds.lt),
        ("lte", bounds.lte),
    ];
    for (op, bound) in operators {
        if let Some(value) = bound {
            // Decimal strings keep full precision; the engine coerces them for numeric fields
            range.insert(op.to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(range)
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(text) => Value::String(text.clone()),
        FieldValue::Decimal(decimal) => Value::String(decimal.to_string()),
        FieldValue::Boolean(flag) => Value::Bool(*flag),
    }
}

/// Body of a `_search` request. `source_fields` restricts the returned `_source`.
pub fn search_body(request: &SearchRequest, source_fields: Option<&[&str]>) -> Value {
    let mut body = Map::new();
    body.insert("query".to_string(), query_to_dsl(&request.query));
    if let Some(size) = request.size {
        body.insert("size".to_string(), json!(size));
    }
    if let Some(fields) = source_fields {
        body.insert("_source".to_string(), json!(fields));
    }
    Value::Object(body)
}

/// Body of a hits-less `_search` request running one terms aggregation over all documents.
pub fn aggregation_body(aggregation: &TermsAggregation) -> Value {
    let mut terms = json!({
        "terms": {
            "field": aggregation.group_field,
            "size": aggregation.size,
        }
    });
    if let Metric::Avg { field } = &aggregation.metric {
        terms["aggs"] = json!({
            METRIC_AGGREGATION: { "avg": { "field": field } }
        });
    }
    json!({
        "size": 0,
        "query": { "match_all": {} },
        "aggs": { aggregation.name.clone(): terms },
    })
}

/// Index creation body carrying the explicit field mapping.
pub fn index_mapping(schema: &IndexSchema) -> Value {
    let properties: Map<String, Value> = schema
        .fields
        .iter()
        .map(|field| {
            let mapping = match field.kind {
                FieldKind::Text => json!({ "type": "text" }),
                FieldKind::Keyword => json!({ "type": "keyword" }),
                FieldKind::Decimal => json!({ "type": "double" }),
                FieldKind::Boolean => json!({ "type": "boolean" }),
            };
            (field.name.clone(), mapping)
        })
        .collect();
    json!({ "mappings": { "properties": properties } })
}
