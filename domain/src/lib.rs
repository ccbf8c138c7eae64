use rust_decimal::Decimal; // Arbitrary-precision price
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error; // For domain-specific errors

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    #[error("Field '{0}' not found in schema")]
    FieldNotFound(String),
    #[error("Invalid product id: {0}")]
    InvalidId(String),
}

/// Field names of the product document as stored in the index.
pub mod fields {
    pub const NAME: &str = "name";
    pub const CATEGORY: &str = "category";
    pub const PRICE: &str = "price";
    pub const IN_STOCK: &str = "inStock";
}

// --- Product ID ---
/// Ids read from a request body go through [`ProductId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Parses a caller-supplied id, rejecting blank values.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidId("id cannot be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl TryFrom<String> for ProductId {
    type Error = DomainError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::parse(&id)
    }
}
impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}
impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Index Schema Definition ---

/// How the search engine treats a field when indexing it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Analyzed free text: tokenized and lower-cased, relevance scored.
    Text,
    /// Exact, non-tokenized value.
    Keyword,
    Decimal,
    Boolean,
}

/// Defines a single field within the index schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

impl FieldMapping {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Explicit per-field indexing treatment for a target index.
/// Handed to the store client at setup; also used to create the index mapping.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexSchema {
    /// Name of the target index. Lowercase, as search engines require.
    pub name: String,
    pub fields: Vec<FieldMapping>,

    #[serde(skip)]
    field_lookup: Option<HashMap<String, FieldMapping>>,
}

impl IndexSchema {
    pub fn new(name: &str, fields: Vec<FieldMapping>) -> Self {
        Self {
            name: name.to_string(),
            fields,
            field_lookup: None,
        }
    }

    /// Validates the schema and precomputes the lookup map.
    pub fn build(mut self) -> Result<Self, DomainError> {
        let name_ok = !self.name.trim().is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'))
            && !self.name.starts_with(['_', '-', '.']);
        if !name_ok {
            return Err(DomainError::InvalidSchema(
                "Index name must be non-empty, lowercase, and may only contain ASCII letters, digits, '_', '-' or '.' (not as first character).".to_string(),
            ));
        }
        if self.fields.is_empty() {
            return Err(DomainError::InvalidSchema(
                "Schema must contain at least one field.".to_string(),
            ));
        }

        let mut field_names = HashSet::new();
        let mut lookup = HashMap::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(DomainError::InvalidSchema(
                    "Field names cannot be empty.".to_string(),
                ));
            }
            if !field_names.insert(field.name.clone()) {
                return Err(DomainError::InvalidSchema(format!(
                    "Duplicate field name found: '{}'",
                    field.name
                )));
            }
            // The document id lives in the engine's metadata, never in the mapping
            if field.name == "id" {
                return Err(DomainError::InvalidSchema(
                    "'id' is a reserved field name and cannot be defined in the schema."
                        .to_string(),
                ));
            }
            lookup.insert(field.name.clone(), field.clone());
        }

        self.field_lookup = Some(lookup);
        Ok(self)
    }

    /// Gets a field definition by name. Returns None until `build()` has run.
    pub fn get_field(&self, name: &str) -> Option<&FieldMapping> {
        self.field_lookup
            .as_ref()
            .and_then(|lookup| lookup.get(name))
    }

    /// Kind of a field, or `FieldNotFound` if the schema does not define it.
    pub fn kind_of(&self, name: &str) -> Result<FieldKind, DomainError> {
        self.get_field(name)
            .map(|field| field.kind)
            .ok_or_else(|| DomainError::FieldNotFound(name.to_string()))
    }
}

// --- Field values ---

/// A typed value of a single product field, used as a query operand.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Decimal(Decimal),
    Boolean(bool),
}

impl FieldValue {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Decimal(value) => Some(*value),
            FieldValue::Text(text) => text.trim().parse().ok(),
            FieldValue::Boolean(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(value) => Some(*value),
            FieldValue::Text(text) => text.trim().parse().ok(),
            FieldValue::Decimal(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Decimal(value) => write!(f, "{}", value),
            FieldValue::Boolean(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}
impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Decimal(value)
    }
}
impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

// --- Product ---

/// The single document type held in the index.
///
/// `id` is absent until the store assigns one. `price` is serialized as a
/// decimal string and accepts either a string or a JSON number on input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProductId>,
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub in_stock: bool,
}

impl Product {
    pub fn new(name: &str, category: &str, price: Decimal, in_stock: bool) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            category: category.to_string(),
            price,
            in_stock,
        }
    }

    /// The schema the product index is created with: `name` is analyzed text,
    /// `category` an exact keyword.
    pub fn index_schema(index_name: &str) -> Result<IndexSchema, DomainError> {
        IndexSchema::new(
            index_name,
            vec![
                FieldMapping::new(fields::NAME, FieldKind::Text),
                FieldMapping::new(fields::CATEGORY, FieldKind::Keyword),
                FieldMapping::new(fields::PRICE, FieldKind::Decimal),
                FieldMapping::new(fields::IN_STOCK, FieldKind::Boolean),
            ],
        )
        .build()
    }

    pub fn id(&self) -> Option<&ProductId> {
        self.id.as_ref()
    }

    pub fn with_id(mut self, id: ProductId) -> Self {
        self.id = Some(id);
        self
    }

    /// Gets a field's value by its index name.
    pub fn field_value(&self, field_name: &str) -> Option<FieldValue> {
        match field_name {
            fields::NAME => Some(FieldValue::Text(self.name.clone())),
            fields::CATEGORY => Some(FieldValue::Text(self.category.clone())),
            fields::PRICE => Some(FieldValue::Decimal(self.price)),
            fields::IN_STOCK => Some(FieldValue::Boolean(self.in_stock)),
            _ => None,
        }
    }
}
