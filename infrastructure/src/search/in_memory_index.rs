//! Local evaluation of the query model against a single product.
//!
//! Mirrors how the search engine treats each field kind: text fields are
//! analyzed into lower-cased tokens, keyword fields compare whole values.
//! Scores are simple term counts, enough to rank hits consistently.

use application::{BoolQuery, Query, RangeBounds};
use domain::{FieldKind, FieldValue, IndexSchema, Product};
use tracing::trace;

/// Score of `product` for `query`, or `None` if it does not match.
pub(crate) fn score(query: &Query, product: &Product, schema: &IndexSchema) -> Option<f64> {
    match query {
        Query::MatchAll => Some(1.0),
        Query::Term { field, value } => {
            let (kind, doc_value) = resolve(field, product, schema)?;
            term_matches(kind, &doc_value, value).then_some(1.0)
        }
        Query::Match { field, text } => {
            let (kind, doc_value) = resolve(field, product, schema)?;
            match_score(kind, &doc_value, text, 0, 0)
        }
        Query::Range { field, bounds } => {
            let (_, doc_value) = resolve(field, product, schema)?;
            range_matches(&doc_value, bounds).then_some(1.0)
        }
        Query::Wildcard { field, pattern } => {
            let (kind, doc_value) = resolve(field, product, schema)?;
            wildcard_field_matches(kind, &doc_value, pattern).then_some(1.0)
        }
        Query::Fuzzy {
            field,
            text,
            max_edits,
            prefix_length,
        } => {
            let (kind, doc_value) = resolve(field, product, schema)?;
            match_score(kind, &doc_value, text, *max_edits as usize, *prefix_length)
        }
        Query::MultiMatch { text, fields } => fields
            .iter()
            .filter_map(|field| {
                let (kind, doc_value) = resolve(field, product, schema)?;
                match_score(kind, &doc_value, text, 0, 0)
            })
            .reduce(f64::max),
        Query::Bool(bool_query) => bool_score(bool_query, product, schema),
    }
}

fn resolve(field: &str, product: &Product, schema: &IndexSchema) -> Option<(FieldKind, FieldValue)> {
    let kind = match schema.kind_of(field) {
        Ok(kind) => kind,
        Err(_) => {
            trace!(field, "Query field not in schema, no match");
            return None;
        }
    };
    Some((kind, product.field_value(field)?))
}

fn bool_score(query: &BoolQuery, product: &Product, schema: &IndexSchema) -> Option<f64> {
    let mut total = 0.0;
    for clause in &query.must {
        total += score(clause, product, schema)?;
    }
    let mut matched_should = 0;
    for clause in &query.should {
        if let Some(clause_score) = score(clause, product, schema) {
            matched_should += 1;
            total += clause_score;
        }
    }
    if matched_should < query.effective_minimum_should_match() {
        return None;
    }
    // A bool without clauses behaves like match_all
    Some(if total > 0.0 { total } else { 1.0 })
}

fn term_matches(kind: FieldKind, doc_value: &FieldValue, value: &FieldValue) -> bool {
    match kind {
        // The operand is not analyzed, so it must equal one indexed token
        FieldKind::Text => analyze(&doc_value.to_string()).contains(&value.to_string()),
        FieldKind::Keyword => doc_value.to_string() == value.to_string(),
        FieldKind::Decimal => match (doc_value.as_decimal(), value.as_decimal()) {
            (Some(doc), Some(expected)) => doc == expected,
            _ => false,
        },
        FieldKind::Boolean => match (doc_value.as_bool(), value.as_bool()) {
            (Some(doc), Some(expected)) => doc == expected,
            _ => false,
        },
    }
}

/// OR-of-terms match. `max_edits > 0` turns on fuzzy term comparison.
fn match_score(
    kind: FieldKind,
    doc_value: &FieldValue,
    text: &str,
    max_edits: usize,
    prefix_length: usize,
) -> Option<f64> {
    match kind {
        FieldKind::Text => {
            let doc_tokens = analyze(&doc_value.to_string());
            let matched = analyze(text)
                .iter()
                .filter(|query_token| {
                    doc_tokens
                        .iter()
                        .any(|doc_token| fuzzy_eq(query_token, doc_token, max_edits, prefix_length))
                })
                .count();
            (matched > 0).then_some(matched as f64)
        }
        FieldKind::Keyword => fuzzy_eq(text, &doc_value.to_string(), max_edits, prefix_length)
            .then_some(1.0),
        FieldKind::Decimal | FieldKind::Boolean => {
            term_matches(kind, doc_value, &FieldValue::Text(text.to_string())).then_some(1.0)
        }
    }
}

fn range_matches(doc_value: &FieldValue, bounds: &RangeBounds) -> bool {
    doc_value
        .as_decimal()
        .is_some_and(|value| bounds.contains(value))
}

fn wildcard_field_matches(kind: FieldKind, doc_value: &FieldValue, pattern: &str) -> bool {
    match kind {
        FieldKind::Text => analyze(&doc_value.to_string())
            .iter()
            .any(|token| wildcard_matches(pattern, token)),
        _ => wildcard_matches(pattern, &doc_value.to_string()),
    }
}

/// Lower-cases and splits on anything that is not alphanumeric.
pub(crate) fn analyze(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn fuzzy_eq(query: &str, candidate: &str, max_edits: usize, prefix_length: usize) -> bool {
    if max_edits == 0 {
        return query == candidate;
    }
    let query_chars: Vec<char> = query.chars().collect();
    let candidate_chars: Vec<char> = candidate.chars().collect();
    let prefix = prefix_length.min(query_chars.len());
    if candidate_chars.len() < prefix || query_chars[..prefix] != candidate_chars[..prefix] {
        return false;
    }
    edit_distance(&query_chars, &candidate_chars) <= max_edits
}

/// Edit distance counting insertions, deletions, substitutions and adjacent
/// transpositions.
pub(crate) fn edit_distance(a: &[char], b: &[char]) -> usize {
    let (n, m) = (a.len(), b.len());
    let mut dist = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in dist.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=m {
        dist[0][j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (dist[i - 1][j] + 1)
                .min(dist[i][j - 1] + 1)
                .min(dist[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(dist[i - 2][j - 2] + 1);
            }
            dist[i][j] = best;
        }
    }
    dist[n][m]
}

/// `*` matches any run of characters, `?` exactly one.
pub(crate) fn wildcard_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
