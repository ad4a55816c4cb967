//! Structured `where` filters and pagination arguments.
//!
//! [`Where`] serializes to the document-store JSON shape:
//! `{"and":[..]}`, `{"or":[..]}` and `{"<field>":{"equals"|"not_equals"|"in"|"exists": ..}}`.
//! [`Where::matches`] evaluates a filter against a document in-process, which is
//! what [`crate::MemoryStore`] uses.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::store::Document;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    Exists(bool),
}

impl Condition {
    fn operator(&self) -> &'static str {
        match self {
            Condition::Equals(_) => "equals",
            Condition::NotEquals(_) => "not_equals",
            Condition::In(_) => "in",
            Condition::Exists(_) => "exists",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Where {
    /// The empty filter `{}`: matches every row.
    #[default]
    All,
    Field {
        path: String,
        condition: Condition,
    },
    And(Vec<Where>),
    Or(Vec<Where>),
}

impl Where {
    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Where::Field {
            path: path.into(),
            condition: Condition::Equals(value.into()),
        }
    }

    pub fn not_equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Where::Field {
            path: path.into(),
            condition: Condition::NotEquals(value.into()),
        }
    }

    pub fn any_of<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Where::Field {
            path: path.into(),
            condition: Condition::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn exists(path: impl Into<String>, exists: bool) -> Self {
        Where::Field {
            path: path.into(),
            condition: Condition::Exists(exists),
        }
    }

    pub fn and(self, other: Where) -> Self {
        Where::And(vec![self, other])
    }

    pub fn or(self, other: Where) -> Self {
        Where::Or(vec![self, other])
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Where::All => true,
            Where::And(parts) => parts.iter().all(|w| w.matches(doc)),
            Where::Or(parts) => parts.iter().any(|w| w.matches(doc)),
            Where::Field { path, condition } => {
                let found = lookup(doc, path);
                match condition {
                    Condition::Exists(want) => found.iter().any(|v| !v.is_null()) == *want,
                    Condition::Equals(expected) => found.iter().any(|v| loosely_equal(v, expected)),
                    Condition::NotEquals(expected) => {
                        !found.iter().any(|v| loosely_equal(v, expected))
                    }
                    Condition::In(options) => found
                        .iter()
                        .any(|v| options.iter().any(|o| loosely_equal(v, o))),
                }
            }
        }
    }
}

impl Serialize for Where {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Where::All => serializer.serialize_map(Some(0))?.end(),
            Where::And(parts) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("and", parts)?;
                map.end()
            }
            Where::Or(parts) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("or", parts)?;
                map.end()
            }
            Where::Field { path, condition } => {
                let value = match condition {
                    Condition::Equals(v) | Condition::NotEquals(v) => v.clone(),
                    Condition::In(vs) => Value::Array(vs.clone()),
                    Condition::Exists(b) => Value::Bool(*b),
                };
                let mut inner = Map::new();
                inner.insert(condition.operator().to_string(), value);
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(path, &inner)?;
                map.end()
            }
        }
    }
}

/// Collect every value reachable at a dotted path. Arrays fan out, so
/// `domains.domain` reaches the `domain` of each row in `domains`.
fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    let mut current: Vec<&Value> = doc.get(first).into_iter().collect();

    for segment in segments {
        current = current
            .into_iter()
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().filter_map(|i| i.get(segment)).collect(),
                Value::Object(o) => o.get(segment).into_iter().collect(),
                _ => Vec::new(),
            })
            .collect();
    }

    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

/// Relationship fields may hold either an id or a populated `{ id, .. }` document.
fn loosely_equal(stored: &Value, expected: &Value) -> bool {
    if stored == expected {
        return true;
    }
    match (stored, expected) {
        (Value::Object(o), Value::String(_)) => o.get("id") == Some(expected),
        _ => false,
    }
}

/// Arguments for `find` and `find_versions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindArgs {
    pub filter: Where,
    pub limit: Option<usize>,
    pub page: Option<usize>,
    pub depth: Option<usize>,
    pub sort: Option<String>,
    pub pagination: bool,
}

impl FindArgs {
    pub fn new(filter: Where) -> Self {
        Self {
            filter,
            pagination: true,
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self::new(Where::All)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn without_pagination(mut self) -> Self {
        self.pagination = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedDocs {
    pub docs: Vec<Document>,
    pub total_docs: usize,
    pub limit: usize,
    pub page: usize,
    pub total_pages: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PaginatedDocs {
    /// Slice `all` according to `args`. `limit == 0` or `pagination == false`
    /// returns every row on one page.
    pub fn paginate(all: Vec<Document>, args: &FindArgs) -> Self {
        let total_docs = all.len();
        let limit = args.limit.unwrap_or(10);

        if !args.pagination || limit == 0 {
            let docs = if args.pagination || args.limit.is_none() {
                all
            } else {
                all.into_iter().take(limit).collect()
            };
            return Self {
                docs,
                total_docs,
                limit,
                page: 1,
                total_pages: 1,
                has_next_page: false,
                has_prev_page: false,
            };
        }

        let page = args.page.unwrap_or(1).max(1);
        let total_pages = total_docs.div_ceil(limit).max(1);
        let docs = all
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        Self {
            docs,
            total_docs,
            limit,
            page,
            total_pages,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn serializes_to_store_shape() {
        let w = Where::any_of("tenant", ["a", "b"]).or(Where::equals("id", "u1"));
        assert_eq!(
            w.to_value(),
            json!({ "or": [ { "tenant": { "in": ["a", "b"] } }, { "id": { "equals": "u1" } } ] })
        );
        assert_eq!(Where::All.to_value(), json!({}));
    }

    #[test]
    fn dotted_paths_fan_out_over_arrays() {
        let d = doc(json!({ "domains": [ { "domain": "a.test" }, { "domain": "b.test" } ] }));
        assert!(Where::equals("domains.domain", "b.test").matches(&d));
        assert!(!Where::equals("domains.domain", "c.test").matches(&d));
    }

    #[test]
    fn relationship_matches_id_or_populated_doc() {
        let populated = doc(json!({ "tenant": { "id": "t1", "slug": "one" } }));
        let bare = doc(json!({ "tenant": "t1" }));
        let w = Where::any_of("tenant", ["t1"]);
        assert!(w.matches(&populated));
        assert!(w.matches(&bare));
    }

    #[test]
    fn null_parent_does_not_equal_a_string() {
        let d = doc(json!({ "parent": null }));
        assert!(!Where::equals("parent", "t1").matches(&d));
        assert!(Where::exists("parent", false).matches(&d));
    }

    #[test]
    fn paginate_reports_pages() {
        let all: Vec<Document> = (0..5).map(|i| doc(json!({ "n": i }))).collect();
        let page = PaginatedDocs::paginate(all, &FindArgs::all().limit(2).page(3));
        assert_eq!(page.docs.len(), 1);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_prev_page);
        assert!(!page.has_next_page);
    }

    #[test]
    fn huge_page_and_limit_give_an_empty_page() {
        let all: Vec<Document> = (0..3).map(|i| doc(json!({ "n": i }))).collect();
        let page = PaginatedDocs::paginate(all, &FindArgs::all().limit(usize::MAX).page(usize::MAX));
        assert!(page.docs.is_empty());
        assert_eq!(page.total_docs, 3);
        assert_eq!(page.total_pages, 1);
        assert!(!page.has_next_page);
    }
}
