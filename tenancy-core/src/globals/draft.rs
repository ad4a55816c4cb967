//! Whether a read asks for draft content.

use anyhow::Result;
use graphql_parser::query::{
    parse_query, Definition, Document as QueryDocument, Field, OperationDefinition, Selection, Value as GqlValue,
};
use serde_json::{Map, Value};

use crate::errors::TenancyError;
use crate::request::{ApiKind, RequestContext};

/// REST reads use `?draft=1|true`; GraphQL reads use the `draft` argument of
/// the global's top-level query field.
pub fn requested_draft(ctx: &RequestContext, type_name: &str) -> Result<bool> {
    match ctx.api {
        ApiKind::Rest => Ok(matches!(
            ctx.query.get("draft").map(String::as_str),
            Some("1") | Some("true")
        )),
        ApiKind::GraphQL => {
            let Some(source) = ctx.body.get("query").and_then(Value::as_str) else {
                return Ok(false);
            };
            let empty = Map::new();
            let variables = ctx
                .body
                .get("variables")
                .and_then(Value::as_object)
                .unwrap_or(&empty);
            graphql_draft(source, type_name, variables)
        }
        ApiKind::Local => Ok(false),
    }
}

fn parse(source: &str) -> Result<QueryDocument<'_, &str>> {
    parse_query::<&str>(source)
        .map_err(|e| TenancyError::bad_request(format!("Invalid GraphQL query: {e}")).into_anyhow())
}

fn graphql_draft(source: &str, type_name: &str, variables: &Map<String, Value>) -> Result<bool> {
    let document = parse(source)?;
    let draft = query_fields(&document)
        .find(|f| f.name == type_name)
        .and_then(|field| argument(field, "draft", variables));
    Ok(draft.as_ref().is_some_and(truthy))
}

/// Names of the top-level fields of the first query operation, in order.
pub fn selected_query_fields(source: &str) -> Result<Vec<String>> {
    let document = parse(source)?;
    Ok(query_fields(&document).map(|f| f.name.to_string()).collect())
}

fn query_fields<'d, 'a>(document: &'d QueryDocument<'a, &'a str>) -> impl Iterator<Item = &'d Field<'a, &'a str>> {
    let selection_set = document.definitions.iter().find_map(|def| match def {
        Definition::Operation(OperationDefinition::Query(q)) => Some(&q.selection_set),
        Definition::Operation(OperationDefinition::SelectionSet(s)) => Some(s),
        _ => None,
    });

    selection_set
        .into_iter()
        .flat_map(|set| set.items.iter())
        .filter_map(|item| match item {
            Selection::Field(f) => Some(f),
            _ => None,
        })
}

/// Argument value as JSON, with `$variables` resolved. Numeric and enum
/// literals come back as their source text, so `draft: 0` is a non-empty
/// string and asks for drafts.
fn argument<'a>(field: &Field<'a, &'a str>, name: &str, variables: &Map<String, Value>) -> Option<Value> {
    let (_, value) = field.arguments.iter().find(|(arg, _)| *arg == name)?;
    match value {
        GqlValue::Variable(var) => variables.get(*var).cloned(),
        GqlValue::Boolean(b) => Some(Value::Bool(*b)),
        GqlValue::String(s) => Some(Value::String(s.clone())),
        GqlValue::Int(n) => n.as_i64().map(|n| Value::String(n.to_string())),
        GqlValue::Float(f) => Some(Value::String(f.to_string())),
        GqlValue::Enum(e) => Some(Value::String(e.to_string())),
        GqlValue::Null | GqlValue::List(_) | GqlValue::Object(_) => None,
    }
}

/// Loose truthiness: zero, empty strings and null are false, containers are true.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::Array(_) | Value::Object(_) => true,
        Value::Null => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graphql(body: Value) -> RequestContext {
        RequestContext::new().with_api(ApiKind::GraphQL).with_body(body)
    }

    #[test]
    fn rest_reads_query_flag() {
        let ctx = RequestContext::new().with_query("draft", "true");
        assert!(requested_draft(&ctx, "Header").unwrap());
        let ctx = RequestContext::new().with_query("draft", "yes");
        assert!(!requested_draft(&ctx, "Header").unwrap());
        assert!(!requested_draft(&RequestContext::new(), "Header").unwrap());
    }

    #[test]
    fn graphql_literal_argument() {
        let ctx = graphql(json!({ "query": "query { Header(draft: true) { title } }" }));
        assert!(requested_draft(&ctx, "Header").unwrap());

        let ctx = graphql(json!({ "query": "{ Header(draft: false) { title } }" }));
        assert!(!requested_draft(&ctx, "Header").unwrap());
    }

    #[test]
    fn graphql_variable_argument() {
        let ctx = graphql(json!({
            "query": "query Q($d: Boolean) { Footer { id } Header(draft: $d) { title } }",
            "variables": { "d": true }
        }));
        assert!(requested_draft(&ctx, "Header").unwrap());
        assert!(!requested_draft(&ctx, "Footer").unwrap());
    }

    #[test]
    fn graphql_literals_are_judged_by_their_text() {
        let ctx = graphql(json!({ "query": "{ Header(draft: 0) { title } }" }));
        assert!(requested_draft(&ctx, "Header").unwrap());

        let ctx = graphql(json!({ "query": "{ Header(draft: \"\") { title } }" }));
        assert!(!requested_draft(&ctx, "Header").unwrap());
    }

    #[test]
    fn graphql_variables_are_judged_by_their_value() {
        let query = "query Q($d: Int) { Header(draft: $d) { title } }";
        let ctx = graphql(json!({ "query": query, "variables": { "d": 0 } }));
        assert!(!requested_draft(&ctx, "Header").unwrap());

        let ctx = graphql(json!({ "query": query, "variables": { "d": 1 } }));
        assert!(requested_draft(&ctx, "Header").unwrap());

        let ctx = graphql(json!({ "query": query }));
        assert!(!requested_draft(&ctx, "Header").unwrap());
    }

    #[test]
    fn graphql_other_field_is_not_draft() {
        let ctx = graphql(json!({ "query": "query { Footer(draft: true) { id } }" }));
        assert!(!requested_draft(&ctx, "Header").unwrap());
    }

    #[test]
    fn selected_fields_come_from_the_first_query() {
        let fields = selected_query_fields("query { Header { title } Footer(draft: true) { id } }").unwrap();
        assert_eq!(fields, vec!["Header", "Footer"]);
        assert!(selected_query_fields("mutation { Header { id } }").unwrap().is_empty());
    }

    #[test]
    fn graphql_parse_error_is_bad_request() {
        let ctx = graphql(json!({ "query": "query { Header(" }));
        let err = requested_draft(&ctx, "Header").unwrap_err();
        let err = TenancyError::from_anyhow(&err).unwrap();
        assert_eq!(err.code(), 400);
    }
}
