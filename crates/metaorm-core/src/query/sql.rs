//! SQL text helpers shared by the compiler, the loader and entity writes.

use crate::cast::Affinity;
use crate::catalog::EntityModel;
use crate::error::Error;
use metaorm_proto::{FilterExpr, Raw, Value};

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `alias."column"`.
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quote_ident(column))
}

/// Wrap an expression so it compares under the given affinity.
pub fn comparable(expr: &str, affinity: Affinity) -> String {
    match affinity.sql_type() {
        Some(ty) => format!("CAST({} AS {})", expr, ty),
        None => expr.to_string(),
    }
}

/// `?, ?, ?` for `n` placeholders.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Render a column filter against a table alias.
///
/// Values are encoded through the column's cast and pushed onto `bindings`
/// in textual order.
pub fn render_filter(
    expr: &FilterExpr,
    alias: &str,
    model: &EntityModel,
    bindings: &mut Vec<Raw>,
) -> Result<String, Error> {
    let compare = |field: &str,
                   op: &str,
                   value: &Value,
                   bindings: &mut Vec<Raw>|
     -> Result<String, Error> {
        bindings.push(model.column_cast(field).encode(value)?);
        Ok(format!("{} {} ?", qualified(alias, field), op))
    };

    match expr {
        FilterExpr::Eq { field, value } => compare(field, "=", value, bindings),
        FilterExpr::Ne { field, value } => compare(field, "!=", value, bindings),
        FilterExpr::Lt { field, value } => compare(field, "<", value, bindings),
        FilterExpr::Le { field, value } => compare(field, "<=", value, bindings),
        FilterExpr::Gt { field, value } => compare(field, ">", value, bindings),
        FilterExpr::Ge { field, value } => compare(field, ">=", value, bindings),
        FilterExpr::In { field, values } | FilterExpr::NotIn { field, values } => {
            let negated = matches!(expr, FilterExpr::NotIn { .. });
            if values.is_empty() {
                return Ok(if negated { "1 = 1" } else { "1 = 0" }.to_string());
            }
            let cast = model.column_cast(field);
            for value in values {
                bindings.push(cast.encode(value)?);
            }
            Ok(format!(
                "{} {}IN ({})",
                qualified(alias, field),
                if negated { "NOT " } else { "" },
                placeholders(values.len())
            ))
        }
        FilterExpr::IsNull { field } => Ok(format!("{} IS NULL", qualified(alias, field))),
        FilterExpr::IsNotNull { field } => {
            Ok(format!("{} IS NOT NULL", qualified(alias, field)))
        }
        FilterExpr::Like { field, pattern } => {
            bindings.push(Raw::Text(pattern.clone()));
            Ok(format!("{} LIKE ?", qualified(alias, field)))
        }
        FilterExpr::NotLike { field, pattern } => {
            bindings.push(Raw::Text(pattern.clone()));
            Ok(format!("{} NOT LIKE ?", qualified(alias, field)))
        }
        FilterExpr::And(parts) => render_group(parts, " AND ", "1 = 1", alias, model, bindings),
        FilterExpr::Or(parts) => render_group(parts, " OR ", "1 = 0", alias, model, bindings),
    }
}

fn render_group(
    parts: &[FilterExpr],
    joiner: &str,
    empty: &str,
    alias: &str,
    model: &EntityModel,
    bindings: &mut Vec<Raw>,
) -> Result<String, Error> {
    if parts.is_empty() {
        return Ok(empty.to_string());
    }
    let rendered = parts
        .iter()
        .map(|part| render_filter(part, alias, model, bindings))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", rendered.join(joiner)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::CastRegistry;
    use crate::catalog::EntityDef;

    fn model() -> EntityModel {
        let def = EntityDef::new("Post", "posts")
            .with_cast("menu_order", "integer")
            .with_cast("sticky", "boolean");
        EntityModel::resolve(def, &CastRegistry::with_builtins()).unwrap()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("posts"), "\"posts\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified("t", "ID"), "t.\"ID\"");
    }

    #[test]
    fn test_render_nested_filter() {
        let filter = FilterExpr::and(vec![
            FilterExpr::eq("post_status", "publish"),
            FilterExpr::or(vec![
                FilterExpr::ge("menu_order", 3i64),
                FilterExpr::eq("sticky", true),
            ]),
        ]);
        let mut bindings = Vec::new();
        let sql = render_filter(&filter, "t", &model(), &mut bindings).unwrap();

        assert_eq!(
            sql,
            "(t.\"post_status\" = ? AND (t.\"menu_order\" >= ? OR t.\"sticky\" = ?))"
        );
        assert_eq!(
            bindings,
            vec![Raw::Text("publish".into()), Raw::Integer(3), Raw::Integer(1)]
        );
    }

    #[test]
    fn test_empty_in_list() {
        let mut bindings = Vec::new();
        let m = model();
        assert_eq!(
            render_filter(&FilterExpr::in_values("ID", vec![]), "t", &m, &mut bindings).unwrap(),
            "1 = 0"
        );
        assert_eq!(
            render_filter(&FilterExpr::not_in_values("ID", vec![]), "t", &m, &mut bindings)
                .unwrap(),
            "1 = 1"
        );
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_encode_failure_surfaces() {
        let mut bindings = Vec::new();
        let err = render_filter(
            &FilterExpr::eq("menu_order", "first"),
            "t",
            &model(),
            &mut bindings,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CastEncode { tag, .. } if tag == "integer"));
    }

    #[test]
    fn test_comparable() {
        assert_eq!(comparable("m.v", Affinity::Integer), "CAST(m.v AS INTEGER)");
        assert_eq!(comparable("m.v", Affinity::Text), "m.v");
    }
}
