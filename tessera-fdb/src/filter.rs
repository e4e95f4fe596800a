//! Translation of query predicates into SQL `WHERE` clauses.

use std::collections::BTreeSet;

use rusqlite::types::Value;
use tessera_core::{FeatureQuery, FeatureSetQuery, WILDCARD};

/// A conjunction of SQL clauses with their positional arguments.
#[derive(Debug, Default)]
pub(crate) struct Predicate {
    clauses: Vec<String>,
    pub(crate) args: Vec<Value>,
}

impl Predicate {
    fn push(&mut self, clause: impl Into<String>, args: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.args.extend(args);
    }

    fn any_like(&mut self, column: &str, patterns: &[String]) {
        if patterns.is_empty() {
            return;
        }
        let clause = patterns
            .iter()
            .map(|_| format!("{column} LIKE ? ESCAPE '\\'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.push(
            format!("({clause})"),
            patterns.iter().map(|pattern| Value::Text(like_pattern(pattern))),
        );
    }

    fn any_in(&mut self, column: &str, ids: &BTreeSet<i64>) {
        if ids.is_empty() {
            return;
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        self.push(
            format!("{column} IN ({placeholders})"),
            ids.iter().copied().map(Value::Integer),
        );
    }

    /// `WHERE` clause, or nothing when unconstrained.
    pub(crate) fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Append `LIMIT ? OFFSET ?` arguments for a zero-is-unlimited limit.
    pub(crate) fn paged(&mut self, limit: usize, offset: usize) -> &'static str {
        let limit_arg = if limit == 0 {
            -1
        } else {
            i64::try_from(limit).unwrap_or(i64::MAX)
        };
        self.args.push(Value::Integer(limit_arg));
        self.args
            .push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
        " LIMIT ? OFFSET ?"
    }
}

/// Convert a `%` wildcard pattern into a `LIKE` pattern with `\` escapes.
fn like_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == '\\' || c == '_' {
            escaped.push('\\');
        }
        if c == WILDCARD {
            escaped.push('%');
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Predicate over `features f JOIN featuresets s`.
pub(crate) fn feature_predicate(query: &FeatureQuery) -> Predicate {
    let mut predicate = Predicate::default();
    predicate.any_like("s.provider", &query.providers);
    predicate.any_like("s.type", &query.types);
    predicate.any_like("s.name", &query.feature_set_names);
    predicate.any_in("f.fsid", &query.feature_set_ids);
    predicate.any_in("f.fid", &query.feature_ids);
    predicate.any_like("f.name", &query.feature_names);
    if query.visible_only {
        predicate.push("f.visible = 1 AND s.visible = 1", std::iter::empty());
    }
    if let Some(finest) = query.max_resolution {
        predicate.push(
            "(s.min_resolution <= 0 OR s.min_resolution >= ?)",
            [Value::Real(finest)],
        );
    }
    if let Some(coarsest) = query.min_resolution {
        predicate.push(
            "(s.max_resolution <= 0 OR s.max_resolution <= ?)",
            [Value::Real(coarsest)],
        );
    }
    if let Some(bounds) = query.spatial_filter {
        predicate.push(
            "f.max_x >= ? AND f.min_x <= ? AND f.max_y >= ? AND f.min_y <= ?",
            [
                Value::Real(bounds.min().x),
                Value::Real(bounds.max().x),
                Value::Real(bounds.min().y),
                Value::Real(bounds.max().y),
            ],
        );
    }
    predicate
}

/// Predicate over `featuresets`.
pub(crate) fn feature_set_predicate(query: &FeatureSetQuery) -> Predicate {
    let mut predicate = Predicate::default();
    predicate.any_like("provider", &query.providers);
    predicate.any_like("type", &query.types);
    predicate.any_like("name", &query.names);
    predicate.any_in("id", &query.ids);
    if query.visible_only {
        predicate.push("visible = 1", std::iter::empty());
    }
    predicate
}

/// `ORDER BY` clause for feature set queries.
pub(crate) const fn feature_set_order(query: &FeatureSetQuery) -> &'static str {
    if query.sort_by_name {
        " ORDER BY name COLLATE NOCASE, id"
    } else {
        " ORDER BY id"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("roads", "roads")]
    #[case("road%", "road%")]
    #[case("a_b", "a\\_b")]
    #[case("c:\\x", "c:\\\\x")]
    fn like_patterns_escape_sql_metacharacters(#[case] pattern: &str, #[case] expected: &str) {
        assert_eq!(like_pattern(pattern), expected);
    }

    #[rstest]
    fn empty_query_has_no_where_clause() {
        assert!(feature_predicate(&FeatureQuery::default())
            .where_clause()
            .is_empty());
    }

    #[rstest]
    fn feature_predicate_binds_each_constraint() {
        let query = FeatureQuery::default()
            .with_feature_set_name("roads")
            .with_feature_set_name("paths")
            .with_feature_id(3)
            .visible_only();
        let predicate = feature_predicate(&query);
        let clause = predicate.where_clause();
        assert!(clause.contains("s.name LIKE ? ESCAPE '\\' OR s.name LIKE ?"));
        assert!(clause.contains("f.fid IN (?)"));
        assert!(clause.contains("f.visible = 1"));
        assert_eq!(predicate.args.len(), 3);
    }
}
