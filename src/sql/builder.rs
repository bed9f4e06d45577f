// ABOUTME: Minimal SELECT builder shared by the object compiler and impact resolver
// ABOUTME: Subqueries and bound values are embedded as random tokens, substituted at compile

use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

use super::quote::quote_literal;

/// A compiled statement ready for execution: `$1, $2, ...` placeholders and
/// their values in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub values: Vec<String>,
}

/// SQL text with binding tokens still in place.
struct Rendered {
    sql: String,
    bindings: Vec<(String, String)>,
}

/// Builds a single SELECT statement, optionally unioned with others.
///
/// Clauses are raw SQL fragments; callers quote identifiers themselves (see
/// [`super::quote`]). Values passed to [`QueryBuilder::where_in`] and queries
/// passed to [`QueryBuilder::sub_query`] are kept out of the text until
/// compilation and referenced by tokens nobody can guess, so bound values
/// and nested SQL never get substituted into each other.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    select: Vec<String>,
    from: Option<String>,
    joins: Vec<String>,
    wheres: Vec<String>,
    group_by: Vec<String>,
    unions: Vec<String>,
    bindings: Vec<(String, String)>,
    sub_queries: Vec<(String, QueryBuilder)>,
}

fn new_token() -> String {
    format!("__qb_{}__", Uuid::new_v4().simple())
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(&mut self, from: impl Into<String>) -> &mut Self {
        self.from = Some(from.into());
        self
    }

    pub fn select(&mut self, expression: impl Into<String>) -> &mut Self {
        self.select.push(expression.into());
        self
    }

    pub fn group_by(&mut self, expression: impl Into<String>) -> &mut Self {
        self.group_by.push(expression.into());
        self
    }

    pub fn left_join(&mut self, table: &str, left: &str, right: &str) -> &mut Self {
        self.joins
            .push(format!("LEFT JOIN {} ON {} = {}", table, left, right));
        self
    }

    pub fn inner_join(&mut self, table: &str, left: &str, right: &str) -> &mut Self {
        self.joins
            .push(format!("INNER JOIN {} ON {} = {}", table, left, right));
        self
    }

    /// Filters `column` to the given values.
    ///
    /// Duplicates are dropped keeping first occurrence. A single value
    /// renders as `=`, several as `IN (...)`, none as `FALSE`.
    pub fn where_in<I, S>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut tokens = Vec::new();
        for value in values {
            let value = value.as_ref();
            if !seen.insert(value.to_string()) {
                continue;
            }
            let token = new_token();
            self.bindings.push((token.clone(), value.to_string()));
            tokens.push(token);
        }

        let predicate = match tokens.as_slice() {
            [] => "FALSE".to_string(),
            [single] => format!("{} = {}", column, single),
            many => format!("{} IN ({})", column, many.join(", ")),
        };
        self.wheres.push(predicate);
        self
    }

    /// Embeds `query` and returns the token that stands for its SQL text.
    pub fn sub_query(&mut self, query: QueryBuilder) -> String {
        let token = new_token();
        self.sub_queries.push((token.clone(), query));
        token
    }

    pub fn union<I>(&mut self, queries: I) -> &mut Self
    where
        I: IntoIterator<Item = QueryBuilder>,
    {
        for query in queries {
            let token = self.sub_query(query);
            self.unions.push(token);
        }
        self
    }

    fn render(&self) -> Rendered {
        let mut sql = String::from("SELECT ");
        if self.select.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select.join(", "));
        }

        if let Some(from) = &self.from {
            sql.push_str(" FROM ");
            sql.push_str(from);
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        for token in &self.unions {
            sql.push_str(" UNION ");
            sql.push_str(token);
        }

        let mut bindings = self.bindings.clone();
        for (token, query) in &self.sub_queries {
            let nested = query.render();
            bindings.extend(nested.bindings);
            sql = sql.replace(token.as_str(), &nested.sql);
        }

        Rendered { sql, bindings }
    }

    /// Parameterized rendering for execution.
    pub fn compile(&self) -> CompiledQuery {
        let Rendered { mut sql, bindings } = self.render();
        let mut values = Vec::with_capacity(bindings.len());
        for (index, (token, value)) in bindings.into_iter().enumerate() {
            sql = sql.replace(token.as_str(), &format!("${}", index + 1));
            values.push(value);
        }
        CompiledQuery { sql, values }
    }

    /// Fully inlined rendering with values as quoted literals. For logs and
    /// tests; execute [`QueryBuilder::compile`] instead.
    pub fn to_literal_sql(&self) -> String {
        let Rendered { mut sql, bindings } = self.render();
        for (token, value) in bindings {
            sql = sql.replace(token.as_str(), &quote_literal(&value));
        }
        sql
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_without_columns() {
        let mut query = QueryBuilder::new();
        query.from("\"user\"");
        assert_eq!(query.to_literal_sql(), "SELECT * FROM \"user\"");
    }

    #[test]
    fn test_where_in_single_value_is_equality() {
        let mut query = QueryBuilder::new();
        query.select("id").from("users").where_in("id", ["foo", "foo"]);
        assert_eq!(query.to_literal_sql(), "SELECT id FROM users WHERE id = 'foo'");
    }

    #[test]
    fn test_where_in_many_values() {
        let mut query = QueryBuilder::new();
        query
            .select("id")
            .from("users")
            .where_in("id", ["foo", "bar", "foo"]);
        assert_eq!(
            query.to_literal_sql(),
            "SELECT id FROM users WHERE id IN ('foo', 'bar')"
        );
    }

    #[test]
    fn test_where_in_no_values() {
        let mut query = QueryBuilder::new();
        query
            .select("id")
            .from("users")
            .where_in("id", Vec::<String>::new());
        assert_eq!(query.to_literal_sql(), "SELECT id FROM users WHERE FALSE");
        assert!(query.compile().values.is_empty());
    }

    #[test]
    fn test_literals_are_escaped() {
        let mut query = QueryBuilder::new();
        query.select("id").from("users").where_in("name", ["O'Brien"]);
        assert_eq!(
            query.to_literal_sql(),
            "SELECT id FROM users WHERE name = 'O''Brien'"
        );
    }

    #[test]
    fn test_joins_and_group_by_order() {
        let mut query = QueryBuilder::new();
        query
            .select("a.id")
            .from("a")
            .inner_join("b", "b.a_id", "a.id")
            .left_join("c", "c.a_id", "a.id")
            .where_in("b.x", ["1"])
            .group_by("a.id");
        assert_eq!(
            query.to_literal_sql(),
            "SELECT a.id FROM a INNER JOIN b ON b.a_id = a.id LEFT JOIN c ON c.a_id = a.id WHERE b.x = '1' GROUP BY a.id"
        );
    }

    #[test]
    fn test_sub_query_bindings_are_numbered_after_own() {
        let mut inner = QueryBuilder::new();
        inner.select("user_id").from("follows").where_in("target", ["a", "b"]);

        let mut outer = QueryBuilder::new();
        let token = outer.sub_query(inner);
        outer
            .select("id")
            .from(format!("({}) AS f", token))
            .where_in("id", ["c"]);

        let compiled = outer.compile();
        assert_eq!(
            compiled.sql,
            "SELECT id FROM (SELECT user_id FROM follows WHERE target IN ($2, $3)) AS f WHERE id = $1"
        );
        assert_eq!(compiled.values, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_union() {
        let mut second = QueryBuilder::new();
        second.select("id").from("b").where_in("x", ["2"]);
        let mut third = QueryBuilder::new();
        third.select("id").from("c");

        let mut first = QueryBuilder::new();
        first.select("id").from("a").where_in("x", ["1"]);
        first.union([second, third]);

        let compiled = first.compile();
        assert_eq!(
            compiled.sql,
            "SELECT id FROM a WHERE x = $1 UNION SELECT id FROM b WHERE x = $2 UNION SELECT id FROM c"
        );
        assert_eq!(compiled.values, vec!["1", "2"]);
        assert_eq!(
            first.to_string(),
            "SELECT id FROM a WHERE x = '1' UNION SELECT id FROM b WHERE x = '2' UNION SELECT id FROM c"
        );
    }

    #[test]
    fn test_values_that_look_like_sql_stay_bound() {
        let mut query = QueryBuilder::new();
        query
            .select("id")
            .from("users")
            .where_in("id", ["$1", "x'); DROP TABLE users; --"]);
        let compiled = query.compile();
        assert_eq!(compiled.sql, "SELECT id FROM users WHERE id IN ($1, $2)");
        assert_eq!(compiled.values[0], "$1");
    }
}
