// ABOUTME: Object compiler - one query rebuilding the full JSON shape of root entities
// ABOUTME: Relations become LEFT JOINed subqueries, has-many ones grouped with JSON_AGG

use crate::schema::{ManyToOneSchema, OneToManySchema, RootSchema, Schema};
use crate::sql::{column_ref, quote_ident, quote_literal, table_as, QueryBuilder, TableAliases};

const EMPTY_ARRAY: &str = "'[]'::json";

/// How a (sub)query is framed by its caller.
#[derive(Clone, Copy)]
enum Frame<'a> {
    /// Outermost query: identifier projected as `id`, filtered to the ids.
    Root(&'a [String]),
    /// Joined one row per identifier value.
    Joined,
    /// Joined one aggregated row per identifier value.
    Grouped,
}

/// Switches for [`build_objects_query_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectQueryOptions {
    /// Join a has-many straight from a belongs-to column when the has-many
    /// keys on the same column the belongs-to references, leaving out the
    /// table in between. On by default.
    pub skip_middle_tables: bool,
}

impl Default for ObjectQueryOptions {
    fn default() -> Self {
        Self {
            skip_middle_tables: true,
        }
    }
}

/// Builds the query returning one `(id, object)` row per requested id that
/// exists in the root table. Ids without a row are simply absent.
pub fn build_objects_query(root: &RootSchema, ids: &[String]) -> QueryBuilder {
    build_objects_query_with(root, ids, ObjectQueryOptions::default())
}

/// [`build_objects_query`] with explicit options. Turning
/// `skip_middle_tables` off joins every relation as written.
pub fn build_objects_query_with(
    root: &RootSchema,
    ids: &[String],
    options: ObjectQueryOptions,
) -> QueryBuilder {
    let mut aliases = TableAliases::new();
    build_query(
        &mut aliases,
        options,
        &root.table,
        &root.primary_key,
        &root.schema,
        Frame::Root(ids),
    )
}

fn build_query(
    aliases: &mut TableAliases,
    options: ObjectQueryOptions,
    table: &str,
    identifier_column: &str,
    schema: &Schema,
    frame: Frame<'_>,
) -> QueryBuilder {
    let alias = aliases.next_alias(table);
    let identifier = column_ref(&alias, identifier_column);

    let mut query = QueryBuilder::new();
    query.from(table_as(table, &alias));
    let projected_as = match frame {
        Frame::Root(_) => "id",
        Frame::Joined | Frame::Grouped => identifier_column,
    };
    query.select(format!("{} AS {}", identifier, quote_ident(projected_as)));

    let expression = Projection {
        aliases: &mut *aliases,
        options,
        query: &mut query,
        alias: &alias,
    }
    .expression(schema);

    match frame {
        Frame::Grouped => {
            query
                .select(format!("JSON_AGG({}) AS \"object\"", expression))
                .group_by(identifier);
        }
        Frame::Joined => {
            query.select(format!("{} AS \"object\"", expression));
        }
        Frame::Root(ids) => {
            query
                .select(format!("{} AS \"object\"", expression))
                .where_in(&identifier, ids);
        }
    }

    query
}

/// Computes the SQL expression for a schema node evaluated against one
/// aliased table, adding joins to `query` as relations are met.
struct Projection<'q> {
    aliases: &'q mut TableAliases,
    options: ObjectQueryOptions,
    query: &'q mut QueryBuilder,
    alias: &'q str,
}

impl Projection<'_> {
    fn expression(&mut self, schema: &Schema) -> String {
        match schema {
            Schema::Column(s) => column_ref(self.alias, &s.column),
            Schema::Object(s) => {
                let entries: Vec<String> = s
                    .properties
                    .iter()
                    .map(|(name, property)| {
                        format!("{}, {}", quote_literal(name), self.expression(property))
                    })
                    .collect();
                format!("JSON_BUILD_OBJECT({})", entries.join(", "))
            }
            Schema::ManyToOne(s) => self.many_to_one(s),
            Schema::OneToMany(s) => self.one_to_many(&s.column, s),
        }
    }

    fn many_to_one(&mut self, relation: &ManyToOneSchema) -> String {
        // A belongs-to immediately reversed by a has-many on the same key
        // joins the grouped rows straight from this table.
        if let Schema::OneToMany(reverse) = relation.schema.as_ref() {
            if self.options.skip_middle_tables && reverse.column == relation.references_column {
                return self.one_to_many(&relation.column, reverse);
            }
        }

        let joined = self.join(
            &relation.references_table,
            &relation.references_column,
            &relation.schema,
            &relation.column,
            Frame::Joined,
        );
        column_ref(&joined, "object")
    }

    fn one_to_many(&mut self, local_column: &str, relation: &OneToManySchema) -> String {
        let joined = self.join(
            &relation.referencing_table,
            &relation.referencing_column,
            &relation.schema,
            local_column,
            Frame::Grouped,
        );
        format!("COALESCE({}, {})", column_ref(&joined, "object"), EMPTY_ARRAY)
    }

    /// LEFT JOINs the nested query for `table` keyed by `identifier_column`
    /// and returns the alias it is joined under.
    fn join(
        &mut self,
        table: &str,
        identifier_column: &str,
        schema: &Schema,
        local_column: &str,
        frame: Frame<'_>,
    ) -> String {
        let nested = build_query(
            self.aliases,
            self.options,
            table,
            identifier_column,
            schema,
            frame,
        );
        let token = self.query.sub_query(nested);
        let joined = self.aliases.next_alias(table);
        self.query.left_join(
            &format!("({}) AS {}", token, quote_ident(&joined)),
            &column_ref(self.alias, local_column),
            &column_ref(&joined, identifier_column),
        );
        joined
    }
}
