// ABOUTME: Impact resolver - maps one row change to the root entity ids it affects
// ABOUTME: Ids known from the row image directly, the rest via a reverse-join query

use std::collections::HashSet;

use crate::event::{Action, ChangeEvent};
use crate::schema::{ManyToOneSchema, OneToManySchema, RootSchema, Schema};
use crate::sql::{column_ref, quote_ident, table_as, QueryBuilder, TableAliases};

/// Root ids affected by a change.
#[derive(Debug, Clone, Default)]
pub struct Impact {
    /// Ids read straight off the event, distinct and non-empty.
    pub ids: Vec<String>,
    /// Query selecting further affected ids as an `id` column, when the
    /// event touched rows reachable only through joins.
    pub query: Option<QueryBuilder>,
}

impl Impact {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.query.is_none()
    }
}

/// Works out which root entities `event` may have changed.
///
/// A pure function of its inputs; nothing is executed. The query, if any,
/// must be run against the source database to complete the id set.
pub fn resolve_impact(root: &RootSchema, event: &ChangeEvent) -> Impact {
    let mut resolver = Resolver::new(root, event);

    if event.table == root.table && resolver.root_row_changed() {
        let ids = event.string_values(&root.primary_key);
        resolver.ids.extend(ids);
    }

    let mut path = Vec::new();
    resolver.walk(&root.schema, &root.table, 0, None, &mut path);
    resolver.finish()
}

#[derive(Clone, Copy)]
enum Relation<'a> {
    ManyToOne(&'a ManyToOneSchema),
    OneToMany(&'a OneToManySchema),
}

/// A relation crossed on the way from the root down to the current node.
struct Step<'a> {
    relation: Relation<'a>,
    /// Table the relation starts from.
    table: &'a str,
    depth: usize,
    parent: Option<Relation<'a>>,
}

/// Ids bound at a has-many hit, reusable by a belongs-to right above it
/// that joins on the same column.
struct Leaf {
    column: String,
    values: Vec<String>,
}

/// Partial reverse query being carried toward the root.
struct Found {
    query: QueryBuilder,
    alias: String,
    override_column: Option<String>,
    leaf: Option<Leaf>,
}

struct Resolver<'a> {
    root: &'a RootSchema,
    event: &'a ChangeEvent,
    changed: Vec<&'a str>,
    aliases: TableAliases,
    ids: Vec<String>,
    queries: Vec<QueryBuilder>,
}

fn overlaps(changed: &[&str], columns: &[&str]) -> bool {
    changed.iter().any(|column| columns.contains(column))
}

fn filtered_query(table: &str, alias: &str, column: &str, values: &[String]) -> QueryBuilder {
    let mut query = QueryBuilder::new();
    query
        .from(table_as(table, alias))
        .where_in(&column_ref(alias, column), values);
    query
}

impl<'a> Resolver<'a> {
    fn new(root: &'a RootSchema, event: &'a ChangeEvent) -> Self {
        Self {
            root,
            event,
            changed: event.changed_columns(),
            aliases: TableAliases::new(),
            ids: Vec::new(),
            queries: Vec::new(),
        }
    }

    fn root_row_changed(&self) -> bool {
        match self.event.action {
            Action::Insert | Action::Delete => true,
            Action::Update => {
                let mut columns = vec![self.root.primary_key.as_str()];
                columns.extend(self.root.schema.local_columns());
                overlaps(&self.changed, &columns)
            }
        }
    }

    fn many_to_one_hit(&self, relation: &ManyToOneSchema) -> bool {
        if self.event.table != relation.references_table {
            return false;
        }
        match self.event.action {
            // A constrained reference cannot point at a row that is only now
            // appearing or disappearing.
            Action::Insert | Action::Delete => !relation.has_fk_constraint,
            Action::Update => {
                let mut columns = Vec::new();
                if !relation.has_fk_constraint {
                    columns.push(relation.references_column.as_str());
                }
                columns.extend(relation.schema.local_columns());
                overlaps(&self.changed, &columns)
            }
        }
    }

    fn one_to_many_hit(&self, relation: &OneToManySchema) -> bool {
        if self.event.table != relation.referencing_table {
            return false;
        }
        match self.event.action {
            Action::Insert | Action::Delete => true,
            Action::Update => {
                let mut columns = vec![relation.referencing_column.as_str()];
                columns.extend(relation.schema.local_columns());
                overlaps(&self.changed, &columns)
            }
        }
    }

    fn walk(
        &mut self,
        schema: &'a Schema,
        table: &'a str,
        depth: usize,
        parent: Option<Relation<'a>>,
        path: &mut Vec<Step<'a>>,
    ) {
        match schema {
            Schema::Column(_) => {}
            Schema::Object(object) => {
                for property in object.properties.values() {
                    self.walk(property, table, depth, parent, path);
                }
            }
            Schema::ManyToOne(relation) => {
                if self.many_to_one_hit(relation) {
                    let values = self.event.string_values(&relation.references_column);
                    if depth == 0 && relation.column == self.root.primary_key {
                        self.ids.extend(values);
                    } else {
                        let alias = self.aliases.next_alias(table);
                        let query = filtered_query(table, &alias, &relation.column, &values);
                        self.propagate(
                            Found {
                                query,
                                alias,
                                override_column: None,
                                leaf: None,
                            },
                            path,
                        );
                    }
                }

                let current = Relation::ManyToOne(relation);
                path.push(Step {
                    relation: current,
                    table,
                    depth,
                    parent,
                });
                self.walk(
                    &relation.schema,
                    &relation.references_table,
                    depth + 1,
                    Some(current),
                    path,
                );
                path.pop();
            }
            Schema::OneToMany(relation) => {
                if self.one_to_many_hit(relation) {
                    let values = self.event.string_values(&relation.referencing_column);
                    if depth == 0 && relation.column == self.root.primary_key {
                        self.ids.extend(values);
                    } else {
                        let alias = self.aliases.next_alias(table);
                        let query = filtered_query(table, &alias, &relation.column, &values);
                        self.propagate(
                            Found {
                                query,
                                alias,
                                override_column: None,
                                leaf: Some(Leaf {
                                    column: relation.column.clone(),
                                    values,
                                }),
                            },
                            path,
                        );
                    }
                }

                let current = Relation::OneToMany(relation);
                path.push(Step {
                    relation: current,
                    table,
                    depth,
                    parent,
                });
                self.walk(
                    &relation.schema,
                    &relation.referencing_table,
                    depth + 1,
                    Some(current),
                    path,
                );
                path.pop();
            }
        }
    }

    /// Joins `found` back up through `path`, innermost relation first, and
    /// records the finished query.
    fn propagate(&mut self, mut found: Found, path: &[Step<'a>]) {
        for step in path.iter().rev() {
            match step.relation {
                Relation::ManyToOne(relation) => {
                    let alias = self.aliases.next_alias(step.table);
                    let leaf = found.leaf.take();
                    match leaf {
                        Some(leaf) if leaf.column == relation.references_column => {
                            found.query =
                                filtered_query(step.table, &alias, &relation.column, &leaf.values);
                        }
                        _ => {
                            let target = found
                                .override_column
                                .as_deref()
                                .unwrap_or(&relation.references_column);
                            found.query.inner_join(
                                &table_as(step.table, &alias),
                                &column_ref(&alias, &relation.column),
                                &column_ref(&found.alias, target),
                            );
                        }
                    }
                    found.alias = alias;
                    found.override_column = None;
                }
                Relation::OneToMany(relation) => {
                    found.leaf = None;
                    let column = found
                        .override_column
                        .take()
                        .unwrap_or_else(|| relation.referencing_column.clone());

                    if step.depth == 0 && relation.column == self.root.primary_key {
                        let id = column_ref(&found.alias, &column);
                        found
                            .query
                            .select(format!("{} AS {}", id, quote_ident("id")))
                            .group_by(id);
                        self.queries.push(found.query);
                        return;
                    }

                    // The has-many's own key is what the belongs-to above
                    // joins on, so this table can be skipped.
                    if let Some(Relation::ManyToOne(parent)) = step.parent {
                        if parent.references_column == relation.column {
                            found.override_column = Some(relation.referencing_column.clone());
                            continue;
                        }
                    }

                    let alias = self.aliases.next_alias(step.table);
                    found.query.inner_join(
                        &table_as(step.table, &alias),
                        &column_ref(&alias, &relation.column),
                        &column_ref(&found.alias, &column),
                    );
                    found.alias = alias;
                }
            }
        }

        let id = column_ref(&found.alias, &self.root.primary_key);
        found
            .query
            .select(format!("{} AS {}", id, quote_ident("id")))
            .group_by(id);
        self.queries.push(found.query);
    }

    fn finish(self) -> Impact {
        let mut seen = HashSet::new();
        let ids = self
            .ids
            .into_iter()
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();

        let mut queries = self.queries.into_iter();
        let query = queries.next().map(|mut first| {
            first.union(queries);
            first
        });

        let impact = Impact { ids, query };
        tracing::debug!(
            table = %self.event.table,
            action = self.event.action.as_str(),
            direct_ids = impact.ids.len(),
            has_query = impact.query.is_some(),
            "Resolved change impact"
        );
        impact
    }
}
