// ABOUTME: Scenario tests for change-impact resolution over multi-level schemas
// ABOUTME: Checks generated reverse-join SQL for deep chains, object branches and unions

use entity_replicator::{resolve_impact, ChangeEvent, Impact, RootSchema, Schema};
use serde_json::{json, Value};

fn row(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn sql(impact: &Impact) -> String {
    impact
        .query
        .as_ref()
        .map(|query| query.to_literal_sql())
        .unwrap_or_default()
}

fn lines(parts: &[&str]) -> String {
    parts.join(" ")
}

fn organization_update() -> ChangeEvent {
    ChangeEvent::update(
        "organization",
        row(json!({"id": "foo", "name": "Alice"})),
        row(json!({"id": "foo", "name": "Bob"})),
    )
}

#[test]
fn double_nested_many_to_one_update() {
    let root = RootSchema::new(
        "comment",
        "id",
        Schema::many_to_one(
            "articleId",
            "article",
            "id",
            true,
            Schema::many_to_one(
                "authorId",
                "user",
                "id",
                true,
                Schema::many_to_one(
                    "organizationId",
                    "organization",
                    "id",
                    true,
                    Schema::column("name"),
                ),
            ),
        ),
    );

    let impact = resolve_impact(&root, &organization_update());
    assert!(impact.ids.is_empty());
    assert_eq!(
        sql(&impact),
        lines(&[
            r#"SELECT "comment_1"."id" AS "id""#,
            r#"FROM "user" AS "user_1""#,
            r#"INNER JOIN "article" AS "article_1" ON "article_1"."authorId" = "user_1"."id""#,
            r#"INNER JOIN "comment" AS "comment_1" ON "comment_1"."articleId" = "article_1"."id""#,
            r#"WHERE "user_1"."organizationId" = 'foo'"#,
            r#"GROUP BY "comment_1"."id""#,
        ])
    );
}

#[test]
fn double_nested_insert_referencing_table() {
    let root = RootSchema::new(
        "organization",
        "id",
        Schema::one_to_many(
            "id",
            "user",
            "organizationId",
            Schema::one_to_many(
                "id",
                "article",
                "authorId",
                Schema::one_to_many("id", "comment", "articleId", Schema::column("message")),
            ),
        ),
    );

    let impact = resolve_impact(
        &root,
        &ChangeEvent::insert("comment", row(json!({"articleId": "foo"}))),
    );
    assert_eq!(
        sql(&impact),
        lines(&[
            r#"SELECT "user_1"."organizationId" AS "id""#,
            r#"FROM "article" AS "article_1""#,
            r#"INNER JOIN "user" AS "user_1" ON "user_1"."id" = "article_1"."authorId""#,
            r#"WHERE "article_1"."id" = 'foo'"#,
            r#"GROUP BY "user_1"."organizationId""#,
        ])
    );
}

fn comment_to_organization(organization: Schema) -> RootSchema {
    RootSchema::new(
        "comment",
        "id",
        Schema::many_to_one(
            "userId",
            "user",
            "id",
            true,
            Schema::many_to_one("organizationId", "organization", "id", true, organization),
        ),
    )
}

#[test]
fn double_nested_many_to_one_one_to_many() {
    let root = comment_to_organization(Schema::one_to_many(
        "id",
        "article",
        "organizationId",
        Schema::column("title"),
    ));

    let impact = resolve_impact(
        &root,
        &ChangeEvent::update(
            "article",
            row(json!({"organizationId": "foo", "title": "Title A"})),
            row(json!({"organizationId": "foo", "title": "Title B"})),
        ),
    );
    assert_eq!(
        sql(&impact),
        lines(&[
            r#"SELECT "comment_1"."id" AS "id""#,
            r#"FROM "user" AS "user_1""#,
            r#"INNER JOIN "comment" AS "comment_1" ON "comment_1"."userId" = "user_1"."id""#,
            r#"WHERE "user_1"."organizationId" = 'foo'"#,
            r#"GROUP BY "comment_1"."id""#,
        ])
    );
}

fn organization_likes() -> Schema {
    Schema::one_to_many(
        "id",
        "article",
        "organizationId",
        Schema::one_to_many("id", "like", "articleId", Schema::column("createdAt")),
    )
}

#[test]
fn triple_nested_many_to_one_one_to_many() {
    let root = comment_to_organization(organization_likes());

    let impact = resolve_impact(
        &root,
        &ChangeEvent::insert("like", row(json!({"articleId": "foo"}))),
    );
    assert_eq!(
        sql(&impact),
        lines(&[
            r#"SELECT "comment_1"."id" AS "id""#,
            r#"FROM "article" AS "article_1""#,
            r#"INNER JOIN "user" AS "user_1" ON "user_1"."organizationId" = "article_1"."organizationId""#,
            r#"INNER JOIN "comment" AS "comment_1" ON "comment_1"."userId" = "user_1"."id""#,
            r#"WHERE "article_1"."id" = 'foo'"#,
            r#"GROUP BY "comment_1"."id""#,
        ])
    );
}

#[test]
fn triple_nested_with_object() {
    let root = comment_to_organization(Schema::object([
        ("name", Schema::column("name")),
        ("likes", organization_likes()),
    ]));

    let insert = resolve_impact(
        &root,
        &ChangeEvent::insert("like", row(json!({"articleId": "foo"}))),
    );
    assert_eq!(
        sql(&insert),
        lines(&[
            r#"SELECT "comment_1"."id" AS "id""#,
            r#"FROM "article" AS "article_1""#,
            r#"INNER JOIN "user" AS "user_1" ON "user_1"."organizationId" = "article_1"."organizationId""#,
            r#"INNER JOIN "comment" AS "comment_1" ON "comment_1"."userId" = "user_1"."id""#,
            r#"WHERE "article_1"."id" = 'foo'"#,
            r#"GROUP BY "comment_1"."id""#,
        ])
    );

    let update = resolve_impact(&root, &organization_update());
    assert_eq!(
        sql(&update),
        lines(&[
            r#"SELECT "comment_1"."id" AS "id""#,
            r#"FROM "user" AS "user_1""#,
            r#"INNER JOIN "comment" AS "comment_1" ON "comment_1"."userId" = "user_1"."id""#,
            r#"WHERE "user_1"."organizationId" = 'foo'"#,
            r#"GROUP BY "comment_1"."id""#,
        ])
    );
}

#[test]
fn skip_middle_table_on_shared_key() {
    let root = RootSchema::new(
        "user",
        "id",
        Schema::many_to_one(
            "organizationId",
            "article",
            "organizationId",
            false,
            Schema::column("title"),
        ),
    );

    let impact = resolve_impact(
        &root,
        &ChangeEvent::update(
            "article",
            row(json!({"organizationId": "foo", "title": "Title A"})),
            row(json!({"organizationId": "foo", "title": "Title B"})),
        ),
    );
    assert_eq!(
        sql(&impact),
        r#"SELECT "user_1"."id" AS "id" FROM "user" AS "user_1" WHERE "user_1"."organizationId" = 'foo' GROUP BY "user_1"."id""#
    );
}

fn followers() -> Schema {
    Schema::one_to_many(
        "id",
        "follows",
        "userId",
        Schema::many_to_one("followsUserId", "user", "id", true, Schema::column("name")),
    )
}

#[test]
fn both_direct_and_indirect() {
    let root = RootSchema::new(
        "user",
        "id",
        Schema::object([("name", Schema::column("name")), ("followers", followers())]),
    );

    let event = ChangeEvent::update(
        "user",
        row(json!({"id": "foo", "name": "Alice"})),
        row(json!({"id": "foo", "name": "Bob"})),
    );
    let impact = resolve_impact(&root, &event);
    assert_eq!(impact.ids, vec!["foo"]);
    assert_eq!(
        sql(&impact),
        lines(&[
            r#"SELECT "follows_1"."userId" AS "id""#,
            r#"FROM "follows" AS "follows_1""#,
            r#"WHERE "follows_1"."followsUserId" = 'foo'"#,
            r#"GROUP BY "follows_1"."userId""#,
        ])
    );
}

#[test]
fn multiple_hits_are_unioned() {
    let root = RootSchema::new(
        "article",
        "id",
        Schema::many_to_one(
            "authorId",
            "user",
            "id",
            true,
            Schema::object([("name", Schema::column("name")), ("follows", followers())]),
        ),
    );

    let event = ChangeEvent::update(
        "user",
        row(json!({"id": "foo", "name": "Alice"})),
        row(json!({"id": "foo", "name": "Bob"})),
    );
    let impact = resolve_impact(&root, &event);
    assert!(impact.ids.is_empty());
    assert_eq!(
        sql(&impact),
        lines(&[
            r#"SELECT "article_1"."id" AS "id""#,
            r#"FROM "article" AS "article_1""#,
            r#"WHERE "article_1"."authorId" = 'foo'"#,
            r#"GROUP BY "article_1"."id""#,
            "UNION",
            r#"SELECT "article_2"."id" AS "id""#,
            r#"FROM "follows" AS "follows_1""#,
            r#"INNER JOIN "article" AS "article_2" ON "article_2"."authorId" = "follows_1"."userId""#,
            r#"WHERE "follows_1"."followsUserId" = 'foo'"#,
            r#"GROUP BY "article_2"."id""#,
        ])
    );

    let compiled = impact.query.unwrap().compile();
    assert_eq!(compiled.values, vec!["foo", "foo"]);
    assert!(compiled.sql.contains(r#""article_1"."authorId" = $1"#));
    assert!(compiled.sql.contains(r#""follows_1"."followsUserId" = $2"#));
}

#[test]
fn same_event_from_json_feed() {
    let root = RootSchema::from_json_str(
        r#"{
            "table": "article",
            "primaryKey": "id",
            "schema": {
                "type": "many-to-one",
                "column": "authorId",
                "referencesTable": "user",
                "referencesColumn": "id",
                "hasFKConstraint": false,
                "schema": {"type": "column", "column": "name"}
            }
        }"#,
    )
    .unwrap();
    let event: ChangeEvent = serde_json::from_str(
        r#"{"table": "user", "action": "DELETE", "dataOld": {"id": "foo", "name": "Alice"}}"#,
    )
    .unwrap();

    let impact = resolve_impact(&root, &event);
    assert_eq!(
        sql(&impact),
        r#"SELECT "article_1"."id" AS "id" FROM "article" AS "article_1" WHERE "article_1"."authorId" = 'foo' GROUP BY "article_1"."id""#
    );
}
