use super::*;
use crate::bind::Binder;
use crate::data::Expression;
use crate::params::PlaceholderStyle;

fn pg() -> QueryShapeBuilder {
    QueryShapeBuilder::new(Dialect::Postgres)
}

fn row(pairs: &[(&str, i64)]) -> Data {
    Data::map(pairs.iter().map(|(k, v)| (*k, *v)))
}

// ==================== Insert shapes ====================

#[test]
fn empty_payload_inserts_defaults() {
    let q = pg().insert("ids", &Data::empty()).unwrap();
    assert_eq!(q.sql, r#"INSERT INTO "ids" DEFAULT VALUES"#);
    assert_eq!(q.shape, Shape::EmptyInsert);
    assert!(q.params.is_empty());

    let q = pg().insert("ids", &Data::map(Vec::<(&str, i32)>::new())).unwrap();
    assert_eq!(q.shape, Shape::EmptyInsert);
}

#[test]
fn empty_payload_without_default_values_support() {
    let q = QueryShapeBuilder::new(Dialect::MySql)
        .insert("ids", &Data::empty())
        .unwrap();
    assert_eq!(q.sql, "INSERT INTO `ids` VALUES ()");
}

#[test]
fn flat_list_is_positional() {
    let q = pg().insert("t", &Data::from(vec![1, 2, 3])).unwrap();
    assert_eq!(q.sql, r#"INSERT INTO "t" VALUES (?, ?, ?)"#);
    assert_eq!(q.shape, Shape::PositionalInsert);
    assert_eq!(q.params.len(), 3);
    assert_eq!(q.params.style(), Some(PlaceholderStyle::Positional));
}

#[test]
fn map_is_named() {
    let payload = Data::map([("id", Data::from(1)), ("name", "x".into())]);
    let q = pg().insert("users", &payload).unwrap();
    assert_eq!(
        q.sql,
        r#"INSERT INTO "users" ("id", "name") VALUES (:id, :name)"#
    );
    assert_eq!(q.shape, Shape::NamedInsert);
    let bound = Binder::bind(&q.params).unwrap();
    assert_eq!(bound.named("id").unwrap().value, Value::Int(1));
    assert_eq!(bound.named("name").unwrap().value, Value::from("x"));
}

#[test]
fn list_of_lists_is_positional_batch() {
    let q = pg()
        .insert("t", &Data::from(vec![vec![1, 2], vec![3, 4]]))
        .unwrap();
    assert_eq!(q.sql, r#"INSERT INTO "t" VALUES (?, ?), (?, ?)"#);
    assert_eq!(q.shape, Shape::BatchPositionalInsert);
    let values: Vec<_> = q.params.iter().map(|(_, v)| v.clone()).collect();
    assert_eq!(
        values,
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
    );
}

#[test]
fn list_of_maps_is_named_batch_with_row_suffixes() {
    let payload = Data::list([row(&[("a", 1), ("b", 2)]), row(&[("a", 3), ("b", 4)])]);
    let q = pg().insert("t", &payload).unwrap();
    assert_eq!(
        q.sql,
        r#"INSERT INTO "t" ("a", "b") VALUES (:a0, :b0), (:a1, :b1)"#
    );
    assert_eq!(q.shape, Shape::BatchNamedInsert);

    let bound = Binder::bind(&q.params).unwrap();
    assert_eq!(bound.len(), 4);
    assert_eq!(bound.named("a1").unwrap().value, Value::Int(3));
    assert_eq!(bound.named("b0").unwrap().value, Value::Int(2));
}

#[test]
fn named_batch_follows_first_row_column_order() {
    let payload = Data::list([row(&[("a", 1), ("b", 2)]), row(&[("b", 4), ("a", 3)])]);
    let q = pg().insert("t", &payload).unwrap();
    let bound = Binder::bind(&q.params).unwrap();
    assert_eq!(bound.named("a1").unwrap().value, Value::Int(3));
    assert_eq!(bound.named("b1").unwrap().value, Value::Int(4));
}

#[test]
fn separately_named_batch() {
    let payload = Data::columns_and_rows(["email", "password_hash"], vec![
        vec!["a@b.com", "h1"],
        vec!["c@d.com", "h2"],
    ]);
    let q = pg().insert("users", &payload).unwrap();
    assert_eq!(
        q.sql,
        r#"INSERT INTO "users" ("email", "password_hash") VALUES (:email0, :password_hash0), (:email1, :password_hash1)"#
    );
    assert_eq!(q.shape, Shape::BatchSeparatelyNamedInsert);
    let bound = Binder::bind(&q.params).unwrap();
    assert_eq!(bound.named("password_hash1").unwrap().value, Value::from("h2"));
}

#[test]
fn separately_named_batch_checks_row_width() {
    let payload = Data::columns_and_rows(["a", "b"], vec![vec![1, 2], vec![3]]);
    let err = pg().insert("t", &payload).unwrap_err();
    assert!(err.is_malformed_batch(), "{err}");
}

#[test]
fn single_element_list_of_rows_is_a_batch() {
    let q = pg().insert("t", &Data::from(vec![vec![1, 2]])).unwrap();
    assert_eq!(q.shape, Shape::BatchPositionalInsert);
    assert_eq!(q.sql, r#"INSERT INTO "t" VALUES (?, ?)"#);

    let q = pg().insert("t", &Data::list([row(&[("a", 1)])])).unwrap();
    assert_eq!(q.shape, Shape::BatchNamedInsert);
    assert_eq!(q.sql, r#"INSERT INTO "t" ("a") VALUES (:a0)"#);
}

#[test]
fn index_keyed_map_is_indistinguishable_from_a_list() {
    // Keys 0, 1, 2 look exactly like a positional list, so no column names are used.
    let payload = Data::map([(0usize, 10), (1usize, 20), (2usize, 30)]);
    let q = pg().insert("t", &payload).unwrap();
    assert_eq!(q.shape, Shape::PositionalInsert);
    assert_eq!(q.sql, r#"INSERT INTO "t" VALUES (?, ?, ?)"#);
}

#[test]
fn mixed_key_payload_is_rejected() {
    let payload = Data::map([(Key::Index(0), Data::from(1)), (Key::from("b"), Data::from(2))]);
    let err = pg().insert("t", &payload).unwrap_err();
    assert!(err.is_mixed_placeholders());
}

#[test]
fn positional_batch_width_mismatch() {
    let err = pg()
        .insert("t", &Data::from(vec![vec![1, 2], vec![3]]))
        .unwrap_err();
    assert!(matches!(err, DbError::MalformedBatch(ref m) if m == "row 1 has 1 values, expected 2"));
}

#[test]
fn named_batch_column_mismatch() {
    let payload = Data::list([row(&[("a", 1), ("b", 2)]), row(&[("a", 3), ("c", 4)])]);
    let err = pg().insert("t", &payload).unwrap_err();
    assert!(matches!(err, DbError::MalformedBatch(ref m) if m.contains("missing column 'b'")));

    let payload = Data::list([row(&[("a", 1)]), row(&[("a", 3), ("b", 4)])]);
    assert!(pg().insert("t", &payload).unwrap_err().is_malformed_batch());
}

#[test]
fn batch_row_that_is_not_a_container() {
    let payload = Data::list([Data::from(vec![1, 2]), Data::from(3)]);
    let err = pg().insert("t", &payload).unwrap_err();
    assert!(matches!(err, DbError::MalformedBatch(ref m) if m == "row 1 is not a list"));
}

#[test]
fn scalar_payload_is_rejected() {
    assert!(matches!(
        pg().insert("t", &Data::from(1)),
        Err(DbError::InvalidPayload(_))
    ));
}

#[test]
fn raw_expression_in_named_insert() {
    let payload = Data::map([
        ("email", Data::from("a@b.com")),
        (
            "password_hash",
            Expression::new("md5(:salt || :email_plain)")
                .bind("salt", "s")
                .bind("email_plain", "p")
                .into(),
        ),
    ]);
    let q = pg().insert("users", &payload).unwrap();
    assert_eq!(
        q.sql,
        r#"INSERT INTO "users" ("email", "password_hash") VALUES (:email, md5(:salt || :email_plain))"#
    );
    assert_eq!(q.params.len(), 3);
}

#[test]
fn generated_names_avoid_expression_params() {
    let payload = Data::map([
        ("a", Data::from(1)),
        ("b", Expression::new(":a + 1").bind("a", 5).into()),
    ]);
    let q = pg().insert("t", &payload).unwrap();
    assert_eq!(q.sql, r#"INSERT INTO "t" ("a", "b") VALUES (:a_w, :a + 1)"#);
    let bound = Binder::bind(&q.params).unwrap();
    assert_eq!(bound.named("a").unwrap().value, Value::Int(5));
    assert_eq!(bound.named("a_w").unwrap().value, Value::Int(1));
}

#[test]
fn blob_values_are_bound_not_inlined() {
    let payload = Data::map([("data", Data::blob(vec![0u8, 159, 146, 150]))]);
    let q = pg().insert("files", &payload).unwrap();
    assert_eq!(q.sql, r#"INSERT INTO "files" ("data") VALUES (:data)"#);
}

// ==================== Update / Delete ====================

#[test]
fn update_by_key() {
    let set = Data::map([("password_hash", "x")]);
    let q = pg()
        .update("users", &set, Some(&KeyFilter::eq("id", 15)), false)
        .unwrap();
    assert_eq!(
        q.sql,
        r#"UPDATE "users" SET "password_hash" = :password_hash WHERE "id" = :id"#
    );
    assert_eq!(q.shape, Shape::Update);
}

#[test]
fn update_key_column_also_set() {
    let set = Data::map([("id", 2)]);
    let q = pg()
        .update("t", &set, Some(&KeyFilter::eq("id", 1)), false)
        .unwrap();
    assert_eq!(q.sql, r#"UPDATE "t" SET "id" = :id WHERE "id" = :id_w"#);
    let bound = Binder::bind(&q.params).unwrap();
    assert_eq!(bound.named("id").unwrap().value, Value::Int(2));
    assert_eq!(bound.named("id_w").unwrap().value, Value::Int(1));
}

#[test]
fn update_with_in_clause() {
    let set = Data::map([("active", false)]);
    let q = pg()
        .update("users", &set, Some(&KeyFilter::any("id", [1, 2, 2, 3])), false)
        .unwrap();
    assert_eq!(
        q.sql,
        r#"UPDATE "users" SET "active" = :active WHERE "id" IN (:id_1, :id_2, :id_3)"#
    );
}

#[test]
fn update_without_key_requires_confirmation() {
    let set = Data::map([("password_hash", "x")]);
    let err = pg().update("users", &set, None, false).unwrap_err();
    assert!(err.is_unconfirmed_mutation());
    assert_eq!(
        err.to_string(),
        "Refusing to update every row of 'users' without explicit confirmation"
    );

    let q = pg().update("users", &set, None, true).unwrap();
    assert_eq!(q.sql, r#"UPDATE "users" SET "password_hash" = :password_hash"#);
}

#[test]
fn update_with_expression() {
    let set = Data::map([
        ("visits", Data::Expr(Expression::new(r#""visits" + :step"#).bind("step", 1))),
        ("seen", Data::from(true)),
    ]);
    let q = pg()
        .update("pages", &set, Some(&KeyFilter::eq("id", 9)), false)
        .unwrap();
    assert_eq!(
        q.sql,
        r#"UPDATE "pages" SET "visits" = "visits" + :step, "seen" = :seen WHERE "id" = :id"#
    );
    assert_eq!(q.params.len(), 3);
}

#[test]
fn update_requires_named_columns() {
    let err = pg()
        .update("t", &Data::from(vec![1, 2]), None, true)
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidPayload(_)));

    let err = pg()
        .update("t", &Data::map(Vec::<(&str, i32)>::new()), None, true)
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidPayload(_)));
}

#[test]
fn delete_in_clause_collapses_duplicates() {
    let q = pg()
        .delete("users", Some(&KeyFilter::any("id", [7, 7, 123])), false)
        .unwrap();
    assert_eq!(q.sql, r#"DELETE FROM "users" WHERE "id" IN (:id_1, :id_2)"#);
    assert_eq!(q.params.len(), 2);
    let bound = Binder::bind(&q.params).unwrap();
    assert_eq!(bound.named("id_1").unwrap().value, Value::Int(7));
    assert_eq!(bound.named("id_2").unwrap().value, Value::Int(123));
}

#[test]
fn delete_without_key_requires_confirmation() {
    let err = pg().delete("users", None, false).unwrap_err();
    assert!(err.is_unconfirmed_mutation());

    let q = pg().delete("users", None, true).unwrap();
    assert_eq!(q.sql, r#"DELETE FROM "users""#);
    assert_eq!(q.shape, Shape::Delete);
}

// ==================== Select / Count ====================

#[test]
fn select_all_and_by_key() {
    assert_eq!(pg().select("users", None).unwrap().sql, r#"SELECT * FROM "users""#);
    let q = pg()
        .select("users", Some(&KeyFilter::eq("email", "a@b.com")))
        .unwrap();
    assert_eq!(q.sql, r#"SELECT * FROM "users" WHERE "email" = :email"#);
}

#[test]
fn null_key_renders_is_null() {
    let q = pg()
        .select("users", Some(&KeyFilter::eq("deleted_at", Value::Null)))
        .unwrap();
    assert_eq!(q.sql, r#"SELECT * FROM "users" WHERE "deleted_at" IS NULL"#);
    assert!(q.params.is_empty());
}

#[test]
fn empty_in_list_matches_nothing() {
    let q = pg()
        .select("users", Some(&KeyFilter::any("id", Vec::<i64>::new())))
        .unwrap();
    assert_eq!(q.sql, r#"SELECT * FROM "users" WHERE "id" IN (NULL)"#);
    assert!(q.params.is_empty());
}

#[test]
fn count_with_and_without_key() {
    assert_eq!(
        pg().count("users", None).unwrap().sql,
        r#"SELECT count(*) FROM "users""#
    );
    let q = pg()
        .count("user_roles", Some(&KeyFilter::eq("user_id", 3)))
        .unwrap();
    assert_eq!(q.sql, r#"SELECT count(*) FROM "user_roles" WHERE "user_id" = :user_id"#);
    assert_eq!(q.shape, Shape::Count);
}

#[test]
fn schema_qualified_table() {
    let q = pg().select("public.users", None).unwrap();
    assert_eq!(q.sql, r#"SELECT * FROM "public"."users""#);
}

#[test]
fn invalid_identifiers_are_rejected() {
    assert!(matches!(
        pg().select("users; DROP TABLE users", None),
        Err(DbError::Validation(_))
    ));
    let set = Data::map([("a b", 1)]);
    assert!(matches!(
        pg().update("t", &set, None, true),
        Err(DbError::Validation(_))
    ));
}

// ==================== Request dispatch ====================

#[test]
fn build_dispatches_on_kind() {
    let b = pg();
    let q = b.build(&OperationRequest::insert("ids", Data::empty())).unwrap();
    assert_eq!(q.shape, Shape::EmptyInsert);

    let q = b
        .build(&OperationRequest::get("users").key("id", 1))
        .unwrap();
    assert_eq!(q.sql, r#"SELECT * FROM "users" WHERE "id" = :id"#);

    let q = b
        .build(&OperationRequest::select_in("users", "id", [1, 2]))
        .unwrap();
    assert_eq!(q.sql, r#"SELECT * FROM "users" WHERE "id" IN (:id_1, :id_2)"#);

    let q = b
        .build(&OperationRequest::update("users", Data::map([("a", 1)])).confirm_all())
        .unwrap();
    assert_eq!(q.sql, r#"UPDATE "users" SET "a" = :a"#);
}

#[test]
fn batch_insert_kind_rejects_single_row() {
    let err = pg()
        .build(&OperationRequest::batch_insert("t", vec![1, 2]))
        .unwrap_err();
    assert!(err.is_malformed_batch());
}

#[test]
fn select_in_kind_requires_value_list() {
    let err = pg()
        .build(&OperationRequest::new(OperationKind::SelectIn, "t").key("id", 1))
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidPayload(_)));
}

#[test]
fn update_kind_requires_payload() {
    let err = pg()
        .build(&OperationRequest::new(OperationKind::Update, "t").key("id", 1))
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidPayload(_)));
}

#[test]
fn returning_appends_quoted_key_to_single_row_inserts() {
    let b = pg();
    let q = b.insert("users", &Data::map([("email", "a@b.com")])).unwrap();
    let q = b.returning(q, "id").unwrap();
    assert_eq!(
        q.sql,
        r#"INSERT INTO "users" ("email") VALUES (:email) RETURNING "id""#
    );
    assert_eq!(q.shape, Shape::NamedInsert);

    let q = b.returning(b.insert("t", &Data::empty()).unwrap(), "Odd\"Id").unwrap();
    assert!(q.sql.ends_with(r#"RETURNING "Odd""Id""#));

    let batch = b.insert("t", &Data::from(vec![vec![1], vec![2]])).unwrap();
    assert!(matches!(b.returning(batch, "id"), Err(DbError::InvalidPayload(_))));
    let select = b.select("t", None).unwrap();
    assert!(b.returning(select, "id").is_err());
}
