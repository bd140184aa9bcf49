mod common;

use bulk_import::test_support::{TestDatabase, TestDatabaseError};
use bulk_import::{
    ColumnSpec, ConflictTarget, DuplicateKeyIgnore, Engine, ImportOptions, ImportRequest, Importer,
    OnDuplicateKeyUpdate, PgSession, Record, SqlType, TableSchema, Value, model_refs,
};
use common::{config, topics, topics_with_books};
use sqlx::PgPool;
use testcontainers_modules::postgres::Postgres;

async fn database(test: &str) -> Option<TestDatabase<PgPool, Postgres>> {
    bulk_import::init_logger();
    match TestDatabase::postgres().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::Disabled) => {
            eprintln!("skipping {test}: BULK_IMPORT_CONTAINER_TESTS not set");
            None
        }
        Err(err) => panic!("failed to provision postgres: {err:?}"),
    }
}

fn isbn_books() -> TableSchema {
    TableSchema::new("books")
        .column(ColumnSpec::new("id", SqlType::Integer))
        .column(ColumnSpec::new("title", SqlType::String))
        .column(ColumnSpec::new("author_name", SqlType::String))
        .column(ColumnSpec::new("isbn", SqlType::String))
        .column(ColumnSpec::new("created_at", SqlType::DateTime))
        .column(ColumnSpec::new("updated_at", SqlType::DateTime))
}

fn book(title: &str, isbn: &str) -> Record {
    Record::new()
        .with("title", title)
        .with("author_name", "Jane Doe")
        .with("isbn", isbn)
}

#[tokio::test]
async fn returning_ids_follow_input_order() {
    let Some(db) = database("returning_ids_follow_input_order").await else {
        return;
    };
    let mut conn = db.pool().acquire().await.expect("connection");
    let mut session = PgSession::new(&mut conn);
    let mut importer = Importer::with_config(&mut session, Engine::Postgres, config());

    let result = importer
        .import(
            &topics(),
            ImportRequest::values(
                ["title", "author_name"],
                vec![
                    vec!["First".into(), "A".into()],
                    vec!["Second".into(), "B".into()],
                    vec!["Third".into(), "C".into()],
                ],
            )
            .options(ImportOptions::default().returning(["title"])),
        )
        .await
        .expect("import succeeds");

    assert_eq!(result.num_statements, 1);
    assert_eq!(result.generated_ids.len(), 3);
    let returned: Vec<_> = result
        .returned_rows
        .iter()
        .filter_map(|row| row.get("title").and_then(Value::as_str))
        .collect();
    assert_eq!(returned, vec!["First", "Second", "Third"]);

    for (id, title) in result.generated_ids.iter().zip(["First", "Second", "Third"]) {
        let stored: String = sqlx::query_scalar("SELECT title FROM topics WHERE id = $1")
            .bind(id.as_i64().expect("integer id") as i32)
            .fetch_one(db.pool())
            .await
            .expect("row exists");
        assert_eq!(stored, title);
    }
}

#[tokio::test]
async fn upsert_on_named_constraint() {
    let Some(db) = database("upsert_on_named_constraint").await else {
        return;
    };
    let mut conn = db.pool().acquire().await.expect("connection");
    let mut session = PgSession::new(&mut conn);
    let mut importer = Importer::with_config(&mut session, Engine::Postgres, config());
    let schema = isbn_books();

    importer
        .import(
            &schema,
            ImportRequest::records(vec![book("Draft", "isbn-1"), book("Other", "isbn-2")]),
        )
        .await
        .expect("seed rows");

    let result = importer
        .import(
            &schema,
            ImportRequest::records(vec![book("Final", "isbn-1"), book("New", "isbn-3")]).options(
                ImportOptions::default().on_duplicate_key_update(
                    OnDuplicateKeyUpdate::columns(["title"])
                        .conflict_target(ConflictTarget::constraint("books_isbn_key")),
                ),
            ),
        )
        .await
        .expect("upsert succeeds");
    assert_eq!(result.generated_ids.len(), 2);

    let title: String = sqlx::query_scalar("SELECT title FROM books WHERE isbn = 'isbn-1'")
        .fetch_one(db.pool())
        .await
        .expect("row exists");
    assert_eq!(title, "Final");
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
        .fetch_one(db.pool())
        .await
        .expect("count");
    assert_eq!(total, 3);
}

#[tokio::test]
async fn do_nothing_withholds_mismatched_ids() {
    let Some(db) = database("do_nothing_withholds_mismatched_ids").await else {
        return;
    };
    let mut conn = db.pool().acquire().await.expect("connection");
    let mut session = PgSession::new(&mut conn);
    let mut importer = Importer::with_config(&mut session, Engine::Postgres, config());
    let schema = isbn_books();

    importer
        .import(&schema, ImportRequest::records(vec![book("Kept", "isbn-9")]))
        .await
        .expect("seed row");

    let result = importer
        .import(
            &schema,
            ImportRequest::records(vec![book("Dup", "isbn-9"), book("Added", "isbn-10")]).options(
                ImportOptions::default().on_duplicate_key_ignore(DuplicateKeyIgnore::Target(
                    ConflictTarget::columns(["isbn"]),
                )),
            ),
        )
        .await
        .expect("ignore succeeds");

    assert!(result.generated_ids.is_empty());
    let title: String = sqlx::query_scalar("SELECT title FROM books WHERE isbn = 'isbn-9'")
        .fetch_one(db.pool())
        .await
        .expect("row exists");
    assert_eq!(title, "Kept");
}

#[tokio::test]
async fn recursive_import_writes_foreign_keys() {
    let Some(db) = database("recursive_import_writes_foreign_keys").await else {
        return;
    };
    let mut parents = topics_with_books(3, 2);
    let mut conn = db.pool().acquire().await.expect("connection");
    let mut session = PgSession::new(&mut conn);
    let mut importer = Importer::with_config(&mut session, Engine::Postgres, config());

    let result = importer
        .import(
            &topics(),
            ImportRequest::models(model_refs(&mut parents))
                .options(ImportOptions::default().recursive(true)),
        )
        .await
        .expect("import succeeds");
    assert_eq!(result.total_statements(), 2);

    for topic in &parents {
        let id = topic.id().as_i64().expect("topic id assigned") as i32;
        let books: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE topic_id = $1")
            .bind(id)
            .fetch_one(db.pool())
            .await
            .expect("count");
        assert_eq!(books, 2);
    }
}

#[tokio::test]
async fn sequences_fill_keys_and_reserve_ranges() {
    let Some(db) = database("sequences_fill_keys_and_reserve_ranges").await else {
        return;
    };
    let widgets = TableSchema::new("widgets")
        .sequence("widget_seq")
        .record_timestamps(false)
        .column(ColumnSpec::new("id", SqlType::Integer))
        .column(ColumnSpec::new("w_id", SqlType::Integer))
        .column(ColumnSpec::new("data", SqlType::Text));

    let mut conn = db.pool().acquire().await.expect("connection");
    let mut session = PgSession::new(&mut conn);
    let mut importer = Importer::with_config(&mut session, Engine::Postgres, config());

    let result = importer
        .import(
            &widgets,
            ImportRequest::values(
                ["w_id", "data"],
                vec![vec![1.into(), "a".into()], vec![2.into(), "b".into()]],
            ),
        )
        .await
        .expect("import succeeds");
    assert_eq!(result.generated_ids, vec![Value::Int(1), Value::Int(2)]);

    let first = importer
        .reserve_sequence_range("widget_seq", 10)
        .await
        .expect("reservation");
    assert_eq!(first, 3);

    let next: i64 = sqlx::query_scalar("SELECT nextval('widget_seq')")
        .fetch_one(db.pool())
        .await
        .expect("nextval");
    assert_eq!(next, 13);
}

#[tokio::test]
async fn sequences_leave_supplied_keys_alone() {
    let Some(db) = database("sequences_leave_supplied_keys_alone").await else {
        return;
    };
    let widgets = TableSchema::new("widgets")
        .sequence("widget_seq")
        .record_timestamps(false)
        .column(ColumnSpec::new("id", SqlType::Integer))
        .column(ColumnSpec::new("w_id", SqlType::Integer))
        .column(ColumnSpec::new("data", SqlType::Text));

    let mut conn = db.pool().acquire().await.expect("connection");
    let mut session = PgSession::new(&mut conn);
    let mut importer = Importer::with_config(&mut session, Engine::Postgres, config());

    importer
        .import(
            &widgets,
            ImportRequest::values(["id", "w_id", "data"], vec![vec![42.into(), 1.into(), "a".into()]]),
        )
        .await
        .expect("import succeeds");

    let stored: i32 = sqlx::query_scalar("SELECT w_id FROM widgets WHERE id = 42")
        .fetch_one(db.pool())
        .await
        .expect("row keeps its key");
    assert_eq!(stored, 1);
    let next: i64 = sqlx::query_scalar("SELECT nextval('widget_seq')")
        .fetch_one(db.pool())
        .await
        .expect("nextval");
    assert_eq!(next, 1, "sequence was not drawn");
}
