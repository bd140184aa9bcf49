mod common;

use bulk_import::test_support::{TestDatabase, TestDatabaseError};
use bulk_import::{
    DuplicateKeyIgnore, Engine, ImportOptions, ImportRequest, Importer, MySqlSession,
    OnDuplicateKeyUpdate, Value,
};
use common::{config, topics};
use sqlx::MySqlPool;
use testcontainers_modules::mysql::Mysql;

const TOPICS_DDL: &str = "CREATE TABLE topics (
    id INT AUTO_INCREMENT PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    author_name VARCHAR(255),
    created_at DATETIME(6),
    updated_at DATETIME(6)
)";

async fn database(test: &str) -> Option<TestDatabase<MySqlPool, Mysql>> {
    bulk_import::init_logger();
    let db = match TestDatabase::mysql().await {
        Ok(db) => db,
        Err(TestDatabaseError::Disabled) => {
            eprintln!("skipping {test}: BULK_IMPORT_CONTAINER_TESTS not set");
            return None;
        }
        Err(err) => panic!("failed to provision mysql: {err:?}"),
    };
    sqlx::query(TOPICS_DDL)
        .execute(db.pool())
        .await
        .expect("create topics");
    Some(db)
}

async fn count(pool: &MySqlPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM topics")
        .fetch_one(pool)
        .await
        .expect("count")
}

#[tokio::test]
async fn imports_with_a_single_statement() {
    let Some(db) = database("imports_with_a_single_statement").await else {
        return;
    };
    let mut conn = db.pool().acquire().await.expect("connection");
    let mut session = MySqlSession::new(&mut conn);
    let mut importer = Importer::with_config(&mut session, Engine::MySql, config());

    let rows = (0..250)
        .map(|i| vec![Value::from(format!("Topic {}", i)), Value::from("O'Brien\\")])
        .collect();
    let result = importer
        .import(&topics(), ImportRequest::values(["title", "author_name"], rows))
        .await
        .expect("import succeeds");

    assert_eq!(result.num_statements, 1);
    assert_eq!(result.rows_affected, 250);
    assert!(result.generated_ids.is_empty());
    assert!(importer.limits().max_allowed_packet.unwrap_or(0) > 0);

    assert_eq!(count(db.pool()).await, 250);
    let author: String = sqlx::query_scalar("SELECT author_name FROM topics LIMIT 1")
        .fetch_one(db.pool())
        .await
        .expect("row");
    assert_eq!(author, "O'Brien\\");
}

#[tokio::test]
async fn on_duplicate_key_update_and_ignore() {
    let Some(db) = database("on_duplicate_key_update_and_ignore").await else {
        return;
    };
    let mut conn = db.pool().acquire().await.expect("connection");
    let mut session = MySqlSession::new(&mut conn);
    let mut importer = Importer::with_config(&mut session, Engine::MySql, config());
    let seeded = |title: &str| vec![vec![Value::from(1), Value::from(title)]];

    importer
        .import(&topics(), ImportRequest::values(["id", "title"], seeded("Seed")))
        .await
        .expect("seed row");

    importer
        .import(
            &topics(),
            ImportRequest::values(["id", "title"], seeded("Updated")).options(
                ImportOptions::default()
                    .on_duplicate_key_update(OnDuplicateKeyUpdate::columns(["title"])),
            ),
        )
        .await
        .expect("upsert succeeds");

    importer
        .import(
            &topics(),
            ImportRequest::values(["id", "title"], seeded("Ignored")).options(
                ImportOptions::default().on_duplicate_key_ignore(DuplicateKeyIgnore::On),
            ),
        )
        .await
        .expect("ignore succeeds");

    let title: String = sqlx::query_scalar("SELECT title FROM topics WHERE id = 1")
        .fetch_one(db.pool())
        .await
        .expect("row");
    assert_eq!(title, "Updated");
    assert_eq!(count(db.pool()).await, 1);
}
