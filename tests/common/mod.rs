#![allow(dead_code)]

use bulk_import::{
    Association, CapabilityPolicy, ColumnSpec, DynamicModel, ImportConfig, SqlType, TableSchema,
    TimestampZone, ValidationRule,
};
use std::sync::Arc;

pub fn config() -> ImportConfig {
    ImportConfig {
        unsupported_capability: CapabilityPolicy::Error,
        default_timezone: TimestampZone::Utc,
        sqlite_max_rows: 500,
        sqlserver_max_rows: 1000,
        mysql_query_overhead: 8,
        default_batch_size: None,
        log_statements: false,
    }
}

pub fn topics() -> Arc<TableSchema> {
    Arc::new(
        TableSchema::new("topics")
            .column(ColumnSpec::new("id", SqlType::Integer))
            .column(ColumnSpec::new("title", SqlType::String).not_null())
            .column(ColumnSpec::new("author_name", SqlType::String))
            .column(ColumnSpec::new("created_at", SqlType::DateTime))
            .column(ColumnSpec::new("updated_at", SqlType::DateTime))
            .validate(ValidationRule::presence("title")),
    )
}

pub fn books() -> Arc<TableSchema> {
    Arc::new(
        TableSchema::new("books")
            .column(ColumnSpec::new("id", SqlType::Integer))
            .column(ColumnSpec::new("title", SqlType::String).not_null())
            .column(ColumnSpec::new("author_name", SqlType::String).not_null())
            .column(ColumnSpec::new("topic_id", SqlType::Integer))
            .column(ColumnSpec::new("created_at", SqlType::DateTime))
            .column(ColumnSpec::new("updated_at", SqlType::DateTime)),
    )
}

pub fn discounts() -> Arc<TableSchema> {
    Arc::new(
        TableSchema::new("discounts")
            .column(ColumnSpec::new("id", SqlType::Integer))
            .column(ColumnSpec::new("amount", SqlType::Float))
            .column(ColumnSpec::new("discountable_id", SqlType::Integer))
            .column(ColumnSpec::new("discountable_type", SqlType::String)),
    )
}

/// `count` new topics, each with `books_each` new books.
pub fn topics_with_books(count: usize, books_each: usize) -> Vec<DynamicModel> {
    let has_books = Association::new("books", "topic_id");
    (0..count)
        .map(|i| {
            let mut topic = DynamicModel::new(topics())
                .with("title", format!("Topic {}", i))
                .with("author_name", "Jane Doe");
            for j in 0..books_each {
                topic.add_child(
                    &has_books,
                    DynamicModel::new(books())
                        .with("title", format!("Book {}.{}", i, j))
                        .with("author_name", "Jane Doe"),
                );
            }
            topic
        })
        .collect()
}
