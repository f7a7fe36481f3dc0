use std::collections::HashSet;
use std::sync::Arc;

use fyllo::{Error, SegmentEngine, SegmentStorage, SqlStorage};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

async fn setup() -> (PgPool, ContainerAsync<Postgres>) {
    let container = Postgres::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let pool = PgPoolOptions::new()
        .connect(&format!(
            "postgres://postgres:postgres@{}:{}/postgres",
            host, port
        ))
        .await
        .unwrap();
    (pool, container)
}

async fn storage_with(pool: &PgPool, tags: &[(&str, u64)]) -> SqlStorage {
    let storage = SqlStorage::from_pool(pool.clone());
    storage.migrate().await.unwrap();
    for (tag, step) in tags {
        assert!(storage.register(tag, *step, "test").await.unwrap());
    }
    storage
}

#[tokio::test]
#[ignore]
async fn obtain_advances_the_cursor_durably() {
    let (pool, _container) = setup().await;
    let storage = storage_with(&pool, &[("order", 5), ("user", 100)]).await;

    assert_eq!(storage.list().await.unwrap(), ["order", "user"]);

    let first = storage.obtain("order").await.unwrap();
    assert_eq!((first.low, first.high), (1, 5));
    assert_eq!(first.description, "test");
    let second = storage.obtain("order").await.unwrap();
    assert_eq!((second.low, second.high), (6, 10));

    let cursor: i64 = sqlx::query_scalar(r#"SELECT "cursor" FROM fyllo_segment WHERE tag = $1"#)
        .bind("order")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(cursor, 10);

    // registering twice leaves the row alone
    assert!(!storage.register("order", 1, "other").await.unwrap());
}

#[tokio::test]
#[ignore]
async fn unknown_tag_is_rejected() {
    let (pool, _container) = setup().await;
    let storage = storage_with(&pool, &[]).await;

    let err = storage.obtain("missing").await.unwrap_err();
    assert!(matches!(err, Error::UnknownTag { .. }));
}

#[tokio::test]
#[ignore]
async fn engines_sharing_a_table_never_overlap() {
    let (pool, _container) = setup().await;
    storage_with(&pool, &[("order", 7)]).await;

    let a = Arc::new(
        SegmentEngine::new("sql", SqlStorage::from_pool(pool.clone()))
            .await
            .unwrap(),
    );
    let b = Arc::new(
        SegmentEngine::new("sql", SqlStorage::from_pool(pool.clone()))
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for engine in [a, b] {
        handles.push(tokio::spawn(async move {
            let mut values = Vec::new();
            for _ in 0..200 {
                values.push(engine.next_value("order").await.unwrap());
            }
            values
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for value in handle.await.unwrap() {
            assert!(seen.insert(value), "value {value} handed out twice");
        }
    }
    assert_eq!(seen.len(), 400);
}
