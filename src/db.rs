use log::{info, warn};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Statement};
use std::fs;
use std::path::Path;

use crate::config::AppConfig;

pub async fn connect_db(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let url = config.database_url();
    ensure_sqlite_dir(&url);
    let mut options = ConnectOptions::new(url.clone());
    if url.contains(":memory:") {
        // every pooled connection would otherwise see its own empty database
        options.max_connections(1).min_connections(1);
    }
    options.sqlx_logging(false);
    let db = Database::connect(options).await?;
    init_sqlite_schema(&db).await?;
    Ok(db)
}

fn ensure_sqlite_dir(url: &str) {
    let Some(raw) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return;
    };
    let path = raw.split('?').next().unwrap_or(raw);
    if path.is_empty() || path.contains(":memory:") {
        return;
    }
    if let Some(parent) = Path::new(path).parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!("create sqlite dir {} failed: {}", parent.display(), err);
        }
    }
}

async fn init_sqlite_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    if backend != DatabaseBackend::Sqlite {
        return Ok(());
    }
    let exists_stmt = Statement::from_string(
        backend,
        "SELECT name FROM sqlite_master WHERE type='table' AND name='t_comment' LIMIT 1",
    );
    if db.query_one(exists_stmt).await?.is_some() {
        return Ok(());
    }

    let sql = include_str!("../schema-sqlite.sql");
    for stmt in split_sql(sql) {
        db.execute(Statement::from_string(backend, stmt)).await?;
    }
    info!("sqlite schema initialized");
    Ok(())
}

fn split_sql(input: &str) -> Vec<String> {
    let mut buf = String::new();
    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }
        buf.push_str(line);
        buf.push('\n');
    }
    buf.split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
pub async fn memory_db() -> DatabaseConnection {
    connect_db(&AppConfig::for_test())
        .await
        .expect("in-memory sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sql_skips_comments_and_blanks() {
        let script = "-- users\nCREATE TABLE a (id INTEGER);\n\n-- posts\nCREATE TABLE b (\n  id INTEGER\n);\n";
        let stmts = split_sql(script);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "CREATE TABLE a (id INTEGER)");
        assert!(stmts[1].starts_with("CREATE TABLE b ("));
    }

    #[actix_rt::test]
    async fn schema_bootstrap_is_idempotent() {
        let db = memory_db().await;
        init_sqlite_schema(&db).await.unwrap();
        let row = db
            .query_one(Statement::from_string(
                DatabaseBackend::Sqlite,
                "SELECT count(1) AS cnt FROM sqlite_master WHERE type='table' AND name LIKE 't_%'",
            ))
            .await
            .unwrap()
            .unwrap();
        let cnt: i64 = row.try_get("", "cnt").unwrap();
        assert_eq!(cnt, 4);
    }
}
