use sea_query::{ColumnDef, SqliteQueryBuilder, Table};

use crate::schema::KvStore;

/// CREATE TABLE IF NOT EXISTS kv_store (
///     key TEXT PRIMARY KEY,
///     value TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// )
pub fn create_kv_store_table() -> String {
    Table::create()
        .table(KvStore::Table)
        .if_not_exists()
        .col(ColumnDef::new(KvStore::Key).string().primary_key())
        .col(ColumnDef::new(KvStore::Value).text().not_null())
        .col(ColumnDef::new(KvStore::UpdatedAt).string().not_null())
        .to_string(SqliteQueryBuilder)
}
