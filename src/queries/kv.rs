use sea_query::{Expr, Query, SqliteQueryBuilder};

use crate::schema::KvStore;

/// SELECT value FROM kv_store WHERE key = ?
pub fn select_by_key(key: &str) -> String {
    Query::select()
        .column(KvStore::Value)
        .from(KvStore::Table)
        .and_where(Expr::col(KvStore::Key).eq(key))
        .to_string(SqliteQueryBuilder)
}

/// Upsert with bound parameters (key, value, updated_at).
///
/// Values are bound rather than inlined: the stored value is arbitrary JSON
/// and must round-trip byte for byte.
pub const UPSERT: &str = "INSERT INTO \"kv_store\" (\"key\", \"value\", \"updated_at\") \
     VALUES (?1, ?2, ?3) \
     ON CONFLICT (\"key\") DO UPDATE SET \"value\" = excluded.\"value\", \
     \"updated_at\" = excluded.\"updated_at\"";
