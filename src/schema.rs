use sea_query::Iden;

/// Key/value table backing the SQLite local store
#[derive(Iden)]
pub enum KvStore {
    Table,
    Key,
    Value,
    UpdatedAt,
}
