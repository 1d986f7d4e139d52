pub mod ddl;
pub mod kv;
