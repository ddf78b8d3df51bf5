pub mod csv;
pub mod glob;
pub mod json;
pub mod parquet;
