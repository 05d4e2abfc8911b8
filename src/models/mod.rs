pub mod table_models;

pub use table_models::*;
