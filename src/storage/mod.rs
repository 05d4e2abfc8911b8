pub mod pack_size_order_store;
pub mod workbook;

pub use pack_size_order_store::{JsonPackSizeOrderStore, PackSizeOrderStore};
pub use workbook::{read_workbook, write_workbook};
