pub mod frame_utils;
pub mod month_normalizer;
pub mod pack_size;
pub mod price_table;
pub mod role_resolver;
pub mod rpi_enrichment;
pub mod rpi_table;
pub mod sheet_concatenator;

pub use pack_size::{PackSize, PackSizeOrder};
pub use price_table::{PriceTable, PriceTableBuilder};
pub use role_resolver::{ColumnRole, PatternRoleResolver, RoleResolver, find_column, find_columns};
pub use rpi_enrichment::{EnrichedTable, RpiEnricher};
pub use rpi_table::{PriceColumnInfo, RpiTable, RpiTableBuilder, describe_price_column};
pub use sheet_concatenator::{ConcatOptions, ConcatenatedTable, SheetConcatenator, select_sheets};
