use crate::error::{Result, StageOutcome, UnavailableReason};
use crate::processor::frame_utils::{column_as_f64, column_as_strings, dimension_key};
use crate::processor::month_normalizer;
use crate::processor::role_resolver::{
    ColumnRole, PatternRoleResolver, RoleResolver, find_column, find_columns,
};
use polars::prelude::*;
use tracing::{debug, info};

pub const REGION_COLUMN: &str = "Region";
pub const MONTH_COLUMN: &str = "Month";
pub const CHANNEL_COLUMN: &str = "Channel";
const MONTH_ORDER_COLUMN: &str = "__month_order";
const REGION_KEY_COLUMN: &str = "__region_key";
const CHANNEL_KEY_COLUMN: &str = "__channel_key";

/// One row per unique (region, month, channel) with the mean of every price
/// column. Months are canonical and rows sorted by region, channel and then
/// chronological month.
///
/// Region and channel group by [`dimension_key`], so `North` and `NORTH` are
/// one row, labelled with the first spelling seen.
#[derive(Debug, Clone)]
pub struct PriceTable {
    pub frame: DataFrame,
    pub price_columns: Vec<String>,
}

pub struct PriceTableBuilder {
    resolver: Box<dyn RoleResolver>,
}

impl PriceTableBuilder {
    pub fn new() -> Self {
        PriceTableBuilder {
            resolver: Box::new(PatternRoleResolver::new()),
        }
    }

    pub fn with_resolver(resolver: Box<dyn RoleResolver>) -> Self {
        PriceTableBuilder { resolver }
    }

    pub fn build(&self, table: &DataFrame) -> Result<StageOutcome<PriceTable>> {
        let resolver = self.resolver.as_ref();

        let mut dimensions = Vec::with_capacity(3);
        for role in [ColumnRole::Region, ColumnRole::Month, ColumnRole::Channel] {
            match find_column(table, resolver, role) {
                Some(name) => dimensions.push(name),
                None => {
                    info!("Price table not created: no {} column", role);
                    return Ok(StageOutcome::NotCreated(
                        UnavailableReason::MissingDimension(role),
                    ));
                }
            }
        }

        let skip: Vec<&str> = dimensions.iter().map(|s| s.as_str()).collect();
        let price_columns = find_columns(table, resolver, ColumnRole::Price, &skip);
        if price_columns.is_empty() {
            info!("Price table not created: no price columns");
            return Ok(StageOutcome::NotCreated(UnavailableReason::NoPriceColumns));
        }
        debug!(
            "Price table dimensions: {:?}, price columns: {:?}",
            dimensions, price_columns
        );

        let regions = column_as_strings(table, &dimensions[0])?;
        let months = column_as_strings(table, &dimensions[1])?;
        let channels = column_as_strings(table, &dimensions[2])?;
        let prices = price_columns
            .iter()
            .map(|name| column_as_f64(table, name))
            .collect::<Result<Vec<_>>>()?;

        let keep: Vec<usize> = (0..table.height())
            .filter(|&row| prices.iter().any(|values| values[row].is_some()))
            .filter(|&row| {
                regions[row].is_some() && months[row].is_some() && channels[row].is_some()
            })
            .collect();
        debug!(
            "Keeping {} of {} rows with at least one price and full dimensions",
            keep.len(),
            table.height()
        );

        let mut region_values = Vec::with_capacity(keep.len());
        let mut month_values = Vec::with_capacity(keep.len());
        let mut order_values = Vec::with_capacity(keep.len());
        let mut channel_values = Vec::with_capacity(keep.len());
        let mut region_keys = Vec::with_capacity(keep.len());
        let mut channel_keys = Vec::with_capacity(keep.len());
        for &row in &keep {
            let month = month_normalizer::canonicalize(months[row].as_deref().unwrap_or_default());
            region_keys.push(regions[row].as_deref().map(dimension_key));
            channel_keys.push(channels[row].as_deref().map(dimension_key));
            region_values.push(regions[row].clone());
            month_values.push(month.label);
            order_values.push(month.order);
            channel_values.push(channels[row].clone());
        }

        let mut columns: Vec<Column> = vec![
            Series::new(REGION_COLUMN.into(), region_values).into(),
            Series::new(MONTH_COLUMN.into(), month_values).into(),
            Series::new(CHANNEL_COLUMN.into(), channel_values).into(),
            Series::new(MONTH_ORDER_COLUMN.into(), order_values).into(),
            Series::new(REGION_KEY_COLUMN.into(), region_keys).into(),
            Series::new(CHANNEL_KEY_COLUMN.into(), channel_keys).into(),
        ];
        for (name, values) in price_columns.iter().zip(prices.iter()) {
            let kept: Vec<Option<f64>> = keep.iter().map(|&row| values[row]).collect();
            columns.push(Series::new(name.as_str().into(), kept).into());
        }
        let frame = DataFrame::new(columns)?;

        let mut aggregations: Vec<Expr> =
            vec![col(REGION_COLUMN).first(), col(CHANNEL_COLUMN).first()];
        aggregations.extend(price_columns.iter().map(|name| col(name.as_str()).mean()));
        let mut selection = vec![col(REGION_COLUMN), col(MONTH_COLUMN), col(CHANNEL_COLUMN)];
        selection.extend(price_columns.iter().map(|name| col(name.as_str())));

        let aggregated = frame
            .lazy()
            .group_by([
                col(REGION_KEY_COLUMN),
                col(MONTH_COLUMN),
                col(CHANNEL_KEY_COLUMN),
                col(MONTH_ORDER_COLUMN),
            ])
            .agg(aggregations)
            .sort_by_exprs(
                vec![
                    col(REGION_KEY_COLUMN),
                    col(CHANNEL_KEY_COLUMN),
                    col(MONTH_ORDER_COLUMN),
                    col(MONTH_COLUMN),
                ],
                SortMultipleOptions::default(),
            )
            .select(selection)
            .collect()?;

        info!(
            "Price table created: {} rows x {} price columns",
            aggregated.height(),
            price_columns.len()
        );

        Ok(StageOutcome::Created(PriceTable {
            frame: aggregated,
            price_columns,
        }))
    }
}

impl Default for PriceTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        column_as_strings(df, name).unwrap()
    }

    #[test]
    fn test_duplicates_are_averaged() {
        let table = df!(
            "Region" => ["North", "North"],
            "Month" => ["Feb-22", "Feb 22"],
            "Channel" => ["GT", "GT"],
            "Price A" => [10.0, 12.0],
            "Price B" => [20.0, 18.0],
        )
        .unwrap();

        let outcome = PriceTableBuilder::new().build(&table).unwrap();
        let price = outcome.created().unwrap();

        assert_eq!(price.frame.height(), 1);
        assert_eq!(
            price.frame.column("Price A").unwrap().f64().unwrap().get(0),
            Some(11.0)
        );
        assert_eq!(
            price.frame.column("Price B").unwrap().f64().unwrap().get(0),
            Some(19.0)
        );
        assert_eq!(strings(&price.frame, "Month"), vec![Some("Feb-22".to_string())]);
    }

    #[test]
    fn test_sorted_by_region_channel_then_month() {
        let table = df!(
            "Sales Region" => ["South", "North", "North", "North", "North"],
            "Period" => ["Jan-22", "Mar-22", "Dec-21", "Jan-22", "Feb-22"],
            "Channel" => ["GT", "MT", "GT", "GT", "GT"],
            "Price NTW Sachet" => [1.0, 2.0, 3.0, 4.0, 5.0],
        )
        .unwrap();

        let price = PriceTableBuilder::new()
            .build(&table)
            .unwrap()
            .into_created()
            .unwrap();

        assert_eq!(
            strings(&price.frame, "Region"),
            vec![
                Some("North".to_string()),
                Some("North".to_string()),
                Some("North".to_string()),
                Some("North".to_string()),
                Some("South".to_string()),
            ]
        );
        assert_eq!(
            strings(&price.frame, "Month"),
            vec![
                Some("Dec-21".to_string()),
                Some("Jan-22".to_string()),
                Some("Feb-22".to_string()),
                Some("Mar-22".to_string()),
                Some("Jan-22".to_string()),
            ]
        );
        assert_eq!(
            strings(&price.frame, "Channel"),
            vec![
                Some("GT".to_string()),
                Some("GT".to_string()),
                Some("GT".to_string()),
                Some("MT".to_string()),
                Some("GT".to_string()),
            ]
        );
    }

    #[test]
    fn test_region_and_channel_case_are_one_group() {
        let table = df!(
            "Region" => ["North", "NORTH", " north "],
            "Month" => ["Jan-22", "Jan-22", "Jan-22"],
            "Channel" => ["GT", "gt", "GT"],
            "Price NTW Sachet" => [Some(5.0), None, Some(7.0)],
            "Price NTW 150-250ML" => [None, Some(50.0), None],
        )
        .unwrap();

        let price = PriceTableBuilder::new()
            .build(&table)
            .unwrap()
            .into_created()
            .unwrap();

        assert_eq!(price.frame.height(), 1);
        assert_eq!(strings(&price.frame, "Region"), vec![Some("North".to_string())]);
        assert_eq!(strings(&price.frame, "Channel"), vec![Some("GT".to_string())]);
        assert_eq!(
            column_as_f64(&price.frame, "Price NTW Sachet").unwrap(),
            vec![Some(6.0)]
        );
        assert_eq!(
            column_as_f64(&price.frame, "Price NTW 150-250ML").unwrap(),
            vec![Some(50.0)]
        );
    }

    #[test]
    fn test_rows_without_prices_are_dropped() {
        let table = df!(
            "Region" => ["North", "South"],
            "Month" => ["Feb-22", "Feb-22"],
            "Channel" => ["GT", "GT"],
            "Price A" => [Some(10.0), None],
        )
        .unwrap();

        let price = PriceTableBuilder::new()
            .build(&table)
            .unwrap()
            .into_created()
            .unwrap();
        assert_eq!(price.frame.height(), 1);
        assert_eq!(strings(&price.frame, "Region"), vec![Some("North".to_string())]);
    }

    #[test]
    fn test_unique_keys_after_aggregation() {
        let table = df!(
            "Region" => ["N", "N", "S", "N", "S"],
            "Month" => ["Jan-22", "January 2022", "Jan-22", "Feb-22", "2022-01-01"],
            "Channel" => ["GT", "GT", "GT", "GT", "GT"],
            "Price A" => [1.0, 2.0, 3.0, 4.0, 5.0],
        )
        .unwrap();

        let price = PriceTableBuilder::new()
            .build(&table)
            .unwrap()
            .into_created()
            .unwrap();

        let regions = strings(&price.frame, "Region");
        let months = strings(&price.frame, "Month");
        let channels = strings(&price.frame, "Channel");
        let mut keys: Vec<_> = (0..price.frame.height())
            .map(|i| (regions[i].clone(), months[i].clone(), channels[i].clone()))
            .collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_missing_dimension_is_unavailable() {
        let table = df!(
            "Region" => ["North"],
            "Month" => ["Feb-22"],
            "Price A" => [10.0],
        )
        .unwrap();

        let outcome = PriceTableBuilder::new().build(&table).unwrap();
        assert_eq!(
            outcome.reason(),
            Some(&UnavailableReason::MissingDimension(ColumnRole::Channel))
        );
    }

    #[test]
    fn test_no_price_columns_is_unavailable() {
        let table = df!(
            "Region" => ["North"],
            "Month" => ["Feb-22"],
            "Channel" => ["GT"],
            "Volume" => [10.0],
        )
        .unwrap();

        let outcome = PriceTableBuilder::new().build(&table).unwrap();
        assert_eq!(outcome.reason(), Some(&UnavailableReason::NoPriceColumns));
    }
}
