use crate::error::{Result, StageOutcome, UnavailableReason};
use crate::models::{DimensionColumns, RpiColumnId};
use crate::processor::frame_utils::column_as_f64;
use crate::processor::pack_size::{self, PackSize};
use crate::processor::price_table::{CHANNEL_COLUMN, MONTH_COLUMN, PriceTable, REGION_COLUMN};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info, warn};

const PRICE_WORDS: [&str; 6] = ["avg", "average", "price", "rsp", "asp", "mrp"];

/// Brand and pack size recovered from a price column name.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceColumnInfo {
    pub column: String,
    pub brand: String,
    pub pack_size: Option<PackSize>,
}

/// Split a price column name such as `Price_NTW 150-250ML` into its brand
/// label (`NTW`) and pack size (`150-250ML`).
pub fn describe_price_column(name: &str) -> PriceColumnInfo {
    let found = pack_size::extract_with_span(name);

    // The first match is the pack size; any further size text (as in
    // `NTW Sachet 10ML`) is not part of the brand either.
    let mut remainder = name.to_string();
    while let Some(m) = pack_size::extract_with_span(&remainder) {
        remainder = format!("{} {}", &remainder[..m.start], &remainder[m.end..]);
    }

    let spaced: String = remainder
        .chars()
        .map(|c| if matches!(c, '_' | '-' | ':' | '|' | '(' | ')' | '/') { ' ' } else { c })
        .collect();
    let brand = spaced
        .split_whitespace()
        .filter(|token| {
            let word = token.trim_matches('.').to_lowercase();
            !PRICE_WORDS.contains(&word.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ");

    PriceColumnInfo {
        column: name.to_string(),
        brand,
        pack_size: found.map(|m| m.pack_size),
    }
}

fn normalize_brand(brand: &str) -> String {
    brand.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// RPI values keyed by region, month and channel, one column per
/// (our brand, our pack, competitor brand, competitor pack).
#[derive(Debug, Clone)]
pub struct RpiTable {
    pub frame: DataFrame,
    pub columns: Vec<RpiColumnId>,
    pub dimension_columns: DimensionColumns,
}

pub struct RpiTableBuilder;

impl RpiTableBuilder {
    pub fn new() -> Self {
        RpiTableBuilder
    }

    pub fn build(&self, price: &PriceTable, our_brand: &str) -> Result<StageOutcome<RpiTable>> {
        if our_brand.trim().is_empty() {
            info!("RPI table not created: our brand is empty");
            return Ok(StageOutcome::NotCreated(UnavailableReason::EmptyBrand));
        }
        if price.frame.height() == 0 || price.price_columns.is_empty() {
            info!("RPI table not created: price table is empty");
            return Ok(StageOutcome::NotCreated(UnavailableReason::EmptyPriceTable));
        }

        let wanted = normalize_brand(our_brand);
        let (ours, others): (Vec<PriceColumnInfo>, Vec<PriceColumnInfo>) = price
            .price_columns
            .iter()
            .map(|name| describe_price_column(name))
            .filter(|info| {
                if info.brand.is_empty() {
                    debug!("Price column '{}' has no brand label, ignoring", info.column);
                    false
                } else {
                    true
                }
            })
            .partition(|info| normalize_brand(&info.brand) == wanted);

        if ours.is_empty() {
            info!("RPI table not created: no price columns for brand '{}'", our_brand);
            return Ok(StageOutcome::NotCreated(
                UnavailableReason::NoOurBrandColumns(our_brand.trim().to_string()),
            ));
        }

        let mut generated: Vec<(RpiColumnId, u8, u8, Vec<Option<f64>>)> = Vec::new();
        let mut seen = HashSet::new();

        for our in &ours {
            let Some(our_pack) = &our.pack_size else {
                debug!("Excluding '{}': pack size not recognised", our.column);
                continue;
            };
            let our_prices = column_as_f64(&price.frame, &our.column)?;

            for other in &others {
                let Some(other_pack) = &other.pack_size else {
                    debug!("Excluding '{}': pack size not recognised", other.column);
                    continue;
                };
                let other_prices = column_as_f64(&price.frame, &other.column)?;

                let ratios: Vec<Option<f64>> = our_prices
                    .iter()
                    .zip(other_prices.iter())
                    .map(|(ours, theirs)| match (ours, theirs) {
                        (Some(o), Some(t)) if *t != 0.0 => Some(o / t),
                        _ => None,
                    })
                    .collect();
                if ratios.iter().all(Option::is_none) {
                    debug!(
                        "No comparable values for '{}' vs '{}', skipping",
                        our.column, other.column
                    );
                    continue;
                }

                let id = RpiColumnId {
                    our_brand: our.brand.clone(),
                    our_pack_size: our_pack.label.clone(),
                    competitor_brand: other.brand.clone(),
                    competitor_pack_size: other_pack.label.clone(),
                };
                if !seen.insert(id.column_name()) {
                    warn!(
                        "Duplicate RPI column '{}' from '{}' vs '{}', keeping the first",
                        id.column_name(),
                        our.column,
                        other.column
                    );
                    continue;
                }
                generated.push((id, our_pack.rank, other_pack.rank, ratios));
            }
        }

        if generated.is_empty() {
            info!("RPI table not created: no comparable competitor prices");
            return Ok(StageOutcome::NotCreated(UnavailableReason::NoComparableValues));
        }

        // Near-adjacent comparisons cluster together.
        generated.sort_by_key(|(_, our_rank, their_rank, _)| (*our_rank, *their_rank));

        let mut frame = price
            .frame
            .select([REGION_COLUMN, MONTH_COLUMN, CHANNEL_COLUMN])?;
        let mut columns = Vec::with_capacity(generated.len());
        for (id, _, _, ratios) in generated {
            frame.with_column(Series::new(id.column_name().into(), ratios))?;
            columns.push(id);
        }

        info!(
            "RPI table created: {} rows x {} RPI columns ({} ours, {} competitor price columns)",
            frame.height(),
            columns.len(),
            ours.len(),
            others.len()
        );

        Ok(StageOutcome::Created(RpiTable {
            frame,
            columns,
            dimension_columns: DimensionColumns {
                region: REGION_COLUMN.to_string(),
                month: MONTH_COLUMN.to_string(),
                channel: Some(CHANNEL_COLUMN.to_string()),
            },
        }))
    }
}

impl Default for RpiTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}
