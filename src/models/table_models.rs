use crate::error::{Result, UnavailableReason};
use crate::processor::pack_size::{self, PackSize};
use crate::processor::role_resolver::{ColumnRole, RoleResolver, find_column};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

/// One named sheet of an uploaded workbook.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub frame: DataFrame,
}

impl Sheet {
    pub fn new(name: impl Into<String>, frame: DataFrame) -> Self {
        Sheet {
            name: name.into(),
            frame,
        }
    }
}

/// What the concatenator did with its input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcatReport {
    pub sheets: Vec<String>,
    pub rows_per_sheet: Vec<usize>,
    pub dropped_all_null: Vec<String>,
    pub dropped_low_data: Vec<String>,
}

impl ConcatReport {
    pub fn total_rows(&self) -> usize {
        self.rows_per_sheet.iter().sum()
    }
}

/// Names of the region/month/channel columns in a particular table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionColumns {
    pub region: String,
    pub month: String,
    pub channel: Option<String>,
}

impl DimensionColumns {
    /// Resolve dimension columns by role; region and month are required.
    pub fn resolve(
        df: &DataFrame,
        resolver: &dyn RoleResolver,
    ) -> std::result::Result<Self, UnavailableReason> {
        let region = find_column(df, resolver, ColumnRole::Region)
            .ok_or(UnavailableReason::MissingDimension(ColumnRole::Region))?;
        let month = find_column(df, resolver, ColumnRole::Month)
            .ok_or(UnavailableReason::MissingDimension(ColumnRole::Month))?;
        let channel = find_column(df, resolver, ColumnRole::Channel);
        Ok(DimensionColumns {
            region,
            month,
            channel,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.region.as_str(), self.month.as_str()];
        if let Some(channel) = &self.channel {
            names.push(channel.as_str());
        }
        names
    }
}

const RPI_PREFIX: &str = "RPI_";
const RPI_SEPARATOR: &str = "_vs_";

/// Identity of one RPI column: whose price is divided by whose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RpiColumnId {
    pub our_brand: String,
    pub our_pack_size: String,
    pub competitor_brand: String,
    pub competitor_pack_size: String,
}

impl RpiColumnId {
    /// `RPI_{our brand}_{our pack}_vs_{competitor brand}_{competitor pack}`
    pub fn column_name(&self) -> String {
        format!(
            "{}{}_{}{}{}_{}",
            RPI_PREFIX,
            self.our_brand,
            self.our_pack_size,
            RPI_SEPARATOR,
            self.competitor_brand,
            self.competitor_pack_size
        )
    }

    /// Recover the identity from a column name. Both pack-size segments must
    /// re-extract to themselves, otherwise the name is not an RPI column.
    pub fn parse(name: &str) -> Option<Self> {
        let body = name.strip_prefix(RPI_PREFIX)?;
        let (ours, theirs) = body.split_once(RPI_SEPARATOR)?;
        let (our_brand, our_pack) = split_side(ours)?;
        let (competitor_brand, competitor_pack) = split_side(theirs)?;
        Some(RpiColumnId {
            our_brand,
            our_pack_size: our_pack,
            competitor_brand,
            competitor_pack_size: competitor_pack,
        })
    }

    pub fn our_pack(&self) -> Option<PackSize> {
        pack_size::extract(&self.our_pack_size)
    }

    pub fn competitor_pack(&self) -> Option<PackSize> {
        pack_size::extract(&self.competitor_pack_size)
    }
}

fn split_side(side: &str) -> Option<(String, String)> {
    let (brand, pack) = side.rsplit_once('_')?;
    let extracted = pack_size::extract(pack)?;
    if extracted.label != pack || brand.is_empty() {
        return None;
    }
    Some((brand.to_string(), pack.to_string()))
}

/// Coverage of one RPI column added to the enriched table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedColumnReport {
    pub column: String,
    pub rpi_column: RpiColumnId,
    pub matched_rows: usize,
    pub total_rows: usize,
}

impl AddedColumnReport {
    pub fn coverage(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            self.matched_rows as f64 / self.total_rows as f64
        }
    }
}

/// Validate that every named column exists in a frame.
pub fn require_columns(df: &DataFrame, names: &[&str]) -> Result<()> {
    for name in names {
        if df.column(name).is_err() {
            return Err(crate::error::PipelineError::MissingColumn(name.to_string()));
        }
    }
    Ok(())
}
