use crate::error::{PipelineError, Result};
use crate::models::{AddedColumnReport, DimensionColumns, RpiColumnId, require_columns};
use crate::processor::frame_utils::{column_as_f64, column_as_strings, column_names, dimension_key};
use crate::processor::month_normalizer;
use crate::processor::pack_size::{self, PackSizeOrder};
use crate::processor::role_resolver::{
    ColumnRole, PatternRoleResolver, RoleResolver, find_column,
};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// The primary dataset with the relevant RPI columns attached.
#[derive(Debug, Clone)]
pub struct EnrichedTable {
    pub frame: DataFrame,
    pub added: Vec<AddedColumnReport>,
    /// RPI columns that matched no row and were left out.
    pub pruned: Vec<RpiColumnId>,
}

type JoinKey = (String, String, Option<String>);

struct RpiSource {
    id: RpiColumnId,
    name: String,
    values: Vec<Option<f64>>,
}

pub struct RpiEnricher {
    resolver: Box<dyn RoleResolver>,
    provenance_column: Option<String>,
}

impl RpiEnricher {
    /// `provenance_column` is consulted for a row's pack size when the table
    /// has no pack-size column or the row's cell is empty.
    pub fn new(provenance_column: Option<String>) -> Self {
        RpiEnricher {
            resolver: Box::new(PatternRoleResolver::new()),
            provenance_column,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn RoleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn enrich(
        &self,
        main: &DataFrame,
        rpi: &DataFrame,
        dimensions: &DimensionColumns,
        order: Option<&PackSizeOrder>,
    ) -> Result<EnrichedTable> {
        require_columns(main, &dimensions.names())?;
        let rpi_dimensions = DimensionColumns::resolve(rpi, self.resolver.as_ref())
            .map_err(|reason| PipelineError::MissingColumn(format!("RPI table: {}", reason)))?;

        // Channel joins only when both sides model it.
        let join_channel = match (&dimensions.channel, &rpi_dimensions.channel) {
            (Some(main_channel), Some(rpi_channel)) => Some((main_channel, rpi_channel)),
            _ => None,
        };
        if join_channel.is_none() {
            debug!("Channel is not part of the RPI join key");
        }

        let rpi_keys = join_keys(
            rpi,
            &rpi_dimensions.region,
            &rpi_dimensions.month,
            join_channel.map(|(_, c)| c.as_str()),
        )?;
        // Rows sharing a key are kept in table order; per column the first
        // non-null value among them is used.
        let mut rpi_index: HashMap<JoinKey, Vec<usize>> = HashMap::new();
        for (row, key) in rpi_keys.into_iter().enumerate() {
            if let Some(key) = key {
                rpi_index.entry(key).or_default().push(row);
            }
        }
        let duplicate_keys: usize = rpi_index.values().map(|rows| rows.len() - 1).sum();
        if duplicate_keys > 0 {
            warn!(
                "RPI table has {} rows with a repeated join key, taking the first non-null value of each",
                duplicate_keys
            );
        }

        let sources = self.rpi_sources(rpi)?;
        let mut by_our_pack: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, source) in sources.iter().enumerate() {
            by_our_pack
                .entry(source.id.our_pack_size.as_str())
                .or_default()
                .push(idx);
        }

        let main_keys = join_keys(
            main,
            &dimensions.region,
            &dimensions.month,
            join_channel.map(|(c, _)| c.as_str()),
        )?;
        let row_packs = self.row_pack_sizes(main)?;

        let total_rows = main.height();
        let mut outputs: Vec<Vec<Option<f64>>> = vec![vec![None; total_rows]; sources.len()];
        let mut matched = vec![0usize; sources.len()];

        for row in 0..total_rows {
            let Some(row_pack) = row_packs[row].as_deref() else {
                continue;
            };
            // Subject side must match exactly; only the competitor side may
            // be a neighbour.
            let Some(candidates) = by_our_pack.get(row_pack) else {
                continue;
            };
            let Some(rpi_rows) = main_keys[row].as_ref().and_then(|k| rpi_index.get(k)) else {
                continue;
            };

            for &idx in candidates {
                let source = &sources[idx];
                if !pack_size::adjacent_or_equal(
                    row_pack,
                    &source.id.competitor_pack_size,
                    order,
                ) {
                    continue;
                }
                if let Some(value) = rpi_rows.iter().find_map(|&r| source.values[r]) {
                    outputs[idx][row] = Some(value);
                    matched[idx] += 1;
                }
            }
        }

        let mut frame = main.clone();
        let existing = column_names(main);
        let mut added = Vec::new();
        let mut pruned = Vec::new();

        for ((source, values), matched_rows) in sources.into_iter().zip(outputs).zip(matched) {
            if matched_rows == 0 {
                debug!("Pruning '{}': no row matched", source.name);
                pruned.push(source.id);
                continue;
            }
            if existing.contains(&source.name) {
                warn!("Main table already has '{}', replacing it", source.name);
            }
            frame.with_column(Series::new(source.name.as_str().into(), values))?;
            info!(
                "Added '{}': {}/{} rows matched",
                source.name, matched_rows, total_rows
            );
            added.push(AddedColumnReport {
                column: source.name,
                rpi_column: source.id,
                matched_rows,
                total_rows,
            });
        }

        info!(
            "Enrichment added {} RPI columns, pruned {} without matches",
            added.len(),
            pruned.len()
        );

        Ok(EnrichedTable {
            frame,
            added,
            pruned,
        })
    }

    fn rpi_sources(&self, rpi: &DataFrame) -> Result<Vec<RpiSource>> {
        let mut sources = Vec::new();
        for name in column_names(rpi) {
            let Some(id) = RpiColumnId::parse(&name) else {
                continue;
            };
            let values = column_as_f64(rpi, &name)?;
            sources.push(RpiSource { id, name, values });
        }
        Ok(sources)
    }

    fn row_pack_sizes(&self, main: &DataFrame) -> Result<Vec<Option<String>>> {
        let pack_column = find_column(main, self.resolver.as_ref(), ColumnRole::PackSize);
        let from_column = match &pack_column {
            Some(name) => Some(column_as_strings(main, name)?),
            None => None,
        };
        let from_provenance = match &self.provenance_column {
            Some(name) if main.column(name).is_ok() => Some(column_as_strings(main, name)?),
            _ => None,
        };

        let packs = (0..main.height())
            .map(|row| {
                let explicit = from_column
                    .as_ref()
                    .and_then(|values| values[row].as_deref())
                    .and_then(pack_size::extract);
                explicit
                    .or_else(|| {
                        from_provenance
                            .as_ref()
                            .and_then(|values| values[row].as_deref())
                            .and_then(pack_size::extract)
                    })
                    .map(|p| p.label)
            })
            .collect::<Vec<_>>();

        let unknown = packs.iter().filter(|p| p.is_none()).count();
        if unknown > 0 {
            info!(
                "{} of {} rows have no recognisable pack size and are not enriched",
                unknown,
                packs.len()
            );
        }
        Ok(packs)
    }
}

fn join_keys(
    df: &DataFrame,
    region: &str,
    month: &str,
    channel: Option<&str>,
) -> Result<Vec<Option<JoinKey>>> {
    let regions = column_as_strings(df, region)?;
    let months = column_as_strings(df, month)?;
    let channels = match channel {
        Some(name) => Some(column_as_strings(df, name)?),
        None => None,
    };

    let keys = (0..df.height())
        .map(|row| {
            let region = dimension_key(regions[row].as_deref()?);
            let month = month_normalizer::month_key(months[row].as_deref()?);
            let channel = match &channels {
                Some(values) => Some(dimension_key(values[row].as_deref()?)),
                None => None,
            };
            Some((region, month, channel))
        })
        .collect();
    Ok(keys)
}
