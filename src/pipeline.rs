use crate::error::{Result, StageOutcome, UnavailableReason};
use crate::models::{AddedColumnReport, ConcatReport, DimensionColumns, Sheet};
use crate::processor::{
    ConcatOptions, ConcatenatedTable, EnrichedTable, PackSizeOrder, PatternRoleResolver,
    PriceTable, PriceTableBuilder, RpiEnricher, RpiTable, RpiTableBuilder, SheetConcatenator,
    select_sheets,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};
use uuid::Uuid;

pub const CONCATENATED_SHEET: &str = "Concatenated";
pub const PRICE_SHEET: &str = "Price";
pub const RPI_SHEET: &str = "RPI";
pub const ENRICHED_SHEET: &str = "Enriched";
pub const COVERAGE_SHEET: &str = "RPI Coverage";

/// Scalar inputs of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub our_brand: String,
    pub selected_sheets: Vec<String>,
    pub concat: ConcatOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub created: bool,
    pub rows: usize,
    pub columns: usize,
    pub reason: Option<String>,
}

impl StageStatus {
    fn created(frame: &DataFrame) -> Self {
        StageStatus {
            created: true,
            rows: frame.height(),
            columns: frame.width(),
            reason: None,
        }
    }

    fn not_created(reason: &UnavailableReason) -> Self {
        StageStatus {
            created: false,
            rows: 0,
            columns: 0,
            reason: Some(reason.to_string()),
        }
    }
}

/// Serializable summary of a run, for auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub our_brand: String,
    pub pack_size_order: Option<Vec<String>>,
    pub concat: ConcatReport,
    pub price_table: StageStatus,
    pub rpi_table: StageStatus,
    pub added_columns: Vec<AddedColumnReport>,
    pub pruned_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub concatenated: ConcatenatedTable,
    pub price: StageOutcome<PriceTable>,
    pub rpi: StageOutcome<RpiTable>,
    pub enriched: EnrichedTable,
    pub report: RunReport,
}

/// Concatenate the selected sheets, derive the Price and RPI tables, and
/// enrich the concatenated rows with the relevant RPI columns.
///
/// Only a bad selection or a structural failure is an error; a Price or RPI
/// table that cannot be built is recorded in the report and the enriched
/// table is then the concatenated table unchanged.
pub fn run_pipeline(
    sheets: Vec<Sheet>,
    params: &RunParams,
    order: Option<&PackSizeOrder>,
) -> Result<PipelineOutput> {
    let run_id = Uuid::new_v4();
    let span = info_span!("pipeline_run", %run_id, brand = %params.our_brand);
    let _guard = span.enter();

    info!(
        "Starting run over {} sheets ({} selected)",
        sheets.len(),
        params.selected_sheets.len()
    );

    let selected = select_sheets(sheets, &params.selected_sheets)?;
    let concatenated = SheetConcatenator::new(params.concat.clone()).concatenate(selected)?;

    let price = PriceTableBuilder::new().build(&concatenated.frame)?;

    let rpi = match &price {
        StageOutcome::Created(price_table) => {
            RpiTableBuilder::new().build(price_table, &params.our_brand)?
        }
        StageOutcome::NotCreated(reason) => {
            StageOutcome::NotCreated(UnavailableReason::UpstreamUnavailable(Box::new(
                reason.clone(),
            )))
        }
    };

    let enriched = match &rpi {
        StageOutcome::Created(rpi_table) => {
            enrich_concatenated(&concatenated, rpi_table, order)?
        }
        StageOutcome::NotCreated(reason) => {
            warn!("Skipping enrichment: {}", reason);
            EnrichedTable {
                frame: concatenated.frame.clone(),
                added: Vec::new(),
                pruned: Vec::new(),
            }
        }
    };

    let report = RunReport {
        run_id,
        our_brand: params.our_brand.clone(),
        pack_size_order: order.map(|o| o.labels().to_vec()),
        concat: concatenated.report.clone(),
        price_table: stage_status(&price, |p| &p.frame),
        rpi_table: stage_status(&rpi, |r| &r.frame),
        added_columns: enriched.added.clone(),
        pruned_columns: enriched.pruned.iter().map(|id| id.column_name()).collect(),
    };

    info!(
        "Run finished: {} rows, {} RPI columns added, {} pruned",
        enriched.frame.height(),
        report.added_columns.len(),
        report.pruned_columns.len()
    );

    Ok(PipelineOutput {
        concatenated,
        price,
        rpi,
        enriched,
        report,
    })
}

fn enrich_concatenated(
    concatenated: &ConcatenatedTable,
    rpi_table: &RpiTable,
    order: Option<&PackSizeOrder>,
) -> Result<EnrichedTable> {
    let resolver = PatternRoleResolver::new();
    let dimensions = match DimensionColumns::resolve(&concatenated.frame, &resolver) {
        Ok(dimensions) => dimensions,
        Err(reason) => {
            warn!("Skipping enrichment: {}", reason);
            return Ok(EnrichedTable {
                frame: concatenated.frame.clone(),
                added: Vec::new(),
                pruned: Vec::new(),
            });
        }
    };

    RpiEnricher::new(Some(concatenated.provenance_column.clone())).enrich(
        &concatenated.frame,
        &rpi_table.frame,
        &dimensions,
        order,
    )
}

fn stage_status<T>(outcome: &StageOutcome<T>, frame: impl Fn(&T) -> &DataFrame) -> StageStatus {
    match outcome {
        StageOutcome::Created(value) => StageStatus::created(frame(value)),
        StageOutcome::NotCreated(reason) => StageStatus::not_created(reason),
    }
}

impl PipelineOutput {
    /// Tables to persist, one sheet each. Stages that were not created are
    /// left out.
    pub fn to_sheets(&self) -> Result<Vec<Sheet>> {
        let mut sheets = vec![Sheet::new(
            CONCATENATED_SHEET,
            self.concatenated.frame.clone(),
        )];
        if let Some(price) = self.price.created() {
            sheets.push(Sheet::new(PRICE_SHEET, price.frame.clone()));
        }
        if let Some(rpi) = self.rpi.created() {
            sheets.push(Sheet::new(RPI_SHEET, rpi.frame.clone()));
        }
        sheets.push(Sheet::new(ENRICHED_SHEET, self.enriched.frame.clone()));
        sheets.push(Sheet::new(COVERAGE_SHEET, coverage_frame(&self.enriched.added)?));
        Ok(sheets)
    }
}

fn coverage_frame(added: &[AddedColumnReport]) -> Result<DataFrame> {
    let columns: Vec<Column> = vec![
        Series::new(
            "Column".into(),
            added.iter().map(|r| r.column.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "Our Brand".into(),
            added.iter().map(|r| r.rpi_column.our_brand.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "Our Pack Size".into(),
            added
                .iter()
                .map(|r| r.rpi_column.our_pack_size.clone())
                .collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "Competitor Brand".into(),
            added
                .iter()
                .map(|r| r.rpi_column.competitor_brand.clone())
                .collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "Competitor Pack Size".into(),
            added
                .iter()
                .map(|r| r.rpi_column.competitor_pack_size.clone())
                .collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "Matched Rows".into(),
            added.iter().map(|r| r.matched_rows as f64).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "Total Rows".into(),
            added.iter().map(|r| r.total_rows as f64).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "Coverage".into(),
            added.iter().map(|r| r.coverage()).collect::<Vec<_>>(),
        )
        .into(),
    ];
    Ok(DataFrame::new(columns)?)
}
