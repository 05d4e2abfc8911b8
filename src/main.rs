use anyhow::{Context, Result};
use rpi_pipeline::config::PipelineConfig;
use rpi_pipeline::storage::{
    JsonPackSizeOrderStore, PackSizeOrderStore, read_workbook, write_workbook,
};
use rpi_pipeline::run_pipeline;
use std::env;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "configs/pipeline.toml";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!("🚀 Starting RPI pipeline with config {}", config_path);

    let config = PipelineConfig::from_file(&config_path)
        .context("Failed to load pipeline configuration")?;

    let sheets = read_workbook(&config.io.input_workbook)
        .with_context(|| format!("Failed to read workbook {}", config.io.input_workbook))?;
    info!(
        "📥 Loaded {} sheets from {}",
        sheets.len(),
        config.io.input_workbook
    );

    let order = match &config.io.pack_size_order_dir {
        Some(dir) => {
            let store = JsonPackSizeOrderStore::new(dir);
            let order = store
                .load(&config.run.our_brand, &config.run.analysis_id)
                .context("Failed to load pack size order")?;
            if order.is_none() {
                warn!("No pack size order found, falling back to default ranks");
            }
            order
        }
        None => None,
    };

    let output = run_pipeline(sheets, &config.to_run_params(), order.as_ref())
        .context("Pipeline run failed")?;

    write_workbook(&config.io.output_workbook, &output.to_sheets()?)
        .with_context(|| format!("Failed to write workbook {}", config.io.output_workbook))?;

    if let Some(report_path) = &config.io.report_path {
        let json = serde_json::to_string_pretty(&output.report)?;
        std::fs::write(report_path, json)
            .with_context(|| format!("Failed to write run report {}", report_path))?;
        info!("📝 Run report written to {}", report_path);
    }

    let report = &output.report;
    info!("\n=== Run Summary ({}) ===", report.run_id);
    info!("Concatenated rows: {}", report.concat.total_rows());
    match &report.price_table.reason {
        None => info!("✅ Price table: {} rows", report.price_table.rows),
        Some(reason) => warn!("⚠️ Price table not created: {}", reason),
    }
    match &report.rpi_table.reason {
        None => info!("✅ RPI table: {} columns", report.rpi_table.columns),
        Some(reason) => warn!("⚠️ RPI table not created: {}", reason),
    }
    for added in &report.added_columns {
        info!(
            "  {} matched {}/{} rows",
            added.column, added.matched_rows, added.total_rows
        );
    }
    if !report.pruned_columns.is_empty() {
        info!("Pruned {} RPI columns with no matches", report.pruned_columns.len());
    }
    info!("🎉 Output written to {}", config.io.output_workbook);

    Ok(())
}
