use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::pipeline::RunParams;
use crate::processor::ConcatOptions;
use crate::processor::sheet_concatenator::{DEFAULT_MIN_VALID_RECORDS, DEFAULT_PROVENANCE_COLUMN};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub run: RunSection,
    #[serde(default)]
    pub concat: ConcatSection,
    pub io: IoSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSection {
    pub our_brand: String,
    #[serde(default)]
    pub analysis_id: String,
    pub selected_sheets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcatSection {
    #[serde(default = "default_min_valid_records")]
    pub min_valid_records: usize,
    #[serde(default)]
    pub preserved_columns: Vec<String>,
    #[serde(default = "default_provenance_column")]
    pub provenance_column: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IoSection {
    pub input_workbook: String,
    pub output_workbook: String,
    // Root of {brand}/{analysis_id}/pack_size_order.json
    pub pack_size_order_dir: Option<String>,
    pub report_path: Option<String>,
}

fn default_min_valid_records() -> usize {
    DEFAULT_MIN_VALID_RECORDS
}

fn default_provenance_column() -> String {
    DEFAULT_PROVENANCE_COLUMN.to_string()
}

impl Default for ConcatSection {
    fn default() -> Self {
        Self {
            min_valid_records: default_min_valid_records(),
            preserved_columns: Vec::new(),
            provenance_column: default_provenance_column(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config file: {}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse pipeline config file: {}", path))?;

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.selected_sheets.iter().all(|s| s.trim().is_empty()) {
            bail!("[run] selected_sheets must name at least one sheet");
        }
        if self.concat.provenance_column.trim().is_empty() {
            bail!("[concat] provenance_column cannot be empty");
        }
        if self.io.input_workbook.trim().is_empty() {
            bail!("[io] input_workbook is required");
        }
        if self.io.output_workbook.trim().is_empty() {
            bail!("[io] output_workbook is required");
        }
        if self.io.pack_size_order_dir.is_some() && self.run.analysis_id.trim().is_empty() {
            bail!("[run] analysis_id is required when pack_size_order_dir is set");
        }
        Ok(())
    }

    pub fn to_concat_options(&self) -> ConcatOptions {
        ConcatOptions {
            min_valid_records: self.concat.min_valid_records,
            preserved_columns: self.concat.preserved_columns.clone(),
            provenance_column: self.concat.provenance_column.clone(),
        }
    }

    pub fn to_run_params(&self) -> RunParams {
        RunParams {
            our_brand: self.run.our_brand.clone(),
            selected_sheets: self.run.selected_sheets.clone(),
            concat: self.to_concat_options(),
        }
    }
}
