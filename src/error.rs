use crate::processor::ColumnRole;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid pack size order: {0}")]
    PackSizeOrder(String),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a dependent stage (Price or RPI table) was not created.
///
/// These are expected outcomes reported through run metadata, not failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    #[error("no {0} column could be identified")]
    MissingDimension(ColumnRole),

    #[error("no price columns could be identified")]
    NoPriceColumns,

    #[error("price table has no rows")]
    EmptyPriceTable,

    #[error("our brand is empty")]
    EmptyBrand,

    #[error("no price columns belong to brand '{0}'")]
    NoOurBrandColumns(String),

    #[error("no competitor price column has a comparable value")]
    NoComparableValues,

    #[error("price table was not created: {0}")]
    UpstreamUnavailable(Box<UnavailableReason>),
}

/// Result of a stage whose preconditions may not hold.
#[derive(Debug, Clone)]
pub enum StageOutcome<T> {
    Created(T),
    NotCreated(UnavailableReason),
}

impl<T> StageOutcome<T> {
    pub fn created(&self) -> Option<&T> {
        match self {
            StageOutcome::Created(value) => Some(value),
            StageOutcome::NotCreated(_) => None,
        }
    }

    pub fn into_created(self) -> Option<T> {
        match self {
            StageOutcome::Created(value) => Some(value),
            StageOutcome::NotCreated(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&UnavailableReason> {
        match self {
            StageOutcome::Created(_) => None,
            StageOutcome::NotCreated(reason) => Some(reason),
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, StageOutcome::Created(_))
    }
}
