use crate::error::{PipelineError, Result};
use polars::prelude::*;

/// Render a number the way it appears in a sheet: whole values lose the
/// trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Read any column as optional trimmed strings. Blank strings become `None`.
pub fn column_as_strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::MissingColumn(name.to_string()))?;

    let values = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
            .collect(),
        DataType::Float64 => column
            .f64()?
            .into_iter()
            .map(|v| v.map(format_number))
            .collect(),
        _ => {
            let casted = column.cast(&DataType::String)?;
            casted
                .str()?
                .into_iter()
                .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
                .collect()
        }
    };

    Ok(values)
}

/// Read any column as optional floats. Text cells are parsed after removing
/// currency symbols and thousands separators; unparseable text is `None`.
pub fn column_as_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::MissingColumn(name.to_string()))?;

    let values = match column.dtype() {
        DataType::Float64 => column.f64()?.into_iter().collect(),
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_number))
            .collect(),
        _ => {
            let casted = column.cast(&DataType::Float64)?;
            casted.f64()?.into_iter().collect()
        }
    };

    Ok(values)
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '₹' | '€' | '£' | ',' | ' '))
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Number of non-null, non-blank values in a column.
pub fn non_null_count(column: &Column) -> Result<usize> {
    let count = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .filter(|v| v.map(|s| !s.trim().is_empty()).unwrap_or(false))
            .count(),
        _ => column.len() - column.null_count(),
    };
    Ok(count)
}

/// Key used to compare region and channel values: trimmed, inner whitespace
/// collapsed, lowercased. Aggregation and joins must agree on it.
pub fn dimension_key(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(10.5), "10.5");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn test_dimension_key() {
        assert_eq!(dimension_key(" North  East "), "north east");
        assert_eq!(dimension_key("NORTH"), dimension_key("North"));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("$1,250.50"), Some(1250.5));
        assert_eq!(parse_number(" 12 "), Some(12.0));
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn test_column_readers() {
        let df = df!(
            "text" => [Some(" a "), Some(""), None],
            "num" => [Some(1.0), None, Some(2.5)],
            "price" => [Some("1,000"), Some("x"), None],
        )
        .unwrap();

        assert_eq!(
            column_as_strings(&df, "text").unwrap(),
            vec![Some("a".to_string()), None, None]
        );
        assert_eq!(
            column_as_strings(&df, "num").unwrap(),
            vec![Some("1".to_string()), None, Some("2.5".to_string())]
        );
        assert_eq!(
            column_as_f64(&df, "price").unwrap(),
            vec![Some(1000.0), None, None]
        );
        assert_eq!(non_null_count(df.column("text").unwrap()).unwrap(), 1);
        assert_eq!(non_null_count(df.column("num").unwrap()).unwrap(), 2);
        assert!(matches!(
            column_as_strings(&df, "missing"),
            Err(PipelineError::MissingColumn(_))
        ));
    }
}
