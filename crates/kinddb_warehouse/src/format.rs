//! Export formats.

use crate::error::WarehouseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serialization used for exported files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    /// Comma-separated values with a header row.
    #[default]
    #[serde(rename = "CSV")]
    Csv,
    /// One JSON object per line.
    #[serde(rename = "NEWLINE_DELIMITED_JSON")]
    NewlineDelimitedJson,
    /// Avro object container file.
    #[serde(rename = "AVRO")]
    Avro,
}

impl ExportFormat {
    /// Every format, in service order.
    pub const ALL: [ExportFormat; 3] = [Self::Csv, Self::NewlineDelimitedJson, Self::Avro];

    /// Service name of the format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::NewlineDelimitedJson => "NEWLINE_DELIMITED_JSON",
            Self::Avro => "AVRO",
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::NewlineDelimitedJson => "json",
            Self::Avro => "avro",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| WarehouseError::invalid_argument(format!("unknown export format: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_names() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(
            "NEWLINE_DELIMITED_JSON".parse::<ExportFormat>().unwrap(),
            ExportFormat::NewlineDelimitedJson
        );
        assert_eq!("avro".parse::<ExportFormat>().unwrap(), ExportFormat::Avro);
        assert!("PARQUET".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn display_matches_parse() {
        for format in ExportFormat::ALL {
            assert_eq!(format.to_string().parse::<ExportFormat>().unwrap(), format);
        }
    }
}
