//! Temperature binning.
//!
//! Two schemes exist: fixed named bands (the default) and fixed-width
//! intervals starting at zero. A deployment picks exactly one through
//! configuration; every temperature signature in one run uses it.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::factors::FactorScalar;
use crate::sanitize::format_number;

/// Bin for missing or non-numeric temperatures.
pub const UNSPECIFIED_BIN: &str = "unspecified";

pub const DEFAULT_BIN_WIDTH: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinningKind {
    #[default]
    Bands,
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum TemperatureBinning {
    /// `<30`, `30-59`, `60-89`, `>=90` (degrees).
    #[default]
    Bands,
    /// `[lo, lo+width)` with `lo = floor(v / width) * width`.
    Interval { width: f64 },
}

impl TemperatureBinning {
    pub fn from_kind(kind: BinningKind, width: f64) -> Self {
        match kind {
            BinningKind::Bands => TemperatureBinning::Bands,
            BinningKind::Interval => TemperatureBinning::Interval { width },
        }
    }

    pub fn kind(&self) -> BinningKind {
        match self {
            TemperatureBinning::Bands => BinningKind::Bands,
            TemperatureBinning::Interval { .. } => BinningKind::Interval,
        }
    }

    pub fn bin(&self, value: Option<&FactorScalar>) -> String {
        let Some(degrees) = value.and_then(parse_temperature) else {
            return UNSPECIFIED_BIN.to_string();
        };
        match *self {
            TemperatureBinning::Bands => band_label(degrees).to_string(),
            TemperatureBinning::Interval { width } => {
                if !(width.is_finite() && width > 0.0) {
                    return UNSPECIFIED_BIN.to_string();
                }
                let lo = (degrees / width).floor() * width;
                let hi = lo + width;
                match (format_number(lo), format_number(hi)) {
                    (Some(lo), Some(hi)) => format!("[{lo}, {hi})"),
                    _ => UNSPECIFIED_BIN.to_string(),
                }
            }
        }
    }
}

fn band_label(degrees: f64) -> &'static str {
    if degrees < 30.0 {
        "<30"
    } else if degrees < 60.0 {
        "30-59"
    } else if degrees < 90.0 {
        "60-89"
    } else {
        ">=90"
    }
}

/// Numeric reading of a temperature value. Text is read up to the end of
/// its leading number, so `"80 °C"` reads as 80.
pub fn parse_temperature(value: &FactorScalar) -> Option<f64> {
    match value {
        FactorScalar::Number(n) => n.is_finite().then_some(*n),
        FactorScalar::Text(text) => leading_number(text),
    }
}

fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    text[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}
