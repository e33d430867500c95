//! Execution summary formatting
//!
//! Templates use `{field}` placeholders over the execution summary, with an
//! optional `:.Nf` precision and an optional `!C` conversion:
//!
//! - `S` human readable size (`3.0 MB`)
//! - `E` exit code, green when 0
//! - `X` green when truthy, red otherwise
//! - `N` green when present, red `-` when absent
//! - `P` percentage
//! - `T` duration
//! - `D` local date and time from a Unix timestamp

use chrono::{Local, TimeZone};
use colored::Colorize;
use duct_core::{Error, ExecutionSummary, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::warn;

static FIELD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)(?:!([A-Za-z]))?(?::([^{}!]*)(?:!([A-Za-z]))?)?\}")
        .expect("Invalid summary field regex")
});

static PRECISION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.(\d+)f$").expect("Invalid precision regex"));

static NULL: Value = Value::Null;

const CONVERSIONS: &str = "SEXNPTD";
const NONE: &str = "-";
const FILESIZE_SUFFIXES: [&str; 8] = [" kB", " MB", " GB", " TB", " PB", " EB", " ZB", " YB"];

#[derive(Clone, Copy)]
enum Tint {
    Green,
    Red,
}

pub struct SummaryFormatter {
    colors: bool,
}

impl SummaryFormatter {
    pub fn new(colors: bool) -> Self {
        Self { colors }
    }

    /// Reject unknown fields and conversions before anything runs
    pub fn check(template: &str) -> Result<()> {
        let fields = summary_fields(&ExecutionSummary::default());
        for caps in FIELD_REGEX.captures_iter(template) {
            let Some(name) = caps.get(1) else { continue };
            if !fields.contains_key(name.as_str()) {
                return Err(Error::config(format!(
                    "Unknown field '{}' in summary format",
                    name.as_str()
                )));
            }
            for conversion in [caps.get(2), caps.get(4)].into_iter().flatten() {
                if !CONVERSIONS.contains(conversion.as_str()) {
                    return Err(Error::config(format!(
                        "Unknown conversion '!{}' in summary format; expected one of S, E, X, N, P, T, D",
                        conversion.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn format(&self, template: &str, summary: &ExecutionSummary) -> String {
        let fields = summary_fields(summary);
        FIELD_REGEX
            .replace_all(template, |caps: &Captures| {
                let Some(name) = caps.get(1) else {
                    // escaped brace
                    return caps[0][..1].to_string();
                };
                let value = fields.get(name.as_str()).unwrap_or(&NULL);
                let spec = caps.get(3).map_or("", |m| m.as_str());
                let first = caps.get(2).and_then(|m| m.as_str().chars().next());
                let last = caps.get(4).and_then(|m| m.as_str().chars().next());

                if let Some(conversion) = first {
                    return self.convert(value, conversion);
                }
                if value.is_null() {
                    return match last {
                        Some(conversion) => self.convert(value, conversion),
                        None => NONE.to_string(),
                    };
                }
                let formatted = apply_spec(value, spec);
                match last {
                    Some(conversion) => self.convert(&formatted, conversion),
                    None => display(&formatted),
                }
            })
            .into_owned()
    }

    fn paint(&self, text: String, tint: Tint) -> String {
        if !self.colors {
            return text;
        }
        match tint {
            Tint::Green => text.green().bold().to_string(),
            Tint::Red => text.red().bold().to_string(),
        }
    }

    fn absent(&self) -> String {
        self.paint(NONE.to_string(), Tint::Red)
    }

    fn convert(&self, value: &Value, conversion: char) -> String {
        match conversion {
            'S' => match as_f64(value) {
                Some(bytes) => self.paint(naturalsize(bytes), Tint::Green),
                None => self.absent(),
            },
            'E' => {
                let tint = if value.is_null() || truthy(value) { Tint::Red } else { Tint::Green };
                self.paint(display(value), tint)
            }
            'X' => {
                let tint = if truthy(value) { Tint::Green } else { Tint::Red };
                self.paint(display(value), tint)
            }
            'N' => match value {
                Value::Null => self.absent(),
                _ => self.paint(display(value), Tint::Green),
            },
            'P' => match as_f64(value) {
                Some(pct) => format!("{:.2}%", pct),
                None => self.absent(),
            },
            'T' => match as_f64(value) {
                Some(secs) => format_duration(secs),
                None => self.absent(),
            },
            'D' => match as_f64(value) {
                Some(ts) => format_timestamp(ts).unwrap_or_else(|| display(value)),
                None => self.absent(),
            },
            _ => display(value),
        }
    }
}

fn summary_fields(summary: &ExecutionSummary) -> Map<String, Value> {
    match serde_json::to_value(summary) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Format with a `.Nf` precision spec; anything else falls back to plain display
fn apply_spec(value: &Value, spec: &str) -> Value {
    if spec.is_empty() {
        return value.clone();
    }
    match (PRECISION_REGEX.captures(spec), as_f64(value)) {
        (Some(caps), Some(number)) => {
            let precision: usize = caps[1].parse().unwrap_or(0);
            Value::String(format!("{:.*}", precision, number))
        }
        _ => {
            warn!("Falling back to plain formatting for {} with spec '{}'", value, spec);
            Value::String(display(value))
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => NONE.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decimal file size, e.g. `3.0 MB`
pub fn naturalsize(bytes: f64) -> String {
    let base = 1000.0_f64;
    let abs = bytes.abs();
    if abs == 1.0 {
        return format!("{} Byte", bytes as i64);
    }
    if abs < base {
        return format!("{} Bytes", bytes as i64);
    }

    let exponent = (2..=9).find(|e| abs < base.powi(*e)).unwrap_or(9);
    let suffix = FILESIZE_SUFFIXES[(exponent - 2) as usize];
    format!("{:.1}{}", base * bytes / base.powi(exponent), suffix)
}

/// `1h 2m 3.0s`, `2m 3.0s` or `3.21s`
pub fn format_duration(secs: f64) -> String {
    if secs >= 3600.0 {
        let hours = (secs / 3600.0).floor();
        let minutes = ((secs % 3600.0) / 60.0).floor();
        format!("{}h {}m {:.1}s", hours, minutes, secs % 60.0)
    } else if secs >= 60.0 {
        let minutes = (secs / 60.0).floor();
        format!("{}m {:.1}s", minutes, secs % 60.0)
    } else {
        format!("{:.2}s", secs)
    }
}

fn format_timestamp(ts: f64) -> Option<String> {
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9) as u32;
    Local
        .timestamp_opt(secs as i64, nanos)
        .single()
        .map(|dt| dt.format("%b %d, %Y %I:%M %p").to_string())
}
