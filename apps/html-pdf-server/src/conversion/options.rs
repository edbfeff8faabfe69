//! Render options
//!
//! Turns the loosely typed `options` object of a request into a fully
//! resolved [`RenderOptions`]. Unknown keys are ignored and missing keys take
//! the deployment defaults. A recognized key with the wrong JSON type, or a
//! value the browser cannot print with, fails with `InvalidOptions`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use super::types::ConversionError;

/// Largest accepted viewport edge in CSS pixels
const MAX_VIEWPORT_DIMENSION: f64 = 16_384.0;

/// Paper format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PageFormat {
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
    Letter,
    Legal,
    Tabloid,
    Ledger,
}

impl PageFormat {
    pub const ALL: [PageFormat; 11] = [
        Self::A0,
        Self::A1,
        Self::A2,
        Self::A3,
        Self::A4,
        Self::A5,
        Self::A6,
        Self::Letter,
        Self::Legal,
        Self::Tabloid,
        Self::Ledger,
    ];

    /// Paper width and height in inches
    pub fn paper_size(self) -> (f64, f64) {
        match self {
            Self::A0 => (33.1, 46.8),
            Self::A1 => (23.4, 33.1),
            Self::A2 => (16.54, 23.4),
            Self::A3 => (11.7, 16.54),
            Self::A4 => (8.27, 11.7),
            Self::A5 => (5.83, 8.27),
            Self::A6 => (4.13, 5.83),
            Self::Letter => (8.5, 11.0),
            Self::Legal => (8.5, 14.0),
            Self::Tabloid => (11.0, 17.0),
            Self::Ledger => (17.0, 11.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A0 => "A0",
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::A3 => "A3",
            Self::A4 => "A4",
            Self::A5 => "A5",
            Self::A6 => "A6",
            Self::Letter => "Letter",
            Self::Legal => "Legal",
            Self::Tabloid => "Tabloid",
            Self::Ledger => "Ledger",
        }
    }
}

impl FromStr for PageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("unsupported page format `{}`", name))
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CSS length unit accepted for margins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Px,
    In,
    Cm,
    Mm,
}

impl LengthUnit {
    fn suffix(self) -> &'static str {
        match self {
            Self::Px => "px",
            Self::In => "in",
            Self::Cm => "cm",
            Self::Mm => "mm",
        }
    }
}

/// A length with a unit, e.g. `40px` or `0.5cm`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f64,
    pub unit: LengthUnit,
}

impl Length {
    pub const fn px(value: f64) -> Self {
        Self {
            value,
            unit: LengthUnit::Px,
        }
    }

    pub const fn cm(value: f64) -> Self {
        Self {
            value,
            unit: LengthUnit::Cm,
        }
    }

    /// Convert to inches (96 CSS pixels per inch)
    pub fn to_inches(self) -> f64 {
        match self.unit {
            LengthUnit::Px => self.value / 96.0,
            LengthUnit::In => self.value,
            LengthUnit::Cm => self.value / 2.54,
            LengthUnit::Mm => self.value / 25.4,
        }
    }
}

impl FromStr for Length {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);

        let value: f64 = number
            .parse()
            .map_err(|_| format!("`{}` is not a length", trimmed))?;
        if !value.is_finite() || value < 0.0 {
            return Err(format!("`{}` must be a non-negative length", trimmed));
        }

        let unit = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "px" => LengthUnit::Px,
            "in" => LengthUnit::In,
            "cm" => LengthUnit::Cm,
            "mm" => LengthUnit::Mm,
            other => return Err(format!("unsupported length unit `{}`", other)),
        };

        Ok(Self { value, unit })
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl Serialize for Length {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Page margins
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Margins {
    pub top: Length,
    pub right: Length,
    pub bottom: Length,
    pub left: Length,
}

impl Margins {
    pub const fn uniform(length: Length) -> Self {
        Self {
            top: length,
            right: length,
            bottom: length,
            left: length,
        }
    }
}

/// Browser viewport in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1240,
            height: 1754,
        }
    }
}

/// Deployment-specific defaults applied to every request
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDefaults {
    pub margin: Length,
    pub timeout: Duration,
    pub max_timeout: Duration,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            margin: Length::px(40.0),
            timeout: Duration::from_millis(30_000),
            max_timeout: Duration::from_millis(120_000),
        }
    }
}

/// Fully resolved render options
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    pub format: PageFormat,
    pub landscape: bool,
    pub print_background: bool,
    pub margin: Margins,
    pub viewport: Viewport,
    #[serde(rename = "timeoutMs", serialize_with = "serialize_millis")]
    pub timeout: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(d.as_millis() as u64)
}

impl RenderOptions {
    pub fn with_defaults(defaults: &RenderDefaults) -> Self {
        Self {
            format: PageFormat::default(),
            landscape: false,
            print_background: true,
            margin: Margins::uniform(defaults.margin),
            viewport: Viewport::default(),
            timeout: defaults.timeout,
        }
    }

    /// Resolve options from the raw request value
    pub fn from_value(value: Option<&Value>, defaults: &RenderDefaults) -> Result<Self, ConversionError> {
        let mut options = Self::with_defaults(defaults);

        let map = match value {
            None | Some(Value::Null) => return Ok(options),
            Some(Value::Object(map)) => map,
            Some(other) => return Err(type_mismatch("options", "an object", other)),
        };

        if let Some(v) = present(map, "format") {
            options.format = expect_str(v, "format")?
                .parse()
                .map_err(ConversionError::InvalidOptions)?;
        }
        if let Some(v) = present(map, "landscape") {
            options.landscape = expect_bool(v, "landscape")?;
        }
        if let Some(v) = present(map, "printBackground") {
            options.print_background = expect_bool(v, "printBackground")?;
        }
        if let Some(v) = present(map, "margin") {
            options.margin = parse_margins(v, defaults.margin)?;
        }

        // Top-level width/height predate the viewport object
        if let Some(v) = present(map, "width") {
            options.viewport.width = parse_dimension(v, "width")?;
        }
        if let Some(v) = present(map, "height") {
            options.viewport.height = parse_dimension(v, "height")?;
        }
        if let Some(v) = present(map, "viewport") {
            let viewport = match v {
                Value::Object(viewport) => viewport,
                other => return Err(type_mismatch("viewport", "an object", other)),
            };
            if let Some(w) = present(viewport, "width") {
                options.viewport.width = parse_dimension(w, "viewport.width")?;
            }
            if let Some(h) = present(viewport, "height") {
                options.viewport.height = parse_dimension(h, "viewport.height")?;
            }
        }

        if let Some(v) = present(map, "timeoutMs") {
            let millis = v
                .as_u64()
                .ok_or_else(|| type_mismatch("timeoutMs", "a non-negative integer", v))?;
            let timeout = Duration::from_millis(millis);
            if millis == 0 || timeout > defaults.max_timeout {
                return Err(ConversionError::InvalidOptions(format!(
                    "`timeoutMs` must be between 1 and {}",
                    defaults.max_timeout.as_millis()
                )));
            }
            options.timeout = timeout;
        }

        Ok(options)
    }
}

fn present<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn type_mismatch(key: &str, expected: &str, got: &Value) -> ConversionError {
    ConversionError::InvalidOptions(format!(
        "`{}` must be {}, got {}",
        key,
        expected,
        json_type(got)
    ))
}

fn expect_str<'a>(value: &'a Value, key: &str) -> Result<&'a str, ConversionError> {
    value
        .as_str()
        .ok_or_else(|| type_mismatch(key, "a string", value))
}

fn expect_bool(value: &Value, key: &str) -> Result<bool, ConversionError> {
    value
        .as_bool()
        .ok_or_else(|| type_mismatch(key, "a boolean", value))
}

fn parse_length(value: &Value, key: &str) -> Result<Length, ConversionError> {
    expect_str(value, key)?
        .parse()
        .map_err(|e| ConversionError::InvalidOptions(format!("`{}`: {}", key, e)))
}

fn parse_margins(value: &Value, default: Length) -> Result<Margins, ConversionError> {
    match value {
        Value::String(_) => Ok(Margins::uniform(parse_length(value, "margin")?)),
        Value::Object(sides) => {
            let side = |name: &str| -> Result<Length, ConversionError> {
                match present(sides, name) {
                    Some(v) => parse_length(v, &format!("margin.{}", name)),
                    None => Ok(default),
                }
            };
            Ok(Margins {
                top: side("top")?,
                right: side("right")?,
                bottom: side("bottom")?,
                left: side("left")?,
            })
        }
        other => Err(type_mismatch("margin", "a length string or an object", other)),
    }
}

fn parse_dimension(value: &Value, key: &str) -> Result<u32, ConversionError> {
    let n = value
        .as_f64()
        .ok_or_else(|| type_mismatch(key, "a positive integer", value))?;
    if n.fract() != 0.0 || n < 1.0 || n > MAX_VIEWPORT_DIMENSION {
        return Err(ConversionError::InvalidOptions(format!(
            "`{}` must be an integer between 1 and {}",
            key, MAX_VIEWPORT_DIMENSION
        )));
    }
    Ok(n as u32)
}
