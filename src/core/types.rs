//! GL-001: Shared types — dish tags and values, hosts, run results, trace events.
//!
//! Everything that crosses a module boundary lives here. Recipe step types
//! live in [`super::recipe`].

use num_bigint::BigInt;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Dish types
// ============================================================================

/// The closed set of representations a dish can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DishType {
    #[serde(rename = "byteArray")]
    ByteArray,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "ArrayBuffer")]
    ArrayBuffer,
    #[serde(rename = "BigNumber")]
    BigNumber,
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "File")]
    File,
    #[serde(rename = "List<File>")]
    ListOfFile,
    #[serde(rename = "html")]
    Html,
}

impl DishType {
    pub const ALL: [DishType; 9] = [
        Self::ByteArray,
        Self::String,
        Self::Number,
        Self::ArrayBuffer,
        Self::BigNumber,
        Self::Json,
        Self::File,
        Self::ListOfFile,
        Self::Html,
    ];

    /// Stable display name, also accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ByteArray => "byteArray",
            Self::String => "string",
            Self::Number => "number",
            Self::ArrayBuffer => "ArrayBuffer",
            Self::BigNumber => "BigNumber",
            Self::Json => "JSON",
            Self::File => "File",
            Self::ListOfFile => "List<File>",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for DishType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DishType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let alias = match wanted.as_str() {
            "bytes" | "byte-array" => "bytearray",
            "text" => "string",
            "bignum" => "bignumber",
            "listoffile" | "files" => "list<file>",
            other => other,
        };
        Self::ALL
            .iter()
            .find(|t| t.as_str().to_ascii_lowercase() == alias)
            .copied()
            .ok_or_else(|| format!("unknown dish type '{}'", s))
    }
}

/// A file carried through a recipe: payload plus metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DishFile {
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl DishFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            last_modified: now_millis(),
            media_type: "application/octet-stream".to_string(),
            data,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "lastModified": self.last_modified,
            "type": self.media_type,
            "data": self.data,
        })
    }
}

/// A value of exactly one dish type.
#[derive(Debug, Clone, PartialEq)]
pub enum DishValue {
    ByteArray(Vec<u8>),
    String(String),
    Number(f64),
    ArrayBuffer(Vec<u8>),
    BigNumber(BigInt),
    Json(serde_json::Value),
    File(DishFile),
    ListOfFile(Vec<DishFile>),
    Html(String),
}

impl DishValue {
    pub fn dish_type(&self) -> DishType {
        match self {
            Self::ByteArray(_) => DishType::ByteArray,
            Self::String(_) => DishType::String,
            Self::Number(_) => DishType::Number,
            Self::ArrayBuffer(_) => DishType::ArrayBuffer,
            Self::BigNumber(_) => DishType::BigNumber,
            Self::Json(_) => DishType::Json,
            Self::File(_) => DishType::File,
            Self::ListOfFile(_) => DishType::ListOfFile,
            Self::Html(_) => DishType::Html,
        }
    }

    /// JSON rendering used by the run result surface.
    ///
    /// Byte types become arrays of integers and files become file-shaped
    /// objects, so feeding the result back through `Dish::from_raw` infers
    /// the same family of type.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::ByteArray(b) | Self::ArrayBuffer(b) => serde_json::json!(b),
            Self::String(s) | Self::Html(s) => serde_json::Value::String(s.clone()),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(format_number(*n))),
            Self::BigNumber(n) => serde_json::Value::String(n.to_string()),
            Self::Json(v) => v.clone(),
            Self::File(f) => f.to_json(),
            Self::ListOfFile(files) => {
                serde_json::Value::Array(files.iter().map(DishFile::to_json).collect())
            }
        }
    }

    /// The text, if this value is already textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Html(s) => Some(s),
            _ => None,
        }
    }
}

/// Render a number the way recipe output expects: `3` rather than `3.0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else {
        n.to_string()
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// ============================================================================
// Hosts
// ============================================================================

/// The environment a run executes in. Operations may be excluded from a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Host {
    Cli,
    #[default]
    Library,
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Library => write!(f, "library"),
        }
    }
}

// ============================================================================
// Run results
// ============================================================================

/// Terminal output of a run: a value, or exactly one error message.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    Value(DishValue),
    Error { display_message: String },
}

impl RunResult {
    pub fn errored(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn value(&self) -> Option<&DishValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Value(_) => None,
            Self::Error { display_message } => Some(display_message),
        }
    }
}

impl Serialize for RunResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            Self::Value(v) => {
                map.serialize_entry("value", &v.to_json())?;
                map.serialize_entry("errored", &false)?;
            }
            Self::Error { display_message } => {
                map.serialize_entry(
                    "error",
                    &serde_json::json!({ "displayMessage": display_message }),
                )?;
                map.serialize_entry("errored", &true)?;
            }
        }
        map.end()
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    Completed,
    Returned,
    Error,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Returned => write!(f, "returned"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Report of a finished (not cancelled) run.
#[derive(Debug, Clone)]
pub struct Bake {
    pub run_id: String,
    pub result: RunResult,
    pub halt: HaltReason,
    pub steps_executed: u32,
    pub jumps: u32,
    pub duration: Duration,
}

// ============================================================================
// Trace events
// ============================================================================

/// Provenance event for the JSONL run trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        recipe: String,
        steps: usize,
        recipe_hash: String,
        input_type: DishType,
        input_hash: String,
        galley_version: String,
    },
    StepCompleted {
        run_id: String,
        step: usize,
        op: String,
        output_type: DishType,
        duration_seconds: f64,
        hash: String,
    },
    StepFailed {
        run_id: String,
        step: usize,
        op: String,
        error: String,
        recovered: bool,
    },
    RunCompleted {
        run_id: String,
        halt: HaltReason,
        steps_executed: u32,
        jumps: u32,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: RunEvent,
}

// ============================================================================
// Tests
// ============================================================================
