//! GL-002: Dish — the value container and its conversion graph.
//!
//! A dish holds exactly one [`DishValue`]. Conversions are derived on demand
//! and never cached: every type converts to and from raw bytes (the
//! ArrayBuffer hub), and any other pair chains through the hub.
//!
//! - text ↔ bytes: UTF-8 unless a [`CharEncoding`] is selected
//! - number / BigNumber ↔ bytes: decimal string
//! - JSON ↔ bytes: compact stringify / parse
//! - File / List<File> → bytes: payloads concatenated in order

use super::errors::{DataConversionError, UnsupportedDishTypeError};
use super::types::{format_number, DishFile, DishType, DishValue};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// Character encoding for text ↔ bytes conversions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharEncoding {
    #[default]
    Utf8,
    Latin1,
    Utf16Le,
    Utf16Be,
}

/// How text is decoded when a conversion passes through bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decoding {
    pub encoding: CharEncoding,
    /// Reject malformed input instead of substituting U+FFFD.
    pub strict: bool,
}

impl Decoding {
    pub fn strict() -> Self {
        Self {
            encoding: CharEncoding::Utf8,
            strict: true,
        }
    }
}

/// The in-flight value of a recipe run.
#[derive(Debug, Clone, PartialEq)]
pub struct Dish {
    value: DishValue,
}

impl Dish {
    pub fn new(value: DishValue) -> Self {
        Self { value }
    }

    /// Wrap a binary blob; blobs are always ArrayBuffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(DishValue::ArrayBuffer(bytes))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self::new(DishValue::String(s.into()))
    }

    /// Build a dish from an untyped host value, inferring its type.
    pub fn from_raw(raw: serde_json::Value) -> Result<Self, UnsupportedDishTypeError> {
        let value = match (infer_type(&raw)?, raw) {
            (DishType::String, serde_json::Value::String(s)) => DishValue::String(s),
            (DishType::Number, raw) => DishValue::Number(raw.as_f64().unwrap_or(f64::NAN)),
            (DishType::ByteArray, raw) => DishValue::ByteArray(byte_array(&raw).unwrap_or_default()),
            (DishType::File, raw) => {
                DishValue::File(file_from_json(&raw).ok_or_else(|| shape_error(&raw))?)
            }
            (DishType::ListOfFile, raw) => {
                let files = raw
                    .as_array()
                    .map(|items| items.iter().filter_map(file_from_json).collect())
                    .unwrap_or_default();
                DishValue::ListOfFile(files)
            }
            (_, raw) => DishValue::Json(raw),
        };
        Ok(Self::new(value))
    }

    pub fn dish_type(&self) -> DishType {
        self.value.dish_type()
    }

    pub fn value(&self) -> &DishValue {
        &self.value
    }

    pub fn into_value(self) -> DishValue {
        self.value
    }

    /// True when the value is held in the canonical byte form.
    pub fn is_canonical(&self) -> bool {
        self.dish_type() == DishType::ArrayBuffer
    }

    /// The value coerced to `target` with default (lossy UTF-8) decoding.
    pub fn get(&self, target: DishType) -> Result<DishValue, DataConversionError> {
        self.get_with(target, Decoding::default())
    }

    /// The value coerced to `target`. Never mutates the dish.
    pub fn get_with(
        &self,
        target: DishType,
        decoding: Decoding,
    ) -> Result<DishValue, DataConversionError> {
        let from = self.dish_type();
        if from == target {
            return Ok(self.value.clone());
        }
        if let Some(direct) = byte_alias(&self.value, target) {
            return Ok(direct);
        }
        // The character encoding only applies where text meets raw bytes.
        let decoding = if is_textual(from) && is_textual(target) {
            Decoding {
                encoding: CharEncoding::Utf8,
                ..decoding
            }
        } else {
            decoding
        };
        let bytes = to_bytes(&self.value, decoding.encoding)
            .map_err(|cause| DataConversionError::new(from, target, cause))?;
        from_bytes(bytes, target, decoding)
            .map_err(|cause| DataConversionError::new(from, target, cause))
    }

    /// The canonical byte form.
    pub fn get_bytes(&self) -> Result<Vec<u8>, DataConversionError> {
        match self.get(DishType::ArrayBuffer)? {
            DishValue::ArrayBuffer(bytes) => Ok(bytes),
            other => Err(DataConversionError::new(
                other.dish_type(),
                DishType::ArrayBuffer,
                "conversion produced a non-byte value",
            )),
        }
    }

    /// The string form, decoded lossily.
    pub fn get_string(&self) -> Result<String, DataConversionError> {
        self.get_string_with(Decoding::default())
    }

    pub fn get_string_with(&self, decoding: Decoding) -> Result<String, DataConversionError> {
        match self.get_with(DishType::String, decoding)? {
            DishValue::String(s) => Ok(s),
            other => Err(DataConversionError::new(
                other.dish_type(),
                DishType::String,
                "conversion produced a non-string value",
            )),
        }
    }

    /// Convert the held value in place.
    pub fn convert(&mut self, target: DishType, decoding: Decoding) -> Result<(), DataConversionError> {
        self.value = self.get_with(target, decoding)?;
        Ok(())
    }

    /// Replace the held value. The only check is that `value` has the shape of `dish_type`.
    pub fn set(&mut self, dish_type: DishType, value: DishValue) -> Result<(), DataConversionError> {
        let actual = value.dish_type();
        if actual != dish_type {
            return Err(DataConversionError::new(
                actual,
                dish_type,
                format!("value does not have the shape of {}", dish_type),
            ));
        }
        self.value = value;
        Ok(())
    }

    /// Human-readable rendering: text as-is, JSON pretty-printed, the rest as lossy UTF-8.
    pub fn to_display_string(&self) -> String {
        match &self.value {
            DishValue::String(s) | DishValue::Html(s) => s.clone(),
            DishValue::Number(n) => format_number(*n),
            DishValue::BigNumber(n) => n.to_string(),
            DishValue::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
            other => match to_bytes(other, CharEncoding::Utf8) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => e,
            },
        }
    }
}

impl From<DishValue> for Dish {
    fn from(value: DishValue) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Type inference
// ============================================================================

/// Classify an untyped host value. Total over JSON shapes except `null` and booleans.
pub fn infer_type(raw: &serde_json::Value) -> Result<DishType, UnsupportedDishTypeError> {
    match raw {
        serde_json::Value::String(_) => Ok(DishType::String),
        serde_json::Value::Number(_) => Ok(DishType::Number),
        serde_json::Value::Null | serde_json::Value::Bool(_) => Err(shape_error(raw)),
        serde_json::Value::Array(items) => {
            if byte_array(raw).is_some() {
                Ok(DishType::ByteArray)
            } else if !items.is_empty() && items.iter().all(is_file_shaped) {
                Ok(DishType::ListOfFile)
            } else {
                Ok(DishType::Json)
            }
        }
        serde_json::Value::Object(_) => {
            if is_file_shaped(raw) {
                Ok(DishType::File)
            } else {
                Ok(DishType::Json)
            }
        }
    }
}

fn shape_error(raw: &serde_json::Value) -> UnsupportedDishTypeError {
    let shape = match raw {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => format!("boolean {}", b),
        other => format!("{}", other),
    };
    UnsupportedDishTypeError { shape }
}

/// Every element an integer in 0..=255. The empty array qualifies.
fn byte_array(raw: &serde_json::Value) -> Option<Vec<u8>> {
    raw.as_array()?
        .iter()
        .map(|v| v.as_u64().filter(|n| *n <= 255).map(|n| n as u8))
        .collect()
}

fn is_file_shaped(raw: &serde_json::Value) -> bool {
    raw.get("name").is_some_and(|n| n.is_string())
        && raw.get("data").is_some_and(|d| byte_array(d).is_some())
}

fn file_from_json(raw: &serde_json::Value) -> Option<DishFile> {
    if !is_file_shaped(raw) {
        return None;
    }
    let mut file = DishFile::new(raw.get("name")?.as_str()?, byte_array(raw.get("data")?)?);
    if let Some(ts) = raw.get("lastModified").and_then(|v| v.as_i64()) {
        file.last_modified = ts;
    }
    if let Some(t) = raw.get("type").and_then(|v| v.as_str()) {
        file.media_type = t.to_string();
    }
    Some(file)
}

// ============================================================================
// Hub conversions
// ============================================================================

/// Types whose byte form is their text.
fn is_textual(t: DishType) -> bool {
    matches!(
        t,
        DishType::String | DishType::Html | DishType::Number | DishType::BigNumber | DishType::Json
    )
}

/// ByteArray and ArrayBuffer share a payload; skip the hub round trip.
fn byte_alias(value: &DishValue, target: DishType) -> Option<DishValue> {
    match (value, target) {
        (DishValue::ByteArray(b), DishType::ArrayBuffer) => Some(DishValue::ArrayBuffer(b.clone())),
        (DishValue::ArrayBuffer(b), DishType::ByteArray) => Some(DishValue::ByteArray(b.clone())),
        _ => None,
    }
}

/// Serialize any value to the hub representation.
fn to_bytes(value: &DishValue, encoding: CharEncoding) -> Result<Vec<u8>, String> {
    match value {
        DishValue::ByteArray(b) | DishValue::ArrayBuffer(b) => Ok(b.clone()),
        DishValue::String(s) | DishValue::Html(s) => encode_text(s, encoding),
        DishValue::Number(n) => Ok(format_number(*n).into_bytes()),
        DishValue::BigNumber(n) => Ok(n.to_string().into_bytes()),
        DishValue::Json(v) => serde_json::to_vec(v).map_err(|e| format!("JSON stringify failed: {}", e)),
        DishValue::File(f) => Ok(f.data.clone()),
        DishValue::ListOfFile(files) => Ok(files.iter().flat_map(|f| f.data.iter().copied()).collect()),
    }
}

/// Deserialize the hub representation into `target`.
fn from_bytes(bytes: Vec<u8>, target: DishType, decoding: Decoding) -> Result<DishValue, String> {
    match target {
        DishType::ByteArray => Ok(DishValue::ByteArray(bytes)),
        DishType::ArrayBuffer => Ok(DishValue::ArrayBuffer(bytes)),
        DishType::String => decode_text(&bytes, decoding).map(DishValue::String),
        DishType::Html => decode_text(&bytes, decoding).map(DishValue::Html),
        DishType::Number => {
            let text = decode_text(&bytes, Decoding::strict())?;
            parse_number(&text).map(DishValue::Number)
        }
        DishType::BigNumber => {
            let text = decode_text(&bytes, Decoding::strict())?;
            let trimmed = text.trim();
            trimmed
                .parse::<BigInt>()
                .map(DishValue::BigNumber)
                .map_err(|_| format!("'{}' is not an integer", preview(trimmed)))
        }
        DishType::Json => serde_json::from_slice(&bytes)
            .map(DishValue::Json)
            .map_err(|e| format!("invalid JSON: {}", e)),
        DishType::File => Ok(DishValue::File(DishFile::new("unknown", bytes))),
        DishType::ListOfFile => Ok(DishValue::ListOfFile(vec![DishFile::new("unknown", bytes)])),
    }
}

fn parse_number(text: &str) -> Result<f64, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty input is not a number".to_string());
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", preview(trimmed)))
}

fn preview(text: &str) -> String {
    const MAX: usize = 32;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{}…", head)
    }
}

/// Encode text in the selected character encoding.
pub fn encode_text(s: &str, encoding: CharEncoding) -> Result<Vec<u8>, String> {
    match encoding {
        CharEncoding::Utf8 => Ok(s.as_bytes().to_vec()),
        CharEncoding::Latin1 => s
            .chars()
            .map(|c| {
                u8::try_from(u32::from(c))
                    .map_err(|_| format!("character {:?} has no Latin-1 encoding", c))
            })
            .collect(),
        CharEncoding::Utf16Le => Ok(s.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        CharEncoding::Utf16Be => Ok(s.encode_utf16().flat_map(u16::to_be_bytes).collect()),
    }
}

/// Decode bytes in the selected character encoding.
pub fn decode_text(bytes: &[u8], decoding: Decoding) -> Result<String, String> {
    match decoding.encoding {
        CharEncoding::Utf8 => {
            if decoding.strict {
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| format!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to()))
            } else {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
        CharEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        CharEncoding::Utf16Le | CharEncoding::Utf16Be => {
            if bytes.len() % 2 != 0 && decoding.strict {
                return Err("odd number of bytes for UTF-16".to_string());
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| match decoding.encoding {
                    CharEncoding::Utf16Le => u16::from_le_bytes([pair[0], pair[1]]),
                    _ => u16::from_be_bytes([pair[0], pair[1]]),
                })
                .collect();
            if decoding.strict {
                String::from_utf16(&units).map_err(|_| "invalid UTF-16".to_string())
            } else {
                Ok(String::from_utf16_lossy(&units))
            }
        }
    }
}
