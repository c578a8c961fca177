//! GL-004: Recipe program types — steps, argument values, recipe files.
//!
//! A recipe is an ordered list of `{op, args}` steps. On disk it is either a
//! bare step array or a recipe file with metadata and a run policy:
//!
//! ```yaml
//! version: "1.0"
//! name: decode-and-hash
//! policy:
//!   strict_utf8: false
//! steps:
//!   - op: From Base64
//!     args: ["A-Za-z0-9+/=", true]
//!   - op: SHA2
//!     args: ["256"]
//! ```

use super::types::DishType;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// One invocation in a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub op: String,

    #[serde(default)]
    pub args: Vec<ArgValue>,

    /// Disabled steps are skipped and take no part in flow-control resolution.
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Step {
    pub fn new(op: impl Into<String>, args: Vec<ArgValue>) -> Self {
        Self {
            op: op.into(),
            args,
            disabled: false,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// A literal argument value as written in the recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Number(f64),
    String(String),
    Toggle(ToggleString),
    Steps(Vec<Step>),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Toggle(t) => Some(&t.string),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Toggle(_) => "toggle string",
            Self::Steps(_) => "operation list",
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for ArgValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<u32> for ArgValue {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

/// A byte string together with the encoding its text is written in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleString {
    pub option: String,
    pub string: String,
}

/// Encodings a toggle string may be written in.
pub const TOGGLE_ENCODINGS: [&str; 6] = ["Hex", "Base64", "UTF8", "Latin1", "Decimal", "Binary"];

impl ToggleString {
    pub fn new(option: impl Into<String>, string: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            string: string.into(),
        }
    }

    /// Decode the text into bytes according to the selected encoding.
    pub fn decode(&self) -> Result<Vec<u8>, String> {
        let option = self.option.to_ascii_lowercase().replace(['-', ' '], "");
        match option.as_str() {
            "utf8" => Ok(self.string.as_bytes().to_vec()),
            "latin1" => super::dish::encode_text(&self.string, super::dish::CharEncoding::Latin1),
            "hex" => decode_hex(&self.string),
            "base64" => base64::engine::general_purpose::STANDARD
                .decode(self.string.trim())
                .map_err(|e| format!("invalid Base64: {}", e)),
            "decimal" => decode_radix(&self.string, 10),
            "binary" => decode_radix(&self.string, 2),
            _ => Err(format!("unknown toggle encoding '{}'", self.option)),
        }
    }
}

/// Hex digits, ignoring whitespace, `0x` prefixes and common delimiters.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: String = text
        .split([' ', ',', ';', ':', '\n', '\r', '\t'])
        .map(|chunk| chunk.trim_start_matches("0x"))
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex byte at offset {}", i))
        })
        .collect()
}

fn decode_radix(text: &str, radix: u32) -> Result<Vec<u8>, String> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            u8::from_str_radix(chunk, radix)
                .map_err(|_| format!("'{}' is not a byte in base {}", chunk, radix))
        })
        .collect()
}

/// A recipe file — metadata, policy and steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeFile {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Type the input is converted to before the first step.
    #[serde(default)]
    pub input_type: Option<DishType>,

    #[serde(default)]
    pub policy: Policy,

    pub steps: Vec<Step>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_name() -> String {
    "untitled".to_string()
}

impl RecipeFile {
    /// Wrap a bare step list with default metadata.
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self {
            version: default_version(),
            name: default_name(),
            description: None,
            input_type: None,
            policy: Policy::default(),
            steps,
        }
    }
}

/// Run policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Fail on malformed UTF-8 instead of substituting U+FFFD
    #[serde(default)]
    pub strict_utf8: bool,

    /// Write a JSONL run trace when the host provides a trace path
    #[serde(default)]
    pub trace: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gl004_arg_value_untagged() {
        let args: Vec<ArgValue> =
            serde_json::from_str(r#"["\n", 3, true, {"option": "Hex", "string": "0a"}, []]"#)
                .unwrap();
        assert_eq!(args[0], ArgValue::String("\n".into()));
        assert_eq!(args[1], ArgValue::Number(3.0));
        assert_eq!(args[2], ArgValue::Bool(true));
        assert_eq!(args[3], ArgValue::Toggle(ToggleString::new("Hex", "0a")));
        assert_eq!(args[4], ArgValue::Steps(vec![]));
    }

    #[test]
    fn test_gl004_nested_steps() {
        let arg: ArgValue =
            serde_json::from_str(r#"[{"op": "To Upper case", "args": []}]"#).unwrap();
        let ArgValue::Steps(steps) = arg else {
            panic!("expected steps");
        };
        assert_eq!(steps[0].op, "To Upper case");
    }

    #[test]
    fn test_gl004_step_defaults() {
        let step: Step = serde_json::from_str(r#"{"op": "Return"}"#).unwrap();
        assert!(step.args.is_empty());
        assert!(!step.disabled);
        let json = serde_json::to_string(&step).unwrap();
        assert!(!json.contains("disabled"));
    }

    #[test]
    fn test_gl004_toggle_decode() {
        assert_eq!(ToggleString::new("Hex", "de ad be ef").decode().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(ToggleString::new("Base64", "aGk=").decode().unwrap(), b"hi");
        assert_eq!(ToggleString::new("UTF8", "hi").decode().unwrap(), b"hi");
        assert_eq!(ToggleString::new("Latin1", "é").decode().unwrap(), vec![0xe9]);
        assert_eq!(ToggleString::new("Decimal", "104 105").decode().unwrap(), b"hi");
        assert_eq!(ToggleString::new("Binary", "01101000,01101001").decode().unwrap(), b"hi");
        assert!(ToggleString::new("Rot13", "x").decode().is_err());
    }

    #[test]
    fn test_gl004_decode_hex_errors() {
        assert!(decode_hex("abc").unwrap_err().contains("odd number"));
        assert!(decode_hex("zz").unwrap_err().contains("invalid hex"));
        assert_eq!(decode_hex("0x41:0x42").unwrap(), b"AB");
    }

    #[test]
    fn test_gl004_recipe_file_defaults() {
        let recipe: RecipeFile = serde_yaml_ng::from_str("steps: []").unwrap();
        assert_eq!(recipe.version, "1.0");
        assert_eq!(recipe.name, "untitled");
        assert!(!recipe.policy.strict_utf8);
        assert!(recipe.input_type.is_none());
    }

    #[test]
    fn test_gl004_recipe_file_input_type() {
        let yaml = r#"
name: bytes-in
input_type: ArrayBuffer
steps:
  - op: To Hex
"#;
        let recipe: RecipeFile = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(recipe.input_type, Some(DishType::ArrayBuffer));
        assert_eq!(recipe.steps[0].op, "To Hex");
    }
}
