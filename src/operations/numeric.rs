//! Arithmetic and structured-data operations.

use super::{ArgSpec, Args, Contract, RunContext};
use crate::core::errors::OperationError;
use crate::core::flow::unescape;
use crate::core::types::{DishType, DishValue};
use num_bigint::BigInt;
use serde::Serialize;

const DELIMITERS: [&str; 6] = ["Line feed", "Space", "Comma", "Semi-colon", "Colon", "CRLF"];

pub fn contracts() -> Vec<Contract> {
    vec![
        Contract::sync("Sum", DishType::String, DishType::BigNumber, sum)
            .describe("Add up a list of integers")
            .arg(ArgSpec::option("Delimiter", &DELIMITERS)),
        Contract::sync("JSON Beautify", DishType::Json, DishType::String, json_beautify)
            .describe("Pretty-print JSON")
            .arg(ArgSpec::string("Indent string", "    ")),
    ]
}

fn delimiter(name: &str) -> &'static str {
    match name {
        "Space" => " ",
        "Comma" => ",",
        "Semi-colon" => ";",
        "Colon" => ":",
        "CRLF" => "\r\n",
        _ => "\n",
    }
}

/// Sum every integer token. Blank and non-numeric tokens are skipped;
/// fractional values are rejected since BigNumber holds integers only.
fn sum(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let DishValue::String(text) = input else {
        return Err(OperationError::new("expected a string"));
    };
    let mut total = BigInt::from(0);
    for token in text.split(delimiter(&args.option(0)?)).map(str::trim) {
        if token.is_empty() {
            continue;
        }
        if let Ok(n) = token.parse::<BigInt>() {
            total += n;
        } else if token.parse::<f64>().is_ok_and(f64::is_finite) {
            return Err(OperationError::new(format!("'{}' is not an integer", token)));
        }
    }
    Ok(DishValue::BigNumber(total))
}

fn json_beautify(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let DishValue::Json(value) = input else {
        return Err(OperationError::new("expected JSON"));
    };
    let indent = unescape(args.string(0)?);
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| OperationError::new(format!("cannot format JSON: {}", e)))?;
    String::from_utf8(out)
        .map(DishValue::String)
        .map_err(|e| OperationError::new(format!("cannot format JSON: {}", e)))
}
