//! Byte ↔ text encodings: Base64 and hex.

use super::{ArgSpec, Args, Contract, RunContext};
use crate::core::errors::OperationError;
use crate::core::recipe::decode_hex;
use crate::core::types::{DishType, DishValue};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

const BASE64_ALPHABETS: [&str; 2] = ["A-Za-z0-9+/=", "A-Za-z0-9-_"];
const HEX_DELIMITERS: [&str; 6] = ["Space", "None", "Comma", "Colon", "Line feed", "0x"];

pub fn contracts() -> Vec<Contract> {
    let mut from_hex_delimiters = vec!["Auto"];
    from_hex_delimiters.extend(HEX_DELIMITERS);

    vec![
        Contract::sync("To Base64", DishType::ArrayBuffer, DishType::String, to_base64)
            .describe("Encode bytes as Base64")
            .arg(ArgSpec::option("Alphabet", &BASE64_ALPHABETS)),
        Contract::sync("From Base64", DishType::String, DishType::ArrayBuffer, from_base64)
            .describe("Decode Base64 into bytes")
            .arg(ArgSpec::option("Alphabet", &BASE64_ALPHABETS))
            .arg(ArgSpec::boolean("Remove non-alphabet chars", true)),
        Contract::sync("To Hex", DishType::ArrayBuffer, DishType::String, to_hex)
            .describe("Encode bytes as hexadecimal")
            .arg(ArgSpec::option("Delimiter", &HEX_DELIMITERS)),
        Contract::sync("From Hex", DishType::String, DishType::ArrayBuffer, from_hex)
            .describe("Decode hexadecimal into bytes")
            .arg(ArgSpec::option("Delimiter", &from_hex_delimiters)),
    ]
}

fn bytes_of(input: DishValue) -> Result<Vec<u8>, OperationError> {
    match input {
        DishValue::ArrayBuffer(b) => Ok(b),
        other => Err(OperationError::new(format!("expected an ArrayBuffer, got {}", other.dish_type()))),
    }
}

fn text_of(input: DishValue) -> Result<String, OperationError> {
    match input {
        DishValue::String(s) => Ok(s),
        other => Err(OperationError::new(format!("expected a string, got {}", other.dish_type()))),
    }
}

fn url_safe(alphabet: &str) -> bool {
    alphabet == BASE64_ALPHABETS[1]
}

fn to_base64(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let bytes = bytes_of(input)?;
    let encoded = if url_safe(&args.option(0)?) {
        URL_SAFE_NO_PAD.encode(bytes)
    } else {
        STANDARD.encode(bytes)
    };
    Ok(DishValue::String(encoded))
}

fn from_base64(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let text = text_of(input)?;
    let url = url_safe(&args.option(0)?);
    let in_alphabet = |c: char| {
        c.is_ascii_alphanumeric() || if url { c == '-' || c == '_' } else { c == '+' || c == '/' }
    };

    let cleaned: String = if args.boolean(1)? {
        text.chars().filter(|&c| in_alphabet(c)).collect()
    } else {
        text.trim_end_matches('=').to_string()
    };
    if let Some(bad) = cleaned.chars().find(|&c| !in_alphabet(c)) {
        return Err(OperationError::new(format!("invalid Base64 character {:?}", bad)));
    }

    // Decode without padding so both padded and unpadded input are accepted.
    let engine = if url {
        URL_SAFE_NO_PAD
    } else {
        base64::engine::general_purpose::STANDARD_NO_PAD
    };
    engine
        .decode(cleaned.as_bytes())
        .map(DishValue::ArrayBuffer)
        .map_err(|e| OperationError::new(format!("invalid Base64: {}", e)))
}

fn to_hex(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let bytes = bytes_of(input)?;
    let delimiter = args.option(0)?;
    let pairs = bytes.iter().map(|b| format!("{:02x}", b));
    let out = match delimiter.as_str() {
        "0x" => pairs.map(|p| format!("0x{}", p)).collect::<Vec<_>>().join(""),
        other => pairs.collect::<Vec<_>>().join(delimiter_text(other)),
    };
    Ok(DishValue::String(out))
}

fn from_hex(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let text = text_of(input)?;
    let delimiter = args.option(0)?;
    let digits = match delimiter.as_str() {
        "Auto" | "0x" => text.replace("0x", ""),
        other => text.split(delimiter_text(other)).collect(),
    };
    decode_hex(digits.trim())
        .map(DishValue::ArrayBuffer)
        .map_err(OperationError::new)
}

fn delimiter_text(name: &str) -> &'static str {
    match name {
        "Space" => " ",
        "Comma" => ",",
        "Colon" => ":",
        "Line feed" => "\n",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::ArgValue;

    fn args(values: Vec<ArgValue>) -> Args {
        Args::new(values)
    }

    fn ctx() -> RunContext {
        RunContext::default()
    }

    fn buf(bytes: &[u8]) -> DishValue {
        DishValue::ArrayBuffer(bytes.to_vec())
    }

    #[test]
    fn test_gl012_to_base64() {
        let out = to_base64(buf(b"hello"), &args(vec!["A-Za-z0-9+/=".into()]), &ctx()).unwrap();
        assert_eq!(out, DishValue::String("aGVsbG8=".into()));
        let out = to_base64(buf(&[0xfb, 0xff]), &args(vec!["A-Za-z0-9-_".into()]), &ctx()).unwrap();
        assert_eq!(out, DishValue::String("-_8".into()));
    }

    #[test]
    fn test_gl012_from_base64_lenient() {
        let a = args(vec!["A-Za-z0-9+/=".into(), true.into()]);
        let out = from_base64(DishValue::String("aGVs\nbG8=".into()), &a, &ctx()).unwrap();
        assert_eq!(out, buf(b"hello"));
        let out = from_base64(DishValue::String("aGk".into()), &a, &ctx()).unwrap();
        assert_eq!(out, buf(b"hi"));
    }

    #[test]
    fn test_gl012_from_base64_strict() {
        let a = args(vec!["A-Za-z0-9+/=".into(), false.into()]);
        let err = from_base64(DishValue::String("aG!k".into()), &a, &ctx()).unwrap_err();
        assert!(err.to_string().contains("invalid Base64 character"));
        let err = from_base64(DishValue::String("a".into()), &a, &ctx()).unwrap_err();
        assert!(err.to_string().starts_with("invalid Base64"));
    }

    #[test]
    fn test_gl012_to_hex_delimiters() {
        let input = || buf(&[0x0a, 0xff]);
        let hex = |d: &str| to_hex(input(), &args(vec![d.into()]), &ctx()).unwrap();
        assert_eq!(hex("Space"), DishValue::String("0a ff".into()));
        assert_eq!(hex("None"), DishValue::String("0aff".into()));
        assert_eq!(hex("Colon"), DishValue::String("0a:ff".into()));
        assert_eq!(hex("0x"), DishValue::String("0x0a0xff".into()));
    }

    #[test]
    fn test_gl012_from_hex() {
        let auto = args(vec!["Auto".into()]);
        let out = from_hex(DishValue::String("41 42\n43".into()), &auto, &ctx()).unwrap();
        assert_eq!(out, buf(b"ABC"));
        let out = from_hex(DishValue::String("0x410x42".into()), &auto, &ctx()).unwrap();
        assert_eq!(out, buf(b"AB"));
        let colon = args(vec!["Colon".into()]);
        let out = from_hex(DishValue::String("41:42".into()), &colon, &ctx()).unwrap();
        assert_eq!(out, buf(b"AB"));
        let err = from_hex(DishValue::String("zz".into()), &auto, &ctx()).unwrap_err();
        assert!(err.to_string().contains("invalid hex"));
    }

    #[test]
    fn test_gl012_wrong_input_shape() {
        let err = to_hex(DishValue::Number(1.0), &args(vec!["Space".into()]), &ctx()).unwrap_err();
        assert_eq!(err.to_string(), "expected an ArrayBuffer, got number");
    }
}
