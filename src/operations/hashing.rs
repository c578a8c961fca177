//! Hash digests rendered as lowercase hex.

use super::{ArgSpec, Args, Contract, RunContext};
use crate::core::errors::OperationError;
use crate::core::types::{DishType, DishValue};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

pub fn contracts() -> Vec<Contract> {
    vec![
        Contract::sync("SHA2", DishType::ArrayBuffer, DishType::String, sha2_digest)
            .describe("SHA-2 digest of the input")
            .arg(ArgSpec::option("Size", &["512", "384", "256", "224"])),
        Contract::sync("BLAKE3", DishType::ArrayBuffer, DishType::String, blake3_digest)
            .describe("BLAKE3 digest of the input, optionally keyed")
            .arg(ArgSpec::number("Size", 32.0).min(1.0).max(1024.0))
            .arg(ArgSpec::toggle("Key", "", &["UTF8", "Hex", "Base64", "Latin1"])),
    ]
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn bytes_of(input: DishValue) -> Result<Vec<u8>, OperationError> {
    match input {
        DishValue::ArrayBuffer(b) => Ok(b),
        other => Err(OperationError::new(format!("expected an ArrayBuffer, got {}", other.dish_type()))),
    }
}

fn sha2_digest(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let data = bytes_of(input)?;
    let digest = match args.option(0)?.as_str() {
        "224" => Sha224::digest(&data).to_vec(),
        "256" => Sha256::digest(&data).to_vec(),
        "384" => Sha384::digest(&data).to_vec(),
        "512" => Sha512::digest(&data).to_vec(),
        other => {
            return Err(OperationError::invalid_argument(0, format!("unsupported size {}", other)));
        }
    };
    Ok(DishValue::String(to_hex(&digest)))
}

fn blake3_digest(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let data = bytes_of(input)?;
    let size = usize::try_from(args.integer(0)?)
        .map_err(|_| OperationError::invalid_argument(0, "size must be positive"))?;
    let key = args.bytes(1)?;

    let mut hasher = if key.is_empty() {
        blake3::Hasher::new()
    } else {
        let key: [u8; 32] = key.as_slice().try_into().map_err(|_| {
            OperationError::invalid_argument(1, format!("key must be 32 bytes, got {}", key.len()))
        })?;
        blake3::Hasher::new_keyed(&key)
    };
    hasher.update(&data);

    let mut out = vec![0u8; size];
    hasher.finalize_xof().fill(&mut out);
    Ok(DishValue::String(to_hex(&out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::{ArgValue, ToggleString};

    fn buf(bytes: &[u8]) -> DishValue {
        DishValue::ArrayBuffer(bytes.to_vec())
    }

    fn hex_of(v: DishValue) -> String {
        match v {
            DishValue::String(s) => s,
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_gl013_sha256_known_vector() {
        let out = sha2_digest(buf(b"abc"), &Args::new(vec!["256".into()]), &RunContext::default()).unwrap();
        assert_eq!(
            hex_of(out),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_gl013_sha2_sizes() {
        for (size, len) in [("224", 56), ("384", 96), ("512", 128)] {
            let out = sha2_digest(buf(b""), &Args::new(vec![size.into()]), &RunContext::default()).unwrap();
            assert_eq!(hex_of(out).len(), len, "SHA-{}", size);
        }
        assert!(sha2_digest(buf(b""), &Args::new(vec!["128".into()]), &RunContext::default()).is_err());
    }

    #[test]
    fn test_gl013_blake3_matches_crate() {
        let args = Args::new(vec![ArgValue::Number(32.0), ArgValue::Toggle(ToggleString::new("UTF8", ""))]);
        let out = blake3_digest(buf(b"hello"), &args, &RunContext::default()).unwrap();
        assert_eq!(hex_of(out), blake3::hash(b"hello").to_hex().to_string());
    }

    #[test]
    fn test_gl013_blake3_size_and_key() {
        let args = Args::new(vec![ArgValue::Number(8.0), ArgValue::Toggle(ToggleString::new("UTF8", ""))]);
        let out = blake3_digest(buf(b"x"), &args, &RunContext::default()).unwrap();
        assert_eq!(hex_of(out).len(), 16);

        let key = "k".repeat(32);
        let args = Args::new(vec![ArgValue::Number(32.0), ArgValue::Toggle(ToggleString::new("UTF8", &key))]);
        let keyed = blake3_digest(buf(b"x"), &args, &RunContext::default()).unwrap();
        let expected = blake3::keyed_hash(&[b'k'; 32], b"x").to_hex().to_string();
        assert_eq!(hex_of(keyed), expected);

        let args = Args::new(vec![ArgValue::Number(32.0), ArgValue::Toggle(ToggleString::new("UTF8", "short"))]);
        let err = blake3_digest(buf(b"x"), &args, &RunContext::default()).unwrap_err();
        assert!(err.to_string().contains("key must be 32 bytes"));
    }
}
