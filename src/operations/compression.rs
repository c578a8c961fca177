//! Gzip compression via flate2.

use super::{ArgSpec, Args, Contract, RunContext};
use crate::core::errors::OperationError;
use crate::core::types::{DishType, DishValue};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub fn contracts() -> Vec<Contract> {
    vec![
        Contract::sync("Gzip", DishType::ArrayBuffer, DishType::ArrayBuffer, gzip)
            .describe("Compress the input with gzip")
            .arg(ArgSpec::number("Level", 6.0).min(0.0).max(9.0)),
        Contract::sync("Gunzip", DishType::ArrayBuffer, DishType::ArrayBuffer, gunzip)
            .describe("Decompress gzip data"),
    ]
}

fn bytes_of(input: DishValue) -> Result<Vec<u8>, OperationError> {
    match input {
        DishValue::ArrayBuffer(b) => Ok(b),
        other => Err(OperationError::new(format!("expected an ArrayBuffer, got {}", other.dish_type()))),
    }
}

fn gzip(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let data = bytes_of(input)?;
    let level = u32::try_from(args.integer(0)?)
        .map_err(|_| OperationError::invalid_argument(0, "level must be 0-9"))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder
        .write_all(&data)
        .map_err(|e| OperationError::new(format!("gzip failed: {}", e)))?;
    encoder
        .finish()
        .map(DishValue::ArrayBuffer)
        .map_err(|e| OperationError::new(format!("gzip failed: {}", e)))
}

fn gunzip(input: DishValue, _args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let data = bytes_of(input)?;
    let mut out = Vec::new();
    GzDecoder::new(data.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| OperationError::new(format!("gunzip failed: {}", e)))?;
    Ok(DishValue::ArrayBuffer(out))
}
