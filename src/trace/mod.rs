//! Run trace — append-only JSONL provenance events and BLAKE3 digests.

pub mod eventlog;
pub mod hasher;
