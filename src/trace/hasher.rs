//! GL-014: BLAKE3 digests of dishes and recipes for the run trace.

use crate::core::dish::Dish;
use crate::core::recipe::Step;

/// Hash raw bytes. Returns `"blake3:{hex}"`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(bytes).to_hex())
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash a dish: its type name, a NUL, then its byte form.
///
/// The type is part of the digest so `"3"` as a string and `3` as a number
/// hash differently.
pub fn hash_dish(dish: &Dish) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(dish.dish_type().as_str().as_bytes());
    hasher.update(b"\0");
    match dish.get_bytes() {
        Ok(bytes) => {
            hasher.update(&bytes);
        }
        Err(e) => {
            hasher.update(e.to_string().as_bytes());
        }
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Hash a step list through its canonical JSON form.
pub fn hash_steps(steps: &[Step]) -> String {
    match serde_json::to_vec(steps) {
        Ok(json) => hash_bytes(&json),
        Err(e) => hash_string(&e.to_string()),
    }
}

/// Short form for log lines: algorithm prefix dropped, first 12 hex digits.
pub fn short(hash: &str) -> &str {
    let hex = hash.strip_prefix("blake3:").unwrap_or(hash);
    hex.get(..12).unwrap_or(hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DishValue;

    #[test]
    fn test_gl014_hash_string_format() {
        let h = hash_string("hello");
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
        assert_eq!(h, hash_bytes(b"hello"));
    }

    #[test]
    fn test_gl014_hash_dish_includes_type() {
        let text = Dish::from_string("3");
        let number = Dish::new(DishValue::Number(3.0));
        assert_ne!(hash_dish(&text), hash_dish(&number));
        assert_eq!(hash_dish(&text), hash_dish(&Dish::from_string("3")));
    }

    #[test]
    fn test_gl014_hash_steps_deterministic() {
        let steps = vec![Step::new("Reverse", vec!["Character".into()])];
        assert_eq!(hash_steps(&steps), hash_steps(&steps.clone()));
        assert_ne!(hash_steps(&steps), hash_steps(&[]));
    }

    #[test]
    fn test_gl014_short() {
        let h = hash_string("x");
        assert_eq!(short(&h).len(), 12);
        assert_eq!(short("abc"), "abc");
    }
}
