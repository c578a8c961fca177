//! GL-007: Flow-control operations.
//!
//! Fork, Merge, Register, Label, Jump, Conditional Jump and Return are
//! registered like any other operation, but their contracts carry an
//! [`Action::Flow`] marker instead of an implementation: the interpreter
//! owns the program counter, registers and fork stack they manipulate.

use super::types::DishType;
use crate::operations::{ArgSpec, Contract};
use regex::{Regex, RegexBuilder};

/// Default bound on taken jumps for a whole run.
pub const DEFAULT_MAX_JUMPS: f64 = 10.0;

/// The flow-control behaviours the interpreter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowControl {
    Fork,
    Merge,
    Register,
    Label,
    Jump,
    ConditionalJump,
    Return,
}

/// Contracts for every flow-control operation, in listing order.
pub fn contracts() -> Vec<Contract> {
    vec![
        Contract::flow("Fork", DishType::String, FlowControl::Fork)
            .describe("Split the input and run the rest of the recipe (up to a Merge) once per piece")
            .arg(ArgSpec::string("Split delimiter", "\\n"))
            .arg(ArgSpec::string("Merge delimiter", "\\n"))
            .arg(ArgSpec::boolean("Ignore errors", false)),
        Contract::flow("Merge", DishType::String, FlowControl::Merge)
            .describe("Join the outputs of the innermost Fork"),
        Contract::flow("Register", DishType::String, FlowControl::Register)
            .describe("Capture regex groups into registers $R0, $R1, ...")
            .arg(ArgSpec::string("Extractor", "([\\s\\S]*)"))
            .arg(ArgSpec::boolean("Case insensitive", true))
            .arg(ArgSpec::boolean("Multiline matching", false))
            .arg(ArgSpec::boolean("Dot matches all", false))
            .arg(ArgSpec::boolean("Global", false)),
        Contract::flow("Label", DishType::String, FlowControl::Label)
            .describe("Mark a jump target")
            .arg(ArgSpec::string("Name", "")),
        Contract::flow("Jump", DishType::String, FlowControl::Jump)
            .describe("Continue at a label")
            .arg(ArgSpec::string("Label name", ""))
            .arg(ArgSpec::number("Maximum jumps (if jumping backwards)", DEFAULT_MAX_JUMPS).min(0.0)),
        Contract::flow("Conditional Jump", DishType::String, FlowControl::ConditionalJump)
            .describe("Continue at a label when the input matches a regex")
            .arg(ArgSpec::string("Match (regex)", ""))
            .arg(ArgSpec::boolean("Invert match", false))
            .arg(ArgSpec::string("Label name", ""))
            .arg(ArgSpec::number("Maximum jumps (if jumping backwards)", DEFAULT_MAX_JUMPS).min(0.0)),
        Contract::flow("Return", DishType::String, FlowControl::Return)
            .describe("Stop the recipe (or the current fork branch) here"),
    ]
}

// ============================================================================
// Delimiters
// ============================================================================

/// Expand `\n`, `\r`, `\t`, `\0`, `\\` and `\xHH` escapes. Unknown escapes are kept.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('n') => push_skip(&mut out, &mut chars, '\n'),
            Some('r') => push_skip(&mut out, &mut chars, '\r'),
            Some('t') => push_skip(&mut out, &mut chars, '\t'),
            Some('0') => push_skip(&mut out, &mut chars, '\0'),
            Some('\\') => push_skip(&mut out, &mut chars, '\\'),
            Some('x') => {
                let mut probe = chars.clone();
                probe.next();
                let hex: String = probe.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(b) if hex.len() == 2 => {
                        out.push(char::from(b));
                        chars = probe;
                    }
                    _ => out.push('\\'),
                }
            }
            _ => out.push('\\'),
        }
    }
    out
}

fn push_skip(out: &mut String, chars: &mut std::iter::Peekable<std::str::Chars<'_>>, c: char) {
    out.push(c);
    chars.next();
}

/// Split the fork input on an unescaped delimiter. An empty delimiter splits
/// into characters.
pub fn split_pieces(input: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return input.chars().map(String::from).collect();
    }
    input.split(delimiter).map(String::from).collect()
}

// ============================================================================
// Regex helpers
// ============================================================================

/// Build the Register extractor.
pub fn register_regex(
    pattern: &str,
    case_insensitive: bool,
    multiline: bool,
    dot_matches_all: bool,
) -> Result<Regex, String> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .multi_line(multiline)
        .dot_matches_new_line(dot_matches_all)
        .build()
        .map_err(|e| format!("invalid regex '{}': {}", pattern, e))
}

/// Capture groups of the first match (or every match when `global`), in order.
/// Groups that did not participate capture `""`.
pub fn capture_groups(re: &Regex, text: &str, global: bool) -> Vec<String> {
    let mut out = Vec::new();
    for caps in re.captures_iter(text) {
        for group in caps.iter().skip(1) {
            out.push(group.map(|m| m.as_str().to_string()).unwrap_or_default());
        }
        if !global {
            break;
        }
    }
    out
}

/// Whether a Conditional Jump fires.
pub fn jump_condition(pattern: &str, text: &str, invert: bool) -> Result<bool, String> {
    let re = Regex::new(pattern).map_err(|e| format!("invalid regex '{}': {}", pattern, e))?;
    Ok(re.is_match(text) != invert)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gl007_unescape() {
        assert_eq!(unescape("\\n"), "\n");
        assert_eq!(unescape("a\\tb\\r\\n"), "a\tb\r\n");
        assert_eq!(unescape("\\x41\\x2c"), "A,");
        assert_eq!(unescape("\\\\n"), "\\n");
        assert_eq!(unescape("\\0"), "\0");
        assert_eq!(unescape("\\q"), "\\q");
        assert_eq!(unescape("\\xZZ"), "\\xZZ");
        assert_eq!(unescape("plain"), "plain");
    }

    #[test]
    fn test_gl007_split_pieces() {
        assert_eq!(split_pieces("a\nb\nc", "\n"), vec!["a", "b", "c"]);
        assert_eq!(split_pieces("", "\n"), vec![""]);
        assert_eq!(split_pieces("ab", ""), vec!["a", "b"]);
        assert!(split_pieces("", "").is_empty());
        assert_eq!(split_pieces("a,,b", ","), vec!["a", "", "b"]);
    }

    #[test]
    fn test_gl007_capture_first_match() {
        let re = register_regex("key=([\\da-f]*)", true, false, false).unwrap();
        assert_eq!(capture_groups(&re, "key=abc123 key=ff", false), vec!["abc123"]);
        assert_eq!(capture_groups(&re, "key=abc123 key=ff", true), vec!["abc123", "ff"]);
        assert_eq!(capture_groups(&re, "KEY=1", false), vec!["1"]);
        assert!(capture_groups(&re, "nothing", false).is_empty());
    }

    #[test]
    fn test_gl007_capture_optional_group() {
        let re = register_regex("(a)(x)?(b)", false, false, false).unwrap();
        assert_eq!(capture_groups(&re, "ab", false), vec!["a", "", "b"]);
    }

    #[test]
    fn test_gl007_register_flags() {
        let re = register_regex("^b$", false, true, false).unwrap();
        assert!(re.is_match("a\nb"));
        let re = register_regex("a.b", false, false, true).unwrap();
        assert!(re.is_match("a\nb"));
        assert!(register_regex("(", true, false, false).is_err());
    }

    #[test]
    fn test_gl007_jump_condition() {
        assert!(jump_condition("^x", "xyz", false).unwrap());
        assert!(!jump_condition("^x", "xyz", true).unwrap());
        assert!(jump_condition("^q", "xyz", true).unwrap());
        assert!(jump_condition("[", "xyz", false).is_err());
    }

    #[test]
    fn test_gl007_contract_defaults() {
        let all = contracts();
        assert_eq!(all.len(), 7);
        let fork = &all[0];
        assert_eq!(fork.name, "Fork");
        assert_eq!(fork.flow_control(), Some(FlowControl::Fork));
        assert_eq!(fork.arguments.len(), 3);
        let cj = all.iter().find(|c| c.name == "Conditional Jump").unwrap();
        assert_eq!(cj.arguments[3].default, crate::core::recipe::ArgValue::Number(10.0));
    }
}
