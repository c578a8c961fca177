//! Text operations: case, reversal, find/replace, affixes, counting.

use super::{ArgSpec, Args, Contract, RunContext};
use crate::core::dish::{decode_text, Decoding};
use crate::core::errors::OperationError;
use crate::core::flow::unescape;
use crate::core::recipe::ToggleString;
use crate::core::types::{DishType, DishValue};
use regex::{NoExpand, Regex, RegexBuilder};

const SEARCH_MODES: [&str; 3] = ["Regex", "Extended (\\n, \\t, \\x...)", "Simple string"];

pub fn contracts() -> Vec<Contract> {
    vec![
        Contract::sync("To Upper case", DishType::String, DishType::String, |input, _, _| {
            map_text(input, |s| s.to_uppercase())
        })
        .describe("Convert every character to upper case"),
        Contract::sync("To Lower case", DishType::String, DishType::String, |input, _, _| {
            map_text(input, |s| s.to_lowercase())
        })
        .describe("Convert every character to lower case"),
        Contract::sync("Reverse", DishType::ByteArray, DishType::ByteArray, reverse)
            .describe("Reverse the input by character, line or byte")
            .arg(ArgSpec::option("By", &["Character", "Line", "Byte"])),
        Contract::sync("Find / Replace", DishType::String, DishType::String, find_replace)
            .describe("Replace matches of a string or regex")
            .arg(ArgSpec::toggle("Find", "", &SEARCH_MODES))
            .arg(ArgSpec::string("Replace", ""))
            .arg(ArgSpec::boolean("Global match", true))
            .arg(ArgSpec::boolean("Case insensitive", false))
            .arg(ArgSpec::boolean("Multiline matching", true))
            .arg(ArgSpec::boolean("Dot matches all", false)),
        Contract::sync("Prepend", DishType::String, DishType::String, |input, args, _| {
            let prefix = args.string(0)?;
            map_text(input, |s| format!("{}{}", prefix, s))
        })
        .describe("Add text to the start of the input")
        .arg(ArgSpec::string("Text", "")),
        Contract::sync("Append", DishType::String, DishType::String, |input, args, _| {
            let suffix = args.string(0)?;
            map_text(input, |s| format!("{}{}", s, suffix))
        })
        .describe("Add text to the end of the input")
        .arg(ArgSpec::string("Text", "")),
        Contract::sync("Count occurrences", DishType::String, DishType::Number, count)
            .describe("Count matches of a string or regex")
            .arg(ArgSpec::toggle("Search string", "", &SEARCH_MODES)),
    ]
}

fn text_of(input: DishValue) -> Result<String, OperationError> {
    match input {
        DishValue::String(s) => Ok(s),
        other => Err(OperationError::new(format!("expected a string, got {}", other.dish_type()))),
    }
}

fn map_text(input: DishValue, f: impl FnOnce(&str) -> String) -> Result<DishValue, OperationError> {
    let s = text_of(input)?;
    Ok(DishValue::String(f(&s)))
}

fn reverse(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let DishValue::ByteArray(bytes) = input else {
        return Err(OperationError::new("expected a byteArray"));
    };
    let out = match args.option(0)?.as_str() {
        "Byte" => bytes.into_iter().rev().collect(),
        "Line" => {
            let text = decode_text(&bytes, Decoding::default()).map_err(OperationError::new)?;
            text.split('\n').rev().collect::<Vec<_>>().join("\n").into_bytes()
        }
        _ => {
            let text = decode_text(&bytes, Decoding::default()).map_err(OperationError::new)?;
            text.chars().rev().collect::<String>().into_bytes()
        }
    };
    Ok(DishValue::ByteArray(out))
}

/// Compile a search toggle into a regex according to its mode.
fn search_regex(
    search: &ToggleString,
    case_insensitive: bool,
    multiline: bool,
    dot_matches_all: bool,
) -> Result<Regex, OperationError> {
    let pattern = match search.option.as_str() {
        "Regex" => search.string.clone(),
        "Simple string" => regex::escape(&search.string),
        _ => regex::escape(&unescape(&search.string)),
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(case_insensitive)
        .multi_line(multiline)
        .dot_matches_new_line(dot_matches_all)
        .build()
        .map_err(|e| OperationError::new(format!("invalid regex: {}", e)))
}

fn find_replace(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let text = text_of(input)?;
    let find = args.toggle(0)?;
    if find.string.is_empty() {
        return Ok(DishValue::String(text));
    }
    let re = search_regex(find, args.boolean(3)?, args.boolean(4)?, args.boolean(5)?)?;
    let replace = args.string(1)?;
    let global = args.boolean(2)?;

    let out = match (find.option.as_str(), global) {
        ("Regex", true) => re.replace_all(&text, replace),
        ("Regex", false) => re.replace(&text, replace),
        (_, true) => re.replace_all(&text, NoExpand(replace)),
        (_, false) => re.replace(&text, NoExpand(replace)),
    };
    Ok(DishValue::String(out.into_owned()))
}

fn count(input: DishValue, args: &Args, _ctx: &RunContext) -> Result<DishValue, OperationError> {
    let text = text_of(input)?;
    let search = args.toggle(0)?;
    if search.string.is_empty() {
        return Ok(DishValue::Number(0.0));
    }
    let re = search_regex(search, false, true, false)?;
    Ok(DishValue::Number(re.find_iter(&text).count() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::ArgValue;
    use crate::operations::{Action, Registry};

    async fn apply(name: &str, input: DishValue, args: Vec<ArgValue>) -> Result<DishValue, OperationError> {
        let registry = Registry::standard();
        let contract = registry.lookup(name).unwrap();
        let Action::Transform(op) = &contract.action else {
            panic!("{} is not a transform", name);
        };
        let args: Vec<ArgValue> = contract
            .arguments
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.normalize(args.get(i).cloned().unwrap_or_else(|| spec.default.clone())).unwrap())
            .collect();
        op.run(input, &Args::new(args), &RunContext::default()).await
    }

    fn s(text: &str) -> DishValue {
        DishValue::String(text.to_string())
    }

    fn find(mode: &str, text: &str) -> ArgValue {
        ArgValue::Toggle(ToggleString::new(mode, text))
    }

    #[tokio::test]
    async fn test_gl011_case() {
        assert_eq!(apply("To Upper case", s("abc é"), vec![]).await.unwrap(), s("ABC É"));
        assert_eq!(apply("To Lower case", s("ABC"), vec![]).await.unwrap(), s("abc"));
    }

    #[tokio::test]
    async fn test_gl011_reverse_modes() {
        let input = DishValue::ByteArray("ab\ncé".as_bytes().to_vec());
        assert_eq!(
            apply("Reverse", input.clone(), vec![]).await.unwrap(),
            DishValue::ByteArray("éc\nba".as_bytes().to_vec())
        );
        assert_eq!(
            apply("Reverse", input, vec!["Line".into()]).await.unwrap(),
            DishValue::ByteArray("cé\nab".as_bytes().to_vec())
        );
        assert_eq!(
            apply("Reverse", DishValue::ByteArray(vec![1, 2, 3]), vec!["Byte".into()]).await.unwrap(),
            DishValue::ByteArray(vec![3, 2, 1])
        );
    }

    #[tokio::test]
    async fn test_gl011_find_replace_simple() {
        let out = apply("Find / Replace", s("a.b.c"), vec![find("Simple string", "."), "$1".into()])
            .await
            .unwrap();
        assert_eq!(out, s("a$1b$1c"));
    }

    #[tokio::test]
    async fn test_gl011_find_replace_regex_groups() {
        let out = apply(
            "Find / Replace",
            s("key=abc"),
            vec![find("Regex", "(\\w+)=(\\w+)"), "$2=$1".into()],
        )
        .await
        .unwrap();
        assert_eq!(out, s("abc=key"));
    }

    #[tokio::test]
    async fn test_gl011_find_replace_first_only_and_case() {
        let out = apply(
            "Find / Replace",
            s("Aaa"),
            vec![find("Simple string", "a"), "-".into(), false.into(), true.into()],
        )
        .await
        .unwrap();
        assert_eq!(out, s("-aa"));
    }

    #[tokio::test]
    async fn test_gl011_find_replace_extended() {
        let out = apply("Find / Replace", s("a\tb"), vec![find("Extended (\\n, \\t, \\x...)", "\\t"), " ".into()])
            .await
            .unwrap();
        assert_eq!(out, s("a b"));
    }

    #[tokio::test]
    async fn test_gl011_find_replace_bad_regex() {
        let err = apply("Find / Replace", s("x"), vec![find("Regex", "("), "".into()])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("invalid regex"));
    }

    #[tokio::test]
    async fn test_gl011_affixes() {
        assert_eq!(apply("Prepend", s("b"), vec!["a".into()]).await.unwrap(), s("ab"));
        assert_eq!(apply("Append", s("a"), vec!["b".into()]).await.unwrap(), s("ab"));
    }

    #[tokio::test]
    async fn test_gl011_count() {
        let out = apply("Count occurrences", s("a,b,,c"), vec![find("Simple string", ",")])
            .await
            .unwrap();
        assert_eq!(out, DishValue::Number(3.0));
        let out = apply("Count occurrences", s("a1b22"), vec![find("Regex", "\\d+")])
            .await
            .unwrap();
        assert_eq!(out, DishValue::Number(2.0));
    }

    #[tokio::test]
    async fn test_gl011_search_mode_is_case_insensitive() {
        let out = apply("Find / Replace", s("caaat a+"), vec![find("regex", "a+"), "X".into()])
            .await
            .unwrap();
        assert_eq!(out, s("cXt X+"));
        let out = apply("Count occurrences", s("a.b.c"), vec![find("simple STRING", ".")])
            .await
            .unwrap();
        assert_eq!(out, DishValue::Number(2.0));
    }
}
