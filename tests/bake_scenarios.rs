//! End-to-end recipe scenarios through the public API.

use galley::core::errors::{InterpreterConfigError, RecipeError};
use galley::core::recipe::{ArgValue, RecipeFile, Step};
use galley::core::types::HaltReason;
use galley::operations::ArgSpec;
use galley::{bake_recipe, parse_recipe, Bake, Contract, Dish, DishType, DishValue, Registry, RunContext};
use std::sync::{Arc, Mutex};

/// Standard registry plus an `Identity` op that records the argument it was given.
fn registry_with_identity() -> (Registry, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut registry = Registry::standard();
    registry
        .register(
            Contract::sync("Identity", DishType::String, DishType::String, move |input, args, _| {
                sink.lock().unwrap().push(args.string(0)?.to_string());
                Ok(input)
            })
            .arg(ArgSpec::string("Note", "")),
        )
        .unwrap();
    (registry, seen)
}

async fn bake_with(registry: &Registry, recipe: &str, input: &str) -> Bake {
    let recipe = parse_recipe(recipe).unwrap();
    bake_recipe(&recipe, registry, Dish::from_string(input), RunContext::default())
        .await
        .unwrap()
        .unwrap()
}

async fn bake_json(recipe: &str, input: &str) -> Bake {
    bake_with(&Registry::standard(), recipe, input).await
}

fn output(bake: &Bake) -> String {
    match bake.result.value() {
        Some(DishValue::String(s)) => s.clone(),
        _ => panic!("expected a string result, got {:?}", bake.result),
    }
}

#[tokio::test]
async fn fork_of_empty_input_is_empty() {
    let bake = bake_json(r#"[{"op":"Fork","args":["\n","\n",false]}]"#, "").await;
    assert_eq!(output(&bake), "");
    assert!(!bake.result.errored());
}

#[tokio::test]
async fn register_passes_capture_to_next_step() {
    let (registry, seen) = registry_with_identity();
    let bake = bake_with(
        &registry,
        r#"[{"op":"Register","args":["key=([\\da-f]*)",true,false]}, {"op":"Identity","args":["$R0"]}]"#,
        "key=abc123",
    )
    .await;
    assert_eq!(output(&bake), "key=abc123");
    assert_eq!(*seen.lock().unwrap(), vec!["abc123".to_string()]);
}

#[tokio::test]
async fn escaped_placeholder_is_literal() {
    let (registry, seen) = registry_with_identity();
    bake_with(
        &registry,
        r#"[{"op":"Register","args":["(.*)"]}, {"op":"Identity","args":["\\$R0=$R0"]}]"#,
        "v",
    )
    .await;
    assert_eq!(*seen.lock().unwrap(), vec!["$R0=v".to_string()]);
}

#[tokio::test]
async fn conditional_jump_skips_when_matching() {
    let recipe = r#"[
        {"op":"Conditional Jump","args":["^go",false,"",10]},
        {"op":"Append","args":["A"]},
        {"op":"Label","args":[""]},
        {"op":"Append","args":["B"]}
    ]"#;
    assert_eq!(output(&bake_json(recipe, "go").await), "goB");
    assert_eq!(output(&bake_json(recipe, "stop").await), "stopAB");
}

#[tokio::test]
async fn conditional_jump_without_label_step_skips_to_end() {
    let recipe = r#"[
        {"op":"Conditional Jump","args":["x",false,"",10]},
        {"op":"Append","args":["A"]}
    ]"#;
    assert_eq!(output(&bake_json(recipe, "x").await), "x");
    assert_eq!(output(&bake_json(recipe, "y").await), "yA");
}

#[tokio::test]
async fn endless_loop_hits_jump_bound() {
    let recipe = r#"[
        {"op":"Label","args":["top"]},
        {"op":"Jump","args":["top",10]}
    ]"#;
    let bake = bake_json(recipe, "x").await;
    assert_eq!(bake.halt, HaltReason::Error);
    assert_eq!(bake.jumps, 10);
    assert_eq!(
        bake.result.error_message(),
        Some("Jump (step 2): reached maximum jumps (10)")
    );
}

#[tokio::test]
async fn fork_merge_with_identity_round_trips() {
    let (registry, _) = registry_with_identity();
    let recipe = r#"[
        {"op":"Fork","args":[";",";",false]},
        {"op":"Identity"},
        {"op":"Merge"}
    ]"#;
    let bake = bake_with(&registry, recipe, "a;b;;c").await;
    assert_eq!(output(&bake), "a;b;;c");
}

#[tokio::test]
async fn decode_hash_pipeline_from_yaml() {
    let recipe = r#"
name: decode-and-hash
steps:
  - op: From Base64
  - op: SHA2
    args: ["256"]
"#;
    let bake = bake_json(recipe, "YWJj").await;
    assert_eq!(
        output(&bake),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[tokio::test]
async fn gzip_round_trip_in_recipe() {
    let recipe = r#"[{"op":"Gzip"},{"op":"To Base64"},{"op":"From Base64"},{"op":"Gunzip"}]"#;
    let bake = bake_json(recipe, "squeeze me").await;
    assert_eq!(
        bake.result.value(),
        Some(&DishValue::ArrayBuffer(b"squeeze me".to_vec()))
    );
}

#[tokio::test]
async fn sum_lines_to_big_number() {
    let bake = bake_json(r#"[{"op":"Sum","args":["Line feed"]}]"#, "99999999999999999999\n1").await;
    assert_eq!(bake.result.value().map(|v| v.dish_type()), Some(DishType::BigNumber));
    let json = serde_json::to_value(&bake.result).unwrap();
    assert_eq!(json["value"], serde_json::json!("100000000000000000000"));
}

#[tokio::test]
async fn failing_step_reports_single_message() {
    let bake = bake_json(r#"[{"op":"To Upper case"},{"op":"From Hex"}]"#, "xyz").await;
    assert_eq!(bake.halt, HaltReason::Error);
    let json = serde_json::to_value(&bake.result).unwrap();
    assert_eq!(json["errored"], serde_json::json!(true));
    assert!(json.get("value").is_none());
    let message = json["error"]["displayMessage"].as_str().unwrap();
    assert!(message.starts_with("From Hex (step 2): "), "{}", message);
}

#[tokio::test]
async fn fork_ignore_errors_collects_messages() {
    let recipe = r#"[
        {"op":"Fork","args":["\\n","\\n",true]},
        {"op":"JSON Beautify","args":[""]},
        {"op":"Merge"}
    ]"#;
    let bake = bake_json(recipe, "[1]\n{oops").await;
    let out = output(&bake);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "[");
    assert!(out.contains("JSON Beautify (step 2): cannot convert string to JSON"), "{}", out);
}

#[tokio::test]
async fn registers_are_scoped_to_branches() {
    let recipe = r#"[
        {"op":"Fork","args":[",",",",false]},
        {"op":"Register","args":["(.+)"]},
        {"op":"Prepend","args":["$R0:"]},
        {"op":"Merge"},
        {"op":"Append","args":["|$R0"]}
    ]"#;
    let bake = bake_json(recipe, "a,b").await;
    assert_eq!(output(&bake), "a:a,b:b|");
}

#[tokio::test]
async fn static_errors_prevent_the_run() {
    let registry = Registry::standard();
    let cases = [
        (r#"[{"op":"Merge"}]"#, "Merge at step 1 has no matching Fork"),
        (
            r#"[{"op":"Label","args":["a"]},{"op":"Label","args":["a"]}]"#,
            "duplicate label 'a' at steps 1 and 2",
        ),
        (r#"[{"op":"Jump","args":["nowhere"]}]"#, "step 1 jumps to unknown label 'nowhere'"),
        (r#"[{"op":"Nope"}]"#, "unknown operation 'Nope'"),
    ];
    for (text, expected) in cases {
        let recipe = parse_recipe(text).unwrap();
        let err = bake_recipe(&recipe, &registry, Dish::from_string("x"), RunContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), expected);
    }
}

#[tokio::test]
async fn invalid_argument_is_a_config_error() {
    let recipe = RecipeFile::from_steps(vec![Step::new("SHA2", vec![ArgValue::from("128")])]);
    let err = bake_recipe(&recipe, &Registry::standard(), Dish::from_string(""), RunContext::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RecipeError::Config(InterpreterConfigError::InvalidArgument { step: 0, .. })
    ));
}

#[tokio::test]
async fn cancellation_yields_no_result() {
    let recipe = parse_recipe(r#"[{"op":"Sleep","args":[60000]},{"op":"To Hex"}]"#).unwrap();
    let context = RunContext::default();
    let cancel = context.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();
    });
    let outcome = bake_recipe(&recipe, &Registry::standard(), Dish::from_string("x"), context)
        .await
        .unwrap();
    assert!(outcome.is_none());
}
