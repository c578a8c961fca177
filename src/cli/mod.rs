//! GL-020: CLI subcommands — bake, validate, operations, init.

pub mod logging;

use crate::core::dish::Dish;
use crate::core::executor::{self, BakeConfig};
use crate::core::types::{Bake, DishType, Host, RunResult};
use crate::core::{parser, resolver};
use crate::operations::{Registry, RunContext};
use clap::{Subcommand, ValueEnum};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter recipe
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Check a recipe without running it
    Validate {
        /// Path to the recipe (YAML or JSON)
        #[arg(short, long, default_value = "recipe.yaml")]
        file: PathBuf,
    },

    /// List registered operations
    Operations {
        /// Only show operations whose name contains this text (case-insensitive)
        filter: Option<String>,
    },

    /// Run a recipe over an input
    Bake {
        /// Path to the recipe (YAML or JSON)
        #[arg(short, long, default_value = "recipe.yaml")]
        file: PathBuf,

        /// Input text (default: read stdin)
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read the input bytes from a file
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Convert the input to this dish type before the first step
        #[arg(long, value_parser = parse_dish_type)]
        input_type: Option<DishType>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// Append a JSONL run trace to this file
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Fail on malformed UTF-8 instead of substituting U+FFFD
        #[arg(long)]
        strict_utf8: bool,
    },
}

/// How a baked value is written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable rendering
    Text,
    /// `{"value": ..., "errored": ...}` result object
    Json,
    /// The value's raw bytes
    Raw,
}

fn parse_dish_type(s: &str) -> Result<DishType, String> {
    s.parse()
}

/// Everything `bake` needs beyond the recipe itself.
#[derive(Debug, Clone)]
pub struct BakeOptions {
    pub file: PathBuf,
    pub input: Option<String>,
    pub input_file: Option<PathBuf>,
    pub input_type: Option<DishType>,
    pub trace: Option<PathBuf>,
    pub strict_utf8: bool,
}

/// Dispatch a CLI command.
pub async fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Operations { filter } => {
            print!("{}", list_operations(&Registry::standard(), filter.as_deref()));
            Ok(())
        }
        Commands::Bake {
            file,
            input,
            input_file,
            input_type,
            output,
            trace,
            strict_utf8,
        } => {
            let opts = BakeOptions {
                file,
                input,
                input_file,
                input_type,
                trace,
                strict_utf8,
            };
            cmd_bake(&opts, output).await
        }
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let recipe_path = path.join("recipe.yaml");
    if recipe_path.exists() {
        return Err(format!("{} already exists", recipe_path.display()));
    }
    std::fs::create_dir_all(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    let template = r#"version: "1.0"
name: my-recipe
description: "Split lines, upper-case each, hash the result"

policy:
  strict_utf8: false
  trace: false

steps:
  - op: Fork
    args: ["\\n", "\\n", false]
  - op: To Upper case
  - op: Merge
  - op: SHA2
    args: ["256"]
"#;
    std::fs::write(&recipe_path, template)
        .map_err(|e| format!("cannot write {}: {}", recipe_path.display(), e))?;

    println!("Initialized galley recipe at {}", recipe_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let recipe = parser::parse_recipe_file(file)?;
    let errors = parser::validate_recipe(&recipe);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }

    let program = resolver::resolve(&recipe, &Registry::standard()).map_err(|e| e.to_string())?;
    let active = program.steps().iter().filter(|s| !s.disabled).count();
    println!(
        "OK: {} ({} steps, {} disabled)",
        program.name,
        active,
        program.len() - active
    );
    Ok(())
}

/// One line per operation, in registration order.
pub fn list_operations(registry: &Registry, filter: Option<&str>) -> String {
    let filter = filter.map(str::to_lowercase);
    let mut out = String::new();
    for contract in registry.iter() {
        if let Some(ref f) = filter {
            if !contract.name.to_lowercase().contains(f.as_str()) {
                continue;
            }
        }
        let kind = if contract.flow_control().is_some() {
            "flow"
        } else {
            "op"
        };
        out.push_str(&format!("{:<5} {}\n", kind, contract.signature()));
    }
    out
}

async fn cmd_bake(opts: &BakeOptions, output: OutputFormat) -> Result<(), String> {
    let context = RunContext::new(Host::Cli);
    let cancel = context.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling bake");
            cancel.cancel();
        }
    });

    let bake = run_bake(opts, context).await?;
    let rendered = render(&bake.result, output)?;
    std::io::stdout()
        .write_all(&rendered)
        .map_err(|e| format!("write error: {}", e))?;

    match bake.result.error_message() {
        Some(message) if output != OutputFormat::Json => Err(message.to_string()),
        Some(_) => Err("bake failed".to_string()),
        None => Ok(()),
    }
}

/// Load, resolve and bake a recipe file.
pub async fn run_bake(opts: &BakeOptions, mut context: RunContext) -> Result<Bake, String> {
    let mut recipe = parser::parse_recipe_file(&opts.file)?;
    let errors = parser::validate_recipe(&recipe);
    if let Some(first) = errors.first() {
        return Err(first.to_string());
    }
    if opts.input_type.is_some() {
        recipe.input_type = opts.input_type;
    }
    if opts.strict_utf8 {
        context.decoding.strict = true;
    }

    let program = resolver::resolve(&recipe, &Registry::standard()).map_err(|e| e.to_string())?;
    let input = read_input(opts)?;

    let trace_path = opts.trace.clone().or_else(|| {
        recipe
            .policy
            .trace
            .then(|| opts.file.with_extension("trace.jsonl"))
    });

    let cfg = BakeConfig {
        program: &program,
        context,
        trace_path: trace_path.as_deref(),
    };
    executor::bake(&cfg, input)
        .await
        .ok_or_else(|| "bake cancelled".to_string())
}

fn read_input(opts: &BakeOptions) -> Result<Dish, String> {
    if let Some(ref text) = opts.input {
        return Ok(Dish::from_string(text.clone()));
    }
    if let Some(ref path) = opts.input_file {
        let bytes =
            std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        return Ok(Dish::from_bytes(bytes));
    }
    let mut bytes = Vec::new();
    std::io::stdin()
        .read_to_end(&mut bytes)
        .map_err(|e| format!("cannot read stdin: {}", e))?;
    Ok(Dish::from_bytes(bytes))
}

/// Render a run result for stdout. Errors render nothing except in JSON mode.
pub fn render(result: &RunResult, format: OutputFormat) -> Result<Vec<u8>, String> {
    match (format, result) {
        (OutputFormat::Json, _) => {
            let mut json = serde_json::to_string_pretty(result)
                .map_err(|e| format!("JSON serialize error: {}", e))?;
            json.push('\n');
            Ok(json.into_bytes())
        }
        (_, RunResult::Error { .. }) => Ok(Vec::new()),
        (OutputFormat::Text, RunResult::Value(value)) => {
            let mut text = Dish::new(value.clone()).to_display_string();
            if !text.ends_with('\n') {
                text.push('\n');
            }
            Ok(text.into_bytes())
        }
        (OutputFormat::Raw, RunResult::Value(value)) => Dish::new(value.clone())
            .get_bytes()
            .map_err(|e| e.to_string()),
    }
}
