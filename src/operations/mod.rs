//! GL-010: Operation contract, argument schema, and registry.
//!
//! Every step of a recipe resolves to a [`Contract`]: a stable name, the
//! dish types it consumes and produces, an ordered argument schema, and an
//! [`Action`] — either a transformation implementing [`Operation`] or one of
//! the flow-control behaviours the interpreter handles itself.
//!
//! The [`Registry`] is an immutable name → contract map shared by every run.

pub mod compression;
pub mod encoding;
pub mod hashing;
pub mod numeric;
pub mod text;
pub mod utility;

use crate::core::dish::Decoding;
use crate::core::errors::{OperationError, UnknownOperationError};
use crate::core::flow::{self, FlowControl};
use crate::core::recipe::{ArgValue, Step, ToggleString, TOGGLE_ENCODINGS};
use crate::core::types::{format_number, DishType, DishValue, Host};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Run context
// ============================================================================

/// Explicit per-run environment handed to every operation.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub host: Host,
    pub cancel: CancellationToken,
    pub decoding: Decoding,
}

impl RunContext {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            ..Self::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ============================================================================
// Operation trait
// ============================================================================

/// A transformation step. Implementations must be stateless.
#[async_trait]
pub trait Operation: Send + Sync {
    async fn run(
        &self,
        input: DishValue,
        args: &Args,
        ctx: &RunContext,
    ) -> Result<DishValue, OperationError>;
}

/// Adapter turning a synchronous closure into an [`Operation`].
pub struct FnOperation<F>(pub F);

#[async_trait]
impl<F> Operation for FnOperation<F>
where
    F: Fn(DishValue, &Args, &RunContext) -> Result<DishValue, OperationError> + Send + Sync,
{
    async fn run(
        &self,
        input: DishValue,
        args: &Args,
        ctx: &RunContext,
    ) -> Result<DishValue, OperationError> {
        (self.0)(input, args, ctx)
    }
}

/// What the interpreter does with a step.
#[derive(Clone)]
pub enum Action {
    Transform(Arc<dyn Operation>),
    Flow(FlowControl),
}

// ============================================================================
// Contracts
// ============================================================================

/// The declared interface of an operation.
#[derive(Clone)]
pub struct Contract {
    pub name: String,
    pub description: String,
    pub input_type: DishType,
    pub output_type: DishType,
    pub arguments: Vec<ArgSpec>,
    pub excluded_hosts: Vec<Host>,
    pub action: Action,
}

impl Contract {
    pub fn transform(
        name: impl Into<String>,
        input_type: DishType,
        output_type: DishType,
        op: impl Operation + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_type,
            output_type,
            arguments: Vec::new(),
            excluded_hosts: Vec::new(),
            action: Action::Transform(Arc::new(op)),
        }
    }

    /// A transformation backed by a synchronous function.
    pub fn sync<F>(name: impl Into<String>, input_type: DishType, output_type: DishType, f: F) -> Self
    where
        F: Fn(DishValue, &Args, &RunContext) -> Result<DishValue, OperationError>
            + Send
            + Sync
            + 'static,
    {
        Self::transform(name, input_type, output_type, FnOperation(f))
    }

    pub fn flow(name: impl Into<String>, input_type: DishType, control: FlowControl) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_type,
            output_type: input_type,
            arguments: Vec::new(),
            excluded_hosts: Vec::new(),
            action: Action::Flow(control),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn arg(mut self, spec: ArgSpec) -> Self {
        self.arguments.push(spec);
        self
    }

    pub fn exclude_from(mut self, host: Host) -> Self {
        self.excluded_hosts.push(host);
        self
    }

    pub fn flow_control(&self) -> Option<FlowControl> {
        match self.action {
            Action::Flow(control) => Some(control),
            Action::Transform(_) => None,
        }
    }

    pub fn is_available_on(&self, host: Host) -> bool {
        !self.excluded_hosts.contains(&host)
    }

    /// One-line signature for listings: `name: in -> out (args)`.
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .arguments
            .iter()
            .map(|a| format!("{}: {}", a.name, a.kind))
            .collect();
        format!(
            "{}: {} -> {} ({})",
            self.name,
            self.input_type,
            self.output_type,
            args.join(", ")
        )
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("name", &self.name)
            .field("input_type", &self.input_type)
            .field("output_type", &self.output_type)
            .field("arguments", &self.arguments)
            .field("flow_control", &self.flow_control())
            .finish()
    }
}

// ============================================================================
// Argument schema
// ============================================================================

/// Kind of a declared argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Number,
    Boolean,
    ToggleString,
    Option,
    OperationList,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::ToggleString => write!(f, "toggleString"),
            Self::Option => write!(f, "option"),
            Self::OperationList => write!(f, "operationList"),
        }
    }
}

/// Constraints on an argument value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Allowed values for options, allowed encodings for toggle strings.
    pub choices: Vec<String>,
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub default: ArgValue,
    pub constraints: Constraints,
}

impl ArgSpec {
    fn of(name: &str, kind: ArgKind, default: ArgValue) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default,
            constraints: Constraints::default(),
        }
    }

    pub fn string(name: &str, default: &str) -> Self {
        Self::of(name, ArgKind::String, ArgValue::from(default))
    }

    pub fn number(name: &str, default: f64) -> Self {
        Self::of(name, ArgKind::Number, ArgValue::Number(default))
    }

    pub fn boolean(name: &str, default: bool) -> Self {
        Self::of(name, ArgKind::Boolean, ArgValue::Bool(default))
    }

    /// A byte string; the first listed encoding is the default.
    pub fn toggle(name: &str, default: &str, encodings: &[&str]) -> Self {
        let encodings: Vec<&str> = if encodings.is_empty() {
            TOGGLE_ENCODINGS.to_vec()
        } else {
            encodings.to_vec()
        };
        let mut spec = Self::of(
            name,
            ArgKind::ToggleString,
            ArgValue::Toggle(ToggleString::new(encodings[0], default)),
        );
        spec.constraints.choices = encodings.iter().map(|s| s.to_string()).collect();
        spec
    }

    /// An enumerated option; the first choice is the default.
    pub fn option(name: &str, choices: &[&str]) -> Self {
        let mut spec = Self::of(
            name,
            ArgKind::Option,
            ArgValue::from(choices.first().copied().unwrap_or_default()),
        );
        spec.constraints.choices = choices.iter().map(|s| s.to_string()).collect();
        spec
    }

    pub fn operation_list(name: &str) -> Self {
        Self::of(name, ArgKind::OperationList, ArgValue::Steps(Vec::new()))
    }

    pub fn min(mut self, min: f64) -> Self {
        self.constraints.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.constraints.max = Some(max);
        self
    }

    /// Check a literal against the declared argument, coercing compatible literals
    /// (`256` for an option, `"true"` for a boolean) into the declared kind.
    ///
    /// Strings carrying register placeholders are only checked for kind once
    /// substituted, so they pass through untouched.
    pub fn normalize(&self, value: ArgValue) -> Result<ArgValue, String> {
        let deferred = value.as_str().is_some_and(has_placeholder);
        match (self.kind, value) {
            (ArgKind::String, ArgValue::String(s)) => Ok(ArgValue::String(s)),
            (ArgKind::String, ArgValue::Number(n)) => Ok(ArgValue::String(format_number(n))),
            (ArgKind::String, ArgValue::Bool(b)) => Ok(ArgValue::String(b.to_string())),

            (ArgKind::Number, ArgValue::Number(n)) => self.check_range(n).map(|_| ArgValue::Number(n)),
            (ArgKind::Number, ArgValue::String(s)) if deferred => Ok(ArgValue::String(s)),
            (ArgKind::Number, ArgValue::String(s)) => {
                let n = s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("{} must be a number, got '{}'", self.name, s))?;
                self.check_range(n).map(|_| ArgValue::Number(n))
            }

            (ArgKind::Boolean, ArgValue::Bool(b)) => Ok(ArgValue::Bool(b)),
            (ArgKind::Boolean, ArgValue::String(s)) if deferred => Ok(ArgValue::String(s)),
            (ArgKind::Boolean, ArgValue::String(s)) => match s.trim() {
                "true" => Ok(ArgValue::Bool(true)),
                "false" => Ok(ArgValue::Bool(false)),
                _ => Err(format!("{} must be a boolean, got '{}'", self.name, s)),
            },

            (ArgKind::ToggleString, ArgValue::Toggle(mut t)) => {
                if !self.allows(&t.option, true) {
                    return Err(format!(
                        "{} encoding must be one of: {}",
                        self.name,
                        self.constraints.choices.join(", ")
                    ));
                }
                // Operations match on the declared spelling.
                if let Some(choice) = self
                    .constraints
                    .choices
                    .iter()
                    .find(|c| c.eq_ignore_ascii_case(&t.option))
                {
                    t.option = choice.clone();
                }
                Ok(ArgValue::Toggle(t))
            }
            (ArgKind::ToggleString, ArgValue::String(s)) => {
                let option = self
                    .constraints
                    .choices
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "UTF8".to_string());
                Ok(ArgValue::Toggle(ToggleString::new(option, s)))
            }

            (ArgKind::Option, ArgValue::Number(n)) => self.normalize(ArgValue::String(format_number(n))),
            (ArgKind::Option, ArgValue::String(s)) => {
                if deferred || self.allows(&s, false) {
                    Ok(ArgValue::String(s))
                } else {
                    Err(format!(
                        "{} must be one of: {}",
                        self.name,
                        self.constraints.choices.join(", ")
                    ))
                }
            }

            (ArgKind::OperationList, ArgValue::Steps(steps)) => Ok(ArgValue::Steps(steps)),

            (kind, other) => Err(format!(
                "{} expects a {}, got a {}",
                self.name,
                kind,
                other.kind_name()
            )),
        }
    }

    fn check_range(&self, n: f64) -> Result<(), String> {
        if let Some(min) = self.constraints.min {
            if n < min {
                return Err(format!("{} must be >= {}", self.name, format_number(min)));
            }
        }
        if let Some(max) = self.constraints.max {
            if n > max {
                return Err(format!("{} must be <= {}", self.name, format_number(max)));
            }
        }
        Ok(())
    }

    fn allows(&self, candidate: &str, ignore_case: bool) -> bool {
        self.constraints.choices.is_empty()
            || self.constraints.choices.iter().any(|c| {
                if ignore_case {
                    c.eq_ignore_ascii_case(candidate)
                } else {
                    c == candidate
                }
            })
    }
}

/// True when `s` contains an unescaped `$R<n>` token.
pub fn has_placeholder(s: &str) -> bool {
    crate::core::resolver::find_placeholders(s).next().is_some()
}

// ============================================================================
// Resolved arguments
// ============================================================================

/// Fully resolved argument list handed to `run`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<ArgValue>,
}

impl Args {
    pub fn new(values: Vec<ArgValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    fn required(&self, index: usize) -> Result<&ArgValue, OperationError> {
        self.values
            .get(index)
            .ok_or_else(|| OperationError::invalid_argument(index, "missing"))
    }

    /// String text; toggle strings yield their text.
    pub fn string(&self, index: usize) -> Result<&str, OperationError> {
        let value = self.required(index)?;
        value.as_str().ok_or_else(|| {
            OperationError::invalid_argument(index, format!("expected a string, got a {}", value.kind_name()))
        })
    }

    /// Number; numeric strings (e.g. substituted registers) are parsed.
    pub fn number(&self, index: usize) -> Result<f64, OperationError> {
        match self.required(index)? {
            ArgValue::Number(n) => Ok(*n),
            ArgValue::String(s) => s.trim().parse::<f64>().map_err(|_| {
                OperationError::invalid_argument(index, format!("'{}' is not a number", s))
            }),
            other => Err(OperationError::invalid_argument(
                index,
                format!("expected a number, got a {}", other.kind_name()),
            )),
        }
    }

    pub fn integer(&self, index: usize) -> Result<i64, OperationError> {
        let n = self.number(index)?;
        if n.fract() != 0.0 || !n.is_finite() {
            return Err(OperationError::invalid_argument(
                index,
                format!("{} is not an integer", format_number(n)),
            ));
        }
        Ok(n as i64)
    }

    pub fn boolean(&self, index: usize) -> Result<bool, OperationError> {
        match self.required(index)? {
            ArgValue::Bool(b) => Ok(*b),
            ArgValue::String(s) if s.trim() == "true" => Ok(true),
            ArgValue::String(s) if s.trim() == "false" => Ok(false),
            other => Err(OperationError::invalid_argument(
                index,
                format!("expected a boolean, got a {}", other.kind_name()),
            )),
        }
    }

    /// Selected option; numbers are rendered as their option text.
    pub fn option(&self, index: usize) -> Result<String, OperationError> {
        match self.required(index)? {
            ArgValue::String(s) => Ok(s.clone()),
            ArgValue::Number(n) => Ok(format_number(*n)),
            other => Err(OperationError::invalid_argument(
                index,
                format!("expected an option, got a {}", other.kind_name()),
            )),
        }
    }

    pub fn toggle(&self, index: usize) -> Result<&ToggleString, OperationError> {
        match self.required(index)? {
            ArgValue::Toggle(t) => Ok(t),
            other => Err(OperationError::invalid_argument(
                index,
                format!("expected a toggle string, got a {}", other.kind_name()),
            )),
        }
    }

    /// Bytes of a toggle string, decoded with its encoding. Plain strings are UTF-8.
    pub fn bytes(&self, index: usize) -> Result<Vec<u8>, OperationError> {
        match self.required(index)? {
            ArgValue::Toggle(t) => t
                .decode()
                .map_err(|e| OperationError::invalid_argument(index, e)),
            ArgValue::String(s) => Ok(s.as_bytes().to_vec()),
            other => Err(OperationError::invalid_argument(
                index,
                format!("expected a byte string, got a {}", other.kind_name()),
            )),
        }
    }

    pub fn steps(&self, index: usize) -> Result<&[Step], OperationError> {
        match self.required(index)? {
            ArgValue::Steps(steps) => Ok(steps),
            other => Err(OperationError::invalid_argument(
                index,
                format!("expected an operation list, got a {}", other.kind_name()),
            )),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable name → contract lookup, cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    contracts: IndexMap<String, Arc<Contract>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the flow-control operations.
    pub fn flow_control() -> Self {
        let mut registry = Self::new();
        registry.extend(flow::contracts());
        registry
    }

    /// Flow control plus the built-in operation library.
    pub fn standard() -> Self {
        let mut registry = Self::flow_control();
        registry.extend(text::contracts());
        registry.extend(encoding::contracts());
        registry.extend(hashing::contracts());
        registry.extend(compression::contracts());
        registry.extend(numeric::contracts());
        registry.extend(utility::contracts());
        registry
    }

    fn extend(&mut self, contracts: Vec<Contract>) {
        for contract in contracts {
            self.contracts.insert(contract.name.clone(), Arc::new(contract));
        }
    }

    /// Register an external operation. Names are unique.
    pub fn register(&mut self, contract: Contract) -> Result<(), String> {
        if self.contracts.contains_key(&contract.name) {
            return Err(format!("operation '{}' is already registered", contract.name));
        }
        self.contracts.insert(contract.name.clone(), Arc::new(contract));
        Ok(())
    }

    /// Look up an operation by its exact name.
    pub fn lookup(&self, name: &str) -> Result<Arc<Contract>, UnknownOperationError> {
        if let Some(contract) = self.contracts.get(name) {
            return Ok(Arc::clone(contract));
        }
        let wanted = fold_name(name);
        let suggestion = self
            .contracts
            .keys()
            .find(|candidate| fold_name(candidate) == wanted)
            .cloned();
        Err(UnknownOperationError {
            name: name.to_string(),
            suggestion,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Contracts in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Contract>> {
        self.contracts.values()
    }
}

fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
