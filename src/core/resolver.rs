//! GL-006: Static resolution and register substitution.
//!
//! Turns a [`RecipeFile`] into a [`Program`] before anything runs:
//! operations are looked up, arguments are checked against their schema and
//! defaulted, labels are indexed, Fork/Merge steps are paired in stack order
//! and every step is assigned the fork region it executes in. Jumps whose
//! label is known statically are verified here.
//!
//! Register placeholders (`$R0`, `$R1`, ...) are expanded per step at run
//! time by [`resolve_args`].

use super::errors::{InterpreterConfigError, RecipeError};
use super::flow::FlowControl;
use super::recipe::{ArgValue, Policy, RecipeFile};
use super::types::DishType;
use crate::operations::{has_placeholder, Contract, Registry};
use crate::trace::hasher;
use rustc_hash::FxHashMap;
use std::sync::Arc;

// ============================================================================
// Register placeholders
// ============================================================================

/// An unescaped `$R<n>` token in an argument string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub start: usize,
    pub end: usize,
    pub register: usize,
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Placeholder(Placeholder),
    /// `\$R<n>`: byte range of the backslash.
    Escaped(usize),
}

fn scan(s: &str) -> Vec<Token> {
    let bytes = s.as_bytes();
    let mut tokens = Vec::new();
    let mut start = 0;

    while let Some(found) = s[start..].find("$R") {
        let open = start + found;
        let digits = bytes[open + 2..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let end = open + 2 + digits;
        start = end;
        if digits == 0 {
            continue;
        }
        if open > 0 && bytes[open - 1] == b'\\' {
            tokens.push(Token::Escaped(open - 1));
            continue;
        }
        let register = s[open + 2..end].parse::<usize>().unwrap_or(usize::MAX);
        tokens.push(Token::Placeholder(Placeholder {
            start: open,
            end,
            register,
        }));
    }

    tokens
}

/// Unescaped placeholders in `s`, left to right.
pub fn find_placeholders(s: &str) -> impl Iterator<Item = Placeholder> {
    scan(s).into_iter().filter_map(|t| match t {
        Token::Placeholder(p) => Some(p),
        Token::Escaped(_) => None,
    })
}

/// Replace `$R<n>` with `registers[n]` (missing registers become `""`).
/// `\$R<n>` is kept as the literal `$R<n>`.
pub fn substitute_registers(s: &str, registers: &[String]) -> String {
    let tokens = scan(s);
    if tokens.is_empty() {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut cursor = 0;
    for token in tokens {
        match token {
            Token::Placeholder(p) => {
                out.push_str(&s[cursor..p.start]);
                if let Some(value) = registers.get(p.register) {
                    out.push_str(value);
                }
                cursor = p.end;
            }
            Token::Escaped(backslash) => {
                out.push_str(&s[cursor..backslash]);
                cursor = backslash + 1;
            }
        }
    }
    out.push_str(&s[cursor..]);
    out
}

/// Expand placeholders in every string and toggle-string argument.
pub fn resolve_args(args: &[ArgValue], registers: &[String]) -> Vec<ArgValue> {
    args.iter()
        .map(|arg| match arg {
            ArgValue::String(s) => ArgValue::String(substitute_registers(s, registers)),
            ArgValue::Toggle(t) => {
                let mut t = t.clone();
                t.string = substitute_registers(&t.string, registers);
                ArgValue::Toggle(t)
            }
            other => other.clone(),
        })
        .collect()
}

// ============================================================================
// Program
// ============================================================================

/// A step with its contract looked up and its arguments checked.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub index: usize,
    pub op: String,
    pub contract: Arc<Contract>,
    pub args: Vec<ArgValue>,
    pub disabled: bool,
}

impl ResolvedStep {
    pub fn flow_control(&self) -> Option<FlowControl> {
        if self.disabled {
            None
        } else {
            self.contract.flow_control()
        }
    }
}

/// Where a jump lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// Continue at this step index.
    Step(usize),
    /// Skip to the end of the current fork branch, or of the recipe.
    RegionEnd,
    /// The label does not exist in the jumping step's region.
    Invalid,
}

/// The statically resolved form of a recipe.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub input_type: Option<DishType>,
    pub policy: Policy,
    /// Digest of the recipe's steps as written.
    pub recipe_hash: String,
    steps: Vec<ResolvedStep>,
    labels: FxHashMap<String, usize>,
    /// Fork index → matching Merge index, or the recipe length when unclosed.
    fork_ends: FxHashMap<usize, usize>,
    /// Innermost enclosing Fork of each step. A Fork belongs to its parent
    /// region, a Merge to the region it closes.
    regions: Vec<Option<usize>>,
}

impl Program {
    pub fn steps(&self) -> &[ResolvedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&ResolvedStep> {
        self.steps.get(index)
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn region(&self, index: usize) -> Option<usize> {
        self.regions.get(index).copied().flatten()
    }

    /// End of a fork's branch region: its Merge, or the recipe length.
    pub fn fork_end(&self, fork: usize) -> usize {
        self.fork_ends.get(&fork).copied().unwrap_or(self.steps.len())
    }

    /// Resolve a jump from step `from` to `label`.
    ///
    /// An empty label lands on a `Label("")` in the same region, and
    /// otherwise skips to the end of that region.
    pub fn jump_target(&self, from: usize, label: &str) -> JumpTarget {
        match self.labels.get(label) {
            Some(&target) if self.region(target) == self.region(from) => JumpTarget::Step(target),
            _ if label.is_empty() => JumpTarget::RegionEnd,
            Some(_) => JumpTarget::Invalid,
            None => JumpTarget::Invalid,
        }
    }
}

/// Resolve a recipe against a registry.
pub fn resolve(recipe: &RecipeFile, registry: &Registry) -> Result<Program, RecipeError> {
    let mut steps = Vec::with_capacity(recipe.steps.len());
    for (index, step) in recipe.steps.iter().enumerate() {
        let contract = registry.lookup(&step.op)?;
        let args = if step.disabled {
            step.args.clone()
        } else {
            check_args(index, &contract, &step.args)?
        };
        steps.push(ResolvedStep {
            index,
            op: step.op.clone(),
            contract,
            args,
            disabled: step.disabled,
        });
    }

    let (fork_ends, regions) = pair_forks(&steps)?;
    let labels = index_labels(&steps)?;

    let program = Program {
        name: recipe.name.clone(),
        input_type: recipe.input_type,
        policy: recipe.policy.clone(),
        recipe_hash: hasher::hash_steps(&recipe.steps),
        steps,
        labels,
        fork_ends,
        regions,
    };
    check_jumps(&program)?;
    Ok(program)
}

fn check_args(
    index: usize,
    contract: &Contract,
    given: &[ArgValue],
) -> Result<Vec<ArgValue>, InterpreterConfigError> {
    let invalid = |message: String| InterpreterConfigError::InvalidArgument {
        step: index,
        op: contract.name.clone(),
        message,
    };

    if given.len() > contract.arguments.len() {
        return Err(invalid(format!(
            "expected at most {} arguments, got {}",
            contract.arguments.len(),
            given.len()
        )));
    }

    contract
        .arguments
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let value = given.get(i).cloned().unwrap_or_else(|| spec.default.clone());
            spec.normalize(value).map_err(invalid)
        })
        .collect()
}

type ForkLayout = (FxHashMap<usize, usize>, Vec<Option<usize>>);

fn pair_forks(steps: &[ResolvedStep]) -> Result<ForkLayout, InterpreterConfigError> {
    let mut open: Vec<usize> = Vec::new();
    let mut fork_ends = FxHashMap::default();
    let mut regions = Vec::with_capacity(steps.len());

    for step in steps {
        match step.flow_control() {
            Some(FlowControl::Fork) => {
                regions.push(open.last().copied());
                open.push(step.index);
            }
            Some(FlowControl::Merge) => {
                let fork = open
                    .pop()
                    .ok_or(InterpreterConfigError::UnmatchedMerge { step: step.index })?;
                fork_ends.insert(fork, step.index);
                regions.push(Some(fork));
            }
            _ => regions.push(open.last().copied()),
        }
    }

    for fork in open {
        fork_ends.insert(fork, steps.len());
    }
    Ok((fork_ends, regions))
}

fn index_labels(steps: &[ResolvedStep]) -> Result<FxHashMap<String, usize>, InterpreterConfigError> {
    let mut labels: FxHashMap<String, usize> = FxHashMap::default();
    for step in steps {
        if step.flow_control() != Some(FlowControl::Label) {
            continue;
        }
        let name = step.args.first().and_then(ArgValue::as_str).unwrap_or_default();
        if let Some(&first) = labels.get(name) {
            return Err(InterpreterConfigError::DuplicateLabel {
                name: name.to_string(),
                first,
                second: step.index,
            });
        }
        labels.insert(name.to_string(), step.index);
    }
    Ok(labels)
}

/// Index of the label argument for jump steps.
pub fn label_arg(control: FlowControl) -> Option<usize> {
    match control {
        FlowControl::Jump => Some(0),
        FlowControl::ConditionalJump => Some(2),
        _ => None,
    }
}

fn check_jumps(program: &Program) -> Result<(), InterpreterConfigError> {
    for step in program.steps() {
        let Some(arg) = step.flow_control().and_then(label_arg) else {
            continue;
        };
        let label = step.args.get(arg).and_then(ArgValue::as_str).unwrap_or_default();
        if has_placeholder(label) {
            continue;
        }
        match program.jump_target(step.index, label) {
            JumpTarget::Step(_) | JumpTarget::RegionEnd => {}
            JumpTarget::Invalid if program.label(label).is_some() => {
                return Err(InterpreterConfigError::CrossRegionJump {
                    step: step.index,
                    label: label.to_string(),
                });
            }
            JumpTarget::Invalid => {
                return Err(InterpreterConfigError::UnknownLabel {
                    step: step.index,
                    label: label.to_string(),
                });
            }
        }
    }
    Ok(())
}
