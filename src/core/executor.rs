//! GL-008: Recipe interpreter — the bake loop.
//!
//! Walks a resolved [`Program`] over a dish:
//! cancel check → skip disabled → substitute registers → flow control or
//! `get(input_type)` → `run` → `set(output_type)` → trace → advance.
//!
//! Fork/Merge run on an explicit stack of [`ForkFrame`]s rather than
//! recursion. Branches run one after another, and the jump budget and
//! cancellation cover every branch of every nested fork.

use super::dish::{Decoding, Dish};
use super::errors::{InterpreterConfigError, OperationError, RecipeError, StepError};
use super::flow::{self, FlowControl};
use super::recipe::RecipeFile;
use super::resolver::{self, JumpTarget, Program, ResolvedStep};
use super::types::{Bake, DishValue, HaltReason, RunEvent, RunResult};
use crate::operations::{Action, Args, Registry, RunContext};
use crate::trace::{eventlog, hasher};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

/// Configuration for a bake run.
pub struct BakeConfig<'a> {
    pub program: &'a Program,
    pub context: RunContext,
    /// Append JSONL run events here when set.
    pub trace_path: Option<&'a Path>,
}

/// An open Fork: the branches still to run and the outputs collected so far.
#[derive(Debug)]
struct ForkFrame {
    fork: usize,
    /// First step index past the branch region (the Merge, or the recipe length).
    end: usize,
    join: String,
    ignore_errors: bool,
    pending: VecDeque<String>,
    outputs: Vec<String>,
    /// Registers at the Fork point; every branch starts from these.
    snapshot: Vec<String>,
}

/// What the program counter does after a step.
enum Next {
    Advance,
    Goto(usize),
    Return,
}

/// How the loop stopped.
enum Stop {
    Halted(HaltReason, RunResult),
    Cancelled,
}

struct Interpreter<'a> {
    program: &'a Program,
    ctx: RunContext,
    run_id: String,
    trace_path: Option<&'a Path>,
    pc: usize,
    dish: Dish,
    registers: Vec<String>,
    frames: Vec<ForkFrame>,
    jumps: u32,
    steps_executed: u32,
}

/// Resolve and bake a recipe in one call.
///
/// Returns `Err` when the recipe cannot start, `Ok(None)` when the run was
/// cancelled.
pub async fn bake_recipe(
    recipe: &RecipeFile,
    registry: &Registry,
    input: Dish,
    context: RunContext,
) -> Result<Option<Bake>, RecipeError> {
    let program = resolver::resolve(recipe, registry)?;
    let cfg = BakeConfig {
        program: &program,
        context,
        trace_path: None,
    };
    Ok(bake(&cfg, input).await)
}

/// Execute a program over an input dish.
///
/// Returns `None` if the run was cancelled; otherwise exactly one
/// [`RunResult`] wrapped in a [`Bake`] report.
pub async fn bake(cfg: &BakeConfig<'_>, input: Dish) -> Option<Bake> {
    let start = Instant::now();
    let program = cfg.program;

    let mut ctx = cfg.context.clone();
    if program.policy.strict_utf8 {
        ctx.decoding.strict = true;
    }

    let mut interp = Interpreter {
        program,
        ctx,
        run_id: eventlog::generate_run_id(),
        trace_path: cfg.trace_path,
        pc: 0,
        dish: input,
        registers: Vec::new(),
        frames: Vec::new(),
        jumps: 0,
        steps_executed: 0,
    };

    tracing::info!(
        run_id = %interp.run_id,
        recipe = %program.name,
        steps = program.len(),
        recipe_hash = hasher::short(&program.recipe_hash),
        input_type = %interp.dish.dish_type(),
        "bake started"
    );
    interp.record(|run_id, dish| RunEvent::RunStarted {
        run_id,
        recipe: program.name.clone(),
        steps: program.len(),
        recipe_hash: program.recipe_hash.clone(),
        input_type: dish.dish_type(),
        input_hash: hasher::hash_dish(dish),
        galley_version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let (halt, result) = match interp.run().await {
        Stop::Cancelled => {
            tracing::info!(run_id = %interp.run_id, "bake cancelled");
            return None;
        }
        Stop::Halted(halt, result) => (halt, result),
    };

    let duration = start.elapsed();
    tracing::info!(
        run_id = %interp.run_id,
        halt = %halt,
        steps = interp.steps_executed,
        jumps = interp.jumps,
        seconds = duration.as_secs_f64(),
        "bake finished"
    );
    let (steps_executed, jumps) = (interp.steps_executed, interp.jumps);
    interp.record(|run_id, _| RunEvent::RunCompleted {
        run_id,
        halt,
        steps_executed,
        jumps,
        total_seconds: duration.as_secs_f64(),
    });

    Some(Bake {
        run_id: interp.run_id,
        result,
        halt,
        steps_executed,
        jumps,
        duration,
    })
}

impl<'a> Interpreter<'a> {
    async fn run(&mut self) -> Stop {
        let program = self.program;

        if let Some(input_type) = program.input_type {
            if let Err(e) = self.dish.convert(input_type, self.ctx.decoding) {
                return Stop::Halted(
                    HaltReason::Error,
                    RunResult::Error {
                        display_message: format!("input: {}", e),
                    },
                );
            }
        }

        loop {
            if self.ctx.is_cancelled() {
                return Stop::Cancelled;
            }

            if self.pc >= self.region_end() {
                if self.frames.is_empty() {
                    return Stop::Halted(HaltReason::Completed, RunResult::Value(self.take_value()));
                }
                self.finish_branch();
                continue;
            }

            let Some(step) = program.step(self.pc) else {
                return Stop::Halted(HaltReason::Completed, RunResult::Value(self.take_value()));
            };
            if step.disabled {
                tracing::trace!(step = step.index + 1, op = %step.op, "skipping disabled step");
                self.pc += 1;
                continue;
            }

            self.steps_executed += 1;
            let started = Instant::now();
            let outcome = self.dispatch(step).await;

            if self.ctx.is_cancelled() {
                return Stop::Cancelled;
            }

            match outcome {
                Ok(next) => {
                    tracing::debug!(
                        step = step.index + 1,
                        op = %step.op,
                        dish = %self.dish.dish_type(),
                        registers = self.registers.len(),
                        "step completed"
                    );
                    self.record_step(step, started);
                    match next {
                        Next::Advance => self.pc += 1,
                        Next::Goto(target) => self.pc = target,
                        Next::Return if self.frames.is_empty() => {
                            return Stop::Halted(HaltReason::Returned, RunResult::Value(self.take_value()));
                        }
                        Next::Return => self.pc = self.region_end(),
                    }
                }
                Err(err) => {
                    let message = format!("{} (step {}): {}", step.op, step.index + 1, err);
                    if let Some(depth) = self.absorbing_frame(&err) {
                        tracing::warn!(step = step.index + 1, op = %step.op, error = %err, "fork branch failed, continuing");
                        self.record_failure(step, &message, true);
                        self.frames.truncate(depth + 1);
                        self.dish = Dish::from_string(message);
                        self.pc = self.region_end();
                        continue;
                    }
                    tracing::debug!(step = step.index + 1, op = %step.op, error = %err, "step failed");
                    self.record_failure(step, &message, false);
                    return Stop::Halted(
                        HaltReason::Error,
                        RunResult::Error {
                            display_message: message,
                        },
                    );
                }
            }
        }
    }

    /// First step index past the current branch region.
    fn region_end(&self) -> usize {
        self.frames.last().map_or(self.program.len(), |f| f.end)
    }

    fn take_value(&mut self) -> DishValue {
        std::mem::replace(&mut self.dish, Dish::from_string("")).into_value()
    }

    /// Innermost fork that swallows `err` for its branch, if any.
    fn absorbing_frame(&self, err: &StepError) -> Option<usize> {
        if !err.is_recoverable() {
            return None;
        }
        self.frames.iter().rposition(|f| f.ignore_errors)
    }

    /// Close the running branch: start the next one or merge the fork.
    fn finish_branch(&mut self) {
        let output = branch_output(&self.dish);
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        frame.outputs.push(output);

        if let Some(piece) = frame.pending.pop_front() {
            self.pc = frame.fork + 1;
            self.dish = Dish::from_string(piece);
            self.registers = frame.snapshot.clone();
            return;
        }

        if let Some(frame) = self.frames.pop() {
            tracing::debug!(fork = frame.fork + 1, branches = frame.outputs.len(), "merging fork");
            self.dish = Dish::from_string(frame.outputs.join(&frame.join));
            self.registers = frame.snapshot;
            self.pc = self.after(frame.end);
        }
    }

    /// Step index following a region end (skips the Merge itself).
    fn after(&self, end: usize) -> usize {
        if end < self.program.len() {
            end + 1
        } else {
            end
        }
    }

    async fn dispatch(&mut self, step: &ResolvedStep) -> Result<Next, StepError> {
        let args = Args::new(resolver::resolve_args(&step.args, &self.registers));
        match &step.contract.action {
            Action::Flow(control) => self.flow_control(step, *control, &args),
            Action::Transform(op) => {
                let contract = &step.contract;
                if !contract.is_available_on(self.ctx.host) {
                    return Err(OperationError::Excluded {
                        op: contract.name.clone(),
                        host: self.ctx.host,
                    }
                    .into());
                }
                let input = self.dish.get_with(contract.input_type, self.ctx.decoding)?;
                let output = op.run(input, &args, &self.ctx).await?;
                self.dish.set(contract.output_type, output)?;
                Ok(Next::Advance)
            }
        }
    }

    fn flow_control(&mut self, step: &ResolvedStep, control: FlowControl, args: &Args) -> Result<Next, StepError> {
        match control {
            FlowControl::Label => Ok(Next::Advance),
            FlowControl::Merge => Ok(Next::Advance),
            FlowControl::Return => Ok(Next::Return),
            FlowControl::Fork => self.fork(step, args),
            FlowControl::Register => {
                let text = self.dish.get_string_with(self.ctx.decoding)?;
                let re = flow::register_regex(
                    args.string(0)?,
                    args.boolean(1)?,
                    args.boolean(2)?,
                    args.boolean(3)?,
                )
                .map_err(OperationError::new)?;
                let captured = flow::capture_groups(&re, &text, args.boolean(4)?);
                tracing::trace!(step = step.index + 1, captured = captured.len(), "registers captured");
                self.registers.extend(captured);
                Ok(Next::Advance)
            }
            FlowControl::Jump => self.jump(step, args.string(0)?, args.number(1)?),
            FlowControl::ConditionalJump => {
                let text = self.dish.get_string_with(self.ctx.decoding)?;
                let taken = flow::jump_condition(args.string(0)?, &text, args.boolean(1)?)
                    .map_err(OperationError::new)?;
                if taken {
                    self.jump(step, args.string(2)?, args.number(3)?)
                } else {
                    Ok(Next::Advance)
                }
            }
        }
    }

    fn fork(&mut self, step: &ResolvedStep, args: &Args) -> Result<Next, StepError> {
        let text = self.dish.get_string_with(self.ctx.decoding)?;
        let split = flow::unescape(args.string(0)?);
        let join = flow::unescape(args.string(1)?);
        let ignore_errors = args.boolean(2)?;
        let end = self.program.fork_end(step.index);

        let mut pending: VecDeque<String> = flow::split_pieces(&text, &split).into();
        tracing::debug!(step = step.index + 1, branches = pending.len(), "forking");

        let Some(first) = pending.pop_front() else {
            self.dish = Dish::from_string("");
            return Ok(Next::Goto(self.after(end)));
        };

        self.frames.push(ForkFrame {
            fork: step.index,
            end,
            join,
            ignore_errors,
            pending,
            outputs: Vec::new(),
            snapshot: self.registers.clone(),
        });
        self.dish = Dish::from_string(first);
        Ok(Next::Advance)
    }

    fn jump(&mut self, step: &ResolvedStep, label: &str, max_jumps: f64) -> Result<Next, StepError> {
        let target = match self.program.jump_target(step.index, label) {
            JumpTarget::Step(target) => target,
            JumpTarget::RegionEnd => self.region_end(),
            JumpTarget::Invalid => {
                tracing::warn!(step = step.index + 1, label, "jump target not reachable, ignoring");
                return Ok(Next::Advance);
            }
        };

        let max = max_jumps.max(0.0) as u32;
        if self.jumps >= max {
            return Err(InterpreterConfigError::JumpLimitExceeded {
                step: step.index,
                max,
            }
            .into());
        }
        self.jumps += 1;
        tracing::trace!(step = step.index + 1, target = target + 1, jumps = self.jumps, "jumping");
        Ok(Next::Goto(target))
    }

    // ------------------------------------------------------------------------
    // Trace
    // ------------------------------------------------------------------------

    fn record(&self, build: impl FnOnce(String, &Dish) -> RunEvent) {
        if let Some(path) = self.trace_path {
            let event = build(self.run_id.clone(), &self.dish);
            if let Err(e) = eventlog::append_event(path, event) {
                tracing::warn!(error = %e, "cannot write run trace");
            }
        }
    }

    fn record_step(&self, step: &ResolvedStep, started: Instant) {
        self.record(|run_id, dish| RunEvent::StepCompleted {
            run_id,
            step: step.index + 1,
            op: step.op.clone(),
            output_type: dish.dish_type(),
            duration_seconds: started.elapsed().as_secs_f64(),
            hash: hasher::hash_dish(dish),
        });
    }

    fn record_failure(&self, step: &ResolvedStep, message: &str, recovered: bool) {
        self.record(|run_id, _| RunEvent::StepFailed {
            run_id,
            step: step.index + 1,
            op: step.op.clone(),
            error: message.to_string(),
            recovered,
        });
    }
}

/// A finished branch's contribution to the merge.
fn branch_output(dish: &Dish) -> String {
    dish.get_string_with(Decoding::default())
        .unwrap_or_else(|_| dish.to_display_string())
}
