//! Asynchronous utility operations.

use super::{ArgSpec, Args, Contract, Operation, RunContext};
use crate::core::errors::OperationError;
use crate::core::types::{DishType, DishValue};
use async_trait::async_trait;
use std::time::Duration;

pub fn contracts() -> Vec<Contract> {
    vec![Contract::transform("Sleep", DishType::ArrayBuffer, DishType::ArrayBuffer, Sleep)
        .describe("Pause the recipe, passing the input through unchanged")
        .arg(ArgSpec::number("Time (ms)", 1000.0).min(0.0))]
}

/// Waits, then returns its input. Wakes early when the run is cancelled.
struct Sleep;

#[async_trait]
impl Operation for Sleep {
    async fn run(
        &self,
        input: DishValue,
        args: &Args,
        ctx: &RunContext,
    ) -> Result<DishValue, OperationError> {
        let millis = u64::try_from(args.integer(0)?)
            .map_err(|_| OperationError::invalid_argument(0, "time must not be negative"))?;
        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(OperationError::new("cancelled")),
            _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::ArgValue;
    use std::time::Instant;

    #[tokio::test]
    async fn test_gl018_sleep_passes_input_through() {
        let out = Sleep
            .run(
                DishValue::ArrayBuffer(vec![1]),
                &Args::new(vec![ArgValue::Number(5.0)]),
                &RunContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, DishValue::ArrayBuffer(vec![1]));
    }

    #[tokio::test]
    async fn test_gl018_sleep_wakes_on_cancel() {
        let ctx = RunContext::default();
        let token = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let started = Instant::now();
        let err = Sleep
            .run(
                DishValue::ArrayBuffer(vec![]),
                &Args::new(vec![ArgValue::Number(60_000.0)]),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "cancelled");
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
