//! Galley — recipe execution engine.
//!
//! A typed value container that converts between representations on demand,
//! a registry of operations with declared input/output types, and an
//! interpreter that runs recipes with Fork/Merge, registers, labels and jumps.

pub mod cli;
pub mod core;
pub mod operations;
pub mod trace;

pub use crate::core::dish::Dish;
pub use crate::core::executor::{bake, bake_recipe, BakeConfig};
pub use crate::core::parser::parse_recipe;
pub use crate::core::resolver::{resolve, Program};
pub use crate::core::types::{Bake, DishType, DishValue, RunResult};
pub use crate::operations::{Contract, Operation, Registry, RunContext};
