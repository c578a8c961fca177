//! Engine core — dishes, recipes, resolution, flow control, execution.

pub mod dish;
pub mod errors;
pub mod executor;
pub mod flow;
pub mod parser;
pub mod recipe;
pub mod resolver;
pub mod types;
