//! Thin helpers around `swc_core` used by the shaker, the evaluator and their tests.

pub mod runner;
pub mod test_utils;

pub use runner::{
  run_transform, run_visit, RunContext, RunOptions, RunTransformResult, RunVisitResult,
  RunWithTransformationError,
};
