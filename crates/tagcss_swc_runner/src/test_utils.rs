use swc_core::ecma::ast::Module;
use swc_core::ecma::visit::VisitMut;

use crate::runner::{run_transform, run_visit};
pub use crate::runner::{RunContext, RunOptions, RunTransformResult, RunVisitResult};

/// Helper to test SWC visitors.
///
/// * Parse `code` with SWC
/// * Run a visitor over it
/// * Return the result
///
pub fn run_test_visit<V: VisitMut>(
  code: &str,
  make_visit: impl FnOnce(RunContext) -> V,
) -> RunVisitResult<V> {
  run_visit(code, make_visit).unwrap()
}

/// Helper to test whole-module transformations such as shaking.
pub fn run_test_module<R>(
  code: &str,
  transform: impl FnOnce(RunContext, &mut Module) -> R,
) -> RunTransformResult<R> {
  run_transform(code, &RunOptions::default(), transform).unwrap()
}

/// Same as `run_test_module`, parsing with the syntax implied by `filename`.
pub fn run_test_module_as<R>(
  filename: &str,
  code: &str,
  transform: impl FnOnce(RunContext, &mut Module) -> R,
) -> RunTransformResult<R> {
  run_transform(code, &RunOptions::for_filename(filename), transform).unwrap()
}
