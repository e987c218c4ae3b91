use std::collections::BTreeMap;

use swc_core::common::util::take::Take;
use swc_core::ecma::ast::Module;
use swc_core::ecma::ast::ModuleItem;
use swc_core::ecma::ast::Pass;
use swc_core::ecma::ast::Program;
use swc_core::ecma::transforms::typescript::strip;
use tagcss_swc_runner::run_transform;
use tagcss_swc_runner::RunOptions;
use tagcss_swc_runner::RunWithTransformationError;
use thiserror::Error;

use crate::esm_to_cjs::esm_to_cjs;
use crate::shaker::shake;
use crate::shaker::ShakerOptions;
use crate::utils::Warning;

#[derive(Debug, Error)]
pub enum ShakerError {
  #[error(transparent)]
  Transform(#[from] RunWithTransformationError),
}

#[derive(Clone, Debug, Default)]
pub struct PrepareOptions {
  pub keep_side_effects: bool,
}

/// Sandbox ready code for one module, together with what it still imports.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreparedModule {
  pub code: String,
  /// Import source to the names the retained code reads from it.
  pub imports: BTreeMap<String, Vec<String>>,
  /// Whether the code calls into `__helpers`.
  pub needs_helpers: bool,
  pub warnings: Vec<Warning>,
}

/// Parses `source`, shakes it down to `only` and lowers the result to
/// CommonJS without TypeScript syntax.
///
/// `None`, an empty list or a `*` entry keep the whole module.
pub fn prepare_for_sandbox(
  filename: &str,
  source: &str,
  only: Option<&[String]>,
  options: &PrepareOptions,
) -> Result<PreparedModule, ShakerError> {
  let requested: Vec<String> = match only {
    Some(only) if !only.is_empty() => only.to_vec(),
    _ => vec!["*".to_string()],
  };
  let run_options = RunOptions::for_filename(filename);
  let typescript = run_options.typescript;

  let result = run_transform(source, &run_options, |context, module| {
    if typescript {
      strip_types(module, &context);
    }

    let mut shaker_options = ShakerOptions::new(context.unresolved_mark);
    shaker_options.keep_side_effects = options.keep_side_effects;
    let shaken = shake(module, &requested, &shaker_options);
    let needs_helpers = esm_to_cjs(module, context.unresolved_mark);
    (shaken, needs_helpers)
  })?;

  let (shaken, needs_helpers) = result.result;
  tracing::trace!(filename, ?requested, imports = ?shaken.imports, "Prepared module");

  Ok(PreparedModule {
    code: result.output_code,
    imports: shaken.imports,
    needs_helpers,
    warnings: shaken.warnings,
  })
}

fn strip_types(module: &mut Module, context: &tagcss_swc_runner::RunContext) {
  let mut program = Program::Module(module.take());
  strip(context.unresolved_mark, context.global_mark).process(&mut program);
  *module = match program {
    Program::Module(module) => module,
    Program::Script(script) => Module {
      span: script.span,
      shebang: script.shebang,
      body: script.body.into_iter().map(ModuleItem::Stmt).collect(),
    },
  };
}

#[cfg(test)]
mod tests {
  use indoc::indoc;
  use pretty_assertions::assert_eq;

  use super::*;

  fn only(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
  }

  #[test]
  fn test_shakes_and_lowers_esm() {
    let requested = only(&["primary"]);
    let prepared = prepare_for_sandbox(
      "/src/tokens.js",
      indoc! {r#"
        import { base } from './base';
        import { unused } from './unused';
        export const primary = base + '-primary';
        export const secondary = unused;
      "#},
      Some(&requested),
      &PrepareOptions::default(),
    )
    .unwrap();

    assert!(prepared.code.contains(r#"require("./base")"#), "{}", prepared.code);
    assert!(!prepared.code.contains("unused"), "{}", prepared.code);
    assert!(!prepared.code.contains("secondary"), "{}", prepared.code);
    assert!(prepared.needs_helpers);
    assert_eq!(
      prepared.imports,
      BTreeMap::from([("./base".to_string(), vec!["base".to_string()])])
    );
  }

  #[test]
  fn test_strips_typescript() {
    let prepared = prepare_for_sandbox(
      "/src/theme.ts",
      indoc! {r#"
        import type { Theme } from './types';
        interface Palette { color: string }
        export const palette: Palette = { color: 'red' as const };
      "#},
      None,
      &PrepareOptions::default(),
    )
    .unwrap();

    assert!(!prepared.code.contains("interface"), "{}", prepared.code);
    assert!(!prepared.code.contains("./types"), "{}", prepared.code);
    assert!(prepared.code.contains("exports.palette = palette;"), "{}", prepared.code);
    assert!(prepared.imports.is_empty());
  }

  #[test]
  fn test_keeps_everything_for_wildcards() {
    let requested = only(&["*"]);
    let prepared = prepare_for_sandbox(
      "/src/index.js",
      "const a = require('./a');\nconst b = 2;\nmodule.exports = { a };\n",
      Some(&requested),
      &PrepareOptions::default(),
    )
    .unwrap();

    assert!(prepared.code.contains("const b = 2;"));
    assert!(!prepared.needs_helpers);
    assert_eq!(prepared.imports.get("./a"), Some(&vec!["*".to_string()]));
  }

  #[test]
  fn test_reports_parse_errors() {
    let error = prepare_for_sandbox("/src/broken.js", "const = ;", None, &PrepareOptions::default())
      .unwrap_err();

    assert!(error.to_string().contains("/src/broken.js"));
  }
}
