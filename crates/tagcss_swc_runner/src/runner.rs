use std::string::FromUtf8Error;
use swc_core::common::input::StringInput;
use swc_core::common::sync::Lrc;
use swc_core::common::{FileName, Globals, Mark, SourceMap, GLOBALS};
use swc_core::ecma::ast::Module;
use swc_core::ecma::codegen::text_writer::JsWriter;
use swc_core::ecma::parser::lexer::Lexer;
use swc_core::ecma::parser::{EsSyntax, Parser, Syntax, TsSyntax};
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

pub struct RunContext {
  /// Source-map in use
  pub source_map: Lrc<SourceMap>,
  /// Global mark from SWC resolver
  pub global_mark: Mark,
  /// Unresolved mark from SWC resolver
  pub unresolved_mark: Mark,
}

/// Output of [`run_visit`]: the emitted code and the visitor, with whatever it collected.
pub struct RunVisitResult<V> {
  pub output_code: String,
  pub visitor: V,
  pub source_map: Vec<u8>,
}

/// Output of [`run_transform`]: the emitted code and whatever the transform returned.
pub struct RunTransformResult<R> {
  pub output_code: String,
  pub result: R,
  pub source_map: Vec<u8>,
}

/// How a source text should be parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
  pub filename: Option<String>,
  pub typescript: bool,
  pub jsx: bool,
}

impl RunOptions {
  /// Picks the syntax from the file extension: `.ts`/`.tsx`/`.mts`/`.cts` parse as
  /// TypeScript, everything else as JavaScript with JSX enabled.
  pub fn for_filename(filename: &str) -> Self {
    let extension = filename.rsplit('.').next().unwrap_or_default();
    let typescript = matches!(extension, "ts" | "tsx" | "mts" | "cts");
    let jsx = extension != "ts" && extension != "mts" && extension != "cts";

    RunOptions {
      filename: Some(filename.to_string()),
      typescript,
      jsx,
    }
  }

  fn syntax(&self) -> Syntax {
    if self.typescript {
      Syntax::Typescript(TsSyntax {
        tsx: self.jsx,
        ..Default::default()
      })
    } else {
      Syntax::Es(EsSyntax {
        jsx: self.jsx,
        ..Default::default()
      })
    }
  }
}

/// Parses `code` as JavaScript, runs the visitor built by `make_visit` over it and prints
/// the result.
pub fn run_visit<V: VisitMut>(
  code: &str,
  make_visit: impl FnOnce(RunContext) -> V,
) -> Result<RunVisitResult<V>, RunWithTransformationError> {
  let RunTransformResult {
    output_code,
    result,
    source_map,
  } = run_transform(code, &RunOptions::default(), |context, module| {
    let mut visit = make_visit(context);
    module.visit_mut_with(&mut visit);
    visit
  })?;

  Ok(RunVisitResult {
    output_code,
    visitor: result,
    source_map,
  })
}

/// Parse `code` according to `options`, hand the resolved module to `transform` and emit the
/// (possibly rewritten) module afterwards.
///
/// This is the entry point used by the shaker and the evaluator: the transform gets full
/// mutable access to the module and can return any analysis result it produced.
pub fn run_transform<R>(
  code: &str,
  options: &RunOptions,
  transform: impl FnOnce(RunContext, &mut Module) -> R,
) -> Result<RunTransformResult<R>, RunWithTransformationError> {
  let (output_code, result, source_map) = run_with_transformation(code, options, transform)?;
  Ok(RunTransformResult {
    output_code,
    result,
    source_map,
  })
}

#[derive(Debug, thiserror::Error)]
pub enum RunWithTransformationError {
  #[error("Failed to parse module {filename}: {message}")]
  SwcParse {
    filename: String,
    message: String,
    error: swc_core::ecma::parser::error::Error,
  },
  #[error("IO Error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid utf-8 output: {0}")]
  InvalidUtf8Output(#[from] FromUtf8Error),
  #[error("Failed to generate source map")]
  SourceMap(#[from] sourcemap::Error),
}

type RunWithTransformationOutput<R> = (String, R, Vec<u8>);

/// Parses, runs the resolver, calls `transform` and prints the module.
fn run_with_transformation<R>(
  code: &str,
  options: &RunOptions,
  transform: impl FnOnce(RunContext, &mut Module) -> R,
) -> Result<RunWithTransformationOutput<R>, RunWithTransformationError> {
  let source_map = Lrc::new(SourceMap::default());
  let file_name = match &options.filename {
    Some(filename) => Lrc::new(FileName::Custom(filename.clone())),
    None => Lrc::new(FileName::Anon),
  };
  let source_file = source_map.new_source_file(file_name, code.into());

  let lexer = Lexer::new(
    options.syntax(),
    Default::default(),
    StringInput::from(&*source_file),
    None,
  );

  let mut parser = Parser::new_from(lexer);
  let mut module = parser
    .parse_module()
    .map_err(|error| RunWithTransformationError::SwcParse {
      filename: options.filename.clone().unwrap_or_else(|| "<anonymous>".into()),
      message: format!("{:?}", error.kind()),
      error,
    })?;

  GLOBALS.set(
    &Globals::new(),
    || -> Result<RunWithTransformationOutput<R>, RunWithTransformationError> {
      let global_mark = Mark::new();
      let unresolved_mark = Mark::new();
      module.visit_mut_with(&mut resolver(
        unresolved_mark,
        global_mark,
        options.typescript,
      ));

      let context = RunContext {
        source_map: source_map.clone(),
        global_mark,
        unresolved_mark,
      };
      let result = transform(context, &mut module);

      let (output_code, output_map_buffer) = emit_module(&source_map, &module)?;
      Ok((output_code, result, output_map_buffer))
    },
  )
}

/// Print `module` back to source, returning the code and its serialized source-map.
fn emit_module(
  source_map: &Lrc<SourceMap>,
  module: &Module,
) -> Result<(String, Vec<u8>), RunWithTransformationError> {
  let mut line_pos_buffer = vec![];
  let mut output_buffer = vec![];
  let writer = JsWriter::new(
    source_map.clone(),
    "\n",
    &mut output_buffer,
    Some(&mut line_pos_buffer),
  );
  let mut emitter = swc_core::ecma::codegen::Emitter {
    cfg: Default::default(),
    cm: source_map.clone(),
    comments: None,
    wr: writer,
  };
  emitter.emit_module(module)?;
  let output_code = String::from_utf8(output_buffer)?;
  let built_map = source_map.build_source_map(&line_pos_buffer);
  let mut output_map_buffer = vec![];
  built_map.to_writer(&mut output_map_buffer)?;

  Ok((output_code, output_map_buffer))
}

#[cfg(test)]
mod tests {
  use swc_core::ecma::ast::{Lit, Str};
  use swc_core::ecma::visit::VisitMut;

  use super::*;

  #[test]
  fn test_visit_rewrites_the_module() {
    struct Visitor;
    impl VisitMut for Visitor {
      fn visit_mut_lit(&mut self, n: &mut Lit) {
        *n = Lit::Str(Str::from("replacement"));
      }
    }

    let code = r#"console.log('test!')"#;
    let RunVisitResult { output_code, .. } = run_visit(code, |_: RunContext| Visitor).unwrap();
    assert_eq!(
      output_code,
      r#"console.log("replacement");
"#
    );
  }

  #[test]
  fn test_transform_returns_result() {
    let code = r#"const a = 1; const b = 2;"#;
    let RunTransformResult {
      output_code,
      result,
      ..
    } = run_transform(code, &RunOptions::default(), |_, module| {
      module.body.truncate(1);
      module.body.len()
    })
    .unwrap();

    assert_eq!(result, 1);
    assert_eq!(output_code, "const a = 1;\n");
  }

  #[test]
  fn test_parses_typescript_by_extension() {
    let code = r#"const a: number = 1;"#;
    let options = RunOptions::for_filename("styles.ts");
    assert!(options.typescript);
    assert!(!options.jsx);

    let result = run_transform(code, &options, |_, module| module.body.len()).unwrap();
    assert_eq!(result.result, 1);
  }

  #[test]
  fn test_reports_parse_errors_with_filename() {
    let error = run_transform(
      "const = ;",
      &RunOptions::for_filename("broken.js"),
      |_, _| (),
    )
    .err()
    .unwrap();

    assert!(error.to_string().contains("broken.js"));
  }
}
