use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
  #[error("Cannot find module '{specifier}' from '{}'", from.display())]
  NotFound { specifier: String, from: PathBuf },
  #[error("Invalid package.json at '{}': {message}", path.display())]
  InvalidPackageJson { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to parse evaluator config: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Invalid rule test /{pattern}/: {source}")]
  InvalidTest {
    pattern: String,
    #[source]
    source: regex::Error,
  },
  #[error("No evaluator is registered as '{0}'")]
  UnknownEvaluator(String),
}

/// Everything that can go wrong while evaluating a module in the sandbox.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
  #[error("Unable to import \"{id}\". Importing Node builtins is not supported in the sandbox.")]
  UnsupportedBuiltin { id: String },
  /// The evaluated code threw.
  #[error("{message}\n    in {filename}")]
  Evaluation {
    message: String,
    stack: Option<String>,
    filename: String,
  },
  #[error(transparent)]
  Resolve(#[from] ResolveError),
  #[error("Failed to read '{filename}': {message}")]
  Io { filename: String, message: String },
  #[error("Failed to prepare '{filename}' for evaluation: {message}")]
  Transform { filename: String, message: String },
  /// An export resolved to a promise or another thenable.
  #[error("'{name}' exported by {filename} is asynchronous, only synchronous values can be evaluated")]
  AsyncValue { name: String, filename: String },
  #[error("Sandbox engine failure: {0}")]
  Engine(String),
}

impl From<rquickjs::Error> for EvalError {
  fn from(error: rquickjs::Error) -> Self {
    EvalError::Engine(error.to_string())
  }
}
