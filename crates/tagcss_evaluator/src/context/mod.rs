use serde::Deserialize;
use serde::Serialize;

pub mod quickjs;

pub use quickjs::QuickJsContext;

/// A module the context should run, registered under `key`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
  pub key: String,
  pub filename: String,
  pub dirname: String,
  pub code: String,
}

/// Answer of the host to a `require` call made by sandboxed code.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RequireOutcome {
  /// `require` returns `null`.
  Empty,
  /// The module is already registered, possibly still running.
  Cached { key: String },
  Load(LoadRequest),
  /// `require` throws. `code` lets the host recover the typed error later.
  Error { message: String, code: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResolveOutcome {
  Resolved { filename: String },
  Error { message: String, code: String },
}

/// Module loading on the Rust side of the sandbox.
pub trait ModuleHost {
  fn require(&mut self, parent_key: &str, id: &str) -> RequireOutcome;
  fn resolve(&mut self, parent_key: &str, id: &str) -> ResolveOutcome;
  /// The module registered under `key` finished running.
  fn loaded(&mut self, key: &str);
  /// The module registered under `key` threw and was unregistered.
  fn failed(&mut self, key: &str);
}

/// The fixed global surface every sandboxed module sees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxSettings {
  /// `process.env.NODE_ENV`
  pub node_env: String,
  /// `process.cwd()`
  pub cwd: String,
  /// Heap limit in bytes
  pub memory_limit: Option<usize>,
}

impl Default for SandboxSettings {
  fn default() -> Self {
    SandboxSettings {
      node_env: "production".into(),
      cwd: "/".into(),
      memory_limit: None,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextError {
  /// Sandboxed code threw.
  Thrown {
    message: String,
    stack: Option<String>,
    code: Option<String>,
    filename: Option<String>,
  },
  /// A value that was read is a promise.
  Async { name: String },
  Engine(String),
}

/// An isolated JavaScript realm that runs CommonJS modules.
///
/// Values only cross the boundary as JSON: functions are dropped and
/// getters are read.
pub trait ExecutionContext {
  fn run(&mut self, module: &LoadRequest) -> Result<(), ContextError>;
  /// `require(id)` on behalf of the module registered as `parent_key`.
  fn require(&mut self, parent_key: &str, id: &str) -> Result<serde_json::Value, ContextError>;
  /// `module.exports` of the module registered as `key`.
  fn exports(&mut self, key: &str) -> Result<serde_json::Value, ContextError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_outcomes_serialize_with_a_kind_tag() {
    let outcome = RequireOutcome::Load(LoadRequest {
      key: "/a.js:*".into(),
      filename: "/a.js".into(),
      dirname: "/".into(),
      code: "".into(),
    });

    assert_eq!(
      serde_json::to_value(&outcome).unwrap(),
      serde_json::json!({
        "kind": "load",
        "key": "/a.js:*",
        "filename": "/a.js",
        "dirname": "/",
        "code": "",
      })
    );
    assert_eq!(
      serde_json::to_value(RequireOutcome::Empty).unwrap(),
      serde_json::json!({ "kind": "empty" })
    );
  }
}
