use std::cell::RefCell;
use std::rc::Rc;

use rquickjs::Context;
use rquickjs::Ctx;
use rquickjs::Function;
use rquickjs::Object;
use rquickjs::Persistent;
use rquickjs::Runtime;
use serde::Deserialize;
use serde::Serialize;

use super::ContextError;
use super::ExecutionContext;
use super::LoadRequest;
use super::ModuleHost;
use super::SandboxSettings;

const BOOTSTRAP: &str = include_str!("bootstrap.js");

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum Completion {
  Ok {
    #[serde(default)]
    value: serde_json::Value,
  },
  Async {
    name: String,
  },
  Thrown {
    message: String,
    stack: Option<String>,
    code: Option<String>,
    filename: Option<String>,
  },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapSettings<'a> {
  node_env: &'a str,
  cwd: &'a str,
}

impl From<rquickjs::Error> for ContextError {
  fn from(error: rquickjs::Error) -> Self {
    ContextError::Engine(error.to_string())
  }
}

fn to_json<T: Serialize>(value: &T) -> String {
  serde_json::to_string(value)
    .unwrap_or_else(|error| serde_json::Value::String(error.to_string()).to_string())
}

fn forward_log(level: &str, message: &str) {
  match level {
    "error" => tracing::error!(target: "tagcss_evaluator::sandbox", "{message}"),
    "warn" => tracing::warn!(target: "tagcss_evaluator::sandbox", "{message}"),
    "debug" => tracing::debug!(target: "tagcss_evaluator::sandbox", "{message}"),
    "trace" => tracing::trace!(target: "tagcss_evaluator::sandbox", "{message}"),
    _ => tracing::info!(target: "tagcss_evaluator::sandbox", "{message}"),
  }
}

/// [`ExecutionContext`] backed by a QuickJS runtime.
///
/// Each instance owns its runtime, so nothing leaks between sandboxes. The loader entry
/// points are only held here, never on the sandbox's global object.
pub struct QuickJsContext {
  sandbox: Persistent<Object<'static>>,
  context: Context,
  _runtime: Runtime,
}

impl QuickJsContext {
  pub fn new(
    host: Rc<RefCell<dyn ModuleHost>>,
    settings: &SandboxSettings,
  ) -> Result<Self, ContextError> {
    let runtime = Runtime::new()?;
    if let Some(limit) = settings.memory_limit {
      runtime.set_memory_limit(limit);
    }
    let context = Context::full(&runtime)?;

    let settings_json = to_json(&BootstrapSettings {
      node_env: &settings.node_env,
      cwd: &settings.cwd,
    });
    let sandbox = context.with(|ctx| install(&ctx, host, settings_json))?;

    Ok(QuickJsContext {
      sandbox,
      context,
      _runtime: runtime,
    })
  }

  fn call_sandbox(&self, method: &str, args: Vec<String>) -> Result<Completion, ContextError> {
    let completion = self.context.with(|ctx| -> rquickjs::Result<String> {
      let sandbox = self.sandbox.clone().restore(&ctx)?;
      let function: Function = sandbox.get(method)?;
      match args.as_slice() {
        [one] => function.call((one.as_str(),)),
        [first, second] => function.call((first.as_str(), second.as_str())),
        _ => function.call(()),
      }
    })?;

    serde_json::from_str(&completion)
      .map_err(|error| ContextError::Engine(format!("Invalid sandbox completion: {error}")))
  }
}

fn install(
  ctx: &Ctx<'_>,
  host: Rc<RefCell<dyn ModuleHost>>,
  settings_json: String,
) -> rquickjs::Result<Persistent<Object<'static>>> {
  let bridge = Object::new(ctx.clone())?;

  let require_host = host.clone();
  bridge.set(
    "require",
    Function::new(ctx.clone(), move |parent: String, id: String| -> String {
      let outcome = require_host.borrow_mut().require(&parent, &id);
      to_json(&outcome)
    })?,
  )?;

  let resolve_host = host.clone();
  bridge.set(
    "resolve",
    Function::new(ctx.clone(), move |parent: String, id: String| -> String {
      let outcome = resolve_host.borrow_mut().resolve(&parent, &id);
      to_json(&outcome)
    })?,
  )?;

  let loaded_host = host.clone();
  bridge.set(
    "loaded",
    Function::new(ctx.clone(), move |key: String| {
      loaded_host.borrow_mut().loaded(&key);
    })?,
  )?;

  bridge.set(
    "failed",
    Function::new(ctx.clone(), move |key: String| {
      host.borrow_mut().failed(&key);
    })?,
  )?;

  bridge.set(
    "log",
    Function::new(ctx.clone(), |level: String, message: String| {
      forward_log(&level, &message);
    })?,
  )?;

  let init: Function = ctx.eval(BOOTSTRAP)?;
  let sandbox: Object = init.call((ctx.globals(), bridge, settings_json))?;
  Ok(Persistent::save(ctx, sandbox))
}

fn into_value(completion: Completion) -> Result<serde_json::Value, ContextError> {
  match completion {
    Completion::Ok { value } => Ok(value),
    Completion::Async { name } => Err(ContextError::Async { name }),
    Completion::Thrown {
      message,
      stack,
      code,
      filename,
    } => Err(ContextError::Thrown {
      message,
      stack,
      code,
      filename,
    }),
  }
}

impl ExecutionContext for QuickJsContext {
  fn run(&mut self, module: &LoadRequest) -> Result<(), ContextError> {
    let completion = self.call_sandbox("run", vec![to_json(module)])?;
    into_value(completion).map(|_| ())
  }

  fn require(&mut self, parent_key: &str, id: &str) -> Result<serde_json::Value, ContextError> {
    let completion = self.call_sandbox("require", vec![parent_key.to_string(), id.to_string()])?;
    into_value(completion)
  }

  fn exports(&mut self, key: &str) -> Result<serde_json::Value, ContextError> {
    let completion = self.call_sandbox("exports", vec![key.to_string()])?;
    into_value(completion)
  }
}
