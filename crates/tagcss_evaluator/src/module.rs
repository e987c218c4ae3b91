use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use tagcss_filesystem::FileSystemRef;

use crate::builtins;
use crate::builtins::Builtin;
use crate::cache::CacheKey;
use crate::cache::EvaluationCache;
use crate::context::ContextError;
use crate::context::ExecutionContext;
use crate::context::LoadRequest;
use crate::context::ModuleHost;
use crate::context::QuickJsContext;
use crate::context::RequireOutcome;
use crate::context::ResolveOutcome;
use crate::context::SandboxSettings;
use crate::error::EvalError;
use crate::resolver::ModuleResolverRef;
use crate::resolver::NodeResolver;
use crate::rules::default_rules;
use crate::rules::select_action;
use crate::rules::Action;
use crate::rules::EvaluatorOutput;
use crate::rules::Rule;

/// How a [`Module`] finds, prepares and runs code.
#[derive(Clone)]
pub struct ModuleOptions {
  pub fs: FileSystemRef,
  pub resolver: ModuleResolverRef,
  /// Checked last to first, see [`select_action`].
  pub rules: Vec<Rule>,
  pub node_env: String,
  /// Heap limit of the sandbox in bytes.
  pub memory_limit: Option<usize>,
  /// Prepared code, shared between modules and compilations.
  pub cache: Option<Arc<EvaluationCache<EvaluatorOutput>>>,
}

impl ModuleOptions {
  /// Node resolution over `fs`, the default rules and `NODE_ENV=production`.
  pub fn new(fs: FileSystemRef) -> Self {
    ModuleOptions {
      resolver: Arc::new(NodeResolver::new(fs.clone())),
      fs,
      rules: default_rules(),
      node_env: "production".into(),
      memory_limit: None,
      cache: None,
    }
  }

  pub fn with_cache(mut self, cache: Arc<EvaluationCache<EvaluatorOutput>>) -> Self {
    self.cache = Some(cache);
    self
  }
}

impl std::fmt::Debug for ModuleOptions {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModuleOptions")
      .field("fs", &self.fs)
      .field("resolver", &self.resolver)
      .field("rules", &self.rules)
      .field("node_env", &self.node_env)
      .field("memory_limit", &self.memory_limit)
      .finish()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleState {
  /// Registered, its body has not finished running.
  Pending,
  Evaluated,
}

/// One entry of the module table of a sandbox session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRecord {
  /// The specifier the module was first required with.
  pub id: String,
  pub filename: String,
  pub cache_key: CacheKey,
  /// Specifiers this module required, in order.
  pub dependencies: Vec<String>,
  /// What the prepared code reads from each of its imports.
  pub imports: BTreeMap<String, Vec<String>>,
  pub state: ModuleState,
}

const WILDCARD: &str = "*";

fn requested_names(only: Option<&[String]>) -> Vec<String> {
  match only {
    Some(only) if !only.is_empty() => only.to_vec(),
    _ => vec![WILDCARD.to_string()],
  }
}

fn dirname(filename: &str) -> String {
  Path::new(filename)
    .parent()
    .map(|parent| parent.to_string_lossy().into_owned())
    .unwrap_or_else(|| "/".into())
}

/// The module table and loading logic shared by every module of one sandbox.
struct Session {
  options: ModuleOptions,
  records: IndexMap<String, ModuleRecord>,
  /// Typed errors behind the codes attached to errors thrown into the sandbox.
  host_errors: HashMap<String, EvalError>,
  /// An error that fails the evaluation even when sandboxed code catches it.
  fatal: Option<EvalError>,
}

impl Session {
  fn new(options: ModuleOptions) -> Self {
    Session {
      options,
      records: IndexMap::new(),
      host_errors: HashMap::new(),
      fatal: None,
    }
  }

  fn host_error(&mut self, error: EvalError) -> (String, String) {
    let code = format!("TAGCSS_HOST_ERROR_{}", self.host_errors.len());
    let message = error.to_string();
    tracing::debug!(%code, %message, "Sandbox require failed");
    if matches!(error, EvalError::UnsupportedBuiltin { .. }) && self.fatal.is_none() {
      self.fatal = Some(error.clone());
    }
    self.host_errors.insert(code.clone(), error);
    (message, code)
  }

  fn fail(&mut self, error: EvalError) -> RequireOutcome {
    let (message, code) = self.host_error(error);
    RequireOutcome::Error { message, code }
  }

  /// Runs the rule selected for `filename`, through the cache when there is one.
  fn prepare(
    &self,
    filename: &str,
    source: &str,
    only: &[String],
  ) -> Result<EvaluatorOutput, EvalError> {
    let evaluator = match select_action(&self.options.rules, filename) {
      Action::Ignore => {
        return Ok(EvaluatorOutput {
          code: source.to_string(),
          imports: BTreeMap::new(),
        })
      }
      Action::Evaluate(evaluator) => evaluator,
    };

    let key = CacheKey::new(filename, only);
    if let Some(cache) = &self.options.cache {
      if let Some(output) = cache.get(&key, source) {
        return Ok(output);
      }
    }

    let output = evaluator
      .evaluate(filename, source, only)
      .map_err(|error| EvalError::Transform {
        filename: filename.to_string(),
        message: format!("{error:#}"),
      })?;

    if let Some(cache) = &self.options.cache {
      cache.set(key, source, output.clone());
    }
    Ok(output)
  }

  fn register(
    &mut self,
    id: &str,
    filename: &str,
    cache_key: CacheKey,
    output: EvaluatorOutput,
  ) -> LoadRequest {
    let key = cache_key.to_string();
    tracing::debug!(%key, id, "Registering module");
    self.records.insert(
      key.clone(),
      ModuleRecord {
        id: id.to_string(),
        filename: filename.to_string(),
        cache_key,
        dependencies: vec![],
        imports: output.imports,
        state: ModuleState::Pending,
      },
    );

    LoadRequest {
      key,
      filename: filename.to_string(),
      dirname: dirname(filename),
      code: output.code,
    }
  }

  fn parent_dir(&self, parent_key: &str) -> String {
    match self.records.get(parent_key) {
      Some(parent) => dirname(&parent.filename),
      None => self
        .options
        .fs
        .cwd()
        .map(|cwd| cwd.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "/".into()),
    }
  }

  /// The names the parent reads from `id`. Unknown dependencies are needed whole.
  fn only_for(&self, parent_key: &str, id: &str) -> Vec<String> {
    self
      .records
      .get(parent_key)
      .and_then(|parent| parent.imports.get(id))
      .filter(|names| !names.is_empty())
      .cloned()
      .unwrap_or_else(|| vec![WILDCARD.to_string()])
  }

  fn load_polyfill(&mut self, name: &str, code: &str) -> RequireOutcome {
    let filename = format!("builtin:{name}");
    let cache_key = CacheKey::new(filename.clone(), &[WILDCARD.to_string()]);
    let key = cache_key.to_string();
    if self.records.contains_key(&key) {
      return RequireOutcome::Cached { key };
    }

    let output = EvaluatorOutput {
      code: code.to_string(),
      imports: BTreeMap::new(),
    };
    RequireOutcome::Load(self.register(name, &filename, cache_key, output))
  }

  fn load_file(
    &mut self,
    parent_key: &str,
    id: &str,
    only: Vec<String>,
  ) -> Result<RequireOutcome, EvalError> {
    let from_dir = self.parent_dir(parent_key);
    let path = self.options.resolver.resolve(id, Path::new(&from_dir))?;
    let filename = path.to_string_lossy().into_owned();

    let cache_key = CacheKey::new(filename.clone(), &only);
    let key = cache_key.to_string();
    if self.records.contains_key(&key) {
      return Ok(RequireOutcome::Cached { key });
    }

    let source = self
      .options
      .fs
      .read_to_string(&path)
      .map_err(|error| EvalError::Io {
        filename: filename.clone(),
        message: error.to_string(),
      })?;

    let output = if filename.ends_with(".json") {
      EvaluatorOutput {
        code: format!("module.exports = {source};"),
        imports: BTreeMap::new(),
      }
    } else {
      self.prepare(&filename, &source, &cache_key.only)?
    };

    Ok(RequireOutcome::Load(self.register(
      id, &filename, cache_key, output,
    )))
  }

  fn translate(&mut self, error: ContextError, filename: &str) -> EvalError {
    if let Some(fatal) = self.fatal.take() {
      return fatal;
    }

    match error {
      ContextError::Thrown {
        code: Some(code), ..
      } if self.host_errors.contains_key(&code) => self
        .host_errors
        .remove(&code)
        .unwrap_or_else(|| EvalError::Engine(format!("Lost host error {code}"))),
      ContextError::Thrown {
        message,
        stack,
        filename: thrown_in,
        ..
      } => EvalError::Evaluation {
        message,
        stack,
        filename: thrown_in.unwrap_or_else(|| filename.to_string()),
      },
      ContextError::Async { name } => EvalError::AsyncValue {
        name,
        filename: filename.to_string(),
      },
      ContextError::Engine(message) => EvalError::Engine(message),
    }
  }
}

impl ModuleHost for Session {
  fn require(&mut self, parent_key: &str, id: &str) -> RequireOutcome {
    if let Some(parent) = self.records.get_mut(parent_key) {
      parent.dependencies.push(id.to_string());
    }

    let outcome = match builtins::lookup(id) {
      Some((_, Builtin::Empty)) => Ok(RequireOutcome::Empty),
      Some((_, Builtin::Unsupported)) => Err(EvalError::UnsupportedBuiltin { id: id.to_string() }),
      Some((name, Builtin::Polyfill(code))) => Ok(self.load_polyfill(name, code)),
      Some((_, Builtin::Package(package))) => {
        self.load_file(parent_key, package, vec![WILDCARD.to_string()])
      }
      None => {
        let only = self.only_for(parent_key, id);
        self.load_file(parent_key, id, only)
      }
    };

    outcome.unwrap_or_else(|error| self.fail(error))
  }

  fn resolve(&mut self, parent_key: &str, id: &str) -> ResolveOutcome {
    match builtins::lookup(id) {
      Some((_, Builtin::Unsupported)) => {
        let (message, code) = self.host_error(EvalError::UnsupportedBuiltin { id: id.to_string() });
        ResolveOutcome::Error { message, code }
      }
      Some(_) => ResolveOutcome::Resolved {
        filename: id.to_string(),
      },
      None => {
        let from_dir = self.parent_dir(parent_key);
        match self.options.resolver.resolve(id, Path::new(&from_dir)) {
          Ok(path) => ResolveOutcome::Resolved {
            filename: path.to_string_lossy().into_owned(),
          },
          Err(error) => {
            let (message, code) = self.host_error(error.into());
            ResolveOutcome::Error { message, code }
          }
        }
      }
    }
  }

  fn loaded(&mut self, key: &str) {
    if let Some(record) = self.records.get_mut(key) {
      record.state = ModuleState::Evaluated;
    }
  }

  fn failed(&mut self, key: &str) {
    if self.records.shift_remove(key).is_some() {
      tracing::debug!(%key, "Unregistered module after it threw");
    }
  }
}

/// Factory for the execution context of a [`Module`].
pub type ContextFactory =
  dyn FnOnce(Rc<RefCell<dyn ModuleHost>>, &SandboxSettings) -> Result<Box<dyn ExecutionContext>, ContextError>;

/// The entry point of a sandbox session.
///
/// ```ignore
/// let mut module = Module::new("/src/styles.js", ModuleOptions::new(fs))?;
/// module.evaluate(source, Some(&["color".to_string()]))?;
/// let exports = module.exports_object()?;
/// ```
pub struct Module {
  filename: String,
  key: String,
  session: Rc<RefCell<Session>>,
  context: Box<dyn ExecutionContext>,
}

impl Module {
  pub fn new(filename: impl Into<String>, options: ModuleOptions) -> Result<Self, EvalError> {
    Self::with_context(
      filename,
      options,
      Box::new(|host: Rc<RefCell<dyn ModuleHost>>, settings: &SandboxSettings| {
        let context = QuickJsContext::new(host, settings)?;
        Ok(Box::new(context) as Box<dyn ExecutionContext>)
      }),
    )
  }

  /// Same as [`Module::new`] with a custom execution context.
  pub fn with_context(
    filename: impl Into<String>,
    options: ModuleOptions,
    make_context: Box<ContextFactory>,
  ) -> Result<Self, EvalError> {
    let filename = filename.into();
    let settings = SandboxSettings {
      node_env: options.node_env.clone(),
      cwd: options
        .fs
        .cwd()
        .map(|cwd| cwd.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "/".into()),
      memory_limit: options.memory_limit,
    };

    let session = Rc::new(RefCell::new(Session::new(options)));
    let host: Rc<RefCell<dyn ModuleHost>> = session.clone();
    let context = make_context(host, &settings).map_err(|error| match error {
      ContextError::Engine(message) => EvalError::Engine(message),
      other => EvalError::Engine(format!("{other:?}")),
    })?;

    Ok(Module {
      key: CacheKey::new(filename.clone(), &[WILDCARD.to_string()]).to_string(),
      filename,
      session,
      context,
    })
  }

  pub fn filename(&self) -> &str {
    &self.filename
  }

  /// Prepares `source` for the names in `only` and runs it.
  ///
  /// `None`, an empty list or a `*` entry run the whole module.
  pub fn evaluate(&mut self, source: &str, only: Option<&[String]>) -> Result<(), EvalError> {
    let only = requested_names(only);
    tracing::debug!(filename = %self.filename, ?only, "Evaluating module");

    let request = {
      let mut session = self.session.borrow_mut();
      let output = session.prepare(&self.filename, source, &only)?;
      let cache_key = CacheKey::new(self.filename.clone(), &only);
      session.register(&self.filename, &self.filename, cache_key, output)
    };
    self.key = request.key.clone();

    let result = self.context.run(&request);
    self.settle(result)
  }

  /// `require(id)` from the point of view of this module.
  pub fn require(&mut self, id: &str) -> Result<serde_json::Value, EvalError> {
    let result = self.context.require(&self.key, id);
    self.settle(result)
  }

  /// The evaluated `module.exports`, as JSON.
  pub fn exports_object(&mut self) -> Result<serde_json::Value, EvalError> {
    let result = self.context.exports(&self.key);
    self.settle(result)
  }

  /// Snapshot of the module table, in registration order.
  pub fn records(&self) -> Vec<ModuleRecord> {
    self.session.borrow().records.values().cloned().collect()
  }

  fn settle<T>(&mut self, result: Result<T, ContextError>) -> Result<T, EvalError> {
    let mut session = self.session.borrow_mut();
    match result {
      Ok(value) => match session.fatal.take() {
        Some(fatal) => Err(fatal),
        None => Ok(value),
      },
      Err(error) => Err(session.translate(error, &self.filename)),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;
  use std::sync::atomic::AtomicUsize;
  use std::sync::atomic::Ordering;

  use indoc::indoc;
  use pretty_assertions::assert_eq;
  use serde_json::json;
  use tagcss_filesystem::InMemoryFileSystem;

  use super::*;
  use crate::resolver::MockModuleResolver;
  use crate::rules::Evaluator;
  use crate::rules::RuleTest;
  use crate::rules::ShakerEvaluator;

  fn file_system(files: &[(&str, &str)]) -> FileSystemRef {
    let fs = InMemoryFileSystem::default();
    fs.set_current_working_directory(Path::new("/app"));
    for (path, contents) in files {
      fs.write_file(Path::new(path), *contents);
    }
    Arc::new(fs)
  }

  fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
  }

  fn evaluate(files: &[(&str, &str)], source: &str, only: &[&str]) -> Result<Module, EvalError> {
    let mut module = Module::new("/app/src/entry.js", ModuleOptions::new(file_system(files)))?;
    let only = names(only);
    module.evaluate(source, Some(&only))?;
    Ok(module)
  }

  #[test]
  fn test_empty_builtins_are_null() {
    let mut module = evaluate(&[], "exports.fs = require('fs');", &[]).unwrap();

    assert_eq!(module.exports_object().unwrap(), json!({ "fs": null }));
    assert_eq!(module.require("node:fs").unwrap(), serde_json::Value::Null);
  }

  #[test]
  fn test_unsupported_builtins_fail_the_evaluation() {
    let error = evaluate(&[], "require('perf_hooks');", &[]).err().unwrap();

    assert_eq!(
      error.to_string(),
      "Unable to import \"perf_hooks\". Importing Node builtins is not supported in the sandbox."
    );
    assert_eq!(
      error,
      EvalError::UnsupportedBuiltin {
        id: "perf_hooks".into()
      }
    );
  }

  #[test]
  fn test_unsupported_builtins_fail_even_when_caught() {
    let error = evaluate(
      &[],
      "try { require('worker_threads'); } catch (e) {} exports.ok = true;",
      &[],
    )
    .err()
    .unwrap();

    assert!(matches!(error, EvalError::UnsupportedBuiltin { id } if id == "worker_threads"));
  }

  #[test]
  fn test_polyfilled_builtins() {
    let mut module = evaluate(
      &[],
      indoc! {r#"
        const path = require('path');
        const util = require('node:util');
        exports.joined = path.join('/app', 'src', '../theme.js');
        exports.formatted = util.format('%s-%d', 'size', 4);
        exports.dirname = __dirname;
      "#},
      &[],
    )
    .unwrap();

    assert_eq!(
      module.exports_object().unwrap(),
      json!({
        "joined": "/app/theme.js",
        "formatted": "size-4",
        "dirname": "/app/src",
      })
    );
  }

  #[test]
  fn test_events_and_assert_builtins() {
    let mut module = evaluate(
      &[],
      indoc! {r#"
        const EventEmitter = require('events');
        const assert = require('assert');
        const emitter = new EventEmitter();
        const seen = [];
        emitter.on('size', (value) => seen.push(value));
        emitter.once('size', (value) => seen.push(value * 10));
        emitter.emit('size', 1);
        emitter.emit('size', 2);
        assert.deepEqual(seen, [1, 10, 2]);
        assert.throws(() => assert.strictEqual(1, '1'));
        exports.seen = seen;
        exports.listeners = emitter.listenerCount('size');
        exports.trimmed = [typeof emitter.listeners, typeof assert.notEqual, typeof require('util').isString];
      "#},
      &[],
    )
    .unwrap();

    assert_eq!(
      module.exports_object().unwrap(),
      json!({
        "seen": [1, 10, 2],
        "listeners": 1,
        "trimmed": ["undefined", "undefined", "undefined"],
      })
    );
  }

  #[test]
  fn test_dependencies_are_shaken_to_what_is_imported() {
    let mut module = evaluate(
      &[(
        "/app/src/theme.js",
        indoc! {r#"
          export const color = 'red';
          export const broken = (() => { throw new Error('should have been shaken'); })();
        "#},
      )],
      indoc! {r#"
        import { color } from './theme';
        export const value = color + '!';
      "#},
      &["value"],
    )
    .unwrap();

    assert_eq!(module.exports_object().unwrap(), json!({ "value": "red!" }));

    let records = module.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].filename, "/app/src/entry.js");
    assert_eq!(records[0].dependencies, names(&["./theme"]));
    assert_eq!(records[1].cache_key, CacheKey::new("/app/src/theme.js", &names(&["color"])));
    assert!(records
      .iter()
      .all(|record| record.state == ModuleState::Evaluated));
  }

  #[test]
  fn test_cyclic_requires_see_partial_exports() {
    let mut module = evaluate(
      &[
        (
          "/app/src/a.js",
          "exports.early = 'a'; const b = require('./b'); exports.fromB = b.value;",
        ),
        (
          "/app/src/b.js",
          "const a = require('./a'); exports.value = 'b saw ' + a.early + ' ' + a.fromB;",
        ),
      ],
      "module.exports = require('./a');",
      &[],
    )
    .unwrap();

    assert_eq!(
      module.exports_object().unwrap(),
      json!({ "early": "a", "fromB": "b saw a undefined" })
    );
  }

  const COUNTER: (&str, &str) = (
    "/app/src/counter.js",
    "exports.count = 0; exports.inc = function () { exports.count += 1; };",
  );

  const SETUP: (&str, &str) = (
    "/app/src/setup.js",
    "export const theme = {}; export function setup() { theme.color = 'red'; }",
  );

  const COLORS: [(&str, &str); 3] = [
    ("/app/src/a/colors.js", "export const a = 'from-a';"),
    ("/app/src/b/colors.js", "export const b = 'from-b';"),
    ("/app/src/theme.js", "export const x = 'x';"),
  ];

  #[test]
  fn test_required_namespaces_stay_live() {
    let mut module = evaluate(
      &[COUNTER],
      indoc! {r#"
        const counter = require('./counter');
        const bump = counter.inc;
        bump();
        exports.value = counter.count;
      "#},
      &[],
    )
    .unwrap();

    assert_eq!(module.exports_object().unwrap(), json!({ "value": 1 }));
  }

  #[test]
  fn test_calls_into_dependencies_survive_shaking() {
    let mut module = evaluate(
      &[SETUP],
      indoc! {r#"
        import { setup, theme } from './setup';
        setup();
        export const color = theme.color;
      "#},
      &["color"],
    )
    .unwrap();

    assert_eq!(module.exports_object().unwrap(), json!({ "color": "red" }));
  }

  #[test]
  fn test_sources_with_the_same_basename() {
    let mut module = evaluate(
      &COLORS,
      indoc! {r#"
        import { a } from './a/colors';
        import { b } from './b/colors';
        import { x } from './theme';
        const _theme = '!';
        export const out = a + '/' + b + '/' + x + _theme;
      "#},
      &["out"],
    )
    .unwrap();

    assert_eq!(
      module.exports_object().unwrap(),
      json!({ "out": "from-a/from-b/x!" })
    );
  }

  #[test]
  fn test_modules_that_threw_are_not_cached() {
    let error = evaluate(
      &[("/app/src/boom.js", "exports.early = 1; throw new Error('boom');")],
      "try { require('./boom'); } catch (e) {} exports.value = require('./boom').early;",
      &[],
    )
    .err()
    .unwrap();

    assert!(matches!(
      error,
      EvalError::Evaluation { message, filename, .. }
        if message == "boom" && filename == "/app/src/boom.js"
    ));
  }

  #[test]
  fn test_shaking_preserves_requested_values() {
    let cyclic = [
      (
        "/app/src/a.js",
        "exports.early = 'a'; const b = require('./b'); exports.fromB = b.value;",
      ),
      (
        "/app/src/b.js",
        "const a = require('./a'); exports.value = 'b saw ' + a.early + ' ' + a.fromB;",
      ),
    ];
    let mutated = [(
      "/app/src/theme.js",
      "export const theme = {}; theme.color = 'blue'; export const other = 1;",
    )];

    let cases: Vec<(&str, Vec<(&str, &str)>, &str, Vec<&str>)> = vec![
      (
        "mutation",
        mutated.to_vec(),
        "import { theme } from './theme'; export const color = theme.color;",
        vec!["color"],
      ),
      (
        "call into a dependency",
        vec![SETUP],
        "import { setup, theme } from './setup'; setup(); export const color = theme.color;",
        vec!["color"],
      ),
      (
        "required namespace",
        vec![COUNTER],
        "const counter = require('./counter'); counter.inc(); exports.value = counter.count; exports.other = 2;",
        vec!["value"],
      ),
      (
        "cycle",
        cyclic.to_vec(),
        "const a = require('./a'); exports.early = a.early; exports.fromB = a.fromB;",
        vec!["fromB"],
      ),
      (
        "same basename",
        COLORS.to_vec(),
        "import { a } from './a/colors'; import { b } from './b/colors'; export const out = a + b; export const only = a;",
        vec!["out"],
      ),
    ];

    for (name, files, source, requested) in cases {
      let whole = evaluate(&files, source, &[])
        .and_then(|mut module| module.exports_object())
        .unwrap_or_else(|error| panic!("{name}: {error}"));
      let shaken = evaluate(&files, source, &requested)
        .and_then(|mut module| module.exports_object())
        .unwrap_or_else(|error| panic!("{name}: {error}"));

      for export in requested {
        assert!(whole.get(export).is_some(), "{name}: `{export}` missing");
        assert_eq!(shaken.get(export), whole.get(export), "{name}: `{export}`");
      }
    }
  }

  #[test]
  fn test_thrown_errors_keep_message_and_module() {
    let error = evaluate(
      &[("/app/src/boom.js", "throw new RangeError('too big');")],
      "require('./boom');",
      &[],
    )
    .err()
    .unwrap();

    let EvalError::Evaluation {
      message,
      stack,
      filename,
    } = error
    else {
      panic!("expected an evaluation error, got {error:?}");
    };
    assert_eq!(message, "too big");
    assert_eq!(filename, "/app/src/boom.js");
    assert!(stack.is_some());
  }

  #[test]
  fn test_resolve_failures_are_typed() {
    let error = evaluate(&[], "require('./nowhere');", &[]).err().unwrap();

    assert_eq!(
      error,
      EvalError::Resolve(crate::error::ResolveError::NotFound {
        specifier: "./nowhere".into(),
        from: PathBuf::from("/app/src"),
      })
    );
  }

  #[test]
  fn test_promises_cannot_be_read() {
    let mut module = evaluate(&[], "exports.later = Promise.resolve(1);", &[]).unwrap();

    assert_eq!(
      module.exports_object(),
      Err(EvalError::AsyncValue {
        name: "later".into(),
        filename: "/app/src/entry.js".into(),
      })
    );
  }

  #[test]
  fn test_node_modules_run_verbatim() {
    let mut module = evaluate(
      &[
        (
          "/app/node_modules/palette/package.json",
          r#"{ "main": "lib/palette.js" }"#,
        ),
        (
          "/app/node_modules/palette/lib/palette.js",
          "exports.primary = 'blue'; exports.secondary = 'green';",
        ),
        ("/app/src/sizes.json", r#"{ "small": 4 }"#),
      ],
      indoc! {r#"
        import { primary } from 'palette';
        import sizes from './sizes.json';
        export const button = primary + ':' + sizes.small;
      "#},
      &["button"],
    )
    .unwrap();

    assert_eq!(module.exports_object().unwrap(), json!({ "button": "blue:4" }));
  }

  #[test]
  fn test_custom_resolvers() {
    let mut resolver = MockModuleResolver::new();
    resolver
      .expect_resolve()
      .times(1)
      .returning(|specifier, from_dir| {
        assert_eq!(from_dir, Path::new("/app/src"));
        match specifier {
          "virtual:tokens" => Ok(PathBuf::from("/virtual/tokens.js")),
          _ => Err(crate::error::ResolveError::NotFound {
            specifier: specifier.to_string(),
            from: from_dir.to_path_buf(),
          }),
        }
      });

    let fs = file_system(&[("/virtual/tokens.js", "export const space = 8;")]);
    let mut options = ModuleOptions::new(fs);
    options.resolver = Arc::new(resolver);

    let mut module = Module::new("/app/src/entry.js", options).unwrap();
    module
      .evaluate("import { space } from 'virtual:tokens'; export const gap = space * 2;", None)
      .unwrap();

    assert_eq!(module.exports_object().unwrap(), json!({ "gap": 16 }));
  }

  #[test]
  fn test_cache_is_shared_between_modules() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let evaluator = move |filename: &str, source: &str, only: &[String]| {
      counted.fetch_add(1, Ordering::SeqCst);
      ShakerEvaluator::default().evaluate(filename, source, only)
    };

    let cache = Arc::new(EvaluationCache::new());
    let fs = file_system(&[("/app/src/theme.js", "export const color = 'red';")]);
    let mut options = ModuleOptions::new(fs).with_cache(cache.clone());
    options.rules = vec![Rule {
      test: RuleTest::Always,
      action: Action::Evaluate(Arc::new(evaluator)),
    }];

    for _ in 0..2 {
      let mut module = Module::new("/app/src/entry.js", options.clone()).unwrap();
      module
        .evaluate("export { color } from './theme';", Some(&names(&["color"])))
        .unwrap();
      assert_eq!(module.exports_object().unwrap(), json!({ "color": "red" }));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);

    cache.clear_for_file("/app/src/theme.js");
    let mut module = Module::new("/app/src/entry.js", options).unwrap();
    module
      .evaluate("export { color } from './theme';", Some(&names(&["color"])))
      .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn test_process_env_comes_from_options() {
    let mut options = ModuleOptions::new(file_system(&[]));
    options.node_env = "development".into();

    let mut module = Module::new("/app/src/entry.js", options).unwrap();
    module
      .evaluate("exports.env = process.env.NODE_ENV; exports.cwd = process.cwd();", None)
      .unwrap();

    assert_eq!(
      module.exports_object().unwrap(),
      json!({ "env": "development", "cwd": "/app" })
    );
  }
}
