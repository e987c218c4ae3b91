use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tagcss_filesystem::FileSystemRef;

use crate::error::ConfigError;
use crate::module::ModuleOptions;
use crate::resolver::NodeResolver;
use crate::resolver::DEFAULT_EXTENSIONS;
use crate::rules::default_rules;
use crate::rules::resolve_rules;
use crate::rules::ActionSpec;
use crate::rules::Evaluator;
use crate::rules::RuleSpec;
use crate::rules::RuleTest;
use crate::rules::ShakerEvaluator;

/// Evaluators a configuration can refer to by name.
#[derive(Clone)]
pub struct EvaluatorRegistry {
  evaluators: HashMap<String, Arc<dyn Evaluator>>,
}

impl Default for EvaluatorRegistry {
  fn default() -> Self {
    let mut registry = EvaluatorRegistry {
      evaluators: HashMap::new(),
    };
    registry.register("shaker", Arc::new(ShakerEvaluator::default()));
    registry
  }
}

impl EvaluatorRegistry {
  pub fn register(&mut self, name: impl Into<String>, evaluator: Arc<dyn Evaluator>) {
    self.evaluators.insert(name.into(), evaluator);
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn Evaluator>> {
    self.evaluators.get(name).cloned()
  }
}

impl fmt::Debug for EvaluatorRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names = self.evaluators.keys().collect::<Vec<_>>();
    names.sort();
    f.debug_struct("EvaluatorRegistry")
      .field("evaluators", &names)
      .finish()
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
  /// Regex matched against the filename. Rules without one match every file.
  pub test: Option<String>,
  /// `"ignore"` or the name of a registered evaluator.
  pub action: String,
}

/// Serialized sandbox settings, usually read from a JSON file.
///
/// ```json
/// {
///   "nodeEnv": "development",
///   "rules": [{ "action": "shaker" }, { "test": "node_modules", "action": "ignore" }]
/// }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluatorConfig {
  pub node_env: String,
  pub extensions: Vec<String>,
  pub memory_limit: Option<usize>,
  /// Empty means the default rules.
  pub rules: Vec<RuleConfig>,
}

impl Default for EvaluatorConfig {
  fn default() -> Self {
    EvaluatorConfig {
      node_env: "production".into(),
      extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
      memory_limit: None,
      rules: vec![],
    }
  }
}

impl EvaluatorConfig {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn rule_specs(&self) -> Result<Vec<RuleSpec>, ConfigError> {
    self
      .rules
      .iter()
      .map(|rule| {
        let test = match &rule.test {
          None => RuleTest::Always,
          Some(pattern) => {
            RuleTest::Pattern(Regex::new(pattern).map_err(|source| ConfigError::InvalidTest {
              pattern: pattern.clone(),
              source,
            })?)
          }
        };
        let action = match rule.action.as_str() {
          "ignore" => ActionSpec::Ignore,
          name => ActionSpec::Named(name.to_string()),
        };
        Ok(RuleSpec { test, action })
      })
      .collect()
  }

  /// Compiles the rules against `registry` and builds the options of a sandbox
  /// reading from `fs`.
  pub fn into_options(
    self,
    registry: &EvaluatorRegistry,
    fs: FileSystemRef,
  ) -> Result<ModuleOptions, ConfigError> {
    let rules = if self.rules.is_empty() {
      default_rules()
    } else {
      resolve_rules(self.rule_specs()?, registry)?
    };
    tracing::debug!(rules = rules.len(), node_env = %self.node_env, "Loaded evaluator config");

    let mut options = ModuleOptions::new(fs.clone());
    options.resolver = Arc::new(NodeResolver::with_extensions(fs, self.extensions));
    options.rules = rules;
    options.node_env = self.node_env;
    options.memory_limit = self.memory_limit;
    Ok(options)
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tagcss_filesystem::InMemoryFileSystem;

  use super::*;
  use crate::rules::select_action;
  use crate::rules::Action;
  use crate::rules::EvaluatorOutput;

  #[test]
  fn test_defaults_for_missing_fields() {
    let config = EvaluatorConfig::from_json(r#"{ "memoryLimit": 1048576 }"#).unwrap();

    assert_eq!(
      config,
      EvaluatorConfig {
        memory_limit: Some(1048576),
        ..EvaluatorConfig::default()
      }
    );
    assert_eq!(config.node_env, "production");
    assert!(config.extensions.contains(&".tsx".to_string()));
  }

  #[test]
  fn test_resolves_rules_against_the_registry() {
    let mut registry = EvaluatorRegistry::default();
    registry.register(
      "raw",
      Arc::new(|_: &str, source: &str, _: &[String]| -> anyhow::Result<EvaluatorOutput> {
        Ok(EvaluatorOutput {
          code: source.to_string(),
          ..EvaluatorOutput::default()
        })
      }),
    );

    let config = EvaluatorConfig::from_json(
      r#"{
        "nodeEnv": "test",
        "rules": [
          { "action": "shaker" },
          { "test": "\\.raw\\.js$", "action": "raw" },
          { "test": "vendor/", "action": "ignore" }
        ]
      }"#,
    )
    .unwrap();

    let options = config
      .into_options(&registry, Arc::new(InMemoryFileSystem::default()))
      .unwrap();

    assert_eq!(options.node_env, "test");
    assert_eq!(options.rules.len(), 3);
    assert!(matches!(
      select_action(&options.rules, "/src/a.raw.js"),
      Action::Evaluate(_)
    ));
    assert!(matches!(
      select_action(&options.rules, "/vendor/a.raw.js"),
      Action::Ignore
    ));
  }

  #[test]
  fn test_empty_rules_fall_back_to_defaults() {
    let options = EvaluatorConfig::default()
      .into_options(
        &EvaluatorRegistry::default(),
        Arc::new(InMemoryFileSystem::default()),
      )
      .unwrap();

    assert!(matches!(
      select_action(&options.rules, "/app/node_modules/x/index.js"),
      Action::Ignore
    ));
    assert!(matches!(
      select_action(&options.rules, "/app/src/index.js"),
      Action::Evaluate(_)
    ));
  }

  #[test]
  fn test_reports_config_errors() {
    let registry = EvaluatorRegistry::default();
    let fs: FileSystemRef = Arc::new(InMemoryFileSystem::default());

    let unknown = EvaluatorConfig::from_json(r#"{ "rules": [{ "action": "babel" }] }"#)
      .unwrap()
      .into_options(&registry, fs.clone())
      .unwrap_err();
    assert_eq!(unknown.to_string(), "No evaluator is registered as 'babel'");

    let invalid = EvaluatorConfig::from_json(r#"{ "rules": [{ "test": "(", "action": "ignore" }] }"#)
      .unwrap()
      .into_options(&registry, fs)
      .unwrap_err();
    assert!(matches!(invalid, ConfigError::InvalidTest { pattern, .. } if pattern == "("));

    assert!(matches!(
      EvaluatorConfig::from_json("{ rules: [] }"),
      Err(ConfigError::Parse(_))
    ));
  }
}
