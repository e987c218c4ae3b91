use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tagcss_shaker::prepare_for_sandbox;
use tagcss_shaker::PrepareOptions;

use crate::config::EvaluatorRegistry;
use crate::error::ConfigError;

/// Code ready to run in the sandbox.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvaluatorOutput {
  pub code: String,
  /// Import source to the names the code reads from it. Sources missing here
  /// are evaluated whole.
  pub imports: BTreeMap<String, Vec<String>>,
}

/// Turns a source file into sandbox code exposing at least the `only` names.
pub trait Evaluator: Send + Sync {
  fn evaluate(&self, filename: &str, source: &str, only: &[String])
    -> anyhow::Result<EvaluatorOutput>;
}

impl<F> Evaluator for F
where
  F: Fn(&str, &str, &[String]) -> anyhow::Result<EvaluatorOutput> + Send + Sync,
{
  fn evaluate(
    &self,
    filename: &str,
    source: &str,
    only: &[String],
  ) -> anyhow::Result<EvaluatorOutput> {
    self(filename, source, only)
  }
}

/// Shakes the module down to `only`, strips types and lowers it to CommonJS.
#[derive(Clone, Debug, Default)]
pub struct ShakerEvaluator {
  pub keep_side_effects: bool,
}

impl Evaluator for ShakerEvaluator {
  fn evaluate(
    &self,
    filename: &str,
    source: &str,
    only: &[String],
  ) -> anyhow::Result<EvaluatorOutput> {
    let prepared = prepare_for_sandbox(
      filename,
      source,
      Some(only),
      &PrepareOptions {
        keep_side_effects: self.keep_side_effects,
      },
    )?;

    Ok(EvaluatorOutput {
      code: prepared.code,
      imports: prepared.imports,
    })
  }
}

#[derive(Clone)]
pub enum RuleTest {
  Always,
  Pattern(Regex),
  Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl RuleTest {
  pub fn matches(&self, filename: &str) -> bool {
    match self {
      RuleTest::Always => true,
      RuleTest::Pattern(regex) => regex.is_match(filename),
      RuleTest::Predicate(predicate) => predicate(filename),
    }
  }
}

impl fmt::Debug for RuleTest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RuleTest::Always => write!(f, "Always"),
      RuleTest::Pattern(regex) => write!(f, "Pattern(/{}/)", regex.as_str()),
      RuleTest::Predicate(_) => write!(f, "Predicate"),
    }
  }
}

/// What a rule asks for, before evaluator names are looked up.
#[derive(Clone)]
pub enum ActionSpec {
  /// Run the file as it is.
  Ignore,
  Inline(Arc<dyn Evaluator>),
  /// An evaluator registered under this name.
  Named(String),
}

#[derive(Clone)]
pub struct RuleSpec {
  pub test: RuleTest,
  pub action: ActionSpec,
}

#[derive(Clone)]
pub enum Action {
  Ignore,
  Evaluate(Arc<dyn Evaluator>),
}

impl fmt::Debug for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Action::Ignore => write!(f, "Ignore"),
      Action::Evaluate(_) => write!(f, "Evaluate"),
    }
  }
}

#[derive(Clone, Debug)]
pub struct Rule {
  pub test: RuleTest,
  pub action: Action,
}

/// Looks up every named evaluator once, so selecting an action later never fails.
pub fn resolve_rules(
  specs: Vec<RuleSpec>,
  registry: &EvaluatorRegistry,
) -> Result<Vec<Rule>, ConfigError> {
  specs
    .into_iter()
    .map(|spec| {
      let action = match spec.action {
        ActionSpec::Ignore => Action::Ignore,
        ActionSpec::Inline(evaluator) => Action::Evaluate(evaluator),
        ActionSpec::Named(name) => Action::Evaluate(
          registry
            .get(&name)
            .ok_or(ConfigError::UnknownEvaluator(name))?,
        ),
      };
      Ok(Rule {
        test: spec.test,
        action,
      })
    })
    .collect()
}

/// Shake every file, but run anything under `node_modules` as it is.
pub fn default_rules() -> Vec<Rule> {
  vec![
    Rule {
      test: RuleTest::Always,
      action: Action::Evaluate(Arc::new(ShakerEvaluator::default())),
    },
    Rule {
      test: RuleTest::Pattern(NODE_MODULES.clone()),
      action: Action::Ignore,
    },
  ]
}

static NODE_MODULES: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[\\/]node_modules[\\/]").unwrap());

/// The action of the last rule matching `filename`. Files no rule matches run
/// as they are.
pub fn select_action(rules: &[Rule], filename: &str) -> Action {
  rules
    .iter()
    .rev()
    .find(|rule| rule.test.matches(filename))
    .map(|rule| rule.action.clone())
    .unwrap_or(Action::Ignore)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn echo(_filename: &str, source: &str, _only: &[String]) -> anyhow::Result<EvaluatorOutput> {
    Ok(EvaluatorOutput {
      code: format!("/* echo */{source}"),
      imports: BTreeMap::new(),
    })
  }

  #[test]
  fn test_last_matching_rule_wins() {
    let rules = default_rules();

    assert!(matches!(
      select_action(&rules, "/app/src/theme.js"),
      Action::Evaluate(_)
    ));
    assert!(matches!(
      select_action(&rules, "/app/node_modules/lib/index.js"),
      Action::Ignore
    ));
  }

  #[test]
  fn test_unmatched_files_are_ignored() {
    let rules = vec![Rule {
      test: RuleTest::Pattern(Regex::new(r"\.ts$").unwrap()),
      action: Action::Evaluate(Arc::new(echo)),
    }];

    assert!(matches!(select_action(&rules, "/a.js"), Action::Ignore));
    assert!(matches!(select_action(&rules, "/a.ts"), Action::Evaluate(_)));
  }

  #[test]
  fn test_resolves_named_and_inline_actions() {
    let mut registry = EvaluatorRegistry::default();
    registry.register("echo", Arc::new(echo));

    let rules = resolve_rules(
      vec![
        RuleSpec {
          test: RuleTest::Always,
          action: ActionSpec::Named("echo".into()),
        },
        RuleSpec {
          test: RuleTest::Predicate(Arc::new(|filename: &str| filename.ends_with(".json"))),
          action: ActionSpec::Ignore,
        },
        RuleSpec {
          test: RuleTest::Pattern(Regex::new("inline").unwrap()),
          action: ActionSpec::Inline(Arc::new(ShakerEvaluator::default())),
        },
      ],
      &registry,
    )
    .unwrap();

    let Action::Evaluate(evaluator) = select_action(&rules, "/a.js") else {
      panic!("expected an evaluator");
    };
    assert_eq!(
      evaluator.evaluate("/a.js", "1", &[]).unwrap().code,
      "/* echo */1"
    );
    assert!(matches!(select_action(&rules, "/data.json"), Action::Ignore));
  }

  #[test]
  fn test_unknown_evaluator_fails_at_resolution() {
    let error = resolve_rules(
      vec![RuleSpec {
        test: RuleTest::Always,
        action: ActionSpec::Named("missing".into()),
      }],
      &EvaluatorRegistry::default(),
    )
    .err()
    .unwrap();

    assert!(matches!(error, ConfigError::UnknownEvaluator(name) if name == "missing"));
  }

  #[test]
  fn test_shaker_evaluator_reports_imports() {
    let output = ShakerEvaluator::default()
      .evaluate(
        "/src/a.js",
        "import { b } from './b';\nexport const a = b;\nexport const c = 1;\n",
        &["a".to_string()],
      )
      .unwrap();

    assert!(!output.code.contains("exports.c"), "{}", output.code);
    assert_eq!(
      output.imports,
      BTreeMap::from([("./b".to_string(), vec!["b".to_string()])])
    );
  }
}
