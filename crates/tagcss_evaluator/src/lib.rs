//! Sandboxed evaluation of compile-time expressions.
//!
//! A [`Module`] loads one source file into an isolated QuickJS context and
//! lets the caller read back its exports. Every module it requires goes
//! through the configured [`Rule`]s: by default it is shaken down to the
//! names the requiring module reads before it runs.

pub mod builtins;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod module;
pub mod resolver;
pub mod rules;

pub use cache::CacheKey;
pub use cache::EvaluationCache;
pub use config::EvaluatorConfig;
pub use config::EvaluatorRegistry;
pub use error::ConfigError;
pub use error::EvalError;
pub use error::ResolveError;
pub use module::Module;
pub use module::ModuleOptions;
pub use module::ModuleRecord;
pub use module::ModuleState;
pub use resolver::ModuleResolver;
pub use resolver::NodeResolver;
pub use rules::Action;
pub use rules::ActionSpec;
pub use rules::Evaluator;
pub use rules::EvaluatorOutput;
pub use rules::Rule;
pub use rules::RuleSpec;
pub use rules::ShakerEvaluator;
