//! Canonical import/export tables for a module, regardless of whether it was authored as
//! ESM or already compiled to one of the common CommonJS interop shapes.

use std::collections::HashSet;

use swc_core::atoms::Atom;
use swc_core::common::Mark;
use swc_core::common::Span;
use swc_core::common::Spanned;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::noop_visit_type;
use swc_core::ecma::visit::Visit;
use swc_core::ecma::visit::VisitWith;

use crate::id;
use crate::scope::ScopeTree;
use crate::utils::match_export_name;
use crate::utils::match_export_name_ident;
use crate::utils::pat_binding_ids;
use crate::utils::Warning;

mod matchers;
mod unfold;

pub use matchers::require_call;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImportedName {
  Named(Atom),
  Default,
  /// The whole module namespace (`*`)
  Namespace,
  /// Imported only for its side effects
  SideEffect,
}

impl ImportedName {
  /// Name requested from the source module when this import is retained.
  pub fn requested(&self) -> Atom {
    match self {
      ImportedName::Named(name) => name.clone(),
      ImportedName::Default => "default".into(),
      ImportedName::Namespace | ImportedName::SideEffect => "*".into(),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormKind {
  Static,
  Dynamic,
  Interop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportRecord {
  pub local: Option<Id>,
  pub imported: ImportedName,
  pub source: Atom,
  pub form: FormKind,
  /// The import declaration, or the `require()`/`import()` call for the other forms
  pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExportedName {
  Named(Atom),
  Default,
  /// A whole `module.exports = …` replacement, or `export *` for re-exports
  All,
}

impl ExportedName {
  pub fn from_atom(name: Atom) -> Self {
    if &*name == "default" {
      ExportedName::Default
    } else {
      ExportedName::Named(name)
    }
  }

  pub fn matches(&self, requested: &str) -> bool {
    match self {
      ExportedName::Named(name) => &**name == requested,
      ExportedName::Default => requested == "default",
      ExportedName::All => false,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRecord {
  pub exported: ExportedName,
  /// Local binding holding the exported value, when there is one
  pub local: Option<Id>,
  /// Node establishing the export: a statement, an export specifier or an object property
  pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReexportRecord {
  pub exported: ExportedName,
  pub imported: ImportedName,
  pub source: Atom,
  pub span: Span,
}

#[derive(Debug)]
pub struct NormalizedModule {
  pub imports: Vec<ImportRecord>,
  pub exports: Vec<ExportRecord>,
  pub reexports: Vec<ReexportRecord>,
  /// `__esModule` was set on the exports object
  pub is_module_flagged: bool,
  /// Statements setting `__esModule`
  pub module_flag_spans: Vec<Span>,
  /// The module uses `import`/`export` syntax
  pub has_module_syntax: bool,
  pub warnings: Vec<Warning>,
  pub scopes: ScopeTree,
}

impl NormalizedModule {
  pub fn import_for_local(&self, local: &Id) -> Option<&ImportRecord> {
    self
      .imports
      .iter()
      .find(|import| import.local.as_ref() == Some(local))
  }
}

/// Builds the import/export tables of `module`.
///
/// Namespace imports whose every read is a static member access are unfolded into named
/// imports, which rewrites `module` in place.
pub fn normalize(module: &mut Module, unresolved_mark: Mark) -> NormalizedModule {
  let mut collector = Collector {
    unresolved_mark,
    imports: vec![],
    exports: vec![],
    reexports: vec![],
    is_module_flagged: false,
    module_flag_spans: vec![],
    has_module_syntax: false,
    warnings: vec![],
  };

  for item in &module.body {
    collector.collect_item(item);
  }

  let claimed: HashSet<Span> = collector
    .imports
    .iter()
    .map(|import| import.span)
    .chain(collector.reexports.iter().map(|reexport| reexport.span))
    .collect();
  let mut leftovers = LeftoverImports {
    unresolved_mark,
    claimed,
    imports: vec![],
    warnings: vec![],
  };
  module.visit_with(&mut leftovers);
  collector.imports.extend(leftovers.imports);
  collector.warnings.extend(leftovers.warnings);

  let mut normalized = NormalizedModule {
    imports: collector.imports,
    exports: collector.exports,
    reexports: collector.reexports,
    is_module_flagged: collector.is_module_flagged,
    module_flag_spans: collector.module_flag_spans,
    has_module_syntax: collector.has_module_syntax,
    warnings: collector.warnings,
    scopes: ScopeTree::build(module),
  };

  unfold::unfold_namespaces(module, &mut normalized);

  tracing::trace!(
    imports = normalized.imports.len(),
    exports = normalized.exports.len(),
    reexports = normalized.reexports.len(),
    "Normalized module"
  );

  normalized
}

struct Collector {
  unresolved_mark: Mark,
  imports: Vec<ImportRecord>,
  exports: Vec<ExportRecord>,
  reexports: Vec<ReexportRecord>,
  is_module_flagged: bool,
  module_flag_spans: Vec<Span>,
  has_module_syntax: bool,
  warnings: Vec<Warning>,
}

impl Collector {
  fn collect_item(&mut self, item: &ModuleItem) {
    match item {
      ModuleItem::ModuleDecl(decl) => {
        if !is_type_only(decl) {
          self.has_module_syntax = true;
        }
        self.collect_module_decl(decl, item.span());
      }
      ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) => self.collect_var_decl(var, item.span()),
      ModuleItem::Stmt(Stmt::Expr(expr)) => self.apply_matchers(item.span(), |matcher, cx| {
        matcher.statement(&expr.expr, cx)
      }),
      ModuleItem::Stmt(_) => {}
    }
  }

  fn collect_var_decl(&mut self, var: &VarDecl, item_span: Span) {
    for decl in &var.decls {
      self.apply_matchers(item_span, |matcher, cx| matcher.declarator(decl, cx));
    }
  }

  fn apply_matchers<F>(&mut self, item_span: Span, run: F)
  where
    F: Fn(&dyn matchers::Matcher, &matchers::MatchContext<'_>) -> Option<Vec<matchers::Claim>>,
  {
    let cx = matchers::MatchContext {
      unresolved_mark: self.unresolved_mark,
      item_span,
      imports: &self.imports,
    };

    let claims = first_claim(matchers::MATCHERS, &cx, run);

    for claim in claims.into_iter().flatten() {
      match claim {
        matchers::Claim::Import(import) => self.imports.push(import),
        matchers::Claim::Export(export) => self.exports.push(export),
        matchers::Claim::Reexport(reexport) => self.reexports.push(reexport),
        matchers::Claim::ModuleFlag => {
          self.is_module_flagged = true;
          self.module_flag_spans.push(item_span);
        }
        matchers::Claim::Warning(warning) => self.warnings.push(warning),
      }
    }
  }

  fn collect_module_decl(&mut self, decl: &ModuleDecl, item_span: Span) {
    match decl {
      ModuleDecl::Import(import) => {
        if import.type_only {
          return;
        }

        if import.specifiers.is_empty() {
          self.imports.push(ImportRecord {
            local: None,
            imported: ImportedName::SideEffect,
            source: import.src.value.clone(),
            form: FormKind::Static,
            span: import.span,
          });
          return;
        }

        for specifier in &import.specifiers {
          let (local, imported) = match specifier {
            ImportSpecifier::Named(named) if named.is_type_only => continue,
            ImportSpecifier::Named(named) => {
              let imported = named
                .imported
                .as_ref()
                .map(|imported| match_export_name(imported).0)
                .unwrap_or_else(|| named.local.sym.clone());
              let imported = if &*imported == "default" {
                ImportedName::Default
              } else {
                ImportedName::Named(imported)
              };
              (&named.local, imported)
            }
            ImportSpecifier::Default(default) => (&default.local, ImportedName::Default),
            ImportSpecifier::Namespace(namespace) => (&namespace.local, ImportedName::Namespace),
          };

          self.imports.push(ImportRecord {
            local: Some(id!(local)),
            imported,
            source: import.src.value.clone(),
            form: FormKind::Static,
            span: import.span,
          });
        }
      }
      ModuleDecl::ExportDecl(export) => match &export.decl {
        Decl::Var(var) => {
          for decl in &var.decls {
            for local in pat_binding_ids(&decl.name) {
              self.exports.push(ExportRecord {
                exported: ExportedName::Named(local.0.clone()),
                local: Some(local),
                span: item_span,
              });
            }
          }
          // `export const x = require('y')` still imports
          self.collect_var_decl(var, item_span);
        }
        Decl::Fn(func) => self.push_local_export(&func.ident, item_span),
        Decl::Class(class) => self.push_local_export(&class.ident, item_span),
        Decl::TsEnum(ts_enum) => self.push_local_export(&ts_enum.id, item_span),
        _ => {}
      },
      ModuleDecl::ExportNamed(named) => {
        if named.type_only {
          return;
        }

        for specifier in &named.specifiers {
          match (specifier, &named.src) {
            (ExportSpecifier::Named(spec), _) if spec.is_type_only => {}
            (ExportSpecifier::Named(spec), Some(src)) => {
              let (orig, _) = match_export_name(&spec.orig);
              let exported = spec
                .exported
                .as_ref()
                .map(|exported| match_export_name(exported).0)
                .unwrap_or_else(|| orig.clone());
              let imported = if &*orig == "default" {
                ImportedName::Default
              } else {
                ImportedName::Named(orig)
              };
              self.reexports.push(ReexportRecord {
                exported: ExportedName::from_atom(exported),
                imported,
                source: src.value.clone(),
                span: spec.span,
              });
            }
            (ExportSpecifier::Named(spec), None) => {
              let local = match_export_name_ident(&spec.orig).map(|ident| id!(ident));
              let (orig, _) = match_export_name(&spec.orig);
              let exported = spec
                .exported
                .as_ref()
                .map(|exported| match_export_name(exported).0)
                .unwrap_or(orig);
              self.exports.push(ExportRecord {
                exported: ExportedName::from_atom(exported),
                local,
                span: spec.span,
              });
            }
            (ExportSpecifier::Namespace(spec), Some(src)) => {
              self.reexports.push(ReexportRecord {
                exported: ExportedName::from_atom(match_export_name(&spec.name).0),
                imported: ImportedName::Namespace,
                source: src.value.clone(),
                span: spec.span,
              });
            }
            (ExportSpecifier::Default(spec), Some(src)) => {
              self.reexports.push(ReexportRecord {
                exported: ExportedName::Named(spec.exported.sym.clone()),
                imported: ImportedName::Default,
                source: src.value.clone(),
                span: spec.exported.span,
              });
            }
            (_, None) => {}
          }
        }
      }
      ModuleDecl::ExportDefaultDecl(export) => {
        let local = match &export.decl {
          DefaultDecl::Fn(func) => func.ident.as_ref(),
          DefaultDecl::Class(class) => class.ident.as_ref(),
          DefaultDecl::TsInterfaceDecl(_) => return,
        };
        self.exports.push(ExportRecord {
          exported: ExportedName::Default,
          local: local.map(|ident| id!(ident)),
          span: item_span,
        });
      }
      ModuleDecl::ExportDefaultExpr(export) => {
        let local = match &*export.expr {
          Expr::Ident(ident) => Some(id!(ident)),
          _ => None,
        };
        self.exports.push(ExportRecord {
          exported: ExportedName::Default,
          local,
          span: item_span,
        });
      }
      ModuleDecl::ExportAll(export) => {
        if export.type_only {
          return;
        }
        self.reexports.push(ReexportRecord {
          exported: ExportedName::All,
          imported: ImportedName::Namespace,
          source: export.src.value.clone(),
          span: export.span,
        });
      }
      ModuleDecl::TsImportEquals(_)
      | ModuleDecl::TsExportAssignment(_)
      | ModuleDecl::TsNamespaceExport(_) => {}
    }
  }

  fn push_local_export(&mut self, ident: &Ident, item_span: Span) {
    self.exports.push(ExportRecord {
      exported: ExportedName::Named(ident.sym.clone()),
      local: Some(id!(ident)),
      span: item_span,
    });
  }
}

/// Claims of the first matcher recognizing a node. Matchers are expected to be disjoint, so a
/// second match is only reported.
fn first_claim<F>(
  candidates: &[&dyn matchers::Matcher],
  cx: &matchers::MatchContext<'_>,
  run: F,
) -> Option<Vec<matchers::Claim>>
where
  F: Fn(&dyn matchers::Matcher, &matchers::MatchContext<'_>) -> Option<Vec<matchers::Claim>>,
{
  let mut claims: Option<(&'static str, Vec<matchers::Claim>)> = None;
  for matcher in candidates {
    let Some(found) = run(*matcher, cx) else {
      continue;
    };
    match &claims {
      None => claims = Some((matcher.name(), found)),
      Some((first, _)) => tracing::warn!(
        first = *first,
        ignored = matcher.name(),
        "Node claimed by more than one matcher"
      ),
    }
  }
  claims.map(|(_, claims)| claims)
}

fn is_type_only(decl: &ModuleDecl) -> bool {
  match decl {
    ModuleDecl::Import(import) => import.type_only,
    ModuleDecl::ExportNamed(named) => named.type_only,
    ModuleDecl::ExportAll(all) => all.type_only,
    ModuleDecl::ExportDecl(export) => matches!(
      export.decl,
      Decl::TsInterface(_) | Decl::TsTypeAlias(_) | Decl::TsModule(_)
    ),
    ModuleDecl::ExportDefaultDecl(export) => {
      matches!(export.decl, DefaultDecl::TsInterfaceDecl(_))
    }
    _ => false,
  }
}

/// Picks up `require()` and `import()` calls the top-level matchers did not claim, such as
/// requires inside functions. These import the whole namespace without a local binding.
struct LeftoverImports {
  unresolved_mark: Mark,
  claimed: HashSet<Span>,
  imports: Vec<ImportRecord>,
  warnings: Vec<Warning>,
}

impl Visit for LeftoverImports {
  noop_visit_type!();

  fn visit_await_expr(&mut self, node: &AwaitExpr) {
    // `await import('x')` in place reads the namespace
    if let Some((source, span)) = matchers::import_call(&node.arg) {
      if self.claimed.insert(span) {
        self.imports.push(ImportRecord {
          local: None,
          imported: ImportedName::Namespace,
          source,
          form: FormKind::Dynamic,
          span,
        });
      }
    }
    node.visit_children_with(self);
  }

  fn visit_call_expr(&mut self, node: &CallExpr) {
    let span = node.span;

    if let Some(source) = matchers::require_source(node, self.unresolved_mark) {
      if self.claimed.insert(span) {
        self.imports.push(ImportRecord {
          local: None,
          imported: ImportedName::Namespace,
          source,
          form: FormKind::Static,
          span,
        });
      }
    } else if let Some(source) = matchers::import_source(node) {
      if self.claimed.insert(span) {
        self.warnings.push(Warning::unclassifiable(
          format!("Unable to determine the bindings used from dynamic import of `{source}`"),
          span,
        ));
        self.imports.push(ImportRecord {
          local: None,
          imported: ImportedName::Namespace,
          source,
          form: FormKind::Dynamic,
          span,
        });
      }
    }

    node.visit_children_with(self);
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;
  use pretty_assertions::assert_eq;
  use swc_core::common::DUMMY_SP;
  use tagcss_swc_runner::test_utils::run_test_module;
  use tracing_test::traced_test;

  use super::*;

  type Imports = Vec<(Option<String>, ImportedName, String, FormKind)>;
  type Exports = Vec<(ExportedName, Option<String>)>;
  type Reexports = Vec<(ExportedName, ImportedName, String)>;

  struct Summary {
    imports: Imports,
    exports: Exports,
    reexports: Reexports,
    is_module_flagged: bool,
    has_module_syntax: bool,
    warnings: usize,
    output_code: String,
  }

  fn run_normalize(code: &str) -> Summary {
    let result = run_test_module(code, |context, module| {
      normalize(module, context.unresolved_mark)
    });
    let normalized = result.result;

    Summary {
      imports: normalized
        .imports
        .iter()
        .map(|import| {
          (
            import.local.as_ref().map(|local| local.0.to_string()),
            import.imported.clone(),
            import.source.to_string(),
            import.form,
          )
        })
        .collect(),
      exports: normalized
        .exports
        .iter()
        .map(|export| {
          (
            export.exported.clone(),
            export.local.as_ref().map(|local| local.0.to_string()),
          )
        })
        .collect(),
      reexports: normalized
        .reexports
        .iter()
        .map(|reexport| {
          (
            reexport.exported.clone(),
            reexport.imported.clone(),
            reexport.source.to_string(),
          )
        })
        .collect(),
      is_module_flagged: normalized.is_module_flagged,
      has_module_syntax: normalized.has_module_syntax,
      warnings: normalized.warnings.len(),
      output_code: result.output_code,
    }
  }

  fn named(name: &str) -> ImportedName {
    ImportedName::Named(name.into())
  }

  fn export(name: &str) -> ExportedName {
    ExportedName::Named(name.into())
  }

  #[test]
  fn test_collects_esm_imports() {
    let summary = run_normalize(indoc! {r#"
      import './reset.css';
      import theme, { color, size as s } from './theme';
      import * as tokens from './tokens';
      import type { Props } from './types';
      console.log(theme, color, s, tokens);
    "#});

    assert_eq!(
      summary.imports,
      vec![
        (None, ImportedName::SideEffect, "./reset.css".into(), FormKind::Static),
        (Some("theme".into()), ImportedName::Default, "./theme".into(), FormKind::Static),
        (Some("color".into()), named("color"), "./theme".into(), FormKind::Static),
        (Some("s".into()), named("size"), "./theme".into(), FormKind::Static),
        (Some("tokens".into()), ImportedName::Namespace, "./tokens".into(), FormKind::Static),
      ]
    );
    assert!(summary.has_module_syntax);
  }

  #[test]
  fn test_collects_esm_exports_and_reexports() {
    let summary = run_normalize(indoc! {r#"
      const a = 1;
      export const b = 2, { c } = {};
      export function f() {}
      export { a, a as d };
      export default a;
      export { x, y as z, default as w } from './other';
      export * from './all';
      export * as ns from './ns';
    "#});

    assert_eq!(
      summary.exports,
      vec![
        (export("b"), Some("b".into())),
        (export("c"), Some("c".into())),
        (export("f"), Some("f".into())),
        (export("a"), Some("a".into())),
        (export("d"), Some("a".into())),
        (ExportedName::Default, Some("a".into())),
      ]
    );
    assert_eq!(
      summary.reexports,
      vec![
        (export("x"), named("x"), "./other".into()),
        (export("z"), named("y"), "./other".into()),
        (export("w"), ImportedName::Default, "./other".into()),
        (ExportedName::All, ImportedName::Namespace, "./all".into()),
        (export("ns"), ImportedName::Namespace, "./ns".into()),
      ]
    );
  }

  #[test]
  fn test_collects_requires() {
    let summary = run_normalize(indoc! {r#"
      const ns = require('ns');
      const { a, b: c, d = 1 } = require('named');
      const e = require('member').e;
      require('side-effect');
      function lazy() {
        return require('lazy');
      }
      ns();
    "#});

    assert_eq!(
      summary.imports,
      vec![
        (Some("ns".into()), ImportedName::Namespace, "ns".into(), FormKind::Static),
        (Some("a".into()), named("a"), "named".into(), FormKind::Static),
        (Some("c".into()), named("b"), "named".into(), FormKind::Static),
        (Some("d".into()), named("d"), "named".into(), FormKind::Static),
        (Some("e".into()), named("e"), "member".into(), FormKind::Static),
        (None, ImportedName::SideEffect, "side-effect".into(), FormKind::Static),
        (None, ImportedName::Namespace, "lazy".into(), FormKind::Static),
      ]
    );
    assert!(!summary.has_module_syntax);
  }

  #[test]
  fn test_collects_dynamic_imports() {
    let summary = run_normalize(indoc! {r#"
      const ns = await import('ns');
      const { a } = await import('named');
      import('then').then(({ b, c: d }) => console.log(b, d));
      await import('in-place');
      const lazy = () => import('unknown');
      console.log(ns);
    "#});

    assert_eq!(
      summary.imports,
      vec![
        (Some("ns".into()), ImportedName::Namespace, "ns".into(), FormKind::Dynamic),
        (Some("a".into()), named("a"), "named".into(), FormKind::Dynamic),
        (Some("b".into()), named("b"), "then".into(), FormKind::Dynamic),
        (Some("d".into()), named("c"), "then".into(), FormKind::Dynamic),
        (None, ImportedName::Namespace, "in-place".into(), FormKind::Dynamic),
        (None, ImportedName::Namespace, "unknown".into(), FormKind::Dynamic),
      ]
    );
    assert_eq!(summary.warnings, 1);
  }

  #[test]
  fn test_collects_babel_interop_output() {
    let summary = run_normalize(indoc! {r#"
      "use strict";
      Object.defineProperty(exports, "__esModule", { value: true });
      exports.color = void 0;
      var _theme = _interopRequireDefault(require("./theme"));
      var _tokens = _interopRequireWildcard(require("./tokens"));
      var _all = require("./all");
      Object.keys(_all).forEach(function (key) {
        if (key === "default" || key === "__esModule") return;
        Object.defineProperty(exports, key, {
          enumerable: true,
          get: function () {
            return _all[key];
          }
        });
      });
      Object.defineProperty(exports, "size", {
        enumerable: true,
        get: function () {
          return _tokens.size;
        }
      });
      const color = _theme.default.color;
      exports.color = color;
      function _interopRequireDefault(obj) { return obj && obj.__esModule ? obj : { default: obj }; }
    "#});

    assert!(summary.is_module_flagged);
    assert!(!summary.has_module_syntax);
    assert_eq!(
      summary.imports,
      vec![
        (Some("_theme".into()), ImportedName::Default, "./theme".into(), FormKind::Interop),
        // `_tokens` is only read as `_tokens.size`
        (Some("_tokens".into()), named("size"), "./tokens".into(), FormKind::Interop),
        (Some("_all".into()), ImportedName::Namespace, "./all".into(), FormKind::Static),
      ]
    );
    assert_eq!(
      summary.reexports,
      vec![
        (ExportedName::All, ImportedName::Namespace, "./all".into()),
        (export("size"), named("size"), "./tokens".into()),
      ]
    );
    assert_eq!(
      summary.exports,
      vec![(export("color"), None), (export("color"), Some("color".into()))]
    );
  }

  #[test]
  fn test_collects_typescript_helpers() {
    let summary = run_normalize(indoc! {r#"
      exports.b = exports.a = void 0;
      const theme_1 = __importDefault(require("./theme"));
      const tokens = __importStar(require("./tokens"));
      __exportStar(require("./all"), exports);
      exports.__esModule = true;
      exports["a"] = theme_1.default;
      exports.b = tokens;
    "#});

    assert!(summary.is_module_flagged);
    assert_eq!(
      summary.imports,
      vec![
        (Some("theme_1".into()), ImportedName::Default, "./theme".into(), FormKind::Interop),
        (Some("tokens".into()), ImportedName::Namespace, "./tokens".into(), FormKind::Interop),
      ]
    );
    assert_eq!(
      summary.reexports,
      vec![(ExportedName::All, ImportedName::Namespace, "./all".into())]
    );
    assert_eq!(
      summary.exports,
      vec![
        (export("b"), None),
        (export("a"), None),
        (export("a"), None),
        (export("b"), Some("tokens".into())),
      ]
    );
  }

  #[test]
  fn test_collects_module_exports_objects() {
    let summary = run_normalize(indoc! {r#"
      const a = 1;
      module.exports = { a, b: a, 'c': 3 };
      module.exports.d = 4;
    "#});

    assert_eq!(
      summary.exports,
      vec![
        (export("a"), Some("a".into())),
        (export("b"), Some("a".into())),
        (export("c"), None),
        (export("d"), None),
      ]
    );

    let summary = run_normalize("module.exports = createTheme();");
    assert_eq!(summary.exports, vec![(ExportedName::All, None)]);
  }

  #[test]
  fn test_unfolds_namespace_imports() {
    let summary = run_normalize(indoc! {r#"
      import * as ns from 'm';
      use(ns.Title, ns['Subtitle'], ns.Title);
    "#});

    assert_eq!(
      summary.imports,
      vec![
        (Some("Title".into()), named("Title"), "m".into(), FormKind::Static),
        (Some("Subtitle".into()), named("Subtitle"), "m".into(), FormKind::Static),
      ]
    );
    assert_eq!(summary.warnings, 0);
    assert_eq!(
      summary.output_code,
      indoc! {r#"
        import { Title, Subtitle } from 'm';
        use(Title, Subtitle, Title);
      "#}
    );
  }

  #[test]
  fn test_splits_required_namespaces_without_rewriting() {
    let code = indoc! {r#"
      const colors = require('colors');
      const red = '#f00';
      use(colors.red, colors.blue);
    "#};
    let summary = run_normalize(code);

    assert_eq!(
      summary.imports,
      vec![
        (Some("colors".into()), named("red"), "colors".into(), FormKind::Static),
        (Some("colors".into()), named("blue"), "colors".into(), FormKind::Static),
      ]
    );
    assert_eq!(summary.output_code, code);
  }

  #[test]
  #[traced_test]
  fn test_first_matcher_wins_on_overlap() {
    struct Flag;
    impl matchers::Matcher for Flag {
      fn name(&self) -> &'static str {
        "flag"
      }
      fn statement(&self, _expr: &Expr, _cx: &matchers::MatchContext<'_>) -> Option<Vec<matchers::Claim>> {
        Some(vec![matchers::Claim::ModuleFlag])
      }
    }

    struct Nothing;
    impl matchers::Matcher for Nothing {
      fn name(&self) -> &'static str {
        "nothing"
      }
      fn statement(&self, _expr: &Expr, _cx: &matchers::MatchContext<'_>) -> Option<Vec<matchers::Claim>> {
        Some(vec![])
      }
    }

    let cx = matchers::MatchContext {
      unresolved_mark: Mark::root(),
      item_span: DUMMY_SP,
      imports: &[],
    };
    let expr = Expr::Invalid(Invalid { span: DUMMY_SP });

    let flag_first: [&dyn matchers::Matcher; 2] = [&Flag, &Nothing];
    let claims = first_claim(&flag_first, &cx, |matcher, cx| matcher.statement(&expr, cx));
    assert!(matches!(claims.as_deref(), Some([matchers::Claim::ModuleFlag])));
    assert!(logs_contain("Node claimed by more than one matcher"));

    let nothing_first: [&dyn matchers::Matcher; 2] = [&Nothing, &Flag];
    let claims = first_claim(&nothing_first, &cx, |matcher, cx| matcher.statement(&expr, cx));
    assert!(matches!(claims.as_deref(), Some([])));
  }

  #[test]
  fn test_keeps_namespace_with_unclassifiable_reads() {
    for code in [
      "import * as ns from 'm'; use(ns.a, ns);",
      "import * as ns from 'm'; ns.a();",
      "import * as ns from 'm'; ns.a = 1;",
      "import * as ns from 'm'; use(ns[key]);",
    ] {
      let summary = run_normalize(code);
      assert_eq!(
        summary.imports,
        vec![(Some("ns".into()), ImportedName::Namespace, "m".into(), FormKind::Static)],
        "{code}"
      );
      assert_eq!(summary.warnings, 1, "{code}");
    }
  }
}
