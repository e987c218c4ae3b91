//! Independent recognizers for the shapes compilers emit for imports and exports.
//!
//! Every matcher looks at one top-level variable declarator or expression statement and
//! either claims it completely or leaves it alone. No two matchers claim the same node.

use swc_core::atoms::Atom;
use swc_core::common::Mark;
use swc_core::common::Span;
use swc_core::common::Spanned;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::Visit;
use swc_core::ecma::visit::VisitWith;

use super::ExportRecord;
use super::ExportedName;
use super::FormKind;
use super::ImportRecord;
use super::ImportedName;
use super::ReexportRecord;
use crate::id;
use crate::utils::is_exports_object;
use crate::utils::is_unresolved;
use crate::utils::match_member_expr;
use crate::utils::match_prop_name;
use crate::utils::match_property_name;
use crate::utils::match_str;
use crate::utils::unparen;
use crate::utils::Warning;

pub(crate) enum Claim {
  Import(ImportRecord),
  Export(ExportRecord),
  Reexport(ReexportRecord),
  ModuleFlag,
  Warning(Warning),
}

pub(crate) struct MatchContext<'a> {
  pub unresolved_mark: Mark,
  pub item_span: Span,
  /// Imports collected from the statements above
  pub imports: &'a [ImportRecord],
}

impl MatchContext<'_> {
  fn import_for(&self, expr: &Expr) -> Option<&ImportRecord> {
    let Expr::Ident(ident) = unparen(expr) else {
      return None;
    };
    let local = id!(ident);
    self
      .imports
      .iter()
      .find(|import| import.local.as_ref() == Some(&local))
  }
}

pub(crate) trait Matcher: Sync {
  fn name(&self) -> &'static str;

  fn declarator(&self, _decl: &VarDeclarator, _cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    None
  }

  fn statement(&self, _expr: &Expr, _cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    None
  }
}

pub(crate) static MATCHERS: &[&dyn Matcher] = &[
  &RequireMatcher,
  &DynamicImportMatcher,
  &InteropDefaultMatcher,
  &InteropWildcardMatcher,
  &ExportStarMatcher,
  &DefinePropertyMatcher,
  &ExportsAssignMatcher,
];

/// `require('x')` with a static specifier, together with the call span.
pub fn require_call(expr: &Expr, unresolved_mark: Mark) -> Option<(Atom, Span)> {
  let Expr::Call(call) = unparen(expr) else {
    return None;
  };
  require_source(call, unresolved_mark).map(|source| (source, call.span))
}

pub(crate) fn require_source(call: &CallExpr, unresolved_mark: Mark) -> Option<Atom> {
  let Callee::Expr(callee) = &call.callee else {
    return None;
  };

  let is_require = match unparen(callee) {
    Expr::Ident(ident) => &*ident.sym == "require" && is_unresolved(ident, unresolved_mark),
    Expr::Member(member) => match_member_expr(member, &["module", "require"], unresolved_mark),
    _ => false,
  };

  if !is_require || call.args.len() != 1 || call.args[0].spread.is_some() {
    return None;
  }

  match_str(&call.args[0].expr).map(|(value, _)| value)
}

/// `import('x')` with a static specifier, together with the call span.
pub(crate) fn import_call(expr: &Expr) -> Option<(Atom, Span)> {
  let Expr::Call(call) = unparen(expr) else {
    return None;
  };
  import_source(call).map(|source| (source, call.span))
}

pub(crate) fn import_source(call: &CallExpr) -> Option<Atom> {
  if !matches!(call.callee, Callee::Import(_)) || call.args.is_empty() {
    return None;
  }
  match_str(&call.args[0].expr).map(|(value, _)| value)
}

/// Imports bound by `pat` when it receives the namespace of `source`.
fn pat_imports(pat: &Pat, source: &Atom, form: FormKind, span: Span) -> Vec<Claim> {
  let import = |local: &Ident, imported: ImportedName| {
    Claim::Import(ImportRecord {
      local: Some(id!(local)),
      imported,
      source: source.clone(),
      form,
      span,
    })
  };
  let opaque = |pat_span: Span| {
    vec![
      Claim::Import(ImportRecord {
        local: None,
        imported: ImportedName::Namespace,
        source: source.clone(),
        form,
        span,
      }),
      Claim::Warning(Warning::unclassifiable(
        format!("Unable to determine the bindings used from `{source}`"),
        pat_span,
      )),
    ]
  };

  match pat {
    Pat::Ident(ident) => vec![import(&ident.id, ImportedName::Namespace)],
    Pat::Object(object) => {
      let mut claims = vec![];
      for prop in &object.props {
        match prop {
          ObjectPatProp::KeyValue(kv) => {
            let imported = match (&kv.key, &*kv.value) {
              (PropName::Computed(_), _) => None,
              (key, Pat::Ident(ident)) => match_prop_name(key).map(|name| (name, &ident.id)),
              (key, Pat::Assign(AssignPat { left, .. })) => match &**left {
                Pat::Ident(ident) => match_prop_name(key).map(|name| (name, &ident.id)),
                _ => None,
              },
              _ => None,
            };
            match imported {
              Some((name, local)) if &*name == "default" => {
                claims.push(import(local, ImportedName::Default))
              }
              Some((name, local)) => claims.push(import(local, ImportedName::Named(name))),
              None => return opaque(object.span),
            }
          }
          ObjectPatProp::Assign(assign) => claims.push(import(
            &assign.key.id,
            ImportedName::Named(assign.key.id.sym.clone()),
          )),
          ObjectPatProp::Rest(_) => return opaque(object.span),
        }
      }
      claims
    }
    pat => opaque(pat.span()),
  }
}

/// `const x = require('m')`, `const {a} = require('m')`, `const a = require('m').a` and the
/// bare `require('m');` statement.
struct RequireMatcher;

impl Matcher for RequireMatcher {
  fn name(&self) -> &'static str {
    "require"
  }

  fn declarator(&self, decl: &VarDeclarator, cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    let init = decl.init.as_deref()?;

    if let Some((source, span)) = require_call(init, cx.unresolved_mark) {
      return Some(pat_imports(&decl.name, &source, FormKind::Static, span));
    }

    let Expr::Member(member) = unparen(init) else {
      return None;
    };
    let (source, span) = require_call(&member.obj, cx.unresolved_mark)?;
    let claims = match (&decl.name, match_property_name(member)) {
      (Pat::Ident(ident), Some((name, _))) => vec![Claim::Import(ImportRecord {
        local: Some(id!(ident.id)),
        imported: if &*name == "default" {
          ImportedName::Default
        } else {
          ImportedName::Named(name)
        },
        source,
        form: FormKind::Static,
        span,
      })],
      _ => vec![
        Claim::Import(ImportRecord {
          local: None,
          imported: ImportedName::Namespace,
          source: source.clone(),
          form: FormKind::Static,
          span,
        }),
        Claim::Warning(Warning::unclassifiable(
          format!("Unable to determine the binding used from `{source}`"),
          member.span,
        )),
      ],
    };
    Some(claims)
  }

  fn statement(&self, expr: &Expr, cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    let (source, span) = require_call(expr, cx.unresolved_mark)?;
    Some(vec![Claim::Import(ImportRecord {
      local: None,
      imported: ImportedName::SideEffect,
      source,
      form: FormKind::Static,
      span,
    })])
  }
}

/// `const ns = await import('m')`, `const {a} = await import('m')` and
/// `import('m').then(({a}) => …)`.
struct DynamicImportMatcher;

impl Matcher for DynamicImportMatcher {
  fn name(&self) -> &'static str {
    "dynamic-import"
  }

  fn declarator(&self, decl: &VarDeclarator, _cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    let Expr::Await(await_expr) = unparen(decl.init.as_deref()?) else {
      return None;
    };
    let (source, span) = import_call(&await_expr.arg)?;
    Some(pat_imports(&decl.name, &source, FormKind::Dynamic, span))
  }

  fn statement(&self, expr: &Expr, _cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    let Expr::Call(call) = unparen(expr) else {
      return None;
    };
    let Callee::Expr(callee) = &call.callee else {
      return None;
    };
    let Expr::Member(member) = unparen(callee) else {
      return None;
    };
    if !match_property_name(member).is_some_and(|(name, _)| &*name == "then") {
      return None;
    }
    let (source, span) = import_call(&member.obj)?;

    let param = match call.args.first().map(|arg| unparen(&arg.expr)) {
      Some(Expr::Fn(func)) => func.function.params.first().map(|param| &param.pat),
      Some(Expr::Arrow(arrow)) => arrow.params.first(),
      _ => None,
    };

    match param {
      Some(param) => Some(pat_imports(param, &source, FormKind::Dynamic, span)),
      // Handled as an unclassified import by the generic walk
      None => None,
    }
  }
}

fn match_helper_call<'a>(expr: &'a Expr, helpers: &[&str]) -> Option<&'a CallExpr> {
  let Expr::Call(call) = unparen(expr) else {
    return None;
  };
  let Callee::Expr(callee) = &call.callee else {
    return None;
  };
  let name = match unparen(callee) {
    Expr::Ident(ident) => ident.sym.clone(),
    // `(0, _helpers.interopRequireDefault)(…)` and `_helpers.default(…)`
    Expr::Seq(seq) => match seq.exprs.last().map(|expr| unparen(expr)) {
      Some(Expr::Member(member)) => match_property_name(member)?.0,
      _ => return None,
    },
    Expr::Member(member) => match_property_name(member)?.0,
    _ => return None,
  };
  helpers.contains(&&*name).then_some(call)
}

fn interop_import(
  decl: &VarDeclarator,
  cx: &MatchContext<'_>,
  helpers: &[&str],
  imported: ImportedName,
) -> Option<Vec<Claim>> {
  let call = match_helper_call(decl.init.as_deref()?, helpers)?;
  let (source, span) = require_call(&call.args.first()?.expr, cx.unresolved_mark)?;
  let Pat::Ident(local) = &decl.name else {
    return None;
  };
  Some(vec![Claim::Import(ImportRecord {
    local: Some(id!(local.id)),
    imported,
    source,
    form: FormKind::Interop,
    span,
  })])
}

/// `var _m = _interopRequireDefault(require('m'))` and `__importDefault(require('m'))`
struct InteropDefaultMatcher;

impl Matcher for InteropDefaultMatcher {
  fn name(&self) -> &'static str {
    "interop-default"
  }

  fn declarator(&self, decl: &VarDeclarator, cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    interop_import(
      decl,
      cx,
      &[
        "_interopRequireDefault",
        "interopRequireDefault",
        "_interop_require_default",
        "__importDefault",
      ],
      ImportedName::Default,
    )
  }
}

/// `var _m = _interopRequireWildcard(require('m'))` and `__importStar(require('m'))`
struct InteropWildcardMatcher;

impl Matcher for InteropWildcardMatcher {
  fn name(&self) -> &'static str {
    "interop-wildcard"
  }

  fn declarator(&self, decl: &VarDeclarator, cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    interop_import(
      decl,
      cx,
      &[
        "_interopRequireWildcard",
        "interopRequireWildcard",
        "_interop_require_wildcard",
        "__importStar",
      ],
      ImportedName::Namespace,
    )
  }
}

/// `_exportStar(require('m'), exports)` and friends, plus Babel's
/// `Object.keys(_m).forEach(function (key) { … exports[key] … })`.
struct ExportStarMatcher;

impl Matcher for ExportStarMatcher {
  fn name(&self) -> &'static str {
    "export-star"
  }

  fn statement(&self, expr: &Expr, cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    if let Some(call) = match_helper_call(
      expr,
      &["_exportStar", "exportStar", "_export_star", "__exportStar"],
    ) {
      let [module, target] = call.args.as_slice() else {
        return None;
      };
      if !is_exports_object(&target.expr, cx.unresolved_mark) {
        return None;
      }
      let (source, span) = match require_call(&module.expr, cx.unresolved_mark) {
        Some(found) => found,
        None => {
          let import = cx.import_for(&module.expr)?;
          (import.source.clone(), cx.item_span)
        }
      };
      return Some(vec![Claim::Reexport(ReexportRecord {
        exported: ExportedName::All,
        imported: ImportedName::Namespace,
        source,
        span,
      })]);
    }

    // Object.keys(_m).forEach(function (key) { … })
    let Expr::Call(for_each) = unparen(expr) else {
      return None;
    };
    let Callee::Expr(callee) = &for_each.callee else {
      return None;
    };
    let Expr::Member(for_each_member) = unparen(callee) else {
      return None;
    };
    if !match_property_name(for_each_member).is_some_and(|(name, _)| &*name == "forEach") {
      return None;
    }
    let Expr::Call(keys) = unparen(&for_each_member.obj) else {
      return None;
    };
    let Callee::Expr(keys_callee) = &keys.callee else {
      return None;
    };
    let Expr::Member(keys_member) = unparen(keys_callee) else {
      return None;
    };
    if !match_member_expr(keys_member, &["Object", "keys"], cx.unresolved_mark) {
      return None;
    }
    let import = cx.import_for(&keys.args.first()?.expr)?;
    let callback = &for_each.args.first()?.expr;
    if !mentions_exports(callback, cx.unresolved_mark) {
      return None;
    }

    Some(vec![Claim::Reexport(ReexportRecord {
      exported: ExportedName::All,
      imported: ImportedName::Namespace,
      source: import.source.clone(),
      span: cx.item_span,
    })])
  }
}

fn mentions_exports(expr: &Expr, unresolved_mark: Mark) -> bool {
  struct Finder {
    unresolved_mark: Mark,
    found: bool,
  }

  impl Visit for Finder {
    fn visit_ident(&mut self, ident: &Ident) {
      if &*ident.sym == "exports" && is_unresolved(ident, self.unresolved_mark) {
        self.found = true;
      }
    }
  }

  let mut finder = Finder {
    unresolved_mark,
    found: false,
  };
  expr.visit_with(&mut finder);
  finder.found
}

/// `Object.defineProperty(exports, 'name', descriptor)`, including the `__esModule` flag.
struct DefinePropertyMatcher;

impl Matcher for DefinePropertyMatcher {
  fn name(&self) -> &'static str {
    "define-property"
  }

  fn statement(&self, expr: &Expr, cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    let Expr::Call(call) = unparen(expr) else {
      return None;
    };
    let Callee::Expr(callee) = &call.callee else {
      return None;
    };
    let Expr::Member(member) = unparen(callee) else {
      return None;
    };
    if !match_member_expr(member, &["Object", "defineProperty"], cx.unresolved_mark) {
      return None;
    }
    let [target, name, descriptor] = call.args.as_slice() else {
      return None;
    };
    if !is_exports_object(&target.expr, cx.unresolved_mark) {
      return None;
    }
    let (name, _) = match_str(&name.expr)?;

    if &*name == "__esModule" {
      return Some(vec![Claim::ModuleFlag]);
    }

    let Expr::Object(descriptor) = unparen(&descriptor.expr) else {
      return Some(vec![export_claim(name, None, cx.item_span)]);
    };

    for prop in &descriptor.props {
      let PropOrSpread::Prop(prop) = prop else {
        continue;
      };
      match &**prop {
        Prop::KeyValue(kv) if match_prop_name(&kv.key).is_some_and(|key| &*key == "value") => {
          return Some(vec![export_claim(name, local_of(&kv.value), cx.item_span)]);
        }
        Prop::KeyValue(kv) if match_prop_name(&kv.key).is_some_and(|key| &*key == "get") => {
          let returned = match unparen(&kv.value) {
            Expr::Fn(func) => func.function.body.as_ref().and_then(single_return),
            Expr::Arrow(arrow) => match &*arrow.body {
              BlockStmtOrExpr::Expr(expr) => Some(&**expr),
              BlockStmtOrExpr::BlockStmt(block) => single_return(block),
            },
            _ => None,
          };
          return Some(getter_claims(name, returned, cx));
        }
        Prop::Method(method) if match_prop_name(&method.key).is_some_and(|key| &*key == "get") => {
          let returned = method.function.body.as_ref().and_then(single_return);
          return Some(getter_claims(name, returned, cx));
        }
        _ => {}
      }
    }

    Some(vec![export_claim(name, None, cx.item_span)])
  }
}

fn single_return(block: &BlockStmt) -> Option<&Expr> {
  match block.stmts.as_slice() {
    [Stmt::Return(ReturnStmt { arg: Some(arg), .. })] => Some(arg),
    _ => None,
  }
}

/// A getter returning a member of an import re-exports it; anything else is a local export.
fn getter_claims(name: Atom, returned: Option<&Expr>, cx: &MatchContext<'_>) -> Vec<Claim> {
  let reexport = returned.and_then(|returned| match unparen(returned) {
    Expr::Member(member) => {
      let import = cx.import_for(&member.obj)?;
      let (property, _) = match_property_name(member)?;
      match import.imported {
        ImportedName::Namespace => Some((import, ImportedName::Named(property))),
        ImportedName::Default if &*property == "default" => Some((import, ImportedName::Default)),
        _ => None,
      }
    }
    expr @ Expr::Ident(_) => {
      let import = cx.import_for(expr)?;
      match &import.imported {
        ImportedName::Named(_) | ImportedName::Default => Some((import, import.imported.clone())),
        _ => None,
      }
    }
    _ => None,
  });

  match reexport {
    Some((import, imported)) => vec![Claim::Reexport(ReexportRecord {
      exported: ExportedName::from_atom(name),
      imported,
      source: import.source.clone(),
      span: cx.item_span,
    })],
    None => vec![export_claim(
      name,
      returned.and_then(local_of),
      cx.item_span,
    )],
  }
}

fn local_of(expr: &Expr) -> Option<Id> {
  match unparen(expr) {
    Expr::Ident(ident) => Some(id!(ident)),
    _ => None,
  }
}

fn export_claim(name: Atom, local: Option<Id>, span: Span) -> Claim {
  Claim::Export(ExportRecord {
    exported: ExportedName::from_atom(name),
    local,
    span,
  })
}

/// `exports.a = …`, `module.exports.a = …`, `exports['a'] = …`, chains of those,
/// `module.exports = { … }`, `module.exports = <expr>` and `exports.__esModule = true`.
struct ExportsAssignMatcher;

impl Matcher for ExportsAssignMatcher {
  fn name(&self) -> &'static str {
    "exports-assign"
  }

  fn statement(&self, expr: &Expr, cx: &MatchContext<'_>) -> Option<Vec<Claim>> {
    let mut claims = vec![];
    let mut current = unparen(expr);

    while let Expr::Assign(assign) = current {
      if assign.op != AssignOp::Assign {
        break;
      }
      let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &assign.left else {
        break;
      };

      if match_member_expr(member, &["module", "exports"], cx.unresolved_mark) {
        claims.extend(module_exports_claims(&assign.right, cx));
        current = unparen(&assign.right);
        break;
      }

      if !is_exports_object(&member.obj, cx.unresolved_mark) {
        break;
      }
      let (name, _) = match_property_name(member)?;
      if &*name == "__esModule" {
        claims.push(Claim::ModuleFlag);
      } else {
        claims.push(export_claim(name, None, cx.item_span));
      }
      current = unparen(&assign.right);
    }

    if claims.is_empty() {
      return None;
    }

    // The last assigned value is the exported one: `exports.a = exports.b = value`
    if let Some(local) = local_of(current) {
      for claim in claims.iter_mut() {
        if let Claim::Export(ExportRecord {
          local: export_local @ None,
          exported: ExportedName::Named(_) | ExportedName::Default,
          ..
        }) = claim
        {
          *export_local = Some(local.clone());
        }
      }
    }

    Some(claims)
  }
}

fn module_exports_claims(value: &Expr, cx: &MatchContext<'_>) -> Vec<Claim> {
  let Expr::Object(object) = unparen(value) else {
    return vec![Claim::Export(ExportRecord {
      exported: ExportedName::All,
      local: local_of(value),
      span: cx.item_span,
    })];
  };

  let mut claims = vec![];
  for prop in &object.props {
    let named = match prop {
      PropOrSpread::Prop(prop) => match &**prop {
        Prop::Shorthand(ident) => Some((ident.sym.clone(), Some(id!(ident)), ident.span)),
        Prop::KeyValue(kv) => match_prop_name(&kv.key)
          .map(|name| (name, local_of(&kv.value), prop.span())),
        Prop::Method(method) => match_prop_name(&method.key)
          .map(|name| (name, None, prop.span())),
        _ => None,
      },
      PropOrSpread::Spread(_) => None,
    };

    match named {
      Some((name, local, span)) => claims.push(export_claim(name, local, span)),
      // A spread or computed key makes the export set unknowable
      None => {
        return vec![Claim::Export(ExportRecord {
          exported: ExportedName::All,
          local: None,
          span: cx.item_span,
        })]
      }
    }
  }
  claims
}
