use std::collections::HashSet;

use swc_core::atoms::Atom;
use swc_core::common::Mark;
use swc_core::common::Span;
use swc_core::common::SyntaxContext;
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::Visit;
use swc_core::ecma::visit::VisitWith;

#[macro_export]
macro_rules! id {
  ($ident: expr) => {
    $ident.to_id()
  };
}

/// A non-fatal diagnostic raised while analyzing a module.
///
/// Whenever a warning is produced the affected code is retained as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Warning {
  pub kind: WarningKind,
  pub message: String,
  pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarningKind {
  UnclassifiablePattern,
}

impl Warning {
  pub fn unclassifiable(message: impl Into<String>, span: Span) -> Self {
    let warning = Warning {
      kind: WarningKind::UnclassifiablePattern,
      message: message.into(),
      span,
    };
    tracing::warn!(span = ?warning.span, "{}", warning.message);
    warning
  }
}

pub fn is_unresolved(ident: &Ident, unresolved_mark: Mark) -> bool {
  ident.ctxt.outer() == unresolved_mark
}

pub fn unparen(expr: &Expr) -> &Expr {
  match expr {
    Expr::Paren(paren) => unparen(&paren.expr),
    _ => expr,
  }
}

/// Returns the string value of a string literal or of a template literal without expressions.
pub fn match_str(node: &Expr) -> Option<(Atom, Span)> {
  match unparen(node) {
    Expr::Lit(Lit::Str(str_lit)) => Some((str_lit.value.clone(), str_lit.span)),
    Expr::Tpl(tpl) if tpl.exprs.is_empty() && tpl.quasis.len() == 1 => {
      let quasi = &tpl.quasis[0];
      let value = quasi.cooked.clone().unwrap_or_else(|| quasi.raw.clone());
      Some((value, tpl.span))
    }
    _ => None,
  }
}

/// Formats a numeric property key the way JavaScript coerces it to a string.
pub fn number_to_key(value: f64) -> Atom {
  if value.fract() == 0.0 && value.abs() < 1e21 {
    format!("{}", value as i64).into()
  } else {
    format!("{}", value).into()
  }
}

pub fn match_prop_name(key: &PropName) -> Option<Atom> {
  match key {
    PropName::Ident(ident) => Some(ident.sym.clone()),
    PropName::Str(str_lit) => Some(str_lit.value.clone()),
    PropName::Num(num) => Some(number_to_key(num.value)),
    PropName::Computed(computed) => match_str(&computed.expr).map(|(value, _)| value),
    PropName::BigInt(_) => None,
  }
}

/// Returns the statically known name of a member property (`a.b`, `a['b']`).
pub fn match_property_name(node: &MemberExpr) -> Option<(Atom, Span)> {
  match &node.prop {
    MemberProp::Ident(ident) => Some((ident.sym.clone(), ident.span)),
    MemberProp::Computed(computed) => match unparen(&computed.expr) {
      Expr::Lit(Lit::Num(num)) => Some((number_to_key(num.value), num.span)),
      expr => match_str(expr),
    },
    MemberProp::PrivateName(_) => None,
  }
}

pub fn match_export_name(name: &ModuleExportName) -> (Atom, Span) {
  match name {
    ModuleExportName::Ident(ident) => (ident.sym.clone(), ident.span),
    ModuleExportName::Str(s) => (s.value.clone(), s.span),
  }
}

pub fn match_export_name_ident(name: &ModuleExportName) -> Option<&Ident> {
  match name {
    ModuleExportName::Ident(ident) => Some(ident),
    ModuleExportName::Str(_) => None,
  }
}

/// Matches a member expression against a chain of unresolved identifiers and static
/// properties, e.g. `["module", "exports"]`.
pub fn match_member_expr(expr: &MemberExpr, idents: &[&str], unresolved_mark: Mark) -> bool {
  let Some((last, rest)) = idents.split_last() else {
    return false;
  };

  match match_property_name(expr) {
    Some((prop, _)) if &*prop == *last => {}
    _ => return false,
  }

  match unparen(&expr.obj) {
    Expr::Member(member) => match_member_expr(member, rest, unresolved_mark),
    Expr::Ident(ident) => {
      rest.len() == 1 && &*ident.sym == rest[0] && is_unresolved(ident, unresolved_mark)
    }
    _ => false,
  }
}

/// `exports` or `module.exports`
pub fn is_exports_object(expr: &Expr, unresolved_mark: Mark) -> bool {
  match unparen(expr) {
    Expr::Ident(ident) => &*ident.sym == "exports" && is_unresolved(ident, unresolved_mark),
    Expr::Member(member) => match_member_expr(member, &["module", "exports"], unresolved_mark),
    _ => false,
  }
}

/// Matches `require('x')` (and `module.require('x')`) calls with a static specifier.
pub fn match_require(node: &Expr, unresolved_mark: Mark) -> Option<Atom> {
  let Expr::Call(call) = unparen(node) else {
    return None;
  };
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

/// Matches dynamic `import('x')` calls with a static specifier.
pub fn match_import(node: &Expr) -> Option<Atom> {
  let Expr::Call(call) = unparen(node) else {
    return None;
  };

  if !matches!(call.callee, Callee::Import(_)) || call.args.is_empty() {
    return None;
  }

  match_str(&call.args[0].expr).map(|(value, _)| value)
}

/// Follows member accesses and parentheses down to the root identifier:
/// `a.b[c].d` -> `a`.
pub fn member_root(expr: &Expr) -> Option<&Ident> {
  match unparen(expr) {
    Expr::Ident(ident) => Some(ident),
    Expr::Member(member) => member_root(&member.obj),
    Expr::OptChain(opt) => match &*opt.base {
      OptChainBase::Member(member) => member_root(&member.obj),
      OptChainBase::Call(_) => None,
    },
    Expr::TsNonNull(non_null) => member_root(&non_null.expr),
    Expr::TsAs(as_expr) => member_root(&as_expr.expr),
    _ => None,
  }
}

/// Calls `f` for every binding identifier introduced by `pat`.
pub fn collect_bindings_from_pat<F>(pat: &Pat, f: &mut F)
where
  F: FnMut(&Ident),
{
  match pat {
    Pat::Ident(ident) => f(&ident.id),
    Pat::Array(arr) => {
      for elem in arr.elems.iter().flatten() {
        collect_bindings_from_pat(elem, f);
      }
    }
    Pat::Object(obj) => {
      for prop in &obj.props {
        match prop {
          ObjectPatProp::KeyValue(kv) => collect_bindings_from_pat(&kv.value, f),
          ObjectPatProp::Assign(assign) => f(&assign.key.id),
          ObjectPatProp::Rest(rest) => collect_bindings_from_pat(&rest.arg, f),
        }
      }
    }
    Pat::Rest(rest) => collect_bindings_from_pat(&rest.arg, f),
    Pat::Assign(assign) => collect_bindings_from_pat(&assign.left, f),
    _ => {}
  }
}

pub fn pat_binding_ids(pat: &Pat) -> Vec<Id> {
  let mut ids = vec![];
  collect_bindings_from_pat(pat, &mut |ident| ids.push(ident.to_id()));
  ids
}

pub fn create_require(src: Atom, unresolved_mark: Mark) -> CallExpr {
  CallExpr {
    callee: Callee::Expr(Box::new(Expr::Ident(Ident::new(
      "require".into(),
      DUMMY_SP,
      SyntaxContext::empty().apply_mark(unresolved_mark),
    )))),
    args: vec![ExprOrSpread {
      expr: Box::new(Expr::Lit(Lit::Str(src.into()))),
      spread: None,
    }],
    span: DUMMY_SP,
    ctxt: SyntaxContext::empty(),
    type_args: None,
  }
}

/// `exports.<name> = <value>;`
pub fn create_exports_assign(name: Atom, value: Expr, unresolved_mark: Mark) -> ModuleItem {
  ModuleItem::Stmt(Stmt::Expr(ExprStmt {
    expr: Box::new(Expr::Assign(AssignExpr {
      op: AssignOp::Assign,
      left: AssignTarget::Simple(SimpleAssignTarget::Member(MemberExpr {
        obj: Box::new(Expr::Ident(Ident::new(
          "exports".into(),
          DUMMY_SP,
          SyntaxContext::empty().apply_mark(unresolved_mark),
        ))),
        prop: MemberProp::Ident(IdentName::new(name, DUMMY_SP)),
        span: DUMMY_SP,
      })),
      right: Box::new(value),
      span: DUMMY_SP,
    })),
    span: DUMMY_SP,
  }))
}

/// Every identifier name used anywhere in `module`, bindings or not.
pub fn taken_names(module: &Module) -> HashSet<Atom> {
  struct Names(HashSet<Atom>);

  impl Visit for Names {
    fn visit_ident(&mut self, ident: &Ident) {
      self.0.insert(ident.sym.clone());
    }
  }

  let mut names = Names(HashSet::new());
  module.visit_with(&mut names);
  names.0
}

pub fn span_contains(outer: Span, inner: Span) -> bool {
  !outer.is_dummy() && !inner.is_dummy() && outer.lo <= inner.lo && inner.hi <= outer.hi
}
