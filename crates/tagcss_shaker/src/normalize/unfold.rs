//! Unfolds namespace imports that are only read through static member accesses.
//!
//! `import * as ns from 'm'; ns.a` is rewritten to `import { a } from 'm'; a`, which keeps
//! the live binding. A namespace object obtained from `require()` stays as it is, since
//! destructuring it would copy its values. Only its import records are split per name.

use std::collections::HashMap;
use std::collections::HashSet;

use indexmap::IndexMap;
use swc_core::atoms::Atom;
use swc_core::common::Span;
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::noop_visit_mut_type;
use swc_core::ecma::visit::noop_visit_type;
use swc_core::ecma::visit::Visit;
use swc_core::ecma::visit::VisitMut;
use swc_core::ecma::visit::VisitMutWith;
use swc_core::ecma::visit::VisitWith;

use super::FormKind;
use super::ImportRecord;
use super::ImportedName;
use super::NormalizedModule;
use crate::id;
use crate::scope::BindingKind;
use crate::scope::ScopeTree;
use crate::utils::match_property_name;
use crate::utils::taken_names;
use crate::utils::Warning;

struct Read {
  name: Atom,
  /// Span of the namespace identifier
  ident_span: Span,
  /// Span of the whole member expression, which the replacement identifier takes over
  member_span: Span,
}

pub(super) fn unfold_namespaces(module: &mut Module, normalized: &mut NormalizedModule) {
  let candidates: Vec<usize> = normalized
    .imports
    .iter()
    .enumerate()
    .filter(|(_, import)| {
      import.imported == ImportedName::Namespace
        && import.local.is_some()
        && import.form != FormKind::Dynamic
    })
    .map(|(index, _)| index)
    .collect();

  if candidates.is_empty() {
    return;
  }

  let mut taken = taken_names(module);

  // Walk backwards so that splicing records does not shift the remaining candidates
  for index in candidates.into_iter().rev() {
    let record = normalized.imports[index].clone();
    let Some(local) = record.local.clone() else {
      continue;
    };

    let mut reads = NamespaceReads {
      target: local.clone(),
      reads: vec![],
      unclassified: vec![],
    };
    module.visit_with(&mut reads);

    if let Some(span) = reads.unclassified.first() {
      normalized.warnings.push(Warning::unclassifiable(
        format!(
          "Namespace `{}` of `{}` is used as a whole and cannot be unfolded",
          local.0, record.source
        ),
        *span,
      ));
      continue;
    }
    if reads.reads.is_empty() {
      continue;
    }

    if !is_import_declaration(module, &local) {
      let mut seen = HashSet::new();
      let named: Vec<ImportRecord> = reads
        .reads
        .iter()
        .filter(|read| seen.insert(read.name.clone()))
        .map(|read| ImportRecord {
          imported: ImportedName::Named(read.name.clone()),
          ..record.clone()
        })
        .collect();
      tracing::debug!(
        namespace = %local.0,
        source = %record.source,
        names = named.len(),
        "Split namespace import records"
      );
      normalized.imports.splice(index..=index, named);
      continue;
    }

    let mut names: IndexMap<Atom, Ident> = IndexMap::new();
    for read in &reads.reads {
      if !names.contains_key(&read.name) {
        let local_name = fresh_name(&read.name, &mut taken);
        names.insert(
          read.name.clone(),
          Ident::new(local_name, DUMMY_SP, local.1),
        );
      }
    }

    if !rewrite_declaration(module, &local, &names) {
      continue;
    }

    let replacements: HashMap<Span, Ident> = reads
      .reads
      .iter()
      .filter_map(|read| {
        names.get(&read.name).map(|ident| {
          let mut ident = ident.clone();
          ident.span = read.member_span;
          (read.member_span, ident)
        })
      })
      .collect();
    module.visit_mut_with(&mut ReplaceReads {
      target: local.clone(),
      replacements,
    });

    update_scopes(&mut normalized.scopes, &local, &reads.reads, &names);

    let unfolded = names.iter().map(|(name, ident)| ImportRecord {
      local: Some(id!(ident)),
      imported: ImportedName::Named(name.clone()),
      source: record.source.clone(),
      form: record.form,
      span: record.span,
    });
    normalized.imports.splice(index..=index, unfolded);

    tracing::debug!(
      namespace = %local.0,
      source = %record.source,
      names = names.len(),
      "Unfolded namespace import"
    );
  }
}

fn update_scopes(
  scopes: &mut ScopeTree,
  namespace: &Id,
  reads: &[Read],
  names: &IndexMap<Atom, Ident>,
) {
  let Some(binding) = scopes.lookup(namespace) else {
    return;
  };
  let declaring_span = scopes.binding(binding).declaring_span;

  let declared: HashMap<Atom, _> = names
    .iter()
    .map(|(name, ident)| {
      let id = scopes.declare(
        ScopeTree::MODULE_SCOPE,
        ident,
        BindingKind::Module,
        declaring_span,
      );
      (name.clone(), id)
    })
    .collect();

  for read in reads {
    let scope = scopes
      .binding(binding)
      .references
      .get(&read.ident_span)
      .copied()
      .unwrap_or(ScopeTree::MODULE_SCOPE);
    scopes.remove_reference(binding, read.ident_span);
    if let Some(unfolded) = declared.get(&read.name) {
      scopes.add_reference(*unfolded, read.member_span, scope);
    }
  }

  scopes.retire(binding);
}

/// Picks `name` when it is a free, valid identifier, `_name` (with a numeric suffix if
/// needed) otherwise.
fn fresh_name(name: &Atom, taken: &mut HashSet<Atom>) -> Atom {
  let sanitized: String = name
    .chars()
    .map(|c| if c.is_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
    .collect();

  let mut candidates = vec![];
  if Ident::verify_symbol(name).is_ok() {
    candidates.push(name.to_string());
  }
  candidates.push(format!("_{sanitized}"));

  for candidate in candidates {
    let atom: Atom = candidate.into();
    if !taken.contains(&atom) {
      taken.insert(atom.clone());
      return atom;
    }
  }

  let mut suffix = 2;
  loop {
    let atom: Atom = format!("_{sanitized}{suffix}").into();
    if taken.insert(atom.clone()) {
      return atom;
    }
    suffix += 1;
  }
}

fn is_import_declaration(module: &Module, namespace: &Id) -> bool {
  module.body.iter().any(|item| {
    matches!(
      item,
      ModuleItem::ModuleDecl(ModuleDecl::Import(import))
        if import.specifiers.iter().any(|specifier| {
          matches!(specifier, ImportSpecifier::Namespace(ns) if id!(ns.local) == *namespace)
        })
    )
  })
}

fn rewrite_declaration(module: &mut Module, namespace: &Id, names: &IndexMap<Atom, Ident>) -> bool {
  for item in module.body.iter_mut() {
    let ModuleItem::ModuleDecl(ModuleDecl::Import(import)) = item else {
      continue;
    };
    let Some(position) = import.specifiers.iter().position(|specifier| {
      matches!(specifier, ImportSpecifier::Namespace(ns) if id!(ns.local) == *namespace)
    }) else {
      continue;
    };

    let named = names.iter().map(|(name, local)| {
      let imported = if local.sym == *name {
        None
      } else if Ident::verify_symbol(name).is_ok() {
        Some(ModuleExportName::Ident(Ident::new_no_ctxt(
          name.clone(),
          DUMMY_SP,
        )))
      } else {
        Some(ModuleExportName::Str(Str {
          span: DUMMY_SP,
          value: name.clone(),
          raw: None,
        }))
      };
      ImportSpecifier::Named(ImportNamedSpecifier {
        span: DUMMY_SP,
        local: local.clone(),
        imported,
        is_type_only: false,
      })
    });
    import.specifiers.splice(position..=position, named);
    return true;
  }
  false
}

/// Classifies every read of a namespace binding.
struct NamespaceReads {
  target: Id,
  reads: Vec<Read>,
  unclassified: Vec<Span>,
}

impl NamespaceReads {
  fn is_target(&self, expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(ident) if id!(ident) == self.target)
  }

  fn is_target_member(&self, expr: &Expr) -> bool {
    matches!(expr, Expr::Member(member) if self.is_target(&member.obj))
  }
}

impl Visit for NamespaceReads {
  noop_visit_type!();

  fn visit_import_decl(&mut self, _node: &ImportDecl) {}

  fn visit_var_declarator(&mut self, node: &VarDeclarator) {
    match &node.name {
      Pat::Ident(ident) if id!(ident.id) == self.target => node.init.visit_with(self),
      _ => node.visit_children_with(self),
    }
  }

  fn visit_member_expr(&mut self, node: &MemberExpr) {
    if self.is_target(&node.obj) {
      match match_property_name(node) {
        Some((name, _)) => {
          let Expr::Ident(ident) = &*node.obj else {
            return;
          };
          self.reads.push(Read {
            name,
            ident_span: ident.span,
            member_span: node.span,
          });
        }
        None => self.unclassified.push(node.span),
      }
      return;
    }
    node.visit_children_with(self);
  }

  fn visit_call_expr(&mut self, node: &CallExpr) {
    if let Callee::Expr(callee) = &node.callee {
      if self.is_target_member(callee) {
        self.unclassified.push(node.span);
        node.args.visit_with(self);
        return;
      }
    }
    node.visit_children_with(self);
  }

  fn visit_tagged_tpl(&mut self, node: &TaggedTpl) {
    if self.is_target_member(&node.tag) {
      self.unclassified.push(node.span);
      node.tpl.visit_with(self);
      return;
    }
    node.visit_children_with(self);
  }

  fn visit_assign_expr(&mut self, node: &AssignExpr) {
    if let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &node.left {
      if self.is_target(&member.obj) {
        self.unclassified.push(node.span);
        node.right.visit_with(self);
        return;
      }
    }
    node.visit_children_with(self);
  }

  fn visit_update_expr(&mut self, node: &UpdateExpr) {
    if self.is_target_member(&node.arg) {
      self.unclassified.push(node.span);
      return;
    }
    node.visit_children_with(self);
  }

  fn visit_unary_expr(&mut self, node: &UnaryExpr) {
    if node.op == UnaryOp::Delete && self.is_target_member(&node.arg) {
      self.unclassified.push(node.span);
      return;
    }
    node.visit_children_with(self);
  }

  fn visit_opt_chain_expr(&mut self, node: &OptChainExpr) {
    if let OptChainBase::Member(member) = &*node.base {
      if self.is_target(&member.obj) {
        self.unclassified.push(node.span);
        return;
      }
    }
    node.visit_children_with(self);
  }

  fn visit_ident(&mut self, node: &Ident) {
    if id!(node) == self.target {
      self.unclassified.push(node.span);
    }
  }
}

struct ReplaceReads {
  target: Id,
  replacements: HashMap<Span, Ident>,
}

impl VisitMut for ReplaceReads {
  noop_visit_mut_type!();

  fn visit_mut_expr(&mut self, node: &mut Expr) {
    if let Expr::Member(member) = node {
      if matches!(&*member.obj, Expr::Ident(ident) if id!(ident) == self.target) {
        if let Some(replacement) = self.replacements.get(&member.span) {
          *node = Expr::Ident(replacement.clone());
          return;
        }
      }
    }
    node.visit_mut_children_with(self);
  }
}
