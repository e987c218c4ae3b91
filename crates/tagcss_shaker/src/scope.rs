//! Lexical scopes and bindings on top of a resolved swc module.
//!
//! The swc resolver already gives every identifier a syntax context, so two identifiers
//! refer to the same binding exactly when their `Id`s are equal. This module records the
//! scope hierarchy around those bindings and every place they are referenced. Scopes and
//! bindings live in arenas and point at each other through indices.

use std::collections::HashMap;

use indexmap::IndexMap;
use swc_core::atoms::Atom;
use swc_core::common::Span;
use swc_core::common::Spanned;
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::Visit;
use swc_core::ecma::visit::VisitWith;

use crate::utils::span_contains;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
  Module,
  Function,
  Block,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingKind {
  /// Introduced by an import declaration
  Module,
  Const,
  /// `let` and class declarations
  Let,
  Var,
  Function,
  Param,
  /// `var` declared in a nested block and hoisted to the enclosing function scope
  Hoisted,
}

#[derive(Debug)]
pub struct Scope {
  pub parent: Option<ScopeId>,
  pub kind: ScopeKind,
  pub depth: usize,
  pub bindings: IndexMap<Atom, BindingId>,
}

#[derive(Debug)]
pub struct Binding {
  pub name: Atom,
  pub id: Id,
  pub kind: BindingKind,
  pub declaring_span: Span,
  pub scope: ScopeId,
  /// Reference span -> scope the reference occurs in, in source order
  pub references: IndexMap<Span, ScopeId>,
}

#[derive(Debug, Default)]
pub struct ScopeTree {
  scopes: Vec<Scope>,
  bindings: Vec<Binding>,
  by_id: HashMap<Id, BindingId>,
}

impl ScopeTree {
  pub const MODULE_SCOPE: ScopeId = ScopeId(0);

  pub fn build(module: &Module) -> Self {
    let mut builder = ScopeBuilder {
      tree: ScopeTree::default(),
      stack: vec![],
      pending: vec![],
      item_span: DUMMY_SP,
    };
    module.visit_with(&mut builder);
    builder.tree
  }

  pub fn scope(&self, id: ScopeId) -> &Scope {
    &self.scopes[id.0 as usize]
  }

  pub fn binding(&self, id: BindingId) -> &Binding {
    &self.bindings[id.0 as usize]
  }

  /// Live bindings in declaration order.
  pub fn bindings(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
    self
      .bindings
      .iter()
      .enumerate()
      .map(|(index, binding)| (BindingId(index as u32), binding))
      .filter(|(id, binding)| self.by_id.get(&binding.id) == Some(id))
  }

  pub fn lookup(&self, id: &Id) -> Option<BindingId> {
    self.by_id.get(id).copied()
  }

  pub fn top_level_bindings(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
    self
      .bindings()
      .filter(|(_, binding)| binding.scope == Self::MODULE_SCOPE)
  }

  pub fn is_top_level(&self, id: &Id) -> bool {
    self
      .lookup(id)
      .is_some_and(|binding| self.binding(binding).scope == Self::MODULE_SCOPE)
  }

  /// Key of the form `scopeDepth:name`, unique among the bindings of one scope level.
  pub fn binding_key(&self, id: BindingId) -> String {
    let binding = self.binding(id);
    format!("{}:{}", self.scope(binding.scope).depth, binding.name)
  }

  pub fn is_ancestor(&self, ancestor: ScopeId, scope: ScopeId) -> bool {
    let mut current = Some(scope);
    while let Some(id) = current {
      if id == ancestor {
        return true;
      }
      current = self.scope(id).parent;
    }
    false
  }

  pub fn declare(
    &mut self,
    scope: ScopeId,
    ident: &Ident,
    kind: BindingKind,
    declaring_span: Span,
  ) -> BindingId {
    if let Some(existing) = self.by_id.get(&ident.to_id()) {
      // `var a; var a;` and function redeclarations share one binding
      return *existing;
    }

    let id = BindingId(self.bindings.len() as u32);
    self.bindings.push(Binding {
      name: ident.sym.clone(),
      id: ident.to_id(),
      kind,
      declaring_span,
      scope,
      references: IndexMap::new(),
    });
    self.by_id.insert(ident.to_id(), id);
    self.scopes[scope.0 as usize]
      .bindings
      .insert(ident.sym.clone(), id);
    id
  }

  /// Drops a binding whose declaration was rewritten away. Its arena slot stays so other
  /// `BindingId`s remain valid.
  pub fn retire(&mut self, binding: BindingId) {
    let (id, name, scope) = {
      let binding = self.binding(binding);
      (binding.id.clone(), binding.name.clone(), binding.scope)
    };
    self.by_id.remove(&id);
    self.scopes[scope.0 as usize].bindings.shift_remove(&name);
    self.bindings[binding.0 as usize].references.clear();
  }

  pub fn add_reference(&mut self, binding: BindingId, span: Span, scope: ScopeId) {
    debug_assert!(self.is_ancestor(self.binding(binding).scope, scope));
    self.bindings[binding.0 as usize]
      .references
      .insert(span, scope);
  }

  pub fn remove_reference(&mut self, binding: BindingId, span: Span) -> bool {
    self.bindings[binding.0 as usize]
      .references
      .shift_remove(&span)
      .is_some()
  }

  /// Number of references outside all of the `excluded` spans.
  pub fn live_references(&self, binding: BindingId, excluded: &[Span]) -> usize {
    self
      .binding(binding)
      .references
      .keys()
      .filter(|span| !excluded.iter().any(|excluded| span_contains(*excluded, **span)))
      .count()
  }

  fn push_scope(&mut self, parent: Option<ScopeId>, kind: ScopeKind) -> ScopeId {
    let depth = parent.map_or(0, |parent| self.scope(parent).depth + 1);
    let id = ScopeId(self.scopes.len() as u32);
    self.scopes.push(Scope {
      parent,
      kind,
      depth,
      bindings: IndexMap::new(),
    });
    id
  }
}

struct ScopeBuilder {
  tree: ScopeTree,
  stack: Vec<ScopeId>,
  /// References seen before their declaration (use before `var`, hoisting), resolved once
  /// the whole module has been walked
  pending: Vec<(Ident, ScopeId)>,
  /// Span of the module item being walked; top-level declarations are owned by it
  item_span: Span,
}

impl ScopeBuilder {
  fn current(&self) -> ScopeId {
    *self.stack.last().unwrap_or(&ScopeTree::MODULE_SCOPE)
  }

  fn enter(&mut self, kind: ScopeKind) {
    let parent = self.stack.last().copied();
    let id = self.tree.push_scope(parent, kind);
    self.stack.push(id);
  }

  fn exit(&mut self) {
    self.stack.pop();
  }

  /// Closest function or module scope, where `var` declarations land.
  fn var_scope(&self) -> ScopeId {
    self
      .stack
      .iter()
      .rev()
      .find(|id| self.tree.scope(**id).kind != ScopeKind::Block)
      .copied()
      .unwrap_or(ScopeTree::MODULE_SCOPE)
  }

  fn reference(&mut self, ident: &Ident) {
    if let Some(binding) = self.tree.lookup(&ident.to_id()) {
      let scope = self.current();
      if self.tree.is_ancestor(self.tree.binding(binding).scope, scope) {
        self.tree.add_reference(binding, ident.span, scope);
      }
    } else {
      self.pending.push((ident.clone(), self.current()));
    }
  }

  fn declare_pat(&mut self, pat: &Pat, kind: BindingKind, declaring_span: Span) {
    let scope = match kind {
      BindingKind::Var | BindingKind::Hoisted => self.var_scope(),
      _ => self.current(),
    };
    let kind = match kind {
      BindingKind::Var if scope != self.current() => BindingKind::Hoisted,
      kind => kind,
    };

    match pat {
      Pat::Ident(ident) => {
        self.tree.declare(scope, &ident.id, kind, declaring_span);
      }
      Pat::Array(arr) => {
        for elem in arr.elems.iter().flatten() {
          self.declare_pat(elem, kind, declaring_span);
        }
      }
      Pat::Object(obj) => {
        for prop in &obj.props {
          match prop {
            ObjectPatProp::KeyValue(kv) => {
              if let PropName::Computed(computed) = &kv.key {
                computed.expr.visit_with(self);
              }
              self.declare_pat(&kv.value, kind, declaring_span);
            }
            ObjectPatProp::Assign(assign) => {
              self
                .tree
                .declare(scope, &assign.key.id, kind, declaring_span);
              assign.value.visit_with(self);
            }
            ObjectPatProp::Rest(rest) => self.declare_pat(&rest.arg, kind, declaring_span),
          }
        }
      }
      Pat::Rest(rest) => self.declare_pat(&rest.arg, kind, declaring_span),
      Pat::Assign(assign) => {
        self.declare_pat(&assign.left, kind, declaring_span);
        assign.right.visit_with(self);
      }
      Pat::Expr(expr) => expr.visit_with(self),
      Pat::Invalid(_) => {}
    }
  }

  fn enter_function(&mut self, name: Option<&Ident>, function: &Function) {
    function.decorators.visit_with(self);
    self.enter(ScopeKind::Function);
    if let Some(name) = name {
      let scope = self.current();
      self
        .tree
        .declare(scope, name, BindingKind::Function, function.span);
    }
    for param in &function.params {
      param.decorators.visit_with(self);
      self.declare_pat(&param.pat, BindingKind::Param, param.span);
    }
    if let Some(body) = &function.body {
      self.hoist_functions(&body.stmts);
      body.stmts.visit_with(self);
    }
    self.exit();
  }

  /// Function declarations are visible in their whole scope, so they are declared before
  /// the statements are walked.
  fn hoist_functions(&mut self, stmts: &[Stmt]) {
    let scope = self.current();
    for stmt in stmts {
      if let Stmt::Decl(Decl::Fn(func)) = stmt {
        self
          .tree
          .declare(scope, &func.ident, BindingKind::Function, func.function.span);
      }
    }
  }
}

impl ScopeBuilder {
  fn resolve_pending(&mut self) {
    for (ident, scope) in std::mem::take(&mut self.pending) {
      if let Some(binding) = self.tree.lookup(&ident.to_id()) {
        if self.tree.is_ancestor(self.tree.binding(binding).scope, scope) {
          self.tree.add_reference(binding, ident.span, scope);
        }
      }
    }
  }
}

impl Visit for ScopeBuilder {
  fn visit_module(&mut self, node: &Module) {
    self.enter(ScopeKind::Module);

    for item in &node.body {
      match item {
        ModuleItem::Stmt(Stmt::Decl(Decl::Fn(func))) => {
          self.tree.declare(
            ScopeTree::MODULE_SCOPE,
            &func.ident,
            BindingKind::Function,
            item_span(item),
          );
        }
        ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
          decl: Decl::Fn(func),
          span,
        })) => {
          self
            .tree
            .declare(ScopeTree::MODULE_SCOPE, &func.ident, BindingKind::Function, *span);
        }
        _ => {}
      }
    }

    for item in &node.body {
      self.item_span = item_span(item);
      item.visit_with(self);
    }

    self.resolve_pending();
    self.exit();
  }

  fn visit_import_decl(&mut self, node: &ImportDecl) {
    for specifier in &node.specifiers {
      let local = match specifier {
        ImportSpecifier::Named(named) => &named.local,
        ImportSpecifier::Default(default) => &default.local,
        ImportSpecifier::Namespace(namespace) => &namespace.local,
      };
      self.tree.declare(
        ScopeTree::MODULE_SCOPE,
        local,
        BindingKind::Module,
        node.span,
      );
    }
  }

  fn visit_named_export(&mut self, node: &NamedExport) {
    // `export { a } from 'b'` does not reference a local binding
    if node.src.is_some() {
      return;
    }

    for specifier in &node.specifiers {
      if let ExportSpecifier::Named(named) = specifier {
        if let ModuleExportName::Ident(orig) = &named.orig {
          self.reference(orig);
        }
      }
    }
  }

  fn visit_var_decl(&mut self, node: &VarDecl) {
    let kind = match node.kind {
      VarDeclKind::Var => BindingKind::Var,
      VarDeclKind::Let => BindingKind::Let,
      VarDeclKind::Const => BindingKind::Const,
    };

    for decl in &node.decls {
      let declaring_span = if self.stack.len() == 1 {
        self.item_span
      } else {
        decl.span
      };
      self.declare_pat(&decl.name, kind, declaring_span);
      decl.init.visit_with(self);
    }
  }

  fn visit_fn_decl(&mut self, node: &FnDecl) {
    let scope = self.current();
    let declaring_span = if self.stack.len() == 1 {
      self.item_span
    } else {
      node.function.span
    };
    self
      .tree
      .declare(scope, &node.ident, BindingKind::Function, declaring_span);
    self.enter_function(None, &node.function);
  }

  fn visit_export_default_decl(&mut self, node: &ExportDefaultDecl) {
    // `export default function name() {}` binds `name` in the module scope
    match &node.decl {
      DefaultDecl::Fn(FnExpr {
        ident: Some(ident),
        function,
      }) => {
        self.tree.declare(
          ScopeTree::MODULE_SCOPE,
          ident,
          BindingKind::Function,
          node.span,
        );
        self.enter_function(None, function);
      }
      DefaultDecl::Class(ClassExpr {
        ident: Some(ident),
        class,
      }) => {
        self
          .tree
          .declare(ScopeTree::MODULE_SCOPE, ident, BindingKind::Let, node.span);
        class.visit_with(self);
      }
      decl => decl.visit_children_with(self),
    }
  }

  fn visit_fn_expr(&mut self, node: &FnExpr) {
    self.enter_function(node.ident.as_ref(), &node.function);
  }

  fn visit_class_decl(&mut self, node: &ClassDecl) {
    let scope = self.current();
    let declaring_span = if self.stack.len() == 1 {
      self.item_span
    } else {
      node.class.span
    };
    self
      .tree
      .declare(scope, &node.ident, BindingKind::Let, declaring_span);
    node.class.visit_with(self);
  }

  fn visit_class_expr(&mut self, node: &ClassExpr) {
    self.enter(ScopeKind::Block);
    if let Some(ident) = &node.ident {
      let scope = self.current();
      self
        .tree
        .declare(scope, ident, BindingKind::Let, node.class.span);
    }
    node.class.visit_with(self);
    self.exit();
  }

  fn visit_function(&mut self, node: &Function) {
    self.enter_function(None, node);
  }

  fn visit_arrow_expr(&mut self, node: &ArrowExpr) {
    self.enter(ScopeKind::Function);
    for param in &node.params {
      self.declare_pat(param, BindingKind::Param, node.span);
    }
    match &*node.body {
      BlockStmtOrExpr::BlockStmt(block) => {
        self.hoist_functions(&block.stmts);
        block.stmts.visit_with(self);
      }
      BlockStmtOrExpr::Expr(expr) => expr.visit_with(self),
    }
    self.exit();
  }

  fn visit_constructor(&mut self, node: &Constructor) {
    node.key.visit_with(self);
    self.enter(ScopeKind::Function);
    for param in &node.params {
      match param {
        ParamOrTsParamProp::Param(param) => {
          param.decorators.visit_with(self);
          self.declare_pat(&param.pat, BindingKind::Param, param.span);
        }
        ParamOrTsParamProp::TsParamProp(prop) => match &prop.param {
          TsParamPropParam::Ident(ident) => {
            let scope = self.current();
            self
              .tree
              .declare(scope, &ident.id, BindingKind::Param, prop.span);
          }
          TsParamPropParam::Assign(assign) => {
            self.declare_pat(&assign.left, BindingKind::Param, prop.span);
            assign.right.visit_with(self);
          }
        },
      }
    }
    if let Some(body) = &node.body {
      self.hoist_functions(&body.stmts);
      body.stmts.visit_with(self);
    }
    self.exit();
  }

  fn visit_setter_prop(&mut self, node: &SetterProp) {
    node.key.visit_with(self);
    self.enter(ScopeKind::Function);
    self.declare_pat(&node.param, BindingKind::Param, node.span);
    if let Some(body) = &node.body {
      body.stmts.visit_with(self);
    }
    self.exit();
  }

  fn visit_getter_prop(&mut self, node: &GetterProp) {
    node.key.visit_with(self);
    self.enter(ScopeKind::Function);
    if let Some(body) = &node.body {
      body.stmts.visit_with(self);
    }
    self.exit();
  }

  fn visit_block_stmt(&mut self, node: &BlockStmt) {
    self.enter(ScopeKind::Block);
    self.hoist_functions(&node.stmts);
    node.stmts.visit_with(self);
    self.exit();
  }

  fn visit_for_stmt(&mut self, node: &ForStmt) {
    self.enter(ScopeKind::Block);
    node.visit_children_with(self);
    self.exit();
  }

  fn visit_for_in_stmt(&mut self, node: &ForInStmt) {
    self.enter(ScopeKind::Block);
    node.visit_children_with(self);
    self.exit();
  }

  fn visit_for_of_stmt(&mut self, node: &ForOfStmt) {
    self.enter(ScopeKind::Block);
    node.visit_children_with(self);
    self.exit();
  }

  fn visit_catch_clause(&mut self, node: &CatchClause) {
    self.enter(ScopeKind::Block);
    if let Some(param) = &node.param {
      self.declare_pat(param, BindingKind::Param, node.span);
    }
    self.hoist_functions(&node.body.stmts);
    node.body.stmts.visit_with(self);
    self.exit();
  }

  fn visit_labeled_stmt(&mut self, node: &LabeledStmt) {
    node.body.visit_with(self);
  }

  fn visit_break_stmt(&mut self, _node: &BreakStmt) {}

  fn visit_continue_stmt(&mut self, _node: &ContinueStmt) {}

  fn visit_binding_ident(&mut self, node: &BindingIdent) {
    // Only reached for assignment targets; declarations go through `declare_pat`.
    self.reference(&node.id);
  }

  fn visit_ident(&mut self, node: &Ident) {
    self.reference(node);
  }

  fn visit_ts_enum_decl(&mut self, node: &TsEnumDecl) {
    let scope = self.current();
    self
      .tree
      .declare(scope, &node.id, BindingKind::Let, node.span);
    for member in &node.members {
      member.init.visit_with(self);
    }
  }

  // Type-level positions never count as value references.
  fn visit_ts_type(&mut self, _node: &TsType) {}
  fn visit_ts_type_ann(&mut self, _node: &TsTypeAnn) {}
  fn visit_ts_type_param_decl(&mut self, _node: &TsTypeParamDecl) {}
  fn visit_ts_type_param_instantiation(&mut self, _node: &TsTypeParamInstantiation) {}
  fn visit_ts_interface_decl(&mut self, _node: &TsInterfaceDecl) {}
  fn visit_ts_type_alias_decl(&mut self, _node: &TsTypeAliasDecl) {}
  fn visit_ts_module_decl(&mut self, _node: &TsModuleDecl) {}
  fn visit_ts_expr_with_type_args(&mut self, _node: &TsExprWithTypeArgs) {}
}

pub(crate) fn item_span(item: &ModuleItem) -> Span {
  item.span()
}
