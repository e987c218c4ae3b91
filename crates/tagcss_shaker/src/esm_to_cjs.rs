//! Lowers ES module syntax into the CommonJS shape the sandbox executes.
//!
//! Imports become hoisted `require` calls and every read of an imported
//! binding becomes a member access on the required namespace. Exports are
//! defined through the `__helpers` object that the sandbox passes to each
//! module wrapper:
//!
//! * `__helpers.defineInteropFlag(exports)`
//! * `__helpers.export(exports, name, getter)`
//! * `__helpers.exportAll(source, exports)`
//! * `__helpers.interopDefault(namespace)`
use std::collections::HashMap;
use std::collections::HashSet;

use indexmap::IndexMap;
use inflector::Inflector;
use swc_core::atoms::Atom;
use swc_core::common::Mark;
use swc_core::common::Span;
use swc_core::common::SyntaxContext;
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::VisitMut;
use swc_core::ecma::visit::VisitMutWith;

use crate::id;
use crate::utils::collect_bindings_from_pat;
use crate::utils::create_exports_assign;
use crate::utils::create_require;
use crate::utils::match_export_name;
use crate::utils::match_export_name_ident;
use crate::utils::taken_names;

/// Name of the helper object the sandbox injects into every module wrapper.
pub const HELPERS_IDENT: &str = "__helpers";

#[derive(Clone, Debug)]
struct ImportBinding {
  source: Atom,
  imported: Atom,
}

#[derive(Clone, Debug)]
struct RequireSlot {
  name: Atom,
  ctxt: SyntaxContext,
}

pub struct EsmToCommonJs {
  imports: HashMap<Id, ImportBinding>,
  slots: IndexMap<Atom, RequireSlot>,
  /// Names already used by the module or by an earlier slot
  taken: HashSet<Atom>,
  interops: HashSet<Atom>,
  /// `require` declarations and `exportAll` calls, in source order.
  requires: Vec<ModuleItem>,
  /// Getter based exports, hoisted above the requires so cyclic dependencies
  /// observe them.
  exports: Vec<ModuleItem>,
  pub needs_helpers: bool,
  in_function_scope: bool,
  unresolved_mark: Mark,
}

/// `./theme/colors.js` -> `_colorsJs`
fn local_name_for_source(source: &str) -> Atom {
  let last = source.rsplit('/').next().unwrap_or(source);
  let name = last.to_camel_case();
  if name.is_empty() {
    return "_module".into();
  }
  format!("_{}", name).into()
}

impl EsmToCommonJs {
  pub fn new(unresolved_mark: Mark) -> Self {
    EsmToCommonJs {
      imports: HashMap::new(),
      slots: IndexMap::new(),
      taken: HashSet::new(),
      interops: HashSet::new(),
      requires: vec![],
      exports: vec![],
      needs_helpers: false,
      in_function_scope: false,
      unresolved_mark,
    }
  }

  fn unresolved(&self, name: &str) -> Ident {
    Ident::new(
      name.into(),
      DUMMY_SP,
      SyntaxContext::empty().apply_mark(self.unresolved_mark),
    )
  }

  fn exports_ident(&self) -> Expr {
    Expr::Ident(self.unresolved("exports"))
  }

  fn slot_for(&mut self, source: &Atom) -> RequireSlot {
    if let Some(slot) = self.slots.get(source) {
      return slot.clone();
    }

    let base = local_name_for_source(source);
    let mut name = base.clone();
    let mut suffix = 2;
    while self.taken.contains(&name) || self.taken.contains(&Atom::from(format!("{name}Default"))) {
      name = format!("{base}{suffix}").into();
      suffix += 1;
    }
    self.taken.insert(name.clone());
    self.taken.insert(format!("{name}Default").into());

    let slot = RequireSlot {
      name,
      ctxt: SyntaxContext::empty().apply_mark(Mark::fresh(Mark::root())),
    };
    self.slots.insert(source.clone(), slot.clone());
    slot
  }

  fn namespace_ident(&mut self, source: &Atom, span: Span) -> Ident {
    let slot = self.slot_for(source);
    Ident::new(slot.name, span, slot.ctxt)
  }

  fn interop_ident(&mut self, source: &Atom) -> Ident {
    let slot = self.slot_for(source);
    Ident::new(format!("{}Default", slot.name).into(), DUMMY_SP, slot.ctxt)
  }

  /// `var _source = require("source");`, once per source.
  fn add_require(&mut self, source: &Atom, span: Span) {
    if self.slots.contains_key(source) {
      return;
    }

    let ident = self.namespace_ident(source, DUMMY_SP);
    let init = Expr::Call(create_require(source.clone(), self.unresolved_mark));
    self.requires.push(var_decl(span, ident, init));
  }

  /// `var _sourceDefault = __helpers.interopDefault(_source);`, once per source.
  fn add_interop_default(&mut self, source: &Atom) {
    if !self.interops.insert(source.clone()) {
      return;
    }

    let namespace = self.namespace_ident(source, DUMMY_SP);
    let ident = self.interop_ident(source);
    let init = self.helper_call("interopDefault", vec![Expr::Ident(namespace)], DUMMY_SP);
    self.requires.push(var_decl(DUMMY_SP, ident, init));
  }

  fn helper_call(&mut self, name: &str, args: Vec<Expr>, span: Span) -> Expr {
    self.needs_helpers = true;
    Expr::Call(CallExpr {
      span,
      ctxt: SyntaxContext::empty(),
      callee: Callee::Expr(Box::new(Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj: Box::new(Expr::Ident(self.unresolved(HELPERS_IDENT))),
        prop: MemberProp::Ident(IdentName::new(name.into(), DUMMY_SP)),
      }))),
      args: args
        .into_iter()
        .map(|expr| ExprOrSpread {
          spread: None,
          expr: Box::new(expr),
        })
        .collect(),
      type_args: None,
    })
  }

  fn helper_stmt(&mut self, name: &str, args: Vec<Expr>, span: Span) -> ModuleItem {
    ModuleItem::Stmt(Stmt::Expr(ExprStmt {
      span,
      expr: Box::new(self.helper_call(name, args, span)),
    }))
  }

  /// `__helpers.export(exports, "name", () => value);`
  fn add_getter_export(&mut self, exported: Atom, value: Expr, span: Span) {
    let getter = Expr::Arrow(ArrowExpr {
      span: DUMMY_SP,
      ctxt: SyntaxContext::empty(),
      params: vec![],
      body: Box::new(BlockStmtOrExpr::Expr(Box::new(value))),
      is_async: false,
      is_generator: false,
      type_params: None,
      return_type: None,
    });
    let exports = self.exports_ident();
    let export = self.helper_stmt(
      "export",
      vec![exports, Expr::Lit(Lit::Str(exported.into())), getter],
      span,
    );
    self.exports.push(export);
  }

  /// Value of an imported binding: `_source`, `_sourceDefault.default` or
  /// `_source.name`.
  fn import_access(&mut self, binding: &ImportBinding, span: Span) -> Expr {
    if &*binding.imported == "*" {
      return Expr::Ident(self.namespace_ident(&binding.source, span));
    }

    let obj = if &*binding.imported == "default" {
      self.interop_ident(&binding.source)
    } else {
      self.namespace_ident(&binding.source, DUMMY_SP)
    };

    Expr::Member(MemberExpr {
      span,
      obj: Box::new(Expr::Ident(obj)),
      prop: member_prop(&binding.imported),
    })
  }

  fn collect_import(&mut self, import: &ImportDecl) {
    let source = import.src.value.clone();
    self.add_require(&source, import.span);

    for specifier in &import.specifiers {
      let (local, imported) = match specifier {
        ImportSpecifier::Named(named) => {
          let imported = match &named.imported {
            Some(imported) => match_export_name(imported).0,
            None => named.local.sym.clone(),
          };
          (&named.local, imported)
        }
        ImportSpecifier::Default(default) => (&default.local, "default".into()),
        ImportSpecifier::Namespace(namespace) => (&namespace.local, "*".into()),
      };

      if &*imported == "default" {
        self.add_interop_default(&source);
      }
      self.imports.insert(
        id!(local),
        ImportBinding {
          source: source.clone(),
          imported,
        },
      );
    }
  }

  fn collect_reexport(&mut self, export: &NamedExport, source: &Atom) {
    self.add_require(source, export.span);

    for specifier in &export.specifiers {
      let (imported, exported): (Atom, Atom) = match specifier {
        ExportSpecifier::Named(named) => {
          let orig = match_export_name(&named.orig).0;
          let exported = match &named.exported {
            Some(exported) => match_export_name(exported).0,
            None => orig.clone(),
          };
          (orig, exported)
        }
        ExportSpecifier::Default(default) => ("default".into(), default.exported.sym.clone()),
        ExportSpecifier::Namespace(namespace) => ("*".into(), match_export_name(&namespace.name).0),
      };

      if &*imported == "default" {
        self.add_interop_default(source);
      }
      let binding = ImportBinding {
        source: source.clone(),
        imported,
      };
      let value = self.import_access(&binding, DUMMY_SP);
      self.add_getter_export(exported, value, export.span);
    }
  }

  fn lower_local_exports(&mut self, export: &NamedExport) {
    for specifier in &export.specifiers {
      let ExportSpecifier::Named(named) = specifier else {
        continue;
      };
      let Some(orig) = match_export_name_ident(&named.orig) else {
        continue;
      };
      let exported = match &named.exported {
        Some(exported) => match_export_name(exported).0,
        None => orig.sym.clone(),
      };

      let value = match self.imports.get(&id!(orig)).cloned() {
        Some(binding) => self.import_access(&binding, orig.span),
        None => Expr::Ident(orig.clone()),
      };
      self.add_getter_export(exported, value, export.span);
    }
  }

  fn lower_default_decl(&mut self, export: &ExportDefaultDecl, items: &mut Vec<ModuleItem>) {
    match &export.decl {
      DefaultDecl::Class(class) => {
        let mut class = class.clone();
        class.visit_mut_with(self);
        match class.ident {
          Some(ident) => {
            items.push(ModuleItem::Stmt(Stmt::Decl(Decl::Class(ClassDecl {
              ident: ident.clone(),
              declare: false,
              class: class.class,
            }))));
            items.push(create_exports_assign(
              "default".into(),
              Expr::Ident(ident),
              self.unresolved_mark,
            ));
          }
          None => items.push(create_exports_assign(
            "default".into(),
            Expr::Class(ClassExpr {
              ident: None,
              class: class.class,
            }),
            self.unresolved_mark,
          )),
        }
      }
      DefaultDecl::Fn(func) => {
        let mut func = func.clone();
        func.visit_mut_with(self);
        match func.ident {
          Some(ident) => {
            self.add_getter_export("default".into(), Expr::Ident(ident.clone()), export.span);
            items.push(ModuleItem::Stmt(Stmt::Decl(Decl::Fn(FnDecl {
              ident,
              declare: false,
              function: func.function,
            }))));
          }
          None => items.push(create_exports_assign(
            "default".into(),
            Expr::Fn(FnExpr {
              ident: None,
              function: func.function,
            }),
            self.unresolved_mark,
          )),
        }
      }
      // Interfaces have no runtime value.
      DefaultDecl::TsInterfaceDecl(_) => {}
    }
  }

  fn lower_export_decl(&mut self, export: &ExportDecl, items: &mut Vec<ModuleItem>) {
    let mut decl = export.decl.clone();
    decl.visit_mut_with(self);

    match &decl {
      Decl::Class(class) => {
        self.add_getter_export(
          class.ident.sym.clone(),
          Expr::Ident(class.ident.clone()),
          export.span,
        );
      }
      Decl::Fn(func) => {
        self.add_getter_export(
          func.ident.sym.clone(),
          Expr::Ident(func.ident.clone()),
          export.span,
        );
      }
      Decl::Var(var) => {
        let mut names = vec![];
        for declarator in &var.decls {
          collect_bindings_from_pat(&declarator.name, &mut |ident| names.push(ident.clone()));
        }

        if var.kind == VarDeclKind::Const {
          // Constants never change, a plain assignment after the declaration is enough.
          items.push(ModuleItem::Stmt(Stmt::Decl(decl.clone())));
          for ident in names {
            items.push(create_exports_assign(
              ident.sym.clone(),
              Expr::Ident(ident),
              self.unresolved_mark,
            ));
          }
          return;
        }

        for ident in names {
          self.add_getter_export(ident.sym.clone(), Expr::Ident(ident), export.span);
        }
      }
      _ => {}
    }

    items.push(ModuleItem::Stmt(Stmt::Decl(decl)));
  }
}

fn var_decl(span: Span, ident: Ident, init: Expr) -> ModuleItem {
  ModuleItem::Stmt(Stmt::Decl(Decl::Var(Box::new(VarDecl {
    span,
    ctxt: SyntaxContext::empty(),
    kind: VarDeclKind::Var,
    declare: false,
    decls: vec![VarDeclarator {
      span: DUMMY_SP,
      name: Pat::Ident(ident.into()),
      init: Some(Box::new(init)),
      definite: false,
    }],
  }))))
}

fn member_prop(name: &Atom) -> MemberProp {
  if Ident::verify_symbol(name).is_ok() {
    MemberProp::Ident(IdentName::new(name.clone(), DUMMY_SP))
  } else {
    MemberProp::Computed(ComputedPropName {
      span: DUMMY_SP,
      expr: Box::new(Expr::Lit(Lit::Str(name.clone().into()))),
    })
  }
}

macro_rules! visit_function_scope {
  ($name:ident, $type:ident) => {
    fn $name(&mut self, node: &mut $type) {
      let in_function_scope = self.in_function_scope;
      self.in_function_scope = true;
      node.visit_mut_children_with(self);
      self.in_function_scope = in_function_scope;
    }
  };
}

impl VisitMut for EsmToCommonJs {
  fn visit_mut_module(&mut self, node: &mut Module) {
    let has_module_syntax = node
      .body
      .iter()
      .any(|item| matches!(item, ModuleItem::ModuleDecl(_)));
    if !has_module_syntax {
      return;
    }

    self.taken.extend(taken_names(node));
    let mut needs_interop_flag = false;

    // Imports and re-exports go first so that every local reference to an
    // import is known before the body is rewritten.
    for item in &node.body {
      let ModuleItem::ModuleDecl(decl) = item else {
        continue;
      };
      match decl {
        ModuleDecl::Import(import) => {
          if !import.type_only {
            self.collect_import(import);
          }
        }
        ModuleDecl::ExportNamed(export) => {
          needs_interop_flag = true;
          if let Some(source) = &export.src {
            self.collect_reexport(export, &source.value);
          }
        }
        ModuleDecl::ExportAll(export) => {
          needs_interop_flag = true;
          let source = export.src.value.clone();
          self.add_require(&source, export.span);
          let namespace = self.namespace_ident(&source, DUMMY_SP);
          let exports = self.exports_ident();
          let call = self.helper_stmt("exportAll", vec![Expr::Ident(namespace), exports], export.span);
          self.requires.push(call);
        }
        ModuleDecl::ExportDecl(_)
        | ModuleDecl::ExportDefaultDecl(_)
        | ModuleDecl::ExportDefaultExpr(_) => needs_interop_flag = true,
        _ => {}
      }
    }

    let body = std::mem::take(&mut node.body);
    let mut items = Vec::with_capacity(body.len());

    for item in body {
      match item {
        ModuleItem::ModuleDecl(ModuleDecl::Import(_) | ModuleDecl::ExportAll(_)) => {}
        ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(export)) => {
          if export.src.is_none() {
            self.lower_local_exports(&export);
          }
        }
        ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(mut export)) => {
          export.expr.visit_mut_with(self);
          items.push(create_exports_assign(
            "default".into(),
            *export.expr,
            self.unresolved_mark,
          ));
        }
        ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(export)) => {
          self.lower_default_decl(&export, &mut items);
        }
        ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => {
          self.lower_export_decl(&export, &mut items);
        }
        ModuleItem::ModuleDecl(_) => {}
        ModuleItem::Stmt(mut stmt) => {
          stmt.visit_mut_with(self);
          items.push(ModuleItem::Stmt(stmt));
        }
      }
    }

    if needs_interop_flag {
      let exports = self.exports_ident();
      let flag = self.helper_stmt("defineInteropFlag", vec![exports], DUMMY_SP);
      self.exports.insert(0, flag);
    }

    let mut body = std::mem::take(&mut self.exports);
    body.append(&mut self.requires);
    body.append(&mut items);
    node.body = body;
  }

  visit_function_scope!(visit_mut_function, Function);
  visit_function_scope!(visit_mut_class, Class);
  visit_function_scope!(visit_mut_getter_prop, GetterProp);
  visit_function_scope!(visit_mut_setter_prop, SetterProp);

  fn visit_mut_callee(&mut self, node: &mut Callee) {
    // `foo()` must not see the namespace as `this`: `(0, _m.foo)()`.
    if let Callee::Expr(expr) = node {
      if let Expr::Ident(ident) = &**expr {
        if let Some(binding) = self.imports.get(&id!(ident)).cloned() {
          if &*binding.imported != "*" {
            let access = self.import_access(&binding, ident.span);
            **expr = Expr::Paren(ParenExpr {
              span: DUMMY_SP,
              expr: Box::new(Expr::Seq(SeqExpr {
                span: DUMMY_SP,
                exprs: vec![0.into(), Box::new(access)],
              })),
            });
            return;
          }
        }
      }
    }

    node.visit_mut_children_with(self);
  }

  fn visit_mut_expr(&mut self, node: &mut Expr) {
    match &*node {
      Expr::Ident(ident) => {
        if let Some(binding) = self.imports.get(&id!(ident)).cloned() {
          *node = self.import_access(&binding, ident.span);
        }
      }
      Expr::This(_) if !self.in_function_scope => {
        *node = Expr::Ident(self.unresolved("undefined"));
      }
      _ => node.visit_mut_children_with(self),
    }
  }

  fn visit_mut_prop(&mut self, node: &mut Prop) {
    // `{ a }` -> `{ a: _m.a }`
    if let Prop::Shorthand(ident) = node {
      if let Some(binding) = self.imports.get(&id!(ident)).cloned() {
        let value = self.import_access(&binding, ident.span);
        *node = Prop::KeyValue(KeyValueProp {
          key: PropName::Ident(IdentName::new(ident.sym.clone(), DUMMY_SP)),
          value: Box::new(value),
        });
        return;
      }
    }

    node.visit_mut_children_with(self);
  }
}

/// Rewrites `module` in place. Returns whether `__helpers` is referenced.
pub fn esm_to_cjs(module: &mut Module, unresolved_mark: Mark) -> bool {
  let mut lowering = EsmToCommonJs::new(unresolved_mark);
  module.visit_mut_with(&mut lowering);
  lowering.needs_helpers
}
