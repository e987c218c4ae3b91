use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;

use indexmap::IndexSet;
use swc_core::common::Mark;
use swc_core::common::Span;
use swc_core::common::Spanned;
use swc_core::common::SyntaxContext;
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::noop_visit_mut_type;
use swc_core::ecma::visit::VisitMut;
use swc_core::ecma::visit::VisitMutWith;

use crate::graph::DependencyGraph;
use crate::graph::GraphOptions;
use crate::graph::NodeId;
use crate::graph::NodeKind;
use crate::id;
use crate::normalize::normalize;
use crate::normalize::ExportedName;
use crate::normalize::NormalizedModule;
use crate::utils::create_exports_assign;
use crate::utils::match_member_expr;
use crate::utils::pat_binding_ids;
use crate::utils::span_contains;
use crate::utils::unparen;
use crate::utils::Warning;

#[derive(Clone, Debug)]
pub struct ShakerOptions {
  /// Mark the resolver gave to unresolved (global) identifiers
  pub unresolved_mark: Mark,
  /// Keep every top-level expression statement, even when nothing requested depends on it
  pub keep_side_effects: bool,
}

impl ShakerOptions {
  pub fn new(unresolved_mark: Mark) -> Self {
    ShakerOptions {
      unresolved_mark,
      keep_side_effects: false,
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShakeResult {
  /// Import source to the names still needed from it, sorted. `*` stands for the whole module.
  pub imports: BTreeMap<String, Vec<String>>,
  pub warnings: Vec<Warning>,
}

/// Removes from `module` everything that is not needed to compute the `requested` exports.
///
/// * `*` in `requested` leaves the module untouched
/// * an empty `requested` keeps only code with external effects and ends the module with an
///   empty export list
/// * a module without any exports exposes the requested top-level bindings as exports
///
/// Shaking is idempotent: shaking the output again with the same names changes nothing.
pub fn shake(module: &mut Module, requested: &[String], options: &ShakerOptions) -> ShakeResult {
  let unresolved_mark = options.unresolved_mark;
  let mut normalized = normalize(module, unresolved_mark);
  let warnings = std::mem::take(&mut normalized.warnings);

  if requested.iter().any(|name| name == "*") || requests_whole_commonjs(&normalized, requested) {
    tracing::debug!(?requested, "Module is needed as a whole");
    return ShakeResult {
      imports: collect_imports(&normalized),
      warnings,
    };
  }

  if normalized.exports.is_empty()
    && normalized.reexports.is_empty()
    && add_implicit_exports(module, &normalized, requested, unresolved_mark) > 0
  {
    normalized = normalize(module, unresolved_mark);
  }

  let graph = DependencyGraph::build_with_options(
    module,
    &normalized,
    &GraphOptions {
      keep_side_effects: options.keep_side_effects,
    },
  );
  let reachable = graph.reachable_from(roots(&graph, requested));
  let plan = RemovalPlan::new(module, &graph, &normalized, &reachable);

  tracing::debug!(
    ?requested,
    reachable = reachable.len(),
    removed = plan.spans.len() + plan.bindings.len(),
    "Shaking module"
  );
  plan.apply(module);

  if requested.is_empty() {
    append_empty_exports(module, normalized.has_module_syntax, unresolved_mark);
  }

  let retained = normalize(module, unresolved_mark);
  ShakeResult {
    imports: collect_imports(&retained),
    warnings,
  }
}

/// Default-importing a CommonJS module gets its whole `exports` object.
fn requests_whole_commonjs(normalized: &NormalizedModule, requested: &[String]) -> bool {
  if normalized.has_module_syntax || normalized.is_module_flagged {
    return false;
  }
  if !requested.iter().any(|name| name == "default") {
    return false;
  }
  !normalized
    .exports
    .iter()
    .any(|export| export.exported == ExportedName::Default)
}

fn roots(graph: &DependencyGraph, requested: &[String]) -> Vec<NodeId> {
  let provided_locally = |name: &str| {
    graph.nodes().iter().any(|node| match &node.kind {
      NodeKind::Export(exported) | NodeKind::Reexport(exported) => exported.matches(name),
      _ => false,
    })
  };
  let from_star: Vec<&String> = requested
    .iter()
    .filter(|name| !provided_locally(name))
    .collect();

  graph
    .nodes()
    .iter()
    .filter(|node| {
      node.has_external_effects
        || match &node.kind {
          NodeKind::Export(ExportedName::All) => !requested.is_empty(),
          NodeKind::Reexport(ExportedName::All) => !from_star.is_empty(),
          NodeKind::Export(exported) | NodeKind::Reexport(exported) => {
            requested.iter().any(|name| exported.matches(name))
          }
          _ => false,
        }
    })
    .map(|node| node.id)
    .collect()
}

/// Appends `exports.<name> = <name>;` (or `export { <name> };`) for every requested name that
/// is a top-level binding. Returns how many were added.
fn add_implicit_exports(
  module: &mut Module,
  normalized: &NormalizedModule,
  requested: &[String],
  unresolved_mark: Mark,
) -> usize {
  let mut added = 0;

  for name in requested {
    let Some((_, binding)) = normalized
      .scopes
      .top_level_bindings()
      .find(|(_, binding)| &*binding.name == name.as_str())
    else {
      continue;
    };
    let local = Ident::new(binding.id.0.clone(), DUMMY_SP, binding.id.1);

    let item = if normalized.has_module_syntax {
      ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(NamedExport {
        span: DUMMY_SP,
        specifiers: vec![ExportSpecifier::Named(ExportNamedSpecifier {
          span: DUMMY_SP,
          orig: ModuleExportName::Ident(local),
          exported: None,
          is_type_only: false,
        })],
        src: None,
        type_only: false,
        with: None,
      }))
    } else {
      create_exports_assign(binding.id.0.clone(), Expr::Ident(local), unresolved_mark)
    };

    tracing::trace!(name = %name, "Exporting top-level binding");
    module.body.push(item);
    added += 1;
  }

  added
}

/// Appends `module.exports = [];` (or `export {};` to ES modules) unless already present.
fn append_empty_exports(module: &mut Module, has_module_syntax: bool, unresolved_mark: Mark) {
  if module
    .body
    .iter()
    .any(|item| is_empty_exports(item, unresolved_mark))
  {
    return;
  }

  let item = if has_module_syntax {
    ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(NamedExport {
      span: DUMMY_SP,
      specifiers: vec![],
      src: None,
      type_only: false,
      with: None,
    }))
  } else {
    let ctxt = SyntaxContext::empty().apply_mark(unresolved_mark);
    ModuleItem::Stmt(Stmt::Expr(ExprStmt {
      span: DUMMY_SP,
      expr: Box::new(Expr::Assign(AssignExpr {
        span: DUMMY_SP,
        op: AssignOp::Assign,
        left: AssignTarget::Simple(SimpleAssignTarget::Member(MemberExpr {
          span: DUMMY_SP,
          obj: Box::new(Expr::Ident(Ident::new("module".into(), DUMMY_SP, ctxt))),
          prop: MemberProp::Ident(IdentName::new("exports".into(), DUMMY_SP)),
        })),
        right: Box::new(Expr::Array(ArrayLit {
          span: DUMMY_SP,
          elems: vec![],
        })),
      })),
    }))
  };
  module.body.push(item);
}

fn is_empty_exports(item: &ModuleItem, unresolved_mark: Mark) -> bool {
  match item {
    ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(named)) => {
      named.specifiers.is_empty() && named.src.is_none()
    }
    ModuleItem::Stmt(Stmt::Expr(ExprStmt { expr, .. })) => {
      let Expr::Assign(assign) = unparen(expr) else {
        return false;
      };
      let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &assign.left else {
        return false;
      };
      match_member_expr(member, &["module", "exports"], unresolved_mark)
        && matches!(unparen(&assign.right), Expr::Array(array) if array.elems.is_empty())
    }
    _ => false,
  }
}

fn collect_imports(normalized: &NormalizedModule) -> BTreeMap<String, Vec<String>> {
  let mut imports: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

  for import in &normalized.imports {
    imports
      .entry(import.source.to_string())
      .or_default()
      .insert(import.imported.requested().to_string());
  }
  for reexport in &normalized.reexports {
    imports
      .entry(reexport.source.to_string())
      .or_default()
      .insert(reexport.imported.requested().to_string());
  }

  imports
    .into_iter()
    .map(|(source, names)| (source, names.into_iter().collect()))
    .collect()
}

/// Something the shaker can remove on its own.
enum Unit {
  /// An import specifier, identified by its local binding
  Import { local: Id, declaration: Span },
  Declarator { span: Span, bindings: Vec<Id> },
  /// A function, class or enum declaration
  Declaration { span: Span, binding: Id },
  Statement { span: Span },
  ExportSpecifier { span: Span },
  Property { span: Span },
}

struct RemovalPlan {
  /// Top-level items, declarators, export specifiers and object properties to drop
  spans: HashSet<Span>,
  /// Bindings to drop from import specifier lists and destructuring patterns
  bindings: HashSet<Id>,
}

impl RemovalPlan {
  fn new(
    module: &Module,
    graph: &DependencyGraph,
    normalized: &NormalizedModule,
    reachable: &IndexSet<NodeId>,
  ) -> Self {
    let reachable_spans: Vec<Span> = reachable
      .iter()
      .map(|id| graph.node(*id).span)
      .filter(|span| !span.is_dummy())
      .collect();
    let checker = Liveness {
      graph,
      normalized,
      reachable,
      reachable_spans,
    };

    let units = collect_units(module, graph);
    let mut removed: Vec<Span> = vec![];
    let mut plan = RemovalPlan {
      spans: HashSet::new(),
      bindings: HashSet::new(),
    };

    // Removing one unit can drop the last reference to another one
    loop {
      let mut changed = false;

      for unit in &units {
        let dead = match unit {
          Unit::Import { local, declaration } => {
            !plan.bindings.contains(local) && checker.is_dead(local, *declaration, &removed)
          }
          Unit::Declarator { span, bindings } => {
            !plan.spans.contains(span)
              && !checker.contains_reachable(*span, true)
              && bindings
                .iter()
                .all(|binding| checker.is_dead(binding, *span, &removed))
          }
          Unit::Declaration { span, binding } => {
            !plan.spans.contains(span) && checker.is_dead(binding, *span, &removed)
          }
          Unit::Statement { span } | Unit::ExportSpecifier { span } | Unit::Property { span } => {
            !plan.spans.contains(span) && !checker.contains_reachable(*span, false)
          }
        };
        if !dead {
          continue;
        }

        changed = true;
        match unit {
          Unit::Import { local, .. } => {
            plan.bindings.insert(local.clone());
          }
          Unit::Declarator { span, .. }
          | Unit::Declaration { span, .. }
          | Unit::Statement { span }
          | Unit::ExportSpecifier { span }
          | Unit::Property { span } => {
            plan.spans.insert(*span);
            removed.push(*span);
          }
        }
      }

      if !changed {
        break;
      }
    }

    // Destructured bindings nobody needs go from the patterns that are kept
    for unit in &units {
      if let Unit::Declarator { span, bindings } = unit {
        if plan.spans.contains(span) {
          continue;
        }
        for binding in bindings {
          if checker.is_dead(binding, *span, &removed) {
            plan.bindings.insert(binding.clone());
          }
        }
      }
    }

    plan
  }

  fn apply(&self, module: &mut Module) {
    module.body.retain_mut(|item| self.keep_item(item));
    module.visit_mut_with(&mut PropertyRemover { spans: &self.spans });
  }

  /// Drops what is planned inside `item`; returns `false` when nothing of it remains.
  fn keep_item(&self, item: &mut ModuleItem) -> bool {
    let span = item.span();
    if self.spans.contains(&span) {
      return false;
    }

    match item {
      ModuleItem::ModuleDecl(ModuleDecl::Import(import)) if !import.specifiers.is_empty() => {
        import
          .specifiers
          .retain(|specifier| !self.bindings.contains(&id!(import_local(specifier))));
        !import.specifiers.is_empty()
      }
      ModuleItem::Stmt(Stmt::Decl(Decl::Var(var)))
      | ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
        decl: Decl::Var(var),
        ..
      })) => {
        var.decls.retain_mut(|decl| {
          if self.spans.contains(&decl.span) {
            return false;
          }
          self.remove_from_pat(&mut decl.name);
          true
        });
        !var.decls.is_empty()
      }
      ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(named)) if !named.specifiers.is_empty() => {
        named
          .specifiers
          .retain(|specifier| !self.spans.contains(&export_specifier_span(specifier)));
        !named.specifiers.is_empty()
      }
      _ => true,
    }
  }

  fn is_pattern_empty(&self, pat: &Pat) -> bool {
    match pat {
      Pat::Ident(ident) => self.bindings.contains(&id!(ident.id)),
      Pat::Object(obj) => obj.props.is_empty(),
      Pat::Array(arr) => arr.elems.iter().all(Option::is_none),
      Pat::Rest(rest) => self.is_pattern_empty(&rest.arg),
      Pat::Assign(assign) => self.is_pattern_empty(&assign.left),
      _ => false,
    }
  }

  fn remove_from_pat(&self, pat: &mut Pat) {
    match pat {
      Pat::Object(obj) => {
        let mut has_rest = false;
        for prop in obj.props.iter_mut() {
          match prop {
            ObjectPatProp::KeyValue(kv) => self.remove_from_pat(&mut kv.value),
            ObjectPatProp::Rest(rest) => {
              self.remove_from_pat(&mut rest.arg);
              has_rest = true;
            }
            ObjectPatProp::Assign(_) => {}
          }
        }

        // Removing a property would change what the rest element collects
        if has_rest {
          return;
        }

        obj.props.retain(|prop| match prop {
          ObjectPatProp::KeyValue(kv) => !self.is_pattern_empty(&kv.value),
          ObjectPatProp::Assign(assign) => !self.bindings.contains(&id!(assign.key.id)),
          ObjectPatProp::Rest(rest) => !self.is_pattern_empty(&rest.arg),
        });
      }
      Pat::Array(arr) => {
        for elem in arr.elems.iter_mut().flatten() {
          self.remove_from_pat(elem);
        }

        // Holes keep the positions of the remaining elements: `[a, , c]`
        for elem in &mut arr.elems {
          if matches!(elem, Some(pat) if self.is_pattern_empty(pat)) {
            *elem = None;
          }
        }

        while matches!(arr.elems.last(), Some(None)) {
          arr.elems.pop();
        }
      }
      Pat::Assign(assign) => self.remove_from_pat(&mut assign.left),
      _ => {}
    }
  }
}

struct Liveness<'a> {
  graph: &'a DependencyGraph,
  normalized: &'a NormalizedModule,
  reachable: &'a IndexSet<NodeId>,
  reachable_spans: Vec<Span>,
}

impl Liveness<'_> {
  /// A binding is dead when it is unreachable and every reference to it sits in removed code
  /// or in its own declaration.
  fn is_dead(&self, binding: &Id, own: Span, removed: &[Span]) -> bool {
    let reachable = self
      .graph
      .node_for_binding(binding)
      .is_some_and(|node| self.reachable.contains(&node));
    if reachable {
      return false;
    }

    let Some(binding) = self.normalized.scopes.lookup(binding) else {
      return true;
    };
    let mut excluded = removed.to_vec();
    excluded.push(own);
    self.normalized.scopes.live_references(binding, &excluded) == 0
  }

  /// Whether a reachable node lies within `span` (or is exactly `span` when `exact`).
  fn contains_reachable(&self, span: Span, exact: bool) -> bool {
    if span.is_dummy() {
      return true;
    }
    self.reachable_spans.iter().any(|reachable| {
      if exact {
        *reachable == span
      } else {
        span_contains(span, *reachable)
      }
    })
  }
}

fn collect_units(module: &Module, graph: &DependencyGraph) -> Vec<Unit> {
  let mut units = vec![];

  for item in &module.body {
    let span = item.span();
    if span.is_dummy() {
      continue;
    }

    match item {
      ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => {
        for specifier in &import.specifiers {
          units.push(Unit::Import {
            local: id!(import_local(specifier)),
            declaration: span,
          });
        }
        if import.specifiers.is_empty() {
          units.push(Unit::Statement { span });
        }
      }
      ModuleItem::Stmt(Stmt::Decl(decl))
      | ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl { decl, .. })) => match decl {
        Decl::Var(var) => {
          for declarator in &var.decls {
            units.push(Unit::Declarator {
              span: declarator.span,
              bindings: pat_binding_ids(&declarator.name),
            });
          }
        }
        Decl::Fn(func) => units.push(Unit::Declaration {
          span,
          binding: id!(func.ident),
        }),
        Decl::Class(class) => units.push(Unit::Declaration {
          span,
          binding: id!(class.ident),
        }),
        Decl::TsEnum(ts_enum) => units.push(Unit::Declaration {
          span,
          binding: id!(ts_enum.id),
        }),
        _ => {}
      },
      ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(named)) => {
        for specifier in &named.specifiers {
          units.push(Unit::ExportSpecifier {
            span: export_specifier_span(specifier),
          });
        }
      }
      ModuleItem::ModuleDecl(
        ModuleDecl::ExportDefaultDecl(_)
        | ModuleDecl::ExportDefaultExpr(_)
        | ModuleDecl::ExportAll(_),
      ) => units.push(Unit::Statement { span }),
      ModuleItem::ModuleDecl(_) => {}
      ModuleItem::Stmt(_) => units.push(Unit::Statement { span }),
    }
  }

  // Tracked object properties and the properties of `module.exports = { … }`
  for node in graph.nodes() {
    let is_property = match &node.kind {
      NodeKind::Property => true,
      NodeKind::Export(_) => module
        .body
        .iter()
        .any(|item| item.span() != node.span && is_exports_property(item, node.span)),
      _ => false,
    };
    if is_property && !node.span.is_dummy() {
      units.push(Unit::Property { span: node.span });
    }
  }

  units
}

fn is_exports_property(item: &ModuleItem, span: Span) -> bool {
  let ModuleItem::Stmt(Stmt::Expr(ExprStmt { expr, .. })) = item else {
    return false;
  };
  if !span_contains(item.span(), span) {
    return false;
  }
  let Expr::Assign(assign) = unparen(expr) else {
    return false;
  };
  let Expr::Object(object) = unparen(&assign.right) else {
    return false;
  };
  object
    .props
    .iter()
    .any(|prop| matches!(prop, PropOrSpread::Prop(prop) if prop.span() == span))
}

fn import_local(specifier: &ImportSpecifier) -> &Ident {
  match specifier {
    ImportSpecifier::Named(named) => &named.local,
    ImportSpecifier::Default(default) => &default.local,
    ImportSpecifier::Namespace(namespace) => &namespace.local,
  }
}

fn export_specifier_span(specifier: &ExportSpecifier) -> Span {
  match specifier {
    ExportSpecifier::Named(named) => named.span,
    ExportSpecifier::Namespace(namespace) => namespace.span,
    ExportSpecifier::Default(default) => default.exported.span,
  }
}

struct PropertyRemover<'a> {
  spans: &'a HashSet<Span>,
}

impl VisitMut for PropertyRemover<'_> {
  noop_visit_mut_type!();

  fn visit_mut_object_lit(&mut self, node: &mut ObjectLit) {
    node.props.retain(|prop| match prop {
      PropOrSpread::Prop(prop) => !self.spans.contains(&prop.span()),
      PropOrSpread::Spread(_) => true,
    });
    node.visit_mut_children_with(self);
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;
  use pretty_assertions::assert_eq;
  use tagcss_swc_runner::test_utils::run_test_module;
  use tracing_test::traced_test;

  use super::*;

  fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
  }

  fn shake_code(code: &str, requested: &[&str]) -> (String, ShakeResult) {
    let result = run_test_module(code, |context, module| {
      shake(
        module,
        &names(requested),
        &ShakerOptions::new(context.unresolved_mark),
      )
    });
    (result.output_code, result.result)
  }

  #[test]
  fn test_shake_everything_away() {
    let (output, result) = shake_code(
      indoc! {r#"
        const { whiteColor: color, anotherColor } = require('colors');
        const a = color || anotherColor;
        color.green = '#0f0';
      "#},
      &[],
    );

    assert_eq!(output, "module.exports = [];\n");
    assert!(result.imports.is_empty());
  }

  #[test]
  fn test_shake_keeps_mutations_of_requested_binding() {
    let (output, result) = shake_code(
      indoc! {r#"
        const { whiteColor: color, anotherColor } = require('colors');
        const a = color || anotherColor;
        color.green = '#0f0';
      "#},
      &["color"],
    );

    assert_eq!(
      output,
      indoc! {r#"
        const { whiteColor: color } = require('colors');
        color.green = '#0f0';
        exports.color = color;
      "#}
    );
    assert_eq!(
      result.imports,
      BTreeMap::from([("colors".to_string(), names(&["whiteColor"]))])
    );
  }

  #[test]
  fn test_shake_object_properties() {
    let (output, _) = shake_code(
      indoc! {r#"
        const key = 'blue';
        const obj = { blue: '#00F', red: '#F00' };
        const blue = obj[key];
        const unrelated = obj.red;
      "#},
      &["blue"],
    );

    assert!(output.contains("const key = 'blue';"), "{output}");
    assert!(output.contains("blue: '#00F'"), "{output}");
    assert!(output.contains("const blue = obj[key];"), "{output}");
    assert!(!output.contains("red"), "{output}");
    assert!(output.ends_with("exports.blue = blue;\n"), "{output}");
  }

  #[test]
  fn test_shake_unfolded_namespace() {
    let (output, result) = shake_code(
      indoc! {r#"
        import * as ns from 'm';
        use(ns.Title);
      "#},
      &[],
    );
    assert_eq!(
      output.replace("{ }", "{}"),
      indoc! {r#"
        import { Title } from 'm';
        use(Title);
        export {};
      "#}
    );
    assert_eq!(
      result.imports,
      BTreeMap::from([("m".to_string(), names(&["Title"]))])
    );

    let (output, result) = shake_code(
      indoc! {r#"
        import * as ns from 'm';
        const unused = ns.Title;
      "#},
      &[],
    );
    assert_eq!(output.replace("{ }", "{}"), "export {};\n");
    assert!(result.imports.is_empty());
  }

  #[test]
  fn test_shake_keeps_calls_into_other_modules() {
    let (output, result) = shake_code(
      indoc! {r#"
        import { setup, theme } from './theme';
        setup();
        export const color = theme.color;
        export const other = 1;
      "#},
      &["color"],
    );

    assert_eq!(
      output,
      indoc! {r#"
        import { setup, theme } from './theme';
        setup();
        export const color = theme.color;
      "#}
    );
    assert_eq!(
      result.imports,
      BTreeMap::from([("./theme".to_string(), names(&["setup", "theme"]))])
    );
  }

  #[test]
  fn test_shake_esm_exports() {
    let (output, result) = shake_code(
      indoc! {r#"
        import { a, b } from './ab';
        import { unused } from './unused';
        export const x = a;
        export const y = b;
        export function z() {
          return unused;
        }
      "#},
      &["x"],
    );

    assert_eq!(
      output,
      indoc! {r#"
        import { a } from './ab';
        export const x = a;
      "#}
    );
    assert_eq!(
      result.imports,
      BTreeMap::from([("./ab".to_string(), names(&["a"]))])
    );
  }

  #[test]
  fn test_shake_named_exports_and_reexports() {
    let (output, result) = shake_code(
      indoc! {r#"
        export { red } from './colors';
        export { blue as primary } from './colors';
        export * from './all';
        const local = 1;
        const other = 2;
        export { local, other };
      "#},
      &["red", "local", "missing"],
    );

    assert_eq!(
      output,
      indoc! {r#"
        export { red } from './colors';
        export * from './all';
        const local = 1;
        export { local };
      "#}
    );
    assert_eq!(
      result.imports,
      BTreeMap::from([
        ("./all".to_string(), names(&["*"])),
        ("./colors".to_string(), names(&["red"])),
      ])
    );
  }

  #[test]
  fn test_shake_compiled_commonjs() {
    let (output, _) = shake_code(
      indoc! {r#"
        "use strict";
        Object.defineProperty(exports, "__esModule", { value: true });
        exports.b = exports.a = void 0;
        const a = 1;
        exports.a = a;
        const b = 2;
        exports.b = b;
      "#},
      &["a"],
    );

    assert!(output.starts_with("\"use strict\";\n"), "{output}");
    assert!(output.contains("__esModule"), "{output}");
    assert!(output.contains("exports.b = exports.a = void 0;"), "{output}");
    assert!(output.contains("const a = 1;\nexports.a = a;"), "{output}");
    assert!(!output.contains("const b"), "{output}");
    assert!(!output.contains("exports.b = b"), "{output}");
  }

  #[test]
  fn test_shake_module_exports_object() {
    let (output, _) = shake_code(
      indoc! {r#"
        const a = 1;
        const b = 2;
        module.exports = { a, b };
      "#},
      &["b"],
    );

    assert!(!output.contains("const a"), "{output}");
    assert!(output.contains("const b = 2;"), "{output}");
    assert!(output.contains("module.exports = {"), "{output}");
  }

  #[test]
  fn test_shake_cascades_through_unused_declarations() {
    let (output, _) = shake_code(
      indoc! {r#"
        import { helper } from './helper';
        const base = helper(1);
        const derived = base * 2;
        function unusedFn() {
          return derived;
        }
        export const kept = 1;
      "#},
      &["kept"],
    );

    assert_eq!(output, "export const kept = 1;\n");
  }

  #[test]
  fn test_shake_patterns_leave_holes() {
    let (output, _) = shake_code(
      indoc! {r#"
        const [first, second, third] = list;
        const { a, ...rest } = object;
        export { second };
      "#},
      &["second"],
    );

    assert_eq!(
      output,
      indoc! {r#"
        const [, second] = list;
        export { second };
      "#}
    );
  }

  #[test]
  fn test_wildcard_and_commonjs_default_keep_everything() {
    let code = indoc! {r#"
      const a = require('a');
      exports.x = a;
      exports.y = 2;
    "#};

    for requested in [&["*"][..], &["default"][..]] {
      let (output, result) = shake_code(code, requested);
      assert_eq!(output, code);
      assert_eq!(
        result.imports,
        BTreeMap::from([("a".to_string(), names(&["*"]))])
      );
    }
  }

  #[test]
  fn test_shake_is_idempotent() {
    let code = indoc! {r#"
      const { whiteColor: color, anotherColor } = require('colors');
      const a = color || anotherColor;
      color.green = '#0f0';
    "#};

    for requested in [names(&[]), names(&["color"])] {
      run_test_module(code, |context, module| {
        let options = ShakerOptions::new(context.unresolved_mark);
        shake(module, &requested, &options);
        let once = module.clone();
        shake(module, &requested, &options);
        assert_eq!(*module, once);
      });
    }
  }

  #[test]
  #[traced_test]
  fn test_shake_reports_unfolding_warnings() {
    let (output, result) = shake_code(
      indoc! {r#"
        const ns = require('m');
        export const value = ns.get();
      "#},
      &["value"],
    );

    assert_eq!(result.warnings.len(), 1);
    assert!(logs_contain("Namespace `ns` of `m` is used as a whole"));
    assert!(output.contains("const ns = require('m');"), "{output}");
    assert_eq!(
      result.imports,
      BTreeMap::from([("m".to_string(), names(&["*"]))])
    );
  }
}
