//! Dependency graph over the top-level code of one module.
//!
//! Nodes are module-scope bindings, the declarations that give them values, statically read
//! object properties, exports and the remaining top-level statements. An edge `a -> b` means
//! `a` cannot be kept without `b`.

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use indexmap::IndexMap;
use indexmap::IndexSet;
use swc_core::common::Span;
use swc_core::common::Spanned;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::noop_visit_type;
use swc_core::ecma::visit::Visit;
use swc_core::ecma::visit::VisitWith;

use crate::id;
use crate::normalize::ExportedName;
use crate::normalize::ImportedName;
use crate::normalize::NormalizedModule;
use crate::static_value::StaticEvaluator;
use crate::utils::member_root;
use crate::utils::pat_binding_ids;
use crate::utils::span_contains;
use crate::utils::unparen;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
  /// A module-scope binding
  Binding,
  /// An import specifier, a variable declarator or a function, class or enum declaration
  Declaration,
  /// One property of a `const` object literal that is only ever read with static keys
  Property,
  Export(ExportedName),
  Reexport(ExportedName),
  /// Any other top-level statement
  Statement,
}

#[derive(Clone, Debug)]
pub struct GraphNode {
  pub id: NodeId,
  pub kind: NodeKind,
  pub span: Span,
  pub binding: Option<Id>,
  /// `depth:name`, for binding nodes
  pub binding_key: Option<String>,
  pub dependencies: Vec<NodeId>,
  pub dependents: Vec<NodeId>,
  /// Must be kept regardless of what is requested from the module
  pub has_external_effects: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
  Dependencies,
  Dependents,
}

#[derive(Clone, Debug, Default)]
pub struct GraphOptions {
  /// Treat every top-level expression statement as having external effects
  pub keep_side_effects: bool,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
  nodes: Vec<GraphNode>,
  bindings: HashMap<Id, NodeId>,
  keys: HashMap<String, NodeId>,
  /// Member expression span to the property node it reads
  tracked_reads: HashMap<Span, NodeId>,
}

impl DependencyGraph {
  pub fn build(module: &Module, normalized: &NormalizedModule) -> Self {
    Self::build_with_options(module, normalized, &GraphOptions::default())
  }

  pub fn build_with_options(
    module: &Module,
    normalized: &NormalizedModule,
    options: &GraphOptions,
  ) -> Self {
    let mut builder = GraphBuilder {
      module,
      normalized,
      options,
      graph: DependencyGraph::default(),
      function_effects: HashMap::new(),
      known_functions: HashSet::new(),
      opaque_functions: HashSet::new(),
      import_locals: normalized
        .imports
        .iter()
        .filter_map(|import| import.local.clone())
        .collect(),
      tracked: HashSet::new(),
      property_values: vec![],
    };
    builder.build();

    let graph = builder.graph;
    tracing::trace!(
      nodes = graph.nodes.len(),
      tracked_reads = graph.tracked_reads.len(),
      "Built dependency graph"
    );
    graph
  }

  pub fn nodes(&self) -> &[GraphNode] {
    &self.nodes
  }

  pub fn node(&self, id: NodeId) -> &GraphNode {
    &self.nodes[id.0 as usize]
  }

  pub fn node_for_binding(&self, id: &Id) -> Option<NodeId> {
    self.bindings.get(id).copied()
  }

  pub fn node_for_key(&self, key: &str) -> Option<NodeId> {
    self.keys.get(key).copied()
  }

  pub fn dependencies_of(&self, id: NodeId) -> &[NodeId] {
    &self.node(id).dependencies
  }

  pub fn dependents_of(&self, id: NodeId) -> &[NodeId] {
    &self.node(id).dependents
  }

  pub fn dependencies_of_binding(&self, key: &str) -> &[NodeId] {
    self
      .node_for_key(key)
      .map(|id| self.dependencies_of(id))
      .unwrap_or_default()
  }

  pub fn dependents_of_binding(&self, key: &str) -> &[NodeId] {
    self
      .node_for_key(key)
      .map(|id| self.dependents_of(id))
      .unwrap_or_default()
  }

  /// Breadth-first search from `start` (exclusive) for the first node matching `predicate`.
  pub fn find<P>(&self, start: NodeId, direction: Direction, predicate: P) -> Option<NodeId>
  where
    P: Fn(&GraphNode) -> bool,
  {
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
      let next = match direction {
        Direction::Dependencies => self.dependencies_of(current),
        Direction::Dependents => self.dependents_of(current),
      };
      for &id in next {
        if !seen.insert(id) {
          continue;
        }
        if predicate(self.node(id)) {
          return Some(id);
        }
        queue.push_back(id);
      }
    }

    None
  }

  /// Every node the `roots` transitively depend on, roots included.
  pub fn reachable_from(&self, roots: impl IntoIterator<Item = NodeId>) -> IndexSet<NodeId> {
    let mut reachable = IndexSet::new();
    let mut queue: VecDeque<NodeId> = roots.into_iter().collect();

    while let Some(current) = queue.pop_front() {
      if !reachable.insert(current) {
        continue;
      }
      queue.extend(self.dependencies_of(current).iter().copied());
    }

    reachable
  }

  /// The top-level declarations `expr` needs, in source order.
  pub fn declarations_for(&self, expr: &Expr) -> Vec<NodeId> {
    let mut references = References::new(&self.bindings, &self.tracked_reads);
    expr.visit_with(&mut references);

    let mut declarations: Vec<NodeId> = self
      .reachable_from(references.found)
      .into_iter()
      .filter(|id| self.node(*id).kind == NodeKind::Declaration)
      .collect();
    declarations.sort_by_key(|id| self.node(*id).span.lo);
    declarations
  }

  fn add_node(&mut self, kind: NodeKind, span: Span) -> NodeId {
    let id = NodeId(self.nodes.len() as u32);
    self.nodes.push(GraphNode {
      id,
      kind,
      span,
      binding: None,
      binding_key: None,
      dependencies: vec![],
      dependents: vec![],
      has_external_effects: false,
    });
    id
  }

  /// Records that `from` needs `to`.
  fn add_edge(&mut self, from: NodeId, to: NodeId) {
    if from == to || self.nodes[from.0 as usize].dependencies.contains(&to) {
      return;
    }
    self.nodes[from.0 as usize].dependencies.push(to);
    self.nodes[to.0 as usize].dependents.push(from);
  }

  fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
    &mut self.nodes[id.0 as usize]
  }
}

struct GraphBuilder<'a> {
  module: &'a Module,
  normalized: &'a NormalizedModule,
  options: &'a GraphOptions,
  graph: DependencyGraph,
  /// Module bindings each local function mutates when called
  function_effects: HashMap<Id, Vec<NodeId>>,
  /// Local functions whose calls are fully described by `function_effects`
  known_functions: HashSet<Id>,
  /// Local functions that call into code the graph cannot see
  opaque_functions: HashSet<Id>,
  import_locals: HashSet<Id>,
  tracked: HashSet<Id>,
  property_values: Vec<(NodeId, &'a Prop)>,
}

impl<'a> GraphBuilder<'a> {
  fn build(&mut self) {
    let module = self.module;
    let normalized = self.normalized;
    let scopes = &normalized.scopes;

    for (binding_id, binding) in scopes.top_level_bindings() {
      let node = self.graph.add_node(NodeKind::Binding, binding.declaring_span);
      let key = scopes.binding_key(binding_id);
      let graph_node = self.graph.node_mut(node);
      graph_node.binding = Some(binding.id.clone());
      graph_node.binding_key = Some(key.clone());
      self.graph.bindings.insert(binding.id.clone(), node);
      self.graph.keys.insert(key, node);
    }

    self.collect_function_effects();
    self.track_objects();

    for (node, prop) in std::mem::take(&mut self.property_values) {
      self.depend_on(node, prop);
    }

    for item in &module.body {
      self.visit_item(item);
    }

    self.link_exports();
  }

  fn visit_item(&mut self, item: &'a ModuleItem) {
    let item_span = item.span();

    match item {
      ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => {
        if import.type_only {
          return;
        }
        if import.specifiers.is_empty() {
          let node = self.graph.add_node(NodeKind::Statement, item_span);
          self.graph.node_mut(node).has_external_effects = true;
          return;
        }
        for specifier in &import.specifiers {
          let local = match specifier {
            ImportSpecifier::Named(named) => &named.local,
            ImportSpecifier::Default(default) => &default.local,
            ImportSpecifier::Namespace(namespace) => &namespace.local,
          };
          let node = self.graph.add_node(NodeKind::Declaration, specifier.span());
          self.declares(node, &id!(local));
        }
      }
      ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => {
        self.visit_decl(&export.decl, item_span)
      }
      ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(export)) => match &export.decl {
        DefaultDecl::Fn(FnExpr {
          ident: Some(ident),
          function,
        }) => {
          let node = self.graph.add_node(NodeKind::Declaration, item_span);
          self.declares(node, &id!(ident));
          self.depend_on(node, &**function);
        }
        DefaultDecl::Class(ClassExpr {
          ident: Some(ident),
          class,
        }) => {
          let node = self.graph.add_node(NodeKind::Declaration, item_span);
          self.declares(node, &id!(ident));
          self.depend_on(node, &**class);
        }
        // Anonymous defaults are linked through their export record
        _ => {}
      },
      ModuleItem::ModuleDecl(_) => {}
      ModuleItem::Stmt(Stmt::Decl(decl)) => self.visit_decl(decl, item_span),
      ModuleItem::Stmt(stmt) => self.visit_stmt(stmt, item_span),
    }
  }

  fn visit_decl(&mut self, decl: &'a Decl, item_span: Span) {
    match decl {
      Decl::Var(var) => {
        for declarator in &var.decls {
          self.visit_declarator(declarator);
        }
      }
      Decl::Fn(func) => {
        let node = self.graph.add_node(NodeKind::Declaration, item_span);
        self.declares(node, &id!(func.ident));
        self.depend_on(node, &*func.function);
      }
      Decl::Class(class) => {
        let node = self.graph.add_node(NodeKind::Declaration, item_span);
        self.declares(node, &id!(class.ident));
        self.depend_on(node, &*class.class);
      }
      Decl::TsEnum(ts_enum) => {
        let node = self.graph.add_node(NodeKind::Declaration, item_span);
        self.declares(node, &id!(ts_enum.id));
        self.depend_on(node, &ts_enum.members);
      }
      _ => {}
    }
  }

  fn visit_declarator(&mut self, declarator: &'a VarDeclarator) {
    let node = self.graph.add_node(NodeKind::Declaration, declarator.span);
    for id in pat_binding_ids(&declarator.name) {
      self.declares(node, &id);
    }

    let tracked = matches!(
      &declarator.name,
      Pat::Ident(ident) if self.tracked.contains(&id!(ident.id))
    );
    // Tracked objects depend on nothing but the properties that are read
    if tracked {
      return;
    }

    self.depend_on(node, &declarator.name);
    self.depend_on(node, &declarator.init);
    self.add_mutations(node, &declarator.init);
  }

  fn visit_stmt(&mut self, stmt: &'a Stmt, span: Span) {
    let normalized = self.normalized;
    let flagged = normalized.module_flag_spans.contains(&span);
    let exporting = normalized
      .exports
      .iter()
      .any(|export| span_contains(span, export.span))
      || normalized
        .reexports
        .iter()
        .any(|reexport| span_contains(span, reexport.span));
    if exporting && !flagged {
      return;
    }

    let side_effect_import = normalized.imports.iter().any(|import| {
      import.imported == ImportedName::SideEffect && span_contains(span, import.span)
    });
    let directive = matches!(
      stmt,
      Stmt::Expr(ExprStmt { expr, .. }) if matches!(&**expr, Expr::Lit(Lit::Str(_)))
    );
    let kept_expression = match stmt {
      Stmt::Expr(expr) => self.options.keep_side_effects || self.calls_opaque_code(&*expr.expr),
      _ => false,
    };

    let node = self.graph.add_node(NodeKind::Statement, span);
    self.graph.node_mut(node).has_external_effects =
      flagged || side_effect_import || directive || kept_expression;

    // `var`s declared in nested blocks are module bindings owned by this statement
    for (_, binding) in normalized.scopes.top_level_bindings() {
      if span_contains(span, binding.declaring_span) {
        self.declares(node, &binding.id);
      }
    }

    self.depend_on(node, stmt);
    self.add_mutations(node, stmt);
  }

  fn calls_opaque_code<N>(&self, subtree: &N) -> bool
  where
    N: for<'g> VisitWith<OpaqueCalls<'g>>,
  {
    let mut calls = OpaqueCalls {
      bindings: &self.graph.bindings,
      import_locals: &self.import_locals,
      known_functions: &self.known_functions,
      opaque_functions: &self.opaque_functions,
      found: false,
    };
    subtree.visit_with(&mut calls);
    calls.found
  }

  fn link_exports(&mut self) {
    let normalized = self.normalized;

    for export in &normalized.exports {
      let node = self
        .graph
        .add_node(NodeKind::Export(export.exported.clone()), export.span);
      self.link_record(node, export.local.as_ref(), export.span);
    }

    for reexport in &normalized.reexports {
      let node = self
        .graph
        .add_node(NodeKind::Reexport(reexport.exported.clone()), reexport.span);
      self.link_record(node, None, reexport.span);
    }
  }

  fn link_record(&mut self, node: NodeId, local: Option<&Id>, span: Span) {
    if let Some(binding) = local.and_then(|local| self.graph.node_for_binding(local)) {
      self.graph.add_edge(node, binding);
      return;
    }

    let module = self.module;
    let Some(item) = module
      .body
      .iter()
      .find(|item| span_contains(item.span(), span))
    else {
      return;
    };

    match item {
      ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(export)) => {
        self.depend_on(node, &export.expr)
      }
      ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(export)) => {
        self.depend_on(node, &export.decl)
      }
      ModuleItem::ModuleDecl(_) => {}
      ModuleItem::Stmt(stmt) if item.span() == span => self.depend_on(node, stmt),
      ModuleItem::Stmt(stmt) => {
        if let Some(prop) = exported_prop(stmt, span) {
          self.depend_on(node, prop);
        }
      }
    }
  }

  /// The bindings introduced by `node` depend on it.
  fn declares(&mut self, node: NodeId, id: &Id) {
    if let Some(binding) = self.graph.node_for_binding(id) {
      self.graph.add_edge(binding, node);
    }
  }

  /// `node` depends on every module binding and tracked property `subtree` reads.
  ///
  /// Bindings introduced by `node` itself are skipped.
  fn depend_on<N>(&mut self, node: NodeId, subtree: &N)
  where
    N: for<'g> VisitWith<References<'g>>,
  {
    let mut references = References::new(&self.graph.bindings, &self.graph.tracked_reads);
    subtree.visit_with(&mut references);

    for dependency in references.found {
      if self.graph.node(dependency).dependencies.contains(&node) {
        continue;
      }
      self.graph.add_edge(node, dependency);
    }
  }

  /// Bindings mutated by `subtree` depend on `node`.
  fn add_mutations<N>(&mut self, node: NodeId, subtree: &N)
  where
    N: for<'g> VisitWith<Effects<'g>>,
  {
    let mut effects = Effects::new(&self.graph.bindings, &self.function_effects, false);
    subtree.visit_with(&mut effects);

    for binding in effects.mutated {
      self.graph.add_edge(binding, node);
      self.graph.add_edge(node, binding);
    }
  }

  fn collect_function_effects(&mut self) {
    let module = self.module;
    let mut functions: Vec<(Id, Callable<'a>)> = vec![];

    for item in &module.body {
      match item {
        ModuleItem::Stmt(Stmt::Decl(Decl::Fn(func)))
        | ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
          decl: Decl::Fn(func),
          ..
        })) => functions.push((id!(func.ident), Callable::Function(&func.function))),
        ModuleItem::Stmt(Stmt::Decl(Decl::Var(var)))
        | ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
          decl: Decl::Var(var),
          ..
        })) => {
          for decl in &var.decls {
            let (Pat::Ident(ident), Some(init)) = (&decl.name, &decl.init) else {
              continue;
            };
            match unparen(init) {
              Expr::Fn(func) => functions.push((id!(ident.id), Callable::Function(&func.function))),
              Expr::Arrow(arrow) => functions.push((id!(ident.id), Callable::Arrow(arrow))),
              _ => {}
            }
          }
        }
        _ => {}
      }
    }

    // Functions calling each other: iterate until the mutated sets stop growing
    loop {
      let mut changed = false;

      for (id, callable) in &functions {
        let mut effects = Effects::new(&self.graph.bindings, &self.function_effects, true);
        match callable {
          Callable::Function(function) => function.visit_with(&mut effects),
          Callable::Arrow(arrow) => arrow.visit_with(&mut effects),
        }
        let mutated: Vec<NodeId> = effects.mutated.into_iter().collect();

        let known = self.function_effects.get(id).map_or(0, |known| known.len());
        if mutated.len() != known {
          changed = true;
          self.function_effects.insert(id.clone(), mutated);
        }
      }

      if !changed {
        break;
      }
    }

    self.known_functions = functions.iter().map(|(id, _)| id.clone()).collect();
    loop {
      let mut changed = false;

      for (id, callable) in &functions {
        if self.opaque_functions.contains(id) {
          continue;
        }
        let opaque = match callable {
          Callable::Function(function) => self.calls_opaque_code(&function.body),
          Callable::Arrow(arrow) => self.calls_opaque_code(&*arrow.body),
        };
        if opaque {
          changed = true;
          self.opaque_functions.insert(id.clone());
        }
      }

      if !changed {
        break;
      }
    }
  }

  /// Finds `const` object literals whose every read is a member access with a statically
  /// known key, and gives each of their properties its own node.
  fn track_objects(&mut self) {
    let module = self.module;

    for item in &module.body {
      let ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) = item else {
        continue;
      };
      if var.kind != VarDeclKind::Const {
        continue;
      }

      for declarator in &var.decls {
        let (Pat::Ident(ident), Some(init)) = (&declarator.name, &declarator.init) else {
          continue;
        };
        let Expr::Object(object) = unparen(init) else {
          continue;
        };

        let mut evaluator = StaticEvaluator::new(module);
        let Some(properties) = object_properties(object, &mut evaluator) else {
          continue;
        };

        let mut reads = ObjectReads {
          target: id!(ident.id),
          declarator: declarator.span,
          evaluator,
          reads: vec![],
          escapes: false,
        };
        module.visit_with(&mut reads);
        if reads.escapes {
          continue;
        }

        let mut keys: IndexMap<String, NodeId> = IndexMap::new();
        for (key, prop) in properties {
          let node = self.graph.add_node(NodeKind::Property, prop.span());
          self.property_values.push((node, prop));
          keys.insert(key, node);
        }
        for (member_span, key) in reads.reads {
          if let Some(node) = keys.get(&key) {
            if !member_span.is_dummy() {
              self.graph.tracked_reads.insert(member_span, *node);
            }
          }
        }

        tracing::trace!(object = %ident.id.sym, properties = keys.len(), "Tracking object");
        self.tracked.insert(id!(ident.id));
      }
    }
  }
}

enum Callable<'a> {
  Function(&'a Function),
  Arrow(&'a ArrowExpr),
}

/// Statically keyed properties of an object literal, or `None` when the shape is dynamic.
fn object_properties<'a>(
  object: &'a ObjectLit,
  evaluator: &mut StaticEvaluator<'_>,
) -> Option<Vec<(String, &'a Prop)>> {
  let mut properties = vec![];

  for prop in &object.props {
    let PropOrSpread::Prop(prop) = prop else {
      return None;
    };
    let key = match &**prop {
      Prop::KeyValue(kv) => evaluator.evaluate_prop_name(&kv.key).ok()?,
      Prop::Method(method) => evaluator.evaluate_prop_name(&method.key).ok()?,
      Prop::Shorthand(ident) => ident.sym.to_string(),
      Prop::Getter(_) | Prop::Setter(_) | Prop::Assign(_) => return None,
    };
    properties.push((key, &**prop));
  }

  Some(properties)
}

/// The property of a `module.exports = { … }` object with the given span.
fn exported_prop(stmt: &Stmt, span: Span) -> Option<&Prop> {
  let Stmt::Expr(ExprStmt { expr, .. }) = stmt else {
    return None;
  };
  let mut current = unparen(expr);
  while let Expr::Assign(assign) = current {
    current = unparen(&assign.right);
  }
  let Expr::Object(object) = current else {
    return None;
  };

  object.props.iter().find_map(|prop| match prop {
    PropOrSpread::Prop(prop) if prop.span() == span => Some(&**prop),
    _ => None,
  })
}

/// Collects the graph nodes a subtree reads.
struct References<'g> {
  bindings: &'g HashMap<Id, NodeId>,
  tracked_reads: &'g HashMap<Span, NodeId>,
  found: IndexSet<NodeId>,
}

impl<'g> References<'g> {
  fn new(bindings: &'g HashMap<Id, NodeId>, tracked_reads: &'g HashMap<Span, NodeId>) -> Self {
    References {
      bindings,
      tracked_reads,
      found: IndexSet::new(),
    }
  }
}

impl Visit for References<'_> {
  noop_visit_type!();

  fn visit_ident(&mut self, node: &Ident) {
    if let Some(binding) = self.bindings.get(&id!(node)) {
      self.found.insert(*binding);
    }
  }

  fn visit_member_expr(&mut self, node: &MemberExpr) {
    if let Some(property) = self.tracked_reads.get(&node.span) {
      self.found.insert(*property);
      node.obj.visit_with(self);
      if let MemberProp::Computed(computed) = &node.prop {
        computed.visit_with(self);
      }
      return;
    }
    node.visit_children_with(self);
  }

  // The value of a sequence is its last operand
  fn visit_seq_expr(&mut self, node: &SeqExpr) {
    let Some((last, rest)) = node.exprs.split_last() else {
      return;
    };
    for expr in rest {
      if has_effects(expr) {
        expr.visit_with(self);
      }
    }
    last.visit_with(self);
  }
}

fn has_effects(expr: &Expr) -> bool {
  struct Finder {
    found: bool,
  }

  impl Visit for Finder {
    noop_visit_type!();

    fn visit_expr(&mut self, node: &Expr) {
      match node {
        Expr::Assign(_)
        | Expr::Update(_)
        | Expr::Call(_)
        | Expr::New(_)
        | Expr::Await(_)
        | Expr::Yield(_)
        | Expr::TaggedTpl(_)
        | Expr::Unary(UnaryExpr {
          op: UnaryOp::Delete,
          ..
        }) => self.found = true,
        Expr::Fn(_) | Expr::Arrow(_) => {}
        _ => node.visit_children_with(self),
      }
    }
  }

  let mut finder = Finder { found: false };
  expr.visit_with(&mut finder);
  finder.found
}

/// Collects the module bindings a subtree mutates: assignments and updates rooted at a
/// binding, `delete`, method calls on a binding, bindings passed as call arguments and calls
/// to local functions that mutate bindings themselves.
struct Effects<'g> {
  bindings: &'g HashMap<Id, NodeId>,
  function_effects: &'g HashMap<Id, Vec<NodeId>>,
  mutated: IndexSet<NodeId>,
  enter_functions: bool,
}

impl<'g> Effects<'g> {
  fn new(
    bindings: &'g HashMap<Id, NodeId>,
    function_effects: &'g HashMap<Id, Vec<NodeId>>,
    enter_functions: bool,
  ) -> Self {
    Effects {
      bindings,
      function_effects,
      mutated: IndexSet::new(),
      enter_functions,
    }
  }

  fn mutate(&mut self, ident: &Ident) {
    if let Some(binding) = self.bindings.get(&id!(ident)) {
      self.mutated.insert(*binding);
    }
  }

  fn mutate_root(&mut self, expr: &Expr) {
    if let Some(root) = member_root(expr) {
      self.mutate(root);
    }
  }

  fn mutate_args<'e>(&mut self, args: impl IntoIterator<Item = &'e ExprOrSpread>) {
    for arg in args {
      self.mutate_root(&arg.expr);
    }
  }

  fn visit_entered<N: VisitWith<Self>>(&mut self, node: &N) {
    let enter_functions = std::mem::replace(&mut self.enter_functions, true);
    node.visit_with(self);
    self.enter_functions = enter_functions;
  }
}

impl Visit for Effects<'_> {
  noop_visit_type!();

  fn visit_assign_expr(&mut self, node: &AssignExpr) {
    match &node.left {
      AssignTarget::Simple(SimpleAssignTarget::Ident(ident)) => self.mutate(&ident.id),
      AssignTarget::Simple(SimpleAssignTarget::Member(member)) => self.mutate_root(&member.obj),
      AssignTarget::Simple(SimpleAssignTarget::Paren(paren)) => self.mutate_root(&paren.expr),
      AssignTarget::Simple(_) => {}
      AssignTarget::Pat(pat) => {
        let mut targets = PatTargets { roots: vec![] };
        pat.visit_with(&mut targets);
        for root in targets.roots {
          self.mutate(&root);
        }
      }
    }
    node.visit_children_with(self);
  }

  fn visit_update_expr(&mut self, node: &UpdateExpr) {
    self.mutate_root(&node.arg);
    node.visit_children_with(self);
  }

  fn visit_unary_expr(&mut self, node: &UnaryExpr) {
    if node.op == UnaryOp::Delete {
      self.mutate_root(&node.arg);
    }
    node.visit_children_with(self);
  }

  fn visit_call_expr(&mut self, node: &CallExpr) {
    if let Callee::Expr(callee) = &node.callee {
      match unparen(callee) {
        Expr::Member(member) => self.mutate_root(&member.obj),
        Expr::Ident(ident) => {
          if let Some(mutated) = self.function_effects.get(&id!(ident)) {
            self.mutated.extend(mutated.iter().copied());
          }
        }
        Expr::Fn(func) => self.visit_entered(&*func.function),
        Expr::Arrow(arrow) => self.visit_entered(arrow),
        _ => {}
      }
    }
    self.mutate_args(&node.args);
    node.visit_children_with(self);
  }

  fn visit_new_expr(&mut self, node: &NewExpr) {
    self.mutate_args(node.args.iter().flatten());
    node.visit_children_with(self);
  }

  fn visit_function(&mut self, node: &Function) {
    if self.enter_functions {
      node.visit_children_with(self);
    }
  }

  fn visit_arrow_expr(&mut self, node: &ArrowExpr) {
    if self.enter_functions {
      node.visit_children_with(self);
    }
  }

  fn visit_constructor(&mut self, node: &Constructor) {
    if self.enter_functions {
      node.visit_children_with(self);
    }
  }

  fn visit_getter_prop(&mut self, node: &GetterProp) {
    if self.enter_functions {
      node.visit_children_with(self);
    }
  }

  fn visit_setter_prop(&mut self, node: &SetterProp) {
    if self.enter_functions {
      node.visit_children_with(self);
    }
  }
}

/// Looks for calls, constructions and tagged templates whose effects the graph does not
/// model. Calls to local functions without such calls inside and method calls on local
/// bindings are covered by [`Effects`]. Nested functions only count when they are invoked
/// in place.
struct OpaqueCalls<'g> {
  bindings: &'g HashMap<Id, NodeId>,
  import_locals: &'g HashSet<Id>,
  known_functions: &'g HashSet<Id>,
  opaque_functions: &'g HashSet<Id>,
  found: bool,
}

impl OpaqueCalls<'_> {
  fn is_known_function(&self, expr: &Expr) -> bool {
    matches!(
      unparen(expr),
      Expr::Ident(ident)
        if self.known_functions.contains(&id!(ident)) && !self.opaque_functions.contains(&id!(ident))
    )
  }

  fn is_local_method(&self, expr: &Expr) -> bool {
    let Expr::Member(member) = unparen(expr) else {
      return false;
    };
    member_root(&member.obj).is_some_and(|root| {
      let root = id!(root);
      self.bindings.contains_key(&root) && !self.import_locals.contains(&root)
    })
  }
}

impl Visit for OpaqueCalls<'_> {
  noop_visit_type!();

  fn visit_call_expr(&mut self, node: &CallExpr) {
    match &node.callee {
      Callee::Expr(callee) => match unparen(callee) {
        Expr::Fn(func) => func.function.body.visit_with(self),
        Expr::Arrow(arrow) => (*arrow.body).visit_with(self),
        callee if self.is_known_function(callee) || self.is_local_method(callee) => {
          callee.visit_with(self)
        }
        _ => self.found = true,
      },
      Callee::Super(_) | Callee::Import(_) => self.found = true,
    }
    node.args.visit_with(self);
  }

  fn visit_new_expr(&mut self, node: &NewExpr) {
    if !self.is_known_function(&node.callee) {
      self.found = true;
    }
    node.args.visit_with(self);
  }

  fn visit_tagged_tpl(&mut self, node: &TaggedTpl) {
    if !self.is_known_function(&node.tag) {
      self.found = true;
    }
    node.tpl.visit_with(self);
  }

  fn visit_opt_call(&mut self, node: &OptCall) {
    self.found = true;
    node.args.visit_with(self);
  }

  fn visit_function(&mut self, _node: &Function) {}

  fn visit_arrow_expr(&mut self, _node: &ArrowExpr) {}

  fn visit_class(&mut self, _node: &Class) {}
}

/// Identifiers assigned by a destructuring assignment target.
struct PatTargets {
  roots: Vec<Ident>,
}

impl Visit for PatTargets {
  noop_visit_type!();

  fn visit_binding_ident(&mut self, node: &BindingIdent) {
    self.roots.push(node.id.clone());
  }

  fn visit_pat(&mut self, node: &Pat) {
    if let Pat::Expr(expr) = node {
      if let Some(root) = member_root(expr) {
        self.roots.push(root.clone());
      }
      return;
    }
    node.visit_children_with(self);
  }

  // Default values are read, not assigned
  fn visit_expr(&mut self, _node: &Expr) {}
}

/// Checks that an object binding is only read through member accesses with known keys.
struct ObjectReads<'a> {
  target: Id,
  declarator: Span,
  evaluator: StaticEvaluator<'a>,
  reads: Vec<(Span, String)>,
  escapes: bool,
}

impl ObjectReads<'_> {
  fn is_target(&self, expr: &Expr) -> bool {
    matches!(unparen(expr), Expr::Ident(ident) if id!(ident) == self.target)
  }

  fn is_target_member(&self, expr: &Expr) -> bool {
    matches!(unparen(expr), Expr::Member(member) if self.is_target(&member.obj))
  }
}

impl Visit for ObjectReads<'_> {
  noop_visit_type!();

  fn visit_var_declarator(&mut self, node: &VarDeclarator) {
    if node.span == self.declarator {
      node.init.visit_with(self);
      return;
    }
    node.visit_children_with(self);
  }

  fn visit_member_expr(&mut self, node: &MemberExpr) {
    if !self.is_target(&node.obj) {
      node.visit_children_with(self);
      return;
    }

    let key = match &node.prop {
      MemberProp::Ident(ident) => Some(ident.sym.to_string()),
      MemberProp::Computed(computed) => {
        computed.expr.visit_with(self);
        self
          .evaluator
          .evaluate(&computed.expr)
          .ok()
          .and_then(|value| value.to_js_string())
      }
      MemberProp::PrivateName(_) => None,
    };

    match key {
      Some(key) => self.reads.push((node.span, key)),
      None => self.escapes = true,
    }
  }

  fn visit_call_expr(&mut self, node: &CallExpr) {
    if let Callee::Expr(callee) = &node.callee {
      if self.is_target_member(callee) {
        self.escapes = true;
      }
    }
    node.visit_children_with(self);
  }

  fn visit_tagged_tpl(&mut self, node: &TaggedTpl) {
    if self.is_target_member(&node.tag) {
      self.escapes = true;
    }
    node.visit_children_with(self);
  }

  fn visit_assign_expr(&mut self, node: &AssignExpr) {
    if let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &node.left {
      if self.is_target(&member.obj) {
        self.escapes = true;
      }
    }
    node.visit_children_with(self);
  }

  fn visit_update_expr(&mut self, node: &UpdateExpr) {
    if self.is_target_member(&node.arg) {
      self.escapes = true;
    }
    node.visit_children_with(self);
  }

  fn visit_unary_expr(&mut self, node: &UnaryExpr) {
    if node.op == UnaryOp::Delete && self.is_target_member(&node.arg) {
      self.escapes = true;
    }
    node.visit_children_with(self);
  }

  fn visit_opt_chain_expr(&mut self, node: &OptChainExpr) {
    if let OptChainBase::Member(member) = &*node.base {
      if self.is_target(&member.obj) {
        self.escapes = true;
      }
    }
    node.visit_children_with(self);
  }

  fn visit_ident(&mut self, node: &Ident) {
    if id!(node) == self.target {
      self.escapes = true;
    }
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;
  use tagcss_swc_runner::test_utils::run_test_module;

  use super::*;
  use crate::normalize::normalize;

  fn build(module: &mut Module, unresolved_mark: swc_core::common::Mark) -> DependencyGraph {
    let normalized = normalize(module, unresolved_mark);
    DependencyGraph::build(module, &normalized)
  }

  fn binding_node(graph: &DependencyGraph, name: &str) -> NodeId {
    graph
      .node_for_key(&format!("0:{name}"))
      .unwrap_or_else(|| panic!("no binding {name}"))
  }

  #[test]
  fn test_bindings_depend_on_their_declarations() {
    run_test_module(
      indoc! {r#"
        const a = 1;
        const b = a + 1;
        function f() { return b; }
        const c = 2;
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);
        let f = binding_node(&graph, "f");

        assert_eq!(graph.dependencies_of_binding("0:f").len(), 1);
        let declaration = graph.dependencies_of_binding("0:f")[0];
        assert_eq!(graph.node(declaration).kind, NodeKind::Declaration);

        let found = graph.find(f, Direction::Dependencies, |node| {
          node.binding_key.as_deref() == Some("0:a")
        });
        assert_eq!(found, Some(binding_node(&graph, "a")));

        let found = graph.find(f, Direction::Dependencies, |node| {
          node.binding_key.as_deref() == Some("0:c")
        });
        assert_eq!(found, None);

        let found = graph.find(binding_node(&graph, "a"), Direction::Dependents, |node| {
          node.binding_key.as_deref() == Some("0:f")
        });
        assert_eq!(found, Some(f));
      },
    );
  }

  #[test]
  fn test_mutations_are_dependencies_of_the_binding() {
    run_test_module(
      indoc! {r#"
        const color = {};
        color.green = '#0f0';
        const a = color.red;
        console.log('unrelated');
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);

        let statements: Vec<&GraphNode> = graph
          .dependencies_of_binding("0:color")
          .iter()
          .map(|id| graph.node(*id))
          .filter(|node| node.kind == NodeKind::Statement)
          .collect();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].span, module.body[1].span());

        // Nothing depends on the unrelated statement, but it calls a global
        let unrelated = graph
          .nodes()
          .iter()
          .find(|node| node.span == module.body[3].span())
          .map(|node| node.id);
        let unrelated = unrelated.unwrap_or_else(|| panic!("no statement node"));
        assert!(graph.dependents_of(unrelated).is_empty());
        assert!(graph.node(unrelated).has_external_effects);
        assert!(!graph.node(statements[0].id).has_external_effects);
      },
    );
  }

  #[test]
  fn test_local_function_calls_propagate_mutations() {
    run_test_module(
      indoc! {r#"
        let theme = {};
        function setup() { theme.dark = true; }
        setup();
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);

        let call = module.body[2].span();
        assert!(graph
          .dependencies_of_binding("0:theme")
          .iter()
          .any(|id| graph.node(*id).span == call));
      },
    );
  }

  #[test]
  fn test_calls_into_unknown_code_are_external() {
    run_test_module(
      indoc! {r#"
        import { setup } from './theme';
        let theme = {};
        function local() { theme.dark = true; }
        function indirect() { setup(); }
        const list = [];
        setup();
        local();
        indirect();
        list.push(1);
        new Widget();
        (() => { theme.light = false; })();
        theme.color = 'red';
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);
        let external = |index: usize| {
          let span = module.body[index].span();
          graph
            .nodes()
            .iter()
            .any(|node| node.span == span && node.has_external_effects)
        };

        assert!(external(5), "imported function");
        assert!(!external(6), "local function");
        assert!(external(7), "local function calling an import");
        assert!(!external(8), "method of a local binding");
        assert!(external(9), "constructor");
        assert!(!external(10), "arrow invoked in place");
        assert!(!external(11), "assignment");
      },
    );
  }

  #[test]
  fn test_tracked_object_properties() {
    run_test_module(
      indoc! {r#"
        const key = 'blue';
        const obj = { blue: '#00F', red: '#F00' };
        const blue = obj[key];
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);

        let properties = graph
          .nodes()
          .iter()
          .filter(|node| node.kind == NodeKind::Property)
          .count();
        assert_eq!(properties, 2);

        let reachable = graph.reachable_from([binding_node(&graph, "blue")]);
        let read: Vec<&GraphNode> = reachable
          .iter()
          .map(|id| graph.node(*id))
          .filter(|node| node.kind == NodeKind::Property)
          .collect();
        assert_eq!(read.len(), 1);
        assert!(reachable.contains(&binding_node(&graph, "key")));
        assert!(reachable.contains(&binding_node(&graph, "obj")));
      },
    );
  }

  #[test]
  fn test_escaping_object_is_not_tracked() {
    run_test_module(
      indoc! {r#"
        const obj = { blue: '#00F', red: '#F00' };
        const copy = obj;
        obj.blue();
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);
        assert!(graph
          .nodes()
          .iter()
          .all(|node| node.kind != NodeKind::Property));
      },
    );
  }

  #[test]
  fn test_declarations_for_expression() {
    run_test_module(
      indoc! {r#"
        const a = 1;
        const unused = 3;
        const b = a * 2;
        use(b);
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);

        let ModuleItem::Stmt(Stmt::Expr(statement)) = &module.body[3] else {
          panic!("expected an expression statement");
        };
        let Expr::Call(call) = &*statement.expr else {
          panic!("expected a call");
        };

        let spans: Vec<Span> = graph
          .declarations_for(&call.args[0].expr)
          .into_iter()
          .map(|id| graph.node(id).span)
          .collect();
        let declarator = |index: usize| match &module.body[index] {
          ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) => var.decls[0].span,
          _ => panic!("expected a declaration"),
        };
        assert_eq!(spans, vec![declarator(0), declarator(2)]);
      },
    );
  }

  #[test]
  fn test_exports_only_need_their_own_binding() {
    run_test_module(
      indoc! {r#"
        export const a = 1, b = c;
        const c = 2;
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);

        let export_a = graph
          .nodes()
          .iter()
          .find(|node| node.kind == NodeKind::Export(ExportedName::Named("a".into())))
          .map(|node| node.id)
          .unwrap_or_else(|| panic!("no export node"));
        let reachable = graph.reachable_from([export_a]);
        assert!(reachable.contains(&binding_node(&graph, "a")));
        assert!(!reachable.contains(&binding_node(&graph, "b")));
        assert!(!reachable.contains(&binding_node(&graph, "c")));
      },
    );
  }

  #[test]
  fn test_sequence_depends_on_last_operand() {
    run_test_module(
      indoc! {r#"
        const x = 1;
        const y = 2;
        const pure = (x, y);
        const effectful = (log(x), y);
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);

        let pure = graph.reachable_from([binding_node(&graph, "pure")]);
        assert!(!pure.contains(&binding_node(&graph, "x")));
        assert!(pure.contains(&binding_node(&graph, "y")));

        let effectful = graph.reachable_from([binding_node(&graph, "effectful")]);
        assert!(effectful.contains(&binding_node(&graph, "x")));
      },
    );
  }

  #[test]
  fn test_side_effect_imports_and_module_flag_are_external() {
    run_test_module(
      indoc! {r#"
        "use strict";
        Object.defineProperty(exports, "__esModule", { value: true });
        require('./polyfill');
        const unused = 1;
      "#},
      |context, module| {
        let graph = build(module, context.unresolved_mark);
        let external: Vec<Span> = graph
          .nodes()
          .iter()
          .filter(|node| node.has_external_effects)
          .map(|node| node.span)
          .collect();
        assert_eq!(
          external,
          vec![module.body[0].span(), module.body[1].span(), module.body[2].span()]
        );
      },
    );
  }
}
