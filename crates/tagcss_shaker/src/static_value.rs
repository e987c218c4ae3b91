use std::collections::HashMap;
use std::collections::HashSet;

use indexmap::IndexMap;
use swc_core::common::Span;
use swc_core::common::Spanned;
use swc_core::ecma::ast::*;
use thiserror::Error;

use crate::utils::match_prop_name;
use crate::utils::match_property_name;
use crate::utils::number_to_key;
use crate::utils::unparen;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StaticValueError {
  #[error("expression is not a compile-time constant")]
  Unsupported { span: Span },
  #[error("`{name}` is not a constant binding of this module")]
  UnknownBinding { name: String },
  #[error("`{name}` refers to itself")]
  Cycle { name: String },
}

/// Value of an expression known without running the module.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticValue {
  String(String),
  Number(f64),
  Bool(bool),
  Null,
  Undefined,
  Array(Vec<StaticValue>),
  Object(IndexMap<String, StaticValue>),
}

impl StaticValue {
  fn is_truthy(&self) -> bool {
    match self {
      StaticValue::String(value) => !value.is_empty(),
      StaticValue::Number(value) => *value != 0.0 && !value.is_nan(),
      StaticValue::Bool(value) => *value,
      StaticValue::Null | StaticValue::Undefined => false,
      StaticValue::Array(_) | StaticValue::Object(_) => true,
    }
  }

  fn is_nullish(&self) -> bool {
    matches!(self, StaticValue::Null | StaticValue::Undefined)
  }

  /// String coercion for primitives; `None` for values whose coercion needs a runtime.
  pub fn to_js_string(&self) -> Option<String> {
    match self {
      StaticValue::String(value) => Some(value.clone()),
      StaticValue::Number(value) if value.is_nan() => Some("NaN".into()),
      StaticValue::Number(value) => Some(number_to_key(*value).to_string()),
      StaticValue::Bool(value) => Some(value.to_string()),
      StaticValue::Null => Some("null".into()),
      StaticValue::Undefined => Some("undefined".into()),
      StaticValue::Array(_) | StaticValue::Object(_) => None,
    }
  }

  fn to_number(&self) -> Option<f64> {
    match self {
      StaticValue::Number(value) => Some(*value),
      StaticValue::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
      StaticValue::Null => Some(0.0),
      StaticValue::Undefined => Some(f64::NAN),
      StaticValue::String(value) if value.trim().is_empty() => Some(0.0),
      StaticValue::String(value) => Some(value.trim().parse().unwrap_or(f64::NAN)),
      StaticValue::Array(_) | StaticValue::Object(_) => None,
    }
  }

  fn member(&self, key: &str) -> StaticValue {
    match self {
      StaticValue::Object(props) => props.get(key).cloned().unwrap_or(StaticValue::Undefined),
      StaticValue::Array(items) if key == "length" => StaticValue::Number(items.len() as f64),
      StaticValue::Array(items) => key
        .parse::<usize>()
        .ok()
        .and_then(|index| items.get(index).cloned())
        .unwrap_or(StaticValue::Undefined),
      StaticValue::String(value) if key == "length" => {
        StaticValue::Number(value.encode_utf16().count() as f64)
      }
      _ => StaticValue::Undefined,
    }
  }
}

/// Constant evaluation over the top-level `const` declarations of one module.
///
/// Identifiers resolve through `const` declarators with an initializer; everything else
/// (calls, `let`/`var` bindings, imports) is reported as not constant.
pub struct StaticEvaluator<'a> {
  constants: HashMap<Id, &'a Expr>,
  names: HashMap<String, Id>,
  visiting: HashSet<Id>,
}

impl<'a> StaticEvaluator<'a> {
  pub fn new(module: &'a Module) -> Self {
    let mut constants = HashMap::new();
    let mut names = HashMap::new();

    for item in &module.body {
      let var = match item {
        ModuleItem::Stmt(Stmt::Decl(Decl::Var(var))) => var,
        ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
          decl: Decl::Var(var),
          ..
        })) => var,
        _ => continue,
      };
      if var.kind != VarDeclKind::Const {
        continue;
      }
      for decl in &var.decls {
        if let (Pat::Ident(ident), Some(init)) = (&decl.name, &decl.init) {
          constants.insert(ident.id.to_id(), &**init);
          names.insert(ident.id.sym.to_string(), ident.id.to_id());
        }
      }
    }

    StaticEvaluator {
      constants,
      names,
      visiting: HashSet::new(),
    }
  }

  /// Value of the top-level constant `name`.
  pub fn evaluate_binding(&mut self, name: &str) -> Result<StaticValue, StaticValueError> {
    let id = self
      .names
      .get(name)
      .cloned()
      .ok_or_else(|| StaticValueError::UnknownBinding { name: name.into() })?;
    self.evaluate_id(&id)
  }

  pub fn evaluate(&mut self, expr: &Expr) -> Result<StaticValue, StaticValueError> {
    let unsupported = || StaticValueError::Unsupported { span: expr.span() };

    match unparen(expr) {
      Expr::Lit(lit) => match lit {
        Lit::Str(str_lit) => Ok(StaticValue::String(str_lit.value.to_string())),
        Lit::Num(num) => Ok(StaticValue::Number(num.value)),
        Lit::Bool(value) => Ok(StaticValue::Bool(value.value)),
        Lit::Null(_) => Ok(StaticValue::Null),
        _ => Err(unsupported()),
      },
      Expr::Tpl(tpl) => {
        let mut result = String::new();
        for (index, quasi) in tpl.quasis.iter().enumerate() {
          let cooked = quasi.cooked.as_ref().unwrap_or(&quasi.raw);
          result.push_str(cooked);
          if let Some(expr) = tpl.exprs.get(index) {
            let value = self.evaluate(expr)?;
            result.push_str(&value.to_js_string().ok_or_else(unsupported)?);
          }
        }
        Ok(StaticValue::String(result))
      }
      Expr::Ident(ident) if &*ident.sym == "undefined" && !self.constants.contains_key(&ident.to_id()) => {
        Ok(StaticValue::Undefined)
      }
      Expr::Ident(ident) => self.evaluate_id(&ident.to_id()),
      Expr::Array(array) => {
        let mut items = vec![];
        for elem in &array.elems {
          match elem {
            Some(ExprOrSpread { spread: None, expr }) => items.push(self.evaluate(expr)?),
            Some(ExprOrSpread {
              spread: Some(_),
              expr,
            }) => match self.evaluate(expr)? {
              StaticValue::Array(spread) => items.extend(spread),
              _ => return Err(unsupported()),
            },
            None => items.push(StaticValue::Undefined),
          }
        }
        Ok(StaticValue::Array(items))
      }
      Expr::Object(object) => {
        let mut props = IndexMap::new();
        for prop in &object.props {
          match prop {
            PropOrSpread::Spread(spread) => match self.evaluate(&spread.expr)? {
              StaticValue::Object(spread) => props.extend(spread),
              _ => return Err(unsupported()),
            },
            PropOrSpread::Prop(prop) => match &**prop {
              Prop::KeyValue(kv) => {
                let key = self.evaluate_prop_name(&kv.key)?;
                let value = self.evaluate(&kv.value)?;
                props.insert(key, value);
              }
              Prop::Shorthand(ident) => {
                let value = self.evaluate_id(&ident.to_id())?;
                props.insert(ident.sym.to_string(), value);
              }
              _ => return Err(unsupported()),
            },
          }
        }
        Ok(StaticValue::Object(props))
      }
      Expr::Member(member) => {
        let object = self.evaluate(&member.obj)?;
        let key = match match_property_name(member) {
          Some((key, _)) => key.to_string(),
          None => match &member.prop {
            MemberProp::Computed(computed) => self
              .evaluate(&computed.expr)?
              .to_js_string()
              .ok_or_else(unsupported)?,
            _ => return Err(unsupported()),
          },
        };
        Ok(object.member(&key))
      }
      Expr::Unary(unary) => {
        let value = self.evaluate(&unary.arg)?;
        match unary.op {
          UnaryOp::Bang => Ok(StaticValue::Bool(!value.is_truthy())),
          UnaryOp::Minus => Ok(StaticValue::Number(-value.to_number().ok_or_else(unsupported)?)),
          UnaryOp::Plus => Ok(StaticValue::Number(value.to_number().ok_or_else(unsupported)?)),
          UnaryOp::TypeOf => Ok(StaticValue::String(
            match value {
              StaticValue::String(_) => "string",
              StaticValue::Number(_) => "number",
              StaticValue::Bool(_) => "boolean",
              StaticValue::Undefined => "undefined",
              StaticValue::Null | StaticValue::Array(_) | StaticValue::Object(_) => "object",
            }
            .into(),
          )),
          UnaryOp::Void => Ok(StaticValue::Undefined),
          _ => Err(unsupported()),
        }
      }
      Expr::Bin(bin) => {
        let left = self.evaluate(&bin.left)?;
        match bin.op {
          BinaryOp::LogicalAnd if !left.is_truthy() => return Ok(left),
          BinaryOp::LogicalOr if left.is_truthy() => return Ok(left),
          BinaryOp::NullishCoalescing if !left.is_nullish() => return Ok(left),
          BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::NullishCoalescing => {
            return self.evaluate(&bin.right)
          }
          _ => {}
        }
        let right = self.evaluate(&bin.right)?;
        evaluate_binary(bin.op, left, right).ok_or_else(unsupported)
      }
      Expr::Cond(cond) => {
        if self.evaluate(&cond.test)?.is_truthy() {
          self.evaluate(&cond.cons)
        } else {
          self.evaluate(&cond.alt)
        }
      }
      Expr::TsAs(as_expr) => self.evaluate(&as_expr.expr),
      Expr::TsConstAssertion(assertion) => self.evaluate(&assertion.expr),
      Expr::TsSatisfies(satisfies) => self.evaluate(&satisfies.expr),
      Expr::TsNonNull(non_null) => self.evaluate(&non_null.expr),
      _ => Err(unsupported()),
    }
  }

  /// Key of an object-literal property, resolving computed keys through constants.
  pub fn evaluate_prop_name(&mut self, key: &PropName) -> Result<String, StaticValueError> {
    if let Some(key) = match_prop_name(key) {
      return Ok(key.to_string());
    }
    match key {
      PropName::Computed(computed) => self
        .evaluate(&computed.expr)?
        .to_js_string()
        .ok_or(StaticValueError::Unsupported {
          span: computed.span,
        }),
      key => Err(StaticValueError::Unsupported { span: key.span() }),
    }
  }

  fn evaluate_id(&mut self, id: &Id) -> Result<StaticValue, StaticValueError> {
    let Some(init) = self.constants.get(id).copied() else {
      return Err(StaticValueError::UnknownBinding {
        name: id.0.to_string(),
      });
    };
    if !self.visiting.insert(id.clone()) {
      return Err(StaticValueError::Cycle {
        name: id.0.to_string(),
      });
    }
    let result = self.evaluate(init);
    self.visiting.remove(id);
    result
  }
}

fn evaluate_binary(op: BinaryOp, left: StaticValue, right: StaticValue) -> Option<StaticValue> {
  use StaticValue::*;

  let value = match op {
    BinaryOp::Add => match (&left, &right) {
      (String(_), _) | (_, String(_)) => {
        String(format!("{}{}", left.to_js_string()?, right.to_js_string()?))
      }
      _ => Number(left.to_number()? + right.to_number()?),
    },
    BinaryOp::Sub => Number(left.to_number()? - right.to_number()?),
    BinaryOp::Mul => Number(left.to_number()? * right.to_number()?),
    BinaryOp::Div => Number(left.to_number()? / right.to_number()?),
    BinaryOp::Mod => Number(left.to_number()? % right.to_number()?),
    BinaryOp::Exp => Number(left.to_number()?.powf(right.to_number()?)),
    BinaryOp::EqEqEq => Bool(strict_equals(&left, &right)?),
    BinaryOp::NotEqEq => Bool(!strict_equals(&left, &right)?),
    BinaryOp::Lt => Bool(left.to_number()? < right.to_number()?),
    BinaryOp::LtEq => Bool(left.to_number()? <= right.to_number()?),
    BinaryOp::Gt => Bool(left.to_number()? > right.to_number()?),
    BinaryOp::GtEq => Bool(left.to_number()? >= right.to_number()?),
    _ => return None,
  };
  Some(value)
}

fn strict_equals(left: &StaticValue, right: &StaticValue) -> Option<bool> {
  match (left, right) {
    (StaticValue::Array(_), _)
    | (StaticValue::Object(_), _)
    | (_, StaticValue::Array(_))
    | (_, StaticValue::Object(_)) => None,
    _ => Some(left == right),
  }
}

/// Statically known value of the module-level constant `name`.
pub fn static_value(module: &Module, name: &str) -> Result<StaticValue, StaticValueError> {
  StaticEvaluator::new(module).evaluate_binding(name)
}
