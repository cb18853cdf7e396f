/*!
 * Sandboxed expressions: arithmetic post-operations and payload hooks.
 *
 * Both are evaluated with evalexpr. Post-operations are restricted to
 * arithmetic literals and operators before they ever reach the evaluator.
 * Hooks run against a fresh context holding a read-only copy of the value,
 * its metadata and the owning node, plus a `log(...)` function.
 */
use evalexpr::{
    eval_number, eval_with_context, ContextWithMutableFunctions, ContextWithMutableVariables,
    Function, HashMapContext, Value as ExprValue,
};
use std::fmt;

use serde_json::{Number, Value as JsonValue};
use tracing::info;

use zflow_devices::{Node, Value, ValueType};

use crate::error::{Error, Result};

/// An arithmetic operation appended to a numeric value, e.g. `/10` or `*1.8+32`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOperation {
    op: String,
}

impl PostOperation {
    /// Parse and validate a post-operation.
    ///
    /// Only digits, `.`, whitespace, `+ - * / ( ) ,` are accepted.
    pub fn parse(op: &str) -> Result<Self> {
        let op = op.trim();
        if op.is_empty() {
            return Err(Error::expression("Empty post operation"));
        }
        if let Some(c) = op.chars().find(|c| !is_arithmetic(*c)) {
            return Err(Error::expression(format!(
                "Invalid character '{}' in post operation {}",
                c, op
            )));
        }
        Ok(Self { op: op.to_string() })
    }

    /// The operation text
    pub fn as_str(&self) -> &str {
        &self.op
    }

    /// Apply the operation to `value`
    pub fn apply(&self, value: f64) -> Result<f64> {
        let expression = format!("({:?}){}", value, float_literals(&self.op));
        let result = eval_number(&expression)?;
        if !result.is_finite() {
            return Err(Error::expression(format!("{} is not a finite number", expression)));
        }
        Ok(result)
    }

    /// The algebraic inverse used on the write path.
    ///
    /// The value is the leftmost operand, so every operation is
    /// `value * factors + terms`. The inverse undoes the terms, then the
    /// factors, each in reverse order: `*1.8+32` becomes `((x-32)/1.8)`.
    pub fn inverse(&self) -> Result<InverseOperation> {
        let steps = group_terms(split_steps(&self.op)?)
            .into_iter()
            .rev()
            .map(|(operator, operand)| (operator.opposite(), operand))
            .collect::<Vec<_>>();
        if steps.iter().any(|(operator, operand)| *operator == Operator::Div && *operand == 0.0) {
            return Err(Error::expression(format!("Post operation {} cannot be inverted", self.op)));
        }
        Ok(InverseOperation { steps })
    }
}

/// A post-operation run backwards, one step at a time
#[derive(Debug, Clone, PartialEq)]
pub struct InverseOperation {
    steps: Vec<(Operator, f64)>,
}

impl InverseOperation {
    /// Apply the inverse to `value`
    pub fn apply(&self, value: f64) -> Result<f64> {
        let result = self
            .steps
            .iter()
            .fold(value, |acc, (operator, operand)| operator.eval(acc, *operand));
        if !result.is_finite() {
            return Err(Error::expression(format!("{} of {} is not a finite number", self, value)));
        }
        Ok(result)
    }
}

impl fmt::Display for InverseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.steps.iter().fold("x".to_string(), |acc, (operator, operand)| {
            format!("({}{}{})", acc, operator.symbol(), operand)
        });
        f.write_str(&text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '*' => Some(Operator::Mul),
            '/' => Some(Operator::Div),
            _ => None,
        }
    }

    fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
        }
    }

    fn opposite(self) -> Self {
        match self {
            Operator::Add => Operator::Sub,
            Operator::Sub => Operator::Add,
            Operator::Mul => Operator::Div,
            Operator::Div => Operator::Mul,
        }
    }

    fn is_additive(self) -> bool {
        matches!(self, Operator::Add | Operator::Sub)
    }

    fn eval(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Operator::Add => lhs + rhs,
            Operator::Sub => lhs - rhs,
            Operator::Mul => lhs * rhs,
            Operator::Div => lhs / rhs,
        }
    }
}

/// Split an operation into `(operator, operand)` steps at parenthesis depth 0.
///
/// A `+` or `-` right after an operator is the operand's sign.
fn split_steps(op: &str) -> Result<Vec<(Operator, f64)>> {
    let mut steps = Vec::new();
    let mut current: Option<(Operator, String)> = None;
    let mut depth = 0usize;

    for c in op.chars().filter(|c| !c.is_whitespace()) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::expression(format!("Unbalanced parentheses in {}", op)))?
            }
            _ => {}
        }
        let operator = if depth == 0 { Operator::from_char(c) } else { None };
        let sign = matches!(&current, Some((_, operand)) if operand.is_empty());

        match operator {
            Some(operator) if !sign => {
                if let Some((previous, operand)) = current.take() {
                    steps.push((previous, operand_value(&operand, op)?));
                }
                current = Some((operator, String::new()));
            }
            _ => match current.as_mut() {
                Some((_, operand)) => operand.push(c),
                None => {
                    return Err(Error::expression(format!(
                        "Post operation {} must start with an operator",
                        op
                    )))
                }
            },
        }
    }

    if depth != 0 {
        return Err(Error::expression(format!("Unbalanced parentheses in {}", op)));
    }
    if let Some((operator, operand)) = current {
        steps.push((operator, operand_value(&operand, op)?));
    }
    Ok(steps)
}

fn operand_value(operand: &str, op: &str) -> Result<f64> {
    if operand.is_empty() {
        return Err(Error::expression(format!("Missing operand in {}", op)));
    }
    let value = eval_number(&float_literals(operand))?;
    if !value.is_finite() {
        return Err(Error::expression(format!("{} in {} is not a finite number", operand, op)));
    }
    Ok(value)
}

/// Apply precedence: leading `*` and `/` steps act on the value, and each
/// `+` or `-` starts a constant term that absorbs the `*` and `/` after it.
fn group_terms(steps: Vec<(Operator, f64)>) -> Vec<(Operator, f64)> {
    let mut grouped: Vec<(Operator, f64)> = Vec::with_capacity(steps.len());
    for (operator, operand) in steps {
        match grouped.last_mut() {
            Some((last, term)) if last.is_additive() && !operator.is_additive() => {
                *term = operator.eval(*term, operand);
            }
            _ => grouped.push((operator, operand)),
        }
    }
    grouped
}

/// Rewrite integer literals as float literals so `/` never truncates
fn float_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_number = false;
    let mut has_dot = false;
    for c in text.chars() {
        if c.is_ascii_digit() || c == '.' {
            if !in_number {
                in_number = true;
                has_dot = false;
            }
            has_dot |= c == '.';
        } else if in_number {
            if !has_dot {
                out.push_str(".0");
            }
            in_number = false;
        }
        out.push(c);
    }
    if in_number && !has_dot {
        out.push_str(".0");
    }
    out
}

fn is_arithmetic(c: char) -> bool {
    c.is_ascii_digit() || c.is_whitespace() || matches!(c, '.' | '+' | '-' | '*' | '/' | '(' | ')' | ',')
}

/// Number to JSON, keeping whole numbers integral
pub fn number_to_json(value: f64) -> Result<JsonValue> {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Ok(JsonValue::from(value as i64));
    }
    Number::from_f64(value)
        .map(JsonValue::Number)
        .ok_or_else(|| Error::expression(format!("{} is not a finite number", value)))
}

/// A user-supplied payload hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    source: String,
}

impl Hook {
    /// Wrap hook source. The source is only checked when the hook runs.
    pub fn new<S: Into<String>>(source: S) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Evaluate the hook. `None` means "keep the input".
    pub fn run(&self, input: &JsonValue, value: &Value, node: &Node) -> Result<Option<JsonValue>> {
        let context = hook_context(input, value, node)?;
        let result = eval_with_context(&self.source, &context)?;
        expr_to_json(result)
    }
}

fn hook_context(input: &JsonValue, value: &Value, node: &Node) -> Result<HashMapContext> {
    let mut context = HashMapContext::new();

    context.set_value("value".into(), json_to_expr(input))?;
    context.set_value("value_type".into(), ExprValue::String(type_name(value.value_type).into()))?;
    context.set_value("command_class".into(), ExprValue::Int(value.command_class.id().into()))?;
    context.set_value("endpoint".into(), ExprValue::Int(value.endpoint.into()))?;
    context.set_value("property".into(), ExprValue::String(value.property.to_string()))?;
    context.set_value(
        "property_key".into(),
        value
            .property_key
            .as_ref()
            .map(|k| ExprValue::String(k.to_string()))
            .unwrap_or(ExprValue::Empty),
    )?;
    context.set_value("label".into(), ExprValue::String(value.label()))?;
    context.set_value(
        "unit".into(),
        ExprValue::String(value.unit.clone().unwrap_or_default()),
    )?;
    context.set_value("min".into(), value.min.map(ExprValue::Float).unwrap_or(ExprValue::Empty))?;
    context.set_value("max".into(), value.max.map(ExprValue::Float).unwrap_or(ExprValue::Empty))?;
    context.set_value("node_id".into(), ExprValue::Int(node.id.into()))?;
    context.set_value("node_name".into(), ExprValue::String(node.display_name()))?;
    context.set_value(
        "node_location".into(),
        ExprValue::String(node.location().unwrap_or_default().to_string()),
    )?;

    let node_id = node.id;
    context.set_function(
        "log".into(),
        Function::new(move |argument| {
            info!("Hook on node {}: {}", node_id, argument);
            Ok(ExprValue::Empty)
        }),
    )?;

    Ok(context)
}

fn type_name(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Boolean => "boolean",
        ValueType::Number => "number",
        ValueType::String => "string",
        ValueType::Buffer => "buffer",
        ValueType::List => "list",
        ValueType::Any => "any",
    }
}

fn json_to_expr(value: &JsonValue) -> ExprValue {
    match value {
        JsonValue::Null => ExprValue::Empty,
        JsonValue::Bool(b) => ExprValue::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => ExprValue::Int(i),
            None => ExprValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => ExprValue::String(s.clone()),
        JsonValue::Array(items) => ExprValue::Tuple(items.iter().map(json_to_expr).collect()),
        JsonValue::Object(_) => ExprValue::String(value.to_string()),
    }
}

fn expr_to_json(value: ExprValue) -> Result<Option<JsonValue>> {
    Ok(match value {
        ExprValue::Empty => None,
        ExprValue::Boolean(b) => Some(JsonValue::Bool(b)),
        ExprValue::Int(i) => Some(JsonValue::from(i)),
        ExprValue::Float(f) => Some(
            Number::from_f64(f)
                .map(JsonValue::Number)
                .ok_or_else(|| Error::expression(format!("Hook returned {}", f)))?,
        ),
        ExprValue::String(s) => Some(JsonValue::String(s)),
        ExprValue::Tuple(items) => Some(JsonValue::Array(
            items
                .into_iter()
                .map(|item| expr_to_json(item).map(|v| v.unwrap_or(JsonValue::Null)))
                .collect::<Result<Vec<_>>>()?,
        )),
    })
}
