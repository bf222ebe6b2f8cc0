use crate::error::{CompileError, CompileResult};
use crate::model::action::ActionSet;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Comparison operators understood by the player, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
    Ne,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Eq,
        Operator::Lt,
        Operator::Gt,
        Operator::Lte,
        Operator::Gte,
        Operator::Ne,
    ];

    pub fn bitmask(&self) -> u8 {
        match self {
            Operator::Eq => 1 << 0,
            Operator::Lt => 1 << 1,
            Operator::Gt => 1 << 2,
            Operator::Lte => 1 << 3,
            Operator::Gte => 1 << 4,
            Operator::Ne => 1 << 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Lt => "lt",
            Operator::Gt => "gt",
            Operator::Lte => "lte",
            Operator::Gte => "gte",
            Operator::Ne => "ne",
        }
    }
}

impl TryFrom<&str> for Operator {
    type Error = CompileError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.name() == value)
            .ok_or_else(|| CompileError::UnknownOperator(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionValue {
    Text(String),
    Int(i32),
}

impl ConditionValue {
    pub fn type_tag(&self) -> u8 {
        match self {
            ConditionValue::Text(_) => 0,
            ConditionValue::Int(_) => 1,
        }
    }
}

/// One condition map: operator -> (variable id -> compared value).
pub type ConditionGroup = BTreeMap<Operator, BTreeMap<u64, ConditionValue>>;

/// An authored "if/elif/else" arm before its actions are bundled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawLStatement {
    pub operators: Vec<ConditionGroup>,
    pub exec: ActionSet,
}

/// Author-provided logic attached to a dialog node or a zone trigger.
///
/// `statements` is an ordered list of OR-groups, each an ordered list of
/// AND-groups. `None` means the block only has `always_exec`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawLBlock {
    pub always_exec: ActionSet,
    pub statements: Option<Vec<Vec<RawLStatement>>>,
}

/// Compiled counterpart of a statement: actions replaced by a bundle key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LStatement {
    pub operators: Vec<ConditionGroup>,
    pub exec: String,
}

/// Compiled counterpart of [`RawLBlock`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LBlock {
    pub always_exec: String,
    pub statements: Option<Vec<Vec<LStatement>>>,
}

#[derive(Deserialize)]
struct StatementRepr {
    #[serde(default)]
    conditions: Option<Vec<BTreeMap<String, BTreeMap<String, Value>>>>,
    #[serde(default)]
    then: Value,
}

impl RawLBlock {
    /// Decodes the raw `AlwaysExec` / `Statements` JSON columns.
    /// Failures name `owner` so the offending node or trigger can be found.
    pub fn decode(owner: &str, always_exec: &Value, statements: Option<&Value>) -> CompileResult<Self> {
        let always_exec = ActionSet::from_json(always_exec).map_err(|e| attach_owner(owner, e))?;

        let statements = match statements {
            None | Some(Value::Null) => None,
            Some(raw) => {
                let groups: Vec<Vec<StatementRepr>> = serde_json::from_value(raw.clone())
                    .map_err(|e| CompileError::LogicDecode { owner: owner.to_string(), message: e.to_string() })?;

                let mut decoded = Vec::with_capacity(groups.len());
                for group in groups {
                    let mut and_groups = Vec::with_capacity(group.len());
                    for repr in group {
                        and_groups.push(decode_statement(owner, repr)?);
                    }
                    decoded.push(and_groups);
                }
                Some(decoded)
            }
        };

        Ok(Self { always_exec, statements })
    }
}

fn decode_statement(owner: &str, repr: StatementRepr) -> CompileResult<RawLStatement> {
    let exec = ActionSet::from_json(&repr.then).map_err(|e| attach_owner(owner, e))?;

    let mut operators = Vec::new();
    for raw_group in repr.conditions.unwrap_or_default() {
        let mut group = ConditionGroup::new();
        for (op_name, comparisons) in raw_group {
            let op = Operator::try_from(op_name.as_str())?;
            let entry = group.entry(op).or_default();
            for (variable, value) in comparisons {
                let var_id: u64 = variable.parse().map_err(|_| CompileError::LogicDecode {
                    owner: owner.to_string(),
                    message: format!("variable id '{}' is not numeric", variable),
                })?;
                entry.insert(var_id, decode_value(owner, &variable, value)?);
            }
        }
        operators.push(group);
    }

    Ok(RawLStatement { operators, exec })
}

fn decode_value(owner: &str, variable: &str, value: Value) -> CompileResult<ConditionValue> {
    let unsupported = |found: &Value| CompileError::UnsupportedConditionValue {
        owner: owner.to_string(),
        variable: variable.to_string(),
        found: found.to_string(),
    };

    match &value {
        Value::String(s) => Ok(ConditionValue::Text(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .and_then(int_bits)
            .map(ConditionValue::Int)
            .ok_or_else(|| unsupported(&value)),
        _ => Err(unsupported(&value)),
    }
}

/// Integers travel as 4 little-endian bytes, so both the signed and the
/// unsigned 32-bit ranges are accepted; values above `i32::MAX` keep their
/// unsigned bit pattern.
fn int_bits(value: i64) -> Option<i32> {
    i32::try_from(value)
        .ok()
        .or_else(|| u32::try_from(value).ok().map(|unsigned| unsigned as i32))
}

fn attach_owner(owner: &str, err: CompileError) -> CompileError {
    match err {
        CompileError::LogicDecode { message, .. } => {
            CompileError::LogicDecode { owner: owner.to_string(), message }
        }
        CompileError::UnknownActionKind(kind) => CompileError::LogicDecode {
            owner: owner.to_string(),
            message: CompileError::UnknownActionKind(kind).to_string(),
        },
        other => other,
    }
}
