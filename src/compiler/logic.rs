//! Logic block encoding and the bundle-then-link step that feeds it.
//!
//! Layout of a compiled block (all integers little-endian):
//!
//! ```text
//! [u16 key len][always-exec key]
//! [u8 OR-group count]                          -- only when statements exist
//!   per OR-group:  [u8 AND-group count]
//!     per AND-group: [u8 operator count][operator sections][u16 key len][exec key]
//! ```
//!
//! An operator section is the operator's bitmask byte followed by
//! `[u64 variable id][u8 type tag][value]` per comparison. Each condition map
//! contributes one section per operator it uses, so the operator count is
//! the number of sections that follow.

use crate::compiler::actions::bundle_actions;
use crate::compiler::gather::gather_indexed;
use crate::error::{CompileError, CompileResult};
use crate::keys;
use crate::model::action::ActionSet;
use crate::model::logic::{ConditionGroup, ConditionValue, LBlock, LStatement, RawLBlock};
use crate::sink::{Sink, SinkCommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

fn u8_len(what: &'static str, len: usize) -> CompileResult<u8> {
    u8::try_from(len).map_err(|_| CompileError::Overflow { what, limit: "u8", len })
}

fn push_key(bytes: &mut Vec<u8>, key: &str) -> CompileResult<()> {
    let len = u16::try_from(key.len()).map_err(|_| CompileError::Overflow {
        what: "bundle key",
        limit: "u16",
        len: key.len(),
    })?;
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(key.as_bytes());
    Ok(())
}

pub fn encode_conditions(groups: &[ConditionGroup]) -> CompileResult<Vec<u8>> {
    let mut bytes = Vec::new();
    for group in groups {
        for (op, comparisons) in group {
            bytes.push(op.bitmask());
            for (variable, value) in comparisons {
                bytes.extend_from_slice(&variable.to_le_bytes());
                bytes.push(value.type_tag());
                match value {
                    ConditionValue::Text(text) => {
                        let len = u16::try_from(text.len()).map_err(|_| CompileError::Overflow {
                            what: "condition string",
                            limit: "u16",
                            len: text.len(),
                        })?;
                        bytes.extend_from_slice(&len.to_le_bytes());
                        bytes.extend_from_slice(text.as_bytes());
                    }
                    ConditionValue::Int(n) => bytes.extend_from_slice(&n.to_le_bytes()),
                }
            }
        }
    }
    Ok(bytes)
}

/// Number of operator sections `encode_conditions` emits for `groups`.
pub fn operator_count(groups: &[ConditionGroup]) -> usize {
    groups.iter().map(|group| group.len()).sum()
}

pub fn encode_statement(statement: &LStatement) -> CompileResult<Vec<u8>> {
    let mut bytes = vec![u8_len("operator count", operator_count(&statement.operators))?];
    bytes.extend(encode_conditions(&statement.operators)?);
    push_key(&mut bytes, &statement.exec)?;
    Ok(bytes)
}

async fn encode_or_group(group: Vec<LStatement>) -> CompileResult<Vec<u8>> {
    let mut bytes = vec![u8_len("AND-group count", group.len())?];
    let futures: Vec<_> = group
        .into_iter()
        .map(|statement| async move { encode_statement(&statement) })
        .collect();
    bytes.extend(gather_indexed(futures).await?.concat());
    Ok(bytes)
}

/// Serializes a block whose action sets have already been replaced by keys.
pub async fn encode_logic_block(block: LBlock) -> CompileResult<Vec<u8>> {
    let mut bytes = Vec::new();
    push_key(&mut bytes, &block.always_exec)?;

    let Some(statements) = block.statements else {
        return Ok(bytes);
    };

    bytes.push(u8_len("OR-group count", statements.len())?);
    let futures: Vec<_> = statements.into_iter().map(encode_or_group).collect();
    bytes.extend(gather_indexed(futures).await?.concat());
    Ok(bytes)
}

/// Bundles every action set of `raw` into the sink, then encodes the block
/// with bundle keys in their place.
///
/// Sequence numbers come from a per-owner atomic counter, drawn in
/// declaration order (always-exec first, then statements row by row) before
/// any bundle task starts. Returns only after every bundle write has been
/// enqueued, so the caller may write the record that links to them.
pub async fn compile_logic_block(sink: &Sink, publish_id: &str, owner_id: &str, raw: &RawLBlock) -> CompileResult<Vec<u8>> {
    let counter = AtomicU64::new(0);
    let publish_id: Arc<str> = Arc::from(publish_id);
    let owner_id: Arc<str> = Arc::from(owner_id);

    let mut action_sets: Vec<&ActionSet> = vec![&raw.always_exec];
    if let Some(statements) = &raw.statements {
        action_sets.extend(statements.iter().flatten().map(|s| &s.exec));
    }

    let futures: Vec<_> = action_sets
        .into_iter()
        .map(|actions| {
            let sequence = counter.fetch_add(1, Ordering::SeqCst);
            let key = keys::compiled_action_bundle(&publish_id, &owner_id, sequence);
            let actions = actions.clone();
            let sink = sink.clone();
            async move {
                let bundle = bundle_actions(&actions).await?;
                sink.write(SinkCommand::set(key.clone(), bundle)).await?;
                Ok::<_, CompileError>(key)
            }
        })
        .collect();

    let mut bundle_keys = gather_indexed(futures).await?.into_iter();
    let always_exec = bundle_keys
        .next()
        .ok_or_else(|| CompileError::Task(format!("missing always-exec bundle for {}", owner_id)))?;

    let statements = match &raw.statements {
        None => None,
        Some(groups) => {
            let mut compiled = Vec::with_capacity(groups.len());
            for group in groups {
                let mut and_groups = Vec::with_capacity(group.len());
                for statement in group {
                    let exec = bundle_keys.next().ok_or_else(|| {
                        CompileError::Task(format!("missing statement bundle for {}", owner_id))
                    })?;
                    and_groups.push(LStatement { operators: statement.operators.clone(), exec });
                }
                compiled.push(and_groups);
            }
            Some(compiled)
        }
    };

    encode_logic_block(LBlock { always_exec, statements }).await
}
