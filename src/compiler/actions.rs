use crate::compiler::gather::gather_indexed;
use crate::error::{CompileError, CompileResult};
use crate::model::action::{ActionSet, RuntimeAction};

/// `[8-byte action id][4-byte payload length][payload]`, little-endian.
/// The length prefix lets the player skip action ids it does not know.
pub fn encode_action(action: &RuntimeAction) -> CompileResult<Vec<u8>> {
    let payload = action.compile();
    let len = u32::try_from(payload.len()).map_err(|_| CompileError::Overflow {
        what: "action payload",
        limit: "u32",
        len: payload.len(),
    })?;

    let mut bytes = Vec::with_capacity(12 + payload.len());
    bytes.extend_from_slice(&action.action_id().to_le_bytes());
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Encodes every action concurrently and concatenates them in set order.
pub async fn bundle_actions(actions: &ActionSet) -> CompileResult<Vec<u8>> {
    let futures: Vec<_> = actions
        .iter()
        .cloned()
        .map(|action| async move { encode_action(&action) })
        .collect();

    let encoded = gather_indexed(futures).await?;
    Ok(encoded.concat())
}
