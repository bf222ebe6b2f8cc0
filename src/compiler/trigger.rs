use crate::compiler::gather::gather_indexed;
use crate::compiler::logic::compile_logic_block;
use crate::error::{CompileError, CompileResult};
use crate::keys;
use crate::model::ProjectTriggerItem;
use crate::model::logic::RawLBlock;
use crate::sink::{Sink, SinkCommand};
use std::sync::Arc;
use tracing::debug;

/// Compiles every zone trigger's logic block and stores it in the zone's
/// trigger table under the trigger type. Returns the trigger count.
pub async fn compile_triggers(sink: &Sink, items: &[ProjectTriggerItem], publish_id: &str) -> CompileResult<usize> {
    let publish_id: Arc<str> = Arc::from(publish_id);

    let futures: Vec<_> = items
        .iter()
        .cloned()
        .map(|item| {
            let sink = sink.clone();
            let publish_id = publish_id.clone();
            async move {
                let owner = format!("trigger {}", item.trigger_id);
                let raw = RawLBlock::decode(&owner, &item.always_exec, item.statements.as_ref())?;
                let compiled = compile_logic_block(&sink, &publish_id, &item.trigger_id.to_string(), &raw).await?;

                let table = keys::triggers_within_zone(&publish_id, item.zone_id);
                sink.write(SinkCommand::hash_set(table, item.trigger_type.to_string(), compiled)).await?;
                debug!(trigger_id = %item.trigger_id, zone_id = %item.zone_id, "Trigger compiled");
                Ok::<_, CompileError>(())
            }
        })
        .collect();

    Ok(gather_indexed(futures).await?.len())
}
