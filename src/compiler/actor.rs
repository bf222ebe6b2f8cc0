use crate::error::CompileResult;
use crate::keys;
use crate::model::ProjectItem;
use crate::sink::{Sink, SinkCommand};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Writes, per zone, the set of actors present in it. Returns the zone count.
pub async fn compile_actors(sink: &Sink, items: &[ProjectItem], publish_id: &str) -> CompileResult<usize> {
    let mut zone_actors: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
    for item in items {
        zone_actors.entry(item.zone_id).or_default().insert(item.actor_id);
    }

    for (zone_id, actors) in &zone_actors {
        let key = keys::actors_within_zone(publish_id, zone_id);
        for actor_id in actors {
            sink.write(SinkCommand::set_add(key.clone(), actor_id.to_string())).await?;
        }
    }
    Ok(zone_actors.len())
}
