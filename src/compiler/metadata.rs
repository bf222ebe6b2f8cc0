use crate::error::CompileResult;
use crate::keys;
use crate::model::{Project, ProjectItem};
use crate::sink::{Sink, SinkCommand};
use std::collections::BTreeSet;

/// Writes the project's static metadata and, for real publishes, registers
/// its title in the global project index. Returns the number of writes.
pub async fn compile_metadata(
    sink: &Sink,
    project: &Project,
    items: &[ProjectItem],
    version: i64,
    publish_id: &str,
    is_demo: bool,
) -> CompileResult<usize> {
    let metadata = keys::project_metadata(publish_id);
    let start_zone = project.start_zone_id.map(|id| id.to_string()).unwrap_or_default();

    let mut commands = vec![
        SinkCommand::hash_set(metadata.clone(), "title", project.title.clone()),
        SinkCommand::hash_set(metadata.clone(), "start_zone_id", start_zone),
        SinkCommand::hash_set(metadata, "pubver", version.to_string()),
    ];

    // previews must never become discoverable by title
    if !is_demo {
        commands.push(SinkCommand::hash_set(
            keys::global_projects(),
            project.title.to_uppercase(),
            project.id.to_string(),
        ));
    }

    let zones: BTreeSet<_> = items.iter().map(|item| item.zone_id).collect();
    for zone in zones {
        commands.push(SinkCommand::set_add(keys::project_zones(publish_id), zone.to_string()));
    }

    let count = commands.len();
    for command in commands {
        sink.write(command).await?;
    }
    Ok(count)
}
