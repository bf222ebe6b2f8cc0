use crate::error::{CompileError, CompileResult};
use std::future::Future;
use tokio::task::JoinSet;

/// Runs every future as its own task and returns the results in the order
/// the futures were given, whatever order they finish in.
///
/// The first error wins; dropping the `JoinSet` aborts the tasks still running.
pub async fn gather_indexed<T, F>(futures: Vec<F>) -> CompileResult<Vec<T>>
where
    T: Send + 'static,
    F: Future<Output = CompileResult<T>> + Send + 'static,
{
    let len = futures.len();
    let mut set = JoinSet::new();
    for (idx, fut) in futures.into_iter().enumerate() {
        set.spawn(async move { (idx, fut.await) });
    }

    let mut slots: Vec<Option<T>> = (0..len).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (idx, result) = joined?;
        slots[idx] = Some(result?);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| slot.ok_or_else(|| CompileError::Task(format!("result {} was never produced", idx))))
        .collect()
}
