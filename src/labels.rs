//! Task-local to global label reconciliation.

use log::{debug, info};

use crate::error::{Error, Result};
use crate::split::Split;
use crate::store::DatasetStore;

/// Rewrites the labels of every partitioned task from local to global.
///
/// Task 0 already uses global labels and is left alone. A task without a
/// `val` split is fine; missing `train` or `test` is an error. Tasks already
/// reconciled on this store are skipped, so calling this again is a no-op.
pub fn map_labels_to_global(store: &mut DatasetStore) -> Result<()> {
    info!("Mapping labels of {} tasks back to global", store.num_tasks());
    for task in 1..=store.num_tasks() {
        if store.is_reconciled(task) {
            debug!("Task {} labels already global, skipping", task);
            continue;
        }
        let local_to_global = store.metadata().local_to_global(task)?;

        for split in Split::LABELLED {
            if split == Split::Val && !store.has_split(task, split) {
                debug!("Task {} has no val split, skipping", task);
                continue;
            }
            store.task_mut(task, split)?.map_labels(|_, local| {
                local_to_global
                    .get(&local)
                    .copied()
                    .ok_or_else(|| Error::MissingLabelMapping {
                        task,
                        split,
                        label: local,
                    })
            })?;
            debug!("Task {} {}: labels mapped to global", task, split);
        }
        store.mark_reconciled(task);
    }
    Ok(())
}
