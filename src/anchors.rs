//! Anchor consistency across tasks.
//!
//! Relative embeddings of different tasks are only comparable when every task
//! projects onto the same anchors in the same order, so this check runs before
//! any projection.

use log::{debug, info};

use crate::error::{Error, IdMismatch, Result};
use crate::split::Split;
use crate::store::DatasetStore;

/// First disagreement between two id sequences, if any.
pub fn compare_ids(left: &[u64], right: &[u64]) -> Option<IdMismatch> {
    if left.len() != right.len() {
        return Some(IdMismatch::Length {
            left: left.len(),
            right: right.len(),
        });
    }
    left.iter()
        .zip(right)
        .position(|(a, b)| a != b)
        .map(|index| IdMismatch::Index {
            index,
            left: left[index],
            right: right[index],
        })
}

/// Asserts that every pair of tasks has element-wise equal anchor ids.
pub fn check_same_anchor_ids(store: &DatasetStore) -> Result<()> {
    let n = store.num_tasks();
    for task_a in 0..=n {
        let ids_a = store.task(task_a, Split::Anchors)?.ids();
        for task_b in (task_a + 1)..=n {
            let ids_b = store.task(task_b, Split::Anchors)?.ids();
            if let Some(detail) = compare_ids(ids_a, ids_b) {
                return Err(Error::AnchorMismatch {
                    task_a,
                    task_b,
                    detail,
                });
            }
        }
        debug!("Anchors of task {} agree with every later task", task_a);
    }
    info!("Anchor ids consistent across {} tasks", n + 1);
    Ok(())
}
