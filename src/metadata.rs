//! Run metadata: task count and per-task class mappings.
//!
//! Stored beside the sample data as `metadata.json`, never through the bulk
//! sample persistence path:
//!
//! ```json
//! {"num_tasks": 2,
//!  "global_to_local_class_mappings": {"task_1": {"3": 0, "7": 1}, "task_2": {"0": 0}}}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::split::task_name;

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Number of partitioned tasks, excluding the reference task 0.
    pub num_tasks: usize,
    /// `task_{i}` -> (global label as string -> local label).
    #[serde(default)]
    pub global_to_local_class_mappings: BTreeMap<String, BTreeMap<String, i64>>,
}

impl RunMetadata {
    pub fn new(num_tasks: usize) -> Self {
        Self {
            num_tasks,
            global_to_local_class_mappings: BTreeMap::new(),
        }
    }

    /// Registers the class mapping of `task`, global label -> local label.
    pub fn set_class_mapping(&mut self, task: usize, mapping: &BTreeMap<i64, i64>) {
        let entry = mapping
            .iter()
            .map(|(global, local)| (global.to_string(), *local))
            .collect();
        self.global_to_local_class_mappings
            .insert(task_name(task), entry);
    }

    pub fn global_to_local(&self, task: usize) -> Result<&BTreeMap<String, i64>> {
        self.global_to_local_class_mappings
            .get(&task_name(task))
            .ok_or_else(|| {
                Error::InvalidConfig(format!("no class mapping for {}", task_name(task)))
            })
    }

    /// Inverts the mapping of `task` into local label -> global label.
    ///
    /// Fails if two global labels share a local label, or a global key is
    /// not an integer.
    pub fn local_to_global(&self, task: usize) -> Result<HashMap<i64, i64>> {
        let g2l = self.global_to_local(task)?;
        let mut inverse = HashMap::with_capacity(g2l.len());
        for (global, &local) in g2l {
            let global: i64 = global.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!(
                    "{}: global label `{}` is not an integer",
                    task_name(task),
                    global
                ))
            })?;
            if inverse.insert(local, global).is_some() {
                return Err(Error::NonBijectiveMapping { task, local });
            }
        }
        debug!("Inverted class mapping of task {} ({} labels)", task, inverse.len());
        Ok(inverse)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let metadata: Self = serde_json::from_str(&content)?;
        info!(
            "Loaded metadata from {}: {} tasks",
            path.display(),
            metadata.num_tasks
        );
        Ok(metadata)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        debug!("Saved metadata to {}", path.display());
        Ok(())
    }
}
