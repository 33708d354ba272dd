//! Equipment replication.
//!
//! A selection taken from one equipment instance (say `RO03`) is copied to a
//! range of sibling instances by rewriting the instance code inside every
//! node id and materializing each copy into its own table.

use crate::error::{EngineError, EngineResult};
use crate::schema::SchemaSynchronizer;
use regex_lite::Regex;
use serde::Serialize;
use std::sync::Arc;
use tagsync_types::{TagDescriptor, normalize};
use tracing::{error, info};

/// Equipment instance code such as `RO03`, split into its letter prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceCode {
    pub code: String,
    pub prefix: String,
}

impl InstanceCode {
    /// Parses `<letters><digits>` with at least three characters in total.
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() < 3 {
            return None;
        }
        let split = code.find(|c: char| !c.is_ascii_alphabetic())?;
        if split == 0 || !code[split..].chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            code: code.to_string(),
            prefix: code[..split].to_string(),
        })
    }

    /// Code of instance `i`, zero-padded to two digits.
    pub fn for_instance(&self, i: u32) -> String {
        format!("{}{:02}", self.prefix, i)
    }
}

/// Compiled pattern locating the instance code inside a node id.
///
/// Capture group 1 holds the code; without a group the whole match is used.
#[derive(Debug, Clone)]
pub struct EquipmentPattern {
    regex: Regex,
}

impl EquipmentPattern {
    pub fn new(pattern: &str) -> EngineResult<Self> {
        Regex::new(pattern)
            .map(|regex| Self { regex })
            .map_err(|e| EngineError::InvalidInput(format!("invalid equipment pattern: {e}")))
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// The code found in the first node id that yields a valid one.
    pub fn extract_code<'a>(
        &self,
        node_ids: impl IntoIterator<Item = &'a str>,
    ) -> Option<InstanceCode> {
        node_ids.into_iter().find_map(|id| {
            let caps = self.regex.captures(id)?;
            let found = caps.get(1).or_else(|| caps.get(0))?;
            InstanceCode::parse(found.as_str())
        })
    }
}

/// Table name for one instance: `normalize(base + "_" + lower(code))`.
pub fn derive_table_name(base_table: &str, code: &str) -> String {
    normalize(&format!("{}_{}", base_table, code.to_lowercase()))
}

/// Replaces every occurrence of `old` in `node_id` with `new`.
pub fn substitute(node_id: &str, old: &str, new: &str) -> String {
    node_id.replace(old, new)
}

/// One instance of a replication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaPlan {
    pub instance: u32,
    pub code: String,
    pub table_name: String,
    pub tags: Vec<TagDescriptor>,
}

/// Copies a tag selection across a range of equipment instances.
pub struct EquipmentReplicator {
    synchronizer: Arc<SchemaSynchronizer>,
    pattern: EquipmentPattern,
    max_replicas: u32,
}

impl EquipmentReplicator {
    pub fn new(
        synchronizer: Arc<SchemaSynchronizer>,
        pattern: EquipmentPattern,
        max_replicas: u32,
    ) -> Self {
        Self {
            synchronizer,
            pattern,
            max_replicas,
        }
    }

    /// Validates the request and derives every instance's table and tags.
    /// Touches no collaborator.
    pub fn plan(
        &self,
        base_tags: &[TagDescriptor],
        base_table: &str,
        start: u32,
        end: u32,
    ) -> EngineResult<Vec<ReplicaPlan>> {
        if base_tags.is_empty() {
            return Err(EngineError::InvalidInput("no tags to replicate".into()));
        }
        if base_table.trim().is_empty() {
            return Err(EngineError::InvalidInput("base table name is required".into()));
        }
        if start > end {
            return Err(EngineError::InvalidInput(format!(
                "range start {start} is after end {end}"
            )));
        }
        let span = end - start + 1;
        if span > self.max_replicas {
            return Err(EngineError::InvalidInput(format!(
                "range covers {span} instances, limit is {}",
                self.max_replicas
            )));
        }

        let code = self
            .pattern
            .extract_code(base_tags.iter().map(|t| t.node_id.as_str()))
            .ok_or_else(|| {
                EngineError::Replication(format!(
                    "no equipment code matching {} in the selected tags",
                    self.pattern.as_str()
                ))
            })?;

        Ok((start..=end)
            .map(|instance| {
                let next = code.for_instance(instance);
                let table_name = derive_table_name(base_table.trim(), &next);
                let tags = base_tags
                    .iter()
                    .map(|t| t.retarget(substitute(&t.node_id, &code.code, &next), &table_name))
                    .collect();
                ReplicaPlan {
                    instance,
                    code: next,
                    table_name,
                    tags,
                }
            })
            .collect())
    }

    /// Materializes every instance in ascending order and returns the table
    /// names. The first failing instance aborts the rest.
    pub async fn replicate(
        &self,
        base_tags: &[TagDescriptor],
        base_table: &str,
        start: u32,
        end: u32,
    ) -> EngineResult<Vec<String>> {
        let plans = self.plan(base_tags, base_table, start, end)?;
        info!(
            "Replicating {} tags into {} instances",
            base_tags.len(),
            plans.len()
        );
        self.synchronizer.ensure_registry_table().await?;

        let mut tables = Vec::with_capacity(plans.len());
        for plan in plans {
            match self
                .synchronizer
                .materialize_and_insert(&plan.tags, &plan.table_name)
                .await
            {
                Ok(report) => {
                    info!("Replicated {} into {}", plan.code, report.table_name);
                    tables.push(report.table_name);
                }
                Err(e) => {
                    error!("Replication of {} failed: {}", plan.code, e);
                    return Err(EngineError::ReplicaFailed {
                        table: plan.table_name,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(tables)
    }
}
