//! Registry-verified locked block manifest.
//!
//! Every entry is copied from the registry row the claim was verified
//! against. Client-supplied schemas never reach this type.

use blockbench_state::{BlockPermissions, BlockTests, BlockVersionRecord, VersionStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedBlock {
    pub block_id: String,
    pub version: String,
    pub digest: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub changelog: String,
    pub deprecated: bool,
    pub permissions: BlockPermissions,
    pub tests: BlockTests,
}

impl LockedBlock {
    /// Build an entry from the stored version of block `slug`.
    pub fn from_record(slug: &str, record: &BlockVersionRecord) -> Self {
        Self {
            block_id: slug.to_string(),
            version: record.version.clone(),
            digest: record.digest.clone(),
            input_schema: record.input_schema.clone(),
            output_schema: record.output_schema.clone(),
            changelog: record.changelog.clone(),
            deprecated: record.status == VersionStatus::Deprecated,
            permissions: record.permissions.clone(),
            tests: record.tests.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedBlockManifest {
    pub locked_blocks: Vec<LockedBlock>,
}

impl LockedBlockManifest {
    pub fn get(&self, slug: &str, version: &str) -> Option<&LockedBlock> {
        self.locked_blocks
            .iter()
            .find(|b| b.block_id == slug && b.version == version)
    }

    pub fn len(&self) -> usize {
        self.locked_blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked_blocks.is_empty()
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
