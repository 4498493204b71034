//! Cell presence records.
//!
//! A cell is a worker node. Its presence record is a heartbeat
//! advertisement carrying address, zone, capacity, and the rootfs
//! providers it has preloaded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::validator::{Validate, ValidationError};

/// Schedulable capacity advertised by a cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellCapacity {
    /// Memory available for workloads, in MiB; must be positive.
    pub memory_mb: i32,
    /// Disk available for workloads, in MiB; never negative.
    pub disk_mb: i32,
    /// Maximum number of containers; must be positive.
    pub containers: i32,
}

impl Validate for CellCapacity {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.memory_mb <= 0 {
            err.invalid_field("memory_mb");
        }
        if self.disk_mb < 0 {
            err.invalid_field("disk_mb");
        }
        if self.containers <= 0 {
            err.invalid_field("containers");
        }
        err.into_result()
    }
}

/// Heartbeat record advertising a live cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPresence {
    /// Unique cell identifier.
    pub cell_id: String,
    /// Address of the cell's representative process.
    pub rep_address: String,
    /// Availability zone the cell runs in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
    /// Schedulable capacity.
    pub capacity: CellCapacity,
    /// Preloaded rootfs tags by provider name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rootfs_providers: BTreeMap<String, Vec<String>>,
}

impl Validate for CellPresence {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.cell_id.is_empty() {
            err.invalid_field("cell_id");
        }
        if self.rep_address.is_empty() {
            err.invalid_field("rep_address");
        }
        if let Err(nested) = self.capacity.validate() {
            err.extend(nested);
        }
        err.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn presence() -> CellPresence {
        CellPresence {
            cell_id: "cell-z1-0".to_string(),
            rep_address: "http://10.0.16.12:1800".to_string(),
            zone: "z1".to_string(),
            capacity: CellCapacity {
                memory_mb: 8192,
                disk_mb: 16384,
                containers: 256,
            },
            rootfs_providers: BTreeMap::from([(
                "preloaded".to_string(),
                vec!["lucid64".to_string()],
            )]),
        }
    }

    #[test]
    fn test_valid_presence_passes() {
        assert!(presence().validate().is_ok());
    }

    #[test]
    fn test_capacity_bounds() {
        let mut p = presence();
        p.capacity.memory_mb = 0;
        p.capacity.containers = 0;
        p.capacity.disk_mb = -1;
        let err = p.validate().unwrap_err().to_string();
        assert!(err.contains("memory_mb") && err.contains("containers") && err.contains("disk_mb"));
    }

    #[test]
    fn test_identity_fields_required() {
        let mut p = presence();
        p.cell_id = String::new();
        p.rep_address = String::new();
        let err = p.validate().unwrap_err().to_string();
        assert!(err.contains("cell_id") && err.contains("rep_address"));
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let p = presence();
        let decoded: CellPresence = serde_json::from_str(&serde_json::to_string(&p)?)?;
        assert_eq!(decoded, p);
        Ok(())
    }
}
