//! Diagnostics for failures that degrade a matrix instead of aborting the assembly.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::Point3;
use serde::Serialize;


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedPoint {
    pub index: usize,
    pub point: Point3<f64>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZeroedColumn {
    pub index: usize,
    pub reason: String,
}

/// Recoverable failures met by a driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub dropped_points: Vec<DroppedPoint>,
    pub zeroed_columns: Vec<ZeroedColumn>,
    pub rejected_source: Option<String>, // why the whole matrix was left at zero
}

impl AssemblyReport {
    pub fn is_clean(&self) -> bool {
        self.dropped_points.is_empty()
            && self.zeroed_columns.is_empty()
            && self.rejected_source.is_none()
    }

    pub fn drop_point(&mut self, index: usize, point: Point3<f64>, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("point {} {} dropped: {}", index, point, reason);
        self.dropped_points.push(DroppedPoint {
            index,
            point,
            reason,
        });
    }

    pub fn zero_column(&mut self, index: usize, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("column {} left at zero: {}", index, reason);
        self.zeroed_columns.push(ZeroedColumn { index, reason });
    }

    pub fn reject_source(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("source rejected: {}", reason);
        self.rejected_source = Some(reason);
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        Ok(())
    }
}
