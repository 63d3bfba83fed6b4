use crate::core::models::outcome::Basin;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Column names of the metadata table, in file order.
pub const HEADER: [&str; 7] = [
    "index",
    "accepted",
    "basin_fwd",
    "basin_rev",
    "box_x",
    "box_y",
    "box_z",
];

/// One row of the metadata table, describing one shooting attempt.
///
/// A basin that did not commit is written as an empty field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub index: usize,
    pub accepted: bool,
    pub basin_fwd: Option<Basin>,
    pub basin_rev: Option<Basin>,
    pub box_x: f64,
    pub box_y: f64,
    pub box_z: f64,
}

impl ResultRecord {
    pub fn new(
        index: usize,
        accepted: bool,
        basin_fwd: Option<Basin>,
        basin_rev: Option<Basin>,
        box_dims: Vector3<f64>,
    ) -> Self {
        Self {
            index,
            accepted,
            basin_fwd,
            basin_rev,
            box_x: box_dims.x,
            box_y: box_dims.y,
            box_z: box_dims.z,
        }
    }

    pub fn box_dims(&self) -> Vector3<f64> {
        Vector3::new(self.box_x, self.box_y, self.box_z)
    }
}

/// Reads a complete metadata table, including its header row.
pub fn read_records(reader: impl Read) -> Result<Vec<ResultRecord>, csv::Error> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader)
        .deserialize()
        .collect()
}

/// Parses header-less metadata rows.
pub fn parse_rows(bytes: &[u8]) -> Result<Vec<ResultRecord>, csv::Error> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(bytes)
        .deserialize()
        .collect()
}

/// Builds a metadata table writer. The header row is written only when
/// `write_header` is set, so that an existing table can be appended to.
pub fn record_writer<W: Write>(writer: W, write_header: bool) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(writer)
}
