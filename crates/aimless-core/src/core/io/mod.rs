//! Provides the on-disk formats produced and consumed by a shooting campaign.
//!
//! Each worker (and the master log) writes a pair of append-only files: an XYZ
//! coordinate archive holding the shooting point of every attempt, and a CSV
//! metadata table holding one [`records::ResultRecord`] per attempt. Row *i* of the
//! table always describes frame *i* of the archive.

pub mod records;
pub mod xyz;
