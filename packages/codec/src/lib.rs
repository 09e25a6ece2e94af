#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Codecs between survey records and the spreadsheet that stores them.
//!
//! The spreadsheet's header row has changed shape several times over its
//! life. This crate owns every rule needed to keep old and new rows
//! readable:
//!
//! - [`map_link`] derives the coordinate pair to and from the single
//!   map-link cell (plain URL or legacy `HYPERLINK` formula).
//! - [`fields`] is the column-name table, including legacy aliases.
//! - [`schema`] computes the structural edits that bring a live header
//!   row to the current canonical layout.
//! - [`record`] positions record values by the live header on write and
//!   normalizes mixed-layout rows on read.

pub mod fields;
pub mod map_link;
pub mod record;
pub mod schema;
