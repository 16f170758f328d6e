//! Aggregate segment cache for the mdx engine.
//!
//! A *segment* is a cached rectangular slice of aggregate cell values for one
//! measure, constrained along zero or more backing columns. This crate owns:
//!
//! - the logical identity of a segment ([`SegmentHeader`]) and its containment
//!   relation (`covers`),
//! - the physical storage ([`SegmentBody`]: dense array + null bitmap, or a
//!   sparse coordinate map, chosen by fill density),
//! - the concurrent [`SegmentCacheIndex`], which guarantees at most one in-flight
//!   backend fetch per logical key while serving overlapping requests from
//!   already-resident data.
//!
//! Bodies are immutable once installed as Ready and are shared via `Arc` across
//! concurrent readers without copying.

#![forbid(unsafe_code)]

mod axis;
mod bitmap;
mod body;
mod header;
mod index;
mod loader;

pub use crate::axis::SegmentAxis;
pub use crate::bitmap::Bitmap;
pub use crate::body::{SegmentBody, SegmentBodyBuilder};
pub use crate::header::{ColumnConstraint, SegmentHeader};
pub use crate::index::{LoadToken, RequestOutcome, SegmentCacheIndex, SegmentWaiter};
pub use crate::loader::{AggregateLoader, SegmentLoadError};
