//! Composition Planner and Processor (spec §4.F, §4.G): turns a
//! [`komposer_core::Komposition`] document into a [`komposer_core::BuildPlan`]
//! and then drives that plan to a final rendered artifact.

pub mod ingest;
pub mod planner;
pub mod processor;

pub use ingest::parse_and_resolve;
pub use planner::{Planner, SegmentPreview};
pub use processor::{ProcessOutcome, Processor};
