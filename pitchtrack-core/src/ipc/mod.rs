//! Events published by the live tracker.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so consumers can
//! forward them as JSON without a translation layer.

pub mod events;
