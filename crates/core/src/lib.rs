//! Per-frame face detection pipeline for live video.
//!
//! Frames flow through `preprocessing` → `inference` → `detection`
//! (decode, weighted suppression, display mapping), orchestrated by
//! `pipeline`. Nothing is retained between frames.

pub mod detection;
pub mod inference;
pub mod pipeline;
pub mod preprocessing;
pub mod shared;
