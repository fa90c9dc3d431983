//! Client-side core of the ImageProcess stega app.
//!
//! A remote service performs the actual steganographic encode/decode; this
//! crate owns the in-memory task queue that drives submitted jobs through
//! their lifecycle one at a time, the HTTP client for that service, and
//! gallery persistence for finished artifacts.

pub mod config;
pub mod models;
pub mod queue;
pub mod services;
