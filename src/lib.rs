//! `coral-risk` library crate.
//!
//! The binary (`coral`) is a thin wrapper around this library so that the
//! data pipeline, model and risk logic are testable without spawning
//! processes or touching the network.

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod prep;
pub mod report;
pub mod risk;
pub mod tui;
