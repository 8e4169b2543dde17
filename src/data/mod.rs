//! External data sources.
//!
//! - NOAA Coral Reef Watch daily product via ERDDAP griddap (`erddap`)

pub mod erddap;

pub use erddap::{ErddapClient, FetchError, FetchPolicy, HttpFetch};
