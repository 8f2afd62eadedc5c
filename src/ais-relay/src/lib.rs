#![deny(warnings)]
#![deny(rust_2018_idioms)]

//! Relays a live AIS vessel stream to any number of WebSocket consumers, either by giving every
//! consumer its own upstream connection or by fanning out a single supervised one.

pub mod backoff;
pub mod error;
pub mod feed;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod settings;
pub mod startup;
pub mod stats;
pub mod supervisor;
pub mod telemetry;
