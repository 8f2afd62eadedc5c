#![deny(warnings)]
#![deny(rust_2018_idioms)]

//! Domain types for the live vessel relay: vessel identities, the partial facts normalized from
//! single AIS messages, the merged per-vessel record, the windowed store holding those records
//! and the fan-out publisher distributing them.

mod publisher;
mod store;
mod vessel;

pub use publisher::*;
pub use store::*;
pub use vessel::*;
