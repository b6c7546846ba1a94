//! Core landing zone logic: configuration, references, resolution, planning, emission.

pub mod directory;
pub mod emitter;
pub mod error;
pub mod events;
pub mod executor;
pub mod hasher;
pub mod index;
pub mod params;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod schema;
pub mod state;
pub mod types;
pub mod validator;
