//! Landing Zone Planner: validate multi-account network configuration and
//! turn it into dependency-ordered provisioning plans.
//!
//! Schema-checked YAML in, partitioned plans out. One partition per
//! account and region, each emitted and recorded independently.

pub mod cli;
pub mod core;
