//! plumebot library — the agent core behind the document assistant.
//!
//! Two halves: the tool-call protocol parser (`parser`) turns raw model
//! output into validated commands plus residual text; the iteration
//! controller (`agent`) drives the bounded call → parse → execute loop
//! around it. Model clients and tool implementations live behind traits.

pub mod agent;
pub mod config;
pub mod errors;
pub mod parser;
pub mod providers;
