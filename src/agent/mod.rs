pub mod agent_loop;
pub mod circuit_breaker;
pub mod recovery;
pub mod sanitize;
pub mod tools;
