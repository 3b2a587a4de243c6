//! BDD step definitions for the camwatch console

pub mod capture_steps;
pub mod device_steps;
pub mod session_steps;
