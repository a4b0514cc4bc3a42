// GRBL-compatible stepper controller for host G-code senders

pub mod config;
pub mod messages;
pub mod motion;
pub mod motor;
pub mod runtime;
pub mod transport;
