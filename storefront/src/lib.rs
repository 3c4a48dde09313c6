pub mod commands;
pub mod logging;
