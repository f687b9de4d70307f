pub mod cache;
pub mod cli;
pub mod config;
pub mod devices;
pub mod launch;
pub mod paths;
pub mod ps;
pub mod supervisor;
pub mod sys;
pub mod telemetry;
pub mod terminate;
pub mod toolchain;
