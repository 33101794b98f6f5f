// Library surface for headless/integration tests and reuse.
// main.rs only wires the terminal, logging and CLI around it.
pub mod app;
pub mod app_dirs;
pub mod config;
pub mod inference;
pub mod measurement;
pub mod runtime;
pub mod sensors;
pub mod session;
pub mod store;
pub mod ui;
pub mod util;
pub mod wizard;
