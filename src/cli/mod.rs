pub mod aggregate;
pub mod setup;
pub mod show;
pub mod ui;
