pub mod app;
pub mod config;
pub mod driver;
pub mod engine;
pub mod exec;
pub mod jobs;
pub mod sandbox;
pub mod shared;
pub mod tools;
pub mod transfer;
