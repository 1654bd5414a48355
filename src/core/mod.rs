pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod steps;
pub mod terminal;
pub mod warehouse;
