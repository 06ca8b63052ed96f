pub mod analyzer;
pub mod commands;
pub mod config;
pub mod ingest;
pub mod model;
pub mod normalizer;
pub mod parser;
pub mod records;
pub mod storage;
pub mod utils;
