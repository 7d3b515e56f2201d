#![doc = include_str!("../../../README.md")]

pub mod config;
pub mod contract;
pub mod deploy_optimizing;
pub mod deployment;
pub mod error;
pub mod event_store;
pub mod experiment;
pub mod genetic;
pub mod metrics;
pub mod operator;
pub mod parser;
pub mod simulation;
pub mod task;
pub mod utility;
pub mod vm;
pub mod vm_assignment;
pub mod workload;
