// src/lib.rs

pub mod backend;
pub mod capture;
pub mod config;
pub mod error;
pub mod extraction;
pub mod pipeline;
pub mod preprocessing;
pub mod rules;
pub mod smoothing;
pub mod transition;
pub mod types;
