//! Sluice Core
//!
//! Core types shared by the Sluice services.
//!
//! This crate contains:
//! - Domain types: Pipeline, Execution, Lock and Token
//! - DTOs: request/response shapes exchanged with the orchestrator API

pub mod domain;
pub mod dto;
