//! Azure DevOps adapter.
//!
//! [`AdoClient`] implements [`asof_core::WorkItemSource`] over the Azure
//! DevOps REST API (version 7.0) and exposes the catalog lookups the CLI
//! uses to help pick a selection: projects, teams, iterations and work item
//! types.

pub mod client;
pub mod wire;

pub use client::{API_VERSION, AdoClient, classify_error};
pub use wire::{Iteration, IterationAttributes, Project, Team, WorkItemType};
