//! Type-safe script argument modules.
//!
//! This module contains structs that implement `ScriptArgs` for each
//! provisioning script. Each struct maps Rust fields to the exact positional
//! parameters expected by the corresponding PowerShell script.

pub mod domain_controller;
pub mod powershell_universal;
