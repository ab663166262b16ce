//! Update-decision core of the regatta cluster job scheduler.
//!
//! A job update moves each logical instance from a possibly-absent old
//! task configuration to a possibly-absent desired one. The
//! [`processor::instance_updater::InstanceUpdater`] engine decides, on
//! every observed change to an instance's runtime state, what the
//! orchestrator should do next: wait, kill, replace, mark succeeded, or
//! declare the instance permanently failed. The engine performs no I/O
//! and holds no timers; executing the returned action and scheduling the
//! next evaluation are the caller's job.

pub mod config;
pub mod data_model;
pub mod processor;
pub mod utils;
