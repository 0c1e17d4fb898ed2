//! Parley - event-driven chat turn orchestration
//!
//! A user message is persisted, sent to a model, and the model's answer is
//! persisted and announced on an [`events::EventBus`]. Tool calls in the
//! answer are dispatched to registered processors and their results are fed
//! back to the model for a follow-up turn.

#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod model;
pub mod orchestrator;
pub mod repository;
pub mod tools;
