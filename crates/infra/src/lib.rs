//! Infrastructure layer: event store, command dispatch, projections, and the
//! application services that tie the domain crates together.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod service;

#[cfg(test)]
mod integration_tests;
