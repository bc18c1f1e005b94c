pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod layout;
pub mod models;
pub mod replay;
pub mod store;

#[cfg(test)]
mod testing;

pub use client::{ApiError, BackendApi, HttpBackend};
pub use config::PostulateConfig;
pub use controller::Controller;
pub use error::PostulateError;
pub use layout::{layout_flow, FlowEdge, FlowGraph, PositionedNode};
pub use replay::{
    resolve_outgoing, DefaultAlternatePath, ReplayError, ReplayOutcome, ReplaySource,
    ReplayStep, ResolvedReplay,
};
pub use store::{Action, AppState, Effect, RequestToken, StoreError};
