//! Read-side projections fed from published envelopes.

pub mod request_board;

pub use request_board::{RequestBoardEntry, RequestBoardProjection, RequestProjectionError};
