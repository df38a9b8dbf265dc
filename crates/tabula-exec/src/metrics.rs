//! Tracing hooks for bulk operations.
//!
//! No subscriber is installed here; wire one up in the binary layer.

use tracing::span::EnteredSpan;

use crate::dispatch::Dispatch;

/// Enter a span describing one bulk operation and log its dispatch mode.
///
/// Keep the returned guard alive for the duration of the operation so that
/// events emitted by the engines are attributed to it.
pub fn op_span(op: &'static str, rows: usize, columns: usize, dispatch: Dispatch) -> EnteredSpan {
    let span = tracing::debug_span!("tabula", op, rows, columns).entered();
    tracing::debug!(?dispatch, "dispatch");
    span
}
