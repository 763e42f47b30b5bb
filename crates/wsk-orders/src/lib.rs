//! Order and item model plus the delivery status state machine.
//!
//! Pure: no IO, no clock. Totals are always derived from items here and
//! nowhere else.

pub mod lifecycle;
pub mod model;

pub use lifecycle::{advance, next_status, TransitionError};
pub use model::{
    assemble_all, line_total, ItemInput, Order, OrderDraft, OrderInput, ValidationError,
};
