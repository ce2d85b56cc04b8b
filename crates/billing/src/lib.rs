//! Bill aggregate: the state a billing period owns and the rules that
//! mutate it.
//!
//! The aggregate is pure - decisions (`handle`) and transitions (`apply`)
//! never perform IO. The engine crate hosts it inside a per-bill machine and
//! owns persistence, timers, and notification.

pub mod bill;
pub mod period;

pub use bill::{
    AddLineItem, Bill, BillClosed, BillCommand, BillEvent, BillOpened, BillStatus, CloseBill,
    CloseReason, CloseSignal, EndPeriod, LineItem, LineItemAdded, OpenBill,
};
pub use period::next_period_start;
