//! Per-bill state machine.
//!
//! One tokio task per bill. The task owns the Bill aggregate exclusively:
//! it multiplexes the add-item channel, the close channel, and the
//! period-end timer, and for every accepted event it appends to the store
//! *before* applying, so the stream is always ahead of (or equal to) the
//! in-memory state. Everyone else observes the bill through a watch
//! channel, which by construction yields clean between-handler snapshots.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use billflow_billing::{
    next_period_start, AddLineItem, Bill, BillCommand, BillEvent, CloseBill, CloseSignal,
    EndPeriod, LineItem, OpenBill,
};
use billflow_core::{Aggregate, BillId, CustomerId, DomainError, ExpectedVersion};
use billflow_money::Currency;

use crate::clock::Clock;
use crate::event_store::{EventStore, EventStoreError, UncommittedEvent};
use crate::notifier::BillClosedNotifier;
use crate::retry::{run_with_retry, RetryPolicy};

const ITEM_CHANNEL_CAPACITY: usize = 64;
const CLOSE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("failed to decode stored event: {0}")]
    Decode(String),
}

/// Where a machine is in its lifetime.
///
/// `Running` covers the whole span from start until the close notification
/// has finished (or exhausted its retries) - a closed bill stays observable
/// during that window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MachineLifecycle {
    Running,
    Completed,
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("machine is no longer running")]
    NotRunning,
}

/// Everything a machine needs besides its own state.
pub(crate) struct MachineContext<S> {
    pub store: S,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn BillClosedNotifier>,
    pub retry: RetryPolicy,
}

impl<S: Clone> Clone for MachineContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            notifier: self.notifier.clone(),
            retry: self.retry,
        }
    }
}

/// Client-side handle to a running machine: named addressing, the indexed
/// customer attribute, signal senders, and the snapshot/lifecycle readers.
#[derive(Clone)]
pub struct MachineHandle {
    bill_id: BillId,
    customer_id: CustomerId,
    item_tx: mpsc::Sender<LineItem>,
    close_tx: mpsc::Sender<CloseSignal>,
    snapshot_rx: watch::Receiver<Bill>,
    lifecycle_rx: watch::Receiver<MachineLifecycle>,
}

impl MachineHandle {
    pub fn bill_id(&self) -> BillId {
        self.bill_id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn lifecycle(&self) -> MachineLifecycle {
        *self.lifecycle_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == MachineLifecycle::Running
    }

    /// Current snapshot. Always a clean between-handler copy.
    pub fn snapshot(&self) -> Bill {
        self.snapshot_rx.borrow().clone()
    }

    /// Enqueue a line item. FIFO with respect to other items.
    pub async fn signal_add_item(&self, item: LineItem) -> Result<(), SignalError> {
        self.item_tx
            .send(item)
            .await
            .map_err(|_| SignalError::NotRunning)
    }

    /// Enqueue a close request. FIFO with respect to other close requests.
    pub async fn signal_close(&self, signal: CloseSignal) -> Result<(), SignalError> {
        self.close_tx
            .send(signal)
            .await
            .map_err(|_| SignalError::NotRunning)
    }

    /// Wait (bounded) for a snapshot matching `pred`; falls back to the
    /// latest snapshot if the machine finishes or the deadline passes first.
    pub async fn next_snapshot_matching(
        &self,
        pred: impl FnMut(&Bill) -> bool,
        deadline: Duration,
    ) -> Bill {
        let mut rx = self.snapshot_rx.clone();
        let result = match tokio::time::timeout(deadline, rx.wait_for(pred)).await {
            Ok(Ok(bill)) => bill.clone(),
            // Machine gone or deadline hit: the last published snapshot is
            // still the freshest consistent view there is.
            _ => self.snapshot_rx.borrow().clone(),
        };
        result
    }

    /// Wait (bounded) until the machine leaves `Running`.
    pub async fn wait_until_completed(&self, deadline: Duration) {
        let mut rx = self.lifecycle_rx.clone();
        let _ = tokio::time::timeout(deadline, rx.wait_for(|l| *l == MachineLifecycle::Completed))
            .await;
    }
}

/// Start a brand-new machine: decide + persist `BillOpened`, then run.
pub(crate) fn start_machine<S>(
    ctx: MachineContext<S>,
    bill_id: BillId,
    customer_id: CustomerId,
    currency: Currency,
) -> Result<MachineHandle, MachineError>
where
    S: EventStore + Clone + Send + Sync + 'static,
{
    let mut bill = Bill::empty(bill_id);
    let events = bill.handle(&BillCommand::Open(OpenBill {
        bill_id,
        customer_id,
        currency,
        opened_at: ctx.clock.now(),
    }))?;
    let revision = commit(&ctx.store, &mut bill, 0, &events)?;

    Ok(spawn_loop(ctx, bill, revision))
}

/// Resume a machine from its stream after a restart.
///
/// Returns `None` when the stream is empty or the bill already closed -
/// there is nothing left to run.
pub(crate) fn resume_machine<S>(
    ctx: MachineContext<S>,
    bill_id: BillId,
) -> Result<Option<MachineHandle>, MachineError>
where
    S: EventStore + Clone + Send + Sync + 'static,
{
    let stream = ctx.store.load_stream(bill_id)?;
    if stream.is_empty() {
        return Ok(None);
    }

    let mut bill = Bill::empty(bill_id);
    for stored in &stream {
        let event: BillEvent = serde_json::from_value(stored.payload.clone())
            .map_err(|e| MachineError::Decode(e.to_string()))?;
        bill.apply(&event);
    }

    if bill.is_closed() {
        return Ok(None);
    }

    let revision = stream.len() as u64;
    Ok(Some(spawn_loop(ctx, bill, revision)))
}

fn spawn_loop<S>(ctx: MachineContext<S>, bill: Bill, revision: u64) -> MachineHandle
where
    S: EventStore + Clone + Send + Sync + 'static,
{
    let (item_tx, item_rx) = mpsc::channel(ITEM_CHANNEL_CAPACITY);
    let (close_tx, close_rx) = mpsc::channel(CLOSE_CHANNEL_CAPACITY);
    let (snapshot_tx, snapshot_rx) = watch::channel(bill.clone());
    let (lifecycle_tx, lifecycle_rx) = watch::channel(MachineLifecycle::Running);

    let handle = MachineHandle {
        bill_id: bill.id_typed(),
        customer_id: bill.customer_id(),
        item_tx,
        close_tx,
        snapshot_rx,
        lifecycle_rx,
    };

    tokio::spawn(run_loop(
        ctx,
        bill,
        revision,
        item_rx,
        close_rx,
        snapshot_tx,
        lifecycle_tx,
    ));

    handle
}

async fn run_loop<S>(
    ctx: MachineContext<S>,
    mut bill: Bill,
    mut revision: u64,
    mut item_rx: mpsc::Receiver<LineItem>,
    mut close_rx: mpsc::Receiver<CloseSignal>,
    snapshot_tx: watch::Sender<Bill>,
    lifecycle_tx: watch::Sender<MachineLifecycle>,
) where
    S: EventStore,
{
    let bill_id = bill.id_typed();

    // The calendar boundary is derived from persisted state (created_at),
    // so a resumed machine re-arms the deadline it had before the restart.
    // The remaining time is measured against the clock; a boundary that
    // passed while the process was down fires immediately.
    let until_boundary = (next_period_start(bill.created_at()) - ctx.clock.now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    let period_timer = tokio::time::sleep(until_boundary);
    tokio::pin!(period_timer);
    let mut timer_fired = false;

    while !bill.is_closed() {
        tokio::select! {
            biased;

            Some(item) = item_rx.recv() => {
                let command = BillCommand::AddLineItem(AddLineItem { bill_id, item });
                match bill.handle(&command) {
                    Ok(events) if events.is_empty() => {
                        tracing::warn!(bill_id = %bill_id, "ignoring line item for closed bill");
                    }
                    Ok(events) => match commit(&ctx.store, &mut bill, revision, &events) {
                        Ok(next) => {
                            revision = next;
                            tracing::info!(bill_id = %bill_id, "added line item");
                        }
                        Err(e) => {
                            tracing::error!(bill_id = %bill_id, error = %e, "failed to persist line item");
                        }
                    },
                    Err(e) => {
                        tracing::error!(bill_id = %bill_id, error = %e, "rejected line item");
                    }
                }
            }

            Some(signal) = close_rx.recv() => {
                let command = BillCommand::Close(CloseBill { bill_id, signal });
                match bill.handle(&command) {
                    Ok(events) if events.is_empty() => {
                        tracing::warn!(bill_id = %bill_id, "tried to close already closed bill");
                    }
                    Ok(events) => match commit(&ctx.store, &mut bill, revision, &events) {
                        Ok(next) => {
                            revision = next;
                            tracing::info!(bill_id = %bill_id, "closed bill");
                        }
                        Err(e) => {
                            tracing::error!(bill_id = %bill_id, error = %e, "failed to persist close");
                        }
                    },
                    Err(e) => {
                        tracing::error!(bill_id = %bill_id, error = %e, "rejected close signal");
                    }
                }
            }

            _ = &mut period_timer, if !timer_fired => {
                timer_fired = true;
                let command = BillCommand::EndPeriod(EndPeriod { bill_id, now: ctx.clock.now() });
                match bill.handle(&command) {
                    Ok(events) if events.is_empty() => {}
                    Ok(events) => match commit(&ctx.store, &mut bill, revision, &events) {
                        Ok(next) => {
                            revision = next;
                            tracing::info!(bill_id = %bill_id, "auto-closed bill at billing period end");
                        }
                        Err(e) => {
                            tracing::error!(bill_id = %bill_id, error = %e, "failed to persist period end");
                        }
                    },
                    Err(e) => {
                        tracing::error!(bill_id = %bill_id, error = %e, "rejected period end");
                    }
                }
            }

            else => break,
        }

        snapshot_tx.send_replace(bill.clone());
    }

    if bill.is_closed() {
        notify_closed(&ctx, &bill).await;
    }

    lifecycle_tx.send_replace(MachineLifecycle::Completed);
}

async fn notify_closed<S>(ctx: &MachineContext<S>, bill: &Bill)
where
    S: EventStore,
{
    let result = run_with_retry(&ctx.retry, || ctx.notifier.bill_closed(bill)).await;

    if let Err(e) = result {
        tracing::error!(
            bill_id = %bill.id_typed(),
            customer_id = %bill.customer_id(),
            error = %e,
            "failed to send bill closed notification"
        );
    }
}

/// Append the decided events (optimistically against `revision`), then fold
/// them into the aggregate. Returns the new revision.
fn commit<S>(
    store: &S,
    bill: &mut Bill,
    revision: u64,
    events: &[BillEvent],
) -> Result<u64, MachineError>
where
    S: EventStore + ?Sized,
{
    let uncommitted = events
        .iter()
        .map(|e| UncommittedEvent::from_typed(bill.id_typed(), Uuid::now_v7(), e))
        .collect::<Result<Vec<_>, _>>()?;

    let committed = store.append(uncommitted, ExpectedVersion::Exact(revision))?;

    for e in events {
        bill.apply(e);
    }

    Ok(revision + committed.len() as u64)
}
