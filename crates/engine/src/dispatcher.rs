//! Process-level facade over the substrate.
//!
//! The dispatcher is what the API layer talks to: it starts machines,
//! validates and normalizes incoming amounts, forwards signals to named
//! machines, reads snapshots, and enforces customer-scoped access. Currency
//! conversion happens *here*, before a line item ever reaches a machine, so
//! machine state is always consistent in the bill's declared currency.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use billflow_billing::{Bill, BillStatus, CloseSignal, LineItem};
use billflow_core::{AggregateRoot, BillId, CustomerId, LineItemId};
use billflow_money::{Currency, ExchangeRates, Money};

use crate::clock::{Clock, SystemClock};
use crate::event_store::EventStore;
use crate::machine::{self, MachineContext, MachineHandle};
use crate::notifier::{BillClosedNotifier, EmailNotifier};
use crate::registry::MachineRegistry;
use crate::retry::RetryPolicy;

/// How long a read-your-write waits for the machine to catch up before
/// settling for the latest published snapshot.
const SNAPSHOT_WAIT: Duration = Duration::from_secs(2);

/// User-visible failure taxonomy.
///
/// Internal failures carry no detail in their message - the detail is
/// logged where the error is constructed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    BadRequest(String),

    #[error("requested bill was not found")]
    NotFound,

    #[error("internal error occurred")]
    Internal,
}

impl DispatchError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Log the detail, return the generic error.
    fn internal(context: &str, err: impl core::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal error: {context}");
        Self::Internal
    }
}

/// Optional filters for `list_bills`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListFilter {
    pub customer_id: Option<CustomerId>,
    pub status: Option<BillStatus>,
}

pub struct BillDispatcher<S> {
    store: S,
    registry: MachineRegistry,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn BillClosedNotifier>,
    rates: ExchangeRates,
    retry: RetryPolicy,
}

impl<S> BillDispatcher<S>
where
    S: EventStore + Clone + Send + Sync + 'static,
{
    pub fn new(store: S, rates: ExchangeRates) -> Self {
        Self {
            store,
            registry: MachineRegistry::new(),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(EmailNotifier),
            rates,
            retry: RetryPolicy::notification(),
        }
    }

    /// Test hook: pin the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Swap the outbound notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn BillClosedNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn machine_context(&self) -> MachineContext<S> {
        MachineContext {
            store: self.store.clone(),
            clock: self.clock.clone(),
            notifier: self.notifier.clone(),
            retry: self.retry,
        }
    }

    /// Start a new billing period for `customer_id` in `currency`.
    ///
    /// The declared currency is already a closed enum by the time it gets
    /// here; out-of-set values die at the deserialization boundary.
    pub async fn create_bill(
        &self,
        customer_id: CustomerId,
        currency: Currency,
    ) -> Result<Bill, DispatchError> {
        let bill_id = BillId::new();

        let handle = machine::start_machine(self.machine_context(), bill_id, customer_id, currency)
            .map_err(|e| DispatchError::internal("failed to start bill machine", e))?;

        self.registry.insert(handle.clone());

        tracing::info!(bill_id = %bill_id, customer_id = %customer_id, "created bill");
        Ok(handle.snapshot())
    }

    /// Append a charge to an open bill, normalizing foreign currency first.
    pub async fn add_line_item(
        &self,
        bill_id: BillId,
        customer_id: CustomerId,
        amount: &str,
        currency: Currency,
    ) -> Result<Bill, DispatchError> {
        let amount = Money::parse(amount, currency)
            .map_err(|_| DispatchError::bad_request("invalid amount or currency"))?;

        let handle = self.owned_running(bill_id, customer_id)?;
        let snapshot = handle.snapshot();

        if snapshot.is_closed() {
            return Err(DispatchError::bad_request("bill is closed"));
        }

        let normalized = if amount.currency() != snapshot.currency() {
            amount
                .convert_to(snapshot.currency(), &self.rates)
                .map_err(|_| DispatchError::bad_request("invalid amount or currency"))?
        } else {
            amount
        };

        // The machine would only log-and-drop an item its total cannot
        // absorb; catch the overflow here so the caller never gets a
        // success for a charge that was not recorded.
        if let Err(e) = snapshot.total().add(&normalized) {
            return Err(DispatchError::internal(
                "line item overflows the running total",
                e,
            ));
        }

        let item = LineItem {
            id: LineItemId::new(),
            amount: normalized,
            created_at: self.clock.now(),
        };

        // A machine that finished between the snapshot read and the send is
        // the expected close/GC race; surface it like any other dead bill.
        handle
            .signal_add_item(item)
            .await
            .map_err(|_| DispatchError::NotFound)?;

        let prior_version = snapshot.version();
        Ok(handle
            .next_snapshot_matching(|b| b.version() > prior_version || b.is_closed(), SNAPSHOT_WAIT)
            .await)
    }

    /// Close a bill now, ahead of its period end.
    pub async fn close_bill(
        &self,
        bill_id: BillId,
        customer_id: CustomerId,
    ) -> Result<Bill, DispatchError> {
        let handle = self.owned_running(bill_id, customer_id)?;

        if handle.snapshot().is_closed() {
            return Err(DispatchError::bad_request("bill is already closed"));
        }

        let signal = CloseSignal {
            closed_at: self.clock.now(),
        };

        handle
            .signal_close(signal)
            .await
            .map_err(|_| DispatchError::NotFound)?;

        Ok(handle
            .next_snapshot_matching(|b| b.is_closed(), SNAPSHOT_WAIT)
            .await)
    }

    /// Snapshot of a live bill owned by `customer_id`.
    pub async fn get_bill(
        &self,
        bill_id: BillId,
        customer_id: CustomerId,
    ) -> Result<Bill, DispatchError> {
        let handle = self.owned_running(bill_id, customer_id)?;
        Ok(handle.snapshot())
    }

    /// Snapshots of live bills, optionally filtered by customer and status.
    pub async fn list_bills(&self, filter: ListFilter) -> Result<Vec<Bill>, DispatchError> {
        self.registry.sweep_completed();

        let mut bills = Vec::new();
        for handle in self.registry.list(filter.customer_id) {
            if !handle.is_running() {
                tracing::warn!(
                    bill_id = %handle.bill_id(),
                    "skipping bill whose machine is no longer running"
                );
                continue;
            }

            let snapshot = handle.snapshot();
            if let Some(status) = filter.status {
                if snapshot.status() != status {
                    continue;
                }
            }
            bills.push(snapshot);
        }

        Ok(bills)
    }

    /// Restart machines for every open bill found in the event log.
    ///
    /// Called once at process startup; returns how many machines resumed.
    pub async fn recover(&self) -> Result<usize, DispatchError> {
        let streams = self
            .store
            .list_streams()
            .map_err(|e| DispatchError::internal("failed to enumerate event streams", e))?;

        let mut resumed = 0;
        for bill_id in streams {
            if self.registry.contains(bill_id) {
                continue;
            }

            match machine::resume_machine(self.machine_context(), bill_id) {
                Ok(Some(handle)) => {
                    self.registry.insert(handle);
                    resumed += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(bill_id = %bill_id, error = %e, "failed to resume bill machine");
                }
            }
        }

        if resumed > 0 {
            tracing::info!(resumed, "resumed open bills from the event log");
        }
        Ok(resumed)
    }

    /// Resolve a handle that is running and owned by `customer_id`.
    ///
    /// Ownership mismatch is deliberately reported as not-found, never as
    /// unauthorized, so bill-id existence does not leak across customers.
    fn owned_running(
        &self,
        bill_id: BillId,
        customer_id: CustomerId,
    ) -> Result<MachineHandle, DispatchError> {
        let handle = self.registry.get(bill_id).ok_or(DispatchError::NotFound)?;

        if !handle.is_running() {
            return Err(DispatchError::NotFound);
        }

        if handle.customer_id() != customer_id {
            return Err(DispatchError::NotFound);
        }

        Ok(handle)
    }
}
