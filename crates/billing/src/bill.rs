use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billflow_core::{Aggregate, AggregateRoot, BillId, CustomerId, DomainError, Event, LineItemId};
use billflow_money::{Currency, Money};

/// Bill status lifecycle. The transition is OPEN → CLOSED, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BillStatus {
    Open,
    Closed,
}

/// An accepted charge record. Append-only: never reordered, edited, or
/// removed once applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

/// Payload of an explicit close request. The caller supplies the closing
/// timestamp; the machine records it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSignal {
    pub closed_at: DateTime<Utc>,
}

/// Aggregate root: Bill.
///
/// Owned exclusively by its machine; everyone else sees by-value snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    id: BillId,
    customer_id: CustomerId,
    status: BillStatus,
    currency: Currency,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    closed_at: Option<DateTime<Utc>>,
    line_items: Vec<LineItem>,
    total: Money,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    opened: bool,
}

impl Bill {
    /// Create an empty, not-yet-opened aggregate instance for rehydration.
    pub fn empty(id: BillId) -> Self {
        Self {
            id,
            customer_id: CustomerId::new(0),
            status: BillStatus::Open,
            currency: Currency::Usd,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            closed_at: None,
            line_items: Vec::new(),
            total: Money::zero(Currency::Usd),
            version: 0,
            opened: false,
        }
    }

    pub fn id_typed(&self) -> BillId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> BillStatus {
        self.status
    }

    /// The declared currency every accepted line item is normalized to.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn is_closed(&self) -> bool {
        self.status == BillStatus::Closed
    }
}

impl AggregateRoot for Bill {
    type Id = BillId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenBill (machine startup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBill {
    pub bill_id: BillId,
    pub customer_id: CustomerId,
    pub currency: Currency,
    pub opened_at: DateTime<Utc>,
}

/// Command: AddLineItem. The dispatcher has already normalized the amount to
/// the bill's declared currency and minted the item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineItem {
    pub bill_id: BillId,
    pub item: LineItem,
}

/// Command: CloseBill (explicit close request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseBill {
    pub bill_id: BillId,
    pub signal: CloseSignal,
}

/// Command: EndPeriod (the calendar-boundary timer fired).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndPeriod {
    pub bill_id: BillId,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillCommand {
    Open(OpenBill),
    AddLineItem(AddLineItem),
    Close(CloseBill),
    EndPeriod(EndPeriod),
}

/// Why a bill closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// A caller sent an explicit close signal.
    Requested,
    /// The billing-period timer fired at the calendar boundary.
    PeriodEnd,
}

/// Event: BillOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillOpened {
    pub bill_id: BillId,
    pub customer_id: CustomerId,
    pub currency: Currency,
    pub opened_at: DateTime<Utc>,
}

/// Event: LineItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemAdded {
    pub bill_id: BillId,
    pub item: LineItem,
}

/// Event: BillClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillClosed {
    pub bill_id: BillId,
    pub closed_at: DateTime<Utc>,
    pub reason: CloseReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillEvent {
    Opened(BillOpened),
    LineItemAdded(LineItemAdded),
    Closed(BillClosed),
}

impl Event for BillEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BillEvent::Opened(_) => "billing.bill.opened",
            BillEvent::LineItemAdded(_) => "billing.bill.line_item_added",
            BillEvent::Closed(_) => "billing.bill.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BillEvent::Opened(e) => e.opened_at,
            BillEvent::LineItemAdded(e) => e.item.created_at,
            BillEvent::Closed(e) => e.closed_at,
        }
    }
}

impl Aggregate for Bill {
    type Command = BillCommand;
    type Event = BillEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BillEvent::Opened(e) => {
                self.id = e.bill_id;
                self.customer_id = e.customer_id;
                self.currency = e.currency;
                self.status = BillStatus::Open;
                self.created_at = e.opened_at;
                self.closed_at = None;
                self.line_items = Vec::new();
                self.total = Money::zero(e.currency);
                self.opened = true;
            }
            BillEvent::LineItemAdded(e) => {
                self.line_items.push(e.item.clone());

                // A mismatched or overflowing amount in a historical stream
                // means the decision layer was bypassed; keep the item on
                // record and leave the total untouched rather than poison
                // the replay.
                match self.total.add(&e.item.amount) {
                    Ok(total) => self.total = total,
                    Err(err) => {
                        tracing::error!(
                            bill_id = %self.id,
                            item_id = %e.item.id,
                            error = %err,
                            "line item amount could not be folded into the total"
                        );
                    }
                }
            }
            BillEvent::Closed(e) => {
                self.status = BillStatus::Closed;
                self.closed_at = Some(e.closed_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BillCommand::Open(cmd) => self.handle_open(cmd),
            BillCommand::AddLineItem(cmd) => self.handle_add_line_item(cmd),
            BillCommand::Close(cmd) => self.handle_close(cmd),
            BillCommand::EndPeriod(cmd) => self.handle_end_period(cmd),
        }
    }
}

impl Bill {
    fn ensure_bill_id(&self, bill_id: BillId) -> Result<(), DomainError> {
        if self.id != bill_id {
            return Err(DomainError::invariant("bill_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenBill) -> Result<Vec<BillEvent>, DomainError> {
        if self.opened {
            return Err(DomainError::conflict("bill already exists"));
        }

        Ok(vec![BillEvent::Opened(BillOpened {
            bill_id: cmd.bill_id,
            customer_id: cmd.customer_id,
            currency: cmd.currency,
            opened_at: cmd.opened_at,
        })])
    }

    fn handle_add_line_item(&self, cmd: &AddLineItem) -> Result<Vec<BillEvent>, DomainError> {
        if !self.opened {
            return Err(DomainError::not_found());
        }
        self.ensure_bill_id(cmd.bill_id)?;

        // Race against close: the item lost, drop it without deciding
        // anything. The machine logs the drop.
        if self.is_closed() {
            return Ok(vec![]);
        }

        if cmd.item.amount.currency() != self.currency {
            return Err(DomainError::invariant(format!(
                "line item currency {} differs from declared currency {}",
                cmd.item.amount.currency(),
                self.currency
            )));
        }

        // Overflow is refused, never wrapped.
        self.total
            .add(&cmd.item.amount)
            .map_err(|e| DomainError::invariant(format!("running total: {e}")))?;

        Ok(vec![BillEvent::LineItemAdded(LineItemAdded {
            bill_id: cmd.bill_id,
            item: cmd.item.clone(),
        })])
    }

    fn handle_close(&self, cmd: &CloseBill) -> Result<Vec<BillEvent>, DomainError> {
        if !self.opened {
            return Err(DomainError::not_found());
        }
        self.ensure_bill_id(cmd.bill_id)?;

        if self.is_closed() {
            return Ok(vec![]);
        }

        Ok(vec![BillEvent::Closed(BillClosed {
            bill_id: cmd.bill_id,
            closed_at: cmd.signal.closed_at,
            reason: CloseReason::Requested,
        })])
    }

    fn handle_end_period(&self, cmd: &EndPeriod) -> Result<Vec<BillEvent>, DomainError> {
        if !self.opened {
            return Err(DomainError::not_found());
        }
        self.ensure_bill_id(cmd.bill_id)?;

        if self.is_closed() {
            return Ok(vec![]);
        }

        Ok(vec![BillEvent::Closed(BillClosed {
            bill_id: cmd.bill_id,
            closed_at: cmd.now,
            reason: CloseReason::PeriodEnd,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;
    use rust_decimal::Decimal;

    fn test_bill_id() -> BillId {
        BillId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn usd(amount: &str) -> Money {
        Money::new(Decimal::from_str(amount).unwrap(), Currency::Usd).unwrap()
    }

    fn gel(amount: &str) -> Money {
        Money::new(Decimal::from_str(amount).unwrap(), Currency::Gel).unwrap()
    }

    fn line_item(amount: Money) -> LineItem {
        LineItem {
            id: LineItemId::new(),
            amount,
            created_at: test_time(),
        }
    }

    fn opened_bill(bill_id: BillId, currency: Currency) -> Bill {
        let mut bill = Bill::empty(bill_id);
        let events = bill
            .handle(&BillCommand::Open(OpenBill {
                bill_id,
                customer_id: CustomerId::new(456),
                currency,
                opened_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            bill.apply(e);
        }
        bill
    }

    #[test]
    fn open_emits_bill_opened_and_initializes_state() {
        let bill_id = test_bill_id();
        let bill = opened_bill(bill_id, Currency::Usd);

        assert_eq!(bill.id_typed(), bill_id);
        assert_eq!(bill.customer_id(), CustomerId::new(456));
        assert_eq!(bill.status(), BillStatus::Open);
        assert_eq!(bill.currency(), Currency::Usd);
        assert!(bill.closed_at().is_none());
        assert!(bill.line_items().is_empty());
        assert_eq!(bill.total(), Money::zero(Currency::Usd));
        assert_eq!(bill.version(), 1);
    }

    #[test]
    fn open_twice_is_a_conflict() {
        let bill_id = test_bill_id();
        let bill = opened_bill(bill_id, Currency::Usd);

        let err = bill
            .handle(&BillCommand::Open(OpenBill {
                bill_id,
                customer_id: CustomerId::new(456),
                currency: Currency::Usd,
                opened_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn line_items_accumulate_into_the_total() {
        let bill_id = test_bill_id();
        let mut bill = opened_bill(bill_id, Currency::Usd);

        for amount in ["10.00", "15.50"] {
            let events = bill
                .handle(&BillCommand::AddLineItem(AddLineItem {
                    bill_id,
                    item: line_item(usd(amount)),
                }))
                .unwrap();
            for e in &events {
                bill.apply(e);
            }
        }

        assert_eq!(bill.line_items().len(), 2);
        assert_eq!(bill.total(), usd("25.50"));
    }

    #[test]
    fn zero_amount_items_are_accepted_without_changing_the_total() {
        let bill_id = test_bill_id();
        let mut bill = opened_bill(bill_id, Currency::Usd);

        let events = bill
            .handle(&BillCommand::AddLineItem(AddLineItem {
                bill_id,
                item: line_item(usd("0")),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);
        for e in &events {
            bill.apply(e);
        }

        assert_eq!(bill.line_items().len(), 1);
        assert_eq!(bill.total(), Money::zero(Currency::Usd));
    }

    #[test]
    fn item_with_foreign_currency_is_an_invariant_violation() {
        let bill_id = test_bill_id();
        let bill = opened_bill(bill_id, Currency::Usd);

        let err = bill
            .handle(&BillCommand::AddLineItem(AddLineItem {
                bill_id,
                item: line_item(gel("100.00")),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn overflowing_total_is_refused_not_wrapped() {
        let bill_id = test_bill_id();
        let mut bill = opened_bill(bill_id, Currency::Usd);

        let huge = Money::from_minor_units(i64::MAX - 10, Currency::Usd).unwrap();
        let events = bill
            .handle(&BillCommand::AddLineItem(AddLineItem {
                bill_id,
                item: line_item(huge),
            }))
            .unwrap();
        for e in &events {
            bill.apply(e);
        }

        let err = bill
            .handle(&BillCommand::AddLineItem(AddLineItem {
                bill_id,
                item: line_item(usd("1.00")),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn close_records_the_signal_timestamp() {
        let bill_id = test_bill_id();
        let mut bill = opened_bill(bill_id, Currency::Usd);

        let closed_at = test_time();
        let events = bill
            .handle(&BillCommand::Close(CloseBill {
                bill_id,
                signal: CloseSignal { closed_at },
            }))
            .unwrap();
        assert_eq!(events.len(), 1);
        for e in &events {
            bill.apply(e);
        }

        assert_eq!(bill.status(), BillStatus::Closed);
        assert_eq!(bill.closed_at(), Some(closed_at));
        match &events[0] {
            BillEvent::Closed(e) => assert_eq!(e.reason, CloseReason::Requested),
            other => panic!("expected Closed event, got {other:?}"),
        }
    }

    #[test]
    fn period_end_closes_with_the_timer_timestamp() {
        let bill_id = test_bill_id();
        let mut bill = opened_bill(bill_id, Currency::Usd);

        let now = test_time();
        let events = bill
            .handle(&BillCommand::EndPeriod(EndPeriod { bill_id, now }))
            .unwrap();
        for e in &events {
            bill.apply(e);
        }

        assert_eq!(bill.status(), BillStatus::Closed);
        assert_eq!(bill.closed_at(), Some(now));
        match &events[0] {
            BillEvent::Closed(e) => assert_eq!(e.reason, CloseReason::PeriodEnd),
            other => panic!("expected Closed event, got {other:?}"),
        }
    }

    #[test]
    fn commands_against_a_closed_bill_decide_nothing() {
        let bill_id = test_bill_id();
        let mut bill = opened_bill(bill_id, Currency::Usd);

        let first_close = test_time();
        let events = bill
            .handle(&BillCommand::Close(CloseBill {
                bill_id,
                signal: CloseSignal {
                    closed_at: first_close,
                },
            }))
            .unwrap();
        for e in &events {
            bill.apply(e);
        }

        // Second close: dropped, closed_at keeps the first timestamp.
        let second_close = first_close + chrono::Duration::hours(1);
        let events = bill
            .handle(&BillCommand::Close(CloseBill {
                bill_id,
                signal: CloseSignal {
                    closed_at: second_close,
                },
            }))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(bill.closed_at(), Some(first_close));

        // Items after close: dropped without error.
        let events = bill
            .handle(&BillCommand::AddLineItem(AddLineItem {
                bill_id,
                item: line_item(usd("15.50")),
            }))
            .unwrap();
        assert!(events.is_empty());
        assert!(bill.line_items().is_empty());

        // Timer after close: nothing to do.
        let events = bill
            .handle(&BillCommand::EndPeriod(EndPeriod {
                bill_id,
                now: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn replaying_the_stream_reconstructs_the_state() {
        let bill_id = test_bill_id();
        let mut bill = opened_bill(bill_id, Currency::Usd);

        let mut stream: Vec<BillEvent> = Vec::new();
        for amount in ["10.00", "15.50"] {
            let events = bill
                .handle(&BillCommand::AddLineItem(AddLineItem {
                    bill_id,
                    item: line_item(usd(amount)),
                }))
                .unwrap();
            for e in &events {
                bill.apply(e);
            }
            stream.extend(events);
        }
        let events = bill
            .handle(&BillCommand::Close(CloseBill {
                bill_id,
                signal: CloseSignal {
                    closed_at: test_time(),
                },
            }))
            .unwrap();
        for e in &events {
            bill.apply(e);
        }
        stream.extend(events);

        // Rebuild from scratch: BillOpened + the recorded tail.
        let mut rebuilt = Bill::empty(bill_id);
        rebuilt.apply(&BillEvent::Opened(BillOpened {
            bill_id,
            customer_id: bill.customer_id(),
            currency: bill.currency(),
            opened_at: bill.created_at(),
        }));
        for e in &stream {
            rebuilt.apply(e);
        }

        assert_eq!(rebuilt, bill);
    }

    #[test]
    fn snapshot_serializes_to_the_wire_shape() {
        let bill_id = test_bill_id();
        let mut bill = opened_bill(bill_id, Currency::Usd);
        let events = bill
            .handle(&BillCommand::AddLineItem(AddLineItem {
                bill_id,
                item: line_item(usd("36.01")),
            }))
            .unwrap();
        for e in &events {
            bill.apply(e);
        }

        let json = serde_json::to_value(&bill).unwrap();
        assert_eq!(json["id"], bill_id.to_string());
        assert_eq!(json["customer_id"], 456);
        assert_eq!(json["status"], "OPEN");
        assert_eq!(json["currency"], "USD");
        assert_eq!(json["total"], "$36.01");
        assert_eq!(json["line_items"][0]["amount"], "$36.01");
        assert!(json.get("closed_at").is_none());
        assert!(json.get("version").is_none());
    }
}
