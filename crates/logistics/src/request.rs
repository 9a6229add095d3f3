use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroute_core::{
    Aggregate, AggregateRoot, DepartmentId, DomainError, ProductId, RequestId, UserId,
};
use stockroute_events::Event;

/// Request status lifecycle.
///
/// `pending -> approved -> fulfilled`, or `pending -> rejected`. Rejected and
/// fulfilled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Fulfilled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Fulfilled => "fulfilled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Fulfilled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Aggregate root: a department's request for stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    id: RequestId,
    requester: Option<UserId>,
    department_id: Option<DepartmentId>,
    status: RequestStatus,
    planned_date: Option<NaiveDate>,
    rejection_note: Option<String>,
    decided_by: Option<UserId>,
    fulfilled_by: Option<UserId>,
    items: Vec<RequestItem>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Request {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RequestId) -> Self {
        Self {
            id,
            requester: None,
            department_id: None,
            status: RequestStatus::Pending,
            planned_date: None,
            rejection_note: None,
            decided_by: None,
            fulfilled_by: None,
            items: Vec::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn planned_date(&self) -> Option<NaiveDate> {
        self.planned_date
    }

    pub fn rejection_note(&self) -> Option<&str> {
        self.rejection_note.as_deref()
    }

    /// Who approved or rejected the request.
    pub fn decided_by(&self) -> Option<UserId> {
        self.decided_by
    }

    pub fn fulfilled_by(&self) -> Option<UserId> {
        self.fulfilled_by
    }

    pub fn items(&self) -> &[RequestItem] {
        &self.items
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Total requested units of one product across all lines.
    pub fn requested_quantity(&self, product_id: ProductId) -> i64 {
        self.items
            .iter()
            .filter(|i| i.product_id == product_id)
            .map(|i| i.quantity)
            .sum()
    }
}

impl AggregateRoot for Request {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub request_id: RequestId,
    pub requester: UserId,
    pub department_id: DepartmentId,
    pub planned_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub request_id: RequestId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub request_id: RequestId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRequest {
    pub request_id: RequestId,
    pub rejected_by: UserId,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FulfillRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillRequest {
    pub request_id: RequestId,
    pub fulfilled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestCommand {
    CreateRequest(CreateRequest),
    AddItem(AddItem),
    ApproveRequest(ApproveRequest),
    RejectRequest(RejectRequest),
    FulfillRequest(FulfillRequest),
}

/// Event: RequestCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCreated {
    pub request_id: RequestId,
    pub requester: UserId,
    pub department_id: DepartmentId,
    pub planned_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub request_id: RequestId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApproved {
    pub request_id: RequestId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRejected {
    pub request_id: RequestId,
    pub rejected_by: UserId,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestFulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFulfilled {
    pub request_id: RequestId,
    pub fulfilled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestEvent {
    RequestCreated(RequestCreated),
    ItemAdded(ItemAdded),
    RequestApproved(RequestApproved),
    RequestRejected(RequestRejected),
    RequestFulfilled(RequestFulfilled),
}

impl Event for RequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequestEvent::RequestCreated(_) => "logistics.request.created",
            RequestEvent::ItemAdded(_) => "logistics.request.item_added",
            RequestEvent::RequestApproved(_) => "logistics.request.approved",
            RequestEvent::RequestRejected(_) => "logistics.request.rejected",
            RequestEvent::RequestFulfilled(_) => "logistics.request.fulfilled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequestEvent::RequestCreated(e) => e.occurred_at,
            RequestEvent::ItemAdded(e) => e.occurred_at,
            RequestEvent::RequestApproved(e) => e.occurred_at,
            RequestEvent::RequestRejected(e) => e.occurred_at,
            RequestEvent::RequestFulfilled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Request {
    type Command = RequestCommand;
    type Event = RequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RequestEvent::RequestCreated(e) => {
                self.id = e.request_id;
                self.requester = Some(e.requester);
                self.department_id = Some(e.department_id);
                self.planned_date = e.planned_date;
                self.status = RequestStatus::Pending;
                self.items.clear();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            RequestEvent::ItemAdded(e) => {
                self.items.push(RequestItem {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    quantity: e.quantity,
                });
            }
            RequestEvent::RequestApproved(e) => {
                self.status = RequestStatus::Approved;
                self.decided_by = Some(e.approved_by);
            }
            RequestEvent::RequestRejected(e) => {
                self.status = RequestStatus::Rejected;
                self.decided_by = Some(e.rejected_by);
                self.rejection_note = Some(e.note.clone());
            }
            RequestEvent::RequestFulfilled(e) => {
                self.status = RequestStatus::Fulfilled;
                self.fulfilled_by = Some(e.fulfilled_by);
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RequestCommand::CreateRequest(cmd) => self.handle_create(cmd),
            RequestCommand::AddItem(cmd) => self.handle_add_item(cmd),
            RequestCommand::ApproveRequest(cmd) => self.handle_approve(cmd),
            RequestCommand::RejectRequest(cmd) => self.handle_reject(cmd),
            RequestCommand::FulfillRequest(cmd) => self.handle_fulfill(cmd),
        }
    }
}

impl Request {
    fn ensure_exists(&self, request_id: RequestId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("request {request_id}")));
        }
        if self.id != request_id {
            return Err(DomainError::validation("request_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: RequestStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} a {} request (must be {})",
                self.status.as_str(),
                expected.as_str()
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateRequest) -> Result<Vec<RequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("request already exists"));
        }

        Ok(vec![RequestEvent::RequestCreated(RequestCreated {
            request_id: cmd.request_id,
            requester: cmd.requester,
            department_id: cmd.department_id,
            planned_date: cmd.planned_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_exists(cmd.request_id)?;
        self.ensure_status(RequestStatus::Pending, "add items to")?;

        if cmd.quantity <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "requested quantity must be positive (got {})",
                cmd.quantity
            )));
        }

        let line_no = (self.items.len() as u32) + 1;

        Ok(vec![RequestEvent::ItemAdded(ItemAdded {
            request_id: cmd.request_id,
            line_no,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveRequest) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_exists(cmd.request_id)?;
        self.ensure_status(RequestStatus::Pending, "approve")?;

        Ok(vec![RequestEvent::RequestApproved(RequestApproved {
            request_id: cmd.request_id,
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectRequest) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_exists(cmd.request_id)?;
        self.ensure_status(RequestStatus::Pending, "reject")?;

        Ok(vec![RequestEvent::RequestRejected(RequestRejected {
            request_id: cmd.request_id,
            rejected_by: cmd.rejected_by,
            note: cmd.note.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fulfill(&self, cmd: &FulfillRequest) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_exists(cmd.request_id)?;
        self.ensure_status(RequestStatus::Approved, "fulfill")?;

        Ok(vec![RequestEvent::RequestFulfilled(RequestFulfilled {
            request_id: cmd.request_id,
            fulfilled_by: cmd.fulfilled_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> DateTime<Utc> {
        Utc::now()
    }

    fn execute(request: &mut Request, cmd: RequestCommand) -> Result<(), DomainError> {
        for event in request.handle(&cmd)? {
            request.apply(&event);
        }
        Ok(())
    }

    fn pending_request() -> Request {
        let id = RequestId::new();
        let mut request = Request::empty(id);
        execute(
            &mut request,
            RequestCommand::CreateRequest(CreateRequest {
                request_id: id,
                requester: UserId::new(),
                department_id: DepartmentId::new(),
                planned_date: None,
                occurred_at: t(),
            }),
        )
        .unwrap();
        request
    }

    fn approve(request: &mut Request) -> Result<(), DomainError> {
        let request_id = *request.id();
        execute(
            request,
            RequestCommand::ApproveRequest(ApproveRequest {
                request_id,
                approved_by: UserId::new(),
                occurred_at: t(),
            }),
        )
    }

    fn fulfill(request: &mut Request) -> Result<(), DomainError> {
        let request_id = *request.id();
        execute(
            request,
            RequestCommand::FulfillRequest(FulfillRequest {
                request_id,
                fulfilled_by: UserId::new(),
                occurred_at: t(),
            }),
        )
    }

    fn add_item(request: &mut Request, quantity: i64) -> Result<(), DomainError> {
        let request_id = *request.id();
        execute(
            request,
            RequestCommand::AddItem(AddItem {
                request_id,
                product_id: ProductId::new(),
                quantity,
                occurred_at: t(),
            }),
        )
    }

    #[test]
    fn items_are_numbered_in_order() {
        let mut request = pending_request();
        add_item(&mut request, 3).unwrap();
        add_item(&mut request, 1).unwrap();

        let lines: Vec<u32> = request.items().iter().map(|i| i.line_no).collect();
        assert_eq!(lines, vec![1, 2]);
        assert_eq!(request.version(), 3);
    }

    #[test]
    fn non_positive_item_quantity_is_rejected() {
        let mut request = pending_request();
        assert!(matches!(
            add_item(&mut request, 0),
            Err(DomainError::InvalidQuantity(_))
        ));
        assert!(request.items().is_empty());
    }

    #[test]
    fn pending_cannot_be_fulfilled() {
        let mut request = pending_request();
        let err = fulfill(&mut request).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
        assert_eq!(request.status(), RequestStatus::Pending);
    }

    #[test]
    fn approve_then_fulfill() {
        let mut request = pending_request();
        approve(&mut request).unwrap();
        assert_eq!(request.status(), RequestStatus::Approved);
        fulfill(&mut request).unwrap();
        assert_eq!(request.status(), RequestStatus::Fulfilled);
        assert!(request.status().is_terminal());
    }

    #[test]
    fn items_are_frozen_after_approval() {
        let mut request = pending_request();
        add_item(&mut request, 2).unwrap();
        approve(&mut request).unwrap();
        assert!(matches!(
            add_item(&mut request, 2),
            Err(DomainError::InvalidTransition(_))
        ));
        assert!(matches!(
            approve(&mut request),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn rejection_stores_note_and_is_terminal() {
        let mut request = pending_request();
        let request_id = *request.id();
        execute(
            &mut request,
            RequestCommand::RejectRequest(RejectRequest {
                request_id,
                rejected_by: UserId::new(),
                note: " out of budget ".into(),
                occurred_at: t(),
            }),
        )
        .unwrap();

        assert_eq!(request.status(), RequestStatus::Rejected);
        assert_eq!(request.rejection_note(), Some("out of budget"));
        assert!(matches!(
            approve(&mut request),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn commands_on_missing_request_are_not_found() {
        let mut request = Request::empty(RequestId::new());
        assert!(matches!(approve(&mut request), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn event_names_are_namespaced() {
        let e = RequestEvent::RequestApproved(RequestApproved {
            request_id: RequestId::new(),
            approved_by: UserId::new(),
            occurred_at: t(),
        });
        assert_eq!(e.event_type(), "logistics.request.approved");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy)]
        enum Step {
            Approve,
            Reject,
            Fulfill,
            AddItem,
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                Just(Step::Approve),
                Just(Step::Reject),
                Just(Step::Fulfill),
                Just(Step::AddItem),
            ]
        }

        proptest! {
            /// Property: a failed command leaves the aggregate untouched, and once
            /// a request reaches a terminal status nothing moves it again.
            #[test]
            fn terminal_status_is_final(steps in prop::collection::vec(step(), 0..12)) {
                let mut request = pending_request();
                let mut terminal: Option<RequestStatus> = None;

                for s in steps {
                    let before = request.clone();
                    let result = match s {
                        Step::Approve => approve(&mut request),
                        Step::Fulfill => fulfill(&mut request),
                        Step::AddItem => add_item(&mut request, 1),
                        Step::Reject => {
                            let request_id = *request.id();
                            execute(&mut request, RequestCommand::RejectRequest(RejectRequest {
                                request_id,
                                rejected_by: UserId::new(),
                                note: String::new(),
                                occurred_at: t(),
                            }))
                        }
                    };
                    if result.is_err() {
                        prop_assert_eq!(&request, &before);
                    }
                    if let Some(status) = terminal {
                        prop_assert_eq!(request.status(), status);
                    } else if request.status().is_terminal() {
                        terminal = Some(request.status());
                    }
                }
            }
        }
    }
}
