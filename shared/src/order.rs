use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Accepted,
    Preparing,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::PickedUp,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Accepted => "Accepted",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::PickedUp => "PickedUp",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Successor states in the lifecycle graph.
    ///
    /// Informational only. Who may move an order where is decided by
    /// [`Role::allowed_statuses`], a fixed table independent of this graph.
    pub fn successors(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Accepted, OrderStatus::Cancelled],
            OrderStatus::Accepted => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::Preparing => &[OrderStatus::PickedUp, OrderStatus::Cancelled],
            OrderStatus::PickedUp => &[OrderStatus::Delivered],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

/// Role claim carried by the caller's identity token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Restaurant,
    Driver,
    #[serde(other)]
    Other,
}

impl Role {
    /// Statuses each role may set, regardless of the order's current status.
    pub fn allowed_statuses(&self) -> &'static [OrderStatus] {
        match self {
            Role::Customer => &[OrderStatus::Cancelled],
            Role::Restaurant => &[OrderStatus::Accepted, OrderStatus::Preparing],
            Role::Driver => &[OrderStatus::PickedUp, OrderStatus::Delivered],
            Role::Other => &[],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Customer => "customer",
            Role::Restaurant => "restaurant",
            Role::Driver => "driver",
            Role::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i32,
    pub role: Role,
}

/// The parties an order is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderParties {
    pub customer_id: i32,
    pub restaurant_id: i32,
    pub driver_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverAssignment {
    Unchanged,
    Assign(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("order does not belong to the caller")]
    NotOwner,

    #[error("order is already assigned to another driver")]
    AssignedToAnotherDriver,

    #[error("drivers may only assign orders to themselves")]
    ForeignDriverId,

    #[error("role {0} may not update orders")]
    UnsupportedRole(Role),

    #[error("invalid status {status} for role {role}")]
    InvalidStatusForRole { role: Role, status: OrderStatus },

    #[error("role {0} may not set driverId")]
    DriverIdNotAllowed(Role),
}

impl TransitionError {
    /// Ownership and role failures, as opposed to malformed requests.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            TransitionError::NotOwner
                | TransitionError::AssignedToAnotherDriver
                | TransitionError::ForeignDriverId
                | TransitionError::UnsupportedRole(_)
        )
    }
}

/// Decides whether `actor` may move an order to `target`.
///
/// Checks run in a fixed order: ownership, then the role's status table, then
/// the requested driver id. On success the returned assignment says what to
/// write into the order's driver column.
pub fn authorize_transition(
    parties: &OrderParties,
    actor: &Actor,
    target: OrderStatus,
    driver_id: Option<i32>,
) -> Result<DriverAssignment, TransitionError> {
    match actor.role {
        Role::Customer => {
            if parties.customer_id != actor.id {
                return Err(TransitionError::NotOwner);
            }
        }
        Role::Restaurant => {
            if parties.restaurant_id != actor.id {
                return Err(TransitionError::NotOwner);
            }
        }
        Role::Driver => {
            if parties.driver_id.is_some_and(|assigned| assigned != actor.id) {
                return Err(TransitionError::AssignedToAnotherDriver);
            }
        }
        Role::Other => return Err(TransitionError::UnsupportedRole(actor.role)),
    }

    if !actor.role.allowed_statuses().contains(&target) {
        return Err(TransitionError::InvalidStatusForRole {
            role: actor.role,
            status: target,
        });
    }

    match actor.role {
        Role::Driver => match driver_id {
            Some(requested) if requested != actor.id => Err(TransitionError::ForeignDriverId),
            _ => Ok(DriverAssignment::Assign(actor.id)),
        },
        role if driver_id.is_some() => Err(TransitionError::DriverIdNotAllowed(role)),
        _ => Ok(DriverAssignment::Unchanged),
    }
}
