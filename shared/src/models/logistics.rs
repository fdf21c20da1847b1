//! Delivery, transport and vehicle models

use thiserror::Error;

text_enum! {
    pub enum DeliveryStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    pub enum TransportMode {
        Ship => "ship",
        Truck => "truck",
        Plane => "plane",
    }
}

text_enum! {
    pub enum TransportStatus {
        Waiting => "waiting",
        InTransit => "in_transit",
        Delivered => "delivered",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogisticsError {
    #[error("delivery is {0} and can no longer change status")]
    DeliveryClosed(DeliveryStatus),

    #[error("transport leg cannot move from {from} to {to}")]
    TransportBackward {
        from: TransportStatus,
        to: TransportStatus,
    },
}

impl DeliveryStatus {
    pub fn check_transition(&self, to: DeliveryStatus) -> Result<(), LogisticsError> {
        match self {
            DeliveryStatus::Completed | DeliveryStatus::Cancelled if *self != to => {
                Err(LogisticsError::DeliveryClosed(*self))
            }
            _ => Ok(()),
        }
    }
}

impl TransportStatus {
    fn rank(&self) -> u8 {
        match self {
            TransportStatus::Waiting => 0,
            TransportStatus::InTransit => 1,
            TransportStatus::Delivered => 2,
        }
    }

    pub fn check_transition(&self, to: TransportStatus) -> Result<(), LogisticsError> {
        if to.rank() < self.rank() {
            Err(LogisticsError::TransportBackward { from: *self, to })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_deliveries_stay_closed() {
        assert!(DeliveryStatus::Pending
            .check_transition(DeliveryStatus::Completed)
            .is_ok());
        assert!(DeliveryStatus::InProgress
            .check_transition(DeliveryStatus::Pending)
            .is_ok());
        assert!(DeliveryStatus::Completed
            .check_transition(DeliveryStatus::InProgress)
            .is_err());
        assert!(DeliveryStatus::Cancelled
            .check_transition(DeliveryStatus::Cancelled)
            .is_ok());
    }

    #[test]
    fn transport_legs_only_move_forward() {
        assert!(TransportStatus::Waiting
            .check_transition(TransportStatus::Delivered)
            .is_ok());
        assert!(TransportStatus::Delivered
            .check_transition(TransportStatus::InTransit)
            .is_err());
    }
}
