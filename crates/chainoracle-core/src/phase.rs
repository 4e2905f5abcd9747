//! Pipeline phases — one periodic checker per phase boundary.

use serde::{Deserialize, Serialize};

use crate::types::RequestStatus;

/// The six phase checkers of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    RequestReceived,
    ObservationCommit,
    ReportReceived,
    ReportCommit,
    Transmit,
    RequestEnd,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Self::RequestReceived,
        Self::ObservationCommit,
        Self::ReportReceived,
        Self::ReportCommit,
        Self::Transmit,
        Self::RequestEnd,
    ];

    /// Statuses this phase's checker loads on each tick.
    pub fn governed_statuses(&self) -> &'static [RequestStatus] {
        match self {
            Self::RequestReceived => &[RequestStatus::Pending],
            Self::ObservationCommit => &[RequestStatus::Observing],
            Self::ReportReceived => &[RequestStatus::Committing],
            Self::ReportCommit => &[RequestStatus::ReportBuilt],
            Self::Transmit => &[RequestStatus::Transmitting],
            Self::RequestEnd => &[
                RequestStatus::Transmitted,
                RequestStatus::Cancelled,
                RequestStatus::Expired,
            ],
        }
    }

    /// The phase whose checker governs `status`.
    pub fn for_status(status: RequestStatus) -> Phase {
        match status {
            RequestStatus::Pending => Self::RequestReceived,
            RequestStatus::Observing => Self::ObservationCommit,
            RequestStatus::Committing => Self::ReportReceived,
            RequestStatus::ReportBuilt => Self::ReportCommit,
            RequestStatus::Transmitting => Self::Transmit,
            RequestStatus::Transmitted | RequestStatus::Cancelled | RequestStatus::Expired => {
                Self::RequestEnd
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestReceived => "request_received",
            Self::ObservationCommit => "observation_commit",
            Self::ReportReceived => "report_received",
            Self::ReportCommit => "report_commit",
            Self::Transmit => "transmit",
            Self::RequestEnd => "request_end",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_has_exactly_one_checker() {
        for status in RequestStatus::ALL {
            let owners: Vec<_> = Phase::ALL
                .iter()
                .filter(|p| p.governed_statuses().contains(&status))
                .collect();
            assert_eq!(owners.len(), 1, "{status} governed by {owners:?}");
            assert_eq!(*owners[0], Phase::for_status(status));
        }
    }
}
