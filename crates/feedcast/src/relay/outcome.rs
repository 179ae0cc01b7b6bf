//! Broadcast results.

use url::Url;

use crate::error::EndpointError;

/// Result of one endpoint's attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReport {
    /// Relay address.
    pub url: Url,
    /// `Ok` when the relay accepted the event.
    pub result: Result<(), EndpointError>,
}

impl EndpointReport {
    /// Whether the relay accepted the event.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-endpoint results of one broadcast, in endpoint order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    reports: Vec<EndpointReport>,
}

impl PublishOutcome {
    /// Wrap a set of reports.
    #[must_use]
    pub const fn new(reports: Vec<EndpointReport>) -> Self {
        Self { reports }
    }

    /// All reports.
    #[must_use]
    pub fn reports(&self) -> &[EndpointReport] {
        &self.reports
    }

    /// Number of endpoints attempted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether no endpoint was attempted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Endpoints that accepted.
    #[must_use]
    pub fn accepted_count(&self) -> usize {
        self.reports.iter().filter(|r| r.is_accepted()).count()
    }

    /// Endpoints that failed, timed out or rejected.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.len() - self.accepted_count()
    }

    /// At least one endpoint accepted.
    #[must_use]
    pub fn any_accepted(&self) -> bool {
        self.reports.iter().any(EndpointReport::is_accepted)
    }

    /// Failed endpoints with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&Url, &EndpointError)> {
        self.reports
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (&r.url, e)))
    }
}
