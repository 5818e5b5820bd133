//! Read-only queries over a store snapshot
//!
//! Every function borrows from the [`Snapshot`] it is given, so results stay
//! valid while new records keep arriving. Per-service queries return `None`
//! when the service has no record in the snapshot, which callers surface as
//! "not found", and `Some` (possibly empty) otherwise.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::record::RequestRecord;
use crate::store::Snapshot;

/// Default latency, in seconds, above which a request is a lagger
pub const DEFAULT_LAGGER_THRESHOLD: f64 = 30.0;

/// Service classification in the status summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Normal,
    Error,
}

/// Per-service entry of the status summary
#[derive(Debug, Serialize)]
pub struct ServiceStatus<'a> {
    pub name: &'a str,
    pub errors: Vec<&'a RequestRecord>,
    pub status: ServiceHealth,
}

pub fn all(snapshot: &Snapshot) -> Vec<&RequestRecord> {
    snapshot.iter().collect()
}

/// Requests answered with a 5xx
pub fn errors(snapshot: &Snapshot) -> Vec<&RequestRecord> {
    snapshot.iter().filter(|r| r.is_error()).collect()
}

pub fn laggers(snapshot: &Snapshot, threshold: f64) -> Vec<&RequestRecord> {
    snapshot.iter().filter(|r| r.is_lagger(threshold)).collect()
}

/// Distinct service names, in order of first appearance
pub fn services(snapshot: &Snapshot) -> Vec<&str> {
    let mut seen = HashSet::new();
    snapshot
        .iter()
        .map(|r| r.service_name.as_str())
        .filter(|name| seen.insert(*name))
        .collect()
}

pub fn for_service<'a>(snapshot: &'a Snapshot, name: &str) -> Option<Vec<&'a RequestRecord>> {
    service_filter(snapshot, name, |_| true)
}

pub fn service_errors<'a>(snapshot: &'a Snapshot, name: &str) -> Option<Vec<&'a RequestRecord>> {
    service_filter(snapshot, name, RequestRecord::is_error)
}

pub fn service_laggers<'a>(
    snapshot: &'a Snapshot,
    name: &str,
    threshold: f64,
) -> Option<Vec<&'a RequestRecord>> {
    service_filter(snapshot, name, |r| r.is_lagger(threshold))
}

/// One entry per known service; a service with any 5xx is in error.
/// Built in a single pass over the snapshot.
pub fn status_summary(snapshot: &Snapshot) -> Vec<ServiceStatus<'_>> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut summary: Vec<ServiceStatus<'_>> = Vec::new();

    for record in snapshot.iter() {
        let name = record.service_name.as_str();
        let index = *position.entry(name).or_insert_with(|| {
            summary.push(ServiceStatus {
                name,
                errors: Vec::new(),
                status: ServiceHealth::Normal,
            });
            summary.len() - 1
        });

        if record.is_error() {
            let entry = &mut summary[index];
            entry.errors.push(record);
            entry.status = ServiceHealth::Error;
        }
    }

    summary
}

fn service_filter<'a>(
    snapshot: &'a Snapshot,
    name: &str,
    keep: impl Fn(&RequestRecord) -> bool,
) -> Option<Vec<&'a RequestRecord>> {
    let mut found = false;
    let records: Vec<_> = snapshot
        .iter()
        .filter(|r| r.service_name == name)
        .inspect(|_| found = true)
        .filter(|r| keep(r))
        .collect();

    found.then_some(records)
}
