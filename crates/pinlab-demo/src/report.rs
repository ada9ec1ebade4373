//! Run summaries

use serde::Serialize;

use pinlab_types::{RequestError, RequestPhase, RequestSnapshot};

use crate::catalog::{CatalogEntry, Expectation, Group};

/// Final result of one catalog request
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    /// Request name
    pub name: String,
    /// Request URL
    pub url: String,
    /// Report section
    pub group: Group,
    /// Trust strategy label
    pub strategy: &'static str,
    /// Intended outcome
    pub expected: Expectation,
    /// Final phase
    pub phase: RequestPhase,
    /// HTTP status, when a response was received
    pub status_code: Option<u16>,
    /// Failure, when the request failed
    pub error: Option<RequestError>,
    /// Wall time of the execution
    pub elapsed_ms: u64,
}

impl Outcome {
    /// Outcome of `entry` from its final snapshot
    pub fn from_snapshot(entry: &CatalogEntry, snapshot: RequestSnapshot, elapsed_ms: u64) -> Self {
        let def = &entry.definition;
        Self {
            name: def.name().to_string(),
            url: def.url().to_string(),
            group: entry.group,
            strategy: def.trust().label(),
            expected: entry.expected,
            phase: snapshot.phase,
            status_code: snapshot.status_code,
            error: snapshot.last_error,
            elapsed_ms,
        }
    }

    /// Whether the request ended the way the catalog intends
    pub fn as_expected(&self) -> bool {
        match self.expected {
            Expectation::Success => self.phase == RequestPhase::Succeeded,
            Expectation::Failure => self.phase == RequestPhase::Failed,
        }
    }

    fn detail(&self) -> String {
        let detail = match (&self.error, self.status_code) {
            (Some(err), _) => format!("{} ({})", err.code(), err),
            (None, Some(status)) => format!("HTTP {}", status),
            (None, None) => String::new(),
        };
        match (self.expected, self.as_expected()) {
            (_, false) => format!("UNEXPECTED {}", detail),
            (Expectation::Failure, true) => format!("{} [expected]", detail),
            (Expectation::Success, true) => detail,
        }
    }
}

/// Aligned table grouped by section
pub fn render_text(outcomes: &[Outcome]) -> String {
    let width = outcomes
        .iter()
        .map(|o| o.name.len())
        .max()
        .unwrap_or(0)
        .max("request".len());

    let mut out = String::new();
    let sections = [
        (Group::Unpinned, "Unpinned requests"),
        (Group::Pinned, "Pinned requests"),
    ];
    for (group, title) in sections {
        let rows: Vec<&Outcome> = outcomes.iter().filter(|o| o.group == group).collect();
        if rows.is_empty() {
            continue;
        }
        out.push_str(title);
        out.push('\n');
        for o in rows {
            out.push_str(&format!(
                "  {:<width$}  {:<11}  {:<9}  {:>6}ms  {}\n",
                o.name,
                o.strategy,
                o.phase.as_str(),
                o.elapsed_ms,
                o.detail(),
                width = width
            ));
        }
    }

    let succeeded = outcomes
        .iter()
        .filter(|o| o.phase == RequestPhase::Succeeded)
        .count();
    let unexpected = outcomes.iter().filter(|o| !o.as_expected()).count();
    out.push_str(&format!(
        "{} succeeded, {} failed, {} unexpected\n",
        succeeded,
        outcomes.len() - succeeded,
        unexpected
    ));
    out
}

#[derive(Serialize)]
struct Report<'a> {
    requests: &'a [Outcome],
}

/// Outcomes as a JSON document
pub fn render_json(outcomes: &[Outcome]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Report { requests: outcomes })
}
