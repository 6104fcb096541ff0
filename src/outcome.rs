//! Outcomes of protocol steps and their filtered reporting.
//!
//! Every step of a client session and every aggregation round produces an [`Outcome`]: a success
//! flag plus a [`Report`] of texts addressed to an [`Audience`] at some [`Severity`]. A
//! [`Reporter`] forwards the entries somebody subscribed to through `tracing` and silently drops
//! the rest.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use displaydoc::Display;
use serde::{Deserialize, Serialize};

#[derive(
    Copy, Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
/// The audience a report entry is addressed to.
pub enum Audience {
    /// user
    User,
    /// dev
    Dev,
}

#[derive(
    Copy, Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
/// The severity of a report entry.
pub enum Severity {
    /// notification
    Notification,
    /// warning
    Warning,
    /// error
    Error,
    /// debug
    Debug,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// The texts of an [`Outcome`], keyed by audience and severity.
pub struct Report(BTreeMap<Audience, BTreeMap<Severity, String>>);

impl Report {
    /// Gets the text addressed to `audience` at `severity`, if any.
    pub fn get(&self, audience: Audience, severity: Severity) -> Option<&str> {
        self.0
            .get(&audience)
            .and_then(|entries| entries.get(&severity))
            .map(String::as_str)
    }

    /// Checks whether the report holds no text at all.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    /// Iterates over all `(audience, severity, text)` entries in a stable order.
    pub fn entries(&self) -> impl Iterator<Item = (Audience, Severity, &str)> + '_ {
        self.0.iter().flat_map(|(audience, entries)| {
            entries
                .iter()
                .map(move |(severity, text)| (*audience, *severity, text.as_str()))
        })
    }

    fn insert(&mut self, audience: Audience, severity: Severity, text: String) {
        self.0.entry(audience).or_default().insert(severity, text);
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (audience, severity, text) in self.entries() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}/{}: {}", audience, severity, text)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[must_use]
/// The outcome of a protocol step.
///
/// A failed outcome always carries at least one report entry.
pub struct Outcome {
    ok: bool,
    report: Report,
}

impl Outcome {
    /// A successful outcome with an empty report.
    pub fn success() -> Self {
        Self {
            ok: true,
            report: Report::default(),
        }
    }

    /// A failed outcome with a single report entry.
    pub fn failure(audience: Audience, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            ok: false,
            report: Report::default(),
        }
        .with(audience, severity, text)
    }

    /// Adds a report entry. An existing entry for the same audience and severity is replaced.
    pub fn with(mut self, audience: Audience, severity: Severity, text: impl Into<String>) -> Self {
        self.report.insert(audience, severity, text.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn report(&self) -> &Report {
        &self.report
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
/// The severities each audience wants to hear about.
///
/// **TOML**
/// ```text
/// [report]
/// user = ["notification", "warning"]
/// dev = ["error"]
/// ```
pub struct Subscription(BTreeMap<Audience, BTreeSet<Severity>>);

impl Subscription {
    /// A subscription to nothing.
    pub fn none() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds `severity` for `audience`.
    pub fn subscribe(mut self, audience: Audience, severity: Severity) -> Self {
        self.0.entry(audience).or_default().insert(severity);
        self
    }

    pub fn contains(&self, audience: Audience, severity: Severity) -> bool {
        self.0
            .get(&audience)
            .map_or(false, |severities| severities.contains(&severity))
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::none().subscribe(Audience::User, Severity::Notification)
    }
}

#[derive(Debug, Clone)]
/// Emits the subscribed entries of outcomes through `tracing`.
pub struct Reporter {
    name: String,
    subscription: Subscription,
}

impl Reporter {
    pub fn new(name: impl Into<String>, subscription: Subscription) -> Self {
        Self {
            name: name.into(),
            subscription,
        }
    }

    /// Selects the entries of `outcome` somebody subscribed to.
    pub fn filter<'a>(
        &'a self,
        outcome: &'a Outcome,
    ) -> impl Iterator<Item = (Audience, Severity, &'a str)> + 'a {
        outcome
            .report()
            .entries()
            .filter(move |(audience, severity, _)| {
                self.subscription.contains(*audience, *severity)
            })
    }

    /// Emits the subscribed entries of `outcome`.
    pub fn report(&self, outcome: &Outcome) {
        for (audience, severity, text) in self.filter(outcome) {
            let reporter = self.name.as_str();
            match severity {
                Severity::Notification => info!(reporter = reporter, audience = %audience, "{}", text),
                Severity::Warning => warn!(reporter = reporter, audience = %audience, "{}", text),
                Severity::Error => error!(reporter = reporter, audience = %audience, "{}", text),
                Severity::Debug => debug!(reporter = reporter, audience = %audience, "{}", text),
            }
        }
    }
}
