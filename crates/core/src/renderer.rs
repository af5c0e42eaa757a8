use std::collections::BTreeMap;

use crate::{ApplyReport, Outcome};

/// Renders the unapplied alterscripts of a look run, one instance per line:
/// `instance: id id`.
#[must_use]
pub fn render_unapplied(unapplied: &BTreeMap<String, Vec<String>>) -> String {
    let mut rendered = String::new();
    for (instance, ids) in unapplied {
        if ids.is_empty() {
            continue;
        }
        rendered.push_str(instance);
        rendered.push(':');
        for id in ids {
            rendered.push(' ');
            rendered.push_str(id);
        }
        rendered.push('\n');
    }
    rendered
}

/// One-line count of what a run did.
#[must_use]
pub fn render_summary(report: &ApplyReport) -> String {
    let (mut applied, mut already_applied, mut unapplied, mut skipped, mut failed) = (0, 0, 0, 0, 0);
    for entry in &report.outcomes {
        match entry.outcome {
            Outcome::Applied { .. } | Outcome::Printed => applied += 1,
            Outcome::AlreadyApplied => already_applied += 1,
            Outcome::Unapplied => unapplied += 1,
            Outcome::IncrementalSkip { .. }
            | Outcome::EngineMismatch
            | Outcome::EnvironmentMismatch
            | Outcome::InstanceTypeMismatch => skipped += 1,
            Outcome::Failed => failed += 1,
        }
    }
    format!(
        "{applied} applied, {already_applied} already applied, {unapplied} unapplied, \
         {skipped} skipped, {failed} failed"
    )
}
