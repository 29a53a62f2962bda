//! Post-pass over a freshly folded report.

use tracing::trace;

use super::{
    metrics::Metric,
    report::{ReportTable, SlotMetadata},
    slot,
};

/// Runs every post-pass step in order: visit metric stripping, goal totals,
/// then slot metadata attachment.
pub fn reconcile(table: &mut ReportTable, metadata: &SlotMetadata) {
    remove_visit_metrics_from_action_rows(table);
    apply_goal_totals(table);
    attach_slots(table, metadata);
}

/// Drops unique visitors, visits and users from top-level entries that only
/// ever saw page-scope rows.
///
/// Page rows count matching actions, and one visit can set the same page
/// variable many times, so the visits column of such an entry is not a visit
/// count. Reserved ecommerce keys are left alone.
pub fn remove_visit_metrics_from_action_rows(table: &mut ReportTable) {
    for row in table.rows_mut() {
        if slot::is_reserved_key(row.label()) || !row.metrics.is_action_only() {
            continue;
        }
        trace!(label = row.label(), "dropping visit metrics from page-only entry");
        row.metrics.remove(Metric::NbUniqVisitors);
        row.metrics.remove(Metric::NbVisits);
        row.metrics.remove(Metric::NbUsers);
    }
}

/// Adds `nb_conversions` and `revenue` totals to every entry and child that
/// carries goal data.
pub fn apply_goal_totals(table: &mut ReportTable) {
    for row in table.rows_mut() {
        row.metrics.apply_goal_totals();
        if let Some(subtable) = row.subtable_mut_if_present() {
            for child in subtable.rows_mut() {
                child.metrics.apply_goal_totals();
            }
        }
    }
}

pub fn attach_slots(table: &mut ReportTable, metadata: &SlotMetadata) {
    for (label, slots) in metadata.iter() {
        if let Some(row) = table.get_mut(label) {
            row.slots = slots.to_vec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metrics::GoalMetrics, scope::Scope};

    fn action_only(table: &mut ReportTable, label: &str) {
        table.sum_row(
            label,
            &[
                (Metric::NbUniqVisitors, 2),
                (Metric::NbVisits, 3),
                (Metric::NbActions, 9),
            ],
        );
    }

    #[test]
    fn strips_visits_from_page_only_entries() {
        let mut table = ReportTable::new();
        action_only(&mut table, "Author");
        remove_visit_metrics_from_action_rows(&mut table);
        let author = table.get("Author").unwrap();
        assert_eq!(author.metrics.get(Metric::NbActions), Some(9));
        assert!(!author.metrics.has(Metric::NbVisits));
        assert!(!author.metrics.has(Metric::NbUniqVisitors));
    }

    #[test]
    fn reserved_keys_keep_visit_metrics() {
        let mut table = ReportTable::new();
        action_only(&mut table, "_pks");
        remove_visit_metrics_from_action_rows(&mut table);
        assert_eq!(table.get("_pks").unwrap().metrics.get(Metric::NbVisits), Some(3));
    }

    #[test]
    fn entries_with_goals_or_visit_columns_are_untouched() {
        let mut table = ReportTable::new();
        action_only(&mut table, "WithGoal");
        table
            .get_mut("WithGoal")
            .unwrap()
            .metrics
            .merge_goal(1, &GoalMetrics::default());
        action_only(&mut table, "WithVisit");
        table.sum_row("WithVisit", &[(Metric::MaxActions, 2)]);

        remove_visit_metrics_from_action_rows(&mut table);
        assert!(table.get("WithGoal").unwrap().metrics.has(Metric::NbVisits));
        assert!(table.get("WithVisit").unwrap().metrics.has(Metric::NbVisits));
    }

    #[test]
    fn attaches_slots_to_known_labels() {
        let mut table = ReportTable::new();
        action_only(&mut table, "Author");
        let mut metadata = SlotMetadata::default();
        metadata.record("Author", Scope::Page, 2);
        metadata.record("Unknown", Scope::Visit, 1);
        attach_slots(&mut table, &metadata);
        assert_eq!(table.get("Author").unwrap().slots.len(), 1);
        assert_eq!(table.len(), 1);
    }
}
