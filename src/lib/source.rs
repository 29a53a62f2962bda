//! Contract between the aggregation engine and whatever produces grouped log
//! rows for a slot.

use serde::Serialize;

use super::{
    error::Result,
    metrics::{GoalMetrics, Metric},
    slot,
};

/// Additional aggregate the page-scope query may be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtraSelect {
    /// Average viewed product price, read from the legacy price slot.
    AveragePriceViewed,
}

/// One slot's worth of grouping columns plus the filter every scope applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub slot: u32,
    pub key_column: String,
    pub value_column: String,
    pub extra: Vec<ExtraSelect>,
}

impl SlotQuery {
    pub fn new(slot: u32) -> Self {
        Self {
            slot,
            key_column: slot::key_column(slot),
            value_column: slot::value_column(slot),
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, extra: ExtraSelect) -> Self {
        if !self.extra.contains(&extra) {
            self.extra.push(extra);
        }
        self
    }

    pub fn wants(&self, extra: ExtraSelect) -> bool {
        self.extra.contains(&extra)
    }

    /// Rows are only considered when the key column is set.
    pub fn filter_sql(&self, table_alias: &str) -> String {
        format!("{table_alias}.{} != ''", self.key_column)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisitMetrics {
    pub nb_uniq_visitors: i64,
    pub nb_visits: i64,
    pub nb_actions: i64,
    pub nb_users: i64,
    pub max_actions: i64,
    pub sum_visit_length: i64,
    pub bounce_count: i64,
    pub nb_visits_converted: i64,
}

impl VisitMetrics {
    pub fn columns(&self) -> [(Metric, i64); 8] {
        [
            (Metric::NbUniqVisitors, self.nb_uniq_visitors),
            (Metric::NbVisits, self.nb_visits),
            (Metric::NbActions, self.nb_actions),
            (Metric::NbUsers, self.nb_users),
            (Metric::MaxActions, self.max_actions),
            (Metric::SumVisitLength, self.sum_visit_length),
            (Metric::BounceCount, self.bounce_count),
            (Metric::NbVisitsConverted, self.nb_visits_converted),
        ]
    }
}

/// Visit-scope row grouped by (key, value).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitRow {
    pub key: String,
    pub value: Option<String>,
    pub metrics: VisitMetrics,
}

/// Page-scope row grouped by (key, value).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRow {
    pub key: String,
    pub value: Option<String>,
    pub nb_uniq_visitors: i64,
    pub nb_visits: i64,
    pub nb_actions: i64,
    /// Present only when [`ExtraSelect::AveragePriceViewed`] was requested.
    pub price_viewed: Option<f64>,
}

impl ActionRow {
    pub fn columns(&self) -> [(Metric, i64); 3] {
        [
            (Metric::NbUniqVisitors, self.nb_uniq_visitors),
            (Metric::NbVisits, self.nb_visits),
            (Metric::NbActions, self.nb_actions),
        ]
    }
}

/// Conversion-scope row grouped by (key, value, goal).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRow {
    pub key: String,
    pub value: Option<String>,
    pub goal_id: i64,
    pub metrics: GoalMetrics,
}

/// Supplies grouped rows per scope. Each call is driven to exhaustion once;
/// failures are handed back to the caller untouched.
pub trait RowSource {
    fn visit_rows(&self, query: &SlotQuery) -> Result<Vec<VisitRow>>;

    fn action_rows(&self, query: &SlotQuery) -> Result<Vec<ActionRow>>;

    /// `None` when this install cannot query conversions at all.
    fn conversion_rows(&self, query: &SlotQuery) -> Result<Option<Vec<ConversionRow>>>;
}

impl<T: RowSource + ?Sized> RowSource for &T {
    fn visit_rows(&self, query: &SlotQuery) -> Result<Vec<VisitRow>> {
        (**self).visit_rows(query)
    }

    fn action_rows(&self, query: &SlotQuery) -> Result<Vec<ActionRow>> {
        (**self).action_rows(query)
    }

    fn conversion_rows(&self, query: &SlotQuery) -> Result<Option<Vec<ConversionRow>>> {
        (**self).conversion_rows(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_query_derives_columns_and_filter() {
        let query = SlotQuery::new(3);
        assert_eq!(query.key_column, "custom_var_k3");
        assert_eq!(query.value_column, "custom_var_v3");
        assert_eq!(query.filter_sql("log_visit"), "log_visit.custom_var_k3 != ''");
        assert!(!query.wants(ExtraSelect::AveragePriceViewed));
    }

    #[test]
    fn extra_selects_are_not_duplicated() {
        let query = SlotQuery::new(4)
            .with_extra(ExtraSelect::AveragePriceViewed)
            .with_extra(ExtraSelect::AveragePriceViewed);
        assert_eq!(query.extra.len(), 1);
        assert!(query.wants(ExtraSelect::AveragePriceViewed));
    }
}
