use std::collections::{BTreeMap, HashMap};

use serde::{Serialize, Serializer, ser::SerializeMap};

use super::{
    metrics::{Metric, MetricSet},
    scope::Scope,
};

/// Location where a custom variable name was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SlotUsage {
    pub scope: Scope,
    pub index: u32,
}

/// Label → slot locations, deduplicated, in first-seen order per label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SlotMetadata {
    by_label: BTreeMap<String, Vec<SlotUsage>>,
}

impl SlotMetadata {
    pub fn record(&mut self, label: &str, scope: Scope, index: u32) {
        let usage = SlotUsage { scope, index };
        let slots = self.by_label.entry(label.to_string()).or_default();
        if !slots.contains(&usage) {
            slots.push(usage);
        }
    }

    pub fn get(&self, label: &str) -> Option<&[SlotUsage]> {
        self.by_label.get(label).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SlotUsage])> {
        self.by_label
            .iter()
            .map(|(label, slots)| (label.as_str(), slots.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

/// One labelled entry; top-level rows own a subtable of values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    #[serde(skip)]
    label: String,
    pub metrics: MetricSet,
    #[serde(rename = "children", skip_serializing_if = "Option::is_none")]
    subtable: Option<ReportTable>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<SlotUsage>,
}

impl ReportRow {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            metrics: MetricSet::new(),
            subtable: None,
            slots: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn subtable(&self) -> Option<&ReportTable> {
        self.subtable.as_ref()
    }

    /// Subtable of this row, created empty on first use.
    pub fn subtable_mut(&mut self) -> &mut ReportTable {
        self.subtable.get_or_insert_with(ReportTable::new)
    }

    pub fn subtable_mut_if_present(&mut self) -> Option<&mut ReportTable> {
        self.subtable.as_mut()
    }

    pub fn child(&self, label: &str) -> Option<&ReportRow> {
        self.subtable.as_ref().and_then(|table| table.get(label))
    }
}

/// Rows stored in insertion order with a label index on the side, so a
/// label lookup never needs a reference into another row.
#[derive(Debug, Clone, Default)]
pub struct ReportTable {
    rows: Vec<ReportRow>,
    by_label: HashMap<String, usize>,
}

impl ReportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&ReportRow> {
        self.by_label.get(label).map(|idx| &self.rows[*idx])
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut ReportRow> {
        match self.by_label.get(label) {
            Some(idx) => Some(&mut self.rows[*idx]),
            None => None,
        }
    }

    /// Returns the row for `label`, creating it without any column.
    pub fn ensure_row(&mut self, label: &str) -> &mut ReportRow {
        let idx = match self.by_label.get(label) {
            Some(idx) => *idx,
            None => {
                let idx = self.rows.len();
                self.rows.push(ReportRow::new(label));
                self.by_label.insert(label.to_string(), idx);
                idx
            }
        };
        &mut self.rows[idx]
    }

    /// Sums `columns` into the row for `label`, creating it when absent.
    pub fn sum_row(&mut self, label: &str, columns: &[(Metric, i64)]) -> &mut ReportRow {
        let row = self.ensure_row(label);
        row.metrics.merge_counts(columns);
        row
    }

    pub fn rows(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter()
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut ReportRow> {
        self.rows.iter_mut()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(ReportRow::label)
    }
}

/// Two tables are equal when they hold the same labels with the same
/// content, whatever order the rows arrived in.
impl PartialEq for ReportTable {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .rows
                .iter()
                .all(|row| other.get(&row.label).is_some_and(|theirs| theirs == row))
    }
}

impl Serialize for ReportTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rows.len()))?;
        for row in &self.rows {
            map.serialize_entry(&row.label, row)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotUsageRow {
    pub name: String,
    pub nb_visits: i64,
    pub nb_actions: i64,
}

/// Names recorded in one slot of one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotUsageSummary {
    pub scope: Scope,
    pub index: u32,
    pub usages: Vec<SlotUsageRow>,
}

/// Output of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomVariablesReport {
    pub max_slots: u32,
    pub table: ReportTable,
    pub slots: SlotMetadata,
}

impl CustomVariablesReport {
    pub fn get(&self, name: &str) -> Option<&ReportRow> {
        self.table.get(name)
    }

    /// Per visit/page slot, which variable names used it and how much.
    pub fn slot_usages(&self) -> Vec<SlotUsageSummary> {
        let mut summaries = Vec::new();
        for scope in [Scope::Visit, Scope::Page] {
            for index in 1..=self.max_slots {
                let usage = SlotUsage { scope, index };
                let mut usages: Vec<SlotUsageRow> = self
                    .slots
                    .iter()
                    .filter(|(_, slots)| slots.contains(&usage))
                    .map(|(name, _)| {
                        let metrics = self.table.get(name).map(|row| &row.metrics);
                        SlotUsageRow {
                            name: name.to_string(),
                            nb_visits: metrics
                                .and_then(|m| m.get(Metric::NbVisits))
                                .unwrap_or(0),
                            nb_actions: metrics
                                .and_then(|m| m.get(Metric::NbActions))
                                .unwrap_or(0),
                        }
                    })
                    .collect();
                usages.sort_by(|a, b| {
                    b.nb_visits
                        .cmp(&a.nb_visits)
                        .then_with(|| a.name.cmp(&b.name))
                });
                summaries.push(SlotUsageSummary {
                    scope,
                    index,
                    usages,
                });
            }
        }
        summaries
    }
}
