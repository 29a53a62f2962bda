//! Builds the custom variables report: name → value → metrics.
//!
//! For each slot the visit, page and conversion row streams are folded, in
//! that order, into one shared [`ReportTable`]. Every fold looks at which
//! columns an entry already carries before merging into it; see the
//! individual `fold_*` methods for the rules. The pass ends with
//! [`reconcile`](super::reconcile).

use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, trace};

use super::{
    error::Result,
    metrics::Metric,
    reconcile,
    report::{CustomVariablesReport, ReportTable, SlotMetadata},
    scope::Scope,
    slot::{self, LEGACY_PRICE_SLOTS, PRODUCT_CATEGORY_KEY},
    source::{ActionRow, ConversionRow, ExtraSelect, RowSource, SlotQuery, VisitRow},
};

/// Upper bound on categories a single product view contributes.
pub const DEFAULT_MAX_PRODUCT_CATEGORIES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiverOptions {
    /// Install predates dedicated ecommerce view tracking: slots 3 to 5 also
    /// ask the page source for the average viewed price.
    pub legacy_ecommerce_price: bool,
    pub max_product_categories: usize,
}

impl Default for ArchiverOptions {
    fn default() -> Self {
        Self {
            legacy_ecommerce_price: false,
            max_product_categories: DEFAULT_MAX_PRODUCT_CATEGORIES,
        }
    }
}

/// Slots to walk: the configured maximum or what is provisioned, whichever
/// is larger.
pub fn resolve_max_slots(configured: Option<u32>, provisioned: u32) -> u32 {
    configured.map_or(provisioned, |configured| configured.max(provisioned))
}

pub struct CustomVariablesArchiver<S> {
    source: S,
    options: ArchiverOptions,
}

impl<S: RowSource> CustomVariablesArchiver<S> {
    pub fn new(source: S, options: ArchiverOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> &ArchiverOptions {
        &self.options
    }

    /// Runs one full pass over slots `1..=max_slots`. Each call starts from
    /// an empty tree.
    pub fn aggregate(&self, max_slots: u32) -> Result<CustomVariablesReport> {
        let mut pass = AggregationPass::new(self.options.max_product_categories);
        for slot in 1..=max_slots {
            self.aggregate_slot(&mut pass, slot)?;
        }
        debug!(
            max_slots,
            names = pass.table.len(),
            "custom variables aggregation finished"
        );
        Ok(pass.finish(max_slots))
    }

    fn aggregate_slot(&self, pass: &mut AggregationPass, slot: u32) -> Result<()> {
        let query = SlotQuery::new(slot);

        let visits = self.source.visit_rows(&query)?;
        debug!(slot, rows = visits.len(), "folding visit rows");
        for row in &visits {
            pass.fold_visit_row(slot, row);
        }

        let action_query = if self.options.legacy_ecommerce_price && LEGACY_PRICE_SLOTS.contains(&slot)
        {
            query.clone().with_extra(ExtraSelect::AveragePriceViewed)
        } else {
            query.clone()
        };
        let actions = self.source.action_rows(&action_query)?;
        debug!(slot, rows = actions.len(), "folding action rows");
        for row in &actions {
            pass.fold_action_row(slot, row);
        }

        match self.source.conversion_rows(&query)? {
            Some(conversions) => {
                debug!(slot, rows = conversions.len(), "folding conversion rows");
                for row in &conversions {
                    pass.fold_conversion_row(row);
                }
            }
            None => trace!(slot, "conversion rows unavailable"),
        }
        Ok(())
    }
}

/// State owned by a single aggregation pass.
struct AggregationPass {
    table: ReportTable,
    metadata: SlotMetadata,
    max_product_categories: usize,
}

impl AggregationPass {
    fn new(max_product_categories: usize) -> Self {
        Self {
            table: ReportTable::new(),
            metadata: SlotMetadata::default(),
            max_product_categories,
        }
    }

    fn fold_visit_row(&mut self, slot: u32, row: &VisitRow) {
        self.metadata.record(&row.key, Scope::Visit, slot);
        let value = slot::normalize_value(row.value.as_deref());

        if let Some(existing) = self.table.get_mut(&row.key) {
            // An entry without visits was never initialized with visit data;
            // summing into it would produce partial totals.
            if !existing.metrics.has(Metric::NbVisits) {
                trace!(key = %row.key, slot, "skipping visit row for entry without visits");
                return;
            }
            // Entry so far only saw page rows: give it the visit-only
            // columns before the richer row is summed in.
            if !existing.metrics.has(Metric::MaxActions) {
                for metric in Metric::VISIT_ONLY {
                    existing.metrics.set(metric, 0);
                }
            }
        }

        let columns = row.metrics.columns();
        let top = self.table.sum_row(&row.key, &columns);
        top.subtable_mut().sum_row(value, &columns);
    }

    fn fold_action_row(&mut self, slot: u32, row: &ActionRow) {
        self.metadata.record(&row.key, Scope::Page, slot);
        let value = slot::normalize_value(row.value.as_deref());

        if self.fold_product_categories(row, value) {
            return;
        }

        self.fold_action_value(&row.key, value, row);
        self.table.sum_row(&row.key, &row.columns());
    }

    /// `_pkc` values holding a JSON list are split into one child per
    /// category. Returns whether at least one category was folded.
    fn fold_product_categories(&mut self, row: &ActionRow, value: &str) -> bool {
        if row.key != PRODUCT_CATEGORY_KEY {
            return false;
        }
        let categories = product_categories(value, self.max_product_categories);
        for category in &categories {
            self.fold_action_value(&row.key, category, row);
        }
        !categories.is_empty()
    }

    /// Child-level part of the page fold. The top-level entry is created if
    /// needed but receives no columns here.
    fn fold_action_value(&mut self, key: &str, value: &str, row: &ActionRow) {
        let subtable = self.table.ensure_row(key).subtable_mut();

        if subtable
            .get(value)
            .is_some_and(|existing| !existing.metrics.has(Metric::NbVisits))
        {
            trace!(key, value, "skipping action row for child without visits");
            return;
        }

        let child = subtable.sum_row(value, &row.columns());
        if slot::is_reserved_key(key) {
            if let Some(price) = row.price_viewed.filter(|price| *price != 0.0) {
                child.metrics.set_price_viewed(price);
            }
        }
    }

    fn fold_conversion_row(&mut self, row: &ConversionRow) {
        let value = slot::normalize_value(row.value.as_deref());
        let top = self.table.ensure_row(&row.key);
        top.metrics.merge_goal(row.goal_id, &row.metrics);
        top.subtable_mut()
            .ensure_row(value)
            .metrics
            .merge_goal(row.goal_id, &row.metrics);
    }

    fn finish(mut self, max_slots: u32) -> CustomVariablesReport {
        reconcile::reconcile(&mut self.table, &self.metadata);
        CustomVariablesReport {
            max_slots,
            table: self.table,
            slots: self.metadata,
        }
    }
}

/// Decodes a product category list such as `["Shoes","Sandals"]`.
///
/// Values cut off by the column length get a closing `"]` appended before
/// decoding. Anything that still fails to decode yields no categories.
pub fn product_categories(value: &str, max: usize) -> Vec<String> {
    if !value.starts_with("[\"") {
        return Vec::new();
    }
    let repaired: Cow<'_, str> = if value.ends_with("\"]") {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("{value}\"]"))
    };

    let decoded: Vec<Value> = match serde_json::from_str(&repaired) {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(value, error = %err, "malformed product category list");
            return Vec::new();
        }
    };

    decoded
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(category) if !category.is_empty() => Some(category),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .take(max)
        .collect()
}
