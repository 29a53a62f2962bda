use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Goal id reserved for ecommerce orders.
pub const GOAL_ECOMMERCE_ORDER: i64 = 0;
/// Goal id reserved for abandoned carts; excluded from goal totals.
pub const GOAL_ECOMMERCE_CART: i64 = -1;

/// Integer metric columns a report entry can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    NbUniqVisitors,
    NbVisits,
    NbActions,
    NbUsers,
    MaxActions,
    SumVisitLength,
    BounceCount,
    NbVisitsConverted,
}

impl Metric {
    /// Columns a page-scope row starts with.
    pub const ACTION_TRIPLE: [Metric; 3] =
        [Metric::NbUniqVisitors, Metric::NbVisits, Metric::NbActions];

    /// Columns only visit-scope rows produce.
    pub const VISIT_ONLY: [Metric; 5] = [
        Metric::NbUsers,
        Metric::MaxActions,
        Metric::SumVisitLength,
        Metric::BounceCount,
        Metric::NbVisitsConverted,
    ];

    fn merge(self, current: i64, incoming: i64) -> i64 {
        match self {
            Metric::MaxActions => current.max(incoming),
            _ => current + incoming,
        }
    }
}

/// Extra columns carried by the ecommerce goal ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EcommerceMetrics {
    pub revenue_subtotal: f64,
    pub revenue_tax: f64,
    pub revenue_shipping: f64,
    pub revenue_discount: f64,
    pub items: i64,
}

impl EcommerceMetrics {
    fn add(&mut self, other: &EcommerceMetrics) {
        self.revenue_subtotal += other.revenue_subtotal;
        self.revenue_tax += other.revenue_tax;
        self.revenue_shipping += other.revenue_shipping;
        self.revenue_discount += other.revenue_discount;
        self.items += other.items;
    }
}

/// Metrics for one goal id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GoalMetrics {
    pub nb_conversions: i64,
    pub nb_visits_converted: i64,
    pub revenue: f64,
    #[serde(skip_serializing_if = "Option::is_none", flatten)]
    pub ecommerce: Option<EcommerceMetrics>,
}

impl GoalMetrics {
    pub fn add(&mut self, other: &GoalMetrics) {
        self.nb_conversions += other.nb_conversions;
        self.nb_visits_converted += other.nb_visits_converted;
        self.revenue += other.revenue;
        if let Some(theirs) = &other.ecommerce {
            self.ecommerce
                .get_or_insert_with(EcommerceMetrics::default)
                .add(theirs);
        }
    }
}

/// Column set of one report entry.
///
/// Presence matters as much as value: the folding rules look at which columns
/// an entry already has before merging into it, so a missing column is never
/// treated as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSet {
    #[serde(flatten)]
    counts: BTreeMap<Metric, i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price_viewed: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    goals: BTreeMap<i64, GoalMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nb_conversions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revenue: Option<f64>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(columns: &[(Metric, i64)]) -> Self {
        let mut set = Self::new();
        set.merge_counts(columns);
        set
    }

    pub fn has(&self, metric: Metric) -> bool {
        self.counts.contains_key(&metric)
    }

    pub fn get(&self, metric: Metric) -> Option<i64> {
        self.counts.get(&metric).copied()
    }

    pub fn set(&mut self, metric: Metric, value: i64) {
        self.counts.insert(metric, value);
    }

    pub fn remove(&mut self, metric: Metric) -> Option<i64> {
        self.counts.remove(&metric)
    }

    /// Sums each incoming column into the set, inserting absent ones.
    /// `max_actions` keeps the larger value instead of summing.
    pub fn merge_counts(&mut self, columns: &[(Metric, i64)]) {
        for (metric, value) in columns {
            self.counts
                .entry(*metric)
                .and_modify(|current| *current = metric.merge(*current, *value))
                .or_insert(*value);
        }
    }

    pub fn price_viewed(&self) -> Option<f64> {
        self.price_viewed
    }

    /// The price is an average computed by the row source, so it replaces
    /// whatever was there.
    pub fn set_price_viewed(&mut self, price: f64) {
        self.price_viewed = Some(price);
    }

    pub fn goals(&self) -> &BTreeMap<i64, GoalMetrics> {
        &self.goals
    }

    pub fn merge_goal(&mut self, goal_id: i64, metrics: &GoalMetrics) {
        self.goals.entry(goal_id).or_default().add(metrics);
    }

    pub fn nb_conversions(&self) -> Option<i64> {
        self.nb_conversions
    }

    pub fn revenue(&self) -> Option<f64> {
        self.revenue
    }

    /// Fills `nb_conversions` and `revenue` from the goal map, leaving out
    /// abandoned carts. No-op for entries without goal data.
    pub fn apply_goal_totals(&mut self) {
        if self.goals.is_empty() {
            return;
        }
        let (conversions, revenue) = self
            .goals
            .iter()
            .filter(|(goal_id, _)| **goal_id != GOAL_ECOMMERCE_CART)
            .fold((0i64, 0f64), |(conversions, revenue), (_, goal)| {
                (conversions + goal.nb_conversions, revenue + goal.revenue)
            });
        self.nb_conversions = Some(conversions);
        self.revenue = Some(revenue);
    }

    /// Number of distinct column classes present.
    pub fn column_count(&self) -> usize {
        self.counts.len()
            + usize::from(self.price_viewed.is_some())
            + usize::from(!self.goals.is_empty())
            + usize::from(self.nb_conversions.is_some())
            + usize::from(self.revenue.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.column_count() == 0
    }

    /// Holds exactly unique visitors, visits and actions and nothing else,
    /// which is what a purely page-scope entry looks like.
    pub fn is_action_only(&self) -> bool {
        self.column_count() == Metric::ACTION_TRIPLE.len()
            && Metric::ACTION_TRIPLE.iter().all(|metric| self.has(*metric))
    }
}
