use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::warn;

use super::{
    error::{CustomVarsError, Result},
    scope::Scope,
    slot,
};

/// Reads the live column names of a scope's log table.
pub trait SchemaInspector {
    fn column_names(&self, scope: Scope) -> Result<BTreeSet<String>>;
}

impl<T: SchemaInspector + ?Sized> SchemaInspector for &T {
    fn column_names(&self, scope: Scope) -> Result<BTreeSet<String>> {
        (**self).column_names(scope)
    }
}

/// Slot indexes present in one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeSlots {
    pub scope: Scope,
    pub table: &'static str,
    pub indexes: BTreeSet<u32>,
}

impl ScopeSlots {
    pub fn count(&self) -> usize {
        self.indexes.len()
    }

    pub fn highest(&self) -> u32 {
        self.indexes.last().copied().unwrap_or(0)
    }

    /// True when the indexes are exactly `1..=count`.
    pub fn is_contiguous(&self) -> bool {
        self.highest() as usize == self.count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotConsistency {
    pub scopes: Vec<ScopeSlots>,
}

impl SlotConsistency {
    /// Every scope exposes the same set of slot indexes.
    pub fn is_consistent(&self) -> bool {
        let mut iter = self.scopes.iter();
        match iter.next() {
            Some(first) => iter.all(|other| other.indexes == first.indexes),
            None => true,
        }
    }

    pub fn describe(&self) -> String {
        self.scopes
            .iter()
            .map(|slots| {
                let indexes: Vec<String> = slots.indexes.iter().map(u32::to_string).collect();
                format!("{}=[{}]", slots.table, indexes.join(","))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Derives slot indexes from the columns a [`SchemaInspector`] reports.
pub struct SlotRegistry<I> {
    inspector: I,
}

impl<I: SchemaInspector> SlotRegistry<I> {
    pub fn new(inspector: I) -> Self {
        Self { inspector }
    }

    pub fn slot_indexes(&self, scope: Scope) -> Result<BTreeSet<u32>> {
        let columns = self.inspector.column_names(scope)?;
        Ok(columns
            .iter()
            .filter_map(|column| slot::index_from_column(column))
            .collect())
    }

    pub fn slots(&self, scope: Scope) -> Result<ScopeSlots> {
        Ok(ScopeSlots {
            scope,
            table: scope.table_name(),
            indexes: self.slot_indexes(scope)?,
        })
    }

    pub fn slot_count(&self, scope: Scope) -> Result<usize> {
        Ok(self.slot_indexes(scope)?.len())
    }

    /// Highest index present, `0` when the scope has no slots. Differs from
    /// [`slot_count`](Self::slot_count) when columns were dropped by hand.
    pub fn highest_slot_index(&self, scope: Scope) -> Result<u32> {
        Ok(self.slot_indexes(scope)?.last().copied().unwrap_or(0))
    }

    /// Number of slots every scope can serve: the lowest highest-index.
    pub fn usable_slot_count(&self) -> Result<u32> {
        let mut usable: Option<u32> = None;
        for scope in Scope::ALL {
            let highest = self.highest_slot_index(scope)?;
            usable = Some(usable.map_or(highest, |current| current.min(highest)));
        }
        Ok(usable.unwrap_or(0))
    }

    pub fn consistency(&self) -> Result<SlotConsistency> {
        let scopes = Scope::ALL
            .into_iter()
            .map(|scope| self.slots(scope))
            .collect::<Result<Vec<_>>>()?;
        let report = SlotConsistency { scopes };
        if !report.is_consistent() {
            warn!(details = %report.describe(), "custom variable columns differ across scopes");
        }
        Ok(report)
    }

    pub fn ensure_consistent(&self) -> Result<SlotConsistency> {
        let report = self.consistency()?;
        if report.is_consistent() {
            Ok(report)
        } else {
            Err(CustomVarsError::SchemaInconsistency {
                details: report.describe(),
            })
        }
    }

    /// Column names per scope, mostly useful for diagnostics.
    pub fn columns(&self) -> Result<BTreeMap<Scope, BTreeSet<String>>> {
        Scope::ALL
            .into_iter()
            .map(|scope| Ok((scope, self.inspector.column_names(scope)?)))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Default)]
    pub(crate) struct StaticColumns {
        pub(crate) tables: BTreeMap<Scope, BTreeSet<String>>,
    }

    impl StaticColumns {
        pub(crate) fn with_slots(mut self, scope: Scope, indexes: &[u32]) -> Self {
            let columns = self.tables.entry(scope).or_default();
            columns.insert("idvisit".to_string());
            for index in indexes {
                columns.insert(slot::key_column(*index));
                columns.insert(slot::value_column(*index));
            }
            self
        }
    }

    impl SchemaInspector for StaticColumns {
        fn column_names(&self, scope: Scope) -> Result<BTreeSet<String>> {
            Ok(self.tables.get(&scope).cloned().unwrap_or_default())
        }
    }

    fn uniform(indexes: &[u32]) -> StaticColumns {
        Scope::ALL
            .into_iter()
            .fold(StaticColumns::default(), |acc, scope| {
                acc.with_slots(scope, indexes)
            })
    }

    #[test]
    fn gap_in_indexes_separates_count_from_highest() {
        let registry = SlotRegistry::new(uniform(&[1, 2, 4]));
        assert_eq!(registry.slot_count(Scope::Visit).unwrap(), 3);
        assert_eq!(registry.highest_slot_index(Scope::Visit).unwrap(), 4);
        assert!(!registry.slots(Scope::Visit).unwrap().is_contiguous());
    }

    #[test]
    fn empty_scope_has_zero_highest_index() {
        let registry = SlotRegistry::new(StaticColumns::default());
        assert_eq!(registry.slot_count(Scope::Page).unwrap(), 0);
        assert_eq!(registry.highest_slot_index(Scope::Page).unwrap(), 0);
        assert_eq!(registry.usable_slot_count().unwrap(), 0);
    }

    #[test]
    fn key_only_column_still_counts_as_slot() {
        let mut columns = StaticColumns::default().with_slots(Scope::Visit, &[1]);
        columns
            .tables
            .get_mut(&Scope::Visit)
            .unwrap()
            .insert("custom_var_k2".to_string());
        let registry = SlotRegistry::new(columns);
        assert_eq!(
            registry.slot_indexes(Scope::Visit).unwrap(),
            BTreeSet::from([1, 2])
        );
    }

    #[test]
    fn usable_count_is_lowest_highest_index() {
        let columns = StaticColumns::default()
            .with_slots(Scope::Page, &[1, 2, 3, 4, 5, 6])
            .with_slots(Scope::Visit, &[1, 2, 3, 4, 5])
            .with_slots(Scope::Conversion, &[1, 2, 3, 4, 5, 6, 7]);
        let registry = SlotRegistry::new(columns);
        assert_eq!(registry.usable_slot_count().unwrap(), 5);
    }

    #[test]
    fn detects_mismatched_scopes() {
        let columns = StaticColumns::default()
            .with_slots(Scope::Page, &[1, 2, 3, 4, 5])
            .with_slots(Scope::Visit, &[1, 2, 3, 4, 5])
            .with_slots(Scope::Conversion, &[1, 2, 3, 5]);
        let registry = SlotRegistry::new(columns);

        let report = registry.consistency().unwrap();
        assert!(!report.is_consistent());
        assert!(report.describe().contains("log_conversion=[1,2,3,5]"));

        let err = registry.ensure_consistent().unwrap_err();
        assert!(matches!(err, CustomVarsError::SchemaInconsistency { .. }));
    }

    #[test]
    fn identical_scopes_are_consistent() {
        let registry = SlotRegistry::new(uniform(&[1, 2, 3, 4, 5]));
        let report = registry.ensure_consistent().unwrap();
        assert_eq!(report.scopes.len(), 3);
        assert!(report.scopes.iter().all(|slots| slots.count() == 5));
    }
}
