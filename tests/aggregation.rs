use std::path::Path;

use anyhow::Result;
use tempfile::tempdir;

use customvars::{
    ArchiverOptions, CustomVariablesArchiver, Scope, SlotRegistry,
    metrics::Metric,
    provision::install_default_slots,
    report::SlotUsage,
    slot::VALUE_NOT_DEFINED,
    store::{CustomVariable, NewAction, NewConversion, NewVisit, SqliteStore, StoreOptions},
};

fn installed_store(path: &Path, options: StoreOptions) -> Result<SqliteStore> {
    let store = SqliteStore::open(path, options)?;
    let outcome = install_default_slots(&SlotRegistry::new(&store), &store);
    anyhow::ensure!(outcome.is_success(), "install failed: {:?}", outcome.failed);
    Ok(store)
}

fn visit(
    store: &SqliteStore,
    visitor: &str,
    actions: i64,
    time: i64,
    vars: Vec<CustomVariable>,
) -> Result<i64> {
    Ok(store.insert_visit(&NewVisit {
        visitor_id: visitor.to_string(),
        total_actions: actions,
        total_time: time,
        custom_variables: vars,
        ..NewVisit::default()
    })?)
}

fn action(
    store: &SqliteStore,
    visit_id: i64,
    visitor: &str,
    vars: Vec<CustomVariable>,
) -> Result<()> {
    store.insert_action(&NewAction {
        visit_id,
        visitor_id: visitor.to_string(),
        custom_variables: vars,
    })?;
    Ok(())
}

/// Three visits, three page views and one conversion across a few slots.
fn seed(store: &SqliteStore) -> Result<()> {
    let first = visit(store, "a", 3, 60, vec![CustomVariable::new(1, "Gender", "Male")])?;
    let second = visit(store, "b", 1, 5, vec![CustomVariable::new(1, "Gender", "Male")])?;
    visit(
        store,
        "c",
        2,
        30,
        vec![
            CustomVariable::new(1, "Gender", "Female"),
            CustomVariable::new(2, "Plan", ""),
        ],
    )?;

    action(store, first, "a", vec![CustomVariable::new(3, "Author", "Alice")])?;
    action(store, first, "a", vec![CustomVariable::new(3, "Author", "Alice")])?;
    action(store, second, "b", vec![CustomVariable::new(3, "Author", "Bob")])?;

    store.insert_conversion(&NewConversion {
        visit_id: first,
        goal_id: 1,
        revenue: 10.0,
        custom_variables: vec![CustomVariable::new(1, "Gender", "Male")],
        ..NewConversion::default()
    })?;
    Ok(())
}

#[test]
fn aggregates_all_scopes_from_sqlite() -> Result<()> {
    let dir = tempdir()?;
    let store = installed_store(&dir.path().join("logs.db"), StoreOptions::default())?;
    seed(&store)?;

    let report = CustomVariablesArchiver::new(&store, ArchiverOptions::default()).aggregate(5)?;

    let gender = report.get("Gender").expect("gender entry");
    assert_eq!(gender.metrics.get(Metric::NbVisits), Some(3));
    assert_eq!(gender.metrics.get(Metric::NbUniqVisitors), Some(3));
    assert_eq!(gender.metrics.get(Metric::NbActions), Some(6));
    assert_eq!(gender.metrics.get(Metric::MaxActions), Some(3));
    assert_eq!(gender.metrics.get(Metric::SumVisitLength), Some(95));
    assert_eq!(gender.metrics.get(Metric::BounceCount), Some(1));
    assert_eq!(gender.metrics.nb_conversions(), Some(1));
    assert_eq!(gender.metrics.revenue(), Some(10.0));
    assert_eq!(
        gender.slots,
        [SlotUsage {
            scope: Scope::Visit,
            index: 1
        }]
    );

    let male = gender.child("Male").expect("male child");
    assert_eq!(male.metrics.get(Metric::NbVisits), Some(2));
    assert_eq!(male.metrics.goals()[&1].nb_conversions, 1);
    assert_eq!(gender.child("Female").unwrap().metrics.get(Metric::NbVisits), Some(1));

    let plan = report.get("Plan").expect("plan entry");
    assert!(plan.child(VALUE_NOT_DEFINED).is_some());

    let author = report.get("Author").expect("author entry");
    assert_eq!(author.metrics.get(Metric::NbActions), Some(3));
    assert!(!author.metrics.has(Metric::NbVisits));
    assert!(!author.metrics.has(Metric::NbUniqVisitors));
    let alice = author.child("Alice").unwrap();
    assert_eq!(alice.metrics.get(Metric::NbActions), Some(2));
    assert_eq!(alice.metrics.get(Metric::NbVisits), Some(1));
    Ok(())
}

#[test]
fn repeated_passes_produce_identical_reports() -> Result<()> {
    let dir = tempdir()?;
    let store = installed_store(&dir.path().join("logs.db"), StoreOptions::default())?;
    seed(&store)?;

    let archiver = CustomVariablesArchiver::new(&store, ArchiverOptions::default());
    assert_eq!(archiver.aggregate(5)?, archiver.aggregate(5)?);
    Ok(())
}

#[test]
fn walking_more_slots_than_provisioned_is_harmless() -> Result<()> {
    let dir = tempdir()?;
    let store = installed_store(&dir.path().join("logs.db"), StoreOptions::default())?;
    seed(&store)?;

    let archiver = CustomVariablesArchiver::new(&store, ArchiverOptions::default());
    let wide = archiver.aggregate(8)?;
    let narrow = archiver.aggregate(5)?;
    assert_eq!(wide.table, narrow.table);
    assert_eq!(wide.slot_usages().len(), 16);
    Ok(())
}

#[test]
fn disabled_conversions_leave_goal_columns_out() -> Result<()> {
    let dir = tempdir()?;
    let store = installed_store(
        &dir.path().join("logs.db"),
        StoreOptions {
            conversions_enabled: false,
            ..StoreOptions::default()
        },
    )?;
    seed(&store)?;

    let report = CustomVariablesArchiver::new(&store, ArchiverOptions::default()).aggregate(5)?;
    let gender = report.get("Gender").unwrap();
    assert!(gender.metrics.goals().is_empty());
    assert_eq!(gender.metrics.nb_conversions(), None);
    Ok(())
}

#[test]
fn product_categories_are_split_into_children() -> Result<()> {
    let dir = tempdir()?;
    let store = installed_store(&dir.path().join("logs.db"), StoreOptions::default())?;
    let id = visit(&store, "a", 2, 10, Vec::new())?;
    action(
        &store,
        id,
        "a",
        vec![CustomVariable::new(4, "_pkc", "[\"Shoes\",\"Sandal")],
    )?;

    let report = CustomVariablesArchiver::new(&store, ArchiverOptions::default()).aggregate(5)?;
    let categories = report.get("_pkc").unwrap();
    let labels: Vec<&str> = categories.subtable().unwrap().labels().collect();
    assert_eq!(labels, ["Shoes", "Sandal"]);
    assert_eq!(
        categories.child("Sandal").unwrap().metrics.get(Metric::NbActions),
        Some(1)
    );
    Ok(())
}

#[test]
fn legacy_installs_read_viewed_price_from_slot_two() -> Result<()> {
    let dir = tempdir()?;
    let store = installed_store(&dir.path().join("logs.db"), StoreOptions::default())?;
    let id = visit(&store, "a", 2, 10, Vec::new())?;
    for price in ["20", "30"] {
        action(
            &store,
            id,
            "a",
            vec![
                CustomVariable::new(2, "_pkp", price),
                CustomVariable::new(3, "_pks", "SKU1"),
            ],
        )?;
    }

    let modern = CustomVariablesArchiver::new(&store, ArchiverOptions::default()).aggregate(5)?;
    let sku = modern.get("_pks").unwrap().child("SKU1").unwrap();
    assert_eq!(sku.metrics.price_viewed(), None);

    let legacy = CustomVariablesArchiver::new(
        &store,
        ArchiverOptions {
            legacy_ecommerce_price: true,
            ..ArchiverOptions::default()
        },
    )
    .aggregate(5)?;
    let sku = legacy.get("_pks").unwrap().child("SKU1").unwrap();
    assert_eq!(sku.metrics.price_viewed(), Some(25.0));
    assert_eq!(sku.metrics.get(Metric::NbActions), Some(2));
    Ok(())
}
