//! Slot numbering and the column names derived from it.

pub const KEY_COLUMN_PREFIX: &str = "custom_var_k";
pub const VALUE_COLUMN_PREFIX: &str = "custom_var_v";

/// Number of slots a fresh install provisions and the floor for
/// `set-max-custom-variables`.
pub const DEFAULT_SLOT_COUNT: u32 = 5;

/// Label used for rows whose value column was empty or NULL.
pub const VALUE_NOT_DEFINED: &str = "Value not defined";

pub const PRODUCT_SKU_KEY: &str = "_pks";
pub const PRODUCT_NAME_KEY: &str = "_pkn";
pub const PRODUCT_CATEGORY_KEY: &str = "_pkc";
pub const PRODUCT_PRICE_KEY: &str = "_pkp";

/// Keys the tracker writes on its own; reconciliation leaves them alone.
pub const RESERVED_KEYS: [&str; 6] = [
    PRODUCT_SKU_KEY,
    PRODUCT_NAME_KEY,
    PRODUCT_CATEGORY_KEY,
    PRODUCT_PRICE_KEY,
    "_pk_scount",
    "_pk_scat",
];

/// Slots that carried product page view prices before the dedicated
/// ecommerce tracking existed.
pub const LEGACY_PRICE_SLOTS: std::ops::RangeInclusive<u32> = 3..=5;

/// Slot whose value column held the viewed price in legacy installs.
pub const LEGACY_PRICE_VALUE_SLOT: u32 = 2;

pub fn key_column(index: u32) -> String {
    format!("{KEY_COLUMN_PREFIX}{index}")
}

pub fn value_column(index: u32) -> String {
    format!("{VALUE_COLUMN_PREFIX}{index}")
}

/// Extracts the slot index from a `custom_var_k{n}` / `custom_var_v{n}`
/// column name. Anything else, including index 0, yields `None`.
pub fn index_from_column(column: &str) -> Option<u32> {
    let suffix = column
        .strip_prefix(KEY_COLUMN_PREFIX)
        .or_else(|| column.strip_prefix(VALUE_COLUMN_PREFIX))?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse::<u32>().ok().filter(|index| *index > 0)
}

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Replaces an empty or missing value with [`VALUE_NOT_DEFINED`].
pub fn normalize_value(value: Option<&str>) -> &str {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => VALUE_NOT_DEFINED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_column_names() {
        assert_eq!(key_column(1), "custom_var_k1");
        assert_eq!(value_column(12), "custom_var_v12");
    }

    #[test]
    fn extracts_index_from_column_names() {
        assert_eq!(index_from_column("custom_var_k4"), Some(4));
        assert_eq!(index_from_column("custom_var_v17"), Some(17));
        assert_eq!(index_from_column("custom_var_k"), None);
        assert_eq!(index_from_column("custom_var_k0"), None);
        assert_eq!(index_from_column("custom_var_kx"), None);
        assert_eq!(index_from_column("custom_var_k-1"), None);
        assert_eq!(index_from_column("idvisit"), None);
    }

    #[test]
    fn empty_values_map_to_sentinel() {
        assert_eq!(normalize_value(None), VALUE_NOT_DEFINED);
        assert_eq!(normalize_value(Some("")), VALUE_NOT_DEFINED);
        assert_eq!(normalize_value(Some("Male")), "Male");
        assert_eq!(normalize_value(Some(" ")), " ");
    }

    #[test]
    fn recognizes_reserved_keys() {
        assert!(is_reserved_key("_pkc"));
        assert!(is_reserved_key("_pk_scat"));
        assert!(!is_reserved_key("Gender"));
    }
}
