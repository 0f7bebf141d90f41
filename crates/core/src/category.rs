pub const OTHER_CATEGORY: &str = "Other";
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Fixed category/subcategory taxonomy the classifier is allowed to choose from.
pub const CATEGORY_TAXONOMY: &[(&str, &[&str])] = &[
    ("Income", &["Salary", "Freelance", "Investment Income", "Gifts", "Refunds"]),
    (
        "Housing",
        &["Rent/Mortgage", "Utilities", "Internet", "Home Maintenance", "Furniture"],
    ),
    (
        "Transportation",
        &["Gas", "Public Transit", "Ride Share", "Car Maintenance", "Parking"],
    ),
    ("Food", &["Groceries", "Restaurants", "Coffee Shops", "Fast Food", "Delivery"]),
    (
        "Shopping",
        &["Clothing", "Electronics", "Home Goods", "Personal Care", "Books"],
    ),
    (
        "Entertainment",
        &["Streaming Services", "Movies", "Gaming", "Hobbies", "Events"],
    ),
    (
        "Healthcare",
        &["Medical", "Dental", "Pharmacy", "Health Insurance", "Fitness"],
    ),
    ("Financial", &["Bank Fees", "Interest", "Investments", "Insurance", "Taxes"]),
    ("Personal", &["Haircut", "Spa", "Subscriptions", "Gifts", "Education"]),
    ("Travel", &["Flights", "Hotels", "Vacation", "Travel Insurance"]),
    (OTHER_CATEGORY, &[UNCATEGORIZED]),
];

pub fn is_known_category(category: &str) -> bool {
    CATEGORY_TAXONOMY
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case(category))
}

/// Maps a model-produced pair onto the taxonomy. Unknown categories become
/// `Other/Uncategorized`; an unknown subcategory under a known category is dropped.
pub fn coerce_category(category: &str, subcategory: Option<&str>) -> (String, Option<String>) {
    let Some((name, subs)) = CATEGORY_TAXONOMY
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(category.trim()))
    else {
        return (OTHER_CATEGORY.to_string(), Some(UNCATEGORIZED.to_string()));
    };

    let sub = subcategory.and_then(|s| {
        subs.iter()
            .find(|known| known.eq_ignore_ascii_case(s.trim()))
            .map(|known| known.to_string())
    });
    (name.to_string(), sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_normalises_case() {
        let (c, s) = coerce_category("food", Some("coffee shops"));
        assert_eq!(c, "Food");
        assert_eq!(s.as_deref(), Some("Coffee Shops"));
    }

    #[test]
    fn coerce_unknown_category_falls_to_other() {
        let (c, s) = coerce_category("Crypto", Some("Memecoins"));
        assert_eq!(c, OTHER_CATEGORY);
        assert_eq!(s.as_deref(), Some(UNCATEGORIZED));
    }

    #[test]
    fn coerce_drops_foreign_subcategory() {
        let (c, s) = coerce_category("Travel", Some("Groceries"));
        assert_eq!(c, "Travel");
        assert!(s.is_none());
    }

    #[test]
    fn known_category_lookup() {
        assert!(is_known_category("Healthcare"));
        assert!(!is_known_category("Nope"));
    }
}
