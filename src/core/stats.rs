use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Occurrences of each non-empty value.
pub fn distribution<'a, I>(values: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = BTreeMap::new();
    for value in values {
        let value = value.trim();
        if !value.is_empty() {
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// The `n` most frequent values, ties broken alphabetically.
pub fn top_n(counts: &BTreeMap<String, usize>, n: usize) -> Vec<(&str, usize)> {
    let mut ranked: Vec<(&str, usize)> = counts
        .iter()
        .map(|(value, &count)| (value.as_str(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(n);
    ranked
}

/// Every value, most frequent first, ties broken alphabetically.
pub fn ranked(counts: &BTreeMap<String, usize>) -> IndexMap<String, usize> {
    top_n(counts, counts.len())
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect()
}

pub fn log_top(title: &str, counts: &BTreeMap<String, usize>, n: usize) {
    log_entries(title, top_n(counts, n));
}

pub fn log_ranked(title: &str, ranked: &IndexMap<String, usize>, n: usize) {
    log_entries(
        title,
        ranked
            .iter()
            .take(n)
            .map(|(value, &count)| (value.as_str(), count))
            .collect(),
    );
}

fn log_entries(title: &str, entries: Vec<(&str, usize)>) {
    if entries.is_empty() {
        return;
    }
    tracing::info!("{} (top {}):", title, entries.len());
    for (rank, (value, count)) in entries.into_iter().enumerate() {
        tracing::info!("  {:2}. {:15} {}", rank + 1, value, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_skips_empty_values() {
        let counts = distribution(["PT", "PL", " PT ", "", "  "]);

        assert_eq!(counts.len(), 2);
        assert_eq!(counts["PT"], 2);
        assert_eq!(counts["PL"], 1);
    }

    #[test]
    fn test_top_n_orders_by_count_then_name() {
        let counts = distribution(["SP", "RJ", "BA", "RJ", "SP", "MG"]);

        assert_eq!(top_n(&counts, 3), vec![("RJ", 2), ("SP", 2), ("BA", 1)]);
        assert_eq!(top_n(&counts, 10).len(), 4);
    }

    #[test]
    fn test_ranked_keeps_every_value_in_count_order() {
        let counts = distribution(["PL", "PT", "PT", "MDB", "PT", "PL"]);
        let ranked = ranked(&counts);

        let order: Vec<(&str, usize)> = ranked.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        assert_eq!(order, vec![("PT", 3), ("PL", 2), ("MDB", 1)]);
        assert_eq!(
            serde_json::to_string(&ranked).unwrap(),
            r#"{"PT":3,"PL":2,"MDB":1}"#
        );
    }
}
