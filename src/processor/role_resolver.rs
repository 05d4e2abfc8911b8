use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic role of a column in an uploaded sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    Region,
    Month,
    Channel,
    PackSize,
    Price,
    Unknown,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnRole::Region => "region",
            ColumnRole::Month => "month",
            ColumnRole::Channel => "channel",
            ColumnRole::PackSize => "pack size",
            ColumnRole::Price => "price",
            ColumnRole::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Maps free-form column names to semantic roles.
pub trait RoleResolver {
    fn resolve_role(&self, column_name: &str) -> ColumnRole;
}

/// Case-insensitive word rules, checked in order. Dimension roles are
/// checked before price so a column is never both.
///
/// Column names are split into words on anything that is not a letter or
/// digit; a pattern matches a run of whole words, so `date` matches
/// `Invoice Date` but not `Last Updated`. A trailing plural `s` is accepted.
pub struct PatternRoleResolver {
    rules: Vec<(ColumnRole, Vec<Vec<String>>)>,
}

impl PatternRoleResolver {
    pub fn new() -> Self {
        let rules = vec![
            (ColumnRole::Region, vec!["region", "zone", "state"]),
            (ColumnRole::Month, vec!["month", "period", "date"]),
            (ColumnRole::Channel, vec!["channel"]),
            (ColumnRole::PackSize, vec!["pack size", "pack_size", "packsize"]),
            (ColumnRole::Price, vec!["price", "rsp", "asp", "mrp"]),
        ];

        PatternRoleResolver {
            rules: rules
                .into_iter()
                .map(|(role, patterns)| (role, patterns.into_iter().map(words).collect()))
                .collect(),
        }
    }

    /// Add a pattern to an existing role; new patterns are tried after the
    /// built-in ones.
    pub fn add_pattern(&mut self, role: ColumnRole, pattern: &str) {
        let pattern = words(pattern);
        if pattern.is_empty() {
            return;
        }
        match self.rules.iter_mut().find(|(r, _)| *r == role) {
            Some((_, patterns)) => patterns.push(pattern),
            None => self.rules.push((role, vec![pattern])),
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

fn word_matches(word: &str, pattern: &str) -> bool {
    word == pattern || word.strip_suffix('s') == Some(pattern)
}

fn contains_words(name: &[String], pattern: &[String]) -> bool {
    !pattern.is_empty()
        && name.windows(pattern.len()).any(|window| {
            window
                .iter()
                .zip(pattern)
                .all(|(word, p)| word_matches(word, p))
        })
}

impl Default for PatternRoleResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleResolver for PatternRoleResolver {
    fn resolve_role(&self, column_name: &str) -> ColumnRole {
        let name = words(column_name);
        for (role, patterns) in &self.rules {
            if patterns.iter().any(|p| contains_words(&name, p)) {
                return *role;
            }
        }
        ColumnRole::Unknown
    }
}

/// First column (in schema order) whose role matches.
pub fn find_column(df: &DataFrame, resolver: &dyn RoleResolver, role: ColumnRole) -> Option<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .find(|name| resolver.resolve_role(name) == role)
}

/// All columns with the given role, in schema order, excluding `skip`.
pub fn find_columns(
    df: &DataFrame,
    resolver: &dyn RoleResolver,
    role: ColumnRole,
    skip: &[&str],
) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .filter(|name| !skip.contains(&name.as_str()))
        .filter(|name| resolver.resolve_role(name) == role)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_dimension_roles() {
        let resolver = PatternRoleResolver::new();

        assert_eq!(resolver.resolve_role("Region"), ColumnRole::Region);
        assert_eq!(resolver.resolve_role("SALES ZONE"), ColumnRole::Region);
        assert_eq!(resolver.resolve_role("Month"), ColumnRole::Month);
        assert_eq!(resolver.resolve_role("Period"), ColumnRole::Month);
        assert_eq!(resolver.resolve_role("Channel"), ColumnRole::Channel);
        assert_eq!(resolver.resolve_role("Pack Size"), ColumnRole::PackSize);
        assert_eq!(resolver.resolve_role("pack-size"), ColumnRole::PackSize);
    }

    #[test]
    fn test_price_roles() {
        let resolver = PatternRoleResolver::new();

        assert_eq!(resolver.resolve_role("Price_NTW Sachet"), ColumnRole::Price);
        assert_eq!(resolver.resolve_role("Avg Price Lux 150-250ML"), ColumnRole::Price);
        assert_eq!(resolver.resolve_role("RSP Dove"), ColumnRole::Price);
        assert_eq!(resolver.resolve_role("Volume Sales"), ColumnRole::Unknown);
    }

    #[test]
    fn test_patterns_match_whole_words() {
        let resolver = PatternRoleResolver::new();

        assert_eq!(resolver.resolve_role("Last Updated"), ColumnRole::Unknown);
        assert_eq!(resolver.resolve_role("Aspire Volume"), ColumnRole::Unknown);
        assert_eq!(resolver.resolve_role("Estate"), ColumnRole::Unknown);
        assert_eq!(resolver.resolve_role("Invoice Date"), ColumnRole::Month);
        assert_eq!(resolver.resolve_role("States"), ColumnRole::Region);
        assert_eq!(resolver.resolve_role("ASP (NTW Sachet)"), ColumnRole::Price);
        assert_eq!(resolver.resolve_role("Prices"), ColumnRole::Price);
    }

    #[test]
    fn test_dimension_wins_over_price() {
        let resolver = PatternRoleResolver::new();
        assert_eq!(resolver.resolve_role("Price Region"), ColumnRole::Region);
    }

    #[test]
    fn test_custom_pattern() {
        let mut resolver = PatternRoleResolver::new();
        assert_eq!(resolver.resolve_role("Market"), ColumnRole::Unknown);

        resolver.add_pattern(ColumnRole::Region, "Market");
        assert_eq!(resolver.resolve_role("Market"), ColumnRole::Region);
    }

    #[test]
    fn test_find_column_first_match_wins() {
        let df = df!(
            "Sales Region" => ["North"],
            "Region" => ["South"],
            "Price NTW Sachet" => [1.0],
        )
        .unwrap();
        let resolver = PatternRoleResolver::new();

        assert_eq!(
            find_column(&df, &resolver, ColumnRole::Region).as_deref(),
            Some("Sales Region")
        );
        assert_eq!(find_column(&df, &resolver, ColumnRole::Channel), None);
        assert_eq!(
            find_columns(&df, &resolver, ColumnRole::Price, &[]),
            vec!["Price NTW Sachet".to_string()]
        );
    }
}
