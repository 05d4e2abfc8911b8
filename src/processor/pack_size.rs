use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Rank given to labels that fall outside the default category scheme.
/// Such labels never take part in adjacency.
pub const UNKNOWN_RANK: u8 = 99;

const UNIT: &str = r"(ml|ltrs?|litres?|liters?|kgs?|gms?|grams?|g|l)\b";
const NUMBER: &str = r"(\d+(?:\.\d+)?)";

static KEYWORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(sachets?|pouch(?:es)?)").expect("valid regex"));

// Most specific first: a range must win over the single size it contains.
static RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i){NUMBER}\s*(?:ml|l|g|kg)?\s*(?:-|–|to)\s*{NUMBER}\s*{UNIT}"
    ))
    .expect("valid regex")
});

static THRESHOLD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(>=?|<=?|above|over|below|under|up\s*to)\s*{NUMBER}\s*{UNIT}"
    ))
    .expect("valid regex")
});

static PLUS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i){NUMBER}\s*{UNIT}\s*\+")).expect("valid regex"));

static SINGLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i){NUMBER}\s*{UNIT}")).expect("valid regex"));

/// A pack-size label together with its rank in the default category scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackSize {
    pub label: String,
    pub rank: u8,
}

/// Where a pack size was found inside a longer piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct PackSizeMatch {
    pub pack_size: PackSize,
    pub start: usize,
    pub end: usize,
}

struct Extraction {
    label: String,
    volume: Option<f64>,
    start: usize,
    end: usize,
}

/// Extract a normalized pack-size label from free text (column names, sheet
/// names, RPI column segments).
///
/// Returns `None` when nothing matches; callers must exclude the row or
/// column instead of substituting a default.
pub fn extract(text: &str) -> Option<PackSize> {
    extract_with_span(text).map(|m| m.pack_size)
}

/// Like [`extract`], but also reports the byte span of the matched text so
/// callers can strip it (e.g. to recover a brand label).
pub fn extract_with_span(text: &str) -> Option<PackSizeMatch> {
    let extraction = classify(text)?;
    let rank = rank_for(&extraction);
    Some(PackSizeMatch {
        pack_size: PackSize {
            label: extraction.label,
            rank,
        },
        start: extraction.start,
        end: extraction.end,
    })
}

/// Default category rank (1..=5) for a label, or [`UNKNOWN_RANK`].
pub fn rank(label: &str) -> u8 {
    classify(label)
        .map(|extraction| rank_for(&extraction))
        .unwrap_or(UNKNOWN_RANK)
}

/// Normalize a user-supplied label so it compares equal to extracted labels.
pub fn normalize_label(text: &str) -> String {
    extract(text)
        .map(|p| p.label)
        .unwrap_or_else(|| text.trim().to_uppercase())
}

fn classify(text: &str) -> Option<Extraction> {
    if let Some(m) = KEYWORD_PATTERN.find(text) {
        let label = if m.as_str().to_lowercase().starts_with("sachet") {
            "Sachet"
        } else {
            "Pouch"
        };
        return Some(Extraction {
            label: label.to_string(),
            volume: None,
            start: m.start(),
            end: m.end(),
        });
    }

    if let Some(caps) = RANGE_PATTERN.captures(text) {
        let low = parse_number(&caps, 1)?;
        let high = parse_number(&caps, 2)?;
        let unit = normalize_unit(&caps[3]);
        return Some(Extraction {
            label: format!("{}-{}{}", format_number(low), format_number(high), unit),
            volume: Some(to_base_volume(high, unit)),
            start: caps.get(0)?.start(),
            end: caps.get(0)?.end(),
        });
    }

    if let Some(caps) = THRESHOLD_PATTERN.captures(text) {
        let operator = caps[1].to_lowercase();
        let above = operator.starts_with('>') || operator == "above" || operator == "over";
        let value = parse_number(&caps, 2)?;
        let unit = normalize_unit(&caps[3]);
        return Some(threshold_extraction(above, value, unit, &caps));
    }

    if let Some(caps) = PLUS_PATTERN.captures(text) {
        let value = parse_number(&caps, 1)?;
        let unit = normalize_unit(&caps[2]);
        return Some(threshold_extraction(true, value, unit, &caps));
    }

    if let Some(caps) = SINGLE_PATTERN.captures(text) {
        let value = parse_number(&caps, 1)?;
        let unit = normalize_unit(&caps[2]);
        return Some(Extraction {
            label: format!("{}{}", format_number(value), unit),
            volume: Some(to_base_volume(value, unit)),
            start: caps.get(0)?.start(),
            end: caps.get(0)?.end(),
        });
    }

    None
}

fn threshold_extraction(above: bool, value: f64, unit: &str, caps: &Captures) -> Extraction {
    let (symbol, volume) = if above {
        (">", to_base_volume(value, unit) + 1.0)
    } else {
        ("<", to_base_volume(value, unit) - 1.0)
    };
    let whole = caps.get(0);
    Extraction {
        label: format!("{}{}{}", symbol, format_number(value), unit),
        volume: Some(volume),
        start: whole.map(|m| m.start()).unwrap_or(0),
        end: whole.map(|m| m.end()).unwrap_or(0),
    }
}

fn rank_for(extraction: &Extraction) -> u8 {
    match extraction.volume {
        None => 1,
        Some(v) if v <= 250.0 => 2,
        Some(v) if v <= 500.0 => 3,
        Some(v) if v <= 650.0 => 4,
        Some(_) => 5,
    }
}

fn parse_number(caps: &Captures, group: usize) -> Option<f64> {
    caps.get(group)?.as_str().parse::<f64>().ok()
}

fn normalize_unit(raw: &str) -> &'static str {
    let unit = raw.to_lowercase();
    if unit == "ml" {
        "ML"
    } else if unit.starts_with("kg") {
        "KG"
    } else if unit.starts_with('g') {
        "G"
    } else {
        "L"
    }
}

fn to_base_volume(value: f64, unit: &str) -> f64 {
    match unit {
        "L" | "KG" => value * 1000.0,
        _ => value,
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Explicit, user-supplied total order of pack-size labels for one
/// brand/analysis scope. Labels are normalized on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSizeOrder {
    labels: Vec<String>,
}

impl PackSizeOrder {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for label in labels {
            let label = label.as_ref();
            if label.trim().is_empty() {
                continue;
            }
            let label = normalize_label(label);
            if !normalized.contains(&label) {
                normalized.push(label);
            }
        }
        PackSizeOrder { labels: normalized }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        let label = normalize_label(label);
        self.labels.iter().position(|l| *l == label)
    }
}

/// Whether two pack sizes are equal or neighbours.
///
/// With an order, neighbours are at most one position apart; a label missing
/// from the order only matches itself. Without one, the default ranks must be
/// at most one apart and neither may be [`UNKNOWN_RANK`].
pub fn adjacent_or_equal(a: &str, b: &str, order: Option<&PackSizeOrder>) -> bool {
    if let Some(order) = order.filter(|o| !o.is_empty()) {
        return match (order.position(a), order.position(b)) {
            (Some(pa), Some(pb)) => pa.abs_diff(pb) <= 1,
            _ => {
                extract(a).is_some() && extract(b).is_some() && normalize_label(a) == normalize_label(b)
            }
        };
    }

    let (ra, rb) = (rank(a), rank(b));
    if ra == UNKNOWN_RANK || rb == UNKNOWN_RANK {
        return false;
    }
    ra.abs_diff(rb) <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        for pattern in [
            &KEYWORD_PATTERN,
            &RANGE_PATTERN,
            &THRESHOLD_PATTERN,
            &PLUS_PATTERN,
            &SINGLE_PATTERN,
        ] {
            LazyLock::force(pattern);
        }
    }

    fn label(text: &str) -> Option<String> {
        extract(text).map(|p| p.label)
    }

    #[test]
    fn test_keyword_extraction() {
        assert_eq!(label("NTW Sachet").as_deref(), Some("Sachet"));
        assert_eq!(label("Price_Lux sachets").as_deref(), Some("Sachet"));
        assert_eq!(label("Dove Pouch").as_deref(), Some("Pouch"));
        assert_eq!(rank("Sachet"), 1);
        assert_eq!(rank("Pouch"), 1);
    }

    #[test]
    fn test_keyword_wins_over_numbers() {
        assert_eq!(label("Sachet 10ML").as_deref(), Some("Sachet"));
    }

    #[test]
    fn test_range_extraction() {
        assert_eq!(label("NTW 150-250ML").as_deref(), Some("150-250ML"));
        assert_eq!(label("ntw 150 - 250 ml").as_deref(), Some("150-250ML"));
        assert_eq!(label("Lux 150ml-250ml").as_deref(), Some("150-250ML"));
        assert_eq!(label("Brand 251 to 500 ML").as_deref(), Some("251-500ML"));
    }

    #[test]
    fn test_threshold_extraction() {
        assert_eq!(label("NTW >650ML").as_deref(), Some(">650ML"));
        assert_eq!(label("NTW >= 650 ml").as_deref(), Some(">650ML"));
        assert_eq!(label("NTW above 650ml").as_deref(), Some(">650ML"));
        assert_eq!(label("NTW <150ML").as_deref(), Some("<150ML"));
        assert_eq!(label("NTW 650ML+").as_deref(), Some(">650ML"));
    }

    #[test]
    fn test_single_and_litre_extraction() {
        assert_eq!(label("NTW 400ML").as_deref(), Some("400ML"));
        assert_eq!(label("NTW 1 Litre").as_deref(), Some("1L"));
        assert_eq!(label("NTW 1.5L").as_deref(), Some("1.5L"));
        assert_eq!(label("Atta 5kg").as_deref(), Some("5KG"));
    }

    #[test]
    fn test_unknown_is_none() {
        assert_eq!(extract("Region"), None);
        assert_eq!(extract("NTW Family Pack"), None);
        assert_eq!(rank("Family Pack"), UNKNOWN_RANK);
    }

    #[test]
    fn test_extraction_is_stable() {
        let first = extract("NTW 150-250ML").unwrap();
        let again = extract(&first.label).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_default_ranks() {
        assert_eq!(rank("150-250ML"), 2);
        assert_eq!(rank("251-500ML"), 3);
        assert_eq!(rank("501-650ML"), 4);
        assert_eq!(rank(">650ML"), 5);
        assert_eq!(rank("1L"), 5);
        assert_eq!(rank("<150ML"), 2);
    }

    #[test]
    fn test_span_covers_pack_text() {
        let m = extract_with_span("Price NTW 150 - 250 ml").unwrap();
        assert_eq!(&"Price NTW 150 - 250 ml"[m.start..m.end], "150 - 250 ml");
    }

    #[test]
    fn test_adjacency_with_order() {
        let order = PackSizeOrder::new(["Sachet", "150-250ML", "251-500ML"]);
        assert!(adjacent_or_equal("150-250ML", "Sachet", Some(&order)));
        assert!(adjacent_or_equal("150-250ML", "251-500ML", Some(&order)));
        assert!(adjacent_or_equal("150-250ML", "150-250ML", Some(&order)));
        assert!(!adjacent_or_equal("Sachet", "251-500ML", Some(&order)));
        // Labels absent from the order only match themselves.
        assert!(!adjacent_or_equal("150-250ML", "501-650ML", Some(&order)));
        assert!(adjacent_or_equal("501-650ML", "501-650ML", Some(&order)));
    }

    #[test]
    fn test_order_normalizes_user_spelling() {
        let order = PackSizeOrder::new(["sachet", "150 - 250 ml", "  ", "Sachet"]);
        assert_eq!(order.labels(), &["Sachet".to_string(), "150-250ML".to_string()]);
        assert_eq!(order.position("150-250ML"), Some(1));
    }

    #[test]
    fn test_adjacency_with_default_ranks() {
        assert!(adjacent_or_equal("Sachet", "150-250ML", None));
        assert!(adjacent_or_equal("251-500ML", "501-650ML", None));
        assert!(!adjacent_or_equal("Sachet", "251-500ML", None));
        assert!(!adjacent_or_equal("Family Pack", "Family Pack", None));
    }

    #[test]
    fn test_empty_order_falls_back_to_ranks() {
        let order = PackSizeOrder::new(Vec::<String>::new());
        assert!(adjacent_or_equal("Sachet", "150-250ML", Some(&order)));
    }
}
