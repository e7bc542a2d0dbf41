// Query filtering for catalog records

use crate::payload::Payload;
use crate::record::Record;
use eyre::{Result, eyre};
use serde_json::Value;
use std::str::FromStr;

/// Value types a field filter can compare against
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl FieldValue {
    /// Parse a literal: integers and booleans first, anything else is a string
    pub fn parse(s: &str) -> Self {
        if let Ok(i) = s.parse::<i64>() {
            FieldValue::Int(i)
        } else if let Ok(b) = s.parse::<bool>() {
            FieldValue::Bool(b)
        } else {
            FieldValue::String(s.to_string())
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(FieldValue::String(s.clone())),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => n.as_i64().map(FieldValue::Int),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Filter on a decoded payload field
#[derive(Debug, Clone)]
pub struct Filter {
    /// Field name to filter on
    pub field: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Value to compare against
    pub value: FieldValue,
}

/// Comparison operators for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,       // =
    Ne,       // !=
    Gt,       // >
    Lt,       // <
    Gte,      // >=
    Lte,      // <=
    Contains, // ~ (case-insensitive substring)
}

impl FilterOp {
    fn symbol(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
            FilterOp::Contains => "~",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl Filter {
    /// Whether a record satisfies this filter
    ///
    /// Records without a decoded payload never match. The pseudo-field
    /// `trait` tests membership in the champion's normalized traits.
    pub fn matches(&self, record: &Record) -> bool {
        let Some(payload) = record.parsed.as_ref() else {
            return false;
        };

        if self.field == "trait" {
            let FieldValue::String(wanted) = &self.value else {
                return false;
            };
            let declared = payload.traits().iter().any(|t| t == wanted);
            return match self.op {
                FilterOp::Eq => declared,
                FilterOp::Ne => !declared,
                FilterOp::Contains => {
                    let wanted = wanted.to_lowercase();
                    payload.traits().iter().any(|t| t.to_lowercase().contains(&wanted))
                }
                _ => false,
            };
        }

        match field_value(payload, &self.field) {
            Some(actual) => compare(&actual, self.op, &self.value),
            None => false,
        }
    }
}

impl FromStr for Filter {
    type Err = eyre::Report;

    /// Parse `field<op>value`, e.g. `cost>=3`, `role=ADCarry`, `name~jin`
    fn from_str(s: &str) -> Result<Self> {
        const OPS: [(&str, FilterOp); 7] = [
            (">=", FilterOp::Gte),
            ("<=", FilterOp::Lte),
            ("!=", FilterOp::Ne),
            ("=", FilterOp::Eq),
            (">", FilterOp::Gt),
            ("<", FilterOp::Lt),
            ("~", FilterOp::Contains),
        ];

        // Leftmost operator wins; at the same position the longer one does
        let (at, symbol, op) = OPS
            .iter()
            .filter_map(|&(symbol, op)| s.find(symbol).map(|at| (at, symbol, op)))
            .min_by_key(|&(at, symbol, _)| (at, std::cmp::Reverse(symbol.len())))
            .ok_or_else(|| eyre!("Invalid filter: {} (expected field<op>value)", s))?;

        let field = s[..at].trim();
        let value = s[at + symbol.len()..].trim();
        validate_field_name(field)?;
        Ok(Filter {
            field: field.to_string(),
            op,
            value: FieldValue::parse(value),
        })
    }
}

/// Multi-word text query over name, description and id
///
/// A record matches when any word of the query appears in any of those
/// fields, ignoring case. An empty query matches everything.
#[derive(Debug, Clone, Default)]
pub struct TextQuery {
    words: Vec<String>,
}

impl TextQuery {
    pub fn new(query: &str) -> Self {
        Self {
            words: query.to_lowercase().split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        if self.words.is_empty() {
            return true;
        }

        let payload = record.parsed.as_ref();
        let fields = [
            payload.and_then(Payload::name),
            payload.and_then(Payload::description),
            Some(record.id.as_str()),
        ];

        self.words.iter().any(|word| {
            fields
                .iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(word.as_str()))
        })
    }
}

/// Resolve a filterable field on a payload
fn field_value(payload: &Payload, field: &str) -> Option<FieldValue> {
    match field {
        "name" => payload.name().map(|s| FieldValue::String(s.to_string())),
        "desc" | "description" => payload.description().map(|s| FieldValue::String(s.to_string())),
        "cost" => payload.cost().map(|c| FieldValue::Int(i64::from(c))),
        "role" => payload.role().map(|s| FieldValue::String(s.to_string())),
        other => payload.extra().get(other).and_then(FieldValue::from_json),
    }
}

fn compare(actual: &FieldValue, op: FilterOp, expected: &FieldValue) -> bool {
    use std::cmp::Ordering;

    if op == FilterOp::Contains {
        return actual
            .to_string()
            .to_lowercase()
            .contains(&expected.to_string().to_lowercase());
    }

    let ordering = match (actual, expected) {
        (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
        (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
        (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
        // Mixed types only support (in)equality on their text form
        (a, b) => {
            let equal = a.to_string() == b.to_string();
            return match op {
                FilterOp::Eq => equal,
                FilterOp::Ne => !equal,
                _ => false,
            };
        }
    };

    match op {
        FilterOp::Eq => ordering == Ordering::Equal,
        FilterOp::Ne => ordering != Ordering::Equal,
        FilterOp::Gt => ordering == Ordering::Greater,
        FilterOp::Lt => ordering == Ordering::Less,
        FilterOp::Gte => ordering != Ordering::Less,
        FilterOp::Lte => ordering != Ordering::Greater,
        FilterOp::Contains => false,
    }
}

fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(eyre!("Field name cannot be empty"));
    }
    if name.len() > 64 {
        return Err(eyre!("Field name too long: {} (max 64 chars)", name));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(eyre!("Invalid field name: {} (must be alphanumeric with _)", name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::decode_records;
    use crate::record::Collection;

    fn champions() -> Vec<Record> {
        let (records, _) = decode_records(vec![
            Record::new(
                Collection::Champions,
                "TFT14_Jinx",
                r#"{"name":"Jinx","cost":5,"role":"ADCarry","traits":["Golden Ox","Marksman"],"tier":"S"}"#,
            ),
            Record::new(
                Collection::Champions,
                "TFT14_Vi",
                r#"{"name":"Vi","cost":"2","role":"ADFighter","traits":["Cypher","Bruiser"],"tier":"B"}"#,
            ),
            Record::new(Collection::Champions, "TFT14_Broken", "oops"),
        ]);
        records
    }

    fn filter(s: &str) -> Filter {
        s.parse().unwrap()
    }

    fn matching(records: &[Record], f: &Filter) -> Vec<String> {
        records.iter().filter(|r| f.matches(r)).map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_filter_parse() {
        let f = filter("cost>=3");
        assert_eq!(f.field, "cost");
        assert_eq!(f.op, FilterOp::Gte);
        assert_eq!(f.value, FieldValue::Int(3));

        let f = filter("role != ADCarry");
        assert_eq!(f.op, FilterOp::Ne);
        assert_eq!(f.value, FieldValue::String("ADCarry".to_string()));

        assert_eq!(filter("name~jin").op, FilterOp::Contains);
        assert_eq!(filter("active=true").value, FieldValue::Bool(true));
    }

    #[test]
    fn test_filter_parse_operator_chars_in_value() {
        let f = filter("name~a=b");
        assert_eq!(f.field, "name");
        assert_eq!(f.op, FilterOp::Contains);
        assert_eq!(f.value, FieldValue::String("a=b".to_string()));

        let f = filter("desc~>50%");
        assert_eq!(f.field, "desc");
        assert_eq!(f.op, FilterOp::Contains);
        assert_eq!(f.value, FieldValue::String(">50%".to_string()));

        let f = filter("role=<none>");
        assert_eq!(f.op, FilterOp::Eq);
        assert_eq!(f.value, FieldValue::String("<none>".to_string()));

        assert_eq!(filter("cost<=2").op, FilterOp::Lte);
    }

    #[test]
    fn test_filter_parse_invalid() {
        assert!("cost".parse::<Filter>().is_err());
        assert!("=3".parse::<Filter>().is_err());
        assert!("bad-field=3".parse::<Filter>().is_err());
    }

    #[test]
    fn test_filter_op_display() {
        assert_eq!(FilterOp::Eq.to_string(), "=");
        assert_eq!(FilterOp::Lte.to_string(), "<=");
        assert_eq!(FilterOp::Contains.to_string(), "~");
    }

    #[test]
    fn test_filter_numeric() {
        let records = champions();
        assert_eq!(matching(&records, &filter("cost>=3")), vec!["TFT14_Jinx"]);
        assert_eq!(matching(&records, &filter("cost<3")), vec!["TFT14_Vi"]);
        assert_eq!(matching(&records, &filter("cost!=5")), vec!["TFT14_Vi"]);
    }

    #[test]
    fn test_filter_string_and_extra() {
        let records = champions();
        assert_eq!(matching(&records, &filter("role=ADFighter")), vec!["TFT14_Vi"]);
        assert_eq!(matching(&records, &filter("name~JIN")), vec!["TFT14_Jinx"]);
        assert_eq!(matching(&records, &filter("tier=S")), vec!["TFT14_Jinx"]);
        assert!(matching(&records, &filter("missing=1")).is_empty());
    }

    #[test]
    fn test_filter_trait() {
        let records = champions();
        assert_eq!(matching(&records, &filter("trait=Marksman")), vec!["TFT14_Jinx"]);
        assert_eq!(matching(&records, &filter("trait!=Marksman")), vec!["TFT14_Vi"]);
        assert_eq!(matching(&records, &filter("trait~ox")), vec!["TFT14_Jinx"]);
    }

    #[test]
    fn test_text_query() {
        let records = champions();

        let all: Vec<_> = records.iter().filter(|r| TextQuery::new("  ").matches(r)).collect();
        assert_eq!(all.len(), 3);

        let q = TextQuery::new("vi nothing");
        let hits: Vec<_> = records.iter().filter(|r| q.matches(r)).map(|r| r.id.as_str()).collect();
        assert_eq!(hits, vec!["TFT14_Vi"]);

        // Undecoded records still match on their id
        let q = TextQuery::new("broken");
        let hits: Vec<_> = records.iter().filter(|r| q.matches(r)).map(|r| r.id.as_str()).collect();
        assert_eq!(hits, vec!["TFT14_Broken"]);
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::String("test".to_string()).to_string(), "test");
        assert_eq!(FieldValue::Int(42).to_string(), "42");
        assert_eq!(FieldValue::Bool(true).to_string(), "true");
    }
}
