/// Filter Model Translation
///
/// Converts between the grid widget's filter model (one entry per column,
/// tagged by filter kind) and the normalized filter tuples the remote data
/// service understands:
///
/// ```text
/// {"filterType": "text", "type": "contains", "filter": "alpha"}
///     <=>  ["name", "like", "%alpha%"]
/// ```
///
/// Translation never fails. A malformed entry still yields a usable tuple
/// (a wildcard `like` on whatever text it carried) so one bad filter cannot
/// abort a page load.
///
/// # Examples
///
/// ```
/// use livegrid::filter::{to_filter_tuple, to_filter_model_entry, FilterKind, FilterModelEntry};
/// use serde_json::json;
///
/// let entry = FilterModelEntry::from_json(&json!({
///     "filterType": "text", "type": "contains", "filter": "alpha"
/// }));
/// let tuple = to_filter_tuple("name", &entry);
/// assert_eq!(serde_json::to_value(&tuple).unwrap(), json!(["name", "like", "%alpha%"]));
///
/// let decoded = to_filter_model_entry(&tuple, FilterKind::Text);
/// assert_eq!(decoded, entry);
/// ```

use crate::column::ColumnDef;
use crate::value::Scalar;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Pattern wildcard understood by the remote `like` operator
pub const WILDCARD: char = '%';

/// Sentinel value meaning "field has no value"
pub const NOT_SET: &str = "not set";

/// Counterpart of [`NOT_SET`] for the `is` operator
pub const SET: &str = "set";

// ============================================================================
// Filter tuples
// ============================================================================

/// Logical filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Between,
    In,
    NotIn,
    IsBlank,
    IsNotBlank,
}

impl Operator {
    /// Operator token sent to the remote service.
    ///
    /// The pattern operators share `like`; which one is meant is carried by
    /// where the wildcards sit in the value.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::Contains | Operator::StartsWith | Operator::EndsWith => "like",
            Operator::NotContains => "not like",
            Operator::LessThan => "<",
            Operator::LessOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Between => "between",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::IsBlank | Operator::IsNotBlank => "is",
        }
    }

    /// Resolve a wire token, using the value to disambiguate `like` and `is`.
    pub fn from_wire(token: &str, value: &JsonValue) -> Option<Operator> {
        let op = match token.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Operator::Equals,
            "!=" | "<>" => Operator::NotEquals,
            "like" => {
                let text = value.as_str().unwrap_or("");
                let leading = text.starts_with(WILDCARD);
                let trailing = text.ends_with(WILDCARD);
                match (leading, trailing) {
                    (false, true) => Operator::StartsWith,
                    (true, false) => Operator::EndsWith,
                    _ => Operator::Contains,
                }
            }
            "not like" => Operator::NotContains,
            "<" => Operator::LessThan,
            "<=" => Operator::LessOrEqual,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterOrEqual,
            "between" => Operator::Between,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "is" => {
                if value.as_str() == Some(SET) {
                    Operator::IsNotBlank
                } else {
                    Operator::IsBlank
                }
            }
            _ => return None,
        };
        Some(op)
    }

    /// True for the wildcard-pattern operators
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Operator::Contains | Operator::NotContains | Operator::StartsWith | Operator::EndsWith
        )
    }

    pub fn all() -> &'static [Operator] {
        &[
            Operator::Equals,
            Operator::NotEquals,
            Operator::Contains,
            Operator::NotContains,
            Operator::StartsWith,
            Operator::EndsWith,
            Operator::LessThan,
            Operator::LessOrEqual,
            Operator::GreaterThan,
            Operator::GreaterOrEqual,
            Operator::Between,
            Operator::In,
            Operator::NotIn,
            Operator::IsBlank,
            Operator::IsNotBlank,
        ]
    }
}

/// Value side of a filter tuple
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Range(Scalar, Scalar),
}

impl FilterValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            FilterValue::Scalar(v) => v.to_json(),
            FilterValue::List(items) => JsonValue::Array(items.iter().map(Scalar::to_json).collect()),
            FilterValue::Range(from, to) => JsonValue::Array(vec![from.to_json(), to.to_json()]),
        }
    }

    /// First scalar of the value (the lower bound of a range)
    pub fn first(&self) -> Scalar {
        match self {
            FilterValue::Scalar(v) => v.clone(),
            FilterValue::List(items) => items.first().cloned().unwrap_or_default(),
            FilterValue::Range(from, _) => from.clone(),
        }
    }

    /// Every scalar in the value, in order
    pub fn items(&self) -> Vec<Scalar> {
        match self {
            FilterValue::Scalar(v) => vec![v.clone()],
            FilterValue::List(items) => items.clone(),
            FilterValue::Range(from, to) => vec![from.clone(), to.clone()],
        }
    }
}

/// Normalized `(field, operator, value)` filter.
///
/// Serialized as a 3-element JSON array, or a 4-element one when the filter
/// targets a child entity: `["Task Item", "qty", ">", 2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTuple {
    pub entity: Option<String>,
    pub field: String,
    pub operator: Operator,
    pub value: FilterValue,
}

impl FilterTuple {
    /// Build a tuple, coercing the value into the shape the operator requires:
    /// `between` always gets a range and `in`/`not in` always get a list.
    pub fn new(field: impl Into<String>, operator: Operator, value: FilterValue) -> Self {
        let value = match (operator, value) {
            (Operator::Between, FilterValue::Scalar(v)) => FilterValue::Range(v.clone(), v),
            (Operator::Between, FilterValue::List(items)) => {
                let from = items.first().cloned().unwrap_or_default();
                let to = items.get(1).cloned().unwrap_or_else(|| from.clone());
                FilterValue::Range(from, to)
            }
            (Operator::In | Operator::NotIn, FilterValue::Scalar(v)) => FilterValue::List(vec![v]),
            (Operator::In | Operator::NotIn, FilterValue::Range(from, to)) => {
                FilterValue::List(vec![from, to])
            }
            (Operator::IsBlank, _) => FilterValue::Scalar(Scalar::from(NOT_SET)),
            (Operator::IsNotBlank, _) => FilterValue::Scalar(Scalar::from(SET)),
            (_, value) => value,
        };
        FilterTuple {
            entity: None,
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        FilterTuple::new(field, Operator::Equals, FilterValue::Scalar(value.into()))
    }

    /// Scope the tuple to a child entity (serialized as a 4-element tuple)
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Rebuild a tuple from its JSON parts; `None` when the shape is unusable.
    pub fn from_json(value: &JsonValue) -> Option<FilterTuple> {
        let parts = value.as_array()?;
        let (entity, rest) = match parts.len() {
            3 => (None, &parts[..]),
            4 => (parts[0].as_str().map(str::to_string), &parts[1..]),
            _ => return None,
        };
        let field = rest[0].as_str()?.to_string();
        let token = rest[1].as_str()?;
        let raw = &rest[2];
        let operator = Operator::from_wire(token, raw)?;

        let value = match raw {
            JsonValue::Array(items) => FilterValue::List(items.iter().map(Scalar::from_json).collect()),
            JsonValue::String(s) if matches!(operator, Operator::In | Operator::NotIn) => {
                FilterValue::List(split_list(s))
            }
            other => FilterValue::Scalar(Scalar::from_json(other)),
        };

        let mut tuple = FilterTuple::new(field, operator, value);
        tuple.entity = entity;
        Some(tuple)
    }
}

impl Serialize for FilterTuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.entity.is_some() { 4 } else { 3 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        if let Some(entity) = &self.entity {
            seq.serialize_element(entity)?;
        }
        seq.serialize_element(&self.field)?;
        seq.serialize_element(self.operator.wire_name())?;
        seq.serialize_element(&self.value.to_json())?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for FilterTuple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        FilterTuple::from_json(&value)
            .ok_or_else(|| de::Error::custom(format!("invalid filter tuple: {}", value)))
    }
}

/// Insert `tuple`, replacing any existing tuple for the same field and entity.
pub fn merge_tuple(filters: &mut Vec<FilterTuple>, tuple: FilterTuple) {
    filters.retain(|f| !(f.field == tuple.field && f.entity == tuple.entity));
    filters.push(tuple);
}

/// Deserialize a tuple list, skipping entries that no longer parse.
pub fn deserialize_tuples_lenient<'de, D>(deserializer: D) -> Result<Vec<FilterTuple>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<JsonValue>::deserialize(deserializer)?;
    Ok(raw
        .iter()
        .filter_map(|item| {
            let tuple = FilterTuple::from_json(item);
            if tuple.is_none() {
                log::warn!("dropping unreadable filter tuple {}", item);
            }
            tuple
        })
        .collect())
}

// ============================================================================
// Widget filter model
// ============================================================================

/// Widget-side filter kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Text,
    Number,
    Date,
    Link,
    Set,
    Check,
}

impl FilterKind {
    /// Map a column's configured filter name to a kind. Unrecognized names
    /// filter as text.
    pub fn from_widget_name(name: &str) -> FilterKind {
        match name {
            "text" | "agTextColumnFilter" => FilterKind::Text,
            "number" | "agNumberColumnFilter" => FilterKind::Number,
            "date" | "agDateColumnFilter" => FilterKind::Date,
            "set" | "agSetColumnFilter" => FilterKind::Set,
            "link" => FilterKind::Link,
            "check" => FilterKind::Check,
            other => {
                log::debug!("unknown filter kind '{}', filtering as text", other);
                FilterKind::Text
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Text => "text",
            FilterKind::Number => "number",
            FilterKind::Date => "date",
            FilterKind::Link => "link",
            FilterKind::Set => "set",
            FilterKind::Check => "check",
        }
    }
}

/// The `type` sub-discriminant of a filter model entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionType {
    Equals,
    NotEqual,
    #[serde(alias = "like")]
    Contains,
    #[serde(alias = "notLike")]
    NotContains,
    StartsWith,
    EndsWith,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    #[serde(alias = "between")]
    InRange,
    In,
    NotIn,
    Blank,
    NotBlank,
}

/// Date filters use the same condition set as number filters
pub type DateConditionType = ConditionType;

impl ConditionType {
    pub fn operator(&self) -> Operator {
        match self {
            ConditionType::Equals => Operator::Equals,
            ConditionType::NotEqual => Operator::NotEquals,
            ConditionType::Contains => Operator::Contains,
            ConditionType::NotContains => Operator::NotContains,
            ConditionType::StartsWith => Operator::StartsWith,
            ConditionType::EndsWith => Operator::EndsWith,
            ConditionType::LessThan => Operator::LessThan,
            ConditionType::LessThanOrEqual => Operator::LessOrEqual,
            ConditionType::GreaterThan => Operator::GreaterThan,
            ConditionType::GreaterThanOrEqual => Operator::GreaterOrEqual,
            ConditionType::InRange => Operator::Between,
            ConditionType::In => Operator::In,
            ConditionType::NotIn => Operator::NotIn,
            ConditionType::Blank => Operator::IsBlank,
            ConditionType::NotBlank => Operator::IsNotBlank,
        }
    }

    pub fn from_operator(operator: Operator) -> ConditionType {
        match operator {
            Operator::Equals => ConditionType::Equals,
            Operator::NotEquals => ConditionType::NotEqual,
            Operator::Contains => ConditionType::Contains,
            Operator::NotContains => ConditionType::NotContains,
            Operator::StartsWith => ConditionType::StartsWith,
            Operator::EndsWith => ConditionType::EndsWith,
            Operator::LessThan => ConditionType::LessThan,
            Operator::LessOrEqual => ConditionType::LessThanOrEqual,
            Operator::GreaterThan => ConditionType::GreaterThan,
            Operator::GreaterOrEqual => ConditionType::GreaterThanOrEqual,
            Operator::Between => ConditionType::InRange,
            Operator::In => ConditionType::In,
            Operator::NotIn => ConditionType::NotIn,
            Operator::IsBlank => ConditionType::Blank,
            Operator::IsNotBlank => ConditionType::NotBlank,
        }
    }

    fn is_blank_check(&self) -> bool {
        matches!(self, ConditionType::Blank | ConditionType::NotBlank)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextFilter {
    #[serde(rename = "type")]
    pub condition: ConditionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for TextFilter {
    fn default() -> Self {
        TextFilter {
            condition: ConditionType::Contains,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFilter {
    #[serde(rename = "type")]
    pub condition: ConditionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Scalar>,
    #[serde(rename = "filterTo", skip_serializing_if = "Option::is_none")]
    pub filter_to: Option<Scalar>,
}

impl Default for NumberFilter {
    fn default() -> Self {
        NumberFilter {
            condition: ConditionType::Equals,
            filter: None,
            filter_to: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateFilter {
    #[serde(rename = "type")]
    pub condition: DateConditionType,
    #[serde(rename = "dateFrom", skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(rename = "dateTo", skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

impl Default for DateFilter {
    fn default() -> Self {
        DateFilter {
            condition: ConditionType::Equals,
            date_from: None,
            date_to: None,
        }
    }
}

/// Link filter: selected document keys live under `filter`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkFilter {
    #[serde(rename = "type")]
    pub condition: ConditionType,
    #[serde(deserialize_with = "deserialize_string_list")]
    pub filter: Vec<String>,
}

impl Default for LinkFilter {
    fn default() -> Self {
        LinkFilter {
            condition: ConditionType::Equals,
            filter: Vec::new(),
        }
    }
}

/// Set filter: selected values live under `values`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetFilter {
    #[serde(deserialize_with = "deserialize_string_list")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckFilter {
    pub filter: Scalar,
}

/// One column's filter as the widget represents it
#[derive(Debug, Clone, PartialEq)]
pub enum FilterModelEntry {
    Text(TextFilter),
    Number(NumberFilter),
    Date(DateFilter),
    Link(LinkFilter),
    Set(SetFilter),
    Check(CheckFilter),
    /// A kind this crate does not know; filtered as a wildcard `like`
    Unknown { filter_type: String, filter: String },
}

impl FilterModelEntry {
    pub fn text(condition: ConditionType, filter: impl Into<String>) -> Self {
        FilterModelEntry::Text(TextFilter {
            condition,
            filter: Some(filter.into()),
        })
    }

    pub fn kind(&self) -> Option<FilterKind> {
        match self {
            FilterModelEntry::Text(_) => Some(FilterKind::Text),
            FilterModelEntry::Number(_) => Some(FilterKind::Number),
            FilterModelEntry::Date(_) => Some(FilterKind::Date),
            FilterModelEntry::Link(_) => Some(FilterKind::Link),
            FilterModelEntry::Set(_) => Some(FilterKind::Set),
            FilterModelEntry::Check(_) => Some(FilterKind::Check),
            FilterModelEntry::Unknown { .. } => None,
        }
    }

    pub fn to_tuple(&self, field: &str) -> FilterTuple {
        to_filter_tuple(field, self)
    }

    /// Best-effort decode of a widget entry. Never fails: malformed entries of
    /// a known kind and entries of unknown kinds both become `Unknown`.
    pub fn from_json(value: &JsonValue) -> FilterModelEntry {
        // Combined conditions: keep the first one
        if let Some(first) = value
            .get("conditions")
            .and_then(JsonValue::as_array)
            .and_then(|c| c.first())
        {
            let mut condition = first.clone();
            if let (Some(obj), Some(kind)) = (condition.as_object_mut(), value.get("filterType")) {
                obj.entry("filterType").or_insert_with(|| kind.clone());
            }
            return FilterModelEntry::from_json(&condition);
        }

        let filter_type = value
            .get("filterType")
            .and_then(JsonValue::as_str)
            .unwrap_or("")
            .to_string();

        let parsed = match filter_type.as_str() {
            "text" => serde_json::from_value(value.clone()).map(FilterModelEntry::Text),
            "number" => serde_json::from_value(value.clone()).map(FilterModelEntry::Number),
            "date" => serde_json::from_value(value.clone()).map(FilterModelEntry::Date),
            "link" => serde_json::from_value(value.clone()).map(FilterModelEntry::Link),
            "set" => serde_json::from_value(value.clone()).map(FilterModelEntry::Set),
            "check" => serde_json::from_value(value.clone()).map(FilterModelEntry::Check),
            _ => return FilterModelEntry::unknown(filter_type, value),
        };

        parsed.unwrap_or_else(|err| {
            log::warn!("malformed {} filter entry ({}), falling back to like", filter_type, err);
            FilterModelEntry::unknown(filter_type, value)
        })
    }

    fn unknown(filter_type: String, value: &JsonValue) -> FilterModelEntry {
        let filter = value
            .get("filter")
            .or_else(|| value.get("values").and_then(|v| v.get(0)))
            .or_else(|| value.get("dateFrom"))
            .map(|v| match v {
                JsonValue::Array(items) => items.first().map(Scalar::from_json).unwrap_or_default().to_text(),
                other => Scalar::from_json(other).to_text(),
            })
            .unwrap_or_default();
        FilterModelEntry::Unknown { filter_type, filter }
    }

    pub fn to_json(&self) -> JsonValue {
        let (kind, body) = match self {
            FilterModelEntry::Text(f) => ("text", serde_json::to_value(f)),
            FilterModelEntry::Number(f) => ("number", serde_json::to_value(f)),
            FilterModelEntry::Date(f) => ("date", serde_json::to_value(f)),
            FilterModelEntry::Link(f) => ("link", serde_json::to_value(f)),
            FilterModelEntry::Set(f) => ("set", serde_json::to_value(f)),
            FilterModelEntry::Check(f) => ("check", serde_json::to_value(f)),
            FilterModelEntry::Unknown { filter_type, filter } => {
                let mut map = Map::new();
                map.insert("filterType".to_string(), JsonValue::String(filter_type.clone()));
                map.insert("filter".to_string(), JsonValue::String(filter.clone()));
                return JsonValue::Object(map);
            }
        };
        let mut map = match body {
            Ok(JsonValue::Object(map)) => map,
            _ => Map::new(),
        };
        map.insert("filterType".to_string(), JsonValue::String(kind.to_string()));
        JsonValue::Object(map)
    }
}

impl Serialize for FilterModelEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterModelEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(FilterModelEntry::from_json(&value))
    }
}

// ============================================================================
// Translation
// ============================================================================

/// Encode one widget filter entry as a filter tuple.
pub fn to_filter_tuple(field: &str, entry: &FilterModelEntry) -> FilterTuple {
    match entry {
        FilterModelEntry::Text(f) => {
            let value = f.filter.clone().map(Scalar::String).unwrap_or_default();
            encode_condition(field, f.condition, value, None)
        }
        FilterModelEntry::Number(f) => encode_condition(
            field,
            f.condition,
            f.filter.clone().unwrap_or_default(),
            f.filter_to.clone(),
        ),
        FilterModelEntry::Date(f) => encode_condition(
            field,
            f.condition,
            f.date_from.clone().map(Scalar::String).unwrap_or_default(),
            f.date_to.clone().map(Scalar::String),
        ),
        FilterModelEntry::Link(f) if f.filter.is_empty() => {
            log::debug!("link filter on '{}' has no values, filtering with a wildcard like", field);
            FilterTuple::new(field, Operator::Contains, FilterValue::Scalar(wrap("", true, true)))
        }
        FilterModelEntry::Link(f) => {
            let negate = matches!(f.condition, ConditionType::NotEqual | ConditionType::NotIn);
            encode_value_list(field, &f.filter, negate)
        }
        FilterModelEntry::Set(f) => encode_value_list(field, &f.values, false),
        FilterModelEntry::Check(f) => {
            let checked = f.filter.as_bool().unwrap_or(false);
            FilterTuple::equals(field, Scalar::Int(checked as i64))
        }
        FilterModelEntry::Unknown { filter_type, filter } => {
            log::debug!("filtering '{}' ({}) with a wildcard like", field, filter_type);
            FilterTuple::new(field, Operator::Contains, FilterValue::Scalar(wrap(filter, true, true)))
        }
    }
}

/// Decode a filter tuple back into the entry shape of the column's widget kind.
pub fn to_filter_model_entry(tuple: &FilterTuple, kind: FilterKind) -> FilterModelEntry {
    let condition = ConditionType::from_operator(tuple.operator);
    let blank = condition.is_blank_check();

    match kind {
        FilterKind::Text => {
            let filter = if blank {
                None
            } else {
                Some(match &tuple.value {
                    FilterValue::List(items) => join_list(items),
                    value if tuple.operator.is_pattern() => strip_wildcards(&value.first().to_text()),
                    value => value.first().to_text(),
                })
            };
            FilterModelEntry::Text(TextFilter { condition, filter })
        }
        FilterKind::Number => {
            let (filter, filter_to) = decode_bounds(tuple, blank);
            FilterModelEntry::Number(NumberFilter {
                condition,
                filter,
                filter_to,
            })
        }
        FilterKind::Date => {
            let (from, to) = decode_bounds(tuple, blank);
            FilterModelEntry::Date(DateFilter {
                condition,
                date_from: from.map(|v| v.to_text()),
                date_to: to.map(|v| v.to_text()),
            })
        }
        FilterKind::Link => {
            let condition = match tuple.operator {
                Operator::In => ConditionType::In,
                Operator::NotIn => ConditionType::NotIn,
                Operator::NotEquals | Operator::IsNotBlank => ConditionType::NotEqual,
                _ => ConditionType::Equals,
            };
            FilterModelEntry::Link(LinkFilter {
                condition,
                filter: decode_value_list(tuple),
            })
        }
        FilterKind::Set => FilterModelEntry::Set(SetFilter {
            values: decode_value_list(tuple),
        }),
        FilterKind::Check => FilterModelEntry::Check(CheckFilter {
            filter: Scalar::Bool(tuple.value.first().as_bool().unwrap_or(false)),
        }),
    }
}

fn encode_condition(
    field: &str,
    condition: ConditionType,
    value: Scalar,
    value_to: Option<Scalar>,
) -> FilterTuple {
    let operator = condition.operator();
    let text = value.to_text();
    let value = match operator {
        Operator::Contains | Operator::NotContains => FilterValue::Scalar(wrap(&text, true, true)),
        Operator::StartsWith => FilterValue::Scalar(wrap(&text, false, true)),
        Operator::EndsWith => FilterValue::Scalar(wrap(&text, true, false)),
        Operator::Between => {
            let to = value_to.unwrap_or_else(|| value.clone());
            FilterValue::Range(value, to)
        }
        Operator::In | Operator::NotIn => match &value {
            Scalar::String(s) => FilterValue::List(split_list(s)),
            other => FilterValue::List(vec![other.clone()]),
        },
        _ => FilterValue::Scalar(value),
    };
    FilterTuple::new(field, operator, value)
}

/// Shared by link and set filters: one value is an equality, several are
/// a membership test, and a lone "not set" is a blank check.
fn encode_value_list(field: &str, values: &[String], negate: bool) -> FilterTuple {
    if values.len() == 1 && values[0] == NOT_SET {
        let operator = if negate { Operator::IsNotBlank } else { Operator::IsBlank };
        return FilterTuple::new(field, operator, FilterValue::Scalar(Scalar::Null));
    }
    if values.len() == 1 {
        let operator = if negate { Operator::NotEquals } else { Operator::Equals };
        return FilterTuple::new(field, operator, FilterValue::Scalar(Scalar::from(values[0].as_str())));
    }
    let operator = if negate { Operator::NotIn } else { Operator::In };
    let items = values.iter().map(|v| Scalar::from(v.as_str())).collect();
    FilterTuple::new(field, operator, FilterValue::List(items))
}

fn decode_value_list(tuple: &FilterTuple) -> Vec<String> {
    match tuple.operator {
        Operator::IsBlank | Operator::IsNotBlank => vec![NOT_SET.to_string()],
        op if op.is_pattern() => vec![strip_wildcards(&tuple.value.first().to_text())],
        _ => tuple.value.items().iter().map(Scalar::to_text).collect(),
    }
}

fn decode_bounds(tuple: &FilterTuple, blank: bool) -> (Option<Scalar>, Option<Scalar>) {
    if blank {
        return (None, None);
    }
    match &tuple.value {
        FilterValue::Range(from, to) => (Some(from.clone()), Some(to.clone())),
        FilterValue::List(items) => (Some(Scalar::String(join_list(items))), None),
        FilterValue::Scalar(v) if tuple.operator.is_pattern() => {
            (Some(Scalar::String(strip_wildcards(&v.to_text()))), None)
        }
        FilterValue::Scalar(v) => (Some(v.clone()), None),
    }
}

fn wrap(text: &str, leading: bool, trailing: bool) -> Scalar {
    let core = strip_wildcards(text);
    let mut out = String::with_capacity(core.len() + 2);
    if leading {
        out.push(WILDCARD);
    }
    out.push_str(&core);
    if trailing {
        out.push(WILDCARD);
    }
    Scalar::String(out)
}

/// Remove every wildcard marker, including ones embedded in the value.
pub fn strip_wildcards(text: &str) -> String {
    text.chars().filter(|c| *c != WILDCARD).collect()
}

/// Split a comma-separated input into trimmed, non-empty items
pub fn split_list(text: &str) -> Vec<Scalar> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Scalar::from)
        .collect()
}

fn join_list(items: &[Scalar]) -> String {
    items.iter().map(Scalar::to_text).collect::<Vec<_>>().join(",")
}

fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    let item_text = |v: &JsonValue| match v {
        JsonValue::Null => NOT_SET.to_string(),
        other => Scalar::from_json(other).to_text(),
    };
    Ok(match &value {
        JsonValue::Array(items) => items.iter().map(item_text).collect(),
        JsonValue::Null => Vec::new(),
        other => vec![item_text(other)],
    })
}

// ============================================================================
// Filter model
// ============================================================================

/// The widget's active filters, keyed by column field. A field holds at most
/// one entry; setting it again replaces the previous one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterModel {
    entries: BTreeMap<String, FilterModelEntry>,
}

impl FilterModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, entry: FilterModelEntry) {
        self.entries.insert(field.into(), entry);
    }

    pub fn remove(&mut self, field: &str) -> Option<FilterModelEntry> {
        self.entries.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&FilterModelEntry> {
        self.entries.get(field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterModelEntry)> {
        self.entries.iter()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|field, _| keep(field));
    }

    /// Translate every entry to a tuple, one per field
    pub fn to_tuples(&self) -> Vec<FilterTuple> {
        self.entries
            .iter()
            .map(|(field, entry)| to_filter_tuple(field, entry))
            .collect()
    }

    /// Rebuild a model from tuples, taking each field's kind from `columns`.
    /// Fields with no column filter as text; child-entity tuples are skipped.
    pub fn from_tuples(tuples: &[FilterTuple], columns: &[ColumnDef]) -> FilterModel {
        Self::from_tuples_with(tuples, |field| {
            columns
                .iter()
                .find(|c| c.field == field)
                .map(|c| c.filter)
                .unwrap_or_default()
        })
    }

    pub fn from_tuples_with(tuples: &[FilterTuple], kind_of: impl Fn(&str) -> FilterKind) -> FilterModel {
        let mut model = FilterModel::new();
        for tuple in tuples.iter().filter(|t| t.entity.is_none()) {
            let entry = to_filter_model_entry(tuple, kind_of(&tuple.field));
            model.set(tuple.field.clone(), entry);
        }
        model
    }
}

impl FromIterator<(String, FilterModelEntry)> for FilterModel {
    fn from_iter<I: IntoIterator<Item = (String, FilterModelEntry)>>(iter: I) -> Self {
        let mut model = FilterModel::new();
        for (field, entry) in iter {
            model.set(field, entry);
        }
        model
    }
}

impl Serialize for FilterModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<String, FilterModelEntry>::deserialize(deserializer)?;
        Ok(FilterModel { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(entry: FilterModelEntry, kind: FilterKind) {
        let tuple = to_filter_tuple("f", &entry);
        let decoded = to_filter_model_entry(&tuple, kind);
        assert_eq!(decoded, entry, "decode(encode) changed the entry for {:?}", tuple);
        assert_eq!(to_filter_tuple("f", &decoded), tuple);
    }

    #[test]
    fn test_text_roundtrips() {
        roundtrip(FilterModelEntry::text(ConditionType::Contains, "alpha"), FilterKind::Text);
        roundtrip(FilterModelEntry::text(ConditionType::Equals, "alpha"), FilterKind::Text);
        roundtrip(FilterModelEntry::text(ConditionType::StartsWith, "al"), FilterKind::Text);
        roundtrip(FilterModelEntry::text(ConditionType::EndsWith, "ha"), FilterKind::Text);
        roundtrip(FilterModelEntry::text(ConditionType::In, "a,b"), FilterKind::Text);
        roundtrip(
            FilterModelEntry::Text(TextFilter {
                condition: ConditionType::Blank,
                filter: None,
            }),
            FilterKind::Text,
        );
    }

    #[test]
    fn test_number_and_date_roundtrips() {
        roundtrip(
            FilterModelEntry::Number(NumberFilter {
                condition: ConditionType::InRange,
                filter: Some(Scalar::Int(1)),
                filter_to: Some(Scalar::Int(5)),
            }),
            FilterKind::Number,
        );
        roundtrip(
            FilterModelEntry::Number(NumberFilter {
                condition: ConditionType::Equals,
                filter: Some(Scalar::Float(2.5)),
                filter_to: None,
            }),
            FilterKind::Number,
        );
        roundtrip(
            FilterModelEntry::Number(NumberFilter {
                condition: ConditionType::NotBlank,
                filter: None,
                filter_to: None,
            }),
            FilterKind::Number,
        );
        roundtrip(
            FilterModelEntry::Date(DateFilter {
                condition: ConditionType::InRange,
                date_from: Some("2024-01-01".to_string()),
                date_to: Some("2024-01-31".to_string()),
            }),
            FilterKind::Date,
        );
    }

    #[test]
    fn test_link_set_check_roundtrips() {
        roundtrip(
            FilterModelEntry::Link(LinkFilter {
                condition: ConditionType::Equals,
                filter: vec!["HR".to_string()],
            }),
            FilterKind::Link,
        );
        roundtrip(
            FilterModelEntry::Link(LinkFilter {
                condition: ConditionType::NotIn,
                filter: vec!["HR".to_string(), "Sales".to_string()],
            }),
            FilterKind::Link,
        );
        roundtrip(
            FilterModelEntry::Link(LinkFilter {
                condition: ConditionType::In,
                filter: vec!["a".to_string(), "b".to_string()],
            }),
            FilterKind::Link,
        );
        roundtrip(
            FilterModelEntry::Link(LinkFilter {
                condition: ConditionType::Equals,
                filter: vec![NOT_SET.to_string()],
            }),
            FilterKind::Link,
        );
        roundtrip(
            FilterModelEntry::Set(SetFilter {
                values: vec!["Open".to_string(), "Closed".to_string()],
            }),
            FilterKind::Set,
        );
        roundtrip(
            FilterModelEntry::Check(CheckFilter {
                filter: Scalar::Bool(true),
            }),
            FilterKind::Check,
        );
    }

    #[test]
    fn test_wire_shapes() {
        let between = to_filter_tuple(
            "qty",
            &FilterModelEntry::Number(NumberFilter {
                condition: ConditionType::InRange,
                filter: Some(Scalar::Int(1)),
                filter_to: Some(Scalar::Int(9)),
            }),
        );
        assert_eq!(serde_json::to_value(&between).unwrap(), json!(["qty", "between", [1, 9]]));

        let in_list = to_filter_tuple("tag", &FilterModelEntry::text(ConditionType::In, " a, b ,,c "));
        assert_eq!(serde_json::to_value(&in_list).unwrap(), json!(["tag", "in", ["a", "b", "c"]]));

        let blank = to_filter_tuple(
            "owner",
            &FilterModelEntry::Link(LinkFilter {
                condition: ConditionType::Equals,
                filter: vec![NOT_SET.to_string()],
            }),
        );
        assert_eq!(serde_json::to_value(&blank).unwrap(), json!(["owner", "is", "not set"]));

        let check = to_filter_tuple("done", &FilterModelEntry::from_json(&json!({"filterType": "check", "filter": true})));
        assert_eq!(serde_json::to_value(&check).unwrap(), json!(["done", "=", 1]));

        let child = FilterTuple::equals("item_code", "X-1").with_entity("Task Item");
        assert_eq!(serde_json::to_value(&child).unwrap(), json!(["Task Item", "item_code", "=", "X-1"]));
    }

    #[test]
    fn test_set_uses_values_and_link_uses_filter() {
        let set = FilterModelEntry::from_json(&json!({"filterType": "set", "values": ["a", null]}));
        assert_eq!(
            set,
            FilterModelEntry::Set(SetFilter {
                values: vec!["a".to_string(), NOT_SET.to_string()],
            })
        );
        let link = FilterModelEntry::from_json(&json!({"filterType": "link", "type": "equals", "filter": "HR"}));
        assert_eq!(to_filter_tuple("dept", &link), FilterTuple::equals("dept", "HR"));
        assert_eq!(link.to_json()["filter"], json!(["HR"]));
    }

    #[test]
    fn test_link_without_values_matches_everything() {
        let link = FilterModelEntry::from_json(&json!({"filterType": "link", "type": "equals"}));
        let tuple = to_filter_tuple("owner", &link);
        assert_eq!(serde_json::to_value(&tuple).unwrap(), json!(["owner", "like", "%%"]));
    }

    #[test]
    fn test_lone_wildcard_reads_as_contains() {
        assert_eq!(Operator::from_wire("like", &json!("%")), Some(Operator::Contains));
        assert_eq!(Operator::from_wire("like", &json!("%a")), Some(Operator::EndsWith));
        assert_eq!(Operator::from_wire("like", &json!("a%")), Some(Operator::StartsWith));

        let starts = to_filter_tuple("f", &FilterModelEntry::text(ConditionType::StartsWith, ""));
        let wire = serde_json::to_value(&starts).unwrap();
        assert_eq!(wire, json!(["f", "like", "%"]));
        let reloaded: FilterTuple = serde_json::from_value(wire).unwrap();
        assert_eq!(reloaded.operator, Operator::Contains);
    }

    #[test]
    fn test_wildcards_stripped_defensively() {
        let tuple = FilterTuple::new("name", Operator::Contains, FilterValue::Scalar(Scalar::from("%al%pha%")));
        let entry = to_filter_model_entry(&tuple, FilterKind::Text);
        assert_eq!(entry, FilterModelEntry::text(ConditionType::Contains, "alpha"));

        // Already-wrapped input is not double wrapped
        let again = to_filter_tuple("name", &FilterModelEntry::text(ConditionType::Contains, "%alpha%"));
        assert_eq!(again.value, FilterValue::Scalar(Scalar::from("%alpha%")));
    }

    #[test]
    fn test_unknown_and_malformed_entries_fall_back_to_like() {
        let unknown = FilterModelEntry::from_json(&json!({"filterType": "rating", "filter": 4}));
        let tuple = to_filter_tuple("stars", &unknown);
        assert_eq!(serde_json::to_value(&tuple).unwrap(), json!(["stars", "like", "%4%"]));

        // Wrong value type for a number filter: best effort, never an error
        let malformed = FilterModelEntry::from_json(&json!({"filterType": "number", "type": "bogus", "filter": "7"}));
        let tuple = to_filter_tuple("qty", &malformed);
        assert_eq!(tuple.operator, Operator::Contains);
        assert_eq!(tuple.value, FilterValue::Scalar(Scalar::from("%7%")));

        // Missing sub-fields still produce a tuple
        let empty = FilterModelEntry::from_json(&json!({"filterType": "text"}));
        assert_eq!(to_filter_tuple("x", &empty).value, FilterValue::Scalar(Scalar::from("%%")));

        let nothing = FilterModelEntry::from_json(&json!(42));
        assert!(matches!(nothing, FilterModelEntry::Unknown { .. }));
    }

    #[test]
    fn test_like_alias_and_combined_conditions() {
        let entry = FilterModelEntry::from_json(&json!({"filterType": "text", "type": "like", "filter": "a"}));
        assert_eq!(entry, FilterModelEntry::text(ConditionType::Contains, "a"));

        let combined = FilterModelEntry::from_json(&json!({
            "filterType": "number",
            "operator": "AND",
            "conditions": [{"type": "greaterThan", "filter": 3}, {"type": "lessThan", "filter": 9}]
        }));
        let tuple = to_filter_tuple("qty", &combined);
        assert_eq!(tuple.operator, Operator::GreaterThan);
        assert_eq!(tuple.value, FilterValue::Scalar(Scalar::Int(3)));
    }

    #[test]
    fn test_tuple_invariants_and_parse() {
        let between = FilterTuple::new("qty", Operator::Between, FilterValue::Scalar(Scalar::Int(3)));
        assert_eq!(between.value, FilterValue::Range(Scalar::Int(3), Scalar::Int(3)));
        let in_one = FilterTuple::new("qty", Operator::NotIn, FilterValue::Scalar(Scalar::Int(3)));
        assert_eq!(in_one.value, FilterValue::List(vec![Scalar::Int(3)]));

        let parsed: FilterTuple = serde_json::from_value(json!(["name", "like", "al%"])).unwrap();
        assert_eq!(parsed.operator, Operator::StartsWith);
        let parsed: FilterTuple = serde_json::from_value(json!(["name", "like", "%al"])).unwrap();
        assert_eq!(parsed.operator, Operator::EndsWith);
        let parsed: FilterTuple = serde_json::from_value(json!(["owner", "is", "set"])).unwrap();
        assert_eq!(parsed.operator, Operator::IsNotBlank);
        let parsed: FilterTuple = serde_json::from_value(json!(["tag", "in", "a, b"])).unwrap();
        assert_eq!(parsed.value, FilterValue::List(vec![Scalar::from("a"), Scalar::from("b")]));

        assert!(serde_json::from_value::<FilterTuple>(json!(["a", "~", 1])).is_err());
        assert!(serde_json::from_value::<FilterTuple>(json!(["a", "="])).is_err());
    }

    #[test]
    fn test_model_field_uniqueness() {
        let mut model = FilterModel::new();
        model.set("name", FilterModelEntry::text(ConditionType::Contains, "a"));
        model.set("name", FilterModelEntry::text(ConditionType::Equals, "b"));
        let tuples = model.to_tuples();
        assert_eq!(tuples, vec![FilterTuple::equals("name", "b")]);

        let mut filters = vec![FilterTuple::equals("name", "a"), FilterTuple::equals("status", "Open")];
        merge_tuple(&mut filters, FilterTuple::equals("name", "c"));
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1], FilterTuple::equals("name", "c"));
    }

    #[test]
    fn test_model_json_and_from_tuples() {
        let model: FilterModel = serde_json::from_value(json!({
            "name": {"filterType": "text", "type": "contains", "filter": "alpha"},
            "qty": {"filterType": "number", "type": "lessThan", "filter": 10}
        }))
        .unwrap();
        assert_eq!(model.len(), 2);

        let columns = vec![ColumnDef::new("name", FilterKind::Text), ColumnDef::new("qty", FilterKind::Number)];
        let rebuilt = FilterModel::from_tuples(&model.to_tuples(), &columns);
        assert_eq!(rebuilt, model);

        let json = serde_json::to_value(&rebuilt).unwrap();
        assert_eq!(json["name"]["filterType"], json!("text"));
        assert_eq!(json["qty"]["filter"], json!(10));
    }
}
