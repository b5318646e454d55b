//! Raw graph values as delivered by the query client, and the scalar type
//! that property codecs inflate from and deflate into.
//!
//! The client decides the variant of every value at the boundary; nothing
//! downstream inspects runtime shapes. Scalars compare with Cypher's
//! three-valued semantics (`None` means "unknown").

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Timelike};
use serde::{Deserialize, Serialize};

/// A spatial point. `z` is set for 3D points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub srid: i64,
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

/// A duration as the driver exposes it: months and days are folded into
/// `seconds` (a month counts as 2 629 800 s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    pub seconds: i64,
    pub nanoseconds: i64,
}

/// A property-level value: what a single key on a node or edge can hold,
/// and what query parameters are made of.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScalarValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ScalarValue>),
    Map(BTreeMap<String, ScalarValue>),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    LocalDateTime(NaiveDateTime),
    /// Date-time bound to a named zone, e.g. `Europe/Paris`.
    ZonedDateTime {
        local: NaiveDateTime,
        zone: String,
    },
    Time(NaiveTime, FixedOffset),
    LocalTime(NaiveTime),
    Duration(Duration),
    Point(Point),
    Bytes(Vec<u8>),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::LocalDateTime(_) => "local datetime",
            Self::ZonedDateTime { .. } => "zoned datetime",
            Self::Time(..) => "time",
            Self::LocalTime(_) => "local time",
            Self::Duration(_) => "duration",
            Self::Point(_) => "point",
            Self::Bytes(_) => "bytes",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Cypher ordering comparison. Returns `None` when either side is null
    /// or the types are not comparable.
    pub fn cypher_cmp(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::LocalDateTime(a), Self::LocalDateTime(b)) => Some(a.cmp(b)),
            (Self::LocalTime(a), Self::LocalTime(b)) => Some(a.cmp(b)),
            (Self::Time(a, ao), Self::Time(b, bo)) => {
                let utc = |t: &NaiveTime, o: &FixedOffset| {
                    (
                        i64::from(t.num_seconds_from_midnight()) - i64::from(o.local_minus_utc()),
                        t.nanosecond(),
                    )
                };
                Some(utc(a, ao).cmp(&utc(b, bo)))
            }
            (Self::Duration(a), Self::Duration(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Cypher equality: null on either side is unknown.
    pub fn cypher_eq(&self, other: &ScalarValue) -> Option<bool> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::List(a), Self::List(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                let mut unknown = false;
                for (x, y) in a.iter().zip(b) {
                    match x.cypher_eq(y) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown {
                    None
                } else {
                    Some(true)
                }
            }
            _ => match self.cypher_cmp(other) {
                Some(ord) => Some(ord == Ordering::Equal),
                None => Some(self == other),
            },
        }
    }

    /// Lossy conversion into JSON, used by the CLI and diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Null => J::Null,
            Self::Bool(b) => J::Bool(*b),
            Self::Int(i) => J::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .unwrap_or(J::Null),
            Self::String(s) => J::String(s.clone()),
            Self::List(items) => J::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => J::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Date(d) => J::String(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => J::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::LocalDateTime(dt) => J::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::ZonedDateTime { local, zone } => {
                J::String(format!("{}[{zone}]", local.format("%Y-%m-%dT%H:%M:%S%.f")))
            }
            Self::Time(t, offset) => J::String(format!("{}{offset}", t.format("%H:%M:%S%.f"))),
            Self::LocalTime(t) => J::String(t.format("%H:%M:%S%.f").to_string()),
            Self::Duration(d) => serde_json::json!({"seconds": d.seconds, "nanoseconds": d.nanoseconds}),
            Self::Point(p) => {
                let mut point = serde_json::json!({"srid": p.srid, "x": p.x, "y": p.y});
                if let (Some(z), J::Object(map)) = (p.z, &mut point) {
                    map.insert("z".to_string(), J::from(z));
                }
                point
            }
            Self::Bytes(bytes) => J::Array(bytes.iter().map(|b| J::from(*b)).collect()),
        }
    }
}

impl From<serde_json::Value> for ScalarValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match value {
            J::Null => Self::Null,
            J::Bool(b) => Self::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Self::String(s),
            J::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            J::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ScalarValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NaiveDate> for ScalarValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<DateTime<FixedOffset>> for ScalarValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Self::DateTime(v)
    }
}

impl From<NaiveDateTime> for ScalarValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::LocalDateTime(v)
    }
}

impl From<NaiveTime> for ScalarValue {
    fn from(v: NaiveTime) -> Self {
        Self::LocalTime(v)
    }
}

impl From<Point> for ScalarValue {
    fn from(v: Point) -> Self {
        Self::Point(v)
    }
}

impl From<Duration> for ScalarValue {
    fn from(v: Duration) -> Self {
        Self::Duration(v)
    }
}

impl<T: Into<ScalarValue>> From<Vec<T>> for ScalarValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Properties keyed by their stored name.
pub type Properties = BTreeMap<String, ScalarValue>;

/// A node exactly as the server returned it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawNode {
    pub id: i64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl RawNode {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A relationship exactly as the server returned it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRelationship {
    pub id: i64,
    pub rel_type: String,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub properties: Properties,
}

impl RawRelationship {
    pub fn new(id: i64, rel_type: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            id,
            rel_type: rel_type.into(),
            start,
            end,
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Alternating node/relationship sequence. `nodes.len() == relationships.len() + 1`
/// for any well-formed path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawPath {
    pub nodes: Vec<RawNode>,
    pub relationships: Vec<RawRelationship>,
}

/// Any value a result cell can contain.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Scalar(ScalarValue),
    Node(RawNode),
    Relationship(RawRelationship),
    Path(RawPath),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    pub fn null() -> Self {
        Self::Scalar(ScalarValue::Null)
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&RawNode> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }
}

impl From<ScalarValue> for RawValue {
    fn from(v: ScalarValue) -> Self {
        Self::Scalar(v)
    }
}

impl From<RawNode> for RawValue {
    fn from(v: RawNode) -> Self {
        Self::Node(v)
    }
}

impl From<RawRelationship> for RawValue {
    fn from(v: RawRelationship) -> Self {
        Self::Relationship(v)
    }
}

impl From<RawPath> for RawValue {
    fn from(v: RawPath) -> Self {
        Self::Path(v)
    }
}
