use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// Attribute field type as reported by the host store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[serde(alias = "String")]
    String,
    #[serde(alias = "SmallInteger")]
    SmallInteger,
    #[serde(alias = "Integer")]
    Integer,
    #[serde(alias = "Single")]
    Single,
    #[serde(alias = "Double")]
    Double,
    #[serde(alias = "Date")]
    Date,
    #[serde(alias = "OID")]
    Oid,
    #[serde(alias = "Guid")]
    Guid,
    #[serde(alias = "GlobalID")]
    GlobalId,
    #[serde(alias = "Geometry")]
    Geometry,
    #[serde(alias = "Blob")]
    Blob,
}

impl FieldType {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::String | Self::Guid | Self::GlobalId)
    }

    /// Integer/SmallInteger only; OID is handled separately by the matrix.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::SmallInteger | Self::Integer)
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Self::Single | Self::Double)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_real()
    }

    /// Geometry and Blob columns are never keys, transfer fields or list fields.
    pub fn is_transferable(&self) -> bool {
        !matches!(self, Self::Geometry | Self::Blob)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::SmallInteger => write!(f, "SmallInteger"),
            Self::Integer => write!(f, "Integer"),
            Self::Single => write!(f, "Single"),
            Self::Double => write!(f, "Double"),
            Self::Date => write!(f, "Date"),
            Self::Oid => write!(f, "OID"),
            Self::Guid => write!(f, "Guid"),
            Self::GlobalId => write!(f, "GlobalID"),
            Self::Geometry => write!(f, "Geometry"),
            Self::Blob => write!(f, "Blob"),
        }
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "text" => Ok(Self::String),
            "small_integer" | "smallinteger" => Ok(Self::SmallInteger),
            "integer" => Ok(Self::Integer),
            "single" => Ok(Self::Single),
            "double" => Ok(Self::Double),
            "date" => Ok(Self::Date),
            "oid" => Ok(Self::Oid),
            "guid" => Ok(Self::Guid),
            "global_id" | "globalid" => Ok(Self::GlobalId),
            "geometry" => Ok(Self::Geometry),
            "blob" => Ok(Self::Blob),
            other => Err(format!("unknown field type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A single attribute value.
///
/// Ordering is total: `Null` < numbers < text < dates. Integers and reals
/// compare numerically with each other; an integer sorts before a real of
/// the same magnitude so the order stays consistent with equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Real(OrderedFloat<f64>),
    Date(NaiveDateTime),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn real(v: f64) -> Self {
        Self::Real(OrderedFloat(v))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null, or text that is empty once whitespace is trimmed.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    fn tag_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Integer(_) | Self::Real(_) => 1,
            Self::Text(_) => 2,
            Self::Date(_) => 3,
        }
    }

    /// Parse raw cell text as `field_type`. Empty cells are null.
    pub fn parse(raw: &str, field_type: FieldType) -> Option<Self> {
        if raw.is_empty() {
            return Some(Self::Null);
        }
        match field_type {
            FieldType::String
            | FieldType::Guid
            | FieldType::GlobalId
            | FieldType::Geometry
            | FieldType::Blob => Some(Self::Text(raw.to_string())),
            FieldType::SmallInteger | FieldType::Integer | FieldType::Oid => {
                raw.trim().parse::<i64>().ok().map(Self::Integer)
            }
            FieldType::Single | FieldType::Double => {
                raw.trim().parse::<f64>().ok().map(Self::real)
            }
            FieldType::Date => parse_date(raw.trim()).map(Self::Date),
        }
    }

    /// Convert to a value storable in a field of `field_type`.
    ///
    /// Returns `None` when no sensible coercion exists (e.g. text that is not
    /// a number into an integer field, or any number into a date field).
    pub fn coerce_to(&self, field_type: FieldType) -> Option<Self> {
        if self.is_null() {
            return Some(Self::Null);
        }
        match field_type {
            FieldType::String | FieldType::Guid | FieldType::GlobalId => match self {
                Self::Text(_) => Some(self.clone()),
                other => Some(Self::Text(other.render())),
            },
            FieldType::SmallInteger | FieldType::Integer | FieldType::Oid => match self {
                Self::Integer(_) => Some(self.clone()),
                Self::Real(v) => {
                    let t = v.0.trunc();
                    if t.is_finite() && t >= i64::MIN as f64 && t <= i64::MAX as f64 {
                        Some(Self::Integer(t as i64))
                    } else {
                        None
                    }
                }
                Self::Text(s) => s.trim().parse::<i64>().ok().map(Self::Integer),
                _ => None,
            },
            FieldType::Single | FieldType::Double => match self {
                Self::Real(_) => Some(self.clone()),
                Self::Integer(i) => Some(Self::real(*i as f64)),
                Self::Text(s) => s.trim().parse::<f64>().ok().map(Self::real),
                _ => None,
            },
            FieldType::Date => match self {
                Self::Date(_) => Some(self.clone()),
                Self::Text(s) => parse_date(s.trim()).map(Self::Date),
                _ => None,
            },
            FieldType::Geometry | FieldType::Blob => Some(self.clone()),
        }
    }

    /// Text form used for CSV cells and messages. Null renders empty.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Real(v) => v.0.to_string(),
            Self::Date(d) => {
                if d.time() == NaiveTime::MIN {
                    d.format("%Y-%m-%d").to_string()
                } else {
                    d.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "<null>"),
            other => write!(f, "{}", other.render()),
        }
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Real(a), Self::Real(b)) => a.cmp(b),
            (Self::Integer(a), Self::Real(b)) => {
                OrderedFloat(*a as f64).cmp(b).then(Ordering::Less)
            }
            (Self::Real(a), Self::Integer(b)) => {
                a.cmp(&OrderedFloat(*b as f64)).then(Ordering::Greater)
            }
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            _ => self.tag_rank().cmp(&other.tag_rank()),
        }
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Real(v) => serializer.serialize_f64(v.0),
            Self::Date(_) => serializer.serialize_str(&self.render()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::real(v)
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDTHH:MM:SS`.
fn parse_date(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::text("   ").is_blank());
        assert!(FieldValue::text("").is_blank());
        assert!(!FieldValue::text(" a ").is_blank());
        assert!(!FieldValue::Integer(0).is_blank());
    }

    #[test]
    fn null_sorts_lowest() {
        let mut vals = vec![
            FieldValue::text("b"),
            FieldValue::Integer(3),
            FieldValue::Null,
            FieldValue::real(-1.5),
        ];
        vals.sort();
        assert_eq!(vals[0], FieldValue::Null);
        assert_eq!(vals[1], FieldValue::real(-1.5));
        assert_eq!(vals[2], FieldValue::Integer(3));
        assert_eq!(vals[3], FieldValue::text("b"));
    }

    #[test]
    fn integer_and_real_compare_numerically() {
        assert!(FieldValue::Integer(2) < FieldValue::real(2.5));
        assert!(FieldValue::real(1.5) < FieldValue::Integer(2));
        assert!(FieldValue::Integer(2) < FieldValue::real(2.0));
        assert_ne!(FieldValue::Integer(2), FieldValue::real(2.0));
    }

    #[test]
    fn field_type_from_str() {
        assert_eq!("SmallInteger".parse::<FieldType>(), Ok(FieldType::SmallInteger));
        assert_eq!("global_id".parse::<FieldType>(), Ok(FieldType::GlobalId));
        assert_eq!("OID".parse::<FieldType>(), Ok(FieldType::Oid));
        assert!("raster".parse::<FieldType>().is_err());
    }

    #[test]
    fn parse_by_type() {
        assert_eq!(FieldValue::parse("42", FieldType::Integer), Some(FieldValue::Integer(42)));
        assert_eq!(FieldValue::parse("", FieldType::Integer), Some(FieldValue::Null));
        assert_eq!(FieldValue::parse("x", FieldType::Integer), None);
        assert_eq!(FieldValue::parse("2.5", FieldType::Double), Some(FieldValue::real(2.5)));
        assert_eq!(FieldValue::parse(" 7 ", FieldType::String), Some(FieldValue::text(" 7 ")));

        let d = FieldValue::parse("2022-11-02", FieldType::Date).unwrap();
        assert_eq!(d.render(), "2022-11-02");
        let dt = FieldValue::parse("2022-11-02T08:30:00", FieldType::Date).unwrap();
        assert_eq!(dt.render(), "2022-11-02 08:30:00");
    }

    #[test]
    fn coercion_rules() {
        assert_eq!(
            FieldValue::real(3.9).coerce_to(FieldType::Integer),
            Some(FieldValue::Integer(3))
        );
        assert_eq!(
            FieldValue::real(-3.9).coerce_to(FieldType::SmallInteger),
            Some(FieldValue::Integer(-3))
        );
        assert_eq!(
            FieldValue::Integer(5).coerce_to(FieldType::Double),
            Some(FieldValue::real(5.0))
        );
        assert_eq!(
            FieldValue::Integer(5).coerce_to(FieldType::String),
            Some(FieldValue::text("5"))
        );
        assert_eq!(FieldValue::text("abc").coerce_to(FieldType::Integer), None);
        assert_eq!(FieldValue::Integer(1).coerce_to(FieldType::Date), None);
        assert_eq!(FieldValue::Null.coerce_to(FieldType::Date), Some(FieldValue::Null));
    }

    #[test]
    fn json_shape() {
        let v = serde_json::to_value(vec![
            FieldValue::Null,
            FieldValue::Integer(1),
            FieldValue::text("a"),
        ])
        .unwrap();
        assert_eq!(v, serde_json::json!([null, 1, "a"]));
    }

    #[test]
    fn field_type_names() {
        let t: FieldType = toml::Value::String("small_integer".into()).try_into().unwrap();
        assert_eq!(t, FieldType::SmallInteger);
        let t: FieldType = toml::Value::String("GlobalID".into()).try_into().unwrap();
        assert_eq!(t, FieldType::GlobalId);
        assert_eq!(FieldType::Oid.to_string(), "OID");
    }
}
