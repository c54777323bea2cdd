use serde::Serialize;
use serde_json::{Map, Value};

const UNKNOWN_ID: &str = "unknown_id";

/// Normalized search hit, shaped the way the frontend renders listings.
///
/// Built leniently from whatever the index returns: absent or mistyped fields
/// fall back to empty strings and zeros instead of failing the search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price: f64,
    pub contact: String,
    pub rooms: i64,
    pub size: f64,
    pub floor: i64,
    /// Index field `available_from`
    pub availability: String,
    pub lat: f64,
    pub lng: f64,
}

impl Default for ListingRecord {
    fn default() -> Self {
        Self {
            id: UNKNOWN_ID.to_string(),
            title: String::new(),
            description: String::new(),
            location: String::new(),
            price: 0.0,
            contact: String::new(),
            rooms: 0,
            size: 0.0,
            floor: 0,
            availability: String::new(),
            lat: 0.0,
            lng: 0.0,
        }
    }
}

impl ListingRecord {
    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            id: text(raw, "id").unwrap_or(defaults.id),
            title: text(raw, "title").unwrap_or_default(),
            description: text(raw, "description").unwrap_or_default(),
            location: text(raw, "location").unwrap_or_default(),
            price: float(raw, "price").unwrap_or(defaults.price),
            contact: text(raw, "contact").unwrap_or_default(),
            rooms: integer(raw, "rooms").unwrap_or(defaults.rooms),
            size: float(raw, "size").unwrap_or(defaults.size),
            floor: integer(raw, "floor").unwrap_or(defaults.floor),
            availability: text(raw, "available_from").unwrap_or_default(),
            lat: float(raw, "lat").unwrap_or(defaults.lat),
            lng: float(raw, "lng").unwrap_or(defaults.lng),
        }
    }
}

fn text(raw: &Map<String, Value>, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn float(raw: &Map<String, Value>, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer(raw: &Map<String, Value>, key: &str) -> Option<i64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
