//! Named properties with runtime-tagged values
//!
//! Graphs, nodes, streams, and pins expose `(name, type tag, value)` triples
//! so an external observer (typically the HTTP introspection server) can
//! enumerate and render state without compile-time type knowledge. The value
//! is a tagged variant over exactly the scalar types that also serve as
//! built-in stream element types; a visitor dispatches on the tag.

use serde::{Deserialize, Serialize};

use super::error::MediaGraphError;
use super::message::StreamMessage;

/// A runtime-tagged scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    #[serde(rename = "int")]
    Int(i32),
    #[serde(rename = "int64")]
    Int64(i64),
    #[serde(rename = "bool")]
    Bool(bool),
    #[serde(rename = "float")]
    Float(f32),
    #[serde(rename = "double")]
    Double(f64),
    #[serde(rename = "string")]
    Text(String),
}

impl PropertyValue {
    /// The tag naming the contained type. Matches the stream element tags.
    pub fn type_tag(&self) -> &'static str {
        match self {
            PropertyValue::Int(_) => <i32 as StreamMessage>::type_tag(),
            PropertyValue::Int64(_) => <i64 as StreamMessage>::type_tag(),
            PropertyValue::Bool(_) => <bool as StreamMessage>::type_tag(),
            PropertyValue::Float(_) => <f32 as StreamMessage>::type_tag(),
            PropertyValue::Double(_) => <f64 as StreamMessage>::type_tag(),
            PropertyValue::Text(_) => <String as StreamMessage>::type_tag(),
        }
    }

    /// Render the value alone, without its tag.
    pub fn to_value_string(&self) -> String {
        match self {
            PropertyValue::Int(v) => v.to_string(),
            PropertyValue::Int64(v) => v.to_string(),
            PropertyValue::Bool(v) => v.to_string(),
            PropertyValue::Float(v) => v.to_string(),
            PropertyValue::Double(v) => v.to_string(),
            PropertyValue::Text(v) => v.clone(),
        }
    }

    /// Parse a value string according to a type tag. Unknown tags and
    /// malformed values are reported, never panicked on.
    pub fn parse_as(tag: &str, value: &str) -> Result<PropertyValue, MediaGraphError> {
        fn unparsable(tag: &str, value: &str) -> MediaGraphError {
            MediaGraphError::Property(format!("cannot parse {value:?} as {tag}"))
        }
        match tag {
            "int" => value
                .parse()
                .map(PropertyValue::Int)
                .map_err(|_| unparsable(tag, value)),
            "int64" => value
                .parse()
                .map(PropertyValue::Int64)
                .map_err(|_| unparsable(tag, value)),
            "bool" => value
                .parse()
                .map(PropertyValue::Bool)
                .map_err(|_| unparsable(tag, value)),
            "float" => value
                .parse()
                .map(PropertyValue::Float)
                .map_err(|_| unparsable(tag, value)),
            "double" => value
                .parse()
                .map(PropertyValue::Double)
                .map_err(|_| unparsable(tag, value)),
            "string" => Ok(PropertyValue::Text(value.to_string())),
            other => Err(MediaGraphError::Property(format!(
                "unknown property type tag {other:?}"
            ))),
        }
    }

    /// Dispatch on the tag, handing the contained value to a visitor.
    pub fn apply(&self, visitor: &mut dyn PropertyVisitor) -> bool {
        match self {
            PropertyValue::Int(v) => visitor.visit_int(*v),
            PropertyValue::Int64(v) => visitor.visit_int64(*v),
            PropertyValue::Bool(v) => visitor.visit_bool(*v),
            PropertyValue::Float(v) => visitor.visit_float(*v),
            PropertyValue::Double(v) => visitor.visit_double(*v),
            PropertyValue::Text(v) => visitor.visit_string(v),
        }
    }
}

/// An operation applicable to every scalar property type, resolved at
/// runtime. Serializers are the typical implementers.
pub trait PropertyVisitor {
    fn visit_int(&mut self, value: i32) -> bool;
    fn visit_int64(&mut self, value: i64) -> bool;
    fn visit_bool(&mut self, value: bool) -> bool;
    fn visit_float(&mut self, value: f32) -> bool;
    fn visit_double(&mut self, value: f64) -> bool;
    fn visit_string(&mut self, value: &str) -> bool;
}

type Getter = Box<dyn Fn() -> PropertyValue + Send + Sync>;
type Setter = Box<dyn Fn(&PropertyValue) -> bool + Send + Sync>;

/// A named accessor over a live object.
///
/// Properties are built on demand from closures capturing weak handles, so
/// enumerating them never extends the lifetime of the object they describe.
pub struct Property {
    name: String,
    getter: Getter,
    setter: Option<Setter>,
}

impl Property {
    pub fn read_only(
        name: impl Into<String>,
        get: impl Fn() -> PropertyValue + Send + Sync + 'static,
    ) -> Property {
        Property {
            name: name.into(),
            getter: Box::new(get),
            setter: None,
        }
    }

    pub fn read_write(
        name: impl Into<String>,
        get: impl Fn() -> PropertyValue + Send + Sync + 'static,
        set: impl Fn(&PropertyValue) -> bool + Send + Sync + 'static,
    ) -> Property {
        Property {
            name: name.into(),
            getter: Box::new(get),
            setter: Some(Box::new(set)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> PropertyValue {
        (self.getter)()
    }

    pub fn type_tag(&self) -> &'static str {
        self.get().type_tag()
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub fn set(&self, value: &PropertyValue) -> bool {
        match &self.setter {
            Some(set) => set(value),
            None => false,
        }
    }

    /// Current value rendered as a plain string.
    pub fn value_to_string(&self) -> String {
        self.get().to_value_string()
    }

    /// Parse `serialized` according to the property's current tag and store
    /// it. Returns false for read-only properties and malformed input.
    pub fn value_from_string(&self, serialized: &str) -> bool {
        match PropertyValue::parse_as(self.type_tag(), serialized) {
            Ok(value) => self.set(&value),
            Err(err) => {
                tracing::debug!("[property {}] rejected value: {}", self.name, err);
                false
            }
        }
    }

    /// `(name, type, value)` as a JSON object, the wire shape consumed by
    /// the introspection server.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "type": self.type_tag(),
            "value": serde_json::to_value(self.get()).unwrap_or(serde_json::Value::Null),
            "writable": self.is_writable(),
        })
    }

    pub fn apply(&self, visitor: &mut dyn PropertyVisitor) -> bool {
        self.get().apply(visitor)
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("value", &self.get())
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Implemented by everything that exposes properties: graphs, nodes,
/// streams, and pins.
pub trait PropertySource {
    fn properties(&self) -> Vec<Property>;

    fn num_properties(&self) -> usize {
        self.properties().len()
    }

    fn property(&self, index: usize) -> Option<Property> {
        let mut all = self.properties();
        if index < all.len() {
            Some(all.swap_remove(index))
        } else {
            None
        }
    }

    fn property_by_name(&self, name: &str) -> Option<Property> {
        self.properties().into_iter().find(|p| p.name() == name)
    }
}
