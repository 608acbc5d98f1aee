use crate::value::ScalarValue;

/// Identity and column values of an entity read from a result row. Holds no
/// reference to a live object so cached rows can be shared by sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityItem {
    pub type_name: String,
    /// Identifier column values.
    pub key: Vec<ScalarValue>,
    /// Every loaded column by name, identifier columns included.
    pub values: Vec<(String, ScalarValue)>,
}

impl EntityItem {
    pub fn value(&self, column: &str) -> Option<&ScalarValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }
}

/// An embedded value by field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbeddedValue {
    pub type_name: String,
    pub fields: Vec<(String, ScalarValue)>,
}

/// One decoded result column as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CachedValue {
    Scalar(ScalarValue),
    Entity(EntityItem),
    Embedded(EmbeddedValue),
}

/// A result column after materialization through the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue<O> {
    Scalar(ScalarValue),
    Object(O),
    Embedded(EmbeddedValue),
}

impl<O> ResultValue<O> {
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&O> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow<O> {
    values: Vec<ResultValue<O>>,
}

impl<O> ResultRow<O> {
    pub fn new(values: Vec<ResultValue<O>>) -> Self {
        ResultRow { values }
    }

    pub fn get(&self, idx: usize) -> Option<&ResultValue<O>> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[ResultValue<O>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<ResultValue<O>> {
        self.values
    }
}
