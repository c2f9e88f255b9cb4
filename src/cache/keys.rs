//! Query key definitions.
//!
//! A `QueryKey` is the identity of one cached result set: the query name plus
//! the parameter record the query was issued with.

use std::collections::BTreeMap;
use std::fmt;

use crate::application::pagination::PageWindow;

/// Name under which paginated feed reads are cached.
pub const FEED_QUERY: &str = "feed";

/// A single query parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamValue {
    Int(i64),
    UInt(u64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::UInt(value) => write!(f, "{value}"),
            ParamValue::Str(value) => write!(f, "{value:?}"),
            ParamValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::UInt(u64::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Parameter record of a query. Ordered by name so equal records hash equally.
pub type QueryParams = BTreeMap<&'static str, ParamValue>;

/// Composite cache identity: two keys are equal iff the name and every parameter match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    name: &'static str,
    params: QueryParams,
}

impl QueryKey {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: QueryParams::new(),
        }
    }

    pub fn with_param(mut self, param: &'static str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(param, value.into());
        self
    }

    /// Key for one window of the feed.
    pub fn feed(window: PageWindow) -> Self {
        Self::new(FEED_QUERY)
            .with_param("skip", window.skip)
            .with_param("take", window.take)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    pub fn param(&self, param: &str) -> Option<&ParamValue> {
        self.params.get(param)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (index, (param, value)) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{param}={value}")?;
        }
        f.write_str("}")
    }
}
