//! Request parameter multi-maps.
//!
//! Query strings and form bodies are parsed into [`Values`]: each key maps
//! to every value given for it, in arrival order. Accessors return the first
//! value, and an empty value counts as missing for the typed helpers.

use std::collections::HashMap;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use thiserror::Error;
use url::form_urlencoded;

/// Error binding parameters into a struct.
#[derive(Debug, Error)]
#[error("failed to bind parameters: {0}")]
pub struct BindError(#[from] serde_urlencoded::de::Error);

/// Ordered multi-map of string parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values {
    keys: Vec<String>,
    map: HashMap<String, Vec<String>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `a=1&b=2&a=3` style input. Malformed escapes are decoded lossily.
    pub fn parse(input: &str) -> Self {
        let mut values = Self::new();
        for (key, value) in form_urlencoded::parse(input.as_bytes()) {
            values.add(key.into_owned(), value.into_owned());
        }
        values
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.map.get_mut(&key) {
            Some(existing) => existing.push(value.into()),
            None => {
                self.keys.push(key.clone());
                self.map.insert(key, vec![value.into()]);
            }
        }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value for `key`.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// First value, or `default` when missing or empty.
    pub fn string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.get(key) {
            Some(v) if !v.is_empty() => v,
            _ => default,
        }
    }

    /// First value parsed as `T`. `None` when missing, empty or unparsable.
    pub fn parse_as<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse().ok())
    }

    /// First value parsed as `T`, falling back to `default`.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.parse_as(key).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `(key, value)` pairs, keys in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().flat_map(move |key| {
            self.map[key]
                .iter()
                .map(move |value| (key.as_str(), value.as_str()))
        })
    }

    /// A view where `self`'s values come before `fallback`'s for every key,
    /// so `get` prefers `self`.
    pub fn merged_over(&self, fallback: &Values) -> Values {
        let mut merged = self.clone();
        for (key, value) in fallback.iter() {
            merged.add(key, value);
        }
        merged
    }

    pub fn to_urlencoded(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.iter() {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }

    /// Deserialize into `T` using the first value of each key.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let mut first = form_urlencoded::Serializer::new(String::new());
        for key in &self.keys {
            if let Some(value) = self.get(key) {
                first.append_pair(key, value);
            }
        }
        Ok(serde_urlencoded::from_str(&first.finish())?)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Values::new();
        for (key, value) in iter {
            values.add(key, value);
        }
        values
    }
}
