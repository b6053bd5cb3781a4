//! Item-to-price mapping and its compact wire encoding.
//!
//! Orders record the unit price of each item at the time it was added. The
//! mapping travels between services as `[id1->price1,id2->price2]`, with the
//! empty mapping written as `[]`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ItemId;

const ENTRY_SEPARATOR: char = ',';
const PRICE_SEPARATOR: &str = "->";

/// Errors produced when decoding an item list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemListError {
    /// The input is not enclosed in `[` and `]`.
    #[error("item list must be enclosed in brackets: {0:?}")]
    MissingBrackets(String),

    /// An entry lacks the `->` separator or an item id.
    #[error("malformed item entry: {0:?}")]
    MalformedEntry(String),

    /// The price part of an entry is not an integer.
    #[error("invalid price in item entry: {0:?}")]
    InvalidPrice(String),
}

/// Mapping of item id to the unit price recorded when it was added.
///
/// Iteration order is ascending by item id, which gives every consumer the
/// same deterministic traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemPrices(BTreeMap<ItemId, i64>);

impl ItemPrices {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `price` for `item`, returning the previously recorded price.
    pub fn insert(&mut self, item: ItemId, price: i64) -> Option<i64> {
        self.0.insert(item, price)
    }

    /// Removes `item`, returning its recorded price.
    pub fn remove(&mut self, item: &ItemId) -> Option<i64> {
        self.0.remove(item)
    }

    /// Sum of all recorded prices, `None` if it does not fit in an `i64`.
    pub fn total(&self) -> Option<i64> {
        self.0.values().try_fold(0i64, |sum, price| sum.checked_add(*price))
    }

    /// Item ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ItemPrices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (id, price)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{ENTRY_SEPARATOR}")?;
            }
            write!(f, "{id}{PRICE_SEPARATOR}{price}")?;
        }
        f.write_str("]")
    }
}

impl FromStr for ItemPrices {
    type Err = ItemListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| ItemListError::MissingBrackets(s.to_string()))?;

        let mut items = BTreeMap::new();
        if inner.is_empty() {
            return Ok(Self(items));
        }

        for entry in inner.split(ENTRY_SEPARATOR) {
            let (id, price) = entry
                .rsplit_once(PRICE_SEPARATOR)
                .filter(|(id, _)| !id.is_empty())
                .ok_or_else(|| ItemListError::MalformedEntry(entry.to_string()))?;
            let price: i64 = price
                .parse()
                .map_err(|_| ItemListError::InvalidPrice(entry.to_string()))?;
            items.insert(ItemId::new(id), price);
        }

        Ok(Self(items))
    }
}

impl TryFrom<String> for ItemPrices {
    type Error = ItemListError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemPrices> for String {
    fn from(items: ItemPrices) -> Self {
        items.to_string()
    }
}

impl FromIterator<(ItemId, i64)> for ItemPrices {
    fn from_iter<T: IntoIterator<Item = (ItemId, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
