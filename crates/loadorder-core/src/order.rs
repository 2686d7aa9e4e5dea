//! Loading order declarations.
//!
//! A [`LoadingOrder`] is the normalized form of an `order` attribute such as
//! `"FIRST"`, `"LAST"` or `"BEFORE rustfmt, AFTER prettier"`. It is parsed once
//! when an extension is declared and never changes afterwards.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const FIRST_STR: &str = "FIRST";
const LAST_STR: &str = "LAST";
const BEFORE_STR: &str = "BEFORE ";
const AFTER_STR: &str = "AFTER ";

/// A clause that is none of `FIRST`, `LAST`, `BEFORE <id>` or `AFTER <id>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid order specification '{clause}': should be one of FIRST, LAST, BEFORE <id> or AFTER <id>")]
pub struct InvalidSpecification {
    pub clause: String,
}

/// Relative placement requirements of a single orderable item.
#[derive(Debug, Clone)]
pub struct LoadingOrder {
    /// Source text, kept for diagnostics only.
    name: Cow<'static, str>,
    first: bool,
    last: bool,
    before: BTreeSet<String>,
    after: BTreeSet<String>,
}

impl LoadingOrder {
    /// No placement requirements.
    pub const ANY: LoadingOrder = LoadingOrder::flags("ANY", false, false);
    pub const FIRST: LoadingOrder = LoadingOrder::flags(FIRST_STR, true, false);
    pub const LAST: LoadingOrder = LoadingOrder::flags(LAST_STR, false, true);

    const fn flags(name: &'static str, first: bool, last: bool) -> Self {
        Self {
            name: Cow::Borrowed(name),
            first,
            last,
            before: BTreeSet::new(),
            after: BTreeSet::new(),
        }
    }

    /// Parses a comma separated list of clauses.
    ///
    /// Keywords are matched case-insensitively. The identifier following
    /// `BEFORE ` or `AFTER ` is taken verbatim. Trailing commas are ignored,
    /// so `"LAST,"` reads as `LAST`; empty clauses anywhere else are rejected.
    ///
    /// # Errors
    /// Returns [`InvalidSpecification`] carrying the first clause that is not
    /// recognized.
    pub fn parse(text: &str) -> Result<Self, InvalidSpecification> {
        let mut order = Self {
            name: Cow::Owned(text.to_string()),
            ..Self::ANY
        };

        let mut clauses = text.trim_end_matches(',');
        if clauses.is_empty() {
            clauses = text;
        }

        for clause in clauses.split(',') {
            let trimmed = clause.trim();
            if trimmed.eq_ignore_ascii_case(FIRST_STR) {
                order.first = true;
            } else if trimmed.eq_ignore_ascii_case(LAST_STR) {
                order.last = true;
            } else if let Some(id) = strip_keyword(trimmed, BEFORE_STR) {
                order.before.insert(id.to_string());
            } else if let Some(id) = strip_keyword(trimmed, AFTER_STR) {
                order.after.insert(id.to_string());
            } else {
                return Err(InvalidSpecification {
                    clause: trimmed.to_string(),
                });
            }
        }

        Ok(order)
    }

    /// An order that must precede the item identified by `id`.
    pub fn before(id: impl Into<String>) -> Self {
        Self::single(BEFORE_STR, id.into(), |order, id| {
            order.before.insert(id);
        })
    }

    /// An order that must follow the item identified by `id`.
    pub fn after(id: impl Into<String>) -> Self {
        Self::single(AFTER_STR, id.into(), |order, id| {
            order.after.insert(id);
        })
    }

    fn single(keyword: &str, id: String, insert: impl FnOnce(&mut Self, String)) -> Self {
        let mut order = Self {
            name: Cow::Owned(format!("{keyword}{id}")),
            ..Self::ANY
        };
        insert(&mut order, id);
        order
    }

    pub fn is_first(&self) -> bool {
        self.first
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    /// Identifiers this item must precede.
    pub fn before_ids(&self) -> &BTreeSet<String> {
        &self.before
    }

    /// Identifiers this item must follow.
    pub fn after_ids(&self) -> &BTreeSet<String> {
        &self.after
    }

    /// True when the order places no requirement at all.
    pub fn is_any(&self) -> bool {
        !self.first && !self.last && self.before.is_empty() && self.after.is_empty()
    }

    /// The text this order was built from.
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

/// Reads an optional `order` attribute; an absent attribute means [`LoadingOrder::ANY`].
pub fn parse_order(text: Option<&str>) -> Result<LoadingOrder, InvalidSpecification> {
    match text {
        Some(text) => LoadingOrder::parse(text),
        None => Ok(LoadingOrder::ANY),
    }
}

fn strip_keyword<'a>(clause: &'a str, keyword: &str) -> Option<&'a str> {
    let head = clause.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(&clause[keyword.len()..])
    } else {
        None
    }
}

impl Default for LoadingOrder {
    fn default() -> Self {
        Self::ANY
    }
}

impl PartialEq for LoadingOrder {
    fn eq(&self, other: &Self) -> bool {
        self.first == other.first
            && self.last == other.last
            && self.before == other.before
            && self.after == other.after
    }
}

impl Eq for LoadingOrder {}

impl Hash for LoadingOrder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.first.hash(state);
        self.last.hash(state);
        self.before.hash(state);
        self.after.hash(state);
    }
}

impl Display for LoadingOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for LoadingOrder {
    type Err = InvalidSpecification;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for LoadingOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for LoadingOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
