//! Rendered content for a route tree, as delivered by the server or by a
//! prefetch.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

use crate::cache::Resource;
use crate::error::WireError;
use crate::segment::ArcStr;

/// Content for one segment and, recursively, for its slots.
///
/// Wire form: `[rsc, children, loading, isPartial, isAtLeaf?]`.
#[derive(Debug, Clone, Default)]
pub struct SeedData {
    /// Rendered content of the segment.
    pub rsc: Resource,
    pub children: BTreeMap<ArcStr, Option<SeedData>>,
    /// Loading boundary shown while the segment suspends.
    pub loading: Resource,
    /// Set when some of the content is missing and still has to be requested
    /// from the server.
    pub is_partial: bool,
    pub is_at_leaf: bool,
}

impl SeedData {
    pub fn new(rsc: Resource) -> Self {
        Self {
            rsc,
            ..Default::default()
        }
    }

    pub fn with_child(mut self, slot: impl Into<ArcStr>, child: SeedData) -> Self {
        self.children.insert(slot.into(), Some(child));
        self
    }

    pub fn with_loading(mut self, loading: Resource) -> Self {
        self.loading = loading;
        self
    }

    pub fn partial(mut self) -> Self {
        self.is_partial = true;
        self
    }

    pub fn child(&self, slot: &str) -> Option<&SeedData> {
        self.children.get(slot).and_then(Option::as_ref)
    }

    pub fn from_json(json: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<'de> Deserialize<'de> for SeedData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(SeedDataVisitor)
    }
}

struct SeedDataVisitor;

impl<'de> Visitor<'de> for SeedDataVisitor {
    type Value = SeedData;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a [rsc, children, loading, isPartial, isAtLeaf?] tuple")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<SeedData, A::Error> {
        let rsc: Value = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let children = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        let loading: Value = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(2, &self))?;
        let is_partial = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(3, &self))?;
        let is_at_leaf = seq.next_element()?.unwrap_or(false);

        Ok(SeedData {
            rsc: Resource::from_value(rsc),
            children,
            loading: Resource::from_value(loading),
            is_partial,
            is_at_leaf,
        })
    }
}

/// Head payload of a page leaf.
#[derive(Debug, Clone, Default)]
pub struct Head {
    pub content: Resource,
    pub is_partial: bool,
}

impl Head {
    pub fn new(content: Resource) -> Self {
        Self {
            content,
            is_partial: false,
        }
    }

    pub fn partial(content: Resource) -> Self {
        Self {
            content,
            is_partial: true,
        }
    }
}
