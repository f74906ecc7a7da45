//! Route descriptions as sent by the server.
//!
//! A [`RouteTree`] describes which segment is active in every slot of the
//! page. Trees are immutable: every change produces a new node that shares
//! its untouched children with the old one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::segment::{ArcStr, Segment};

/// Children of a route node, keyed by parallel slot name.
pub type Slots = BTreeMap<ArcStr, Arc<RouteTree>>;

/// Slot holding the main content of a layout.
pub const CHILDREN_SLOT: &str = "children";

/// Instruction attached to a route node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Marker {
    /// Render this node and everything below it for the requested URL.
    Refetch,
    /// Render this node for the URL stored alongside the marker.
    Refresh,
    InsideSharedLayout,
    MetadataOnly,
}

/// One node of a route description.
///
/// On the wire this is the positional tuple
/// `[segment, children, url?, marker?, isRootLayout?]`. The trailing fields
/// are optional and the tree remembers how many of them it was given, so a
/// node that is cloned or patched serializes back to the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTree {
    pub segment: Segment,
    pub children: Slots,
    url: Option<ArcStr>,
    marker: Option<Marker>,
    is_root_layout: Option<bool>,
    arity: usize,
}

impl RouteTree {
    const MIN_ARITY: usize = 2;
    const MAX_ARITY: usize = 5;

    pub fn new(segment: Segment) -> Self {
        Self {
            segment,
            children: Slots::new(),
            url: None,
            marker: None,
            is_root_layout: None,
            arity: Self::MIN_ARITY,
        }
    }

    /// Adds a child under `slot`.
    pub fn with_child(mut self, slot: impl Into<ArcStr>, child: impl Into<Arc<RouteTree>>) -> Self {
        self.children.insert(slot.into(), child.into());
        self
    }

    pub fn with_url(mut self, url: Option<ArcStr>) -> Self {
        self.url = url;
        self.arity = self.arity.max(3);
        self
    }

    pub fn with_marker(mut self, marker: Option<Marker>) -> Self {
        self.marker = marker;
        self.arity = self.arity.max(4);
        self
    }

    /// Marks this node as the root layout of the page.
    pub fn root_layout(mut self) -> Self {
        self.is_root_layout = Some(true);
        self.arity = Self::MAX_ARITY;
        self
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn marker(&self) -> Option<Marker> {
        self.marker
    }

    pub fn is_root_layout(&self) -> bool {
        self.is_root_layout == Some(true)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The URL this node has to be refreshed from, when it carries its own
    /// `refresh` marker.
    pub fn refresh_url(&self) -> Option<&ArcStr> {
        match self.marker {
            Some(Marker::Refresh) => self.url.as_ref(),
            _ => None,
        }
    }

    /// A copy of this node with different children. All other fields,
    /// including absent ones, are carried over as they are.
    pub fn patch_children(&self, children: Slots) -> Self {
        Self {
            segment: self.segment.clone(),
            children,
            url: self.url.clone(),
            marker: self.marker,
            is_root_layout: self.is_root_layout,
            arity: self.arity,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for RouteTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.arity))?;
        seq.serialize_element(&self.segment)?;
        seq.serialize_element(&self.children)?;
        if self.arity > 2 {
            seq.serialize_element(&self.url)?;
        }
        if self.arity > 3 {
            seq.serialize_element(&self.marker)?;
        }
        if self.arity > 4 {
            seq.serialize_element(&self.is_root_layout)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for RouteTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(RouteTreeVisitor)
    }
}

struct RouteTreeVisitor;

impl<'de> Visitor<'de> for RouteTreeVisitor {
    type Value = RouteTree;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a [segment, children, url?, marker?, isRootLayout?] tuple")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RouteTree, A::Error> {
        let segment = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let children = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;

        let mut tree = RouteTree::new(segment);
        tree.children = children;

        if let Some(url) = seq.next_element()? {
            tree.url = url;
            tree.arity = 3;
        } else {
            return Ok(tree);
        }
        if let Some(marker) = seq.next_element()? {
            tree.marker = marker;
            tree.arity = 4;
        } else {
            return Ok(tree);
        }
        if let Some(is_root_layout) = seq.next_element()? {
            tree.is_root_layout = is_root_layout;
            tree.arity = 5;
        } else {
            return Ok(tree);
        }

        if seq.next_element::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(6, &self));
        }
        Ok(tree)
    }
}

/// Location of a node in the tree, as the list of `(slot, segment)` steps
/// leading to it from the root.
///
/// On the wire the steps are flattened into `[slot, segment, slot, segment, ...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Segment>", into = "Vec<Segment>")]
pub struct SegmentPath(Vec<(ArcStr, Segment)>);

impl SegmentPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// The path of a child of the node at `self`.
    pub fn join(&self, slot: &ArcStr, segment: &Segment) -> Self {
        let mut steps = self.0.clone();
        steps.push((slot.clone(), segment.clone()));
        Self(steps)
    }

    pub fn steps(&self) -> &[(ArcStr, Segment)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(ArcStr, Segment)> for SegmentPath {
    fn from_iter<I: IntoIterator<Item = (ArcStr, Segment)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<Vec<Segment>> for SegmentPath {
    type Error = WireError;

    fn try_from(flat: Vec<Segment>) -> Result<Self, Self::Error> {
        if flat.len() % 2 != 0 {
            return Err(WireError::SegmentPath(flat.len()));
        }

        let mut steps = Vec::with_capacity(flat.len() / 2);
        let mut flat = flat.into_iter();
        while let (Some(slot), Some(segment)) = (flat.next(), flat.next()) {
            match slot {
                Segment::Static(slot) => steps.push((slot, segment)),
                Segment::Param { .. } => return Err(WireError::SegmentPath(steps.len() * 2)),
            }
        }
        Ok(Self(steps))
    }
}

impl From<SegmentPath> for Vec<Segment> {
    fn from(path: SegmentPath) -> Self {
        path.0
            .into_iter()
            .flat_map(|(slot, segment)| [Segment::Static(slot), segment])
            .collect()
    }
}

impl fmt::Display for SegmentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for (slot, segment) in &self.0 {
            write!(f, "/@{slot}/{segment}")?;
        }
        Ok(())
    }
}
