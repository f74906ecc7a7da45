//! Route segments and the rules deciding when two of them denote the same
//! place in the route tree.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Atomic reference-counted string type used for identifiers.
pub type ArcStr = Arc<str>;

/// Segment of the page leaf. Pages carrying search params append them as
/// `__PAGE__?{...}`.
pub const PAGE_SEGMENT: &str = "__PAGE__";
/// Segment sent for a parallel slot the server does not render during a soft
/// navigation.
pub const DEFAULT_SEGMENT: &str = "__DEFAULT__";
/// Segment of the global not-found page.
pub const NOT_FOUND_SEGMENT: &str = "/_not-found";

/// The kind of a dynamic route parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    /// `[param]`
    #[serde(rename = "d")]
    Dynamic,
    /// `[...param]`
    #[serde(rename = "c")]
    CatchAll,
    /// `[[...param]]`
    #[serde(rename = "oc")]
    OptionalCatchAll,
    #[serde(rename = "di")]
    DynamicIntercepted,
    #[serde(rename = "ci")]
    CatchAllIntercepted,
    #[serde(rename = "oci")]
    OptionalCatchAllIntercepted,
}

impl ParamKind {
    /// Short tag used on the wire and in segment keys.
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Dynamic => "d",
            ParamKind::CatchAll => "c",
            ParamKind::OptionalCatchAll => "oc",
            ParamKind::DynamicIntercepted => "di",
            ParamKind::CatchAllIntercepted => "ci",
            ParamKind::OptionalCatchAllIntercepted => "oci",
        }
    }

    /// The kind with interception stripped. Two kinds with the same family
    /// describe the same shape of hole in the route tree.
    fn family(self) -> ParamKind {
        match self {
            ParamKind::Dynamic | ParamKind::DynamicIntercepted => ParamKind::Dynamic,
            ParamKind::CatchAll | ParamKind::CatchAllIntercepted => ParamKind::CatchAll,
            ParamKind::OptionalCatchAll | ParamKind::OptionalCatchAllIntercepted => {
                ParamKind::OptionalCatchAll
            }
        }
    }
}

/// Routing descriptor of a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "WireSegment", into = "WireSegment")]
pub enum Segment {
    /// A static path component, e.g. `blog`.
    Static(ArcStr),
    /// A dynamic parameter filled with a concrete value, e.g. `[slug]=hello`.
    Param {
        name: ArcStr,
        value: ArcStr,
        kind: ParamKind,
    },
}

/// Segments are either a plain string or a `[name, value, kind]` triple.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireSegment {
    Static(ArcStr),
    Param(ArcStr, ArcStr, ParamKind),
}

impl From<WireSegment> for Segment {
    fn from(value: WireSegment) -> Self {
        match value {
            WireSegment::Static(name) => Segment::Static(name),
            WireSegment::Param(name, value, kind) => Segment::Param { name, value, kind },
        }
    }
}

impl From<Segment> for WireSegment {
    fn from(value: Segment) -> Self {
        match value {
            Segment::Static(name) => WireSegment::Static(name),
            Segment::Param { name, value, kind } => WireSegment::Param(name, value, kind),
        }
    }
}

impl Segment {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Segment::Static(name.into())
    }

    pub fn param(name: impl Into<ArcStr>, value: impl Into<ArcStr>, kind: ParamKind) -> Self {
        Segment::Param {
            name: name.into(),
            value: value.into(),
            kind,
        }
    }

    /// The page leaf segment without search params.
    pub fn page() -> Self {
        Segment::new(PAGE_SEGMENT)
    }

    pub fn is_page(&self) -> bool {
        matches!(self, Segment::Static(name) if name.starts_with(PAGE_SEGMENT))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Segment::Static(name) if &**name == DEFAULT_SEGMENT)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Segment::Static(name) if &**name == NOT_FOUND_SEGMENT)
    }

    /// Identity of the segment inside its parent's parallel routes. Unlike
    /// [`matches`], the key tells apart two values of the same parameter.
    pub fn key(&self) -> SegmentKey {
        match self {
            Segment::Static(name) => SegmentKey(name.clone()),
            Segment::Param { name, value, kind } => {
                SegmentKey(format!("{name}|{value}|{}", kind.as_str()).into())
            }
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Static(name) => f.write_str(name),
            Segment::Param { name, value, .. } => write!(f, "[{name}]={value}"),
        }
    }
}

/// Key of a cached child in [`CacheNode::parallel_routes`](crate::CacheNode).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey(ArcStr);

impl SegmentKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides whether `new` and `old` denote the same place in the tree.
///
/// Static segments have to be equal. Parameters only have to be the same kind
/// of hole: the same name and the same kind family, whatever value they were
/// filled with.
pub fn matches(new: &Segment, old: &Segment) -> bool {
    match (new, old) {
        (Segment::Static(a), Segment::Static(b)) => a == b,
        (
            Segment::Param {
                name: name_a,
                kind: kind_a,
                ..
            },
            Segment::Param {
                name: name_b,
                kind: kind_b,
                ..
            },
        ) => name_a == name_b && kind_a.family() == kind_b.family(),
        _ => false,
    }
}
