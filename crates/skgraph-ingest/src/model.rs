//! Output row types: entity nodes, identifier nodes, manifestation nodes and
//! relationship edges.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

/// Node label shared by all identifier nodes.
pub const PID_LABEL: &str = "Pid";
/// Node label of product manifestations.
pub const MANIFESTATION_LABEL: &str = "Manifestation";
/// Discriminator carried by dynamically typed related-product edges.
pub const RELATED_PRODUCT: &str = "RELATED_PRODUCT";

// ============================================================================
// Relation types
// ============================================================================

/// The closed set of fixed relationship types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationType {
    HasPid,
    AffiliatedWith,
    HasBeneficiary,
    HasContributedTo,
    HasFundingAgency,
    HasTopic,
    HasManifestation,
    HostedBy,
    PublishedIn,
    IsRelevantTo,
    FundedBy,
}

impl RelationType {
    pub const ALL: [RelationType; 11] = [
        Self::HasPid,
        Self::AffiliatedWith,
        Self::HasBeneficiary,
        Self::HasContributedTo,
        Self::HasFundingAgency,
        Self::HasTopic,
        Self::HasManifestation,
        Self::HostedBy,
        Self::PublishedIn,
        Self::IsRelevantTo,
        Self::FundedBy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HasPid => "HAS_PID",
            Self::AffiliatedWith => "AFFILIATED_WITH",
            Self::HasBeneficiary => "HAS_BENEFICIARY",
            Self::HasContributedTo => "HAS_CONTRIBUTED_TO",
            Self::HasFundingAgency => "HAS_FUNDING_AGENCY",
            Self::HasTopic => "HAS_TOPIC",
            Self::HasManifestation => "HAS_MANIFESTATION",
            Self::HostedBy => "HOSTED_BY",
            Self::PublishedIn => "PUBLISHED_IN",
            Self::IsRelevantTo => "IS_RELEVANT_TO",
            Self::FundedBy => "FUNDED_BY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge type: either one of the fixed relation types, or a type derived at
/// runtime from a source field name (related products).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeType {
    Fixed(RelationType),
    Derived {
        derived_type: String,
        discriminator: String,
    },
}

impl EdgeType {
    /// `relatedDataset` → `RELATED_DATASET` with the `RELATED_PRODUCT`
    /// discriminator.
    pub fn related_product(field: &str) -> Self {
        Self::Derived {
            derived_type: camel_to_upper_snake(field),
            discriminator: RELATED_PRODUCT.to_string(),
        }
    }

    /// The serialized `type` of the edge.
    pub fn name(&self) -> &str {
        match self {
            Self::Fixed(t) => t.as_str(),
            Self::Derived { derived_type, .. } => derived_type,
        }
    }

    /// The serialized `rel_type`, present only on derived edges.
    pub fn discriminator(&self) -> Option<&str> {
        match self {
            Self::Fixed(_) => None,
            Self::Derived { discriminator, .. } => Some(discriminator),
        }
    }

    pub fn fixed(&self) -> Option<RelationType> {
        match self {
            Self::Fixed(t) => Some(*t),
            Self::Derived { .. } => None,
        }
    }
}

impl From<RelationType> for EdgeType {
    fn from(value: RelationType) -> Self {
        Self::Fixed(value)
    }
}

/// Insert `_` before each internal capitalised run, then uppercase.
///
/// `relatedDataset` → `RELATED_DATASET`, `isVersionOf` → `IS_VERSION_OF`,
/// `HTTPServer` → `HTTP_SERVER`.
pub fn camel_to_upper_snake(name: &str) -> String {
    static WORD: OnceLock<Regex> = OnceLock::new();
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();

    let word = WORD.get_or_init(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("static regex"));
    let boundary =
        BOUNDARY.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));

    let s1 = word.replace_all(name, "${1}_${2}");
    let s2 = boundary.replace_all(&s1, "${1}_${2}");
    s2.to_uppercase()
}

// ============================================================================
// Nodes
// ============================================================================

/// One entity of any family, flattened for loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub local_identifier: String,
    pub entity_type: String,
    /// Type-specific flat properties (never contains the two keys above).
    #[serde(flatten)]
    pub properties: Map<String, Value>,
    /// Normalized original record, serialized.
    #[serde(rename = "_data")]
    pub data: String,
}

/// An external identifier, `local_identifier = scheme:value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifierNode {
    pub local_identifier: String,
    pub scheme: String,
    pub value: String,
}

impl IdentifierNode {
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        let scheme = scheme.into();
        let value = value.into();
        Self {
            local_identifier: format!("{scheme}:{value}"),
            scheme,
            value,
        }
    }

    /// Build from a `{scheme, value}` sub-object. Both parts are required.
    pub fn from_source(source: &Value) -> Option<Self> {
        let scheme = scalar_text(source.get("scheme")?)?;
        let value = scalar_text(source.get("value")?)?;
        Some(Self::new(scheme, value))
    }
}

/// A product manifestation with a positional synthetic id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestationNode {
    pub local_identifier: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl ManifestationNode {
    pub fn synthetic_id(product_id: &str, index: usize) -> String {
        format!("{product_id}:manifestation:{index}")
    }
}

// ============================================================================
// Edges
// ============================================================================

/// A typed edge between two `local_identifier`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "EdgeRow", try_from = "EdgeRow")]
pub struct RelationshipEdge {
    pub start: String,
    pub end: String,
    pub edge_type: EdgeType,
    pub properties: Map<String, Value>,
    pub scheme: Option<String>,
}

impl RelationshipEdge {
    pub fn new(start: impl Into<String>, end: impl Into<String>, edge_type: impl Into<EdgeType>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            edge_type: edge_type.into(),
            properties: Map::new(),
            scheme: None,
        }
    }

    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// The `(start, end, type)` triple loaders upsert by.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.start, &self.end, self.edge_type.name())
    }
}

/// Unknown fixed relationship type in a serialized edge row.
#[derive(Debug, thiserror::Error)]
#[error("unknown relationship type `{0}`")]
pub struct UnknownRelationType(pub String);

/// Wire shape: `{start, end, type, [properties], [rel_type], [scheme]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeRow {
    start: String,
    end: String,
    #[serde(rename = "type")]
    edge_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scheme: Option<String>,
}

impl From<RelationshipEdge> for EdgeRow {
    fn from(edge: RelationshipEdge) -> Self {
        let (edge_type, rel_type) = match edge.edge_type {
            EdgeType::Fixed(t) => (t.as_str().to_string(), None),
            EdgeType::Derived {
                derived_type,
                discriminator,
            } => (derived_type, Some(discriminator)),
        };
        Self {
            start: edge.start,
            end: edge.end,
            edge_type,
            properties: edge.properties,
            rel_type,
            scheme: edge.scheme,
        }
    }
}

impl TryFrom<EdgeRow> for RelationshipEdge {
    type Error = UnknownRelationType;

    fn try_from(row: EdgeRow) -> Result<Self, Self::Error> {
        let edge_type = match row.rel_type {
            Some(discriminator) => EdgeType::Derived {
                derived_type: row.edge_type,
                discriminator,
            },
            None => EdgeType::Fixed(
                RelationType::parse(&row.edge_type)
                    .ok_or_else(|| UnknownRelationType(row.edge_type.clone()))?,
            ),
        };
        Ok(Self {
            start: row.start,
            end: row.end,
            edge_type,
            properties: row.properties,
            scheme: row.scheme,
        })
    }
}

/// Text of a string or number; anything else (including `""`) is absent.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
