//! Declarative per-entity-family decomposition schemas.
//!
//! One engine ([`crate::decompose`]) drives all six families; what differs
//! between them is data in this table: which flat fields to project, which
//! fields are language maps, which nested objects flatten into prefixed
//! keys, and how nested collections turn into edges.

use crate::model::RelationType;
use serde::{Deserialize, Serialize};

/// The six entity families of an SKG-IF dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Agent,
    Grant,
    Venue,
    Topic,
    Datasource,
    Product,
}

impl EntityKind {
    /// Load order: referenced families before the products that point at them.
    pub const ALL: [EntityKind; 6] = [
        Self::Agent,
        Self::Grant,
        Self::Venue,
        Self::Topic,
        Self::Datasource,
        Self::Product,
    ];

    /// Graph node label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Agent => "Agent",
            Self::Grant => "Grant",
            Self::Venue => "Venue",
            Self::Topic => "Topic",
            Self::Datasource => "Datasource",
            Self::Product => "Product",
        }
    }

    /// `entity_type` used when a record does not declare one.
    pub fn canonical_type(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Grant => "grant",
            Self::Venue => "venue",
            Self::Topic => "topic",
            Self::Datasource => "datasource",
            Self::Product => "product",
        }
    }

    /// Directory under `dump/` holding this family's records.
    pub fn input_dir(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Grant => "grants",
            Self::Venue => "venue",
            Self::Topic => "topic",
            Self::Datasource => "datasource",
            Self::Product => "product",
        }
    }

    /// Directory under `to_load/` receiving this family's rows.
    pub fn output_dir(self) -> &'static str {
        match self {
            Self::Agent => "agents",
            Self::Grant => "grants",
            Self::Venue => "venues",
            Self::Topic => "topics",
            Self::Datasource => "datasources",
            Self::Product => "products",
        }
    }

    pub fn schema(self) -> &'static EntitySchema {
        match self {
            Self::Agent => &AGENT,
            Self::Grant => &GRANT,
            Self::Venue => &VENUE,
            Self::Topic => &TOPIC,
            Self::Datasource => &DATASOURCE,
            Self::Product => &PRODUCT,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

/// How one entity family decomposes.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    /// Flat fields copied verbatim (besides `local_identifier`/`entity_type`).
    pub fields: &'static [&'static str],
    pub multilingual: &'static [Multilingual],
    pub nested: &'static [NestedField],
    /// Fields stored as JSON strings on the node.
    pub json_strings: &'static [&'static str],
    /// Spelling aliases applied to the record before anything else.
    pub aliases: &'static [Alias],
    pub relations: &'static [RelationRule],
    /// Whether `ra_metrics` are projected onto the node.
    pub metrics: bool,
}

/// A `{lang: value}` field flattened under `base_key`.
#[derive(Debug)]
pub struct Multilingual {
    pub source: &'static str,
    pub base_key: &'static str,
}

/// A nested object whose `keys` flatten to `<prefix>_<key>`.
#[derive(Debug)]
pub struct NestedField {
    pub source: &'static str,
    pub prefix: &'static str,
    pub keys: &'static [&'static str],
}

/// When `from` is present and `to` is not, `to` takes the value of `from`.
#[derive(Debug)]
pub struct Alias {
    pub from: &'static str,
    pub to: &'static str,
}

/// Which end of an edge the entity sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// entity → target
    Outgoing,
    /// target → entity
    Incoming,
}

/// How a nested collection becomes edges.
#[derive(Debug)]
pub enum RelationRule {
    /// The field holds one target id, or a list of them.
    Reference {
        field: &'static str,
        relation: RelationType,
    },
    /// The field holds objects; `target` names the key with the other
    /// endpoint's id and `properties` the edge properties to carry.
    Objects {
        field: &'static str,
        target: &'static str,
        relation: RelationType,
        direction: Direction,
        properties: &'static [PropertyRule],
    },
    /// `{relationName: [product ids]}` with runtime-derived edge types.
    RelatedProducts { field: &'static str },
    /// Embedded manifestations expanded into their own nodes.
    Manifestations { field: &'static str },
}

/// One edge property taken from a collection item.
#[derive(Debug)]
pub enum PropertyRule {
    /// `item[key]` as is.
    Copy(&'static str),
    /// `item[path[0]][path[1]]...` stored under `key`.
    Path {
        path: &'static [&'static str],
        key: &'static str,
    },
    /// `item[key]` serialized as a JSON string.
    Json(&'static str),
}

// ============================================================================
// The table
// ============================================================================

pub static AGENT: EntitySchema = EntitySchema {
    kind: EntityKind::Agent,
    fields: &[
        "name",
        "given_name",
        "family_name",
        "short_name",
        "other_names",
        "website",
        "country",
        "types",
    ],
    multilingual: &[],
    nested: &[],
    json_strings: &[],
    aliases: &[],
    relations: &[RelationRule::Objects {
        field: "affiliations",
        target: "affiliation",
        relation: RelationType::AffiliatedWith,
        direction: Direction::Outgoing,
        properties: &[
            PropertyRule::Copy("role"),
            PropertyRule::Path {
                path: &["period", "start"],
                key: "period_start",
            },
            PropertyRule::Path {
                path: &["period", "end"],
                key: "period_end",
            },
        ],
    }],
    metrics: false,
};

pub static GRANT: EntitySchema = EntitySchema {
    kind: EntityKind::Grant,
    fields: &[
        "grant_number",
        "acronym",
        "funding_stream",
        "currency",
        "funded_amount",
        "keywords",
        "website",
    ],
    multilingual: &[
        Multilingual {
            source: "titles",
            base_key: "title",
        },
        Multilingual {
            source: "abstracts",
            base_key: "abstract",
        },
    ],
    nested: &[NestedField {
        source: "duration",
        prefix: "duration",
        keys: &["start", "end"],
    }],
    json_strings: &[],
    aliases: &[],
    relations: &[
        RelationRule::Reference {
            field: "funding_agency",
            relation: RelationType::HasFundingAgency,
        },
        RelationRule::Reference {
            field: "beneficiaries",
            relation: RelationType::HasBeneficiary,
        },
        RelationRule::Objects {
            field: "contributions",
            target: "by",
            relation: RelationType::HasContributedTo,
            direction: Direction::Incoming,
            properties: &[
                PropertyRule::Copy("roles"),
                PropertyRule::Copy("declared_affiliations"),
            ],
        },
    ],
    metrics: false,
};

pub static VENUE: EntitySchema = EntitySchema {
    kind: EntityKind::Venue,
    fields: &["name", "acronym", "type", "series", "creation_date"],
    multilingual: &[],
    nested: &[NestedField {
        source: "access_rights",
        prefix: "access_rights",
        keys: &["status", "description"],
    }],
    json_strings: &[],
    aliases: &[],
    relations: &[RelationRule::Objects {
        field: "contributions",
        target: "by",
        relation: RelationType::HasContributedTo,
        direction: Direction::Incoming,
        properties: &[PropertyRule::Copy("role")],
    }],
    metrics: false,
};

pub static TOPIC: EntitySchema = EntitySchema {
    kind: EntityKind::Topic,
    fields: &[],
    multilingual: &[Multilingual {
        source: "labels",
        base_key: "label",
    }],
    nested: &[],
    json_strings: &[],
    aliases: &[],
    relations: &[],
    metrics: false,
};

pub static DATASOURCE: EntitySchema = EntitySchema {
    kind: EntityKind::Datasource,
    fields: &[
        "name",
        "data_source_classification",
        "research_product_types",
        "disciplines",
    ],
    multilingual: &[],
    nested: &[],
    json_strings: &["policies", "persistent_identity_systems", "audience"],
    aliases: &[],
    relations: &[],
    metrics: false,
};

pub static PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::Product,
    fields: &["product_type", "source"],
    multilingual: &[
        Multilingual {
            source: "titles",
            base_key: "title",
        },
        Multilingual {
            source: "abstracts",
            base_key: "abstract",
        },
    ],
    nested: &[],
    json_strings: &[],
    aliases: &[Alias {
        from: "relevant_organisations",
        to: "relevant_organizations",
    }],
    relations: &[
        RelationRule::Objects {
            field: "topics",
            target: "term",
            relation: RelationType::HasTopic,
            direction: Direction::Outgoing,
            properties: &[PropertyRule::Json("provenance")],
        },
        RelationRule::Objects {
            field: "contributions",
            target: "by",
            relation: RelationType::HasContributedTo,
            direction: Direction::Incoming,
            properties: &[
                PropertyRule::Copy("role"),
                PropertyRule::Copy("declared_affiliations"),
                PropertyRule::Copy("rank"),
                PropertyRule::Copy("contribution_types"),
            ],
        },
        RelationRule::Manifestations {
            field: "manifestations",
        },
        RelationRule::Reference {
            field: "relevant_organizations",
            relation: RelationType::IsRelevantTo,
        },
        RelationRule::Reference {
            field: "funding",
            relation: RelationType::FundedBy,
        },
        RelationRule::RelatedProducts {
            field: "related_products",
        },
    ],
    metrics: true,
};
