//! Relation paths and field accessors.
//!
//! A condition names a relation reachable from a character and a field on that
//! relation's records. Both are looked up in a closed table at compile time, so an
//! unknown path or field is rejected before anything is evaluated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::{Affiliation, Asset, CharacterSnapshot, CorporationRole, Skill, Title};
use crate::error::DefinitionError;
use crate::value::Value;

/// Reads one field from a record.
pub type Read<T> = fn(&T) -> Value;

/// A relation reachable from a character in a single hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// The character itself.
    Character,
    Affiliation,
    Skills,
    Assets,
    Titles,
    Roles,
}

const CHARACTER_FIELDS: &[(&str, Read<CharacterSnapshot>)] = &[
    ("character_id", |c| c.character_id.into()),
    ("name", |c| c.name.as_str().into()),
    ("security_status", |c| c.security_status.into()),
];

const AFFILIATION_FIELDS: &[(&str, Read<Affiliation>)] = &[
    ("corporation_id", |a| a.corporation_id.into()),
    ("alliance_id", |a| a.alliance_id.into()),
    ("faction_id", |a| a.faction_id.into()),
];

const SKILL_FIELDS: &[(&str, Read<Skill>)] = &[
    ("skill_id", |s| s.skill_id.into()),
    ("trained_skill_level", |s| s.trained_skill_level.into()),
    ("active_skill_level", |s| s.active_skill_level.into()),
    ("skillpoints_in_skill", |s| s.skillpoints_in_skill.into()),
];

const ASSET_FIELDS: &[(&str, Read<Asset>)] = &[
    ("item_id", |a| a.item_id.into()),
    ("type_id", |a| a.type_id.into()),
    ("location_id", |a| a.location_id.into()),
    ("location_flag", |a| a.location_flag.as_str().into()),
    ("quantity", |a| a.quantity.into()),
    ("market_group_id", |a| a.market_group_id.into()),
];

const TITLE_FIELDS: &[(&str, Read<Title>)] = &[
    ("title_id", |t| t.title_id.into()),
    ("name", |t| t.name.as_str().into()),
];

const ROLE_FIELDS: &[(&str, Read<CorporationRole>)] = &[
    ("role", |r| r.role.as_str().into()),
    ("scope", |r| r.scope.as_str().into()),
];

fn lookup<T>(table: &[(&'static str, Read<T>)], field: &str) -> Option<(&'static str, Read<T>)> {
    table.iter().find(|(name, _)| *name == field).copied()
}

impl Relation {
    pub const ALL: [Relation; 6] = [
        Relation::Character,
        Relation::Affiliation,
        Relation::Skills,
        Relation::Assets,
        Relation::Titles,
        Relation::Roles,
    ];

    /// Parse a persisted `path`. The character itself is addressed by an empty path
    /// or `character`.
    pub fn parse(path: &str) -> Result<Self, DefinitionError> {
        match path {
            "" | "character" => Ok(Relation::Character),
            "affiliation" => Ok(Relation::Affiliation),
            "skills" => Ok(Relation::Skills),
            "assets" => Ok(Relation::Assets),
            "titles" => Ok(Relation::Titles),
            "roles" => Ok(Relation::Roles),
            other => Err(DefinitionError::UnknownPath(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Character => "character",
            Relation::Affiliation => "affiliation",
            Relation::Skills => "skills",
            Relation::Assets => "assets",
            Relation::Titles => "titles",
            Relation::Roles => "roles",
        }
    }

    /// Names of the fields declared on this relation.
    pub fn fields(&self) -> Vec<&'static str> {
        fn names<T>(table: &[(&'static str, Read<T>)]) -> Vec<&'static str> {
            table.iter().map(|(name, _)| *name).collect()
        }

        match self {
            Relation::Character => names(CHARACTER_FIELDS),
            Relation::Affiliation => names(AFFILIATION_FIELDS),
            Relation::Skills => names(SKILL_FIELDS),
            Relation::Assets => names(ASSET_FIELDS),
            Relation::Titles => names(TITLE_FIELDS),
            Relation::Roles => names(ROLE_FIELDS),
        }
    }

    /// Bind a field of this relation to its accessor.
    pub fn field(&self, field: &str) -> Result<FieldPath, DefinitionError> {
        let accessor = match self {
            Relation::Character => lookup(CHARACTER_FIELDS, field)
                .map(|(name, read)| (name, Accessor::Character(read))),
            Relation::Affiliation => lookup(AFFILIATION_FIELDS, field)
                .map(|(name, read)| (name, Accessor::Affiliation(read))),
            Relation::Skills => {
                lookup(SKILL_FIELDS, field).map(|(name, read)| (name, Accessor::Skill(read)))
            }
            Relation::Assets => {
                lookup(ASSET_FIELDS, field).map(|(name, read)| (name, Accessor::Asset(read)))
            }
            Relation::Titles => {
                lookup(TITLE_FIELDS, field).map(|(name, read)| (name, Accessor::Title(read)))
            }
            Relation::Roles => {
                lookup(ROLE_FIELDS, field).map(|(name, read)| (name, Accessor::Role(read)))
            }
        };

        let (name, accessor) = accessor.ok_or_else(|| DefinitionError::UnknownField {
            path: self.as_str().to_string(),
            field: field.to_string(),
        })?;

        Ok(FieldPath {
            relation: *self,
            field: name,
            accessor,
        })
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy)]
enum Accessor {
    Character(Read<CharacterSnapshot>),
    Affiliation(Read<Affiliation>),
    Skill(Read<Skill>),
    Asset(Read<Asset>),
    Title(Read<Title>),
    Role(Read<CorporationRole>),
}

/// A validated `relation.field` reference.
#[derive(Clone, Copy)]
pub struct FieldPath {
    relation: Relation,
    field: &'static str,
    accessor: Accessor,
}

impl FieldPath {
    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Every non-null value reachable from the character through this path.
    ///
    /// The root and to-one relations yield at most one value; to-many relations
    /// yield one value per record. Null fields and absent relations yield nothing.
    pub fn resolve(&self, character: &CharacterSnapshot) -> Vec<Value> {
        let values: Vec<Value> = match self.accessor {
            Accessor::Character(read) => vec![read(character)],
            Accessor::Affiliation(read) => character.affiliation.iter().map(read).collect(),
            Accessor::Skill(read) => character.skills.iter().map(read).collect(),
            Accessor::Asset(read) => character.assets.iter().map(read).collect(),
            Accessor::Title(read) => character.titles.iter().map(read).collect(),
            Accessor::Role(read) => character.roles.iter().map(read).collect(),
        };

        values.into_iter().filter(|v| !v.is_null()).collect()
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.relation, self.field)
    }
}

/// Resolve `path` and `field` against a character in one step.
pub fn resolve(
    character: &CharacterSnapshot,
    path: &str,
    field: &str,
) -> Result<Vec<Value>, DefinitionError> {
    Ok(Relation::parse(path)?.field(field)?.resolve(character))
}
