//! Ability names and the ability catalog.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;

/// The handler family an ability is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Character,
    Corporation,
    Alliance,
}

impl Scope {
    /// Map an ability prefix to its scope. Prefixes without a dedicated scope, such
    /// as `squads` or `global`, are global.
    pub fn from_prefix(prefix: &str) -> Self {
        match prefix {
            "character" => Scope::Character,
            "corporation" => Scope::Corporation,
            "alliance" => Scope::Alliance,
            _ => Scope::Global,
        }
    }
}

/// A `prefix.verb` ability such as `character.sheet` or `squads.kick`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ability {
    title: String,
    split: usize,
    scope: Scope,
}

impl Ability {
    /// Split at the first dot; both halves must be non-empty.
    pub fn parse(title: &str) -> Result<Self, DefinitionError> {
        match title.split_once('.') {
            Some((prefix, verb)) if !prefix.is_empty() && !verb.is_empty() => Ok(Self {
                title: title.to_string(),
                split: prefix.len(),
                scope: Scope::from_prefix(prefix),
            }),
            _ => Err(DefinitionError::InvalidAbility(title.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.title
    }

    pub fn prefix(&self) -> &str {
        &self.title[..self.split]
    }

    pub fn verb(&self) -> &str {
        &self.title[self.split + 1..]
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// Catalog entry describing one permission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    /// Name of a custom handler replacing the scope's default one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
}

impl PermissionDefinition {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_gate(mut self, gate: impl Into<String>) -> Self {
        self.gate = Some(gate.into());
        self
    }
}

/// Permissions grouped by scope, as shipped in configuration:
///
/// ```json
/// {"character": {"sheet": {"label": "View sheet", "description": "..."}},
///  "corporation": {"wallet": {"label": "View wallet", "gate": "wallet_officer"}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbilityCatalog {
    scopes: BTreeMap<String, BTreeMap<String, PermissionDefinition>>,
}

impl AbilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        serde_json::from_str(json)
            .map_err(|e| DefinitionError::Malformed(format!("ability catalog: {e}")))
    }

    pub fn insert(
        &mut self,
        scope: impl Into<String>,
        permission: impl Into<String>,
        definition: PermissionDefinition,
    ) {
        self.scopes
            .entry(scope.into())
            .or_default()
            .insert(permission.into(), definition);
    }

    pub fn with_permission(
        mut self,
        scope: impl Into<String>,
        permission: impl Into<String>,
        definition: PermissionDefinition,
    ) -> Self {
        self.insert(scope, permission, definition);
        self
    }

    /// Look up a permission by its full `scope.permission` title.
    pub fn get(&self, title: &str) -> Option<&PermissionDefinition> {
        let (scope, permission) = title.split_once('.')?;
        self.scopes.get(scope)?.get(permission)
    }

    /// All entries as `(title, definition)` in title order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &PermissionDefinition)> {
        self.scopes.iter().flat_map(|(scope, permissions)| {
            permissions
                .iter()
                .map(move |(permission, definition)| (format!("{scope}.{permission}"), definition))
        })
    }

    pub fn len(&self) -> usize {
        self.scopes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ability() {
        let ability = Ability::parse("character.sheet").unwrap();
        assert_eq!(ability.prefix(), "character");
        assert_eq!(ability.verb(), "sheet");
        assert_eq!(ability.scope(), Scope::Character);

        // Only the first dot separates
        let ability = Ability::parse("corporation.wallet.journal").unwrap();
        assert_eq!(ability.prefix(), "corporation");
        assert_eq!(ability.verb(), "wallet.journal");
        assert_eq!(ability.to_string(), "corporation.wallet.journal");
    }

    #[test]
    fn test_unscoped_prefixes_are_global() {
        assert_eq!(Ability::parse("squads.kick").unwrap().scope(), Scope::Global);
        assert_eq!(Ability::parse("global.superuser").unwrap().scope(), Scope::Global);
    }

    #[test]
    fn test_invalid_abilities() {
        for title in ["sheet", "", ".sheet", "character."] {
            assert_eq!(
                Ability::parse(title).unwrap_err(),
                DefinitionError::InvalidAbility(title.to_string())
            );
        }
    }

    #[test]
    fn test_catalog_from_json() {
        let catalog = AbilityCatalog::from_json(
            r#"{
                "character": {
                    "sheet": {"label": "View sheet", "description": "Character sheet"},
                    "skills": {"label": "View skills"}
                },
                "corporation": {
                    "wallet": {"label": "View wallet", "division": "financial", "gate": "wallet_officer"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(
            catalog.get("corporation.wallet").and_then(|d| d.gate.as_deref()),
            Some("wallet_officer")
        );
        assert!(catalog.get("alliance.tracking").is_none());

        let titles: Vec<String> = catalog.iter().map(|(title, _)| title).collect();
        assert_eq!(
            titles,
            vec!["character.sheet", "character.skills", "corporation.wallet"]
        );
    }

    #[test]
    fn test_catalog_rejects_malformed_json() {
        assert!(matches!(
            AbilityCatalog::from_json(r#"{"character": ["sheet"]}"#).unwrap_err(),
            DefinitionError::Malformed(_)
        ));
    }
}
