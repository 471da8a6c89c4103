//! Postgres-backed snapshot provider and membership store.

use std::collections::HashMap;

use async_trait::async_trait;
use citadel_common::{
    AppError, AppResult, CharacterId, MembershipAction, MembershipChange, SquadId, SquadKind,
    UserId,
};
use citadel_rules::context::{
    Affiliation, Asset, CharacterSnapshot, CorporationRole, Skill, Title, UserSnapshot,
};
use citadel_rules::eligibility::Squad;
use sqlx::PgPool;

use crate::store::{MembershipStore, SnapshotProvider};

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    admin: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct CharacterRow {
    character_id: i64,
    name: String,
    security_status: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct AffiliationRow {
    character_id: i64,
    corporation_id: i64,
    alliance_id: Option<i64>,
    faction_id: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct SkillRow {
    character_id: i64,
    skill_id: i64,
    trained_skill_level: i32,
    active_skill_level: i32,
    skillpoints_in_skill: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct AssetRow {
    character_id: i64,
    item_id: i64,
    type_id: i64,
    location_id: i64,
    location_flag: String,
    quantity: i32,
    market_group_id: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct TitleRow {
    character_id: i64,
    title_id: i64,
    name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct RoleRow {
    character_id: i64,
    role: String,
    scope: String,
}

#[derive(Debug, sqlx::FromRow)]
struct SquadRow {
    id: i64,
    name: String,
    description: Option<String>,
    kind: String,
    filters: Option<String>,
    is_classified: bool,
}

/// Group rows by character.
fn by_character<R, T>(
    rows: Vec<R>,
    split: impl Fn(R) -> (CharacterId, T),
) -> HashMap<CharacterId, Vec<T>> {
    let mut grouped: HashMap<CharacterId, Vec<T>> = HashMap::new();
    for row in rows {
        let (character_id, item) = split(row);
        grouped.entry(character_id).or_default().push(item);
    }
    grouped
}

/// Store reading SeAT-style character tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_characters(&self, user_id: UserId) -> AppResult<Vec<CharacterSnapshot>> {
        let rows = sqlx::query_as::<_, CharacterRow>(
            r#"
            SELECT ci.character_id, ci.name, ci.security_status
            FROM refresh_tokens rt
            JOIN character_infos ci ON ci.character_id = rt.character_id
            WHERE rt.user_id = $1 AND rt.deleted_at IS NULL
            ORDER BY ci.character_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.character_id).collect();

        let affiliations: HashMap<CharacterId, Affiliation> = sqlx::query_as::<_, AffiliationRow>(
            r#"
            SELECT character_id, corporation_id, alliance_id, faction_id
            FROM character_affiliations
            WHERE character_id = ANY($1)
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(|r| {
            (
                r.character_id,
                Affiliation {
                    corporation_id: r.corporation_id,
                    alliance_id: r.alliance_id,
                    faction_id: r.faction_id,
                },
            )
        })
        .collect();

        let skills = sqlx::query_as::<_, SkillRow>(
            r#"
            SELECT character_id, skill_id, trained_skill_level, active_skill_level,
                   skillpoints_in_skill
            FROM character_skills
            WHERE character_id = ANY($1)
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let mut skills = by_character(skills, |r| {
            (
                r.character_id,
                Skill {
                    skill_id: r.skill_id,
                    trained_skill_level: r.trained_skill_level,
                    active_skill_level: r.active_skill_level,
                    skillpoints_in_skill: r.skillpoints_in_skill,
                },
            )
        });

        let assets = sqlx::query_as::<_, AssetRow>(
            r#"
            SELECT a.character_id, a.item_id, a.type_id, a.location_id, a.location_flag,
                   a.quantity, t."marketGroupID"::BIGINT AS market_group_id
            FROM character_assets a
            LEFT JOIN "invTypes" t ON t."typeID" = a.type_id
            WHERE a.character_id = ANY($1)
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let mut assets = by_character(assets, |r| {
            (
                r.character_id,
                Asset {
                    item_id: r.item_id,
                    type_id: r.type_id,
                    location_id: r.location_id,
                    location_flag: r.location_flag,
                    quantity: r.quantity,
                    market_group_id: r.market_group_id,
                },
            )
        });

        let titles = sqlx::query_as::<_, TitleRow>(
            r#"
            SELECT ct.character_id, t.title_id, t.name
            FROM character_titles ct
            JOIN corporation_titles t ON t.id = ct.title_id
            WHERE ct.character_id = ANY($1)
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let mut titles = by_character(titles, |r| (r.character_id, Title::new(r.title_id, r.name)));

        let roles = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT character_id, role, scope
            FROM character_roles
            WHERE character_id = ANY($1)
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let mut roles = by_character(roles, |r| {
            (
                r.character_id,
                CorporationRole {
                    role: r.role,
                    scope: r.scope,
                },
            )
        });

        Ok(rows
            .into_iter()
            .map(|row| CharacterSnapshot {
                character_id: row.character_id,
                name: row.name,
                security_status: row.security_status,
                affiliation: affiliations.get(&row.character_id).copied(),
                skills: skills.remove(&row.character_id).unwrap_or_default(),
                assets: assets.remove(&row.character_id).unwrap_or_default(),
                titles: titles.remove(&row.character_id).unwrap_or_default(),
                roles: roles.remove(&row.character_id).unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl SnapshotProvider for PgStore {
    async fn load_user(&self, user_id: UserId) -> AppResult<Option<UserSnapshot>> {
        let Some(user) =
            sqlx::query_as::<_, UserRow>("SELECT id, name, admin FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
        else {
            return Ok(None);
        };

        let characters = self.load_characters(user.id).await?;
        tracing::debug!(user_id, characters = characters.len(), "Loaded user snapshot");

        Ok(Some(UserSnapshot {
            user_id: user.id,
            name: user.name,
            admin: user.admin,
            characters,
        }))
    }

    async fn owner_of(&self, character_id: CharacterId) -> AppResult<Option<UserId>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM refresh_tokens WHERE character_id = $1 AND deleted_at IS NULL",
        )
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn user_ids(&self) -> AppResult<Vec<UserId>> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn auto_squads(&self) -> AppResult<Vec<Squad>> {
        let rows = sqlx::query_as::<_, SquadRow>(
            r#"
            SELECT id, name, description, type AS kind, filters, is_classified
            FROM squads
            WHERE type = 'auto'
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| -> AppResult<Squad> {
                let kind = SquadKind::parse(&row.kind).ok_or_else(|| {
                    AppError::InternalError(format!("Squad {} has unknown type {:?}", row.id, row.kind))
                })?;
                Ok(Squad {
                    id: row.id,
                    name: row.name,
                    description: row.description,
                    kind,
                    filters: row.filters,
                    is_classified: row.is_classified,
                })
            })
            .collect()
    }

    async fn is_member(&self, squad_id: SquadId, user_id: UserId) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM squad_member WHERE squad_id = $1 AND user_id = $2)",
        )
        .bind(squad_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn apply(&self, change: &MembershipChange) -> AppResult<()> {
        let query = match change.action {
            MembershipAction::Added => {
                "INSERT INTO squad_member (squad_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            }
            MembershipAction::Removed => {
                "DELETE FROM squad_member WHERE squad_id = $1 AND user_id = $2"
            }
        };

        sqlx::query(query)
            .bind(change.squad_id)
            .bind(change.user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
