//! Crews and crew membership

use crate::db::{Changes, Database, Page};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Crew {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: String,
    pub leader_user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Member row joined with the user it points to
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CrewMember {
    pub id: Uuid,
    pub crew_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub user_role: String,
}

#[derive(Debug, Clone, FromRow)]
struct Leader {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: Option<String>,
    role: String,
}

fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first, last).trim().to_string()
}

impl CrewMember {
    pub fn to_json(&self) -> Value {
        let name = full_name(&self.first_name, &self.last_name);
        json!({
            "id": self.id,
            "user_id": self.user_id,
            "role": self.role,
            "is_active": self.is_active,
            "joined_at": self.joined_at,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "full_name": name,
            "email": self.email,
            "user": {
                "id": self.user_id,
                "first_name": self.first_name,
                "last_name": self.last_name,
                "full_name": name,
                "email": self.email,
                "role": self.user_role,
            },
        })
    }
}

/// Crew with leader and active members, leader listed first
#[derive(Debug, Clone)]
pub struct CrewDetail {
    pub crew: Crew,
    leader: Option<Leader>,
    pub members: Vec<CrewMember>,
}

impl CrewDetail {
    pub fn member_count(&self) -> usize {
        self.members.len() + usize::from(self.leader.is_some())
    }

    pub fn to_json(&self) -> Value {
        let mut members = Vec::with_capacity(self.member_count());
        let foreman = self.leader.as_ref().map(|leader| {
            let name = full_name(&leader.first_name, &leader.last_name);
            members.push(json!({
                "id": format!("leader-{}", leader.id),
                "user_id": leader.id,
                "role": "leader",
                "is_active": true,
                "joined_at": self.crew.created_at,
                "first_name": leader.first_name,
                "last_name": leader.last_name,
                "full_name": name,
                "email": leader.email,
                "user": {
                    "id": leader.id,
                    "first_name": leader.first_name,
                    "last_name": leader.last_name,
                    "full_name": name,
                    "email": leader.email,
                    "role": leader.role,
                },
            }));
            json!({
                "id": leader.id,
                "full_name": name,
                "first_name": leader.first_name,
                "last_name": leader.last_name,
                "email": leader.email,
                "role": leader.role,
            })
        });
        members.extend(self.members.iter().map(CrewMember::to_json));

        json!({
            "id": self.crew.id,
            "name": self.crew.name,
            "description": self.crew.description,
            "status": self.crew.status,
            "leader_user_id": self.crew.leader_user_id,
            "project_id": self.crew.project_id,
            "foreman": foreman,
            "members": members,
            "member_count": self.member_count(),
            "created_at": self.crew.created_at,
            "updated_at": self.crew.updated_at,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CrewFilter {
    pub search: Option<String>,
    pub status: Option<String>,
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct NewCrew {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub leader_user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

/// Body of `POST /api/projects/{id}/team`
#[derive(Debug, Deserialize)]
pub struct NewTeam {
    pub crew_name: Option<String>,
    pub leader_user_id: Option<Uuid>,
    #[serde(default)]
    pub member_user_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CrewUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub leader_user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

const MEMBER_SELECT: &str = "SELECT cm.id, cm.crew_id, cm.user_id, cm.role, cm.is_active, cm.joined_at, \
        u.first_name, u.last_name, u.email, u.role AS user_role \
     FROM crew_members cm JOIN users u ON u.id = cm.user_id";

#[derive(Debug, Clone)]
pub struct CrewStore {
    pool: PgPool,
}

impl CrewStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &CrewFilter) {
        builder.push(" WHERE 1=1");
        if let Some(status) = &filter.status {
            builder.push(" AND status = ").push_bind(status.clone());
        }
        if let Some(project_id) = filter.project_id {
            builder.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn list(&self, filter: &CrewFilter, page: Page) -> Result<(Vec<CrewDetail>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM crews");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT * FROM crews");
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let crews = select.build_query_as::<Crew>().fetch_all(&self.pool).await?;

        let details = self.attach_people(crews).await?;
        Ok((details, total))
    }

    /// Load leaders and active members for a batch of crews in two queries
    async fn attach_people(&self, crews: Vec<Crew>) -> Result<Vec<CrewDetail>> {
        let crew_ids: Vec<Uuid> = crews.iter().map(|c| c.id).collect();
        let leader_ids: Vec<Uuid> = crews.iter().filter_map(|c| c.leader_user_id).collect();

        let leaders: HashMap<Uuid, Leader> = sqlx::query_as::<_, Leader>(
            "SELECT id, first_name, last_name, email, role FROM users WHERE id = ANY($1)",
        )
        .bind(&leader_ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|leader| (leader.id, leader))
        .collect();

        let mut members: HashMap<Uuid, Vec<CrewMember>> = HashMap::new();
        let rows = sqlx::query_as::<_, CrewMember>(&format!(
            "{} WHERE cm.crew_id = ANY($1) AND cm.is_active ORDER BY cm.joined_at",
            MEMBER_SELECT
        ))
        .bind(&crew_ids)
        .fetch_all(&self.pool)
        .await?;
        for member in rows {
            members.entry(member.crew_id).or_default().push(member);
        }

        Ok(crews
            .into_iter()
            .map(|crew| CrewDetail {
                leader: crew.leader_user_id.and_then(|id| leaders.get(&id).cloned()),
                members: members.remove(&crew.id).unwrap_or_default(),
                crew,
            })
            .collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<CrewDetail> {
        let crew = sqlx::query_as::<_, Crew>("SELECT * FROM crews WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        let mut details = self.attach_people(vec![crew]).await?;
        details
            .pop()
            .ok_or_else(|| anyhow::Error::new(sqlx::Error::RowNotFound))
    }

    pub async fn create(&self, name: &str, crew: &NewCrew) -> Result<Crew> {
        let created = sqlx::query_as::<_, Crew>(
            "INSERT INTO crews (name, description, status, leader_user_id, project_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(name)
        .bind(crew.description.as_deref().unwrap_or(""))
        .bind(crew.status.as_deref().unwrap_or("active"))
        .bind(crew.leader_user_id)
        .bind(crew.project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, update: CrewUpdate) -> Result<Option<Crew>> {
        let mut changes = Changes::new("crews");
        changes
            .set("name", update.name)
            .set("description", update.description)
            .set("status", update.status)
            .set("leader_user_id", update.leader_user_id)
            .set("project_id", update.project_id);
        if changes.is_empty() {
            return Ok(None);
        }
        changes.set_raw("updated_at = NOW()");

        let mut query = changes.finish(id, "*");
        let crew = query.build_query_as::<Crew>().fetch_one(&self.pool).await?;
        Ok(Some(crew))
    }

    /// Remove members first, then the crew itself
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM crew_members WHERE crew_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query_scalar::<_, Uuid>("DELETE FROM crews WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn members(&self, crew_id: Uuid) -> Result<Vec<CrewMember>> {
        let members = sqlx::query_as::<_, CrewMember>(&format!(
            "{} WHERE cm.crew_id = $1 ORDER BY cm.joined_at",
            MEMBER_SELECT
        ))
        .bind(crew_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    pub async fn is_member(&self, crew_id: Uuid, user_id: Uuid) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM crew_members WHERE crew_id = $1 AND user_id = $2)",
        )
        .bind(crew_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    pub async fn add_member(&self, crew_id: Uuid, user_id: Uuid, role: &str) -> Result<CrewMember> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO crew_members (crew_id, user_id, role) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(crew_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        let member = sqlx::query_as::<_, CrewMember>(&format!("{} WHERE cm.id = $1", MEMBER_SELECT))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(member)
    }

    /// Crews working on a project, with leaders and active members
    pub async fn project_team(&self, project_id: Uuid) -> Result<Vec<CrewDetail>> {
        let crews = sqlx::query_as::<_, Crew>(
            "SELECT * FROM crews WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        self.attach_people(crews).await
    }

    /// Create a crew on a project together with its members
    pub async fn create_team(
        &self,
        project_id: Uuid,
        crew_name: &str,
        leader_user_id: Option<Uuid>,
        member_user_ids: &[Uuid],
    ) -> Result<CrewDetail> {
        let mut tx = self.pool.begin().await?;

        let crew_id: Uuid = sqlx::query_scalar(
            "INSERT INTO crews (name, status, leader_user_id, project_id) \
             VALUES ($1, 'active', $2, $3) RETURNING id",
        )
        .bind(crew_name)
        .bind(leader_user_id)
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await?;

        for user_id in member_user_ids {
            sqlx::query(
                "INSERT INTO crew_members (crew_id, user_id, role) VALUES ($1, $2, 'member') \
                 ON CONFLICT (crew_id, user_id) DO NOTHING",
            )
            .bind(crew_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get(crew_id).await
    }

    pub async fn remove_member(&self, crew_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM crew_members WHERE crew_id = $1 AND user_id = $2 RETURNING id",
        )
        .bind(crew_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(())
    }
}

/// `{ total_crews, active_crews, total_members }` for a listed page
pub fn crew_summary(total: i64, crews: &[CrewDetail]) -> Value {
    json!({
        "total_crews": total,
        "active_crews": crews.iter().filter(|c| c.crew.status == "active").count(),
        "total_members": crews.iter().map(CrewDetail::member_count).sum::<usize>(),
    })
}

/// Head counts across every crew of a project
///
/// Crew leaders and members holding the `leader` or `foreman` crew role count
/// as foremen; `member`, `worker` and `trainee` count as workers.
pub fn team_summary(crews: &[CrewDetail]) -> Value {
    let member_roles = |roles: &[&str]| -> usize {
        crews
            .iter()
            .flat_map(|c| c.members.iter())
            .filter(|m| roles.contains(&m.role.as_str()))
            .count()
    };
    let leaders = crews.iter().filter(|c| c.leader.is_some()).count();

    json!({
        "total_crews": crews.len(),
        "total_members": crews.iter().map(CrewDetail::member_count).sum::<usize>(),
        "foreman_count": leaders + member_roles(&["leader", "foreman"]),
        "worker_count": member_roles(&["member", "worker", "trainee"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crew(leader: Option<Uuid>) -> Crew {
        Crew {
            id: Uuid::new_v4(),
            name: "Tiefbau Nord".into(),
            description: String::new(),
            status: "active".into(),
            leader_user_id: leader,
            project_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn member(crew_id: Uuid) -> CrewMember {
        CrewMember {
            id: Uuid::new_v4(),
            crew_id,
            user_id: Uuid::new_v4(),
            role: "member".into(),
            is_active: true,
            joined_at: Utc::now(),
            first_name: "Jonas".into(),
            last_name: "Weber".into(),
            email: None,
            user_role: "worker".into(),
        }
    }

    #[test]
    fn leader_is_listed_first_and_counted() {
        let leader_id = Uuid::new_v4();
        let c = crew(Some(leader_id));
        let detail = CrewDetail {
            members: vec![member(c.id), member(c.id)],
            leader: Some(Leader {
                id: leader_id,
                first_name: "Anna".into(),
                last_name: "Keller".into(),
                email: Some("anna@cometa.de".into()),
                role: "foreman".into(),
            }),
            crew: c,
        };

        let body = detail.to_json();
        assert_eq!(body["member_count"], 3);
        assert_eq!(body["members"][0]["role"], "leader");
        assert_eq!(body["members"][0]["full_name"], "Anna Keller");
        assert_eq!(body["foreman"]["role"], "foreman");
    }

    #[test]
    fn crew_without_leader_has_no_foreman() {
        let c = crew(None);
        let detail = CrewDetail {
            members: vec![member(c.id)],
            leader: None,
            crew: c,
        };
        let body = detail.to_json();
        assert_eq!(body["member_count"], 1);
        assert!(body["foreman"].is_null());
    }

    #[test]
    fn team_summary_splits_foremen_and_workers() {
        let leader_id = Uuid::new_v4();
        let a = crew(Some(leader_id));
        let b = crew(None);
        let mut foreman = member(b.id);
        foreman.role = "foreman".into();
        let details = vec![
            CrewDetail {
                members: vec![member(a.id), member(a.id)],
                leader: Some(Leader {
                    id: leader_id,
                    first_name: "Anna".into(),
                    last_name: "Keller".into(),
                    email: None,
                    role: "foreman".into(),
                }),
                crew: a,
            },
            CrewDetail { members: vec![foreman, member(b.id)], leader: None, crew: b },
        ];

        let summary = team_summary(&details);
        assert_eq!(summary["total_crews"], 2);
        assert_eq!(summary["total_members"], 5);
        assert_eq!(summary["foreman_count"], 2);
        assert_eq!(summary["worker_count"], 3);
    }

    #[test]
    fn summary_counts_members_across_page() {
        let a = crew(None);
        let mut b = crew(None);
        b.status = "inactive".into();
        let details = vec![
            CrewDetail { members: vec![member(a.id)], leader: None, crew: a },
            CrewDetail { members: vec![], leader: None, crew: b },
        ];
        let summary = crew_summary(2, &details);
        assert_eq!(summary["active_crews"], 1);
        assert_eq!(summary["total_members"], 1);
    }
}
