//! PostgreSQL adapter for the principal store and the audit sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;

use crate::models::{AppRole, AuditRecord, NewPrincipal, Principal, Resource, RoleGrant};

use super::store::{AuditSink, PrincipalStore};
use super::ServiceError;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PrincipalRow {
    id: i64,
    email: String,
    full_name: String,
    password_hash: String,
    role: String,
    mfa_enabled: bool,
    mfa_secret: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PrincipalRow> for Principal {
    fn from(row: PrincipalRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            role: AppRole::from(row.role),
            password_hash: row.password_hash,
            mfa_enabled: row.mfa_enabled,
            mfa_secret: row.mfa_secret,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RoleGrantRow {
    id: i64,
    name: String,
    arn: String,
    description: String,
    env: String,
    risk_level: String,
}

impl From<RoleGrantRow> for RoleGrant {
    fn from(row: RoleGrantRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            arn: row.arn,
            description: row.description,
            env: row.env,
            risk_level: row.risk_level.into(),
        }
    }
}

#[derive(Debug, FromRow)]
struct ResourceRow {
    id: i64,
    name: String,
    #[sqlx(rename = "type")]
    resource_type: String,
    sensitivity: String,
    created_at: DateTime<Utc>,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            resource_type: row.resource_type,
            sensitivity: row.sensitivity.into(),
            created_at: row.created_at,
        }
    }
}

const PRINCIPAL_COLUMNS: &str =
    "id, email, full_name, password_hash, role, mfa_enabled, mfa_secret, created_at";

#[async_trait]
impl PrincipalStore for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                ServiceError::Database(e)
            })?;
        Ok(())
    }

    async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>, ServiceError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Principal::from))
    }

    async fn find_principal_by_id(&self, id: i64) -> Result<Option<Principal>, ServiceError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Principal::from))
    }

    async fn insert_principal(&self, new: NewPrincipal) -> Result<Option<Principal>, ServiceError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            r#"
            INSERT INTO users (email, full_name, password_hash, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Principal::from))
    }

    async fn set_mfa_secret(&self, id: i64, secret: &str) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE users SET mfa_secret = $1, mfa_enabled = FALSE, updated_at = NOW() WHERE id = $2",
        )
        .bind(secret)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::UserNotFound);
        }
        Ok(())
    }

    async fn enable_mfa(&self, id: i64, secret: &str) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE users SET mfa_enabled = TRUE, updated_at = NOW() WHERE id = $1 AND mfa_secret = $2",
        )
        .bind(id)
        .bind(secret)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_role(&self, id: i64, role: &AppRole) -> Result<Option<Principal>, ServiceError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "UPDATE users SET role = $1, updated_at = NOW() WHERE id = $2 RETURNING {PRINCIPAL_COLUMNS}"
        ))
        .bind(role.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Principal::from))
    }

    async fn role_grants_for(
        &self,
        principal_id: i64,
        role: &AppRole,
    ) -> Result<Vec<RoleGrant>, ServiceError> {
        let rows = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT DISTINCT r.id, r.name, r.arn, r.description, r.env, r.risk_level
            FROM aws_roles r
            JOIN aws_role_grants g ON g.aws_role_id = r.id
            WHERE g.app_role = $1 OR g.user_id = $2
            ORDER BY r.id
            "#,
        )
        .bind(role.as_str())
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RoleGrant::from).collect())
    }

    async fn resources_visible_to(
        &self,
        principal_id: i64,
        role: &AppRole,
    ) -> Result<Vec<Resource>, ServiceError> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT DISTINCT r.id, r.name, r.type, r.sensitivity, r.created_at
            FROM resources r
            JOIN resource_grants g ON g.resource_id = r.id
            WHERE (g.app_role = $1 OR g.user_id = $2)
              AND 'read' = ANY(g.allowed_actions)
            ORDER BY r.id
            "#,
        )
        .bind(role.as_str())
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Resource::from).collect())
    }
}

#[async_trait]
impl AuditSink for Database {
    async fn record(&self, record: &AuditRecord) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO access_logs
                (event, user_id, role, resource_name, action, decision, policy_name,
                 decision_reason, path, method, ip, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.event.as_str())
        .bind(record.principal_id)
        .bind(&record.role)
        .bind(&record.resource_name)
        .bind(&record.action)
        .bind(record.decision_label())
        .bind(&record.policy_name)
        .bind(&record.reason)
        .bind(&record.path)
        .bind(&record.method)
        .bind(&record.ip)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to write access log: {}", e))?;
        Ok(())
    }
}
