use super::types::{Attribute, Context, EntityStatus, Identity, Person, PrimaryKeyType};
use crate::database::TenantPool;
use crate::error::Result;
use crate::types::{AttributeId, ContextId, IdentityId, PersonId, TenantId};
use async_trait::async_trait;
use sqlx::Row;

/// Persistence boundary for the identity graph. Split by entity rather
/// than one mega-trait so a future split into separate repositories per
/// aggregate (per the persistence contract in the component design) costs
/// nothing.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn create_person(&self, tenant: &TenantPool, person: &Person) -> Result<()>;
    async fn get_person(&self, tenant: &TenantPool, tenant_id: TenantId, id: PersonId) -> Result<Option<Person>>;

    async fn create_identity(&self, tenant: &TenantPool, identity: &Identity) -> Result<()>;
    async fn get_identity(&self, tenant: &TenantPool, tenant_id: TenantId, id: IdentityId) -> Result<Option<Identity>>;
    async fn find_identity_by_key(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        key_type: &PrimaryKeyType,
        key_value: &str,
    ) -> Result<Option<Identity>>;
    async fn list_identities_by_person(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        person_id: PersonId,
    ) -> Result<Vec<Identity>>;

    async fn create_context(&self, tenant: &TenantPool, context: &Context) -> Result<()>;
    async fn get_context(&self, tenant: &TenantPool, tenant_id: TenantId, id: ContextId) -> Result<Option<Context>>;
    async fn update_context(&self, tenant: &TenantPool, context: &Context) -> Result<()>;
    async fn list_contexts_by_identity(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        identity_id: IdentityId,
    ) -> Result<Vec<Context>>;

    async fn create_attribute(&self, tenant: &TenantPool, attribute: &Attribute) -> Result<()>;
    async fn get_attribute(&self, tenant: &TenantPool, tenant_id: TenantId, id: AttributeId) -> Result<Option<Attribute>>;
    async fn update_attribute(&self, tenant: &TenantPool, attribute: &Attribute) -> Result<()>;
    async fn list_attributes_by_context(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        context_id: ContextId,
    ) -> Result<Vec<Attribute>>;
    async fn search_attributes(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        key: &str,
        value_contains: &str,
    ) -> Result<Vec<Attribute>>;
}

pub struct DatabaseIdentityRepository;

impl DatabaseIdentityRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn initialize(&self, tenant: &TenantPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identity_persons (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                data JSONB NOT NULL
            )
            "#,
        )
        .execute(tenant.get())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identities (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                person_id UUID NOT NULL,
                primary_key_type TEXT NOT NULL,
                primary_key_value TEXT NOT NULL,
                data JSONB NOT NULL,
                UNIQUE (tenant_id, primary_key_type, primary_key_value)
            )
            "#,
        )
        .execute(tenant.get())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identity_contexts (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                identity_id UUID NOT NULL,
                data JSONB NOT NULL
            )
            "#,
        )
        .execute(tenant.get())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identity_attributes (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                context_id UUID NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                data JSONB NOT NULL
            )
            "#,
        )
        .execute(tenant.get())
        .await?;

        Ok(())
    }
}

fn key_type_text(key_type: &PrimaryKeyType) -> String {
    match key_type {
        PrimaryKeyType::Email => "email".to_string(),
        PrimaryKeyType::NationalId => "national_id".to_string(),
        PrimaryKeyType::Mobile => "mobile".to_string(),
        PrimaryKeyType::Custom(name) => format!("custom:{}", name),
    }
}

#[async_trait]
impl IdentityRepository for DatabaseIdentityRepository {
    async fn create_person(&self, tenant: &TenantPool, person: &Person) -> Result<()> {
        let data = serde_json::to_value(person)?;
        sqlx::query("INSERT INTO identity_persons (id, tenant_id, data) VALUES ($1, $2, $3)")
            .bind(person.id.0)
            .bind(person.tenant_id.0)
            .bind(data)
            .execute(tenant.get())
            .await?;
        Ok(())
    }

    async fn get_person(&self, tenant: &TenantPool, tenant_id: TenantId, id: PersonId) -> Result<Option<Person>> {
        let row = sqlx::query("SELECT data FROM identity_persons WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.0)
            .bind(id.0)
            .fetch_optional(tenant.get())
            .await?;
        row.map(|r| Ok(serde_json::from_value(r.try_get("data")?)?)).transpose()
    }

    async fn create_identity(&self, tenant: &TenantPool, identity: &Identity) -> Result<()> {
        let data = serde_json::to_value(identity)?;
        sqlx::query(
            "INSERT INTO identities (id, tenant_id, person_id, primary_key_type, primary_key_value, data) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(identity.id.0)
        .bind(identity.tenant_id.0)
        .bind(identity.person_id.0)
        .bind(key_type_text(&identity.primary_key_type))
        .bind(&identity.primary_key_value)
        .bind(data)
        .execute(tenant.get())
        .await?;
        Ok(())
    }

    async fn get_identity(&self, tenant: &TenantPool, tenant_id: TenantId, id: IdentityId) -> Result<Option<Identity>> {
        let row = sqlx::query("SELECT data FROM identities WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.0)
            .bind(id.0)
            .fetch_optional(tenant.get())
            .await?;
        row.map(|r| Ok(serde_json::from_value(r.try_get("data")?)?)).transpose()
    }

    async fn find_identity_by_key(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        key_type: &PrimaryKeyType,
        key_value: &str,
    ) -> Result<Option<Identity>> {
        let row = sqlx::query(
            "SELECT data FROM identities WHERE tenant_id = $1 AND primary_key_type = $2 AND primary_key_value = $3",
        )
        .bind(tenant_id.0)
        .bind(key_type_text(key_type))
        .bind(key_value)
        .fetch_optional(tenant.get())
        .await?;
        row.map(|r| Ok(serde_json::from_value(r.try_get("data")?)?)).transpose()
    }

    async fn list_identities_by_person(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        person_id: PersonId,
    ) -> Result<Vec<Identity>> {
        let rows = sqlx::query("SELECT data FROM identities WHERE tenant_id = $1 AND person_id = $2")
            .bind(tenant_id.0)
            .bind(person_id.0)
            .fetch_all(tenant.get())
            .await?;
        rows.into_iter()
            .map(|r| Ok(serde_json::from_value(r.try_get("data")?)?))
            .collect()
    }

    async fn create_context(&self, tenant: &TenantPool, context: &Context) -> Result<()> {
        let data = serde_json::to_value(context)?;
        sqlx::query("INSERT INTO identity_contexts (id, tenant_id, identity_id, data) VALUES ($1, $2, $3, $4)")
            .bind(context.id.0)
            .bind(context.tenant_id.0)
            .bind(context.identity_id.0)
            .bind(data)
            .execute(tenant.get())
            .await?;
        Ok(())
    }

    async fn get_context(&self, tenant: &TenantPool, tenant_id: TenantId, id: ContextId) -> Result<Option<Context>> {
        let row = sqlx::query("SELECT data FROM identity_contexts WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.0)
            .bind(id.0)
            .fetch_optional(tenant.get())
            .await?;
        row.map(|r| Ok(serde_json::from_value(r.try_get("data")?)?)).transpose()
    }

    async fn update_context(&self, tenant: &TenantPool, context: &Context) -> Result<()> {
        let data = serde_json::to_value(context)?;
        sqlx::query("UPDATE identity_contexts SET data = $1 WHERE tenant_id = $2 AND id = $3")
            .bind(data)
            .bind(context.tenant_id.0)
            .bind(context.id.0)
            .execute(tenant.get())
            .await?;
        Ok(())
    }

    async fn list_contexts_by_identity(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        identity_id: IdentityId,
    ) -> Result<Vec<Context>> {
        let rows = sqlx::query("SELECT data FROM identity_contexts WHERE tenant_id = $1 AND identity_id = $2")
            .bind(tenant_id.0)
            .bind(identity_id.0)
            .fetch_all(tenant.get())
            .await?;
        rows.into_iter()
            .map(|r| Ok(serde_json::from_value(r.try_get("data")?)?))
            .collect()
    }

    async fn create_attribute(&self, tenant: &TenantPool, attribute: &Attribute) -> Result<()> {
        let data = serde_json::to_value(attribute)?;
        sqlx::query(
            "INSERT INTO identity_attributes (id, tenant_id, context_id, key, value, data) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(attribute.id.0)
        .bind(attribute.tenant_id.0)
        .bind(attribute.context_id.0)
        .bind(&attribute.key)
        .bind(&attribute.value)
        .bind(data)
        .execute(tenant.get())
        .await?;
        Ok(())
    }

    async fn get_attribute(&self, tenant: &TenantPool, tenant_id: TenantId, id: AttributeId) -> Result<Option<Attribute>> {
        let row = sqlx::query("SELECT data FROM identity_attributes WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.0)
            .bind(id.0)
            .fetch_optional(tenant.get())
            .await?;
        row.map(|r| Ok(serde_json::from_value(r.try_get("data")?)?)).transpose()
    }

    async fn update_attribute(&self, tenant: &TenantPool, attribute: &Attribute) -> Result<()> {
        let data = serde_json::to_value(attribute)?;
        sqlx::query("UPDATE identity_attributes SET value = $1, data = $2 WHERE tenant_id = $3 AND id = $4")
            .bind(&attribute.value)
            .bind(data)
            .bind(attribute.tenant_id.0)
            .bind(attribute.id.0)
            .execute(tenant.get())
            .await?;
        Ok(())
    }

    async fn list_attributes_by_context(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        context_id: ContextId,
    ) -> Result<Vec<Attribute>> {
        let rows = sqlx::query("SELECT data FROM identity_attributes WHERE tenant_id = $1 AND context_id = $2")
            .bind(tenant_id.0)
            .bind(context_id.0)
            .fetch_all(tenant.get())
            .await?;
        rows.into_iter()
            .map(|r| Ok(serde_json::from_value(r.try_get("data")?)?))
            .collect()
    }

    async fn search_attributes(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        key: &str,
        value_contains: &str,
    ) -> Result<Vec<Attribute>> {
        let pattern = format!("%{}%", value_contains);
        let rows = sqlx::query(
            "SELECT data FROM identity_attributes WHERE tenant_id = $1 AND key = $2 AND value ILIKE $3",
        )
        .bind(tenant_id.0)
        .bind(key)
        .bind(pattern)
        .fetch_all(tenant.get())
        .await?;
        rows.into_iter()
            .map(|r| Ok(serde_json::from_value(r.try_get("data")?)?))
            .collect()
    }
}

impl EntityStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, EntityStatus::Active)
    }
}
