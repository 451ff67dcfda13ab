use super::repository::IdentityRepository;
use super::trust::{DefaultTrustScoreEvaluator, TrustScoreEvaluator};
use super::types::{
    Attribute, AttributeVerificationStatus, Context, EntityStatus, Identity, Person, PrimaryKeyType, Sensitivity,
    TrustScoreEntry, VerificationLevel, TRUST_SCORE_HISTORY_LIMIT,
};
use crate::audit::{AuditLogger, EventType};
use crate::database::TenantPool;
use crate::error::{Error, Result};
use crate::jobs::traits::JobQueue;
use crate::jobs::types::{JobPriority, QueuedJob, SerializableJob};
use crate::types::{AttributeId, ContextId, IdentityId, PersonId, TenantContext};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Trust score delta that, when it leaves the score below 0.4, is flagged
/// as a significant degradation on the owning context.
const TRUST_DEGRADATION_DELTA: f64 = 0.2;
const TRUST_DEGRADATION_FLOOR: f64 = 0.4;

/// A background job requesting out-of-band re-verification of a single
/// attribute. Enqueued, never awaited inline, whenever a high-or-above
/// sensitivity attribute's value changes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AttributeReverificationJob {
    pub tenant_id: Uuid,
    pub schema_name: String,
    pub attribute_id: Uuid,
}

impl SerializableJob for AttributeReverificationJob {
    fn job_type(&self) -> &'static str {
        "identity.attribute_reverification"
    }

    fn serialize(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn deserialize(data: &serde_json::Value) -> std::result::Result<Box<dyn SerializableJob>, serde_json::Error> {
        let job: AttributeReverificationJob = serde_json::from_value(data.clone())?;
        Ok(Box::new(job))
    }

    fn priority(&self) -> JobPriority {
        JobPriority::High
    }

    fn metadata(&self) -> HashMap<String, serde_json::Value> {
        let mut m = HashMap::new();
        m.insert("attribute_id".to_string(), json!(self.attribute_id));
        m
    }
}

/// Orchestrates the person/identity/context/attribute graph: creation,
/// monotone verification-level progression, trust-score tracking, and
/// attribute verification with forced demotion on mutation.
pub struct IdentityGraphService {
    repository: Arc<dyn IdentityRepository>,
    audit: AuditLogger,
    jobs: Option<Arc<dyn JobQueue>>,
    trust_evaluator: Arc<dyn TrustScoreEvaluator>,
}

impl IdentityGraphService {
    pub fn new(repository: Arc<dyn IdentityRepository>, audit: AuditLogger, jobs: Option<Arc<dyn JobQueue>>) -> Self {
        Self {
            repository,
            audit,
            jobs,
            trust_evaluator: Arc::new(DefaultTrustScoreEvaluator),
        }
    }

    /// Swap in a non-default trust-score model, e.g. one weighting a
    /// tenant's own attribute taxonomy differently.
    pub fn with_trust_evaluator(mut self, evaluator: Arc<dyn TrustScoreEvaluator>) -> Self {
        self.trust_evaluator = evaluator;
        self
    }

    pub async fn create_person(&self, tenant: &TenantPool, tenant_ctx: &TenantContext) -> Result<Person> {
        let now = Utc::now();
        let person = Person {
            id: PersonId(Uuid::new_v4()),
            tenant_id: tenant_ctx.tenant_id,
            status: EntityStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.repository.create_person(tenant, &person).await?;
        Ok(person)
    }

    /// Link a new identifying key to `person_id`. Fails if the key is
    /// already bound to any identity within the tenant.
    pub async fn create_identity(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        person_id: PersonId,
        key_type: PrimaryKeyType,
        key_value: String,
    ) -> Result<Identity> {
        if let Some(_existing) = self
            .repository
            .find_identity_by_key(tenant, tenant_ctx.tenant_id, &key_type, &key_value)
            .await?
        {
            return Err(Error::conflict("identity key already linked within this tenant"));
        }

        let now = Utc::now();
        let identity = Identity {
            id: IdentityId(Uuid::new_v4()),
            tenant_id: tenant_ctx.tenant_id,
            person_id,
            primary_key_type: key_type,
            primary_key_value: key_value,
            status: EntityStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.repository.create_identity(tenant, &identity).await?;

        self.audit
            .log_identity_event(
                EventType::IdentityLinked,
                &identity.id.to_string(),
                format!("identity linked to person {}", person_id),
            )
            .await?;

        Ok(identity)
    }

    pub async fn get_identity(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        id: IdentityId,
    ) -> Result<Identity> {
        self.repository
            .get_identity(tenant, tenant_ctx.tenant_id, id)
            .await?
            .ok_or_else(|| Error::not_found("identity not found"))
    }

    pub async fn list_identities(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        person_id: PersonId,
    ) -> Result<Vec<Identity>> {
        self.repository
            .list_identities_by_person(tenant, tenant_ctx.tenant_id, person_id)
            .await
    }

    /// Create a new context under `identity_id`. When `copy_attributes_from`
    /// names an existing context, every one of its attributes is copied
    /// onto the new context, with verification state demoted to `Pending`
    /// wherever sensitivity is `High` or above (the prior verification
    /// doesn't carry authority into a context it wasn't performed for).
    pub async fn add_context(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        identity_id: IdentityId,
        context_type: String,
        copy_attributes_from: Option<ContextId>,
    ) -> Result<Context> {
        let now = Utc::now();
        let context = Context {
            id: ContextId(Uuid::new_v4()),
            tenant_id: tenant_ctx.tenant_id,
            identity_id,
            context_type,
            verification_level: VerificationLevel::None,
            trust_score: 0.0,
            trust_score_history: Vec::new(),
            significant_trust_degradation: false,
            status: EntityStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.repository.create_context(tenant, &context).await?;

        self.audit
            .log_identity_event(
                EventType::ContextCreated,
                &context.id.to_string(),
                format!("context '{}' created for identity {}", context.context_type, identity_id),
            )
            .await?;

        if let Some(source_context_id) = copy_attributes_from {
            let source_attributes = self
                .repository
                .list_attributes_by_context(tenant, tenant_ctx.tenant_id, source_context_id)
                .await?;

            for source in &source_attributes {
                let demote = source.sensitivity >= Sensitivity::High;
                let copied_at = Utc::now();
                let copied = Attribute {
                    id: AttributeId(Uuid::new_v4()),
                    tenant_id: tenant_ctx.tenant_id,
                    context_id: context.id,
                    key: source.key.clone(),
                    value: source.value.clone(),
                    sensitivity: source.sensitivity,
                    verification_status: if demote {
                        AttributeVerificationStatus::Pending
                    } else {
                        source.verification_status
                    },
                    verification_source: if demote { None } else { source.verification_source.clone() },
                    verification_notes: if demote { None } else { source.verification_notes.clone() },
                    evidence_metadata: if demote { None } else { source.evidence_metadata.clone() },
                    created_at: copied_at,
                    updated_at: copied_at,
                };
                self.repository.create_attribute(tenant, &copied).await?;
            }

            if !source_attributes.is_empty() {
                self.audit
                    .log_identity_event(
                        EventType::AttributeAdded,
                        &context.id.to_string(),
                        format!(
                            "{} attribute(s) copied into context {} from context {}",
                            source_attributes.len(),
                            context.id,
                            source_context_id
                        ),
                    )
                    .await?;
            }
        }

        Ok(context)
    }

    pub async fn get_context(&self, tenant: &TenantPool, tenant_ctx: &TenantContext, id: ContextId) -> Result<Context> {
        self.repository
            .get_context(tenant, tenant_ctx.tenant_id, id)
            .await?
            .ok_or_else(|| Error::not_found("context not found"))
    }

    pub async fn list_contexts(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        identity_id: IdentityId,
    ) -> Result<Vec<Context>> {
        self.repository
            .list_contexts_by_identity(tenant, tenant_ctx.tenant_id, identity_id)
            .await
    }

    /// Raise a context's verification level. Refuses any target level
    /// below the current one.
    pub async fn update_context_verification_level(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        context_id: ContextId,
        new_level: VerificationLevel,
    ) -> Result<Context> {
        let mut context = self.get_context(tenant, tenant_ctx, context_id).await?;

        if new_level < context.verification_level {
            return Err(Error::precondition_failed(format!(
                "verification level cannot regress from {:?} to {:?}",
                context.verification_level, new_level
            )));
        }

        let previous = context.verification_level;
        context.verification_level = new_level;
        context.updated_at = Utc::now();
        self.repository.update_context(tenant, &context).await?;

        if previous != new_level {
            self.audit
                .log_identity_event(
                    EventType::ContextVerificationLevelChanged,
                    &context.id.to_string(),
                    format!("verification level raised from {:?} to {:?}", previous, new_level),
                )
                .await?;
        }

        Ok(context)
    }

    /// Append a trust-score observation, bounding history length and
    /// flagging a significant degradation when the score drops by at
    /// least 0.2 into the sub-0.4 range.
    pub async fn update_context_trust_score(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        context_id: ContextId,
        new_score: f64,
    ) -> Result<Context> {
        let new_score = new_score.clamp(0.0, 1.0);
        let mut context = self.get_context(tenant, tenant_ctx, context_id).await?;

        let previous_score = context.trust_score;
        let delta = previous_score - new_score;
        if delta >= TRUST_DEGRADATION_DELTA && new_score < TRUST_DEGRADATION_FLOOR {
            context.significant_trust_degradation = true;
            warn!(
                context_id = %context.id,
                previous_score,
                new_score,
                "significant trust degradation detected"
            );
        }

        context.trust_score = new_score;
        context.trust_score_history.push(TrustScoreEntry {
            score: new_score,
            recorded_at: Utc::now(),
        });
        if context.trust_score_history.len() > TRUST_SCORE_HISTORY_LIMIT {
            let excess = context.trust_score_history.len() - TRUST_SCORE_HISTORY_LIMIT;
            context.trust_score_history.drain(0..excess);
        }
        context.updated_at = Utc::now();

        self.repository.update_context(tenant, &context).await?;
        Ok(context)
    }

    /// Attach a new attribute to a context. Sensitivity at or above
    /// `High` starts the attribute in `Pending` regardless of caller
    /// intent, since no verification has occurred yet.
    pub async fn add_attribute(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        context_id: ContextId,
        key: String,
        value: String,
        sensitivity: Sensitivity,
    ) -> Result<Attribute> {
        let now = Utc::now();
        let attribute = Attribute {
            id: AttributeId(Uuid::new_v4()),
            tenant_id: tenant_ctx.tenant_id,
            context_id,
            key,
            value,
            sensitivity,
            verification_status: AttributeVerificationStatus::Pending,
            verification_source: None,
            verification_notes: None,
            evidence_metadata: None,
            created_at: now,
            updated_at: now,
        };
        self.repository.create_attribute(tenant, &attribute).await?;

        self.audit
            .log_identity_event(
                EventType::AttributeAdded,
                &attribute.id.to_string(),
                format!("attribute '{}' added to context {}", attribute.key, context_id),
            )
            .await?;

        Ok(attribute)
    }

    /// Change an attribute's value. If the attribute was `Verified`, the
    /// mutation forces it back to `Pending` since the prior verification
    /// no longer covers the new value. High/critical sensitivity
    /// attributes additionally get an out-of-band re-verification job
    /// enqueued, fire-and-forget.
    pub async fn update_attribute_value(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        attribute_id: AttributeId,
        new_value: String,
    ) -> Result<Attribute> {
        let mut attribute = self
            .repository
            .get_attribute(tenant, tenant_ctx.tenant_id, attribute_id)
            .await?
            .ok_or_else(|| Error::not_found("attribute not found"))?;

        let was_verified = attribute.verification_status == AttributeVerificationStatus::Verified;
        attribute.value = new_value;
        if was_verified {
            attribute.verification_status = AttributeVerificationStatus::Pending;
            attribute.verification_source = None;
        }
        attribute.updated_at = Utc::now();
        self.repository.update_attribute(tenant, &attribute).await?;

        if was_verified {
            self.audit
                .log_identity_event(
                    EventType::AttributeDemoted,
                    &attribute.id.to_string(),
                    format!("attribute '{}' demoted to pending after value change", attribute.key),
                )
                .await?;
        }

        if attribute.sensitivity.requires_auto_reverification() {
            self.enqueue_reverification(tenant_ctx, &attribute).await;
        }

        Ok(attribute)
    }

    /// Mark an attribute as verified. Requires a non-empty verification
    /// source (e.g. the name of the document/authority that verified it)
    /// and optional `evidence_metadata` describing what was checked (e.g.
    /// document type, issuer, check reference). Recomputes and persists
    /// the owning context's trust score from its full attribute set via
    /// the configured `TrustScoreEvaluator`.
    pub async fn verify_attribute(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        attribute_id: AttributeId,
        verification_source: String,
        verification_notes: Option<String>,
        evidence_metadata: Option<serde_json::Value>,
    ) -> Result<Attribute> {
        if verification_source.trim().is_empty() {
            return Err(Error::invalid_input("verification source must not be empty"));
        }

        let mut attribute = self
            .repository
            .get_attribute(tenant, tenant_ctx.tenant_id, attribute_id)
            .await?
            .ok_or_else(|| Error::not_found("attribute not found"))?;

        attribute.verification_status = AttributeVerificationStatus::Verified;
        attribute.verification_source = Some(verification_source);
        attribute.verification_notes = verification_notes;
        attribute.evidence_metadata = evidence_metadata;
        attribute.updated_at = Utc::now();
        self.repository.update_attribute(tenant, &attribute).await?;

        self.audit
            .log_identity_event(
                EventType::AttributeVerified,
                &attribute.id.to_string(),
                format!("attribute '{}' verified", attribute.key),
            )
            .await?;

        let context_attributes = self
            .repository
            .list_attributes_by_context(tenant, tenant_ctx.tenant_id, attribute.context_id)
            .await?;
        let new_score = self.trust_evaluator.evaluate(&context_attributes);
        self.update_context_trust_score(tenant, tenant_ctx, attribute.context_id, new_score)
            .await?;

        Ok(attribute)
    }

    pub async fn list_attributes(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        context_id: ContextId,
    ) -> Result<Vec<Attribute>> {
        self.repository
            .list_attributes_by_context(tenant, tenant_ctx.tenant_id, context_id)
            .await
    }

    pub async fn search_attributes(
        &self,
        tenant: &TenantPool,
        tenant_ctx: &TenantContext,
        key: &str,
        value_contains: &str,
    ) -> Result<Vec<Attribute>> {
        self.repository
            .search_attributes(tenant, tenant_ctx.tenant_id, key, value_contains)
            .await
    }

    async fn enqueue_reverification(&self, tenant_ctx: &TenantContext, attribute: &Attribute) {
        let Some(jobs) = &self.jobs else { return };

        let job = AttributeReverificationJob {
            tenant_id: tenant_ctx.tenant_id.0,
            schema_name: tenant_ctx.schema_name.clone(),
            attribute_id: attribute.id.0,
        };

        let queued = match QueuedJob::new(&job) {
            Ok(q) => q,
            Err(e) => {
                warn!(attribute_id = %attribute.id, error = %e, "failed to serialize reverification job");
                return;
            }
        };

        if let Err(e) = jobs.enqueue(queued).await {
            warn!(attribute_id = %attribute.id, error = %e, "failed to enqueue attribute reverification job");
        }
    }
}
