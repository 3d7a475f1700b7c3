use crate::{
    authz::PermissionCheck,
    engine::EngineContext,
    error::{EngineError, EngineResult},
    models::{
        Authentication, CreateDefinition, CreateUserOperation, Definition, DefinitionKind,
        OperationCategory, Permission, PropertyChange, entity_types, operation_types,
    },
};

fn definition_entity(kind: DefinitionKind) -> &'static str {
    match kind {
        DefinitionKind::Process => entity_types::PROCESS_DEFINITION,
        DefinitionKind::Decision => entity_types::DECISION_DEFINITION,
        DefinitionKind::Case => entity_types::CASE_DEFINITION,
    }
}

/// Deployed definitions and their history time to live.
pub struct RepositoryService<'a> {
    ctx: &'a EngineContext,
    auth: Option<&'a Authentication>,
}

impl<'a> RepositoryService<'a> {
    pub fn new(ctx: &'a EngineContext, auth: Option<&'a Authentication>) -> Self {
        Self { ctx, auth }
    }

    /// Deploy a definition. Definitions without a TTL of their own receive
    /// the engine-wide default.
    pub async fn deploy(&self, mut input: CreateDefinition) -> EngineResult<Definition> {
        self.ctx.authz.check_admin(self.auth)?;
        if input.key.trim().is_empty() {
            return Err(EngineError::bad_request("Definition key is empty"));
        }
        if let Some(days) = input.history_time_to_live
            && days < 0
        {
            return Err(EngineError::bad_request(format!(
                "History time to live cannot be negative: {}",
                days
            )));
        }
        if input.history_time_to_live.is_none() {
            input.history_time_to_live = self.ctx.default_ttl_days;
        }

        let definition = self.ctx.db.definitions().create(input).await?;
        tracing::info!(
            definition_id = %definition.id,
            kind = %definition.kind,
            key = %definition.key,
            version = definition.version,
            history_time_to_live = ?definition.history_time_to_live,
            "Definition deployed"
        );
        Ok(definition)
    }

    pub async fn get_definition(&self, id: &str) -> EngineResult<Definition> {
        let definition = self
            .ctx
            .db
            .definitions()
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("No definition found with id: {}", id)))?;
        self.ctx
            .authz
            .check(
                self.auth,
                PermissionCheck::new(
                    Permission::Read,
                    definition.kind.resource(),
                    &definition.key,
                ),
            )
            .await?;
        Ok(definition)
    }

    /// Definitions of a kind the caller may read.
    pub async fn list_definitions(&self, kind: DefinitionKind) -> EngineResult<Vec<Definition>> {
        let mut visible = Vec::new();
        for definition in self.ctx.db.definitions().list(kind).await? {
            let check = PermissionCheck::new(
                Permission::Read,
                kind.resource(),
                &definition.key,
            );
            if self.ctx.authz.is_granted_any(self.auth, &[check]).await? {
                visible.push(definition);
            }
        }
        Ok(visible)
    }

    /// Change the TTL of a definition. Removal times already assigned are
    /// not recalculated.
    pub async fn update_history_time_to_live(&self, id: &str, days: Option<i32>) -> EngineResult<()> {
        if let Some(days) = days
            && days < 0
        {
            return Err(EngineError::bad_request(format!(
                "History time to live cannot be negative: {}",
                days
            )));
        }
        let definition = self
            .ctx
            .db
            .definitions()
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("No definition found with id: {}", id)))?;
        self.ctx
            .authz
            .check(
                self.auth,
                PermissionCheck::new(
                    Permission::Update,
                    definition.kind.resource(),
                    &definition.key,
                ),
            )
            .await?;

        self.ctx
            .db
            .definitions()
            .update_history_time_to_live(id, days)
            .await?;
        self.ctx
            .log_operation(
                CreateUserOperation::new(
                    operation_types::UPDATE_HISTORY_TIME_TO_LIVE,
                    definition_entity(definition.kind),
                    OperationCategory::Operator,
                    self.auth.map(|a| a.user_id.clone()),
                )
                .with_change(PropertyChange::new(
                    "historyTimeToLive",
                    definition.history_time_to_live.map(|d| d.to_string()),
                    days.map(|d| d.to_string()),
                )),
            )
            .await?;
        Ok(())
    }
}
