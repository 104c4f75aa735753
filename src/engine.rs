//! Engine (spec §6): wires every storage/system module behind one
//! `dispatch` entry point keyed on the wire `Operation` enum, running the
//! write validator ahead of changelog writes, upserting L0 after component
//! mutations, and emitting a post-write event after every mutating call.
//!
//! Grounded on the teacher's own top-level dispatcher pattern (a single
//! struct holding every subsystem, matched over a closed request enum);
//! generalized here from that crate's FFI-facing dispatch to this engine's
//! stdio-facing one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::changelog::{ChangelogEngine, EntryKind, QueryInput, RecordInput};
use crate::components::ComponentStore;
use crate::config::ConfigStore;
use crate::decay::DecayEngine;
use crate::entities::EntityRegistry;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::ids::IdGenerator;
use crate::index::MasterIndex;
use crate::llm::{LlmCaller, SamplingCallback};
use crate::onboarding::Onboarding;
use crate::protocol::{
    json_to_toml, ChangelogQueryParams, ChangelogRecordParams, ComponentCreateParams,
    ComponentListParams, ConfigGetParams, ConfigReferenceParams, ConfigUpdateParams,
    DecayPinParams, DecayPreviewParams, EntityCreateParams, EntityIdParams,
    EntityLogEvolutionParams, EntityUpdateSoulParams, IndexSearchParams, Operation,
    OnboardingInitParams, RawSearchParams, RelationshipLogInteractionParams,
    RelationshipUpdateProfileParams, RelationshipUpdateTrustParams, ScopeKeyParams,
    ScratchPromoteParams, ScratchReadParams, ScratchWriteParams, SnapshotSaveParams,
    SummaryUpdateParams, SystemConfigureParams, SystemExecuteParams, SystemStatusParams,
    ValidateWriteParams,
};
use crate::relationships::{ProfileUpdate, RelationshipStore};
use crate::scratch::{ReadInput as ScratchReadInput, Scratch, WriteInput as ScratchWriteInput};
use crate::search::external::ExternalCliBackend;
use crate::search::simple::SimpleBackend;
use crate::search::{SearchBackend, SearchRouter};
use crate::snapshot::{SnapshotStore, SnapshotUpdate};
use crate::store::StoreLayout;
use crate::system::{self, SystemContext};
use crate::validator::{ValidateInput, WriteValidator};
use crate::workspace_sync::WorkspaceSync;

/// Entity ID treated as the primary identity for workspace soul mirroring.
/// Open Question: the spec ties `workspace_sync`'s primary-identity mapping
/// to an entity but never names a config key for it. Resolved by fixing it
/// to onboarding's own default agent, since that is the one entity every
/// store is guaranteed to have.
const PRIMARY_ENTITY_ID: &str = "assistant";

pub struct Engine {
    layout: StoreLayout,
    config: Mutex<ConfigStore>,
    ids: IdGenerator,
    events: EventBus,
    router: Arc<SearchRouter>,
    llm: LlmCaller,
    /// Scopes currently loaded via `component_load`, shared across every
    /// `ComponentStore` this engine constructs so `component_unload`'s
    /// "previously loaded" answer survives past the dispatch call that set it.
    loaded_components: Arc<Mutex<HashSet<String>>>,
}

impl Engine {
    /// Initializes the store directory, builds the search backend stack,
    /// and registers the built-in commit + debounced-reindex event handlers.
    pub fn new(
        layout: StoreLayout,
        config: ConfigStore,
        sampling: Option<SamplingCallback>,
    ) -> Result<Self> {
        layout.ensure_initialized()?;
        let typed = config.typed()?;

        let llm = LlmCaller::new(typed.llm.clone(), sampling);

        let mut backends: Vec<Box<dyn SearchBackend>> = Vec::new();
        backends.push(Box::new(ExternalCliBackend::new(
            typed.search.external_cli_binary.clone(),
            typed.search.external_cli_collection.clone(),
        )));
        #[cfg(feature = "advanced-search")]
        backends.push(Box::new(crate::search::bm25::Bm25Backend::new(layout.clone())));
        backends.push(Box::new(SimpleBackend::new(layout.clone())));
        let router = Arc::new(SearchRouter::new(backends));

        let mut events = EventBus::new();
        let vcs = Arc::new(Mutex::new(crate::store::VcsBacker::open_or_init(layout.root())?));
        events.register(Box::new(move |event: &Event| {
            let backer = vcs.lock().unwrap();
            backer.commit(event.scope(), event.summary()).map(|_| ())
        }));

        let auto_reindex = typed.search.auto_reindex;
        let debounce_ms = typed.search.reindex_debounce_ms;
        let reindex_router = Arc::clone(&router);
        events.register(Box::new(move |event: &Event| {
            if auto_reindex && event.changes_searchable_content() {
                reindex_router.schedule_debounced_reindex(debounce_ms, None);
            }
            Ok(())
        }));

        let workspace_sync = WorkspaceSync::new(&layout);
        let primary = EntityRegistry::new(&layout).get(PRIMARY_ENTITY_ID).ok().flatten();
        workspace_sync.sync(&typed.workspace_sync, primary.as_ref().map(|_| PRIMARY_ENTITY_ID))?;

        Ok(Self {
            layout,
            config: Mutex::new(config),
            ids: IdGenerator::new(),
            events,
            router,
            llm,
            loaded_components: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    fn components(&self) -> ComponentStore<'_> {
        ComponentStore::new(&self.layout, Arc::clone(&self.loaded_components))
    }

    fn typed_config(&self) -> Result<crate::config::EngineConfig> {
        self.config.lock().unwrap().typed()
    }

    fn forced_backend(&self) -> Result<Option<String>> {
        let typed = self.typed_config()?;
        Ok(if typed.search.backend == "auto" {
            None
        } else {
            Some(typed.search.backend)
        })
    }

    /// A freshly re-read `ConfigStore`, for call spans (async system
    /// execution) that must not hold the shared instance's lock across an
    /// await point.
    fn fresh_config(&self) -> Result<ConfigStore> {
        ConfigStore::load_or_init(self.layout.config_path())
    }

    pub async fn dispatch(&self, op: Operation) -> Result<Value> {
        match op {
            Operation::IndexGet => self.index_get(),
            Operation::IndexSearch(p) => self.index_search(p),

            Operation::EntityList => self.entity_list(),
            Operation::EntityGetSoul(p) => self.entity_get_soul(p),
            Operation::EntityGetFull(p) => self.entity_get_full(p),
            Operation::EntityCreate(p) => self.entity_create(p),
            Operation::EntityUpdateSoul(p) => self.entity_update_soul(p),
            Operation::EntityLogEvolution(p) => self.entity_log_evolution(p),

            Operation::ComponentList(p) => self.component_list(p),
            Operation::ComponentCreate(p) => self.component_create(p),
            Operation::ComponentLoad(p) => self.component_load(p),
            Operation::ComponentUnload(p) => self.component_unload(p),
            Operation::SummaryGet(p) => self.summary_get(p),
            Operation::SummaryUpdate(p) => self.summary_update(p),
            Operation::SummaryVerify(p) => self.summary_verify(p),

            Operation::ChangelogRecord(p) => self.changelog_record(p).await,
            Operation::ChangelogQuery(p) => self.changelog_query(p),
            Operation::ValidateWrite(p) => self.validate_write(p).await,

            Operation::ScratchWrite(p) => self.scratch_write(p),
            Operation::ScratchRead(p) => self.scratch_read(p),
            Operation::ScratchPromote(p) => self.scratch_promote(p),

            Operation::SnapshotSave(p) => self.snapshot_save(p),
            Operation::SnapshotRead => self.snapshot_read(),

            Operation::RelationshipGet(p) => self.relationship_get(p),
            Operation::RelationshipUpdateProfile(p) => self.relationship_update_profile(p),
            Operation::RelationshipLogInteraction(p) => self.relationship_log_interaction(p),
            Operation::RelationshipUpdateTrust(p) => self.relationship_update_trust(p),

            Operation::RawSearch(p) => self.raw_search(p),
            Operation::SearchReindex => self.search_reindex(),
            Operation::SearchStatus => self.search_status(),

            Operation::DecayPreview(p) => self.decay_preview(p),
            Operation::DecayPin(p) => self.decay_pin(p),

            Operation::SystemList => self.system_list(),
            Operation::SystemExecute(p) => self.system_execute(p).await,
            Operation::SystemStatus(p) => self.system_status(p),
            Operation::SystemConfigure(p) => self.system_configure(p),

            Operation::ConfigGet(p) => self.config_get(p),
            Operation::ConfigUpdate(p) => self.config_update(p),
            Operation::ConfigReference(p) => self.config_reference(p),

            Operation::OnboardingStatus => self.onboarding_status(),
            Operation::OnboardingInit(p) => self.onboarding_init(p),
        }
    }

    fn index_get(&self) -> Result<Value> {
        Ok(json!({ "content": MasterIndex::new(&self.layout).get()? }))
    }

    fn index_search(&self, p: IndexSearchParams) -> Result<Value> {
        let hits = MasterIndex::new(&self.layout).search(&p.query, p.scope.as_deref())?;
        Ok(json!({ "matches": hits }))
    }

    fn entity_list(&self) -> Result<Value> {
        Ok(json!({ "entities": EntityRegistry::new(&self.layout).list()? }))
    }

    fn entity_get_soul(&self, p: EntityIdParams) -> Result<Value> {
        let soul = EntityRegistry::new(&self.layout)
            .get_soul(&p.entity_id)?
            .ok_or_else(|| Error::NotFound(format!("entity: {}", p.entity_id)))?;
        Ok(json!({ "soul_content": soul }))
    }

    fn entity_get_full(&self, p: EntityIdParams) -> Result<Value> {
        let entity = EntityRegistry::new(&self.layout)
            .get(&p.entity_id)?
            .ok_or_else(|| Error::NotFound(format!("entity: {}", p.entity_id)))?;
        Ok(serde_json::to_value(entity)?)
    }

    fn entity_create(&self, p: EntityCreateParams) -> Result<Value> {
        let entity = EntityRegistry::new(&self.layout).create(
            &p.entity_id,
            &p.display_name,
            &p.description,
            p.soul_content,
        )?;
        self.events.emit(Event::IdentityCreate {
            scope: format!("entities/{}", p.entity_id),
            summary: format!("created entity {}", p.entity_id),
        });
        Ok(serde_json::to_value(entity)?)
    }

    fn entity_update_soul(&self, p: EntityUpdateSoulParams) -> Result<Value> {
        let entity = EntityRegistry::new(&self.layout).update_soul(&p.entity_id, &p.content, &p.reason)?;
        if p.entity_id == PRIMARY_ENTITY_ID {
            let typed = self.typed_config()?;
            WorkspaceSync::new(&self.layout).write_soul_to_workspace(&typed.workspace_sync, &p.content)?;
        }
        self.events.emit(Event::IdentityChange {
            scope: format!("entities/{}", p.entity_id),
            summary: p.reason,
        });
        Ok(serde_json::to_value(entity)?)
    }

    fn entity_log_evolution(&self, p: EntityLogEvolutionParams) -> Result<Value> {
        let entity = EntityRegistry::new(&self.layout).log_evolution(&p.entity_id, &p.change_summary, &p.source)?;
        self.events.emit(Event::IdentityChange {
            scope: format!("entities/{}", p.entity_id),
            summary: p.change_summary,
        });
        Ok(serde_json::to_value(entity)?)
    }

    fn component_list(&self, p: ComponentListParams) -> Result<Value> {
        let scopes = self.components().list(p.ty)?;
        Ok(json!({ "components": scopes }))
    }

    fn component_create(&self, p: ComponentCreateParams) -> Result<Value> {
        let hint = self.components().create(p.ty, &p.key, &p.summary)?;
        MasterIndex::new(&self.layout).update_entry(hint.tag, &hint.key, &hint.status_line)?;
        let scope = format!("{}/{}", p.ty.dir_name(), p.key);
        self.events.emit(Event::ComponentCreate {
            scope: scope.clone(),
            summary: format!("created component {scope}"),
        });
        Ok(json!({ "scope": scope, "tag": hint.tag }))
    }

    fn component_load(&self, p: ScopeKeyParams) -> Result<Value> {
        let loaded = self.components().load(&p.key)?;
        self.events.emit(Event::ComponentLoad {
            scope: p.key,
            summary: "component loaded".to_string(),
        });
        Ok(serde_json::to_value(loaded)?)
    }

    fn component_unload(&self, p: ScopeKeyParams) -> Result<Value> {
        let was_loaded = self.components().unload(&p.key);
        self.events.emit(Event::ComponentUnload {
            scope: p.key,
            summary: "component unloaded".to_string(),
        });
        Ok(json!({ "was_loaded": was_loaded }))
    }

    fn summary_get(&self, p: ScopeKeyParams) -> Result<Value> {
        let content = self.components()
            .get_summary(&p.key)?
            .ok_or_else(|| Error::NotFound(format!("component summary: {}", p.key)))?;
        Ok(json!({ "content": content }))
    }

    fn summary_update(&self, p: SummaryUpdateParams) -> Result<Value> {
        let hint = self.components().update_summary(&p.key, &p.content)?;
        MasterIndex::new(&self.layout).update_entry(hint.tag, &hint.key, &hint.status_line)?;
        self.events.emit(Event::SummaryUpdate {
            scope: p.key.clone(),
            summary: "summary updated".to_string(),
        });
        Ok(json!({ "scope": p.key, "tag": hint.tag }))
    }

    fn summary_verify(&self, p: ScopeKeyParams) -> Result<Value> {
        self.components().verify_summary(&p.key)?;
        Ok(json!({ "verified": true }))
    }

    async fn changelog_record(&self, p: ChangelogRecordParams) -> Result<Value> {
        let typed = self.typed_config()?;
        let should_validate = p
            .validate
            .unwrap_or(p.kind == EntryKind::Decision && typed.validation.auto_validate_decisions);

        let verdict = if should_validate {
            let content = p
                .decision
                .clone()
                .map(|d| format!("{d}\n{}", p.summary))
                .unwrap_or_else(|| p.summary.clone());
            Some(
                WriteValidator::new(&self.layout)
                    .validate(
                        &self.llm,
                        ValidateInput {
                            scope: p.scope.clone(),
                            content,
                            kind: crate::validator::WriteKind::Changelog,
                            existing_entries: None,
                            existing_summary: None,
                        },
                    )
                    .await?,
            )
        } else {
            None
        };

        let engine = ChangelogEngine::new(&self.layout, &self.ids);
        let outcome = engine.record(RecordInput {
            scope: p.scope.clone(),
            kind: p.kind,
            agent: p.agent,
            action: p.action,
            target: p.target,
            decision: p.decision,
            rationale: p.rationale,
            alternatives: p.alternatives,
            summary: p.summary,
            details: p.details,
        })?;

        self.events.emit(Event::ChangelogRecord {
            scope: p.scope,
            summary: outcome.entry.summary.clone(),
            entry_id: outcome.entry.id.clone(),
        });

        Ok(json!({ "outcome": outcome, "validation": verdict }))
    }

    fn changelog_query(&self, p: ChangelogQueryParams) -> Result<Value> {
        let engine = ChangelogEngine::new(&self.layout, &self.ids);
        let entries = engine.query(QueryInput {
            scope: p.scope,
            kind: p.kind,
            agent: p.agent,
            time_from: None,
            time_to: None,
            limit: p.limit,
        })?;
        Ok(json!({ "entries": entries }))
    }

    async fn validate_write(&self, p: ValidateWriteParams) -> Result<Value> {
        let verdict = WriteValidator::new(&self.layout)
            .validate(
                &self.llm,
                ValidateInput {
                    scope: p.scope,
                    content: p.content,
                    kind: p.kind,
                    existing_entries: None,
                    existing_summary: None,
                },
            )
            .await?;
        Ok(serde_json::to_value(verdict)?)
    }

    fn scratch_write(&self, p: ScratchWriteParams) -> Result<Value> {
        let entry = Scratch::new(&self.layout, &self.ids).write(ScratchWriteInput {
            content: p.content,
            tags: p.tags,
            source: None,
        })?;
        self.events.emit(Event::ScratchWrite {
            scope: "scratch".to_string(),
            summary: entry.id.clone(),
        });
        Ok(serde_json::to_value(entry)?)
    }

    fn scratch_read(&self, p: ScratchReadParams) -> Result<Value> {
        let entries = Scratch::new(&self.layout, &self.ids).read(ScratchReadInput {
            date: p.date,
            tags: p.tags,
            include_yesterday: p.include_yesterday,
            limit: p.limit,
            exclude_promoted: !p.include_promoted,
        })?;
        Ok(json!({ "entries": entries }))
    }

    fn scratch_promote(&self, p: ScratchPromoteParams) -> Result<Value> {
        let entry = Scratch::new(&self.layout, &self.ids).promote(&p.scratch_id, &p.scope)?;
        self.events.emit(Event::ScratchPromote {
            scope: p.scope,
            summary: format!("promoted {}", p.scratch_id),
        });
        Ok(serde_json::to_value(entry)?)
    }

    fn snapshot_save(&self, p: SnapshotSaveParams) -> Result<Value> {
        let snapshot = SnapshotStore::new(&self.layout).save(SnapshotUpdate {
            updated_by: p.updated_by,
            current_focus: p.current_focus,
            active_tasks: p.active_tasks,
            blockers: p.blockers,
            recent_decisions: p.recent_decisions,
            context_notes: p.context_notes,
            session_meta: None,
        })?;
        self.events.emit(Event::SnapshotSave {
            scope: "snapshot".to_string(),
            summary: "snapshot saved".to_string(),
        });
        Ok(serde_json::to_value(snapshot)?)
    }

    fn snapshot_read(&self) -> Result<Value> {
        Ok(serde_json::to_value(SnapshotStore::new(&self.layout).read()?)?)
    }

    fn relationship_get(&self, p: EntityIdParams) -> Result<Value> {
        Ok(serde_json::to_value(
            RelationshipStore::new(&self.layout).get(&p.entity_id)?,
        )?)
    }

    fn relationship_update_profile(&self, p: RelationshipUpdateProfileParams) -> Result<Value> {
        let profile = RelationshipStore::new(&self.layout).update_profile(
            &p.entity_id,
            ProfileUpdate {
                kind: p.kind,
                style: p.style,
                expertise: p.expertise,
                language_pref: p.language_pref,
                notes: p.notes,
            },
        )?;
        self.events.emit(Event::RelationshipUpdate {
            scope: format!("relationships/{}", p.entity_id),
            summary: "profile updated".to_string(),
        });
        Ok(serde_json::to_value(profile)?)
    }

    fn relationship_log_interaction(&self, p: RelationshipLogInteractionParams) -> Result<Value> {
        let profile = RelationshipStore::new(&self.layout).log_interaction(&p.entity_id, &p.tags)?;
        self.events.emit(Event::RelationshipUpdate {
            scope: format!("relationships/{}", p.entity_id),
            summary: "interaction logged".to_string(),
        });
        Ok(serde_json::to_value(profile)?)
    }

    fn relationship_update_trust(&self, p: RelationshipUpdateTrustParams) -> Result<Value> {
        let profile = RelationshipStore::new(&self.layout).update_trust(&p.entity_id, p.delta, &p.reason)?;
        self.events.emit(Event::RelationshipUpdate {
            scope: format!("relationships/{}", p.entity_id),
            summary: p.reason,
        });
        Ok(serde_json::to_value(profile)?)
    }

    fn raw_search(&self, p: RawSearchParams) -> Result<Value> {
        let forced = self.forced_backend()?;
        let hits = self
            .router
            .search_data(&p.query, p.scope.as_deref(), p.limit.unwrap_or(15), forced.as_deref())?;
        Ok(json!({ "hits": hits }))
    }

    fn search_reindex(&self) -> Result<Value> {
        let forced = self.forced_backend()?;
        let count = self.router.reindex(forced.as_deref())?;
        Ok(json!({ "indexed_count": count }))
    }

    fn search_status(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.router.status())?)
    }

    fn decay_preview(&self, p: DecayPreviewParams) -> Result<Value> {
        let config = self.config.lock().unwrap();
        let candidates = DecayEngine::new(&self.layout).preview(&config, p.threshold)?;
        Ok(json!({ "candidates": candidates }))
    }

    fn decay_pin(&self, p: DecayPinParams) -> Result<Value> {
        let mut config = self.config.lock().unwrap();
        let decay = DecayEngine::new(&self.layout);
        match p.action.as_str() {
            "pin" => decay.pin(&mut config, &p.entry_id)?,
            "unpin" => decay.unpin(&mut config, &p.entry_id)?,
            other => return Err(Error::InvalidArgument(format!("unknown decay_pin action: {other}"))),
        }
        Ok(json!({ "entry_id": p.entry_id, "action": p.action }))
    }

    fn system_list(&self) -> Result<Value> {
        Ok(serde_json::to_value(system::list())?)
    }

    async fn system_execute(&self, p: SystemExecuteParams) -> Result<Value> {
        let config = self.fresh_config()?;
        let ctx = SystemContext {
            layout: &self.layout,
            config: &config,
            llm: &self.llm,
            router: &self.router,
        };
        let result = system::execute(&ctx, &p.name, p.params).await?;
        self.events.emit(Event::SystemExecute {
            scope: format!("system/{}", p.name),
            summary: format!("executed {}", p.name),
        });
        Ok(result)
    }

    fn system_status(&self, p: SystemStatusParams) -> Result<Value> {
        let config = self.fresh_config()?;
        let ctx = SystemContext {
            layout: &self.layout,
            config: &config,
            llm: &self.llm,
            router: &self.router,
        };
        match p.name {
            Some(name) => system::status(&ctx, &name),
            None => {
                let mut all = Vec::new();
                for info in system::list() {
                    all.push(json!({ "name": info.name, "status": system::status(&ctx, info.name)? }));
                }
                Ok(json!({ "systems": all }))
            }
        }
    }

    fn system_configure(&self, p: SystemConfigureParams) -> Result<Value> {
        self.config.lock().unwrap().update(&p.path, json_to_toml(p.value)?)?;
        if p.path.starts_with("search.") {
            self.router.reset();
        }
        self.events.emit(Event::SystemConfigure {
            scope: p.path.clone(),
            summary: "config updated via system_configure".to_string(),
        });
        Ok(json!({ "path": p.path }))
    }

    fn config_get(&self, p: ConfigGetParams) -> Result<Value> {
        let value = self.config.lock().unwrap().get(p.path.as_deref())?;
        Ok(serde_json::to_value(value)?)
    }

    fn config_update(&self, p: ConfigUpdateParams) -> Result<Value> {
        self.config.lock().unwrap().update(&p.path, json_to_toml(p.value)?)?;
        if p.path.starts_with("search.") {
            self.router.reset();
        }
        Ok(json!({ "path": p.path }))
    }

    fn config_reference(&self, p: ConfigReferenceParams) -> Result<Value> {
        let rows: Vec<_> = crate::config::reference_table()
            .iter()
            .filter(|entry| p.filter.as_deref().map(|f| entry.path.contains(f)).unwrap_or(true))
            .collect();
        Ok(serde_json::to_value(rows)?)
    }

    fn onboarding_status(&self) -> Result<Value> {
        let config = self.config.lock().unwrap();
        Ok(serde_json::to_value(Onboarding::new(&self.layout).status(&config)?)?)
    }

    fn onboarding_init(&self, p: OnboardingInitParams) -> Result<Value> {
        let mut config = self.config.lock().unwrap();
        let report = Onboarding::new(&self.layout).init(&mut config, p.skip_agents.unwrap_or_default())?;
        drop(config);
        self.events.emit(Event::OnboardingComplete {
            scope: "onboarding".to_string(),
            summary: "onboarding completed".to_string(),
        });
        Ok(serde_json::to_value(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let config = ConfigStore::load_or_init(layout.config_path()).unwrap();
        let engine = Engine::new(layout, config, None).unwrap();
        (dir, engine)
    }

    #[tokio::test]
    async fn onboarding_then_entity_create_round_trips() {
        let (_dir, engine) = harness();
        let result = engine
            .dispatch(Operation::OnboardingInit(OnboardingInitParams { skip_agents: None }))
            .await
            .unwrap();
        assert_eq!(result["completed"], json!(true));

        let entities = engine.dispatch(Operation::EntityList).await.unwrap();
        assert_eq!(entities["entities"], json!(["assistant"]));
    }

    #[tokio::test]
    async fn component_create_then_summary_update_upserts_l0() {
        let (_dir, engine) = harness();
        engine
            .dispatch(Operation::ComponentCreate(ComponentCreateParams {
                ty: crate::store::ComponentType::Projects,
                key: "alpha".to_string(),
                summary: "# alpha\n".to_string(),
            }))
            .await
            .unwrap();

        let index = engine.dispatch(Operation::IndexGet).await.unwrap();
        assert!(index["content"].as_str().unwrap().contains("[P] alpha"));
    }

    #[tokio::test]
    async fn component_unload_tracks_loaded_state_across_dispatch_calls() {
        let (_dir, engine) = harness();
        engine
            .dispatch(Operation::ComponentCreate(ComponentCreateParams {
                ty: crate::store::ComponentType::Projects,
                key: "alpha".to_string(),
                summary: "# alpha\n".to_string(),
            }))
            .await
            .unwrap();
        let key = ScopeKeyParams { key: "projects/alpha".to_string() };

        let before_load = engine.dispatch(Operation::ComponentUnload(key.clone())).await.unwrap();
        assert_eq!(before_load["was_loaded"], json!(false));

        engine.dispatch(Operation::ComponentLoad(key.clone())).await.unwrap();
        let after_load = engine.dispatch(Operation::ComponentUnload(key.clone())).await.unwrap();
        assert_eq!(after_load["was_loaded"], json!(true));
        let again = engine.dispatch(Operation::ComponentUnload(key)).await.unwrap();
        assert_eq!(again["was_loaded"], json!(false));
    }

    #[tokio::test]
    async fn changelog_record_without_validation_round_trips() {
        let (_dir, engine) = harness();
        let result = engine
            .dispatch(Operation::ChangelogRecord(ChangelogRecordParams {
                scope: "knowledge/misc".to_string(),
                kind: EntryKind::Operation,
                summary: "did a thing".to_string(),
                validate: Some(false),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert!(result["outcome"]["entry"]["id"].as_str().unwrap().starts_with("op_"));
        assert!(result["validation"].is_null());
    }

    #[tokio::test]
    async fn decay_pin_rejects_unknown_action() {
        let (_dir, engine) = harness();
        let err = engine
            .dispatch(Operation::DecayPin(DecayPinParams {
                entry_id: "op_0101_001".to_string(),
                action: "frobnicate".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
