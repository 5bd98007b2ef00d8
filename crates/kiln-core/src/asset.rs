//! The asset orchestrator and its cook state machine.
//!
//! An [`AssetNode`] is the only entry point for build requests. Requests are
//! latched into a single pending slot and consumed by [`AssetNode::tick`],
//! which advances the state machine one step per call:
//!
//! ```text
//! Idle -> Preloading -> [LoadingWaitingForSubselection] -> Loading -> Cooking -> PostLoad -> Idle
//! Idle --------------------------------------------------------------> Cooking -> PostCook -> Idle
//! ```
//!
//! The first build (and every reload) goes through `Preloading`/`Loading`
//! and creates a fresh session node. A recook uploads what changed to the
//! existing node and goes straight to `Cooking`. Every cycle ends in `Idle`
//! with exactly one `Cooked` or `Reloaded` event, failed cycles included.
//!
//! Asynchronous requests return after latching; the host calls `tick` once
//! per frame. Blocking requests drive `tick` until the cycle is over.

use tracing::{debug, error, info, warn};

use crate::artifact::OutputArtifact;
use crate::config::{AssetConfig, AssetDefinition};
use crate::event::{AssetEvent, AssetEventBus};
use crate::geo::{CURVE_CLOSED_PARM, CURVE_COORDS_PARM, CurveData, VolumeLayerSettings};
use crate::host::{HostError, InstanceOverride, OutputHost, Resource};
use crate::id::{HostHandle, PartKey, SessionNodeId};
use crate::material::MaterialCache;
use crate::parameters::{Inputs, Parameters};
use crate::part::RegenContext;
use crate::preset::{
    DeferredPresets, PresetFragment, PresetMismatch, PresetStore, apply_curve,
    apply_volume_layers, capture_curves, capture_volume_layers,
};
use crate::scene::{ArtifactSummary, ReconcileError, SceneGraph, SyncReport};
use crate::serialize::{PresetDecodeError, PresetEncodeError};
use crate::session::{
    CookOptions, CookStatus, GenerationSession, ObjectRef, ParameterValue, SessionError,
    Transform,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset '{0}' has no library to load")]
    MissingLibrary(String),
    #[error("library of asset '{0}' defines no assets")]
    EmptyLibrary(String),
    #[error("unknown sub-asset '{0}'")]
    UnknownSubasset(String),
    #[error("asset '{0}' has no sub-asset selected")]
    NoSelection(String),
    #[error("session refused to cook node {0:?}")]
    CookRefused(SessionNodeId),
    #[error("cook of asset '{asset}' failed: {reason}")]
    CookFailed { asset: String, reason: String },
    #[error("asset '{asset}' is busy with {action:?}")]
    Busy { asset: String, action: BuildAction },
    #[error("part {0:?} does not exist")]
    UnknownPart(PartKey),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    PresetEncode(#[from] PresetEncodeError),
    #[error(transparent)]
    PresetDecode(#[from] PresetDecodeError),
}

// ---------------------------------------------------------------------------
// State, actions, requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookState {
    /// Never built; no session node.
    Uninitialized,
    Idle,
    Preloading,
    /// The library defines several assets and none is selected.
    LoadingWaitingForSubselection,
    Loading,
    Cooking,
    PostCook,
    PostLoad,
}

/// Outcome of the last cycle, orthogonal to [`CookState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CookResult {
    #[default]
    None,
    Success,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildAction {
    /// Tear everything down and build from a fresh session node.
    Reload,
    /// Upload changes and recook the existing node.
    Cook,
    /// The session node is gone; rebind records to a fresh one.
    Invalid,
    /// Revert every parameter to its default and recook.
    ResetParameters,
}

impl BuildAction {
    /// Actions allowed to replace an occupied pending slot.
    fn overrides_pending(self) -> bool {
        matches!(self, BuildAction::Reload | BuildAction::Invalid)
    }
}

/// Options of a cook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookRequest {
    /// Skip the cook when nothing was uploaded.
    pub check_params_changed: bool,
    /// Return after latching instead of driving the cycle to completion.
    pub asynchronous: bool,
    /// Trust the session handle without asking the session.
    pub skip_cook_check: bool,
    /// Upload every cached parameter, not only the dirty ones.
    pub upload_parameters: bool,
}

impl Default for CookRequest {
    fn default() -> Self {
        Self {
            check_params_changed: true,
            asynchronous: true,
            skip_cook_check: false,
            upload_parameters: false,
        }
    }
}

impl CookRequest {
    /// A blocking cook that always runs.
    pub fn forced() -> Self {
        Self {
            check_params_changed: false,
            asynchronous: false,
            ..Self::default()
        }
    }

    pub fn blocking(mut self) -> Self {
        self.asynchronous = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAction {
    pub action: BuildAction,
    pub request: CookRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Stored in the pending slot; `tick` picks it up.
    Latched,
    /// A blocking request ran to the end of its cycle.
    Completed(CookResult),
    /// A blocking request stopped because a sub-asset must be selected.
    AwaitingSelection,
    /// Another request already occupies the pending slot.
    Rejected { pending: BuildAction },
}

/// The collaborators an asset borrows for one call.
pub struct CookContext<'a> {
    pub session: &'a mut dyn GenerationSession,
    pub host: &'a mut dyn OutputHost,
}

impl<'a> CookContext<'a> {
    pub fn new(session: &'a mut dyn GenerationSession, host: &'a mut dyn OutputHost) -> Self {
        Self { session, host }
    }
}

// ---------------------------------------------------------------------------
// AssetNode
// ---------------------------------------------------------------------------

/// One logical asset instance.
#[derive(Debug)]
pub struct AssetNode {
    definition: AssetDefinition,
    config: AssetConfig,
    session_id: SessionNodeId,
    state: CookState,
    result: CookResult,
    pending: Option<PendingAction>,
    active: Option<PendingAction>,
    /// The running cycle started from a fresh node.
    loading: bool,
    scene: SceneGraph,
    materials: MaterialCache,
    parameters: Parameters,
    inputs: Inputs,
    transform: Transform,
    transform_dirty: bool,
    /// Store to apply during the running or next cycle.
    preset: Option<PresetStore>,
    deferred: DeferredPresets,
    available_assets: Vec<String>,
    selected: Option<String>,
    warnings: Vec<String>,
    last_report: Option<SyncReport>,
    events: AssetEventBus,
}

impl AssetNode {
    pub fn new(definition: AssetDefinition, config: AssetConfig) -> Self {
        let selected = definition.selected_asset.clone();
        let events = AssetEventBus::with_capacity(config.event_capacity);
        Self {
            definition,
            config,
            session_id: SessionNodeId::INVALID,
            state: CookState::Uninitialized,
            result: CookResult::None,
            pending: None,
            active: None,
            loading: false,
            scene: SceneGraph::new(),
            materials: MaterialCache::new(),
            parameters: Parameters::new(),
            inputs: Inputs::new(),
            transform: Transform::IDENTITY,
            transform_dirty: false,
            preset: None,
            deferred: DeferredPresets::new(),
            available_assets: Vec::new(),
            selected,
            warnings: Vec::new(),
            last_report: None,
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &AssetDefinition {
        &self.definition
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn session_id(&self) -> SessionNodeId {
        self.session_id
    }

    pub fn cook_state(&self) -> CookState {
        self.state
    }

    pub fn cook_result(&self) -> CookResult {
        self.result
    }

    pub fn pending_action(&self) -> Option<BuildAction> {
        self.pending.map(|p| p.action)
    }

    /// A cycle is running or a request is waiting.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some() || !matches!(self.state, CookState::Idle | CookState::Uninitialized)
    }

    /// Whether the asset is bound to a node the session still recognizes.
    pub fn is_bound(&self, session: &dyn GenerationSession) -> bool {
        self.state != CookState::Uninitialized
            && self.session_id.is_bound()
            && session.is_node_valid(self.session_id)
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn materials(&self) -> &MaterialCache {
        &self.materials
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn available_assets(&self) -> &[String] {
        &self.available_assets
    }

    pub fn selected_asset(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn deferred_presets(&self) -> &DeferredPresets {
        &self.deferred
    }

    /// Warnings of the last finished cycle.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn last_report(&self) -> Option<&SyncReport> {
        self.last_report.as_ref()
    }

    pub fn events(&self) -> &AssetEventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut AssetEventBus {
        &mut self.events
    }

    pub fn get_output_artifacts(&self) -> Vec<&OutputArtifact> {
        self.scene.artifacts().into_iter().map(|(_, a)| a).collect()
    }

    pub fn artifact_summaries(&self) -> Vec<ArtifactSummary> {
        self.scene.summaries()
    }

    // -----------------------------------------------------------------------
    // Local edits
    // -----------------------------------------------------------------------

    /// Cache a parameter value; uploaded on the next recook.
    pub fn set_parameter(&mut self, name: &str, value: ParameterValue) -> bool {
        self.parameters.set(name, value)
    }

    pub fn set_transform(&mut self, transform: Transform) {
        if self.transform != transform {
            self.transform = transform;
            self.transform_dirty = true;
        }
    }

    pub fn connect_input(&mut self, name: &str, sources: Vec<ObjectRef>) {
        self.inputs.connect(name, sources);
    }

    pub fn disconnect_input(&mut self, name: &str) {
        self.inputs.disconnect(name);
    }

    /// Replace the points of the curve on `object`/`geo`. Returns `false`
    /// when that geo carries no curve.
    pub fn set_curve_data(&mut self, object: &str, geo: &str, data: CurveData) -> bool {
        self.scene
            .find_geo(object, geo)
            .and_then(|key| self.scene.geo_mut(key))
            .is_some_and(|g| g.set_curve_data(data))
    }

    pub fn set_volume_layer_settings(
        &mut self,
        object: &str,
        geo: &str,
        tile: i32,
        layer: &str,
        settings: VolumeLayerSettings,
    ) -> bool {
        let Some(target) = self
            .scene
            .find_geo(object, geo)
            .and_then(|key| self.scene.geo_mut(key))
            .and_then(|g| g.volume_stack_mut(tile))
            .and_then(|s| s.layer_mut(layer))
        else {
            return false;
        };
        target.settings = settings;
        true
    }

    pub fn set_material_override(&mut self, part: PartKey, slot: usize, material: HostHandle) -> bool {
        self.scene
            .part_mut(part)
            .is_some_and(|p| p.artifact_mut().set_material_override(slot, material))
    }

    /// Set an override on one spawned instance and apply it right away.
    pub fn set_instance_override(
        &mut self,
        host: &mut dyn OutputHost,
        part: PartKey,
        applied: InstanceOverride,
    ) -> Result<bool, AssetError> {
        let part = self.scene.part_mut(part).ok_or(AssetError::UnknownPart(part))?;
        Ok(part.set_instance_override(host, applied)?)
    }

    /// Resolve a pending sub-asset choice.
    pub fn select_subasset(&mut self, name: &str) -> Result<(), AssetError> {
        if !self.available_assets.is_empty() && !self.available_assets.iter().any(|a| a == name) {
            return Err(AssetError::UnknownSubasset(name.to_string()));
        }
        self.selected = Some(name.to_string());
        if self.state == CookState::LoadingWaitingForSubselection {
            self.set_state(CookState::Loading);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    pub fn request_cook(&mut self, ctx: &mut CookContext<'_>, request: CookRequest) -> RequestOutcome {
        self.submit(ctx, BuildAction::Cook, request)
    }

    pub fn request_reload(&mut self, ctx: &mut CookContext<'_>, asynchronous: bool) -> RequestOutcome {
        let request = CookRequest {
            asynchronous,
            ..CookRequest::default()
        };
        self.submit(ctx, BuildAction::Reload, request)
    }

    pub fn request_reset_parameters(
        &mut self,
        ctx: &mut CookContext<'_>,
        asynchronous: bool,
    ) -> RequestOutcome {
        let request = CookRequest {
            check_params_changed: false,
            asynchronous,
            ..CookRequest::default()
        };
        self.submit(ctx, BuildAction::ResetParameters, request)
    }

    /// Mark the session node as gone. The next cycle rebinds every record to
    /// a fresh node, keeping the records themselves.
    pub fn request_invalidate(&mut self) -> RequestOutcome {
        self.latch(PendingAction {
            action: BuildAction::Invalid,
            request: CookRequest::default(),
        })
    }

    fn submit(
        &mut self,
        ctx: &mut CookContext<'_>,
        action: BuildAction,
        request: CookRequest,
    ) -> RequestOutcome {
        let outcome = self.latch(PendingAction { action, request });
        if request.asynchronous || outcome != RequestOutcome::Latched {
            return outcome;
        }
        self.drive(ctx)
    }

    fn latch(&mut self, pending: PendingAction) -> RequestOutcome {
        match self.pending {
            None => {
                self.pending = Some(pending);
                RequestOutcome::Latched
            }
            Some(_) if pending.action.overrides_pending() => {
                debug!(asset = %self.definition.name, action = ?pending.action, "replacing pending request");
                self.pending = Some(pending);
                RequestOutcome::Latched
            }
            Some(current) => {
                warn!(
                    asset = %self.definition.name,
                    requested = ?pending.action,
                    pending = ?current.action,
                    "rejecting build request, another one is pending"
                );
                RequestOutcome::Rejected {
                    pending: current.action,
                }
            }
        }
    }

    /// Run ticks until the asset is idle with nothing pending.
    fn drive(&mut self, ctx: &mut CookContext<'_>) -> RequestOutcome {
        loop {
            self.tick(ctx);
            match self.state {
                CookState::LoadingWaitingForSubselection => return RequestOutcome::AwaitingSelection,
                CookState::Idle | CookState::Uninitialized if self.pending.is_none() => {
                    return RequestOutcome::Completed(self.result);
                }
                _ => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    /// Advance the state machine by one step.
    pub fn tick(&mut self, ctx: &mut CookContext<'_>) -> CookState {
        let step = match self.state {
            CookState::Uninitialized | CookState::Idle => match self.pending.take() {
                Some(pending) => self.begin(ctx, pending),
                None => Ok(()),
            },
            CookState::Preloading => self.preload(ctx),
            CookState::LoadingWaitingForSubselection => Ok(()),
            CookState::Loading => self.load(ctx),
            CookState::Cooking => self.poll(ctx),
            CookState::PostCook | CookState::PostLoad => self.finish(ctx),
        };
        if let Err(e) = step {
            self.fail(e);
        }
        self.state
    }

    fn set_state(&mut self, to: CookState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(asset = %self.definition.name, ?from, ?to, "cook state");
        self.state = to;
        self.events.emit(AssetEvent::StateChanged {
            asset: self.definition.name.clone(),
            from,
            to,
        });
    }

    fn begin(&mut self, ctx: &mut CookContext<'_>, pending: PendingAction) -> Result<(), AssetError> {
        self.result = CookResult::None;
        self.warnings.clear();
        self.active = Some(pending);
        let bound = (pending.request.skip_cook_check && self.session_id.is_bound())
            || self.is_bound(&*ctx.session);

        match pending.action {
            BuildAction::Reload => {
                if self.preset.is_none() && bound {
                    self.preset = Some(self.get_asset_preset(&*ctx.session)?);
                }
                self.teardown(ctx);
                self.set_state(CookState::Preloading);
            }
            BuildAction::Invalid => {
                self.forget_identity();
                self.set_state(CookState::Preloading);
            }
            BuildAction::ResetParameters => {
                self.parameters.clear();
                if bound {
                    ctx.session.revert_parameters(self.session_id)?;
                    self.recook(ctx, pending.request)?;
                } else {
                    self.forget_identity();
                    self.set_state(CookState::Preloading);
                }
            }
            BuildAction::Cook => {
                if bound {
                    self.recook(ctx, pending.request)?;
                } else {
                    if self.session_id.is_bound() {
                        info!(asset = %self.definition.name, "session lost the asset node, rebuilding");
                    }
                    self.forget_identity();
                    self.set_state(CookState::Preloading);
                }
            }
        }
        Ok(())
    }

    /// Upload changes to the existing node and start cooking it, unless
    /// nothing changed and the request allows skipping.
    fn recook(&mut self, ctx: &mut CookContext<'_>, request: CookRequest) -> Result<(), AssetError> {
        let preset_applied = self.apply_preset_before_cook(ctx)?;
        let uploaded = self.upload_changes(ctx, request.upload_parameters)?;
        if request.check_params_changed
            && self.config.check_params_changed
            && uploaded == 0
            && !preset_applied
        {
            debug!(asset = %self.definition.name, "nothing changed, skipping cook");
            self.result = CookResult::Success;
            self.active = None;
            let event = self.cycle_event(false, true);
            self.events.emit(event);
            return Ok(());
        }
        self.loading = false;
        self.start_cook(ctx)
    }

    fn preload(&mut self, ctx: &mut CookContext<'_>) -> Result<(), AssetError> {
        if self.session_id.is_bound() && !ctx.session.is_node_valid(self.session_id) {
            self.forget_identity();
        }
        if self.definition.asset_type.builtin_node_type().is_some() {
            self.set_state(CookState::Loading);
            return Ok(());
        }

        let library = self
            .definition
            .library
            .clone()
            .ok_or_else(|| AssetError::MissingLibrary(self.definition.name.clone()))?;
        let names = ctx.session.load_library(&library)?;
        if names.is_empty() {
            return Err(AssetError::EmptyLibrary(self.definition.name.clone()));
        }
        self.available_assets = names;

        let preferred = self
            .selected
            .clone()
            .filter(|s| self.available_assets.contains(s));
        match preferred {
            Some(_) => self.set_state(CookState::Loading),
            None if self.available_assets.len() == 1 => {
                self.selected = self.available_assets.first().cloned();
                self.set_state(CookState::Loading);
            }
            None => {
                info!(
                    asset = %self.definition.name,
                    choices = self.available_assets.len(),
                    "library defines several assets, waiting for a selection"
                );
                self.selected = None;
                self.set_state(CookState::LoadingWaitingForSubselection);
            }
        }
        Ok(())
    }

    fn load(&mut self, ctx: &mut CookContext<'_>) -> Result<(), AssetError> {
        let type_name = match self.definition.asset_type.builtin_node_type() {
            Some(builtin) => builtin.to_string(),
            None => self
                .selected
                .clone()
                .ok_or_else(|| AssetError::NoSelection(self.definition.name.clone()))?,
        };
        self.session_id = ctx.session.create_node(None, &type_name)?;
        debug!(asset = %self.definition.name, node = ?self.session_id, %type_name, "created session node");

        self.apply_preset_before_cook(ctx)?;
        self.upload_changes(ctx, true)?;
        self.loading = true;
        self.start_cook(ctx)
    }

    fn start_cook(&mut self, ctx: &mut CookContext<'_>) -> Result<(), AssetError> {
        if !ctx.session.cook_node(self.session_id, &CookOptions::default())? {
            return Err(AssetError::CookRefused(self.session_id));
        }
        self.set_state(CookState::Cooking);
        Ok(())
    }

    fn poll(&mut self, ctx: &mut CookContext<'_>) -> Result<(), AssetError> {
        let post = if self.loading {
            CookState::PostLoad
        } else {
            CookState::PostCook
        };
        match ctx.session.poll_cook_status() {
            CookStatus::StillCooking => {}
            CookStatus::ReadySuccess => self.set_state(post),
            CookStatus::ReadyWithWarnings => {
                for message in ctx.session.cook_messages(self.session_id) {
                    warn!(asset = %self.definition.name, %message, "cook warning");
                    self.warnings.push(message);
                }
                self.set_state(post);
            }
            CookStatus::FatalError => {
                let messages = ctx.session.cook_messages(self.session_id);
                return Err(AssetError::CookFailed {
                    asset: self.definition.name.clone(),
                    reason: if messages.is_empty() {
                        "fatal cook status".into()
                    } else {
                        messages.join("; ")
                    },
                });
            }
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &mut CookContext<'_>) -> Result<(), AssetError> {
        let report = {
            let mut regen = RegenContext {
                session: &*ctx.session,
                host: &mut *ctx.host,
                materials: &mut self.materials,
                config: &self.config,
            };
            self.scene.sync(self.session_id, &mut regen)?
        };
        for dropped in &report.dropped {
            self.warnings
                .push(format!("dropped {}: {}", dropped.path, dropped.reason));
        }
        debug!(
            asset = %self.definition.name,
            created = report.parts.created,
            removed = report.parts.removed,
            regenerated = report.regenerated,
            "reconciled"
        );
        self.last_report = Some(report);

        let stale = self.materials.retain_used(&self.scene.material_handles(), ctx.host);
        if stale > 0 {
            debug!(asset = %self.definition.name, released = stale, "released unused materials");
        }

        let recook = self.apply_preset_after_cook(ctx);

        let loaded = self.loading;
        self.loading = false;
        self.result = CookResult::Success;
        self.active = None;
        self.set_state(CookState::Idle);
        info!(asset = %self.definition.name, artifacts = self.scene.artifacts().len(), "cook finished");
        let event = self.cycle_event(loaded, true);
        self.events.emit(event);

        if (recook || self.scene.has_dirty_curves()) && self.pending.is_none() {
            self.pending = Some(PendingAction {
                action: BuildAction::Cook,
                request: CookRequest::default(),
            });
        }
        Ok(())
    }

    /// End the running cycle as failed. Records stay as they were.
    fn fail(&mut self, err: AssetError) {
        error!(asset = %self.definition.name, error = %err, "cook cycle failed");
        self.warnings.push(err.to_string());
        let loaded = self.loading || self.active.is_some_and(|a| a.action == BuildAction::Reload);
        self.loading = false;
        self.result = CookResult::Errored;
        self.active = None;
        self.set_state(CookState::Idle);
        let event = self.cycle_event(loaded, false);
        self.events.emit(event);
    }

    fn cycle_event(&self, loaded: bool, success: bool) -> AssetEvent {
        let asset = self.definition.name.clone();
        let artifacts = self.scene.summaries();
        let warnings = self.warnings.clone();
        if loaded {
            AssetEvent::Reloaded {
                asset,
                success,
                artifacts,
                warnings,
            }
        } else {
            AssetEvent::Cooked {
                asset,
                success,
                artifacts,
                warnings,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Identity and teardown
    // -----------------------------------------------------------------------

    /// Drop the session handle but keep every record for rebinding.
    fn forget_identity(&mut self) {
        self.session_id = SessionNodeId::INVALID;
        self.scene.invalidate_identifiers();
        self.scene.mark_curves_dirty();
        self.parameters.mark_all_dirty();
        self.inputs.mark_all_dirty();
        self.transform_dirty = true;
    }

    fn teardown(&mut self, ctx: &mut CookContext<'_>) {
        self.scene.clear(ctx.host);
        self.materials.clear(ctx.host);
        self.deferred.clear();
        if self.session_id.is_bound() && ctx.session.is_node_valid(self.session_id) {
            if let Err(e) = ctx.session.delete_node(self.session_id) {
                warn!(asset = %self.definition.name, error = %e, "failed to delete session node");
            }
        }
        self.session_id = SessionNodeId::INVALID;
        self.parameters.mark_all_dirty();
        self.inputs.mark_all_dirty();
        self.transform_dirty = true;
    }

    /// Release everything the asset owns and delete its session node.
    pub fn destroy(&mut self, ctx: &mut CookContext<'_>) {
        self.teardown(ctx);
        self.pending = None;
        self.active = None;
        self.preset = None;
        self.set_state(CookState::Uninitialized);
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Push local edits to the session node. Returns the number of values
    /// written.
    fn upload_changes(&mut self, ctx: &mut CookContext<'_>, all_parameters: bool) -> Result<usize, AssetError> {
        let node = self.session_id;
        let mut written = self.parameters.upload(ctx.session, node, all_parameters)?;
        written += self.inputs.upload(ctx.session, node)?;
        if self.transform_dirty && self.config.sync_transform {
            ctx.session.set_node_transform(node, &self.transform)?;
            written += 1;
        }
        self.transform_dirty = false;
        for (geo, curve) in self.scene.take_dirty_curves() {
            let coords: Vec<f32> = curve.points.iter().flat_map(|p| p.iter().copied()).collect();
            ctx.session
                .set_parameter_value(geo, CURVE_COORDS_PARM, &ParameterValue::Float(coords))?;
            ctx.session
                .set_parameter_value(geo, CURVE_CLOSED_PARM, &ParameterValue::Toggle(curve.closed))?;
            written += 1;
        }
        Ok(written)
    }

    // -----------------------------------------------------------------------
    // Presets
    // -----------------------------------------------------------------------

    /// Snapshot all user-tunable state.
    pub fn get_asset_preset(&self, session: &dyn GenerationSession) -> Result<PresetStore, AssetError> {
        let parameters = if self.session_id.is_bound() && session.is_node_valid(self.session_id) {
            session.parameter_preset(self.session_id)?
        } else {
            Vec::new()
        };
        Ok(PresetStore {
            asset_name: self.definition.name.clone(),
            asset_type: Some(self.definition.asset_type),
            parameters,
            curves: capture_curves(&self.scene)?,
            inputs: self.inputs.snapshot(),
            volume_layers: capture_volume_layers(&self.scene),
        })
    }

    pub fn preset_mismatch(&self, preset: &PresetStore) -> Option<PresetMismatch> {
        preset.mismatch(&self.definition.name, self.definition.asset_type)
    }

    /// Apply `preset` and cook synchronously. A preset targeting another
    /// asset is applied anyway after a warning; callers that want to confirm
    /// first check [`preset_mismatch`](Self::preset_mismatch).
    pub fn load_asset_preset_and_cook(
        &mut self,
        ctx: &mut CookContext<'_>,
        preset: PresetStore,
    ) -> Result<CookResult, AssetError> {
        if self.is_busy() {
            return Err(AssetError::Busy {
                asset: self.definition.name.clone(),
                action: self
                    .pending
                    .or(self.active)
                    .map_or(BuildAction::Cook, |p| p.action),
            });
        }
        if let Some(mismatch) = self.preset_mismatch(&preset) {
            let message = format!(
                "preset targets '{}' ({:?}), applying to '{}'",
                mismatch.found_name, mismatch.found_type, mismatch.expected_name
            );
            warn!(asset = %self.definition.name, %message, "preset mismatch");
            self.events.emit(AssetEvent::Warning {
                asset: self.definition.name.clone(),
                message,
            });
        }

        // The store replaces every parameter value; cached edits would
        // overwrite it on upload.
        self.parameters.clear();
        self.preset = Some(preset);
        let action = if self.is_bound(&*ctx.session) {
            BuildAction::Cook
        } else {
            BuildAction::Reload
        };
        match self.submit(ctx, action, CookRequest::forced()) {
            RequestOutcome::Completed(result) => Ok(result),
            _ => Ok(self.result),
        }
    }

    /// Parameters and inputs of the pending store, applied to the bound node
    /// right before it cooks. Cached parameter edits are uploaded after this
    /// and win. Returns whether a store was pending.
    fn apply_preset_before_cook(&mut self, ctx: &mut CookContext<'_>) -> Result<bool, AssetError> {
        let Some(preset) = self.preset.as_ref() else {
            return Ok(false);
        };
        let node = self.session_id;
        if !preset.parameters.is_empty() {
            ctx.session.set_parameter_preset(node, &preset.parameters)?;
        }
        let names = ctx.session.input_names(node)?;
        for input in &preset.inputs {
            if names.contains(&input.input_name) {
                self.inputs.connect(&input.input_name, input.sources.clone());
            } else {
                defer(
                    &mut self.deferred,
                    PresetFragment::Input(input.clone()),
                    self.config.deferred_preset_retries,
                );
            }
        }
        Ok(true)
    }

    /// Retry earlier deferrals, then apply curves and volume layers of the
    /// pending store. Returns whether an input was connected and needs a
    /// recook.
    fn apply_preset_after_cook(&mut self, ctx: &mut CookContext<'_>) -> bool {
        let input_names = ctx.session.input_names(self.session_id).unwrap_or_default();
        let mut recook = false;
        let (deferred, scene, inputs) = (&mut self.deferred, &mut self.scene, &mut self.inputs);
        let applied = deferred.retry(|fragment| match fragment {
            PresetFragment::Input(p) => {
                if !input_names.contains(&p.input_name) {
                    return false;
                }
                inputs.connect(&p.input_name, p.sources.clone());
                recook = true;
                true
            }
            PresetFragment::VolumeLayers(p) => apply_volume_layers(scene, p),
        });
        if applied > 0 {
            debug!(asset = %self.definition.name, applied, "applied deferred presets");
        }

        let Some(preset) = self.preset.take() else {
            return recook;
        };
        for curve in &preset.curves {
            match apply_curve(&mut self.scene, curve) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(asset = %self.definition.name, curve = %curve.name, "dropping curve preset, no such curve")
                }
                Err(e) => {
                    warn!(asset = %self.definition.name, curve = %curve.name, error = %e, "dropping unreadable curve preset")
                }
            }
        }
        for layers in &preset.volume_layers {
            if !apply_volume_layers(&mut self.scene, layers) {
                defer(
                    &mut self.deferred,
                    PresetFragment::VolumeLayers(layers.clone()),
                    self.config.deferred_preset_retries,
                );
            }
        }
        recook
    }

    // -----------------------------------------------------------------------
    // Bake and duplicate
    // -----------------------------------------------------------------------

    /// Ask the host for standalone copies of every live output. Colliders
    /// and materials travel with their meshes and are not baked separately.
    pub fn bake(&mut self, host: &mut dyn OutputHost) -> Result<Vec<HostHandle>, AssetError> {
        let mut baked = Vec::new();
        let mut failure = None;
        for summary in self.scene.summaries() {
            for resource in summary.resources {
                if matches!(resource, Resource::Collider(_) | Resource::Material(_)) {
                    continue;
                }
                match host.bake(resource) {
                    Ok(handle) => baked.push(handle),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if failure.is_some() {
                break;
            }
        }
        self.events.emit(AssetEvent::Baked {
            asset: self.definition.name.clone(),
            success: failure.is_none(),
            artifacts: self.scene.summaries(),
        });
        match failure {
            Some(e) => {
                warn!(asset = %self.definition.name, error = %e, "bake failed");
                Err(e.into())
            }
            None => Ok(baked),
        }
    }

    /// Build a second asset with the same definition and user state, cooked
    /// synchronously.
    pub fn duplicate(&self, ctx: &mut CookContext<'_>) -> Result<AssetNode, AssetError> {
        if self.is_busy() {
            return Err(AssetError::Busy {
                asset: self.definition.name.clone(),
                action: self
                    .pending
                    .or(self.active)
                    .map_or(BuildAction::Cook, |p| p.action),
            });
        }
        let preset = self.get_asset_preset(&*ctx.session)?;
        let mut copy = AssetNode::new(self.definition.clone(), self.config.clone());
        copy.selected = self.selected.clone();
        copy.set_transform(self.transform);
        copy.load_asset_preset_and_cook(ctx, preset)?;
        Ok(copy)
    }
}

fn defer(deferred: &mut DeferredPresets, fragment: PresetFragment, retries: u32) {
    if retries == 0 {
        warn!(fragment = %fragment.target(), "dropping preset fragment, target missing");
        return;
    }
    debug!(fragment = %fragment.target(), "deferring preset fragment");
    deferred.push(fragment, retries);
}
