//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).
//!
//! [`MockSession`] is a scriptable in-memory generation engine: asset types
//! are closures from parameters and inputs to a scene of [`MockObject`]s.
//! [`RecordingHost`] hands out sequential handles and logs every call.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::config::AssetDefinition;
use crate::geo::{CURVE_CLOSED_PARM, CURVE_COORDS_PARM};
use crate::host::{
    CurveGeometry, HostError, InstanceOverride, InstanceSource, MeshGeometry, OutputHost,
    Resource, VolumeGeometry,
};
use crate::id::{HostHandle, MaterialKey, PartId, SessionNodeId};
use crate::session::{
    AttributeBuffer, CookOptions, CookStatus, DescriptorKind, GenerationSession, GeoKind,
    NodeDescriptor, ObjectRef, ParameterValue, PartOutputKind, SessionError, Transform, attrib,
};

// ===========================================================================
// Scene builders
// ===========================================================================

/// `n` points spaced along the x axis.
pub fn points(n: usize) -> Vec<[f32; 3]> {
    (0..n).map(|i| [i as f32, 0.0, 0.0]).collect()
}

fn flatten(points: &[[f32; 3]]) -> Vec<f32> {
    points.iter().flat_map(|p| p.iter().copied()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockPart {
    pub name: String,
    pub output: PartOutputKind,
    pub instanced: bool,
    pub attributes: BTreeMap<String, AttributeBuffer>,
}

impl MockPart {
    fn with_points(name: &str, output: PartOutputKind, pts: &[[f32; 3]]) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            attrib::POSITION.to_string(),
            AttributeBuffer::Float {
                tuple_size: 3,
                data: flatten(pts),
            },
        );
        Self {
            name: name.to_string(),
            output,
            instanced: false,
            attributes,
        }
    }

    pub fn mesh(name: &str, pts: &[[f32; 3]]) -> Self {
        Self::with_points(name, PartOutputKind::Mesh, pts)
    }

    pub fn volume(name: &str, tile: i32, layer: &str) -> Self {
        Self::with_points(name, PartOutputKind::Volume, &points(4))
            .with_ints(attrib::TILE, &[tile])
            .with_strings(attrib::LAYER, &[layer])
    }

    pub fn curve(name: &str, pts: &[[f32; 3]], closed: bool) -> Self {
        Self::with_points(name, PartOutputKind::Curve, pts)
            .with_ints(attrib::CLOSED, &[i32::from(closed)])
    }

    /// An instancer with `count` points, all instancing `source`.
    pub fn instancer(name: &str, count: usize, source: &str) -> Self {
        Self::with_points(name, PartOutputKind::Instancer, &points(count))
            .with_strings(attrib::INSTANCE, &[source])
    }

    pub fn with_ints(mut self, name: &str, values: &[i32]) -> Self {
        self.attributes.insert(
            name.to_string(),
            AttributeBuffer::Int {
                tuple_size: 1,
                data: values.to_vec(),
            },
        );
        self
    }

    pub fn with_strings(mut self, name: &str, values: &[&str]) -> Self {
        self.attributes.insert(
            name.to_string(),
            AttributeBuffer::Str(values.iter().map(|v| v.to_string()).collect()),
        );
        self
    }

    pub fn as_instanced(mut self) -> Self {
        self.instanced = true;
        self
    }

    pub fn point_count(&self) -> usize {
        self.attributes
            .get(attrib::POSITION)
            .map_or(0, AttributeBuffer::len)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockGeo {
    pub name: String,
    pub kind: GeoKind,
    pub parts: Vec<MockPart>,
}

impl MockGeo {
    pub fn new(name: &str, kind: GeoKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parts: Vec::new(),
        }
    }

    pub fn display(name: &str) -> Self {
        Self::new(name, GeoKind::Display)
    }

    pub fn with_part(mut self, part: MockPart) -> Self {
        self.parts.push(part);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockObject {
    pub name: String,
    pub transform: Transform,
    pub is_instancer: bool,
    pub is_instanced: bool,
    pub is_visible: bool,
    pub geos: Vec<MockGeo>,
}

impl MockObject {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            transform: Transform::IDENTITY,
            is_instancer: false,
            is_instanced: false,
            is_visible: true,
            geos: Vec::new(),
        }
    }

    pub fn with_geo(mut self, geo: MockGeo) -> Self {
        self.geos.push(geo);
        self
    }

    pub fn as_instancer(mut self) -> Self {
        self.is_instancer = true;
        self
    }

    pub fn as_instanced(mut self) -> Self {
        self.is_instanced = true;
        self.is_visible = false;
        self
    }
}

/// One object with one display geo holding one mesh part of `n` points.
pub fn mesh_object(object: &str, part: &str, n: usize) -> MockObject {
    MockObject::new(object).with_geo(MockGeo::display("display").with_part(MockPart::mesh(part, &points(n))))
}

// ===========================================================================
// Mock asset types
// ===========================================================================

/// What a mock asset type sees when it is cooked.
pub struct CookInputs<'a> {
    pub parameters: &'a BTreeMap<String, ParameterValue>,
    pub inputs: &'a [Vec<ObjectRef>],
    pub transform: &'a Transform,
    /// Parameters set on object or geo nodes, keyed by `object/geo` path.
    pub node_edits: &'a BTreeMap<String, BTreeMap<String, ParameterValue>>,
}

impl CookInputs<'_> {
    pub fn float(&self, name: &str) -> Option<f32> {
        match self.parameters.get(name)? {
            ParameterValue::Float(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        match self.parameters.get(name)? {
            ParameterValue::Int(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn is_connected(&self, index: usize) -> bool {
        self.inputs.get(index).is_some_and(|i| !i.is_empty())
    }

    pub fn edit(&self, path: &str, parm: &str) -> Option<&ParameterValue> {
        self.node_edits.get(path)?.get(parm)
    }
}

type Generator = Box<dyn Fn(&CookInputs<'_>) -> Vec<MockObject>>;

/// A scriptable asset type.
pub struct MockAssetType {
    pub name: String,
    pub defaults: BTreeMap<String, ParameterValue>,
    pub input_names: Vec<String>,
    generator: Generator,
}

impl MockAssetType {
    pub fn new(
        name: &str,
        generator: impl Fn(&CookInputs<'_>) -> Vec<MockObject> + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            defaults: BTreeMap::new(),
            input_names: Vec::new(),
            generator: Box::new(generator),
        }
    }

    /// An asset type that always produces `scene`.
    pub fn fixed(name: &str, scene: Vec<MockObject>) -> Self {
        Self::new(name, move |_| scene.clone())
    }

    pub fn with_parameter(mut self, name: &str, value: ParameterValue) -> Self {
        self.defaults.insert(name.to_string(), value);
        self
    }

    pub fn with_inputs(mut self, names: &[&str]) -> Self {
        self.input_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// The builtin curve node: one object `curve` with a curve container
    /// geo `curve`, driven by the coords edits uploaded to that geo.
    pub fn curve() -> Self {
        Self::new("sop/curve", |inputs| {
            let pts = match inputs.edit("curve/curve", CURVE_COORDS_PARM) {
                Some(ParameterValue::Float(flat)) => flat
                    .chunks_exact(3)
                    .map(|c| [c[0], c[1], c[2]])
                    .collect(),
                _ => points(2),
            };
            let closed = matches!(
                inputs.edit("curve/curve", CURVE_CLOSED_PARM),
                Some(ParameterValue::Toggle(true))
            );
            vec![MockObject::new("curve").with_geo(
                MockGeo::new("curve", GeoKind::CurveContainer)
                    .with_part(MockPart::curve("curve", &pts, closed)),
            )]
        })
    }
}

// ===========================================================================
// MockSession
// ===========================================================================

struct AssetState {
    type_name: String,
    parameters: BTreeMap<String, ParameterValue>,
    inputs: Vec<Vec<ObjectRef>>,
    transform: Transform,
    node_edits: BTreeMap<String, BTreeMap<String, ParameterValue>>,
    published: Vec<MockObject>,
    geo_snapshots: BTreeMap<String, MockGeo>,
    changed: BTreeSet<String>,
}

enum MockNode {
    Asset(Box<AssetState>),
    Object { asset: SessionNodeId, name: String },
    Geo { asset: SessionNodeId, path: String },
}

/// An in-memory [`GenerationSession`].
pub struct MockSession {
    types: BTreeMap<String, MockAssetType>,
    libraries: BTreeMap<PathBuf, Vec<String>>,
    nodes: BTreeMap<SessionNodeId, MockNode>,
    path_ids: BTreeMap<(SessionNodeId, String), SessionNodeId>,
    next_id: i32,
    /// Polls answered with `StillCooking` before a cook completes.
    pub cook_polls: u32,
    statuses: VecDeque<CookStatus>,
    pending: Option<(SessionNodeId, u32)>,
    refuse_cooks: bool,
    failing_listings: BTreeSet<String>,
    failing_asset_listing: bool,
    messages: Vec<String>,
    /// Cooks accepted so far.
    pub cook_count: usize,
    /// Parameter values written so far, in order.
    pub uploads: Vec<(SessionNodeId, String)>,
    pub transform_uploads: usize,
    pub deleted: Vec<SessionNodeId>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    pub fn new() -> Self {
        let mut session = Self {
            types: BTreeMap::new(),
            libraries: BTreeMap::new(),
            nodes: BTreeMap::new(),
            path_ids: BTreeMap::new(),
            next_id: 1,
            cook_polls: 0,
            statuses: VecDeque::new(),
            pending: None,
            refuse_cooks: false,
            failing_listings: BTreeSet::new(),
            failing_asset_listing: false,
            messages: Vec::new(),
            cook_count: 0,
            uploads: Vec::new(),
            transform_uploads: 0,
            deleted: Vec::new(),
        };
        session.register(MockAssetType::curve());
        session
    }

    pub fn register(&mut self, asset_type: MockAssetType) {
        self.types.insert(asset_type.name.clone(), asset_type);
    }

    /// Register a library at `path` defining the named asset types.
    pub fn add_library(&mut self, path: impl Into<PathBuf>, types: &[&str]) {
        self.libraries
            .insert(path.into(), types.iter().map(|t| t.to_string()).collect());
    }

    /// Register `asset_type` in a library of its own and return a
    /// definition that instantiates it.
    pub fn with_asset(&mut self, asset_type: MockAssetType) -> AssetDefinition {
        let name = asset_type.name.clone();
        let path = PathBuf::from(format!("{name}.hda"));
        self.add_library(path.clone(), &[name.as_str()]);
        self.register(asset_type);
        AssetDefinition::procedural(name, path)
    }

    /// Status returned by the next completed cook. Cooks without a scripted
    /// status succeed.
    pub fn script_status(&mut self, status: CookStatus) {
        self.statuses.push_back(status);
    }

    pub fn refuse_cooks(&mut self, refuse: bool) {
        self.refuse_cooks = refuse;
    }

    /// Make `child_nodes` fail for the object or geo at `path`
    /// (`object` or `object/geo`).
    pub fn fail_listing(&mut self, path: &str) {
        self.failing_listings.insert(path.to_string());
    }

    /// Make `child_nodes` fail for every asset node, so a cook completes
    /// but its output can not be listed.
    pub fn fail_asset_listing(&mut self, fail: bool) {
        self.failing_asset_listing = fail;
    }

    /// Forget every node, as if the engine process restarted. Handles issued
    /// before the restart are never reused.
    pub fn restart(&mut self) {
        self.nodes.clear();
        self.path_ids.clear();
        self.pending = None;
        self.next_id += 1000;
    }

    pub fn asset_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| matches!(n, MockNode::Asset(_)))
            .count()
    }

    /// Current parameter value on an asset node, bypassing the trait.
    pub fn parameter(&self, node: SessionNodeId, name: &str) -> Option<&ParameterValue> {
        match self.nodes.get(&node)? {
            MockNode::Asset(state) => state.parameters.get(name),
            _ => None,
        }
    }

    pub fn connected(&self, node: SessionNodeId, index: usize) -> Option<&[ObjectRef]> {
        match self.nodes.get(&node)? {
            MockNode::Asset(state) => state.inputs.get(index).map(Vec::as_slice),
            _ => None,
        }
    }

    fn asset(&self, node: SessionNodeId) -> Result<&AssetState, SessionError> {
        match self.nodes.get(&node) {
            Some(MockNode::Asset(state)) => Ok(state),
            _ => Err(SessionError::InvalidNode(node)),
        }
    }

    fn asset_mut(&mut self, node: SessionNodeId) -> Result<&mut AssetState, SessionError> {
        match self.nodes.get_mut(&node) {
            Some(MockNode::Asset(state)) => Ok(state),
            _ => Err(SessionError::InvalidNode(node)),
        }
    }

    fn id_for(&mut self, asset: SessionNodeId, path: &str) -> SessionNodeId {
        if let Some(id) = self.path_ids.get(&(asset, path.to_string())) {
            return *id;
        }
        let id = SessionNodeId(self.next_id);
        self.next_id += 1;
        self.path_ids.insert((asset, path.to_string()), id);
        id
    }

    /// Run the generator of `asset` and publish its scene.
    fn publish(&mut self, asset: SessionNodeId) -> Result<(), SessionError> {
        let state = self.asset(asset)?;
        let generator = self
            .types
            .get(&state.type_name)
            .ok_or_else(|| SessionError::UnknownAssetType(state.type_name.clone()))?;
        let scene = (generator.generator)(&CookInputs {
            parameters: &state.parameters,
            inputs: &state.inputs,
            transform: &state.transform,
            node_edits: &state.node_edits,
        });

        let mut snapshots = BTreeMap::new();
        let mut changed = BTreeSet::new();
        for object in &scene {
            let id = self.id_for(asset, &object.name);
            self.nodes.insert(
                id,
                MockNode::Object {
                    asset,
                    name: object.name.clone(),
                },
            );
            for geo in &object.geos {
                let path = format!("{}/{}", object.name, geo.name);
                let id = self.id_for(asset, &path);
                self.nodes.insert(
                    id,
                    MockNode::Geo {
                        asset,
                        path: path.clone(),
                    },
                );
                snapshots.insert(path, geo.clone());
            }
        }

        let state = self.asset_mut(asset)?;
        for (path, geo) in &snapshots {
            if state.geo_snapshots.get(path) != Some(geo) {
                changed.insert(path.clone());
            }
        }
        state.geo_snapshots = snapshots;
        state.changed = changed;
        state.published = scene;
        Ok(())
    }

    fn find_geo(&self, asset: SessionNodeId, path: &str) -> Option<&MockGeo> {
        let state = self.asset(asset).ok()?;
        let (object, geo) = path.split_once('/')?;
        state
            .published
            .iter()
            .find(|o| o.name == object)?
            .geos
            .iter()
            .find(|g| g.name == geo)
    }
}

impl GenerationSession for MockSession {
    fn load_library(&mut self, path: &Path) -> Result<Vec<String>, SessionError> {
        self.libraries
            .get(path)
            .cloned()
            .ok_or_else(|| SessionError::LibraryLoad {
                path: path.display().to_string(),
                reason: "no such library".into(),
            })
    }

    fn create_node(
        &mut self,
        _parent: Option<SessionNodeId>,
        type_name: &str,
    ) -> Result<SessionNodeId, SessionError> {
        let asset_type = self
            .types
            .get(type_name)
            .ok_or_else(|| SessionError::UnknownAssetType(type_name.to_string()))?;
        let state = AssetState {
            type_name: type_name.to_string(),
            parameters: asset_type.defaults.clone(),
            inputs: vec![Vec::new(); asset_type.input_names.len()],
            transform: Transform::IDENTITY,
            node_edits: BTreeMap::new(),
            published: Vec::new(),
            geo_snapshots: BTreeMap::new(),
            changed: BTreeSet::new(),
        };
        let id = SessionNodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, MockNode::Asset(Box::new(state)));
        Ok(id)
    }

    fn delete_node(&mut self, node: SessionNodeId) -> Result<(), SessionError> {
        if self.nodes.remove(&node).is_none() {
            return Err(SessionError::InvalidNode(node));
        }
        self.nodes.retain(|_, n| match n {
            MockNode::Object { asset, .. } | MockNode::Geo { asset, .. } => *asset != node,
            MockNode::Asset(_) => true,
        });
        self.path_ids.retain(|(asset, _), _| *asset != node);
        self.deleted.push(node);
        Ok(())
    }

    fn is_node_valid(&self, node: SessionNodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    fn cook_node(
        &mut self,
        node: SessionNodeId,
        _options: &CookOptions,
    ) -> Result<bool, SessionError> {
        self.asset(node)?;
        if self.refuse_cooks {
            return Ok(false);
        }
        self.cook_count += 1;
        self.pending = Some((node, self.cook_polls));
        Ok(true)
    }

    fn poll_cook_status(&mut self) -> CookStatus {
        let Some((node, remaining)) = self.pending else {
            return CookStatus::ReadySuccess;
        };
        if remaining > 0 {
            self.pending = Some((node, remaining - 1));
            return CookStatus::StillCooking;
        }
        self.pending = None;
        let status = self.statuses.pop_front().unwrap_or(CookStatus::ReadySuccess);
        self.messages.clear();
        match status {
            CookStatus::FatalError => {
                self.messages.push("cook failed".into());
                CookStatus::FatalError
            }
            status => match self.publish(node) {
                Ok(()) => {
                    if status == CookStatus::ReadyWithWarnings {
                        self.messages.push("cooked with warnings".into());
                    }
                    status
                }
                Err(_) => CookStatus::FatalError,
            },
        }
    }

    fn cook_messages(&self, _node: SessionNodeId) -> Vec<String> {
        self.messages.clone()
    }

    fn child_nodes(&self, node: SessionNodeId) -> Result<Vec<NodeDescriptor>, SessionError> {
        let listing_failed = |path: &str| SessionError::Call {
            call: "child_nodes",
            reason: format!("listing of {path} failed"),
        };
        match self.nodes.get(&node) {
            Some(MockNode::Asset(_)) if self.failing_asset_listing => Err(listing_failed("asset")),
            Some(MockNode::Asset(state)) => Ok(state
                .published
                .iter()
                .map(|o| NodeDescriptor {
                    id: self
                        .path_ids
                        .get(&(node, o.name.clone()))
                        .copied()
                        .unwrap_or(SessionNodeId::INVALID),
                    name: o.name.clone(),
                    changed: o
                        .geos
                        .iter()
                        .any(|g| state.changed.contains(&format!("{}/{}", o.name, g.name))),
                    kind: DescriptorKind::Object {
                        transform: o.transform,
                        is_instancer: o.is_instancer,
                        is_instanced: o.is_instanced,
                        is_visible: o.is_visible,
                    },
                })
                .collect()),
            Some(MockNode::Object { asset, name }) => {
                if self.failing_listings.contains(name) {
                    return Err(listing_failed(name));
                }
                let state = self.asset(*asset)?;
                let Some(object) = state.published.iter().find(|o| &o.name == name) else {
                    return Ok(Vec::new());
                };
                Ok(object
                    .geos
                    .iter()
                    .map(|g| {
                        let path = format!("{name}/{}", g.name);
                        NodeDescriptor {
                            id: self
                                .path_ids
                                .get(&(*asset, path.clone()))
                                .copied()
                                .unwrap_or(SessionNodeId::INVALID),
                            name: g.name.clone(),
                            changed: state.changed.contains(&path),
                            kind: DescriptorKind::Geo { kind: g.kind },
                        }
                    })
                    .collect())
            }
            Some(MockNode::Geo { asset, path }) => {
                if self.failing_listings.contains(path) {
                    return Err(listing_failed(path));
                }
                let Some(geo) = self.find_geo(*asset, path) else {
                    return Ok(Vec::new());
                };
                Ok(geo
                    .parts
                    .iter()
                    .enumerate()
                    .map(|(i, p)| NodeDescriptor {
                        id: node,
                        name: p.name.clone(),
                        changed: true,
                        kind: DescriptorKind::Part {
                            part_id: PartId(i as i32),
                            output: p.output,
                            is_instanced: p.instanced,
                            point_count: p.point_count(),
                        },
                    })
                    .collect())
            }
            None => Err(SessionError::InvalidNode(node)),
        }
    }

    fn attribute_buffer(
        &self,
        node: SessionNodeId,
        part: PartId,
        name: &str,
    ) -> Result<Option<AttributeBuffer>, SessionError> {
        let Some(MockNode::Geo { asset, path }) = self.nodes.get(&node) else {
            return Err(SessionError::InvalidNode(node));
        };
        Ok(self
            .find_geo(*asset, path)
            .and_then(|g| g.parts.get(part.0 as usize))
            .and_then(|p| p.attributes.get(name).cloned()))
    }

    fn set_parameter_value(
        &mut self,
        node: SessionNodeId,
        name: &str,
        value: &ParameterValue,
    ) -> Result<(), SessionError> {
        let (asset, path) = match self.nodes.get(&node) {
            Some(MockNode::Asset(_)) => (node, None),
            Some(MockNode::Object { asset, name }) => (*asset, Some(name.clone())),
            Some(MockNode::Geo { asset, path }) => (*asset, Some(path.clone())),
            None => return Err(SessionError::InvalidNode(node)),
        };
        let state = self.asset_mut(asset)?;
        match path {
            None => {
                state.parameters.insert(name.to_string(), value.clone());
            }
            Some(path) => {
                state
                    .node_edits
                    .entry(path)
                    .or_default()
                    .insert(name.to_string(), value.clone());
            }
        }
        self.uploads.push((node, name.to_string()));
        Ok(())
    }

    fn parameter_value(
        &self,
        node: SessionNodeId,
        name: &str,
    ) -> Result<Option<ParameterValue>, SessionError> {
        Ok(self.asset(node)?.parameters.get(name).cloned())
    }

    fn revert_parameters(&mut self, node: SessionNodeId) -> Result<(), SessionError> {
        let type_name = self.asset(node)?.type_name.clone();
        let defaults = self
            .types
            .get(&type_name)
            .map(|t| t.defaults.clone())
            .unwrap_or_default();
        self.asset_mut(node)?.parameters = defaults;
        Ok(())
    }

    fn parameter_preset(&self, node: SessionNodeId) -> Result<Vec<u8>, SessionError> {
        bitcode::serialize(&self.asset(node)?.parameters).map_err(|e| SessionError::Call {
            call: "parameter_preset",
            reason: e.to_string(),
        })
    }

    fn set_parameter_preset(
        &mut self,
        node: SessionNodeId,
        blob: &[u8],
    ) -> Result<(), SessionError> {
        let parameters: BTreeMap<String, ParameterValue> =
            bitcode::deserialize(blob).map_err(|e| SessionError::Call {
                call: "set_parameter_preset",
                reason: e.to_string(),
            })?;
        self.asset_mut(node)?.parameters = parameters;
        Ok(())
    }

    fn input_names(&self, node: SessionNodeId) -> Result<Vec<String>, SessionError> {
        let state = self.asset(node)?;
        Ok(self
            .types
            .get(&state.type_name)
            .map(|t| t.input_names.clone())
            .unwrap_or_default())
    }

    fn connect_input(
        &mut self,
        node: SessionNodeId,
        index: usize,
        sources: &[ObjectRef],
    ) -> Result<(), SessionError> {
        let state = self.asset_mut(node)?;
        let slot = state
            .inputs
            .get_mut(index)
            .ok_or(SessionError::InputOutOfRange { node, index })?;
        *slot = sources.to_vec();
        Ok(())
    }

    fn disconnect_input(&mut self, node: SessionNodeId, index: usize) -> Result<(), SessionError> {
        let state = self.asset_mut(node)?;
        let slot = state
            .inputs
            .get_mut(index)
            .ok_or(SessionError::InputOutOfRange { node, index })?;
        slot.clear();
        Ok(())
    }

    fn set_node_transform(
        &mut self,
        node: SessionNodeId,
        transform: &Transform,
    ) -> Result<(), SessionError> {
        self.asset_mut(node)?.transform = *transform;
        self.transform_uploads += 1;
        Ok(())
    }
}

// ===========================================================================
// RecordingHost
// ===========================================================================

/// One call observed by [`RecordingHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    RealizeMesh {
        existing: Option<HostHandle>,
        handle: HostHandle,
        name: String,
        lod: u32,
    },
    RealizeCollider {
        mesh: HostHandle,
        handle: HostHandle,
    },
    RealizeVolume {
        existing: Option<HostHandle>,
        handle: HostHandle,
        tile: i32,
        layer: String,
    },
    RealizeCurve {
        existing: Option<HostHandle>,
        handle: HostHandle,
        points: usize,
    },
    Spawn {
        source: InstanceSource,
        handle: HostHandle,
    },
    ApplyOverride {
        instance: HostHandle,
        slot: usize,
    },
    Place {
        resource: Resource,
        transform: Transform,
    },
    CreateMaterial {
        key: MaterialKey,
        handle: HostHandle,
    },
    Bake {
        resource: Resource,
        handle: HostHandle,
    },
    Release(Resource),
}

/// An [`OutputHost`] that allocates sequential handles and logs every call.
/// In-place updates of a live handle return that same handle.
#[derive(Debug, Default)]
pub struct RecordingHost {
    next: u64,
    live: BTreeSet<HostHandle>,
    log: Vec<HostOp>,
    overrides_applied: usize,
    failing: BTreeSet<String>,
    baked: Vec<HostHandle>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            next: 100,
            ..Self::default()
        }
    }

    pub fn log(&self) -> &[HostOp] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Handles created and not yet released.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: HostHandle) -> bool {
        self.live.contains(&handle)
    }

    pub fn overrides_applied(&self) -> usize {
        self.overrides_applied
    }

    pub fn baked(&self) -> &[HostHandle] {
        &self.baked
    }

    /// Fail every realization of geometry named `name`.
    pub fn fail_geometry(&mut self, name: &str) {
        self.failing.insert(name.to_string());
    }

    pub fn count(&self, pred: impl Fn(&HostOp) -> bool) -> usize {
        self.log.iter().filter(|op| pred(op)).count()
    }

    fn allocate(&mut self) -> HostHandle {
        let handle = HostHandle(self.next);
        self.next += 1;
        self.live.insert(handle);
        handle
    }

    fn reuse_or_allocate(&mut self, existing: Option<HostHandle>) -> HostHandle {
        match existing {
            Some(handle) if self.live.contains(&handle) => handle,
            _ => self.allocate(),
        }
    }

    fn check(&self, kind: &'static str, name: &str) -> Result<(), HostError> {
        if self.failing.contains(name) {
            return Err(HostError::Realize {
                kind,
                reason: format!("{name} is marked failing"),
            });
        }
        Ok(())
    }
}

impl OutputHost for RecordingHost {
    fn realize_mesh(
        &mut self,
        existing: Option<HostHandle>,
        geometry: &MeshGeometry,
    ) -> Result<HostHandle, HostError> {
        self.check("mesh", &geometry.name)?;
        let handle = self.reuse_or_allocate(existing);
        self.log.push(HostOp::RealizeMesh {
            existing,
            handle,
            name: geometry.name.clone(),
            lod: geometry.lod,
        });
        Ok(handle)
    }

    fn realize_collider(
        &mut self,
        mesh: HostHandle,
        _points: &[[f32; 3]],
    ) -> Result<HostHandle, HostError> {
        let handle = self.allocate();
        self.log.push(HostOp::RealizeCollider { mesh, handle });
        Ok(handle)
    }

    fn realize_volume(
        &mut self,
        existing: Option<HostHandle>,
        volume: &VolumeGeometry,
    ) -> Result<HostHandle, HostError> {
        self.check("volume", &volume.name)?;
        let handle = self.reuse_or_allocate(existing);
        self.log.push(HostOp::RealizeVolume {
            existing,
            handle,
            tile: volume.tile,
            layer: volume.layer.clone(),
        });
        Ok(handle)
    }

    fn realize_curve(
        &mut self,
        existing: Option<HostHandle>,
        curve: &CurveGeometry,
    ) -> Result<HostHandle, HostError> {
        self.check("curve", &curve.name)?;
        let handle = self.reuse_or_allocate(existing);
        self.log.push(HostOp::RealizeCurve {
            existing,
            handle,
            points: curve.points.len(),
        });
        Ok(handle)
    }

    fn spawn_instance(
        &mut self,
        source: &InstanceSource,
        _transform: &Transform,
    ) -> Result<HostHandle, HostError> {
        let (InstanceSource::Asset(path) | InstanceSource::Object(path)) = source;
        if self.failing.contains(path) {
            return Err(HostError::UnknownSource(source.clone()));
        }
        let handle = self.allocate();
        self.log.push(HostOp::Spawn {
            source: source.clone(),
            handle,
        });
        Ok(handle)
    }

    fn apply_instance_override(
        &mut self,
        instance: HostHandle,
        applied: &InstanceOverride,
    ) -> Result<(), HostError> {
        if !self.live.contains(&instance) {
            return Err(HostError::UnknownHandle(instance));
        }
        self.overrides_applied += 1;
        self.log.push(HostOp::ApplyOverride {
            instance,
            slot: applied.slot,
        });
        Ok(())
    }

    fn place(&mut self, resource: Resource, transform: &Transform) -> Result<(), HostError> {
        if !self.live.contains(&resource.handle()) {
            return Err(HostError::UnknownHandle(resource.handle()));
        }
        self.log.push(HostOp::Place {
            resource,
            transform: *transform,
        });
        Ok(())
    }

    fn create_material(&mut self, key: &MaterialKey) -> Result<HostHandle, HostError> {
        let handle = self.allocate();
        self.log.push(HostOp::CreateMaterial {
            key: key.clone(),
            handle,
        });
        Ok(handle)
    }

    fn bake(&mut self, resource: Resource) -> Result<HostHandle, HostError> {
        if !self.live.contains(&resource.handle()) {
            return Err(HostError::UnknownHandle(resource.handle()));
        }
        let handle = HostHandle(self.next);
        self.next += 1;
        self.baked.push(handle);
        self.log.push(HostOp::Bake { resource, handle });
        Ok(handle)
    }

    fn release(&mut self, resource: Resource) {
        self.live.remove(&resource.handle());
        self.log.push(HostOp::Release(resource));
    }
}
