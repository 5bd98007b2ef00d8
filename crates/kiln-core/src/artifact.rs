//! Output artifacts: the realized, host-side result of one part.
//!
//! An [`OutputArtifact`] is a tagged union over the output kinds a part can
//! produce. Switching kinds always destroys the previous representation
//! first, so an artifact never holds resources of two kinds at once.
//!
//! # Release order
//!
//! Colliders are attached to physics meshes on the host side, so
//! [`OutputArtifact::destroy`] releases every collider of every unit before
//! it releases any mesh, volume, curve, or spawned instance.

use crate::host::{
    CurveGeometry, HostError, InstanceOverride, InstanceSource, MeshGeometry, OutputHost,
    Resource, VolumeGeometry,
};
use crate::id::HostHandle;
use crate::session::Transform;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Discriminant of an artifact's current representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Empty,
    Mesh,
    Volume,
    Curve,
    Instancer,
}

// ---------------------------------------------------------------------------
// Realized units
// ---------------------------------------------------------------------------

/// One realized host resource plus what hangs off it.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedUnit {
    pub resource: Resource,
    pub colliders: Vec<HostHandle>,
    /// Materials the session generated for each slot at the last realization.
    pub generated_materials: Vec<HostHandle>,
    /// Materials currently assigned to each slot. A slot whose assigned
    /// material differs from its generated one carries a caller override.
    pub assigned_materials: Vec<HostHandle>,
}

impl RealizedUnit {
    fn new(resource: Resource) -> Self {
        Self {
            resource,
            colliders: Vec::new(),
            generated_materials: Vec::new(),
            assigned_materials: Vec::new(),
        }
    }

    /// Slots whose assigned material was set by a caller.
    pub fn material_overrides(&self) -> Vec<(usize, HostHandle)> {
        self.assigned_materials
            .iter()
            .enumerate()
            .filter(|(slot, assigned)| self.generated_materials.get(*slot) != Some(*assigned))
            .map(|(slot, assigned)| (slot, *assigned))
            .collect()
    }

    /// Merge freshly generated materials with the current assignment,
    /// keeping every caller override whose slot still exists.
    fn merge_materials(&self, generated: &[HostHandle]) -> Vec<HostHandle> {
        generated
            .iter()
            .enumerate()
            .map(|(slot, fresh)| {
                match (
                    self.assigned_materials.get(slot),
                    self.generated_materials.get(slot),
                ) {
                    (Some(assigned), Some(previous)) if assigned != previous => *assigned,
                    (Some(assigned), None) => *assigned,
                    _ => *fresh,
                }
            })
            .collect()
    }

    fn release_colliders(&mut self, host: &mut dyn OutputHost) {
        for collider in self.colliders.drain(..) {
            host.release(Resource::Collider(collider));
        }
    }
}

// ---------------------------------------------------------------------------
// Instancer bookkeeping
// ---------------------------------------------------------------------------

/// Instances spawned from one source by an instancer part.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInstanceInfo {
    pub source: InstanceSource,
    /// Spawned host instances, in point order.
    pub instances: Vec<HostHandle>,
    /// Instancer point index of each spawned instance.
    pub slots: Vec<usize>,
    /// User overrides, keyed by point slot. Survive every rebuild.
    pub overrides: Vec<InstanceOverride>,
}

impl ObjectInstanceInfo {
    pub fn new(source: InstanceSource) -> Self {
        Self {
            source,
            instances: Vec::new(),
            slots: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Set or replace the override for `slot`.
    pub fn set_override(&mut self, applied: InstanceOverride) {
        match self.overrides.iter_mut().find(|o| o.slot == applied.slot) {
            Some(existing) => *existing = applied,
            None => self.overrides.push(applied),
        }
    }

    pub fn override_for(&self, slot: usize) -> Option<&InstanceOverride> {
        self.overrides.iter().find(|o| o.slot == slot)
    }

    fn release_instances(&mut self, host: &mut dyn OutputHost) {
        for instance in self.instances.drain(..) {
            host.release(Resource::Instance(instance));
        }
        self.slots.clear();
    }
}

/// Points of one instancer grouped by their source.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceGroup {
    pub source: InstanceSource,
    /// `(point slot, transform)` for each point using this source.
    pub points: Vec<(usize, Transform)>,
}

// ---------------------------------------------------------------------------
// OutputArtifact
// ---------------------------------------------------------------------------

/// Input for realizing one mesh level of detail.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshLod {
    /// Geometry whose `materials` are the session-generated materials.
    pub geometry: MeshGeometry,
    /// Points flagged as collision geometry. Empty for no collider.
    pub collision_points: Vec<[f32; 3]>,
}

#[derive(Debug, Clone, PartialEq, Default)]
enum ArtifactBody {
    #[default]
    Empty,
    Mesh {
        primary: RealizedUnit,
        /// Additional detail levels, ordered by level.
        children: Vec<RealizedUnit>,
    },
    Volume {
        unit: RealizedUnit,
        tile: i32,
        layer: String,
    },
    Curve {
        unit: RealizedUnit,
    },
    Instancer {
        infos: Vec<ObjectInstanceInfo>,
    },
}

/// The realized output of one part.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputArtifact {
    body: ArtifactBody,
    /// Incremented whenever the artifact is destroyed and rebuilt from
    /// scratch. In-place updates leave it unchanged.
    generation: u32,
}

impl OutputArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> ArtifactKind {
        match &self.body {
            ArtifactBody::Empty => ArtifactKind::Empty,
            ArtifactBody::Mesh { .. } => ArtifactKind::Mesh,
            ArtifactBody::Volume { .. } => ArtifactKind::Volume,
            ArtifactBody::Curve { .. } => ArtifactKind::Curve,
            ArtifactBody::Instancer { .. } => ArtifactKind::Instancer,
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.body, ArtifactBody::Empty)
    }

    /// The primary realized unit, if the current kind has one.
    pub fn primary(&self) -> Option<&RealizedUnit> {
        match &self.body {
            ArtifactBody::Mesh { primary, .. } => Some(primary),
            ArtifactBody::Volume { unit, .. } | ArtifactBody::Curve { unit } => Some(unit),
            ArtifactBody::Empty | ArtifactBody::Instancer { .. } => None,
        }
    }

    /// Child units (lower detail levels of a mesh).
    pub fn children(&self) -> &[RealizedUnit] {
        match &self.body {
            ArtifactBody::Mesh { children, .. } => children,
            _ => &[],
        }
    }

    /// Volume tile and layer name, for volume artifacts.
    pub fn volume_layer(&self) -> Option<(i32, &str)> {
        match &self.body {
            ArtifactBody::Volume { tile, layer, .. } => Some((*tile, layer.as_str())),
            _ => None,
        }
    }

    pub fn instance_infos(&self) -> &[ObjectInstanceInfo] {
        match &self.body {
            ArtifactBody::Instancer { infos } => infos,
            _ => &[],
        }
    }

    pub fn instance_infos_mut(&mut self) -> Option<&mut Vec<ObjectInstanceInfo>> {
        match &mut self.body {
            ArtifactBody::Instancer { infos } => Some(infos),
            _ => None,
        }
    }

    /// Every host resource currently owned, colliders first.
    pub fn resources(&self) -> Vec<Resource> {
        let mut out = Vec::new();
        let units: Vec<&RealizedUnit> = self.primary().into_iter().chain(self.children()).collect();
        for unit in &units {
            out.extend(unit.colliders.iter().map(|c| Resource::Collider(*c)));
        }
        out.extend(units.iter().map(|u| u.resource));
        for info in self.instance_infos() {
            out.extend(info.instances.iter().map(|i| Resource::Instance(*i)));
        }
        out
    }

    // -----------------------------------------------------------------------
    // Material overrides
    // -----------------------------------------------------------------------

    /// Assign `material` to `slot` of the primary unit and every child unit
    /// that has the slot. Returns `false` if the primary has no such slot.
    pub fn set_material_override(&mut self, slot: usize, material: HostHandle) -> bool {
        let units: Vec<&mut RealizedUnit> = match &mut self.body {
            ArtifactBody::Mesh { primary, children } => {
                std::iter::once(primary).chain(children.iter_mut()).collect()
            }
            ArtifactBody::Volume { unit, .. } | ArtifactBody::Curve { unit } => vec![unit],
            ArtifactBody::Empty | ArtifactBody::Instancer { .. } => return false,
        };
        let mut units = units.into_iter();
        let Some(primary) = units.next() else {
            return false;
        };
        let Some(assigned) = primary.assigned_materials.get_mut(slot) else {
            return false;
        };
        *assigned = material;
        for child in units {
            if let Some(assigned) = child.assigned_materials.get_mut(slot) {
                *assigned = material;
            }
        }
        true
    }

    /// Caller overrides on the primary unit.
    pub fn material_overrides(&self) -> Vec<(usize, HostHandle)> {
        self.primary()
            .map(RealizedUnit::material_overrides)
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Release every host resource and return to [`ArtifactKind::Empty`].
    pub fn destroy(&mut self, host: &mut dyn OutputHost) {
        match std::mem::take(&mut self.body) {
            ArtifactBody::Empty => return,
            ArtifactBody::Mesh {
                mut primary,
                mut children,
            } => {
                primary.release_colliders(host);
                for child in &mut children {
                    child.release_colliders(host);
                }
                host.release(primary.resource);
                for child in children {
                    host.release(child.resource);
                }
            }
            ArtifactBody::Volume { mut unit, .. } | ArtifactBody::Curve { mut unit } => {
                unit.release_colliders(host);
                host.release(unit.resource);
            }
            ArtifactBody::Instancer { mut infos } => {
                for info in &mut infos {
                    info.release_instances(host);
                }
            }
        }
        self.generation += 1;
    }

    /// Make sure the artifact is of `kind`, destroying the previous
    /// representation when it is not.
    fn ensure_kind(&mut self, kind: ArtifactKind, host: &mut dyn OutputHost) {
        if self.kind() != kind && !self.is_empty() {
            self.destroy(host);
        }
    }

    /// Realize a mesh with one unit per detail level. The first entry is the
    /// primary, the rest become children. Existing units are updated in
    /// place and keep their material overrides.
    pub fn realize_mesh(
        &mut self,
        host: &mut dyn OutputHost,
        lods: Vec<MeshLod>,
        generate_colliders: bool,
    ) -> Result<(), HostError> {
        self.ensure_kind(ArtifactKind::Mesh, host);
        let mut previous: Vec<RealizedUnit> = match std::mem::take(&mut self.body) {
            ArtifactBody::Mesh { primary, children } => {
                std::iter::once(primary).chain(children).collect()
            }
            _ => Vec::new(),
        };

        // Surplus detail levels go first, colliders before meshes.
        let surplus: Vec<RealizedUnit> = if previous.len() > lods.len() {
            previous.split_off(lods.len())
        } else {
            Vec::new()
        };
        release_units(host, surplus);

        let mut units = Vec::with_capacity(lods.len());
        let mut previous = previous.into_iter();
        for lod in lods {
            let old = previous.next();
            match realize_mesh_unit(host, old, lod, generate_colliders) {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    // Leave nothing half-built behind.
                    release_units(host, units);
                    release_units(host, previous.collect());
                    self.generation += 1;
                    return Err(e);
                }
            }
        }

        let mut units = units.into_iter();
        self.body = match units.next() {
            Some(primary) => ArtifactBody::Mesh {
                primary,
                children: units.collect(),
            },
            None => ArtifactBody::Empty,
        };
        Ok(())
    }

    pub fn realize_volume(
        &mut self,
        host: &mut dyn OutputHost,
        volume: &VolumeGeometry,
    ) -> Result<(), HostError> {
        self.ensure_kind(ArtifactKind::Volume, host);
        let existing = match &self.body {
            ArtifactBody::Volume { unit, .. } => Some(unit.resource.handle()),
            _ => None,
        };
        let handle = host.realize_volume(existing, volume)?;
        match &mut self.body {
            ArtifactBody::Volume { unit, tile, layer } => {
                unit.resource = Resource::Volume(handle);
                *tile = volume.tile;
                layer.clone_from(&volume.layer);
            }
            body => {
                *body = ArtifactBody::Volume {
                    unit: RealizedUnit::new(Resource::Volume(handle)),
                    tile: volume.tile,
                    layer: volume.layer.clone(),
                }
            }
        }
        Ok(())
    }

    pub fn realize_curve(
        &mut self,
        host: &mut dyn OutputHost,
        curve: &CurveGeometry,
    ) -> Result<(), HostError> {
        self.ensure_kind(ArtifactKind::Curve, host);
        let existing = match &self.body {
            ArtifactBody::Curve { unit } => Some(unit.resource.handle()),
            _ => None,
        };
        let handle = host.realize_curve(existing, curve)?;
        match &mut self.body {
            ArtifactBody::Curve { unit } => unit.resource = Resource::Curve(handle),
            body => {
                *body = ArtifactBody::Curve {
                    unit: RealizedUnit::new(Resource::Curve(handle)),
                }
            }
        }
        Ok(())
    }

    /// Clear every spawned instance and spawn the given groups afresh.
    ///
    /// `carried` holds the instance info of the superseded state; its
    /// override lists are kept for matching sources, its spawned handles
    /// are never reused.
    pub fn rebuild_instances(
        &mut self,
        host: &mut dyn OutputHost,
        groups: Vec<InstanceGroup>,
        carried: Vec<ObjectInstanceInfo>,
    ) -> Result<(), HostError> {
        self.ensure_kind(ArtifactKind::Instancer, host);
        if let ArtifactBody::Instancer { infos } = &mut self.body {
            for info in infos.iter_mut() {
                info.release_instances(host);
            }
        }

        let mut infos = Vec::with_capacity(groups.len());
        if let Err(e) = spawn_groups(host, groups, carried, &mut infos) {
            for info in &mut infos {
                info.release_instances(host);
            }
            self.body = ArtifactBody::Instancer { infos };
            return Err(e);
        }
        self.body = ArtifactBody::Instancer { infos };
        Ok(())
    }

    /// Take the instance infos out for migration, leaving the spawned
    /// instances owned by the artifact until the next rebuild releases them.
    pub fn carried_instance_infos(&self) -> Vec<ObjectInstanceInfo> {
        self.instance_infos()
            .iter()
            .map(|info| ObjectInstanceInfo {
                instances: Vec::new(),
                slots: Vec::new(),
                ..info.clone()
            })
            .collect()
    }
}

fn spawn_groups(
    host: &mut dyn OutputHost,
    groups: Vec<InstanceGroup>,
    mut carried: Vec<ObjectInstanceInfo>,
    infos: &mut Vec<ObjectInstanceInfo>,
) -> Result<(), HostError> {
    for group in groups {
        let mut info = match carried.iter().position(|c| c.source == group.source) {
            Some(i) => carried.swap_remove(i),
            None => ObjectInstanceInfo::new(group.source.clone()),
        };
        info.instances.clear();
        info.slots.clear();
        let spawned = spawn_points(host, &mut info, group.points);
        infos.push(info);
        spawned?;
    }
    Ok(())
}

fn spawn_points(
    host: &mut dyn OutputHost,
    info: &mut ObjectInstanceInfo,
    points: Vec<(usize, Transform)>,
) -> Result<(), HostError> {
    for (slot, transform) in points {
        let instance = host.spawn_instance(&info.source, &transform)?;
        info.instances.push(instance);
        info.slots.push(slot);
        if let Some(applied) = info.override_for(slot) {
            host.apply_instance_override(instance, applied)?;
        }
    }
    Ok(())
}

fn release_units(host: &mut dyn OutputHost, mut units: Vec<RealizedUnit>) {
    for unit in &mut units {
        unit.release_colliders(host);
    }
    for unit in units {
        host.release(unit.resource);
    }
}

fn realize_mesh_unit(
    host: &mut dyn OutputHost,
    old: Option<RealizedUnit>,
    lod: MeshLod,
    generate_colliders: bool,
) -> Result<RealizedUnit, HostError> {
    let MeshLod {
        mut geometry,
        collision_points,
    } = lod;
    let generated = std::mem::take(&mut geometry.materials);

    let (existing, assigned) = match old {
        Some(mut old) => {
            old.release_colliders(host);
            let assigned = old.merge_materials(&generated);
            (Some(old.resource.handle()), assigned)
        }
        None => (None, generated.clone()),
    };
    geometry.materials = assigned.clone();

    let mesh = match host.realize_mesh(existing, &geometry) {
        Ok(mesh) => mesh,
        Err(e) => {
            if let Some(stale) = existing {
                host.release(Resource::Mesh(stale));
            }
            return Err(e);
        }
    };
    let mut unit = RealizedUnit::new(Resource::Mesh(mesh));
    unit.generated_materials = generated;
    unit.assigned_materials = assigned;
    if generate_colliders && !collision_points.is_empty() {
        match host.realize_collider(mesh, &collision_points) {
            Ok(collider) => unit.colliders.push(collider),
            Err(e) => {
                host.release(unit.resource);
                return Err(e);
            }
        }
    }
    Ok(unit)
}
