//! Part records: the leaf unit of generated content.
//!
//! A [`PartNode`] owns exactly one [`OutputArtifact`]. Regeneration reads the
//! part's attribute buffers from the session and drives the artifact into
//! the matching representation.

use std::collections::BTreeMap;

use crate::artifact::{InstanceGroup, MeshLod, ObjectInstanceInfo, OutputArtifact};
use crate::config::AssetConfig;
use crate::host::{
    CurveGeometry, HostError, InstanceOverride, InstanceSource, MeshGeometry, OutputHost,
    VolumeGeometry,
};
use crate::id::{MaterialKey, PartId, SessionNodeId};
use crate::material::MaterialCache;
use crate::session::{
    AttributeBuffer, DescriptorKind, GenerationSession, NodeDescriptor, PartOutputKind,
    SessionError, Transform, attrib,
};

/// Errors raised while regenerating a single part.
#[derive(Debug, thiserror::Error)]
pub enum PartError {
    #[error("descriptor '{0}' is not a part")]
    NotAPart(String),
    #[error("part '{part}' has no usable '{attribute}' attribute")]
    MissingAttribute {
        part: String,
        attribute: &'static str,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Everything a part needs from its asset while regenerating.
pub struct RegenContext<'a> {
    pub session: &'a dyn GenerationSession,
    pub host: &'a mut dyn OutputHost,
    pub materials: &'a mut MaterialCache,
    pub config: &'a AssetConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartNode {
    /// Session node of the owning geo.
    pub(crate) geo_id: SessionNodeId,
    pub(crate) part_id: PartId,
    name: String,
    output: PartOutputKind,
    editable: bool,
    instanced: bool,
    point_count: usize,
    artifact: OutputArtifact,
}

impl PartNode {
    /// Create an unrealized record for `descriptor`.
    pub fn new(
        geo_id: SessionNodeId,
        descriptor: &NodeDescriptor,
        editable: bool,
    ) -> Result<Self, PartError> {
        let DescriptorKind::Part {
            part_id,
            output,
            is_instanced,
            point_count,
        } = descriptor.kind
        else {
            return Err(PartError::NotAPart(descriptor.name.clone()));
        };
        Ok(Self {
            geo_id,
            part_id,
            name: descriptor.name.clone(),
            output,
            editable,
            instanced: is_instanced,
            point_count,
            artifact: OutputArtifact::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn part_id(&self) -> PartId {
        self.part_id
    }

    pub fn output_kind(&self) -> PartOutputKind {
        self.output
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn is_instanced(&self) -> bool {
        self.instanced
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn artifact(&self) -> &OutputArtifact {
        &self.artifact
    }

    pub fn artifact_mut(&mut self) -> &mut OutputArtifact {
        &mut self.artifact
    }

    /// Rebind the record to a fresh descriptor without touching its output.
    pub(crate) fn rebind(
        &mut self,
        geo_id: SessionNodeId,
        descriptor: &NodeDescriptor,
    ) -> Result<(), PartError> {
        let DescriptorKind::Part {
            part_id,
            output,
            is_instanced,
            point_count,
        } = descriptor.kind
        else {
            return Err(PartError::NotAPart(descriptor.name.clone()));
        };
        self.geo_id = geo_id;
        self.part_id = part_id;
        self.name.clone_from(&descriptor.name);
        self.output = output;
        self.instanced = is_instanced;
        self.point_count = point_count;
        Ok(())
    }

    /// Parts of an instanced object are templates even when their own
    /// descriptor says otherwise.
    pub(crate) fn mark_template(&mut self) {
        self.instanced = true;
    }

    /// Regenerate the artifact from the session's current data.
    ///
    /// Instanced parts are templates for an instancer and realize nothing on
    /// their own.
    pub fn regenerate(&mut self, ctx: &mut RegenContext<'_>) -> Result<(), PartError> {
        if self.instanced {
            self.artifact.destroy(ctx.host);
            return Ok(());
        }
        match self.output {
            PartOutputKind::Mesh => self.regenerate_mesh(ctx),
            PartOutputKind::Volume => self.regenerate_volume(ctx),
            PartOutputKind::Curve => self.regenerate_curve(ctx),
            PartOutputKind::Instancer => self.regenerate_instancer(ctx),
        }
    }

    /// Release the artifact. Colliders go first.
    pub fn destroy(&mut self, host: &mut dyn OutputHost) {
        self.artifact.destroy(host);
    }

    /// Set a user override on the spawned instance at `slot` and apply it
    /// right away. Returns `false` if no instance occupies the slot.
    pub fn set_instance_override(
        &mut self,
        host: &mut dyn OutputHost,
        applied: InstanceOverride,
    ) -> Result<bool, HostError> {
        let Some(infos) = self.artifact.instance_infos_mut() else {
            return Ok(false);
        };
        for info in infos.iter_mut() {
            if let Some(pos) = info.slots.iter().position(|s| *s == applied.slot) {
                host.apply_instance_override(info.instances[pos], &applied)?;
                info.set_override(applied);
                return Ok(true);
            }
        }
        Ok(false)
    }

    // -----------------------------------------------------------------------
    // Per-kind regeneration
    // -----------------------------------------------------------------------

    fn read(
        &self,
        session: &dyn GenerationSession,
        name: &str,
    ) -> Result<Option<AttributeBuffer>, SessionError> {
        session.attribute_buffer(self.geo_id, self.part_id, name)
    }

    fn positions(&self, session: &dyn GenerationSession) -> Result<Vec<[f32; 3]>, PartError> {
        self.read(session, attrib::POSITION)?
            .and_then(|buf| buf.as_vec3())
            .ok_or_else(|| PartError::MissingAttribute {
                part: self.name.clone(),
                attribute: attrib::POSITION,
            })
    }

    fn regenerate_mesh(&mut self, ctx: &mut RegenContext<'_>) -> Result<(), PartError> {
        let points = self.positions(ctx.session)?;
        let lods = self
            .read(ctx.session, attrib::LOD)?
            .and_then(|b| b.as_ints())
            .filter(|_| ctx.config.split_lods);
        let collision = self
            .read(ctx.session, attrib::COLLISION)?
            .and_then(|b| b.as_ints());
        let materials = self
            .read(ctx.session, attrib::MATERIAL)?
            .and_then(|b| b.as_strings().map(<[String]>::to_vec));

        // Bucket point indices by detail level.
        let mut buckets: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for index in 0..points.len() {
            let level = lods
                .as_ref()
                .and_then(|l| l.get(index))
                .map_or(0, |l| (*l).max(0) as u32);
            buckets.entry(level).or_default().push(index);
        }

        let mut mesh_lods = Vec::with_capacity(buckets.len());
        for (level, indices) in buckets {
            let mut render = Vec::new();
            let mut collision_points = Vec::new();
            let mut keys: Vec<MaterialKey> = Vec::new();
            for index in indices {
                let is_collider = collision
                    .as_ref()
                    .and_then(|c| c.get(index))
                    .is_some_and(|flag| *flag != 0);
                if is_collider {
                    collision_points.push(points[index]);
                    continue;
                }
                render.push(points[index]);
                if let Some(path) = materials.as_ref().and_then(|m| m.get(index)) {
                    let key = MaterialKey::new(path.as_str());
                    if !path.is_empty() && !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
            let mut handles = Vec::with_capacity(keys.len());
            for key in &keys {
                handles.push(ctx.materials.resolve(key, ctx.host)?);
            }
            mesh_lods.push(MeshLod {
                geometry: MeshGeometry {
                    name: self.name.clone(),
                    lod: level,
                    points: render,
                    materials: handles,
                },
                collision_points,
            });
        }

        self.artifact
            .realize_mesh(ctx.host, mesh_lods, ctx.config.generate_colliders)?;
        Ok(())
    }

    fn regenerate_volume(&mut self, ctx: &mut RegenContext<'_>) -> Result<(), PartError> {
        let samples = self.positions(ctx.session)?;
        let tile = self
            .read(ctx.session, attrib::TILE)?
            .and_then(|b| b.as_ints())
            .and_then(|t| t.first().copied())
            .unwrap_or(0);
        let layer = self
            .read(ctx.session, attrib::LAYER)?
            .and_then(|b| b.as_strings().and_then(|s| s.first().cloned()))
            .unwrap_or_else(|| self.name.clone());
        let volume = VolumeGeometry {
            name: self.name.clone(),
            tile,
            layer,
            samples,
        };
        self.artifact.realize_volume(ctx.host, &volume)?;
        Ok(())
    }

    fn regenerate_curve(&mut self, ctx: &mut RegenContext<'_>) -> Result<(), PartError> {
        let points = self.positions(ctx.session)?;
        let closed = self
            .read(ctx.session, attrib::CLOSED)?
            .and_then(|b| b.as_ints())
            .and_then(|c| c.first().copied())
            .is_some_and(|c| c != 0);
        let curve = CurveGeometry {
            name: self.name.clone(),
            points,
            closed,
        };
        self.artifact.realize_curve(ctx.host, &curve)?;
        Ok(())
    }

    fn regenerate_instancer(&mut self, ctx: &mut RegenContext<'_>) -> Result<(), PartError> {
        let points = self.positions(ctx.session)?;
        let sources = self
            .read(ctx.session, attrib::INSTANCE)?
            .and_then(|b| b.as_strings().map(<[String]>::to_vec))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PartError::MissingAttribute {
                part: self.name.clone(),
                attribute: attrib::INSTANCE,
            })?;

        // One value applies to every point, otherwise one value per point.
        let mut groups: Vec<InstanceGroup> = Vec::new();
        for (slot, point) in points.iter().enumerate() {
            let raw = sources.get(slot).unwrap_or(&sources[0]);
            let source = InstanceSource::parse(raw);
            let transform = Transform::from_translation(*point);
            match groups.iter_mut().find(|g| g.source == source) {
                Some(group) => group.points.push((slot, transform)),
                None => groups.push(InstanceGroup {
                    source,
                    points: vec![(slot, transform)],
                }),
            }
        }

        // Overrides of the superseded spawn carry over; its handles do not.
        let carried: Vec<ObjectInstanceInfo> = self.artifact.carried_instance_infos();
        self.artifact.rebuild_instances(ctx.host, groups, carried)?;
        Ok(())
    }
}
