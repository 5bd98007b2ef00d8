//! Record arenas of one asset and the reconciliation pass that maps a fresh
//! cook result onto them.
//!
//! Objects, geos, and parts each live in their own `SlotMap`. Records are
//! addressed by stable keys and are never moved: a record that survives a
//! cook keeps its key, so anything a caller attached to it (material
//! overrides, instance overrides, layer settings) stays attached. A record
//! that disappears is removed, and its key stops resolving.
//!
//! # Pass structure
//!
//! [`SceneGraph::sync`] walks the three levels top-down. At each level the
//! previous children are matched against the fresh descriptors with
//! [`reconcile::plan`](crate::reconcile::plan), then:
//!
//! - unmatched previous records are torn down (colliders, output, record);
//! - matched records are rebound to their fresh descriptor in place;
//! - unmatched descriptors become new records.
//!
//! Geos whose descriptor is not flagged `changed` keep their part list
//! untouched. Geos that changed get their whole part list rebuilt, with
//! matched parts regenerated in place.

use std::collections::HashSet;

use slotmap::SlotMap;
use tracing::{debug, warn};

use crate::artifact::{ArtifactKind, OutputArtifact};
use crate::geo::{CurveData, CurvePart, GeoNode};
use crate::host::{OutputHost, Resource};
use crate::id::{GeoKey, HostHandle, ObjectKey, PartKey, SessionNodeId};
use crate::object::ObjectNode;
use crate::part::{PartNode, RegenContext};
use crate::reconcile::{self, Match};
use crate::session::{
    DescriptorKind, GeoKind, NodeDescriptor, PartOutputKind, SessionError, attrib,
};

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

/// Failures that abort a whole reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to list objects of asset node {node:?}: {source}")]
    ListObjects {
        node: SessionNodeId,
        source: SessionError,
    },
}

/// Kept / created / removed counts for one level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub kept: usize,
    pub created: usize,
    pub removed: usize,
}

/// A unit dropped from the output because it failed to regenerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedUnit {
    /// `object/geo/part` path of the unit.
    pub path: String,
    pub reason: String,
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub objects: LevelCounts,
    pub geos: LevelCounts,
    pub parts: LevelCounts,
    /// Parts whose output was regenerated (new or in place).
    pub regenerated: usize,
    pub dropped: Vec<DroppedUnit>,
}

/// A caller-facing view of one live artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub part: PartKey,
    pub object: String,
    pub geo: String,
    pub name: String,
    pub kind: ArtifactKind,
    pub resources: Vec<Resource>,
}

// ---------------------------------------------------------------------------
// SceneGraph
// ---------------------------------------------------------------------------

/// The object / geo / part records owned by one asset.
#[derive(Debug, Default)]
pub struct SceneGraph {
    objects: SlotMap<ObjectKey, ObjectNode>,
    geos: SlotMap<GeoKey, GeoNode>,
    parts: SlotMap<PartKey, PartNode>,
    /// Live objects in the order of the last cook.
    order: Vec<ObjectKey>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn object_count(&self) -> usize {
        self.order.len()
    }

    pub fn geo_count(&self) -> usize {
        self.geos.len()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Live objects in cook order.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectKey, &ObjectNode)> + '_ {
        self.order
            .iter()
            .filter_map(|k| self.objects.get(*k).map(|o| (*k, o)))
    }

    pub fn object(&self, key: ObjectKey) -> Option<&ObjectNode> {
        self.objects.get(key)
    }

    pub fn geo(&self, key: GeoKey) -> Option<&GeoNode> {
        self.geos.get(key)
    }

    pub fn geo_mut(&mut self, key: GeoKey) -> Option<&mut GeoNode> {
        self.geos.get_mut(key)
    }

    pub fn part(&self, key: PartKey) -> Option<&PartNode> {
        self.parts.get(key)
    }

    pub fn part_mut(&mut self, key: PartKey) -> Option<&mut PartNode> {
        self.parts.get_mut(key)
    }

    pub fn find_object(&self, name: &str) -> Option<ObjectKey> {
        self.objects().find(|(_, o)| o.name() == name).map(|(k, _)| k)
    }

    pub fn find_geo(&self, object: &str, geo: &str) -> Option<GeoKey> {
        let object = self.objects.get(self.find_object(object)?)?;
        object
            .geos
            .iter()
            .copied()
            .find(|k| self.geos.get(*k).is_some_and(|g| g.name() == geo))
    }

    pub fn find_part(&self, object: &str, geo: &str, part: &str) -> Option<PartKey> {
        let geo = self.geos.get(self.find_geo(object, geo)?)?;
        geo.parts
            .iter()
            .copied()
            .find(|k| self.parts.get(*k).is_some_and(|p| p.name() == part))
    }

    /// Every live geo with the name of its object, in cook order.
    pub fn geos_with_object(&self) -> Vec<(&str, GeoKey, &GeoNode)> {
        let mut out = Vec::new();
        for (_, object) in self.objects() {
            for key in &object.geos {
                if let Some(geo) = self.geos.get(*key) {
                    out.push((object.name(), *key, geo));
                }
            }
        }
        out
    }

    /// Keys of every live record, for identity comparisons.
    pub fn record_keys(&self) -> (Vec<ObjectKey>, Vec<GeoKey>, Vec<PartKey>) {
        (
            self.objects.keys().collect(),
            self.geos.keys().collect(),
            self.parts.keys().collect(),
        )
    }

    /// Every material handle a realized unit has generated or assigned.
    pub fn material_handles(&self) -> HashSet<HostHandle> {
        let mut out = HashSet::new();
        for part in self.parts.values() {
            let artifact = part.artifact();
            for unit in artifact.primary().into_iter().chain(artifact.children()) {
                out.extend(unit.generated_materials.iter().copied());
                out.extend(unit.assigned_materials.iter().copied());
            }
        }
        out
    }

    /// Non-empty artifacts in cook order.
    pub fn artifacts(&self) -> Vec<(PartKey, &OutputArtifact)> {
        self.walk_parts()
            .into_iter()
            .filter(|(_, _, _, part)| !part.artifact().is_empty())
            .map(|(key, _, _, part)| (key, part.artifact()))
            .collect()
    }

    pub fn summaries(&self) -> Vec<ArtifactSummary> {
        self.walk_parts()
            .into_iter()
            .filter(|(_, _, _, part)| !part.artifact().is_empty())
            .map(|(key, object, geo, part)| ArtifactSummary {
                part: key,
                object: object.to_string(),
                geo: geo.to_string(),
                name: part.name().to_string(),
                kind: part.artifact().kind(),
                resources: part.artifact().resources(),
            })
            .collect()
    }

    fn walk_parts(&self) -> Vec<(PartKey, &str, &str, &PartNode)> {
        let mut out = Vec::new();
        for (object, _, geo) in self.geos_with_object() {
            for key in &geo.parts {
                if let Some(part) = self.parts.get(*key) {
                    out.push((*key, object, geo.name(), part));
                }
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Curves
    // -----------------------------------------------------------------------

    pub fn has_dirty_curves(&self) -> bool {
        self.geos
            .values()
            .any(|g| g.curve.as_ref().is_some_and(|c| c.dirty))
    }

    /// Mark every curve as locally edited so it is uploaded to a fresh
    /// session node.
    pub(crate) fn mark_curves_dirty(&mut self) {
        for geo in self.geos.values_mut() {
            if let Some(curve) = &mut geo.curve {
                curve.dirty = true;
            }
        }
    }

    /// Take the data of every dirty curve whose geo is bound, clearing the
    /// dirty flags.
    pub(crate) fn take_dirty_curves(&mut self) -> Vec<(SessionNodeId, CurveData)> {
        let mut out = Vec::new();
        for geo in self.geos.values_mut() {
            if !geo.session_id.is_bound() {
                continue;
            }
            if let Some(curve) = geo.curve.as_mut().filter(|c| c.dirty) {
                curve.dirty = false;
                out.push((geo.session_id, curve.data.clone()));
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Forget every session handle while keeping the records. The next
    /// [`sync`](Self::sync) rebinds survivors by name.
    pub fn invalidate_identifiers(&mut self) {
        for object in self.objects.values_mut() {
            object.session_id = SessionNodeId::INVALID;
        }
        for geo in self.geos.values_mut() {
            geo.session_id = SessionNodeId::INVALID;
        }
        for part in self.parts.values_mut() {
            part.geo_id = SessionNodeId::INVALID;
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Tear down every record.
    pub fn clear(&mut self, host: &mut dyn OutputHost) {
        for key in std::mem::take(&mut self.order) {
            self.remove_object(key, host);
        }
    }

    fn remove_object(&mut self, key: ObjectKey, host: &mut dyn OutputHost) {
        if let Some(object) = self.objects.remove(key) {
            for geo in object.geos {
                self.remove_geo(geo, host);
            }
        }
    }

    fn remove_geo(&mut self, key: GeoKey, host: &mut dyn OutputHost) {
        if let Some(geo) = self.geos.remove(key) {
            for part in geo.parts {
                self.remove_part(part, host);
            }
        }
    }

    fn remove_part(&mut self, key: PartKey, host: &mut dyn OutputHost) {
        if let Some(mut part) = self.parts.remove(key) {
            part.destroy(host);
        }
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Reconcile the records against the session's current output of
    /// `asset`.
    pub fn sync(
        &mut self,
        asset: SessionNodeId,
        ctx: &mut RegenContext<'_>,
    ) -> Result<SyncReport, ReconcileError> {
        let fresh: Vec<NodeDescriptor> = ctx
            .session
            .child_nodes(asset)
            .map_err(|source| ReconcileError::ListObjects {
                node: asset,
                source,
            })?
            .into_iter()
            .filter(|d| matches!(d.kind, DescriptorKind::Object { .. }))
            .collect();

        let mut report = SyncReport::default();
        let previous: Vec<(ObjectKey, String)> = self
            .objects()
            .map(|(k, o)| (k, o.name().to_string()))
            .collect();
        let names: Vec<&str> = fresh.iter().map(|d| d.name.as_str()).collect();
        let plan = reconcile::plan(&previous, &names);

        for key in &plan.removed {
            debug!(object = ?key, "removing object");
            self.remove_object(*key, ctx.host);
            report.objects.removed += 1;
        }

        let mut order = Vec::with_capacity(fresh.len());
        for (descriptor, matched) in fresh.iter().zip(plan.matches) {
            let (key, moved) = match matched {
                Match::Kept(key) => match self.objects.get_mut(key) {
                    Some(object) => {
                        let moved = object.rebind(descriptor);
                        report.objects.kept += 1;
                        (key, moved)
                    }
                    None => continue,
                },
                Match::Create => {
                    report.objects.created += 1;
                    (self.objects.insert(ObjectNode::new(descriptor)), false)
                }
            };
            let before = self.object_units(key);
            self.sync_geos(key, ctx, &mut report);
            self.place_units(key, &before, moved, ctx.host);
            order.push(key);
        }
        self.order = order;
        Ok(report)
    }

    /// Realized units of every part under `object`.
    fn object_units(&self, object: ObjectKey) -> HashSet<Resource> {
        let Some(object) = self.objects.get(object) else {
            return HashSet::new();
        };
        object
            .geos
            .iter()
            .filter_map(|g| self.geos.get(*g))
            .flat_map(|g| g.parts.iter())
            .filter_map(|p| self.parts.get(*p))
            .flat_map(|p| {
                let artifact = p.artifact();
                artifact
                    .primary()
                    .into_iter()
                    .chain(artifact.children())
                    .map(|u| u.resource)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Hand the object's transform to units the host has not placed yet, or
    /// to all of them when the object moved.
    fn place_units(
        &self,
        object: ObjectKey,
        before: &HashSet<Resource>,
        moved: bool,
        host: &mut dyn OutputHost,
    ) {
        let Some(node) = self.objects.get(object) else {
            return;
        };
        let transform = *node.transform();
        let mut units: Vec<Resource> = self
            .object_units(object)
            .into_iter()
            .filter(|r| moved || !before.contains(r))
            .collect();
        units.sort_by_key(|r| r.handle());
        for resource in units {
            if let Err(e) = host.place(resource, &transform) {
                warn!(object = %node.name(), ?resource, error = %e, "failed to place output");
            }
        }
    }

    fn sync_geos(&mut self, key: ObjectKey, ctx: &mut RegenContext<'_>, report: &mut SyncReport) {
        let Some(object) = self.objects.get(key) else {
            return;
        };
        let object_name = object.name().to_string();
        let template = object.is_instanced();
        let previous_keys = object.geos.clone();

        let fresh: Vec<NodeDescriptor> = match ctx.session.child_nodes(object.session_id) {
            Ok(list) => list
                .into_iter()
                .filter(|d| matches!(d.kind, DescriptorKind::Geo { .. }))
                .collect(),
            Err(e) => {
                warn!(object = %object_name, error = %e, "dropping object output, geo listing failed");
                for geo in previous_keys {
                    self.remove_geo(geo, ctx.host);
                    report.geos.removed += 1;
                }
                if let Some(object) = self.objects.get_mut(key) {
                    object.geos.clear();
                }
                report.dropped.push(DroppedUnit {
                    path: object_name,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let previous: Vec<(GeoKey, String)> = previous_keys
            .iter()
            .filter_map(|k| self.geos.get(*k).map(|g| (*k, g.name().to_string())))
            .collect();
        let names: Vec<&str> = fresh.iter().map(|d| d.name.as_str()).collect();
        let plan = reconcile::plan(&previous, &names);

        for geo in &plan.removed {
            self.remove_geo(*geo, ctx.host);
            report.geos.removed += 1;
        }

        let mut geos = Vec::with_capacity(fresh.len());
        for (descriptor, matched) in fresh.iter().zip(plan.matches) {
            let (geo_key, rebuild) = match matched {
                Match::Kept(geo_key) => match self.geos.get_mut(geo_key) {
                    Some(geo) => {
                        geo.rebind(descriptor);
                        report.geos.kept += 1;
                        (geo_key, descriptor.changed)
                    }
                    None => continue,
                },
                Match::Create => {
                    report.geos.created += 1;
                    (self.geos.insert(GeoNode::new(descriptor)), true)
                }
            };
            if rebuild && !self.sync_parts(geo_key, &object_name, template, ctx, report) {
                self.remove_geo(geo_key, ctx.host);
                continue;
            }
            geos.push(geo_key);
        }

        if let Some(object) = self.objects.get_mut(key) {
            object.geos = geos;
        }
    }

    /// Rebuild the part list of a changed geo. Returns `false` when the geo
    /// itself has to be dropped.
    fn sync_parts(
        &mut self,
        key: GeoKey,
        object_name: &str,
        template: bool,
        ctx: &mut RegenContext<'_>,
        report: &mut SyncReport,
    ) -> bool {
        let Some(geo) = self.geos.get(key) else {
            return false;
        };
        let geo_id = geo.session_id;
        let geo_path = format!("{object_name}/{}", geo.name());
        let editable = geo.is_editable();
        let previous_keys = geo.parts.clone();

        let fresh: Vec<NodeDescriptor> = match ctx.session.child_nodes(geo_id) {
            Ok(list) => list
                .into_iter()
                .filter(|d| matches!(d.kind, DescriptorKind::Part { .. }))
                .collect(),
            Err(e) => {
                warn!(geo = %geo_path, error = %e, "dropping geo, part listing failed");
                report.dropped.push(DroppedUnit {
                    path: geo_path,
                    reason: e.to_string(),
                });
                return false;
            }
        };

        let previous: Vec<(PartKey, String)> = previous_keys
            .iter()
            .filter_map(|k| self.parts.get(*k).map(|p| (*k, p.name().to_string())))
            .collect();
        let names: Vec<&str> = fresh.iter().map(|d| d.name.as_str()).collect();
        let plan = reconcile::plan(&previous, &names);

        for part in &plan.removed {
            self.remove_part(*part, ctx.host);
            report.parts.removed += 1;
        }

        let mut parts = Vec::with_capacity(fresh.len());
        for (descriptor, matched) in fresh.iter().zip(plan.matches) {
            let path = format!("{geo_path}/{}", descriptor.name);
            let part_key = match matched {
                Match::Kept(part_key) => {
                    let Some(part) = self.parts.get_mut(part_key) else {
                        continue;
                    };
                    report.parts.kept += 1;
                    if let Err(e) = part.rebind(geo_id, descriptor) {
                        self.drop_part(part_key, path, e.to_string(), ctx.host, report);
                        continue;
                    }
                    part_key
                }
                Match::Create => match PartNode::new(geo_id, descriptor, editable) {
                    Ok(part) => {
                        report.parts.created += 1;
                        self.parts.insert(part)
                    }
                    Err(e) => {
                        warn!(part = %path, error = %e, "skipping part");
                        report.dropped.push(DroppedUnit {
                            path,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
            };

            let Some(part) = self.parts.get_mut(part_key) else {
                continue;
            };
            if template {
                part.mark_template();
            }
            match part.regenerate(ctx) {
                Ok(()) => {
                    report.regenerated += 1;
                    parts.push(part_key);
                }
                Err(e) => self.drop_part(part_key, path, e.to_string(), ctx.host, report),
            }
        }

        let curve = self.read_curve(geo_id, &parts, ctx);
        let Some(geo) = self.geos.get_mut(key) else {
            return false;
        };
        geo.parts = parts;
        geo.rebuild_volume_layers(&self.parts);
        // Local edits not yet uploaded win over what the session reports.
        if geo.kind() == GeoKind::CurveContainer && !geo.curve.as_ref().is_some_and(|c| c.dirty) {
            geo.curve = curve;
        }
        true
    }

    fn drop_part(
        &mut self,
        key: PartKey,
        path: String,
        reason: String,
        host: &mut dyn OutputHost,
        report: &mut SyncReport,
    ) {
        warn!(part = %path, error = %reason, "dropping part from output");
        self.remove_part(key, host);
        report.dropped.push(DroppedUnit { path, reason });
    }

    /// Read the control points of the first curve part.
    fn read_curve(
        &self,
        geo_id: SessionNodeId,
        parts: &[PartKey],
        ctx: &RegenContext<'_>,
    ) -> Option<CurvePart> {
        let part = parts
            .iter()
            .filter_map(|k| self.parts.get(*k))
            .find(|p| p.output_kind() == PartOutputKind::Curve)?;
        let points = ctx
            .session
            .attribute_buffer(geo_id, part.part_id(), attrib::POSITION)
            .ok()
            .flatten()
            .and_then(|b| b.as_vec3())?;
        let closed = ctx
            .session
            .attribute_buffer(geo_id, part.part_id(), attrib::CLOSED)
            .ok()
            .flatten()
            .and_then(|b| b.as_ints())
            .and_then(|c| c.first().copied())
            .is_some_and(|c| c != 0);
        Some(CurvePart {
            name: part.name().to_string(),
            data: CurveData { points, closed },
            editable: true,
            dirty: false,
        })
    }
}
