//! Integration tests for the Kiln cook cycle.
//!
//! These tests drive full build cycles against the in-memory session and the
//! recording host: first builds, recooks, reloads, session restarts,
//! reconciliation at every level, instancer overrides, presets, and the
//! asynchronous request latch.

use std::collections::HashSet;

use kiln_core::artifact::ArtifactKind;
use kiln_core::asset::*;
use kiln_core::config::{AssetConfig, AssetDefinition};
use kiln_core::event::{AssetEvent, AssetEventKind};
use kiln_core::geo::{CurveData, VolumeLayerSettings};
use kiln_core::host::{InstanceOverride, Resource};
use kiln_core::id::{HostHandle, MaterialKey, PartKey};
use kiln_core::preset::{InputPreset, LayerPreset, PresetStore, VolumeLayerPreset};
use kiln_core::serialize::{PresetBodyV1, encode_payload, read_preset_header};
use kiln_core::session::{ObjectRef, ParameterValue, Transform, attrib};
use kiln_core::test_utils::*;

// ===========================================================================
// Helpers
// ===========================================================================

fn cook_with(
    asset: &mut AssetNode,
    session: &mut MockSession,
    host: &mut RecordingHost,
    request: CookRequest,
) -> RequestOutcome {
    let mut ctx = CookContext::new(session, host);
    asset.request_cook(&mut ctx, request)
}

/// A blocking cook that always runs.
fn forced(asset: &mut AssetNode, session: &mut MockSession, host: &mut RecordingHost) -> RequestOutcome {
    cook_with(asset, session, host, CookRequest::forced())
}

/// A blocking cook that is skipped when nothing changed.
fn recook(asset: &mut AssetNode, session: &mut MockSession, host: &mut RecordingHost) -> RequestOutcome {
    cook_with(asset, session, host, CookRequest::default().blocking())
}

fn settle(asset: &mut AssetNode, session: &mut MockSession, host: &mut RecordingHost) {
    let mut ctx = CookContext::new(session, host);
    for _ in 0..100 {
        if !asset.is_busy() {
            return;
        }
        asset.tick(&mut ctx);
    }
    panic!("asset never settled");
}

fn mesh_handle(asset: &AssetNode, part: PartKey) -> HostHandle {
    asset
        .scene()
        .part(part)
        .and_then(|p| p.artifact().primary())
        .map(|u| u.resource.handle())
        .expect("part has a realized mesh")
}

fn cycle_events(asset: &mut AssetNode) -> Vec<AssetEvent> {
    asset
        .events_mut()
        .drain()
        .into_iter()
        .filter(|e| matches!(e.kind(), AssetEventKind::Cooked | AssetEventKind::Reloaded))
        .collect()
}

fn releases(host: &RecordingHost) -> usize {
    host.count(|op| matches!(op, HostOp::Release(_)))
}

const SUCCESS: RequestOutcome = RequestOutcome::Completed(CookResult::Success);

// ===========================================================================
// Asset types
// ===========================================================================

/// One rock whose point count follows the `count` parameter.
fn counted_rocks() -> MockAssetType {
    MockAssetType::new("rocks", |inputs| {
        let n = inputs.int("count").unwrap_or(3).max(0) as usize;
        vec![mesh_object("rock", "body", n)]
    })
    .with_parameter("count", ParameterValue::Int(vec![3]))
}

/// `count` rocks named `rock0`, `rock1`, ...
fn rock_field() -> MockAssetType {
    MockAssetType::new("field", |inputs| {
        let n = inputs.int("count").unwrap_or(3).max(0);
        (0..n)
            .map(|i| mesh_object(&format!("rock{i}"), "body", 4))
            .collect()
    })
    .with_parameter("count", ParameterValue::Int(vec![3]))
}

fn variant(inputs: &CookInputs<'_>, default: &str) -> String {
    match inputs.parameters.get("variant") {
        Some(ParameterValue::Str(v)) => v.first().cloned().unwrap_or_default(),
        _ => default.to_string(),
    }
}

/// An instancer scattering `count` copies of the instanced `tree` object.
fn scatter() -> MockAssetType {
    MockAssetType::new("scatter", |inputs| {
        let n = inputs.int("count").unwrap_or(3).max(0) as usize;
        vec![
            MockObject::new("tree")
                .as_instanced()
                .with_geo(MockGeo::display("display").with_part(MockPart::mesh("trunk", &points(3)))),
            MockObject::new("scatter").as_instancer().with_geo(
                MockGeo::display("display").with_part(MockPart::instancer("pts", n, "op:tree")),
            ),
        ]
    })
    .with_parameter("count", ParameterValue::Int(vec![3]))
}

/// A height field with one volume tile per `tiles`.
fn terrain() -> MockAssetType {
    MockAssetType::new("terrain", |inputs| {
        let tiles = inputs.int("tiles").unwrap_or(1).max(0);
        let mut geo = MockGeo::display("height");
        for tile in 0..tiles {
            geo = geo.with_part(MockPart::volume(&format!("h{tile}"), tile, "height"));
        }
        vec![MockObject::new("terrain").with_geo(geo)]
    })
    .with_parameter("tiles", ParameterValue::Int(vec![1]))
}

/// A wall that grows a footing once its `ground` input is connected.
fn wall() -> MockAssetType {
    MockAssetType::new("wall", |inputs| {
        let mut objects = vec![mesh_object("wall", "body", 3)];
        if inputs.is_connected(0) {
            objects.push(mesh_object("footing", "body", 2));
        }
        objects
    })
    .with_inputs(&["ground"])
}

// ===========================================================================
// Reconciliation
// ===========================================================================

#[test]
fn recook_without_changes_touches_nothing() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    assert_eq!(forced(&mut asset, &mut session, &mut host), SUCCESS);
    let part = asset.scene().find_part("rock", "display", "body").unwrap();
    let handle = mesh_handle(&asset, part);
    host.clear_log();

    assert_eq!(forced(&mut asset, &mut session, &mut host), SUCCESS);
    assert_eq!(session.cook_count, 2);
    assert!(host.log().is_empty());
    assert_eq!(mesh_handle(&asset, part), handle);

    let report = asset.last_report().unwrap();
    assert_eq!(report.objects.kept, 1);
    assert_eq!(report.geos.kept, 1);
    assert_eq!(report.regenerated, 0);
}

#[test]
fn first_build_reports_reloaded_then_recooks_report_cooked() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    forced(&mut asset, &mut session, &mut host);

    let events = cycle_events(&mut asset);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind(), AssetEventKind::Reloaded);
    assert_eq!(events[1].kind(), AssetEventKind::Cooked);
    assert!(events.iter().all(|e| e.success() == Some(true)));
    if let AssetEvent::Cooked { artifacts, .. } = &events[1] {
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].kind, ArtifactKind::Mesh);
        assert_eq!(artifacts[0].object, "rock");
    }
}

#[test]
fn changed_part_updates_in_place() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let part = asset.scene().find_part("rock", "display", "body").unwrap();
    let handle = mesh_handle(&asset, part);
    host.clear_log();

    asset.set_parameter("count", ParameterValue::Int(vec![5]));
    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);

    assert_eq!(asset.scene().find_part("rock", "display", "body"), Some(part));
    assert_eq!(asset.scene().part(part).unwrap().point_count(), 5);
    assert_eq!(
        host.log(),
        &[HostOp::RealizeMesh {
            existing: Some(handle),
            handle,
            name: "body".into(),
            lod: 0,
        }]
    );
    let report = asset.last_report().unwrap();
    assert_eq!(report.parts.kept, 1);
    assert_eq!(report.regenerated, 1);
}

#[test]
fn vanished_objects_release_their_outputs() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(rock_field());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    assert_eq!(asset.scene().object_count(), 3);
    assert_eq!(host.live_count(), 3);
    let survivor = asset.scene().find_part("rock0", "display", "body").unwrap();

    asset.set_parameter("count", ParameterValue::Int(vec![1]));
    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);
    assert_eq!(asset.scene().object_count(), 1);
    assert_eq!(host.live_count(), 1);
    assert_eq!(releases(&host), 2);
    assert_eq!(asset.last_report().unwrap().objects.removed, 2);
    assert_eq!(asset.scene().find_part("rock0", "display", "body"), Some(survivor));

    asset.set_parameter("count", ParameterValue::Int(vec![0]));
    recook(&mut asset, &mut session, &mut host);
    assert!(asset.scene().is_empty());
    assert_eq!(host.live_count(), 0);
}

#[test]
fn single_object_rename_keeps_its_record() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(MockAssetType::new("tree", |inputs| {
        vec![mesh_object(&variant(inputs, "oak"), "trunk", 3)]
    }));
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let part = asset.scene().find_part("oak", "display", "trunk").unwrap();
    let handle = mesh_handle(&asset, part);

    asset.set_parameter("variant", ParameterValue::Str(vec!["pine".into()]));
    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);

    assert!(asset.scene().find_object("oak").is_none());
    assert_eq!(asset.scene().find_part("pine", "display", "trunk"), Some(part));
    assert_eq!(mesh_handle(&asset, part), handle);
    assert_eq!(releases(&host), 0);
}

#[test]
fn rename_among_siblings_is_remove_plus_create() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(MockAssetType::new("pair", |inputs| {
        vec![
            mesh_object("a", "body", 3),
            mesh_object(&variant(inputs, "b"), "body", 3),
        ]
    }));
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let a = asset.scene().find_part("a", "display", "body").unwrap();
    let b = asset.scene().find_part("b", "display", "body").unwrap();

    asset.set_parameter("variant", ParameterValue::Str(vec!["c".into()]));
    recook(&mut asset, &mut session, &mut host);

    assert_eq!(asset.scene().find_part("a", "display", "body"), Some(a));
    assert!(asset.scene().find_object("b").is_none());
    let c = asset.scene().find_part("c", "display", "body").unwrap();
    assert_ne!(c, b);
    assert!(asset.scene().part(b).is_none());
    assert_eq!(releases(&host), 1);
    assert_eq!(host.live_count(), 2);
}

#[test]
fn failed_geo_listing_drops_only_that_geo() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(rock_field().with_parameter("count", ParameterValue::Int(vec![2])));
    let mut asset = AssetNode::new(def, AssetConfig::default());
    session.fail_listing("rock1/display");

    assert_eq!(forced(&mut asset, &mut session, &mut host), SUCCESS);
    assert!(asset.scene().find_object("rock1").is_some());
    assert!(asset.scene().find_geo("rock1", "display").is_none());
    assert!(asset.scene().find_part("rock0", "display", "body").is_some());
    assert!(asset.warnings().iter().any(|w| w.contains("rock1/display")));

    let events = cycle_events(&mut asset);
    match events.last() {
        Some(AssetEvent::Reloaded { success, warnings, .. }) => {
            assert!(*success);
            assert!(!warnings.is_empty());
        }
        other => panic!("expected a reload event, got {other:?}"),
    }
}

#[test]
fn failed_object_listing_drops_only_its_geos() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(rock_field().with_parameter("count", ParameterValue::Int(vec![2])));
    let mut asset = AssetNode::new(def, AssetConfig::default());
    session.fail_listing("rock1");

    assert_eq!(forced(&mut asset, &mut session, &mut host), SUCCESS);
    let rock1 = asset.scene().find_object("rock1").unwrap();
    assert!(asset.scene().object(rock1).unwrap().geos().is_empty());
    assert!(asset.scene().find_geo("rock1", "display").is_none());
    assert!(asset.scene().find_part("rock0", "display", "body").is_some());
    assert_eq!(host.live_count(), 1);
    assert!(asset.warnings().iter().any(|w| w.starts_with("dropped rock1:")));
}

#[test]
fn unlistable_output_fails_the_cycle_and_keeps_records() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(rock_field());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let keys = asset.scene().record_keys();
    cycle_events(&mut asset);
    host.clear_log();

    session.fail_asset_listing(true);
    asset.set_parameter("count", ParameterValue::Int(vec![5]));
    assert_eq!(
        recook(&mut asset, &mut session, &mut host),
        RequestOutcome::Completed(CookResult::Errored)
    );
    assert_eq!(asset.cook_state(), CookState::Idle);
    assert!(!asset.is_busy());
    assert_eq!(asset.scene().record_keys(), keys);
    assert!(host.log().is_empty());
    assert!(!asset.warnings().is_empty());
    let events = cycle_events(&mut asset);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), AssetEventKind::Cooked);
    assert_eq!(events[0].success(), Some(false));

    // The state machine is not stuck: the next cook reconciles normally.
    session.fail_asset_listing(false);
    assert_eq!(forced(&mut asset, &mut session, &mut host), SUCCESS);
    assert_eq!(asset.scene().object_count(), 5);
}

#[test]
fn host_failure_drops_only_the_failing_part() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(MockAssetType::fixed(
        "pair",
        vec![mesh_object("a", "good", 3), mesh_object("b", "bad", 3)],
    ));
    let mut asset = AssetNode::new(def, AssetConfig::default());
    host.fail_geometry("bad");

    assert_eq!(forced(&mut asset, &mut session, &mut host), SUCCESS);
    assert!(asset.scene().find_part("a", "display", "good").is_some());
    assert!(asset.scene().find_part("b", "display", "bad").is_none());
    assert_eq!(asset.last_report().unwrap().dropped.len(), 1);
    assert_eq!(host.live_count(), 1);
}

// ===========================================================================
// Failure and identity
// ===========================================================================

#[test]
fn fatal_cook_leaves_outputs_untouched() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let part = asset.scene().find_part("rock", "display", "body").unwrap();
    let handle = mesh_handle(&asset, part);
    cycle_events(&mut asset);
    host.clear_log();

    session.script_status(kiln_core::session::CookStatus::FatalError);
    asset.set_parameter("count", ParameterValue::Int(vec![5]));
    assert_eq!(
        recook(&mut asset, &mut session, &mut host),
        RequestOutcome::Completed(CookResult::Errored)
    );
    assert_eq!(asset.cook_state(), CookState::Idle);
    assert!(asset.warnings().iter().any(|w| w.contains("cook failed")));
    assert!(host.log().is_empty());
    assert_eq!(mesh_handle(&asset, part), handle);
    assert_eq!(asset.scene().part(part).unwrap().point_count(), 3);

    let events = cycle_events(&mut asset);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].success(), Some(false));

    assert_eq!(forced(&mut asset, &mut session, &mut host), SUCCESS);
    assert_eq!(asset.scene().part(part).unwrap().point_count(), 5);
}

#[test]
fn session_restart_rebinds_records_by_name() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    asset.set_parameter("count", ParameterValue::Int(vec![5]));
    recook(&mut asset, &mut session, &mut host);
    let part = asset.scene().find_part("rock", "display", "body").unwrap();
    let handle = mesh_handle(&asset, part);
    let old_node = asset.session_id();
    cycle_events(&mut asset);
    host.clear_log();

    session.restart();
    assert!(!asset.is_bound(&session));
    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);

    assert_ne!(asset.session_id(), old_node);
    assert_eq!(asset.scene().find_part("rock", "display", "body"), Some(part));
    assert_eq!(mesh_handle(&asset, part), handle);
    assert_eq!(asset.scene().part(part).unwrap().point_count(), 5);
    assert_eq!(
        session.parameter(asset.session_id(), "count"),
        Some(&ParameterValue::Int(vec![5]))
    );
    assert_eq!(releases(&host), 0);
    let events = cycle_events(&mut asset);
    assert_eq!(events.last().map(AssetEvent::kind), Some(AssetEventKind::Reloaded));
}

#[test]
fn invalidate_rebinds_without_teardown() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let part = asset.scene().find_part("rock", "display", "body").unwrap();
    host.clear_log();

    assert_eq!(asset.request_invalidate(), RequestOutcome::Latched);
    settle(&mut asset, &mut session, &mut host);
    assert_eq!(asset.cook_result(), CookResult::Success);
    assert_eq!(asset.scene().find_part("rock", "display", "body"), Some(part));
    assert_eq!(releases(&host), 0);
    assert_eq!(session.asset_count(), 2);
}

#[test]
fn reload_rebuilds_from_scratch_and_keeps_local_edits() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let part = asset.scene().find_part("rock", "display", "body").unwrap();
    let old_node = asset.session_id();
    host.clear_log();

    asset.set_parameter("count", ParameterValue::Int(vec![4]));
    let outcome = {
        let mut ctx = CookContext::new(&mut session, &mut host);
        asset.request_reload(&mut ctx, false)
    };
    assert_eq!(outcome, SUCCESS);

    assert!(asset.scene().part(part).is_none());
    let fresh = asset.scene().find_part("rock", "display", "body").unwrap();
    assert_eq!(asset.scene().part(fresh).unwrap().point_count(), 4);
    assert_eq!(releases(&host), 1);
    assert_eq!(session.deleted, vec![old_node]);
    assert_eq!(session.asset_count(), 1);
}

#[test]
fn reset_parameters_restores_defaults() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    asset.set_parameter("count", ParameterValue::Int(vec![6]));
    recook(&mut asset, &mut session, &mut host);
    let part = asset.scene().find_part("rock", "display", "body").unwrap();
    assert_eq!(asset.scene().part(part).unwrap().point_count(), 6);

    let outcome = {
        let mut ctx = CookContext::new(&mut session, &mut host);
        asset.request_reset_parameters(&mut ctx, false)
    };
    assert_eq!(outcome, SUCCESS);
    assert!(asset.parameters().is_empty());
    assert_eq!(
        session.parameter(asset.session_id(), "count"),
        Some(&ParameterValue::Int(vec![3]))
    );
    assert_eq!(asset.scene().part(part).unwrap().point_count(), 3);
}

// ===========================================================================
// Instancers and overrides
// ===========================================================================

#[test]
fn instanced_objects_realize_nothing() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(scatter());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let trunk = asset.scene().find_part("tree", "display", "trunk").unwrap();
    assert!(asset.scene().part(trunk).unwrap().is_instanced());
    assert_eq!(host.count(|op| matches!(op, HostOp::RealizeMesh { .. })), 0);
    assert_eq!(host.count(|op| matches!(op, HostOp::Spawn { .. })), 3);
}

#[test]
fn instance_overrides_survive_rebuilds() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(scatter());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let pts = asset.scene().find_part("scatter", "display", "pts").unwrap();

    let mut hidden = InstanceOverride::new(1);
    hidden.hidden = true;
    assert!(asset.set_instance_override(&mut host, pts, hidden.clone()).unwrap());
    assert!(!asset.set_instance_override(&mut host, pts, InstanceOverride::new(10)).unwrap());
    assert_eq!(host.overrides_applied(), 1);

    asset.set_parameter("count", ParameterValue::Int(vec![4]));
    recook(&mut asset, &mut session, &mut host);
    assert_eq!(host.overrides_applied(), 2);
    assert_eq!(host.live_count(), 4);

    // The slot disappears; the override is kept but has nothing to apply to.
    asset.set_parameter("count", ParameterValue::Int(vec![1]));
    recook(&mut asset, &mut session, &mut host);
    assert_eq!(host.overrides_applied(), 2);
    let infos = asset.scene().part(pts).unwrap().artifact().instance_infos();
    assert_eq!(infos[0].override_for(1), Some(&hidden));

    asset.set_parameter("count", ParameterValue::Int(vec![3]));
    recook(&mut asset, &mut session, &mut host);
    assert_eq!(host.overrides_applied(), 3);
}

#[test]
fn material_overrides_survive_regeneration() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(
        MockAssetType::new("painted", |inputs| {
            let n = inputs.int("count").unwrap_or(3).max(0) as usize;
            let part = MockPart::mesh("body", &points(n)).with_strings(attrib::MATERIAL, &vec!["mat/stone"; n]);
            vec![MockObject::new("rock").with_geo(MockGeo::display("display").with_part(part))]
        })
        .with_parameter("count", ParameterValue::Int(vec![3])),
    );
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    assert_eq!(asset.materials().len(), 1);
    let part = asset.scene().find_part("rock", "display", "body").unwrap();
    assert!(asset.set_material_override(part, 0, HostHandle(999)));
    assert!(!asset.set_material_override(part, 4, HostHandle(999)));

    asset.set_parameter("count", ParameterValue::Int(vec![5]));
    recook(&mut asset, &mut session, &mut host);
    assert_eq!(
        asset.scene().part(part).unwrap().artifact().material_overrides(),
        vec![(0, HostHandle(999))]
    );
}

#[test]
fn unused_materials_are_released() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(
        MockAssetType::new("painted", |inputs| {
            let material = variant(inputs, "mat/stone");
            let part = MockPart::mesh("body", &points(3)).with_strings(attrib::MATERIAL, &[material.as_str(); 3]);
            vec![MockObject::new("rock").with_geo(MockGeo::display("display").with_part(part))]
        })
        .with_parameter("variant", ParameterValue::Str(vec!["mat/stone".into()])),
    );
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let stone = asset.materials().get(&MaterialKey::new("mat/stone")).unwrap();

    asset.set_parameter("variant", ParameterValue::Str(vec!["mat/moss".into()]));
    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);
    assert_eq!(asset.materials().len(), 1);
    assert!(asset.materials().get(&MaterialKey::new("mat/moss")).is_some());
    assert!(asset.materials().get(&MaterialKey::new("mat/stone")).is_none());
    assert!(!host.is_live(stone));
    assert_eq!(host.count(|op| *op == HostOp::Release(Resource::Material(stone))), 1);
}

#[test]
fn moved_objects_are_placed_again() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(
        MockAssetType::new("drifting", |inputs| {
            let x = inputs.float("x").unwrap_or(0.0);
            let mut rock = mesh_object("rock", "body", 3);
            rock.transform = Transform::from_translation([x, 0.0, 0.0]);
            vec![rock]
        })
        .with_parameter("x", ParameterValue::Float(vec![0.0])),
    );
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    let part = asset.scene().find_part("rock", "display", "body").unwrap();
    let mesh = Resource::Mesh(mesh_handle(&asset, part));
    assert_eq!(host.count(|op| matches!(op, HostOp::Place { .. })), 1);
    host.clear_log();

    asset.set_parameter("x", ParameterValue::Float(vec![2.5]));
    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);
    assert_eq!(
        host.log(),
        &[HostOp::Place {
            resource: mesh,
            transform: Transform::from_translation([2.5, 0.0, 0.0]),
        }]
    );
    let rock = asset.scene().find_object("rock").unwrap();
    assert_eq!(asset.scene().object(rock).unwrap().transform().translation, [2.5, 0.0, 0.0]);
}

// ===========================================================================
// Inputs, transform, curves
// ===========================================================================

#[test]
fn inputs_and_transform_upload_only_when_dirty() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(wall());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    forced(&mut asset, &mut session, &mut host);
    assert_eq!(asset.scene().object_count(), 1);
    assert_eq!(session.transform_uploads, 1);

    let ground = vec![ObjectRef::scene("World/Ground")];
    asset.connect_input("ground", ground.clone());
    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);
    assert_eq!(session.connected(asset.session_id(), 0), Some(ground.as_slice()));
    assert_eq!(asset.scene().object_count(), 2);

    let cooks = session.cook_count;
    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);
    assert_eq!(session.cook_count, cooks);

    asset.set_transform(Transform::from_translation([2.0, 0.0, 0.0]));
    recook(&mut asset, &mut session, &mut host);
    assert_eq!(session.transform_uploads, 2);
    assert_eq!(session.cook_count, cooks + 1);

    asset.disconnect_input("ground");
    recook(&mut asset, &mut session, &mut host);
    assert_eq!(asset.scene().object_count(), 1);
}

#[test]
fn curve_edits_upload_and_come_back_from_the_session() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let mut asset = AssetNode::new(AssetDefinition::curve("path"), AssetConfig::default());

    assert_eq!(forced(&mut asset, &mut session, &mut host), SUCCESS);
    let geo = asset.scene().find_geo("curve", "curve").unwrap();
    assert_eq!(asset.scene().geo(geo).unwrap().curve().unwrap().data.points.len(), 2);

    let edited = CurveData {
        points: vec![[0.0, 0.0, 0.0], [1.0, 2.0, 0.0], [4.0, 0.0, 1.0]],
        closed: true,
    };
    assert!(asset.set_curve_data("curve", "curve", edited.clone()));
    assert!(asset.scene().has_dirty_curves());
    host.clear_log();

    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);
    let curve = asset.scene().geo(geo).unwrap().curve().unwrap();
    assert!(!curve.is_dirty());
    assert_eq!(curve.data, edited);
    assert_eq!(host.count(|op| matches!(op, HostOp::RealizeCurve { points: 3, .. })), 1);
}

// ===========================================================================
// Presets
// ===========================================================================

#[test]
fn preset_restores_parameters_on_a_fresh_asset() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut original = AssetNode::new(def.clone(), AssetConfig::default());

    forced(&mut original, &mut session, &mut host);
    original.set_parameter("count", ParameterValue::Int(vec![6]));
    recook(&mut original, &mut session, &mut host);

    let preset = original.get_asset_preset(&session).unwrap();
    let restored = PresetStore::decode(&preset.encode().unwrap()).unwrap();
    assert_eq!(restored, preset);

    let mut copy = AssetNode::new(def, AssetConfig::default());
    assert!(copy.preset_mismatch(&restored).is_none());
    let result = {
        let mut ctx = CookContext::new(&mut session, &mut host);
        copy.load_asset_preset_and_cook(&mut ctx, restored).unwrap()
    };
    assert_eq!(result, CookResult::Success);
    assert_eq!(
        session.parameter(copy.session_id(), "count"),
        Some(&ParameterValue::Int(vec![6]))
    );
    let part = copy.scene().find_part("rock", "display", "body").unwrap();
    assert_eq!(copy.scene().part(part).unwrap().point_count(), 6);
}

#[test]
fn version_one_preset_still_loads() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut source = AssetNode::new(def.clone(), AssetConfig::default());
    source.set_parameter("count", ParameterValue::Int(vec![7]));
    forced(&mut source, &mut session, &mut host);
    let parameters = source.get_asset_preset(&session).unwrap().parameters;

    let bytes = encode_payload(
        1,
        &PresetBodyV1 {
            asset_name: "rocks".into(),
            parameters,
            curves: Vec::new(),
        },
    )
    .unwrap();
    assert_eq!(read_preset_header(&bytes).unwrap().version, 1);
    let store = PresetStore::decode(&bytes).unwrap();
    assert_eq!(store.asset_type, None);
    assert!(store.inputs.is_empty());

    let mut target = AssetNode::new(def, AssetConfig::default());
    forced(&mut target, &mut session, &mut host);
    let result = {
        let mut ctx = CookContext::new(&mut session, &mut host);
        target.load_asset_preset_and_cook(&mut ctx, store).unwrap()
    };
    assert_eq!(result, CookResult::Success);
    let part = target.scene().find_part("rock", "display", "body").unwrap();
    assert_eq!(target.scene().part(part).unwrap().point_count(), 7);
}

#[test]
fn mismatched_preset_warns_and_applies() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());
    forced(&mut asset, &mut session, &mut host);

    let mut preset = asset.get_asset_preset(&session).unwrap();
    preset.asset_name = "boulders".into();
    let mismatch = asset.preset_mismatch(&preset).unwrap();
    assert_eq!(mismatch.found_name, "boulders");
    asset.events_mut().drain();

    let result = {
        let mut ctx = CookContext::new(&mut session, &mut host);
        asset.load_asset_preset_and_cook(&mut ctx, preset).unwrap()
    };
    assert_eq!(result, CookResult::Success);
    let events = asset.events_mut().drain();
    assert!(events.iter().any(|e| e.kind() == AssetEventKind::Warning));
}

#[test]
fn curve_preset_applies_after_rebuild() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let mut original = AssetNode::new(AssetDefinition::curve("path"), AssetConfig::default());
    forced(&mut original, &mut session, &mut host);
    let edited = CurveData {
        points: vec![[0.0; 3], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
        closed: true,
    };
    original.set_curve_data("curve", "curve", edited.clone());
    recook(&mut original, &mut session, &mut host);

    let preset = original.get_asset_preset(&session).unwrap();
    assert_eq!(preset.curves.len(), 1);
    assert_eq!(preset.curves[0].data().unwrap(), edited);

    let mut copy = AssetNode::new(AssetDefinition::curve("path"), AssetConfig::default());
    let result = {
        let mut ctx = CookContext::new(&mut session, &mut host);
        copy.load_asset_preset_and_cook(&mut ctx, preset).unwrap()
    };
    assert_eq!(result, CookResult::Success);
    assert!(!copy.is_busy());
    let geo = copy.scene().find_geo("curve", "curve").unwrap();
    let curve = copy.scene().geo(geo).unwrap().curve().unwrap();
    assert_eq!(curve.data, edited);
    assert!(!curve.is_dirty());
}

fn layer_preset(tile: i32, metallic: f32) -> PresetStore {
    PresetStore {
        asset_name: "terrain".into(),
        volume_layers: vec![VolumeLayerPreset {
            object_name: "terrain".into(),
            geo_name: "height".into(),
            tile,
            layers: vec![LayerPreset {
                name: "height".into(),
                settings: VolumeLayerSettings {
                    metallic,
                    ..VolumeLayerSettings::default()
                },
            }],
        }],
        ..PresetStore::default()
    }
}

#[test]
fn volume_layer_preset_waits_for_its_tile() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(terrain());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    {
        let mut ctx = CookContext::new(&mut session, &mut host);
        asset.load_asset_preset_and_cook(&mut ctx, layer_preset(1, 0.75)).unwrap();
    }
    assert_eq!(asset.deferred_presets().len(), 1);

    asset.set_parameter("tiles", ParameterValue::Int(vec![2]));
    assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);
    assert!(asset.deferred_presets().is_empty());

    let geo = asset.scene().find_geo("terrain", "height").unwrap();
    let stack = asset.scene().geo(geo).unwrap().volume_stack(1).unwrap();
    assert_eq!(stack.layers[0].settings.metallic, 0.75);
}

#[test]
fn deferred_fragments_are_dropped_after_their_retries() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(terrain());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    let mut preset = layer_preset(9, 0.5);
    preset.inputs.push(InputPreset {
        input_name: "mask".into(),
        sources: vec![ObjectRef::project("assets/mask")],
    });
    {
        let mut ctx = CookContext::new(&mut session, &mut host);
        asset.load_asset_preset_and_cook(&mut ctx, preset).unwrap();
    }
    // The input was retried once after the load and dropped; the layers
    // wait for the next cook.
    assert_eq!(asset.deferred_presets().len(), 1);

    forced(&mut asset, &mut session, &mut host);
    assert!(asset.deferred_presets().is_empty());
    let geo = asset.scene().find_geo("terrain", "height").unwrap();
    assert!(asset.scene().geo(geo).unwrap().volume_stack(9).is_none());
}

#[test]
fn zero_retries_drop_missing_targets_immediately() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(terrain());
    let config = AssetConfig {
        deferred_preset_retries: 0,
        ..AssetConfig::default()
    };
    let mut asset = AssetNode::new(def, config);
    {
        let mut ctx = CookContext::new(&mut session, &mut host);
        asset.load_asset_preset_and_cook(&mut ctx, layer_preset(3, 0.5)).unwrap();
    }
    assert!(asset.deferred_presets().is_empty());
}

#[test]
fn preset_inputs_connect_when_exposed() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(wall());
    let mut asset = AssetNode::new(def, AssetConfig::default());
    let ground = vec![ObjectRef::scene("World/Ground")];
    let preset = PresetStore {
        asset_name: "wall".into(),
        inputs: vec![InputPreset {
            input_name: "ground".into(),
            sources: ground.clone(),
        }],
        ..PresetStore::default()
    };
    {
        let mut ctx = CookContext::new(&mut session, &mut host);
        asset.load_asset_preset_and_cook(&mut ctx, preset).unwrap();
    }
    assert!(asset.deferred_presets().is_empty());
    assert_eq!(session.connected(asset.session_id(), 0), Some(ground.as_slice()));
    assert!(asset.scene().find_object("footing").is_some());
}

#[test]
fn layer_settings_survive_regeneration() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(terrain());
    let mut asset = AssetNode::new(def, AssetConfig::default());
    forced(&mut asset, &mut session, &mut host);

    let settings = VolumeLayerSettings {
        texture: Some("tex/grass".into()),
        ..VolumeLayerSettings::default()
    };
    assert!(asset.set_volume_layer_settings("terrain", "height", 0, "height", settings.clone()));
    assert!(!asset.set_volume_layer_settings("terrain", "height", 5, "height", settings.clone()));

    asset.set_parameter("tiles", ParameterValue::Int(vec![3]));
    recook(&mut asset, &mut session, &mut host);
    let geo = asset.scene().geo(asset.scene().find_geo("terrain", "height").unwrap()).unwrap();
    assert_eq!(geo.volume_layers().len(), 3);
    assert_eq!(geo.volume_stack(0).unwrap().layers[0].settings, settings);
    assert_eq!(geo.volume_stack(2).unwrap().layers[0].settings, VolumeLayerSettings::default());
}

#[test]
fn volume_layer_settings_survive_a_preset_round_trip() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(terrain());
    let mut asset = AssetNode::new(def.clone(), AssetConfig::default());
    asset.set_parameter("tiles", ParameterValue::Int(vec![2]));
    forced(&mut asset, &mut session, &mut host);

    let settings = VolumeLayerSettings {
        texture: Some("tex/scree".into()),
        tile_size: [2.0, 4.0],
        metallic: 0.125,
        smoothness: 0.25,
    };
    assert!(asset.set_volume_layer_settings("terrain", "height", 1, "height", settings.clone()));

    let bytes = asset.get_asset_preset(&session).unwrap().encode().unwrap();
    let preset = PresetStore::decode(&bytes).unwrap();
    let captured = preset.volume_layers.iter().find(|v| v.tile == 1).unwrap();
    assert_eq!(captured.layers[0].settings, settings);

    let mut copy = AssetNode::new(def, AssetConfig::default());
    let result = {
        let mut ctx = CookContext::new(&mut session, &mut host);
        copy.load_asset_preset_and_cook(&mut ctx, preset).unwrap()
    };
    assert_eq!(result, CookResult::Success);
    assert!(copy.deferred_presets().is_empty());
    let geo = copy.scene().geo(copy.scene().find_geo("terrain", "height").unwrap()).unwrap();
    assert_eq!(geo.volume_stack(1).unwrap().layers[0].settings, settings);
    assert_eq!(geo.volume_stack(0).unwrap().layers[0].settings, VolumeLayerSettings::default());
}

// ===========================================================================
// Request latch and asynchronous cooking
// ===========================================================================

#[test]
fn async_request_is_polled_across_ticks() {
    let mut session = MockSession::new();
    session.cook_polls = 3;
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    let mut ctx = CookContext::new(&mut session, &mut host);
    assert_eq!(asset.request_cook(&mut ctx, CookRequest::default()), RequestOutcome::Latched);
    assert_eq!(
        asset.request_reset_parameters(&mut ctx, true),
        RequestOutcome::Rejected {
            pending: BuildAction::Cook
        }
    );
    assert_eq!(
        asset.request_cook(&mut ctx, CookRequest::forced()),
        RequestOutcome::Rejected {
            pending: BuildAction::Cook
        }
    );
    assert_eq!(asset.cook_state(), CookState::Uninitialized);

    let mut ticks = 0;
    while asset.is_busy() {
        asset.tick(&mut ctx);
        ticks += 1;
        assert!(ticks < 50);
    }
    drop(ctx);
    assert_eq!(ticks, 8);
    assert_eq!(asset.cook_result(), CookResult::Success);

    let states: Vec<CookState> = asset
        .events_mut()
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            AssetEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            CookState::Preloading,
            CookState::Loading,
            CookState::Cooking,
            CookState::PostLoad,
            CookState::Idle,
        ]
    );
}

#[test]
fn undrained_events_stay_bounded() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let config = AssetConfig {
        event_capacity: 4,
        ..AssetConfig::default()
    };
    let mut asset = AssetNode::new(def, config);
    let seen = std::rc::Rc::new(std::cell::Cell::new(0));
    let sink = seen.clone();
    asset
        .events_mut()
        .on_passive(AssetEventKind::Cooked, Box::new(move |_| sink.set(sink.get() + 1)));

    forced(&mut asset, &mut session, &mut host);
    for i in 0..50 {
        asset.set_parameter("count", ParameterValue::Int(vec![if i % 2 == 0 { 4 } else { 3 }]));
        assert_eq!(recook(&mut asset, &mut session, &mut host), SUCCESS);
    }

    assert_eq!(seen.get(), 50);
    let cooked = asset.events().buffer(AssetEventKind::Cooked).unwrap();
    assert_eq!(cooked.len(), 4);
    assert_eq!(cooked.dropped_count(), 46);
    assert!(asset.events().pending_count() <= 4 * 3);
    assert!(asset.events().dropped_count() >= 46);
    let drained = asset.events_mut().drain();
    assert_eq!(drained.last().map(AssetEvent::kind), Some(AssetEventKind::Cooked));
}

#[test]
fn reload_and_invalidate_replace_a_pending_request() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());

    let mut ctx = CookContext::new(&mut session, &mut host);
    asset.request_cook(&mut ctx, CookRequest::default());
    assert_eq!(asset.request_reload(&mut ctx, true), RequestOutcome::Latched);
    assert_eq!(asset.pending_action(), Some(BuildAction::Reload));
    assert_eq!(asset.request_invalidate(), RequestOutcome::Latched);
    assert_eq!(asset.pending_action(), Some(BuildAction::Invalid));
}

#[test]
fn warnings_do_not_fail_the_cook() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());
    session.script_status(kiln_core::session::CookStatus::ReadyWithWarnings);

    assert_eq!(forced(&mut asset, &mut session, &mut host), SUCCESS);
    assert_eq!(asset.warnings(), &["cooked with warnings".to_string()]);
    assert_eq!(asset.scene().part_count(), 1);
}

#[test]
fn library_with_several_assets_waits_for_selection() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    session.add_library("forest.hda", &["Tree::oak", "Tree::pine"]);
    session.register(MockAssetType::fixed("Tree::oak", vec![mesh_object("oak", "trunk", 3)]));
    session.register(MockAssetType::fixed("Tree::pine", vec![mesh_object("pine", "trunk", 3)]));

    let def = AssetDefinition::procedural("forest", "forest.hda");
    let mut asset = AssetNode::new(def.clone(), AssetConfig::default());
    assert_eq!(
        forced(&mut asset, &mut session, &mut host),
        RequestOutcome::AwaitingSelection
    );
    assert_eq!(asset.cook_state(), CookState::LoadingWaitingForSubselection);
    assert_eq!(asset.available_assets().len(), 2);

    assert!(matches!(
        asset.select_subasset("Tree::elm"),
        Err(AssetError::UnknownSubasset(_))
    ));
    asset.select_subasset("Tree::pine").unwrap();
    assert_eq!(asset.cook_state(), CookState::Loading);
    settle(&mut asset, &mut session, &mut host);
    assert_eq!(asset.cook_result(), CookResult::Success);
    assert!(asset.scene().find_object("pine").is_some());

    let mut preselected = AssetNode::new(def.with_selection("Tree::oak"), AssetConfig::default());
    assert_eq!(forced(&mut preselected, &mut session, &mut host), SUCCESS);
    assert!(preselected.scene().find_object("oak").is_some());
}

// ===========================================================================
// Bake, duplicate, destroy
// ===========================================================================

#[test]
fn bake_copies_live_outputs() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks().with_parameter("count", ParameterValue::Int(vec![4])));
    let mut asset = AssetNode::new(def, AssetConfig::default());
    forced(&mut asset, &mut session, &mut host);

    let baked = asset.bake(&mut host).unwrap();
    assert_eq!(baked.len(), 1);
    assert_eq!(host.baked(), baked.as_slice());
    let events = asset.events_mut().drain();
    assert!(events
        .iter()
        .any(|e| e.kind() == AssetEventKind::Baked && e.success() == Some(true)));
}

#[test]
fn duplicate_builds_an_independent_copy() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());
    forced(&mut asset, &mut session, &mut host);
    asset.set_parameter("count", ParameterValue::Int(vec![5]));
    recook(&mut asset, &mut session, &mut host);

    let copy = {
        let mut ctx = CookContext::new(&mut session, &mut host);
        asset.duplicate(&mut ctx).unwrap()
    };
    assert_ne!(copy.session_id(), asset.session_id());
    assert_eq!(session.asset_count(), 2);
    assert_eq!(host.live_count(), 2);
    let part = copy.scene().find_part("rock", "display", "body").unwrap();
    assert_eq!(copy.scene().part(part).unwrap().point_count(), 5);
}

#[test]
fn busy_asset_refuses_to_duplicate() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(counted_rocks());
    let mut asset = AssetNode::new(def, AssetConfig::default());
    let mut ctx = CookContext::new(&mut session, &mut host);
    asset.request_cook(&mut ctx, CookRequest::default());
    assert!(matches!(
        asset.duplicate(&mut ctx),
        Err(AssetError::Busy { .. })
    ));
}

#[test]
fn destroy_releases_every_handle() {
    let mut session = MockSession::new();
    let mut host = RecordingHost::new();
    let def = session.with_asset(MockAssetType::fixed(
        "mixed",
        vec![
            mesh_object("rock", "body", 3),
            MockObject::new("ground")
                .with_geo(MockGeo::display("height").with_part(MockPart::volume("h0", 0, "height"))),
        ],
    ));
    let mut asset = AssetNode::new(def, AssetConfig::default());
    forced(&mut asset, &mut session, &mut host);
    assert_eq!(host.live_count(), 2);

    let released: HashSet<Resource> = {
        let mut ctx = CookContext::new(&mut session, &mut host);
        asset.destroy(&mut ctx);
        drop(ctx);
        host.log()
            .iter()
            .filter_map(|op| match op {
                HostOp::Release(r) => Some(*r),
                _ => None,
            })
            .collect()
    };
    assert_eq!(released.len(), 2);
    assert_eq!(host.live_count(), 0);
    assert_eq!(asset.cook_state(), CookState::Uninitialized);
}
