//! Kiln Core -- cook orchestration and output reconciliation for procedural
//! assets.
//!
//! A procedural asset is a parameterized generator that lives in an external
//! engine (the *generation session*). This crate drives that engine through
//! repeated build cycles and keeps a host application's realized outputs
//! (meshes, colliders, terrain layers, curves, spawned instances) in sync
//! with whatever the engine produced last, touching only what changed.
//!
//! # Cook Cycle
//!
//! Each [`asset::AssetNode`] owns one pending request slot and advances one
//! step per [`asset::AssetNode::tick`]:
//!
//! 1. **Preload** -- Load the asset library and pick the asset type.
//! 2. **Load** -- Create a fresh session node and upload every cached value.
//! 3. **Cook** -- Start the engine and poll it until it settles.
//! 4. **Reconcile** -- Match the engine's objects, geos, and parts against
//!    the previous records by name and regenerate only changed parts.
//! 5. **Apply presets** -- Retry deferred fragments, apply curves and layer
//!    settings, and latch a follow-up cook when the session needs one.
//!
//! A recook of a bound node skips the first two steps and uploads only dirty
//! values.
//!
//! # Key Types
//!
//! - [`asset::AssetNode`] -- Request latch, state machine, and public API.
//! - [`scene::SceneGraph`] -- The object / geo / part record arenas and the
//!   reconciler that keeps them matched to the session.
//! - [`part::PartNode`] -- Turns one session part into an
//!   [`artifact::OutputArtifact`] via the [`host::OutputHost`].
//! - [`session::GenerationSession`] -- The engine collaborator.
//! - [`preset::PresetStore`] -- Identity-independent snapshot of user state,
//!   serialized with a versioned header (see [`serialize`] and
//!   [`migration`]).
//! - [`event::AssetEventBus`] -- Cycle-completion and state-change events.

pub mod artifact;
pub mod asset;
pub mod config;
pub mod event;
pub mod geo;
pub mod host;
pub mod id;
pub mod material;
pub mod migration;
pub mod object;
pub mod parameters;
pub mod part;
pub mod preset;
pub mod reconcile;
pub mod scene;
pub mod serialize;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
