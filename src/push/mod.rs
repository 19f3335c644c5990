//! Push stage: deliver compiled artifacts to every live target.
//!
//! Targets are running instances of the application that accept patches.
//! How a target is reached is a collaborator concern ([`Deployer`]); this
//! module converts artifacts into [`PatchRequest`]s and fans them out
//! (see [`stage::push_all`]).

pub mod stage;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compile::{CompiledArtifact, FunctionKind};
use crate::config::section::PushConfig;

pub use stage::{PushReport, TargetReport};

/// Device serial or other stable target identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A running application instance able to receive patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: TargetId,
    pub application_id: String,
    pub api_level: u32,
    pub emulator: bool,
}

impl Target {
    pub fn new(id: impl Into<String>, application_id: impl Into<String>, api_level: u32) -> Self {
        Self {
            id: TargetId::new(id),
            application_id: application_id.into(),
            api_level,
            emulator: false,
        }
    }

    pub fn emulator(mut self) -> Self {
        self.emulator = true;
        self
    }

    /// Short form for logs: `pixel-7 (api 34)`.
    pub fn label(&self) -> String {
        let kind = if self.emulator { ", emulator" } else { "" };
        format!("{} (api {}{})", self.id, self.api_level, kind)
    }
}

/// Keep targets running the platform level that supports patching.
pub fn eligible(targets: Vec<Target>, min_api_level: u32) -> Vec<Target> {
    targets
        .into_iter()
        .filter(|t| {
            let ok = t.api_level >= min_api_level;
            if !ok {
                crate::debug!("push"; "skip {}: api level below {}", t.label(), min_api_level);
            }
            ok
        })
        .collect()
}

/// Source of the targets currently running the application.
pub trait TargetProvider: Send + Sync {
    fn live_targets(&self, application_id: &str) -> Vec<Target>;
}

/// In-memory target registry.
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    targets: Arc<RwLock<Vec<Target>>>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target, replacing any earlier entry with the same id.
    pub fn connect(&self, target: Target) {
        let mut targets = self.targets.write();
        targets.retain(|t| t.id != target.id);
        targets.push(target);
    }

    pub fn disconnect(&self, id: &TargetId) -> bool {
        let mut targets = self.targets.write();
        let before = targets.len();
        targets.retain(|t| &t.id != id);
        targets.len() != before
    }

    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }
}

impl TargetProvider for TargetSet {
    fn live_targets(&self, application_id: &str) -> Vec<Target> {
        self.targets
            .read()
            .iter()
            .filter(|t| t.application_id == application_id)
            .cloned()
            .collect()
    }
}

/// Push behavior resolved from the `[push]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    pub partial_recompose: bool,
    pub debug_mode: bool,
    pub min_api_level: u32,
    pub timeout: Duration,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self::from(&PushConfig::default())
    }
}

impl From<&PushConfig> for PushSettings {
    fn from(config: &PushConfig) -> Self {
        Self {
            partial_recompose: config.partial_recompose,
            debug_mode: config.debug_mode,
            min_api_level: config.min_api_level,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Wire form of one patch, as understood by the on-device agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub class_name: String,
    pub method_name: String,
    pub method_desc: String,
    /// Recompose only the edited group instead of the whole tree.
    pub partial: bool,
    pub offset_start: u32,
    pub offset_end: u32,
    #[serde(with = "hex::serde")]
    pub class_data: Vec<u8>,
    #[serde(default, with = "hex_map")]
    pub support_classes: BTreeMap<String, Vec<u8>>,
    #[serde(default)]
    pub debug_mode: bool,
}

impl PatchRequest {
    pub fn from_artifact(artifact: &CompiledArtifact, settings: &PushSettings) -> Self {
        Self {
            class_name: artifact.class_name.clone(),
            method_name: artifact.method_name.clone(),
            method_desc: artifact.method_desc.clone(),
            partial: settings.partial_recompose && artifact.kind == FunctionKind::Composable,
            offset_start: artifact.offset.start,
            offset_end: artifact.offset.end,
            class_data: artifact.class_data.clone(),
            support_classes: artifact.support_classes.clone(),
            debug_mode: settings.debug_mode,
        }
    }

    pub fn signature(&self) -> String {
        format!("{}.{}{}", self.class_name, self.method_name, self.method_desc)
    }
}

mod hex_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeMap};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (name, data) in map {
            out.serialize_entry(name, &hex::encode(data))?;
        }
        out.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(name, data)| {
                hex::decode(&data)
                    .map(|bytes| (name, bytes))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

/// Failure to deliver to one target. Recorded, never fatal to the pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("cannot connect to {target}: {reason}")]
    Connect { target: TargetId, reason: String },

    #[error("{target} rejected {artifact}: {message}")]
    Rejected {
        target: TargetId,
        artifact: String,
        message: String,
    },

    #[error("connection to {target} failed: {reason}")]
    Transport { target: TargetId, reason: String },

    #[error("{target} did not answer within {ms}ms")]
    Timeout { target: TargetId, ms: u64 },
}

impl PatchError {
    pub fn target(&self) -> &TargetId {
        match self {
            Self::Connect { target, .. }
            | Self::Rejected { target, .. }
            | Self::Transport { target, .. }
            | Self::Timeout { target, .. } => target,
        }
    }
}

/// Open connection to one target for the duration of a push.
pub trait PatchSession: Send {
    fn apply_patch(&mut self, request: &PatchRequest) -> Result<(), PatchError>;

    /// Whether further requests can still be sent. A session that lost its
    /// connection returns `false` and the remaining patches are skipped.
    fn is_usable(&self) -> bool {
        true
    }
}

/// Opens patch sessions. Implementations may block.
pub trait Deployer: Send + Sync + 'static {
    fn connect(&self, target: &Target) -> Result<Box<dyn PatchSession>, PatchError>;
}

/// Hooks for per-deploy bookkeeping. All no-ops by default.
pub trait DeployEvents: Send + Sync + 'static {
    /// A push to `target` is about to start for the batch keyed `key`.
    fn push_started(&self, _target: &Target, _key: &str) {}

    /// `target` finished the batch; `problems` is empty on success.
    fn pushed(&self, _target: &Target, _key: &str, _problems: &[String]) {}
}

/// Events sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl DeployEvents for NoEvents {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{FunctionId, Offset, UnitId};

    fn artifact(kind: FunctionKind) -> CompiledArtifact {
        CompiledArtifact {
            unit: UnitId::new("Main.kt"),
            function: FunctionId::new("Greeting"),
            class_name: "com/example/MainKt".into(),
            method_name: "Greeting".into(),
            method_desc: "(Landroidx/compose/runtime/Composer;I)V".into(),
            class_data: vec![0xca, 0xfe],
            kind,
            offset: Offset::new(10, 90),
            support_classes: BTreeMap::from([("com/example/MainKt$1".into(), vec![1, 2])]),
        }
    }

    #[test]
    fn test_partial_only_for_composables() {
        let settings = PushSettings::default();
        assert!(PatchRequest::from_artifact(&artifact(FunctionKind::Composable), &settings).partial);
        assert!(!PatchRequest::from_artifact(&artifact(FunctionKind::Plain), &settings).partial);

        let off = PushSettings {
            partial_recompose: false,
            ..PushSettings::default()
        };
        assert!(!PatchRequest::from_artifact(&artifact(FunctionKind::Composable), &off).partial);
    }

    #[test]
    fn test_patch_request_wire_format() {
        let request =
            PatchRequest::from_artifact(&artifact(FunctionKind::Composable), &PushSettings::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["class_data"], "cafe");
        assert_eq!(json["support_classes"]["com/example/MainKt$1"], "0102");
        assert_eq!(json["offset_start"], 10);

        let back: PatchRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_eligible_filters_by_api_level() {
        let targets = vec![
            Target::new("old", "app", 29),
            Target::new("new", "app", 30),
            Target::new("emu", "app", 34).emulator(),
        ];
        let ids: Vec<_> = eligible(targets, 30)
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(ids, ["new", "emu"]);
    }

    #[test]
    fn test_target_set_filters_by_application() {
        let set = TargetSet::new();
        set.connect(Target::new("a", "com.example", 33));
        set.connect(Target::new("b", "com.other", 33));
        set.connect(Target::new("a", "com.example", 34));

        let live = set.live_targets("com.example");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].api_level, 34);

        assert!(set.disconnect(&TargetId::new("a")));
        assert!(set.live_targets("com.example").is_empty());
        assert_eq!(set.len(), 1);
    }
}
