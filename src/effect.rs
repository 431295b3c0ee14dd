//! Runtime control surface over a loaded effect.
//!
//! An [`Effect`] owns a flat arena of group and emitter nodes. Groups only
//! carry a transform; every emitter owns one particle backend plus the
//! material it renders with.

use bevy::math::Affine3A;
use bevy::prelude::*;
use quarks_particles::{EffectSystem, ParticleSystem, ParticleSystemConfig, SystemKind};

use crate::convert::EffectData;
use crate::factory::{MaterialDescriptor, NodeFactory};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

pub struct EmitterNode {
    pub system: ParticleSystem,
    pub material: MaterialDescriptor,
}

pub enum NodeKind {
    Group,
    Particle(Box<EmitterNode>),
}

pub struct EffectNode {
    pub uuid: String,
    pub name: String,
    /// Left-handed local transform.
    pub transform: Transform,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

impl EffectNode {
    pub fn group(uuid: String, name: String, transform: Transform, parent: Option<NodeId>) -> Self {
        Self {
            uuid,
            name,
            transform,
            parent,
            children: Vec::new(),
            kind: NodeKind::Group,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group)
    }

    pub fn emitter(&self) -> Option<&EmitterNode> {
        match &self.kind {
            NodeKind::Particle(emitter) => Some(emitter),
            NodeKind::Group => None,
        }
    }

    pub fn emitter_mut(&mut self) -> Option<&mut EmitterNode> {
        match &mut self.kind {
            NodeKind::Particle(emitter) => Some(emitter),
            NodeKind::Group => None,
        }
    }

    pub fn system(&self) -> Option<&ParticleSystem> {
        self.emitter().map(|e| &e.system)
    }

    pub fn system_mut(&mut self) -> Option<&mut ParticleSystem> {
        self.emitter_mut().map(|e| &mut e.system)
    }
}

/// `base`, or `base N` with the smallest N that is not taken yet.
pub(crate) fn unique_name(nodes: &[EffectNode], base: &str) -> String {
    let taken = |candidate: &str| nodes.iter().any(|n| n.name == candidate);
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base} {n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

pub struct Effect {
    nodes: Vec<EffectNode>,
    /// Simulation-space world transform per node, refreshed by `tick`.
    world: Vec<Affine3A>,
    data: EffectData,
    root_url: String,
}

impl Effect {
    /// Build every node and backend from converted data.
    pub fn new(data: EffectData, root_url: impl Into<String>) -> Self {
        let root_url = root_url.into();
        let nodes = NodeFactory::new(&data, &root_url).create();
        info!(
            "Created effect with {} nodes ({} systems)",
            nodes.len(),
            nodes.iter().filter(|n| !n.is_group()).count()
        );
        let mut effect = Self {
            world: vec![Affine3A::IDENTITY; nodes.len()],
            nodes,
            data,
            root_url,
        };
        effect.update_world_transforms(Affine3A::IDENTITY);
        effect
    }

    pub fn data(&self) -> &EffectData {
        &self.data
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// `None` once disposed.
    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(NodeId(0))
    }

    pub fn node(&self, id: NodeId) -> Option<&EffectNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut EffectNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &EffectNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Every emitter node with its backend.
    pub fn systems(&self) -> impl Iterator<Item = (NodeId, &EmitterNode)> {
        self.nodes()
            .filter_map(|(id, n)| n.emitter().map(|emitter| (id, emitter)))
    }

    pub fn world_transform(&self, id: NodeId) -> Affine3A {
        self.world.get(id.0).copied().unwrap_or(Affine3A::IDENTITY)
    }

    pub fn is_disposed(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---- Lookup ----

    pub fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    pub fn find_node_by_uuid(&self, uuid: &str) -> Option<NodeId> {
        self.nodes().find(|(_, n)| n.uuid == uuid).map(|(id, _)| id)
    }

    pub fn find_system_by_name(&self, name: &str) -> Option<&ParticleSystem> {
        self.nodes.iter().filter(|n| n.name == name).find_map(EffectNode::system)
    }

    pub fn find_system_by_name_mut(&mut self, name: &str) -> Option<&mut ParticleSystem> {
        self.nodes
            .iter_mut()
            .filter(|n| n.name == name)
            .find_map(EffectNode::system_mut)
    }

    pub fn find_system_by_uuid(&self, uuid: &str) -> Option<&ParticleSystem> {
        self.nodes.iter().filter(|n| n.uuid == uuid).find_map(EffectNode::system)
    }

    pub fn find_system_by_uuid_mut(&mut self, uuid: &str) -> Option<&mut ParticleSystem> {
        self.nodes
            .iter_mut()
            .filter(|n| n.uuid == uuid)
            .find_map(EffectNode::system_mut)
    }

    pub fn find_group_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes()
            .find(|(_, n)| n.is_group() && n.name == name)
            .map(|(id, _)| id)
    }

    pub fn find_group_by_uuid(&self, uuid: &str) -> Option<NodeId> {
        self.nodes()
            .find(|(_, n)| n.is_group() && n.uuid == uuid)
            .map(|(id, _)| id)
    }

    /// Emitters under the named group, including nested groups.
    pub fn systems_in_group(&self, group_name: &str) -> Vec<NodeId> {
        self.find_group_by_name(group_name)
            .map(|group| self.systems_in_node(group))
            .unwrap_or_default()
    }

    /// The node itself when it is an emitter, otherwise every emitter
    /// below it.
    pub fn systems_in_node(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            if !node.is_group() {
                out.push(current);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    fn for_each_system(&mut self, ids: &[NodeId], mut f: impl FnMut(&mut dyn EffectSystem)) {
        for id in ids {
            if let Some(system) = self.nodes.get_mut(id.0).and_then(EffectNode::system_mut) {
                f(system.system_mut());
            }
        }
    }

    fn all_systems(&self) -> Vec<NodeId> {
        self.systems().map(|(id, _)| id).collect()
    }

    // ---- Whole effect ----

    pub fn start(&mut self) {
        let ids = self.all_systems();
        self.for_each_system(&ids, |s| s.start());
    }

    pub fn stop(&mut self) {
        let ids = self.all_systems();
        self.for_each_system(&ids, |s| s.stop());
    }

    pub fn reset(&mut self) {
        let ids = self.all_systems();
        self.for_each_system(&ids, |s| s.reset());
    }

    /// True when any system is running.
    pub fn is_started(&self) -> bool {
        self.systems().any(|(_, e)| e.system.system().is_started())
    }

    // ---- Systems and groups ----

    pub fn start_system(&mut self, name: &str) -> bool {
        self.find_system_by_name_mut(name)
            .map(|s| s.system_mut().start())
            .is_some()
    }

    pub fn stop_system(&mut self, name: &str) -> bool {
        self.find_system_by_name_mut(name)
            .map(|s| s.system_mut().stop())
            .is_some()
    }

    pub fn start_group(&mut self, group_name: &str) {
        let ids = self.systems_in_group(group_name);
        self.for_each_system(&ids, |s| s.start());
    }

    pub fn stop_group(&mut self, group_name: &str) {
        let ids = self.systems_in_group(group_name);
        self.for_each_system(&ids, |s| s.stop());
    }

    pub fn start_node(&mut self, id: NodeId) {
        let ids = self.systems_in_node(id);
        self.for_each_system(&ids, |s| s.start());
    }

    pub fn stop_node(&mut self, id: NodeId) {
        let ids = self.systems_in_node(id);
        self.for_each_system(&ids, |s| s.stop());
    }

    pub fn reset_node(&mut self, id: NodeId) {
        let ids = self.systems_in_node(id);
        self.for_each_system(&ids, |s| s.reset());
    }

    /// An emitter is started when its system is; a group when any system
    /// below it is.
    pub fn is_node_started(&self, id: NodeId) -> bool {
        self.systems_in_node(id).into_iter().any(|id| {
            self.node(id)
                .and_then(EffectNode::system)
                .is_some_and(|s| s.system().is_started())
        })
    }

    // ---- Authoring ----

    fn group_parent(&self, parent: Option<NodeId>, what: &str) -> Option<NodeId> {
        let parent = parent.or(self.root())?;
        if self.node(parent).is_some_and(EffectNode::is_group) {
            Some(parent)
        } else {
            error!("Cannot create {what}: parent is not a group");
            None
        }
    }

    /// Add an empty group under `parent` (the root when `None`).
    pub fn create_group(&mut self, parent: Option<NodeId>, name: &str) -> Option<NodeId> {
        let parent = self.group_parent(parent, "group")?;
        let name = unique_name(&self.nodes, name);
        let uuid = format!("group_{:08x}", fastrand::u32(..));
        self.push_node(parent, EffectNode::group(uuid, name, Transform::IDENTITY, Some(parent)))
    }

    /// Add a new emitter under `parent` (the root when `None`). `kind`
    /// overrides the config's backend.
    pub fn create_particle_system(
        &mut self,
        parent: Option<NodeId>,
        kind: SystemKind,
        name: &str,
        config: Option<ParticleSystemConfig>,
    ) -> Option<NodeId> {
        let parent = self.group_parent(parent, "particle system")?;
        let name = unique_name(&self.nodes, name);
        let mut config = config.unwrap_or_default();
        config.kind = kind;

        let parent_scale = self.cumulative_scale(Some(parent));
        let material_id = config.material.clone();
        let emitter = NodeFactory::new(&self.data, &self.root_url).build_emitter(
            &name,
            config,
            material_id.as_deref(),
            parent_scale,
        );
        let node = EffectNode {
            uuid: format!("emitter_{:08x}", fastrand::u32(..)),
            name,
            transform: Transform::IDENTITY,
            parent: Some(parent),
            children: Vec::new(),
            kind: NodeKind::Particle(Box::new(emitter)),
        };
        self.push_node(parent, node)
    }

    fn push_node(&mut self, parent: NodeId, node: EffectNode) -> Option<NodeId> {
        let id = NodeId(self.nodes.len());
        debug!("Created node {} under {}", node.name, self.nodes[parent.0].name);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        let world = self.world_transform(parent) * self.nodes[id.0].transform.compute_affine();
        self.world.push(world);
        Some(id)
    }

    fn cumulative_scale(&self, mut current: Option<NodeId>) -> Vec3 {
        let mut scale = Vec3::ONE;
        while let Some(node) = current.and_then(|id| self.node(id)) {
            scale *= node.transform.scale;
            current = node.parent;
        }
        scale
    }

    /// Release every backend and clear all lookups. Safe to call twice.
    pub fn dispose(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        for node in &mut self.nodes {
            if let Some(system) = node.system_mut() {
                system.system_mut().dispose();
            }
        }
        self.nodes.clear();
        self.world.clear();
        info!("Effect disposed");
    }

    // ---- Simulation ----

    /// Advance every system by `dt`. `root` places the effect in
    /// simulation space.
    pub fn tick(&mut self, dt: f32, root: Affine3A) {
        self.update_world_transforms(root);
        for node in &mut self.nodes {
            if let Some(system) = node.system_mut() {
                system.system_mut().tick(dt);
            }
        }
    }

    /// Place the effect without advancing time. Call before `start` so
    /// pre-warmed world-space emitters spawn at the right place.
    pub fn set_root_transform(&mut self, root: Affine3A) {
        self.update_world_transforms(root);
    }

    /// Parents always precede their children in the arena. Emitters receive
    /// their new world transform.
    fn update_world_transforms(&mut self, root: Affine3A) {
        self.world.resize(self.nodes.len(), Affine3A::IDENTITY);
        for i in 0..self.nodes.len() {
            let node = &self.nodes[i];
            let parent = node.parent.map_or(root, |p| self.world[p.0]);
            self.world[i] = parent * node.transform.compute_affine();
        }
        for (node, world) in self.nodes.iter_mut().zip(&self.world) {
            if let Some(system) = node.system_mut() {
                system.system_mut().set_emitter_transform(*world);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::DataConverter;
    use crate::format::RawDocument;
    use quarks_particles::presets;
    use serde_json::json;

    fn effect() -> Effect {
        let document: RawDocument = serde_json::from_value(json!({
            "object": {
                "type": "Group", "name": "root", "uuid": "root-id",
                "children": [
                    { "type": "Group", "name": "left", "uuid": "left-id", "position": [1, 0, 0],
                      "children": [
                        { "type": "ParticleEmitter", "name": "a", "uuid": "a-id",
                          "ps": { "looping": true, "emissionOverTime": 20 } },
                        { "type": "Group", "name": "nested", "children": [
                            { "type": "ParticleEmitter", "name": "b",
                              "ps": { "looping": true, "renderMode": 2 } }
                        ]}
                    ]},
                    { "type": "ParticleEmitter", "name": "c", "ps": { "looping": true } }
                ]
            }
        }))
        .unwrap();
        Effect::new(DataConverter::convert(&document), "")
    }

    fn names(effect: &Effect, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| effect.node(*id))
            .map(|n| n.name.clone())
            .collect()
    }

    #[test]
    fn lookups_by_name_and_uuid() {
        let effect = effect();
        assert!(effect.find_system_by_name("a").is_some());
        assert!(effect.find_system_by_uuid("a-id").is_some());
        assert!(effect.find_system_by_name("left").is_none());
        assert_eq!(effect.find_group_by_uuid("left-id"), effect.find_group_by_name("left"));
        assert!(effect.find_group_by_name("a").is_none());
        assert_eq!(effect.find_node_by_uuid("root-id"), Some(NodeId(0)));
    }

    #[test]
    fn group_control_reaches_nested_systems() {
        let mut effect = effect();
        assert_eq!(names(&effect, &effect.systems_in_group("left")), ["a", "b"]);

        effect.start_group("left");
        assert!(effect.find_system_by_name("a").unwrap().system().is_started());
        assert!(effect.find_system_by_name("b").unwrap().system().is_started());
        assert!(!effect.find_system_by_name("c").unwrap().system().is_started());
        assert!(effect.is_started());

        let nested = effect.find_group_by_name("nested").unwrap();
        assert!(effect.is_node_started(nested));
        effect.stop_group("left");
        assert!(!effect.is_started());
        assert!(effect.systems_in_group("missing").is_empty());
    }

    #[test]
    fn whole_effect_and_single_system_control() {
        let mut effect = effect();
        effect.start();
        assert!(effect.systems().all(|(_, e)| e.system.system().is_started()));
        assert!(effect.stop_system("c"));
        assert!(!effect.stop_system("nope"));
        assert!(!effect.find_system_by_name("c").unwrap().system().is_started());
        effect.stop();
        assert!(!effect.is_started());
        assert!(effect.start_system("c"));
        assert!(effect.is_started());
    }

    #[test]
    fn tick_places_systems_in_world_space() {
        let mut effect = effect();
        effect.start();
        effect.tick(0.1, Affine3A::from_translation(Vec3::new(0.0, 5.0, 0.0)));
        let a = effect.find_node_by_name("a").unwrap();
        let origin = effect.world_transform(a).transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 5.0, 0.0)).length() < 1e-5);
        assert!(effect.find_system_by_name("a").unwrap().system().live_count() > 0);
    }

    #[test]
    fn prewarm_spawns_at_the_root_transform() {
        let document: RawDocument = serde_json::from_value(json!({
            "object": {
                "type": "Group", "name": "root",
                "children": [
                    { "type": "ParticleEmitter", "name": "warm",
                      "ps": { "looping": true, "prewarm": true, "duration": 1,
                              "emissionOverTime": 30, "startSpeed": 0, "startLife": 5 } }
                ]
            }
        }))
        .unwrap();
        let mut effect = Effect::new(DataConverter::convert(&document), "");
        let at = Vec3::new(10.0, 0.0, -4.0);
        effect.set_root_transform(Affine3A::from_translation(at));
        effect.start();

        let warm = effect.find_system_by_name("warm").unwrap().system();
        assert!(warm.live_count() > 0);
        for p in warm.particles().iter().filter(|p| p.alive) {
            assert!((p.position - at).length() < 1e-3, "spawned at {}", p.position);
        }
    }

    #[test]
    fn reset_clears_particles_and_keeps_running() {
        let mut effect = effect();
        effect.start();
        effect.tick(0.5, Affine3A::IDENTITY);
        assert!(effect.find_system_by_name("a").unwrap().system().live_count() > 0);

        effect.reset();
        assert!(effect.systems().all(|(_, e)| e.system.system().live_count() == 0));
        assert!(effect.is_started());

        effect.tick(0.5, Affine3A::IDENTITY);
        assert!(effect.find_system_by_name("a").unwrap().system().live_count() > 0);
    }

    #[test]
    fn reset_node_only_touches_its_subtree() {
        let mut effect = effect();
        effect.start();
        effect.tick(0.5, Affine3A::IDENTITY);
        let c_before = effect.find_system_by_name("c").unwrap().system().live_count();

        let left = effect.find_group_by_name("left").unwrap();
        effect.reset_node(left);
        assert_eq!(effect.find_system_by_name("a").unwrap().system().live_count(), 0);
        assert_eq!(effect.find_system_by_name("b").unwrap().system().live_count(), 0);
        assert_eq!(
            effect.find_system_by_name("c").unwrap().system().live_count(),
            c_before
        );
        assert!(effect.is_node_started(left));
    }

    #[test]
    fn created_nodes_get_unique_names() {
        let mut effect = effect();
        let left = effect.find_group_by_name("left");
        let group = effect.create_group(left, "left").unwrap();
        assert_eq!(effect.node(group).unwrap().name, "left 1");

        let sparks = presets::preset("Sparks");
        let first = effect
            .create_particle_system(Some(group), SystemKind::Billboard, "fx", sparks.clone())
            .unwrap();
        let second = effect
            .create_particle_system(None, SystemKind::Solid, "fx", sparks)
            .unwrap();
        assert_eq!(effect.node(first).unwrap().name, "fx");
        assert_eq!(effect.node(second).unwrap().name, "fx 1");
        assert_eq!(effect.node(second).unwrap().parent, Some(NodeId(0)));
        assert_eq!(effect.find_system_by_name("fx 1").unwrap().kind(), SystemKind::Solid);
        assert!(effect.systems_in_group("left").contains(&first));
    }

    #[test]
    fn authoring_requires_a_group_parent() {
        let mut effect = effect();
        let a = effect.find_node_by_name("a");
        assert!(effect.create_group(a, "child").is_none());
        assert!(
            effect
                .create_particle_system(a, SystemKind::Billboard, "child", None)
                .is_none()
        );
    }

    #[test]
    fn dispose_is_idempotent_and_clears_lookups() {
        let mut effect = effect();
        effect.start();
        effect.dispose();
        assert!(effect.is_disposed());
        assert!(effect.find_system_by_name("a").is_none());
        assert!(effect.root().is_none());
        assert!(effect.create_group(None, "late").is_none());
        effect.dispose();
        effect.tick(0.1, Affine3A::IDENTITY);
    }
}
