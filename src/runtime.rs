//! Bevy side of an effect: instantiation, ticking, and particle entities.
//!
//! Every emitter gets a pool root entity parented to the effect entity, with
//! one `Mesh3d` child per particle slot in use. Particle transforms are
//! computed in engine world space and the pool root cancels the effect
//! entity's own transform.

use bevy::image::{ImageLoaderSettings, ImageSampler};
use bevy::math::Affine2;
use bevy::platform::collections::HashMap;
use bevy::prelude::*;
use bevy::transform::helper::TransformHelper;
use quarks_particles::{BillboardMode, EffectSystem, ParticleSystem};

use crate::convert::{mirror_z, to_simulation_space};
use crate::effect::{Effect, NodeId};
use crate::factory::{MaterialDescriptor, TextureDescriptor};
use crate::loader::QuarksEffectAsset;
use crate::settings::QuarksSettings;

// ---------------------------------------------------------------------------
// Components, resources, messages
// ---------------------------------------------------------------------------

/// Spawn this (with a `Transform`) to show an effect asset.
#[derive(Component, Clone, Debug)]
#[require(Transform, Visibility)]
pub struct QuarksEffect {
    pub handle: Handle<QuarksEffectAsset>,
}

impl QuarksEffect {
    pub fn new(handle: Handle<QuarksEffectAsset>) -> Self {
        Self { handle }
    }
}

/// Runtime state of a spawned `QuarksEffect`.
#[derive(Component)]
pub struct EffectInstance {
    pub effect: Effect,
    pools: Vec<SystemPool>,
    asset: AssetId<QuarksEffectAsset>,
}

impl EffectInstance {
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}

/// Root of one emitter's particle entities.
#[derive(Component)]
pub struct ParticlePoolRoot;

#[derive(Component)]
pub struct ParticleVisual;

struct SystemPool {
    node: NodeId,
    root: Entity,
    entities: Vec<Entity>,
    mesh: Handle<Mesh>,
    mesh_revision: u32,
    material: MaterialDescriptor,
    texture: Option<Handle<Image>>,
    materials: HashMap<u64, Handle<StandardMaterial>>,
}

#[derive(Resource)]
pub struct QuarksRenderAssets {
    pub quad: Handle<Mesh>,
}

impl FromWorld for QuarksRenderAssets {
    fn from_world(world: &mut World) -> Self {
        let mut meshes = world.resource_mut::<Assets<Mesh>>();
        Self {
            quad: meshes.add(Rectangle::new(1.0, 1.0)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Reset,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlTarget {
    Effect,
    Group(String),
    System(String),
}

/// Start, stop, or reset part of a spawned effect.
#[derive(Message, Clone, Debug)]
pub struct EffectControl {
    pub entity: Entity,
    pub action: ControlAction,
    pub target: ControlTarget,
}

impl EffectControl {
    pub fn new(entity: Entity, action: ControlAction, target: ControlTarget) -> Self {
        Self {
            entity,
            action,
            target,
        }
    }
}

/// Apply one control action. Returns false when the named group or system
/// does not exist.
pub fn apply_control(effect: &mut Effect, action: ControlAction, target: &ControlTarget) -> bool {
    match target {
        ControlTarget::Effect => {
            match action {
                ControlAction::Start => effect.start(),
                ControlAction::Stop => effect.stop(),
                ControlAction::Reset => effect.reset(),
            }
            true
        }
        ControlTarget::Group(name) => {
            let Some(group) = effect.find_group_by_name(name) else {
                return false;
            };
            match action {
                ControlAction::Start => effect.start_node(group),
                ControlAction::Stop => effect.stop_node(group),
                ControlAction::Reset => effect.reset_node(group),
            }
            true
        }
        ControlTarget::System(name) => match action {
            ControlAction::Start => effect.start_system(name),
            ControlAction::Stop => effect.stop_system(name),
            ControlAction::Reset => match effect.find_node_by_name(name) {
                Some(node) if effect.find_system_by_name(name).is_some() => {
                    effect.reset_node(node);
                    true
                }
                _ => false,
            },
        },
    }
}

// ---------------------------------------------------------------------------
// Instantiation
// ---------------------------------------------------------------------------

pub(crate) fn instantiate_effects(
    mut commands: Commands,
    settings: Res<QuarksSettings>,
    effects: Res<Assets<QuarksEffectAsset>>,
    asset_server: Res<AssetServer>,
    render_assets: Res<QuarksRenderAssets>,
    mut meshes: ResMut<Assets<Mesh>>,
    transforms: TransformHelper,
    query: Query<(Entity, &QuarksEffect, &GlobalTransform), Without<EffectInstance>>,
) {
    for (entity, quarks, global) in &query {
        let Some(asset) = effects.get(&quarks.handle) else {
            continue;
        };
        let mut effect = asset.instantiate(settings.root_url.as_deref());
        // Freshly spawned entities have not been through propagation yet.
        let global = transforms.compute_global_transform(entity).unwrap_or(*global);
        effect.set_root_transform(to_simulation_space(global.affine()));
        if settings.auto_start {
            effect.start();
        }

        let pools = effect
            .systems()
            .map(|(node, emitter)| {
                let root = commands
                    .spawn((
                        Name::new(format!("{} particles", emitter.system.system().name())),
                        ParticlePoolRoot,
                        Transform::IDENTITY,
                        Visibility::Inherited,
                        ChildOf(entity),
                    ))
                    .id();
                let (mesh, mesh_revision) = match emitter.system.as_solid() {
                    Some(solid) => (
                        solid
                            .particle_mesh()
                            .map_or_else(|| render_assets.quad.clone(), |m| meshes.add(m.clone())),
                        solid.mesh_revision(),
                    ),
                    None => (render_assets.quad.clone(), 0),
                };
                SystemPool {
                    node,
                    root,
                    entities: Vec::new(),
                    mesh,
                    mesh_revision,
                    texture: emitter
                        .material
                        .texture
                        .as_ref()
                        .map(|t| load_texture(&asset_server, t)),
                    material: emitter.material.clone(),
                    materials: HashMap::default(),
                }
            })
            .collect::<Vec<_>>();

        info!("Spawned effect with {} particle pools", pools.len());
        commands.entity(entity).insert(EffectInstance {
            effect,
            pools,
            asset: quarks.handle.id(),
        });
    }
}

fn load_texture(asset_server: &AssetServer, texture: &TextureDescriptor) -> Handle<Image> {
    let sampler = texture.sampler.clone();
    asset_server.load_with_settings(texture.path.clone(), move |settings: &mut ImageLoaderSettings| {
        settings.sampler = ImageSampler::Descriptor(sampler.clone());
    })
}

/// Rebuild instances whose asset changed on disk.
pub(crate) fn reload_modified_effects(
    mut commands: Commands,
    mut events: MessageReader<AssetEvent<QuarksEffectAsset>>,
    query: Query<(Entity, &EffectInstance)>,
) {
    for event in events.read() {
        let AssetEvent::Modified { id } = event else {
            continue;
        };
        for (entity, instance) in &query {
            if instance.asset != *id {
                continue;
            }
            info!("Effect asset changed, rebuilding {entity}");
            for pool in &instance.pools {
                commands.entity(pool.root).try_despawn();
            }
            commands.entity(entity).remove::<EffectInstance>();
        }
    }
}

pub(crate) fn handle_effect_control(
    mut messages: MessageReader<EffectControl>,
    mut query: Query<&mut EffectInstance>,
) {
    for message in messages.read() {
        let Ok(mut instance) = query.get_mut(message.entity) else {
            warn!("Effect control for {} ignored: no effect instance", message.entity);
            continue;
        };
        if !apply_control(&mut instance.effect, message.action, &message.target) {
            warn!("Effect control target {:?} not found", message.target);
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

pub(crate) fn tick_effects(
    mut commands: Commands,
    time: Res<Time>,
    settings: Res<QuarksSettings>,
    mut query: Query<(Entity, &GlobalTransform, &mut EffectInstance)>,
) {
    let dt = settings.step(time.delta_secs());
    for (entity, global, mut instance) in &mut query {
        instance
            .effect
            .tick(dt, to_simulation_space(global.affine()));

        if finished(&instance.effect) {
            info!("Effect on {entity} finished, despawning");
            instance.effect.dispose();
            commands.entity(entity).despawn();
        }
    }
}

/// Every system has released itself.
fn finished(effect: &Effect) -> bool {
    let mut systems = effect.systems().peekable();
    systems.peek().is_some() && systems.all(|(_, e)| e.system.system().is_disposed())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Per-particle data handed to the entity sync, in engine world space.
struct ParticleDraw {
    transform: Transform,
    color: LinearRgba,
    cell: u32,
}

pub(crate) fn sync_particle_entities(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    cameras: Query<&GlobalTransform, With<Camera3d>>,
    mut instances: Query<(&GlobalTransform, &mut EffectInstance)>,
    mut roots: Query<&mut Transform, (With<ParticlePoolRoot>, Without<ParticleVisual>)>,
    mut visuals: Query<
        (&mut Transform, &mut Visibility, &mut MeshMaterial3d<StandardMaterial>),
        (With<ParticleVisual>, Without<ParticlePoolRoot>),
    >,
) {
    let camera = cameras.iter().next().map(GlobalTransform::compute_transform);

    for (global, mut instance) in &mut instances {
        let cancel_parent = Transform::from_matrix(global.affine().inverse().into());
        let EffectInstance { effect, pools, .. } = &mut *instance;

        for pool in pools.iter_mut() {
            let Some(system) = effect.node(pool.node).and_then(|n| n.system()) else {
                continue;
            };
            if let Ok(mut root) = roots.get_mut(pool.root) {
                *root = cancel_parent;
            }

            if let Some(solid) = system.as_solid()
                && solid.mesh_revision() != pool.mesh_revision
            {
                pool.mesh_revision = solid.mesh_revision();
                if let Some(mesh) = solid.particle_mesh() {
                    pool.mesh = meshes.add(mesh.clone());
                    for entity in pool.entities.drain(..) {
                        commands.entity(entity).try_despawn();
                    }
                }
            }

            let draws = particle_draws(system, camera.as_ref());
            let sprite = system
                .system()
                .config()
                .sprite
                .as_ref()
                .map(|s| (s.u_tiles.max(1), s.v_tiles.max(1)));

            for (i, draw) in draws.iter().enumerate() {
                let material = pool_material(pool, &mut materials, draw, sprite);
                match pool.entities.get(i) {
                    Some(&entity) => {
                        if let Ok((mut transform, mut visibility, mut handle)) = visuals.get_mut(entity) {
                            *transform = draw.transform;
                            *visibility = Visibility::Inherited;
                            if handle.0 != material {
                                handle.0 = material;
                            }
                        }
                    }
                    None => {
                        let entity = commands
                            .spawn((
                                ParticleVisual,
                                Mesh3d(pool.mesh.clone()),
                                MeshMaterial3d(material),
                                draw.transform,
                                Visibility::Inherited,
                                ChildOf(pool.root),
                            ))
                            .id();
                        pool.entities.push(entity);
                    }
                }
            }

            for &entity in pool.entities.iter().skip(draws.len()) {
                if let Ok((_, mut visibility, _)) = visuals.get_mut(entity) {
                    *visibility = Visibility::Hidden;
                }
            }
        }
    }
}

fn particle_draws(system: &ParticleSystem, camera: Option<&Transform>) -> Vec<ParticleDraw> {
    let to_engine = mirror_z() * system.system().simulation_to_world();

    if let Some(solid) = system.as_solid() {
        let mirror = Mat4::from(mirror_z());
        return solid
            .particles()
            .iter()
            .zip(solid.instances())
            .filter(|(p, _)| p.alive && p.visible)
            .map(|(p, instance)| ParticleDraw {
                transform: Transform::from_matrix(mirror * Mat4::from_cols_array_2d(&instance.model)),
                color: p.color,
                cell: p.cell,
            })
            .collect();
    }

    let config = system.system().config();
    system
        .system()
        .particles()
        .iter()
        .filter(|p| p.alive && p.visible)
        .map(|p| {
            let position = to_engine.transform_point3(p.position);
            let velocity = to_engine.transform_vector3(p.velocity);
            ParticleDraw {
                transform: Transform {
                    translation: position,
                    rotation: billboard_rotation(
                        config.billboard_mode,
                        position,
                        velocity,
                        camera,
                        -p.rotation.z,
                    ),
                    scale: p.scale,
                },
                color: p.color,
                cell: p.cell,
            }
        })
        .collect()
}

/// Orient a unit quad (facing +Z) toward the camera.
pub fn billboard_rotation(
    mode: BillboardMode,
    position: Vec3,
    velocity: Vec3,
    camera: Option<&Transform>,
    roll: f32,
) -> Quat {
    let Some(camera) = camera else {
        return Quat::from_rotation_z(roll);
    };
    let to_camera = (camera.translation - position).normalize_or_zero();
    match mode {
        BillboardMode::All => camera.rotation * Quat::from_rotation_z(roll),
        BillboardMode::Y => {
            let yaw = to_camera.x.atan2(to_camera.z);
            Quat::from_rotation_y(yaw) * Quat::from_rotation_z(roll)
        }
        BillboardMode::Stretched => {
            let up = velocity.normalize_or_zero();
            let right = up.cross(to_camera).normalize_or_zero();
            if right == Vec3::ZERO {
                return camera.rotation * Quat::from_rotation_z(roll);
            }
            let normal = right.cross(up);
            Quat::from_mat3(&Mat3::from_cols(right, up, normal))
        }
    }
}

/// Colors are quantized so a pool reuses a small set of materials.
pub fn material_key(color: LinearRgba, cell: u32) -> u64 {
    let q = |c: f32| (c.clamp(0.0, 4.0) * 63.0).round() as u64 & 0xff;
    q(color.red) | q(color.green) << 8 | q(color.blue) << 16 | q(color.alpha) << 24 | (cell as u64) << 32
}

fn tint(base: LinearRgba, color: LinearRgba) -> LinearRgba {
    LinearRgba::new(
        base.red * color.red,
        base.green * color.green,
        base.blue * color.blue,
        base.alpha * color.alpha,
    )
}

/// UV rectangle of one sprite sheet cell, row 0 at the top.
pub fn cell_uv(tiles: (u32, u32), cell: u32) -> Affine2 {
    let (u, v) = tiles;
    let (col, row) = (cell % u, (cell / u).min(v - 1));
    Affine2::from_scale_angle_translation(
        Vec2::new(1.0 / u as f32, 1.0 / v as f32),
        0.0,
        Vec2::new(col as f32 / u as f32, row as f32 / v as f32),
    )
}

fn pool_material(
    pool: &mut SystemPool,
    materials: &mut Assets<StandardMaterial>,
    draw: &ParticleDraw,
    sprite: Option<(u32, u32)>,
) -> Handle<StandardMaterial> {
    let cell = if sprite.is_some() { draw.cell } else { 0 };
    let key = material_key(draw.color, cell);
    let SystemPool {
        materials: cache,
        material,
        texture,
        ..
    } = pool;
    cache
        .entry(key)
        .or_insert_with(|| {
            let mut uv_transform = material
                .texture
                .as_ref()
                .map_or(Affine2::IDENTITY, |t| t.uv_transform);
            if let Some(tiles) = sprite {
                uv_transform = uv_transform * cell_uv(tiles, cell);
            }
            materials.add(StandardMaterial {
                base_color: Color::LinearRgba(tint(material.base_color, draw.color)),
                base_color_texture: texture.clone(),
                alpha_mode: material.alpha_mode(),
                unlit: material.unlit,
                double_sided: material.double_sided,
                cull_mode: None,
                uv_transform,
                ..default()
            })
        })
        .clone()
}
