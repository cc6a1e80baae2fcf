//! A few NPCs chasing a player that walks in circles.
//!
//! Run with `RUST_LOG=debug cargo run --example npc` to see every evaluation.
//! Set `NPC_CONFIG` to a YAML file to override the tuning parameters.

use std::ops::{Add, AddAssign, Mul, Sub};
use std::sync::Arc;
use std::time::Duration;

use fluent_behavior_tree::*;
use futures::future::BoxFuture;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Vec2 {
    x: f32,
    y: f32,
}

impl Vec2 {
    const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    fn angle(self) -> f32 {
        self.y.atan2(self.x)
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Tuning parameters read by the leaves. The tree itself never looks at these.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct NpcConfig {
    attack_force: f32,
    moving_force: f32,
    range_preparing_secs: f32,
    range_attack_secs: f32,
    relax_secs: f32,
    patrol_force: f32,
    patrol_torque: f32,
    /// Full width of the vision cone in degrees.
    view_angle: f32,
    view_distance: f32,
    drag: f32,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            attack_force: 10.,
            moving_force: 1.,
            range_preparing_secs: 1.,
            range_attack_secs: 2.,
            relax_secs: 3.,
            patrol_force: 0.2,
            patrol_torque: 1.,
            view_angle: 90.,
            view_distance: 10.,
            drag: 0.9,
        }
    }
}

struct Npc {
    name: String,
    config: Arc<NpcConfig>,
    ticks: Ticks,
    rng: StdRng,
    position: Vec2,
    velocity: Vec2,
    heading: f32,
    target_direction: Vec2,
    target_distance: f32,
}

const NO_TARGET: f32 = 1000.;

/// The player walks a circle of radius 6 around the origin, one lap per 20 seconds.
fn player_position(elapsed: Duration) -> Vec2 {
    let angle = elapsed.as_secs_f32() * std::f32::consts::TAU / 20.;
    Vec2::from_angle(angle) * 6.
}

impl Npc {
    fn dt(&self) -> f32 {
        self.ticks.current().delta.as_secs_f32()
    }

    fn add_force(&mut self, force: f32) {
        let dt = self.dt();
        self.velocity += Vec2::from_angle(self.heading) * (force * dt);
        self.velocity = self.velocity * self.config.drag.powf(dt);
        self.position += self.velocity * dt;
    }

    fn rotate_to_target(&mut self, speed: f32) {
        if self.target_distance >= NO_TARGET {
            return;
        }
        let wanted = self.target_direction.angle();
        let diff = (wanted - self.heading + std::f32::consts::PI).rem_euclid(std::f32::consts::TAU)
            - std::f32::consts::PI;
        self.heading += diff.clamp(-speed, speed) * self.dt();
    }
}

fn in_melee_range(npc: &Npc) -> bool {
    npc.target_distance < 1.
}

fn in_attack_range(npc: &Npc) -> bool {
    npc.target_distance < 3.
}

fn in_sight(npc: &Npc) -> bool {
    npc.target_distance < 8.
}

/// Look for the player inside the vision cone.
fn find_target(npc: &mut Npc) -> LeafResult {
    let player = player_position(npc.ticks.current().elapsed);
    let to_player = player - npc.position;
    let distance = to_player.length();

    let half_angle = npc.config.view_angle.to_radians() / 2.;
    let off_axis = (to_player.angle() - npc.heading + std::f32::consts::PI)
        .rem_euclid(std::f32::consts::TAU)
        - std::f32::consts::PI;

    if distance > npc.config.view_distance || off_axis.abs() > half_angle {
        npc.target_distance = NO_TARGET;
        return Ok(Outcome::Failed);
    }

    npc.target_distance = distance;
    npc.target_direction = if distance > 0. {
        to_player * (1. / distance)
    } else {
        Vec2::default()
    };
    Ok(Outcome::Succeeded)
}

fn melee_attack(npc: &mut Npc) -> LeafResult {
    npc.rotate_to_target(2.);
    npc.add_force(npc.config.attack_force);
    Ok(Outcome::Succeeded)
}

fn move_closer(npc: &mut Npc) -> LeafResult {
    npc.rotate_to_target(1.);
    npc.add_force(npc.config.moving_force);
    Ok(Outcome::Succeeded)
}

fn patrol(npc: &mut Npc) -> LeafResult {
    let angle: f32 = npc.rng.gen_range(-45.0_f32..45.0).to_radians();
    npc.heading += angle * npc.config.patrol_torque * npc.dt();
    npc.add_force(npc.config.patrol_force);
    Ok(Outcome::Succeeded)
}

/// Wind up, fire for a while, then rest. Spans many ticks.
fn range_attack<'a>(npc: &'a mut Npc, _cancel: &'a CancellationToken) -> BoxFuture<'a, LeafResult> {
    Box::pin(async move {
        let config = npc.config.clone();

        let start = npc.ticks.current().elapsed;
        loop {
            let tick = npc.ticks.next().await?;
            npc.rotate_to_target(2.);
            if (tick.elapsed - start).as_secs_f32() >= config.range_preparing_secs {
                break;
            }
        }

        if find_target(npc)?.is_failed() {
            info!(npc = %npc.name, "lost the target while preparing");
            return Ok(Outcome::Failed);
        }

        info!(npc = %npc.name, distance = npc.target_distance, "firing");
        let start = npc.ticks.current().elapsed;
        loop {
            let tick = npc.ticks.next().await?;
            npc.rotate_to_target(0.5);
            npc.add_force(config.attack_force);
            if (tick.elapsed - start).as_secs_f32() >= config.range_attack_secs {
                break;
            }
        }

        npc.ticks
            .wait(Duration::from_secs_f32(config.relax_secs))
            .await?;
        Ok(Outcome::Succeeded)
    })
}

const TREE: &str = r#"
# The NPC's whole repertoire, checked from the top every tick.
tree main = Selector {
    Sequence {
        FindTarget
        Engage
    }
    Patrol
}

tree Engage = Selector {
    if (InMeleeRange) { MeleeAttack }
    if (InAttackRange) { RangeAttack }
    if (InSight) { Move }
}
"#;

const DRIVER_CONFIG: &str = r#"
tick_interval_ms: 16
fault_policy: log
"#;

fn registry() -> Registry<Npc> {
    let mut registry = Registry::default();
    registry.register_instant("FindTarget", find_target);
    registry.register_instant("MeleeAttack", melee_attack);
    registry.register_action("RangeAttack", range_attack);
    registry.register_instant("Move", move_closer);
    registry.register_instant("Patrol", patrol);
    registry.register_condition("InMeleeRange", in_melee_range);
    registry.register_condition("InAttackRange", in_attack_range);
    registry.register_condition("InSight", in_sight);
    registry
}

fn load_config() -> anyhow::Result<NpcConfig> {
    match std::env::var("NPC_CONFIG") {
        Ok(path) => Ok(serde_yaml::from_str(&std::fs::read_to_string(path)?)?),
        Err(_) => Ok(NpcConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Arc::new(load_config()?);
    let driver_config: DriverConfig = serde_yaml::from_str(DRIVER_CONFIG)?;
    let tree = Arc::new(load_str(TREE, &registry())?);
    print!("{tree}");

    let engine = Engine::current()?;
    let mut drivers: Vec<_> = (0..3)
        .map(|i| {
            let source = TickSource::new();
            let npc = Npc {
                name: format!("Npc {i}"),
                config: config.clone(),
                ticks: source.subscribe(),
                rng: StdRng::seed_from_u64(i),
                position: Vec2::new(i as f32 * 3. - 3., -4.),
                velocity: Vec2::default(),
                heading: std::f32::consts::FRAC_PI_2,
                target_direction: Vec2::default(),
                target_distance: NO_TARGET,
            };
            Driver::new(
                engine.clone(),
                tree.clone(),
                SharedContext::new(npc),
                source,
                driver_config.clone(),
            )
        })
        .collect();

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        stopper.cancel();
    });

    let results =
        futures::future::join_all(drivers.iter_mut().map(|driver| driver.run(cancel.clone())))
            .await;

    for (driver, stats) in drivers.iter().zip(results) {
        let stats = stats?;
        let npc = driver.context().lock().await;
        println!(
            "{}: at ({:.1}, {:.1}), {} evaluations, {} ticks dropped, {} cut short",
            npc.name, npc.position.x, npc.position.y, stats.completed, stats.dropped, stats.cancelled
        );
    }
    Ok(())
}
