use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scene::{MeshType, Rgb, SceneItem, Vec3, WorkingCopy};
use crate::sync::damping::{damp, damp_vec3, rate_from_half_life};

// ── Configuration ───────────────────────────────────────────────────────────

/// How material color follows its target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorMode {
    /// Assign the target color directly.
    Snap,
    /// Damp each channel in RGB space. Colors that are not hex strings snap.
    Linear { half_life: Duration },
}

/// Interpolation settings for the render binder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Smoothing {
    Enabled {
        position_half_life: Duration,
        rotation_half_life: Duration,
        color: ColorMode,
    },
    /// Position, rotation and color are assigned directly every tick.
    Disabled,
}

impl Default for Smoothing {
    fn default() -> Self {
        Smoothing::Enabled {
            position_half_life: Duration::from_millis(120),
            rotation_half_life: Duration::from_millis(120),
            color: ColorMode::Snap,
        }
    }
}

// ── Visual objects ──────────────────────────────────────────────────────────

/// Live render-side state of one scene item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualObject {
    pub name: String,
    pub mesh_type: MeshType,
    pub position: Vec3,
    pub rotation: Vec3,
    /// Material color as last written; `None` is the default material.
    pub color: Option<String>,
    /// Unquantized RGB used while color damping is in progress.
    #[serde(skip)]
    tint: Option<[f32; 3]>,
}

impl VisualObject {
    /// Instantiates a visual with the item's current values, the way a
    /// declarative layer mounts a mesh with its props.
    pub fn from_item(item: &SceneItem) -> Self {
        Self {
            name: item.id.clone(),
            mesh_type: item.mesh_type,
            position: item.position,
            rotation: item.rotation,
            color: item.color.clone(),
            tint: None,
        }
    }
}

/// Lookup of live visual objects by item id.
pub trait VisualScene {
    fn visual_mut(&mut self, id: &str) -> Option<&mut VisualObject>;
}

impl VisualScene for HashMap<String, VisualObject> {
    fn visual_mut(&mut self, id: &str) -> Option<&mut VisualObject> {
        self.get_mut(id)
    }
}

/// In-memory visual scene used by the headless viewer and tests.
#[derive(Clone, Debug, Default)]
pub struct HeadlessScene {
    objects: HashMap<String, VisualObject>,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates visuals for items that have none yet. Existing visuals are
    /// left alone, and visuals whose item disappeared are not removed.
    /// Returns how many objects were created.
    pub fn instantiate(&mut self, items: &[SceneItem]) -> usize {
        let mut created = 0;
        for item in items {
            if !self.objects.contains_key(&item.id) {
                self.objects
                    .insert(item.id.clone(), VisualObject::from_item(item));
                created += 1;
            }
        }
        created
    }

    pub fn insert(&mut self, object: VisualObject) {
        self.objects.insert(object.name.clone(), object);
    }

    pub fn get(&self, id: &str) -> Option<&VisualObject> {
        self.objects.get(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects sorted by name, for stable output.
    pub fn objects(&self) -> Vec<&VisualObject> {
        let mut objects: Vec<_> = self.objects.values().collect();
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        objects
    }
}

impl VisualScene for HeadlessScene {
    fn visual_mut(&mut self, id: &str) -> Option<&mut VisualObject> {
        self.objects.get_mut(id)
    }
}

// ── Binder ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Items whose visual was updated.
    pub bound: usize,
    /// Items with no visual yet.
    pub pending: usize,
    /// Bound items whose visual has not reached its target yet.
    pub moving: usize,
}

/// Advances live visuals toward the working copy once per render tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderBinder {
    smoothing: Smoothing,
}

impl RenderBinder {
    pub fn new(smoothing: Smoothing) -> Self {
        Self { smoothing }
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    pub fn tick<S: VisualScene + ?Sized>(
        &self,
        working: &WorkingCopy,
        scene: &mut S,
        dt: Duration,
    ) -> TickReport {
        let dt = dt.as_secs_f32();
        let mut report = TickReport::default();

        for target in working.items() {
            // Not instantiated yet; picked up on a later tick.
            let Some(visual) = scene.visual_mut(&target.id) else {
                report.pending += 1;
                continue;
            };

            match self.smoothing {
                Smoothing::Disabled => {
                    visual.position = target.position;
                    visual.rotation = target.rotation;
                    snap_color(visual, target.color.as_deref());
                }
                Smoothing::Enabled {
                    position_half_life,
                    rotation_half_life,
                    color,
                } => {
                    visual.position = damp_vec3(
                        visual.position,
                        target.position,
                        rate_from_half_life(position_half_life.as_secs_f32()),
                        dt,
                    );
                    visual.rotation = damp_vec3(
                        visual.rotation,
                        target.rotation,
                        rate_from_half_life(rotation_half_life.as_secs_f32()),
                        dt,
                    );
                    match color {
                        ColorMode::Snap => snap_color(visual, target.color.as_deref()),
                        ColorMode::Linear { half_life } => damp_color(
                            visual,
                            target.color.as_deref(),
                            rate_from_half_life(half_life.as_secs_f32()),
                            dt,
                        ),
                    }
                }
            }
            report.bound += 1;
            if visual.position != target.position
                || visual.rotation != target.rotation
                || visual.tint.is_some()
            {
                report.moving += 1;
            }
        }

        report
    }
}

fn snap_color(visual: &mut VisualObject, target: Option<&str>) {
    visual.tint = None;
    if visual.color.as_deref() != target {
        visual.color = target.map(str::to_owned);
    }
}

fn damp_color(visual: &mut VisualObject, target: Option<&str>, rate: f32, dt: f32) {
    let Some(goal) = target.and_then(Rgb::from_hex) else {
        snap_color(visual, target);
        return;
    };
    let current = visual
        .tint
        .or_else(|| visual.color.as_deref().and_then(Rgb::from_hex).map(Rgb::to_unit));
    let Some(current) = current else {
        snap_color(visual, target);
        return;
    };

    let goal = goal.to_unit();
    let next = [
        damp(current[0], goal[0], rate, dt),
        damp(current[1], goal[1], rate, dt),
        damp(current[2], goal[2], rate, dt),
    ];
    if next == goal {
        snap_color(visual, target);
    } else {
        visual.tint = Some(next);
        visual.color = Some(Rgb::from_unit(next).to_hex());
    }
}
