//! Scene data model: items, colors, partial patches and the id-indexed
//! working copy they are merged into.

pub mod color;
pub mod item;
pub mod patch;
pub mod working_copy;

pub use color::Rgb;
pub use item::{MeshType, Scene, SceneItem, Vec3};
pub use patch::{parse_batch, DeltaPatch, PatchBatch};
pub use working_copy::WorkingCopy;
