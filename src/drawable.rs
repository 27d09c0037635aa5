use serde::Serialize;

use crate::model::{Marker, OutputPoint, SeriesStyle};

/// Opaque reference to a drawable owned by a [`DrawableArena`].
///
/// A handle outlives its drawable harmlessly: once the slot is freed the
/// generation moves on and lookups with the stale handle return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DrawableHandle {
    index: usize,
    generation: u64,
}

/// Data handed to the renderer for one overlay element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Drawable {
    Series {
        style: SeriesStyle,
        points: Vec<OutputPoint>,
    },
    Markers {
        markers: Vec<Marker>,
    },
}

impl Drawable {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Series { points, .. } => points.is_empty(),
            Self::Markers { markers } => markers.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    drawable: Option<Drawable>,
}

/// Generational slot storage for drawables.
#[derive(Debug, Default)]
pub struct DrawableArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    len: usize,
}

impl DrawableArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, drawable: Drawable) -> DrawableHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.drawable = Some(drawable);
            return DrawableHandle {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            drawable: Some(drawable),
        });
        DrawableHandle {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    pub fn get(&self, handle: DrawableHandle) -> Option<&Drawable> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.drawable.as_ref())
    }

    pub fn get_mut(&mut self, handle: DrawableHandle) -> Option<&mut Drawable> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.drawable.as_mut())
    }

    pub fn remove(&mut self, handle: DrawableHandle) -> Option<Drawable> {
        let slot = self
            .slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)?;
        let drawable = slot.drawable.take()?;
        slot.generation += 1;
        self.free.push(handle.index);
        self.len -= 1;
        Some(drawable)
    }

    /// Number of live drawables.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
