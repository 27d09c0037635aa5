use std::collections::HashMap;

use error_stack::Report;
use tracing::{debug, info, warn};

use crate::drawable::{Drawable, DrawableArena, DrawableHandle};
use crate::error::IndicatorError;
use crate::indicator::{
    Indicator, IndicatorKey, IndicatorParams, OutputLayout, build_indicator, check_order,
    compute,
};
use crate::model::{Candle, IndicatorOutput};

struct ActiveIndicator {
    indicator: Box<dyn Indicator>,
    /// One per output series, or a single marker set. Fixed for the lifetime
    /// of the entry.
    handles: Vec<DrawableHandle>,
    output: IndicatorOutput,
}

/// Owns the active indicator set, the latest candle snapshot and every
/// drawable the indicators feed.
///
/// All mutation goes through `add`, `update`, `remove` and `clear`. Recompute
/// is a pure function of the active set and the candle snapshot, so repeating
/// an `update` with the same candles leaves the drawables unchanged.
#[derive(Default)]
pub struct Orchestrator {
    order: Vec<IndicatorKey>,
    entries: HashMap<IndicatorKey, ActiveIndicator>,
    arena: DrawableArena,
    candles: Vec<Candle>,
    interval_secs: i64,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `key` with default parameters and draw it from `candles`.
    ///
    /// Returns `false` if the key was already active or its first computation
    /// failed; in the latter case the key stays inactive and may be retried.
    pub fn add(&mut self, key: IndicatorKey, candles: &[Candle], interval_secs: i64) -> bool {
        match self.add_with_params(key, &IndicatorParams::default(), candles, interval_secs) {
            Ok(added) => added,
            Err(e) => {
                warn!(indicator = %key, error = ?e, "failed to build indicator");
                false
            }
        }
    }

    /// Like [`Orchestrator::add`] with parameter overrides. Invalid parameters
    /// are returned as an error; computation failures are only logged.
    pub fn add_with_params(
        &mut self,
        key: IndicatorKey,
        params: &IndicatorParams,
        candles: &[Candle],
        interval_secs: i64,
    ) -> Result<bool, Report<IndicatorError>> {
        if self.entries.contains_key(&key) {
            debug!(indicator = %key, "indicator already active");
            return Ok(false);
        }
        let indicator = build_indicator(key, params)?;

        let output = match compute(indicator.as_ref(), candles, interval_secs) {
            Ok(output) => output,
            Err(e) => {
                warn!(indicator = %key, error = ?e, "indicator calculation failed, not added");
                return Ok(false);
            }
        };

        let handles: Vec<DrawableHandle> = match indicator.layout() {
            OutputLayout::Series(styles) => styles
                .into_iter()
                .map(|style| {
                    self.arena.insert(Drawable::Series {
                        style,
                        points: Vec::new(),
                    })
                })
                .collect(),
            OutputLayout::Markers => vec![self.arena.insert(Drawable::Markers {
                markers: Vec::new(),
            })],
        };
        apply_output(&mut self.arena, &handles, &output);

        info!(indicator = %key, handles = handles.len(), "indicator added");
        self.entries.insert(
            key,
            ActiveIndicator {
                indicator,
                handles,
                output,
            },
        );
        self.order.push(key);
        Ok(true)
    }

    /// Store a new candle snapshot and recompute every active indicator,
    /// overwriting the data of its existing drawables.
    ///
    /// A snapshot that is not strictly ascending by time is rejected before
    /// anything is stored, leaving the held candles and drawables as they
    /// were. An indicator whose computation fails keeps its previous drawables
    /// for this cycle; the others proceed.
    pub fn update(
        &mut self,
        candles: Vec<Candle>,
        interval_secs: i64,
    ) -> Result<(), Report<IndicatorError>> {
        check_order(&candles)?;
        self.candles = candles;
        self.interval_secs = interval_secs;

        for key in &self.order {
            let Some(entry) = self.entries.get_mut(key) else {
                continue;
            };
            match compute(entry.indicator.as_ref(), &self.candles, interval_secs) {
                Ok(output) => {
                    apply_output(&mut self.arena, &entry.handles, &output);
                    entry.output = output;
                }
                Err(e) => {
                    warn!(indicator = %key, error = ?e, "indicator calculation failed, keeping previous output");
                }
            }
        }
        debug!(
            candles = self.candles.len(),
            active = self.order.len(),
            "indicators recomputed"
        );
        Ok(())
    }

    /// Deactivate `key` and destroy its drawables. Returns `false` if it was not active.
    pub fn remove(&mut self, key: IndicatorKey) -> bool {
        let Some(entry) = self.entries.remove(&key) else {
            return false;
        };
        for handle in entry.handles {
            self.arena.remove(handle);
        }
        self.order.retain(|k| *k != key);
        info!(indicator = %key, "indicator removed");
        true
    }

    /// Deactivate everything.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            for handle in entry.handles {
                self.arena.remove(handle);
            }
        }
        self.order.clear();
        info!("all indicators cleared");
    }

    /// Active keys in the order they were added.
    pub fn active(&self) -> &[IndicatorKey] {
        &self.order
    }

    pub fn is_active(&self, key: IndicatorKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn handles(&self, key: IndicatorKey) -> Option<&[DrawableHandle]> {
        self.entries.get(&key).map(|e| e.handles.as_slice())
    }

    pub fn output(&self, key: IndicatorKey) -> Option<&IndicatorOutput> {
        self.entries.get(&key).map(|e| &e.output)
    }

    pub fn drawable(&self, handle: DrawableHandle) -> Option<&Drawable> {
        self.arena.get(handle)
    }

    /// Every live drawable, grouped by indicator in activation order.
    pub fn drawables(&self) -> impl Iterator<Item = (IndicatorKey, &Drawable)> + '_ {
        self.order.iter().flat_map(move |key| {
            self.entries
                .get(key)
                .into_iter()
                .flat_map(|e| e.handles.iter())
                .filter_map(move |h| self.arena.get(*h).map(|d| (*key, d)))
        })
    }

    pub fn drawable_count(&self) -> usize {
        self.arena.len()
    }

    /// Latest candle snapshot passed to [`Orchestrator::update`].
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn interval_secs(&self) -> i64 {
        self.interval_secs
    }
}

/// Copy `output` into the drawables behind `handles`. Slots the output does
/// not cover are cleared.
fn apply_output(arena: &mut DrawableArena, handles: &[DrawableHandle], output: &IndicatorOutput) {
    match output {
        IndicatorOutput::Series(series) => {
            for (i, handle) in handles.iter().enumerate() {
                if let Some(Drawable::Series { points, .. }) = arena.get_mut(*handle) {
                    *points = series.get(i).map(|s| s.points.clone()).unwrap_or_default();
                }
            }
        }
        IndicatorOutput::Markers(markers) => {
            for handle in handles {
                if let Some(Drawable::Markers { markers: slot }) = arena.get_mut(*handle) {
                    *slot = markers.clone();
                }
            }
        }
    }
}
