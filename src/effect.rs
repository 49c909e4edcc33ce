//! The effect root: owns surface, noise, mask, and clock, and composites the
//! scrolling noise through the text mask on every animation tick.

use tracing::{debug, warn};

use crate::clock::TickClock;
use crate::composite;
use crate::config::{EffectConfig, EffectOptions, ValidationMode, normalize_text};
use crate::core::Raster;
use crate::error::{EffectError, EffectResult};
use crate::host::HostEnv;
use crate::mask::{Mask, MaskBuilder};
use crate::noise::NoiseField;
use crate::surface::{SurfaceHandle, SurfaceManager};

/// Consecutive per-tick render failures tolerated before the animation is
/// stopped instead of spinning.
pub const MAX_CONSECUTIVE_RENDER_FAILURES: u32 = 5;

const HOUSEKEEPING_TICK_INTERVAL: u64 = 10_000;
const HOUSEKEEPING_MS_INTERVAL: f64 = 5.0 * 60.0 * 1000.0;
/// Font-memo entries tolerated between housekeeping passes. Kept below the
/// memo's own insert-time capacity so the periodic pass is the one that
/// normally clears it.
const FONT_MEMO_TRIM_THRESHOLD: usize = 32;

pub struct Effect {
    config: EffectConfig,
    mode: ValidationMode,
    warnings: Vec<String>,

    surface: SurfaceManager,
    noise: NoiseField,
    masker: MaskBuilder,
    clock: TickClock,

    mask: Mask,
    tile: Raster,
    scroll_buf: Raster,
    composite_buf: Raster,
    mask_generation: u64,
    tile_generation: u64,

    consecutive_failures: u32,
    ticks_seen: u64,
    last_housekeeping_ms: f64,
    destroyed: bool,
}

impl Effect {
    /// Construct over `handle` with clamp-with-warnings option resolution.
    pub fn new(
        handle: Box<dyn SurfaceHandle>,
        host: HostEnv,
        options: EffectOptions,
    ) -> EffectResult<Self> {
        Self::with_mode(handle, host, options, ValidationMode::Clamp)
    }

    pub fn with_mode(
        handle: Box<dyn SurfaceHandle>,
        host: HostEnv,
        options: EffectOptions,
        mode: ValidationMode,
    ) -> EffectResult<Self> {
        let (config, warnings) = EffectConfig::resolve(&options, mode)?;

        let surface = SurfaceManager::new(handle)?;
        let noise = match host.noise_seed {
            Some(seed) => NoiseField::with_seed(config.cell_size, seed)?,
            None => NoiseField::new(config.cell_size)?,
        };
        let masker = MaskBuilder::new(host.text);
        let mut clock = TickClock::new(host.clock, host.scheduler, host.fallback_scheduler);
        clock.set_step_interval(config.step_ms)?;

        let mut effect = Self {
            config,
            mode,
            warnings,
            surface,
            noise,
            masker,
            clock,
            mask: Mask::default(),
            tile: Raster::default(),
            scroll_buf: Raster::default(),
            composite_buf: Raster::default(),
            mask_generation: 0,
            tile_generation: 0,
            consecutive_failures: 0,
            ticks_seen: 0,
            last_housekeeping_ms: 0.0,
            destroyed: false,
        };
        effect.regenerate()?;
        Ok(effect)
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    /// Sanitization warnings accumulated since construction.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn dimensions(&self) -> crate::core::SurfaceDescriptor {
        self.surface.dimensions()
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    pub fn offset(&self) -> u64 {
        self.clock.offset()
    }

    /// Bumped every time the mask is rebuilt; identity check for harnesses.
    pub fn mask_generation(&self) -> u64 {
        self.mask_generation
    }

    pub fn tile_generation(&self) -> u64 {
        self.tile_generation
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Copy of the surface backing store, for presentation or inspection.
    pub fn snapshot(&mut self) -> EffectResult<Raster> {
        self.ensure_alive()?;
        Ok(self.surface.backing()?.clone())
    }

    pub fn start(&mut self) -> EffectResult<()> {
        self.ensure_alive()?;
        self.clock.start()
    }

    pub fn stop(&mut self) -> EffectResult<()> {
        self.ensure_alive()?;
        self.clock.stop();
        Ok(())
    }

    pub fn pause(&mut self) -> EffectResult<()> {
        self.ensure_alive()?;
        self.clock.pause();
        Ok(())
    }

    pub fn resume(&mut self) -> EffectResult<()> {
        self.ensure_alive()?;
        self.clock.resume()
    }

    /// Tear down every owned resource. Idempotent; all other operations fail
    /// with `InstanceDestroyed` afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.clock.destroy();
        self.surface.dispose();
        self.masker.invalidate_memo();
        self.mask = Mask::default();
        self.tile = Raster::default();
        self.scroll_buf = Raster::default();
        self.composite_buf = Raster::default();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Replace the displayed text. Identical (normalized) text is a no-op;
    /// otherwise the mask and tile are regenerated with running state and
    /// offset preserved.
    pub fn set_text(&mut self, text: &str) -> EffectResult<()> {
        self.ensure_alive()?;

        let (normalized, truncation) = normalize_text(text);
        if let Some(w) = truncation {
            self.warnings.push(w);
        }
        if normalized == self.config.text {
            return Ok(());
        }

        let was_running = self.clock.is_running();
        self.clock.pause();
        self.config.text = normalized;
        let result = self.regenerate();

        if was_running {
            if let Err(e) = self.clock.resume() {
                warn!("failed to resume after text change: {e}");
            }
        }
        result
    }

    /// Merge and validate a partial configuration update, reacting only to
    /// the deltas that matter.
    pub fn update_config(&mut self, patch: &EffectOptions) -> EffectResult<()> {
        self.ensure_alive()?;

        let (next, warnings) = self.config.apply(patch, self.mode)?;
        self.warnings.extend(warnings);
        if next == self.config {
            return Ok(());
        }

        if next.step_ms != self.config.step_ms {
            self.clock.set_step_interval(next.step_ms)?;
        }

        let retile = next.cell_size != self.config.cell_size;
        let remask = self.config.mask_affected_by(&next);
        self.config = next;

        if retile {
            self.noise.set_cell_size(self.config.cell_size)?;
        }

        if remask {
            self.masker.invalidate_memo();
            let was_running = self.clock.is_running();
            self.clock.pause();
            let result = self.regenerate();
            if was_running {
                if let Err(e) = self.clock.resume() {
                    warn!("failed to resume after config change: {e}");
                }
            }
            return result;
        }

        if retile {
            self.tile = self
                .noise
                .aligned_tile(self.mask.width().max(1), self.mask.height().max(1))?;
            self.tile_generation += 1;
        }
        Ok(())
    }

    /// Host frame entry point: pump resize detection, advance the clock, and
    /// render when a step was consumed. Render failures are contained here;
    /// only scheduling failures and the consecutive-failure threshold halt
    /// the animation.
    #[tracing::instrument(skip(self))]
    pub fn on_host_frame(&mut self) -> EffectResult<()> {
        self.ensure_alive()?;
        let now = self.clock.now_ms();

        match self.surface.poll(now) {
            Ok(Some(desc)) => {
                debug!(?desc, "resize observed");
                self.handle_resize();
            }
            Ok(None) => {}
            Err(e) => warn!("resize poll failed: {e}"),
        }

        let Some(offset) = self.clock.on_host_frame()? else {
            return Ok(());
        };

        match self.render_tick(offset) {
            Ok(()) => {
                self.consecutive_failures = 0;
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "tick render failed ({}/{}): {e}",
                    self.consecutive_failures, MAX_CONSECUTIVE_RENDER_FAILURES
                );
                if self.consecutive_failures >= MAX_CONSECUTIVE_RENDER_FAILURES {
                    self.clock.stop();
                    return Err(EffectError::degraded(format!(
                        "animation stopped after {MAX_CONSECUTIVE_RENDER_FAILURES} consecutive render failures"
                    )));
                }
            }
        }

        self.ticks_seen += 1;
        self.housekeeping(now);
        Ok(())
    }

    /// Window resize event from the host (debounced path).
    pub fn window_resize_event(&mut self) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now_ms();
        self.surface.window_resize_event(now);
    }

    /// Size-observer event from the host.
    pub fn observer_event(&mut self) {
        if !self.destroyed {
            self.surface.observer_event();
        }
    }

    /// Synchronously re-read the surface and rebuild dependent state.
    pub fn force_refresh(&mut self) -> EffectResult<()> {
        self.ensure_alive()?;
        self.surface.force_refresh()?;
        self.handle_resize();
        Ok(())
    }

    fn ensure_alive(&self) -> EffectResult<()> {
        if self.destroyed {
            return Err(EffectError::InstanceDestroyed);
        }
        Ok(())
    }

    /// Rebuild mask, then tile (tile dimensions derive from the mask's), then
    /// the offscreen buffers.
    fn regenerate(&mut self) -> EffectResult<()> {
        let desc = self.surface.dimensions();
        let viewport_w = (desc.display_width.round() as u32).max(1);
        let viewport_h = (desc.display_height.round() as u32).max(1);

        self.mask = self.masker.build_mask(
            &self.config.text,
            self.config.mask_block_size,
            viewport_w,
            viewport_h,
            &self.config,
        );
        self.mask_generation += 1;

        self.tile = self
            .noise
            .aligned_tile(self.mask.width().max(1), self.mask.height().max(1))?;
        self.tile_generation += 1;

        self.scroll_buf = Raster::new(self.mask.width(), self.mask.height())?;
        self.composite_buf = Raster::new(self.mask.width(), self.mask.height())?;
        Ok(())
    }

    /// Pause-bracketed resize reaction. Errors are logged, not propagated;
    /// if the animation was running a best-effort restart is attempted.
    fn handle_resize(&mut self) {
        let was_running = self.clock.is_running();
        self.clock.pause();

        if let Err(e) = self.regenerate() {
            warn!("resize regeneration failed: {e}");
        }
        if was_running {
            if self.clock.resume().is_err() && self.clock.start().is_err() {
                warn!("could not restart animation after resize");
            }
        }
    }

    fn render_tick(&mut self, offset: u64) -> EffectResult<()> {
        let desc = self.surface.dimensions();
        let density = desc.pixel_density;

        // Full-canvas background static, straight onto the backing store.
        let backing = self.surface.backing()?;
        self.noise.render_direct(backing, density);

        let tile_h = u64::from(self.tile.height().max(1));
        let moving_offset = (offset * u64::from(self.config.step_pixels) % tile_h) as i64;

        // Seamless vertical scroll: cover the buffer starting one tile above.
        self.scroll_buf.clear();
        let mut y = -(tile_h as i64) + moving_offset;
        while y < i64::from(self.scroll_buf.height()) {
            composite::copy_into(&mut self.scroll_buf, &self.tile, 0, y);
            y += tile_h as i64;
        }

        // Cut the scroll to the text silhouette.
        self.composite_buf
            .data_mut()
            .copy_from_slice(self.scroll_buf.data());
        composite::mask_in_place(self.composite_buf.data_mut(), self.mask.raster().data())?;

        // Centered placement, snapped to the mask-block grid so edges never
        // straddle blocks.
        let block = f64::from(self.config.mask_block_size.max(1));
        let cx = (desc.display_width - f64::from(self.mask.width())) / 2.0;
        let cy = (desc.display_height - f64::from(self.mask.height())) / 2.0;
        let px = (cx / block).round() * block;
        let py = (cy / block).round() * block;

        let backing = self.surface.backing()?;
        composite::blit_over_scaled(
            backing,
            &self.composite_buf,
            (px * density).round() as i64,
            (py * density).round() as i64,
            density,
        );
        Ok(())
    }

    fn housekeeping(&mut self, now_ms: f64) {
        let due_by_ticks =
            self.ticks_seen > 0 && self.ticks_seen % HOUSEKEEPING_TICK_INTERVAL == 0;
        let due_by_time = now_ms - self.last_housekeeping_ms >= HOUSEKEEPING_MS_INTERVAL;
        if due_by_ticks || due_by_time {
            self.masker.trim_memo(FONT_MEMO_TRIM_THRESHOLD);
            self.last_housekeeping_ms = now_ms;
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("config", &self.config)
            .field("state", &self.clock.state())
            .field("offset", &self.clock.offset())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}
