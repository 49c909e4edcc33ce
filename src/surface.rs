//! Surface ownership: resolution-correct backing store and resize detection.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::core::{MAX_RASTER_EDGE, Raster, SurfaceDescriptor};
use crate::error::{EffectError, EffectResult};

const RESIZE_DEBOUNCE_MS: f64 = 100.0;
const RESIZE_POLL_MS: f64 = 500.0;

/// Which size-change notifications the surface's host can deliver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceCaps {
    /// An element/container size-observation API exists.
    pub size_observer: bool,
    /// Window-level resize events exist.
    pub window_events: bool,
}

/// A drawable surface handle. The one hard requirement is `backing()`; a
/// handle that cannot yield a backing store fails construction with
/// `InvalidSurface`.
pub trait SurfaceHandle {
    /// Layout box in CSS pixels.
    fn layout_size(&self) -> (f64, f64);
    /// Device-pixel ratio as reported by the host. May be garbage; the
    /// manager falls back to 1.0.
    fn pixel_density(&self) -> f64;
    fn capabilities(&self) -> SurfaceCaps {
        SurfaceCaps::default()
    }
    fn set_css_size(&mut self, width: f64, height: f64);
    fn set_backing_size(&mut self, width: u32, height: u32) -> EffectResult<()>;
    fn backing(&mut self) -> EffectResult<&mut Raster>;
}

#[derive(Debug)]
struct Geometry {
    layout: (f64, f64),
    density: f64,
}

/// Shared view of a surface's layout geometry; lets a harness resize the
/// surface while the effect owns the handle.
#[derive(Clone, Debug)]
pub struct SurfaceGeometry {
    inner: Arc<Mutex<Geometry>>,
}

impl SurfaceGeometry {
    pub fn new(width: f64, height: f64, density: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Geometry {
                layout: (width, height),
                density,
            })),
        }
    }

    pub fn set_layout(&self, width: f64, height: f64) {
        self.inner.lock().unwrap().layout = (width, height);
    }

    pub fn set_density(&self, density: f64) {
        self.inner.lock().unwrap().density = density;
    }

    fn layout(&self) -> (f64, f64) {
        self.inner.lock().unwrap().layout
    }

    fn density(&self) -> f64 {
        self.inner.lock().unwrap().density
    }
}

/// Plain in-memory surface: a raster plus host-reported geometry.
pub struct MemorySurface {
    geometry: SurfaceGeometry,
    caps: SurfaceCaps,
    css_size: (f64, f64),
    backing: Raster,
}

impl MemorySurface {
    pub fn new(width: f64, height: f64, density: f64) -> Self {
        Self::with_geometry(SurfaceGeometry::new(width, height, density), SurfaceCaps::default())
    }

    pub fn with_geometry(geometry: SurfaceGeometry, caps: SurfaceCaps) -> Self {
        let (w, h) = geometry.layout();
        Self {
            geometry,
            caps,
            css_size: (w, h),
            backing: Raster::default(),
        }
    }
}

impl SurfaceHandle for MemorySurface {
    fn layout_size(&self) -> (f64, f64) {
        self.geometry.layout()
    }

    fn pixel_density(&self) -> f64 {
        self.geometry.density()
    }

    fn capabilities(&self) -> SurfaceCaps {
        self.caps
    }

    fn set_css_size(&mut self, width: f64, height: f64) {
        self.css_size = (width, height);
    }

    fn set_backing_size(&mut self, width: u32, height: u32) -> EffectResult<()> {
        if self.backing.width() != width || self.backing.height() != height {
            self.backing = Raster::new(width, height)?;
        }
        Ok(())
    }

    fn backing(&mut self) -> EffectResult<&mut Raster> {
        Ok(&mut self.backing)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResizeStrategy {
    /// Host pushes precise size-observation events.
    Observer,
    /// Host window resize events, debounced.
    WindowEvents,
    /// Last resort: periodic re-measure.
    Poll,
}

/// Owns the surface handle, keeps backing = layout × density current, and
/// reports size changes through whichever notification strategy the host
/// supports best. Exactly one strategy is active at a time.
pub struct SurfaceManager {
    handle: Box<dyn SurfaceHandle>,
    desc: SurfaceDescriptor,
    strategy: ResizeStrategy,
    observer_pending: bool,
    debounce_deadline: Option<f64>,
    next_poll_at: f64,
    disposed: bool,
}

impl SurfaceManager {
    pub fn new(mut handle: Box<dyn SurfaceHandle>) -> EffectResult<Self> {
        let desc = configure(handle.as_mut())?;
        let caps = handle.capabilities();
        let strategy = if caps.size_observer {
            ResizeStrategy::Observer
        } else if caps.window_events {
            ResizeStrategy::WindowEvents
        } else {
            ResizeStrategy::Poll
        };
        debug!(?strategy, ?desc, "surface configured");

        Ok(Self {
            handle,
            desc,
            strategy,
            observer_pending: false,
            debounce_deadline: None,
            next_poll_at: 0.0,
            disposed: false,
        })
    }

    pub fn dimensions(&self) -> SurfaceDescriptor {
        self.desc
    }

    pub fn backing(&mut self) -> EffectResult<&mut Raster> {
        if self.disposed {
            return Err(EffectError::invalid_surface("surface manager disposed"));
        }
        self.handle.backing()
    }

    /// Size-observation event from the host. Effective only under the
    /// observer strategy.
    pub fn observer_event(&mut self) {
        if !self.disposed && self.strategy == ResizeStrategy::Observer {
            self.observer_pending = true;
        }
    }

    /// Window-level resize event from the host. Arms the 100 ms debounce
    /// under the window-events strategy.
    pub fn window_resize_event(&mut self, now_ms: f64) {
        if !self.disposed && self.strategy == ResizeStrategy::WindowEvents {
            self.debounce_deadline = Some(now_ms + RESIZE_DEBOUNCE_MS);
        }
    }

    /// Per-frame pump. Returns the new descriptor when the active strategy
    /// observed a change beyond the 1 px / 0.1 density thresholds.
    pub fn poll(&mut self, now_ms: f64) -> EffectResult<Option<SurfaceDescriptor>> {
        if self.disposed {
            return Ok(None);
        }

        let due = match self.strategy {
            ResizeStrategy::Observer => std::mem::take(&mut self.observer_pending),
            ResizeStrategy::WindowEvents => match self.debounce_deadline {
                Some(deadline) if now_ms >= deadline => {
                    self.debounce_deadline = None;
                    true
                }
                _ => false,
            },
            ResizeStrategy::Poll => {
                if now_ms >= self.next_poll_at {
                    self.next_poll_at = now_ms + RESIZE_POLL_MS;
                    true
                } else {
                    false
                }
            }
        };
        if !due {
            return Ok(None);
        }

        let current = measure(self.handle.as_ref());
        if !current.differs_from(&self.desc) {
            return Ok(None);
        }

        self.desc = configure(self.handle.as_mut())?;
        debug!(desc = ?self.desc, "surface resized");
        Ok(Some(self.desc))
    }

    /// Re-read layout and re-apply configuration unconditionally, bypassing
    /// debounce and thresholds.
    pub fn force_refresh(&mut self) -> EffectResult<SurfaceDescriptor> {
        if self.disposed {
            return Err(EffectError::invalid_surface("surface manager disposed"));
        }
        self.debounce_deadline = None;
        self.observer_pending = false;
        self.desc = configure(self.handle.as_mut())?;
        Ok(self.desc)
    }

    /// Detach from the host and clear the surface. All further calls are
    /// no-ops (or errors where a value is required).
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.debounce_deadline = None;
        self.observer_pending = false;
        if let Ok(backing) = self.handle.backing() {
            backing.clear();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

fn measure(handle: &dyn SurfaceHandle) -> SurfaceDescriptor {
    let (mut w, mut h) = handle.layout_size();
    if !w.is_finite() || w <= 0.0 {
        w = 1.0;
    }
    if !h.is_finite() || h <= 0.0 {
        h = 1.0;
    }

    let mut density = handle.pixel_density();
    if !density.is_finite() || density <= 0.0 {
        density = 1.0;
    }

    let backing_w = ((w * density).round() as u32).clamp(1, MAX_RASTER_EDGE);
    let backing_h = ((h * density).round() as u32).clamp(1, MAX_RASTER_EDGE);

    SurfaceDescriptor {
        display_width: w,
        display_height: h,
        backing_width: backing_w,
        backing_height: backing_h,
        pixel_density: density,
    }
}

fn configure(handle: &mut dyn SurfaceHandle) -> EffectResult<SurfaceDescriptor> {
    let desc = measure(handle);
    if f64::from(desc.backing_width) < desc.display_width * desc.pixel_density - 1.0 {
        warn!(
            "backing width capped at {} device pixels (layout {} x density {})",
            desc.backing_width, desc.display_width, desc.pixel_density
        );
    }

    handle.set_css_size(desc.display_width, desc.display_height);
    handle.set_backing_size(desc.backing_width, desc.backing_height)?;
    handle
        .backing()
        .map_err(|e| EffectError::invalid_surface(format!("no drawable backing store: {e}")))?;
    Ok(desc)
}
