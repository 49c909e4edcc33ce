use staticfill::host::{FakeClock, ManualScheduler, TimerScheduler};
use staticfill::surface::{MemorySurface, SurfaceCaps, SurfaceGeometry};
use staticfill::text::BlockGlyphRasterizer;
use staticfill::{Effect, EffectError, EffectOptions, HostEnv, ValidationMode};

fn host(clock: &FakeClock) -> HostEnv {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    HostEnv {
        clock: Box::new(clock.clone()),
        scheduler: Box::new(TimerScheduler::default()),
        fallback_scheduler: None,
        text: Box::new(BlockGlyphRasterizer),
        noise_seed: Some(42),
    }
}

fn effect_over(geometry: SurfaceGeometry, caps: SurfaceCaps, clock: &FakeClock) -> Effect {
    let surface = MemorySurface::with_geometry(geometry, caps);
    Effect::new(Box::new(surface), host(clock), EffectOptions::default()).unwrap()
}

#[test]
fn resize_mid_animation_rebuilds_and_keeps_running() {
    let clock = FakeClock::new();
    let geometry = SurfaceGeometry::new(800.0, 600.0, 1.0);
    let caps = SurfaceCaps {
        size_observer: true,
        ..Default::default()
    };
    let mut effect = effect_over(geometry.clone(), caps, &clock);

    effect.start().unwrap();
    for _ in 0..3 {
        clock.advance(32.0);
        effect.on_host_frame().unwrap();
    }
    let offset_before = effect.offset();
    let mask_gen = effect.mask_generation();
    assert_eq!(offset_before, 3);

    geometry.set_layout(500.0, 400.0);
    effect.observer_event();
    clock.advance(32.0);
    effect.on_host_frame().unwrap();

    assert!(effect.is_running(), "resize must not stop the animation");
    assert_eq!(effect.mask_generation(), mask_gen + 1, "mask rebuilt for new viewport");
    assert!(effect.offset() >= offset_before, "offset survives the resize");

    let desc = effect.dimensions();
    assert_eq!(desc.backing_width, 500);
    assert_eq!(desc.backing_height, 400);
}

#[test]
fn density_change_scales_the_backing_store() {
    let clock = FakeClock::new();
    let geometry = SurfaceGeometry::new(400.0, 300.0, 1.0);
    let caps = SurfaceCaps {
        size_observer: true,
        ..Default::default()
    };
    let mut effect = effect_over(geometry.clone(), caps, &clock);

    geometry.set_density(2.0);
    effect.observer_event();
    clock.advance(32.0);
    effect.on_host_frame().unwrap();

    let desc = effect.dimensions();
    assert_eq!(desc.pixel_density, 2.0);
    assert_eq!(desc.backing_width, 800);
    assert_eq!(desc.backing_height, 600);

    let snapshot = {
        effect.start().unwrap();
        clock.advance(32.0);
        effect.on_host_frame().unwrap();
        effect.snapshot().unwrap()
    };
    assert_eq!(snapshot.width(), 800);
}

#[test]
fn late_frames_catch_up_in_whole_steps() {
    let clock = FakeClock::new();
    let mut effect = effect_over(SurfaceGeometry::new(400.0, 300.0, 1.0), SurfaceCaps::default(), &clock);

    effect.start().unwrap();
    clock.advance(3.0 * 32.0 + 10.0);
    effect.on_host_frame().unwrap();
    assert_eq!(effect.offset(), 3, "three full intervals elapsed");

    clock.advance(22.0);
    effect.on_host_frame().unwrap();
    assert_eq!(effect.offset(), 4, "the 10 ms remainder carried over");
}

#[test]
fn pause_resume_preserves_offset() {
    let clock = FakeClock::new();
    let mut effect = effect_over(SurfaceGeometry::new(400.0, 300.0, 1.0), SurfaceCaps::default(), &clock);

    effect.start().unwrap();
    clock.advance(64.0);
    effect.on_host_frame().unwrap();
    assert_eq!(effect.offset(), 2);

    effect.pause().unwrap();
    assert!(effect.is_paused());
    clock.advance(10_000.0);
    effect.on_host_frame().unwrap();
    assert_eq!(effect.offset(), 2, "paused time does not accrue");

    effect.resume().unwrap();
    clock.advance(32.0);
    effect.on_host_frame().unwrap();
    assert_eq!(effect.offset(), 3);
}

#[test]
fn set_text_normalizes_before_comparing() {
    let clock = FakeClock::new();
    let mut effect = effect_over(SurfaceGeometry::new(400.0, 300.0, 1.0), SurfaceCaps::default(), &clock);
    let mask_gen = effect.mask_generation();

    // Control characters are stripped, so this normalizes to the current text.
    effect.set_text("HE\u{0007}LLO").unwrap();
    assert_eq!(effect.mask_generation(), mask_gen);
    assert_eq!(effect.config().text, "HELLO");
}

#[test]
fn scheduler_fallback_keeps_the_animation_alive() {
    let clock = FakeClock::new();
    let broken = ManualScheduler::new();
    broken.fail_requests(true);

    let env = HostEnv {
        clock: Box::new(clock.clone()),
        scheduler: Box::new(broken.clone()),
        fallback_scheduler: Some(Box::new(TimerScheduler::default())),
        text: Box::new(BlockGlyphRasterizer),
        noise_seed: Some(42),
    };
    let surface = MemorySurface::new(400.0, 300.0, 1.0);
    let mut effect = Effect::new(Box::new(surface), env, EffectOptions::default()).unwrap();

    effect.start().unwrap();
    assert!(effect.is_running());
    clock.advance(32.0);
    effect.on_host_frame().unwrap();
    assert_eq!(effect.offset(), 1);
}

#[test]
fn missing_fallback_makes_start_fail() {
    let clock = FakeClock::new();
    let broken = ManualScheduler::new();
    broken.fail_requests(true);

    let env = HostEnv {
        clock: Box::new(clock.clone()),
        scheduler: Box::new(broken),
        fallback_scheduler: None,
        text: Box::new(BlockGlyphRasterizer),
        noise_seed: Some(42),
    };
    let surface = MemorySurface::new(400.0, 300.0, 1.0);
    let mut effect = Effect::new(Box::new(surface), env, EffectOptions::default()).unwrap();

    assert!(matches!(effect.start(), Err(EffectError::Scheduling(_))));
    assert!(!effect.is_running());
}

#[test]
fn strict_mode_rejects_bad_options_at_construction() {
    let clock = FakeClock::new();
    let options = EffectOptions {
        step_pixels: Some(0),
        ..Default::default()
    };
    let err = Effect::with_mode(
        Box::new(MemorySurface::new(400.0, 300.0, 1.0)),
        host(&clock),
        options,
        ValidationMode::Strict,
    )
    .unwrap_err();
    assert!(matches!(err, EffectError::InvalidParameter(_)));
}

#[test]
fn options_decode_from_json() {
    let options: EffectOptions = serde_json::from_str(
        r#"{"text":"HI","cell_size":4,"step_ms":48.0,"font_weight":"bold"}"#,
    )
    .unwrap();

    let clock = FakeClock::new();
    let effect = Effect::new(
        Box::new(MemorySurface::new(400.0, 300.0, 1.0)),
        host(&clock),
        options,
    )
    .unwrap();
    assert_eq!(effect.config().text, "HI");
    assert_eq!(effect.config().cell_size, 4);
    assert_eq!(effect.config().step_ms, 48.0);
    assert_eq!(effect.config().font_weight.numeric(), 700.0);
}

#[test]
fn destroy_then_everything_errors() {
    let clock = FakeClock::new();
    let mut effect = effect_over(SurfaceGeometry::new(400.0, 300.0, 1.0), SurfaceCaps::default(), &clock);
    effect.start().unwrap();
    effect.destroy();

    assert!(effect.is_destroyed());
    assert!(matches!(effect.resume(), Err(EffectError::InstanceDestroyed)));
    assert!(matches!(effect.snapshot(), Err(EffectError::InstanceDestroyed)));
    assert!(matches!(effect.force_refresh(), Err(EffectError::InstanceDestroyed)));
}
