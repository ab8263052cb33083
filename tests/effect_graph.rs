//! End-to-end graph behavior against a headless renderer.
//!
//! These tests need a working GPU adapter. When none is available (bare CI
//! runners) every test skips instead of failing, reported through stderr.

use effectlab::{
    EffectError, EffectRenderer, FilterMode, RendererConfig, WrapMode, DEFAULT_FRAGMENT_SOURCE,
};

fn renderer() -> Option<EffectRenderer> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,effectlab=debug".into()),
        )
        .with_test_writer()
        .try_init();
    match EffectRenderer::headless(RendererConfig {
        surface_size: (640, 360),
        working_resolution: (256, 144),
        ..RendererConfig::default()
    }) {
        Ok(renderer) => Some(renderer),
        Err(err) => {
            eprintln!("skipping: no usable GPU adapter ({err})");
            None
        }
    }
}

const FEEDBACK_SOURCE: &str = r"#version 330 core
uniform vec2 resolution;
uniform sampler2D channel0;
out vec4 fragColor;
void main(void) {
    vec2 uv = gl_FragCoord.xy / resolution;
    fragColor = texture(channel0, uv) * 0.97;
}
";

const SOLID_RED_SOURCE: &str = r"#version 330 core
out vec4 fragColor;
void main(void) {
    fragColor = vec4(1.0, 0.0, 0.0, 1.0);
}
";

#[test]
fn first_pass_becomes_main_and_renders() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    assert_eq!(renderer.main_pass(), Some(0));
    assert_eq!(renderer.frame_counter(0).unwrap(), 0);
    assert_eq!(renderer.fragment_source(0).unwrap(), DEFAULT_FRAGMENT_SOURCE);

    renderer.render_tick().unwrap();
    assert_eq!(renderer.frame_counter(0).unwrap(), 1);
}

#[test]
fn later_passes_never_steal_the_main_designation() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(5).unwrap();
    renderer.create_pass(2).unwrap();
    renderer.create_pass(9).unwrap();
    assert_eq!(renderer.main_pass(), Some(5));
    assert_eq!(renderer.pass_ids(), vec![2, 5, 9]);
}

#[test]
fn cross_pass_sampling_renders() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.create_pass(1).unwrap();
    let log = renderer.recompile(1, SOLID_RED_SOURCE).unwrap();
    assert!(log.is_empty());

    renderer.set_channel_source(0, 0, Some(1)).unwrap();
    let log = renderer.recompile(0, FEEDBACK_SOURCE).unwrap();
    assert!(log.is_empty());

    renderer.render_tick().unwrap();
    renderer.render_tick().unwrap();
    assert_eq!(renderer.frame_counter(0).unwrap(), 2);
    assert_eq!(renderer.frame_counter(1).unwrap(), 2);
}

#[test]
fn self_feedback_renders() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.create_pass(1).unwrap();
    renderer.set_channel_source(1, 0, Some(1)).unwrap();
    renderer.recompile(1, FEEDBACK_SOURCE).unwrap();

    for _ in 0..3 {
        renderer.render_tick().unwrap();
    }
    assert_eq!(renderer.frame_counter(1).unwrap(), 3);
}

#[test]
fn failed_recompile_keeps_previous_source_and_still_renders() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.render_tick().unwrap();

    let log = renderer.recompile(0, "this is not a shader").unwrap();
    assert!(!log.is_empty());
    for line in log.lines() {
        assert!(line.starts_with("ERROR: 0:"), "unexpected log line: {line}");
    }
    assert_eq!(renderer.last_log(), log);

    // The previous source stays current and the pass restarts from frame 0.
    assert_eq!(renderer.fragment_source(0).unwrap(), DEFAULT_FRAGMENT_SOURCE);
    assert_eq!(renderer.frame_counter(0).unwrap(), 0);
    renderer.render_tick().unwrap();
    assert_eq!(renderer.frame_counter(0).unwrap(), 1);
}

#[test]
fn failed_recompile_falls_back_to_latest_adopted_source() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.recompile(0, SOLID_RED_SOURCE).unwrap();
    let log = renderer.recompile(0, "garbage").unwrap();
    assert!(!log.is_empty());
    assert_eq!(renderer.fragment_source(0).unwrap(), SOLID_RED_SOURCE);
}

#[test]
fn successful_recompile_resets_frame_and_clears_log() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.render_tick().unwrap();
    renderer.render_tick().unwrap();
    assert_eq!(renderer.frame_counter(0).unwrap(), 2);

    renderer.recompile(0, "bad").unwrap();
    assert!(!renderer.last_log().is_empty());

    let log = renderer.recompile(0, SOLID_RED_SOURCE).unwrap();
    assert!(log.is_empty());
    assert!(renderer.last_log().is_empty());
    assert_eq!(renderer.frame_counter(0).unwrap(), 0);
}

#[test]
fn delete_scrubs_channel_references() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.create_pass(1).unwrap();
    renderer.create_pass(2).unwrap();
    renderer.set_channel_source(0, 0, Some(1)).unwrap();
    renderer.set_channel_source(0, 3, Some(1)).unwrap();
    renderer.set_channel_source(2, 1, Some(1)).unwrap();
    renderer.set_channel_source(2, 2, Some(0)).unwrap();

    renderer.delete_pass(1).unwrap();
    assert!(!renderer.is_alive(1));
    assert_eq!(renderer.channel_source(0, 0).unwrap(), None);
    assert_eq!(renderer.channel_source(0, 3).unwrap(), None);
    assert_eq!(renderer.channel_source(2, 1).unwrap(), None);
    // References to other passes are untouched.
    assert_eq!(renderer.channel_source(2, 2).unwrap(), Some(0));

    renderer.render_tick().unwrap();
}

#[test]
fn dangling_forward_reference_is_tolerated() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    // Pass 7 does not exist yet; the channel binds as empty until it does.
    renderer.set_channel_source(0, 0, Some(7)).unwrap();
    renderer.recompile(0, FEEDBACK_SOURCE).unwrap();
    renderer.render_tick().unwrap();
    assert_eq!(renderer.channel_source(0, 0).unwrap(), Some(7));

    renderer.create_pass(7).unwrap();
    renderer.render_tick().unwrap();
    assert_eq!(renderer.frame_counter(7).unwrap(), 1);
}

#[test]
fn channel_settings_round_trip() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    assert_eq!(
        renderer.channel_filter(0, 2).unwrap(),
        FilterMode::MipmapTrilinear
    );
    assert_eq!(renderer.channel_wrap(0, 2).unwrap(), WrapMode::Repeat);

    renderer.set_channel_filter(0, 2, FilterMode::Nearest).unwrap();
    renderer.set_channel_wrap(0, 2, WrapMode::ClampToEdge).unwrap();
    assert_eq!(renderer.channel_filter(0, 2).unwrap(), FilterMode::Nearest);
    assert_eq!(renderer.channel_wrap(0, 2).unwrap(), WrapMode::ClampToEdge);
}

#[test]
fn filter_modes_all_render() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.create_pass(1).unwrap();
    renderer.set_channel_source(0, 0, Some(1)).unwrap();
    renderer.recompile(0, FEEDBACK_SOURCE).unwrap();

    for filter in [
        FilterMode::MipmapTrilinear,
        FilterMode::Bilinear,
        FilterMode::Nearest,
    ] {
        renderer.set_channel_filter(0, 0, filter).unwrap();
        renderer.render_tick().unwrap();
    }
}

#[test]
fn mutation_preconditions_are_reported() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();

    assert!(matches!(
        renderer.create_pass(0),
        Err(EffectError::PassAlreadyExists(0))
    ));
    assert!(matches!(
        renderer.delete_pass(9),
        Err(EffectError::UnknownPass(9))
    ));
    assert!(matches!(
        renderer.recompile(9, "x"),
        Err(EffectError::UnknownPass(9))
    ));
    assert!(matches!(
        renderer.set_channel_source(0, 4, None),
        Err(EffectError::ChannelOutOfRange(4))
    ));
    assert!(matches!(
        renderer.channel_filter(0, 17),
        Err(EffectError::ChannelOutOfRange(17))
    ));
}

#[test]
fn ticks_without_any_pass_are_noops() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.render_tick().unwrap();
    assert_eq!(renderer.main_pass(), None);
}

#[test]
fn deleting_the_main_pass_disables_rendering() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.create_pass(1).unwrap();
    renderer.render_tick().unwrap();

    renderer.delete_pass(0).unwrap();
    // The designation survives the delete and is never handed to pass 1.
    assert_eq!(renderer.main_pass(), Some(0));
    renderer.render_tick().unwrap();
    assert_eq!(renderer.frame_counter(1).unwrap(), 1);
}

#[test]
fn resize_keeps_working_resolution() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.resize(800, 600);
    assert_eq!(renderer.screen_size(), (800, 600));
    assert_eq!(renderer.working_resolution(), (256, 144));
    renderer.render_tick().unwrap();
}

#[test]
fn pointer_state_flows_through_ticks() {
    let Some(mut renderer) = renderer() else {
        return;
    };
    renderer.create_pass(0).unwrap();
    renderer.pointer_pressed(100.0, 50.0);
    renderer.render_tick().unwrap();
    renderer.pointer_moved(120.0, 60.0);
    renderer.render_tick().unwrap();
    renderer.pointer_released(120.0, 60.0);
    renderer.render_tick().unwrap();
}
