//! GLSL wrapping and compilation for effect passes.
//!
//! User-facing shaders are desktop-style GLSL (`#version 330 core`, plain
//! `uniform` declarations, `out vec4 fragColor`, a full `void main()`). wgpu
//! wants Vulkan-flavored GLSL, so every fragment source is wrapped before
//! compilation: the documented uniforms become a std140 block plus split
//! texture/sampler bindings, aliased back to their original names with
//! macros, and `gl_FragCoord` is remapped to the bottom-left origin the
//! shaders were written against.
//!
//! The wrapped source is parsed and validated with naga on the CPU before any
//! device object is created, so compile failures are caught synchronously and
//! reported as an editor-friendly log (`ERROR: 0:LINE: MESSAGE`, one error
//! per line, LINE in the user's own source).

use std::borrow::Cow;

use wgpu::naga;
use wgpu::naga::front::glsl;
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

/// Uniform names owned by the renderer. Declarations of these in user source
/// are blanked out so the injected block takes over.
const RESERVED_UNIFORMS: [&str; 8] = [
    "time",
    "frame",
    "resolution",
    "pointerState",
    "channel0",
    "channel1",
    "channel2",
    "channel3",
];

/// Seed source handed to every new pass and to new editor buffers. The
/// uniform declarations double as the documented contract between the
/// renderer and user shaders, so the names here must never change.
pub const DEFAULT_FRAGMENT_SOURCE: &str = r"#version 330 core

uniform float time;
uniform int frame;
uniform vec2 resolution;
uniform vec4 pointerState;
uniform sampler2D channel0;
uniform sampler2D channel1;
uniform sampler2D channel2;
uniform sampler2D channel3;

out vec4 fragColor;

void main(void) {
    vec2 uv = gl_FragCoord.xy / resolution;
    vec3 color = 0.5 + 0.5 * cos(time + uv.xyx + vec3(0.0, 2.0, 4.0));
    fragColor = vec4(color, 1.0);
}
";

/// Minimal full-screen two-triangle vertex stage shared by every pass.
const VERTEX_SHADER_GLSL: &str = r"#version 450

const vec2 positions[6] = vec2[6](
    vec2(-1.0, 1.0),
    vec2(-1.0, -1.0),
    vec2(1.0, -1.0),
    vec2(-1.0, 1.0),
    vec2(1.0, -1.0),
    vec2(1.0, 1.0)
);

void main() {
    gl_Position = vec4(positions[gl_VertexIndex], 0.0, 1.0);
}
";

/// GLSL prologue injected ahead of every user fragment shader.
///
/// The uniform block layout must match `PassUniforms` in `gpu/uniforms.rs`.
/// `main` is diverted to `effectlab_pass_main` so the footer can remap
/// `gl_FragCoord` before handing control to user code.
const HEADER: &str = r"#version 450
layout(location = 0) out vec4 fragColor;

layout(std140, set = 0, binding = 0) uniform PassParams {
    vec2 _resolution;
    float _time;
    int _frame;
    vec4 _pointerState;
} ubo;

#define resolution ubo._resolution
#define time ubo._time
#define frame ubo._frame
#define pointerState ubo._pointerState

layout(set = 1, binding = 0) uniform texture2D effectlab_channel0_texture;
layout(set = 1, binding = 1) uniform sampler effectlab_channel0_sampler;
layout(set = 1, binding = 2) uniform texture2D effectlab_channel1_texture;
layout(set = 1, binding = 3) uniform sampler effectlab_channel1_sampler;
layout(set = 1, binding = 4) uniform texture2D effectlab_channel2_texture;
layout(set = 1, binding = 5) uniform sampler effectlab_channel2_sampler;
layout(set = 1, binding = 6) uniform texture2D effectlab_channel3_texture;
layout(set = 1, binding = 7) uniform sampler effectlab_channel3_sampler;

#define channel0 sampler2D(effectlab_channel0_texture, effectlab_channel0_sampler)
#define channel1 sampler2D(effectlab_channel1_texture, effectlab_channel1_sampler)
#define channel2 sampler2D(effectlab_channel2_texture, effectlab_channel2_sampler)
#define channel3 sampler2D(effectlab_channel3_texture, effectlab_channel3_sampler)

vec4 effectlab_frag_coord;
#define gl_FragCoord effectlab_frag_coord
#define main effectlab_pass_main
";

/// GLSL epilogue that remaps coordinates and delegates to the user `main`.
const FOOTER: &str = r"
#undef main
#undef gl_FragCoord
void main() {
    effectlab_frag_coord =
        vec4(gl_FragCoord.x, resolution.y - gl_FragCoord.y, gl_FragCoord.z, gl_FragCoord.w);
    effectlab_pass_main();
}
";

/// A fragment source prepared for the Vulkan GLSL front end.
pub(crate) struct WrappedFragment {
    pub text: String,
    /// Number of injected lines ahead of the user's first line. Subtracting
    /// this from a diagnostic's line number recovers the editor line.
    pub line_offset: usize,
}

/// Compile failure captured as an editor-consumable log.
#[derive(Debug)]
pub(crate) struct CompileFailure {
    pub log: String,
}

/// Produces a self-contained Vulkan GLSL fragment shader from user code.
///
/// Reserved uniform declarations, the `#version` directive, and the user's
/// `out vec4` declaration are blanked rather than removed so every remaining
/// line keeps its original number and compiler diagnostics stay aligned with
/// the editor. An `out` variable not named `fragColor` is aliased to the
/// injected output with a macro.
pub(crate) fn wrap_fragment(source: &str) -> WrappedFragment {
    let mut out_alias: Option<String> = None;
    let mut body = String::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        let mut skip = trimmed.starts_with("#version");
        if trimmed.starts_with("uniform ")
            && RESERVED_UNIFORMS
                .iter()
                .any(|name| trimmed.contains(name))
        {
            skip = true;
        }
        if let Some(rest) = trimmed.strip_prefix("out vec4 ") {
            if let Some(name) = rest.strip_suffix(';').map(str::trim) {
                if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    if name != "fragColor" {
                        out_alias = Some(name.to_owned());
                    }
                    skip = true;
                }
            }
        }
        if !skip {
            body.push_str(line);
        }
        body.push('\n');
    }

    let mut prefix = String::from(HEADER);
    if let Some(name) = out_alias {
        prefix.push_str(&format!("#define {name} fragColor\n"));
    }
    let line_offset = prefix.lines().count();

    WrappedFragment {
        text: format!("{prefix}{body}{FOOTER}"),
        line_offset,
    }
}

/// Compiles a user fragment shader, returning either a usable module or the
/// diagnostic log for the editor.
///
/// naga does all parsing and validation on the CPU first, so a failure never
/// reaches the device; the `wgpu::ShaderModule` is only created once the
/// source is known good.
pub(crate) fn compile_fragment(
    device: &wgpu::Device,
    source: &str,
) -> Result<wgpu::ShaderModule, CompileFailure> {
    let wrapped = wrap_fragment(source);

    let mut frontend = glsl::Frontend::default();
    let options = glsl::Options::from(naga::ShaderStage::Fragment);
    let module = frontend.parse(&options, &wrapped.text).map_err(|errors| {
        CompileFailure {
            log: format_parse_errors(&errors, &wrapped),
        }
    })?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator.validate(&module).map_err(|error| {
        let line = error
            .location(&wrapped.text)
            .map(|location| user_line(location.line_number, wrapped.line_offset))
            .unwrap_or(1);
        CompileFailure {
            log: format!("ERROR: 0:{line}: {}", error.as_inner()),
        }
    })?;

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("effect fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrapped.text),
            stage: naga::ShaderStage::Fragment,
            defines: &[],
        },
    }))
}

/// Compiles the static full-screen vertex shader. This stage is fixed and
/// pre-validated; a failure here is a bug, not user error.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen quad vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: naga::ShaderStage::Vertex,
            defines: &[],
        },
    })
}

fn user_line(wrapped_line: u32, offset: usize) -> u32 {
    wrapped_line.saturating_sub(offset as u32).max(1)
}

/// Renders naga parse errors into the classic GLSL compiler log shape,
/// `ERROR: 0:LINE: MESSAGE`, newline-separated. The editor shell parses the
/// line number out of this format for gutter highlighting.
fn format_parse_errors(errors: &glsl::ParseErrors, wrapped: &WrappedFragment) -> String {
    let mut log = String::new();
    for error in &errors.errors {
        let location = error.meta.location(&wrapped.text);
        let line = user_line(location.line_number, wrapped.line_offset);
        if !log.is_empty() {
            log.push('\n');
        }
        log.push_str(&format!("ERROR: 0:{line}: {}", error.kind));
    }
    if log.is_empty() {
        log.push_str("ERROR: 0:1: shader failed to compile");
    }
    log
}

/// CPU-only front half of [`compile_fragment`], used where no device exists.
#[cfg(test)]
fn parse_and_validate(source: &str) -> Result<(), String> {
    let wrapped = wrap_fragment(source);
    let mut frontend = glsl::Frontend::default();
    let options = glsl::Options::from(naga::ShaderStage::Fragment);
    let module = frontend
        .parse(&options, &wrapped.text)
        .map_err(|errors| format_parse_errors(&errors, &wrapped))?;
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|error| format!("ERROR: 0:1: {}", error.as_inner()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_blanks_reserved_declarations() {
        let wrapped = wrap_fragment(DEFAULT_FRAGMENT_SOURCE);
        assert!(!wrapped.text.contains("uniform float time"));
        assert!(!wrapped.text.contains("uniform sampler2D channel0"));
        // Exactly one out declaration survives: the injected one.
        assert_eq!(wrapped.text.matches("out vec4").count(), 1);
    }

    #[test]
    fn wrap_preserves_line_numbering() {
        let source = "#version 330 core\nout vec4 fragColor;\nvoid main(void) {\nfragColor = vec4(1.0);\n}\n";
        let wrapped = wrap_fragment(source);
        let body: Vec<&str> = wrapped
            .text
            .lines()
            .skip(wrapped.line_offset)
            .take(5)
            .collect();
        // Stripped lines stay as blanks; kept lines are untouched.
        assert_eq!(body, ["", "", "void main(void) {", "fragColor = vec4(1.0);", "}"]);
    }

    #[test]
    fn wrap_aliases_renamed_output() {
        let source = "out vec4 outColour;\nvoid main() { outColour = vec4(0.0); }\n";
        let wrapped = wrap_fragment(source);
        assert!(wrapped.text.contains("#define outColour fragColor"));
    }

    #[test]
    fn default_source_compiles() {
        parse_and_validate(DEFAULT_FRAGMENT_SOURCE).expect("default source must always compile");
    }

    #[test]
    fn feedback_shader_compiles() {
        let source = r"#version 330 core
uniform vec2 resolution;
uniform sampler2D channel0;
out vec4 fragColor;
void main(void) {
    vec2 uv = gl_FragCoord.xy / resolution;
    fragColor = texture(channel0, uv) * 0.97;
}
";
        parse_and_validate(source).expect("channel sampling must compile");
    }

    #[test]
    fn garbage_produces_formatted_log() {
        let log = parse_and_validate("garbage").unwrap_err();
        assert!(!log.is_empty());
        for line in log.lines() {
            assert!(line.starts_with("ERROR: 0:"), "unexpected log line: {line}");
        }
    }

    #[test]
    fn diagnostics_use_editor_lines() {
        // The syntax error sits on line 3 of the user source; the wrap must
        // not shift it.
        let source = "#version 330 core\nvoid main(void) {\nthis is not glsl;\n}\n";
        let log = parse_and_validate(source).unwrap_err();
        let first = log.lines().next().unwrap();
        assert!(first.starts_with("ERROR: 0:3:"), "unexpected log line: {first}");
    }
}
