//! Optimization modes.
//!
//! Every route is the same handler parameterized by a [`ModeDescriptor`]:
//! which images it expects, which upstream stream shape it prefers and the
//! instruction template wrapped around the user's prompt.

use std::fmt;

use crate::protocol::canonical::{OutputLanguage, UpstreamShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptimizeMode {
    Generate,
    Edit,
    GenerateVideo,
    EditVideo,
    FrameTransition,
}

/// Static description of one optimization mode.
#[derive(Debug)]
pub struct ModeDescriptor {
    pub mode: OptimizeMode,
    /// Key used in `features.prompt_templates`.
    pub name: &'static str,
    /// Path segment under `/api/`.
    pub route_slug: &'static str,
    /// Image form fields, in the order they are sent upstream.
    pub image_fields: &'static [&'static str],
    pub default_shape: UpstreamShape,
    /// Overrides `upstream.max_output_tokens` when set.
    pub max_output_tokens: Option<u32>,
    pub thinking_budget: Option<u32>,
    pub template: &'static str,
}

const GENERATE_TEMPLATE: &str = "You are a senior image prompt engineer. Rewrite the prompt below into a \
high-quality {language} prompt for general AI image generation models.
- Describe subject, scene, styling, composition, camera, lighting, materials, palette, style and post-processing in a clear structure.
- Use comma-separated phrases instead of long sentences.
- Fill in common, plausible details that are missing.
- Do not include technical parameters such as aspect ratios or pixel sizes.
- Output only the final {language} prompt, without explanations.

Original prompt (may be in another language):
{prompt}";

const EDIT_TEMPLATE: &str = "You are a senior image prompt engineer. This is an image editing task: the \
attached reference image must be modified according to the request below. Rewrite the request into a \
high-quality {language} editing prompt.
- Keep the subject, composition and key style of the reference image unless the request changes them.
- State precisely what to change, add or remove, and what must stay untouched.
- Use comma-separated phrases instead of long sentences.
- Output only the final {language} prompt, without explanations.

Original request (may be in another language):
{prompt}";

const GENERATE_VIDEO_TEMPLATE: &str = "You are a senior video prompt engineer. Rewrite the prompt below into \
a high-quality {language} prompt for AI text-to-video generation.
- Merge subject action, environment changes, camera movement, timing, lighting, palette and pacing into one fluent description.
- Use comma-separated phrases and a single paragraph.
- Do not include technical parameters such as resolution, duration or frame rate.
- Output only the final {language} prompt, without explanations.

Original prompt (may be in another language):
{prompt}";

const EDIT_VIDEO_TEMPLATE: &str = "You are a senior video prompt engineer. This is an image-to-video task. \
Rewrite the prompt below into a high-quality {language} prompt for AI video generation.
- Preserve the composition and key style of the attached reference image and add natural motion and camera movement on top of it.
- Merge subject action, environment changes, camera movement, lighting and pacing into one fluent paragraph.
- Keep it short: at most 50 English words or 100 Chinese characters.
- Do not include technical parameters such as resolution, duration or frame rate.
- Output only the final {language} prompt, without explanations.

Original prompt (may be in another language):
{prompt}";

const FRAME_TRANSITION_TEMPLATE: &str = "You are a professional video prompt engineer. The two attached \
images are the first and the last frame of a clip. Analyze how the scene changes between them and write a \
detailed {language} video generation prompt describing a smooth transition from the first frame to the last.
1. Compare the visual differences between the two frames.
2. Describe the transition: object changes, lighting changes and camera movement.
3. Combine this with the user's original prompt.
4. Use professional video generation terminology.
Respond in {language} with the optimized prompt only.

User's original prompt:
{prompt}";

pub const MODES: [ModeDescriptor; 5] = [
    ModeDescriptor {
        mode: OptimizeMode::Generate,
        name: "generate",
        route_slug: "optimize-and-generate",
        image_fields: &[],
        default_shape: UpstreamShape::LineDelimited,
        max_output_tokens: None,
        thinking_budget: None,
        template: GENERATE_TEMPLATE,
    },
    ModeDescriptor {
        mode: OptimizeMode::Edit,
        name: "edit",
        route_slug: "optimize-and-edit",
        image_fields: &["image"],
        default_shape: UpstreamShape::SnapshotArray,
        max_output_tokens: None,
        thinking_budget: None,
        template: EDIT_TEMPLATE,
    },
    ModeDescriptor {
        mode: OptimizeMode::GenerateVideo,
        name: "generate-video",
        route_slug: "optimize-and-generate-video",
        image_fields: &[],
        default_shape: UpstreamShape::SnapshotArray,
        max_output_tokens: None,
        thinking_budget: None,
        template: GENERATE_VIDEO_TEMPLATE,
    },
    ModeDescriptor {
        mode: OptimizeMode::EditVideo,
        name: "edit-video",
        route_slug: "optimize-and-edit-video",
        image_fields: &["image"],
        default_shape: UpstreamShape::SnapshotArray,
        max_output_tokens: Some(64_000),
        thinking_budget: Some(16_000),
        template: EDIT_VIDEO_TEMPLATE,
    },
    ModeDescriptor {
        mode: OptimizeMode::FrameTransition,
        name: "frame-transition",
        route_slug: "optimize-frame-transition",
        image_fields: &["firstFrame", "lastFrame"],
        default_shape: UpstreamShape::LineDelimited,
        max_output_tokens: None,
        thinking_budget: None,
        template: FRAME_TRANSITION_TEMPLATE,
    },
];

impl OptimizeMode {
    #[must_use]
    pub fn descriptor(self) -> &'static ModeDescriptor {
        let index = match self {
            OptimizeMode::Generate => 0,
            OptimizeMode::Edit => 1,
            OptimizeMode::GenerateVideo => 2,
            OptimizeMode::EditVideo => 3,
            OptimizeMode::FrameTransition => 4,
        };
        &MODES[index]
    }

    #[must_use]
    pub fn from_route_slug(slug: &str) -> Option<Self> {
        MODES
            .iter()
            .find(|descriptor| descriptor.route_slug == slug)
            .map(|descriptor| descriptor.mode)
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        MODES
            .iter()
            .find(|descriptor| descriptor.name == name)
            .map(|descriptor| descriptor.mode)
    }
}

impl fmt::Display for OptimizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().name)
    }
}

/// Fill `{language}` and `{prompt}` placeholders.
///
/// The prompt is substituted last so that user text containing a literal
/// `{language}` is passed through untouched.
#[must_use]
pub fn render_prompt(template: &str, prompt: &str, language: OutputLanguage) -> String {
    template
        .replace("{language}", language.instruction_name())
        .replace("{prompt}", prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_are_indexed_by_mode() {
        for descriptor in &MODES {
            assert_eq!(descriptor.mode.descriptor().name, descriptor.name);
        }
    }

    #[test]
    fn route_slugs_resolve() {
        assert_eq!(
            OptimizeMode::from_route_slug("optimize-frame-transition"),
            Some(OptimizeMode::FrameTransition)
        );
        assert_eq!(
            OptimizeMode::from_route_slug("optimize-and-edit"),
            Some(OptimizeMode::Edit)
        );
        assert_eq!(OptimizeMode::from_route_slug("optimize"), None);
    }

    #[test]
    fn every_template_has_prompt_placeholder() {
        for descriptor in &MODES {
            assert!(
                descriptor.template.contains("{prompt}"),
                "{} template lacks {{prompt}}",
                descriptor.name
            );
        }
    }

    #[test]
    fn render_prompt_does_not_expand_placeholders_inside_user_text() {
        let rendered = render_prompt(
            "Write in {language}: {prompt}",
            "a sign reading {language}",
            OutputLanguage::Zh,
        );
        assert_eq!(
            rendered,
            "Write in Simplified Chinese: a sign reading {language}"
        );
    }

    #[test]
    fn frame_transition_expects_two_frames() {
        let descriptor = OptimizeMode::FrameTransition.descriptor();
        assert_eq!(descriptor.image_fields, &["firstFrame", "lastFrame"]);
    }
}
