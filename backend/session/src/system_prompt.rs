//! System prompt for the companion persona.

use mindmuse_core::ResponseStyle;

pub const BASE_PERSONA: &str = "You are a compassionate, calming mental health companion who helps users \
with anxiety and stress using CBT and mindfulness. Provide supportive responses that incorporate \
cognitive-behavioral techniques and mindfulness practices. Focus on helping users identify negative \
thought patterns, practice grounding exercises, and develop healthy coping mechanisms. Your tone \
should be gentle, reassuring, and empathetic at all times.";

pub struct PromptBuilder;

impl PromptBuilder {
    /// Persona text followed by the style's length instruction, if any.
    pub fn build(style: ResponseStyle) -> String {
        Self::build_with_persona(BASE_PERSONA, style)
    }

    pub fn build_with_persona(persona: &str, style: ResponseStyle) -> String {
        match style.prompt_suffix() {
            Some(suffix) => format!("{persona}{suffix}"),
            None => persona.to_string(),
        }
    }
}
