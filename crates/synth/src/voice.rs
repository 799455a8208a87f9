//! Voice selection state
//!
//! The voice id is the only mutable state shared between tools and synthesis
//! workers: written by the language-selection tool, read by every worker at
//! the moment of synthesis.

use parking_lot::RwLock;

/// Language to voice-id table
const VOICE_TABLE: &[(&str, &str)] = &[
    ("chinese", "zh-CN-XiaoxiaoNeural"),
    ("english", "en-US-AriaNeural"),
    ("japanese", "ja-JP-NanamiNeural"),
    ("spanish", "es-ES-ElviraNeural"),
    ("french", "fr-FR-DeniseNeural"),
    ("vietnamese", "vi-VN-HoaiMyNeural"),
];

/// A selected voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub language: String,
    pub voice_id: String,
}

/// Shared current-voice state
#[derive(Debug)]
pub struct VoiceState {
    current: RwLock<Voice>,
}

impl VoiceState {
    /// Start with an explicit default voice id
    pub fn new(default_voice_id: impl Into<String>) -> Self {
        let voice_id = default_voice_id.into();
        let language = VOICE_TABLE
            .iter()
            .find(|(_, id)| *id == voice_id)
            .map(|(lang, _)| lang.to_string())
            .unwrap_or_else(|| "chinese".to_string());

        Self {
            current: RwLock::new(Voice { language, voice_id }),
        }
    }

    /// Voice id to use for the next synthesis call
    pub fn current_voice_id(&self) -> String {
        self.current.read().voice_id.clone()
    }

    pub fn current(&self) -> Voice {
        self.current.read().clone()
    }

    /// Switch to the voice for `language`; returns the new voice, or `None`
    /// for an unknown language (state unchanged)
    pub fn select(&self, language: &str) -> Option<Voice> {
        let key = language.trim().to_lowercase();
        let (lang, voice_id) = VOICE_TABLE.iter().find(|(l, _)| *l == key)?;

        let voice = Voice {
            language: lang.to_string(),
            voice_id: voice_id.to_string(),
        };
        *self.current.write() = voice.clone();
        Some(voice)
    }

    /// Languages the table knows about
    pub fn supported_languages() -> Vec<&'static str> {
        VOICE_TABLE.iter().map(|(lang, _)| *lang).collect()
    }
}

impl Default for VoiceState {
    fn default() -> Self {
        Self::new("zh-CN-XiaoxiaoNeural")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_voice() {
        let state = VoiceState::default();
        assert_eq!(state.current_voice_id(), "zh-CN-XiaoxiaoNeural");
        assert_eq!(state.current().language, "chinese");
    }

    #[test]
    fn test_select_known_language() {
        let state = VoiceState::default();
        let voice = state.select("English").unwrap();

        assert_eq!(voice.voice_id, "en-US-AriaNeural");
        assert_eq!(state.current_voice_id(), "en-US-AriaNeural");
    }

    #[test]
    fn test_select_unknown_language_keeps_state() {
        let state = VoiceState::default();
        assert!(state.select("klingon").is_none());
        assert_eq!(state.current_voice_id(), "zh-CN-XiaoxiaoNeural");
    }
}
