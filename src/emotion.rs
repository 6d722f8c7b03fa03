//! VAD (Valence-Arousal-Dominance) emotional analysis
//!
//! Classifies an utterance into one of six base emotions plus neutral, and
//! maps the classification onto the VAD space used to weight memories.
//!
//! The baseline implementation is a bilingual (Spanish/English) keyword
//! lexicon. It is deterministic for a fixed lexicon version and cheap enough
//! to run inline on every exchange. Classification failure must never block
//! the caller: any internal problem degrades to the fixed neutral state.

use serde::{Deserialize, Serialize};

/// Base emotion categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmotionCategory {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Neutral,
}

impl EmotionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Sadness => "sadness",
            Self::Anger => "anger",
            Self::Fear => "fear",
            Self::Surprise => "surprise",
            Self::Disgust => "disgust",
            Self::Neutral => "neutral",
        }
    }

    /// Category → VAD lookup (valence, arousal, dominance)
    ///
    /// Values follow the documented baseline mapping. Valence here lives in
    /// [0,1] with 0.5 neutral; the type range admits [-1,1] for future
    /// classifiers that produce signed valence.
    pub fn vad(&self) -> (f32, f32, f32) {
        match self {
            Self::Joy => (0.8, 0.6, 0.7),
            Self::Sadness => (0.2, 0.4, 0.3),
            Self::Anger => (0.2, 0.8, 0.7),
            Self::Fear => (0.2, 0.8, 0.3),
            Self::Surprise => (0.7, 0.8, 0.5),
            Self::Disgust => (0.2, 0.6, 0.6),
            Self::Neutral => (0.5, 0.5, 0.5),
        }
    }

    const ALL: [EmotionCategory; 6] = [
        Self::Joy,
        Self::Sadness,
        Self::Anger,
        Self::Fear,
        Self::Surprise,
        Self::Disgust,
    ];

    /// Position in `ALL`; `None` for Neutral (which never scores)
    fn score_index(&self) -> Option<usize> {
        match self {
            Self::Joy => Some(0),
            Self::Sadness => Some(1),
            Self::Anger => Some(2),
            Self::Fear => Some(3),
            Self::Surprise => Some(4),
            Self::Disgust => Some(5),
            Self::Neutral => None,
        }
    }
}

/// Emotional state of one utterance or memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    /// Dominant detected emotion
    pub category: EmotionCategory,

    /// Positive/negative sentiment, valid range [-1, 1]
    pub valence: f32,

    /// Emotional intensity, [0, 1]
    pub arousal: f32,

    /// Control/submission, [0, 1]
    pub dominance: f32,

    /// Classifier confidence, [0, 1]
    pub confidence: f32,
}

impl EmotionalState {
    /// The fixed neutral default returned on classification failure
    pub fn neutral() -> Self {
        Self {
            category: EmotionCategory::Neutral,
            valence: 0.5,
            arousal: 0.5,
            dominance: 0.5,
            confidence: 0.0,
        }
    }

    pub fn from_vad(category: EmotionCategory, valence: f32, arousal: f32, dominance: f32) -> Self {
        Self {
            category,
            valence: valence.clamp(-1.0, 1.0),
            arousal: arousal.clamp(0.0, 1.0),
            dominance: dominance.clamp(0.0, 1.0),
            confidence: 1.0,
        }
    }

    /// Emotional intensity for memory weighting
    ///
    /// Arousal carries more of the signal than absolute valence (calm
    /// contentment weighs less than excited joy), scaled by confidence so a
    /// shaky classification contributes little weight.
    pub fn intensity(&self) -> f32 {
        let raw = 0.4 * self.valence.abs() + 0.6 * self.arousal;
        (raw * self.confidence.max(0.0)).clamp(0.0, 1.0)
    }

    /// Alignment in [0,1]: 1.0 for identical VAD, falling with distance
    ///
    /// Valence spans twice the range of the other axes and is halved before
    /// averaging so each axis contributes equally.
    pub fn alignment(&self, other: &EmotionalState) -> f32 {
        let dv = (self.valence - other.valence).abs() / 2.0;
        let da = (self.arousal - other.arousal).abs();
        let dd = (self.dominance - other.dominance).abs();
        (1.0 - (dv + da + dd) / 3.0).clamp(0.0, 1.0)
    }

    /// Mean absolute VAD distance in [0,1]
    pub fn vad_distance(&self, other: &EmotionalState) -> f32 {
        1.0 - self.alignment(other)
    }
}

/// Keyword-lexicon emotional analyzer
pub struct EmotionalAnalyzer {
    lexicon: Vec<(&'static str, EmotionCategory)>,
}

impl Default for EmotionalAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionalAnalyzer {
    pub fn new() -> Self {
        use EmotionCategory::*;

        // Keywords are matched as substrings of the lowercased utterance, so
        // Spanish stems ("content") also catch inflections ("contentísima").
        let lexicon = vec![
            // joy
            ("feliz", Joy),
            ("felicidad", Joy),
            ("alegr", Joy),
            ("content", Joy),
            ("encanta", Joy),
            ("genial", Joy),
            ("maravillos", Joy),
            ("happy", Joy),
            ("glad", Joy),
            ("wonderful", Joy),
            ("great news", Joy),
            ("love it", Joy),
            // sadness
            ("triste", Sadness),
            ("tristeza", Sadness),
            ("deprimid", Sadness),
            ("llorar", Sadness),
            ("extraño a", Sadness),
            ("sad", Sadness),
            ("depressed", Sadness),
            ("miss you", Sadness),
            ("heartbroken", Sadness),
            // anger
            ("enojad", Anger),
            ("enfadad", Anger),
            ("furios", Anger),
            ("rabia", Anger),
            ("odio", Anger),
            ("angry", Anger),
            ("furious", Anger),
            ("hate", Anger),
            // fear
            ("miedo", Fear),
            ("asustad", Fear),
            ("terror", Fear),
            ("nervios", Fear),
            ("preocupad", Fear),
            ("afraid", Fear),
            ("scared", Fear),
            ("worried", Fear),
            ("anxious", Fear),
            // surprise
            ("sorpre", Surprise),
            ("increíble", Surprise),
            ("increible", Surprise),
            ("no puedo creer", Surprise),
            ("wow", Surprise),
            ("surprised", Surprise),
            ("can't believe", Surprise),
            ("unbelievable", Surprise),
            // disgust
            ("asco", Disgust),
            ("asquerosos", Disgust),
            ("repugnante", Disgust),
            ("disgusting", Disgust),
            ("gross", Disgust),
            ("revolting", Disgust),
        ];

        Self { lexicon }
    }

    /// Analyze the emotional content of text
    ///
    /// Never fails: empty input, no lexicon match, or any internal problem
    /// yields the documented neutral default.
    pub fn analyze(&self, text: &str) -> EmotionalState {
        match self.classify(text) {
            Some(state) => state,
            None => EmotionalState::neutral(),
        }
    }

    fn classify(&self, text: &str) -> Option<EmotionalState> {
        let lowered = text.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }

        // Count keyword hits per category
        let mut scores = [0.0f32; 6];
        for (keyword, category) in &self.lexicon {
            if lowered.contains(keyword) {
                if let Some(idx) = category.score_index() {
                    scores[idx] += 1.0;
                }
            }
        }

        let total: f32 = scores.iter().sum();
        if total <= 0.0 {
            return None;
        }

        // Score-weighted VAD average over matched categories
        let mut valence = 0.0;
        let mut arousal = 0.0;
        let mut dominance = 0.0;
        for (idx, category) in EmotionCategory::ALL.iter().enumerate() {
            if scores[idx] > 0.0 {
                let weight = scores[idx] / total;
                let (v, a, d) = category.vad();
                valence += v * weight;
                arousal += a * weight;
                dominance += d * weight;
            }
        }

        let primary_idx = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx)?;
        let primary_share = scores[primary_idx] / total;

        Some(EmotionalState {
            category: EmotionCategory::ALL[primary_idx],
            valence: valence.clamp(-1.0, 1.0),
            arousal: arousal.clamp(0.0, 1.0),
            dominance: dominance.clamp(0.0, 1.0),
            confidence: Self::confidence(&scores, total, primary_share),
        })
    }

    /// Blend dominant-category share with score entropy
    ///
    /// A single clear match scores high; hits spread across categories pull
    /// confidence down even when one category narrowly wins.
    fn confidence(scores: &[f32; 6], total: f32, primary_share: f32) -> f32 {
        let active = scores.iter().filter(|s| **s > 0.0).count();
        let entropy_confidence = if active <= 1 {
            1.0
        } else {
            let entropy: f32 = scores
                .iter()
                .filter(|s| **s > 0.0)
                .map(|s| {
                    let p = s / total;
                    -p * p.ln()
                })
                .sum();
            let max_entropy = (active as f32).ln();
            1.0 - entropy / max_entropy
        };

        (0.7 * primary_share + 0.3 * entropy_confidence).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joy_maps_to_documented_vad() {
        let analyzer = EmotionalAnalyzer::new();
        let state = analyzer.analyze("Estoy muy feliz, me gradué");

        assert_eq!(state.category, EmotionCategory::Joy);
        assert!((state.valence - 0.8).abs() < 0.001);
        assert!((state.arousal - 0.6).abs() < 0.001);
        assert!((state.dominance - 0.7).abs() < 0.001);
        assert!(state.confidence > 0.9);
    }

    #[test]
    fn test_no_match_is_exact_neutral_default() {
        let analyzer = EmotionalAnalyzer::new();
        let state = analyzer.analyze("El informe trimestral está en la carpeta");

        assert_eq!(state, EmotionalState::neutral());
        assert!((state.valence - 0.5).abs() < f32::EPSILON);
        assert!((state.arousal - 0.5).abs() < f32::EPSILON);
        assert!((state.dominance - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_input_is_neutral() {
        let analyzer = EmotionalAnalyzer::new();
        assert_eq!(analyzer.analyze(""), EmotionalState::neutral());
        assert_eq!(analyzer.analyze("   "), EmotionalState::neutral());
    }

    #[test]
    fn test_output_ranges() {
        let analyzer = EmotionalAnalyzer::new();
        let samples = [
            "I'm so happy today",
            "me da miedo y estoy triste",
            "this is disgusting and I hate it",
            "wow, can't believe it!",
            "nothing in particular",
        ];

        for sample in samples {
            let state = analyzer.analyze(sample);
            assert!((-1.0..=1.0).contains(&state.valence), "{sample}");
            assert!((0.0..=1.0).contains(&state.arousal), "{sample}");
            assert!((0.0..=1.0).contains(&state.dominance), "{sample}");
            assert!((0.0..=1.0).contains(&state.confidence), "{sample}");
        }
    }

    #[test]
    fn test_mixed_emotions_lower_confidence() {
        let analyzer = EmotionalAnalyzer::new();
        let pure = analyzer.analyze("estoy feliz");
        let mixed = analyzer.analyze("estoy feliz pero también triste y con miedo");

        assert!(mixed.confidence < pure.confidence);
    }

    #[test]
    fn test_intensity_scales_with_confidence() {
        let joy = EmotionalState::from_vad(EmotionCategory::Joy, 0.8, 0.6, 0.7);
        let mut shaky = joy.clone();
        shaky.confidence = 0.2;

        assert!(joy.intensity() > shaky.intensity());
        assert!((joy.intensity() - (0.4 * 0.8 + 0.6 * 0.6)).abs() < 0.001);
    }

    #[test]
    fn test_alignment_identity_and_symmetry() {
        let a = EmotionalState::from_vad(EmotionCategory::Joy, 0.8, 0.6, 0.7);
        let b = EmotionalState::from_vad(EmotionCategory::Sadness, 0.2, 0.4, 0.3);

        assert!((a.alignment(&a) - 1.0).abs() < f32::EPSILON);
        assert!((a.alignment(&b) - b.alignment(&a)).abs() < f32::EPSILON);
        assert!(a.alignment(&b) < 1.0);
    }
}
