// Core data models for the emotion overlay application

/// Represents a single video frame with RGB data
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    /// Creates a new Frame with the given parameters
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }
}

/// The closed set of emotion labels the expression classifier reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Neutral,
    Surprised,
    Disgusted,
    Fearful,
}

impl EmotionLabel {
    /// Canonical label order. Dominant-emotion scans iterate in this order,
    /// so ties resolve to the earliest label listed here.
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Neutral,
        EmotionLabel::Surprised,
        EmotionLabel::Disgusted,
        EmotionLabel::Fearful,
    ];

    /// Raw label string as reported by the classifier
    #[allow(dead_code)]
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Disgusted => "disgusted",
            EmotionLabel::Fearful => "fearful",
        }
    }

    /// Human-readable display name; falls back to the raw label for any
    /// value without a translation
    pub fn display_name(&self) -> &'static str {
        match self {
            EmotionLabel::Happy => "Happy",
            EmotionLabel::Sad => "Sad",
            EmotionLabel::Angry => "Angry",
            EmotionLabel::Neutral => "Neutral",
            EmotionLabel::Surprised => "Surprised",
            EmotionLabel::Disgusted => "Disgusted",
            EmotionLabel::Fearful => "Fearful",
        }
    }

    fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|l| l == self)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Probability per emotion label, produced fresh on every detection tick.
/// Values live in [0, 1] but are not required to sum to exactly 1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmotionDistribution {
    values: [f32; 7],
}

impl EmotionDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn get(&self, label: EmotionLabel) -> f32 {
        self.values[label.index()]
    }

    #[allow(dead_code)]
    pub fn set(&mut self, label: EmotionLabel, value: f32) {
        self.values[label.index()] = value;
    }

    /// Adds to a label's probability. Classifier outputs without a label of
    /// their own fold into their nearest label this way.
    pub fn add(&mut self, label: EmotionLabel, value: f32) {
        self.values[label.index()] += value;
    }

    /// Iterates (label, probability) pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        EmotionLabel::ALL
            .iter()
            .map(move |&label| (label, self.values[label.index()]))
    }

    /// The label with the greatest probability under a strictly-greater
    /// running maximum over the canonical scan order. Ties keep the
    /// earliest-encountered maximum. Returns None when nothing exceeds
    /// zero probability.
    pub fn dominant(&self) -> Option<DominantEmotion> {
        let mut max_label = None;
        let mut max_value = 0.0f32;

        for (label, value) in self.iter() {
            if value > max_value {
                max_value = value;
                max_label = Some(label);
            }
        }

        max_label.map(|label| DominantEmotion {
            label,
            value: max_value,
        })
    }
}

/// Derived view over the current distribution; computed on demand, never stored
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DominantEmotion {
    pub label: EmotionLabel,
    pub value: f32,
}

impl DominantEmotion {
    /// Probability formatted with one decimal, e.g. "82.0%"
    pub fn value_percent(&self) -> String {
        format_percent(self.value)
    }
}

/// Formats a probability in [0, 1] as a one-decimal percentage
pub fn format_percent(value: f32) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Axis-aligned face bounding box in the coordinate space of the frame
/// the detector saw
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceRegion {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rescales the region from a source surface size onto a target surface
    /// size, so overlay coordinates align with the displayed video
    pub fn scaled(&self, from: (f32, f32), to: (f32, f32)) -> FaceRegion {
        let sx = if from.0 > 0.0 { to.0 / from.0 } else { 0.0 };
        let sy = if from.1 > 0.0 { to.1 / from.1 } else { 0.0 };
        FaceRegion {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

/// A face region together with its expression distribution
#[derive(Clone, Debug, PartialEq)]
pub struct FaceExpression {
    pub region: FaceRegion,
    pub expressions: EmotionDistribution,
}

/// The latest detection result published by the polling loop. Absent
/// entirely when the last tick found no face.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionSnapshot {
    pub face: FaceExpression,
    /// Pixel dimensions of the frame the detection was computed on
    pub frame_width: u32,
    pub frame_height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn distribution(pairs: &[(EmotionLabel, f32)]) -> EmotionDistribution {
        let mut dist = EmotionDistribution::new();
        for &(label, value) in pairs {
            dist.set(label, value);
        }
        dist
    }

    #[test]
    fn test_dominant_picks_greatest() {
        let dist = distribution(&[
            (EmotionLabel::Happy, 0.82),
            (EmotionLabel::Neutral, 0.10),
            (EmotionLabel::Sad, 0.08),
        ]);
        let dominant = dist.dominant().unwrap();
        assert_eq!(dominant.label, EmotionLabel::Happy);
        assert_relative_eq!(dominant.value, 0.82);
        assert_eq!(dominant.value_percent(), "82.0%");
    }

    #[test]
    fn test_dominant_tie_keeps_first_seen() {
        // Sad precedes Neutral in canonical order; a strictly-greater scan
        // must keep Sad when both carry the same maximum.
        let dist = distribution(&[
            (EmotionLabel::Neutral, 0.4),
            (EmotionLabel::Sad, 0.4),
            (EmotionLabel::Happy, 0.2),
        ]);
        assert_eq!(dist.dominant().unwrap().label, EmotionLabel::Sad);
    }

    #[test]
    fn test_dominant_all_zero_is_none() {
        assert!(EmotionDistribution::new().dominant().is_none());
    }

    #[rstest]
    #[case(0.0, "0.0%")]
    #[case(0.825, "82.5%")]
    #[case(1.0, "100.0%")]
    #[case(0.3333, "33.3%")]
    fn test_format_percent(#[case] value: f32, #[case] expected: &str) {
        assert_eq!(format_percent(value), expected);
    }

    #[test]
    fn test_iter_follows_canonical_order() {
        let dist = EmotionDistribution::new();
        let labels: Vec<EmotionLabel> = dist.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, EmotionLabel::ALL.to_vec());
    }

    #[test]
    fn test_region_scaled_identity() {
        let region = FaceRegion::new(100.0, 50.0, 200.0, 150.0);
        let same = region.scaled((640.0, 480.0), (640.0, 480.0));
        assert_eq!(same, region);
    }

    #[test]
    fn test_region_scaled_proportional() {
        let region = FaceRegion::new(100.0, 50.0, 200.0, 100.0);
        let scaled = region.scaled((640.0, 480.0), (320.0, 240.0));
        assert_relative_eq!(scaled.x, 50.0);
        assert_relative_eq!(scaled.y, 25.0);
        assert_relative_eq!(scaled.width, 100.0);
        assert_relative_eq!(scaled.height, 50.0);
    }

    #[test]
    fn test_region_scaled_degenerate_source() {
        let region = FaceRegion::new(10.0, 10.0, 20.0, 20.0);
        let scaled = region.scaled((0.0, 0.0), (640.0, 480.0));
        assert_relative_eq!(scaled.width, 0.0);
        assert_relative_eq!(scaled.height, 0.0);
    }

    #[test]
    fn test_display_name_fallback_matches_raw() {
        for label in EmotionLabel::ALL {
            assert_eq!(label.display_name().to_lowercase(), label.as_str());
        }
    }
}
