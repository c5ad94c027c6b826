use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Voice types a track can be assigned.
///
/// Names arriving from saved files or palettes are mapped through a lookup
/// table; anything unrecognized is kept as `Other` so it round-trips, and is
/// played with the default voice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstrumentKind {
    #[default]
    Synth,
    AMSynth,
    FMSynth,
    DuoSynth,
    MonoSynth,
    MembraneSynth,
    MetalSynth,
    PluckSynth,
    PolySynth,
    PolyFMSynth,
    PolyAMSynth,
    Drum,
    Bass,
    Piano,
    Guitar,
    Other(String),
}

/// Where a sample-backed voice fetches its recordings from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSource {
    pub base_url: &'static str,
    /// (note, file) pairs relative to `base_url`
    pub urls: &'static [(&'static str, &'static str)],
}

const PIANO_SAMPLES: SampleSource = SampleSource {
    base_url: "https://tonejs.github.io/audio/salamander/",
    urls: &[("C4", "C4.mp3")],
};

const GUITAR_SAMPLES: SampleSource = SampleSource {
    base_url: "https://gleitz.github.io/midi-js-soundfonts/FluidR3_GM/acoustic_guitar_nylon-mp3/",
    urls: &[("C4", "C4.mp3")],
};

lazy_static! {
    static ref INSTRUMENT_TABLE: HashMap<&'static str, InstrumentKind> = InstrumentKind::ALL
        .iter()
        .map(|kind| (kind.name(), kind.clone()))
        .collect();

    static ref EFFECT_TABLE: HashMap<&'static str, EffectKind> = EffectKind::ALL
        .iter()
        .map(|kind| (kind.name(), kind.clone()))
        .collect();
}

impl InstrumentKind {
    /// Every known voice type, in palette order.
    pub const ALL: [InstrumentKind; 15] = [
        InstrumentKind::Synth,
        InstrumentKind::AMSynth,
        InstrumentKind::FMSynth,
        InstrumentKind::DuoSynth,
        InstrumentKind::MonoSynth,
        InstrumentKind::MembraneSynth,
        InstrumentKind::MetalSynth,
        InstrumentKind::PluckSynth,
        InstrumentKind::PolySynth,
        InstrumentKind::PolyFMSynth,
        InstrumentKind::PolyAMSynth,
        InstrumentKind::Drum,
        InstrumentKind::Bass,
        InstrumentKind::Piano,
        InstrumentKind::Guitar,
    ];

    pub fn from_name(name: &str) -> Self {
        INSTRUMENT_TABLE
            .get(name)
            .cloned()
            .unwrap_or_else(|| InstrumentKind::Other(name.to_string()))
    }

    pub fn name(&self) -> &str {
        match self {
            InstrumentKind::Synth => "Synth",
            InstrumentKind::AMSynth => "AMSynth",
            InstrumentKind::FMSynth => "FMSynth",
            InstrumentKind::DuoSynth => "DuoSynth",
            InstrumentKind::MonoSynth => "MonoSynth",
            InstrumentKind::MembraneSynth => "MembraneSynth",
            InstrumentKind::MetalSynth => "MetalSynth",
            InstrumentKind::PluckSynth => "PluckSynth",
            InstrumentKind::PolySynth => "PolySynth",
            InstrumentKind::PolyFMSynth => "PolyFMSynth",
            InstrumentKind::PolyAMSynth => "PolyAMSynth",
            InstrumentKind::Drum => "Drum",
            InstrumentKind::Bass => "Bass",
            InstrumentKind::Piano => "Piano",
            InstrumentKind::Guitar => "Guitar",
            InstrumentKind::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, InstrumentKind::Other(_))
    }

    /// The kind a voice is actually built from: unknown kinds fall back to `default`.
    pub fn resolve(&self, default: &InstrumentKind) -> InstrumentKind {
        match self {
            InstrumentKind::Other(_) if default.is_known() => default.clone(),
            InstrumentKind::Other(_) => InstrumentKind::Synth,
            known => known.clone(),
        }
    }

    /// Sample-backed voices load their recordings asynchronously and can't
    /// sound until loading finishes.
    pub fn sample_source(&self) -> Option<SampleSource> {
        match self {
            InstrumentKind::Piano => Some(PIANO_SAMPLES),
            InstrumentKind::Guitar => Some(GUITAR_SAMPLES),
            _ => None,
        }
    }

    pub fn is_sample_backed(&self) -> bool {
        self.sample_source().is_some()
    }
}

impl From<String> for InstrumentKind {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<&str> for InstrumentKind {
    fn from(value: &str) -> Self {
        Self::from_name(value)
    }
}

impl From<InstrumentKind> for String {
    fn from(value: InstrumentKind) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Audio processors that can sit in a track's effect chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EffectKind {
    Reverb,
    Delay,
    Distortion,
    Chorus,
    Phaser,
    Tremolo,
    Other(String),
}

impl EffectKind {
    pub const ALL: [EffectKind; 6] = [
        EffectKind::Reverb,
        EffectKind::Delay,
        EffectKind::Distortion,
        EffectKind::Chorus,
        EffectKind::Phaser,
        EffectKind::Tremolo,
    ];

    pub fn from_name(name: &str) -> Self {
        EFFECT_TABLE
            .get(name)
            .cloned()
            .unwrap_or_else(|| EffectKind::Other(name.to_string()))
    }

    pub fn name(&self) -> &str {
        match self {
            EffectKind::Reverb => "Reverb",
            EffectKind::Delay => "Delay",
            EffectKind::Distortion => "Distortion",
            EffectKind::Chorus => "Chorus",
            EffectKind::Phaser => "Phaser",
            EffectKind::Tremolo => "Tremolo",
            EffectKind::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EffectKind::Other(_))
    }
}

impl From<String> for EffectKind {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<&str> for EffectKind {
    fn from(value: &str) -> Self {
        Self::from_name(value)
    }
}

impl From<EffectKind> for String {
    fn from(value: EffectKind) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in InstrumentKind::ALL {
            assert_eq!(InstrumentKind::from_name(kind.name()), kind);
        }
        for kind in EffectKind::ALL {
            assert_eq!(EffectKind::from_name(kind.name()), kind);
        }
    }

    #[test]
    fn test_unknown_instrument_falls_back() {
        let kind = InstrumentKind::from_name("Theremin");
        assert_eq!(kind, InstrumentKind::Other("Theremin".to_string()));
        assert!(!kind.is_known());
        assert_eq!(kind.resolve(&InstrumentKind::Synth), InstrumentKind::Synth);
        assert_eq!(kind.resolve(&InstrumentKind::Bass), InstrumentKind::Bass);
        // A bad default still yields a playable voice
        assert_eq!(kind.resolve(&kind), InstrumentKind::Synth);
        assert_eq!(InstrumentKind::Piano.resolve(&InstrumentKind::Synth), InstrumentKind::Piano);
        assert_eq!(InstrumentKind::default(), InstrumentKind::Synth);
    }

    #[test]
    fn test_sample_backed() {
        assert!(InstrumentKind::Piano.is_sample_backed());
        assert!(InstrumentKind::Guitar.is_sample_backed());
        assert!(!InstrumentKind::Drum.is_sample_backed());
        let source = InstrumentKind::Piano.sample_source().unwrap();
        assert_eq!(source.urls, &[("C4", "C4.mp3")]);
    }

    #[test]
    fn test_serde_keeps_unknown_names() {
        let kinds = vec![EffectKind::Chorus, EffectKind::from_name("Flanger")];
        let json = serde_json::to_string(&kinds).unwrap();
        assert_eq!(json, r#"["Chorus","Flanger"]"#);
        let back: Vec<EffectKind> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kinds);
    }
}
