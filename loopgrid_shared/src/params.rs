use crate::kinds::EffectKind;
use std::collections::BTreeMap;

/// Parameter name -> value for one effect instance.
pub type EffectParams = BTreeMap<String, f64>;

/// Inclusive bounds an editing surface must keep a parameter within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

// Authoritative per-effect bounds
const RANGE_TABLE: &[(&str, &str, ParamRange)] = &[
    ("Reverb", "decay", ParamRange::new(0.01, 10.0)),
    ("Reverb", "wet", ParamRange::new(0.0, 1.0)),
    ("Delay", "delayTime", ParamRange::new(0.01, 1.0)),
    ("Delay", "feedback", ParamRange::new(0.01, 0.95)),
    ("Delay", "wet", ParamRange::new(0.0, 1.0)),
    ("Distortion", "distortion", ParamRange::new(0.01, 1.0)),
    ("Chorus", "frequency", ParamRange::new(0.01, 20.0)),
    ("Chorus", "delayTime", ParamRange::new(0.01, 10.0)),
    ("Chorus", "depth", ParamRange::new(0.01, 1.0)),
    ("Phaser", "baseFrequency", ParamRange::new(0.01, 5000.0)),
    ("Tremolo", "frequency", ParamRange::new(0.01, 20.0)),
    ("Tremolo", "depth", ParamRange::new(0.01, 1.0)),
];

/// Bounds for a parameter of the given effect. Parameters missing from the
/// table fall back to a rule keyed on the name alone.
pub fn param_range(kind: &EffectKind, name: &str) -> ParamRange {
    RANGE_TABLE
        .iter()
        .find(|(effect, param, _)| *effect == kind.name() && *param == name)
        .map(|(_, _, range)| *range)
        .unwrap_or_else(|| match name {
            "wet" => ParamRange::new(0.0, 1.0),
            "frequency" => ParamRange::new(0.01, 20.0),
            _ => ParamRange::new(0.01, 10.0),
        })
}

/// Clamp helper for editors. The composition functions never clamp.
pub fn clamp_param(kind: &EffectKind, name: &str, value: f64) -> f64 {
    param_range(kind, name).clamp(value)
}

impl EffectKind {
    /// Parameters a freshly added effect starts with.
    pub fn default_params(&self) -> EffectParams {
        let pairs: &[(&str, f64)] = match self {
            EffectKind::Reverb => &[("decay", 2.0), ("wet", 0.4)],
            EffectKind::Delay => &[("delayTime", 0.25), ("feedback", 0.4), ("wet", 0.4)],
            EffectKind::Distortion => &[("distortion", 0.4)],
            EffectKind::Chorus => &[
                ("frequency", 4.0),
                ("delayTime", 2.5),
                ("depth", 0.5),
                ("wet", 0.5),
            ],
            EffectKind::Phaser => &[
                ("frequency", 15.0),
                ("octaves", 3.0),
                ("baseFrequency", 1000.0),
                ("wet", 0.5),
            ],
            EffectKind::Tremolo => &[("frequency", 9.0), ("depth", 0.75), ("wet", 0.5)],
            EffectKind::Other(_) => &[],
        };
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }
}
