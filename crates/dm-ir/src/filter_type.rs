//! Filter types and their preset table.

/// The ten biquad flavours plus the bypass sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FilterType {
    #[default]
    None = 0,
    LowPass = 1,
    HighPass = 2,
    BandPass = 3,
    /// Band reject.
    Notch = 4,
    /// Phase shift only.
    AllPass = 5,
    Peaking = 6,
    LowShelf = 7,
    HighShelf = 8,
    /// High-Q low-pass.
    Resonant = 9,
}

/// Named starting point for a filter type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterPreset {
    pub kind: FilterType,
    /// Hz
    pub cutoff: f32,
    /// Q factor
    pub resonance: f32,
    /// dB, only meaningful for the EQ types.
    pub gain: f32,
    pub name: &'static str,
}

const fn preset(kind: FilterType, cutoff: f32, resonance: f32, gain: f32, name: &'static str) -> FilterPreset {
    FilterPreset { kind, cutoff, resonance, gain, name }
}

static PRESETS: [FilterPreset; 10] = [
    preset(FilterType::None, 1000.0, 0.707, 0.0, "None"),
    preset(FilterType::LowPass, 2000.0, 0.707, 0.0, "Low Pass"),
    preset(FilterType::HighPass, 500.0, 0.707, 0.0, "High Pass"),
    preset(FilterType::BandPass, 1000.0, 2.0, 0.0, "Band Pass"),
    preset(FilterType::Notch, 1000.0, 2.0, 0.0, "Notch"),
    preset(FilterType::AllPass, 1000.0, 0.707, 0.0, "All Pass"),
    preset(FilterType::Peaking, 1000.0, 1.0, 6.0, "Peaking EQ"),
    preset(FilterType::LowShelf, 200.0, 0.707, 6.0, "Low Shelf"),
    preset(FilterType::HighShelf, 5000.0, 0.707, 6.0, "High Shelf"),
    preset(FilterType::Resonant, 1500.0, 5.0, 0.0, "Resonant"),
];

impl FilterType {
    /// All types in id order.
    pub const ALL: [FilterType; 10] = [
        FilterType::None,
        FilterType::LowPass,
        FilterType::HighPass,
        FilterType::BandPass,
        FilterType::Notch,
        FilterType::AllPass,
        FilterType::Peaking,
        FilterType::LowShelf,
        FilterType::HighShelf,
        FilterType::Resonant,
    ];

    /// Map a numeric id (0-9) to a filter type.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Numeric id (0-9).
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Preset defaults for this type.
    pub fn preset(self) -> &'static FilterPreset {
        &PRESETS[self as usize]
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        self.preset().name
    }
}
