//! Built-in species catalog.

use crate::climate::schedule::{ClimateProfile, ClimateSchedule};

use super::profile::{BuiltinProfile, LocalizedLabel};

pub static BUILTIN_PROFILES: [BuiltinProfile; 3] = [
    BuiltinProfile {
        key: "builtin:pogona_vitticeps",
        labels: &[
            LocalizedLabel {
                language: "fr",
                label: "Pogona vitticeps (Dragon barbu)",
            },
            LocalizedLabel {
                language: "en",
                label: "Pogona vitticeps (Bearded dragon)",
            },
            LocalizedLabel {
                language: "es",
                label: "Pogona vitticeps (Dragón barbudo)",
            },
        ],
        habitat: "Semi-arid Australian interior",
        uv_index_category: "Ferguson zone 3-4",
        season_cycle: "Austral winter brumation",
        uv_index_peak: 7.0,
        schedule: ClimateSchedule {
            day_start_minute: 7 * 60,
            night_start_minute: 21 * 60,
            day: ClimateProfile {
                temperature_c: 35.0,
                humidity_pct: 35.0,
                temp_hysteresis_c: 2.0,
                humidity_hysteresis_pct: 10.0,
            },
            night: ClimateProfile {
                temperature_c: 22.0,
                humidity_pct: 45.0,
                temp_hysteresis_c: 1.5,
                humidity_hysteresis_pct: 12.0,
            },
            day_uvi_max: 7.0,
            night_uvi_max: 0.5,
        },
    },
    BuiltinProfile {
        key: "builtin:furcifer_parsonii",
        labels: &[
            LocalizedLabel {
                language: "fr",
                label: "Furcifer parsonii (Caméléon de Parson)",
            },
            LocalizedLabel {
                language: "en",
                label: "Furcifer parsonii (Parson's chameleon)",
            },
            LocalizedLabel {
                language: "es",
                label: "Furcifer parsonii (Camaleón de Parson)",
            },
        ],
        habitat: "Eastern Madagascar rainforest",
        uv_index_category: "Ferguson zone 2",
        season_cycle: "Cool dry season May-Sept",
        uv_index_peak: 3.5,
        schedule: ClimateSchedule {
            day_start_minute: 6 * 60,
            night_start_minute: 19 * 60,
            day: ClimateProfile {
                temperature_c: 28.0,
                humidity_pct: 75.0,
                temp_hysteresis_c: 1.0,
                humidity_hysteresis_pct: 12.0,
            },
            night: ClimateProfile {
                temperature_c: 20.0,
                humidity_pct: 90.0,
                temp_hysteresis_c: 1.5,
                humidity_hysteresis_pct: 15.0,
            },
            day_uvi_max: 3.5,
            night_uvi_max: 0.3,
        },
    },
    BuiltinProfile {
        key: "builtin:eublepharis_macularius",
        labels: &[
            LocalizedLabel {
                language: "fr",
                label: "Eublepharis macularius (Gecko léopard)",
            },
            LocalizedLabel {
                language: "en",
                label: "Eublepharis macularius (Leopard gecko)",
            },
            LocalizedLabel {
                language: "es",
                label: "Eublepharis macularius (Geco leopardo)",
            },
        ],
        habitat: "Rocky scrubland, Pakistan to NW India",
        uv_index_category: "Ferguson zone 1",
        season_cycle: "Winter cooling Dec-Feb",
        uv_index_peak: 2.5,
        schedule: ClimateSchedule {
            day_start_minute: 8 * 60,
            night_start_minute: 22 * 60,
            day: ClimateProfile {
                temperature_c: 32.0,
                humidity_pct: 45.0,
                temp_hysteresis_c: 1.5,
                humidity_hysteresis_pct: 8.0,
            },
            night: ClimateProfile {
                temperature_c: 24.0,
                humidity_pct: 60.0,
                temp_hysteresis_c: 2.0,
                humidity_hysteresis_pct: 10.0,
            },
            day_uvi_max: 2.5,
            night_uvi_max: 0.0,
        },
    },
];

pub fn find_builtin(key: &str) -> Option<&'static BuiltinProfile> {
    BUILTIN_PROFILES.iter().find(|p| p.key == key)
}

/// Profile applied when nothing else has been selected.
pub fn default_builtin() -> &'static BuiltinProfile {
    &BUILTIN_PROFILES[0]
}
