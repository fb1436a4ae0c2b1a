//! Static per-domain configuration.
//!
//! One table drives domain detection, response wording, anchor generation
//! and step control. Device words are derived from the first keyword pair of
//! each domain, with grammatical cases computed from the nominative form.

use heim_agent_text_processing::{
    capitalize_article_phrase, nominative_to_accusative, nominative_to_dative,
};
use once_cell::sync::Lazy;

/// Step configuration for relative adjustments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepConfig {
    /// Percentage-based domains (light, cover, fan).
    Percent {
        attribute: &'static str,
        step_percent: u32,
        min_step: u32,
        /// Target value when stepping up from off.
        off_to_on: u32,
    },
    /// Absolute-step domains (climate).
    Absolute {
        attribute: &'static str,
        step: f64,
        min: f64,
        max: f64,
    },
}

/// Device word in the grammatical forms response templates and anchor
/// patterns need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceWords {
    /// "das Licht" — subject position, questions.
    pub nominative: String,
    /// "das Licht" / "den Rollladen" — object position, commands.
    pub accusative: String,
    /// "dem Licht" — after "von", "mit", ...
    pub dative: String,
    /// "die Lichter" — area scope with several entities.
    pub plural: String,
}

#[derive(Debug, Clone)]
pub struct DomainConfig {
    pub domain: &'static str,
    /// "article singular" → "article plural" keyword pairs; the first pair
    /// is the canonical device word.
    pub keyword_pairs: &'static [(&'static str, &'static str)],
    /// Detection keywords with no singular/plural structure.
    pub extra_keywords: &'static [&'static str],
    pub intents: &'static [&'static str],
    pub step: Option<StepConfig>,
    /// state value → spoken German word.
    pub states_de: &'static [(&'static str, &'static str)],
}

impl DomainConfig {
    /// All detection keywords (nouns from the pairs plus extras), lowercase.
    pub fn keywords(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        for (singular, plural) in self.keyword_pairs {
            if let Some(noun) = singular.split_whitespace().last() {
                out.push(noun);
            }
            if let Some(noun) = plural.split_whitespace().last() {
                out.push(noun);
            }
        }
        out.extend_from_slice(self.extra_keywords);
        out
    }

    /// Device words in all four grammatical forms, properly capitalized.
    pub fn device_words(&self) -> DeviceWords {
        let Some((singular, plural)) = self.keyword_pairs.first() else {
            let fallback = format!("das {}", capitalize_first(self.domain));
            return DeviceWords {
                nominative: fallback.clone(),
                accusative: fallback.clone(),
                dative: fallback.replace("das", "dem"),
                plural: fallback,
            };
        };
        let nominative = capitalize_article_phrase(singular);
        DeviceWords {
            accusative: nominative_to_accusative(&nominative),
            dative: nominative_to_dative(&nominative),
            plural: capitalize_article_phrase(plural),
            nominative,
        }
    }

    /// Capitalized noun for responses ("Licht", plural "Lichter").
    pub fn display_name(&self, plural: bool) -> String {
        let source = match self.keyword_pairs.first() {
            Some((singular, plural_form)) => {
                if plural {
                    *plural_form
                } else {
                    *singular
                }
            }
            None => self.domain,
        };
        source
            .split_whitespace()
            .last()
            .map(capitalize_first)
            .unwrap_or_default()
    }

    pub fn state_word<'a>(&self, state: &'a str) -> &'a str {
        self.states_de
            .iter()
            .find(|(value, _)| *value == state)
            .map(|(_, word)| *word)
            .unwrap_or(state)
    }

    pub fn supports_intent(&self, intent: &str) -> bool {
        self.intents.contains(&intent)
    }
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

static DOMAINS: Lazy<Vec<DomainConfig>> = Lazy::new(|| {
    vec![
        DomainConfig {
            domain: "light",
            keyword_pairs: &[
                ("das licht", "die lichter"),
                ("die lampe", "die lampen"),
                ("die leuchte", "die leuchten"),
                ("die beleuchtung", "die beleuchtungen"),
                ("der spot", "die spots"),
            ],
            extra_keywords: &[],
            intents: &[
                "HassTurnOn",
                "HassTurnOff",
                "HassLightSet",
                "HassGetState",
                "HassTemporaryControl",
            ],
            step: Some(StepConfig::Percent {
                attribute: "brightness",
                step_percent: 35,
                min_step: 10,
                off_to_on: 50,
            }),
            states_de: &[("on", "an"), ("off", "aus")],
        },
        DomainConfig {
            domain: "cover",
            keyword_pairs: &[
                ("der rollladen", "die rollläden"),
                ("das rollo", "die rollos"),
                ("die jalousie", "die jalousien"),
                ("die markise", "die markisen"),
                ("die beschattung", "die beschattungen"),
            ],
            extra_keywords: &[],
            intents: &[
                "HassTurnOn",
                "HassTurnOff",
                "HassSetPosition",
                "HassGetState",
                "HassTemporaryControl",
            ],
            step: Some(StepConfig::Percent {
                attribute: "position",
                step_percent: 25,
                min_step: 10,
                off_to_on: 100,
            }),
            states_de: &[
                ("open", "offen"),
                ("closed", "geschlossen"),
                ("opening", "öffnet"),
                ("closing", "schließt"),
            ],
        },
        DomainConfig {
            domain: "switch",
            keyword_pairs: &[
                ("die steckdose", "die steckdosen"),
                ("der schalter", "die schalter"),
                ("der zwischenstecker", "die zwischenstecker"),
                ("der strom", "der strom"),
            ],
            extra_keywords: &[],
            intents: &[
                "HassTurnOn",
                "HassTurnOff",
                "HassGetState",
                "HassTemporaryControl",
            ],
            step: None,
            states_de: &[("on", "an"), ("off", "aus")],
        },
        DomainConfig {
            domain: "fan",
            keyword_pairs: &[
                ("der ventilator", "die ventilatoren"),
                ("der lüfter", "die lüfter"),
            ],
            extra_keywords: &[],
            intents: &[
                "HassTurnOn",
                "HassTurnOff",
                "HassGetState",
                "HassTemporaryControl",
            ],
            step: Some(StepConfig::Percent {
                attribute: "percentage",
                step_percent: 25,
                min_step: 10,
                off_to_on: 50,
            }),
            states_de: &[("on", "an"), ("off", "aus")],
        },
        DomainConfig {
            domain: "climate",
            keyword_pairs: &[
                ("das thermostat", "die thermostate"),
                ("die heizung", "die heizungen"),
                ("die klimaanlage", "die klimaanlagen"),
            ],
            extra_keywords: &[],
            intents: &[
                "HassClimateSetTemperature",
                "HassTurnOn",
                "HassTurnOff",
                "HassGetState",
            ],
            step: Some(StepConfig::Absolute {
                attribute: "temperature",
                step: 1.0,
                min: 16.0,
                max: 28.0,
            }),
            states_de: &[
                ("heat", "heizt"),
                ("cool", "kühlt"),
                ("off", "aus"),
                ("idle", "im Leerlauf"),
            ],
        },
        DomainConfig {
            domain: "media_player",
            keyword_pairs: &[
                ("der fernseher", "die fernseher"),
                ("der tv", "die tvs"),
                ("die musik", "die musik"),
                ("das radio", "die radios"),
                ("der lautsprecher", "die lautsprecher"),
                ("der player", "die player"),
            ],
            extra_keywords: &[],
            intents: &["HassTurnOn", "HassTurnOff", "HassGetState"],
            step: None,
            states_de: &[
                ("on", "an"),
                ("off", "aus"),
                ("playing", "spielt"),
                ("paused", "pausiert"),
                ("idle", "im Leerlauf"),
            ],
        },
        DomainConfig {
            domain: "sensor",
            keyword_pairs: &[
                ("der sensor", "die sensoren"),
                ("die temperatur", "die temperaturen"),
                ("die luftfeuchtigkeit", "die luftfeuchtigkeiten"),
                ("die feuchtigkeit", "die feuchtigkeiten"),
                ("der wert", "die werte"),
                ("der status", "die status"),
                ("der zustand", "die zustände"),
            ],
            extra_keywords: &["grad", "warm", "kalt", "wieviel"],
            intents: &["HassGetState"],
            step: None,
            states_de: &[],
        },
        DomainConfig {
            domain: "vacuum",
            keyword_pairs: &[("der staubsauger", "die staubsauger")],
            extra_keywords: &[
                "saugen",
                "sauge",
                "staubsaugen",
                "staubsauge",
                "wischen",
                "wische",
                "putzen",
                "putze",
                "reinigen",
                "reinige",
                "roboter",
            ],
            intents: &["HassVacuumStart"],
            step: None,
            states_de: &[
                ("cleaning", "saugt"),
                ("docked", "angedockt"),
                ("returning", "kehrt zurück"),
                ("idle", "im Leerlauf"),
            ],
        },
        DomainConfig {
            domain: "timer",
            keyword_pairs: &[],
            extra_keywords: &["timer", "wecker", "countdown", "stoppuhr"],
            intents: &["HassTimerSet"],
            step: None,
            states_de: &[],
        },
        DomainConfig {
            domain: "calendar",
            keyword_pairs: &[],
            extra_keywords: &[
                "kalender",
                "termin",
                "termine",
                "ereignis",
                "event",
                "veranstaltung",
                "eintrag",
                "kalendereintrag",
            ],
            intents: &["HassCalendarCreate", "HassCreateEvent"],
            step: None,
            states_de: &[],
        },
        DomainConfig {
            domain: "automation",
            keyword_pairs: &[("die automatisierung", "die automatisierungen")],
            extra_keywords: &[
                "klingel",
                "türklingel",
                "doorbell",
                "benachrichtigung",
                "alarm",
                "automation",
            ],
            intents: &["HassTurnOn", "HassTurnOff", "HassTemporaryControl"],
            step: None,
            states_de: &[("on", "aktiv"), ("off", "inaktiv")],
        },
    ]
});

pub fn all_domains() -> &'static [DomainConfig] {
    &DOMAINS
}

pub fn domain_config(domain: &str) -> Option<&'static DomainConfig> {
    DOMAINS.iter().find(|c| c.domain == domain)
}

/// Detect the domain of an utterance by keyword, with fixed precedence for
/// the known conflicts: climate beats sensor, and the multi-turn domains
/// (calendar, timer, vacuum) beat everything generic.
pub fn detect_domain(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    let matches: Vec<&'static str> = DOMAINS
        .iter()
        .filter(|config| config.keywords().iter().any(|kw| lower.contains(kw)))
        .map(|config| config.domain)
        .collect();

    match matches.as_slice() {
        [] => None,
        [single] => Some(single),
        _ => {
            if matches.contains(&"calendar") {
                Some("calendar")
            } else if matches.contains(&"timer") {
                Some("timer")
            } else if matches.contains(&"vacuum") {
                Some("vacuum")
            } else if matches.contains(&"climate") && matches.contains(&"sensor") {
                Some("climate")
            } else {
                Some(matches[0])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_device_words_cases() {
        let light = domain_config("light").unwrap().device_words();
        assert_eq!(light.nominative, "das Licht");
        assert_eq!(light.accusative, "das Licht");
        assert_eq!(light.dative, "dem Licht");
        assert_eq!(light.plural, "die Lichter");

        let cover = domain_config("cover").unwrap().device_words();
        assert_eq!(cover.nominative, "der Rollladen");
        assert_eq!(cover.accusative, "den Rollladen");
        assert_eq!(cover.dative, "dem Rollladen");
        assert_eq!(cover.plural, "die Rollläden");
    }

    #[test]
    fn test_display_name() {
        let light = domain_config("light").unwrap();
        assert_eq!(light.display_name(false), "Licht");
        assert_eq!(light.display_name(true), "Lichter");
    }

    #[test]
    fn test_detect_domain() {
        assert_eq!(detect_domain("Schalte das Licht an"), Some("light"));
        assert_eq!(detect_domain("Rollladen runter"), Some("cover"));
        assert_eq!(detect_domain("Stelle einen Timer"), Some("timer"));
        assert_eq!(detect_domain("Mach den Kaffee"), None);
    }

    #[test]
    fn test_climate_beats_sensor() {
        // "Heizung" (climate) and "Grad" (sensor extra) both match.
        assert_eq!(detect_domain("Heizung auf 21 Grad"), Some("climate"));
    }

    #[test]
    fn test_step_configs() {
        match domain_config("light").unwrap().step {
            Some(StepConfig::Percent {
                step_percent,
                min_step,
                off_to_on,
                ..
            }) => {
                assert_eq!(step_percent, 35);
                assert_eq!(min_step, 10);
                assert_eq!(off_to_on, 50);
            }
            other => panic!("unexpected step config: {:?}", other),
        }
        assert!(domain_config("switch").unwrap().step.is_none());
    }
}
