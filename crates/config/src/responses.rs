//! German response templates.
//!
//! Each domain/action bucket carries several phrasings; a random pick keeps
//! confirmations from sounding canned. Randomization is part of the design:
//! tests either seed the RNG or assert membership in the pool.

use rand::seq::SliceRandom;
use rand::Rng;

/// Action buckets a confirmation can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseBucket {
    /// On/off with an {action} verb ("an"/"aus").
    Toggle,
    BrightnessUp,
    BrightnessDown,
    /// Brightness/position to a {value} percentage.
    ValueSet,
    Open,
    Close,
    SetTemperature,
    VacuumStart,
    VacuumArea,
    Generic,
}

pub const ERR_NOT_UNDERSTOOD: &str = "Entschuldigung, ich habe das nicht verstanden.";
pub const ERR_NO_DEVICES: &str = "Keine Geräte gefunden.";
pub const ERR_NOT_AVAILABLE: &str = "Das Gerät ist nicht verfügbar.";
pub const ERR_NOT_EXPOSED: &str = "Dieses Gerät ist nicht für Sprachbefehle freigegeben.";
pub const ERR_INTERNAL: &str = "Interner Fehler.";
pub const ERR_ACTION_FAILED: &str = "Die Aktion konnte nicht ausgeführt werden.";
pub const ERR_CLOUD_UNCONFIGURED: &str = "Der Cloud-Dienst ist nicht konfiguriert.";
pub const ERR_CLOUD_QUOTA: &str =
    "Entschuldigung, der Cloud-Dienst ist vorübergehend nicht erreichbar. Bitte versuche es später erneut.";
pub const ERR_CLOUD: &str = "Entschuldigung, bei der Cloud-Anfrage ist ein Fehler aufgetreten.";
pub const MSG_CANCELLED: &str = "Okay, abgebrochen.";
pub const Q_WHICH_DEVICE: &str = "Welches Gerät meinst du?";
pub const Q_WHICH_CALENDAR: &str = "In welchen Kalender?";
pub const Q_TIMER_DURATION: &str = "Wie lange soll der Timer laufen?";
pub const Q_EVENT_SUMMARY: &str = "Wie soll der Termin heißen?";
pub const Q_EVENT_DATETIME: &str = "Wann soll der Termin sein?";

fn templates(domain: &str, bucket: ResponseBucket) -> &'static [&'static str] {
    use ResponseBucket::*;
    match (domain, bucket) {
        ("light", Toggle) => &[
            "{name} ist jetzt {action}.",
            "{name} ist {action}.",
            "Ich habe {name} {action}gemacht.",
            "{name} ist jetzt {action}geschaltet.",
        ],
        ("light", BrightnessUp) => &[
            "{name} ist jetzt heller.",
            "Ich habe {name} aufgehellt.",
            "Die Helligkeit von {name} ist erhöht.",
        ],
        ("light", BrightnessDown) => &[
            "{name} ist jetzt dunkler.",
            "Ich habe {name} gedimmt.",
            "Die Helligkeit von {name} ist reduziert.",
        ],
        ("light", ValueSet) => &[
            "{name} ist auf {value} Prozent gestellt.",
            "{name} leuchtet jetzt mit {value} Prozent.",
            "Ich habe {name} auf {value} Prozent gesetzt.",
        ],
        ("cover", Toggle) => &[
            "{name} ist jetzt {action}.",
            "Ich habe {name} {action}gemacht.",
            "{name} ist {action}.",
        ],
        ("cover", Open) => &[
            "{name} ist jetzt offen.",
            "Ich habe {name} geöffnet.",
            "{name} ist hochgefahren.",
        ],
        ("cover", Close) => &[
            "{name} ist jetzt geschlossen.",
            "Ich habe {name} geschlossen.",
            "{name} ist runtergefahren.",
        ],
        ("cover", ValueSet) => &[
            "{name} ist auf {value} Prozent.",
            "Ich habe {name} auf {value} Prozent gestellt.",
            "{name} steht jetzt bei {value} Prozent.",
        ],
        ("switch", Toggle) => &[
            "{name} ist jetzt {action}.",
            "Ich habe {name} {action}geschaltet.",
            "{name} ist {action}.",
        ],
        ("fan", Toggle) => &[
            "{name} ist jetzt {action}.",
            "Ich habe {name} {action}geschaltet.",
            "{name} ist {action}.",
        ],
        ("climate", SetTemperature) => &[
            "{name} ist auf {value} Grad eingestellt.",
            "Ich habe {name} auf {value} Grad gestellt.",
            "Zieltemperatur für {name} ist {value} Grad.",
        ],
        ("vacuum", VacuumStart) => &[
            "Staubsauger gestartet.",
            "Der Staubsauger läuft.",
            "Ich habe den Staubsauger gestartet.",
        ],
        ("vacuum", VacuumArea) => &[
            "Staubsauger saugt jetzt {value}.",
            "Ich schicke den Staubsauger in {value}.",
            "{value} wird gesaugt.",
        ],
        (_, Toggle) => &[
            "{name} ist jetzt {action}.",
            "Ich habe {name} {action}gemacht.",
            "{name} ist {action}.",
        ],
        (_, ValueSet) => &[
            "{name} ist auf {value} eingestellt.",
            "Ich habe {name} auf {value} gesetzt.",
        ],
        _ => &["Erledigt.", "Alles klar.", "Okay, gemacht."],
    }
}

/// All templates of a bucket, for tests asserting pool membership.
pub fn template_pool(domain: &str, bucket: ResponseBucket) -> Vec<String> {
    templates(domain, bucket)
        .iter()
        .map(|t| t.to_string())
        .collect()
}

/// Render a random confirmation with `{name}`/`{value}`/`{action}` filled in.
pub fn render_confirmation<R: Rng + ?Sized>(
    rng: &mut R,
    domain: &str,
    bucket: ResponseBucket,
    name: &str,
    value: &str,
    action: &str,
) -> String {
    let pool = templates(domain, bucket);
    let template = pool.choose(rng).copied().unwrap_or("Erledigt.");
    template
        .replace("{name}", name)
        .replace("{value}", value)
        .replace("{action}", action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_render_substitutes_placeholders() {
        let mut rng = StdRng::seed_from_u64(7);
        let msg = render_confirmation(
            &mut rng,
            "light",
            ResponseBucket::Toggle,
            "Küche",
            "",
            "an",
        );
        assert!(msg.contains("Küche"));
        assert!(msg.contains("an"));
        assert!(!msg.contains("{name}"));
    }

    #[test]
    fn test_render_stays_in_pool() {
        let pool = template_pool("cover", ResponseBucket::Close);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let msg = render_confirmation(
                &mut rng,
                "cover",
                ResponseBucket::Close,
                "Büro",
                "",
                "",
            );
            assert!(
                pool.iter().any(|t| t.replace("{name}", "Büro") == msg),
                "{msg} not produced by any template"
            );
        }
    }
}
