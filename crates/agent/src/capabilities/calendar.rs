//! Calendar capability: one-shot extraction, slot filling across turns,
//! preview plus explicit confirmation before the event is created.

use super::CapabilityOutcome;
use crate::services::Services;
use heim_agent_config::responses as messages;
use heim_agent_core::{
    CalendarDraft, CalendarPending, CalendarStep, PendingData, PendingPayload, Slots, SpokenReply,
    Utterance,
};
use heim_agent_llm::Prompt;
use heim_agent_text_processing::{
    is_affirmative, is_negative, parse_duration_secs, ratio, resolve_relative_date_str,
};
use serde_json::{json, Value};

pub struct CalendarCapability {
    services: Services,
}

impl CalendarCapability {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Start an event-creation flow from the utterance and any NLU slots.
    pub async fn start(&self, utterance: &Utterance, slots: &Slots) -> CapabilityOutcome {
        let mut draft = self
            .extract_event(&utterance.text)
            .await
            .unwrap_or_default();

        if let Some(summary) = slots.get("summary").and_then(Value::as_str) {
            draft.summary = Some(summary.to_string());
        }
        if let Some(location) = slots.get("location").and_then(Value::as_str) {
            draft.location = Some(location.to_string());
        }
        if let Some(calendar) = slots.get("calendar").and_then(Value::as_str) {
            draft.calendar_id = Some(calendar.to_string());
        }
        if draft.duration_minutes.is_none() {
            if let Some(duration) = slots.get("duration").and_then(Value::as_str) {
                draft.duration_minutes =
                    parse_duration_secs(duration).map(|secs| (secs / 60) as u32);
            }
        }

        self.advance(draft, Vec::new()).await
    }

    /// Continue a pending calendar flow.
    pub async fn continue_flow(
        &self,
        utterance: &Utterance,
        pending: CalendarPending,
    ) -> CapabilityOutcome {
        let CalendarPending {
            step,
            mut event,
            calendars,
        } = pending;
        let text = utterance.text.trim();

        match step {
            CalendarStep::AskSummary => {
                event.summary = Some(text.to_string());
            }
            CalendarStep::AskDatetime => {
                match self.extract_event(&format!("Termin {text}")).await {
                    Some(parsed)
                        if parsed.start_date.is_some() || parsed.start_date_time.is_some() =>
                    {
                        event.start_date = parsed.start_date.or(event.start_date);
                        event.end_date = parsed.end_date.or(event.end_date);
                        event.start_date_time =
                            parsed.start_date_time.or(event.start_date_time);
                        event.end_date_time = parsed.end_date_time.or(event.end_date_time);
                        event.is_all_day = parsed.is_all_day || event.is_all_day;
                    }
                    _ => {
                        return CapabilityOutcome {
                            reply: SpokenReply::ask(
                                "Ich habe das Datum nicht verstanden. Bitte sag z.B. \
                                 'morgen um 10 Uhr' oder '25. Dezember'.",
                            ),
                            pending: Some(PendingData::new(
                                messages::Q_EVENT_DATETIME,
                                PendingPayload::Calendar(CalendarPending {
                                    step,
                                    event,
                                    calendars,
                                }),
                            )),
                        };
                    }
                }
            }
            CalendarStep::AskCalendar => match Self::match_calendar(text, &calendars) {
                Some(calendar_id) => event.calendar_id = Some(calendar_id),
                None => {
                    return CapabilityOutcome {
                        reply: SpokenReply::ask(
                            "Das habe ich nicht verstanden. Welcher Kalender?",
                        ),
                        pending: Some(PendingData::new(
                            messages::Q_WHICH_CALENDAR,
                            PendingPayload::Calendar(CalendarPending {
                                step,
                                event,
                                calendars,
                            }),
                        )),
                    };
                }
            },
            CalendarStep::Confirm => {
                if is_affirmative(text) {
                    return self.create_event(event).await;
                }
                if is_negative(text) {
                    return CapabilityOutcome::done(SpokenReply::say(
                        "Termin wurde nicht erstellt.",
                    ));
                }
                return CapabilityOutcome {
                    reply: SpokenReply::ask("Sag 'Ja' zum Bestätigen oder 'Nein' zum Abbrechen."),
                    pending: Some(PendingData::new(
                        "Soll ich den Termin erstellen?",
                        PendingPayload::Calendar(CalendarPending {
                            step,
                            event,
                            calendars,
                        }),
                    )),
                };
            }
        }

        self.advance(event, calendars).await
    }

    /// Ask for the next missing slot, or present the preview.
    async fn advance(&self, event: CalendarDraft, _calendars: Vec<String>) -> CapabilityOutcome {
        if event.summary.is_none() {
            return CapabilityOutcome::ask(PendingData::new(
                messages::Q_EVENT_SUMMARY,
                PendingPayload::Calendar(CalendarPending {
                    step: CalendarStep::AskSummary,
                    event,
                    calendars: Vec::new(),
                }),
            ));
        }

        if event.start_date.is_none() && event.start_date_time.is_none() {
            return CapabilityOutcome::ask(PendingData::new(
                messages::Q_EVENT_DATETIME,
                PendingPayload::Calendar(CalendarPending {
                    step: CalendarStep::AskDatetime,
                    event,
                    calendars: Vec::new(),
                }),
            ));
        }

        let mut event = event;
        if event.calendar_id.is_none() {
            let calendars = self.calendar_entities();
            match calendars.len() {
                0 => {
                    return CapabilityOutcome::done(SpokenReply::say("Keine Kalender gefunden."));
                }
                1 => event.calendar_id = Some(calendars[0].clone()),
                _ => {
                    let names: Vec<String> = calendars
                        .iter()
                        .map(|c| Self::calendar_display_name(c))
                        .collect();
                    let question = format!("In welchen Kalender? ({})", names.join(", "));
                    return CapabilityOutcome::ask(PendingData::new(
                        question,
                        PendingPayload::Calendar(CalendarPending {
                            step: CalendarStep::AskCalendar,
                            event,
                            calendars,
                        }),
                    ));
                }
            }
        }

        // Everything known: textual preview, then explicit confirmation.
        let preview = Self::preview(&event);
        CapabilityOutcome::ask(PendingData::new(
            format!("{preview} Soll ich den Termin erstellen?"),
            PendingPayload::Calendar(CalendarPending {
                step: CalendarStep::Confirm,
                event,
                calendars: Vec::new(),
            }),
        ))
    }

    fn preview(event: &CalendarDraft) -> String {
        let summary = event.summary.as_deref().unwrap_or("Termin");
        let when = if let Some(start) = &event.start_date_time {
            format!("am {start}")
        } else if let Some(start) = &event.start_date {
            format!("am {start}, ganztägig")
        } else {
            String::new()
        };
        let location = event
            .location
            .as_ref()
            .map(|l| format!(" in {l}"))
            .unwrap_or_default();
        format!("Termin: {summary} {when}{location}.")
    }

    async fn create_event(&self, event: CalendarDraft) -> CapabilityOutcome {
        let Some(calendar_id) = event.calendar_id.clone() else {
            return CapabilityOutcome::done(SpokenReply::say("Keine Kalender gefunden."));
        };

        let mut data = json!({
            "entity_id": calendar_id,
            "summary": event.summary,
        });
        if let Some(description) = &event.description {
            data["description"] = Value::from(description.clone());
        }
        if let Some(location) = &event.location {
            data["location"] = Value::from(location.clone());
        }
        if event.is_all_day || event.start_date.is_some() {
            data["start_date"] = Value::from(event.start_date.clone());
            data["end_date"] = Value::from(event.end_date.clone());
        } else {
            data["start_date_time"] = Value::from(event.start_date_time.clone());
            match (&event.end_date_time, event.duration_minutes) {
                (Some(end), _) => data["end_date_time"] = Value::from(end.clone()),
                (None, Some(minutes)) => {
                    data["duration"] = json!({"minutes": minutes});
                }
                (None, None) => {
                    data["duration"] = json!({"minutes": 60});
                }
            }
        }

        match self
            .services
            .home
            .call_service("calendar", "create_event", data)
            .await
        {
            Ok(()) => CapabilityOutcome::done(SpokenReply::say("Termin wurde erstellt.")),
            Err(err) => {
                tracing::warn!(%err, "calendar event creation failed");
                CapabilityOutcome::done(SpokenReply::say(
                    "Der Termin konnte nicht erstellt werden.",
                ))
            }
        }
    }

    fn calendar_entities(&self) -> Vec<String> {
        self.services
            .home
            .entities()
            .into_iter()
            .filter(|e| e.domain() == "calendar" && !e.disabled)
            .map(|e| e.entity_id)
            .collect()
    }

    fn calendar_display_name(entity_id: &str) -> String {
        entity_id
            .split('.')
            .nth(1)
            .unwrap_or(entity_id)
            .replace('_', " ")
    }

    fn match_calendar(text: &str, calendars: &[String]) -> Option<String> {
        let lower = text.to_lowercase();
        let mut best: Option<(&String, u32)> = None;
        for calendar in calendars {
            let name = Self::calendar_display_name(calendar).to_lowercase();
            let score = if lower.contains(&name) || name.contains(&lower) {
                100
            } else {
                ratio(&lower, &name)
            };
            if score >= 70 && best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((calendar, score));
            }
        }
        best.map(|(c, _)| c.clone())
    }

    /// One LLM call extracting `{summary, dates, location, duration}` with
    /// relative dates resolved against today.
    async fn extract_event(&self, text: &str) -> Option<CalendarDraft> {
        let today = chrono::Local::now().date_naive();
        let prompt = Prompt::new(
            format!(
                "Extrahiere Termindaten aus der Benutzereingabe.\n\
                 Felder: summary (Pflicht), description, start_date (YYYY-MM-DD, ganztägig), \
                 end_date (Tag NACH dem Ende), start_date_time (YYYY-MM-DD HH:MM), \
                 end_date_time, location, duration_minutes, is_all_day.\n\
                 Relative Angaben (morgen, übermorgen, Wochentage) dürfen wörtlich bleiben; \
                 sie werden später aufgelöst.\n\
                 Heutiges Datum: {today}"
            ),
            json!({
                "type": "object",
                "properties": {
                    "summary": {"type": ["string", "null"]},
                    "description": {"type": ["string", "null"]},
                    "start_date": {"type": ["string", "null"]},
                    "end_date": {"type": ["string", "null"]},
                    "start_date_time": {"type": ["string", "null"]},
                    "end_date_time": {"type": ["string", "null"]},
                    "location": {"type": ["string", "null"]},
                    "duration_minutes": {"type": ["integer", "null"]},
                    "is_all_day": {"type": ["boolean", "null"]},
                },
            }),
        );

        let data = self
            .services
            .llm
            .prompt_json(&prompt, &json!({"user_input": text}), Some(0.0))
            .await
            .ok()
            .flatten()?;

        let get_str = |key: &str| {
            data.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let resolve_date = |value: Option<String>| {
            value.map(|v| resolve_relative_date_str(&v, today))
        };
        let resolve_datetime = |value: Option<String>| {
            value.map(|v| match v.split_once(' ') {
                Some((date, time)) => {
                    format!("{} {}", resolve_relative_date_str(date, today), time)
                }
                None => resolve_relative_date_str(&v, today),
            })
        };

        Some(CalendarDraft {
            summary: get_str("summary"),
            description: get_str("description"),
            location: get_str("location"),
            start_date: resolve_date(get_str("start_date")),
            end_date: resolve_date(get_str("end_date")),
            start_date_time: resolve_datetime(get_str("start_date_time")),
            end_date_time: resolve_datetime(get_str("end_date_time")),
            duration_minutes: data
                .get("duration_minutes")
                .and_then(Value::as_u64)
                .map(|m| m as u32),
            is_all_day: data
                .get("is_all_day")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sim_services;
    use heim_agent_core::SimHome;
    use std::sync::Arc;

    fn home_with_calendars(count: usize) -> Arc<SimHome> {
        let home = Arc::new(SimHome::new());
        for i in 1..=count {
            home.add_entity(&format!("calendar.kalender_{i}"), &format!("Kalender {i}"), None);
        }
        home
    }

    fn extraction(summary: &str, datetime: &str) -> Value {
        json!({
            "summary": summary,
            "start_date_time": datetime,
            "duration_minutes": 60,
        })
    }

    #[tokio::test]
    async fn test_full_flow_with_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_with_calendars(1);
        let services = sim_services(
            home.clone(),
            dir.path(),
            vec![Some(extraction("Zahnarzt", "2026-08-02 10:00"))],
        );
        let calendar = CalendarCapability::new(services);

        let outcome = calendar
            .start(
                &Utterance::new("Termin morgen um 10 Uhr beim Zahnarzt", "c1"),
                &Slots::new(),
            )
            .await;
        let pending = outcome.pending.expect("must ask for confirmation");
        assert!(outcome.reply.speech.contains("Zahnarzt"));
        let PendingPayload::Calendar(cal_pending) = pending.payload else {
            panic!("expected calendar payload");
        };
        assert_eq!(cal_pending.step, CalendarStep::Confirm);

        // Affirmative answer creates the event.
        let outcome = calendar
            .continue_flow(&Utterance::new("ja passt", "c1"), cal_pending)
            .await;
        assert!(outcome.pending.is_none());
        assert_eq!(outcome.reply.speech, "Termin wurde erstellt.");

        let calls = home.service_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].domain, "calendar");
        assert_eq!(calls[0].service, "create_event");
        assert_eq!(calls[0].data["summary"], "Zahnarzt");
    }

    #[tokio::test]
    async fn test_negative_confirmation_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_with_calendars(1);
        let services = sim_services(
            home.clone(),
            dir.path(),
            vec![Some(extraction("Meeting", "2026-08-02 14:00"))],
        );
        let calendar = CalendarCapability::new(services);

        let outcome = calendar
            .start(&Utterance::new("Termin Meeting morgen", "c1"), &Slots::new())
            .await;
        let PendingPayload::Calendar(cal_pending) = outcome.pending.unwrap().payload else {
            panic!("expected calendar payload");
        };

        let outcome = calendar
            .continue_flow(&Utterance::new("nein", "c1"), cal_pending)
            .await;
        assert_eq!(outcome.reply.speech, "Termin wurde nicht erstellt.");
        assert!(home.service_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_summary_is_asked() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_with_calendars(1);
        // Extraction finds nothing useful.
        let services = sim_services(home, dir.path(), vec![None]);
        let calendar = CalendarCapability::new(services);

        let outcome = calendar
            .start(&Utterance::new("Erstelle einen Termin", "c1"), &Slots::new())
            .await;
        let PendingPayload::Calendar(cal_pending) = outcome.pending.unwrap().payload else {
            panic!("expected calendar payload");
        };
        assert_eq!(cal_pending.step, CalendarStep::AskSummary);
    }

    #[tokio::test]
    async fn test_multiple_calendars_require_choice() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_with_calendars(2);
        let services = sim_services(
            home.clone(),
            dir.path(),
            vec![Some(extraction("Geburtstag", "2026-08-05 18:00"))],
        );
        let calendar = CalendarCapability::new(services);

        let outcome = calendar
            .start(&Utterance::new("Termin Geburtstag", "c1"), &Slots::new())
            .await;
        let PendingPayload::Calendar(cal_pending) = outcome.pending.unwrap().payload else {
            panic!("expected calendar payload");
        };
        assert_eq!(cal_pending.step, CalendarStep::AskCalendar);
        assert_eq!(cal_pending.calendars.len(), 2);

        let outcome = calendar
            .continue_flow(&Utterance::new("kalender 2", "c1"), cal_pending)
            .await;
        let PendingPayload::Calendar(cal_pending) = outcome.pending.unwrap().payload else {
            panic!("expected calendar payload");
        };
        assert_eq!(cal_pending.step, CalendarStep::Confirm);
        assert_eq!(
            cal_pending.event.calendar_id.as_deref(),
            Some("calendar.kalender_2")
        );
    }
}
