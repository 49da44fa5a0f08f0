//! The scheduled think-loop tick.
//!
//! A tick is one agent iteration driven by the alarm.  Whatever happens
//! (success, prompt failure, tool explosion), the loop re-arms while
//! `loopRunning` holds.  Errors become `loop.error` events, never 5xx.

use mesh_domain::event::{AgentEvent, EventOutcome, LOOP_ERROR, LOOP_SLEEP};
use mesh_runtime::PromptOptions;

use super::Actor;

/// Internal system message driving an unattended iteration.
const TICK_INPUT: &str =
    "Scheduled think-loop tick. Review your goals and recent memory, take \
     any useful action with your tools, and summarize what you did.";

impl Actor {
    pub(crate) async fn run_tick(&mut self) {
        if !self.loop_state.loop_running {
            // Stale fire: `stop` landed between scheduling and dispatch.
            return;
        }
        self.loop_state.loop_count += 1;
        let count = self.loop_state.loop_count;
        tracing::info!(agent = %self.name, tick = count, "loop tick");

        let options = PromptOptions {
            system: Some("This turn was initiated by your scheduler, not a user.".into()),
            ..Default::default()
        };
        let outcome = self.run_prompt(TICK_INPUT, &options).await;

        if let Err(error) = &outcome {
            let event = AgentEvent::new(
                &self.did,
                self.session_id(),
                LOOP_ERROR,
                EventOutcome::Error,
                serde_json::json!({ "phase": "prompt", "tick": count }),
            )
            .with_error("tick_failed", error.to_string(), true);
            event.emit();
            let _ = self.deps.events.send(event);
        }

        // Reschedule no matter what: an exception during fire must not
        // leave the loop unarmed.
        if self.loop_state.loop_running {
            let next = mesh_store::now_ms() + self.config.loop_interval_ms as i64;
            self.loop_state.next_alarm_at = Some(next);
            self.deps.alarms.arm(&self.name, next);

            let event = AgentEvent::new(
                &self.did,
                self.session_id(),
                LOOP_SLEEP,
                EventOutcome::Success,
                serde_json::json!({
                    "intervalMs": self.config.loop_interval_ms,
                    "nextAlarmAt": next,
                }),
            );
            event.emit();
            let _ = self.deps.events.send(event);
        } else {
            // `stop` landed while the tick was running; finish Idle.
            self.loop_state.next_alarm_at = None;
        }

        if let Err(error) = self.persist_loop() {
            tracing::error!(agent = %self.name, error = %error, "loop state persist failed");
        }
    }
}
