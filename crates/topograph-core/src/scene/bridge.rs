//! Execution of pen and diagram event bindings: clicks, realtime messages
//! and scripts.

use serde_json::Value;

use super::Scene;
use crate::error::{Error, Result};
use crate::events::SceneEvent;
use crate::pen::{EventAction, EventType, Pen, PenEvent, tree};
use crate::realtime::script::{self, AnimateOp, Command, Script, Statement};
use crate::realtime::{Message, collect_runs};

/// Host callback for `WindowFn` actions: the owning pen (if any) and the
/// parameters.
pub type WindowFn = Box<dyn FnMut(Option<&Pen>, &Value)>;

/// Non-empty text of a JSON value, if it is a string or a number.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Scene {
    /// Dispatch one realtime message to every binding it fires. Nothing
    /// happens while the diagram is empty.
    pub fn receive(&mut self, message: Message) {
        if self.data.pens.is_empty() {
            return;
        }
        for run in collect_runs(&self.data, &message) {
            if let Err(e) = self.execute(run.pen.as_deref(), &run.event, &run.payload, true) {
                log::warn!("Rejected {:?} update for {:?}: {}", run.event.action, run.pen, e);
            }
        }
    }

    /// Run the bindings of pen `id` triggered by `kind` (a click or a
    /// double click).
    pub(crate) fn run_pen_events(&mut self, id: &str, kind: EventType) {
        let Some(pen) = self.find_pen(id) else {
            return;
        };
        let events: Vec<PenEvent> = pen.props().events.iter().filter(|e| e.kind == kind).cloned().collect();
        for event in events {
            if let Err(e) = self.execute(Some(id), &event, &Value::Null, false) {
                log::warn!("Event {:?} of {} failed: {}", event.action, id, e);
            }
        }
    }

    /// Execute one binding. `payload` is the realtime message part routed
    /// to it, or null for clicks.
    fn execute(&mut self, pen: Option<&str>, event: &PenEvent, payload: &Value, realtime: bool) -> Result<()> {
        let params = if payload.is_null() { &event.params } else { payload };
        match event.action {
            EventAction::Link => {
                let url = self.argument(pen, event, payload, realtime).unwrap_or_default();
                let target = event
                    .params
                    .as_str()
                    .filter(|t| !t.is_empty())
                    .or_else(|| event.params.get("target").and_then(Value::as_str))
                    .unwrap_or("_blank")
                    .to_string();
                self.emit(SceneEvent::Link { url, target });
            }
            EventAction::StartAnimate | EventAction::PauseAnimate | EventAction::StopAnimate => {
                let tag = self.argument(pen, event, payload, realtime).or_else(|| pen.map(str::to_string));
                match event.action {
                    EventAction::StartAnimate => self.start_animate(tag.as_deref()),
                    EventAction::PauseAnimate => self.pause_animate(tag.as_deref()),
                    _ => self.stop_animate(tag.as_deref()),
                }
            }
            EventAction::Function => {
                self.run_script(&event.value, pen, payload, &event.params)?;
            }
            EventAction::WindowFn => {
                let name = event.value.clone();
                let owner = pen.and_then(|id| tree::find_by_id(&self.data.pens, id));
                match self.functions.get_mut(&name) {
                    Some(f) => f(owner, params),
                    None => {
                        let params = params.clone();
                        self.emit(SceneEvent::WindowFn {
                            name,
                            pen: pen.map(str::to_string),
                            params,
                        });
                    }
                }
            }
            EventAction::SetProps => {
                let data = if payload.is_null() {
                    script::parse_value(&event.value)
                } else {
                    payload.clone()
                };
                self.set_props(pen, data)?;
            }
        }
        Ok(())
    }

    /// The string argument of a link or animation binding. A realtime
    /// message sent to a pen binding overrides the configured value.
    fn argument(&self, pen: Option<&str>, event: &PenEvent, payload: &Value, realtime: bool) -> Option<String> {
        let from_message = (realtime && pen.is_some())
            .then(|| payload.get("value").and_then(text_of).or_else(|| text_of(payload)))
            .flatten();
        from_message.or_else(|| (!event.value.is_empty()).then(|| event.value.clone()))
    }

    /// Apply `[{id?, key, value}]` (or a single such object). Diagram
    /// bindings need `id`; pen bindings default to their own pen.
    fn set_props(&mut self, owner: Option<&str>, data: Value) -> Result<()> {
        let data = match data {
            Value::String(text) => script::parse_value(&text),
            other => other,
        };
        let items = match data {
            Value::Array(items) => items,
            item @ Value::Object(_) => vec![item],
            _ => return Ok(()),
        };
        let mut first_error = None;
        for item in items {
            let Some(key) = item.get("key").and_then(Value::as_str).filter(|k| !k.is_empty()) else {
                continue;
            };
            let id = match owner {
                Some(owner) => owner.to_string(),
                None => match item.get("id").and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => continue,
                },
            };
            let value = item.get("value").cloned().unwrap_or(Value::Null);
            if let Err(e) = self.apply_value(&id, key, value) {
                log::warn!("SetProps {}.{}: {}", id, key, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run a script against pen `pen`. The whole script is parsed before
    /// anything runs; the first failing statement aborts the rest.
    pub fn run_script(&mut self, source: &str, pen: Option<&str>, value: &Value, params: &Value) -> Result<()> {
        let parsed = Script::parse(source)?;
        for statement in &parsed.statements {
            self.run_statement(statement, pen, value, params)?;
        }
        Ok(())
    }

    fn targets(&self, statement: &Statement, pen: Option<&str>) -> Result<Vec<String>> {
        match (&statement.target, pen) {
            (Some(target), _) => Ok(tree::ids_matching(&self.data.pens, target)),
            (None, Some(pen)) => Ok(vec![pen.to_string()]),
            (None, None) => Err(Error::Script("Statement needs an @target outside a pen event".to_string())),
        }
    }

    fn run_statement(&mut self, statement: &Statement, pen: Option<&str>, value: &Value, params: &Value) -> Result<()> {
        let sub = |text: &str| script::substitute(text, value, params);
        match &statement.command {
            Command::Set { path, value: text } => {
                let new_value = script::parse_value(&sub(text));
                for id in self.targets(statement, pen)? {
                    self.apply_value(&id, path, new_value.clone())?;
                }
            }
            Command::Show | Command::Hide => {
                let visible = statement.command == Command::Show;
                for id in self.targets(statement, pen)? {
                    if let Some(pen) = tree::find_by_id_mut(&mut self.data.pens, &id) {
                        pen.props_mut().visible = visible;
                    }
                }
                self.request_render();
            }
            Command::Animate { op, tag } => {
                let tags: Vec<Option<String>> = match (tag, &statement.target, pen) {
                    (Some(tag), _, _) => vec![Some(tag.clone())],
                    (None, Some(target), _) => vec![Some(target.clone())],
                    (None, None, Some(pen)) => vec![Some(pen.to_string())],
                    (None, None, None) => vec![None],
                };
                for tag in tags {
                    match op {
                        AnimateOp::Start => self.start_animate(tag.as_deref()),
                        AnimateOp::Pause => self.pause_animate(tag.as_deref()),
                        AnimateOp::Stop => self.stop_animate(tag.as_deref()),
                    }
                }
            }
            Command::Emit { name, payload } => {
                let payload = payload.as_deref().map_or(Value::Null, |p| script::parse_value(&sub(p)));
                self.emit(SceneEvent::ScriptEmit {
                    name: name.clone(),
                    payload,
                });
            }
            Command::Send { payload } => self.connections.send_websocket(&sub(payload))?,
            Command::Publish { topic, payload } => self.connections.publish(topic, &sub(payload))?,
        }
        Ok(())
    }
}
