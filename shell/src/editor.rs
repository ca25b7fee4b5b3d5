//! Hooks the completion engine into the `rustyline` line editor.

use crate::completion::{Completion, CompletionEngine};
use rustyline::{
    Cmd, ConditionalEventHandler, DefaultEditor, Event, EventContext, EventHandler, KeyCode,
    KeyEvent, Modifiers, Movement, RepeatCount,
};
use std::io::{self, Write};
use std::sync::Arc;

/// Create the line editor; with an engine, Tab completes command names.
pub fn build_editor(engine: Option<Arc<CompletionEngine>>) -> rustyline::Result<DefaultEditor> {
    let mut rl = DefaultEditor::new()?;
    if let Some(engine) = engine {
        rl.bind_sequence(
            KeyEvent(KeyCode::Tab, Modifiers::NONE),
            EventHandler::Conditional(Box::new(TabHandler {
                engine: Arc::clone(&engine),
            })),
        );
        rl.bind_sequence(
            Event::Any,
            EventHandler::Conditional(Box::new(ResetHandler { engine })),
        );
    }
    Ok(rl)
}

struct TabHandler {
    engine: Arc<CompletionEngine>,
}

impl ConditionalEventHandler for TabHandler {
    fn handle(&self, _evt: &Event, _n: RepeatCount, _positive: bool, ctx: &EventContext) -> Option<Cmd> {
        let line = ctx.line();
        let pos = ctx.pos();
        match self.engine.complete(line, pos) {
            Completion::Bell => {
                ring_bell();
                Some(Cmd::Noop)
            }
            Completion::Replace { start, replacement } => {
                let typed = line[start..pos].chars().count();
                Some(Cmd::Replace(
                    Movement::BackwardChar(typed as RepeatCount),
                    Some(replacement),
                ))
            }
            Completion::List(names) => {
                // the prompt is redrawn below the listing by the repaint
                let mut out = io::stdout().lock();
                let _ = write!(out, "\r\n{}\r\n", names.join("  "));
                let _ = out.flush();
                Some(Cmd::Repaint)
            }
        }
    }
}

/// Any key other than Tab clears the completion repeat counter and then
/// keeps its default behavior.
struct ResetHandler {
    engine: Arc<CompletionEngine>,
}

impl ConditionalEventHandler for ResetHandler {
    fn handle(&self, _evt: &Event, _n: RepeatCount, _positive: bool, _ctx: &EventContext) -> Option<Cmd> {
        self.engine.reset();
        None
    }
}

fn ring_bell() {
    let mut out = io::stdout().lock();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}
