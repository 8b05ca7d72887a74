use {
    super::EventManager,
    crate::{context::Context, events::Event},
    log::*,
};

/// Writes events into the open store layer, so a discarded layer takes its
/// events with it.
#[derive(Debug, Default)]
pub struct DefaultEventManager;

impl EventManager for DefaultEventManager {
    fn emit(&self, ctx: &mut Context, event: Event) {
        trace!("emit {} event", event.kind());
        ctx.emit(event);
    }
}
