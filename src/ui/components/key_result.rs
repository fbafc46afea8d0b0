/// Outcome of offering a key to a component (picker, form, search, palette).
///
/// Views offer each key to their overlays first and only fall through to
/// their own bindings when nothing consumed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Consumed without anything for the view to act on
  Handled,
  /// Consumed, and the view should act on the event
  Event(T),
  /// Not consumed
  NotHandled,
}

impl<T> KeyResult<T> {
  pub fn is_consumed(&self) -> bool {
    !matches!(self, KeyResult::NotHandled)
  }

  pub fn event(self) -> Option<T> {
    match self {
      KeyResult::Event(event) => Some(event),
      _ => None,
    }
  }

  /// Run `on_event` if there is an event. Returns whether the key was consumed,
  /// so callers can stop offering it to later handlers.
  pub fn consume(self, on_event: impl FnOnce(T)) -> bool {
    match self {
      KeyResult::Handled => true,
      KeyResult::Event(event) => {
        on_event(event);
        true
      }
      KeyResult::NotHandled => false,
    }
  }
}
