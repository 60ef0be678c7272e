use std::time::Duration;

use crate::error::SessionError;
use crate::scrapers::types::ControlLookup;

/// A control located on the current page, identified by the lookup that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlHandle {
    pub lookup: ControlLookup,
}

/// The browser capabilities the crawl controller needs.
///
/// Only one caller drives a session at a time; implementations are free to
/// keep per-page state behind `&mut self`.
pub trait PageSession {
    fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Block until `selector` matches at least one element, or `timeout` elapses.
    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), SessionError>;

    fn execute_script(&mut self, script: &str) -> Result<(), SessionError>;

    fn count_elements(&mut self, selector: &str) -> Result<usize, SessionError>;

    /// Outer markup of the `index`-th element matching `selector`.
    fn element_markup(&mut self, selector: &str, index: usize) -> Result<String, SessionError>;

    /// First control matched by the lookups, tried in order.
    fn find_control(
        &mut self,
        lookups: &[ControlLookup],
    ) -> Result<Option<ControlHandle>, SessionError>;

    fn is_enabled(&mut self, control: &ControlHandle) -> Result<bool, SessionError>;

    fn has_class(&mut self, control: &ControlHandle, class: &str) -> Result<bool, SessionError>;

    fn click(&mut self, control: &ControlHandle) -> Result<(), SessionError>;

    /// Cheap liveness probe; `false` once the browser is gone.
    fn is_alive(&mut self) -> bool;
}
