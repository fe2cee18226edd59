use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use docview_core::ViewerCommand;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(ViewerCommand),
    /// Scroll the continuous page column by `steps` scroll steps.
    Scroll { steps: i32 },
    BeginSearch,
    SearchQueryChanged { query: String },
    SearchSubmit { query: String },
    SearchCancel,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
}

/// Turns terminal key events into viewer commands. Holds the numeric prefix
/// (`12g`, `3j`) and the search prompt buffer between events.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    search_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode == mode {
            return;
        }
        self.reset_count();
        self.search_buffer.clear();
        self.mode = mode;
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => match self.mode {
                InputMode::Normal => self.map_normal(key),
                InputMode::Search => self.map_search(key),
            },
            _ => UiEvent::None,
        }
    }

    fn map_normal(&mut self, key: KeyEvent) -> UiEvent {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Left if ctrl => self.command(ViewerCommand::PreviousPage),
            KeyCode::Right if ctrl => self.command(ViewerCommand::NextPage),
            KeyCode::Up if ctrl => self.command(ViewerCommand::ZoomIn),
            KeyCode::Down if ctrl => self.command(ViewerCommand::ZoomOut),
            KeyCode::Char('f') if ctrl => self.command(ViewerCommand::ToggleFullscreen),
            KeyCode::Char('0') if ctrl => self.command(ViewerCommand::FitToWidth),
            KeyCode::Char('w') if ctrl => self.command(ViewerCommand::Close),
            KeyCode::Char(c) if c.is_ascii_digit() && !ctrl => {
                self.push_digit(c);
                UiEvent::None
            }
            KeyCode::Char('j') | KeyCode::Down => {
                let steps = self.take_count();
                UiEvent::Scroll {
                    steps: i32::try_from(steps).unwrap_or(i32::MAX),
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                let steps = self.take_count();
                UiEvent::Scroll {
                    steps: -i32::try_from(steps).unwrap_or(i32::MAX),
                }
            }
            KeyCode::Char('n') | KeyCode::PageDown => self.command(ViewerCommand::NextPage),
            KeyCode::Char('p') | KeyCode::PageUp => self.command(ViewerCommand::PreviousPage),
            KeyCode::Char('g') => {
                let page = self.take_count();
                UiEvent::Command(ViewerCommand::GoToPage { page })
            }
            KeyCode::Char('+') => self.command(ViewerCommand::ZoomIn),
            KeyCode::Char('-') => self.command(ViewerCommand::ZoomOut),
            KeyCode::Char('=') => self.command(ViewerCommand::FitToWidth),
            KeyCode::Char('/') => {
                self.set_mode(InputMode::Search);
                UiEvent::BeginSearch
            }
            KeyCode::Esc => self.command(ViewerCommand::ClearHighlights),
            KeyCode::Char('r') => self.command(ViewerCommand::Retry),
            KeyCode::Char('R') => self.command(ViewerCommand::Reload),
            KeyCode::Char('q') => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_search(&mut self, key: KeyEvent) -> UiEvent {
        match key.code {
            KeyCode::Esc => {
                self.set_mode(InputMode::Normal);
                UiEvent::SearchCancel
            }
            KeyCode::Enter => {
                let query = std::mem::take(&mut self.search_buffer);
                self.set_mode(InputMode::Normal);
                UiEvent::SearchSubmit { query }
            }
            KeyCode::Backspace => {
                self.search_buffer.pop();
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            KeyCode::Char(c)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                self.search_buffer.push(c);
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn command(&mut self, command: ViewerCommand) -> UiEvent {
        self.reset_count();
        UiEvent::Command(command)
    }

    fn push_digit(&mut self, c: char) {
        if let Some(digit) = c.to_digit(10) {
            let current = self.pending_count.unwrap_or(0);
            self.pending_count = Some(current.saturating_mul(10).saturating_add(digit as usize));
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// Text to echo in the status line while a prefix or prompt is open.
    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::Search => Some(format!("/{}", self.search_buffer)),
            InputMode::Normal if self.pending_digits.is_empty() => None,
            InputMode::Normal => Some(self.pending_digits.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn ctrl(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::CONTROL)
    }

    #[test]
    fn ctrl_shortcuts_map_to_viewer_commands() {
        let mut mapper = EventMapper::new();
        let cases = [
            (ctrl(KeyCode::Left), ViewerCommand::PreviousPage),
            (ctrl(KeyCode::Right), ViewerCommand::NextPage),
            (ctrl(KeyCode::Up), ViewerCommand::ZoomIn),
            (ctrl(KeyCode::Down), ViewerCommand::ZoomOut),
            (ctrl(KeyCode::Char('f')), ViewerCommand::ToggleFullscreen),
            (ctrl(KeyCode::Char('0')), ViewerCommand::FitToWidth),
        ];
        for (event, expected) in cases {
            assert_eq!(mapper.map_event(event), UiEvent::Command(expected));
        }
    }

    #[test]
    fn numeric_prefix_selects_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('1'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('2'))), UiEvent::None);
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(ViewerCommand::GoToPage { page: 12 })
        );
        assert!(mapper.pending_input().is_none());

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(ViewerCommand::GoToPage { page: 1 })
        );
    }

    #[test]
    fn numeric_prefix_scales_scroll() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('3')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::Scroll { steps: -3 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Down)),
            UiEvent::Scroll { steps: 1 }
        );
    }

    #[test]
    fn other_commands_drop_the_prefix() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('+'))),
            UiEvent::Command(ViewerCommand::ZoomIn)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Scroll { steps: 1 }
        );
    }

    #[test]
    fn slash_enters_search_mode_and_collects_input() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('/'))),
            UiEvent::BeginSearch
        );
        assert_eq!(mapper.mode(), InputMode::Search);
        assert_eq!(mapper.pending_input().as_deref(), Some("/"));

        mapper.map_event(key_event(KeyCode::Char('b')));
        mapper.map_event(key_event(KeyCode::Char('x')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Backspace)),
            UiEvent::SearchQueryChanged { query: "b".into() }
        );
        mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('R'),
            KeyModifiers::SHIFT,
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some("/bR"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::SearchSubmit { query: "bR".into() }
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn escape_cancels_search_then_clears_highlights() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('/')));
        mapper.map_event(key_event(KeyCode::Char('q')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::SearchCancel
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::Command(ViewerCommand::ClearHighlights)
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('q'))), UiEvent::Quit);
    }

    #[test]
    fn key_releases_are_ignored() {
        let mut mapper = EventMapper::new();
        let release = Event::Key(KeyEvent {
            code: KeyCode::Char('q'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert_eq!(mapper.map_event(release), UiEvent::None);
    }

    #[test]
    fn retry_and_reload_have_distinct_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('r'))),
            UiEvent::Command(ViewerCommand::Retry)
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('R'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(ViewerCommand::Reload)
        );
    }
}
