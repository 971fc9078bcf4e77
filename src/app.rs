// The central application controller and event loop.

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::Backend, widgets::ListState};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use switchboard::sync::{Connectivity, ServiceState, SyncEngine};

pub mod ui;

// Redraw cadence when nothing else happens, keeps the spinner moving.
const TICK_RATE: Duration = Duration::from_millis(250);

pub struct App {
    engine: SyncEngine,
    services: Vec<ServiceState>,
    connectivity: Connectivity,
    list_state: ListState,
    notice: Option<String>,
    tick: u64,
    should_quit: bool,
}

impl App {
    pub fn new(engine: SyncEngine) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0)); // Start with first item selected

        let connectivity = engine.connectivity();
        Self {
            services: engine.snapshot(),
            engine,
            connectivity,
            list_state,
            notice: None,
            tick: 0,
            should_quit: false,
        }
    }

    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut changes = self.engine.subscribe_changes();
        let mut connectivity = self.engine.subscribe_connectivity();
        let mut events = EventStream::new();
        let mut ticker = tokio::time::interval(TICK_RATE);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Anything that changed between initialize and subscribe.
        self.services = self.engine.snapshot();
        self.connectivity = connectivity.borrow_and_update().clone();

        loop {
            terminal.draw(|f| {
                ui::render(
                    f,
                    &self.services,
                    &self.connectivity,
                    self.notice.as_deref(),
                    self.tick,
                    &mut self.list_state,
                )
            })?;

            tokio::select! {
                change = changes.recv() => match change {
                    Ok(state) => self.apply_change(state),
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "change stream lagged, resyncing");
                        self.services = self.engine.snapshot();
                    }
                    Err(RecvError::Closed) => self.should_quit = true,
                },
                Ok(()) = connectivity.changed() => {
                    self.connectivity = connectivity.borrow_and_update().clone();
                }
                maybe_event = events.next() => match maybe_event {
                    Some(Ok(Event::Key(key))) => self.handle_key(key),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "terminal event error");
                        self.should_quit = true;
                    }
                    None => self.should_quit = true,
                },
                _ = ticker.tick() => {
                    self.tick = self.tick.wrapping_add(1);
                }
            }

            if self.should_quit {
                self.engine.shutdown();
                return Ok(());
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.next(),
            KeyCode::Char('k') | KeyCode::Up => self.previous(),
            KeyCode::Char(' ') | KeyCode::Enter => self.toggle_selected(),
            KeyCode::Char('r') => {
                self.notice = self.engine.request_refresh().err().map(|err| err.to_string());
            }
            _ => {}
        }
    }

    fn apply_change(&mut self, state: ServiceState) {
        match self.services.iter_mut().find(|s| s.name == state.name) {
            Some(slot) => *slot = state,
            None => self.services = self.engine.snapshot(),
        }
    }

    fn toggle_selected(&mut self) {
        let Some(service) = self.list_state.selected().and_then(|i| self.services.get(i)) else {
            return;
        };
        // Failures of the command itself arrive on the connectivity stream.
        self.notice = self.engine.toggle(&service.name).err().map(|err| err.to_string());
    }

    fn next(&mut self) {
        let i = match self.list_state.selected() {
            Some(i) => {
                if i >= self.services.len().saturating_sub(1) {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous(&mut self) {
        let i = match self.list_state.selected() {
            Some(i) => {
                if i == 0 {
                    self.services.len().saturating_sub(1)
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.list_state.select(Some(i));
    }
}
