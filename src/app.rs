use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use netscore::settings::{SettingsField, TestConfig};
use netscore::{GraphDataPoint, ProgressSink, SpeedTest, SpeedTestResult, TestPhase, TestProgress};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppView {
    Main,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Download,
    Upload,
    Ping,
}

impl Panel {
    pub fn next(self) -> Self {
        match self {
            Panel::Download => Panel::Upload,
            Panel::Upload => Panel::Ping,
            Panel::Ping => Panel::Download,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Panel::Download => Panel::Ping,
            Panel::Upload => Panel::Download,
            Panel::Ping => Panel::Upload,
        }
    }
}

/// Messages from the running test to the UI loop.
pub enum TestUpdate {
    Progress(TestProgress),
    Graph(Vec<GraphDataPoint>),
    Finished(Box<SpeedTestResult>),
}

/// Forwards library callbacks into the UI channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TestUpdate>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<TestUpdate>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, progress: TestProgress) {
        let _ = self.tx.send(TestUpdate::Progress(progress));
    }

    fn on_graph_update(&self, points: &[GraphDataPoint]) {
        let _ = self.tx.send(TestUpdate::Graph(points.to_vec()));
    }
}

pub struct App {
    pub phase: TestPhase,
    pub phase_progress: f64,
    pub current_speed: f64,
    pub elapsed: f64,
    pub result: Option<SpeedTestResult>,
    pub graph: Vec<GraphDataPoint>,
    pub cancelling: bool,
    pub should_quit: bool,

    // UI state
    pub view: AppView,
    pub selected_panel: Panel,
    pub expanded: bool,

    // Settings
    pub config: TestConfig,
    pub selected_setting: SettingsField,

    running: Option<Arc<SpeedTest>>,
}

impl App {
    pub fn new() -> Self {
        Self {
            phase: TestPhase::Idle,
            phase_progress: 0.0,
            current_speed: 0.0,
            elapsed: 0.0,
            result: None,
            graph: Vec::new(),
            cancelling: false,
            should_quit: false,
            view: AppView::Main,
            selected_panel: Panel::Download,
            expanded: false,
            config: TestConfig::default(),
            selected_setting: SettingsField::Duration,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match self.view {
            AppView::Main => self.handle_main_key(key),
            AppView::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_main_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Char('s') => {
                if !self.is_running() {
                    self.view = AppView::Settings;
                }
                None
            }
            KeyCode::Enter => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if !self.is_running() {
                    Some(AppAction::StartTest)
                } else {
                    self.expanded = true;
                    None
                }
            }
            KeyCode::Esc => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if self.is_running() {
                    Some(AppAction::CancelTest)
                } else {
                    None
                }
            }
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('j') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.next();
                }
                None
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('k') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.prev();
                }
                None
            }
            KeyCode::Char(' ') => {
                self.expanded = !self.expanded;
                None
            }
            _ => None,
        }
    }

    fn handle_settings_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => {
                self.view = AppView::Main;
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_setting = self.selected_setting.prev();
                None
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.selected_setting = self.selected_setting.next();
                None
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.decrease_setting();
                None
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.increase_setting();
                None
            }
            KeyCode::Char(' ') => {
                if self.selected_setting == SettingsField::Bufferbloat {
                    self.config.enable_bufferbloat = !self.config.enable_bufferbloat;
                }
                None
            }
            _ => None,
        }
    }

    fn increase_setting(&mut self) {
        match self.selected_setting {
            SettingsField::Duration => {
                self.config.duration_secs =
                    (self.config.duration_secs + 5).min(TestConfig::MAX_DURATION_SECS);
            }
            SettingsField::Connections => {
                self.config.parallel_connections =
                    (self.config.parallel_connections + 1).min(TestConfig::MAX_CONNECTIONS);
            }
            SettingsField::Bufferbloat => self.config.enable_bufferbloat = true,
        }
    }

    fn decrease_setting(&mut self) {
        match self.selected_setting {
            SettingsField::Duration => {
                self.config.duration_secs = self.config.duration_secs.saturating_sub(5).max(5);
            }
            SettingsField::Connections => {
                self.config.parallel_connections =
                    self.config.parallel_connections.saturating_sub(1).max(1);
            }
            SettingsField::Bufferbloat => self.config.enable_bufferbloat = false,
        }
    }

    pub fn start_test(&mut self, test: Arc<SpeedTest>) {
        self.phase = TestPhase::Idle;
        self.phase_progress = 0.0;
        self.current_speed = 0.0;
        self.elapsed = 0.0;
        self.result = None;
        self.graph.clear();
        self.cancelling = false;
        self.expanded = false;
        self.running = Some(test);
    }

    pub fn apply_update(&mut self, update: TestUpdate) {
        match update {
            TestUpdate::Progress(p) => {
                self.phase = p.phase;
                self.phase_progress = p.progress;
                self.current_speed = p.current_speed;
                self.elapsed = p.elapsed_time;
            }
            TestUpdate::Graph(points) => self.graph = points,
            TestUpdate::Finished(result) => {
                self.phase = TestPhase::Complete;
                self.phase_progress = 100.0;
                self.result = Some(*result);
                self.running = None;
                self.cancelling = false;
            }
        }
    }

    /// Ask the running test to stop; its partial result still arrives.
    pub fn cancel_test(&mut self) {
        if let Some(test) = &self.running {
            test.abort();
            self.cancelling = true;
        }
    }

    pub fn speed_samples(&self, phase: TestPhase) -> Vec<f64> {
        self.graph
            .iter()
            .filter(|p| p.phase == phase)
            .map(|p| p.speed)
            .collect()
    }

    pub fn ping_samples(&self) -> Vec<f64> {
        self.graph.iter().filter_map(|p| p.ping).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AppAction {
    Quit,
    StartTest,
    CancelTest,
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}
