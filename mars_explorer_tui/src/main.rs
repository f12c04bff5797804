use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mars_explorer_core::{
    Cell, IdleBehavior, Simulation, SimulationConfig, StepOutcome, load_planet_from_string,
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout, Write},
    path::{Path, PathBuf},
    sync::Mutex,
    thread,
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of planet rows
    #[arg(long, default_value_t = SimulationConfig::DEFAULT_ROWS)]
    rows: usize,
    /// Number of planet columns
    #[arg(long, default_value_t = SimulationConfig::DEFAULT_COLS)]
    cols: usize,
    /// Samples scattered at start
    #[arg(long, default_value_t = SimulationConfig::DEFAULT_SAMPLES)]
    samples: usize,
    /// Obstacles scattered at start
    #[arg(long, default_value_t = SimulationConfig::DEFAULT_OBSTACLES)]
    obstacles: usize,
    /// Fixed RNG seed; random when omitted
    #[arg(short, long)]
    seed: Option<u64>,
    /// Planet map file to load instead of random placement
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,
    /// What the agent does with empty hands and no sample nearby
    #[arg(long, value_enum, default_value_t = Idle::Stay)]
    idle: Idle,
    /// Delay between ticks in milliseconds
    #[arg(long, default_value_t = 200)]
    tick_ms: u64,
    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,
    /// Print plain text frames instead of the interactive view
    #[arg(long)]
    plain: bool,
    /// Write logs to this file (filtered by RUST_LOG, default "info")
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Idle {
    Stay,
    Wander,
}

impl From<Idle> for IdleBehavior {
    fn from(idle: Idle) -> Self {
        match idle {
            Idle::Stay => IdleBehavior::Stay,
            Idle::Wander => IdleBehavior::Wander,
        }
    }
}

struct App {
    /// The core simulation.
    simulation: Simulation,
    /// Outcome of the most recent tick.
    last_outcome: Option<StepOutcome>,
    /// Tick limit, if any.
    max_ticks: Option<u64>,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let mut config = SimulationConfig::new(args.rows, args.cols).with_idle(args.idle.into());
        config.samples = args.samples;
        config.obstacles = args.obstacles;
        config.seed = args.seed;

        let simulation = match &args.map {
            Some(map_file) => {
                let file_string = std::fs::read_to_string(map_file)
                    .with_context(|| format!("Failed to read map file {}", map_file.display()))?;
                let layout = load_planet_from_string(&file_string)
                    .with_context(|| format!("Failed to load map {}", map_file.display()))?;
                Simulation::from_layout(layout, &config)
            }
            None => Simulation::from_config(&config)?,
        };

        Ok(App {
            simulation,
            last_outcome: None,
            max_ticks: args.ticks,
            should_quit: false,
        })
    }

    fn finished(&self) -> bool {
        self.max_ticks
            .is_some_and(|limit| self.simulation.ticks() >= limit)
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if self.finished() {
            return;
        }
        self.last_outcome = Some(self.simulation.step());
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let mut app = App::new(&args)?;
    let tick_rate = Duration::from_millis(args.tick_ms);
    info!(
        rows = app.simulation.grid().rows(),
        cols = app.simulation.grid().cols(),
        plain = args.plain,
        "explorer starting"
    );

    if args.plain {
        run_plain(&mut app, tick_rate)?;
    } else {
        let mut terminal = setup_terminal()?;
        let result = run_app(&mut terminal, &mut app, tick_rate);
        restore_terminal(&mut terminal)?;
        result?;
    }

    info!(
        ticks = app.simulation.ticks(),
        collected = app.simulation.collected(),
        "explorer stopped"
    );
    Ok(())
}

/// Installs a file-backed tracing subscriber. Without a log file nothing is
/// installed, so the terminal view stays clean.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Prints a cleared screen and the text frame for every tick.
fn run_plain(app: &mut App, tick_rate: Duration) -> Result<()> {
    let mut stdout = io::stdout().lock();
    let max_ticks = app.max_ticks;
    let mut failure: Option<io::Error> = None;

    app.simulation.run(
        |sim| {
            if let Err(err) = draw_plain(&mut stdout, sim) {
                failure = Some(err);
                return false;
            }
            if max_ticks.is_some_and(|limit| sim.ticks() >= limit) {
                return false;
            }
            thread::sleep(tick_rate);
            true
        },
        |_, _| {},
    );

    match failure {
        Some(err) => Err(err).context("Failed to write frame"),
        None => Ok(()),
    }
}

fn draw_plain(out: &mut impl Write, simulation: &Simulation) -> io::Result<()> {
    write!(out, "\x1B[2J\x1B[H{simulation}")?;
    out.flush()
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(planet_height(app.simulation.grid().rows())),
            Constraint::Length(5),
            Constraint::Length(2),
        ])
        .split(frame.area());

    render_planet(frame, main_layout[0], &app.simulation);
    render_status(frame, main_layout[1], app);

    let help_text = if app.finished() {
        "Tick limit reached. Press 'q' or 'Esc' to quit."
    } else {
        "Press 'q' or 'Esc' to quit."
    };
    let help = Paragraph::new(help_text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help, main_layout[2]);
}

/// Rows needed for the planet panel, borders included.
fn planet_height(rows: usize) -> u16 {
    u16::try_from(rows).unwrap_or(u16::MAX).saturating_add(2)
}

/// Renders the delivered count, the agent's load and the last outcome.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let sim = &app.simulation;
    let agent = sim.agent_position();
    let last = match app.last_outcome {
        None => "waiting".to_string(),
        Some(StepOutcome::Idle { .. }) => "idle".to_string(),
        Some(StepOutcome::Blocked { .. }) => "blocked".to_string(),
        Some(StepOutcome::Moved { to, .. }) => format!("moved to ({}, {})", to.row, to.col),
        Some(StepOutcome::PickedUp { at }) => {
            format!("picked up sample at ({}, {})", at.row, at.col)
        }
        Some(StepOutcome::Deposited { amount, .. }) => format!("delivered {amount} to ship"),
    };

    let lines = vec![
        Line::from(Span::styled(
            format!("Amostras coletadas: {}", sim.collected()),
            Style::default().fg(Color::Green).bold(),
        )),
        Line::from(format!(
            "Tick: {}  Agent: ({}, {})  Carrying: {}",
            sim.ticks(),
            agent.row,
            agent.col,
            sim.carried()
        )),
        Line::from(format!("Last: {last}")),
    ];

    let status =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status, area);
}

/// Renders the planet grid onto the frame.
fn render_planet(frame: &mut Frame, area: Rect, simulation: &Simulation) {
    let grid = simulation.grid();
    let lines: Vec<Line> = (0..grid.rows())
        .map(|row| {
            let spans: Vec<Span> = grid
                .row(row)
                .iter()
                .map(|cell| Span::styled(cell.glyph().to_string(), cell_style(cell)))
                .collect();
            Line::from(spans)
        })
        .collect();

    let planet = Paragraph::new(lines)
        .block(Block::default().title("Mars Explorer").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(planet, area);
}

fn cell_style(cell: &Cell) -> Style {
    match cell {
        Cell::Empty => Style::default(),
        Cell::Sample => Style::default().fg(Color::Yellow),
        Cell::Obstacle => Style::default().fg(Color::DarkGray),
        Cell::Agent => Style::default().fg(Color::Red).bold(),
        Cell::Ship { .. } => Style::default().fg(Color::Cyan).bold(),
    }
}
