use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use env_logger::{Builder, Env};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cli::args::CliArgs;
use crate::cli::validation::{self, parse_row_count};
use crate::config::{self, ConfigFile};
use crate::output::{self, OutputFormat};
use crate::pagination::{PageController, PageLoad, PageTicket, DEFAULT_TOTAL_PAGES};
use crate::record::{Page, RecordId};
use crate::source::{ArticClient, ClientOptions, FetchError, PageSource};
use crate::store::{FileStore, StateStore};

const LOADING_MESSAGE: &str = "API is being called, data is loading from server.";

const PROMPT_HELP: &str = "\
commands:
  page N            open page N
  next | prev       open the neighbouring page
  reload            fetch the current page again
  select N          select N rows starting here, carrying the rest to later pages
  toggle ID         flip one row
  keep [ID,ID..]    keep exactly these rows selected on this page
  selected          list every selected row
  clear             drop the whole selection
  show              print the current page again
  help              this text
  quit              leave
";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Page(u32),
    Next,
    Prev,
    Reload,
    Select(String),
    Toggle(RecordId),
    Keep(Vec<RecordId>),
    Selected,
    Clear,
    Show,
    Help,
    Quit,
    Nothing,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let cmd = match word.to_lowercase().as_str() {
            "" => Self::Nothing,
            "page" | "p" | "goto" => {
                let page = rest
                    .parse::<u32>()
                    .map_err(|_| format!("expected a page number, got '{rest}'"))?;
                Self::Page(page)
            }
            "next" | "n" => Self::Next,
            "prev" | "previous" | "b" => Self::Prev,
            "reload" | "r" => Self::Reload,
            "select" | "s" => Self::Select(rest.to_string()),
            "toggle" | "t" => {
                let id = rest
                    .parse::<RecordId>()
                    .map_err(|_| format!("expected a row id, got '{rest}'"))?;
                Self::Toggle(id)
            }
            "keep" | "k" => Self::Keep(parse_id_list(rest)?),
            "selected" | "ls" => Self::Selected,
            "clear" => Self::Clear,
            "show" => Self::Show,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(cmd)
    }

    fn mutates_selection(&self) -> bool {
        matches!(
            self,
            Self::Select(_) | Self::Toggle(_) | Self::Keep(_) | Self::Clear
        )
    }
}

fn parse_id_list(raw: &str) -> Result<Vec<RecordId>, String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<RecordId>()
                .map_err(|_| format!("expected a row id, got '{s}'"))
        })
        .collect()
}

pub enum Flow {
    Continue(String),
    Quit,
}

pub type FetchDone = (PageTicket, Result<Page, FetchError>);

/// The interactive table: turns prompt commands into controller calls and
/// runs page fetches as background tasks so the prompt stays responsive.
pub struct Session<S, K> {
    controller: PageController<S, K>,
    format: OutputFormat,
    tx: mpsc::Sender<FetchDone>,
    in_flight: Option<JoinHandle<()>>,
    spinner: Option<ProgressBar>,
    show_spinner: bool,
    initial_select: Option<u32>,
}

impl<S, K> Session<S, K>
where
    S: PageSource + Clone + Send + Sync + 'static,
    K: StateStore,
{
    pub fn new(
        controller: PageController<S, K>,
        format: OutputFormat,
        show_spinner: bool,
    ) -> (Self, mpsc::Receiver<FetchDone>) {
        let (tx, rx) = mpsc::channel(8);
        let session = Self {
            controller,
            format,
            tx,
            in_flight: None,
            spinner: None,
            show_spinner,
            initial_select: None,
        };
        (session, rx)
    }

    /// Bulk selection applied once the first page arrives.
    pub fn select_after_first_load(&mut self, count: u32) {
        self.initial_select = Some(count);
    }

    pub fn controller(&self) -> &PageController<S, K> {
        &self.controller
    }

    /// Starts fetching `index`. A fetch still outstanding is aborted; should
    /// its response arrive anyway the controller drops it as stale.
    pub fn open_page(&mut self, index: u32) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        let ticket = self.controller.begin_page_change(index);
        let source = self.controller.source().clone();
        let tx = self.tx.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = source.fetch_page(ticket.page()).await;
            let _ = tx.send((ticket, result)).await;
        }));
        self.start_spinner(ticket.page());
    }

    pub fn on_fetch_done(&mut self, (ticket, result): FetchDone) -> Option<String> {
        let load = self.controller.complete_page_fetch(ticket, result);
        let mut out = String::new();
        match load {
            PageLoad::Stale => return None,
            PageLoad::Loaded { newly_selected } => {
                self.stop_spinner();
                if !newly_selected.is_empty() {
                    out.push_str(&format!(
                        "{} {} more rows selected from this page\n",
                        "::".green(),
                        newly_selected.len()
                    ));
                }
            }
            PageLoad::Failed(e) => {
                self.stop_spinner();
                out.push_str(&format!("{} {e}\n", "ERR".bold().red()));
            }
        }
        self.in_flight = None;
        if let Some(count) = self.initial_select.take() {
            out.push_str(&self.bulk_select(count));
        }
        out.push_str(&self.render());
        Some(out)
    }

    pub fn handle_line(&mut self, line: &str) -> Flow {
        let cmd = match Command::parse(line) {
            Ok(cmd) => cmd,
            Err(e) => return Flow::Continue(format!("{} {e}\n", "ERR".bold().red())),
        };
        if cmd.mutates_selection() && self.controller.is_loading() {
            return Flow::Continue(format!(
                "{} page {} is still loading, try again once it is shown\n",
                "WRN".bold().yellow(),
                self.controller.current_page()
            ));
        }
        let out = match cmd {
            Command::Nothing => String::new(),
            Command::Quit => return Flow::Quit,
            Command::Help => PROMPT_HELP.to_string(),
            Command::Page(page) => self.navigate(page),
            Command::Next => self.navigate(self.controller.next_index()),
            Command::Prev => self.navigate(self.controller.previous_index()),
            Command::Reload => self.navigate(self.controller.current_page()),
            Command::Select(raw) => match parse_row_count(&raw) {
                Ok(count) => {
                    let mut out = self.bulk_select(count);
                    out.push_str(&self.render());
                    out
                }
                Err(e) => format!("{} {e}\n", "ERR".bold().red()),
            },
            Command::Toggle(id) => match self.controller.toggle(id) {
                Some(_) => self.render(),
                None => format!(
                    "{} row {id} is neither on this page nor selected\n",
                    "ERR".bold().red()
                ),
            },
            Command::Keep(ids) => self.keep(&ids),
            Command::Selected => output::render_selection(self.controller.ledger()),
            Command::Clear => {
                self.controller.clear_selection();
                self.render()
            }
            Command::Show => self.render(),
        };
        Flow::Continue(out)
    }

    fn navigate(&mut self, page: u32) -> String {
        self.open_page(page);
        String::new()
    }

    fn bulk_select(&mut self, count: u32) -> String {
        match self.controller.request_bulk_select(count) {
            Ok(outcome) if outcome.pending > 0 => format!(
                "{} selected {} rows here, {} more will be selected from the next pages\n",
                "::".green(),
                outcome.newly_selected.len(),
                outcome.pending
            ),
            Ok(outcome) => format!(
                "{} selected {} rows\n",
                "::".green(),
                outcome.newly_selected.len()
            ),
            Err(e) => format!("{} {e}\n", "ERR".bold().red()),
        }
    }

    fn keep(&mut self, ids: &[RecordId]) -> String {
        let records = self.controller.records();
        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| !records.iter().any(|r| r.id == **id))
            .map(|id| id.to_string())
            .collect();
        if !unknown.is_empty() {
            return format!(
                "{} not on this page: {}\n",
                "ERR".bold().red(),
                unknown.join(",")
            );
        }
        let selected = records
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect();
        self.controller.set_manual_selection(selected);
        self.render()
    }

    pub fn render(&self) -> String {
        if self.controller.is_loading() {
            return format!(
                "{} {LOADING_MESSAGE} (page {})\n",
                "..".dimmed(),
                self.controller.current_page()
            );
        }
        let view = output::build_view(
            self.controller.records(),
            self.controller.ledger(),
            self.controller.current_page(),
            self.controller.total_pages(),
        );
        String::from_utf8_lossy(&output::render(&view, self.format)).to_string()
    }

    fn start_spinner(&mut self, page: u32) {
        self.stop_spinner();
        if !self.show_spinner {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("{LOADING_MESSAGE} (page {page})"));
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

#[derive(Clone, Debug)]
struct RunConfig {
    client: ClientOptions,
    total_pages: u32,
    state_path: PathBuf,
    reset: bool,
    start_page: Option<u32>,
    select: Option<u32>,
    once: bool,
    output_format: OutputFormat,
    no_color: bool,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = if args.color {
        false
    } else {
        args.no_color || cfg.no_color.unwrap_or(false)
    };

    let base_url = args
        .base_url
        .or(cfg.base_url)
        .unwrap_or_else(|| crate::source::artic::DEFAULT_BASE_URL.to_string());
    let timeout_seconds = args.timeout.or(cfg.timeout).unwrap_or(10);
    if timeout_seconds == 0 {
        return Err("invalid timeout, expected positive integer".to_string());
    }
    let proxy = args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty());

    let total_pages = args
        .total_pages
        .or(cfg.total_pages)
        .unwrap_or(DEFAULT_TOTAL_PAGES);
    if total_pages == 0 {
        return Err("invalid total_pages, expected positive integer".to_string());
    }

    let state_path = args
        .state_file
        .or(cfg.state_file)
        .map(|p| config::expand_tilde(&p))
        .unwrap_or_else(config::default_state_path);

    let output_format_raw = args
        .output_format
        .or(cfg.output_format)
        .unwrap_or_else(|| "text".to_string());
    let output_format = OutputFormat::parse(&output_format_raw)
        .ok_or_else(|| format!("invalid output format '{output_format_raw}'"))?;

    let select = args
        .select
        .as_deref()
        .map(parse_row_count)
        .transpose()
        .map_err(|e| format!("invalid --select: {e}"))?;

    Ok(RunConfig {
        client: ClientOptions {
            base_url,
            timeout_seconds,
            proxy,
        },
        total_pages,
        state_path,
        reset: args.reset,
        start_page: args.page.or(cfg.start_page),
        select,
        once: args.once,
        output_format,
        no_color,
    })
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // RUST_LOG still wins when set.
    let _ = Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<8}: {}", label, value);
}

fn print_out(text: &str) {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    let client = ArticClient::new(&run.client).map_err(|e| e.to_string())?;
    let mut store = FileStore::open(&run.state_path);
    if run.reset {
        store.reset().map_err(|e| e.to_string())?;
        info!("cleared state at '{}'", run.state_path.display());
    }

    let controller = PageController::new(client, store, run.total_pages);
    let start_page = run
        .start_page
        .unwrap_or_else(|| controller.current_page());

    if run.once {
        return run_once(controller, start_page, run.select, run.output_format).await;
    }

    if run.output_format == OutputFormat::Text {
        format_kv_line("Source", controller.source().endpoint());
        format_kv_line("State", &run.state_path.display().to_string());
        format_kv_line(
            "Selected",
            &format!(
                "{} rows, {} pending",
                controller.ledger().len(),
                controller.pending()
            ),
        );
        println!("type 'help' for commands");
        println!();
    }

    let (mut session, mut rx) = Session::new(controller, run.output_format, true);
    if let Some(count) = run.select {
        session.select_after_first_load(count);
    }
    session.open_page(start_page);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(done) = rx.recv() => {
                if let Some(out) = session.on_fetch_done(done) {
                    print_out(&out);
                    print_out("> ");
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match session.handle_line(&line) {
                        Flow::Continue(out) => {
                            print_out(&out);
                            if !session.controller().is_loading() {
                                print_out("> ");
                            }
                        }
                        Flow::Quit => break,
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("failed to read command: {e}");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn run_once<S, K>(
    mut controller: PageController<S, K>,
    page: u32,
    select: Option<u32>,
    format: OutputFormat,
) -> Result<(), String>
where
    S: PageSource,
    K: StateStore,
{
    if let PageLoad::Failed(e) = controller.go_to_page(page).await {
        eprintln!("{} {e}", "ERR".bold().red());
    }
    if let Some(count) = select {
        controller
            .request_bulk_select(count)
            .map_err(|e| e.to_string())?;
    }
    let view = output::build_view(
        controller.records(),
        controller.ledger(),
        controller.current_page(),
        controller.total_pages(),
    );
    print_out(&String::from_utf8_lossy(&output::render(&view, format)));
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    init_logger(args.verbose);

    if args.init_config {
        let path = args
            .config
            .as_deref()
            .map(config::expand_tilde)
            .or_else(config::default_config_path)
            .ok_or_else(|| "could not determine config path".to_string())?;
        config::ensure_default_config_file(&path)?;
        println!(":: config at {}", path.display());
        return Ok(());
    }

    let cfg = match args.config.as_deref().map(config::expand_tilde) {
        Some(path) => config::load_config(&path, false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    if run.no_color {
        colored::control::set_override(false);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))
}
