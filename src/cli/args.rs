use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "artable",
    version,
    about = "paginated artwork table with cross-page bulk selection",
    long_about = "artable pages through the Art Institute of Chicago artworks collection and lets you select more rows than fit on one page. Rows still owed by a bulk selection are picked up from the next pages you open, and the selection survives restarts.\n\nExamples:\n  artable\n  artable --page 3 --select 30\n  artable --page 2 --once --output-format json\n  artable --config ~/.artable/config.yml\n\nTip: Use --init-config to write a commented config file."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'c',
        long = "clr",
        visible_alias = "color",
        help_heading = "Output",
        help = "Enable colored output (overrides --no-color)."
    )]
    pub color: bool,

    #[arg(
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'A',
        long = "of",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Table format (text, json)."
    )]
    pub output_format: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.artable/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "ic",
        visible_alias = "init-config",
        help_heading = "Input",
        help = "Write a default config file if none exists, then exit."
    )]
    pub init_config: bool,

    #[arg(
        short = 'b',
        long = "bu",
        visible_alias = "base-url",
        value_name = "URL",
        help_heading = "Source",
        help = "API base URL (defaults to https://api.artic.edu/api/v1)."
    )]
    pub base_url: Option<String>,

    #[arg(
        short = 'n',
        long = "tp",
        visible_alias = "total-pages",
        value_name = "N",
        help_heading = "Source",
        help = "Page count to assume until the API reports one."
    )]
    pub total_pages: Option<u32>,

    #[arg(
        short = 'T',
        long = "to",
        visible_alias = "timeout",
        value_name = "SECONDS",
        help_heading = "Source",
        help = "Per-request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        long = "px",
        visible_alias = "proxy",
        value_name = "URL",
        help_heading = "Source",
        help = "HTTP proxy URL (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 's',
        long = "sf",
        visible_alias = "state-file",
        value_name = "FILE",
        help_heading = "State",
        help = "Where selection state is kept (defaults to ~/.artable/state.json)."
    )]
    pub state_file: Option<String>,

    #[arg(
        long = "rs",
        visible_alias = "reset",
        help_heading = "State",
        help = "Forget the stored selection, pending count and page before starting."
    )]
    pub reset: bool,

    #[arg(
        short = 'p',
        long = "pg",
        visible_alias = "page",
        value_name = "N",
        help_heading = "Selection",
        help = "Open this page instead of the remembered one."
    )]
    pub page: Option<u32>,

    #[arg(
        short = 'S',
        long = "sel",
        visible_alias = "select",
        value_name = "COUNT",
        help_heading = "Selection",
        help = "Bulk-select COUNT rows starting from the opened page."
    )]
    pub select: Option<String>,

    #[arg(
        long = "once",
        help_heading = "Selection",
        help = "Print the opened page and exit instead of starting the prompt."
    )]
    pub once: bool,
}
