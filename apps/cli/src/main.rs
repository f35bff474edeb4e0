#![deny(warnings)]

//! Terminal front-end for the settlement ledger.

use anyhow::Result;
use persistence::KeyValueStore;
use rust_decimal::Decimal;
use settle_codec::format;
use settle_core::{Category, CategoryKind, DisplayUnit};
use settle_runtime::{
    quick_presets, CloseOutcome, Confirm, EditOutcome, Prompt, Session,
    SettleConfig, UndoOutcome,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  show                      print the sheet
  type <field> [text]       feed raw text into a field as typed
  set <field> [text]        commit a field (rounds to 0.1 M / 1 K)
  preset <field>            apply the shortcut amount (salary +2M, donation -1M)
  unit M|K                  switch display unit
  team <name>               set the team name
  clear                     clear this turn's inputs
  close                     end the turn and record it
  undo                      remove the last recorded turn
  reset                     start the game over
  quit
fields: salary rentIn tradeIn etcIn invest rentOut tradeOut donation fine";

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    state: Option<PathBuf>,
    assume_yes: bool,
    version: bool,
}

fn parse_args<I: Iterator<Item = String>>(mut it: I) -> Args {
    let mut args = Args::default();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next().map(PathBuf::from),
            "--state" => args.state = it.next().map(PathBuf::from),
            "--yes" | "-y" => args.assume_yes = true,
            "--version" | "-V" => args.version = true,
            _ => {}
        }
    }
    args
}

#[derive(Debug, PartialEq)]
enum Command {
    Show,
    Help,
    Quit,
    Type(Category, String),
    Set(Category, String),
    Preset(Category, Decimal),
    Unit(DisplayUnit),
    Team(String),
    Clear,
    Close,
    Undo,
    Reset,
}

fn parse_field(word: Option<&str>) -> Result<Category, String> {
    let word = word.ok_or_else(|| "missing field name".to_string())?;
    Category::ALL
        .into_iter()
        .find(|c| c.key().eq_ignore_ascii_case(word))
        .ok_or_else(|| format!("unknown field: {word}"))
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let mut words = rest.splitn(2, char::is_whitespace);
    match verb.to_ascii_lowercase().as_str() {
        "" | "show" => Ok(Command::Show),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "type" => {
            let field = parse_field(words.next())?;
            Ok(Command::Type(field, words.next().unwrap_or("").trim().to_string()))
        }
        "set" => {
            let field = parse_field(words.next())?;
            Ok(Command::Set(field, words.next().unwrap_or("").trim().to_string()))
        }
        "preset" => {
            let field = parse_field(words.next())?;
            quick_presets()
                .into_iter()
                .find(|(c, _)| *c == field)
                .map(|(c, amount)| Command::Preset(c, amount))
                .ok_or_else(|| format!("no shortcut for {field}"))
        }
        "unit" => DisplayUnit::from_code(&rest.to_ascii_uppercase())
            .map(Command::Unit)
            .ok_or_else(|| "unit must be M or K".to_string()),
        "team" => Ok(Command::Team(rest.to_string())),
        "clear" => Ok(Command::Clear),
        "close" | "end" => Ok(Command::Close),
        "undo" => Ok(Command::Undo),
        "reset" => Ok(Command::Reset),
        other => Err(format!("unknown command: {other} (try `help`)")),
    }
}

/// Asks on the terminal unless `--yes` was given.
struct TerminalConfirm<'a, R: ?Sized, W: ?Sized> {
    input: &'a mut R,
    out: &'a mut W,
    assume_yes: bool,
}

impl<R: BufRead + ?Sized, W: Write + ?Sized> Confirm for TerminalConfirm<'_, R, W> {
    /// Declines when the prompt cannot be shown.
    fn confirm(&mut self, prompt: Prompt) -> bool {
        if self.assume_yes {
            return writeln!(self.out, "{} yes", prompt.message()).is_ok();
        }
        let shown = write!(self.out, "{} [y/N] ", prompt.message()).and_then(|()| self.out.flush());
        if let Err(e) = shown {
            warn!(error = %e, "cannot show prompt; declining");
            return false;
        }
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        }
    }
}

fn or_zero(text: String) -> String {
    if text.is_empty() {
        "0".to_string()
    } else {
        text
    }
}

fn signed(amount: Decimal, unit: DisplayUnit) -> String {
    let sign = if amount > Decimal::ZERO { "+" } else { "" };
    format!("{sign}{}", or_zero(format(amount, unit)))
}

fn render<S: KeyValueStore>(session: &Session<S>) -> String {
    let state = session.state();
    let unit = state.unit;
    let team = if state.team_name.is_empty() {
        "(unnamed team)"
    } else {
        state.team_name.as_str()
    };
    let mut out = String::new();
    out.push_str(&format!(
        "{team} | cash {} {unit} | TURN {} | unit {unit} (1M=1000K)\n",
        or_zero(format(state.cash, unit)),
        state.turn
    ));
    for kind in [CategoryKind::Income, CategoryKind::Expense] {
        out.push_str(match kind {
            CategoryKind::Income => "  income\n",
            CategoryKind::Expense => "  expense\n",
        });
        for category in Category::ALL.into_iter().filter(|c| c.kind() == kind) {
            out.push_str(&format!(
                "    {:<9} {:<20} {:>12} {unit}\n",
                category.key(),
                category.label(),
                or_zero(session.field_text(category))
            ));
        }
    }
    let totals = session.totals();
    out.push_str(&format!(
        "  +{} / -{}   this turn {} {unit}\n",
        or_zero(format(totals.income, unit)),
        or_zero(format(totals.expense, unit)),
        signed(totals.profit, unit)
    ));
    if state.history.is_empty() {
        out.push_str("  no turns recorded yet\n");
    }
    for record in &state.history {
        out.push_str(&format!(
            "  TURN {:<3} {} {unit} (in {} / out {})  balance {} {unit}\n",
            record.turn,
            signed(record.profit, unit),
            or_zero(format(record.income, unit)),
            or_zero(format(record.expense, unit)),
            or_zero(format(record.balance_after, unit))
        ));
    }
    out
}

/// Drive a session from line-oriented input until EOF or `quit`.
fn run<S: KeyValueStore>(
    session: &mut Session<S>,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
    assume_yes: bool,
) -> Result<()> {
    write!(out, "{}", render(session))?;
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                writeln!(out, "{message}")?;
                continue;
            }
        };
        let mut confirm = TerminalConfirm {
            input: &mut *input,
            out: &mut *out,
            assume_yes,
        };
        let note = match command {
            Command::Quit => break,
            Command::Help => Some(HELP.to_string()),
            Command::Show => None,
            Command::Type(field, text) => match session.edit_field(field, &text) {
                EditOutcome::Applied(_) => None,
                EditOutcome::Rejected(reason) => Some(format!("ignored: {reason}")),
            },
            Command::Set(field, text) => {
                session.commit_field(field, &text);
                None
            }
            Command::Preset(field, amount) => {
                session.quick_adjust(field, amount);
                None
            }
            Command::Unit(unit) => {
                session.set_unit(unit);
                None
            }
            Command::Team(name) => {
                session.set_team_name(&name);
                None
            }
            Command::Clear => {
                session.clear_inputs();
                None
            }
            Command::Close => match session.close_turn(&mut confirm) {
                Ok(CloseOutcome::Closed(record)) => Some(format!("turn {} recorded", record.turn)),
                Ok(CloseOutcome::Declined) => Some("turn kept open".to_string()),
                Err(e) => Some(e.to_string()),
            },
            Command::Undo => match session.undo_last_turn(&mut confirm) {
                UndoOutcome::Undone(record) => Some(format!("turn {} removed", record.turn)),
                UndoOutcome::Declined => Some("kept".to_string()),
                UndoOutcome::NothingToUndo => Some("nothing to undo".to_string()),
            },
            Command::Reset => {
                if session.reset_all(&mut confirm) {
                    Some("game reset".to_string())
                } else {
                    Some("kept".to_string())
                }
            }
        };
        if let Some(note) = note {
            writeln!(out, "{note}")?;
        }
        write!(out, "{}", render(session))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1));
    if args.version {
        println!(
            "settle {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }

    let mut cfg = match &args.config {
        Some(path) => SettleConfig::load(path)?,
        None => SettleConfig::default(),
    };
    if let Some(state) = args.state.clone() {
        cfg.store_path = state;
    }

    // Logging setup
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!(?args, store = %cfg.store_path.display(), policy = ?cfg.validation, "starting CLI");

    let mut session = Session::from_config(&cfg);
    let stdin = io::stdin();
    let stdout = io::stdout();
    run(&mut session, &mut stdin.lock(), &mut stdout.lock(), args.assume_yes)
}
