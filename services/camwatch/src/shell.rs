//! Interactive command shell over the console
//!
//! One command per line; after every command the shell prints its output
//! followed by the notice the command produced.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;

use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::console::Console;
use crate::error::{CamwatchError, Result};
use crate::files::FileKind;
use crate::state::{
    Device, FileEntry, LiveView, Notice, NoticeLevel, RecordingState, Screen, ViewState,
};

pub const HELP: &str = "\
Commands:
  login <user> [password]          log in (prompts for the password when omitted)
  logout                           end the session
  devices                          show the device table
  refresh                          re-fetch devices, snapshots and records
  add <id> <name> <rtsp_url>       register a device
  delete <id> [--yes]              remove a device (asks for confirmation)
  select <id>                      show a device in the live panel
  set <key>=<value>...             update settings of the selected device
  record start|stop                start or stop recording the selected device
  snapshot                         capture a snapshot of the selected device
  snapshot start|stop              start or stop periodic snapshot backup
  snapshots                        list snapshot files with download links
  records                          list recordings with playback links
  download snapshot|record <name> [dir]
                                   save a file locally
  stream                           show the stream URL (opens the player if configured)
  watch                            follow the live panel until Enter is pressed
  settings                         show the backend-wide settings
  status                           show session, selection and recording
  help                             show this text
  quit                             log out and exit";

/// A parsed shell line
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Login {
        username: String,
        password: Option<String>,
    },
    Logout,
    Devices,
    Refresh,
    Add {
        id: String,
        name: String,
        rtsp_url: String,
    },
    Delete {
        device_id: String,
        confirmed: bool,
    },
    Select {
        device_id: String,
    },
    Set {
        fields: Map<String, Value>,
    },
    RecordStart,
    RecordStop,
    Snapshot,
    BackupStart,
    BackupStop,
    Snapshots,
    Records,
    Download {
        kind: FileKind,
        name: String,
        dir: Option<PathBuf>,
    },
    Stream,
    Watch,
    Settings,
    Status,
    Help,
    Quit,
}

/// What the shell does after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue(String),
    Quit,
}

fn usage(text: &str) -> CamwatchError {
    CamwatchError::Validation(format!("Usage: {}", text))
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>> {
    let tokens = tokenize(line)?;
    let Some((head, args)) = tokens.split_first() else {
        return Ok(None);
    };
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let command = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("login", [username]) => ShellCommand::Login {
            username: username.to_string(),
            password: None,
        },
        ("login", [username, password]) => ShellCommand::Login {
            username: username.to_string(),
            password: Some(password.to_string()),
        },
        ("login", _) => return Err(usage("login <user> [password]")),
        ("logout", []) => ShellCommand::Logout,
        ("devices", []) => ShellCommand::Devices,
        ("refresh", []) => ShellCommand::Refresh,
        ("add", [id, name, rtsp_url]) => ShellCommand::Add {
            id: id.to_string(),
            name: name.to_string(),
            rtsp_url: rtsp_url.to_string(),
        },
        ("add", _) => return Err(usage("add <id> <name> <rtsp_url>")),
        ("delete", rest) => {
            let confirmed = rest.iter().any(|a| *a == "--yes" || *a == "-y");
            let ids: Vec<&&str> = rest.iter().filter(|a| !a.starts_with('-')).collect();
            match ids.as_slice() {
                [id] => ShellCommand::Delete {
                    device_id: id.to_string(),
                    confirmed,
                },
                _ => return Err(usage("delete <id> [--yes]")),
            }
        }
        ("select", [device_id]) => ShellCommand::Select {
            device_id: device_id.to_string(),
        },
        ("select", _) => return Err(usage("select <id>")),
        ("set", rest) if !rest.is_empty() => ShellCommand::Set {
            fields: parse_fields(rest)?,
        },
        ("set", _) => return Err(usage("set <key>=<value>...")),
        ("record", ["start"]) => ShellCommand::RecordStart,
        ("record", ["stop"]) => ShellCommand::RecordStop,
        ("record", _) => return Err(usage("record start|stop")),
        ("snapshot", []) => ShellCommand::Snapshot,
        ("snapshot", ["start"]) => ShellCommand::BackupStart,
        ("snapshot", ["stop"]) => ShellCommand::BackupStop,
        ("snapshot", _) => return Err(usage("snapshot [start|stop]")),
        ("snapshots", []) => ShellCommand::Snapshots,
        ("records", []) => ShellCommand::Records,
        ("download", [kind, name, rest @ ..]) if rest.len() <= 1 => {
            let kind = match *kind {
                "snapshot" => FileKind::Snapshot,
                "record" => FileKind::Record,
                _ => return Err(usage("download snapshot|record <name> [dir]")),
            };
            ShellCommand::Download {
                kind,
                name: name.to_string(),
                dir: rest.first().map(PathBuf::from),
            }
        }
        ("download", _) => return Err(usage("download snapshot|record <name> [dir]")),
        ("stream", []) => ShellCommand::Stream,
        ("watch", []) => ShellCommand::Watch,
        ("settings", []) => ShellCommand::Settings,
        ("status", []) => ShellCommand::Status,
        ("help" | "?", _) => ShellCommand::Help,
        ("quit" | "exit", []) => ShellCommand::Quit,
        (other, _) => {
            return Err(CamwatchError::Validation(format!(
                "Unknown command '{}', type 'help' for the list",
                other
            )))
        }
    };
    Ok(Some(command))
}

/// `key=value` pairs; values that parse as JSON keep their type, anything
/// else is sent as a string
fn parse_fields(pairs: &[&str]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(usage("set <key>=<value>..."));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(usage("set <key>=<value>..."));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

/// Split on whitespace, honoring single and double quotes anywhere in a word
fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err(CamwatchError::Validation("Unterminated quote".to_string()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

pub fn render_devices(devices: &[Device]) -> String {
    if devices.is_empty() {
        return "No devices registered.".to_string();
    }
    let mut out = format!("{:<16}  {:<20}  {:<8}  RTSP URL\n", "ID", "NAME", "STATUS");
    for device in devices {
        let url = match &device.error {
            Some(error) => format!("(error: {})", error),
            None => device.rtsp_url.clone(),
        };
        let _ = writeln!(
            out,
            "{:<16}  {:<20}  {:<8}  {}",
            device.id, device.name, device.status, url
        );
    }
    out.trim_end().to_string()
}

pub fn render_live(live: &LiveView) -> String {
    let mut out = format!("Device: {}", live.device_id);
    if !live.name.is_empty() {
        let _ = write!(out, " ({})", live.name);
    }
    let _ = write!(
        out,
        "\nStream: {}",
        live.stream_url.as_deref().unwrap_or("loading...")
    );
    match &live.recording {
        RecordingState::Idle => out.push_str("\nRecording: idle"),
        RecordingState::Starting => out.push_str("\nRecording: starting..."),
        RecordingState::Recording(active) => {
            let elapsed = active
                .elapsed_seconds
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "starting".to_string());
            let _ = write!(
                out,
                "\nRecording: {} (id {}, {})",
                active.file, active.recording_id, elapsed
            );
        }
    }
    if live.backup.is_some() {
        out.push_str("\nSnapshot backup: running");
    }
    if !live.settings.is_empty() {
        out.push_str("\nSettings:");
        out.push_str(&render_settings(&live.settings));
    }
    out
}

/// One indented `key = value` line per setting
pub fn render_settings(settings: &Map<String, Value>) -> String {
    let mut out = String::new();
    for (key, value) in settings {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let _ = write!(out, "\n  {} = {}", key, value);
    }
    out
}

/// File names with the link produced by `link`
pub fn render_files<F>(title: &str, entries: &[FileEntry], link: F) -> String
where
    F: Fn(&str) -> Result<String>,
{
    if entries.is_empty() {
        return format!("No {}.", title);
    }
    let mut out = format!("{} ({}):", title, entries.len());
    for entry in entries {
        match link(&entry.name) {
            Ok(url) => {
                let _ = write!(out, "\n  {:<40}  {}", entry.name, url);
            }
            Err(_) => {
                let _ = write!(out, "\n  {}", entry.name);
            }
        }
    }
    out
}

pub fn render_status(state: &ViewState, polling: bool) -> String {
    match state.screen() {
        Screen::Login => "Logged out.".to_string(),
        Screen::Dashboard => {
            let mut out = format!(
                "Logged in as {} ({} devices, polling {})",
                state.username().unwrap_or_default(),
                state.devices.len(),
                if polling { "on" } else { "off" }
            );
            match &state.live {
                Some(live) => {
                    let _ = write!(out, "\n{}", render_live(live));
                }
                None => out.push_str("\nNo device selected."),
            }
            out
        }
    }
}

pub fn render_notice(notice: &Notice) -> String {
    match notice.level {
        NoticeLevel::Info => notice.text.clone(),
        NoticeLevel::Error => format!("error: {}", notice.text),
    }
}

/// Line-oriented front end for one console
pub struct Shell {
    console: Console,
}

impl Shell {
    pub fn new(console: Console) -> Self {
        Self { console }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Run a parsed command. Interactive parts (password prompt, delete
    /// confirmation) are resolved by [`Shell::run`] before this is called.
    pub async fn execute(&self, command: ShellCommand) -> Result<Flow> {
        let console = &self.console;
        let output = match command {
            ShellCommand::Login { username, password } => {
                console
                    .login(&username, password.as_deref().unwrap_or_default())
                    .await?;
                render_devices(&console.state().read().await.devices)
            }
            ShellCommand::Logout => {
                console.logout().await?;
                String::new()
            }
            ShellCommand::Devices => {
                self.require_session().await?;
                render_devices(&console.state().read().await.devices)
            }
            ShellCommand::Refresh => {
                console.devices().fetch_devices().await?;
                console.files().fetch_snapshots().await?;
                console.files().fetch_records().await?;
                render_devices(&console.state().read().await.devices)
            }
            ShellCommand::Add { id, name, rtsp_url } => {
                console.devices().add_device(&id, &name, &rtsp_url).await?;
                render_devices(&console.state().read().await.devices)
            }
            ShellCommand::Delete {
                device_id,
                confirmed,
            } => {
                if console.devices().delete_device(&device_id, confirmed).await? {
                    render_devices(&console.state().read().await.devices)
                } else {
                    "Delete cancelled.".to_string()
                }
            }
            ShellCommand::Select { device_id } => {
                console.live().select_device(&device_id).await?;
                self.render_selection().await
            }
            ShellCommand::Set { fields } => {
                let device_id = self.selected_device().await?;
                console.devices().update_device(&device_id, fields).await?;
                self.render_selection().await
            }
            ShellCommand::RecordStart => {
                console.live().start_recording().await?;
                self.render_selection().await
            }
            ShellCommand::RecordStop => {
                console.live().stop_recording().await?;
                self.render_selection().await
            }
            ShellCommand::Snapshot => {
                console.live().take_snapshot().await?;
                String::new()
            }
            ShellCommand::BackupStart => {
                console.live().start_snapshot_backup().await?;
                String::new()
            }
            ShellCommand::BackupStop => {
                console.live().stop_snapshot_backup().await?;
                String::new()
            }
            ShellCommand::Snapshots => {
                let files = console.files();
                files.fetch_snapshots().await?;
                let state = console.state();
                let state = state.read().await;
                render_files("snapshots", &state.snapshots, |n| files.snapshot_url(n))
            }
            ShellCommand::Records => {
                let files = console.files();
                files.fetch_records().await?;
                let state = console.state();
                let state = state.read().await;
                render_files("records", &state.records, |n| files.playback_url(n))
            }
            ShellCommand::Download { kind, name, dir } => {
                let files = console.files();
                let path = match kind {
                    FileKind::Snapshot => files.download_snapshot(&name, dir.as_deref()).await?,
                    FileKind::Record => files.download_record(&name, dir.as_deref()).await?,
                };
                format!("Saved {}", path.display())
            }
            ShellCommand::Stream => {
                if console.config().client.player.is_some() {
                    console.live().open_stream().await?
                } else {
                    console.live().stream_url().await?
                }
            }
            ShellCommand::Watch => self.render_selection().await,
            ShellCommand::Settings => {
                let settings = console.devices().backend_settings().await?;
                if settings.is_empty() {
                    "No backend settings.".to_string()
                } else {
                    format!("Backend settings:{}", render_settings(&settings))
                }
            }
            ShellCommand::Status => {
                let polling = console.session().is_polling().await;
                render_status(&*console.state().read().await, polling)
            }
            ShellCommand::Help => HELP.to_string(),
            ShellCommand::Quit => return Ok(Flow::Quit),
        };
        Ok(Flow::Continue(output))
    }

    async fn require_session(&self) -> Result<()> {
        self.console.state().read().await.session_scope().map(|_| ())
    }

    async fn selected_device(&self) -> Result<String> {
        let state = self.console.state();
        let state = state.read().await;
        state.session_scope()?;
        state
            .live
            .as_ref()
            .map(|live| live.device_id.clone())
            .ok_or(CamwatchError::NoDeviceSelected)
    }

    async fn render_selection(&self) -> String {
        match &self.console.state().read().await.live {
            Some(live) => render_live(live),
            None => "No device selected.".to_string(),
        }
    }

    /// Print output and the notice of the last command
    async fn report(&self, outcome: &Result<Flow>) {
        if let Ok(Flow::Continue(output)) = outcome {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        let notice = self.console.state().write().await.notice.take();
        match (notice, outcome) {
            (Some(notice), _) => println!("{}", render_notice(&notice)),
            (None, Err(e)) => println!("{}", render_notice(&Notice::from_error(e))),
            (None, Ok(_)) => {}
        }
    }

    /// Read commands from `input` until `quit`, end of input or `cancel`.
    /// The session is logged out on the way out.
    pub async fn run<R>(&self, input: R, cancel: CancellationToken) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        println!("camwatch console for {}. Type 'help' for commands.", self.console.api().base_url());

        loop {
            prompt("camwatch> ");
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = cancel.cancelled() => break,
            };
            let Some(line) = line else { break };

            let command = match parse_command(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    println!("{}", render_notice(&Notice::from_error(&e)));
                    continue;
                }
            };

            let command = match command {
                ShellCommand::Login {
                    username,
                    password: None,
                } => {
                    let password = read_password().await?;
                    ShellCommand::Login {
                        username,
                        password: Some(password),
                    }
                }
                ShellCommand::Delete {
                    device_id,
                    confirmed: false,
                } => {
                    prompt(&format!("Delete device {}? [y/N] ", device_id));
                    let answer = lines.next_line().await?.unwrap_or_default();
                    let answer = answer.trim();
                    ShellCommand::Delete {
                        device_id,
                        confirmed: answer.eq_ignore_ascii_case("y")
                            || answer.eq_ignore_ascii_case("yes"),
                    }
                }
                other => other,
            };

            let watch = command == ShellCommand::Watch;
            let outcome = self.execute(command).await;
            self.report(&outcome).await;

            match outcome {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue(_)) if watch => {
                    if self.watch(&mut lines, &cancel).await? {
                        break;
                    }
                }
                _ => {}
            }
        }

        self.console.shutdown().await;
        Ok(())
    }

    /// Re-print the live panel every recording tick until a line arrives.
    /// Returns true when input ended or the shell was cancelled.
    async fn watch<R>(
        &self,
        lines: &mut tokio::io::Lines<R>,
        cancel: &CancellationToken,
    ) -> Result<bool>
    where
        R: AsyncBufRead + Unpin,
    {
        println!("(press Enter to stop watching)");
        let mut ticker = tokio::time::interval(self.console.config().polling.recording_tick());
        ticker.tick().await;
        loop {
            tokio::select! {
                line = lines.next_line() => return Ok(line?.is_none()),
                _ = cancel.cancelled() => return Ok(true),
                _ = ticker.tick() => {
                    println!("{}\n", self.render_selection().await);
                }
            }
        }
    }
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

async fn read_password() -> Result<String> {
    let password = tokio::task::spawn_blocking(|| rpassword::prompt_password("Password: "))
        .await
        .map_err(std::io::Error::other)??;
    Ok(password)
}
