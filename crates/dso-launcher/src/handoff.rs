//! Passing a successful login to the game.
//!
//! The game reads the server address and session token from an INI file in
//! its install directory. Only the two keys the game looks at are touched;
//! anything else in the file is preserved.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use dso_net::LaunchTicket;

const NEWLINE: &str = "\r\n";

/// Errors from writing the handoff file or starting the game.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// The existing handoff file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The handoff file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The game executable could not be started.
    #[error("failed to launch {}: {source}", path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The `ADDRESS` value the game parses.
pub fn address_value(ticket: &LaunchTicket) -> String {
    format!(
        "type 'ip' address '{}' port '{}' token '{}'",
        ticket.address.ip,
        ticket.address.port,
        ticket.token_text()
    )
}

/// Record `ticket` in the handoff file at `path`, creating it if needed.
pub fn write_handoff(path: &Path, ticket: &LaunchTicket) -> Result<(), HandoffError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(HandoffError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let contents = set_ini_value(&contents, "tenfe", "TENFEAVAIL", "1");
    let contents = set_ini_value(&contents, "Darksun", "ADDRESS", &address_value(ticket));

    std::fs::write(path, contents).map_err(|source| HandoffError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Wrote handoff file {}", path.display());
    Ok(())
}

/// Start the game from its install directory.
pub fn launch_game(executable: &Path, working_dir: &Path) -> Result<Child, HandoffError> {
    tracing::info!("Launching {}", executable.display());
    Command::new(executable)
        .current_dir(working_dir)
        .spawn()
        .map_err(|source| HandoffError::Launch {
            path: executable.to_path_buf(),
            source,
        })
}

fn section_name(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

/// Set `key` in `[section]`, replacing an existing entry (names compare
/// case-insensitively) or appending one.
fn set_ini_value(contents: &str, section: &str, key: &str, value: &str) -> String {
    let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
    let entry = format!("{key}={value}");

    let start = lines
        .iter()
        .position(|l| section_name(l).is_some_and(|name| name.eq_ignore_ascii_case(section)));

    match start {
        None => {
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(format!("[{section}]"));
            lines.push(entry);
        }
        Some(start) => {
            let end = lines[start + 1..]
                .iter()
                .position(|l| section_name(l).is_some())
                .map_or(lines.len(), |offset| start + 1 + offset);

            let existing = (start + 1..end).find(|&i| {
                lines[i]
                    .split_once('=')
                    .is_some_and(|(k, _)| k.trim().eq_ignore_ascii_case(key))
            });

            match existing {
                Some(i) => lines[i] = entry,
                None => {
                    let mut at = end;
                    while at > start + 1 && lines[at - 1].trim().is_empty() {
                        at -= 1;
                    }
                    lines.insert(at, entry);
                }
            }
        }
    }

    let mut out = lines.join(NEWLINE);
    out.push_str(NEWLINE);
    out
}
