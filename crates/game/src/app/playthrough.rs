use std::collections::VecDeque;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use adventure_engine::{AdventureSession, InputSnapshot, InputSource, Vec2};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::save;

pub(crate) const SCRIPT_ENV_VAR: &str = "ADVENTURE_SCRIPT";
const DEFAULT_SCRIPT_NAME: &str = "demo.txt";
const DEFAULT_WAIT_IDLE_SECONDS: f32 = 30.0;
const DEFAULT_MASH_INTERVAL_SECONDS: f32 = 0.1;

#[derive(Debug, Error)]
pub(crate) enum PlaythroughError {
    #[error("failed to read playthrough '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Click(Vec2),
    ClickOn(String),
    UiClick(Vec2),
    Hover(Vec2),
    Advance,
    SkipDialogue(f32),
    Choose(usize),
    Wait(f32),
    WaitIdle(f32),
    Mash { count: u32, interval_seconds: f32 },
    ExpectRoom(String),
    ExpectFlag { name: String, value: bool },
    Abort,
    Save(String),
    Load(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlaythroughFailure {
    pub(crate) line: usize,
    pub(crate) message: String,
}

impl fmt::Display for PlaythroughFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    Wait {
        remaining_ticks: u64,
    },
    WaitIdle {
        line: usize,
        remaining_ticks: u64,
    },
    SkipDialogue {
        line: usize,
        remaining_ticks: u64,
    },
    Mash {
        remaining_clicks: u32,
        interval_ticks: u64,
        countdown: u64,
    },
}

/// Scripted input: one command per line, `#` starts a comment.
///
/// Pointer commands (`click x y`, `click_on label`, `ui_click x y`,
/// `hover x y`) and dialogue commands (`advance`, `choose i`) take one tick.
/// `wait secs`, `wait_idle [secs]`, `skip_dialogue [secs]` and
/// `mash count [interval]` span several. `expect_room`, `expect_flag`,
/// `abort`, `save` and `load` run between ticks.
#[derive(Debug)]
pub(crate) struct Playthrough {
    commands: VecDeque<(usize, Command)>,
    active: Option<Active>,
    pointer: Option<Vec2>,
    tps: u32,
    save_dir: PathBuf,
    failures: Vec<PlaythroughFailure>,
    executed: usize,
}

pub(crate) fn resolve_script_path(playthrough_dir: &Path) -> PathBuf {
    match env::var(SCRIPT_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        Ok(_) => {
            warn!(env_var = SCRIPT_ENV_VAR, "playthrough_env_empty_using_default");
            playthrough_dir.join(DEFAULT_SCRIPT_NAME)
        }
        Err(_) => playthrough_dir.join(DEFAULT_SCRIPT_NAME),
    }
}

pub(crate) fn load_playthrough(
    path: &Path,
    tps: u32,
    save_dir: &Path,
) -> Result<Playthrough, PlaythroughError> {
    let raw = fs::read_to_string(path).map_err(|source| PlaythroughError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let playthrough = Playthrough::parse(path, &raw, tps, save_dir)?;
    info!(
        path = %path.display(),
        commands = playthrough.remaining(),
        "playthrough_loaded"
    );
    Ok(playthrough)
}

impl Playthrough {
    pub(crate) fn parse(
        path: &Path,
        raw: &str,
        tps: u32,
        save_dir: &Path,
    ) -> Result<Self, PlaythroughError> {
        let mut commands = VecDeque::new();
        for (index, text) in raw.lines().enumerate() {
            let line = index + 1;
            let text = text.split('#').next().unwrap_or_default().trim();
            if text.is_empty() {
                continue;
            }
            let command = parse_command(text).map_err(|message| PlaythroughError::Parse {
                path: path.to_path_buf(),
                line,
                message,
            })?;
            commands.push_back((line, command));
        }
        Ok(Self {
            commands,
            active: None,
            pointer: None,
            tps: tps.max(1),
            save_dir: save_dir.to_path_buf(),
            failures: Vec::new(),
            executed: 0,
        })
    }

    pub(crate) fn failures(&self) -> &[PlaythroughFailure] {
        &self.failures
    }

    pub(crate) fn remaining(&self) -> usize {
        self.commands.len()
    }

    pub(crate) fn executed(&self) -> usize {
        self.executed
    }

    fn ticks_for(&self, seconds: f32) -> u64 {
        (seconds.max(0.0) * self.tps as f32).ceil().max(1.0) as u64
    }

    fn idle_input(&self) -> InputSnapshot {
        InputSnapshot::empty().with_pointer_world_position(self.pointer)
    }

    fn click_input(&mut self, position: Vec2) -> InputSnapshot {
        self.pointer = Some(position);
        InputSnapshot::click_at(position)
    }

    fn fail(&mut self, line: usize, message: String) {
        warn!(line, %message, "playthrough_step_failed");
        self.failures.push(PlaythroughFailure { line, message });
        self.commands.clear();
        self.active = None;
    }

    fn step_active(&mut self, session: &AdventureSession) -> Option<InputSnapshot> {
        let active = self.active.take()?;
        match active {
            Active::Wait { remaining_ticks } => {
                if remaining_ticks > 1 {
                    self.active = Some(Active::Wait {
                        remaining_ticks: remaining_ticks - 1,
                    });
                }
                Some(self.idle_input())
            }
            Active::WaitIdle {
                line,
                remaining_ticks,
            } => {
                if session.is_idle() {
                    return None;
                }
                if remaining_ticks == 0 {
                    self.fail(line, "session did not become idle in time".to_string());
                    return None;
                }
                self.active = Some(Active::WaitIdle {
                    line,
                    remaining_ticks: remaining_ticks - 1,
                });
                Some(self.idle_input())
            }
            Active::SkipDialogue {
                line,
                remaining_ticks,
            } => {
                if session.dialogue().awaiting_choice() || session.is_idle() {
                    return None;
                }
                if remaining_ticks == 0 {
                    self.fail(line, "dialogue did not finish in time".to_string());
                    return None;
                }
                self.active = Some(Active::SkipDialogue {
                    line,
                    remaining_ticks: remaining_ticks - 1,
                });
                Some(self.idle_input().with_advance_dialogue_pressed(true))
            }
            Active::Mash {
                remaining_clicks,
                interval_ticks,
                countdown,
            } => {
                // Clicks start once the actor has reached the puzzle.
                if session.movement().is_moving() {
                    self.active = Some(active);
                    return Some(self.idle_input());
                }
                if countdown > 0 {
                    self.active = Some(Active::Mash {
                        remaining_clicks,
                        interval_ticks,
                        countdown: countdown - 1,
                    });
                    return Some(self.idle_input());
                }
                if remaining_clicks > 1 {
                    self.active = Some(Active::Mash {
                        remaining_clicks: remaining_clicks - 1,
                        interval_ticks,
                        countdown: interval_ticks.saturating_sub(1),
                    });
                }
                Some(self.idle_input().with_clicked(true))
            }
        }
    }

    /// Runs one command. Commands that need ticks return the first input.
    fn execute(
        &mut self,
        command: Command,
        line: usize,
        session: &mut AdventureSession,
    ) -> Result<Option<InputSnapshot>, String> {
        debug!(line, ?command, "playthrough_command");
        self.executed = self.executed.saturating_add(1);
        match command {
            Command::Click(position) => Ok(Some(self.click_input(position))),
            Command::ClickOn(label) => {
                let Some((_, hit_box)) = session.find_interactable(&label) else {
                    return Err(format!(
                        "no visible interactable '{label}' in room {}",
                        session.active_room_id().unwrap_or("-")
                    ));
                };
                Ok(Some(self.click_input(hit_box.center())))
            }
            Command::UiClick(position) => {
                Ok(Some(self.click_input(position).with_pointer_over_ui(true)))
            }
            Command::Hover(position) => {
                self.pointer = Some(position);
                Ok(Some(self.idle_input()))
            }
            Command::Advance => Ok(Some(self.idle_input().with_advance_dialogue_pressed(true))),
            Command::SkipDialogue(seconds) => {
                self.active = Some(Active::SkipDialogue {
                    line,
                    remaining_ticks: self.ticks_for(seconds),
                });
                Ok(None)
            }
            Command::Choose(index) => Ok(Some(self.idle_input().with_choice_selected(Some(index)))),
            Command::Wait(seconds) => {
                self.active = Some(Active::Wait {
                    remaining_ticks: self.ticks_for(seconds),
                });
                Ok(None)
            }
            Command::WaitIdle(seconds) => {
                self.active = Some(Active::WaitIdle {
                    line,
                    remaining_ticks: self.ticks_for(seconds),
                });
                Ok(None)
            }
            Command::Mash {
                count,
                interval_seconds,
            } => {
                if count > 0 {
                    self.active = Some(Active::Mash {
                        remaining_clicks: count,
                        interval_ticks: self.ticks_for(interval_seconds),
                        countdown: 0,
                    });
                }
                Ok(None)
            }
            Command::ExpectRoom(expected) => match session.active_room_id() {
                Some(room) if room == expected => Ok(None),
                actual => Err(format!(
                    "expected room '{expected}', found '{}'",
                    actual.unwrap_or("-")
                )),
            },
            Command::ExpectFlag { name, value } => {
                let Some(flag) = session.flags().id(&name) else {
                    return Err(format!("unknown flag '{name}'"));
                };
                let actual = session.flags().is_active(flag);
                if actual == value {
                    Ok(None)
                } else {
                    Err(format!("expected flag '{name}' to be {value}, found {actual}"))
                }
            }
            Command::Abort => {
                session.abort_interactions();
                Ok(None)
            }
            Command::Save(name) => {
                save::write_snapshot(&self.save_dir, &name, &session.snapshot())
                    .map_err(|error| error.to_string())?;
                Ok(None)
            }
            Command::Load(name) => {
                let snapshot =
                    save::read_snapshot(&self.save_dir, &name).map_err(|error| error.to_string())?;
                session.restore(&snapshot).map_err(|error| error.to_string())?;
                Ok(None)
            }
        }
    }
}

impl InputSource for Playthrough {
    fn next_input(&mut self, _tick: u64, session: &mut AdventureSession) -> Option<InputSnapshot> {
        loop {
            if !self.failures.is_empty() {
                return None;
            }
            if self.active.is_some() {
                if let Some(input) = self.step_active(session) {
                    return Some(input);
                }
                continue;
            }
            let (line, command) = self.commands.pop_front()?;
            match self.execute(command, line, session) {
                Ok(Some(input)) => return Some(input),
                Ok(None) => {}
                Err(message) => self.fail(line, message),
            }
        }
    }
}

fn parse_command(text: &str) -> Result<Command, String> {
    let mut parts = text.split_whitespace();
    let Some(verb) = parts.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = parts.collect();
    let command = match verb {
        "click" => Command::Click(point(&args)?),
        "click_on" => {
            if args.is_empty() {
                return Err("click_on needs a label".to_string());
            }
            return Ok(Command::ClickOn(args.join(" ")));
        }
        "ui_click" => Command::UiClick(point(&args)?),
        "hover" => Command::Hover(point(&args)?),
        "advance" => Command::Advance,
        "skip_dialogue" => {
            Command::SkipDialogue(optional(&args, 0, "seconds", DEFAULT_WAIT_IDLE_SECONDS)?)
        }
        "choose" => Command::Choose(number(&args, 0, "choice index")?),
        "wait" => Command::Wait(number(&args, 0, "seconds")?),
        "wait_idle" => Command::WaitIdle(optional(&args, 0, "seconds", DEFAULT_WAIT_IDLE_SECONDS)?),
        "mash" => Command::Mash {
            count: number(&args, 0, "click count")?,
            interval_seconds: optional(&args, 1, "interval", DEFAULT_MASH_INTERVAL_SECONDS)?,
        },
        "expect_room" => Command::ExpectRoom(word(&args, 0, "room id")?),
        "expect_flag" => Command::ExpectFlag {
            name: word(&args, 0, "flag name")?,
            value: number(&args, 1, "true|false")?,
        },
        "abort" => Command::Abort,
        "save" => Command::Save(word(&args, 0, "save name")?),
        "load" => Command::Load(word(&args, 0, "save name")?),
        other => return Err(format!("unknown command '{other}'")),
    };
    let expected = match &command {
        Command::Click(_) | Command::UiClick(_) | Command::Hover(_) => 2,
        Command::Advance | Command::Abort => 0,
        Command::Mash { .. } | Command::ExpectFlag { .. } => 2,
        _ => 1,
    };
    if args.len() > expected {
        return Err(format!("'{verb}' takes at most {expected} arguments"));
    }
    Ok(command)
}

fn word(args: &[&str], index: usize, what: &str) -> Result<String, String> {
    args.get(index)
        .map(|value| value.to_string())
        .ok_or_else(|| format!("missing {what}"))
}

fn number<T: std::str::FromStr>(args: &[&str], index: usize, what: &str) -> Result<T, String> {
    let raw = word(args, index, what)?;
    raw.parse::<T>()
        .map_err(|_| format!("invalid {what} '{raw}'"))
}

fn optional<T: std::str::FromStr>(
    args: &[&str],
    index: usize,
    what: &str,
    default: T,
) -> Result<T, String> {
    if args.get(index).is_none() {
        return Ok(default);
    }
    number(args, index, what)
}

fn point(args: &[&str]) -> Result<Vec2, String> {
    Ok(Vec2::new(number(args, 0, "x")?, number(args, 1, "y")?))
}

#[cfg(test)]
mod tests {
    use adventure_engine::{
        parse_adventure_document, run_headless, LoopConfig, SessionConfig,
    };
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    use super::*;
    use crate::app::world::{build_world, DemoWorld};

    const WORLD: &str = r#"<Adventure>
        <Flag name="has_keys"/>
        <Flag name="crate_open"/>
        <Start room="office" entry="start"/>
        <Room id="office" floorMin="-6" floorMax="6">
            <Entry key="start" x="0"/>
            <Entry key="right" x="5"/>
            <Door label="hall door" x="5.5" target="hall" entry="left" interactionX="5"
                  lockFlag="has_keys"/>
            <Search label="desk" x="-3" seconds="0.5" foundFlag="has_keys" keyHunt="keys"/>
        </Room>
        <Room id="hall" floorMin="-10" floorMax="10">
            <Entry key="left" x="-9"/>
            <Mash label="crate" x="-4" targetProgress="3" lateStage="false" completionSeconds="0"
                  completionFlag="crate_open"/>
        </Room>
        <KeyHunt id="keys" placement="0" foundFlag="has_keys"/>
    </Adventure>"#;

    fn world() -> DemoWorld {
        let content = parse_adventure_document(Path::new("world.xml"), WORLD).expect("content");
        let mut rng = StdRng::seed_from_u64(1);
        build_world(&content, SessionConfig::default(), &mut rng).expect("world")
    }

    fn run(script: &str, save_dir: &Path) -> (DemoWorld, Playthrough) {
        let mut world = world();
        let mut playthrough =
            Playthrough::parse(Path::new("test.txt"), script, 60, save_dir).expect("parse");
        let config = LoopConfig {
            max_ticks: Some(20_000),
            ..LoopConfig::default()
        };
        run_headless(&mut world.session, &config, &mut playthrough).expect("run");
        (world, playthrough)
    }

    #[test]
    fn parse_skips_comments_and_reports_line_numbers() {
        let temp = TempDir::new().expect("temp");
        let playthrough = Playthrough::parse(
            Path::new("p.txt"),
            "# intro\nclick 1 0\n\nwait_idle   # settle\n",
            60,
            temp.path(),
        )
        .expect("parse");
        assert_eq!(playthrough.remaining(), 2);

        let err = Playthrough::parse(Path::new("p.txt"), "advance\njump 3\n", 60, temp.path())
            .expect_err("unknown verb");
        match err {
            PlaythroughError::Parse { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("jump"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse_command("click 1").is_err());
        assert!(parse_command("expect_flag has_keys maybe").is_err());
        assert!(parse_command("advance now").is_err());
        assert_eq!(
            parse_command("click_on hall door"),
            Ok(Command::ClickOn("hall door".to_string()))
        );
        assert_eq!(
            parse_command("mash 5"),
            Ok(Command::Mash {
                count: 5,
                interval_seconds: DEFAULT_MASH_INTERVAL_SECONDS
            })
        );
    }

    #[test]
    fn search_then_walk_through_unlocked_door() {
        let temp = TempDir::new().expect("temp");
        let script = "\
            expect_flag has_keys false\n\
            click_on hall door\n\
            wait_idle\n\
            expect_room office\n\
            click_on desk\n\
            wait_idle\n\
            expect_flag has_keys true\n\
            click_on hall door\n\
            wait_idle\n\
            expect_room hall\n";
        let (world, playthrough) = run(script, temp.path());
        assert!(playthrough.failures().is_empty(), "{:?}", playthrough.failures());
        assert_eq!(playthrough.executed(), 10);
        assert_eq!(world.session.active_room_id(), Some("hall"));
    }

    #[test]
    fn failed_expectation_stops_the_run() {
        let temp = TempDir::new().expect("temp");
        let (_, playthrough) = run("expect_room hall\nclick 3 0\n", temp.path());
        assert_eq!(playthrough.failures().len(), 1);
        assert_eq!(playthrough.failures()[0].line, 1);
        assert_eq!(playthrough.executed(), 1);
    }

    #[test]
    fn save_and_load_restore_room_and_flags() {
        let temp = TempDir::new().expect("temp");
        let script = "\
            save before\n\
            click_on desk\n\
            wait_idle\n\
            expect_flag has_keys true\n\
            load before\n\
            expect_flag has_keys false\n\
            expect_room office\n";
        let (_, playthrough) = run(script, temp.path());
        assert!(playthrough.failures().is_empty(), "{:?}", playthrough.failures());
        assert!(temp.path().join("before.save.json").is_file());
    }

    #[test]
    fn mash_clicks_start_after_the_walk() {
        let temp = TempDir::new().expect("temp");
        let script = "\
            click_on desk\n\
            wait_idle\n\
            click_on hall door\n\
            wait_idle\n\
            click_on crate\n\
            mash 3\n\
            wait_idle\n\
            expect_flag crate_open true\n";
        let (world, playthrough) = run(script, temp.path());
        assert!(playthrough.failures().is_empty(), "{:?}", playthrough.failures());
        assert!(!world.session.lock().is_held());
    }

    #[test]
    fn missing_interactable_is_a_failure() {
        let temp = TempDir::new().expect("temp");
        let (_, playthrough) = run("click_on piano\n", temp.path());
        assert_eq!(playthrough.failures().len(), 1);
        assert!(playthrough.failures()[0].message.contains("piano"));
    }
}
